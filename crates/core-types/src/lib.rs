pub mod account;
pub mod data;
pub mod enums;
pub mod error;
pub mod identifiers;
pub mod orders;
pub mod position;

// Re-export the core types to provide a clean public API.
pub use account::Account;
pub use data::{Bar, BarSpecification, BarType, Instrument, Symbol, Tick};
pub use enums::{
    MarketPosition, OrderPurpose, OrderSide, OrderStatus, OrderType, PriceType, Resolution,
    SecurityType, TimeInForce,
};
pub use error::CoreError;
pub use identifiers::{Label, OrderId, PositionId, StrategyId, TraderId};
pub use orders::{AtomicOrder, Order};
pub use position::Position;
