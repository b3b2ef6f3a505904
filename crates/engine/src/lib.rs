//! # Meridian Strategy Engine
//!
//! This crate hosts user-defined trading strategies and mediates every
//! interaction between the strategy's decision logic and the surrounding
//! infrastructure: market-data feeds, the execution gateway, portfolio
//! accounting, and the clock.
//!
//! ## Architectural Principles
//!
//! - **Single-threaded cooperative:** all engine-visible mutation happens on
//!   the one logical thread that calls `handle_tick` / `handle_bar` /
//!   `handle_event`. External clients marshal their callbacks onto that
//!   thread through the engine's input channel; the engine takes no locks.
//! - **Deterministic under a test clock:** the same inputs against a
//!   [`clock::TestClock`] reproduce the same outbound command sequence,
//!   identifier for identifier.
//! - **Strategy bugs stay contained:** user hooks are invoked through the
//!   [`strategy::Strategy`] trait and their failures are logged, never
//!   propagated.
//!
//! ## Public API
//!
//! - `StrategyEngine`: the host lifecycle and event dispatcher.
//! - `StrategyContext`: the full surface handed to user hooks.
//! - `Strategy`: the hook trait user strategies implement.
//! - `Clock` / `LiveClock` / `TestClock`: the time seam.
//! - `LiveRuntime` / `BacktestRunner`: the two ways to drive the dispatcher.

pub mod cache;
pub mod clients;
pub mod clock;
pub mod config;
pub mod error;
pub mod factory;
pub mod generators;
pub mod host;
pub mod indicators;
pub mod ledger;
pub mod runtime;
pub mod strategy;
pub mod testing;
pub mod xrate;

// Re-export the key components to provide a clean, public-facing API.
pub use cache::MarketDataCache;
pub use clients::{BarHandler, DataClient, ExecutionClient, Portfolio, TickHandler};
pub use clock::{Clock, LiveClock, TestClock, TimeEventHandler};
pub use config::StrategyConfig;
pub use error::EngineError;
pub use factory::OrderFactory;
pub use generators::{IdGenerator, OrderIdGenerator, PositionIdGenerator};
pub use host::{LifecycleState, StrategyContext, StrategyEngine};
pub use indicators::{Indicator, IndicatorRegistry, PriceSource};
pub use ledger::OrderLedger;
pub use runtime::{BacktestRunner, EngineInput, LiveRuntime, ShutdownSignal};
pub use strategy::{StateMap, Strategy};
pub use xrate::ExchangeRateCalculator;
