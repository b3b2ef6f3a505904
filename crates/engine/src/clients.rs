//! Interfaces to the external collaborators: market data, execution, and
//! portfolio accounting.
//!
//! Clients call back into the strategy only through the handlers passed at
//! subscription time; the engine holds the client interfaces. Neither side
//! owns the other.

use chrono::{DateTime, Utc};
use core_types::{
    Account, Bar, BarType, Instrument, Order, OrderId, Position, PositionId, StrategyId, Symbol,
    Tick,
};
use events::Command;

use crate::error::EngineError;

pub type TickHandler = Box<dyn FnMut(Tick)>;
pub type BarHandler = Box<dyn FnMut(BarType, Bar)>;
pub type InstrumentHandler = Box<dyn FnMut(Instrument)>;

pub trait DataClient {
    fn symbols(&self) -> Vec<Symbol>;

    fn get_instrument(&self, symbol: &Symbol) -> Option<Instrument>;

    /// Delivers the most recent `quantity` historical bars through `on_bar`,
    /// oldest first.
    fn historical_bars(
        &mut self,
        bar_type: &BarType,
        quantity: usize,
        on_bar: &mut dyn FnMut(BarType, Bar),
    );

    /// Delivers historical bars from `from` onwards through `on_bar`, oldest
    /// first.
    fn historical_bars_from(
        &mut self,
        bar_type: &BarType,
        from: DateTime<Utc>,
        on_bar: &mut dyn FnMut(BarType, Bar),
    );

    fn subscribe_bars(&mut self, bar_type: &BarType, on_bar: BarHandler);

    fn unsubscribe_bars(&mut self, bar_type: &BarType);

    fn subscribe_ticks(&mut self, symbol: &Symbol, on_tick: TickHandler);

    fn unsubscribe_ticks(&mut self, symbol: &Symbol);

    fn subscribe_instrument(&mut self, symbol: &Symbol, on_instrument: InstrumentHandler);
}

pub trait ExecutionClient {
    fn execute_command(&mut self, command: Command) -> Result<(), EngineError>;

    fn get_order(&self, order_id: &OrderId) -> Option<Order>;

    fn get_orders(&self, strategy_id: &StrategyId) -> Vec<Order>;

    fn get_orders_active(&self, strategy_id: &StrategyId) -> Vec<Order>;

    fn get_orders_completed(&self, strategy_id: &StrategyId) -> Vec<Order>;

    fn get_account(&self) -> Option<Account>;

    fn order_exists(&self, order_id: &OrderId) -> bool;

    fn is_order_active(&self, order_id: &OrderId) -> bool;

    fn is_order_complete(&self, order_id: &OrderId) -> bool;
}

pub trait Portfolio {
    fn get_position(&self, position_id: &PositionId) -> Option<Position>;

    fn get_positions(&self, strategy_id: &StrategyId) -> Vec<Position>;

    fn get_positions_active(&self, strategy_id: &StrategyId) -> Vec<Position>;

    fn get_positions_closed(&self, strategy_id: &StrategyId) -> Vec<Position>;

    fn get_position_for_order(&self, order_id: &OrderId) -> Option<Position>;

    fn position_exists(&self, position_id: &PositionId) -> bool;

    fn is_strategy_flat(&self, strategy_id: &StrategyId) -> bool;
}
