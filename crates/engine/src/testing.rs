//! Shared stubs and fixtures for engine tests.
//!
//! A recording execution client, a scriptable portfolio, a stub data client,
//! and a hook-recording strategy, plus the fixed-time fixtures the scenario
//! suites are written against.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use core_types::{
    Account, Bar, BarSpecification, BarType, Instrument, MarketPosition, Order, OrderId,
    Position, PositionId, PriceType, Resolution, SecurityType, StrategyId, Symbol, Tick,
    TraderId,
};
use events::{Command, Event};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::clients::{BarHandler, DataClient, ExecutionClient, InstrumentHandler, Portfolio, TickHandler};
use crate::clock::TestClock;
use crate::config::StrategyConfig;
use crate::error::EngineError;
use crate::host::{StrategyContext, StrategyEngine};
use crate::strategy::{StateMap, Strategy};

// ---===[ Fixtures ]===---

pub fn test_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2020, 3, 14, 9, 26, 53).unwrap()
}

pub fn test_clock() -> Rc<RefCell<TestClock>> {
    Rc::new(RefCell::new(TestClock::new(test_time())))
}

pub fn audusd() -> Symbol {
    Symbol::new("AUDUSD", "FXCM").unwrap()
}

pub fn audusd_1min_bid() -> BarType {
    BarType::new(
        audusd(),
        BarSpecification::new(1, Resolution::Minute, PriceType::Bid).unwrap(),
    )
}

pub fn audusd_instrument() -> Instrument {
    Instrument {
        symbol: audusd(),
        tick_size: dec!(0.00001),
        tick_precision: 5,
        security_type: SecurityType::Forex,
        base_currency: "AUD".to_string(),
        quote_currency: "USD".to_string(),
    }
}

/// A flat bar at `close`, stamped `minutes_after` the fixture time.
pub fn bar_with_close(close: Decimal, minutes_after: i64) -> Bar {
    Bar::new(
        close,
        close,
        close,
        close,
        dec!(100000),
        test_time() + Duration::minutes(minutes_after),
    )
    .unwrap()
}

pub fn tick_with(bid: Decimal, ask: Decimal) -> Tick {
    Tick::new(audusd(), bid, ask, test_time()).unwrap()
}

pub fn long_position(id: &str, quantity: Decimal, entry_order_id: &str) -> Position {
    Position {
        id: PositionId::new(id).unwrap(),
        symbol: audusd(),
        market_position: MarketPosition::Long,
        quantity,
        entry_price: dec!(1.00000),
        entry_order_id: OrderId::new(entry_order_id).unwrap(),
        last_updated: test_time(),
    }
}

pub fn short_position(id: &str, quantity: Decimal, entry_order_id: &str) -> Position {
    Position {
        market_position: MarketPosition::Short,
        ..long_position(id, quantity, entry_order_id)
    }
}

pub fn flat_position(id: &str, entry_order_id: &str) -> Position {
    Position {
        market_position: MarketPosition::Flat,
        quantity: Decimal::ZERO,
        ..long_position(id, dec!(1), entry_order_id)
    }
}

pub fn test_account() -> Account {
    Account {
        account_id: "FXCM-123456".to_string(),
        currency: "USD".to_string(),
        cash_balance: dec!(100000),
        free_equity: dec!(100000),
        last_updated: test_time(),
    }
}

// ---===[ Recording execution client ]===---

/// Records every command and serves order lookups from a scriptable store.
///
/// Submitted orders are added to the store automatically; tests overwrite
/// entries with [`RecordingExecClient::set_order`] to script working state.
#[derive(Default)]
pub struct RecordingExecClient {
    pub commands: Vec<Command>,
    pub orders: HashMap<OrderId, Order>,
    pub active_order_ids: Vec<OrderId>,
    pub account: Option<Account>,
}

impl RecordingExecClient {
    pub fn new() -> Rc<RefCell<Self>> {
        Rc::new(RefCell::new(Self::default()))
    }

    pub fn set_order(&mut self, order: Order) {
        self.orders.insert(order.id.clone(), order);
    }

    pub fn set_order_price(&mut self, order_id: &OrderId, price: Decimal) {
        if let Some(order) = self.orders.get_mut(order_id) {
            order.price = Some(price);
        }
    }

    pub fn set_active(&mut self, order_id: OrderId) {
        self.active_order_ids.push(order_id);
    }

    pub fn command_count(&self) -> usize {
        self.commands.len()
    }
}

impl ExecutionClient for RecordingExecClient {
    fn execute_command(&mut self, command: Command) -> Result<(), EngineError> {
        match &command {
            Command::SubmitOrder(c) => {
                self.orders.insert(c.order.id.clone(), c.order.clone());
            }
            Command::SubmitAtomicOrder(c) => {
                let atomic = &c.atomic_order;
                self.orders.insert(atomic.entry.id.clone(), atomic.entry.clone());
                self.orders
                    .insert(atomic.stop_loss.id.clone(), atomic.stop_loss.clone());
                if let Some(tp) = &atomic.take_profit {
                    self.orders.insert(tp.id.clone(), tp.clone());
                }
            }
            _ => {}
        }
        self.commands.push(command);
        Ok(())
    }

    fn get_order(&self, order_id: &OrderId) -> Option<Order> {
        self.orders.get(order_id).cloned()
    }

    fn get_orders(&self, _strategy_id: &StrategyId) -> Vec<Order> {
        self.orders.values().cloned().collect()
    }

    fn get_orders_active(&self, _strategy_id: &StrategyId) -> Vec<Order> {
        self.active_order_ids
            .iter()
            .filter_map(|id| self.orders.get(id).cloned())
            .collect()
    }

    fn get_orders_completed(&self, _strategy_id: &StrategyId) -> Vec<Order> {
        self.orders
            .values()
            .filter(|o| o.is_complete())
            .cloned()
            .collect()
    }

    fn get_account(&self) -> Option<Account> {
        self.account.clone()
    }

    fn order_exists(&self, order_id: &OrderId) -> bool {
        self.orders.contains_key(order_id)
    }

    fn is_order_active(&self, order_id: &OrderId) -> bool {
        self.active_order_ids.contains(order_id)
    }

    fn is_order_complete(&self, order_id: &OrderId) -> bool {
        self.orders
            .get(order_id)
            .map_or(false, |o| o.is_complete())
    }
}

// ---===[ Stub portfolio ]===---

#[derive(Default)]
pub struct StubPortfolio {
    pub positions: HashMap<PositionId, Position>,
    pub order_positions: HashMap<OrderId, PositionId>,
}

impl StubPortfolio {
    pub fn new() -> Rc<RefCell<Self>> {
        Rc::new(RefCell::new(Self::default()))
    }

    pub fn add_position(&mut self, position: Position) {
        self.positions.insert(position.id.clone(), position);
    }

    pub fn link_order(&mut self, order_id: OrderId, position_id: PositionId) {
        self.order_positions.insert(order_id, position_id);
    }
}

impl Portfolio for StubPortfolio {
    fn get_position(&self, position_id: &PositionId) -> Option<Position> {
        self.positions.get(position_id).cloned()
    }

    fn get_positions(&self, _strategy_id: &StrategyId) -> Vec<Position> {
        self.positions.values().cloned().collect()
    }

    fn get_positions_active(&self, _strategy_id: &StrategyId) -> Vec<Position> {
        let mut active: Vec<Position> = self
            .positions
            .values()
            .filter(|p| p.is_entered())
            .cloned()
            .collect();
        active.sort_by(|a, b| a.id.cmp(&b.id));
        active
    }

    fn get_positions_closed(&self, _strategy_id: &StrategyId) -> Vec<Position> {
        self.positions
            .values()
            .filter(|p| p.is_flat())
            .cloned()
            .collect()
    }

    fn get_position_for_order(&self, order_id: &OrderId) -> Option<Position> {
        let position_id = self.order_positions.get(order_id)?;
        self.positions.get(position_id).cloned()
    }

    fn position_exists(&self, position_id: &PositionId) -> bool {
        self.positions.contains_key(position_id)
    }

    fn is_strategy_flat(&self, _strategy_id: &StrategyId) -> bool {
        self.positions.values().all(|p| p.is_flat())
    }
}

// ---===[ Stub data client ]===---

#[derive(Default)]
pub struct StubDataClient {
    pub available_symbols: Vec<Symbol>,
    pub instruments: HashMap<Symbol, Instrument>,
    pub historical: HashMap<BarType, Vec<Bar>>,
    pub bar_subscriptions: HashMap<BarType, BarHandler>,
    pub tick_subscriptions: HashMap<Symbol, TickHandler>,
    pub instrument_subscriptions: Vec<Symbol>,
}

impl StubDataClient {
    pub fn new() -> Rc<RefCell<Self>> {
        Rc::new(RefCell::new(Self::default()))
    }

    /// Pushes a bar through a live subscription handler, if one is held.
    pub fn push_bar(&mut self, bar_type: &BarType, bar: Bar) {
        if let Some(handler) = self.bar_subscriptions.get_mut(bar_type) {
            handler(bar_type.clone(), bar);
        }
    }

    pub fn push_tick(&mut self, tick: Tick) {
        if let Some(handler) = self.tick_subscriptions.get_mut(&tick.symbol) {
            handler(tick);
        }
    }
}

impl DataClient for StubDataClient {
    fn symbols(&self) -> Vec<Symbol> {
        self.available_symbols.clone()
    }

    fn get_instrument(&self, symbol: &Symbol) -> Option<Instrument> {
        self.instruments.get(symbol).cloned()
    }

    fn historical_bars(
        &mut self,
        bar_type: &BarType,
        quantity: usize,
        on_bar: &mut dyn FnMut(BarType, Bar),
    ) {
        if let Some(bars) = self.historical.get(bar_type) {
            let start = bars.len().saturating_sub(quantity);
            for bar in &bars[start..] {
                on_bar(bar_type.clone(), bar.clone());
            }
        }
    }

    fn historical_bars_from(
        &mut self,
        bar_type: &BarType,
        from: DateTime<Utc>,
        on_bar: &mut dyn FnMut(BarType, Bar),
    ) {
        if let Some(bars) = self.historical.get(bar_type) {
            for bar in bars.iter().filter(|b| b.timestamp >= from) {
                on_bar(bar_type.clone(), bar.clone());
            }
        }
    }

    fn subscribe_bars(&mut self, bar_type: &BarType, on_bar: BarHandler) {
        self.bar_subscriptions.insert(bar_type.clone(), on_bar);
    }

    fn unsubscribe_bars(&mut self, bar_type: &BarType) {
        self.bar_subscriptions.remove(bar_type);
    }

    fn subscribe_ticks(&mut self, symbol: &Symbol, on_tick: TickHandler) {
        self.tick_subscriptions.insert(symbol.clone(), on_tick);
    }

    fn unsubscribe_ticks(&mut self, symbol: &Symbol) {
        self.tick_subscriptions.remove(symbol);
    }

    fn subscribe_instrument(&mut self, symbol: &Symbol, _on_instrument: InstrumentHandler) {
        self.instrument_subscriptions.push(symbol.clone());
    }
}

// ---===[ Recording strategy ]===---

/// Records every hook invocation; `on_save` / `on_load` round-trip a state
/// map held by the test.
#[derive(Default)]
pub struct RecordingStrategy {
    calls: Rc<RefCell<Vec<String>>>,
    pub state: StateMap,
}

impl RecordingStrategy {
    pub fn new() -> (Box<Self>, Rc<RefCell<Vec<String>>>) {
        let calls = Rc::new(RefCell::new(Vec::new()));
        (
            Box::new(Self {
                calls: calls.clone(),
                state: StateMap::new(),
            }),
            calls,
        )
    }

    fn record(&self, name: &str) {
        self.calls.borrow_mut().push(name.to_string());
    }
}

impl Strategy for RecordingStrategy {
    fn on_start(&mut self, _ctx: &mut StrategyContext) -> anyhow::Result<()> {
        self.record("on_start");
        Ok(())
    }

    fn on_tick(&mut self, _ctx: &mut StrategyContext, _tick: &Tick) -> anyhow::Result<()> {
        self.record("on_tick");
        Ok(())
    }

    fn on_bar(
        &mut self,
        _ctx: &mut StrategyContext,
        _bar_type: &BarType,
        _bar: &Bar,
    ) -> anyhow::Result<()> {
        self.record("on_bar");
        Ok(())
    }

    fn on_instrument(
        &mut self,
        _ctx: &mut StrategyContext,
        _instrument: &Instrument,
    ) -> anyhow::Result<()> {
        self.record("on_instrument");
        Ok(())
    }

    fn on_event(&mut self, _ctx: &mut StrategyContext, _event: &Event) -> anyhow::Result<()> {
        self.record("on_event");
        Ok(())
    }

    fn on_stop(&mut self, _ctx: &mut StrategyContext) -> anyhow::Result<()> {
        self.record("on_stop");
        Ok(())
    }

    fn on_reset(&mut self) -> anyhow::Result<()> {
        self.record("on_reset");
        Ok(())
    }

    fn on_save(&mut self) -> anyhow::Result<StateMap> {
        self.record("on_save");
        Ok(self.state.clone())
    }

    fn on_load(&mut self, state: StateMap) -> anyhow::Result<()> {
        self.record("on_load");
        self.state = state;
        Ok(())
    }

    fn on_dispose(&mut self) -> anyhow::Result<()> {
        self.record("on_dispose");
        Ok(())
    }
}

// ---===[ Engine assembly ]===---

pub struct TestHarness {
    pub engine: StrategyEngine,
    pub clock: Rc<RefCell<TestClock>>,
    pub exec: Rc<RefCell<RecordingExecClient>>,
    pub portfolio: Rc<RefCell<StubPortfolio>>,
    pub data: Rc<RefCell<StubDataClient>>,
}

/// Builds an engine wired to the recording stubs, with the clock fixed at
/// the fixture time and the given configuration.
pub fn test_harness(strategy: Box<dyn Strategy>, config: StrategyConfig) -> TestHarness {
    let clock = test_clock();
    let mut engine = StrategyEngine::new(
        TraderId::new("TRADER-000").unwrap(),
        StrategyId::new("EMA-001").unwrap(),
        "000",
        "EMA-001",
        config,
        clock.clone(),
        strategy,
    )
    .expect("engine construction");

    let exec = RecordingExecClient::new();
    let portfolio = StubPortfolio::new();
    let data = StubDataClient::new();
    engine.register_execution_client(exec.clone());
    engine.register_portfolio(portfolio.clone());
    engine.register_data_client(data.clone());

    TestHarness {
        engine,
        clock,
        exec,
        portfolio,
        data,
    }
}
