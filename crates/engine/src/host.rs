//! The strategy host: lifecycle state machine, event dispatcher, command
//! operations, and the order-event reducer.
//!
//! [`StrategyEngine`] owns the user strategy and a [`StrategyContext`]; hooks
//! receive the context, which carries the entire user-facing surface (ledger,
//! cache, indicators, clock, generators, and the command operations). All
//! mutation happens on the single logical thread that calls the `handle_*`
//! methods; nothing here suspends or takes a lock.

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use core_types::{
    Account, Bar, BarType, Instrument, Order, OrderId, OrderPurpose, Position, PositionId,
    StrategyId, Symbol, Tick, TraderId,
};
use events::{
    CancelOrder, CollateralInquiry, Command, Event, ModifyOrder, SubmitAtomicOrder, SubmitOrder,
    TimeEvent,
};
use rust_decimal::Decimal;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use crate::cache::MarketDataCache;
use crate::clients::{DataClient, ExecutionClient, Portfolio};
use crate::clock::Clock;
use crate::config::StrategyConfig;
use crate::error::EngineError;
use crate::factory::OrderFactory;
use crate::generators::PositionIdGenerator;
use crate::indicators::{Indicator, IndicatorRegistry};
use crate::ledger::OrderLedger;
use crate::runtime::EngineInput;
use crate::strategy::{StateMap, Strategy};
use crate::xrate::ExchangeRateCalculator;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Created,
    Running,
    Stopped,
    Disposed,
}

/// The engine surface handed to every user hook.
pub struct StrategyContext {
    trader_id: TraderId,
    strategy_id: StrategyId,
    id_tag_trader: String,
    id_tag_strategy: String,
    config: StrategyConfig,
    clock: Rc<RefCell<dyn Clock>>,
    order_factory: OrderFactory,
    position_id_generator: PositionIdGenerator,
    cache: MarketDataCache,
    indicators: IndicatorRegistry,
    ledger: OrderLedger,
    xrate: ExchangeRateCalculator,
    data_client: Option<Rc<RefCell<dyn DataClient>>>,
    exec_client: Option<Rc<RefCell<dyn ExecutionClient>>>,
    portfolio: Option<Rc<RefCell<dyn Portfolio>>>,
    input_tx: UnboundedSender<EngineInput>,
    is_running: bool,
}

impl StrategyContext {
    pub fn trader_id(&self) -> &TraderId {
        &self.trader_id
    }

    pub fn strategy_id(&self) -> &StrategyId {
        &self.strategy_id
    }

    pub fn config(&self) -> &StrategyConfig {
        &self.config
    }

    pub fn is_running(&self) -> bool {
        self.is_running
    }

    pub fn time_now(&self) -> DateTime<Utc> {
        self.clock.borrow().time_now()
    }

    pub fn cache(&self) -> &MarketDataCache {
        &self.cache
    }

    pub fn ledger(&self) -> &OrderLedger {
        &self.ledger
    }

    pub fn order_factory(&mut self) -> &mut OrderFactory {
        &mut self.order_factory
    }

    pub fn generate_position_id(&mut self) -> Result<PositionId, EngineError> {
        self.position_id_generator.generate()
    }

    // ---===[ Clock & timers ]===---

    pub fn set_timer(&mut self, label: &str, interval: Duration) -> Result<(), EngineError> {
        self.clock.borrow_mut().set_timer(label, interval)
    }

    pub fn set_time_alert(
        &mut self,
        label: &str,
        alert_time: DateTime<Utc>,
    ) -> Result<(), EngineError> {
        self.clock.borrow_mut().set_time_alert(label, alert_time)
    }

    pub fn timer_labels(&self) -> Vec<String> {
        self.clock.borrow().timer_labels()
    }

    pub fn cancel_all_timers(&mut self) {
        self.clock.borrow_mut().cancel_all_timers();
    }

    pub fn cancel_all_time_alerts(&mut self) {
        self.clock.borrow_mut().cancel_all_time_alerts();
    }

    // ---===[ Market data ]===---

    pub fn last_tick(&self, symbol: &Symbol) -> Result<Tick, EngineError> {
        self.cache.last_tick(symbol).cloned()
    }

    pub fn last_bar(&self, bar_type: &BarType) -> Result<Bar, EngineError> {
        self.cache.last_bar(bar_type).cloned()
    }

    /// Reverse-indexed bar access: index 0 is the newest bar.
    pub fn bar(&self, bar_type: &BarType, index: usize) -> Result<Bar, EngineError> {
        self.cache.bar(bar_type, index).cloned()
    }

    pub fn bars(&self, bar_type: &BarType) -> Result<Vec<Bar>, EngineError> {
        self.cache.bars(bar_type)
    }

    // ---===[ Indicators ]===---

    pub fn register_indicator(
        &mut self,
        bar_type: BarType,
        indicator: Rc<RefCell<dyn Indicator>>,
    ) {
        self.indicators.register(bar_type, indicator);
    }

    pub fn indicators(&self) -> &IndicatorRegistry {
        &self.indicators
    }

    pub fn indicators_initialized(&self, bar_type: &BarType) -> Result<bool, EngineError> {
        self.indicators.initialized(bar_type)
    }

    pub fn indicators_initialized_all(&self) -> bool {
        self.indicators.initialized_all()
    }

    // ---===[ Data client ]===---

    pub fn symbols(&self) -> Vec<Symbol> {
        match &self.data_client {
            Some(client) => client.borrow().symbols(),
            None => {
                tracing::error!("data client is not registered; no symbols available");
                Vec::new()
            }
        }
    }

    // TODO: return full instrument definitions once callers stop relying on
    // getting the symbol list here.
    pub fn instruments(&self) -> Vec<Symbol> {
        self.symbols()
    }

    pub fn instrument(&self, symbol: &Symbol) -> Option<Instrument> {
        match &self.data_client {
            Some(client) => client.borrow().get_instrument(symbol),
            None => {
                tracing::error!("data client is not registered; cannot fetch instrument");
                None
            }
        }
    }

    /// Pulls the most recent `quantity` historical bars into the cache and
    /// indicator bindings, so indicators can warm up before live delivery.
    pub fn request_bars(&mut self, bar_type: &BarType, quantity: usize) {
        let Some(client) = &self.data_client else {
            tracing::error!("data client is not registered; cannot request bars");
            return;
        };
        let mut collected: Vec<(BarType, Bar)> = Vec::new();
        client
            .borrow_mut()
            .historical_bars(bar_type, quantity, &mut |bt, bar| {
                collected.push((bt, bar));
            });
        let count = collected.len();
        for (bt, bar) in collected {
            self.cache.handle_bar(bt.clone(), bar.clone());
            self.indicators.update_for_bar(&bt, &bar);
        }
        tracing::info!("Loaded {} historical bars for {}", count, bar_type);
    }

    /// As [`StrategyContext::request_bars`], from a starting timestamp.
    pub fn request_bars_from(&mut self, bar_type: &BarType, from: DateTime<Utc>) {
        let Some(client) = &self.data_client else {
            tracing::error!("data client is not registered; cannot request bars");
            return;
        };
        let mut collected: Vec<(BarType, Bar)> = Vec::new();
        client
            .borrow_mut()
            .historical_bars_from(bar_type, from, &mut |bt, bar| {
                collected.push((bt, bar));
            });
        let count = collected.len();
        for (bt, bar) in collected {
            self.cache.handle_bar(bt.clone(), bar.clone());
            self.indicators.update_for_bar(&bt, &bar);
        }
        tracing::info!("Loaded {} historical bars for {}", count, bar_type);
    }

    pub fn subscribe_bars(&mut self, bar_type: &BarType) {
        let Some(client) = &self.data_client else {
            tracing::error!("data client is not registered; cannot subscribe to bars");
            return;
        };
        let tx = self.input_tx.clone();
        client.borrow_mut().subscribe_bars(
            bar_type,
            Box::new(move |bt, bar| {
                let _ = tx.send(EngineInput::Bar(bt, bar));
            }),
        );
    }

    pub fn unsubscribe_bars(&mut self, bar_type: &BarType) {
        if let Some(client) = &self.data_client {
            client.borrow_mut().unsubscribe_bars(bar_type);
        }
    }

    pub fn subscribe_ticks(&mut self, symbol: &Symbol) {
        let Some(client) = &self.data_client else {
            tracing::error!("data client is not registered; cannot subscribe to ticks");
            return;
        };
        let tx = self.input_tx.clone();
        client.borrow_mut().subscribe_ticks(
            symbol,
            Box::new(move |tick| {
                let _ = tx.send(EngineInput::Tick(tick));
            }),
        );
    }

    pub fn unsubscribe_ticks(&mut self, symbol: &Symbol) {
        if let Some(client) = &self.data_client {
            client.borrow_mut().unsubscribe_ticks(symbol);
        }
    }

    pub fn subscribe_instrument(&mut self, symbol: &Symbol) {
        let Some(client) = &self.data_client else {
            tracing::error!("data client is not registered; cannot subscribe to instrument");
            return;
        };
        let tx = self.input_tx.clone();
        client.borrow_mut().subscribe_instrument(
            symbol,
            Box::new(move |instrument| {
                let _ = tx.send(EngineInput::Instrument(instrument));
            }),
        );
    }

    // ---===[ Account & rates ]===---

    pub fn account(&self) -> Result<Account, EngineError> {
        let client = self
            .exec_client
            .as_ref()
            .ok_or(EngineError::NotRegistered("execution client"))?;
        client
            .borrow()
            .get_account()
            .ok_or_else(|| EngineError::Lookup("no account available".to_string()))
    }

    /// MID rate converting `quote_currency` into `base_currency`, from the
    /// current tick snapshot.
    pub fn exchange_rate(
        &self,
        quote_currency: &str,
        base_currency: &str,
    ) -> Result<Decimal, EngineError> {
        let (bids, asks) = self.cache.rate_snapshot();
        self.xrate
            .get_rate(quote_currency, base_currency, &bids, &asks)
    }

    // ---===[ Positions ]===---

    pub fn position(&self, position_id: &PositionId) -> Option<Position> {
        match &self.portfolio {
            Some(portfolio) => portfolio.borrow().get_position(position_id),
            None => {
                tracing::error!("portfolio is not registered; cannot fetch position");
                None
            }
        }
    }

    pub fn positions_active(&self) -> Vec<Position> {
        match &self.portfolio {
            Some(portfolio) => portfolio.borrow().get_positions_active(&self.strategy_id),
            None => {
                tracing::error!("portfolio is not registered; no positions available");
                Vec::new()
            }
        }
    }

    pub fn is_flat(&self) -> bool {
        match &self.portfolio {
            Some(portfolio) => portfolio.borrow().is_strategy_flat(&self.strategy_id),
            None => true,
        }
    }

    // ---===[ Command operations ]===---

    pub fn collateral_inquiry(&mut self) -> Result<(), EngineError> {
        let command = Command::CollateralInquiry(CollateralInquiry {
            trader_id: self.trader_id.clone(),
            strategy_id: self.strategy_id.clone(),
        });
        self.send_command(command)
    }

    /// Forwards a submit command tagged with trader, strategy, and position.
    pub fn submit_order(
        &mut self,
        order: Order,
        position_id: PositionId,
    ) -> Result<(), EngineError> {
        tracing::info!(
            "Submitting {:?} {:?} order {} for position {}",
            order.side,
            order.order_type,
            order.id,
            position_id
        );
        let command = Command::SubmitOrder(SubmitOrder {
            trader_id: self.trader_id.clone(),
            strategy_id: self.strategy_id.clone(),
            position_id,
            order,
        });
        self.send_command(command)
    }

    pub fn submit_entry_order(
        &mut self,
        order: Order,
        position_id: PositionId,
    ) -> Result<(), EngineError> {
        self.ledger.register_entry(order.clone())?;
        self.submit_order(order, position_id)
    }

    pub fn submit_stop_loss_order(
        &mut self,
        order: Order,
        position_id: PositionId,
    ) -> Result<(), EngineError> {
        self.ledger.register_stop_loss(order.clone())?;
        self.submit_order(order, position_id)
    }

    pub fn submit_take_profit_order(
        &mut self,
        order: Order,
        position_id: PositionId,
    ) -> Result<(), EngineError> {
        self.ledger.register_take_profit(order.clone())?;
        self.submit_order(order, position_id)
    }

    /// Registers all legs, records the parent→children mapping, and forwards
    /// a single atomic submit command.
    pub fn submit_atomic_order(
        &mut self,
        atomic: core_types::AtomicOrder,
        position_id: PositionId,
    ) -> Result<(), EngineError> {
        self.ledger.register_atomic(&atomic)?;
        tracing::info!(
            "Submitting atomic order {} (stop-loss {}, take-profit {:?}) for position {}",
            atomic.entry.id,
            atomic.stop_loss.id,
            atomic.take_profit.as_ref().map(|o| o.id.to_string()),
            position_id
        );
        let command = Command::SubmitAtomicOrder(SubmitAtomicOrder {
            trader_id: self.trader_id.clone(),
            strategy_id: self.strategy_id.clone(),
            position_id,
            atomic_order: atomic,
        });
        self.send_command(command)
    }

    /// Requests a price change for a working order.
    ///
    /// Only one modify command is in flight per order: while an ack is
    /// outstanding, a newer request replaces the buffered command and is sent
    /// when the ack arrives.
    pub fn modify_order(&mut self, order: &Order, new_price: Decimal) -> Result<(), EngineError> {
        let command = ModifyOrder {
            trader_id: self.trader_id.clone(),
            strategy_id: self.strategy_id.clone(),
            order_id: order.id.clone(),
            modified_price: new_price,
        };
        if self.ledger.has_buffered_modify(&order.id) {
            self.ledger.buffer_modify(command);
            tracing::warn!(
                "Modify for order {} already in flight; buffered price {} to send on ack",
                order.id,
                new_price
            );
            return Ok(());
        }
        self.ledger.buffer_modify(command.clone());
        self.send_command(Command::ModifyOrder(command))
    }

    pub fn cancel_order(&mut self, order: &Order, reason: &str) -> Result<(), EngineError> {
        tracing::info!("Cancelling order {}: {}", order.id, reason);
        let command = Command::CancelOrder(CancelOrder {
            trader_id: self.trader_id.clone(),
            strategy_id: self.strategy_id.clone(),
            order_id: order.id.clone(),
            reason: reason.to_string(),
        });
        self.send_command(command)
    }

    /// Cancels every active order the execution client associates with this
    /// strategy.
    pub fn cancel_all_orders(&mut self, reason: &str) -> Result<(), EngineError> {
        let Some(client) = &self.exec_client else {
            tracing::error!("execution client is not registered; cannot cancel orders");
            return Ok(());
        };
        let active = client.borrow().get_orders_active(&self.strategy_id);
        for order in active {
            self.cancel_order(&order, reason)?;
        }
        Ok(())
    }

    /// Closes a position with a market order of opposite side and equal
    /// quantity.
    pub fn flatten_position(&mut self, position_id: &PositionId) -> Result<(), EngineError> {
        let Some(portfolio) = &self.portfolio else {
            tracing::error!("portfolio is not registered; cannot flatten position");
            return Ok(());
        };
        let position = portfolio.borrow().get_position(position_id);
        let Some(position) = position else {
            return Err(EngineError::Lookup(format!(
                "no position found for {}",
                position_id
            )));
        };
        let Some(side) = position.flatten_side() else {
            tracing::warn!("Position {} is already flat", position_id);
            return Ok(());
        };
        let order = self.order_factory.market(
            position.symbol.clone(),
            side,
            position.quantity,
            OrderPurpose::Exit,
        )?;
        self.submit_order(order, position_id.clone())
    }

    /// Flattens every active position; positions already flat are skipped
    /// with a warning.
    pub fn flatten_all_positions(&mut self) -> Result<(), EngineError> {
        let Some(portfolio) = &self.portfolio else {
            tracing::error!("portfolio is not registered; cannot flatten positions");
            return Ok(());
        };
        let positions = portfolio.borrow().get_positions_active(&self.strategy_id);
        for position in positions {
            match position.flatten_side() {
                Some(side) => {
                    let order = self.order_factory.market(
                        position.symbol.clone(),
                        side,
                        position.quantity,
                        OrderPurpose::Exit,
                    )?;
                    self.submit_order(order, position.id.clone())?;
                }
                None => tracing::warn!("Position {} is already flat; skipping", position.id),
            }
        }
        Ok(())
    }

    fn send_command(&mut self, command: Command) -> Result<(), EngineError> {
        match &self.exec_client {
            Some(client) => client.borrow_mut().execute_command(command),
            None => {
                tracing::error!("execution client is not registered; command dropped");
                Ok(())
            }
        }
    }

    // ---===[ Order-event reducer ]===---

    pub(crate) fn apply_event(&mut self, event: &Event) {
        match event {
            Event::OrderRejected(e) => {
                tracing::warn!("Order {} rejected: {}", e.order_id, e.reason);
                if self.config.flatten_on_sl_reject
                    && self.ledger.is_registered_stop_loss(&e.order_id)
                {
                    self.flatten_rejected_stop_loss(&e.order_id);
                }
                self.ledger.remove_atomic_children(&e.order_id);
                self.ledger.remove_order(&e.order_id);
            }
            Event::OrderCancelled(e) => {
                tracing::info!("Order {} cancelled", e.order_id);
                self.ledger.remove_atomic_children(&e.order_id);
                self.ledger.remove_order(&e.order_id);
            }
            Event::OrderExpired(e) => {
                tracing::info!("Order {} expired", e.order_id);
                self.ledger.remove_atomic_children(&e.order_id);
                self.ledger.remove_order(&e.order_id);
            }
            Event::OrderFilled(e) => {
                // A filled atomic entry releases its children to live as
                // independent working orders.
                self.ledger.release_atomic_children(&e.order_id);
                self.ledger.remove_order(&e.order_id);
            }
            Event::OrderPartiallyFilled(e) => {
                tracing::warn!(
                    "Order {} partially filled: {} filled, {} remaining",
                    e.order_id,
                    e.filled_quantity,
                    e.leaves_quantity
                );
            }
            Event::OrderModified(e) => {
                self.drain_modify_buffer(&e.order_id);
            }
            Event::OrderCancelReject(e) => {
                tracing::warn!("Cancel/modify rejected for order {}: {}", e.order_id, e.reason);
                self.drain_modify_buffer(&e.order_id);
            }
            Event::Account(_) | Event::Position(_) | Event::Time(_) => {}
        }
    }

    /// The exchange refused risk management: bound the downside by closing
    /// the position the stop was protecting.
    fn flatten_rejected_stop_loss(&mut self, order_id: &OrderId) {
        let Some(portfolio) = &self.portfolio else {
            tracing::error!("portfolio is not registered; cannot flatten for rejected stop-loss");
            return;
        };
        let position = portfolio.borrow().get_position_for_order(order_id);
        match position {
            Some(position) if position.is_entered() => {
                tracing::warn!(
                    "Stop-loss {} rejected with entered position {}; flattening",
                    order_id,
                    position.id
                );
                if let Err(e) = self.flatten_position(&position.id) {
                    tracing::error!("Failed to flatten position {}: {}", position.id, e);
                }
            }
            _ => {}
        }
    }

    /// Compares the buffered price against the order's working price and
    /// re-issues the buffered command if the user's latest request never
    /// reached the venue.
    fn drain_modify_buffer(&mut self, order_id: &OrderId) {
        let Some(buffered) = self.ledger.take_buffered_modify(order_id) else {
            return;
        };
        let working_price = match &self.exec_client {
            Some(client) => client.borrow().get_order(order_id).and_then(|o| o.price),
            None => None,
        };
        if working_price != Some(buffered.modified_price) {
            tracing::info!(
                "Buffered modify for {} at {} differs from working price {:?}; re-issuing",
                order_id,
                buffered.modified_price,
                working_price
            );
            if let Err(e) = self.send_command(Command::ModifyOrder(buffered)) {
                tracing::error!("Failed to re-issue modify for {}: {}", order_id, e);
            }
        }
    }

    pub(crate) fn warn_residual_orders(&self) {
        for id in self.ledger.entry_order_ids() {
            tracing::warn!("Residual entry order {} left in the ledger", id);
        }
        for id in self.ledger.stop_loss_order_ids() {
            tracing::warn!("Residual stop-loss order {} left in the ledger", id);
        }
        for id in self.ledger.take_profit_order_ids() {
            tracing::warn!("Residual take-profit order {} left in the ledger", id);
        }
        for parent in self.ledger.atomic_parent_ids() {
            for child in self.ledger.atomic_child_ids(&parent) {
                tracing::warn!("Residual atomic child {} of entry {}", child, parent);
            }
        }
        for id in self.ledger.buffered_modify_ids() {
            tracing::warn!("Residual buffered modify for order {}", id);
        }
    }
}

/// Hosts one user strategy and mediates every interaction with the
/// surrounding infrastructure.
pub struct StrategyEngine {
    strategy: Box<dyn Strategy>,
    ctx: StrategyContext,
    state: LifecycleState,
    input_rx: Option<UnboundedReceiver<EngineInput>>,
}

impl StrategyEngine {
    pub fn new(
        trader_id: TraderId,
        strategy_id: StrategyId,
        id_tag_trader: &str,
        id_tag_strategy: &str,
        config: StrategyConfig,
        clock: Rc<RefCell<dyn Clock>>,
        strategy: Box<dyn Strategy>,
    ) -> Result<Self, EngineError> {
        config.validate()?;
        let (input_tx, input_rx) = mpsc::unbounded_channel();
        register_time_handler(&clock, &input_tx);

        let ctx = StrategyContext {
            trader_id,
            strategy_id,
            id_tag_trader: id_tag_trader.to_string(),
            id_tag_strategy: id_tag_strategy.to_string(),
            order_factory: OrderFactory::new(id_tag_trader, id_tag_strategy, clock.clone())?,
            position_id_generator: PositionIdGenerator::new(
                id_tag_trader,
                id_tag_strategy,
                clock.clone(),
            )?,
            cache: MarketDataCache::new(config.bar_capacity)?,
            indicators: IndicatorRegistry::new(),
            ledger: OrderLedger::new(),
            xrate: ExchangeRateCalculator::new(),
            config,
            clock,
            data_client: None,
            exec_client: None,
            portfolio: None,
            input_tx,
            is_running: false,
        };

        Ok(Self {
            strategy,
            ctx,
            state: LifecycleState::Created,
            input_rx: Some(input_rx),
        })
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == LifecycleState::Running
    }

    pub fn ctx(&self) -> &StrategyContext {
        &self.ctx
    }

    pub fn ctx_mut(&mut self) -> &mut StrategyContext {
        &mut self.ctx
    }

    pub fn register_data_client(&mut self, client: Rc<RefCell<dyn DataClient>>) {
        self.ctx.data_client = Some(client);
    }

    pub fn register_execution_client(&mut self, client: Rc<RefCell<dyn ExecutionClient>>) {
        self.ctx.exec_client = Some(client);
    }

    pub fn register_portfolio(&mut self, portfolio: Rc<RefCell<dyn Portfolio>>) {
        self.ctx.portfolio = Some(portfolio);
    }

    /// The sender external clients use to marshal their callbacks onto the
    /// dispatcher's thread of control.
    pub fn input_sender(&self) -> UnboundedSender<EngineInput> {
        self.ctx.input_tx.clone()
    }

    /// Hands the input receiver to a runtime. Callable once.
    pub fn take_input_receiver(&mut self) -> Option<UnboundedReceiver<EngineInput>> {
        self.input_rx.take()
    }

    // ---===[ Lifecycle ]===---

    pub fn start(&mut self) -> Result<(), EngineError> {
        match self.state {
            LifecycleState::Created | LifecycleState::Stopped => {}
            state => {
                return Err(EngineError::Precondition(format!(
                    "cannot start from {:?}",
                    state
                )))
            }
        }
        tracing::info!("Starting strategy {}", self.ctx.strategy_id);
        self.state = LifecycleState::Running;
        self.ctx.is_running = true;
        run_hook("on_start", self.strategy.on_start(&mut self.ctx));
        Ok(())
    }

    /// Stops the strategy: cancels clock registrations, optionally flattens
    /// and cancels, then surfaces anything left behind in the ledger.
    ///
    /// Each step runs regardless of partial failure in the previous one.
    pub fn stop(&mut self) -> Result<(), EngineError> {
        if self.state != LifecycleState::Running {
            return Err(EngineError::Precondition(format!(
                "cannot stop from {:?}",
                self.state
            )));
        }
        tracing::info!("Stopping strategy {}", self.ctx.strategy_id);

        {
            let mut clock = self.ctx.clock.borrow_mut();
            clock.cancel_all_timers();
            clock.cancel_all_time_alerts();
        }

        if self.ctx.config.flatten_on_stop && !self.ctx.is_flat() {
            if let Err(e) = self.ctx.flatten_all_positions() {
                tracing::error!("Failed to flatten positions on stop: {}", e);
            }
        }

        if self.ctx.config.cancel_all_orders_on_stop {
            if let Err(e) = self.ctx.cancel_all_orders("STRATEGY_STOPPING") {
                tracing::error!("Failed to cancel orders on stop: {}", e);
            }
        }

        self.state = LifecycleState::Stopped;
        self.ctx.is_running = false;
        self.ctx.warn_residual_orders();
        run_hook("on_stop", self.strategy.on_stop(&mut self.ctx));
        Ok(())
    }

    /// Returns the engine to its created state: caches, indicators, ledger,
    /// and identifier generators all cleared. Refused while running.
    pub fn reset(&mut self) -> Result<(), EngineError> {
        if self.state == LifecycleState::Running {
            return Err(EngineError::Precondition(
                "cannot reset while running; stop first".to_string(),
            ));
        }
        tracing::info!("Resetting strategy {}", self.ctx.strategy_id);
        self.ctx.cache.reset();
        self.ctx.indicators.reset_all();
        self.ctx.order_factory.reset();
        self.ctx.position_id_generator.reset();
        self.ctx.ledger.reset();
        self.state = LifecycleState::Created;
        run_hook("on_reset", self.strategy.on_reset());
        Ok(())
    }

    /// Releases the external-client references. The strategy's own teardown
    /// errors are logged, never raised.
    pub fn dispose(&mut self) -> Result<(), EngineError> {
        match self.state {
            LifecycleState::Running => {
                return Err(EngineError::Precondition(
                    "cannot dispose while running; stop first".to_string(),
                ))
            }
            LifecycleState::Disposed => {
                return Err(EngineError::Precondition("already disposed".to_string()))
            }
            _ => {}
        }
        tracing::info!("Disposing strategy {}", self.ctx.strategy_id);
        run_hook("on_dispose", self.strategy.on_dispose());
        self.ctx.data_client = None;
        self.ctx.exec_client = None;
        self.ctx.portfolio = None;
        self.state = LifecycleState::Disposed;
        Ok(())
    }

    /// Collects the strategy's persistable state. The map is returned to the
    /// caller exactly as the strategy produced it.
    pub fn save(&mut self) -> StateMap {
        match self.strategy.on_save() {
            Ok(state) => state,
            Err(e) => {
                tracing::error!("user hook `on_save` failed: {:#}", e);
                StateMap::new()
            }
        }
    }

    pub fn load(&mut self, state: StateMap) {
        run_hook("on_load", self.strategy.on_load(state));
    }

    // ---===[ Dispatcher ]===---

    pub fn dispatch(&mut self, input: EngineInput) {
        match input {
            EngineInput::Tick(tick) => self.handle_tick(tick),
            EngineInput::Bar(bar_type, bar) => self.handle_bar(bar_type, bar),
            EngineInput::Instrument(instrument) => self.handle_instrument(instrument),
            EngineInput::Event(event) => self.handle_event(event),
        }
    }

    pub fn handle_tick(&mut self, tick: Tick) {
        self.ctx.cache.handle_tick(tick.clone());
        if self.ctx.is_running {
            run_hook("on_tick", self.strategy.on_tick(&mut self.ctx, &tick));
        }
    }

    /// Indicators are fed before `on_bar` so the hook reads values consistent
    /// with the bar it receives.
    pub fn handle_bar(&mut self, bar_type: BarType, bar: Bar) {
        self.ctx.cache.handle_bar(bar_type.clone(), bar.clone());
        self.ctx.indicators.update_for_bar(&bar_type, &bar);
        if self.ctx.is_running {
            run_hook(
                "on_bar",
                self.strategy.on_bar(&mut self.ctx, &bar_type, &bar),
            );
        }
    }

    pub fn handle_instrument(&mut self, instrument: Instrument) {
        if self.ctx.is_running {
            run_hook(
                "on_instrument",
                self.strategy.on_instrument(&mut self.ctx, &instrument),
            );
        }
    }

    /// The reducer is applied before `on_event` so the hook observes the
    /// ledger state that resulted from the event.
    pub fn handle_event(&mut self, event: Event) {
        self.ctx.apply_event(&event);
        if self.ctx.is_running {
            run_hook("on_event", self.strategy.on_event(&mut self.ctx, &event));
        }
    }

    /// Swaps in a different clock and rebuilds the order factory and position
    /// id generator against it. Intended for backtest iteration only.
    pub fn change_clock(&mut self, clock: Rc<RefCell<dyn Clock>>) -> Result<(), EngineError> {
        register_time_handler(&clock, &self.ctx.input_tx);
        self.ctx.order_factory = OrderFactory::new(
            &self.ctx.id_tag_trader,
            &self.ctx.id_tag_strategy,
            clock.clone(),
        )?;
        self.ctx.position_id_generator = PositionIdGenerator::new(
            &self.ctx.id_tag_trader,
            &self.ctx.id_tag_strategy,
            clock.clone(),
        )?;
        self.ctx.clock = clock;
        Ok(())
    }
}

fn register_time_handler(clock: &Rc<RefCell<dyn Clock>>, input_tx: &UnboundedSender<EngineInput>) {
    let tx = input_tx.clone();
    clock
        .borrow_mut()
        .register_handler(Arc::new(move |event: TimeEvent| {
            let _ = tx.send(EngineInput::Event(Event::Time(event)));
        }));
}

fn run_hook(name: &str, result: anyhow::Result<()>) {
    if let Err(e) = result {
        tracing::error!("user hook `{}` failed: {:#}", name, e);
    }
}
