//! The two ways the dispatcher is driven: a live loop draining one channel of
//! external input, and a deterministic backtest iterator over a virtual clock.

use std::cell::RefCell;
use std::rc::Rc;

use chrono::{DateTime, Utc};
use core_types::{Bar, BarType, Instrument, Tick};
use events::Event;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::sync::oneshot;

use crate::clock::TestClock;
use crate::error::EngineError;
use crate::host::StrategyEngine;

/// The single serialized stream of external-world input. Ticks, bars, timer
/// fires, and execution reports all arrive through this union, so every event
/// is processed atomically in arrival order.
#[derive(Debug, Clone)]
pub enum EngineInput {
    Tick(Tick),
    Bar(BarType, Bar),
    Instrument(Instrument),
    Event(Event),
}

/// Signals a running [`LiveRuntime`] to finish draining and return.
pub struct ShutdownSignal(oneshot::Sender<()>);

impl ShutdownSignal {
    pub fn shutdown(self) {
        let _ = self.0.send(());
    }
}

/// Wraps the dispatcher as a task that drains the engine's input channel.
///
/// The engine itself never suspends; the only await point is the channel
/// receive between events. The engine keeps an input sender of its own for
/// clock and subscription callbacks, so termination comes from the
/// [`ShutdownSignal`] rather than channel closure.
pub struct LiveRuntime {
    engine: StrategyEngine,
    input_rx: UnboundedReceiver<EngineInput>,
    shutdown_rx: oneshot::Receiver<()>,
}

impl LiveRuntime {
    pub fn new(mut engine: StrategyEngine) -> Result<(Self, ShutdownSignal), EngineError> {
        let input_rx = engine.take_input_receiver().ok_or_else(|| {
            EngineError::Precondition("engine input receiver already taken".to_string())
        })?;
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        Ok((
            Self {
                engine,
                input_rx,
                shutdown_rx,
            },
            ShutdownSignal(shutdown_tx),
        ))
    }

    /// Runs until shut down, then returns the engine. Input queued before the
    /// shutdown signal is drained first.
    pub async fn run(mut self) -> StrategyEngine {
        loop {
            tokio::select! {
                biased;
                input = self.input_rx.recv() => match input {
                    Some(input) => self.engine.dispatch(input),
                    None => break,
                },
                _ = &mut self.shutdown_rx => break,
            }
        }
        tracing::info!("Live runtime finished");
        self.engine
    }
}

/// Drives the engine deterministically from historical data.
///
/// For every tick or bar the runner advances the virtual clock first, so
/// timer and alert fires interleave with market data exactly as their
/// timestamps dictate, and replaying the same inputs reproduces the same
/// outbound command sequence.
pub struct BacktestRunner {
    engine: StrategyEngine,
    clock: Rc<RefCell<TestClock>>,
    input_rx: UnboundedReceiver<EngineInput>,
}

impl BacktestRunner {
    pub fn new(
        mut engine: StrategyEngine,
        clock: Rc<RefCell<TestClock>>,
    ) -> Result<Self, EngineError> {
        let input_rx = engine.take_input_receiver().ok_or_else(|| {
            EngineError::Precondition("engine input receiver already taken".to_string())
        })?;
        Ok(Self {
            engine,
            clock,
            input_rx,
        })
    }

    /// Advances virtual time to `to`. Timer and alert fires reach the engine
    /// through its input channel, which is drained here.
    pub fn advance_to(&mut self, to: DateTime<Utc>) {
        let _ = self.clock.borrow_mut().iterate_time(to);
        self.drain_pending();
    }

    pub fn process_tick(&mut self, tick: Tick) {
        self.advance_to(tick.timestamp);
        self.engine.handle_tick(tick);
        self.drain_pending();
    }

    pub fn process_bar(&mut self, bar_type: BarType, bar: Bar) {
        self.advance_to(bar.timestamp);
        self.engine.handle_bar(bar_type, bar);
        self.drain_pending();
    }

    pub fn process_event(&mut self, event: Event) {
        self.engine.handle_event(event);
        self.drain_pending();
    }

    /// Dispatches anything clients pushed onto the input channel during the
    /// previous step (fill reports, subscription callbacks).
    fn drain_pending(&mut self) {
        while let Ok(input) = self.input_rx.try_recv() {
            self.engine.dispatch(input);
        }
    }

    pub fn engine(&self) -> &StrategyEngine {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut StrategyEngine {
        &mut self.engine
    }

    pub fn into_engine(self) -> StrategyEngine {
        self.engine
    }
}
