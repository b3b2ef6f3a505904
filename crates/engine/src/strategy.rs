//! The user-strategy hook surface.
//!
//! A strategy is a capability set, not a class hierarchy: the host holds a
//! `Box<dyn Strategy>` and invokes these hooks through the trait while the
//! engine is running. Every hook has a default no-op implementation, so a
//! strategy overrides only what it needs.
//!
//! Hook failures are isolated: the host catches the returned error, logs it
//! with the hook name, and carries on in its current lifecycle state. A bug in
//! strategy code must never take down the runtime.

use std::collections::HashMap;

use core_types::{Bar, BarType, Instrument, Tick};
use events::Event;

use crate::host::StrategyContext;

/// The opaque key→value map round-tripped through `on_save` / `on_load`.
/// The format is strategy-defined; the engine never interprets it.
pub type StateMap = HashMap<String, serde_json::Value>;

#[allow(unused_variables)]
pub trait Strategy {
    /// Called once when the host starts, after `is_running` becomes true.
    fn on_start(&mut self, ctx: &mut StrategyContext) -> anyhow::Result<()> {
        Ok(())
    }

    /// Called for every tick delivered while running, after the tick cache
    /// has been updated.
    fn on_tick(&mut self, ctx: &mut StrategyContext, tick: &Tick) -> anyhow::Result<()> {
        Ok(())
    }

    /// Called for every bar delivered while running, after the bar cache and
    /// all bound indicators have been updated.
    fn on_bar(
        &mut self,
        ctx: &mut StrategyContext,
        bar_type: &BarType,
        bar: &Bar,
    ) -> anyhow::Result<()> {
        Ok(())
    }

    fn on_instrument(
        &mut self,
        ctx: &mut StrategyContext,
        instrument: &Instrument,
    ) -> anyhow::Result<()> {
        Ok(())
    }

    /// Called for every event delivered while running, after the order-event
    /// reducer has applied it to the ledger.
    fn on_event(&mut self, ctx: &mut StrategyContext, event: &Event) -> anyhow::Result<()> {
        Ok(())
    }

    /// Called at the end of the stop sequence, after flattening, cancels, and
    /// residual warnings.
    fn on_stop(&mut self, ctx: &mut StrategyContext) -> anyhow::Result<()> {
        Ok(())
    }

    /// Called after the engine has cleared its caches, indicators, ledger,
    /// and identifier generators.
    fn on_reset(&mut self) -> anyhow::Result<()> {
        Ok(())
    }

    /// Returns the strategy's state for persistence. The engine round-trips
    /// whatever is returned, unchanged.
    fn on_save(&mut self) -> anyhow::Result<StateMap> {
        Ok(StateMap::new())
    }

    fn on_load(&mut self, state: StateMap) -> anyhow::Result<()> {
        Ok(())
    }

    fn on_dispose(&mut self) -> anyhow::Result<()> {
        Ok(())
    }
}
