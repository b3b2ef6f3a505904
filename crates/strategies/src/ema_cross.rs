//! EMA-cross strategy with ATR-sized protective stops.
//!
//! A buy entry fires when the fast EMA crosses above the slow EMA; a sell
//! entry when it crosses below. Every entry is submitted atomically with a
//! stop-loss one ATR multiple from the close and a take-profit at twice that
//! distance. An opposite-direction cross while entered flattens first.

use std::cell::RefCell;
use std::rc::Rc;

use core_types::{Bar, BarType, OrderSide, Symbol};
use engine::host::StrategyContext;
use engine::indicators::PriceSource;
use engine::strategy::{StateMap, Strategy};
use rust_decimal::Decimal;

use crate::error::StrategyError;
use crate::indicators::{Atr, Ema};

#[derive(Debug, Clone)]
pub struct EmaCrossParams {
    pub fast_period: usize,
    pub slow_period: usize,
    pub atr_period: usize,
    pub atr_multiple: Decimal,
    pub quantity: Decimal,
}

pub struct EmaCross {
    symbol: Symbol,
    bar_type: BarType,
    quantity: Decimal,
    atr_multiple: Decimal,
    fast: Rc<RefCell<Ema>>,
    slow: Rc<RefCell<Ema>>,
    atr: Rc<RefCell<Atr>>,
    // State: previous EMA values, to detect the crossover event itself.
    prev_fast: Option<Decimal>,
    prev_slow: Option<Decimal>,
}

impl EmaCross {
    pub fn new(params: EmaCrossParams, bar_type: BarType) -> Result<Self, StrategyError> {
        if params.fast_period >= params.slow_period {
            return Err(StrategyError::InvalidParameters(
                "Fast EMA period must be less than slow EMA period".to_string(),
            ));
        }
        if params.quantity <= Decimal::ZERO {
            return Err(StrategyError::InvalidParameters(
                "Quantity must be positive".to_string(),
            ));
        }
        if params.atr_multiple <= Decimal::ZERO {
            return Err(StrategyError::InvalidParameters(
                "ATR multiple must be positive".to_string(),
            ));
        }

        Ok(Self {
            symbol: bar_type.symbol.clone(),
            bar_type,
            quantity: params.quantity,
            atr_multiple: params.atr_multiple,
            fast: Rc::new(RefCell::new(Ema::new(
                params.fast_period,
                PriceSource::Close,
            )?)),
            slow: Rc::new(RefCell::new(Ema::new(
                params.slow_period,
                PriceSource::Close,
            )?)),
            atr: Rc::new(RefCell::new(Atr::new(params.atr_period)?)),
            prev_fast: None,
            prev_slow: None,
        })
    }

    fn enter(
        &mut self,
        ctx: &mut StrategyContext,
        side: OrderSide,
        close: Decimal,
    ) -> anyhow::Result<()> {
        let risk = self.atr.borrow().value() * self.atr_multiple;
        let (stop_loss_price, take_profit_price) = match side {
            OrderSide::Buy => (close - risk, close + risk * Decimal::TWO),
            OrderSide::Sell => (close + risk, close - risk * Decimal::TWO),
        };

        let position_id = ctx.generate_position_id()?;
        let atomic = ctx.order_factory().atomic(
            self.symbol.clone(),
            side,
            self.quantity,
            stop_loss_price,
            Some(take_profit_price),
        )?;
        tracing::info!(
            "EMA cross {:?} entry at {} (stop {}, target {})",
            side,
            close,
            stop_loss_price,
            take_profit_price
        );
        ctx.submit_atomic_order(atomic, position_id)?;
        Ok(())
    }
}

impl Strategy for EmaCross {
    fn on_start(&mut self, ctx: &mut StrategyContext) -> anyhow::Result<()> {
        ctx.register_indicator(self.bar_type.clone(), self.fast.clone());
        ctx.register_indicator(self.bar_type.clone(), self.slow.clone());
        ctx.register_indicator(self.bar_type.clone(), self.atr.clone());
        ctx.subscribe_bars(&self.bar_type);
        ctx.subscribe_ticks(&self.symbol);
        Ok(())
    }

    fn on_bar(
        &mut self,
        ctx: &mut StrategyContext,
        bar_type: &BarType,
        bar: &Bar,
    ) -> anyhow::Result<()> {
        if *bar_type != self.bar_type {
            return Ok(());
        }
        if !ctx.indicators_initialized(bar_type)? {
            return Ok(());
        }

        let current_fast = self.fast.borrow().value();
        let current_slow = self.slow.borrow().value();

        if let (Some(prev_fast), Some(prev_slow)) = (self.prev_fast, self.prev_slow) {
            let is_bullish_cross = prev_fast <= prev_slow && current_fast > current_slow;
            let is_bearish_cross = prev_fast >= prev_slow && current_fast < current_slow;

            if is_bullish_cross || is_bearish_cross {
                let side = if is_bullish_cross {
                    OrderSide::Buy
                } else {
                    OrderSide::Sell
                };
                if !ctx.is_flat() {
                    tracing::info!("Opposite cross while entered; flattening first");
                    ctx.flatten_all_positions()?;
                }
                self.enter(ctx, side, bar.close)?;
            }
        }

        self.prev_fast = Some(current_fast);
        self.prev_slow = Some(current_slow);
        Ok(())
    }

    fn on_stop(&mut self, _ctx: &mut StrategyContext) -> anyhow::Result<()> {
        tracing::info!("EMA cross strategy stopped");
        Ok(())
    }

    fn on_reset(&mut self) -> anyhow::Result<()> {
        self.prev_fast = None;
        self.prev_slow = None;
        Ok(())
    }

    fn on_save(&mut self) -> anyhow::Result<StateMap> {
        let mut state = StateMap::new();
        state.insert("prev_fast".to_string(), serde_json::to_value(self.prev_fast)?);
        state.insert("prev_slow".to_string(), serde_json::to_value(self.prev_slow)?);
        Ok(state)
    }

    fn on_load(&mut self, state: StateMap) -> anyhow::Result<()> {
        if let Some(value) = state.get("prev_fast") {
            self.prev_fast = serde_json::from_value(value.clone())?;
        }
        if let Some(value) = state.get("prev_slow") {
            self.prev_slow = serde_json::from_value(value.clone())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use engine::testing::{audusd_1min_bid, bar_with_close, test_harness};
    use engine::StrategyConfig;
    use events::Command;
    use rust_decimal_macros::dec;

    use super::*;

    fn params() -> EmaCrossParams {
        EmaCrossParams {
            fast_period: 2,
            slow_period: 4,
            atr_period: 2,
            atr_multiple: dec!(2),
            quantity: dec!(100000),
        }
    }

    #[test]
    fn rejects_fast_period_not_below_slow() {
        let bad = EmaCrossParams {
            fast_period: 4,
            slow_period: 4,
            ..params()
        };
        assert!(EmaCross::new(bad, audusd_1min_bid()).is_err());
    }

    #[test]
    fn bullish_cross_submits_an_atomic_buy() {
        let strategy = EmaCross::new(params(), audusd_1min_bid()).unwrap();
        let mut harness = test_harness(Box::new(strategy), StrategyConfig::default());
        harness.engine.start().unwrap();

        // Warm up on a falling series so the fast EMA sits below the slow.
        let mut minute = 0;
        for close in [dec!(1.10), dec!(1.08), dec!(1.06), dec!(1.04), dec!(1.02)] {
            harness
                .engine
                .handle_bar(audusd_1min_bid(), bar_with_close(close, minute));
            minute += 1;
        }
        assert!(harness.exec.borrow().commands.is_empty());

        // A sharp rally drags the fast EMA above the slow.
        for close in [dec!(1.10), dec!(1.15)] {
            harness
                .engine
                .handle_bar(audusd_1min_bid(), bar_with_close(close, minute));
            minute += 1;
        }

        let exec = harness.exec.borrow();
        let atomic = exec
            .commands
            .iter()
            .find_map(|c| match c {
                Command::SubmitAtomicOrder(c) => Some(c.atomic_order.clone()),
                _ => None,
            })
            .expect("no atomic order submitted");
        assert_eq!(atomic.entry.side, OrderSide::Buy);
        assert_eq!(atomic.stop_loss.side, OrderSide::Sell);
        assert!(atomic.take_profit.is_some());
        // Entry fired on the 1.10 crossover bar; the stop sits below it.
        assert!(atomic.stop_loss.price.unwrap() < dec!(1.10));
        assert!(atomic.take_profit.as_ref().unwrap().price.unwrap() > dec!(1.10));
    }

    #[test]
    fn save_and_load_round_trip_crossover_state() {
        let mut strategy = EmaCross::new(params(), audusd_1min_bid()).unwrap();
        strategy.prev_fast = Some(dec!(1.05));
        strategy.prev_slow = Some(dec!(1.04));

        let state = strategy.on_save().unwrap();
        let mut restored = EmaCross::new(params(), audusd_1min_bid()).unwrap();
        restored.on_load(state).unwrap();
        assert_eq!(restored.prev_fast, Some(dec!(1.05)));
        assert_eq!(restored.prev_slow, Some(dec!(1.04)));
    }
}
