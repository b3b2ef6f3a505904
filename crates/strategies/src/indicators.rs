//! Indicator adapters over the `ta` crate.
//!
//! The `ta` crate works in `f64`. We convert from our high-precision
//! `Decimal` at this boundary only; this is a controlled and accepted
//! precision trade-off for using the library. Warm-up is tracked here because
//! `ta` indicators emit values from the first input onwards.

use core_types::Bar;
use engine::indicators::{Indicator, PriceSource};
use rust_decimal::prelude::*;
use ta::indicators::{AverageTrueRange, ExponentialMovingAverage};
use ta::{DataItem, Next, Reset};

use crate::error::StrategyError;

/// Exponential moving average over a chosen bar field.
pub struct Ema {
    label: String,
    period: usize,
    source: PriceSource,
    inner: ExponentialMovingAverage,
    count: usize,
    value: Decimal,
}

impl Ema {
    pub fn new(period: usize, source: PriceSource) -> Result<Self, StrategyError> {
        let inner = ExponentialMovingAverage::new(period)
            .map_err(|e| StrategyError::InvalidParameters(e.to_string()))?;
        Ok(Self {
            label: format!("EMA({})", period),
            period,
            source,
            inner,
            count: 0,
            value: Decimal::ZERO,
        })
    }

    pub fn value(&self) -> Decimal {
        self.value
    }

    pub fn count(&self) -> usize {
        self.count
    }
}

impl Indicator for Ema {
    fn name(&self) -> &str {
        &self.label
    }

    fn initialized(&self) -> bool {
        self.count >= self.period
    }

    fn update(&mut self, bar: &Bar) {
        let input = self.source.extract(bar).to_f64().unwrap();
        self.count += 1;
        self.value = Decimal::from_f64(self.inner.next(input)).unwrap();
    }

    fn reset(&mut self) {
        self.inner.reset();
        self.count = 0;
        self.value = Decimal::ZERO;
    }
}

/// Average true range over full OHLC bars.
pub struct Atr {
    label: String,
    period: usize,
    inner: AverageTrueRange,
    count: usize,
    value: Decimal,
}

impl Atr {
    pub fn new(period: usize) -> Result<Self, StrategyError> {
        let inner = AverageTrueRange::new(period)
            .map_err(|e| StrategyError::InvalidParameters(e.to_string()))?;
        Ok(Self {
            label: format!("ATR({})", period),
            period,
            inner,
            count: 0,
            value: Decimal::ZERO,
        })
    }

    pub fn value(&self) -> Decimal {
        self.value
    }
}

impl Indicator for Atr {
    fn name(&self) -> &str {
        &self.label
    }

    fn initialized(&self) -> bool {
        self.count >= self.period
    }

    fn update(&mut self, bar: &Bar) {
        let item = DataItem::builder()
            .open(bar.open.to_f64().unwrap())
            .high(bar.high.to_f64().unwrap())
            .low(bar.low.to_f64().unwrap())
            .close(bar.close.to_f64().unwrap())
            .volume(bar.volume.to_f64().unwrap())
            .build();
        let item = match item {
            Ok(item) => item,
            Err(e) => {
                tracing::error!("ATR skipped malformed bar: {}", e);
                return;
            }
        };
        self.count += 1;
        self.value = Decimal::from_f64(self.inner.next(&item)).unwrap();
    }

    fn reset(&mut self) {
        self.inner.reset();
        self.count = 0;
        self.value = Decimal::ZERO;
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use rust_decimal_macros::dec;

    use super::*;

    fn bar(open: Decimal, high: Decimal, low: Decimal, close: Decimal) -> Bar {
        Bar::new(
            open,
            high,
            low,
            close,
            dec!(100000),
            Utc.with_ymd_and_hms(2020, 3, 14, 9, 26, 53).unwrap(),
        )
        .unwrap()
    }

    fn flat_bar(close: Decimal) -> Bar {
        bar(close, close, close, close)
    }

    #[test]
    fn ema_initializes_after_period_bars() {
        let mut ema = Ema::new(10, PriceSource::Close).unwrap();
        for _ in 0..9 {
            ema.update(&flat_bar(dec!(1.0)));
        }
        assert!(!ema.initialized());

        ema.update(&flat_bar(dec!(1.0)));
        assert!(ema.initialized());
    }

    #[test]
    fn ema_of_constant_series_is_the_constant() {
        let mut ema = Ema::new(3, PriceSource::Close).unwrap();
        for _ in 0..10 {
            ema.update(&flat_bar(dec!(100)));
        }
        assert_eq!(ema.value(), dec!(100));
    }

    #[test]
    fn ema_reset_clears_warmup_and_value() {
        let mut ema = Ema::new(3, PriceSource::Close).unwrap();
        for _ in 0..3 {
            ema.update(&flat_bar(dec!(1.0)));
        }
        assert!(ema.initialized());

        ema.reset();
        assert!(!ema.initialized());
        assert_eq!(ema.count(), 0);
        assert_eq!(ema.value(), Decimal::ZERO);
    }

    #[test]
    fn ema_zero_period_is_rejected() {
        assert!(Ema::new(0, PriceSource::Close).is_err());
    }

    #[test]
    fn atr_tracks_bar_range() {
        let mut atr = Atr::new(3).unwrap();
        for _ in 0..5 {
            atr.update(&bar(dec!(1.0), dec!(1.2), dec!(0.8), dec!(1.0)));
        }
        assert!(atr.initialized());
        // Constant true range converges on the range itself.
        assert!((atr.value() - dec!(0.4)).abs() < dec!(0.01));
    }

    #[test]
    fn atr_initializes_after_period_bars() {
        let mut atr = Atr::new(4).unwrap();
        for _ in 0..3 {
            atr.update(&bar(dec!(1.0), dec!(1.1), dec!(0.9), dec!(1.0)));
        }
        assert!(!atr.initialized());
        atr.update(&bar(dec!(1.0), dec!(1.1), dec!(0.9), dec!(1.0)));
        assert!(atr.initialized());
    }
}
