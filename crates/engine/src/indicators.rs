//! The indicator registry: bar-type → ordered indicator bindings.
//!
//! Indicators are shared between the strategy (which reads values through its
//! own handle) and the registry (which feeds bars and tracks warm-up), so
//! bindings hold `Rc<RefCell<dyn Indicator>>`.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use core_types::{Bar, BarType};
use rust_decimal::Decimal;

use crate::error::EngineError;

/// A stateful transform over a bar stream.
pub trait Indicator {
    fn name(&self) -> &str;

    /// True once enough bars have been seen for the value to be meaningful.
    fn initialized(&self) -> bool;

    fn update(&mut self, bar: &Bar);

    fn reset(&mut self);
}

/// Selects the bar field an indicator is fed from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PriceSource {
    Open,
    High,
    Low,
    Close,
    Mid,
}

impl PriceSource {
    pub fn extract(&self, bar: &Bar) -> Decimal {
        match self {
            PriceSource::Open => bar.open,
            PriceSource::High => bar.high,
            PriceSource::Low => bar.low,
            PriceSource::Close => bar.close,
            PriceSource::Mid => (bar.high + bar.low) / Decimal::TWO,
        }
    }
}

/// Binds one indicator to a bar stream and counts the bars delivered to it.
struct IndicatorUpdater {
    indicator: Rc<RefCell<dyn Indicator>>,
    update_count: usize,
}

impl IndicatorUpdater {
    fn update(&mut self, bar: &Bar) {
        self.update_count += 1;
        self.indicator.borrow_mut().update(bar);
    }

    /// A full reset cascades through the indicator and the bar count.
    fn reset(&mut self) {
        self.update_count = 0;
        self.indicator.borrow_mut().reset();
    }
}

#[derive(Default)]
pub struct IndicatorRegistry {
    bindings: HashMap<BarType, Vec<IndicatorUpdater>>,
}

impl IndicatorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, bar_type: BarType, indicator: Rc<RefCell<dyn Indicator>>) {
        self.bindings
            .entry(bar_type)
            .or_default()
            .push(IndicatorUpdater {
                indicator,
                update_count: 0,
            });
    }

    /// Feeds `bar` to every indicator bound to `bar_type`. Unknown bar types
    /// are a no-op: delivery precedes registration during warm-up.
    pub fn update_for_bar(&mut self, bar_type: &BarType, bar: &Bar) {
        if let Some(updaters) = self.bindings.get_mut(bar_type) {
            for updater in updaters.iter_mut() {
                updater.update(bar);
            }
        }
    }

    /// A copy of the indicator handles bound to `bar_type`.
    pub fn indicators(&self, bar_type: &BarType) -> Result<Vec<Rc<RefCell<dyn Indicator>>>, EngineError> {
        Ok(self
            .updaters(bar_type)?
            .iter()
            .map(|u| u.indicator.clone())
            .collect())
    }

    pub fn update_counts(&self, bar_type: &BarType) -> Result<Vec<usize>, EngineError> {
        Ok(self.updaters(bar_type)?.iter().map(|u| u.update_count).collect())
    }

    /// True iff every indicator bound to `bar_type` reports initialized.
    pub fn initialized(&self, bar_type: &BarType) -> Result<bool, EngineError> {
        Ok(self
            .updaters(bar_type)?
            .iter()
            .all(|u| u.indicator.borrow().initialized()))
    }

    /// Folds [`IndicatorRegistry::initialized`] across all registered bar types.
    pub fn initialized_all(&self) -> bool {
        self.bindings
            .values()
            .flatten()
            .all(|u| u.indicator.borrow().initialized())
    }

    pub fn bar_types(&self) -> Vec<BarType> {
        self.bindings.keys().cloned().collect()
    }

    pub fn reset_all(&mut self) {
        for updaters in self.bindings.values_mut() {
            for updater in updaters.iter_mut() {
                updater.reset();
            }
        }
    }

    fn updaters(&self, bar_type: &BarType) -> Result<&Vec<IndicatorUpdater>, EngineError> {
        self.bindings.get(bar_type).ok_or_else(|| {
            EngineError::Lookup(format!("no indicators registered for {}", bar_type))
        })
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use core_types::{BarSpecification, PriceType, Resolution, Symbol};
    use rust_decimal_macros::dec;

    use super::*;

    struct CountingIndicator {
        updates: usize,
        warmup: usize,
    }

    impl Indicator for CountingIndicator {
        fn name(&self) -> &str {
            "Counting"
        }

        fn initialized(&self) -> bool {
            self.updates >= self.warmup
        }

        fn update(&mut self, _bar: &Bar) {
            self.updates += 1;
        }

        fn reset(&mut self) {
            self.updates = 0;
        }
    }

    fn bar_type() -> BarType {
        BarType::new(
            Symbol::new("AUDUSD", "FXCM").unwrap(),
            BarSpecification::new(1, Resolution::Minute, PriceType::Bid).unwrap(),
        )
    }

    fn bar() -> Bar {
        Bar::new(
            dec!(1.0),
            dec!(1.1),
            dec!(0.9),
            dec!(1.05),
            dec!(1000),
            Utc.with_ymd_and_hms(2020, 3, 14, 9, 0, 0).unwrap(),
        )
        .unwrap()
    }

    #[test]
    fn update_counts_track_delivered_bars() {
        let mut registry = IndicatorRegistry::new();
        let bt = bar_type();
        let indicator = Rc::new(RefCell::new(CountingIndicator {
            updates: 0,
            warmup: 2,
        }));
        registry.register(bt.clone(), indicator.clone());

        for _ in 0..3 {
            registry.update_for_bar(&bt, &bar());
        }
        assert_eq!(registry.update_counts(&bt).unwrap(), vec![3]);
        assert_eq!(indicator.borrow().updates, 3);
    }

    #[test]
    fn initialized_requires_every_binding() {
        let mut registry = IndicatorRegistry::new();
        let bt = bar_type();
        registry.register(
            bt.clone(),
            Rc::new(RefCell::new(CountingIndicator {
                updates: 0,
                warmup: 1,
            })),
        );
        registry.register(
            bt.clone(),
            Rc::new(RefCell::new(CountingIndicator {
                updates: 0,
                warmup: 2,
            })),
        );

        registry.update_for_bar(&bt, &bar());
        assert!(!registry.initialized(&bt).unwrap());
        assert!(!registry.initialized_all());

        registry.update_for_bar(&bt, &bar());
        assert!(registry.initialized(&bt).unwrap());
        assert!(registry.initialized_all());
    }

    #[test]
    fn reset_cascades_to_indicator_and_count() {
        let mut registry = IndicatorRegistry::new();
        let bt = bar_type();
        let indicator = Rc::new(RefCell::new(CountingIndicator {
            updates: 0,
            warmup: 1,
        }));
        registry.register(bt.clone(), indicator.clone());
        registry.update_for_bar(&bt, &bar());

        registry.reset_all();
        assert_eq!(registry.update_counts(&bt).unwrap(), vec![0]);
        assert_eq!(indicator.borrow().updates, 0);
        assert!(!registry.initialized(&bt).unwrap());
    }

    #[test]
    fn unknown_bar_type_is_a_lookup_error() {
        let registry = IndicatorRegistry::new();
        assert!(matches!(
            registry.initialized(&bar_type()),
            Err(EngineError::Lookup(_))
        ));
    }

    #[test]
    fn price_source_extracts_the_selected_field() {
        let bar = bar();
        assert_eq!(PriceSource::Close.extract(&bar), dec!(1.05));
        assert_eq!(PriceSource::Mid.extract(&bar), dec!(1.0));
    }
}
