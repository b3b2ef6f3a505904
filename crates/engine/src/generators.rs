//! Monotonic identifier generators for orders and positions.
//!
//! Generated values embed the clock's date and time, so identifiers are unique
//! at the trader level: the counter disambiguates within a second, the
//! datetime component across seconds.

use std::cell::RefCell;
use std::rc::Rc;

use crate::clock::Clock;
use crate::error::EngineError;

use core_types::{OrderId, PositionId};

pub struct IdGenerator {
    prefix: String,
    id_tag_trader: String,
    id_tag_strategy: String,
    clock: Rc<RefCell<dyn Clock>>,
    counter: usize,
}

impl IdGenerator {
    pub fn new(
        prefix: impl Into<String>,
        id_tag_trader: impl Into<String>,
        id_tag_strategy: impl Into<String>,
        clock: Rc<RefCell<dyn Clock>>,
    ) -> Result<Self, EngineError> {
        let prefix = prefix.into();
        let id_tag_trader = id_tag_trader.into();
        let id_tag_strategy = id_tag_strategy.into();
        for (name, value) in [
            ("prefix", &prefix),
            ("id_tag_trader", &id_tag_trader),
            ("id_tag_strategy", &id_tag_strategy),
        ] {
            if value.trim().is_empty() {
                return Err(EngineError::Precondition(format!(
                    "identifier generator {} must be non-empty",
                    name
                )));
            }
        }
        Ok(Self {
            prefix,
            id_tag_trader,
            id_tag_strategy,
            clock,
            counter: 0,
        })
    }

    pub fn generate(&mut self) -> String {
        self.counter += 1;
        let now = self.clock.borrow().time_now();
        format!(
            "{}-{}-{}-{}-{}-{}",
            self.prefix,
            now.format("%Y%m%d"),
            now.format("%H%M%S"),
            self.id_tag_trader,
            self.id_tag_strategy,
            self.counter
        )
    }

    pub fn counter(&self) -> usize {
        self.counter
    }

    pub fn reset(&mut self) {
        self.counter = 0;
    }
}

pub struct OrderIdGenerator {
    inner: IdGenerator,
}

impl OrderIdGenerator {
    pub fn new(
        id_tag_trader: impl Into<String>,
        id_tag_strategy: impl Into<String>,
        clock: Rc<RefCell<dyn Clock>>,
    ) -> Result<Self, EngineError> {
        Ok(Self {
            inner: IdGenerator::new("O", id_tag_trader, id_tag_strategy, clock)?,
        })
    }

    pub fn generate(&mut self) -> Result<OrderId, EngineError> {
        Ok(OrderId::new(self.inner.generate())?)
    }

    pub fn counter(&self) -> usize {
        self.inner.counter()
    }

    pub fn reset(&mut self) {
        self.inner.reset();
    }
}

pub struct PositionIdGenerator {
    inner: IdGenerator,
}

impl PositionIdGenerator {
    pub fn new(
        id_tag_trader: impl Into<String>,
        id_tag_strategy: impl Into<String>,
        clock: Rc<RefCell<dyn Clock>>,
    ) -> Result<Self, EngineError> {
        Ok(Self {
            inner: IdGenerator::new("P", id_tag_trader, id_tag_strategy, clock)?,
        })
    }

    pub fn generate(&mut self) -> Result<PositionId, EngineError> {
        Ok(PositionId::new(self.inner.generate())?)
    }

    pub fn reset(&mut self) {
        self.inner.reset();
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use crate::clock::TestClock;

    use super::*;

    fn fixed_clock() -> Rc<RefCell<TestClock>> {
        Rc::new(RefCell::new(TestClock::new(
            Utc.with_ymd_and_hms(2020, 3, 14, 9, 26, 53).unwrap(),
        )))
    }

    #[test]
    fn order_ids_follow_the_tagged_format() {
        let clock = fixed_clock();
        let mut generator = OrderIdGenerator::new("000", "EMA-001", clock).unwrap();

        assert_eq!(
            generator.generate().unwrap().as_str(),
            "O-20200314-092653-000-EMA-001-1"
        );
        assert_eq!(
            generator.generate().unwrap().as_str(),
            "O-20200314-092653-000-EMA-001-2"
        );
        assert_eq!(
            generator.generate().unwrap().as_str(),
            "O-20200314-092653-000-EMA-001-3"
        );
    }

    #[test]
    fn position_ids_use_the_p_prefix() {
        let clock = fixed_clock();
        let mut generator = PositionIdGenerator::new("000", "EMA-001", clock).unwrap();
        assert_eq!(
            generator.generate().unwrap().as_str(),
            "P-20200314-092653-000-EMA-001-1"
        );
    }

    #[test]
    fn generated_ids_are_distinct_and_counter_increases() {
        let clock = fixed_clock();
        let mut generator = OrderIdGenerator::new("000", "EMA-001", clock).unwrap();
        let ids: Vec<String> = (0..50)
            .map(|_| generator.generate().unwrap().to_string())
            .collect();
        let mut unique = ids.clone();
        unique.sort();
        unique.dedup();
        assert_eq!(unique.len(), ids.len());
        assert_eq!(generator.counter(), 50);
    }

    #[test]
    fn reset_zeroes_the_counter() {
        let clock = fixed_clock();
        let mut generator = OrderIdGenerator::new("000", "EMA-001", clock).unwrap();
        generator.generate().unwrap();
        generator.reset();
        assert_eq!(
            generator.generate().unwrap().as_str(),
            "O-20200314-092653-000-EMA-001-1"
        );
    }

    #[test]
    fn empty_tags_are_rejected() {
        let clock = fixed_clock();
        assert!(OrderIdGenerator::new("", "EMA-001", clock.clone()).is_err());
        assert!(OrderIdGenerator::new("000", "  ", clock).is_err());
    }
}
