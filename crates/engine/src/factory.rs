//! Order construction.
//!
//! The factory is the only place orders are born: it stamps each order with a
//! generated identifier and the clock's current time, and derives the child
//! legs of atomic orders so their sides can never disagree with the entry.

use std::cell::RefCell;
use std::rc::Rc;

use chrono::{DateTime, Utc};
use core_types::{
    AtomicOrder, Order, OrderPurpose, OrderSide, OrderType, Symbol, TimeInForce,
};
use rust_decimal::Decimal;

use crate::clock::Clock;
use crate::error::EngineError;
use crate::generators::OrderIdGenerator;

pub struct OrderFactory {
    id_generator: OrderIdGenerator,
    clock: Rc<RefCell<dyn Clock>>,
}

impl OrderFactory {
    pub fn new(
        id_tag_trader: impl Into<String>,
        id_tag_strategy: impl Into<String>,
        clock: Rc<RefCell<dyn Clock>>,
    ) -> Result<Self, EngineError> {
        Ok(Self {
            id_generator: OrderIdGenerator::new(id_tag_trader, id_tag_strategy, clock.clone())?,
            clock,
        })
    }

    fn timestamp(&self) -> DateTime<Utc> {
        self.clock.borrow().time_now()
    }

    pub fn market(
        &mut self,
        symbol: Symbol,
        side: OrderSide,
        quantity: Decimal,
        purpose: OrderPurpose,
    ) -> Result<Order, EngineError> {
        let id = self.id_generator.generate()?;
        Ok(Order::new(
            id,
            symbol,
            side,
            OrderType::Market,
            quantity,
            None,
            purpose,
            TimeInForce::Day,
            None,
            self.timestamp(),
        )?)
    }

    #[allow(clippy::too_many_arguments)]
    pub fn limit(
        &mut self,
        symbol: Symbol,
        side: OrderSide,
        quantity: Decimal,
        price: Decimal,
        purpose: OrderPurpose,
        time_in_force: TimeInForce,
        expire_time: Option<DateTime<Utc>>,
    ) -> Result<Order, EngineError> {
        let id = self.id_generator.generate()?;
        Ok(Order::new(
            id,
            symbol,
            side,
            OrderType::Limit,
            quantity,
            Some(price),
            purpose,
            time_in_force,
            expire_time,
            self.timestamp(),
        )?)
    }

    #[allow(clippy::too_many_arguments)]
    pub fn stop_market(
        &mut self,
        symbol: Symbol,
        side: OrderSide,
        quantity: Decimal,
        price: Decimal,
        purpose: OrderPurpose,
        time_in_force: TimeInForce,
        expire_time: Option<DateTime<Utc>>,
    ) -> Result<Order, EngineError> {
        let id = self.id_generator.generate()?;
        Ok(Order::new(
            id,
            symbol,
            side,
            OrderType::StopMarket,
            quantity,
            Some(price),
            purpose,
            time_in_force,
            expire_time,
            self.timestamp(),
        )?)
    }

    /// Builds a market entry with a contingent stop-loss and optional
    /// take-profit, both on the opposite side of the entry.
    pub fn atomic(
        &mut self,
        symbol: Symbol,
        side: OrderSide,
        quantity: Decimal,
        stop_loss_price: Decimal,
        take_profit_price: Option<Decimal>,
    ) -> Result<AtomicOrder, EngineError> {
        let entry = self.market(symbol.clone(), side, quantity, OrderPurpose::Entry)?;
        let stop_loss = self.stop_market(
            symbol.clone(),
            side.opposite(),
            quantity,
            stop_loss_price,
            OrderPurpose::StopLoss,
            TimeInForce::Gtc,
            None,
        )?;
        let take_profit = match take_profit_price {
            Some(price) => Some(self.limit(
                symbol,
                side.opposite(),
                quantity,
                price,
                OrderPurpose::TakeProfit,
                TimeInForce::Gtc,
                None,
            )?),
            None => None,
        };
        Ok(AtomicOrder::new(entry, stop_loss, take_profit)?)
    }

    pub fn reset(&mut self) {
        self.id_generator.reset();
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    use crate::clock::TestClock;

    use super::*;

    fn factory() -> OrderFactory {
        let clock = Rc::new(RefCell::new(TestClock::new(
            Utc.with_ymd_and_hms(2020, 3, 14, 9, 26, 53).unwrap(),
        )));
        OrderFactory::new("000", "EMA-001", clock).unwrap()
    }

    fn audusd() -> Symbol {
        Symbol::new("AUDUSD", "FXCM").unwrap()
    }

    #[test]
    fn market_orders_are_stamped_with_clock_time() {
        let mut factory = factory();
        let order = factory
            .market(audusd(), OrderSide::Buy, dec!(100000), OrderPurpose::Entry)
            .unwrap();
        assert_eq!(order.id.as_str(), "O-20200314-092653-000-EMA-001-1");
        assert_eq!(
            order.timestamp,
            Utc.with_ymd_and_hms(2020, 3, 14, 9, 26, 53).unwrap()
        );
        assert!(order.price.is_none());
    }

    #[test]
    fn atomic_children_oppose_the_entry_side() {
        let mut factory = factory();
        let atomic = factory
            .atomic(
                audusd(),
                OrderSide::Buy,
                dec!(100000),
                dec!(0.9950),
                Some(dec!(1.0100)),
            )
            .unwrap();
        assert_eq!(atomic.entry.side, OrderSide::Buy);
        assert_eq!(atomic.stop_loss.side, OrderSide::Sell);
        assert_eq!(atomic.take_profit.as_ref().unwrap().side, OrderSide::Sell);
        assert_eq!(atomic.stop_loss.purpose, OrderPurpose::StopLoss);
        assert_eq!(atomic.entry.purpose, OrderPurpose::Entry);
    }

    #[test]
    fn reset_restarts_the_id_sequence() {
        let mut factory = factory();
        factory
            .market(audusd(), OrderSide::Buy, dec!(1), OrderPurpose::None)
            .unwrap();
        factory.reset();
        let order = factory
            .market(audusd(), OrderSide::Buy, dec!(1), OrderPurpose::None)
            .unwrap();
        assert_eq!(order.id.as_str(), "O-20200314-092653-000-EMA-001-1");
    }
}
