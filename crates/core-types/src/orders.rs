//! Order value objects.
//!
//! An `Order` is an immutable snapshot: it is created by the order factory,
//! registered with the ledger, and passed by value across the execution-command
//! boundary. Live state is always looked up by `OrderId` through the execution
//! client, never through a shared mutable reference.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::data::Symbol;
use crate::enums::{OrderPurpose, OrderSide, OrderStatus, OrderType, TimeInForce};
use crate::error::CoreError;
use crate::identifiers::OrderId;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub symbol: Symbol,
    pub side: OrderSide,
    pub order_type: OrderType,
    pub quantity: Decimal,
    pub price: Option<Decimal>,
    pub purpose: OrderPurpose,
    pub time_in_force: TimeInForce,
    pub expire_time: Option<DateTime<Utc>>,
    pub status: OrderStatus,
    pub timestamp: DateTime<Utc>,
}

impl Order {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: OrderId,
        symbol: Symbol,
        side: OrderSide,
        order_type: OrderType,
        quantity: Decimal,
        price: Option<Decimal>,
        purpose: OrderPurpose,
        time_in_force: TimeInForce,
        expire_time: Option<DateTime<Utc>>,
        timestamp: DateTime<Utc>,
    ) -> Result<Self, CoreError> {
        if quantity <= Decimal::ZERO {
            return Err(CoreError::InvalidInput(
                "Order".to_string(),
                format!("quantity must be positive, was {}", quantity),
            ));
        }
        if order_type.is_priced() && price.is_none() {
            return Err(CoreError::InvalidInput(
                "Order".to_string(),
                format!("{:?} order requires a price", order_type),
            ));
        }
        if !order_type.is_priced() && price.is_some() {
            return Err(CoreError::InvalidInput(
                "Order".to_string(),
                "market order cannot carry a price".to_string(),
            ));
        }
        if time_in_force == TimeInForce::Gtd && expire_time.is_none() {
            return Err(CoreError::InvalidInput(
                "Order".to_string(),
                "GTD order requires an expire time".to_string(),
            ));
        }
        Ok(Self {
            id,
            symbol,
            side,
            order_type,
            quantity,
            price,
            purpose,
            time_in_force,
            expire_time,
            status: OrderStatus::Initialized,
            timestamp,
        })
    }

    pub fn is_complete(&self) -> bool {
        self.status.is_complete()
    }
}

/// A grouped submission of an entry order with its contingent child orders.
///
/// The venue activates the children together with the entry, so both children
/// must unwind the entry: their side is always opposite the entry side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AtomicOrder {
    pub entry: Order,
    pub stop_loss: Order,
    pub take_profit: Option<Order>,
}

impl AtomicOrder {
    pub fn new(entry: Order, stop_loss: Order, take_profit: Option<Order>) -> Result<Self, CoreError> {
        if stop_loss.side != entry.side.opposite() {
            return Err(CoreError::Invariant(
                "AtomicOrder".to_string(),
                format!(
                    "stop-loss side {:?} must oppose entry side {:?}",
                    stop_loss.side, entry.side
                ),
            ));
        }
        if let Some(tp) = &take_profit {
            if tp.side != entry.side.opposite() {
                return Err(CoreError::Invariant(
                    "AtomicOrder".to_string(),
                    format!(
                        "take-profit side {:?} must oppose entry side {:?}",
                        tp.side, entry.side
                    ),
                ));
            }
        }
        let mut ids = vec![&entry.id, &stop_loss.id];
        if let Some(tp) = &take_profit {
            ids.push(&tp.id);
        }
        for (i, a) in ids.iter().enumerate() {
            if ids.iter().skip(i + 1).any(|b| b == a) {
                return Err(CoreError::Invariant(
                    "AtomicOrder".to_string(),
                    format!("duplicate order id {} across legs", a),
                ));
            }
        }
        Ok(Self {
            entry,
            stop_loss,
            take_profit,
        })
    }

    /// Order ids of the contingent child legs.
    pub fn child_ids(&self) -> Vec<OrderId> {
        let mut ids = vec![self.stop_loss.id.clone()];
        if let Some(tp) = &self.take_profit {
            ids.push(tp.id.clone());
        }
        ids
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    use super::*;

    fn ts() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2020, 3, 14, 9, 26, 53).unwrap()
    }

    fn symbol() -> Symbol {
        Symbol::new("AUDUSD", "FXCM").unwrap()
    }

    fn market(id: &str, side: OrderSide) -> Order {
        Order::new(
            OrderId::new(id).unwrap(),
            symbol(),
            side,
            OrderType::Market,
            dec!(100000),
            None,
            OrderPurpose::Entry,
            TimeInForce::Day,
            None,
            ts(),
        )
        .unwrap()
    }

    fn stop(id: &str, side: OrderSide, purpose: OrderPurpose) -> Order {
        Order::new(
            OrderId::new(id).unwrap(),
            symbol(),
            side,
            OrderType::StopMarket,
            dec!(100000),
            Some(dec!(0.99)),
            purpose,
            TimeInForce::Gtc,
            None,
            ts(),
        )
        .unwrap()
    }

    #[test]
    fn order_rejects_non_positive_quantity() {
        let result = Order::new(
            OrderId::new("O-1").unwrap(),
            symbol(),
            OrderSide::Buy,
            OrderType::Market,
            dec!(0),
            None,
            OrderPurpose::Entry,
            TimeInForce::Day,
            None,
            ts(),
        );
        assert!(result.is_err());
    }

    #[test]
    fn limit_order_requires_price() {
        let result = Order::new(
            OrderId::new("O-1").unwrap(),
            symbol(),
            OrderSide::Buy,
            OrderType::Limit,
            dec!(100000),
            None,
            OrderPurpose::Entry,
            TimeInForce::Day,
            None,
            ts(),
        );
        assert!(result.is_err());
    }

    #[test]
    fn gtd_requires_expire_time() {
        let result = Order::new(
            OrderId::new("O-1").unwrap(),
            symbol(),
            OrderSide::Buy,
            OrderType::Limit,
            dec!(100000),
            Some(dec!(1.0)),
            OrderPurpose::Entry,
            TimeInForce::Gtd,
            None,
            ts(),
        );
        assert!(result.is_err());
    }

    #[test]
    fn atomic_order_rejects_stop_loss_on_same_side() {
        let entry = market("O-1", OrderSide::Buy);
        let sl = stop("O-2", OrderSide::Buy, OrderPurpose::StopLoss);
        assert!(AtomicOrder::new(entry, sl, None).is_err());
    }

    #[test]
    fn atomic_order_rejects_duplicate_leg_ids() {
        let entry = market("O-1", OrderSide::Buy);
        let sl = stop("O-1", OrderSide::Sell, OrderPurpose::StopLoss);
        assert!(AtomicOrder::new(entry, sl, None).is_err());
    }

    #[test]
    fn atomic_order_child_ids_cover_both_legs() {
        let entry = market("O-1", OrderSide::Buy);
        let sl = stop("O-2", OrderSide::Sell, OrderPurpose::StopLoss);
        let tp = stop("O-3", OrderSide::Sell, OrderPurpose::TakeProfit);
        let atomic = AtomicOrder::new(entry, sl, Some(tp)).unwrap();
        let ids: Vec<String> = atomic.child_ids().iter().map(|id| id.to_string()).collect();
        assert_eq!(ids, vec!["O-2", "O-3"]);
    }
}
