//! Event messages delivered to the strategy engine.
//!
//! Every external happening the engine can observe arrives as one variant of
//! the top-level [`Event`] enum, so the order-event reducer and the user's
//! `on_event` hook branch on a closed sum type rather than downcasting.

use chrono::{DateTime, Utc};
use core_types::{Account, OrderId, OrderSide, Position, Symbol};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An order was rejected by the execution venue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRejected {
    pub event_id: Uuid,
    pub order_id: OrderId,
    pub reason: String,
    pub timestamp: DateTime<Utc>,
}

/// An order was cancelled at the venue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderCancelled {
    pub event_id: Uuid,
    pub order_id: OrderId,
    pub timestamp: DateTime<Utc>,
}

/// A modify command was acknowledged; the order now works at the new price.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderModified {
    pub event_id: Uuid,
    pub order_id: OrderId,
    pub modified_price: Decimal,
    pub timestamp: DateTime<Utc>,
}

/// A cancel or modify command was refused by the venue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderCancelReject {
    pub event_id: Uuid,
    pub order_id: OrderId,
    pub reason: String,
    pub timestamp: DateTime<Utc>,
}

/// An order filled completely.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderFilled {
    pub event_id: Uuid,
    pub order_id: OrderId,
    pub symbol: Symbol,
    pub side: OrderSide,
    pub filled_quantity: Decimal,
    pub average_price: Decimal,
    pub timestamp: DateTime<Utc>,
}

/// An order filled in part and continues working for the remainder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderPartiallyFilled {
    pub event_id: Uuid,
    pub order_id: OrderId,
    pub symbol: Symbol,
    pub side: OrderSide,
    pub filled_quantity: Decimal,
    pub leaves_quantity: Decimal,
    pub average_price: Decimal,
    pub timestamp: DateTime<Utc>,
}

/// An order lapsed at the venue without filling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderExpired {
    pub event_id: Uuid,
    pub order_id: OrderId,
    pub timestamp: DateTime<Utc>,
}

/// A change to the trading account's balances.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountEvent {
    pub event_id: Uuid,
    pub account: Account,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PositionEventKind {
    Opened,
    Changed,
    Closed,
}

/// A change to a position tracked by the portfolio.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionEvent {
    pub event_id: Uuid,
    pub kind: PositionEventKind,
    pub position: Position,
    pub timestamp: DateTime<Utc>,
}

/// A timer or time-alert fire from the clock.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeEvent {
    pub event_id: Uuid,
    pub label: String,
    pub timestamp: DateTime<Utc>,
}

impl TimeEvent {
    pub fn new(label: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            label: label.into(),
            timestamp,
        }
    }
}

/// The top-level event enum.
///
/// The `#[serde(tag = "type", content = "payload")]` attribute serializes each
/// variant into a clean tagged JSON object, which keeps recorded event streams
/// self-describing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum Event {
    OrderRejected(OrderRejected),
    OrderCancelled(OrderCancelled),
    OrderModified(OrderModified),
    OrderCancelReject(OrderCancelReject),
    OrderFilled(OrderFilled),
    OrderPartiallyFilled(OrderPartiallyFilled),
    OrderExpired(OrderExpired),
    Account(AccountEvent),
    Position(PositionEvent),
    Time(TimeEvent),
}

impl Event {
    /// The order id this event concerns, when it concerns one.
    pub fn order_id(&self) -> Option<&OrderId> {
        match self {
            Event::OrderRejected(e) => Some(&e.order_id),
            Event::OrderCancelled(e) => Some(&e.order_id),
            Event::OrderModified(e) => Some(&e.order_id),
            Event::OrderCancelReject(e) => Some(&e.order_id),
            Event::OrderFilled(e) => Some(&e.order_id),
            Event::OrderPartiallyFilled(e) => Some(&e.order_id),
            Event::OrderExpired(e) => Some(&e.order_id),
            Event::Account(_) | Event::Position(_) | Event::Time(_) => None,
        }
    }
}
