//! The order ledger: flat registers for entry, stop-loss, and take-profit
//! orders, the atomic parent→children map, and the modify-coalescing buffer.
//!
//! An order id may appear in at most one register at a time; registration
//! into a second register is rejected before any state changes.

use std::collections::HashMap;

use core_types::{AtomicOrder, Order, OrderId};
use events::ModifyOrder;

use crate::error::EngineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Register {
    Entry,
    StopLoss,
    TakeProfit,
}

#[derive(Default)]
pub struct OrderLedger {
    entry_orders: HashMap<OrderId, Order>,
    stop_loss_orders: HashMap<OrderId, Order>,
    take_profit_orders: HashMap<OrderId, Order>,
    atomic_order_ids: HashMap<OrderId, Vec<OrderId>>,
    modify_buffer: HashMap<OrderId, ModifyOrder>,
}

impl OrderLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_entry(&mut self, order: Order) -> Result<(), EngineError> {
        self.register(order, Register::Entry)
    }

    pub fn register_stop_loss(&mut self, order: Order) -> Result<(), EngineError> {
        self.register(order, Register::StopLoss)
    }

    pub fn register_take_profit(&mut self, order: Order) -> Result<(), EngineError> {
        self.register(order, Register::TakeProfit)
    }

    /// Registers all legs of an atomic order and records the parent→children
    /// mapping.
    pub fn register_atomic(&mut self, atomic: &AtomicOrder) -> Result<(), EngineError> {
        self.register_entry(atomic.entry.clone())?;
        self.register_stop_loss(atomic.stop_loss.clone())?;
        if let Some(tp) = &atomic.take_profit {
            self.register_take_profit(tp.clone())?;
        }
        self.atomic_order_ids
            .insert(atomic.entry.id.clone(), atomic.child_ids());
        Ok(())
    }

    fn register(&mut self, order: Order, register: Register) -> Result<(), EngineError> {
        if self.is_registered(&order.id) {
            return Err(EngineError::Precondition(format!(
                "order {} is already registered",
                order.id
            )));
        }
        let target = match register {
            Register::Entry => &mut self.entry_orders,
            Register::StopLoss => &mut self.stop_loss_orders,
            Register::TakeProfit => &mut self.take_profit_orders,
        };
        target.insert(order.id.clone(), order);
        Ok(())
    }

    pub fn is_registered(&self, order_id: &OrderId) -> bool {
        self.entry_orders.contains_key(order_id)
            || self.stop_loss_orders.contains_key(order_id)
            || self.take_profit_orders.contains_key(order_id)
    }

    pub fn is_registered_stop_loss(&self, order_id: &OrderId) -> bool {
        self.stop_loss_orders.contains_key(order_id)
    }

    /// Removes `order_id` from every register it appears in. A terminally
    /// resolved child also dissolves its atomic grouping: the venue can no
    /// longer activate the legs together.
    pub fn remove_order(&mut self, order_id: &OrderId) {
        self.entry_orders.remove(order_id);
        self.stop_loss_orders.remove(order_id);
        self.take_profit_orders.remove(order_id);
        self.atomic_order_ids
            .retain(|_, children| !children.contains(order_id));
    }

    /// Drops the parent→children entry and removes every child from the
    /// registers, returning the removed child ids.
    pub fn remove_atomic_children(&mut self, parent_id: &OrderId) -> Vec<OrderId> {
        let children = self.atomic_order_ids.remove(parent_id).unwrap_or_default();
        for child in &children {
            self.remove_order(child);
        }
        children
    }

    /// Drops only the parent→children entry; the children remain registered
    /// and independently tracked.
    pub fn release_atomic_children(&mut self, parent_id: &OrderId) -> bool {
        self.atomic_order_ids.remove(parent_id).is_some()
    }

    pub fn is_atomic_parent(&self, order_id: &OrderId) -> bool {
        self.atomic_order_ids.contains_key(order_id)
    }

    /// Buffers a modify command, returning the command it replaced if one was
    /// already in flight for the same order.
    pub fn buffer_modify(&mut self, command: ModifyOrder) -> Option<ModifyOrder> {
        self.modify_buffer.insert(command.order_id.clone(), command)
    }

    pub fn has_buffered_modify(&self, order_id: &OrderId) -> bool {
        self.modify_buffer.contains_key(order_id)
    }

    pub fn take_buffered_modify(&mut self, order_id: &OrderId) -> Option<ModifyOrder> {
        self.modify_buffer.remove(order_id)
    }

    pub fn entry_order_ids(&self) -> Vec<OrderId> {
        self.entry_orders.keys().cloned().collect()
    }

    pub fn stop_loss_order_ids(&self) -> Vec<OrderId> {
        self.stop_loss_orders.keys().cloned().collect()
    }

    pub fn take_profit_order_ids(&self) -> Vec<OrderId> {
        self.take_profit_orders.keys().cloned().collect()
    }

    pub fn atomic_parent_ids(&self) -> Vec<OrderId> {
        self.atomic_order_ids.keys().cloned().collect()
    }

    pub fn atomic_child_ids(&self, parent_id: &OrderId) -> Vec<OrderId> {
        self.atomic_order_ids
            .get(parent_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn buffered_modify_ids(&self) -> Vec<OrderId> {
        self.modify_buffer.keys().cloned().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.entry_orders.is_empty()
            && self.stop_loss_orders.is_empty()
            && self.take_profit_orders.is_empty()
            && self.atomic_order_ids.is_empty()
            && self.modify_buffer.is_empty()
    }

    pub fn reset(&mut self) {
        self.entry_orders.clear();
        self.stop_loss_orders.clear();
        self.take_profit_orders.clear();
        self.atomic_order_ids.clear();
        self.modify_buffer.clear();
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use core_types::{OrderPurpose, OrderSide, OrderType, Symbol, TimeInForce};
    use rust_decimal_macros::dec;

    use super::*;

    fn order(id: &str, purpose: OrderPurpose) -> Order {
        Order::new(
            OrderId::new(id).unwrap(),
            Symbol::new("AUDUSD", "FXCM").unwrap(),
            OrderSide::Buy,
            OrderType::Market,
            dec!(100000),
            None,
            purpose,
            TimeInForce::Day,
            None,
            Utc.with_ymd_and_hms(2020, 3, 14, 9, 26, 53).unwrap(),
        )
        .unwrap()
    }

    #[test]
    fn an_id_can_live_in_only_one_register() {
        let mut ledger = OrderLedger::new();
        ledger.register_entry(order("O-1", OrderPurpose::Entry)).unwrap();
        assert!(ledger
            .register_stop_loss(order("O-1", OrderPurpose::StopLoss))
            .is_err());
        assert!(ledger.is_registered(&OrderId::new("O-1").unwrap()));
        assert!(!ledger.is_registered_stop_loss(&OrderId::new("O-1").unwrap()));
    }

    #[test]
    fn remove_order_clears_every_register() {
        let mut ledger = OrderLedger::new();
        ledger.register_entry(order("O-1", OrderPurpose::Entry)).unwrap();
        ledger.remove_order(&OrderId::new("O-1").unwrap());
        assert!(ledger.is_empty());
    }

    #[test]
    fn resolved_child_dissolves_the_atomic_grouping() {
        let mut ledger = OrderLedger::new();
        let entry = order("O-1", OrderPurpose::Entry);
        let mut sl = order("O-2", OrderPurpose::StopLoss);
        sl.side = core_types::OrderSide::Sell;
        sl.order_type = core_types::OrderType::StopMarket;
        sl.price = Some(dec!(0.99));
        let atomic = core_types::AtomicOrder::new(entry, sl, None).unwrap();
        ledger.register_atomic(&atomic).unwrap();

        ledger.remove_order(&OrderId::new("O-2").unwrap());
        assert!(ledger.atomic_parent_ids().is_empty());
        assert!(ledger.is_registered(&OrderId::new("O-1").unwrap()));
    }

    #[test]
    fn buffer_modify_replaces_in_flight_command() {
        let mut ledger = OrderLedger::new();
        let command = |price| ModifyOrder {
            trader_id: core_types::TraderId::new("TRADER-000").unwrap(),
            strategy_id: core_types::StrategyId::new("EMA-001").unwrap(),
            order_id: OrderId::new("O-1").unwrap(),
            modified_price: price,
        };

        assert!(ledger.buffer_modify(command(dec!(1.2000))).is_none());
        let replaced = ledger.buffer_modify(command(dec!(1.2005))).unwrap();
        assert_eq!(replaced.modified_price, dec!(1.2000));

        let drained = ledger
            .take_buffered_modify(&OrderId::new("O-1").unwrap())
            .unwrap();
        assert_eq!(drained.modified_price, dec!(1.2005));
        assert!(!ledger.has_buffered_modify(&OrderId::new("O-1").unwrap()));
    }
}
