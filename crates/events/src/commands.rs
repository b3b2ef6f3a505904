//! Commands forwarded to the execution client.
//!
//! Every command carries the trader and strategy identity so a shared
//! execution client can associate orders with their owning strategy.

use core_types::{AtomicOrder, Order, OrderId, PositionId, StrategyId, TraderId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollateralInquiry {
    pub trader_id: TraderId,
    pub strategy_id: StrategyId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmitOrder {
    pub trader_id: TraderId,
    pub strategy_id: StrategyId,
    pub position_id: PositionId,
    pub order: Order,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmitAtomicOrder {
    pub trader_id: TraderId,
    pub strategy_id: StrategyId,
    pub position_id: PositionId,
    pub atomic_order: AtomicOrder,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModifyOrder {
    pub trader_id: TraderId,
    pub strategy_id: StrategyId,
    pub order_id: OrderId,
    pub modified_price: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CancelOrder {
    pub trader_id: TraderId,
    pub strategy_id: StrategyId,
    pub order_id: OrderId,
    pub reason: String,
}

/// The execution-command union.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum Command {
    CollateralInquiry(CollateralInquiry),
    SubmitOrder(SubmitOrder),
    SubmitAtomicOrder(SubmitAtomicOrder),
    ModifyOrder(ModifyOrder),
    CancelOrder(CancelOrder),
}
