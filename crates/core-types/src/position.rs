use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::data::Symbol;
use crate::enums::{MarketPosition, OrderSide};
use crate::identifiers::{OrderId, PositionId};

/// A snapshot of an aggregate holding in one symbol.
///
/// Positions are created and maintained by the portfolio; the engine only
/// reads them to decide flattening and reporting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub id: PositionId,
    pub symbol: Symbol,
    pub market_position: MarketPosition,
    pub quantity: Decimal,
    pub entry_price: Decimal,
    pub entry_order_id: OrderId,
    pub last_updated: DateTime<Utc>,
}

impl Position {
    pub fn is_flat(&self) -> bool {
        self.market_position == MarketPosition::Flat
    }

    pub fn is_entered(&self) -> bool {
        !self.is_flat()
    }

    pub fn is_long(&self) -> bool {
        self.market_position == MarketPosition::Long
    }

    pub fn is_short(&self) -> bool {
        self.market_position == MarketPosition::Short
    }

    /// The market-order side that closes this position.
    pub fn flatten_side(&self) -> Option<OrderSide> {
        match self.market_position {
            MarketPosition::Long => Some(OrderSide::Sell),
            MarketPosition::Short => Some(OrderSide::Buy),
            MarketPosition::Flat => None,
        }
    }
}
