use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A snapshot of the trading account's balances.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub account_id: String,
    pub currency: String,
    pub cash_balance: Decimal,
    pub free_equity: Decimal,
    pub last_updated: DateTime<Utc>,
}
