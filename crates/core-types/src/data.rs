//! Market-data value objects: instrument keys, quotes, and bars.

use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::enums::{PriceType, Resolution, SecurityType};
use crate::error::CoreError;

/// An opaque instrument key, unique per trading venue.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Symbol {
    pub code: String,
    pub venue: String,
}

impl Symbol {
    pub fn new(code: impl Into<String>, venue: impl Into<String>) -> Result<Self, CoreError> {
        let code = code.into();
        let venue = venue.into();
        if code.trim().is_empty() || venue.trim().is_empty() {
            return Err(CoreError::InvalidInput(
                "Symbol".to_string(),
                "code and venue must be non-empty".to_string(),
            ));
        }
        Ok(Self { code, venue })
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.code, self.venue)
    }
}

/// The shape of a bar series: step count, interval unit, and price basis.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BarSpecification {
    pub step: u32,
    pub resolution: Resolution,
    pub price_type: PriceType,
}

impl BarSpecification {
    pub fn new(step: u32, resolution: Resolution, price_type: PriceType) -> Result<Self, CoreError> {
        if step == 0 {
            return Err(CoreError::InvalidInput(
                "BarSpecification".to_string(),
                "step must be positive".to_string(),
            ));
        }
        Ok(Self {
            step,
            resolution,
            price_type,
        })
    }
}

impl fmt::Display for BarSpecification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{:?}-{:?}", self.step, self.resolution, self.price_type)
    }
}

/// Keys bar streams: the (symbol, specification) pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BarType {
    pub symbol: Symbol,
    pub spec: BarSpecification,
}

impl BarType {
    pub fn new(symbol: Symbol, spec: BarSpecification) -> Self {
        Self { symbol, spec }
    }
}

impl fmt::Display for BarType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]", self.symbol, self.spec)
    }
}

/// A single bid/ask quote observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tick {
    pub symbol: Symbol,
    pub bid: Decimal,
    pub ask: Decimal,
    pub timestamp: DateTime<Utc>,
}

impl Tick {
    pub fn new(
        symbol: Symbol,
        bid: Decimal,
        ask: Decimal,
        timestamp: DateTime<Utc>,
    ) -> Result<Self, CoreError> {
        if bid > ask {
            return Err(CoreError::InvalidInput(
                "Tick".to_string(),
                format!("bid {} exceeds ask {}", bid, ask),
            ));
        }
        Ok(Self {
            symbol,
            bid,
            ask,
            timestamp,
        })
    }

    pub fn mid(&self) -> Decimal {
        (self.bid + self.ask) / Decimal::TWO
    }
}

/// An OHLCV candle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
    pub timestamp: DateTime<Utc>,
}

impl Bar {
    pub fn new(
        open: Decimal,
        high: Decimal,
        low: Decimal,
        close: Decimal,
        volume: Decimal,
        timestamp: DateTime<Utc>,
    ) -> Result<Self, CoreError> {
        if high < open.max(close) {
            return Err(CoreError::InvalidInput(
                "Bar".to_string(),
                format!("high {} below body [{} / {}]", high, open, close),
            ));
        }
        if low > open.min(close) {
            return Err(CoreError::InvalidInput(
                "Bar".to_string(),
                format!("low {} above body [{} / {}]", low, open, close),
            ));
        }
        Ok(Self {
            open,
            high,
            low,
            close,
            volume,
            timestamp,
        })
    }
}

/// Static reference data for a tradeable instrument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instrument {
    pub symbol: Symbol,
    pub tick_size: Decimal,
    pub tick_precision: u32,
    pub security_type: SecurityType,
    pub base_currency: String,
    pub quote_currency: String,
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    use super::*;

    fn audusd() -> Symbol {
        Symbol::new("AUDUSD", "FXCM").unwrap()
    }

    #[test]
    fn symbol_display_joins_code_and_venue() {
        assert_eq!(audusd().to_string(), "AUDUSD.FXCM");
    }

    #[test]
    fn tick_rejects_crossed_quote() {
        let ts = Utc.with_ymd_and_hms(2020, 3, 14, 9, 26, 53).unwrap();
        assert!(Tick::new(audusd(), dec!(1.00011), dec!(1.00010), ts).is_err());
    }

    #[test]
    fn tick_mid_is_average_of_bid_and_ask() {
        let ts = Utc.with_ymd_and_hms(2020, 3, 14, 9, 26, 53).unwrap();
        let tick = Tick::new(audusd(), dec!(1.00010), dec!(1.00020), ts).unwrap();
        assert_eq!(tick.mid(), dec!(1.00015));
    }

    #[test]
    fn bar_rejects_high_below_body() {
        let ts = Utc.with_ymd_and_hms(2020, 3, 14, 9, 26, 53).unwrap();
        let result = Bar::new(dec!(1.0), dec!(0.9), dec!(0.8), dec!(1.0), dec!(100), ts);
        assert!(result.is_err());
    }

    #[test]
    fn bar_rejects_low_above_body() {
        let ts = Utc.with_ymd_and_hms(2020, 3, 14, 9, 26, 53).unwrap();
        let result = Bar::new(dec!(1.0), dec!(1.1), dec!(1.05), dec!(1.1), dec!(100), ts);
        assert!(result.is_err());
    }

    #[test]
    fn bar_spec_rejects_zero_step() {
        assert!(BarSpecification::new(0, Resolution::Minute, PriceType::Bid).is_err());
    }
}
