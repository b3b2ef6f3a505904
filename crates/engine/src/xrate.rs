//! Mid-rate currency conversion from a snapshot of cached quotes.

use std::collections::HashMap;

use rust_decimal::Decimal;

use crate::error::EngineError;

/// Computes exchange rates from per-symbol-code bid/ask maps.
///
/// The calculator is stateless: the engine supplies the snapshot of its tick
/// cache and the currency pair on every call.
#[derive(Debug, Default, Clone, Copy)]
pub struct ExchangeRateCalculator;

impl ExchangeRateCalculator {
    pub fn new() -> Self {
        Self
    }

    /// Returns the MID rate converting one unit of `quote_currency` into
    /// `base_currency`, resolving either the direct pair or the reciprocal of
    /// the inverse pair.
    pub fn get_rate(
        &self,
        quote_currency: &str,
        base_currency: &str,
        bid_rates: &HashMap<String, Decimal>,
        ask_rates: &HashMap<String, Decimal>,
    ) -> Result<Decimal, EngineError> {
        if quote_currency.trim().is_empty() || base_currency.trim().is_empty() {
            return Err(EngineError::Precondition(
                "currency codes must be non-empty".to_string(),
            ));
        }
        if quote_currency == base_currency {
            return Ok(Decimal::ONE);
        }

        let direct = format!("{}{}", quote_currency, base_currency);
        if let Some(mid) = Self::mid(&direct, bid_rates, ask_rates) {
            return Ok(mid);
        }

        let inverse = format!("{}{}", base_currency, quote_currency);
        if let Some(mid) = Self::mid(&inverse, bid_rates, ask_rates) {
            if mid.is_zero() {
                return Err(EngineError::Lookup(format!(
                    "cannot invert zero rate for {}",
                    inverse
                )));
            }
            return Ok(Decimal::ONE / mid);
        }

        Err(EngineError::Lookup(format!(
            "no rate available for {}/{}",
            quote_currency, base_currency
        )))
    }

    fn mid(
        code: &str,
        bid_rates: &HashMap<String, Decimal>,
        ask_rates: &HashMap<String, Decimal>,
    ) -> Option<Decimal> {
        let bid = bid_rates.get(code)?;
        let ask = ask_rates.get(code)?;
        Some((*bid + *ask) / Decimal::TWO)
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;

    fn rates() -> (HashMap<String, Decimal>, HashMap<String, Decimal>) {
        let mut bids = HashMap::new();
        let mut asks = HashMap::new();
        bids.insert("AUDUSD".to_string(), dec!(0.80000));
        asks.insert("AUDUSD".to_string(), dec!(0.80010));
        (bids, asks)
    }

    #[test]
    fn identity_pair_is_one() {
        let (bids, asks) = rates();
        let rate = ExchangeRateCalculator::new()
            .get_rate("USD", "USD", &bids, &asks)
            .unwrap();
        assert_eq!(rate, Decimal::ONE);
    }

    #[test]
    fn direct_pair_uses_mid() {
        let (bids, asks) = rates();
        let rate = ExchangeRateCalculator::new()
            .get_rate("AUD", "USD", &bids, &asks)
            .unwrap();
        assert_eq!(rate, dec!(0.80005));
    }

    #[test]
    fn inverse_pair_uses_reciprocal_mid() {
        let (bids, asks) = rates();
        let rate = ExchangeRateCalculator::new()
            .get_rate("USD", "AUD", &bids, &asks)
            .unwrap();
        assert_eq!(rate, Decimal::ONE / dec!(0.80005));
    }

    #[test]
    fn unknown_pair_is_a_lookup_error() {
        let (bids, asks) = rates();
        assert!(matches!(
            ExchangeRateCalculator::new().get_rate("GBP", "JPY", &bids, &asks),
            Err(EngineError::Lookup(_))
        ));
    }
}
