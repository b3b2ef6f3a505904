use serde::{Deserialize, Serialize};

use crate::error::EngineError;

/// Per-strategy behavioural configuration.
///
/// All flags are instance-scoped; there is no global configuration state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrategyConfig {
    /// On a rejected stop-loss order, flatten the associated position if it
    /// has already entered the market.
    pub flatten_on_sl_reject: bool,
    /// Flatten every active position while stopping.
    pub flatten_on_stop: bool,
    /// Cancel every working order owned by the strategy while stopping.
    pub cancel_all_orders_on_stop: bool,
    /// Maximum bars retained per bar type, newest first.
    pub bar_capacity: usize,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            flatten_on_sl_reject: true,
            flatten_on_stop: true,
            cancel_all_orders_on_stop: true,
            bar_capacity: 1000,
        }
    }
}

impl StrategyConfig {
    /// Validates the configuration values after loading.
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.bar_capacity == 0 {
            return Err(EngineError::Precondition(
                "bar_capacity must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(StrategyConfig::default().validate().is_ok());
    }

    #[test]
    fn zero_bar_capacity_is_rejected() {
        let config = StrategyConfig {
            bar_capacity: 0,
            ..StrategyConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
