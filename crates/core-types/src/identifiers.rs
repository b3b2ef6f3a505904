//! String-valued identifier value objects.
//!
//! Every identifier validates its content on construction so that an empty or
//! whitespace-only tag can never reach a command, a register key, or a
//! generated identifier string.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

fn validate(kind: &str, value: &str) -> Result<(), CoreError> {
    if value.trim().is_empty() {
        return Err(CoreError::InvalidInput(
            kind.to_string(),
            "value was empty or whitespace".to_string(),
        ));
    }
    Ok(())
}

macro_rules! identifier {
    ($name:ident, $kind:literal) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Result<Self, CoreError> {
                let value = value.into();
                validate($kind, &value)?;
                Ok(Self(value))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

identifier!(TraderId, "TraderId");
identifier!(StrategyId, "StrategyId");
identifier!(OrderId, "OrderId");
identifier!(PositionId, "PositionId");
identifier!(Label, "Label");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_values() {
        assert!(TraderId::new("").is_err());
        assert!(OrderId::new("   ").is_err());
    }

    #[test]
    fn equality_is_by_value() {
        let a = OrderId::new("O-123").unwrap();
        let b = OrderId::new("O-123").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.to_string(), "O-123");
    }
}
