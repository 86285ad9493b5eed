use serde::{Deserialize, Serialize};
use std::fmt;

/// Monetary amount in the currency's minor unit (cents for USD).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Money {
    pub amount: i64,
    pub currency: String,
}

impl Money {
    pub fn new(amount: i64, currency: &str) -> Self {
        Self {
            amount,
            currency: currency.to_uppercase(),
        }
    }

    pub fn is_positive(&self) -> bool {
        self.amount > 0
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02} {}", self.amount / 100, (self.amount % 100).abs(), self.currency)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_money_display() {
        let price = Money::new(4550, "usd");
        assert_eq!(price.currency, "USD");
        assert_eq!(price.to_string(), "45.50 USD");
        assert!(price.is_positive());
        assert!(!Money::new(0, "USD").is_positive());
    }
}
