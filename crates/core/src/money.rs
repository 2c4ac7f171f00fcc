use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A non-negative, currency-local magnitude. The sign of a ledger row is
/// carried by its transaction type, never by the amount itself.
///
/// Comparison is exact: `10.5` and `10.50` are the same amount, `10.5` and
/// `10.501` are not. Transfer grouping relies on this.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Amount(Decimal);

impl Amount {
    pub fn new(decimal: Decimal) -> Option<Self> {
        if decimal.is_sign_negative() && !decimal.is_zero() {
            None
        } else {
            Some(Amount(decimal.normalize()))
        }
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Amount {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let decimal = Decimal::from_str(s.trim()).map_err(|e| format!("Invalid amount '{s}': {e}"))?;
        Amount::new(decimal).ok_or_else(|| format!("Amount must not be negative: '{s}'"))
    }
}
