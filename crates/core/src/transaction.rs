use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::money::Amount;

/// Row identifier as assigned by the upstream export. Unique only within the
/// period the row was loaded from.
pub type RowIndex = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionType {
    Expense,
    Income,
}

impl TransactionType {
    pub fn opposite(self) -> Self {
        match self {
            TransactionType::Expense => TransactionType::Income,
            TransactionType::Income => TransactionType::Expense,
        }
    }
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransactionType::Expense => write!(f, "expense"),
            TransactionType::Income => write!(f, "income"),
        }
    }
}

impl std::str::FromStr for TransactionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "expense" => Ok(TransactionType::Expense),
            "income" => Ok(TransactionType::Income),
            other => Err(format!("Unknown transaction type: '{other}'")),
        }
    }
}

/// Row category. Two labels are reserved by the system; every other label is
/// a user category that reconciliation ignores.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Category {
    /// One leg of a currency exchange.
    Exchange,
    /// One leg of a transfer between the user's own accounts.
    Transfer,
    User(String),
}

impl Category {
    pub const EXCHANGE_LABEL: &'static str = "exchange";
    pub const TRANSFER_LABEL: &'static str = "myAccount";

    pub fn as_str(&self) -> &str {
        match self {
            Category::Exchange => Self::EXCHANGE_LABEL,
            Category::Transfer => Self::TRANSFER_LABEL,
            Category::User(label) => label,
        }
    }
}

impl From<String> for Category {
    fn from(label: String) -> Self {
        match label.as_str() {
            Self::EXCHANGE_LABEL => Category::Exchange,
            Self::TRANSFER_LABEL => Category::Transfer,
            _ => Category::User(label),
        }
    }
}

impl From<&str> for Category {
    fn from(label: &str) -> Self {
        Category::from(label.to_string())
    }
}

impl From<Category> for String {
    fn from(category: Category) -> Self {
        match category {
            Category::User(label) => label,
            other => other.as_str().to_string(),
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One normalized ledger row.
///
/// Everything except `match_ref` is fixed once the row is parsed; the
/// matchers only ever write `match_ref`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionRecord {
    #[serde(rename = "idx")]
    pub local_index: RowIndex,
    pub date: NaiveDate,
    pub description: String,
    pub amount: Amount,
    pub currency: String,
    pub category: Category,
    pub payment_method: String,
    pub account: String,
    pub exchange_rate: Option<Decimal>,
    /// Currency pair of an exchange leg, `"FROM/TO"`.
    pub currencies: Option<String>,
    /// Local index of the paired row on the opposite side, once reconciled.
    #[serde(rename = "calc_ref_idx")]
    pub match_ref: Option<RowIndex>,
    pub transaction_type: TransactionType,
}

impl TransactionRecord {
    pub fn is_exchange_leg(&self) -> bool {
        self.category == Category::Exchange
    }

    pub fn is_transfer_leg(&self) -> bool {
        self.category == Category::Transfer
    }

    pub fn is_matched(&self) -> bool {
        self.match_ref.is_some()
    }
}
