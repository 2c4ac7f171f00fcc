use std::fmt;
use thiserror::Error;

use super::money::Amount;
use super::transaction::{RowIndex, TransactionType};

/// Expense and income counts of one transfer amount that failed to balance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferImbalance {
    pub amount: Amount,
    pub expenses: usize,
    pub incomes: usize,
}

impl fmt::Display for TransferImbalance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (expenses={}, incomes={})",
            self.amount, self.expenses, self.incomes
        )
    }
}

fn join_imbalances(items: &[TransferImbalance]) -> String {
    items
        .iter()
        .map(|i| i.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Fatal reconciliation faults. None of them is recoverable: the output of a
/// run that produced one must not be trusted.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ReconcileError {
    #[error(
        "Wrong 'currencies' value {currencies:?} for exchange pair expense #{expense} / income #{income}: expected {expected:?}"
    )]
    CurrencyDirection {
        expense: RowIndex,
        income: RowIndex,
        currencies: String,
        expected: String,
    },
    #[error("Unbalanced transfer amounts: {}", join_imbalances(.0))]
    UnbalancedTransfers(Vec<TransferImbalance>),
    #[error("Cannot resolve transfer accounts of {side} #{index} from description {description:?}")]
    UnresolvedDescription {
        side: TransactionType,
        index: RowIndex,
        description: String,
    },
    #[error("No matching income for account '{account}' (transfer of {amount})")]
    NoMatchingIncome { account: String, amount: Amount },
    #[error("{side} rows are not sorted by date (row #{index})")]
    UnsortedInput { side: TransactionType, index: RowIndex },
    #[error("Global index {global_index} assigned twice (period '{period}')")]
    DuplicateGlobalIndex { global_index: RowIndex, period: String },
}

impl ReconcileError {
    /// Amounts named by an imbalance fault, empty for any other fault.
    pub fn unbalanced_amounts(&self) -> Vec<Amount> {
        match self {
            ReconcileError::UnbalancedTransfers(items) => items.iter().map(|i| i.amount).collect(),
            _ => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn imbalance_message_lists_every_amount() {
        let err = ReconcileError::UnbalancedTransfers(vec![
            TransferImbalance { amount: "50".parse().unwrap(), expenses: 3, incomes: 2 },
            TransferImbalance { amount: "12.5".parse().unwrap(), expenses: 0, incomes: 1 },
        ]);
        let msg = err.to_string();
        assert!(msg.contains("50 (expenses=3, incomes=2)"), "{msg}");
        assert!(msg.contains("12.5 (expenses=0, incomes=1)"), "{msg}");
        assert_eq!(err.unbalanced_amounts().len(), 2);
    }

    #[test]
    fn currency_direction_names_both_rows() {
        let err = ReconcileError::CurrencyDirection {
            expense: 4,
            income: 9,
            currencies: "PLN/EUR".to_string(),
            expected: "EUR/PLN".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("#4") && msg.contains("#9"), "{msg}");
        assert!(err.unbalanced_amounts().is_empty());
    }
}
