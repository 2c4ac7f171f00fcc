use saldo_core::{ReconcileError, RowIndex, TransactionRecord, TransactionType};

use crate::util::ensure_sorted_by_date;

/// Local indices of the two legs of one currency exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExchangePair {
    pub expense: RowIndex,
    pub income: RowIndex,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExchangeReport {
    pub pairs: Vec<ExchangePair>,
    /// Set when the scan stopped on two exchange legs that do not belong
    /// together; neither cursor could advance past them.
    pub stalled_at: Option<ExchangePair>,
    /// Exchange legs (both sides) still without a partner after the scan.
    pub unmatched_legs: usize,
}

/// Links the two legs of every currency exchange in one period.
///
/// Both slices must be sorted ascending by date. Links are only written once
/// the whole scan succeeded, so a direction fault leaves every row untouched.
pub fn match_exchanges(
    expenses: &mut [TransactionRecord],
    incomes: &mut [TransactionRecord],
) -> Result<ExchangeReport, ReconcileError> {
    ensure_sorted_by_date(expenses, TransactionType::Expense)?;
    ensure_sorted_by_date(incomes, TransactionType::Income)?;

    let scan = scan(expenses, incomes)?;

    let mut pairs = Vec::with_capacity(scan.positions.len());
    for &(i, j) in &scan.positions {
        let (expense, income) = (&mut expenses[i], &mut incomes[j]);
        expense.match_ref = Some(income.local_index);
        income.match_ref = Some(expense.local_index);
        tracing::debug!(
            expense = expense.local_index,
            income = income.local_index,
            date = %expense.date,
            "linked exchange pair"
        );
        pairs.push(ExchangePair {
            expense: expense.local_index,
            income: income.local_index,
        });
    }

    let stalled_at = scan.stalled_at.map(|(i, j)| ExchangePair {
        expense: expenses[i].local_index,
        income: incomes[j].local_index,
    });

    let unmatched_legs = expenses
        .iter()
        .chain(incomes.iter())
        .filter(|r| r.is_exchange_leg() && !r.is_matched())
        .count();

    if let Some(stall) = stalled_at {
        tracing::warn!(
            expense = stall.expense,
            income = stall.income,
            unmatched_legs,
            "exchange scan stopped on two legs that do not pair"
        );
    }

    Ok(ExchangeReport {
        pairs,
        stalled_at,
        unmatched_legs,
    })
}

struct Scan {
    positions: Vec<(usize, usize)>,
    stalled_at: Option<(usize, usize)>,
}

/// Two-pointer merge over the date-ordered sides. Returns slice positions.
fn scan(expenses: &[TransactionRecord], incomes: &[TransactionRecord]) -> Result<Scan, ReconcileError> {
    let (mut i, mut j) = (0, 0);
    let mut positions = Vec::new();

    while i < expenses.len() && j < incomes.len() {
        let (expense, income) = (&expenses[i], &incomes[j]);

        if is_exchange_pair(expense, income) {
            check_direction(expense, income)?;
            positions.push((i, j));
            i += 1;
            j += 1;
            continue;
        }

        // A candidate leg may still be completed by a later row on the other
        // side, so only rows outside the exchange category are skipped.
        let skip_expense = !expense.is_exchange_leg();
        let skip_income = !income.is_exchange_leg();
        if !skip_expense && !skip_income {
            return Ok(Scan {
                positions,
                stalled_at: Some((i, j)),
            });
        }
        if skip_expense {
            i += 1;
        }
        if skip_income {
            j += 1;
        }
    }

    Ok(Scan {
        positions,
        stalled_at: None,
    })
}

fn is_exchange_pair(expense: &TransactionRecord, income: &TransactionRecord) -> bool {
    expense.is_exchange_leg()
        && income.is_exchange_leg()
        && expense.date == income.date
        && expense.currencies.is_some()
        && expense.currencies == income.currencies
        && expense.exchange_rate.is_some()
        && expense.exchange_rate == income.exchange_rate
}

/// The pair string must read `"{smaller side currency}/{larger side currency}"`.
/// Legs of equal magnitude carry no direction and are accepted as-is.
fn expected_currencies(expense: &TransactionRecord, income: &TransactionRecord) -> Option<String> {
    let (smaller, larger) = match expense.amount.cmp(&income.amount) {
        std::cmp::Ordering::Greater => (income, expense),
        std::cmp::Ordering::Less => (expense, income),
        std::cmp::Ordering::Equal => return None,
    };
    Some(format!("{}/{}", smaller.currency, larger.currency))
}

fn check_direction(expense: &TransactionRecord, income: &TransactionRecord) -> Result<(), ReconcileError> {
    let Some(expected) = expected_currencies(expense, income) else {
        return Ok(());
    };
    let currencies = expense.currencies.clone().unwrap_or_default();
    if currencies == expected {
        Ok(())
    } else {
        Err(ReconcileError::CurrencyDirection {
            expense: expense.local_index,
            income: income.local_index,
            currencies,
            expected,
        })
    }
}
