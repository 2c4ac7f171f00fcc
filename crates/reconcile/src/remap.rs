use std::collections::HashSet;

use saldo_core::{Period, ReconcileError, RowIndex, TransactionRecord, TransactionType};

/// A reconciled row placed in the global identifier space.
#[derive(Debug, Clone, PartialEq)]
pub struct LinkedRecord {
    pub global_index: RowIndex,
    /// Global index of the paired row; unset when the row was never linked.
    pub global_ref: Option<RowIndex>,
    /// Name of the period the row came from.
    pub period: String,
    pub record: TransactionRecord,
}

/// Amounts added to local indices of one period.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeriodOffsets {
    pub expenses: RowIndex,
    pub incomes: RowIndex,
}

impl PeriodOffsets {
    pub fn for_side(self, side: TransactionType) -> RowIndex {
        match side {
            TransactionType::Expense => self.expenses,
            TransactionType::Income => self.incomes,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CombinedLedger {
    /// Offsets applied to each period, in processing order.
    pub offsets: Vec<(String, PeriodOffsets)>,
    pub expenses: Vec<LinkedRecord>,
    pub incomes: Vec<LinkedRecord>,
}

impl CombinedLedger {
    pub fn len(&self) -> usize {
        self.expenses.len() + self.incomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.expenses.is_empty() && self.incomes.is_empty()
    }

    /// Both sides merged and ordered by global index.
    pub fn all(&self) -> Vec<&LinkedRecord> {
        let mut all: Vec<&LinkedRecord> = self.expenses.iter().chain(self.incomes.iter()).collect();
        all.sort_by_key(|r| r.global_index);
        all
    }

    pub fn find(&self, global_index: RowIndex) -> Option<&LinkedRecord> {
        self.expenses
            .iter()
            .chain(self.incomes.iter())
            .find(|r| r.global_index == global_index)
    }
}

/// Moves periods into one global index space, in the order they are pushed.
///
/// Each period occupies `len(expenses) + len(incomes)` slots after the
/// previous one: expenses first, then incomes. Pushing the same periods in the
/// same order always produces the same indices.
#[derive(Debug, Default)]
pub struct IndexRemapper {
    total_rows: RowIndex,
    seen: HashSet<RowIndex>,
    ledger: CombinedLedger,
}

impl IndexRemapper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn total_rows(&self) -> RowIndex {
        self.total_rows
    }

    pub fn push(&mut self, period: &Period) -> Result<PeriodOffsets, ReconcileError> {
        let offsets = PeriodOffsets {
            expenses: self.total_rows,
            incomes: self.total_rows + period.expenses.len() as RowIndex,
        };
        tracing::debug!(
            period = %period.name,
            expenses = offsets.expenses,
            incomes = offsets.incomes,
            "remapping period"
        );

        let mut claimed = HashSet::with_capacity(period.len());
        let mut expenses = Vec::with_capacity(period.expenses.len());
        let mut incomes = Vec::with_capacity(period.incomes.len());
        for side in [TransactionType::Expense, TransactionType::Income] {
            let own = offsets.for_side(side);
            let opposite = offsets.for_side(side.opposite());
            for record in period.side(side) {
                let global_index = record.local_index + own;
                if self.seen.contains(&global_index) || !claimed.insert(global_index) {
                    return Err(ReconcileError::DuplicateGlobalIndex {
                        global_index,
                        period: period.name.clone(),
                    });
                }
                let linked = LinkedRecord {
                    global_index,
                    global_ref: record.match_ref.map(|r| r + opposite),
                    period: period.name.clone(),
                    record: record.clone(),
                };
                match side {
                    TransactionType::Expense => expenses.push(linked),
                    TransactionType::Income => incomes.push(linked),
                }
            }
        }

        // Nothing is recorded for a period that failed.
        self.seen.extend(claimed);
        self.ledger.expenses.extend(expenses);
        self.ledger.incomes.extend(incomes);
        self.ledger.offsets.push((period.name.clone(), offsets));
        self.total_rows += period.len() as RowIndex;
        Ok(offsets)
    }

    pub fn finish(mut self) -> CombinedLedger {
        self.ledger.expenses.sort_by_key(|r| r.global_index);
        self.ledger.incomes.sort_by_key(|r| r.global_index);
        self.ledger
    }
}

/// Remaps `periods` in the given order.
pub fn remap_periods(periods: &[Period]) -> Result<CombinedLedger, ReconcileError> {
    let mut remapper = IndexRemapper::new();
    for period in periods {
        remapper.push(period)?;
    }
    Ok(remapper.finish())
}
