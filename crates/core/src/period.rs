use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::transaction::{RowIndex, TransactionRecord, TransactionType};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} to {}", self.start, self.end)
    }
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        DateRange { start, end }
    }
}

/// One batch of ledger rows (a calendar year, or a multi-year foreign
/// currency export) reconciled on its own before global remapping.
#[derive(Debug, Clone, PartialEq)]
pub struct Period {
    pub name: String,
    pub expenses: Vec<TransactionRecord>,
    pub incomes: Vec<TransactionRecord>,
}

impl Period {
    pub fn new(
        name: impl Into<String>,
        expenses: Vec<TransactionRecord>,
        incomes: Vec<TransactionRecord>,
    ) -> Self {
        Period {
            name: name.into(),
            expenses,
            incomes,
        }
    }

    pub fn len(&self) -> usize {
        self.expenses.len() + self.incomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.expenses.is_empty() && self.incomes.is_empty()
    }

    pub fn side(&self, side: TransactionType) -> &[TransactionRecord] {
        match side {
            TransactionType::Expense => &self.expenses,
            TransactionType::Income => &self.incomes,
        }
    }

    /// Drops every `match_ref`, including links carried over from an
    /// earlier run's export.
    pub fn clear_links(&mut self) {
        for record in self.expenses.iter_mut().chain(self.incomes.iter_mut()) {
            record.match_ref = None;
        }
    }

    /// Stable sort of both sides by date; rows sharing a date keep their
    /// export order.
    pub fn sort_by_date(&mut self) {
        self.expenses.sort_by_key(|r| r.date);
        self.incomes.sort_by_key(|r| r.date);
    }

    pub fn rows(&self) -> impl Iterator<Item = &TransactionRecord> {
        self.expenses.iter().chain(self.incomes.iter())
    }

    pub fn find(&self, side: TransactionType, local_index: RowIndex) -> Option<&TransactionRecord> {
        self.side(side).iter().find(|r| r.local_index == local_index)
    }

    /// Earliest and latest date over both sides, `None` for an empty period.
    pub fn date_range(&self) -> Option<DateRange> {
        let start = self.rows().map(|r| r.date).min()?;
        let end = self.rows().map(|r| r.date).max()?;
        Some(DateRange::new(start, end))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::Category;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn row(idx: RowIndex, day: u32, side: TransactionType) -> TransactionRecord {
        TransactionRecord {
            local_index: idx,
            date: date(2024, 3, day),
            description: format!("row {idx}"),
            amount: "10".parse().unwrap(),
            currency: "PLN".to_string(),
            category: Category::from("Inne"),
            payment_method: "card".to_string(),
            account: "pekao".to_string(),
            exchange_rate: None,
            currencies: None,
            match_ref: None,
            transaction_type: side,
        }
    }

    #[test]
    fn sort_by_date_is_stable() {
        let mut period = Period::new(
            "2024",
            vec![
                row(0, 5, TransactionType::Expense),
                row(1, 2, TransactionType::Expense),
                row(2, 5, TransactionType::Expense),
                row(3, 1, TransactionType::Expense),
            ],
            vec![],
        );
        period.sort_by_date();
        let order: Vec<_> = period.expenses.iter().map(|r| r.local_index).collect();
        assert_eq!(order, vec![3, 1, 0, 2]);
    }

    #[test]
    fn date_range_spans_both_sides() {
        let period = Period::new(
            "2024",
            vec![row(0, 10, TransactionType::Expense)],
            vec![row(0, 3, TransactionType::Income), row(1, 20, TransactionType::Income)],
        );
        let range = period.date_range().unwrap();
        assert_eq!(range, DateRange::new(date(2024, 3, 3), date(2024, 3, 20)));
        assert_eq!(range.to_string(), "2024-03-03 to 2024-03-20");
    }

    #[test]
    fn empty_period_has_no_range() {
        let period = Period::new("empty", vec![], vec![]);
        assert!(period.is_empty());
        assert_eq!(period.len(), 0);
        assert!(period.date_range().is_none());
    }

    #[test]
    fn find_looks_up_by_side_and_local_index() {
        let period = Period::new(
            "2024",
            vec![row(4, 1, TransactionType::Expense)],
            vec![row(4, 2, TransactionType::Income)],
        );
        let income = period.find(TransactionType::Income, 4).unwrap();
        assert_eq!(income.transaction_type, TransactionType::Income);
        assert!(period.find(TransactionType::Expense, 5).is_none());
        assert_eq!(period.side(TransactionType::Expense).len(), 1);
    }

    #[test]
    fn clear_links_unsets_both_sides() {
        let mut period = Period::new(
            "2024",
            vec![row(0, 1, TransactionType::Expense)],
            vec![row(0, 1, TransactionType::Income)],
        );
        period.expenses[0].match_ref = Some(7);
        period.incomes[0].match_ref = Some(3);
        period.clear_links();
        assert!(period.rows().all(|r| r.match_ref.is_none()));
    }
}
