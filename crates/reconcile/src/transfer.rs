use saldo_core::{
    normalize, AccountVocabulary, Amount, Period, ReconcileError, RowIndex, TransactionRecord,
    TransactionType, TransferImbalance,
};

use crate::util::starts_with_marker;

/// Descriptions starting with this phrase name their source and destination
/// accounts ("Przelew z pekao do revolut").
pub const DEFAULT_TRANSFER_MARKER: &str = "Przelew z";

/// How a transfer pair was resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairingStrategy {
    /// The only expense and the only income of an amount.
    Direct,
    /// k-th expense with k-th income, both in date order.
    ByDate,
    /// Destination account parsed from the expense description.
    ByAccount,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferPair {
    pub expense: RowIndex,
    pub income: RowIndex,
    pub strategy: PairingStrategy,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransferReport {
    pub pairs: Vec<TransferPair>,
}

impl TransferReport {
    pub fn count(&self, strategy: PairingStrategy) -> usize {
        self.pairs.iter().filter(|p| p.strategy == strategy).count()
    }
}

/// Position of a transfer leg inside its period.
#[derive(Debug, Clone, Copy)]
struct Leg {
    side: TransactionType,
    pos: usize,
}

/// Slice positions of a resolved pair, before anything is written.
type PlannedPair = (usize, usize, PairingStrategy);

/// Pairs the two legs of every transfer between the user's own accounts.
pub struct TransferMatcher {
    marker: String,
    vocabulary: AccountVocabulary,
}

impl Default for TransferMatcher {
    fn default() -> Self {
        Self::new(DEFAULT_TRANSFER_MARKER, AccountVocabulary::default())
    }
}

impl TransferMatcher {
    pub fn new(marker: &str, vocabulary: AccountVocabulary) -> Self {
        Self {
            marker: marker.to_string(),
            vocabulary,
        }
    }

    pub fn marker(&self) -> &str {
        &self.marker
    }

    /// Streams the transfer legs in `(amount, date)` order and reports every
    /// amount whose expense and income counts differ.
    pub fn check_balance(&self, period: &Period) -> Result<(), ReconcileError> {
        let legs = sorted_transfer_legs(period);
        let imbalances = find_imbalances(&legs, period);
        if imbalances.is_empty() {
            Ok(())
        } else {
            Err(ReconcileError::UnbalancedTransfers(imbalances))
        }
    }

    /// Links every transfer leg of `period` to its counterpart.
    ///
    /// Either every transfer leg gets its `match_ref`, or the period is left
    /// exactly as it was and the fault is returned.
    pub fn match_transfers(&self, period: &mut Period) -> Result<TransferReport, ReconcileError> {
        let legs = sorted_transfer_legs(period);

        let imbalances = find_imbalances(&legs, period);
        if !imbalances.is_empty() {
            return Err(ReconcileError::UnbalancedTransfers(imbalances));
        }

        let mut planned = Vec::with_capacity(legs.len() / 2);
        for group in amount_groups(&legs, period) {
            planned.extend(self.pair_group(group, period)?);
        }

        let mut report = TransferReport::default();
        for (e, i, strategy) in planned {
            let income_index = period.incomes[i].local_index;
            let expense_index = period.expenses[e].local_index;
            period.expenses[e].match_ref = Some(income_index);
            period.incomes[i].match_ref = Some(expense_index);
            report.pairs.push(TransferPair {
                expense: expense_index,
                income: income_index,
                strategy,
            });
        }

        tracing::info!(
            period = %period.name,
            pairs = report.pairs.len(),
            direct = report.count(PairingStrategy::Direct),
            by_date = report.count(PairingStrategy::ByDate),
            by_account = report.count(PairingStrategy::ByAccount),
            "linked transfers"
        );

        Ok(report)
    }

    fn pair_group(&self, group: &[Leg], period: &Period) -> Result<Vec<PlannedPair>, ReconcileError> {
        let amount = record(period, group[0]).amount;

        if let [a, b] = group {
            let (e, i) = match a.side {
                TransactionType::Expense => (a.pos, b.pos),
                TransactionType::Income => (b.pos, a.pos),
            };
            return Ok(vec![(e, i, PairingStrategy::Direct)]);
        }

        let (marked, plain): (Vec<Leg>, Vec<Leg>) = group
            .iter()
            .copied()
            .partition(|leg| starts_with_marker(&record(period, *leg).description, &self.marker));

        let (marked_expenses, marked_incomes) = split_sides(&marked);
        if marked_expenses.len() != marked_incomes.len() {
            return Err(ReconcileError::UnbalancedTransfers(vec![TransferImbalance {
                amount,
                expenses: marked_expenses.len(),
                incomes: marked_incomes.len(),
            }]));
        }

        // The group is balanced, so the unmarked remainder is too.
        let (plain_expenses, plain_incomes) = split_sides(&plain);
        let mut pairs: Vec<PlannedPair> = plain_expenses
            .into_iter()
            .zip(plain_incomes)
            .map(|(e, i)| (e, i, PairingStrategy::ByDate))
            .collect();

        pairs.extend(self.pair_by_account(&marked_expenses, &marked_incomes, period, amount)?);
        Ok(pairs)
    }

    /// Greedy assignment: each expense, in date order, takes the first
    /// unconsumed income booked on the account its description sends money to.
    fn pair_by_account(
        &self,
        expenses: &[usize],
        incomes: &[usize],
        period: &Period,
        amount: Amount,
    ) -> Result<Vec<PlannedPair>, ReconcileError> {
        let income_accounts: Vec<String> = incomes
            .iter()
            .map(|&i| normalize(&period.incomes[i].account))
            .collect();
        let mut consumed = vec![false; incomes.len()];
        let mut pairs = Vec::with_capacity(expenses.len());

        for &e in expenses {
            let expense = &period.expenses[e];
            let (from, to) = self.vocabulary.resolve_route(&expense.description).ok_or_else(|| {
                ReconcileError::UnresolvedDescription {
                    side: TransactionType::Expense,
                    index: expense.local_index,
                    description: expense.description.clone(),
                }
            })?;

            if normalize(&expense.account) != normalize(from) {
                tracing::warn!(
                    expense = expense.local_index,
                    account = %expense.account,
                    from,
                    "transfer description names a different source account"
                );
            }

            let target = normalize(to);
            let slot = (0..incomes.len())
                .find(|&k| !consumed[k] && income_accounts[k] == target)
                .ok_or_else(|| ReconcileError::NoMatchingIncome {
                    account: to.to_string(),
                    amount,
                })?;
            consumed[slot] = true;
            pairs.push((e, incomes[slot], PairingStrategy::ByAccount));
        }

        Ok(pairs)
    }
}

fn record(period: &Period, leg: Leg) -> &TransactionRecord {
    &period.side(leg.side)[leg.pos]
}

/// Transfer legs of both sides, sorted by amount then date. Ties keep
/// expenses before incomes and export order within a side.
fn sorted_transfer_legs(period: &Period) -> Vec<Leg> {
    let mut legs: Vec<Leg> = [TransactionType::Expense, TransactionType::Income]
        .into_iter()
        .flat_map(|side| {
            period
                .side(side)
                .iter()
                .enumerate()
                .filter(|(_, r)| r.is_transfer_leg())
                .map(move |(pos, _)| Leg { side, pos })
        })
        .collect();

    legs.sort_by(|a, b| {
        let (ra, rb) = (record(period, *a), record(period, *b));
        ra.amount.cmp(&rb.amount).then(ra.date.cmp(&rb.date))
    });
    legs
}

fn find_imbalances(legs: &[Leg], period: &Period) -> Vec<TransferImbalance> {
    let mut imbalances = Vec::new();
    let mut current: Option<Amount> = None;
    let (mut expenses, mut incomes) = (0, 0);

    for leg in legs {
        let amount = record(period, *leg).amount;
        if current != Some(amount) {
            if let Some(prev) = current {
                if expenses != incomes {
                    imbalances.push(TransferImbalance { amount: prev, expenses, incomes });
                }
            }
            current = Some(amount);
            expenses = 0;
            incomes = 0;
        }
        match leg.side {
            TransactionType::Expense => expenses += 1,
            TransactionType::Income => incomes += 1,
        }
    }

    if let Some(last) = current {
        if expenses != incomes {
            imbalances.push(TransferImbalance { amount: last, expenses, incomes });
        }
    }

    imbalances
}

/// Splits `(amount, date)`-sorted legs into runs of equal amount.
fn amount_groups<'a>(legs: &'a [Leg], period: &Period) -> Vec<&'a [Leg]> {
    let mut groups = Vec::new();
    let mut start = 0;
    for k in 1..=legs.len() {
        let boundary = k == legs.len()
            || record(period, legs[k]).amount != record(period, legs[start]).amount;
        if boundary && k > start {
            groups.push(&legs[start..k]);
            start = k;
        }
    }
    groups
}

/// Expense positions and income positions, each keeping the input order.
fn split_sides(legs: &[Leg]) -> (Vec<usize>, Vec<usize>) {
    let mut expenses = Vec::new();
    let mut incomes = Vec::new();
    for leg in legs {
        match leg.side {
            TransactionType::Expense => expenses.push(leg.pos),
            TransactionType::Income => incomes.push(leg.pos),
        }
    }
    (expenses, incomes)
}
