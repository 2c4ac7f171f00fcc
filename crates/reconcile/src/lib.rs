pub mod csv;
pub mod exchange;
pub mod remap;
pub mod transfer;
pub(crate) mod util;

pub use crate::csv::{
    read_records, read_records_file, stage_file, write_atomically, write_linked, write_records, CsvError, StagedFile,
    PERIOD_COLUMNS,
};
pub use exchange::{match_exchanges, ExchangePair, ExchangeReport};
pub use remap::{remap_periods, CombinedLedger, IndexRemapper, LinkedRecord, PeriodOffsets};
pub use transfer::{PairingStrategy, TransferMatcher, TransferPair, TransferReport, DEFAULT_TRANSFER_MARKER};

pub mod reconcile {
    use crate::*;
    use saldo_core::{Period, ReconcileError};

    /// Outcome of reconciling one period.
    #[derive(Debug, Clone, Default, PartialEq, Eq)]
    pub struct PeriodReport {
        pub exchanges: ExchangeReport,
        pub transfers: TransferReport,
    }

    /// Clears any links already present, sorts `period` by date, then links
    /// exchanges and transfers in that order. The period is only modified if
    /// both matchers succeed.
    pub fn reconcile_period(
        period: &mut Period,
        transfers: &TransferMatcher,
    ) -> Result<PeriodReport, ReconcileError> {
        let mut work = period.clone();
        work.clear_links();
        work.sort_by_date();

        let exchanges = match_exchanges(&mut work.expenses, &mut work.incomes)?;
        tracing::info!(period = %work.name, pairs = exchanges.pairs.len(), "linked exchanges");
        let transfers = transfers.match_transfers(&mut work)?;

        *period = work;
        Ok(PeriodReport { exchanges, transfers })
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use crate::util::fixtures::*;
        use saldo_core::TransactionType::{Expense, Income};

        fn mixed_period() -> Period {
            Period::new(
                "2019",
                vec![
                    transfer(Expense, 0, 20, "300", "Oszczędności", "pekao"),
                    leg(Expense, 1, 4, "100", "EUR", "EUR/PLN", "4.3"),
                    expense(2, 1, "15", "Jedzenie"),
                ],
                vec![
                    leg(Income, 0, 4, "430", "PLN", "EUR/PLN", "4.3"),
                    transfer(Income, 1, 20, "300", "Oszczędności", "revolut"),
                ],
            )
        }

        #[test]
        fn sorts_then_links_both_kinds() {
            let mut period = mixed_period();
            let report = reconcile_period(&mut period, &TransferMatcher::default()).unwrap();
            assert_eq!(report.exchanges.pairs, vec![ExchangePair { expense: 1, income: 0 }]);
            assert_eq!(report.transfers.pairs.len(), 1);

            let order: Vec<_> = period.expenses.iter().map(|r| r.local_index).collect();
            assert_eq!(order, vec![2, 1, 0]);
            assert_eq!(period.find(Expense, 0).unwrap().match_ref, Some(1));
            assert_eq!(period.find(Expense, 1).unwrap().match_ref, Some(0));
            assert!(period.find(Expense, 2).unwrap().match_ref.is_none());
        }

        #[test]
        fn failure_leaves_period_untouched() {
            let mut period = mixed_period();
            period.incomes.push(transfer(Income, 2, 21, "300", "Oszczędności", "revolut"));
            let before = period.clone();
            let err = reconcile_period(&mut period, &TransferMatcher::default()).unwrap_err();
            assert!(matches!(err, ReconcileError::UnbalancedTransfers(_)));
            assert_eq!(period, before);
        }

        #[test]
        fn stale_links_from_input_are_dropped() {
            // An earlier export left calc_ref_idx on rows neither matcher pairs.
            let mut period = Period::new(
                "2019",
                vec![expense(0, 1, "15", "Jedzenie")],
                vec![income(0, 2, "5000", "Praca")],
            );
            period.expenses[0].match_ref = Some(0);
            reconcile_period(&mut period, &TransferMatcher::default()).unwrap();
            assert!(period.rows().all(|r| r.match_ref.is_none()));

            let ledger = remap_periods(&[period]).unwrap();
            for row in ledger.all() {
                if let Some(r) = row.global_ref {
                    assert_eq!(ledger.find(r).unwrap().global_ref, Some(row.global_index));
                }
            }
            assert!(ledger.all().iter().all(|r| r.global_ref.is_none()));
        }

        #[test]
        fn stale_links_are_replaced_by_fresh_pairs() {
            let mut period = mixed_period();
            period.expenses[2].match_ref = Some(1);
            period.incomes[1].match_ref = Some(2);
            reconcile_period(&mut period, &TransferMatcher::default()).unwrap();
            assert!(period.find(Expense, 2).unwrap().match_ref.is_none());
            assert_eq!(period.find(Income, 1).unwrap().match_ref, Some(0));
        }

        #[test]
        fn reconciling_twice_is_idempotent() {
            let matcher = TransferMatcher::default();
            let mut once = mixed_period();
            reconcile_period(&mut once, &matcher).unwrap();
            let mut twice = once.clone();
            reconcile_period(&mut twice, &matcher).unwrap();
            assert_eq!(once, twice);
        }
    }
}
