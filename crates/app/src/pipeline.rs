use anyhow::{Context, Result};
use saldo_core::{Period, ReconcileError, TransactionRecord, TransactionType};
use saldo_reconcile::csv::{read_records_file, stage_file, write_atomically, write_linked, write_records};
use saldo_reconcile::reconcile::{reconcile_period, PeriodReport};
use saldo_reconcile::{remap_periods, CombinedLedger, PairingStrategy, TransferMatcher};
use std::collections::{BTreeMap, BTreeSet};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::config::{Config, PeriodSource};

pub const EXPENSES_OUTPUT: &str = "finance_expenses_all.csv";
pub const INCOMES_OUTPUT: &str = "finance_incomes_all.csv";
pub const ALL_OUTPUT: &str = "finance_all.csv";

#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    /// Reconcile and remap, but write nothing.
    pub dry_run: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeriodSummary {
    pub name: String,
    pub expenses: usize,
    pub incomes: usize,
    pub exchange_pairs: usize,
    pub transfer_pairs: usize,
    /// Transfer pairs that needed the account vocabulary.
    pub by_account_pairs: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RunSummary {
    pub periods: Vec<PeriodSummary>,
    pub total_rows: usize,
    pub outputs: Vec<PathBuf>,
}

/// Loads, reconciles and remaps every configured period, then writes the
/// combined tables. Nothing is written unless every period reconciled.
pub fn run(config: &Config, options: RunOptions) -> Result<RunSummary> {
    let vocabulary = config.vocabulary().context("Building account vocabulary")?;
    let matcher = TransferMatcher::new(&config.transfer_marker, vocabulary);

    let mut periods = Vec::with_capacity(config.periods.len());
    let mut summary = RunSummary::default();

    for source in &config.periods {
        let mut period = load_period(source)?;
        match period.date_range() {
            Some(range) => tracing::info!(
                period = %period.name,
                expenses = period.expenses.len(),
                incomes = period.incomes.len(),
                %range,
                "loaded period"
            ),
            None => tracing::warn!(period = %period.name, "period has no rows"),
        }

        let report = match reconcile_period(&mut period, &matcher) {
            Ok(report) => report,
            Err(err) => {
                if !options.dry_run && matches!(err, ReconcileError::UnbalancedTransfers(_)) {
                    if let Err(diag) = write_imbalance_diagnostics(&config.output_dir, &period, &err) {
                        tracing::error!(error = %diag, "could not write imbalance diagnostics");
                    }
                }
                return Err(err).with_context(|| format!("Reconciling period '{}'", source.name));
            }
        };

        summary.periods.push(period_summary(&period, &report));
        periods.push(period);
    }

    let ledger = remap_periods(&periods).context("Remapping periods")?;
    summary.total_rows = ledger.len();

    if options.dry_run {
        tracing::info!(rows = summary.total_rows, "dry run, nothing written");
        return Ok(summary);
    }

    summary.outputs = write_outputs(&config.output_dir, &ledger)?;
    if config.selector_values {
        summary
            .outputs
            .extend(write_selector_values(&config.output_dir, &periods)?);
    }

    for path in &summary.outputs {
        tracing::info!(path = %path.display(), "written");
    }
    Ok(summary)
}

fn load_period(source: &PeriodSource) -> Result<Period> {
    let expenses = read_records_file(&source.expenses, TransactionType::Expense)
        .with_context(|| format!("Reading expenses: {}", source.expenses.display()))?;
    let incomes = read_records_file(&source.incomes, TransactionType::Income)
        .with_context(|| format!("Reading incomes: {}", source.incomes.display()))?;
    Ok(Period::new(source.name.clone(), expenses, incomes))
}

fn period_summary(period: &Period, report: &PeriodReport) -> PeriodSummary {
    PeriodSummary {
        name: period.name.clone(),
        expenses: period.expenses.len(),
        incomes: period.incomes.len(),
        exchange_pairs: report.exchanges.pairs.len(),
        transfer_pairs: report.transfers.pairs.len(),
        by_account_pairs: report.transfers.count(PairingStrategy::ByAccount),
    }
}

fn write_outputs(dir: &Path, ledger: &CombinedLedger) -> Result<Vec<PathBuf>> {
    let expenses: Vec<_> = ledger.expenses.iter().collect();
    let incomes: Vec<_> = ledger.incomes.iter().collect();
    let all = ledger.all();

    // All three are staged before any replaces its predecessor, so a write
    // failure leaves the previous set intact.
    let mut staged = Vec::new();
    for (name, rows) in [
        (EXPENSES_OUTPUT, &expenses),
        (INCOMES_OUTPUT, &incomes),
        (ALL_OUTPUT, &all),
    ] {
        let path = dir.join(name);
        let file = stage_file(&path, |file| write_linked(file, rows))
            .with_context(|| format!("Writing {}", path.display()))?;
        staged.push(file);
    }

    staged
        .into_iter()
        .map(|file| {
            let path = file.path().to_path_buf();
            file.commit()
                .with_context(|| format!("Replacing {}", path.display()))
        })
        .collect()
}

/// Dumps the transfer rows behind an imbalance, by date, next to the
/// canonical outputs.
fn write_imbalance_diagnostics(dir: &Path, period: &Period, err: &ReconcileError) -> Result<PathBuf> {
    let amounts = err.unbalanced_amounts();
    let mut rows: Vec<TransactionRecord> = period
        .rows()
        .filter(|r| r.is_transfer_leg() && amounts.contains(&r.amount))
        .cloned()
        .collect();
    rows.sort_by_key(|r| r.date);

    let path = dir
        .join("diagnostics")
        .join(format!("{}_unbalanced_transfers.csv", period.name));
    write_atomically(&path, |file| write_records(file, &rows))
        .with_context(|| format!("Writing {}", path.display()))?;
    tracing::warn!(path = %path.display(), rows = rows.len(), "wrote unbalanced transfer rows");
    Ok(path)
}

const SELECTOR_COLUMNS: &[&str] = &[
    "currency",
    "category",
    "payment_method",
    "account",
    "currencies",
    "transaction_type",
];

fn selector_value(record: &TransactionRecord, column: &str) -> Option<String> {
    let value = match column {
        "currency" => record.currency.clone(),
        "category" => record.category.to_string(),
        "payment_method" => record.payment_method.clone(),
        "account" => record.account.clone(),
        "currencies" => record.currencies.clone()?,
        "transaction_type" => record.transaction_type.to_string(),
        _ => return None,
    };
    Some(value).filter(|v| !v.is_empty())
}

/// Distinct values of every selector column across all periods.
pub fn collect_selector_values(periods: &[Period]) -> BTreeMap<&'static str, BTreeSet<String>> {
    let mut values: BTreeMap<&'static str, BTreeSet<String>> =
        SELECTOR_COLUMNS.iter().map(|c| (*c, BTreeSet::new())).collect();
    for record in periods.iter().flat_map(|p| p.rows()) {
        for (column, set) in values.iter_mut() {
            if let Some(value) = selector_value(record, column) {
                set.insert(value);
            }
        }
    }
    values
}

fn write_selector_values(dir: &Path, periods: &[Period]) -> Result<Vec<PathBuf>> {
    let mut written = Vec::new();
    for (column, values) in collect_selector_values(periods) {
        let path = dir.join("selector_values").join(format!("{column}_values.txt"));
        write_atomically(&path, |file| {
            for value in &values {
                writeln!(file, "{value}")?;
            }
            Ok(())
        })
        .with_context(|| format!("Writing {}", path.display()))?;
        written.push(path);
    }
    Ok(written)
}

pub fn log_summary(summary: &RunSummary) {
    for p in &summary.periods {
        tracing::info!(
            period = %p.name,
            expenses = p.expenses,
            incomes = p.incomes,
            exchange_pairs = p.exchange_pairs,
            transfer_pairs = p.transfer_pairs,
            by_account = p.by_account_pairs,
            "period reconciled"
        );
    }
    tracing::info!(rows = summary.total_rows, outputs = summary.outputs.len(), "run complete");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    const HEADER: &str = "idx,date,description,amount,currency,category,payment_method,account,exchange_rate,currencies,calc_ref_idx,transaction_type\n";

    struct Fixture {
        dir: tempfile::TempDir,
        config: Config,
    }

    /// Two periods: an exchange and a plain transfer in 2019, two same-amount
    /// transfers told apart by description in 2020.
    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let files = [
            (
                "2019_expenses.csv",
                "0,2019-03-02,Wymiana,100,EUR,exchange,bankTransfer,revolut,4.3,EUR/PLN,,expense\n\
                 1,2019-03-01,Biedronka,45.90,PLN,Jedzenie,card,pekao,,,,expense\n\
                 2,2019-03-10,Oszczędności,300,PLN,myAccount,bankTransfer,pekao,,,,expense\n",
            ),
            (
                "2019_incomes.csv",
                "0,2019-03-02,Wymiana,430,PLN,exchange,bankTransfer,revolut,4.3,EUR/PLN,,income\n\
                 1,2019-03-11,Oszczędności,300,PLN,myAccount,bankTransfer,nestBank,,,,income\n",
            ),
            (
                "2020_expenses.csv",
                "0,2020-01-05,Przelew z Pekao do Revolut,200,PLN,myAccount,bankTransfer,pekao,,,,expense\n\
                 1,2020-01-05,Przelew z Pekao do Alior,200,PLN,myAccount,bankTransfer,pekao,,,,expense\n",
            ),
            (
                "2020_incomes.csv",
                "0,2020-01-05,Przelew z Pekao do Alior,200,PLN,myAccount,bankTransfer,aliorBank,,,,income\n\
                 1,2020-01-06,Przelew z Pekao do Revolut,200,PLN,myAccount,bankTransfer,revolut,,,,income\n",
            ),
        ];
        for (name, rows) in files {
            fs::write(dir.path().join(name), format!("{HEADER}{rows}")).unwrap();
        }

        let mut config = Config::from_toml(
            r#"
            output_dir = "all"
            selector_values = true

            [[periods]]
            name = "2019"
            expenses = "2019_expenses.csv"
            incomes = "2019_incomes.csv"

            [[periods]]
            name = "2020"
            expenses = "2020_expenses.csv"
            incomes = "2020_incomes.csv"
        "#,
        )
        .unwrap();
        config.output_dir = dir.path().join("all");
        for period in &mut config.periods {
            period.expenses = dir.path().join(&period.expenses);
            period.incomes = dir.path().join(&period.incomes);
        }
        Fixture { dir, config }
    }

    fn read(path: &Path) -> String {
        fs::read_to_string(path).unwrap()
    }

    #[test]
    fn end_to_end_writes_linked_tables() {
        let f = fixture();
        let summary = run(&f.config, RunOptions::default()).unwrap();

        assert_eq!(summary.total_rows, 9);
        assert_eq!(summary.periods.len(), 2);
        assert_eq!(summary.periods[0].exchange_pairs, 1);
        assert_eq!(summary.periods[0].transfer_pairs, 1);
        assert_eq!(summary.periods[1].transfer_pairs, 2);
        assert_eq!(summary.periods[1].by_account_pairs, 2);

        let all = read(&f.config.output_dir.join(ALL_OUTPUT));
        let lines: Vec<&str> = all.lines().collect();
        assert_eq!(lines.len(), 10);
        assert!(lines[0].starts_with("global_index,"));
        // 2019 offsets: expenses 0, incomes 3. The exchange expense pairs with income 0.
        assert!(lines[1].starts_with("0,2019-03-02,Wymiana,100,EUR,exchange,"), "{}", lines[1]);
        assert!(lines[1].ends_with(",3,expense,2019"), "{}", lines[1]);
        assert!(lines[4].ends_with(",0,income,2019"), "{}", lines[4]);
        // 2020 offsets: expenses 5, incomes 7. Revolut expense pairs with income 1.
        assert!(lines[6].starts_with("5,2020-01-05,Przelew z Pekao do Revolut,"), "{}", lines[6]);
        assert!(lines[6].ends_with(",8,expense,2020"), "{}", lines[6]);
        assert!(lines[7].ends_with(",7,expense,2020"), "{}", lines[7]);

        let expenses = read(&f.config.output_dir.join(EXPENSES_OUTPUT));
        assert_eq!(expenses.lines().count(), 6);
        let incomes = read(&f.config.output_dir.join(INCOMES_OUTPUT));
        assert_eq!(incomes.lines().count(), 5);
    }

    #[test]
    fn selector_values_are_sorted_and_distinct() {
        let f = fixture();
        run(&f.config, RunOptions::default()).unwrap();
        let dir = f.config.output_dir.join("selector_values");
        assert_eq!(read(&dir.join("currency_values.txt")), "EUR\nPLN\n");
        assert_eq!(read(&dir.join("currencies_values.txt")), "EUR/PLN\n");
        assert_eq!(read(&dir.join("transaction_type_values.txt")), "expense\nincome\n");
        assert_eq!(
            read(&dir.join("category_values.txt")),
            "Jedzenie\nexchange\nmyAccount\n"
        );
    }

    #[test]
    fn reruns_produce_identical_outputs() {
        let f = fixture();
        run(&f.config, RunOptions::default()).unwrap();
        let first = read(&f.config.output_dir.join(ALL_OUTPUT));
        run(&f.config, RunOptions::default()).unwrap();
        assert_eq!(read(&f.config.output_dir.join(ALL_OUTPUT)), first);
    }

    #[test]
    fn dry_run_writes_nothing() {
        let f = fixture();
        let summary = run(&f.config, RunOptions { dry_run: true }).unwrap();
        assert_eq!(summary.total_rows, 9);
        assert!(summary.outputs.is_empty());
        assert!(!f.config.output_dir.exists());
    }

    #[test]
    fn imbalance_aborts_with_diagnostics_only() {
        let f = fixture();
        let extra = "2,2020-01-07,Oszczędności,200,PLN,myAccount,bankTransfer,pekao,,,,income\n";
        let path = &f.config.periods[1].incomes;
        fs::write(path, format!("{}{extra}", read(path))).unwrap();

        let err = run(&f.config, RunOptions::default()).unwrap_err();
        assert!(format!("{err:#}").contains("Reconciling period '2020'"), "{err:#}");
        assert!(!f.config.output_dir.join(ALL_OUTPUT).exists());

        let diag = read(&f.config.output_dir.join("diagnostics").join("2020_unbalanced_transfers.csv"));
        let lines: Vec<&str> = diag.lines().collect();
        assert_eq!(lines.len(), 6);
        assert!(lines[1].contains(",2020-01-05,"));
        assert!(lines[5].contains(",2020-01-07,"));
    }

    #[test]
    fn failed_output_write_keeps_previous_set() {
        let f = fixture();
        let out = &f.config.output_dir;
        fs::create_dir_all(out).unwrap();
        for name in [EXPENSES_OUTPUT, INCOMES_OUTPUT, ALL_OUTPUT] {
            fs::write(out.join(name), "previous run\n").unwrap();
        }
        // The incomes table cannot be staged while a directory holds its
        // temporary name.
        fs::create_dir(out.join(format!("{INCOMES_OUTPUT}.tmp"))).unwrap();

        let err = run(&f.config, RunOptions::default()).unwrap_err();
        assert!(format!("{err:#}").contains(INCOMES_OUTPUT), "{err:#}");
        for name in [EXPENSES_OUTPUT, INCOMES_OUTPUT, ALL_OUTPUT] {
            assert_eq!(read(&out.join(name)), "previous run\n", "{name}");
        }
        assert!(!out.join(format!("{EXPENSES_OUTPUT}.tmp")).exists());
    }

    #[test]
    fn misnamed_column_fails_before_reconciling() {
        let f = fixture();
        let path = &f.config.periods[1].expenses;
        fs::write(path, read(path).replacen("exchange_rate", "exchangeRate", 1)).unwrap();

        let err = run(&f.config, RunOptions::default()).unwrap_err();
        let msg = format!("{err:#}");
        assert!(msg.contains("2020_expenses.csv") && msg.contains("exchangeRate"), "{msg}");
        assert!(!f.config.output_dir.exists());
    }

    #[test]
    fn unreadable_input_names_the_file() {
        let f = fixture();
        let mut config = f.config.clone();
        config.periods[0].expenses = f.dir.path().join("missing.csv");
        let err = run(&config, RunOptions::default()).unwrap_err();
        assert!(format!("{err:#}").contains("missing.csv"), "{err:#}");
    }
}
