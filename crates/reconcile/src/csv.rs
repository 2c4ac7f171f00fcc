use chrono::NaiveDate;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use saldo_core::{Amount, Category, RowIndex, TransactionRecord, TransactionType};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

use crate::remap::LinkedRecord;

#[derive(Error, Debug)]
pub enum CsvError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),
    #[error("Invalid date format: {0}")]
    InvalidDate(String),
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),
    #[error("Invalid row index: {0}")]
    InvalidIndex(String),
    #[error("{source_name}: column {position} should be '{expected}', found '{found}'")]
    UnexpectedColumn {
        source_name: String,
        position: usize,
        expected: &'static str,
        found: String,
    },
    #[error("Row {row}: expected transaction type {expected}, found '{found}'")]
    WrongSide {
        row: usize,
        expected: TransactionType,
        found: String,
    },
}

/// Columns of a normalized period table, in export order.
pub const PERIOD_COLUMNS: [&str; 12] = [
    "idx",
    "date",
    "description",
    "amount",
    "currency",
    "category",
    "payment_method",
    "account",
    "exchange_rate",
    "currencies",
    "calc_ref_idx",
    "transaction_type",
];

/// A row of a normalized period table, as text.
#[derive(Debug, Deserialize)]
struct CsvRow {
    idx: String,
    date: String,
    #[serde(default)]
    description: Option<String>,
    amount: String,
    currency: String,
    category: String,
    #[serde(default)]
    payment_method: Option<String>,
    #[serde(default)]
    account: Option<String>,
    #[serde(default)]
    exchange_rate: Option<String>,
    #[serde(default)]
    currencies: Option<String>,
    #[serde(default)]
    calc_ref_idx: Option<String>,
    #[serde(default)]
    transaction_type: Option<String>,
}

impl CsvRow {
    fn into_record(self, row: usize, side: TransactionType) -> Result<TransactionRecord, CsvError> {
        if let Some(found) = self.transaction_type.as_deref().filter(|s| !s.trim().is_empty()) {
            if found.parse::<TransactionType>() != Ok(side) {
                return Err(CsvError::WrongSide {
                    row,
                    expected: side,
                    found: found.to_string(),
                });
            }
        }

        Ok(TransactionRecord {
            local_index: parse_index(&self.idx)?,
            date: parse_date(&self.date)?,
            description: self.description.unwrap_or_default(),
            amount: parse_amount(&self.amount)?,
            currency: self.currency.trim().to_string(),
            category: Category::from(self.category.trim()),
            payment_method: self.payment_method.unwrap_or_default(),
            account: self.account.unwrap_or_default(),
            exchange_rate: non_empty(self.exchange_rate).map(|s| parse_decimal(&s)).transpose()?,
            currencies: non_empty(self.currencies).map(|s| s.trim().to_string()),
            match_ref: non_empty(self.calc_ref_idx).map(|s| parse_index(&s)).transpose()?,
            transaction_type: side,
        })
    }
}

/// A row of the combined output tables.
#[derive(Debug, Serialize)]
struct LinkedRow<'a> {
    global_index: RowIndex,
    date: NaiveDate,
    description: &'a str,
    amount: Amount,
    currency: &'a str,
    category: &'a str,
    payment_method: &'a str,
    account: &'a str,
    exchange_rate: Option<Decimal>,
    currencies: Option<&'a str>,
    global_ref: Option<RowIndex>,
    transaction_type: TransactionType,
    period: &'a str,
}

impl<'a> From<&'a LinkedRecord> for LinkedRow<'a> {
    fn from(linked: &'a LinkedRecord) -> Self {
        let r = &linked.record;
        LinkedRow {
            global_index: linked.global_index,
            date: r.date,
            description: &r.description,
            amount: r.amount,
            currency: &r.currency,
            category: r.category.as_str(),
            payment_method: &r.payment_method,
            account: &r.account,
            exchange_rate: r.exchange_rate,
            currencies: r.currencies.as_deref(),
            global_ref: linked.global_ref,
            transaction_type: r.transaction_type,
            period: &linked.period,
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.trim().is_empty())
}

/// Strips spreadsheet formatting: regular and non-breaking spaces, decimal
/// comma.
fn clean_number(s: &str) -> String {
    s.chars()
        .filter(|c| !c.is_whitespace())
        .map(|c| if c == ',' { '.' } else { c })
        .collect()
}

fn parse_date(s: &str) -> Result<NaiveDate, CsvError> {
    let s = s.trim();
    // Exports may carry a midnight time component.
    let day = s.split([' ', 'T']).next().unwrap_or(s);

    for fmt in &["%Y-%m-%d", "%Y/%m/%d", "%d.%m.%Y", "%d/%m/%Y"] {
        if let Ok(date) = NaiveDate::parse_from_str(day, fmt) {
            return Ok(date);
        }
    }

    Err(CsvError::InvalidDate(s.to_string()))
}

fn parse_decimal(s: &str) -> Result<Decimal, CsvError> {
    let cleaned = clean_number(s);
    Decimal::from_str(&cleaned).map_err(|_| CsvError::InvalidAmount(s.to_string()))
}

fn parse_amount(s: &str) -> Result<Amount, CsvError> {
    Amount::new(parse_decimal(s)?).ok_or_else(|| CsvError::InvalidAmount(s.to_string()))
}

/// Accepts `12` as well as the float rendering `12.0` that a column with
/// gaps picks up in spreadsheet tools.
fn parse_index(s: &str) -> Result<RowIndex, CsvError> {
    let invalid = || CsvError::InvalidIndex(s.to_string());
    let dec = Decimal::from_str(&clean_number(s)).map_err(|_| invalid())?;
    if !dec.fract().is_zero() || dec.is_sign_negative() {
        return Err(invalid());
    }
    dec.to_u64().ok_or_else(invalid)
}

/// Every table carries exactly `PERIOD_COLUMNS`, in that order.
fn check_columns(headers: &csv::StringRecord, source_name: &str) -> Result<(), CsvError> {
    let found: Vec<&str> = headers.iter().map(str::trim).collect();
    for position in 0..PERIOD_COLUMNS.len().max(found.len()) {
        let expected = PERIOD_COLUMNS.get(position).copied();
        let actual = found.get(position).copied();
        if expected != actual {
            return Err(CsvError::UnexpectedColumn {
                source_name: source_name.to_string(),
                position: position + 1,
                expected: expected.unwrap_or("<end of header>"),
                found: actual.unwrap_or("<missing>").to_string(),
            });
        }
    }
    Ok(())
}

/// Reads one side of a period table. Blank lines are skipped.
pub fn read_records<R: Read>(data: R, side: TransactionType) -> Result<Vec<TransactionRecord>, CsvError> {
    read_named(data, side, "<input>")
}

fn read_named<R: Read>(data: R, side: TransactionType, source_name: &str) -> Result<Vec<TransactionRecord>, CsvError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(data);
    let headers = reader.headers()?.clone();
    check_columns(&headers, source_name)?;

    let mut records = Vec::new();
    for (n, result) in reader.records().enumerate() {
        let record = result?;
        if record.iter().all(|field| field.trim().is_empty()) {
            continue;
        }
        let row: CsvRow = record.deserialize(Some(&headers))?;
        // Header is line 1.
        records.push(row.into_record(n + 2, side)?);
    }

    Ok(records)
}

pub fn read_records_file(path: &Path, side: TransactionType) -> Result<Vec<TransactionRecord>, CsvError> {
    read_named(File::open(path)?, side, &path.display().to_string())
}

/// Writes records with the same columns they were read from.
pub fn write_records<W: Write>(data: W, records: &[TransactionRecord]) -> Result<(), CsvError> {
    let mut writer = csv::Writer::from_writer(data);
    for record in records {
        writer.serialize(record)?;
    }
    writer.flush()?;
    Ok(())
}

pub fn write_linked<W: Write>(data: W, records: &[&LinkedRecord]) -> Result<(), CsvError> {
    let mut writer = csv::Writer::from_writer(data);
    for record in records {
        writer.serialize(LinkedRow::from(*record))?;
    }
    writer.flush()?;
    Ok(())
}

/// A fully written temporary sibling of `path`, waiting to be renamed over
/// it. Dropped without `commit`, the temporary file is removed.
#[derive(Debug)]
pub struct StagedFile {
    tmp: Option<PathBuf>,
    path: PathBuf,
}

impl StagedFile {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn commit(mut self) -> Result<PathBuf, CsvError> {
        if let Some(tmp) = self.tmp.take() {
            if let Err(e) = fs::rename(&tmp, &self.path) {
                let _ = fs::remove_file(&tmp);
                return Err(e.into());
            }
        }
        Ok(std::mem::take(&mut self.path))
    }
}

impl Drop for StagedFile {
    fn drop(&mut self) {
        if let Some(tmp) = self.tmp.take() {
            let _ = fs::remove_file(tmp);
        }
    }
}

/// Writes the contents of `path` into its temporary sibling. Nothing under
/// the final name changes until the returned file is committed.
pub fn stage_file<F>(path: &Path, write: F) -> Result<StagedFile, CsvError>
where
    F: FnOnce(&mut File) -> Result<(), CsvError>,
{
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let tmp = tmp_path(path);
    let mut file = File::create(&tmp)?;
    let staged = StagedFile {
        tmp: Some(tmp),
        path: path.to_path_buf(),
    };
    write(&mut file)?;
    file.sync_all()?;
    Ok(staged)
}

/// Writes `path` through a temporary sibling so that a failure never leaves
/// a half-written file under the final name.
pub fn write_atomically<F>(path: &Path, write: F) -> Result<(), CsvError>
where
    F: FnOnce(&mut File) -> Result<(), CsvError>,
{
    stage_file(path, write)?.commit()?;
    Ok(())
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}
