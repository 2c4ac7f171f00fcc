use anyhow::{bail, Context, Result};
use saldo_core::{AccountVocabulary, KnownAccount, VocabularyError};
use saldo_reconcile::DEFAULT_TRANSFER_MARKER;
use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Where one period's normalized tables live.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PeriodSource {
    pub name: String,
    pub expenses: PathBuf,
    pub incomes: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub output_dir: PathBuf,
    #[serde(default = "default_marker")]
    pub transfer_marker: String,
    /// Also write the distinct values of every selector column.
    #[serde(default)]
    pub selector_values: bool,
    /// Remapping order is the order of this list.
    pub periods: Vec<PeriodSource>,
    /// Empty means the built-in vocabulary.
    #[serde(default)]
    pub accounts: Vec<KnownAccount>,
}

fn default_marker() -> String {
    DEFAULT_TRANSFER_MARKER.to_string()
}

impl Config {
    pub fn from_toml(toml_content: &str) -> Result<Self> {
        let config: Config = toml::from_str(toml_content).context("Failed to parse config")?;
        config.validate()?;
        Ok(config)
    }

    /// Loads a config file; relative paths inside it resolve against the
    /// file's own directory.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Reading config file: {}", path.display()))?;
        let mut config = Self::from_toml(&text)
            .with_context(|| format!("Loading config file: {}", path.display()))?;
        if let Some(base) = path.parent() {
            config.resolve_paths(base);
        }
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.periods.is_empty() {
            bail!("No periods configured");
        }
        let mut names = HashSet::new();
        for period in &self.periods {
            if !names.insert(period.name.as_str()) {
                bail!("Period '{}' is configured twice", period.name);
            }
        }
        if self.transfer_marker.trim().is_empty() {
            bail!("transfer_marker must not be empty");
        }
        Ok(())
    }

    fn resolve_paths(&mut self, base: &Path) {
        let resolve = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        };
        resolve(&mut self.output_dir);
        for period in &mut self.periods {
            resolve(&mut period.expenses);
            resolve(&mut period.incomes);
        }
    }

    pub fn vocabulary(&self) -> Result<AccountVocabulary, VocabularyError> {
        if self.accounts.is_empty() {
            Ok(AccountVocabulary::default())
        } else {
            AccountVocabulary::new(self.accounts.clone())
        }
    }
}
