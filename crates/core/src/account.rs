use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum VocabularyError {
    #[error("Failed to parse account vocabulary: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Account vocabulary is empty")]
    Empty,
    #[error("Account '{0}' has an empty alias")]
    EmptyAlias(String),
}

/// One of the user's own accounts, as named in the `account` column, plus the
/// spellings under which it appears in free-text descriptions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnownAccount {
    pub key: String,
    #[serde(default)]
    pub aliases: Vec<String>,
}

impl KnownAccount {
    pub fn new(key: &str, aliases: &[&str]) -> Self {
        KnownAccount {
            key: key.to_string(),
            aliases: aliases.iter().map(|a| a.to_string()).collect(),
        }
    }

    /// The key followed by every alias.
    fn spellings(&self) -> impl Iterator<Item = &String> {
        std::iter::once(&self.key).chain(self.aliases.iter())
    }
}

/// A token of the vocabulary located inside a normalized text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenHit<'a> {
    pub account: &'a str,
    /// Byte offset of the first matched byte.
    pub start: usize,
    /// Byte offset one past the last matched byte.
    pub end: usize,
}

#[derive(Debug, Clone)]
struct Token {
    account: usize,
    text: String,
}

/// Account names the transfer matcher can recognise inside descriptions.
///
/// Every key is also a token of its own account, so `"Przelew z pekao do
/// revolut"` resolves without any alias configured.
#[derive(Debug, Clone)]
pub struct AccountVocabulary {
    accounts: Vec<KnownAccount>,
    tokens: Vec<Token>,
}

#[derive(Deserialize)]
struct VocabularyFile {
    accounts: Vec<KnownAccount>,
}

impl AccountVocabulary {
    pub fn new(accounts: Vec<KnownAccount>) -> Result<Self, VocabularyError> {
        if accounts.is_empty() {
            return Err(VocabularyError::Empty);
        }

        for account in &accounts {
            if account.spellings().any(|raw| normalize(raw).is_empty()) {
                return Err(VocabularyError::EmptyAlias(account.key.clone()));
            }
        }

        Ok(Self::indexed(accounts))
    }

    fn indexed(accounts: Vec<KnownAccount>) -> Self {
        let mut tokens = Vec::new();
        for (idx, account) in accounts.iter().enumerate() {
            for raw in account.spellings() {
                let text = normalize(raw);
                if !tokens.iter().any(|t: &Token| t.account == idx && t.text == text) {
                    tokens.push(Token { account: idx, text });
                }
            }
        }
        AccountVocabulary { accounts, tokens }
    }

    pub fn from_toml(toml_content: &str) -> Result<Self, VocabularyError> {
        let file: VocabularyFile = toml::from_str(toml_content)?;
        Self::new(file.accounts)
    }

    pub fn accounts(&self) -> &[KnownAccount] {
        &self.accounts
    }

    /// Finds the vocabulary token that starts earliest in `text` at or after
    /// byte offset `from`. When several tokens start at the same offset the
    /// longest wins, so `"aliorbank"` beats `"alior"`.
    ///
    /// `text` must already be normalized.
    pub fn find_token(&self, text: &str, from: usize) -> Option<TokenHit<'_>> {
        let haystack = text.get(from..)?;
        self.tokens
            .iter()
            .filter_map(|token| {
                haystack
                    .find(&token.text)
                    .map(|pos| (from + pos, token.text.len(), token.account))
            })
            .min_by(|a, b| a.0.cmp(&b.0).then(b.1.cmp(&a.1)))
            .map(|(start, len, account)| TokenHit {
                account: &self.accounts[account].key,
                start,
                end: start + len,
            })
    }

    /// Parses a transfer description into its `(from, to)` account keys: the
    /// earliest token is the source, the next token after it the destination.
    pub fn resolve_route(&self, description: &str) -> Option<(&str, &str)> {
        let text = normalize(description);
        let from = self.find_token(&text, 0)?;
        let to = self.find_token(&text, from.end)?;
        Some((from.account, to.account))
    }
}

impl Default for AccountVocabulary {
    fn default() -> Self {
        let accounts = DEFAULT_ACCOUNTS
            .iter()
            .map(|(key, aliases)| KnownAccount::new(key, aliases))
            .collect();
        Self::indexed(accounts)
    }
}

/// Strips every whitespace character and case-folds, so that `"Nest Bank"`,
/// `"nestBank"` and `"NESTBANK"` all compare equal.
pub fn normalize(s: &str) -> String {
    s.chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect()
}

pub const DEFAULT_ACCOUNTS: &[(&str, &[&str])] = &[
    ("pekao", &["Pekao"]),
    ("veloBank", &["VeloBank"]),
    ("nestBank", &["Nest Bank"]),
    ("aliorBank", &["Alior Bank", "Alior"]),
    ("revolut", &["Revolut"]),
    ("mBank", &["mBank"]),
    ("cardByCliq", &["CardByCliq"]),
    ("cash", &["Gotówka"]),
    ("creditAgricole", &["Credit Agricole"]),
];
