pub mod account;
pub mod error;
pub mod money;
pub mod period;
pub mod transaction;

pub use account::{normalize, AccountVocabulary, KnownAccount, TokenHit, VocabularyError, DEFAULT_ACCOUNTS};
pub use error::{ReconcileError, TransferImbalance};
pub use money::Amount;
pub use period::{DateRange, Period};
pub use transaction::{Category, RowIndex, TransactionRecord, TransactionType};
