use saldo_core::{normalize, ReconcileError, TransactionRecord, TransactionType};

/// Fails with the first row whose date is earlier than its predecessor's.
pub fn ensure_sorted_by_date(
    rows: &[TransactionRecord],
    side: TransactionType,
) -> Result<(), ReconcileError> {
    match rows.windows(2).find(|w| w[1].date < w[0].date) {
        Some(w) => Err(ReconcileError::UnsortedInput {
            side,
            index: w[1].local_index,
        }),
        None => Ok(()),
    }
}

/// Prefix test on normalized text, the same form account tokens are
/// searched in.
pub fn starts_with_marker(description: &str, marker: &str) -> bool {
    let marker = normalize(marker);
    !marker.is_empty() && normalize(description).starts_with(&marker)
}
