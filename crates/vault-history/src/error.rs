use vault_store::StoreError;
use vault_types::BlockSeq;

/// Errors from the history index.
#[derive(Debug, thiserror::Error)]
pub enum HistoryError {
    /// The index disagrees with the canonical block at `seq`.
    #[error("history index corrupted at block {seq}: {reason}")]
    Corrupted { seq: BlockSeq, reason: String },

    #[error("expected block {expected} next, got {got}")]
    OutOfOrder { expected: BlockSeq, got: BlockSeq },

    #[error("history record cannot be decoded: {0}")]
    Decode(String),

    #[error("history record cannot be encoded: {0}")]
    Encode(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl HistoryError {
    pub(crate) fn corrupted(seq: BlockSeq, reason: impl Into<String>) -> Self {
        Self::Corrupted {
            seq,
            reason: reason.into(),
        }
    }
}

pub type HistoryResult<T> = Result<T, HistoryError>;
