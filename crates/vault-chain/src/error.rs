use vault_store::StoreError;
use vault_types::BlockSeq;

/// Errors from canonical chain access and verification.
#[derive(Debug, thiserror::Error)]
pub enum ChainError {
    #[error("block {0} is missing")]
    MissingBlock(BlockSeq),

    #[error("signature for block {0} is missing")]
    MissingSignature(BlockSeq),

    #[error("signature for block {0} is invalid")]
    InvalidSignature(BlockSeq),

    #[error("block {seq} cannot be decoded: {reason}")]
    Decode { seq: BlockSeq, reason: String },

    #[error("block key has {len} bytes, expected 8")]
    CorruptKey { len: usize },

    #[error("block encoding failed: {0}")]
    Encode(String),

    #[error("expected block {expected}, got {got}")]
    OutOfOrder { expected: BlockSeq, got: BlockSeq },

    #[error("block {0} does not link to its predecessor")]
    BrokenLink(BlockSeq),

    #[error("verification needs at least one worker")]
    InvalidWorkerCount,

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ChainError {
    /// Whether this error means the canonical chain data itself is damaged.
    ///
    /// Append-path rejections and storage failures are not.
    pub fn is_chain_corruption(&self) -> bool {
        matches!(
            self,
            Self::MissingBlock(_)
                | Self::MissingSignature(_)
                | Self::InvalidSignature(_)
                | Self::Decode { .. }
                | Self::CorruptKey { .. }
        )
    }
}

pub type ChainResult<T> = Result<T, ChainError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn corruption_kinds() {
        assert!(ChainError::MissingSignature(3).is_chain_corruption());
        assert!(ChainError::InvalidSignature(3).is_chain_corruption());
        assert!(ChainError::MissingBlock(3).is_chain_corruption());
        assert!(!ChainError::OutOfOrder { expected: 1, got: 2 }.is_chain_corruption());
        assert!(!ChainError::Store(StoreError::ReadOnly).is_chain_corruption());
    }

    #[test]
    fn messages_name_the_block() {
        assert_eq!(
            ChainError::MissingSignature(7).to_string(),
            "signature for block 7 is missing"
        );
    }
}
