use thiserror::Error;

/// Failure to parse an identifier from its textual or raw form.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("not a hex string: {0}")]
    InvalidHex(String),

    #[error("identifier must be {expected} bytes, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
}
