use std::io;
use std::path::PathBuf;

use thiserror::Error;
use vault_chain::ChainError;
use vault_history::HistoryError;
use vault_store::StoreError;
use vault_types::BlockSeq;

use crate::checker::BlockFault;
use crate::lifecycle::LifecycleState;

#[derive(Debug, Error)]
pub enum RepairError {
    #[error("chain error: {0}")]
    Chain(#[from] ChainError),

    #[error("history error: {0}")]
    History(#[from] HistoryError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("cannot rebuild the history index: head block does not exist")]
    EmptyChain,

    #[error("history index rebuild failed: {0}")]
    Rebuild(#[source] Box<RepairError>),

    #[error("verification of block {seq} failed: {fault}")]
    Verification {
        seq: BlockSeq,
        #[source]
        fault: BlockFault,
    },

    #[error("quarantine failed: {0}")]
    Quarantine(#[from] QuarantineError),

    #[error("store {} is read-only and cannot be repaired", .0.display())]
    ReadOnly(PathBuf),

    #[error("illegal lifecycle transition: {from} -> {to}")]
    IllegalTransition {
        from: LifecycleState,
        to: LifecycleState,
    },

    #[error("failed to start repair thread: {0}")]
    Spawn(#[source] io::Error),

    #[error("repair task ended without a result")]
    TaskLost,
}

pub type RepairResult<T> = Result<T, RepairError>;

/// Failures while moving a corrupted store aside.
#[derive(Debug, Error)]
pub enum QuarantineError {
    #[error("failed to close {}: {source}", .path.display())]
    Close {
        path: PathBuf,
        #[source]
        source: StoreError,
    },

    #[error("failed to fingerprint {}: {source}", .path.display())]
    Fingerprint {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to rename {} to {}: {source}", .from.display(), .to.display())]
    Rename {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to sync directory {}: {source}", .dir.display())]
    SyncDir {
        dir: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to open a fresh store at {}: {source}", .path.display())]
    Reopen {
        path: PathBuf,
        #[source]
        source: StoreError,
    },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid config syntax: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}
