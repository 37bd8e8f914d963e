//! Corruption detection and classification.
//!
//! A scan walks the whole chain, checking each block's signature and then
//! the history index entries derived from it. The lowest failing block
//! decides the [`Verdict`]:
//!
//! | failure                                      | verdict      |
//! |----------------------------------------------|--------------|
//! | none                                         | `Healthy`    |
//! | quit raised                                  | `Interrupted`|
//! | missing/invalid signature, unreadable block  | `Fatal`      |
//! | history index disagrees with the chain       | `Repairable` |
//! | history index runs past the chain head       | `Repairable` |
//! | anything else (I/O, engine)                  | `Error`      |

use std::fmt;

use tracing::{error, info, warn};
use vault_chain::{Blockchain, ChainError, QuitSignal, SignedBlock};
use vault_crypto::VerifyingKey;
use vault_history::{HistoryDb, HistoryError, IndexesMap};
use vault_store::{Store, Tx};
use vault_types::BlockSeq;

use crate::error::{RepairError, RepairResult};
use crate::rebuild::{IndexRebuilder, RebuildOutcome};

/// Why a single block failed verification.
#[derive(Debug, thiserror::Error)]
pub enum BlockFault {
    #[error(transparent)]
    Chain(#[from] ChainError),

    #[error(transparent)]
    History(#[from] HistoryError),
}

/// Classification of a scan.
#[derive(Debug)]
pub enum Verdict {
    Healthy,
    /// Quit was raised before the scan finished. Nothing is concluded.
    Interrupted,
    /// Only the derived history index is damaged.
    Repairable(HistoryError),
    /// Canonical chain data is damaged; the store must be quarantined.
    Fatal(ChainError),
    /// Verification itself failed for a reason unrelated to corruption.
    Error(BlockFault),
}

impl Verdict {
    fn classify(fault: BlockFault) -> Self {
        match fault {
            BlockFault::Chain(e) if e.is_chain_corruption() => Self::Fatal(e),
            BlockFault::History(e @ HistoryError::Corrupted { .. }) => Self::Repairable(e),
            other => Self::Error(other),
        }
    }

    pub fn is_healthy(&self) -> bool {
        matches!(self, Self::Healthy)
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Healthy => "healthy",
            Self::Interrupted => "interrupted",
            Self::Repairable(_) => "repairable",
            Self::Fatal(_) => "fatal",
            Self::Error(_) => "error",
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Healthy | Self::Interrupted => f.write_str(self.label()),
            Self::Repairable(e) => write!(f, "repairable: {e}"),
            Self::Fatal(e) => write!(f, "fatal: {e}"),
            Self::Error(e) => write!(f, "error: {e}"),
        }
    }
}

/// Result of [`CorruptionChecker::scan`].
#[derive(Debug)]
pub struct ScanReport {
    pub verdict: Verdict,
    /// Chain head, `None` when the store holds no blocks.
    pub head: Option<BlockSeq>,
    pub verified: u64,
    /// Every faulty seq seen, ascending. With a non-exhaustive scan this
    /// usually holds only the first few.
    pub faults: Vec<BlockSeq>,
    /// Seq whose failure decided the verdict.
    pub fault_seq: Option<BlockSeq>,
}

impl ScanReport {
    fn pristine() -> Self {
        Self {
            verdict: Verdict::Healthy,
            head: None,
            verified: 0,
            faults: Vec::new(),
            fault_seq: None,
        }
    }
}

/// Result of [`CorruptionChecker::check`].
#[derive(Debug)]
pub enum CheckOutcome {
    Healthy,
    Interrupted,
    /// The history index was corrupted and has been rebuilt.
    Rebuilt {
        cause: HistoryError,
        rebuild: RebuildOutcome,
    },
    /// Canonical chain data is corrupted. Nothing was changed.
    Corrupt(ChainError),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CheckerConfig {
    /// Verification threads.
    pub workers: usize,
    /// Keep scanning past the first fault.
    pub exhaustive: bool,
}

impl Default for CheckerConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            exhaustive: false,
        }
    }
}

/// Verifies a store's chain and history index against the chain key.
#[derive(Clone, Debug)]
pub struct CorruptionChecker {
    chain: Blockchain,
    config: CheckerConfig,
}

impl CorruptionChecker {
    pub fn new(pubkey: VerifyingKey, config: CheckerConfig) -> Self {
        Self {
            chain: Blockchain::new(pubkey),
            config,
        }
    }

    pub fn config(&self) -> &CheckerConfig {
        &self.config
    }

    pub fn chain(&self) -> &Blockchain {
        &self.chain
    }

    /// Check one block: signature first, then its history entries.
    pub fn verify_block(
        &self,
        tx: &Tx<'_>,
        signed: &SignedBlock,
        indexes: &IndexesMap,
    ) -> Result<(), BlockFault> {
        self.chain.verify_signature(signed)?;
        HistoryDb::verify(tx, &signed.block, indexes)?;
        Ok(())
    }

    /// Walk the chain and classify what was found. Never modifies the store.
    pub fn scan(&self, store: &Store, quit: &QuitSignal) -> RepairResult<ScanReport> {
        if !store.view("check_blocks", |tx| Blockchain::exists(tx))? {
            info!(path = %store.path().display(), "no blocks stored, nothing to check");
            return Ok(ScanReport::pristine());
        }

        let indexes = IndexesMap::new();
        let walk = match self.chain.walk_chain(
            store,
            self.config.workers,
            self.config.exhaustive,
            |tx, signed| self.verify_block(tx, signed, &indexes),
            quit,
        ) {
            Ok(walk) => walk,
            // The head itself is unreadable, e.g. a malformed key in `blocks`.
            Err(e) if e.is_chain_corruption() => {
                error!(error = %e, "chain head is corrupted");
                return Ok(ScanReport {
                    verdict: Verdict::Fatal(e),
                    ..ScanReport::pristine()
                });
            }
            Err(e) => return Err(e.into()),
        };

        let (verdict, fault_seq) = if walk.cancelled {
            (Verdict::Interrupted, None)
        } else {
            match (walk.first_failure, walk.head) {
                (Some((seq, fault)), _) => (Verdict::classify(fault), Some(seq)),
                (None, Some(head)) => {
                    match store.view("check_height", |tx| HistoryDb::verify_height(tx, head)) {
                        Ok(()) => (Verdict::Healthy, None),
                        Err(e) => (
                            Verdict::classify(BlockFault::History(e)),
                            Some(head.saturating_add(1)),
                        ),
                    }
                }
                (None, None) => (Verdict::Healthy, None),
            }
        };

        match &verdict {
            Verdict::Healthy => info!(head = ?walk.head, verified = walk.verified, "store is healthy"),
            Verdict::Interrupted => warn!(verified = walk.verified, "scan interrupted"),
            Verdict::Repairable(e) => info!(seq = ?fault_seq, error = %e, "history index is corrupted"),
            Verdict::Fatal(e) => error!(seq = ?fault_seq, error = %e, "chain data is corrupted"),
            Verdict::Error(e) => error!(seq = ?fault_seq, error = %e, "block verification failed"),
        }

        Ok(ScanReport {
            verdict,
            head: walk.head,
            verified: walk.verified,
            faults: walk.faults,
            fault_seq,
        })
    }

    /// Rebuild the history index from the chain.
    pub fn rebuild_index(&self, store: &Store, quit: &QuitSignal) -> RepairResult<RebuildOutcome> {
        if store.is_read_only() {
            return Err(RepairError::ReadOnly(store.path().to_path_buf()));
        }
        info!(path = %store.path().display(), "rebuilding history index");
        IndexRebuilder::new(self.chain.clone())
            .rebuild(store, quit)
            .map_err(|e| RepairError::Rebuild(Box::new(e)))
    }

    /// Scan the store and rebuild the history index if only it is damaged.
    ///
    /// Fatal corruption is reported as [`CheckOutcome::Corrupt`]; deciding
    /// what to do with the store is left to the caller.
    pub fn check(&self, store: &Store, quit: &QuitSignal) -> RepairResult<CheckOutcome> {
        let report = self.scan(store, quit)?;
        match report.verdict {
            Verdict::Healthy => Ok(CheckOutcome::Healthy),
            Verdict::Interrupted => Ok(CheckOutcome::Interrupted),
            Verdict::Fatal(e) => Ok(CheckOutcome::Corrupt(e)),
            Verdict::Repairable(cause) => {
                let rebuild = self.rebuild_index(store, quit)?;
                Ok(CheckOutcome::Rebuilt { cause, rebuild })
            }
            Verdict::Error(fault) => Err(RepairError::Verification {
                seq: report.fault_seq.unwrap_or_default(),
                fault,
            }),
        }
    }
}
