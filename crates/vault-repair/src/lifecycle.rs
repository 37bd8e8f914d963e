//! Top-level store recovery: check, then rebuild or quarantine.
//!
//! ```text
//! Checking ──► Healthy
//!    │            ▲
//!    ├─► Repairing ┤
//!    │            │
//!    └─► Quarantining
//!
//! any state ──► Failed
//! ```
//!
//! A run that is cancelled stops in `Checking` or `Repairing`; neither is
//! terminal and the next run starts over.

use std::fmt;
use std::path::PathBuf;
use std::thread;

use tokio::sync::oneshot;
use tracing::{error, info, warn};
use vault_chain::QuitSignal;
use vault_crypto::VerifyingKey;
use vault_store::Store;

use crate::checker::{CheckerConfig, CorruptionChecker, ScanReport, Verdict};
use crate::config::RepairConfig;
use crate::error::{RepairError, RepairResult};
use crate::quarantine::{quarantine, Quarantined};
use crate::rebuild::RebuildOutcome;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LifecycleState {
    Checking,
    Healthy,
    Repairing,
    Quarantining,
    Failed,
}

impl LifecycleState {
    pub fn can_transition_to(self, next: LifecycleState) -> bool {
        use LifecycleState::*;
        matches!(
            (self, next),
            (Checking, Healthy)
                | (Checking, Repairing)
                | (Checking, Quarantining)
                | (Repairing, Healthy)
                | (Quarantining, Healthy)
                | (_, Failed)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Healthy | Self::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Checking => "checking",
            Self::Healthy => "healthy",
            Self::Repairing => "repairing",
            Self::Quarantining => "quarantining",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tracks the current state and every state visited.
#[derive(Debug)]
struct Lifecycle {
    state: LifecycleState,
    visited: Vec<LifecycleState>,
}

impl Lifecycle {
    fn new() -> Self {
        Self {
            state: LifecycleState::Checking,
            visited: vec![LifecycleState::Checking],
        }
    }

    fn advance(&mut self, next: LifecycleState) -> RepairResult<()> {
        if !self.state.can_transition_to(next) {
            return Err(RepairError::IllegalTransition {
                from: self.state,
                to: next,
            });
        }
        info!(from = %self.state, to = %next, "store lifecycle transition");
        self.state = next;
        self.visited.push(next);
        Ok(())
    }

    /// Move to `Failed` and package `err` with whatever is left of the store.
    fn abort(&mut self, err: RepairError, store: Option<Store>) -> RecoveryFailure {
        error!(state = %self.state, error = %err, "store recovery failed");
        if self.state != LifecycleState::Failed {
            self.state = LifecycleState::Failed;
            self.visited.push(LifecycleState::Failed);
        }
        RecoveryFailure {
            error: err,
            transitions: self.visited.clone(),
            store,
        }
    }
}

/// A recovery run that ended in [`LifecycleState::Failed`].
#[derive(Debug, thiserror::Error)]
#[error("store recovery failed")]
pub struct RecoveryFailure {
    #[source]
    pub error: RepairError,
    /// Every state visited, ending with `Failed`.
    pub transitions: Vec<LifecycleState>,
    /// The store handle, still open. `None` if quarantine failed after
    /// closing it; the file is then left at its original path or its
    /// quarantine path, depending on how far the move got.
    pub store: Option<Store>,
}

impl RecoveryFailure {
    /// The run's thread went away without reporting.
    fn lost() -> Self {
        Self {
            error: RepairError::TaskLost,
            transitions: Vec::new(),
            store: None,
        }
    }
}

pub type RecoveryResult = Result<Recovery, RecoveryFailure>;

/// What a recovery run did.
#[derive(Debug)]
pub struct Recovery {
    /// The store to use from now on. After quarantine this is a new, empty store.
    pub store: Store,
    /// Final state. `Checking` or `Repairing` if the run was cancelled.
    pub state: LifecycleState,
    /// Every state visited, starting with `Checking`.
    pub transitions: Vec<LifecycleState>,
    pub verdict: Verdict,
    /// Faulty block seqs the scan saw.
    pub faults: Vec<u64>,
    pub rebuild: Option<RebuildOutcome>,
    /// Where the corrupted file was moved, if it was.
    pub quarantine_path: Option<PathBuf>,
}

impl Recovery {
    pub fn is_complete(&self) -> bool {
        self.state == LifecycleState::Healthy
    }
}

/// Runs the check-and-repair procedure on a store.
#[derive(Clone, Debug)]
pub struct StoreDoctor {
    checker: CorruptionChecker,
}

impl StoreDoctor {
    pub fn new(pubkey: VerifyingKey, config: CheckerConfig) -> Self {
        Self {
            checker: CorruptionChecker::new(pubkey, config),
        }
    }

    pub fn from_config(pubkey: VerifyingKey, config: &RepairConfig) -> Self {
        Self::new(pubkey, config.checker_config())
    }

    pub fn checker(&self) -> &CorruptionChecker {
        &self.checker
    }

    /// Check `store` and bring it back to a usable state.
    ///
    /// A damaged history index is rebuilt in place. Damaged chain data gets
    /// the whole file quarantined and replaced by an empty store; the caller
    /// must then resync the chain.
    ///
    /// On failure the store handle comes back inside the [`RecoveryFailure`],
    /// unless the failure happened while quarantining after it was closed.
    pub fn run(&self, store: Store, quit: &QuitSignal) -> RecoveryResult {
        let mut lifecycle = Lifecycle::new();
        let ScanReport {
            verdict,
            faults,
            fault_seq,
            ..
        } = match self.checker.scan(&store, quit) {
            Ok(report) => report,
            Err(e) => return Err(lifecycle.abort(e, Some(store))),
        };

        let mut rebuild = None;
        let mut quarantine_path = None;
        let (store, verdict) = match verdict {
            Verdict::Healthy => {
                if let Err(e) = lifecycle.advance(LifecycleState::Healthy) {
                    return Err(lifecycle.abort(e, Some(store)));
                }
                (store, Verdict::Healthy)
            }
            Verdict::Interrupted => {
                warn!("store check interrupted");
                (store, Verdict::Interrupted)
            }
            Verdict::Error(fault) => {
                let err = RepairError::Verification {
                    seq: fault_seq.unwrap_or_default(),
                    fault,
                };
                return Err(lifecycle.abort(err, Some(store)));
            }
            Verdict::Repairable(cause) => {
                if let Err(e) = lifecycle.advance(LifecycleState::Repairing) {
                    return Err(lifecycle.abort(e, Some(store)));
                }
                info!(seq = ?fault_seq, cause = %cause, "history index is corrupted, rebuilding");
                let outcome = match self.checker.rebuild_index(&store, quit) {
                    Ok(outcome) => outcome,
                    Err(e) => return Err(lifecycle.abort(e, Some(store))),
                };
                if outcome.complete {
                    if let Err(e) = lifecycle.advance(LifecycleState::Healthy) {
                        return Err(lifecycle.abort(e, Some(store)));
                    }
                } else {
                    warn!(indexed = outcome.indexed, head = outcome.head, "rebuild interrupted");
                }
                rebuild = Some(outcome);
                (store, Verdict::Repairable(cause))
            }
            Verdict::Fatal(cause) => {
                if store.is_read_only() {
                    let err = RepairError::ReadOnly(store.path().to_path_buf());
                    return Err(lifecycle.abort(err, Some(store)));
                }
                if let Err(e) = lifecycle.advance(LifecycleState::Quarantining) {
                    return Err(lifecycle.abort(e, Some(store)));
                }
                let Quarantined {
                    store,
                    quarantine_path: moved_to,
                } = match quarantine(store) {
                    Ok(q) => q,
                    Err(e) => return Err(lifecycle.abort(e.into(), None)),
                };
                error!(
                    severity = "critical",
                    seq = ?fault_seq,
                    cause = %cause,
                    path = %store.path().display(),
                    quarantine_path = %moved_to.display(),
                    "chain data corrupted, store quarantined and replaced with an empty one"
                );
                quarantine_path = Some(moved_to);
                if let Err(e) = lifecycle.advance(LifecycleState::Healthy) {
                    return Err(lifecycle.abort(e, Some(store)));
                }
                (store, Verdict::Fatal(cause))
            }
        };

        Ok(Recovery {
            store,
            state: lifecycle.state,
            transitions: lifecycle.visited,
            verdict,
            faults,
            rebuild,
            quarantine_path,
        })
    }

    /// Run [`StoreDoctor::run`] on a dedicated thread.
    pub fn spawn(self, store: Store, quit: QuitSignal) -> RepairResult<RepairTask> {
        let (tx, rx) = oneshot::channel();
        thread::Builder::new()
            .name("store-doctor".into())
            .spawn(move || {
                let result = self.run(store, &quit);
                // The receiver may have been dropped; the result is unwanted then.
                let _ = tx.send(result);
            })
            .map_err(RepairError::Spawn)?;
        Ok(RepairTask { rx })
    }
}

/// Handle to a recovery running on its own thread.
#[derive(Debug)]
pub struct RepairTask {
    rx: oneshot::Receiver<RecoveryResult>,
}

impl RepairTask {
    /// Wait for the result from async code.
    pub async fn outcome(self) -> RecoveryResult {
        self.rx.await.unwrap_or_else(|_| Err(RecoveryFailure::lost()))
    }

    /// Block the current thread until the result is ready.
    ///
    /// Must not be called from within an async runtime.
    pub fn wait(self) -> RecoveryResult {
        self.rx
            .blocking_recv()
            .unwrap_or_else(|_| Err(RecoveryFailure::lost()))
    }
}
