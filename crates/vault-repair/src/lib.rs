//! Store integrity checking and self-healing for Chain Vault.
//!
//! Run at node startup (or on demand) to find and fix corruption:
//!
//! - [`CorruptionChecker`] walks the chain with parallel workers, checking
//!   every block's signature and its history index entries, and classifies
//!   the outcome as a [`Verdict`].
//! - [`IndexRebuilder`] erases the history index and replays the chain into
//!   it when only the index is damaged.
//! - [`quarantine`] moves a store with damaged chain data aside under a
//!   content-derived name and opens an empty store in its place.
//! - [`StoreDoctor`] drives the whole procedure through its
//!   [`LifecycleState`]s, synchronously or on its own thread.

pub mod checker;
pub mod config;
pub mod error;
pub mod lifecycle;
pub mod quarantine;
pub mod rebuild;

#[cfg(test)]
mod testutil;

pub use checker::{BlockFault, CheckOutcome, CheckerConfig, CorruptionChecker, ScanReport, Verdict};
pub use config::RepairConfig;
pub use error::{ConfigError, QuarantineError, RepairError, RepairResult};
pub use lifecycle::{
    LifecycleState, Recovery, RecoveryFailure, RecoveryResult, RepairTask, StoreDoctor,
};
pub use quarantine::{corrupt_db_path, move_corrupt_db, quarantine, Quarantined};
pub use rebuild::{IndexRebuilder, RebuildOutcome};
