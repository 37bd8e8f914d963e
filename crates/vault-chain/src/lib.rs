//! Canonical chain access and verification for Chain Vault.
//!
//! - [`Blockchain`]: reads, verifies and appends [`SignedBlock`]s stored in
//!   the `blocks` and `block_sigs` buckets
//! - [`Blockchain::walk_chain`]: concurrent verification of every block
//!   from genesis to head with a pluggable per-block check
//! - [`FaultTracker`]: the set of faulty block seqs seen during one walk
//! - [`QuitSignal`] / [`QuitHandle`]: cooperative cancellation

pub mod block;
pub mod chain;
pub mod error;
pub mod faults;
pub mod quit;
pub mod walk;

pub use block::{build_block, sign_block, SignedBlock};
pub use chain::{seq_key, Blockchain, BLOCKS, BLOCK_SIGS};
pub use error::{ChainError, ChainResult};
pub use faults::FaultTracker;
pub use quit::{quit_channel, QuitHandle, QuitSignal};
pub use walk::WalkReport;
