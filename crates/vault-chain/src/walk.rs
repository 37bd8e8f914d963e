use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread;

use crossbeam_channel::bounded;
use parking_lot::Mutex;
use tracing::{debug, info, warn};
use vault_store::{Store, StoreError, Tx};
use vault_types::BlockSeq;

use crate::block::SignedBlock;
use crate::chain::Blockchain;
use crate::error::{ChainError, ChainResult};
use crate::faults::FaultTracker;
use crate::quit::QuitSignal;

/// Sentinel for "no fault seen yet" in the shared lowest-fault cell.
const NO_FAULT: u64 = u64::MAX;

/// Result of a chain walk.
#[derive(Debug)]
pub struct WalkReport<E> {
    /// Head at the start of the walk, `None` for an empty chain.
    pub head: Option<BlockSeq>,
    /// Blocks whose verification ran and succeeded.
    pub verified: u64,
    /// The walk stopped because the quit signal was raised.
    pub cancelled: bool,
    /// Every faulty seq observed, ascending. A run of missing blocks
    /// appears once, at its first seq.
    pub faults: Vec<BlockSeq>,
    /// The failure with the lowest seq.
    pub first_failure: Option<(BlockSeq, E)>,
}

impl<E> WalkReport<E> {
    /// Completed with no failure.
    pub fn is_clean(&self) -> bool {
        !self.cancelled && self.first_failure.is_none()
    }
}

/// State shared between the producer and the workers of one walk.
struct WalkState<E> {
    faults: FaultTracker,
    first_failure: Mutex<Option<(BlockSeq, E)>>,
    lowest_fault: AtomicU64,
    verified: AtomicU64,
    skipped_for_quit: AtomicBool,
}

impl<E> WalkState<E> {
    fn new() -> Self {
        Self {
            faults: FaultTracker::new(),
            first_failure: Mutex::new(None),
            lowest_fault: AtomicU64::new(NO_FAULT),
            verified: AtomicU64::new(0),
            skipped_for_quit: AtomicBool::new(false),
        }
    }

    fn record(&self, seq: BlockSeq, err: E) {
        self.faults.record(seq);
        self.lowest_fault.fetch_min(seq, Ordering::SeqCst);
        let mut slot = self.first_failure.lock();
        if slot.as_ref().map_or(true, |(lowest, _)| seq < *lowest) {
            *slot = Some((seq, err));
        }
    }

    fn has_fault(&self) -> bool {
        self.lowest_fault.load(Ordering::SeqCst) != NO_FAULT
    }

    /// A queued block is skipped once a lower block has already failed.
    /// Blocks below the lowest fault always run, so the reported failure
    /// does not depend on worker scheduling.
    fn shadowed(&self, seq: BlockSeq) -> bool {
        seq > self.lowest_fault.load(Ordering::SeqCst)
    }
}

impl Blockchain {
    /// Verify every block from genesis to the current head with `workers`
    /// threads.
    ///
    /// A single producer reads blocks in ascending order and feeds a bounded
    /// channel; each worker runs `verify` on one block inside its own read
    /// transaction. Unless `exhaustive` is set, no further blocks are
    /// dispatched after the first failure. Raising `quit` stops dispatch and
    /// lets in-flight blocks finish.
    ///
    /// Returns `Err` only if the walk cannot start.
    pub fn walk_chain<E, F>(
        &self,
        store: &Store,
        workers: usize,
        exhaustive: bool,
        verify: F,
        quit: &QuitSignal,
    ) -> ChainResult<WalkReport<E>>
    where
        E: From<ChainError> + Send,
        F: Fn(&Tx<'_>, &SignedBlock) -> Result<(), E> + Sync,
    {
        if workers == 0 {
            return Err(ChainError::InvalidWorkerCount);
        }

        let head = store.view("walk_head", |tx| self.head_seq(tx))?;
        let Some(head) = head else {
            debug!("chain is empty, nothing to walk");
            return Ok(WalkReport {
                head: None,
                verified: 0,
                cancelled: false,
                faults: Vec::new(),
                first_failure: None,
            });
        };
        info!(head, workers, exhaustive, "walking chain");

        let state = WalkState::<E>::new();
        let (sender, receiver) = bounded::<SignedBlock>(workers);

        let dispatch = thread::scope(|scope| {
            for worker in 0..workers {
                let receiver = receiver.clone();
                let state = &state;
                let verify = &verify;
                scope.spawn(move || {
                    for signed in receiver.iter() {
                        let seq = signed.seq();
                        if quit.is_raised() {
                            state.skipped_for_quit.store(true, Ordering::SeqCst);
                            continue;
                        }
                        if !exhaustive && state.shadowed(seq) {
                            continue;
                        }
                        let outcome = store
                            .view::<_, StoreError, _>("verify_block", |tx| Ok(verify(tx, &signed)))
                            .unwrap_or_else(|e| Err(E::from(ChainError::from(e))));
                        match outcome {
                            Ok(()) => {
                                state.verified.fetch_add(1, Ordering::SeqCst);
                            }
                            Err(err) => {
                                debug!(worker, seq, "block failed verification");
                                state.record(seq, err);
                            }
                        }
                    }
                });
            }
            drop(receiver);

            let dispatch = store.view("walk_chain", |tx| -> ChainResult<bool> {
                let mut next = Some(0);
                while let Some(seq) = next.filter(|seq| *seq <= head) {
                    if quit.is_raised() {
                        return Ok(true);
                    }
                    if !exhaustive && state.has_fault() {
                        break;
                    }
                    next = seq.checked_add(1);
                    match self.get_signed_block_by_seq(tx, seq) {
                        Ok(signed) => {
                            if sender.send(signed).is_err() {
                                break;
                            }
                        }
                        // A gap is one fault, recorded at its first missing seq.
                        Err(err @ ChainError::MissingBlock(_)) => {
                            match self.next_stored_seq(tx, seq) {
                                Ok(resume) => {
                                    debug!(seq, ?resume, "gap in block sequence");
                                    state.record(seq, E::from(err));
                                    next = resume;
                                }
                                Err(lookup) => {
                                    state.record(seq, E::from(lookup));
                                    break;
                                }
                            }
                        }
                        Err(err) => state.record(seq, E::from(err)),
                    }
                }
                Ok(false)
            });
            drop(sender);
            dispatch
        });

        // The producer's read transaction could not be opened.
        let stopped_dispatch = dispatch?;

        let cancelled = stopped_dispatch || state.skipped_for_quit.load(Ordering::SeqCst);
        let report = WalkReport {
            head: Some(head),
            verified: state.verified.load(Ordering::SeqCst),
            cancelled,
            faults: state.faults.seqs(),
            first_failure: state.first_failure.into_inner(),
        };
        if cancelled {
            warn!(verified = report.verified, head, "chain walk cancelled");
        } else {
            info!(
                verified = report.verified,
                faults = report.faults.len(),
                "chain walk finished"
            );
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::{build_block, sign_block};
    use crate::chain::{seq_key, BLOCKS, BLOCK_SIGS};
    use crate::quit::quit_channel;
    use vault_crypto::SigningKey;
    use vault_store::StoreOptions;

    fn chain_with(n: u64) -> (tempfile::TempDir, Store, SigningKey, Blockchain) {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path().join("walk.db"), StoreOptions::default()).unwrap();
        let key = SigningKey::generate();
        let chain = Blockchain::new(key.verifying_key());
        store
            .update("fill", |tx| {
                let mut prev = None;
                for seq in 0..n {
                    let block = build_block(prev.as_ref(), Vec::new(), seq);
                    prev = Some(block.header.clone());
                    chain.append_block(tx, &sign_block(&key, block))?;
                }
                Ok::<_, ChainError>(())
            })
            .unwrap();
        (dir, store, key, chain)
    }

    fn check_sig(chain: &Blockchain) -> impl Fn(&Tx<'_>, &SignedBlock) -> ChainResult<()> + Sync + '_ {
        move |_tx: &Tx<'_>, signed: &SignedBlock| chain.verify_signature(signed)
    }

    fn corrupt_sig(store: &Store, seq: BlockSeq) {
        store
            .update("corrupt", |tx| tx.put(BLOCK_SIGS, &seq_key(seq), &[7u8; 64]))
            .unwrap();
    }

    #[test]
    fn zero_workers_rejected() {
        let (_dir, store, _key, chain) = chain_with(1);
        let err = chain
            .walk_chain(&store, 0, false, check_sig(&chain), &QuitSignal::never())
            .unwrap_err();
        assert!(matches!(err, ChainError::InvalidWorkerCount));
    }

    #[test]
    fn empty_chain_is_clean() {
        let (_dir, store, _key, chain) = chain_with(0);
        let report = chain
            .walk_chain(&store, 2, false, check_sig(&chain), &QuitSignal::never())
            .unwrap();
        assert!(report.is_clean());
        assert_eq!(report.head, None);
        assert_eq!(report.verified, 0);
    }

    #[test]
    fn healthy_chain_verifies_every_block() {
        let (_dir, store, _key, chain) = chain_with(20);
        let report = chain
            .walk_chain(&store, 4, false, check_sig(&chain), &QuitSignal::never())
            .unwrap();
        assert!(report.is_clean());
        assert_eq!(report.head, Some(19));
        assert_eq!(report.verified, 20);
    }

    #[test]
    fn first_failure_is_lowest_seq() {
        let (_dir, store, _key, chain) = chain_with(30);
        corrupt_sig(&store, 11);
        corrupt_sig(&store, 5);
        for workers in [1, 4] {
            let report = chain
                .walk_chain(&store, workers, false, check_sig(&chain), &QuitSignal::never())
                .unwrap();
            let (seq, err) = report.first_failure.unwrap();
            assert_eq!(seq, 5, "workers = {workers}");
            assert!(matches!(err, ChainError::InvalidSignature(5)));
            assert!(!report.cancelled);
        }
    }

    #[test]
    fn exhaustive_collects_every_fault() {
        let (_dir, store, _key, chain) = chain_with(30);
        for seq in [3, 17, 29] {
            corrupt_sig(&store, seq);
        }
        let report = chain
            .walk_chain(&store, 3, true, check_sig(&chain), &QuitSignal::never())
            .unwrap();
        assert_eq!(report.faults, vec![3, 17, 29]);
        assert_eq!(report.verified, 27);
        assert_eq!(report.first_failure.map(|(seq, _)| seq), Some(3));
    }

    #[test]
    fn read_failures_count_at_their_seq() {
        let (_dir, store, _key, chain) = chain_with(10);
        store
            .update("drop", |tx| tx.delete(BLOCK_SIGS, &seq_key(4)))
            .unwrap();
        let report = chain
            .walk_chain(&store, 2, true, check_sig(&chain), &QuitSignal::never())
            .unwrap();
        assert_eq!(report.faults, vec![4]);
        assert!(matches!(
            report.first_failure,
            Some((4, ChainError::MissingSignature(4)))
        ));
    }

    #[test]
    fn quit_before_start_verifies_nothing() {
        let (_dir, store, _key, chain) = chain_with(10);
        let (handle, signal) = quit_channel();
        handle.raise();
        let report = chain
            .walk_chain(&store, 2, false, check_sig(&chain), &signal)
            .unwrap();
        assert!(report.cancelled);
        assert!(!report.is_clean());
        assert_eq!(report.verified, 0);
        assert!(report.first_failure.is_none());
    }

    #[test]
    fn quit_after_first_block_stops_the_walk() {
        let (_dir, store, _key, chain) = chain_with(100);
        let (handle, signal) = quit_channel();
        let verify = |_tx: &Tx<'_>, signed: &SignedBlock| -> ChainResult<()> {
            if signed.seq() == 0 {
                handle.raise();
            }
            Ok(())
        };
        let report = chain.walk_chain(&store, 1, false, verify, &signal).unwrap();
        assert!(report.cancelled);
        assert!(report.first_failure.is_none());
        assert!(report.verified < 100);
    }

    #[test]
    fn stray_far_key_is_one_gap() {
        let (_dir, store, _key, chain) = chain_with(10);
        store
            .update("stray", |tx| {
                tx.put(BLOCKS, &seq_key(200_000), b"not a block")?;
                tx.put(BLOCKS, &seq_key(u64::MAX), b"not a block")
            })
            .unwrap();
        let report = chain
            .walk_chain(&store, 2, true, check_sig(&chain), &QuitSignal::never())
            .unwrap();
        assert_eq!(report.head, Some(u64::MAX));
        assert_eq!(report.faults, vec![10, 200_000, 200_001, u64::MAX]);
        assert_eq!(report.verified, 10);
        assert!(matches!(
            report.first_failure,
            Some((10, ChainError::MissingBlock(10)))
        ));
    }

    #[test]
    fn next_stored_seq_jumps_gaps() {
        let (_dir, store, _key, chain) = chain_with(3);
        store
            .update("stray", |tx| tx.put(BLOCKS, &seq_key(50), b""))
            .unwrap();
        store
            .view("seek", |tx| {
                assert_eq!(chain.next_stored_seq(tx, 1)?, Some(1));
                assert_eq!(chain.next_stored_seq(tx, 3)?, Some(50));
                assert_eq!(chain.next_stored_seq(tx, 51)?, None);
                Ok::<_, ChainError>(())
            })
            .unwrap();
    }
}
