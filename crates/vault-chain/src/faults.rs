use std::collections::BTreeSet;

use parking_lot::Mutex;
use vault_types::BlockSeq;

/// Thread-safe set of block sequence numbers that failed verification.
///
/// One tracker lives for one verification run and is shared by its workers.
#[derive(Debug, Default)]
pub struct FaultTracker {
    seqs: Mutex<BTreeSet<BlockSeq>>,
}

impl FaultTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a faulty block. Recording the same seq twice is a no-op.
    pub fn record(&self, seq: BlockSeq) {
        self.seqs.lock().insert(seq);
    }

    pub fn contains(&self, seq: BlockSeq) -> bool {
        self.seqs.lock().contains(&seq)
    }

    /// Lowest faulty seq recorded so far.
    pub fn lowest(&self) -> Option<BlockSeq> {
        self.seqs.lock().first().copied()
    }

    /// Recorded seqs in ascending order.
    pub fn seqs(&self) -> Vec<BlockSeq> {
        self.seqs.lock().iter().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.seqs.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.seqs.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn records_are_sorted_and_deduplicated() {
        let tracker = FaultTracker::new();
        tracker.record(9);
        tracker.record(2);
        tracker.record(9);
        assert_eq!(tracker.seqs(), vec![2, 9]);
        assert_eq!(tracker.lowest(), Some(2));
        assert!(tracker.contains(9));
        assert_eq!(tracker.len(), 2);
    }

    #[test]
    fn concurrent_recording() {
        let tracker = Arc::new(FaultTracker::new());
        let handles: Vec<_> = (0..4u64)
            .map(|worker| {
                let tracker = Arc::clone(&tracker);
                std::thread::spawn(move || {
                    for i in 0..100 {
                        tracker.record(worker * 100 + i);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(tracker.len(), 400);
        assert_eq!(tracker.lowest(), Some(0));
    }

    #[test]
    fn empty_tracker() {
        let tracker = FaultTracker::new();
        assert!(tracker.is_empty());
        assert_eq!(tracker.lowest(), None);
    }
}
