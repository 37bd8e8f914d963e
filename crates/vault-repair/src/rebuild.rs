use tracing::{info, warn};
use vault_chain::{Blockchain, QuitSignal};
use vault_history::HistoryDb;
use vault_store::Store;
use vault_types::BlockSeq;

use crate::error::{RepairError, RepairResult};

/// Result of an index rebuild.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RebuildOutcome {
    /// Chain head the rebuild aimed for.
    pub head: BlockSeq,
    /// Blocks folded into the new index.
    pub indexed: u64,
    /// `false` when quit stopped the rebuild early. The partial index is
    /// committed and the next check will find it incomplete.
    pub complete: bool,
}

/// Replays the canonical chain into a freshly erased history index.
#[derive(Clone, Debug)]
pub struct IndexRebuilder {
    chain: Blockchain,
}

impl IndexRebuilder {
    pub fn new(chain: Blockchain) -> Self {
        Self { chain }
    }

    /// Erase the history index and rebuild it from blocks `0..=head`.
    ///
    /// Runs in a single write transaction: any failure leaves the old index
    /// in place. Quit is checked before each block.
    pub fn rebuild(&self, store: &Store, quit: &QuitSignal) -> RepairResult<RebuildOutcome> {
        self.rebuild_with_progress(store, quit, |_| {})
    }

    /// Like [`IndexRebuilder::rebuild`], calling `progress` with each seq
    /// once it is indexed.
    pub fn rebuild_with_progress<F>(
        &self,
        store: &Store,
        quit: &QuitSignal,
        mut progress: F,
    ) -> RepairResult<RebuildOutcome>
    where
        F: FnMut(BlockSeq),
    {
        store.update("rebuild_history", |tx| {
            HistoryDb::erase(tx)?;
            let head = self.chain.head_seq(tx)?.ok_or(RepairError::EmptyChain)?;
            info!(head, "rebuilding history index");

            let mut indexed = 0;
            for seq in 0..=head {
                if quit.is_raised() {
                    warn!(head, indexed, "history rebuild interrupted, committing partial index");
                    return Ok(RebuildOutcome {
                        head,
                        indexed,
                        complete: false,
                    });
                }
                let signed = self.chain.get_signed_block_by_seq(tx, seq)?;
                HistoryDb::parse_block(tx, &signed.block)?;
                indexed += 1;
                progress(seq);
            }

            info!(head, indexed, "history index rebuilt");
            Ok(RebuildOutcome {
                head,
                indexed,
                complete: true,
            })
        })
    }
}
