//! The history index: per-transaction and per-address lookups derived from
//! the canonical chain.
//!
//! The index is fully determined by blocks `0..=head`. It can be erased and
//! rebuilt by replaying [`HistoryDb::parse_block`] over the chain, and
//! [`HistoryDb::verify`] checks one block against it.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};
use vault_crypto::transaction_id;
use vault_store::{Bucket, Tx};
use vault_types::{Address, Block, BlockSeq, Digest, Transaction};

use crate::error::{HistoryError, HistoryResult};

/// Transaction id to [`TxRecord`].
pub const HISTORY_TXNS: Bucket = Bucket::new("history_txns");

/// Address to the ordered list of transaction ids touching it.
pub const HISTORY_ADDR_TXNS: Bucket = Bucket::new("history_addr_txns");

/// Index metadata.
pub const HISTORY_META: Bucket = Bucket::new("history_meta");

/// Key in [`HISTORY_META`] holding the highest indexed seq, big-endian.
pub const PARSED_HEIGHT_KEY: &[u8] = b"parsed_height";

/// An indexed transaction and the block that contains it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxRecord {
    pub txn: Transaction,
    pub seq: BlockSeq,
}

/// Per-walk cache of address index entries.
///
/// Verification workers share one map; each address list is read from the
/// store at most once per walk.
#[derive(Debug, Default)]
pub struct IndexesMap {
    addr_txns: RwLock<HashMap<Address, Arc<HashSet<Digest>>>>,
}

impl IndexesMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of cached addresses.
    pub fn len(&self) -> usize {
        self.addr_txns.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.addr_txns.read().is_empty()
    }

    fn address_txns(&self, tx: &Tx<'_>, addr: &Address) -> HistoryResult<Arc<HashSet<Digest>>> {
        if let Some(cached) = self.addr_txns.read().get(addr) {
            return Ok(Arc::clone(cached));
        }
        let ids: HashSet<Digest> = HistoryDb::address_transactions(tx, addr)?
            .into_iter()
            .collect();
        let ids = Arc::new(ids);
        // A racing worker may have inserted the same list; either copy is fine.
        self.addr_txns
            .write()
            .entry(*addr)
            .or_insert_with(|| Arc::clone(&ids));
        Ok(ids)
    }
}

/// Accessor for the history index buckets.
pub struct HistoryDb;

impl HistoryDb {
    /// Remove the whole index.
    pub fn erase(tx: &Tx<'_>) -> HistoryResult<()> {
        for bucket in [HISTORY_TXNS, HISTORY_ADDR_TXNS, HISTORY_META] {
            tx.drop_bucket(bucket)?;
        }
        debug!("history index erased");
        Ok(())
    }

    /// Highest block folded into the index, `None` if nothing was parsed.
    pub fn parsed_height(tx: &Tx<'_>) -> HistoryResult<Option<BlockSeq>> {
        match tx.get(HISTORY_META, PARSED_HEIGHT_KEY)? {
            Some(raw) => {
                let bytes: [u8; 8] = raw.as_slice().try_into().map_err(|_| {
                    HistoryError::Decode(format!("parsed height has {} bytes", raw.len()))
                })?;
                Ok(Some(BlockSeq::from_be_bytes(bytes)))
            }
            None => Ok(None),
        }
    }

    /// Look up an indexed transaction.
    pub fn transaction(tx: &Tx<'_>, id: &Digest) -> HistoryResult<Option<TxRecord>> {
        tx.get(HISTORY_TXNS, id.as_bytes())?
            .map(|raw| bincode::deserialize(&raw).map_err(|e| HistoryError::Decode(e.to_string())))
            .transpose()
    }

    /// Ids of the transactions touching `addr`, in chain order.
    pub fn address_transactions(tx: &Tx<'_>, addr: &Address) -> HistoryResult<Vec<Digest>> {
        tx.get(HISTORY_ADDR_TXNS, addr.as_bytes())?
            .map(|raw| bincode::deserialize(&raw).map_err(|e| HistoryError::Decode(e.to_string())))
            .transpose()
            .map(Option::unwrap_or_default)
    }

    /// Fold the next block into the index.
    ///
    /// Blocks must arrive in ascending order starting from genesis.
    pub fn parse_block(tx: &Tx<'_>, block: &Block) -> HistoryResult<()> {
        let expected = Self::parsed_height(tx)?.map_or(0, |h| h + 1);
        if block.seq() != expected {
            return Err(HistoryError::OutOfOrder {
                expected,
                got: block.seq(),
            });
        }

        for txn in &block.body {
            let id = transaction_id(txn);
            let record = TxRecord {
                txn: txn.clone(),
                seq: block.seq(),
            };
            tx.put(HISTORY_TXNS, id.as_bytes(), &encode(&record)?)?;

            for addr in txn.addresses() {
                let mut ids = Self::address_transactions(tx, &addr)?;
                if !ids.contains(&id) {
                    ids.push(id);
                    tx.put(HISTORY_ADDR_TXNS, addr.as_bytes(), &encode(&ids)?)?;
                }
            }
        }

        tx.put(HISTORY_META, PARSED_HEIGHT_KEY, &block.seq().to_be_bytes())?;
        trace!(seq = block.seq(), txns = block.body.len(), "block indexed");
        Ok(())
    }

    /// Check that the index agrees with `block`.
    ///
    /// Every transaction must be indexed under its id with the right block
    /// seq and listed under each address it touches, and the index must
    /// cover the block's height. Disagreements and undecodable index records
    /// are reported as [`HistoryError::Corrupted`].
    pub fn verify(tx: &Tx<'_>, block: &Block, indexes: &IndexesMap) -> HistoryResult<()> {
        let seq = block.seq();
        match Self::parsed_height(tx) {
            Ok(Some(height)) if height >= seq => {}
            Ok(Some(height)) => {
                return Err(HistoryError::corrupted(
                    seq,
                    format!("index only covers blocks up to {height}"),
                ))
            }
            Ok(None) => return Err(HistoryError::corrupted(seq, "index is empty")),
            Err(HistoryError::Decode(reason)) => return Err(HistoryError::corrupted(seq, reason)),
            Err(e) => return Err(e),
        }

        for txn in &block.body {
            let id = transaction_id(txn);
            let record = match Self::transaction(tx, &id) {
                Ok(Some(record)) => record,
                Ok(None) => {
                    return Err(HistoryError::corrupted(
                        seq,
                        format!("transaction {} is not indexed", id.short_hex()),
                    ))
                }
                Err(HistoryError::Decode(reason)) => {
                    return Err(HistoryError::corrupted(seq, reason))
                }
                Err(e) => return Err(e),
            };
            if record.seq != seq || record.txn != *txn {
                return Err(HistoryError::corrupted(
                    seq,
                    format!("transaction {} record does not match block", id.short_hex()),
                ));
            }

            for addr in txn.addresses() {
                let ids = match indexes.address_txns(tx, &addr) {
                    Ok(ids) => ids,
                    Err(HistoryError::Decode(reason)) => {
                        return Err(HistoryError::corrupted(seq, reason))
                    }
                    Err(e) => return Err(e),
                };
                if !ids.contains(&id) {
                    return Err(HistoryError::corrupted(
                        seq,
                        format!(
                            "transaction {} missing from address {}",
                            id.short_hex(),
                            addr.short_id()
                        ),
                    ));
                }
            }
        }
        Ok(())
    }

    /// Check that the index does not extend past the chain head.
    ///
    /// [`HistoryDb::verify`] only sees blocks that exist, so an index claiming
    /// blocks beyond `head` has to be caught here. The error is reported at
    /// the first block the chain does not have.
    pub fn verify_height(tx: &Tx<'_>, head: BlockSeq) -> HistoryResult<()> {
        let height = match Self::parsed_height(tx) {
            Ok(height) => height,
            Err(HistoryError::Decode(reason)) => {
                return Err(HistoryError::corrupted(head.saturating_add(1), reason))
            }
            Err(e) => return Err(e),
        };
        match height {
            Some(height) if height > head => Err(HistoryError::corrupted(
                head.saturating_add(1),
                format!("index covers blocks up to {height} but the chain ends at {head}"),
            )),
            _ => Ok(()),
        }
    }
}

fn encode<T: Serialize>(value: &T) -> HistoryResult<Vec<u8>> {
    bincode::serialize(value).map_err(|e| HistoryError::Encode(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use vault_crypto::body_hash;
    use vault_store::{Store, StoreOptions};
    use vault_types::BlockHeader;

    fn addr(b: u8) -> Address {
        Address::from_raw([b; 32])
    }

    fn transfer(from: u8, to: u8, nonce: u64) -> Transaction {
        Transaction {
            from: addr(from),
            to: addr(to),
            amount: 1,
            nonce,
        }
    }

    fn block(seq: BlockSeq, body: Vec<Transaction>) -> Block {
        Block {
            header: BlockHeader {
                seq,
                prev_hash: Digest::zero(),
                body_hash: body_hash(&body),
                timestamp: seq,
            },
            body,
        }
    }

    fn sample_blocks() -> Vec<Block> {
        vec![
            block(0, vec![transfer(1, 2, 0)]),
            block(1, vec![transfer(2, 3, 1), transfer(1, 3, 2)]),
            block(2, Vec::new()),
        ]
    }

    fn indexed_store() -> (tempfile::TempDir, Store, Vec<Block>) {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path().join("history.db"), StoreOptions::default()).unwrap();
        let blocks = sample_blocks();
        store
            .update("index", |tx| {
                for b in &blocks {
                    HistoryDb::parse_block(tx, b)?;
                }
                Ok::<_, HistoryError>(())
            })
            .unwrap();
        (dir, store, blocks)
    }

    fn verify_all(store: &Store, blocks: &[Block]) -> HistoryResult<()> {
        let indexes = IndexesMap::new();
        store.view("verify", |tx| {
            for b in blocks {
                HistoryDb::verify(tx, b, &indexes)?;
            }
            Ok(())
        })
    }

    #[test]
    fn parse_builds_lookups() {
        let (_dir, store, blocks) = indexed_store();
        store
            .view("query", |tx| {
                assert_eq!(HistoryDb::parsed_height(tx)?, Some(2));
                let id = transaction_id(&blocks[1].body[0]);
                let record = HistoryDb::transaction(tx, &id)?.unwrap();
                assert_eq!(record.seq, 1);
                let ids = HistoryDb::address_transactions(tx, &addr(3))?;
                assert_eq!(ids.len(), 2);
                assert_eq!(ids[0], id);
                assert!(HistoryDb::address_transactions(tx, &addr(9))?.is_empty());
                Ok::<_, HistoryError>(())
            })
            .unwrap();
    }

    #[test]
    fn parse_rejects_out_of_order() {
        let (_dir, store, _blocks) = indexed_store();
        let err = store
            .update("skip", |tx| HistoryDb::parse_block(tx, &block(5, Vec::new())))
            .unwrap_err();
        assert!(matches!(err, HistoryError::OutOfOrder { expected: 3, got: 5 }));
    }

    #[test]
    fn parse_must_start_at_genesis() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path().join("h.db"), StoreOptions::default()).unwrap();
        let err = store
            .update("first", |tx| HistoryDb::parse_block(tx, &block(1, Vec::new())))
            .unwrap_err();
        assert!(matches!(err, HistoryError::OutOfOrder { expected: 0, got: 1 }));
    }

    #[test]
    fn healthy_index_verifies() {
        let (_dir, store, blocks) = indexed_store();
        verify_all(&store, &blocks).unwrap();
    }

    #[test]
    fn erase_removes_everything() {
        let (_dir, store, blocks) = indexed_store();
        store.update("erase", |tx| HistoryDb::erase(tx)).unwrap();
        store
            .view("check", |tx| {
                assert_eq!(HistoryDb::parsed_height(tx)?, None);
                assert!(!tx.bucket_exists(HISTORY_TXNS)?);
                Ok::<_, HistoryError>(())
            })
            .unwrap();
        let err = verify_all(&store, &blocks).unwrap_err();
        assert!(matches!(err, HistoryError::Corrupted { seq: 0, .. }));
    }

    #[test]
    fn missing_transaction_is_corruption() {
        let (_dir, store, blocks) = indexed_store();
        let id = transaction_id(&blocks[1].body[1]);
        store
            .update("delete", |tx| tx.delete(HISTORY_TXNS, id.as_bytes()))
            .unwrap();
        let err = verify_all(&store, &blocks).unwrap_err();
        assert!(matches!(err, HistoryError::Corrupted { seq: 1, .. }));
    }

    #[test]
    fn garbage_address_list_is_corruption() {
        let (_dir, store, blocks) = indexed_store();
        store
            .update("garble", |tx| tx.put(HISTORY_ADDR_TXNS, addr(2).as_bytes(), b"\xff"))
            .unwrap();
        let err = verify_all(&store, &blocks).unwrap_err();
        assert!(matches!(err, HistoryError::Corrupted { seq: 0, .. }));
    }

    #[test]
    fn partial_index_is_corruption() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path().join("h.db"), StoreOptions::default()).unwrap();
        let blocks = sample_blocks();
        store
            .update("index", |tx| HistoryDb::parse_block(tx, &blocks[0]))
            .unwrap();
        let err = verify_all(&store, &blocks).unwrap_err();
        assert!(matches!(err, HistoryError::Corrupted { seq: 1, .. }));
    }

    #[test]
    fn indexes_map_caches_addresses() {
        let (_dir, store, blocks) = indexed_store();
        let indexes = IndexesMap::new();
        store
            .view("verify", |tx| HistoryDb::verify(tx, &blocks[1], &indexes))
            .unwrap();
        assert_eq!(indexes.len(), 3);
    }

    #[test]
    fn index_past_head_is_corruption() {
        let (_dir, store, _blocks) = indexed_store();
        store
            .view("height", |tx| HistoryDb::verify_height(tx, 2))
            .unwrap();
        store
            .update("overshoot", |tx| {
                tx.put(HISTORY_META, PARSED_HEIGHT_KEY, &7u64.to_be_bytes())
            })
            .unwrap();
        let err = store
            .view("height", |tx| HistoryDb::verify_height(tx, 2))
            .unwrap_err();
        assert!(matches!(err, HistoryError::Corrupted { seq: 3, .. }));
    }
}
