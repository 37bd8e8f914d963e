//! Test fixtures: on-disk stores holding a signed chain and its history index.

use std::path::PathBuf;

use vault_chain::{build_block, seq_key, sign_block, Blockchain, BLOCKS, BLOCK_SIGS};
use vault_crypto::{transaction_id, SigningKey};
use vault_history::{HistoryDb, HISTORY_ADDR_TXNS, HISTORY_META, HISTORY_TXNS, PARSED_HEIGHT_KEY};
use vault_store::{Store, StoreOptions};
use vault_types::{Address, BlockSeq, Transaction};

use crate::checker::{CheckerConfig, CorruptionChecker};
use crate::error::RepairError;
use crate::rebuild::IndexRebuilder;

pub(crate) struct Fixture {
    pub dir: tempfile::TempDir,
    pub path: PathBuf,
    pub key: SigningKey,
    pub store: Store,
}

impl Fixture {
    /// A store with `n` blocks, each indexed as it was appended.
    pub fn with_chain(n: u64) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.db");
        let store = Store::open(&path, StoreOptions::default()).unwrap();
        let key = SigningKey::generate();
        append_blocks(&store, &key, n);
        Self {
            dir,
            path,
            key,
            store,
        }
    }

    pub fn chain(&self) -> Blockchain {
        Blockchain::new(self.key.verifying_key())
    }

    pub fn checker(&self, workers: usize) -> CorruptionChecker {
        CorruptionChecker::new(
            self.key.verifying_key(),
            CheckerConfig {
                workers,
                exhaustive: false,
            },
        )
    }

    pub fn rebuilder(&self) -> IndexRebuilder {
        IndexRebuilder::new(self.chain())
    }

    pub fn corrupt_signature(&self, seq: BlockSeq) {
        self.store
            .update("corrupt_sig", |tx| tx.put(BLOCK_SIGS, &seq_key(seq), &[0xAB; 64]))
            .unwrap();
    }

    pub fn drop_block(&self, seq: BlockSeq) {
        self.store
            .update("drop_block", |tx| tx.delete(BLOCKS, &seq_key(seq)).map(|_| ()))
            .unwrap();
    }

    /// Claim the index covers blocks up to `height`.
    pub fn set_parsed_height(&self, height: BlockSeq) {
        self.store
            .update("set_height", |tx| {
                tx.put(HISTORY_META, PARSED_HEIGHT_KEY, &height.to_be_bytes())
            })
            .unwrap();
    }

    /// Store a key in `blocks` that is not a valid seq.
    pub fn put_malformed_block_key(&self) {
        self.store
            .update("bad_key", |tx| tx.put(BLOCKS, &[0xFF; 9], b"junk"))
            .unwrap();
    }

    /// Delete the index record of the first transaction at or after block `seq`.
    pub fn corrupt_index(&self, seq: BlockSeq) {
        let chain = self.chain();
        let target = self
            .store
            .view("find_txn", |tx| {
                let head = chain.head_seq(tx)?.unwrap_or(0);
                for s in seq..=head {
                    let signed = chain.get_signed_block_by_seq(tx, s)?;
                    if let Some(txn) = signed.block.body.first() {
                        return Ok::<_, RepairError>(Some(transaction_id(txn)));
                    }
                }
                Ok(None)
            })
            .unwrap()
            .expect("chain has a transaction at or after seq");
        self.store
            .update("corrupt_index", |tx| tx.delete(HISTORY_TXNS, target.as_bytes()))
            .unwrap();
    }

    /// Close the handle and return the raw file bytes.
    pub fn into_parts(self) -> (tempfile::TempDir, PathBuf, SigningKey, Vec<u8>) {
        let Self {
            dir,
            path,
            key,
            store,
        } = self;
        store.close().unwrap();
        let bytes = std::fs::read(&path).unwrap();
        (dir, path, key, bytes)
    }
}

fn transfer(seq: BlockSeq, i: u64) -> Transaction {
    Transaction {
        from: Address::from_raw([(seq % 5) as u8; 32]),
        to: Address::from_raw([(seq % 7 + 10) as u8; 32]),
        amount: seq * 10 + i,
        nonce: seq * 100 + i,
    }
}

/// Append `n` blocks (each with up to two transfers) and index them.
pub(crate) fn append_blocks(store: &Store, key: &SigningKey, n: u64) {
    let chain = Blockchain::new(key.verifying_key());
    store
        .update("append", |tx| {
            let mut prev = None;
            for seq in 0..n {
                let body = (0..seq % 3).map(|i| transfer(seq, i)).collect();
                let block = build_block(prev.as_ref(), body, 1_700_000_000_000 + seq);
                prev = Some(block.header.clone());
                chain.append_block(tx, &sign_block(key, block.clone()))?;
                HistoryDb::parse_block(tx, &block)?;
            }
            Ok::<_, RepairError>(())
        })
        .unwrap();
}

/// Every history bucket's entries, for comparing index states.
pub(crate) fn dump_index(store: &Store) -> Vec<Vec<(Vec<u8>, Vec<u8>)>> {
    store
        .view("dump", |tx| {
            [HISTORY_TXNS, HISTORY_ADDR_TXNS, HISTORY_META]
                .into_iter()
                .map(|bucket| tx.entries(bucket))
                .collect::<Result<Vec<_>, vault_store::StoreError>>()
        })
        .unwrap()
}
