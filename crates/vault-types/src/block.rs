use serde::{Deserialize, Serialize};

use crate::address::Address;
use crate::digest::Digest;

/// Position of a block in the canonical chain. Genesis is `0`.
pub type BlockSeq = u64;

/// A value transfer between two addresses.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Transaction {
    pub from: Address,
    pub to: Address,
    pub amount: u64,
    /// Sender-chosen nonce; makes otherwise identical transfers distinct.
    pub nonce: u64,
}

impl Transaction {
    /// Fixed-width byte layout hashed to produce the transaction id.
    ///
    /// ```text
    /// [32 bytes: from][32 bytes: to][8 bytes: amount BE][8 bytes: nonce BE]
    /// ```
    pub fn canonical_bytes(&self) -> [u8; 80] {
        let mut out = [0u8; 80];
        out[..32].copy_from_slice(self.from.as_bytes());
        out[32..64].copy_from_slice(self.to.as_bytes());
        out[64..72].copy_from_slice(&self.amount.to_be_bytes());
        out[72..].copy_from_slice(&self.nonce.to_be_bytes());
        out
    }

    /// Addresses touched by this transaction, deduplicated, sender first.
    pub fn addresses(&self) -> Vec<Address> {
        if self.from == self.to {
            vec![self.from]
        } else {
            vec![self.from, self.to]
        }
    }
}

/// Block header. The block hash is computed over its canonical bytes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    pub seq: BlockSeq,
    /// Hash of the previous block's header, [`Digest::zero`] for genesis.
    pub prev_hash: Digest,
    /// Hash committing to the ordered transaction list.
    pub body_hash: Digest,
    /// Milliseconds since the Unix epoch.
    pub timestamp: u64,
}

impl BlockHeader {
    /// Fixed-width byte layout hashed to produce the block hash.
    ///
    /// ```text
    /// [8 bytes: seq BE][32 bytes: prev_hash][32 bytes: body_hash][8 bytes: timestamp BE]
    /// ```
    pub fn canonical_bytes(&self) -> [u8; 80] {
        let mut out = [0u8; 80];
        out[..8].copy_from_slice(&self.seq.to_be_bytes());
        out[8..40].copy_from_slice(self.prev_hash.as_bytes());
        out[40..72].copy_from_slice(self.body_hash.as_bytes());
        out[72..].copy_from_slice(&self.timestamp.to_be_bytes());
        out
    }
}

/// A block: header plus ordered transactions.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub header: BlockHeader,
    pub body: Vec<Transaction>,
}

impl Block {
    pub fn seq(&self) -> BlockSeq {
        self.header.seq
    }

    pub fn is_genesis(&self) -> bool {
        self.header.seq == 0
    }
}
