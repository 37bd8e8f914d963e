use vault_crypto::{block_hash, body_hash, Signature, SigningKey};
use vault_types::{Block, BlockHeader, BlockSeq, Digest, Transaction};

/// A canonical block together with the chain key's signature over its hash.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SignedBlock {
    pub block: Block,
    pub sig: Signature,
}

impl SignedBlock {
    pub fn seq(&self) -> BlockSeq {
        self.block.seq()
    }

    /// Hash of the block header, the message covered by `sig`.
    pub fn hash(&self) -> Digest {
        block_hash(&self.block.header)
    }
}

/// Sign `block` with the chain key.
pub fn sign_block(key: &SigningKey, block: Block) -> SignedBlock {
    let sig = key.sign(block_hash(&block.header).as_bytes());
    SignedBlock { block, sig }
}

/// Build the block that follows `prev` (or genesis when `prev` is `None`).
pub fn build_block(prev: Option<&BlockHeader>, body: Vec<Transaction>, timestamp: u64) -> Block {
    let (seq, prev_hash) = match prev {
        Some(header) => (header.seq + 1, block_hash(header)),
        None => (0, Digest::zero()),
    };
    Block {
        header: BlockHeader {
            seq,
            prev_hash,
            body_hash: body_hash(&body),
            timestamp,
        },
        body,
    }
}
