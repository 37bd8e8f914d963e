use tracing::debug;
use vault_crypto::{block_hash, body_hash, Signature, VerifyingKey};
use vault_store::{Bucket, StoreResult, Tx};
use vault_types::{Block, BlockSeq, Digest};

use crate::block::SignedBlock;
use crate::error::{ChainError, ChainResult};

/// Blocks by big-endian seq, bincode encoded.
pub const BLOCKS: Bucket = Bucket::new("blocks");

/// Raw 64-byte block signatures by big-endian seq.
pub const BLOCK_SIGS: Bucket = Bucket::new("block_sigs");

/// Storage key for a block seq. Big-endian so key order is seq order.
pub fn seq_key(seq: BlockSeq) -> [u8; 8] {
    seq.to_be_bytes()
}

fn seq_from_key(key: &[u8]) -> ChainResult<BlockSeq> {
    let bytes: [u8; 8] = key
        .try_into()
        .map_err(|_| ChainError::CorruptKey { len: key.len() })?;
    Ok(BlockSeq::from_be_bytes(bytes))
}

/// Accessor for the canonical chain stored in the `blocks` and
/// `block_sigs` buckets.
///
/// Every block is signed by one chain key; the accessor holds its public half.
#[derive(Clone, Debug)]
pub struct Blockchain {
    pubkey: VerifyingKey,
}

impl Blockchain {
    pub fn new(pubkey: VerifyingKey) -> Self {
        Self { pubkey }
    }

    pub fn pubkey(&self) -> &VerifyingKey {
        &self.pubkey
    }

    /// Whether any block was ever written to this store.
    pub fn exists(tx: &Tx<'_>) -> StoreResult<bool> {
        tx.bucket_exists(BLOCKS)
    }

    /// Highest stored seq, or `None` for an empty chain.
    pub fn head_seq(&self, tx: &Tx<'_>) -> ChainResult<Option<BlockSeq>> {
        match tx.last(BLOCKS)? {
            Some((key, _)) => Ok(Some(seq_from_key(&key)?)),
            None => Ok(None),
        }
    }

    /// Lowest stored seq at or after `from`.
    pub fn next_stored_seq(&self, tx: &Tx<'_>, from: BlockSeq) -> ChainResult<Option<BlockSeq>> {
        match tx.next_key(BLOCKS, &seq_key(from))? {
            Some(key) => Ok(Some(seq_from_key(&key)?)),
            None => Ok(None),
        }
    }

    /// Load the block at `seq` together with its signature.
    ///
    /// The signature is not checked; see [`Blockchain::verify_signature`].
    pub fn get_signed_block_by_seq(&self, tx: &Tx<'_>, seq: BlockSeq) -> ChainResult<SignedBlock> {
        let key = seq_key(seq);
        let raw = tx.get(BLOCKS, &key)?.ok_or(ChainError::MissingBlock(seq))?;
        let block: Block = bincode::deserialize(&raw).map_err(|e| ChainError::Decode {
            seq,
            reason: e.to_string(),
        })?;
        if block.seq() != seq {
            return Err(ChainError::Decode {
                seq,
                reason: format!("header carries seq {}", block.seq()),
            });
        }

        let raw_sig = tx
            .get(BLOCK_SIGS, &key)?
            .ok_or(ChainError::MissingSignature(seq))?;
        let sig = Signature::from_slice(&raw_sig).map_err(|_| ChainError::InvalidSignature(seq))?;
        Ok(SignedBlock { block, sig })
    }

    /// Check the signature against the chain key.
    ///
    /// The header's body hash must also match the transactions, since the
    /// signature only covers the header.
    pub fn verify_signature(&self, signed: &SignedBlock) -> ChainResult<()> {
        let seq = signed.seq();
        self.pubkey
            .verify(signed.hash().as_bytes(), &signed.sig)
            .map_err(|_| ChainError::InvalidSignature(seq))?;
        if body_hash(&signed.block.body) != signed.block.header.body_hash {
            return Err(ChainError::InvalidSignature(seq));
        }
        Ok(())
    }

    /// Append the next block to the chain.
    ///
    /// The block must carry seq `head + 1` (or 0 on an empty chain), link to
    /// the current head's hash, and be signed by the chain key.
    pub fn append_block(&self, tx: &Tx<'_>, signed: &SignedBlock) -> ChainResult<()> {
        let head = self.head_seq(tx)?;
        let expected = head.map_or(0, |h| h + 1);
        if signed.seq() != expected {
            return Err(ChainError::OutOfOrder {
                expected,
                got: signed.seq(),
            });
        }

        let expected_prev = match head {
            Some(h) => block_hash(&self.get_signed_block_by_seq(tx, h)?.block.header),
            None => Digest::zero(),
        };
        if signed.block.header.prev_hash != expected_prev {
            return Err(ChainError::BrokenLink(signed.seq()));
        }

        self.verify_signature(signed)?;

        let encoded =
            bincode::serialize(&signed.block).map_err(|e| ChainError::Encode(e.to_string()))?;
        let key = seq_key(signed.seq());
        tx.put(BLOCKS, &key, &encoded)?;
        tx.put(BLOCK_SIGS, &key, &signed.sig.to_bytes())?;
        debug!(seq = signed.seq(), txns = signed.block.body.len(), "block appended");
        Ok(())
    }
}
