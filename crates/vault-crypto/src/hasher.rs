use vault_types::{BlockHeader, Digest, Transaction};

/// Domain-separated BLAKE3 content hasher.
///
/// Each hasher carries a domain tag (e.g., `"vault-header-v1"`) that is
/// prepended to every hash computation. A header and a transaction with
/// identical bytes therefore never share a digest.
pub struct ContentHasher {
    domain: &'static str,
}

impl ContentHasher {
    /// Hasher for block headers (the block hash).
    pub const HEADER: Self = Self {
        domain: "vault-header-v1",
    };
    /// Hasher for the ordered transaction list of a block.
    pub const BODY: Self = Self {
        domain: "vault-body-v1",
    };
    /// Hasher for individual transactions (the transaction id).
    pub const TRANSACTION: Self = Self {
        domain: "vault-tx-v1",
    };

    /// Hash raw bytes with domain separation.
    pub fn hash(&self, data: &[u8]) -> Digest {
        self.hash_parts(&[data])
    }

    /// Hash a sequence of byte slices as one message.
    pub fn hash_parts(&self, parts: &[&[u8]]) -> Digest {
        let mut hasher = blake3::Hasher::new();
        hasher.update(self.domain.as_bytes());
        hasher.update(b":");
        for part in parts {
            hasher.update(part);
        }
        Digest::from_hash(*hasher.finalize().as_bytes())
    }

}

/// Block hash: the digest signed by the chain key and linked by `prev_hash`.
pub fn block_hash(header: &BlockHeader) -> Digest {
    ContentHasher::HEADER.hash(&header.canonical_bytes())
}

/// Transaction id.
pub fn transaction_id(tx: &Transaction) -> Digest {
    ContentHasher::TRANSACTION.hash(&tx.canonical_bytes())
}

/// Commitment to an ordered transaction list: hash over the concatenated ids.
pub fn body_hash(body: &[Transaction]) -> Digest {
    let ids: Vec<Digest> = body.iter().map(transaction_id).collect();
    let parts: Vec<&[u8]> = ids.iter().map(|id| id.as_ref()).collect();
    ContentHasher::BODY.hash_parts(&parts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use vault_types::Address;

    fn tx(nonce: u64) -> Transaction {
        Transaction {
            from: Address::from_raw([1; 32]),
            to: Address::from_raw([2; 32]),
            amount: 10,
            nonce,
        }
    }

    #[test]
    fn hash_is_deterministic() {
        let data = b"hello world";
        assert_eq!(
            ContentHasher::HEADER.hash(data),
            ContentHasher::HEADER.hash(data)
        );
    }

    #[test]
    fn different_domains_produce_different_hashes() {
        let data = b"same content";
        let header = ContentHasher::HEADER.hash(data);
        let body = ContentHasher::BODY.hash(data);
        let tx = ContentHasher::TRANSACTION.hash(data);
        assert_ne!(header, body);
        assert_ne!(header, tx);
        assert_ne!(body, tx);
    }

    #[test]
    fn body_hash_depends_on_order() {
        let forward = body_hash(&[tx(1), tx(2)]);
        let reversed = body_hash(&[tx(2), tx(1)]);
        assert_ne!(forward, reversed);
    }

    #[test]
    fn transaction_ids_differ_by_nonce() {
        assert_ne!(transaction_id(&tx(1)), transaction_id(&tx(2)));
    }

    #[test]
    fn block_hash_covers_prev_link() {
        let a = BlockHeader {
            seq: 1,
            prev_hash: Digest::from_hash([1; 32]),
            body_hash: body_hash(&[]),
            timestamp: 0,
        };
        let b = BlockHeader {
            prev_hash: Digest::from_hash([2; 32]),
            ..a.clone()
        };
        assert_ne!(block_hash(&a), block_hash(&b));
    }
}
