//! Cryptographic primitives for Chain Vault.
//!
//! Provides Ed25519 block signing/verification, domain-separated BLAKE3
//! hashing for block and transaction identifiers, and the SHA-1 content
//! fingerprint used to name quarantined store files.
//!
//! All crypto operations wrap established libraries. There is no custom cryptography.

pub mod fingerprint;
pub mod hasher;
pub mod signer;

pub use fingerprint::{fingerprint_file, fingerprint_reader, FINGERPRINT_LEN};
pub use hasher::{block_hash, body_hash, transaction_id, ContentHasher};
pub use signer::{Signature, SignatureError, SigningKey, VerifyingKey, SIGNATURE_LEN};
