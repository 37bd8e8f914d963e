//! Ed25519 keys for signing and checking canonical blocks.
//!
//! Blocks are signed over their BLAKE3 block hash. Signatures are stored
//! raw (64 bytes) next to the block, so parsing never validates anything:
//! a well-sized but bogus signature only fails in [`VerifyingKey::verify`].

use std::fmt;

use ed25519_dalek::{Signer, Verifier};

/// Length of a raw signature as stored in the `block_sigs` bucket.
pub const SIGNATURE_LEN: usize = ed25519_dalek::SIGNATURE_LENGTH;

/// The block producer's private key.
pub struct SigningKey(ed25519_dalek::SigningKey);

/// The chain's public key. Every stored block must verify against it.
#[derive(Clone, PartialEq, Eq)]
pub struct VerifyingKey(ed25519_dalek::VerifyingKey);

#[derive(Clone, PartialEq, Eq)]
pub struct Signature(ed25519_dalek::Signature);

impl SigningKey {
    pub fn generate() -> Self {
        Self(ed25519_dalek::SigningKey::generate(&mut rand::thread_rng()))
    }

    /// Deterministic key from a 32-byte seed.
    pub fn from_seed(seed: [u8; 32]) -> Self {
        Self(ed25519_dalek::SigningKey::from_bytes(&seed))
    }

    pub fn verifying_key(&self) -> VerifyingKey {
        VerifyingKey(self.0.verifying_key())
    }

    pub fn sign(&self, message: &[u8]) -> Signature {
        Signature(self.0.sign(message))
    }
}

impl VerifyingKey {
    pub fn verify(&self, message: &[u8], signature: &Signature) -> Result<(), SignatureError> {
        self.0
            .verify(message, &signature.0)
            .map_err(|_| SignatureError::InvalidSignature)
    }

    /// Parse the 64-character hex form printed by `to_hex`.
    pub fn from_hex(s: &str) -> Result<Self, SignatureError> {
        let mut raw = [0u8; 32];
        hex::decode_to_slice(s.trim(), &mut raw).map_err(|_| SignatureError::InvalidKey)?;
        ed25519_dalek::VerifyingKey::from_bytes(&raw)
            .map(Self)
            .map_err(|_| SignatureError::InvalidKey)
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0.as_bytes())
    }
}

impl Signature {
    pub fn to_bytes(&self) -> [u8; SIGNATURE_LEN] {
        self.0.to_bytes()
    }

    /// Parse a stored signature. Only the length is checked here.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, SignatureError> {
        ed25519_dalek::Signature::from_slice(bytes)
            .map(Self)
            .map_err(|_| SignatureError::InvalidLength(bytes.len()))
    }
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SigningKey(..)")
    }
}

impl fmt::Debug for VerifyingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("VerifyingKey").field(&self.to_hex()).finish()
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let raw = self.0.to_bytes();
        write!(f, "Signature({}..)", hex::encode(&raw[..6]))
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("signature does not verify")]
    InvalidSignature,
    #[error("not a valid Ed25519 public key")]
    InvalidKey,
    #[error("signature is {0} bytes, expected {SIGNATURE_LEN}")]
    InvalidLength(usize),
}
