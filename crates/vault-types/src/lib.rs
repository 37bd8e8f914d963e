//! Foundation types for Chain Vault.
//!
//! This crate provides the structural types shared by every other crate in
//! the workspace: the 32-byte [`Digest`] used for block and transaction
//! identifiers, account [`Address`]es, and the [`Block`] / [`Transaction`]
//! records that make up the canonical chain.
//!
//! Types here carry no cryptography. Hashing and signing live in
//! `vault-crypto`; every type exposes a canonical byte layout so those
//! primitives can operate on it deterministically.

pub mod address;
pub mod block;
pub mod digest;
pub mod error;

pub use address::Address;
pub use block::{Block, BlockHeader, BlockSeq, Transaction};
pub use digest::Digest;
pub use error::TypeError;
