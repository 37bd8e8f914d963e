//! Transactional key-value storage for Chain Vault.
//!
//! A [`Store`] wraps a single `redb` database file. Data is organised in
//! named [`Bucket`]s of byte keys to byte values; every access happens
//! inside a read ([`Store::view`]) or write ([`Store::update`]) transaction
//! exposed to callers as a [`Tx`].
//!
//! # Design Rules
//!
//! 1. Exactly one [`Store`] is live per file. [`Store::close`] consumes the
//!    handle, so a file cannot be reopened while its old handle is in use.
//! 2. Write transactions commit when the closure returns `Ok` and abort
//!    otherwise. There is no partial commit.
//! 3. Read transactions see a consistent snapshot and may run concurrently
//!    with each other and with a single writer.
//! 4. Transactions never nest.
//! 5. All I/O errors are propagated, never silently ignored.

pub mod bucket;
pub mod error;
pub mod store;
pub mod tx;

pub use bucket::Bucket;
pub use error::{StoreError, StoreResult};
pub use store::{Store, StoreOptions, DEFAULT_FILE_MODE, DEFAULT_OPEN_TIMEOUT};
pub use tx::Tx;
