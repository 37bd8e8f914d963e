//! Derived history index for Chain Vault.
//!
//! Maps transaction ids to the transaction and its block, and addresses to
//! the transactions that touch them. The index is rebuilt from the canonical
//! chain whenever it is found inconsistent, so nothing here is primary data.

pub mod error;
pub mod history;

pub use error::{HistoryError, HistoryResult};
pub use history::{
    HistoryDb, IndexesMap, TxRecord, HISTORY_ADDR_TXNS, HISTORY_META, HISTORY_TXNS,
    PARSED_HEIGHT_KEY,
};
