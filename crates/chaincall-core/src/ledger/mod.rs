//! Ledger collaborator contracts consumed by the state bridge.
//!
//! The coordination core never touches storage itself. Hosts hand it a
//! [`LedgerProvider`], which mints transaction-scoped [`TxSimulator`]s and
//! group-scoped [`HistoryQueryExecutor`]s. [`MemoryLedger`] is the built-in
//! implementation used by tests and lightweight embeddings.

mod memory;

use thiserror::Error;

pub use memory::MemoryLedger;

/// Failures surfaced by ledger collaborators.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum LedgerError {
    /// No ledger exists for the requested group.
    #[error("no ledger for group {group_id}")]
    GroupNotFound { group_id: String },
    /// Underlying storage failure.
    #[error("storage error: {0}")]
    Storage(String),
}

/// One live key yielded by a range scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KvEntry {
    /// Contract namespace the key lives in.
    pub namespace: String,
    pub key: String,
    pub value: Vec<u8>,
}

/// One past modification of a key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryEntry {
    /// Transaction that wrote or deleted the key.
    pub tx_id: String,
    /// Value written; empty for deletions.
    pub value: Vec<u8>,
    pub block_number: u64,
    pub tx_number: u64,
    pub is_delete: bool,
}

/// Lazy, finite, consumed-once stream of range scan results.
pub type KvResultStream = Box<dyn Iterator<Item = Result<KvEntry, LedgerError>> + Send>;

/// Lazy, finite, consumed-once stream of history results.
pub type HistoryResultStream = Box<dyn Iterator<Item = Result<HistoryEntry, LedgerError>> + Send>;

/// Transactional state access scoped to one transaction on one group.
///
/// Every operation is namespaced by the calling contract, isolating each
/// contract's key space from the others on the same group.
pub trait TxSimulator: Send {
    /// Reads `key`. Absence is `Ok(None)`, not an error.
    fn get_state(&mut self, namespace: &str, key: &str) -> Result<Option<Vec<u8>>, LedgerError>;

    /// Writes `value` under `key`.
    fn set_state(&mut self, namespace: &str, key: &str, value: Vec<u8>)
        -> Result<(), LedgerError>;

    /// Removes `key`.
    fn delete_state(&mut self, namespace: &str, key: &str) -> Result<(), LedgerError>;

    /// Key-ordered scan starting at `start_key`.
    ///
    /// The upper bound is advisory: implementations may keep yielding
    /// through `end_key` and beyond its boundary record. Callers enforce the
    /// exclusive bound themselves and stop consuming.
    fn range_scan(
        &mut self,
        namespace: &str,
        start_key: &str,
        end_key: &str,
    ) -> Result<KvResultStream, LedgerError>;
}

/// Read access to a key's modification history, newest first.
pub trait HistoryQueryExecutor: Send {
    fn history_for_key(
        &mut self,
        namespace: &str,
        key: &str,
    ) -> Result<HistoryResultStream, LedgerError>;
}

/// Entry point handing out per-transaction ledger access.
pub trait LedgerProvider: Send + Sync {
    /// A simulator scoped to `tx_id` on `group_id`.
    fn tx_simulator(&self, group_id: &str, tx_id: &str)
        -> Result<Box<dyn TxSimulator>, LedgerError>;

    /// A history executor for `group_id`.
    fn history_executor(
        &self,
        group_id: &str,
    ) -> Result<Box<dyn HistoryQueryExecutor>, LedgerError>;
}
