//! In-memory reference ledger for tests and lightweight embeddings.

use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;
use std::sync::{Arc, Mutex};

use super::{
    HistoryEntry, HistoryQueryExecutor, HistoryResultStream, KvEntry, KvResultStream, LedgerError,
    LedgerProvider, TxSimulator,
};

/// World state and modification log for one ledger group.
#[derive(Default)]
struct GroupState {
    /// Live values keyed by (namespace, key); BTreeMap gives the key order
    /// range scans rely on.
    state: BTreeMap<(String, String), Vec<u8>>,
    /// Modification log per (namespace, key), oldest first.
    history: HashMap<(String, String), Vec<HistoryEntry>>,
    /// Monotonic pseudo block counter versioning history entries.
    next_block: u64,
}

impl GroupState {
    fn record(&mut self, namespace: &str, key: &str, tx_id: &str, value: Vec<u8>, is_delete: bool) {
        let entry = HistoryEntry {
            tx_id: tx_id.to_owned(),
            value,
            block_number: self.next_block,
            tx_number: 0,
            is_delete,
        };
        self.next_block += 1;
        self.history
            .entry((namespace.to_owned(), key.to_owned()))
            .or_default()
            .push(entry);
    }
}

type SharedGroup = Arc<Mutex<GroupState>>;

/// In-memory [`LedgerProvider`].
///
/// Writes apply immediately and are visible to every subsequent read. There
/// is no read/write-set isolation and no multi-version concurrency control;
/// those guarantees belong to a real ledger behind the same traits.
///
/// Groups must be created before use: a simulator request against an unknown
/// group fails with [`LedgerError::GroupNotFound`].
///
/// Cloning is shallow, so a test can keep a handle for assertions while the
/// coordination core owns another.
#[derive(Default, Clone)]
pub struct MemoryLedger {
    groups: Arc<Mutex<HashMap<String, SharedGroup>>>,
}

impl MemoryLedger {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates the ledger for `group_id` if it does not exist yet.
    pub fn create_group(&self, group_id: impl Into<String>) {
        let mut groups = self.groups.lock().expect("lock poisoned");
        groups.entry(group_id.into()).or_default();
    }

    /// Builder form of [`MemoryLedger::create_group`].
    #[must_use]
    pub fn with_group(self, group_id: impl Into<String>) -> Self {
        self.create_group(group_id);
        self
    }

    /// Direct read for assertions, bypassing the simulator interface.
    #[must_use]
    pub fn get(&self, group_id: &str, namespace: &str, key: &str) -> Option<Vec<u8>> {
        let group = self.group(group_id).ok()?;
        let state = group.lock().expect("lock poisoned");
        state
            .state
            .get(&(namespace.to_owned(), key.to_owned()))
            .cloned()
    }

    fn group(&self, group_id: &str) -> Result<SharedGroup, LedgerError> {
        let groups = self.groups.lock().expect("lock poisoned");
        groups
            .get(group_id)
            .cloned()
            .ok_or_else(|| LedgerError::GroupNotFound {
                group_id: group_id.to_owned(),
            })
    }
}

impl LedgerProvider for MemoryLedger {
    fn tx_simulator(
        &self,
        group_id: &str,
        tx_id: &str,
    ) -> Result<Box<dyn TxSimulator>, LedgerError> {
        Ok(Box::new(MemorySimulator {
            group: self.group(group_id)?,
            tx_id: tx_id.to_owned(),
        }))
    }

    fn history_executor(
        &self,
        group_id: &str,
    ) -> Result<Box<dyn HistoryQueryExecutor>, LedgerError> {
        Ok(Box::new(MemoryHistory {
            group: self.group(group_id)?,
        }))
    }
}

struct MemorySimulator {
    group: SharedGroup,
    tx_id: String,
}

impl TxSimulator for MemorySimulator {
    fn get_state(&mut self, namespace: &str, key: &str) -> Result<Option<Vec<u8>>, LedgerError> {
        let state = self.group.lock().expect("lock poisoned");
        Ok(state
            .state
            .get(&(namespace.to_owned(), key.to_owned()))
            .cloned())
    }

    fn set_state(
        &mut self,
        namespace: &str,
        key: &str,
        value: Vec<u8>,
    ) -> Result<(), LedgerError> {
        let mut state = self.group.lock().expect("lock poisoned");
        state
            .state
            .insert((namespace.to_owned(), key.to_owned()), value.clone());
        state.record(namespace, key, &self.tx_id, value, false);
        Ok(())
    }

    fn delete_state(&mut self, namespace: &str, key: &str) -> Result<(), LedgerError> {
        let mut state = self.group.lock().expect("lock poisoned");
        state.state.remove(&(namespace.to_owned(), key.to_owned()));
        state.record(namespace, key, &self.tx_id, Vec::new(), true);
        Ok(())
    }

    fn range_scan(
        &mut self,
        namespace: &str,
        start_key: &str,
        end_key: &str,
    ) -> Result<KvResultStream, LedgerError> {
        let state = self.group.lock().expect("lock poisoned");
        let lower = Bound::Included((namespace.to_owned(), start_key.to_owned()));
        // Advisory upper bound per the trait contract: include the boundary
        // record itself, callers cut the scan off at end_key.
        let entries: Vec<KvEntry> = state
            .state
            .range((lower, Bound::Unbounded))
            .take_while(|((ns, key), _)| {
                ns == namespace && (end_key.is_empty() || key.as_str() <= end_key)
            })
            .map(|((ns, key), value)| KvEntry {
                namespace: ns.clone(),
                key: key.clone(),
                value: value.clone(),
            })
            .collect();
        Ok(Box::new(entries.into_iter().map(Ok)))
    }
}

struct MemoryHistory {
    group: SharedGroup,
}

impl HistoryQueryExecutor for MemoryHistory {
    fn history_for_key(
        &mut self,
        namespace: &str,
        key: &str,
    ) -> Result<HistoryResultStream, LedgerError> {
        let state = self.group.lock().expect("lock poisoned");
        let mut entries = state
            .history
            .get(&(namespace.to_owned(), key.to_owned()))
            .cloned()
            .unwrap_or_default();
        entries.reverse();
        Ok(Box::new(entries.into_iter().map(Ok)))
    }
}
