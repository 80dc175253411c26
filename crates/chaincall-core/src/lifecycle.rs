//! Advisory lifecycle state for instances and transactions.
//!
//! The tracker records where each instance and transaction stands, plus the
//! transaction-to-instance binding established when an invocation starts.
//! All of it is advisory: message routing never consults a status before
//! acting, and the tracker never rejects a transition. Redelivered or
//! out-of-order terminal messages simply overwrite, last write wins.

use std::collections::HashMap;
use std::fmt;
use std::sync::RwLock;

use tracing::debug;

use crate::correlation::CorrelationKey;

/// Where a contract instance stands in its lifecycle.
///
/// `New -> InitSent -> Ready <-> Busy`, with `Error` reachable from
/// anywhere. A closed stream also lands the instance in `Error`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstanceStatus {
    /// Registered, handshake replies not yet sent.
    New,
    /// Handshake finished; INIT dispatched where applicable.
    InitSent,
    /// Instance reported a successful terminal message.
    Ready,
    /// An invocation is in flight on this instance.
    Busy,
    /// Instance reported a failure or its stream closed.
    Error,
}

impl InstanceStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::New => "new",
            Self::InitSent => "init_sent",
            Self::Ready => "ready",
            Self::Busy => "busy",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for InstanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where one transaction stands on one instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxStatus {
    /// Invocation dispatched, terminal message pending.
    Started,
    /// COMPLETED arrived.
    Completed,
    /// ERROR arrived.
    Failed,
}

impl TxStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Started => "started",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for TxStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tracks advisory instance status, per-transaction status, and the
/// transaction-to-instance binding dispatchers use to resolve inbound
/// messages.
#[derive(Default)]
pub struct LifecycleTracker {
    instances: RwLock<HashMap<String, InstanceStatus>>,
    transactions: RwLock<HashMap<CorrelationKey, TxStatus>>,
    bindings: RwLock<HashMap<String, String>>,
}

impl LifecycleTracker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `status` for `instance_id`, overwriting any previous status.
    pub fn set_instance_status(&self, instance_id: &str, status: InstanceStatus) {
        let previous = {
            let mut instances = self.instances.write().expect("lock poisoned");
            instances.insert(instance_id.to_owned(), status)
        };
        debug!(
            instance_id = %instance_id,
            status = %status,
            previous = previous.map_or("none", InstanceStatus::as_str),
            "instance status",
        );
    }

    #[must_use]
    pub fn instance_status(&self, instance_id: &str) -> Option<InstanceStatus> {
        self.instances
            .read()
            .expect("lock poisoned")
            .get(instance_id)
            .copied()
    }

    /// Records `status` for the invocation identified by `key`.
    pub fn set_tx_status(&self, key: &CorrelationKey, status: TxStatus) {
        let mut transactions = self.transactions.write().expect("lock poisoned");
        transactions.insert(key.clone(), status);
    }

    #[must_use]
    pub fn tx_status(&self, key: &CorrelationKey) -> Option<TxStatus> {
        self.transactions
            .read()
            .expect("lock poisoned")
            .get(key)
            .copied()
    }

    /// Binds `tx_id` to the instance executing it, so inbound messages that
    /// carry only a transaction id can be resolved back to their instance.
    pub fn bind_transaction(&self, tx_id: impl Into<String>, instance_id: impl Into<String>) {
        let mut bindings = self.bindings.write().expect("lock poisoned");
        bindings.insert(tx_id.into(), instance_id.into());
    }

    #[must_use]
    pub fn instance_for_tx(&self, tx_id: &str) -> Option<String> {
        self.bindings
            .read()
            .expect("lock poisoned")
            .get(tx_id)
            .cloned()
    }

    /// Drops the binding and status entry for a finished invocation.
    ///
    /// The binding is only removed while it still points at `key`'s
    /// instance; a rebind by a newer invocation of the same transaction id
    /// is left alone.
    pub fn release_transaction(&self, key: &CorrelationKey) {
        {
            let mut bindings = self.bindings.write().expect("lock poisoned");
            if bindings.get(&key.tx_id).is_some_and(|bound| *bound == key.instance_id) {
                bindings.remove(&key.tx_id);
            }
        }
        let mut transactions = self.transactions.write().expect("lock poisoned");
        transactions.remove(key);
    }
}
