//! Single-slot rendezvous between invocation callers and inbound terminals.
//!
//! An invocation registers a slot under its (transaction, instance) key and
//! waits. The dispatcher that later receives the matching COMPLETED or ERROR
//! deposits it into the slot, waking exactly that caller. Each slot is a
//! oneshot channel: the first terminal message wins, later deposits for the
//! same key find no slot and are dropped with a log line.
//!
//! Slots cannot leak. Delivery removes the entry, and a waiter that gives up
//! (timeout, task cancellation) removes its own entry on drop. The drop path
//! is token-guarded so a stale guard never evicts a successor registration
//! that reused the key.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chaincall_protocol::ContractMessage;
use thiserror::Error;
use tokio::sync::oneshot;
use tracing::{debug, warn};

/// Identifies one in-flight invocation: a transaction on an instance.
///
/// Both halves matter. Distinct instances may carry the same transaction id,
/// and one instance may see a transaction id again after a previous
/// invocation resolved.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CorrelationKey {
    pub tx_id: String,
    pub instance_id: String,
}

impl CorrelationKey {
    #[must_use]
    pub fn new(tx_id: impl Into<String>, instance_id: impl Into<String>) -> Self {
        Self {
            tx_id: tx_id.into(),
            instance_id: instance_id.into(),
        }
    }
}

impl fmt::Display for CorrelationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.tx_id, self.instance_id)
    }
}

/// Registration failure: the key already has a live waiter.
#[derive(Debug, Error)]
pub enum CorrelationError {
    /// At most one invocation may be pending per (transaction, instance).
    #[error("invocation already pending for tx {tx_id} on instance {instance_id}")]
    AlreadyPending { tx_id: String, instance_id: String },
}

/// Why a wait ended without a terminal message.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum AwaitError {
    #[error("timed out after {timeout_ms} ms waiting for a terminal message")]
    TimedOut { timeout_ms: u64 },
    #[error("contract stream closed before a terminal message arrived")]
    Cancelled,
}

/// What happened to a deposited message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliverOutcome {
    /// A waiter existed and has been woken with the message.
    Delivered,
    /// No waiter was registered for the key; the message was dropped.
    NoWaiter,
}

#[derive(Debug)]
struct Slot {
    token: u64,
    sender: oneshot::Sender<ContractMessage>,
}

type SlotMap = Mutex<HashMap<CorrelationKey, Slot>>;

/// Rendezvous table holding at most one pending slot per key.
#[derive(Default)]
pub struct CorrelationTable {
    slots: Arc<SlotMap>,
    next_token: AtomicU64,
}

impl CorrelationTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a rendezvous for `key`.
    ///
    /// Rejects a key whose slot still has a live waiter. A slot whose waiter
    /// already went away (its drop guard has not run yet) is replaced
    /// instead of rejected.
    pub fn register(&self, key: CorrelationKey) -> Result<PendingResponse, CorrelationError> {
        let token = self.next_token.fetch_add(1, Ordering::Relaxed);
        let (sender, receiver) = oneshot::channel();
        {
            let mut slots = self.slots.lock().expect("lock poisoned");
            match slots.entry(key.clone()) {
                Entry::Occupied(mut occupied) => {
                    if !occupied.get().sender.is_closed() {
                        return Err(CorrelationError::AlreadyPending {
                            tx_id: key.tx_id,
                            instance_id: key.instance_id,
                        });
                    }
                    debug!(key = %key, "replacing abandoned rendezvous slot");
                    occupied.insert(Slot { token, sender });
                },
                Entry::Vacant(vacant) => {
                    vacant.insert(Slot { token, sender });
                },
            }
        }
        Ok(PendingResponse {
            key,
            token,
            receiver,
            slots: Arc::clone(&self.slots),
        })
    }

    /// Deposits `message` for `key`, waking its waiter.
    ///
    /// Returns [`DeliverOutcome::NoWaiter`] when nothing is pending for the
    /// key, which covers unsolicited terminals and terminals that lost the
    /// race against a timeout.
    pub fn deliver(&self, key: &CorrelationKey, message: ContractMessage) -> DeliverOutcome {
        let slot = self.slots.lock().expect("lock poisoned").remove(key);
        let Some(slot) = slot else {
            debug!(key = %key, "terminal message without a waiter, dropping");
            return DeliverOutcome::NoWaiter;
        };
        if slot.sender.send(message).is_err() {
            warn!(key = %key, "waiter left before its terminal message, dropping");
            return DeliverOutcome::NoWaiter;
        }
        DeliverOutcome::Delivered
    }

    /// Drops every pending slot belonging to `instance_id`, waking their
    /// waiters with [`AwaitError::Cancelled`]. Returns how many were
    /// cancelled.
    pub fn cancel_instance(&self, instance_id: &str) -> usize {
        let mut slots = self.slots.lock().expect("lock poisoned");
        let before = slots.len();
        slots.retain(|key, _| key.instance_id != instance_id);
        before - slots.len()
    }

    /// Number of pending rendezvous.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.slots.lock().expect("lock poisoned").len()
    }
}

/// A registered rendezvous, resolving to the terminal message for its key.
///
/// Dropping the handle removes its table entry, so a caller that times out
/// or is cancelled never leaks a slot.
#[derive(Debug)]
#[must_use = "a rendezvous does nothing unless awaited"]
pub struct PendingResponse {
    key: CorrelationKey,
    token: u64,
    receiver: oneshot::Receiver<ContractMessage>,
    slots: Arc<SlotMap>,
}

impl PendingResponse {
    /// Waits up to `timeout` for the terminal message.
    ///
    /// Only the calling task parks here; the table itself stays unlocked, so
    /// other streams keep dispatching while this invocation waits.
    pub async fn wait(mut self, timeout: Duration) -> Result<ContractMessage, AwaitError> {
        match tokio::time::timeout(timeout, &mut self.receiver).await {
            Ok(Ok(message)) => Ok(message),
            Ok(Err(_)) => Err(AwaitError::Cancelled),
            Err(_) => Err(AwaitError::TimedOut {
                timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            }),
        }
    }
}

impl Drop for PendingResponse {
    fn drop(&mut self) {
        let Ok(mut slots) = self.slots.lock() else {
            return;
        };
        // Token check: only remove the slot this handle created. The key may
        // have been re-registered by a newer invocation since.
        if slots.get(&self.key).is_some_and(|slot| slot.token == self.token) {
            slots.remove(&self.key);
        }
    }
}
