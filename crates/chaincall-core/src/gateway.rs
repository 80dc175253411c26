//! Invocation entry points exposed to the ledger side of the peer.
//!
//! `invoke` drives one contract execution to its terminal message: register
//! a rendezvous, send the request, wait. `init` and `send` are
//! fire-and-forget notifications with no reply path.
//!
//! # Ordering
//!
//! A single async mutex serializes every `invoke` across the whole process,
//! so at most one top-level invocation is in flight at a time, regardless of
//! instance. This is the coordination contract the rest of the peer was
//! built against and the known throughput ceiling. If it is ever relaxed,
//! move to per-instance exclusion; do not simply delete the lock, the
//! correlation table's one-slot-per-key invariant is not a substitute for
//! cross-instance ordering.

use std::sync::Arc;

use chaincall_protocol::{ContractMessage, MessageType};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::config::SupportConfig;
use crate::correlation::{AwaitError, CorrelationError, CorrelationKey, CorrelationTable};
use crate::lifecycle::{InstanceStatus, LifecycleTracker, TxStatus};
use crate::registry::{InstanceRegistry, SendOutcome};

/// Failures surfaced to `invoke` callers.
///
/// A contract-reported ERROR is not an `InvokeError`: terminal messages of
/// either kind resolve the call with `Ok`, and the caller inspects the
/// message type.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum InvokeError {
    /// An invocation for the same (transaction, instance) pair is already
    /// pending.
    #[error("invocation already in flight for tx {tx_id} on instance {instance_id}")]
    TransactionInFlight { tx_id: String, instance_id: String },
    /// No terminal message arrived within the configured timeout.
    #[error("execution timed out after {timeout_ms} ms (tx {tx_id}, instance {instance_id})")]
    Timeout {
        tx_id: String,
        instance_id: String,
        timeout_ms: u64,
    },
    /// The contract stream closed while the call was waiting.
    #[error("contract stream closed during execution (tx {tx_id}, instance {instance_id})")]
    Cancelled { tx_id: String, instance_id: String },
}

/// Serialized gateway from ledger transactions to contract executions.
pub struct InvocationGateway {
    registry: Arc<InstanceRegistry>,
    lifecycle: Arc<LifecycleTracker>,
    correlation: Arc<CorrelationTable>,
    invoke_lock: Mutex<()>,
    config: SupportConfig,
}

impl InvocationGateway {
    pub(crate) fn new(
        registry: Arc<InstanceRegistry>,
        lifecycle: Arc<LifecycleTracker>,
        correlation: Arc<CorrelationTable>,
        config: SupportConfig,
    ) -> Self {
        Self {
            registry,
            lifecycle,
            correlation,
            invoke_lock: Mutex::new(()),
            config,
        }
    }

    /// Drives one contract execution to its terminal message.
    ///
    /// Sends `message` to `instance_id` and waits for the matching COMPLETED
    /// or ERROR. An undeliverable request is logged and waited out: the
    /// terminal can never arrive, so the call resolves through the timeout
    /// path rather than failing fast.
    pub async fn invoke(
        &self,
        instance_id: &str,
        message: ContractMessage,
    ) -> Result<ContractMessage, InvokeError> {
        let _serial = self.invoke_lock.lock().await;

        let tx_id = message.tx_id.clone();
        let key = CorrelationKey::new(tx_id.clone(), instance_id);
        debug!(instance_id = %instance_id, tx_id = %tx_id, "invoking contract");

        self.lifecycle.set_instance_status(instance_id, InstanceStatus::Busy);
        self.lifecycle.bind_transaction(tx_id.clone(), instance_id);
        self.lifecycle.set_tx_status(&key, TxStatus::Started);

        // Rendezvous first, send second: a terminal racing back before this
        // task reaches wait() is buffered in the slot, not lost.
        let pending = match self.correlation.register(key.clone()) {
            Ok(pending) => pending,
            Err(CorrelationError::AlreadyPending { tx_id, instance_id }) => {
                return Err(InvokeError::TransactionInFlight { tx_id, instance_id });
            },
        };

        if !self.registry.send(instance_id, message).is_sent() {
            debug!(
                instance_id = %instance_id,
                tx_id = %tx_id,
                "request not deliverable, waiting out the timeout",
            );
        }

        let result = pending.wait(self.config.invoke_timeout).await;
        self.lifecycle.release_transaction(&key);

        match result {
            Ok(terminal) => {
                debug!(
                    instance_id = %instance_id,
                    tx_id = %tx_id,
                    terminal = %terminal.message_type(),
                    "invocation resolved",
                );
                Ok(terminal)
            },
            Err(AwaitError::TimedOut { timeout_ms }) => {
                warn!(
                    instance_id = %instance_id,
                    tx_id = %tx_id,
                    timeout_ms,
                    "invocation timed out",
                );
                Err(InvokeError::Timeout {
                    tx_id: key.tx_id,
                    instance_id: key.instance_id,
                    timeout_ms,
                })
            },
            Err(AwaitError::Cancelled) => {
                warn!(instance_id = %instance_id, tx_id = %tx_id, "invocation cancelled");
                Err(InvokeError::Cancelled {
                    tx_id: key.tx_id,
                    instance_id: key.instance_id,
                })
            },
        }
    }

    /// Fire-and-forget INIT: stamps the type and sends without a rendezvous.
    ///
    /// The outcome reports delivery into the channel only; whether the
    /// contract acted on it surfaces later through its own messages.
    pub fn init(&self, instance_id: &str, message: ContractMessage) -> SendOutcome {
        debug!(instance_id = %instance_id, tx_id = %message.tx_id, "sending INIT");
        let message = ContractMessage {
            message_type: MessageType::Init as i32,
            ..message
        };
        self.registry.send(instance_id, message)
    }

    /// Fire-and-forget send of an arbitrary envelope to an instance.
    pub fn send(&self, instance_id: &str, message: ContractMessage) -> SendOutcome {
        self.registry.send(instance_id, message)
    }
}
