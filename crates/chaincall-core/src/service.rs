//! Embedding surface tying the coordination components together.
//!
//! # Architecture
//!
//! ```text
//!                      ContractSupport
//!                            |
//!        +----------+--------+--------+------------+
//!        |          |                 |            |
//!   InstanceRegistry|          CorrelationTable    |
//!                   |                 |            |
//!            LifecycleTracker         |     InvocationGateway
//!                   |                 |            |
//!                   +---- Dispatcher -+------------+
//!                            |
//!                       StateBridge -> LedgerProvider
//! ```
//!
//! The transport layer stays outside. For every contract runtime that
//! connects, the host calls [`ContractSupport::open_stream`] and pumps
//! decoded envelopes in and out of the returned [`StreamHandle`]. The ledger
//! side calls [`ContractSupport::invoke`] and the notification sends.

use std::sync::Arc;

use chaincall_protocol::ContractMessage;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::bridge::StateBridge;
use crate::config::SupportConfig;
use crate::correlation::CorrelationTable;
use crate::dispatch::Dispatcher;
use crate::gateway::{InvocationGateway, InvokeError};
use crate::handshake::SystemContractPolicy;
use crate::ledger::LedgerProvider;
use crate::lifecycle::{InstanceStatus, LifecycleTracker, TxStatus};
use crate::registry::{InstanceChannel, InstanceRegistry, SendOutcome};

/// Transport-facing handles for one contract stream.
///
/// The transport pushes every inbound envelope into `inbound` and drains
/// `outbound` onto the wire. Dropping `inbound` marks the stream closed: the
/// receive loop unregisters the instance, cancels its pending invocations,
/// and exits.
pub struct StreamHandle {
    /// Feed for envelopes decoded off the stream.
    pub inbound: mpsc::UnboundedSender<ContractMessage>,
    /// Envelopes to encode onto the stream.
    pub outbound: mpsc::UnboundedReceiver<ContractMessage>,
    /// The stream's receive-loop task; completes once the stream ends.
    pub task: JoinHandle<()>,
}

/// Coordination core for out-of-process contract execution.
///
/// Owns the shared registries and spawns one dispatcher task per stream.
/// Cheap to share behind an `Arc`; all methods take `&self`.
pub struct ContractSupport {
    registry: Arc<InstanceRegistry>,
    lifecycle: Arc<LifecycleTracker>,
    dispatcher: Arc<Dispatcher>,
    gateway: InvocationGateway,
}

impl ContractSupport {
    #[must_use]
    pub fn new(
        config: SupportConfig,
        ledger: Arc<dyn LedgerProvider>,
        policy: Arc<dyn SystemContractPolicy>,
    ) -> Self {
        let registry = Arc::new(InstanceRegistry::new());
        let lifecycle = Arc::new(LifecycleTracker::new());
        let correlation = Arc::new(CorrelationTable::new());
        let dispatcher = Arc::new(Dispatcher::new(
            Arc::clone(&registry),
            Arc::clone(&lifecycle),
            Arc::clone(&correlation),
            StateBridge::new(ledger),
            policy,
        ));
        let gateway = InvocationGateway::new(
            Arc::clone(&registry),
            Arc::clone(&lifecycle),
            correlation,
            config,
        );
        Self {
            registry,
            lifecycle,
            dispatcher,
            gateway,
        }
    }

    /// Opens the coordination side of a newly connected contract stream and
    /// spawns its receive loop.
    #[must_use]
    pub fn open_stream(&self) -> StreamHandle {
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let channel: InstanceChannel = Arc::new(outbound_tx);
        let dispatcher = Arc::clone(&self.dispatcher);
        let task = tokio::spawn(async move {
            dispatcher.run_stream(channel, inbound_rx).await;
        });
        StreamHandle {
            inbound: inbound_tx,
            outbound: outbound_rx,
            task,
        }
    }

    /// Drives one contract execution to its terminal message. See
    /// [`InvocationGateway::invoke`].
    pub async fn invoke(
        &self,
        instance_id: &str,
        message: ContractMessage,
    ) -> Result<ContractMessage, InvokeError> {
        self.gateway.invoke(instance_id, message).await
    }

    /// Fire-and-forget INIT toward `instance_id`. See
    /// [`InvocationGateway::init`].
    pub fn init(&self, instance_id: &str, message: ContractMessage) -> SendOutcome {
        self.gateway.init(instance_id, message)
    }

    /// Fire-and-forget send toward `instance_id`.
    pub fn send(&self, instance_id: &str, message: ContractMessage) -> SendOutcome {
        self.gateway.send(instance_id, message)
    }

    /// Whether `instance_id` currently has a registered stream.
    #[must_use]
    pub fn is_registered(&self, instance_id: &str) -> bool {
        self.registry.lookup(instance_id).is_some()
    }

    /// Advisory lifecycle status of an instance.
    #[must_use]
    pub fn instance_status(&self, instance_id: &str) -> Option<InstanceStatus> {
        self.lifecycle.instance_status(instance_id)
    }

    /// Advisory status of a transaction on an instance.
    #[must_use]
    pub fn tx_status(&self, tx_id: &str, instance_id: &str) -> Option<TxStatus> {
        self.lifecycle
            .tx_status(&crate::correlation::CorrelationKey::new(tx_id, instance_id))
    }
}
