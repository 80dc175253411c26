//! Per-stream receive loop and message routing.
//!
//! Every connected contract stream gets one dispatcher task. The task drains
//! the stream's inbound messages and routes each to exactly one handler:
//! handshake, terminal delivery, keepalive echo, or a state bridge
//! operation. Routing is an exhaustive match over [`MessageType`], so the
//! compiler flags every routing site when a discriminant is added.
//!
//! When the inbound side closes, the loop unregisters the instance and
//! cancels its pending invocations, then exits. Nothing is left behind for a
//! stream that will never speak again.

use std::sync::Arc;

use chaincall_protocol::{ContractMessage, MessageType};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::bridge::StateBridge;
use crate::correlation::{CorrelationKey, CorrelationTable};
use crate::handshake::{self, SystemContractPolicy};
use crate::lifecycle::{InstanceStatus, LifecycleTracker, TxStatus};
use crate::registry::{InstanceChannel, InstanceRegistry};

/// Routes inbound protocol messages for contract streams.
pub(crate) struct Dispatcher {
    registry: Arc<InstanceRegistry>,
    lifecycle: Arc<LifecycleTracker>,
    correlation: Arc<CorrelationTable>,
    bridge: StateBridge,
    policy: Arc<dyn SystemContractPolicy>,
}

impl Dispatcher {
    pub(crate) fn new(
        registry: Arc<InstanceRegistry>,
        lifecycle: Arc<LifecycleTracker>,
        correlation: Arc<CorrelationTable>,
        bridge: StateBridge,
        policy: Arc<dyn SystemContractPolicy>,
    ) -> Self {
        Self {
            registry,
            lifecycle,
            correlation,
            bridge,
            policy,
        }
    }

    /// Receive loop for one stream; runs until the inbound side closes.
    pub(crate) async fn run_stream(
        &self,
        channel: InstanceChannel,
        mut inbound: mpsc::UnboundedReceiver<ContractMessage>,
    ) {
        let mut registered: Option<String> = None;
        while let Some(message) = inbound.recv().await {
            self.dispatch(message, &channel, &mut registered);
        }
        if let Some(instance_id) = registered {
            self.stream_closed(&instance_id, &channel);
        }
    }

    /// Routes one message to exactly one handler.
    fn dispatch(
        &self,
        message: ContractMessage,
        channel: &InstanceChannel,
        registered: &mut Option<String>,
    ) {
        let message_type = message.message_type();
        let instance_id = self.resolve_instance(&message);
        debug!(
            %message_type,
            tx_id = %message.tx_id,
            instance_id = %instance_id,
            "inbound message",
        );
        match message_type {
            MessageType::Register => {
                if let Some(instance_id) = handshake::handle_register(
                    &message,
                    channel,
                    &self.registry,
                    &self.lifecycle,
                    self.policy.as_ref(),
                ) {
                    *registered = Some(instance_id);
                }
            },
            MessageType::Completed => {
                self.handle_terminal(
                    message,
                    &instance_id,
                    TxStatus::Completed,
                    InstanceStatus::Ready,
                );
            },
            MessageType::Error => {
                self.handle_terminal(
                    message,
                    &instance_id,
                    TxStatus::Failed,
                    InstanceStatus::Error,
                );
            },
            MessageType::Keepalive => {
                // Echoed back unchanged on the same stream.
                channel.try_send(message);
            },
            MessageType::GetState => {
                channel.try_send(self.bridge.handle_get_state(&message, &instance_id));
            },
            MessageType::PutState => {
                channel.try_send(self.bridge.handle_put_state(&message, &instance_id));
            },
            MessageType::DelState => {
                channel.try_send(self.bridge.handle_del_state(&message, &instance_id));
            },
            MessageType::GetStateByRange => {
                channel.try_send(self.bridge.handle_range_scan(&message, &instance_id));
            },
            MessageType::GetHistoryForKey => {
                channel.try_send(self.bridge.handle_history(&message, &instance_id));
            },
            MessageType::Unspecified
            | MessageType::Registered
            | MessageType::Init
            | MessageType::Ready
            | MessageType::Transaction
            | MessageType::Response => {
                warn!(
                    %message_type,
                    tx_id = %message.tx_id,
                    "unexpected message type from contract, dropping",
                );
            },
        }
    }

    /// COMPLETED and ERROR: record advisory status, then wake the waiting
    /// invocation through the correlation table.
    ///
    /// Status is recorded only while the transaction is still bound to this
    /// instance. Unsolicited terminals, and late ones arriving after the
    /// caller released the transaction, are delivered-and-dropped without
    /// leaving lifecycle entries behind.
    fn handle_terminal(
        &self,
        message: ContractMessage,
        instance_id: &str,
        tx_status: TxStatus,
        instance_status: InstanceStatus,
    ) {
        let key = CorrelationKey::new(message.tx_id.clone(), instance_id);
        let bound = self
            .lifecycle
            .instance_for_tx(&message.tx_id)
            .is_some_and(|owner| owner == instance_id);
        if bound {
            self.lifecycle.set_instance_status(instance_id, instance_status);
            self.lifecycle.set_tx_status(&key, tx_status);
        }
        self.correlation.deliver(&key, message);
    }

    /// The instance an inbound message belongs to: the identity riding in
    /// the event field when the message names one, else the transaction
    /// binding established at invocation start.
    fn resolve_instance(&self, message: &ContractMessage) -> String {
        message
            .event
            .as_ref()
            .map(|event| event.contract_id.clone())
            .filter(|contract_id| !contract_id.is_empty())
            .or_else(|| self.lifecycle.instance_for_tx(&message.tx_id))
            .unwrap_or_default()
    }

    /// Inbound side closed: the instance is gone until it reconnects.
    ///
    /// Cleanup only applies while this stream still owns the registration.
    /// A stale stream dying after its instance reconnected leaves the fresh
    /// registration, its status, and its pending invocations alone.
    fn stream_closed(&self, instance_id: &str, channel: &InstanceChannel) {
        if !self.registry.unregister_if_current(instance_id, channel) {
            debug!(instance_id = %instance_id, "stale stream closed after replacement");
            return;
        }
        info!(instance_id = %instance_id, "contract stream closed");
        self.lifecycle.set_instance_status(instance_id, InstanceStatus::Error);
        let cancelled = self.correlation.cancel_instance(instance_id);
        if cancelled > 0 {
            warn!(
                instance_id = %instance_id,
                cancelled,
                "cancelled pending invocations for closed stream",
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use chaincall_protocol::payload::ContractId;
    use chaincall_protocol::proposal::ContractEvent;
    use prost::Message;
    use tokio::sync::mpsc::error::TryRecvError;

    use crate::handshake::StaticSystemPolicy;
    use crate::ledger::MemoryLedger;
    use super::*;

    struct Harness {
        dispatcher: Dispatcher,
        channel: InstanceChannel,
        outbound: mpsc::UnboundedReceiver<ContractMessage>,
        correlation: Arc<CorrelationTable>,
        lifecycle: Arc<LifecycleTracker>,
    }

    impl Harness {
        fn new() -> Self {
            let registry = Arc::new(InstanceRegistry::new());
            let lifecycle = Arc::new(LifecycleTracker::new());
            let correlation = Arc::new(CorrelationTable::new());
            let ledger = MemoryLedger::new().with_group("group-a");
            let dispatcher = Dispatcher::new(
                Arc::clone(&registry),
                Arc::clone(&lifecycle),
                Arc::clone(&correlation),
                StateBridge::new(Arc::new(ledger)),
                Arc::new(StaticSystemPolicy::empty()),
            );
            let (tx, rx) = mpsc::unbounded_channel();
            Self {
                dispatcher,
                channel: Arc::new(tx),
                outbound: rx,
                correlation,
                lifecycle,
            }
        }

        fn dispatch(&mut self, message: ContractMessage, registered: &mut Option<String>) {
            self.dispatcher.dispatch(message, &self.channel, registered);
        }
    }

    fn registered_contract(harness: &mut Harness) -> Option<String> {
        let contract_id = ContractId {
            name: "mycc".to_owned(),
            version: "1.0".to_owned(),
        };
        let register = ContractMessage::of_type(MessageType::Register)
            .with_payload(contract_id.encode_to_vec());
        let mut registered = None;
        harness.dispatch(register, &mut registered);
        // Drain the handshake replies.
        while harness.outbound.try_recv().is_ok() {}
        registered
    }

    #[test]
    fn keepalive_is_echoed_unchanged() {
        let mut harness = Harness::new();
        let ping = ContractMessage::of_type(MessageType::Keepalive)
            .with_payload(Bytes::from_static(b"ping"));

        harness.dispatch(ping.clone(), &mut None);
        let echoed = harness.outbound.try_recv().expect("echo queued");
        assert_eq!(echoed, ping);
    }

    #[test]
    fn peer_only_message_types_are_dropped() {
        let mut harness = Harness::new();
        for message_type in [
            MessageType::Unspecified,
            MessageType::Registered,
            MessageType::Init,
            MessageType::Ready,
            MessageType::Transaction,
            MessageType::Response,
        ] {
            harness.dispatch(ContractMessage::of_type(message_type), &mut None);
        }
        assert_eq!(harness.outbound.try_recv().unwrap_err(), TryRecvError::Empty);
    }

    #[tokio::test]
    async fn terminal_reaches_the_registered_waiter() {
        let mut harness = Harness::new();
        harness.lifecycle.bind_transaction("tx-1", "mycc");
        let pending = harness
            .correlation
            .register(CorrelationKey::new("tx-1", "mycc"))
            .expect("registers");

        let terminal = ContractMessage::of_type(MessageType::Completed).with_tx("tx-1", "group-a");
        harness.dispatch(terminal, &mut None);

        let message = pending
            .wait(std::time::Duration::from_secs(1))
            .await
            .expect("terminal delivered");
        assert_eq!(message.message_type(), MessageType::Completed);
        assert_eq!(
            harness.lifecycle.instance_status("mycc"),
            Some(InstanceStatus::Ready)
        );
    }

    #[test]
    fn unsolicited_terminal_leaves_no_advisory_state() {
        let mut harness = Harness::new();
        registered_contract(&mut harness);

        // No invocation ever bound tx-9.
        let stray = ContractMessage::of_type(MessageType::Completed)
            .with_tx("tx-9", "group-a")
            .with_event(ContractEvent {
                contract_id: "mycc".to_owned(),
                ..ContractEvent::default()
            });
        harness.dispatch(stray, &mut None);

        assert_eq!(
            harness.lifecycle.tx_status(&CorrelationKey::new("tx-9", "mycc")),
            None
        );
        // Still the handshake status, untouched by the stray terminal.
        assert_eq!(
            harness.lifecycle.instance_status("mycc"),
            Some(InstanceStatus::InitSent)
        );
    }

    #[test]
    fn late_terminal_after_release_is_not_recorded() {
        let mut harness = Harness::new();
        harness.lifecycle.bind_transaction("tx-1", "mycc");
        harness
            .lifecycle
            .release_transaction(&CorrelationKey::new("tx-1", "mycc"));

        let late = ContractMessage::of_type(MessageType::Completed).with_tx("tx-1", "group-a");
        harness.dispatch(late, &mut None);

        assert_eq!(harness.lifecycle.tx_status(&CorrelationKey::new("tx-1", "")), None);
        assert_eq!(
            harness.lifecycle.tx_status(&CorrelationKey::new("tx-1", "mycc")),
            None
        );
    }

    #[test]
    fn state_operation_resolves_instance_from_the_event_stub() {
        let mut harness = Harness::new();
        let mut registered = None;

        // No transaction binding: the event field names the instance.
        let get = ContractMessage::of_type(MessageType::GetState)
            .with_tx("tx-q", "group-a")
            .with_payload(Bytes::from_static(b"k"))
            .with_event(ContractEvent {
                contract_id: "mycc".to_owned(),
                ..ContractEvent::default()
            });
        harness.dispatch(get, &mut registered);

        let reply = harness.outbound.try_recv().expect("reply queued");
        assert_eq!(reply.message_type(), MessageType::Response);
        assert_eq!(reply.tx_id, "tx-q");
    }

    #[test]
    fn register_records_the_stream_owner() {
        let mut harness = Harness::new();
        let registered = registered_contract(&mut harness);
        assert_eq!(registered.as_deref(), Some("mycc"));
    }

    #[test]
    fn stream_closure_cleans_up_the_instance() {
        let mut harness = Harness::new();
        registered_contract(&mut harness);
        let _pending = harness
            .correlation
            .register(CorrelationKey::new("tx-1", "mycc"))
            .expect("registers");

        let channel = Arc::clone(&harness.channel);
        harness.dispatcher.stream_closed("mycc", &channel);

        assert!(harness.dispatcher.registry.is_empty());
        assert_eq!(harness.correlation.pending(), 0);
        assert_eq!(
            harness.lifecycle.instance_status("mycc"),
            Some(InstanceStatus::Error)
        );
    }

    #[test]
    fn stale_stream_closure_spares_a_reconnected_instance() {
        let mut harness = Harness::new();
        registered_contract(&mut harness);
        let stale = Arc::clone(&harness.channel);

        // The instance reconnects on a new stream before the old one dies.
        let (fresh_tx, _fresh_rx) = mpsc::unbounded_channel::<ContractMessage>();
        harness.dispatcher.registry.register("mycc", Arc::new(fresh_tx));
        let _pending = harness
            .correlation
            .register(CorrelationKey::new("tx-1", "mycc"))
            .expect("registers");

        harness.dispatcher.stream_closed("mycc", &stale);

        assert!(harness.dispatcher.registry.lookup("mycc").is_some());
        assert_eq!(harness.correlation.pending(), 1);
    }
}
