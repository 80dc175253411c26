//! Registration handshake for newly connected contract streams.
//!
//! A runtime's first message must be REGISTER with its [`ContractId`]. The
//! handshake stores the stream's outbound channel in the registry, confirms
//! with REGISTERED and READY, and bootstraps reserved system contracts with
//! an INIT carrying a synthesized proposal. User contracts are initialized
//! later through an explicit `init` call, so their INIT is not sent here.

use std::collections::HashSet;
use std::sync::Arc;

use chaincall_protocol::payload::ContractId;
use chaincall_protocol::proposal::{bootstrap_proposal, ContractEvent};
use chaincall_protocol::{ContractMessage, MessageType};
use prost::Message;
use tracing::{info, warn};

use crate::lifecycle::{InstanceStatus, LifecycleTracker};
use crate::registry::{InstanceChannel, InstanceRegistry};

/// Marks the reserved system contracts that bootstrap at registration.
pub trait SystemContractPolicy: Send + Sync {
    fn is_system_contract(&self, instance_id: &str) -> bool;
}

/// Set-backed [`SystemContractPolicy`].
#[derive(Debug, Default, Clone)]
pub struct StaticSystemPolicy {
    names: HashSet<String>,
}

impl StaticSystemPolicy {
    #[must_use]
    pub fn new(names: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            names: names.into_iter().map(Into::into).collect(),
        }
    }

    /// Policy under which no contract is a system contract.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }
}

impl SystemContractPolicy for StaticSystemPolicy {
    fn is_system_contract(&self, instance_id: &str) -> bool {
        self.names.contains(instance_id)
    }
}

/// Runs the handshake for an inbound REGISTER message.
///
/// Returns the registered instance id so the receive loop can clean up when
/// the stream later closes, or `None` when the handshake aborted.
pub(crate) fn handle_register(
    message: &ContractMessage,
    channel: &InstanceChannel,
    registry: &InstanceRegistry,
    lifecycle: &LifecycleTracker,
    policy: &dyn SystemContractPolicy,
) -> Option<String> {
    let contract_id = match ContractId::decode(message.payload.clone()) {
        Ok(contract_id) => contract_id,
        Err(error) => {
            warn!(%error, "malformed REGISTER payload, aborting handshake");
            channel.try_send(ContractMessage::of_type(MessageType::Error));
            return None;
        },
    };
    if contract_id.name.is_empty() {
        warn!("REGISTER carried an empty contract name, ignoring");
        return None;
    }
    let instance_id = contract_id.name;

    registry.register(instance_id.clone(), Arc::clone(channel));
    lifecycle.set_instance_status(&instance_id, InstanceStatus::New);

    channel.try_send(ContractMessage::of_type(MessageType::Registered));
    channel.try_send(ContractMessage::of_type(MessageType::Ready));

    if policy.is_system_contract(&instance_id) {
        info!(instance_id = %instance_id, "bootstrapping system contract");
        channel.try_send(bootstrap_init(&instance_id));
    }

    lifecycle.set_instance_status(&instance_id, InstanceStatus::InitSent);
    info!(
        instance_id = %instance_id,
        version = %contract_id.version,
        "contract registered",
    );
    Some(instance_id)
}

/// INIT sent to a system contract straight after its handshake. Carries the
/// synthesized proposal and an event stub naming the instance, since no
/// transaction binding exists yet.
fn bootstrap_init(instance_id: &str) -> ContractMessage {
    ContractMessage {
        proposal: Some(bootstrap_proposal()),
        ..ContractMessage::of_type(MessageType::Init)
    }
    .with_event(ContractEvent {
        contract_id: instance_id.to_owned(),
        ..ContractEvent::default()
    })
}
