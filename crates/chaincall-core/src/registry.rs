//! Instance registry: routes outbound messages to live contract streams.
//!
//! One entry per registered contract instance, mapping its id to the
//! outbound half of its stream. Registration happens during the handshake,
//! removal when the stream closes. Lookups never block on channel capacity:
//! sends are try-only, and a full or closed channel drops the message rather
//! than stalling a dispatcher or invocation caller.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chaincall_protocol::ContractMessage;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Result of a non-blocking send toward a contract stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// Message queued on the instance's outbound channel.
    Sent,
    /// No channel is registered for the instance; the message was dropped.
    NotRegistered,
    /// The channel exists but its stream has closed; the message was dropped.
    Closed,
}

impl SendOutcome {
    #[must_use]
    pub const fn is_sent(self) -> bool {
        matches!(self, Self::Sent)
    }
}

/// Outbound half of a contract stream.
///
/// Implementations must not block: a transport either queues the message
/// immediately or reports the channel gone.
pub trait MessageSink: Send + Sync {
    /// Attempts to queue `message` without blocking.
    fn try_send(&self, message: ContractMessage) -> SendOutcome;
}

/// Shared handle to an instance's outbound channel.
pub type InstanceChannel = Arc<dyn MessageSink>;

impl MessageSink for mpsc::UnboundedSender<ContractMessage> {
    fn try_send(&self, message: ContractMessage) -> SendOutcome {
        match self.send(message) {
            Ok(()) => SendOutcome::Sent,
            Err(_) => SendOutcome::Closed,
        }
    }
}

/// Maps contract-instance ids to their live outbound channels.
///
/// Shared by every dispatcher task and every invocation caller. All
/// operations take a short read or write lock; nothing holds the lock across
/// a send.
#[derive(Default)]
pub struct InstanceRegistry {
    channels: RwLock<HashMap<String, InstanceChannel>>,
}

impl InstanceRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores the outbound channel for `instance_id`.
    ///
    /// Last writer wins: a reconnecting instance replaces its stale channel
    /// and subsequent sends reach the new stream.
    pub fn register(&self, instance_id: impl Into<String>, channel: InstanceChannel) {
        let instance_id = instance_id.into();
        let replaced = {
            let mut channels = self.channels.write().expect("lock poisoned");
            channels.insert(instance_id.clone(), channel).is_some()
        };
        if replaced {
            info!(instance_id = %instance_id, "replaced stale contract channel");
        } else {
            debug!(instance_id = %instance_id, "registered contract channel");
        }
    }

    /// Removes the channel for `instance_id`, reporting whether one existed.
    pub fn unregister(&self, instance_id: &str) -> bool {
        let removed = {
            let mut channels = self.channels.write().expect("lock poisoned");
            channels.remove(instance_id).is_some()
        };
        if removed {
            debug!(instance_id = %instance_id, "unregistered contract channel");
        }
        removed
    }

    /// Removes the entry for `instance_id` only while it still routes to
    /// `channel`.
    ///
    /// Stream-closure cleanup goes through here so a stale stream dying
    /// after its instance reconnected cannot evict the fresh registration.
    pub fn unregister_if_current(&self, instance_id: &str, channel: &InstanceChannel) -> bool {
        let mut channels = self.channels.write().expect("lock poisoned");
        match channels.get(instance_id) {
            Some(current) if Arc::ptr_eq(current, channel) => {
                channels.remove(instance_id);
                debug!(instance_id = %instance_id, "unregistered contract channel");
                true
            },
            _ => false,
        }
    }

    /// Returns the channel registered for `instance_id`, if any.
    #[must_use]
    pub fn lookup(&self, instance_id: &str) -> Option<InstanceChannel> {
        self.channels
            .read()
            .expect("lock poisoned")
            .get(instance_id)
            .cloned()
    }

    /// Looks up `instance_id` and forwards `message` to its stream.
    ///
    /// A missing or closed target is logged and swallowed: notification
    /// paths are fire-and-forget and must never fail their caller.
    pub fn send(&self, instance_id: &str, message: ContractMessage) -> SendOutcome {
        let Some(channel) = self.lookup(instance_id) else {
            warn!(instance_id = %instance_id, "no channel for instance, dropping message");
            return SendOutcome::NotRegistered;
        };
        let outcome = channel.try_send(message);
        if outcome == SendOutcome::Closed {
            warn!(instance_id = %instance_id, "contract channel closed, dropping message");
        }
        outcome
    }

    /// Number of registered instances.
    #[must_use]
    pub fn len(&self) -> usize {
        self.channels.read().expect("lock poisoned").len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use chaincall_protocol::MessageType;

    use super::*;

    fn channel_pair() -> (InstanceChannel, mpsc::UnboundedReceiver<ContractMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(tx), rx)
    }

    #[test]
    fn send_reaches_registered_instance() {
        let registry = InstanceRegistry::new();
        let (channel, mut rx) = channel_pair();
        registry.register("mycc", channel);

        let outcome = registry.send("mycc", ContractMessage::of_type(MessageType::Ready));
        assert_eq!(outcome, SendOutcome::Sent);
        assert_eq!(
            rx.try_recv().expect("message queued").message_type(),
            MessageType::Ready
        );
    }

    #[test]
    fn send_to_unknown_instance_is_dropped() {
        let registry = InstanceRegistry::new();
        let outcome = registry.send("ghost", ContractMessage::of_type(MessageType::Ready));
        assert_eq!(outcome, SendOutcome::NotRegistered);
    }

    #[test]
    fn send_to_closed_channel_reports_closed() {
        let registry = InstanceRegistry::new();
        let (channel, rx) = channel_pair();
        registry.register("mycc", channel);
        drop(rx);

        let outcome = registry.send("mycc", ContractMessage::of_type(MessageType::Ready));
        assert_eq!(outcome, SendOutcome::Closed);
    }

    #[test]
    fn reregistration_replaces_the_channel() {
        let registry = InstanceRegistry::new();
        let (stale, mut stale_rx) = channel_pair();
        let (fresh, mut fresh_rx) = channel_pair();

        registry.register("mycc", stale);
        registry.register("mycc", fresh);
        assert_eq!(registry.len(), 1);

        registry.send("mycc", ContractMessage::of_type(MessageType::Ready));
        assert!(stale_rx.try_recv().is_err());
        assert!(fresh_rx.try_recv().is_ok());
    }

    #[test]
    fn unregister_removes_the_entry() {
        let registry = InstanceRegistry::new();
        let (channel, _rx) = channel_pair();
        registry.register("mycc", channel);

        assert!(registry.unregister("mycc"));
        assert!(!registry.unregister("mycc"));
        assert!(registry.is_empty());
    }

    #[test]
    fn conditional_unregister_spares_a_replacement() {
        let registry = InstanceRegistry::new();
        let (stale, _stale_rx) = channel_pair();
        let (fresh, _fresh_rx) = channel_pair();

        registry.register("mycc", Arc::clone(&stale));
        registry.register("mycc", Arc::clone(&fresh));

        // The stale stream's cleanup must not evict the reconnected one.
        assert!(!registry.unregister_if_current("mycc", &stale));
        assert!(registry.lookup("mycc").is_some());

        assert!(registry.unregister_if_current("mycc", &fresh));
        assert!(registry.is_empty());
    }
}
