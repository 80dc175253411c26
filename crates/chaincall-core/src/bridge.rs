//! State bridge: executes contract-issued state operations on the ledger.
//!
//! Each handler decodes its operation payload, runs it through a
//! transaction-scoped simulator, and produces exactly one reply envelope:
//! RESPONSE on success, ERROR carrying the failure text otherwise. Failures
//! never escape a handler, so a misbehaving contract or a broken ledger
//! cannot take down the stream's receive loop.
//!
//! Handlers are synchronous and run inline on the dispatcher task. Only the
//! issuing contract's stream waits on a slow ledger; other streams keep
//! dispatching.

use std::sync::Arc;

use bytes::Bytes;
use chaincall_protocol::payload::{
    DelState, GetHistoryForKey, GetStateByRange, KeyModification, KeyValue, PutState,
    QueryResponse,
};
use chaincall_protocol::ContractMessage;
use prost::Message;
use thiserror::Error;
use tracing::{debug, warn};

use crate::ledger::{LedgerError, LedgerProvider};

/// Internal per-operation failure, rendered into an ERROR reply payload.
#[derive(Debug, Error)]
enum BridgeError {
    #[error("malformed payload: {0}")]
    Decode(#[from] prost::DecodeError),
    #[error("key is not valid UTF-8")]
    KeyEncoding(#[from] std::str::Utf8Error),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

/// Translates state-operation messages into ledger simulator calls.
pub(crate) struct StateBridge {
    ledger: Arc<dyn LedgerProvider>,
}

impl StateBridge {
    pub(crate) fn new(ledger: Arc<dyn LedgerProvider>) -> Self {
        Self { ledger }
    }

    /// GET_STATE: the payload is the raw UTF-8 key.
    pub(crate) fn handle_get_state(
        &self,
        message: &ContractMessage,
        instance_id: &str,
    ) -> ContractMessage {
        self.reply(message, self.get_state(message, instance_id))
    }

    /// PUT_STATE: the payload is a [`PutState`].
    pub(crate) fn handle_put_state(
        &self,
        message: &ContractMessage,
        instance_id: &str,
    ) -> ContractMessage {
        self.reply(message, self.put_state(message, instance_id))
    }

    /// DEL_STATE: the payload is a [`DelState`].
    pub(crate) fn handle_del_state(
        &self,
        message: &ContractMessage,
        instance_id: &str,
    ) -> ContractMessage {
        self.reply(message, self.del_state(message, instance_id))
    }

    /// GET_STATE_BY_RANGE: the payload is a [`GetStateByRange`].
    pub(crate) fn handle_range_scan(
        &self,
        message: &ContractMessage,
        instance_id: &str,
    ) -> ContractMessage {
        self.reply(message, self.range_scan(message, instance_id))
    }

    /// GET_HISTORY_FOR_KEY: the payload is a [`GetHistoryForKey`].
    pub(crate) fn handle_history(
        &self,
        message: &ContractMessage,
        instance_id: &str,
    ) -> ContractMessage {
        self.reply(message, self.history(message, instance_id))
    }

    fn get_state(
        &self,
        message: &ContractMessage,
        instance_id: &str,
    ) -> Result<Bytes, BridgeError> {
        let key = std::str::from_utf8(&message.payload)?;
        let mut simulator = self.ledger.tx_simulator(&message.group_id, &message.tx_id)?;
        // A missing key replies with an empty payload; absence is not an
        // error at the protocol level.
        let value = simulator.get_state(instance_id, key)?.unwrap_or_default();
        debug!(
            tx_id = %message.tx_id,
            instance_id = %instance_id,
            key = %key,
            bytes = value.len(),
            "get_state",
        );
        Ok(Bytes::from(value))
    }

    fn put_state(
        &self,
        message: &ContractMessage,
        instance_id: &str,
    ) -> Result<Bytes, BridgeError> {
        let put = PutState::decode(message.payload.clone())?;
        let mut simulator = self.ledger.tx_simulator(&message.group_id, &message.tx_id)?;
        simulator.set_state(instance_id, &put.key, put.value.to_vec())?;
        Ok(Bytes::new())
    }

    fn del_state(
        &self,
        message: &ContractMessage,
        instance_id: &str,
    ) -> Result<Bytes, BridgeError> {
        let del = DelState::decode(message.payload.clone())?;
        let mut simulator = self.ledger.tx_simulator(&message.group_id, &message.tx_id)?;
        simulator.delete_state(instance_id, &del.key)?;
        Ok(Bytes::new())
    }

    fn range_scan(
        &self,
        message: &ContractMessage,
        instance_id: &str,
    ) -> Result<Bytes, BridgeError> {
        let range = GetStateByRange::decode(message.payload.clone())?;
        let mut simulator = self.ledger.tx_simulator(&message.group_id, &message.tx_id)?;
        let stream = simulator.range_scan(instance_id, &range.start_key, &range.end_key)?;

        let mut response = QueryResponse::default();
        for entry in stream {
            let entry = entry?;
            // The simulator may run through its advisory upper bound; the
            // scan is exclusive of end_key, so enforce it here. An empty
            // end_key leaves the interval empty.
            if entry.key >= range.end_key {
                break;
            }
            response.push(&KeyValue {
                namespace: entry.namespace,
                key: entry.key,
                value: entry.value.into(),
            });
        }
        debug!(
            tx_id = %message.tx_id,
            instance_id = %instance_id,
            start_key = %range.start_key,
            end_key = %range.end_key,
            records = response.len(),
            "range_scan",
        );
        Ok(response.encode_to_vec().into())
    }

    fn history(
        &self,
        message: &ContractMessage,
        instance_id: &str,
    ) -> Result<Bytes, BridgeError> {
        let query = GetHistoryForKey::decode(message.payload.clone())?;
        let mut executor = self.ledger.history_executor(&message.group_id)?;
        let stream = executor.history_for_key(instance_id, &query.key)?;

        let mut response = QueryResponse::default();
        for entry in stream {
            let entry = entry?;
            response.push(&KeyModification {
                tx_id: entry.tx_id,
                value: entry.value.into(),
                block_number: entry.block_number,
                tx_number: entry.tx_number,
                is_delete: entry.is_delete,
            });
        }
        Ok(response.encode_to_vec().into())
    }

    /// Exactly one reply per request: RESPONSE with the result payload, or
    /// ERROR with the failure text.
    fn reply(
        &self,
        request: &ContractMessage,
        result: Result<Bytes, BridgeError>,
    ) -> ContractMessage {
        match result {
            Ok(payload) => ContractMessage::response_to(request, payload),
            Err(error) => {
                warn!(
                    tx_id = %request.tx_id,
                    group_id = %request.group_id,
                    operation = %request.message_type(),
                    %error,
                    "state operation failed",
                );
                ContractMessage::error_to(request, Bytes::from(error.to_string()))
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use chaincall_protocol::MessageType;
    use proptest::prelude::*;

    use crate::ledger::MemoryLedger;
    use super::*;

    fn bridge_over(ledger: &MemoryLedger) -> StateBridge {
        StateBridge::new(Arc::new(ledger.clone()))
    }

    fn seeded(keys: &[&str]) -> MemoryLedger {
        let ledger = MemoryLedger::new().with_group("group-a");
        let mut simulator = ledger.tx_simulator("group-a", "seed").expect("group exists");
        for key in keys {
            simulator
                .set_state("mycc", key, key.as_bytes().to_vec())
                .expect("write succeeds");
        }
        ledger
    }

    fn request(message_type: MessageType, payload: impl Into<Bytes>) -> ContractMessage {
        ContractMessage::of_type(message_type)
            .with_tx("tx-1", "group-a")
            .with_payload(payload)
    }

    fn scan_reply_keys(reply: &ContractMessage) -> Vec<String> {
        let response = QueryResponse::decode(reply.payload.clone()).expect("reply decodes");
        response
            .results
            .iter()
            .map(|record| {
                KeyValue::decode(record.result_bytes.clone())
                    .expect("record decodes")
                    .key
            })
            .collect()
    }

    #[test]
    fn get_state_missing_key_replies_empty_response() {
        let ledger = MemoryLedger::new().with_group("group-a");
        let bridge = bridge_over(&ledger);

        let reply = bridge.handle_get_state(&request(MessageType::GetState, &b"nope"[..]), "mycc");
        assert_eq!(reply.message_type(), MessageType::Response);
        assert_eq!(reply.tx_id, "tx-1");
        assert!(reply.payload.is_empty());
    }

    #[test]
    fn put_then_get_roundtrips_through_the_ledger() {
        let ledger = MemoryLedger::new().with_group("group-a");
        let bridge = bridge_over(&ledger);

        let put = PutState {
            key: "k".to_owned(),
            value: Bytes::from_static(b"v"),
        };
        let reply =
            bridge.handle_put_state(&request(MessageType::PutState, put.encode_to_vec()), "mycc");
        assert_eq!(reply.message_type(), MessageType::Response);
        assert_eq!(ledger.get("group-a", "mycc", "k"), Some(b"v".to_vec()));

        let reply = bridge.handle_get_state(&request(MessageType::GetState, &b"k"[..]), "mycc");
        assert_eq!(reply.payload, Bytes::from_static(b"v"));
    }

    #[test]
    fn del_state_removes_the_key() {
        let ledger = seeded(&["k"]);
        let bridge = bridge_over(&ledger);

        let del = DelState { key: "k".to_owned() };
        let reply =
            bridge.handle_del_state(&request(MessageType::DelState, del.encode_to_vec()), "mycc");
        assert_eq!(reply.message_type(), MessageType::Response);
        assert_eq!(ledger.get("group-a", "mycc", "k"), None);
    }

    #[test]
    fn range_scan_is_exclusive_of_end_key() {
        let ledger = seeded(&["a", "b", "c", "d"]);
        let bridge = bridge_over(&ledger);

        let range = GetStateByRange {
            start_key: "a".to_owned(),
            end_key: "c".to_owned(),
        };
        let reply = bridge.handle_range_scan(
            &request(MessageType::GetStateByRange, range.encode_to_vec()),
            "mycc",
        );
        assert_eq!(reply.message_type(), MessageType::Response);
        assert_eq!(scan_reply_keys(&reply), ["a", "b"]);
    }

    #[test]
    fn range_scan_with_empty_end_key_replies_no_records() {
        let ledger = seeded(&["a", "b"]);
        let bridge = bridge_over(&ledger);

        let range = GetStateByRange {
            start_key: "a".to_owned(),
            end_key: String::new(),
        };
        let reply = bridge.handle_range_scan(
            &request(MessageType::GetStateByRange, range.encode_to_vec()),
            "mycc",
        );
        assert_eq!(reply.message_type(), MessageType::Response);
        assert!(scan_reply_keys(&reply).is_empty());
    }

    #[test]
    fn history_records_decode_newest_first() {
        let ledger = MemoryLedger::new().with_group("group-a");
        {
            let mut simulator = ledger.tx_simulator("group-a", "tx-old").expect("group exists");
            simulator.set_state("mycc", "k", b"v1".to_vec()).expect("writes");
        }
        {
            let mut simulator = ledger.tx_simulator("group-a", "tx-new").expect("group exists");
            simulator.set_state("mycc", "k", b"v2".to_vec()).expect("writes");
        }
        let bridge = bridge_over(&ledger);

        let query = GetHistoryForKey { key: "k".to_owned() };
        let reply = bridge.handle_history(
            &request(MessageType::GetHistoryForKey, query.encode_to_vec()),
            "mycc",
        );
        assert_eq!(reply.message_type(), MessageType::Response);

        let response = QueryResponse::decode(reply.payload.clone()).expect("reply decodes");
        let tx_ids: Vec<String> = response
            .results
            .iter()
            .map(|record| {
                KeyModification::decode(record.result_bytes.clone())
                    .expect("record decodes")
                    .tx_id
            })
            .collect();
        assert_eq!(tx_ids, ["tx-new", "tx-old"]);
    }

    #[test]
    fn unknown_group_replies_error_with_the_request_scope() {
        let ledger = MemoryLedger::new();
        let bridge = bridge_over(&ledger);

        let reply = bridge.handle_get_state(&request(MessageType::GetState, &b"k"[..]), "mycc");
        assert_eq!(reply.message_type(), MessageType::Error);
        assert_eq!(reply.tx_id, "tx-1");
        assert_eq!(reply.group_id, "group-a");
        assert!(!reply.payload.is_empty());
    }

    #[test]
    fn malformed_operation_payload_replies_error() {
        let ledger = MemoryLedger::new().with_group("group-a");
        let bridge = bridge_over(&ledger);

        let reply = bridge.handle_put_state(
            &request(MessageType::PutState, Bytes::from_static(&[0x0a, 0xff])),
            "mycc",
        );
        assert_eq!(reply.message_type(), MessageType::Error);
    }

    #[test]
    fn non_utf8_get_state_key_replies_error() {
        let ledger = MemoryLedger::new().with_group("group-a");
        let bridge = bridge_over(&ledger);

        let reply = bridge.handle_get_state(
            &request(MessageType::GetState, Bytes::from_static(&[0xff, 0xfe])),
            "mycc",
        );
        assert_eq!(reply.message_type(), MessageType::Error);
    }

    proptest! {
        // Whatever interval a contract asks for, the reply holds exactly the
        // live keys in [start_key, end_key), in order.
        #[test]
        fn range_scan_matches_the_half_open_interval(
            keys in prop::collection::btree_set("[a-f]{1,2}", 0..10),
            start_key in "[a-f]{1,2}",
            end_key in "[a-f]{1,2}",
        ) {
            let owned: Vec<&str> = keys.iter().map(String::as_str).collect();
            let ledger = seeded(&owned);
            let bridge = bridge_over(&ledger);

            let range = GetStateByRange {
                start_key: start_key.clone(),
                end_key: end_key.clone(),
            };
            let reply = bridge.handle_range_scan(
                &request(MessageType::GetStateByRange, range.encode_to_vec()),
                "mycc",
            );

            let expected: Vec<String> = keys
                .iter()
                .filter(|key| **key >= start_key && **key < end_key)
                .cloned()
                .collect();
            prop_assert_eq!(scan_reply_keys(&reply), expected);
        }
    }
}
