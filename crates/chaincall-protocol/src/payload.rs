//! Operation payloads carried in [`ContractMessage::payload`].
//!
//! One message per state operation, plus the identity message announced at
//! registration and the generic query result containers. GET_STATE carries
//! no message here: its payload is the raw UTF-8 key bytes.
//!
//! [`ContractMessage::payload`]: crate::message::ContractMessage

use bytes::Bytes;
use prost::Message;

/// Identity a contract runtime announces when it registers.
#[derive(Clone, PartialEq, prost::Message)]
pub struct ContractId {
    /// Instance name the registry keys on.
    #[prost(string, tag = "1")]
    pub name: String,
    /// Advisory version string.
    #[prost(string, tag = "2")]
    pub version: String,
}

/// PUT_STATE payload: write `value` under `key`.
#[derive(Clone, PartialEq, prost::Message)]
pub struct PutState {
    #[prost(string, tag = "1")]
    pub key: String,
    #[prost(bytes = "bytes", tag = "2")]
    pub value: Bytes,
}

/// DEL_STATE payload: remove `key`.
#[derive(Clone, PartialEq, prost::Message)]
pub struct DelState {
    #[prost(string, tag = "1")]
    pub key: String,
}

/// GET_STATE_BY_RANGE payload: scan `[start_key, end_key)` in key order.
///
/// An empty `end_key` leaves the interval empty: the scan reply carries no
/// records. Callers wanting an open-ended scan must pass an explicit upper
/// bound.
#[derive(Clone, PartialEq, prost::Message)]
pub struct GetStateByRange {
    #[prost(string, tag = "1")]
    pub start_key: String,
    #[prost(string, tag = "2")]
    pub end_key: String,
}

/// GET_HISTORY_FOR_KEY payload: read the modification log of `key`.
#[derive(Clone, PartialEq, prost::Message)]
pub struct GetHistoryForKey {
    #[prost(string, tag = "1")]
    pub key: String,
}

/// One opaque record in a query reply.
#[derive(Clone, PartialEq, prost::Message)]
pub struct QueryResultBytes {
    /// Encoded [`KeyValue`] or [`KeyModification`], depending on the query.
    #[prost(bytes = "bytes", tag = "1")]
    pub result_bytes: Bytes,
}

/// Reply payload for range and history queries.
#[derive(Clone, PartialEq, prost::Message)]
pub struct QueryResponse {
    #[prost(message, repeated, tag = "1")]
    pub results: Vec<QueryResultBytes>,
}

impl QueryResponse {
    /// Appends one encoded record to the result set.
    pub fn push<R: Message>(&mut self, record: &R) {
        self.results.push(QueryResultBytes {
            result_bytes: record.encode_to_vec().into(),
        });
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.results.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}

/// Range scan record: one live key with its value.
#[derive(Clone, PartialEq, prost::Message)]
pub struct KeyValue {
    /// Contract namespace the key lives in.
    #[prost(string, tag = "1")]
    pub namespace: String,
    #[prost(string, tag = "2")]
    pub key: String,
    #[prost(bytes = "bytes", tag = "3")]
    pub value: Bytes,
}

/// History record: one past modification of a key.
#[derive(Clone, PartialEq, prost::Message)]
pub struct KeyModification {
    /// Transaction that wrote or deleted the key.
    #[prost(string, tag = "1")]
    pub tx_id: String,
    /// Value written; empty for deletions.
    #[prost(bytes = "bytes", tag = "2")]
    pub value: Bytes,
    #[prost(uint64, tag = "3")]
    pub block_number: u64,
    #[prost(uint64, tag = "4")]
    pub tx_number: u64,
    #[prost(bool, tag = "5")]
    pub is_delete: bool,
}
