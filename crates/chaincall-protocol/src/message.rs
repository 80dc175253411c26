//! The protocol envelope exchanged with contract runtimes.

use std::fmt;

use bytes::Bytes;

use crate::proposal::{ContractEvent, SignedProposal};

/// Message type discriminants for the contract support protocol.
///
/// The set is closed by design: routing is an exhaustive `match` over this
/// enum, so adding a discriminant forces every dispatch site to pick a
/// handler at compile time. Values arriving off the wire that decode to no
/// known discriminant surface as [`MessageType::Unspecified`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum MessageType {
    /// Unset or unknown discriminant.
    Unspecified = 0,
    /// Contract runtime announces itself; payload is a [`ContractId`].
    ///
    /// [`ContractId`]: crate::payload::ContractId
    Register = 1,
    /// Peer acknowledges a registration.
    Registered = 2,
    /// Peer instructs the contract to run its initialization logic.
    Init = 3,
    /// Peer signals the contract may now accept transactions.
    Ready = 4,
    /// Peer submits a transaction for execution.
    Transaction = 5,
    /// Terminal: the contract finished an invocation successfully.
    Completed = 6,
    /// Terminal failure, or failure reply to a state operation.
    Error = 7,
    /// Contract reads a key; payload is the raw UTF-8 key bytes.
    GetState = 8,
    /// Contract writes a key; payload is a [`PutState`].
    ///
    /// [`PutState`]: crate::payload::PutState
    PutState = 9,
    /// Contract deletes a key; payload is a [`DelState`].
    ///
    /// [`DelState`]: crate::payload::DelState
    DelState = 10,
    /// Contract scans an ordered key interval; payload is a
    /// [`GetStateByRange`].
    ///
    /// [`GetStateByRange`]: crate::payload::GetStateByRange
    GetStateByRange = 11,
    /// Contract reads a key's modification history; payload is a
    /// [`GetHistoryForKey`].
    ///
    /// [`GetHistoryForKey`]: crate::payload::GetHistoryForKey
    GetHistoryForKey = 12,
    /// Successful reply to a contract-issued state operation.
    Response = 13,
    /// Liveness ping; echoed back unchanged by the receiver.
    Keepalive = 14,
}

impl MessageType {
    /// Wire-style name for logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Unspecified => "UNSPECIFIED",
            Self::Register => "REGISTER",
            Self::Registered => "REGISTERED",
            Self::Init => "INIT",
            Self::Ready => "READY",
            Self::Transaction => "TRANSACTION",
            Self::Completed => "COMPLETED",
            Self::Error => "ERROR",
            Self::GetState => "GET_STATE",
            Self::PutState => "PUT_STATE",
            Self::DelState => "DEL_STATE",
            Self::GetStateByRange => "GET_STATE_BY_RANGE",
            Self::GetHistoryForKey => "GET_HISTORY_FOR_KEY",
            Self::Response => "RESPONSE",
            Self::Keepalive => "KEEPALIVE",
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Envelope for every message crossing a contract stream, in either
/// direction.
///
/// `tx_id` and `group_id` scope the envelope to one transaction on one
/// ledger group; both are empty on connection-level traffic such as
/// registration and keepalives. The `payload` encoding depends on
/// [`MessageType`].
#[derive(Clone, PartialEq, prost::Message)]
pub struct ContractMessage {
    /// Discriminant; read through the `message_type()` getter.
    #[prost(enumeration = "MessageType", tag = "1")]
    pub message_type: i32,
    /// Transaction this envelope is scoped to, empty outside transactions.
    #[prost(string, tag = "2")]
    pub tx_id: String,
    /// Ledger group the transaction executes against.
    #[prost(string, tag = "3")]
    pub group_id: String,
    /// Operation-specific payload bytes.
    #[prost(bytes = "bytes", tag = "4")]
    pub payload: Bytes,
    /// Signed proposal envelope, attached only to the bootstrap INIT.
    #[prost(message, optional, tag = "5")]
    pub proposal: Option<SignedProposal>,
    /// Contract event. Doubles as the instance identity carrier on messages
    /// that have no transaction binding yet.
    #[prost(message, optional, tag = "6")]
    pub event: Option<ContractEvent>,
}

impl ContractMessage {
    /// An envelope carrying only a discriminant.
    #[must_use]
    pub fn of_type(message_type: MessageType) -> Self {
        Self {
            message_type: message_type as i32,
            ..Self::default()
        }
    }

    /// Sets the transaction scope.
    #[must_use]
    pub fn with_tx(mut self, tx_id: impl Into<String>, group_id: impl Into<String>) -> Self {
        self.tx_id = tx_id.into();
        self.group_id = group_id.into();
        self
    }

    /// Sets the payload bytes.
    #[must_use]
    pub fn with_payload(mut self, payload: impl Into<Bytes>) -> Self {
        self.payload = payload.into();
        self
    }

    /// Sets the event.
    #[must_use]
    pub fn with_event(mut self, event: ContractEvent) -> Self {
        self.event = Some(event);
        self
    }

    /// RESPONSE reply to `request`, preserving its transaction scope.
    #[must_use]
    pub fn response_to(request: &Self, payload: Bytes) -> Self {
        Self::of_type(MessageType::Response)
            .with_tx(request.tx_id.clone(), request.group_id.clone())
            .with_payload(payload)
    }

    /// ERROR reply to `request`, preserving its transaction scope.
    #[must_use]
    pub fn error_to(request: &Self, payload: Bytes) -> Self {
        Self::of_type(MessageType::Error)
            .with_tx(request.tx_id.clone(), request.group_id.clone())
            .with_payload(payload)
    }
}
