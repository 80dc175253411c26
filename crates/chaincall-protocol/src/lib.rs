//! Wire-value types for the contract support protocol.
//!
//! A peer talks to each out-of-process contract runtime over one
//! bidirectional stream of [`ContractMessage`] envelopes. This crate defines
//! the envelope, its closed [`MessageType`] discriminant set, the per-operation
//! payload messages, and the minimal proposal envelope the peer synthesizes
//! when it bootstraps a system contract.
//!
//! Everything here is a plain prost message: no transport, no routing, no
//! state. The coordination logic lives in `chaincall-core`.

pub mod message;
pub mod payload;
pub mod proposal;

pub use message::{ContractMessage, MessageType};
pub use payload::{
    ContractId, DelState, GetHistoryForKey, GetStateByRange, KeyModification, KeyValue, PutState,
    QueryResponse, QueryResultBytes,
};
pub use proposal::{ContractEvent, GroupHeader, Header, Proposal, SignedProposal};
