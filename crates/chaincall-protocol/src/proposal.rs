//! Minimal proposal envelope synthesized for system-contract bootstrap.
//!
//! When the peer sends the bootstrap INIT it attaches a [`SignedProposal`]
//! so the runtime sees the same envelope shape a real endorsement request
//! carries. The nesting mirrors the ledger's proposal structure, with each
//! layer serialized into the parent's bytes field:
//!
//! ```text
//! SignedProposal.proposal_bytes
//!   -> Proposal.header
//!        -> Header.group_header
//!             -> GroupHeader { header_type }
//! ```
//!
//! Only the fields the bootstrap path reads are modeled; everything else the
//! full ledger proposal carries is out of scope here.

use bytes::Bytes;
use prost::Message;

/// Header type tag marking an endorser transaction.
pub const HEADER_TYPE_ENDORSER_TRANSACTION: i32 = 3;

/// Innermost header layer: the transaction class.
#[derive(Clone, PartialEq, prost::Message)]
pub struct GroupHeader {
    #[prost(int32, tag = "1")]
    pub header_type: i32,
}

/// Header wrapper holding the encoded [`GroupHeader`].
#[derive(Clone, PartialEq, prost::Message)]
pub struct Header {
    #[prost(bytes = "bytes", tag = "1")]
    pub group_header: Bytes,
}

/// Proposal wrapper holding the encoded [`Header`].
#[derive(Clone, PartialEq, prost::Message)]
pub struct Proposal {
    #[prost(bytes = "bytes", tag = "1")]
    pub header: Bytes,
}

/// Outermost envelope: the encoded [`Proposal`] plus a signature.
#[derive(Clone, PartialEq, prost::Message)]
pub struct SignedProposal {
    #[prost(bytes = "bytes", tag = "1")]
    pub proposal_bytes: Bytes,
    /// Empty on synthesized bootstrap proposals.
    #[prost(bytes = "bytes", tag = "2")]
    pub signature: Bytes,
}

/// Event a contract emits, or the identity stub attached to messages that
/// carry no transaction binding.
#[derive(Clone, PartialEq, prost::Message)]
pub struct ContractEvent {
    #[prost(string, tag = "1")]
    pub contract_id: String,
    #[prost(string, tag = "2")]
    pub tx_id: String,
    #[prost(string, tag = "3")]
    pub event_name: String,
    #[prost(bytes = "bytes", tag = "4")]
    pub payload: Bytes,
}

/// Builds the signed-proposal envelope attached to a bootstrap INIT.
///
/// The proposal marks an endorser transaction and carries no signature;
/// runtimes treat bootstrap INITs as pre-authorized.
#[must_use]
pub fn bootstrap_proposal() -> SignedProposal {
    let group_header = GroupHeader {
        header_type: HEADER_TYPE_ENDORSER_TRANSACTION,
    };
    let header = Header {
        group_header: group_header.encode_to_vec().into(),
    };
    let proposal = Proposal {
        header: header.encode_to_vec().into(),
    };
    SignedProposal {
        proposal_bytes: proposal.encode_to_vec().into(),
        signature: Bytes::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bootstrap_proposal_unwraps_layer_by_layer() {
        let signed = bootstrap_proposal();
        assert!(signed.signature.is_empty());

        let proposal = Proposal::decode(signed.proposal_bytes).expect("proposal decodes");
        let header = Header::decode(proposal.header).expect("header decodes");
        let group_header = GroupHeader::decode(header.group_header).expect("group header decodes");
        assert_eq!(group_header.header_type, HEADER_TYPE_ENDORSER_TRANSACTION);
    }
}
