//! Fuzz the protocol decode paths: arbitrary bytes must never panic the
//! envelope or payload decoders, and whatever decodes must re-encode.

#![no_main]

use chaincall_protocol::payload::{ContractId, GetStateByRange, PutState, QueryResponse};
use chaincall_protocol::ContractMessage;
use libfuzzer_sys::fuzz_target;
use prost::Message;

fuzz_target!(|data: &[u8]| {
    if let Ok(message) = ContractMessage::decode(data) {
        // Decoded envelopes must survive the accessor and re-encode.
        let _ = message.message_type();
        let _ = message.encode_to_vec();
    }
    let _ = ContractId::decode(data);
    let _ = PutState::decode(data);
    let _ = GetStateByRange::decode(data);
    let _ = QueryResponse::decode(data);
});
