//! Execution-coordination core for out-of-process smart contracts.
//!
//! A ledger peer launches contract code in separate runtimes and talks to
//! each over one bidirectional message stream. This crate is the peer-side
//! coordinator for those streams: it runs the registration handshake, routes
//! every inbound message to its handler, executes contract state operations
//! against a pluggable ledger, and turns the asynchronous streams into
//! synchronous `invoke` calls for the transaction pipeline above.
//!
//! Transport and consensus stay out of scope. The host brings its own wire
//! layer and pumps decoded [`ContractMessage`] envelopes through a
//! [`StreamHandle`]; it brings its own ledger behind [`ledger::LedgerProvider`].
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use chaincall_core::{ContractSupport, MemoryLedger, StaticSystemPolicy, SupportConfig};
//!
//! #[tokio::main]
//! async fn main() {
//!     let ledger = MemoryLedger::new().with_group("group-a");
//!     let support = ContractSupport::new(
//!         SupportConfig::default(),
//!         Arc::new(ledger),
//!         Arc::new(StaticSystemPolicy::new(["lssc"])),
//!     );
//!
//!     // One stream per connecting contract runtime; the transport pumps
//!     // envelopes through the handle.
//!     let stream = support.open_stream();
//!     # drop(stream);
//! }
//! ```
//!
//! [`ContractMessage`]: chaincall_protocol::ContractMessage

mod bridge;
pub mod config;
pub mod correlation;
mod dispatch;
pub mod gateway;
pub mod handshake;
pub mod ledger;
pub mod lifecycle;
pub mod registry;
pub mod service;

pub use config::{SupportConfig, DEFAULT_INVOKE_TIMEOUT};
pub use correlation::{
    AwaitError, CorrelationError, CorrelationKey, CorrelationTable, DeliverOutcome,
    PendingResponse,
};
pub use gateway::{InvocationGateway, InvokeError};
pub use handshake::{StaticSystemPolicy, SystemContractPolicy};
pub use ledger::MemoryLedger;
pub use lifecycle::{InstanceStatus, LifecycleTracker, TxStatus};
pub use registry::{InstanceChannel, InstanceRegistry, MessageSink, SendOutcome};
pub use service::{ContractSupport, StreamHandle};
