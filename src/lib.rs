//! # Pairwise
//!
//! Pairing and session protocol engine: end-to-end encrypted JSON-RPC
//! sessions between a proposer (typically a dapp) and a responder (typically
//! a wallet), negotiated over an untrusted publish/subscribe relay.
//!
//! ## Features
//!
//! - **Two-phase handshake** with topic migration: sequences settle onto a
//!   topic derived from the X25519 shared secret
//! - **Per-topic encryption** of every payload with ChaCha20-Poly1305
//! - **Permissioned sessions**: chains and methods are enforced on every
//!   inbound application call
//! - **Pluggable transport** (WebSocket relay, in-memory hub for tests)
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use pairwise::{AppMetadata, Client, ClientConfig, ConnectParams, ConnectOutcome, WsTransport};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let (transport, events) =
//!     WsTransport::connect("wss://relay.example.org", Some("api-key".into())).await?;
//! let metadata = AppMetadata {
//!     name: "Example".into(),
//!     description: "Example dapp".into(),
//!     url: "https://example.org".into(),
//!     icons: vec![],
//! };
//! let client = Client::new(
//!     ClientConfig::new(metadata, true),
//!     Arc::new(transport),
//!     events,
//! );
//!
//! // Propose a pairing and show the URI to the wallet
//! if let ConnectOutcome::Pairing(uri) = client.connect(ConnectParams::default()).await? {
//!     println!("scan me: {uri}");
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │                    HOST                     │
//! │        Client API  |  ClientDelegate        │
//! └─────────────────────┬───────────────────────┘
//!                       │
//! ┌─────────────────────▼───────────────────────┐
//! │                  ENGINES                    │
//! │   Pairing | Session | Sequence store        │
//! └─────────────────────┬───────────────────────┘
//!                       │
//! ┌─────────────────────▼───────────────────────┐
//! │               RELAY FAÇADE                  │
//! │  Serializer | Correlation | Subscriber      │
//! └─────────────────────┬───────────────────────┘
//!                       │
//! ┌─────────────────────▼───────────────────────┐
//! │                 TRANSPORT                   │
//! │   WebSocket JSON-RPC | In-memory hub        │
//! └─────────────────────────────────────────────┘
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod client;
pub mod crypto;
pub mod engine;
pub mod error;
pub mod protocol;
pub mod relay;
pub mod serializer;
pub mod store;
pub mod subscriber;
pub mod topic;

// Re-export main types at crate root
pub use client::{Client, ClientConfig, ClientDelegate, ConnectOutcome, ConnectParams};
pub use engine::SessionRequestEvent;
pub use error::ClientError;
pub use protocol::envelope::{JsonRpcError, JsonRpcResponse, RpcReply};
pub use protocol::pairing::{Pairing, SettledPairing};
pub use protocol::session::{Session, SessionProposeParams, SettledSession};
pub use protocol::types::{AppMetadata, Reason, SessionPermissions};
pub use protocol::uri::PairingUri;
pub use relay::{MemoryRelay, RelayTransport, TransportEvent, WsTransport};
pub use topic::Topic;

/// Seconds since the unix epoch
pub(crate) fn unix_now() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
