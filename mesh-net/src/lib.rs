//! Mesh Ledger peer mesh.
//!
//! Nodes keep authenticated TCP links to each other and exchange typed
//! [`Message`](message::Message) envelopes over them:
//!
//! - **Framing**: every payload is length-prefixed with a signed 32-bit
//!   integer in a configurable byte order; non-positive lengths are
//!   keep-alives.
//! - **Authentication**: the accepting side challenges the dialer with a
//!   random phrase that must come back signed by the claimed key.
//! - **Gossip**: discovery announcements flood the mesh with a TTL hop
//!   budget; receivers dial announced strangers.
//! - **Dispatch**: inbound messages are routed by type tag through a
//!   registry fixed at start-up; replies resolve pending requests.
//!
//! ## Architecture
//!
//! ```text
//!  ┌──────────────────────────────────────────────┐
//!  │  Node features (ledger sync, agreement, ...) │
//!  │  ← MessageHandler::handle      emit/request →│
//!  └──────────────┬───────────────────────────────┘
//!                 │
//!  ┌──────────────▼───────────────────────────────┐
//!  │  MeshMessenger                               │
//!  │  • handler registry, pending requests        │
//!  │  • discovery relay (SeenCache, plan_relay)   │
//!  │  • PeerEvent broadcast                       │
//!  └──────┬───────────────────────┬───────────────┘
//!         │                       │
//!  ┌──────▼──────┐        ┌───────▼────────┐
//!  │ PeerManager │        │ PeerConnection │ × N
//!  └─────────────┘        └───────┬────────┘
//!                                 │
//!  ┌──────────────────────────────▼───────────────┐
//!  │  FrameCodec (length prefix + bincode)        │
//!  └──────────────────────────────────────────────┘
//! ```
//!
//! ## Crate modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`codec`]        | Byte order, frame reader/writer, payload encoding |
//! | [`config`]       | `MeshConfig` defaults, dev overrides, validation |
//! | [`connection`]   | Handshake, link status, per-link send/receive |
//! | [`discovery`]    | Seen-id cache and TTL relay rules |
//! | [`error`]        | Crate-wide error enum and shared error kinds |
//! | [`message`]      | Envelope, peer identity, handshake payloads |
//! | [`messenger`]    | Peer set, fan-out, dispatch, request/response |
//! | [`peer_manager`] | Active peer table and counters |
//! | [`transport`]    | TCP accept loop |

pub mod codec;
pub mod config;
pub mod connection;
pub mod discovery;
pub mod error;
pub mod message;
pub mod messenger;
pub mod peer_manager;
pub mod transport;

pub use {
    error::{ErrorKind, MeshError},
    message::{Message, PeerInfo},
    messenger::{MeshMessenger, MeshMessengerBuilder, MessageHandler, PeerEvent},
};
