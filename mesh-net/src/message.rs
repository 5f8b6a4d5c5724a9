//! Wire types exchanged between mesh peers.

use {
    crate::{codec::FrameCodec, error::Result},
    serde::{de::DeserializeOwned, Deserialize, Serialize},
    solana_pubkey::Pubkey,
    std::{fmt, net::SocketAddr},
    uuid::Uuid,
};

/// Type tag of discovery announcements. Handled by the messenger itself.
pub const DISCOVERY_KIND: &str = "mesh.discovery";

/// Identity and advertised endpoint of a mesh participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PeerInfo {
    /// Public key; unique within a mesh.
    pub pubkey: Pubkey,
    /// Address other peers should dial.
    pub addr: SocketAddr,
}

impl PeerInfo {
    pub fn new(pubkey: Pubkey, addr: SocketAddr) -> Self {
        Self { pubkey, addr }
    }
}

impl fmt::Display for PeerInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.pubkey, self.addr)
    }
}

/// Envelope for everything sent after authentication.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Unique id, used for gossip de-duplication and reply correlation.
    pub id: Uuid,
    /// Type tag selecting the handler on the receiving side.
    pub kind: String,
    /// Opaque payload, usually a codec-encoded struct.
    pub data: Vec<u8>,
    /// The peer that put this message on the wire.
    pub sender: PeerInfo,
    /// Remaining relay hops. Only gossip uses values above zero.
    pub ttl: i32,
    /// Id of the request this message answers.
    pub reply_to: Option<Uuid>,
}

impl Message {
    pub fn new(kind: impl Into<String>, data: Vec<u8>, sender: PeerInfo) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind: kind.into(),
            data,
            sender,
            ttl: 0,
            reply_to: None,
        }
    }

    /// Encode `payload` with `codec` and wrap it.
    pub fn encode<T: Serialize>(
        codec: &FrameCodec,
        kind: impl Into<String>,
        payload: &T,
        sender: PeerInfo,
    ) -> Result<Self> {
        Ok(Self::new(kind, codec.encode_payload(payload)?, sender))
    }

    pub fn with_ttl(mut self, ttl: i32) -> Self {
        self.ttl = ttl;
        self
    }

    /// Decode the payload.
    pub fn decode<T: DeserializeOwned>(&self, codec: &FrameCodec) -> Result<T> {
        codec.decode_payload(&self.data)
    }

    /// A response to this message carrying `data`.
    pub fn reply(&self, data: Vec<u8>, sender: PeerInfo) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind: self.kind.clone(),
            data,
            sender,
            ttl: 0,
            reply_to: Some(self.id),
        }
    }

    pub fn is_reply(&self) -> bool {
        self.reply_to.is_some()
    }

    /// The copy to forward one hop further, or `None` once the hop budget is
    /// spent. The id is preserved so downstream peers can drop duplicates.
    pub fn relayed(&self, sender: PeerInfo) -> Option<Self> {
        if self.ttl <= 0 {
            return None;
        }
        Some(Self {
            ttl: self.ttl.saturating_sub(1),
            sender,
            ..self.clone()
        })
    }
}

/// Payload of a [`DISCOVERY_KIND`] message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveryAnnouncement {
    /// The node that wants to be contacted.
    pub advertised: PeerInfo,
}

/// Authentication exchange, run once per connection before any [`Message`].
/// Each side proves its key by signing the other side's phrase.
///
/// ```text
///  connector                                     acceptor
///      |  <---- Request { phrase } ----------------  |
///      |  ---- Response { signed, counter } ------>  |
///      |  <---- Outcome { accepted, counter_signed } |
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Handshake {
    Request {
        phrase_to_sign: String,
        acceptor: PeerInfo,
    },
    Response {
        peer: PeerInfo,
        /// Base58 ed25519 signature over the phrase bytes.
        phrase_signed: String,
        /// Phrase the acceptor must sign in turn.
        counter_phrase: String,
    },
    Outcome {
        accepted: bool,
        /// The acceptor's signature over the counter phrase. Absent when
        /// the connector was refused.
        counter_signed: Option<String>,
    },
}

impl Handshake {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Request { .. } => "Request",
            Self::Response { .. } => "Response",
            Self::Outcome { .. } => "Outcome",
        }
    }
}
