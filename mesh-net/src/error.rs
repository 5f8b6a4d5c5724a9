//! Error types for the mesh networking layer.

use {
    crate::{config::ConfigError, connection::NodeStatus},
    solana_pubkey::Pubkey,
    std::{fmt, net::SocketAddr},
    thiserror::Error,
};

/// Coarse classification shared by every layer of the node.
///
/// Callers branch on the kind rather than on individual variants: transport
/// faults are retried or ignored, precondition and permission failures are
/// surfaced to whoever asked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Socket, framing or handshake fault.
    Connectivity,
    /// Operation cancelled or timed out before it could finish.
    Incomplete,
    /// Operation not allowed in the current connection status.
    Status,
    /// Inputs violate a documented precondition.
    Precondition,
    /// Caller is not allowed to perform the operation.
    Permission,
    /// Local encoding or configuration problem.
    Internal,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Connectivity => "connectivity",
            Self::Incomplete => "incomplete",
            Self::Status => "status",
            Self::Precondition => "precondition",
            Self::Permission => "permission",
            Self::Internal => "internal",
        };
        f.write_str(name)
    }
}

/// Errors that can occur in the mesh networking layer.
#[derive(Error, Debug)]
pub enum MeshError {
    /// Failed to encode or decode a payload.
    #[error("serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    /// The mesh configuration is inconsistent.
    #[error("invalid mesh config: {0}")]
    InvalidConfig(#[from] ConfigError),

    /// A frame exceeds the configured maximum.
    #[error("frame too large: {size} bytes (max {max} bytes)")]
    FrameTooLarge {
        /// Actual frame size.
        size: usize,
        /// Configured maximum.
        max: usize,
    },

    /// Transport-level I/O error.
    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),

    /// Outbound connection could not be established.
    #[error("connection failed to {0}: {1}")]
    ConnectionFailed(SocketAddr, String),

    /// The remote side closed the socket before the exchange completed.
    #[error("connection closed by remote")]
    ConnectionClosed,

    /// The handshake did not follow the expected message order.
    #[error("handshake protocol violation: {0}")]
    HandshakeFailed(String),

    /// The remote signature over the challenge phrase did not verify.
    #[error("authentication failed for {0}")]
    AuthenticationFailed(Pubkey),

    /// The acceptor refused our signed phrase.
    #[error("handshake rejected by {0}")]
    HandshakeRejected(SocketAddr),

    /// A peer sent bytes that do not decode into a message.
    #[error("corrupt message: {0}")]
    CorruptMessage(String),

    /// Status transition not permitted by the connection lifecycle.
    #[error("invalid status transition {from} -> {to}")]
    InvalidStatus {
        /// Current status.
        from: NodeStatus,
        /// Requested status.
        to: NodeStatus,
    },

    /// The connection is not `Ready`.
    #[error("connection not ready (status {0})")]
    NotReady(NodeStatus),

    /// The peer is not part of the active set.
    #[error("unknown peer: {0}")]
    UnknownPeer(Pubkey),

    /// A link to this identity already exists.
    #[error("peer already connected: {0}")]
    PeerAlreadyConnected(Pubkey),

    /// Maximum peer count has been reached.
    #[error("maximum peers reached: {0}")]
    MaxPeersReached(usize),

    /// No response arrived within the deadline.
    #[error("timed out after {0}ms")]
    Timeout(u64),

    /// The caller cancelled the operation.
    #[error("operation cancelled")]
    Cancelled,

    /// The waiting side of an internal channel was dropped.
    #[error("channel closed")]
    ChannelClosed,
}

impl MeshError {
    /// Classifies the error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Serialization(_) | Self::InvalidConfig(_) => ErrorKind::Internal,
            Self::FrameTooLarge { .. }
            | Self::Transport(_)
            | Self::ConnectionFailed(..)
            | Self::ConnectionClosed
            | Self::HandshakeFailed(_)
            | Self::AuthenticationFailed(_)
            | Self::HandshakeRejected(_)
            | Self::CorruptMessage(_) => ErrorKind::Connectivity,
            Self::InvalidStatus { .. } | Self::NotReady(_) => ErrorKind::Status,
            Self::UnknownPeer(_) | Self::PeerAlreadyConnected(_) | Self::MaxPeersReached(_) => {
                ErrorKind::Precondition
            }
            Self::Timeout(_) | Self::Cancelled | Self::ChannelClosed => ErrorKind::Incomplete,
        }
    }
}

/// Convenience result type for mesh operations.
pub type Result<T> = std::result::Result<T, MeshError>;
