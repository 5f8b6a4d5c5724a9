//! Configuration for the mesh networking layer.

use {
    crate::codec::ByteOrder,
    std::{net::SocketAddr, time::Duration},
    thiserror::Error,
};

/// Default hop budget for discovery announcements.
pub const DEFAULT_MAX_TTL: i32 = 16;

/// Configuration for a mesh node.
#[derive(Debug, Clone)]
pub struct MeshConfig {
    /// Local address to bind the mesh listener on.
    /// Default: `0.0.0.0:7800`
    pub bind_addr: SocketAddr,

    /// Address announced to other peers. When `None` the bound address is
    /// announced, which is only useful when binding a concrete interface.
    pub advertised_addr: Option<SocketAddr>,

    /// Maximum number of simultaneously connected peers.
    pub max_peers: usize,

    /// Initial TTL of discovery announcements.
    pub max_ttl: i32,

    /// Byte order of frame length prefixes and payload integers.
    pub byte_order: ByteOrder,

    /// Largest accepted frame payload in bytes.
    pub max_frame_size: usize,

    /// Deadline for establishing the TCP connection (ms).
    pub connect_timeout_ms: u64,

    /// Deadline for the full authentication exchange (ms).
    pub handshake_timeout_ms: u64,

    /// Default deadline for request/response round trips (ms).
    pub request_timeout_ms: u64,

    /// How long discovery message ids are remembered for de-duplication.
    pub seen_retention_secs: u64,

    /// Capacity of the peer event broadcast channel.
    pub event_buffer_size: usize,
}

impl Default for MeshConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 7800)),
            advertised_addr: None,
            max_peers: 64,
            max_ttl: DEFAULT_MAX_TTL,
            byte_order: ByteOrder::Little,
            max_frame_size: 8_388_608, // 8 MiB
            connect_timeout_ms: 5_000,
            handshake_timeout_ms: 5_000,
            request_timeout_ms: 10_000,
            seen_retention_secs: 300,
            event_buffer_size: 1_024,
        }
    }
}

impl MeshConfig {
    /// Create a config suitable for local testing with shorter timeouts.
    #[cfg(any(test, feature = "dev-context-only-utils"))]
    pub fn dev_default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            advertised_addr: None,
            max_peers: 16,
            max_ttl: DEFAULT_MAX_TTL,
            byte_order: ByteOrder::Little,
            max_frame_size: 1_048_576,
            connect_timeout_ms: 1_000,
            handshake_timeout_ms: 1_000,
            request_timeout_ms: 2_000,
            seen_retention_secs: 30,
            event_buffer_size: 256,
        }
    }

    /// Validate configuration invariants.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_peers == 0 {
            return Err(ConfigError::ZeroMaxPeers);
        }
        if self.max_ttl < 0 {
            return Err(ConfigError::NegativeTtl(self.max_ttl));
        }
        if self.max_frame_size == 0 || i32::try_from(self.max_frame_size).is_err() {
            return Err(ConfigError::InvalidFrameSize(self.max_frame_size));
        }
        if self.connect_timeout_ms == 0
            || self.handshake_timeout_ms == 0
            || self.request_timeout_ms == 0
        {
            return Err(ConfigError::ZeroTimeout);
        }
        if self.event_buffer_size == 0 {
            return Err(ConfigError::ZeroEventBuffer);
        }
        Ok(())
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn seen_retention(&self) -> Duration {
        Duration::from_secs(self.seen_retention_secs)
    }
}

/// Errors from invalid mesh configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("max_peers must be greater than zero")]
    ZeroMaxPeers,
    #[error("max_ttl must not be negative, got {0}")]
    NegativeTtl(i32),
    #[error("max_frame_size must be in 1..=i32::MAX, got {0}")]
    InvalidFrameSize(usize),
    #[error("timeouts must be greater than zero")]
    ZeroTimeout,
    #[error("event_buffer_size must be greater than zero")]
    ZeroEventBuffer,
}
