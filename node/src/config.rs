//! Node configuration, loaded from a TOML file.
//!
//! ```toml
//! login = "alice"
//! mode = "genesis"
//! chain_id = "5b1c2a0e-8d7f-4a51-9f2e-0c6f3b1d9a77"
//! identity = "/var/lib/meshledger/identity.json"
//! features = ["endpoint", "routing", "storage", "tracker"]
//!
//! [mesh]
//! bind_addr = "0.0.0.0:7800"
//! seeds = ["10.0.0.2:7800"]
//!
//! [agreement]
//! vote_timeout_ms = 10000
//! ```
//!
//! Every key is optional; missing keys take the values of
//! [`NodeConfig::default`].

use {
    crate::{
        error::{NodeError, Result},
        feature::Feature,
        node_info::NodeMode,
    },
    meshledger_agreement::AgreementConfig,
    meshledger_ledger::block_repository::DEFAULT_FETCH_CACHE_CAPACITY,
    meshledger_net::{codec::ByteOrder, config::MeshConfig},
    serde::{Deserialize, Serialize},
    std::{fs, net::SocketAddr, path::Path, path::PathBuf, time::Duration},
    uuid::Uuid,
};

/// Top-level node configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NodeConfig {
    /// Human-readable node name announced to peers.
    pub login: String,
    pub mode: NodeMode,
    /// Chain this node belongs to. Peers on other chains are dropped unless
    /// the node runs in [`NodeMode::Multi`].
    pub chain_id: Uuid,
    /// Keypair file. A fresh identity is generated when unset.
    pub identity: Option<PathBuf>,
    pub features: Vec<Feature>,
    /// Default log filter, overridden by `RUST_LOG`.
    pub log_filter: String,
    pub mesh: MeshSection,
    pub agreement: AgreementSection,
    pub ledger: LedgerSection,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            login: "meshledger".to_string(),
            mode: NodeMode::Plain,
            chain_id: Uuid::nil(),
            identity: None,
            features: Feature::ALL.to_vec(),
            log_filter: "info".to_string(),
            mesh: MeshSection::default(),
            agreement: AgreementSection::default(),
            ledger: LedgerSection::default(),
        }
    }
}

impl NodeConfig {
    /// Local-only configuration with short timeouts.
    #[cfg(any(test, feature = "dev-context-only-utils"))]
    pub fn dev_default() -> Self {
        let mesh = MeshConfig::dev_default();
        Self {
            login: "dev".to_string(),
            log_filter: "debug".to_string(),
            mesh: MeshSection {
                bind_addr: mesh.bind_addr,
                connect_timeout_ms: mesh.connect_timeout_ms,
                handshake_timeout_ms: mesh.handshake_timeout_ms,
                request_timeout_ms: mesh.request_timeout_ms,
                ..MeshSection::default()
            },
            agreement: AgreementSection {
                vote_timeout_ms: 2_000,
                ..AgreementSection::default()
            },
            ledger: LedgerSection {
                fetch_timeout_ms: 1_000,
                ..LedgerSection::default()
            },
            ..Self::default()
        }
    }

    /// Read and validate the TOML file at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|source| NodeError::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = toml::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.login.trim().is_empty() {
            return Err(NodeError::InvalidConfig("login must not be empty".into()));
        }
        if self.features.is_empty() {
            return Err(NodeError::InvalidConfig(
                "at least one feature must be enabled".into(),
            ));
        }
        if self.ledger.fetch_timeout_ms == 0 {
            return Err(NodeError::InvalidConfig("fetch_timeout_ms must be > 0".into()));
        }
        self.mesh_config()
            .validate()
            .map_err(|e| NodeError::InvalidConfig(e.to_string()))?;
        self.agreement_config()
            .validate()
            .map_err(|e| NodeError::InvalidConfig(e.to_string()))?;
        Ok(())
    }

    pub fn has_feature(&self, feature: Feature) -> bool {
        self.features.contains(&feature)
    }

    pub fn mesh_config(&self) -> MeshConfig {
        let section = &self.mesh;
        MeshConfig {
            bind_addr: section.bind_addr,
            advertised_addr: section.advertised_addr,
            max_peers: section.max_peers,
            max_ttl: section.max_ttl,
            byte_order: section.byte_order,
            max_frame_size: section.max_frame_size,
            connect_timeout_ms: section.connect_timeout_ms,
            handshake_timeout_ms: section.handshake_timeout_ms,
            request_timeout_ms: section.request_timeout_ms,
            ..MeshConfig::default()
        }
    }

    pub fn agreement_config(&self) -> AgreementConfig {
        AgreementConfig {
            vote_timeout_ms: self.agreement.vote_timeout_ms,
            max_open_rounds: self.agreement.max_open_rounds,
        }
    }
}

/// `[mesh]` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MeshSection {
    pub bind_addr: SocketAddr,
    pub advertised_addr: Option<SocketAddr>,
    /// Peers dialled at start-up.
    pub seeds: Vec<SocketAddr>,
    pub max_peers: usize,
    pub max_ttl: i32,
    pub byte_order: ByteOrder,
    pub max_frame_size: usize,
    pub connect_timeout_ms: u64,
    pub handshake_timeout_ms: u64,
    pub request_timeout_ms: u64,
}

impl Default for MeshSection {
    fn default() -> Self {
        let mesh = MeshConfig::default();
        Self {
            bind_addr: mesh.bind_addr,
            advertised_addr: mesh.advertised_addr,
            seeds: Vec::new(),
            max_peers: mesh.max_peers,
            max_ttl: mesh.max_ttl,
            byte_order: mesh.byte_order,
            max_frame_size: mesh.max_frame_size,
            connect_timeout_ms: mesh.connect_timeout_ms,
            handshake_timeout_ms: mesh.handshake_timeout_ms,
            request_timeout_ms: mesh.request_timeout_ms,
        }
    }
}

/// `[agreement]` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AgreementSection {
    pub vote_timeout_ms: u64,
    pub max_open_rounds: usize,
}

impl Default for AgreementSection {
    fn default() -> Self {
        let agreement = AgreementConfig::default();
        Self {
            vote_timeout_ms: agreement.vote_timeout_ms,
            max_open_rounds: agreement.max_open_rounds,
        }
    }
}

/// `[ledger]` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LedgerSection {
    /// Blocks fetched from peers but not yet part of our chain.
    pub fetch_cache_capacity: usize,
    /// Per-peer deadline when asking for a missing block (ms).
    pub fetch_timeout_ms: u64,
}

impl Default for LedgerSection {
    fn default() -> Self {
        Self {
            fetch_cache_capacity: DEFAULT_FETCH_CACHE_CAPACITY,
            fetch_timeout_ms: 5_000,
        }
    }
}

impl LedgerSection {
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }
}
