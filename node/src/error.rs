//! Error types for the node process.

pub use meshledger_net::ErrorKind;
use {
    meshledger_agreement::AgreementError,
    meshledger_ledger::{LedgerError, PutOutcome},
    meshledger_net::MeshError,
    solana_pubkey::Pubkey,
    std::{io, path::PathBuf},
    thiserror::Error,
    uuid::Uuid,
};

#[derive(Error, Debug)]
pub enum NodeError {
    #[error("mesh error: {0}")]
    Mesh(#[from] MeshError),

    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("agreement error: {0}")]
    Agreement(#[from] AgreementError),

    #[error("failed to read {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse config: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    /// The identity keypair could not be loaded or stored.
    #[error("identity error: {0}")]
    Identity(String),

    /// The caller or peer is not allowed to do this.
    #[error("permission denied: {0}")]
    Permission(String),

    #[error("block {index} refused by the repository ({outcome})")]
    BlockRefused { index: u64, outcome: PutOutcome },

    #[error("block {0} not found")]
    BlockNotFound(u64),

    /// A peer belongs to a different chain than ours.
    #[error("peer {peer} is on chain {chain_id}")]
    ChainMismatch { peer: Pubkey, chain_id: Uuid },
}

impl NodeError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Mesh(e) => e.kind(),
            Self::Ledger(e) => e.kind(),
            Self::Agreement(e) => e.kind(),
            Self::ConfigRead { .. }
            | Self::ConfigParse(_)
            | Self::InvalidConfig(_)
            | Self::Identity(_) => ErrorKind::Internal,
            Self::Permission(_) => ErrorKind::Permission,
            Self::BlockRefused { .. } => ErrorKind::Status,
            Self::BlockNotFound(_) | Self::ChainMismatch { .. } => ErrorKind::Precondition,
        }
    }

    /// HTTP-style status code an API layer would answer with.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::BlockRefused { outcome, .. } => outcome.status_code(),
            Self::BlockNotFound(_) => 404,
            _ => match self.kind() {
                ErrorKind::Precondition => 400,
                ErrorKind::Permission => 403,
                ErrorKind::Status => 409,
                ErrorKind::Connectivity => 502,
                ErrorKind::Incomplete => 504,
                ErrorKind::Internal => 500,
            },
        }
    }
}

pub type Result<T> = std::result::Result<T, NodeError>;

#[cfg(test)]
mod tests {
    use {super::*, test_case::test_case};

    #[test_case(NodeError::Permission("genesis".into()), ErrorKind::Permission, 403; "permission")]
    #[test_case(NodeError::BlockNotFound(7), ErrorKind::Precondition, 404; "not found")]
    #[test_case(
        NodeError::BlockRefused { index: 3, outcome: PutOutcome::Conflict },
        ErrorKind::Status,
        409;
        "conflict"
    )]
    #[test_case(
        NodeError::BlockRefused { index: 3, outcome: PutOutcome::Rejected },
        ErrorKind::Status,
        400;
        "rejected"
    )]
    #[test_case(NodeError::Mesh(MeshError::ConnectionClosed), ErrorKind::Connectivity, 502; "mesh")]
    #[test_case(NodeError::Ledger(LedgerError::Cancelled), ErrorKind::Incomplete, 504; "cancelled")]
    #[test_case(NodeError::InvalidConfig("x".into()), ErrorKind::Internal, 500; "config")]
    fn test_kind_and_status(error: NodeError, kind: ErrorKind, status: u16) {
        assert_eq!(error.kind(), kind);
        assert_eq!(error.status_code(), status);
    }

    #[test]
    fn test_chain_mismatch_is_precondition() {
        let error = NodeError::ChainMismatch {
            peer: Pubkey::new_unique(),
            chain_id: Uuid::new_v4(),
        };
        assert_eq!(error.kind(), ErrorKind::Precondition);
        assert_eq!(error.status_code(), 400);
    }
}
