//! Error types for the ledger.

use {
    meshledger_net::{ErrorKind, MeshError},
    thiserror::Error,
};

#[derive(Error, Debug)]
pub enum LedgerError {
    /// The caller cancelled the operation.
    #[error("operation cancelled")]
    Cancelled,

    /// Mesh failure while fetching.
    #[error("mesh error: {0}")]
    Mesh(#[from] MeshError),
}

impl LedgerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Cancelled => ErrorKind::Incomplete,
            Self::Mesh(e) => e.kind(),
        }
    }
}

pub type Result<T> = std::result::Result<T, LedgerError>;
