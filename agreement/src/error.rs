//! Error types for the agreement engine.

use {
    crate::config::ConfigError,
    meshledger_net::ErrorKind,
    thiserror::Error,
    uuid::Uuid,
};

#[derive(Error, Debug)]
pub enum AgreementError {
    /// No round is open for the transaction.
    #[error("no open round for transaction {0}")]
    UnknownRound(Uuid),

    /// A round for the transaction is already open.
    #[error("round already open for transaction {0}")]
    RoundExists(Uuid),

    /// The open-round limit is reached.
    #[error("too many open rounds (max {0})")]
    TooManyRounds(usize),

    /// The caller cancelled while votes were outstanding. The tally is gone.
    #[error("vote collection cancelled for transaction {0}")]
    Cancelled(Uuid),

    #[error("invalid agreement config: {0}")]
    Config(#[from] ConfigError),
}

impl AgreementError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::UnknownRound(_) | Self::RoundExists(_) | Self::TooManyRounds(_) => {
                ErrorKind::Precondition
            }
            Self::Cancelled(_) => ErrorKind::Incomplete,
            Self::Config(_) => ErrorKind::Internal,
        }
    }
}

pub type Result<T> = std::result::Result<T, AgreementError>;
