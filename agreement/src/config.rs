//! Agreement engine configuration.

use std::time::Duration;

/// Configuration for the agreement engine.
#[derive(Debug, Clone)]
pub struct AgreementConfig {
    /// How long a round waits for outstanding votes in milliseconds.
    /// Default: 10000.
    pub vote_timeout_ms: u64,

    /// Maximum number of rounds open at once. Further rounds are refused
    /// until earlier ones are collected.
    /// Default: 1024.
    pub max_open_rounds: usize,
}

impl Default for AgreementConfig {
    fn default() -> Self {
        Self {
            vote_timeout_ms: 10_000,
            max_open_rounds: 1_024,
        }
    }
}

impl AgreementConfig {
    pub fn vote_timeout(&self) -> Duration {
        Duration::from_millis(self.vote_timeout_ms)
    }

    /// Validate configuration parameters.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.vote_timeout_ms == 0 {
            return Err(ConfigError::InvalidVoteTimeout);
        }
        if self.max_open_rounds == 0 {
            return Err(ConfigError::InvalidMaxOpenRounds);
        }
        Ok(())
    }
}

/// Errors in agreement configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("vote_timeout_ms must be > 0")]
    InvalidVoteTimeout,
    #[error("max_open_rounds must be > 0")]
    InvalidMaxOpenRounds,
}
