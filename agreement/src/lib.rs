//! Count-based transaction agreement.
//!
//! A transaction's origin asks a set of peers (the *involvators*) to judge
//! it and tallies their votes:
//!
//! - a round is **valid** once at least three votes arrived;
//! - it is **agreed** when agrees reach two thirds of the votes cast;
//! - a valid round that is not agreed is **disagreed**, which is final;
//! - a round that never became valid is **indeterminate**.
//!
//! There is no leader election and no view change; callers decide what to
//! do with an indeterminate round.

pub mod config;
pub mod engine;
pub mod error;
pub mod execution_result;

pub use {
    config::AgreementConfig,
    engine::{AgreementEngine, VoteReceipt},
    error::AgreementError,
    execution_result::{ExecutionResult, Outcome, Vote, VoteMessage},
};
