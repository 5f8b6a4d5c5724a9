//! Vote rounds.
//!
//! The origin of a transaction opens a round naming the involvators whose
//! votes count, feeds incoming votes with [`AgreementEngine::submit_vote`],
//! and calls [`AgreementEngine::collect`] to wait until every involvator has
//! voted or the vote timeout passes. Collecting closes the round; the tally
//! is handed out as an immutable [`ExecutionResult`].

use {
    crate::{
        config::AgreementConfig,
        error::{AgreementError, Result},
        execution_result::{ExecutionResult, Vote, VoteMessage},
    },
    log::*,
    parking_lot::Mutex,
    solana_pubkey::Pubkey,
    std::{
        collections::{HashMap, HashSet},
        time::Duration,
    },
    tokio::sync::watch,
    tokio_util::sync::CancellationToken,
    uuid::Uuid,
};

/// What happened to a submitted vote.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoteReceipt {
    Counted,
    /// The voter already voted in this round.
    Duplicate,
    /// The voter is not an involvator of this round.
    NotInvolved,
    /// No round is open for the transaction.
    UnknownRound,
}

struct Round {
    origin: Pubkey,
    involvators: Vec<Pubkey>,
    votes: HashMap<Pubkey, Vote>,
    counted: watch::Sender<usize>,
}

impl Round {
    fn result(&self, transaction_id: Uuid) -> ExecutionResult {
        let agrees = self
            .votes
            .values()
            .filter(|vote| **vote == Vote::Agree)
            .count();
        ExecutionResult {
            transaction_id,
            origin: self.origin,
            involvators: self.involvators.clone(),
            agrees,
            disagrees: self.votes.len().saturating_sub(agrees),
        }
    }
}

pub struct AgreementEngine {
    config: AgreementConfig,
    rounds: Mutex<HashMap<Uuid, Round>>,
}

impl AgreementEngine {
    pub fn new(config: AgreementConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            rounds: Mutex::new(HashMap::new()),
        })
    }

    pub fn config(&self) -> &AgreementConfig {
        &self.config
    }

    /// Start tallying votes on `transaction_id`.
    ///
    /// Duplicate involvators are collapsed; their order is kept.
    pub fn open_round(
        &self,
        transaction_id: Uuid,
        origin: Pubkey,
        involvators: Vec<Pubkey>,
    ) -> Result<()> {
        let mut rounds = self.rounds.lock();
        if rounds.contains_key(&transaction_id) {
            return Err(AgreementError::RoundExists(transaction_id));
        }
        if rounds.len() >= self.config.max_open_rounds {
            return Err(AgreementError::TooManyRounds(self.config.max_open_rounds));
        }

        let mut seen = HashSet::new();
        let involvators: Vec<Pubkey> = involvators
            .into_iter()
            .filter(|pubkey| seen.insert(*pubkey))
            .collect();
        debug!(
            "opened round for {} with {} involvators",
            transaction_id,
            involvators.len()
        );
        let (counted, _) = watch::channel(0);
        rounds.insert(
            transaction_id,
            Round {
                origin,
                involvators,
                votes: HashMap::new(),
                counted,
            },
        );
        Ok(())
    }

    /// Count one vote. Only the first vote of each involvator counts.
    pub fn submit_vote(&self, vote: &VoteMessage) -> VoteReceipt {
        let mut rounds = self.rounds.lock();
        let Some(round) = rounds.get_mut(&vote.transaction_id) else {
            trace!("vote for unknown round {}", vote.transaction_id);
            return VoteReceipt::UnknownRound;
        };
        if !round.involvators.contains(&vote.voter) {
            debug!(
                "ignoring vote from non-involvator {} on {}",
                vote.voter, vote.transaction_id
            );
            return VoteReceipt::NotInvolved;
        }
        if round.votes.contains_key(&vote.voter) {
            return VoteReceipt::Duplicate;
        }
        round.votes.insert(vote.voter, vote.vote);
        round.counted.send_replace(round.votes.len());
        VoteReceipt::Counted
    }

    pub fn is_open(&self, transaction_id: &Uuid) -> bool {
        self.rounds.lock().contains_key(transaction_id)
    }

    /// Current tally without closing the round.
    pub fn snapshot(&self, transaction_id: &Uuid) -> Option<ExecutionResult> {
        self.rounds
            .lock()
            .get(transaction_id)
            .map(|round| round.result(*transaction_id))
    }

    /// Wait with the configured vote timeout. See [`Self::collect_within`].
    pub async fn collect(
        &self,
        transaction_id: Uuid,
        cancel: &CancellationToken,
    ) -> Result<ExecutionResult> {
        self.collect_within(transaction_id, self.config.vote_timeout(), cancel)
            .await
    }

    /// Wait until every involvator voted or `timeout` passes, then close the
    /// round and return its tally.
    ///
    /// Cancellation closes the round too, but returns
    /// [`AgreementError::Cancelled`] instead of a partial tally.
    pub async fn collect_within(
        &self,
        transaction_id: Uuid,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<ExecutionResult> {
        let (mut counted, expected) = {
            let rounds = self.rounds.lock();
            let round = rounds
                .get(&transaction_id)
                .ok_or(AgreementError::UnknownRound(transaction_id))?;
            (round.counted.subscribe(), round.involvators.len())
        };

        let cancelled = tokio::select! {
            biased;
            _ = cancel.cancelled() => true,
            waited = tokio::time::timeout(timeout, counted.wait_for(|n| *n >= expected)) => {
                if waited.is_err() {
                    debug!("vote timeout on {}", transaction_id);
                }
                false
            }
        };

        let round = self
            .rounds
            .lock()
            .remove(&transaction_id)
            .ok_or(AgreementError::UnknownRound(transaction_id))?;
        if cancelled {
            info!("vote round for {} cancelled", transaction_id);
            return Err(AgreementError::Cancelled(transaction_id));
        }

        let result = round.result(transaction_id);
        info!(
            "round {} closed: {} agree, {} disagree of {} involvators -> {}",
            transaction_id,
            result.agrees,
            result.disagrees,
            result.involvators.len(),
            result.outcome()
        );
        Ok(result)
    }
}
