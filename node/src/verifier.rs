//! Judging transactions before voting on them.

use {meshledger_agreement::Vote, meshledger_ledger::Transaction};

/// Decides how this node votes on a transaction.
///
/// Implementations run on the receive task of the link the request arrived
/// on and must not block.
pub trait TransactionVerifier: Send + Sync {
    fn verify(&self, transaction: &Transaction) -> Vote;
}

/// Agrees with every transaction that changes at least one cell.
#[derive(Debug, Default, Clone, Copy)]
pub struct ChangeSetVerifier;

impl TransactionVerifier for ChangeSetVerifier {
    fn verify(&self, transaction: &Transaction) -> Vote {
        if transaction.has_changes() {
            Vote::Agree
        } else {
            Vote::Disagree
        }
    }
}

/// Always casts the same vote.
#[derive(Debug, Clone, Copy)]
pub struct FixedVerifier(pub Vote);

impl TransactionVerifier for FixedVerifier {
    fn verify(&self, _transaction: &Transaction) -> Vote {
        self.0
    }
}
