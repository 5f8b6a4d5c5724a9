//! Vote types and the immutable result of a vote round.

use {
    serde::{Deserialize, Serialize},
    solana_pubkey::Pubkey,
    std::fmt,
    uuid::Uuid,
};

/// Fewest votes for which a round's result means anything.
pub const MIN_VALID_VOTES: usize = 3;

/// A peer's verdict on a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Vote {
    Agree,
    Disagree,
}

/// A vote as sent over the mesh.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteMessage {
    pub transaction_id: Uuid,
    pub voter: Pubkey,
    pub vote: Vote,
}

/// Final classification of a round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Outcome {
    /// Valid, and agrees reached two thirds.
    Agreed,
    /// Valid, and agrees fell short of two thirds. Final.
    Disagreed,
    /// Too few votes arrived for the result to count.
    Indeterminate,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Agreed => write!(f, "Agreed"),
            Outcome::Disagreed => write!(f, "Disagreed"),
            Outcome::Indeterminate => write!(f, "Indeterminate"),
        }
    }
}

/// Tally of one transaction's vote round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub transaction_id: Uuid,
    /// Node that opened the round.
    pub origin: Pubkey,
    /// Peers whose votes count.
    pub involvators: Vec<Pubkey>,
    pub agrees: usize,
    pub disagrees: usize,
}

impl ExecutionResult {
    pub fn total(&self) -> usize {
        self.agrees.saturating_add(self.disagrees)
    }

    /// At least [`MIN_VALID_VOTES`] votes were cast.
    pub fn is_valid(&self) -> bool {
        self.total() >= MIN_VALID_VOTES
    }

    /// `agrees >= (max(total, 1) / 3) * 2`, evaluated in floating point.
    pub fn is_agreed(&self) -> bool {
        let total = self.total().max(1) as f64;
        self.agrees as f64 >= (total / 3.0) * 2.0
    }

    pub fn is_disagreed(&self) -> bool {
        !self.is_agreed()
    }

    pub fn outcome(&self) -> Outcome {
        if !self.is_valid() {
            Outcome::Indeterminate
        } else if self.is_agreed() {
            Outcome::Agreed
        } else {
            Outcome::Disagreed
        }
    }
}

/// Smallest agree count that satisfies [`ExecutionResult::is_agreed`] for
/// `total` votes: `ceil(2 * max(total, 1) / 3)`.
pub fn agreement_threshold(total: usize) -> usize {
    total.max(1).saturating_mul(2).div_ceil(3)
}

#[cfg(test)]
mod tests {
    use {super::*, test_case::test_case};

    fn result(agrees: usize, disagrees: usize) -> ExecutionResult {
        ExecutionResult {
            transaction_id: Uuid::new_v4(),
            origin: Pubkey::new_unique(),
            involvators: vec![],
            agrees,
            disagrees,
        }
    }

    #[test_case(2, 0, Outcome::Indeterminate ; "two agrees are too few")]
    #[test_case(2, 1, Outcome::Agreed ; "two of three agree")]
    #[test_case(1, 2, Outcome::Disagreed ; "one of three agrees")]
    #[test_case(0, 0, Outcome::Indeterminate ; "no votes")]
    #[test_case(3, 0, Outcome::Agreed ; "unanimous three")]
    #[test_case(2, 2, Outcome::Disagreed ; "even split")]
    #[test_case(4, 2, Outcome::Agreed ; "exactly two thirds of six")]
    #[test_case(4, 3, Outcome::Disagreed ; "four of seven")]
    #[test_case(5, 2, Outcome::Agreed ; "five of seven")]
    fn test_outcomes(agrees: usize, disagrees: usize, expected: Outcome) {
        assert_eq!(result(agrees, disagrees).outcome(), expected);
    }

    #[test]
    fn test_threshold_for_three_votes() {
        assert_eq!(agreement_threshold(3), 2);
        assert_eq!(agreement_threshold(0), 1);
    }

    #[test]
    fn test_float_formula_matches_integer_threshold() {
        for total in MIN_VALID_VOTES..=300 {
            let threshold = agreement_threshold(total);
            for agrees in 0..=total {
                let r = result(agrees, total.saturating_sub(agrees));
                assert!(r.is_valid());
                assert_eq!(
                    r.is_agreed(),
                    agrees >= threshold,
                    "agrees={agrees} total={total}"
                );
                assert_eq!(r.is_disagreed(), !r.is_agreed());
            }
        }
    }

    #[test]
    fn test_small_totals_are_invalid() {
        for agrees in 0..MIN_VALID_VOTES {
            assert!(!result(agrees, 0).is_valid());
        }
    }
}
