//! Mesh Ledger chain storage.
//!
//! - [`block_repository`]: the accepted chain, ordered puts with
//!   HTTP-style outcomes, and retrieval of missing blocks from peers.
//! - [`history`]: row/column cell history with per-write provenance.
//! - [`storage`]: the key-value and block-store boundary.
//! - [`types`]: blocks, transactions, behaviours and cell keys.

pub mod block_repository;
pub mod error;
pub mod history;
pub mod storage;
pub mod types;

pub use {
    block_repository::{BlockFetcher, BlockRepository, PutOutcome},
    error::LedgerError,
    history::{HistoryColumn, HistoryRow, HistoryTracker},
    types::{Behaviour, Block, BlockHeader, HistoryColumnKey, Transaction, GENESIS_INDEX},
};
