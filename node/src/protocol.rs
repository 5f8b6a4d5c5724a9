//! Message kinds and payloads the node speaks on top of the mesh.

use {
    meshledger_ledger::{Block, Transaction},
    serde::{Deserialize, Serialize},
};

pub use crate::node_info::NODE_INFO_KIND;

/// Request for one block by index, answered with a [`BlockResponse`].
pub const BLOCK_GET_KIND: &str = "block.get";
/// A newly accepted [`Block`], gossiped to every peer.
pub const BLOCK_ANNOUNCE_KIND: &str = "block.announce";
/// A [`Transaction`] handed to an endpoint node for agreement.
pub const TX_SUBMIT_KIND: &str = "tx.submit";
/// Origin asks an involvator to judge a transaction.
pub const TX_VOTE_REQUEST_KIND: &str = "tx.vote_request";
/// An involvator's `VoteMessage`, sent back to the origin.
pub const TX_VOTE_KIND: &str = "tx.vote";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockRequest {
    pub index: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockResponse {
    /// `None` when the peer does not hold the block.
    pub block: Option<Block>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteRequest {
    pub transaction: Transaction,
}
