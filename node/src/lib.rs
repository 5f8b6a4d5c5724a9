//! Mesh Ledger node.
//!
//! Glues the mesh messenger, the agreement engine and the ledger into one
//! process:
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration |
//! | [`node`] | start-up, peer events, shutdown |
//! | [`service`] | transaction pipeline, block gossip and catch-up |
//! | [`handlers`] | one mesh handler per message kind |
//! | [`feature`] | optional roles and the handlers they register |
//! | [`node_info`] | per-peer node information |
//! | [`block_fetch`] | fetching missing blocks from peers |
//! | [`verifier`] | deciding how to vote |

pub mod block_fetch;
pub mod config;
pub mod error;
pub mod feature;
pub mod handlers;
pub mod identity;
pub mod node;
pub mod node_info;
pub mod protocol;
pub mod service;
pub mod verifier;

pub use {
    config::NodeConfig,
    error::{ErrorKind, NodeError},
    feature::Feature,
    node::Node,
    node_info::{NodeInformation, NodeMode},
    service::TransactionReport,
    verifier::{ChangeSetVerifier, TransactionVerifier},
};
