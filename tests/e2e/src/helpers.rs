//! Shared utilities for the end-to-end scenarios.
//!
//! A [`TestNetwork`] is a set of nodes on one chain. The first node runs in
//! genesis mode and every later node seeds from the node before it, so the
//! full mesh only forms through discovery.

use {
    meshledger_agreement::Vote,
    meshledger_ledger::{Behaviour, HistoryColumnKey, Transaction},
    meshledger_node::{
        verifier::FixedVerifier, ChangeSetVerifier, Node, NodeConfig, NodeMode,
        TransactionVerifier,
    },
    solana_keypair::Keypair,
    std::{net::SocketAddr, sync::Arc, time::Duration},
    tokio_util::sync::CancellationToken,
    uuid::Uuid,
};

/// Upper bound for any convergence wait.
pub const SETTLE_TIMEOUT: Duration = Duration::from_secs(10);

pub fn init_logging() {
    meshledger_logger::setup_for_tests("info");
}

pub fn node_config(
    login: &str,
    mode: NodeMode,
    chain_id: Uuid,
    seeds: Vec<SocketAddr>,
) -> NodeConfig {
    let mut config = NodeConfig::dev_default();
    config.login = login.to_string();
    config.mode = mode;
    config.chain_id = chain_id;
    config.mesh.seeds = seeds;
    config
}

pub async fn start_node(config: NodeConfig, verifier: Arc<dyn TransactionVerifier>) -> Node {
    Node::start(config, Keypair::new(), verifier, CancellationToken::new())
        .await
        .unwrap()
}

/// A transaction writing `value` to `row/column`.
pub fn write(row: &str, column: &str, value: &str) -> Transaction {
    Transaction::new(vec![Behaviour::new("write").set(
        HistoryColumnKey::new(row, column),
        value.as_bytes().to_vec(),
    )])
}

/// Poll `condition` every 20ms until it holds or `timeout` passes.
pub async fn wait_until<F>(timeout: Duration, mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    tokio::time::timeout(timeout, async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .is_ok()
}

pub struct TestNetwork {
    pub chain_id: Uuid,
    pub nodes: Vec<Node>,
}

impl TestNetwork {
    /// Start `votes.len()` nodes; node `i` votes `votes[i]` on every
    /// transaction, `None` meaning the default verifier.
    pub async fn start(votes: &[Option<Vote>]) -> Self {
        let chain_id = Uuid::new_v4();
        let mut nodes: Vec<Node> = Vec::with_capacity(votes.len());
        for (i, vote) in votes.iter().enumerate() {
            let mode = if i == 0 { NodeMode::Genesis } else { NodeMode::Plain };
            let seeds = nodes
                .last()
                .map(|node| vec![node.local().addr])
                .unwrap_or_default();
            let verifier: Arc<dyn TransactionVerifier> = match vote {
                Some(vote) => Arc::new(FixedVerifier(*vote)),
                None => Arc::new(ChangeSetVerifier),
            };
            let config = node_config(&format!("node-{i}"), mode, chain_id, seeds);
            nodes.push(start_node(config, verifier).await);
        }
        let network = Self { chain_id, nodes };
        assert!(
            network.wait_for_full_mesh().await,
            "nodes did not discover each other"
        );
        network
    }

    /// Every node holds the node information of every other node.
    pub async fn wait_for_full_mesh(&self) -> bool {
        let others = self.nodes.len().saturating_sub(1);
        wait_until(SETTLE_TIMEOUT, || {
            self.nodes.iter().all(|node| {
                node.mesh().peer_count() == others
                    && node.services().directory().members(&self.chain_id).len() == others
            })
        })
        .await
    }

    /// Every node's chain holds `count` blocks.
    pub async fn wait_for_blocks(&self, count: usize) -> bool {
        wait_until(SETTLE_TIMEOUT, || {
            self.nodes
                .iter()
                .all(|node| node.services().repository().state().block_count == count)
        })
        .await
    }

    pub async fn shutdown(self) {
        for node in self.nodes {
            node.shutdown().await;
        }
    }
}
