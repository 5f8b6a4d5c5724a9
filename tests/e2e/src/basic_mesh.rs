//! E2E: mesh formation and node information exchange.
//!
//! - Three nodes seeded in a line discover each other through the mesh.
//! - Each node learns the others' logins, modes and genesis.
//! - A node on another chain is dropped after introducing itself.

use {
    meshledger_e2e_tests::helpers::*,
    meshledger_node::{ChangeSetVerifier, NodeMode},
    std::sync::Arc,
    uuid::Uuid,
};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_line_of_three_becomes_full_mesh() {
    init_logging();
    let network = TestNetwork::start(&[None, None, None]).await;

    let genesis = &network.nodes[0];
    let genesis_id = genesis
        .services()
        .information(genesis.local().pubkey)
        .initial_block_id;
    assert!(!genesis_id.is_nil());

    for node in &network.nodes[1..] {
        let info = node
            .services()
            .directory()
            .get(&genesis.local().pubkey)
            .expect("genesis node introduced itself");
        assert_eq!(info.node_login, "node-0");
        assert_eq!(info.node_mode, NodeMode::Genesis);
        assert_eq!(info.initial_block_id, genesis_id);
        assert_eq!(info.chain_id, network.chain_id);
    }

    // The last node only knew the middle one and still reaches the first.
    assert!(network.nodes[2]
        .mesh()
        .is_peer(&network.nodes[0].local().pubkey));
    println!("✓ three nodes formed a full mesh from a line of seeds");
    network.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_joiners_receive_genesis() {
    init_logging();
    let network = TestNetwork::start(&[None, None, None]).await;
    assert!(network.wait_for_blocks(1).await, "genesis did not spread");

    let genesis_id = network.nodes[0].services().repository().last().unwrap().id;
    for node in &network.nodes {
        assert_eq!(node.services().repository().last().unwrap().id, genesis_id);
    }
    println!("✓ every node holds genesis {genesis_id}");
    network.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_foreign_chain_is_dropped() {
    init_logging();
    let home = start_node(
        node_config("home", NodeMode::Genesis, Uuid::new_v4(), vec![]),
        Arc::new(ChangeSetVerifier),
    )
    .await;
    let stranger = start_node(
        node_config(
            "stranger",
            NodeMode::Plain,
            Uuid::new_v4(),
            vec![home.local().addr],
        ),
        Arc::new(ChangeSetVerifier),
    )
    .await;

    let dropped = wait_until(SETTLE_TIMEOUT, || {
        home.mesh().peer_count() == 0 && stranger.mesh().peer_count() == 0
    })
    .await;
    assert!(dropped, "nodes of different chains stayed connected");
    assert!(home.services().directory().is_empty());
    assert!(stranger.services().repository().last().is_none());
    println!("✓ chain mismatch closes the link");

    stranger.shutdown().await;
    home.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_multi_node_keeps_foreign_peer() {
    init_logging();
    let router = start_node(
        node_config("router", NodeMode::Multi, Uuid::new_v4(), vec![]),
        Arc::new(ChangeSetVerifier),
    )
    .await;
    let foreign_chain = Uuid::new_v4();
    let foreign = start_node(
        node_config(
            "foreign",
            NodeMode::Multi,
            foreign_chain,
            vec![router.local().addr],
        ),
        Arc::new(ChangeSetVerifier),
    )
    .await;

    let known = wait_until(SETTLE_TIMEOUT, || {
        router.services().directory().len() == 1 && foreign.services().directory().len() == 1
    })
    .await;
    assert!(known, "multi nodes did not exchange information");
    assert!(router.mesh().is_peer(&foreign.local().pubkey));
    assert!(router
        .services()
        .directory()
        .members(&foreign_chain)
        .contains(&foreign.local().pubkey));
    println!("✓ multi-mode nodes keep links across chains");

    foreign.shutdown().await;
    router.shutdown().await;
}
