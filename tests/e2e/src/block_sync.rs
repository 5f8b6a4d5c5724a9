//! E2E: catching up with the chain.
//!
//! - A node joining after blocks were committed fetches all of them and
//!   rebuilds the same history.
//! - A lone node asking for a block nobody has gets nothing back.

use {
    meshledger_e2e_tests::helpers::*,
    meshledger_ledger::HistoryColumnKey,
    assert_matches::assert_matches,
    meshledger_node::{ChangeSetVerifier, NodeError, NodeMode},
    std::sync::Arc,
    tokio_util::sync::CancellationToken,
    uuid::Uuid,
};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_late_joiner_catches_up() {
    init_logging();
    let mut network = TestNetwork::start(&[None, None, None]).await;
    assert!(network.wait_for_blocks(1).await);

    for value in ["10", "20", "30"] {
        let report = network.nodes[0]
            .submit_transaction(write("acct", "balance", value))
            .await
            .unwrap();
        assert!(report.block.is_some());
    }
    assert!(network.wait_for_blocks(4).await);
    println!("✓ three blocks committed before the late joiner starts");

    let late = start_node(
        node_config(
            "late",
            NodeMode::Plain,
            network.chain_id,
            vec![network.nodes[1].local().addr],
        ),
        Arc::new(ChangeSetVerifier),
    )
    .await;
    network.nodes.push(late);
    assert!(network.wait_for_full_mesh().await);
    assert!(network.wait_for_blocks(4).await, "late joiner did not catch up");

    let late = &network.nodes[3];
    let tip = network.nodes[0].services().repository().last().unwrap();
    assert_eq!(late.services().repository().last().unwrap(), tip);
    let column = late
        .tracker()
        .get_column(&HistoryColumnKey::new("acct", "balance"))
        .unwrap();
    assert_eq!(column.value, b"30".to_vec());
    assert_eq!(column.block_index, 3);
    assert_eq!(
        late.tracker()
            .column_history(&HistoryColumnKey::new("acct", "balance"))
            .len(),
        3
    );
    println!("✓ late joiner holds the same tip and history");
    network.shutdown().await;
}

#[tokio::test]
async fn test_missing_block_without_peers() {
    init_logging();
    let node = start_node(
        node_config("alone", NodeMode::Genesis, Uuid::new_v4(), vec![]),
        Arc::new(ChangeSetVerifier),
    )
    .await;

    let cancel = CancellationToken::new();
    let repository = node.services().repository();
    assert!(repository.get(0, &cancel).await.unwrap().is_some());
    assert!(repository.get(5, &cancel).await.unwrap().is_none());
    let err = node.block(5).await.unwrap_err();
    assert_matches!(err, NodeError::BlockNotFound(5));
    assert_eq!(err.status_code(), 404);
    println!("✓ unknown block without peers is not found");
    node.shutdown().await;
}
