//! E2E: transaction agreement across real nodes.
//!
//! - All three nodes agree: the transaction lands in block 1 everywhere.
//! - A later write to the same cell wins, with its own provenance.
//! - Two against one: disagreed, nothing committed.
//! - Two nodes only: too few votes, indeterminate.
//! - Votes sent under another node's identity are never counted.

use {
    meshledger_agreement::{Outcome, Vote, VoteMessage},
    meshledger_e2e_tests::helpers::*,
    meshledger_ledger::HistoryColumnKey,
    meshledger_net::{config::MeshConfig, MeshMessenger, PeerInfo},
    meshledger_node::{protocol::TX_VOTE_KIND, Node},
    solana_keypair::Keypair,
    std::{sync::Arc, time::Duration},
    tokio_util::sync::CancellationToken,
    uuid::Uuid,
};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_three_nodes_agree_and_commit() {
    init_logging();
    let network = TestNetwork::start(&[None, None, None]).await;
    assert!(network.wait_for_blocks(1).await);
    let origin = &network.nodes[0];
    let balance = HistoryColumnKey::new("row1", "balance");

    // Step 1: first write.
    let first = write("row1", "balance", "100");
    let report = origin.submit_transaction(first).await.unwrap();
    assert_eq!(report.outcome(), Outcome::Agreed);
    assert_eq!(report.status_code(), 202);
    assert_eq!((report.result.agrees, report.result.disagrees), (3, 0));
    let block = report.block.expect("agreed transaction is committed");
    assert_eq!(block.index, 1);
    assert!(network.wait_for_blocks(2).await, "block 1 did not spread");
    println!("✓ block 1 committed on every node");

    // Step 2: a later write to the same cell.
    let second = write("row1", "balance", "150");
    let second_id = second.id();
    let report = origin.submit_transaction(second).await.unwrap();
    assert_eq!(report.outcome(), Outcome::Agreed);
    assert!(network.wait_for_blocks(3).await, "block 2 did not spread");

    for node in &network.nodes {
        let column = node.tracker().get_column(&balance).unwrap();
        assert_eq!(column.value, b"150".to_vec());
        assert_eq!(column.block_index, 2);
        assert_eq!(column.transaction_id, second_id);
        assert_eq!(
            node.tracker().get_column_at(&balance, 1).unwrap().value,
            b"100".to_vec()
        );
    }
    println!("✓ latest write wins on every node, history kept");
    network.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_two_against_one_is_disagreed() {
    init_logging();
    let network =
        TestNetwork::start(&[None, Some(Vote::Disagree), Some(Vote::Disagree)]).await;
    assert!(network.wait_for_blocks(1).await);

    let report = network.nodes[0]
        .submit_transaction(write("row1", "balance", "100"))
        .await
        .unwrap();
    assert_eq!((report.result.agrees, report.result.disagrees), (1, 2));
    assert_eq!(report.outcome(), Outcome::Disagreed);
    assert_eq!(report.status_code(), 409);
    assert!(report.block.is_none());
    for node in &network.nodes {
        assert_eq!(node.services().repository().state().block_count, 1);
    }
    println!("✓ (1, 2) is valid and disagreed");
    network.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_two_for_one_against_is_agreed() {
    init_logging();
    let network = TestNetwork::start(&[None, None, Some(Vote::Disagree)]).await;
    assert!(network.wait_for_blocks(1).await);

    let report = network.nodes[0]
        .submit_transaction(write("row1", "balance", "100"))
        .await
        .unwrap();
    assert_eq!((report.result.agrees, report.result.disagrees), (2, 1));
    assert_eq!(report.outcome(), Outcome::Agreed);
    assert!(network.wait_for_blocks(2).await);
    println!("✓ (2, 1) reaches the threshold of 2");
    network.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_two_nodes_are_indeterminate() {
    init_logging();
    let network = TestNetwork::start(&[None, None]).await;
    assert!(network.wait_for_blocks(1).await);

    let report = network.nodes[1]
        .submit_transaction(write("row1", "balance", "100"))
        .await
        .unwrap();
    assert_eq!((report.result.agrees, report.result.disagrees), (2, 0));
    assert!(!report.result.is_valid());
    assert_eq!(report.outcome(), Outcome::Indeterminate);
    assert_eq!(report.status_code(), 204);
    assert!(report.block.is_none());
    println!("✓ (2, 0) is not a valid round");
    network.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_votes_under_borrowed_identities_are_not_counted() {
    init_logging();
    let network = TestNetwork::start(&[None, None, None]).await;
    let origin = &network.nodes[0];
    let others: Vec<PeerInfo> = network.nodes[1..].iter().map(Node::local).collect();

    let intruder = MeshMessenger::builder(Arc::new(Keypair::new()), MeshConfig::dev_default())
        .start()
        .await
        .unwrap();
    intruder.contact(origin.local().addr).await.unwrap();

    // Nobody is asked to vote on this round, so only the intruder's votes
    // could fill it.
    let transaction_id = Uuid::new_v4();
    let involvators = vec![origin.local().pubkey, others[0].pubkey, others[1].pubkey];
    origin
        .services()
        .engine()
        .open_round(transaction_id, origin.local().pubkey, involvators)
        .unwrap();

    // Step 1: envelopes claiming to come from each involvator.
    for claimed in [others[0], others[1], origin.local()] {
        let vote = VoteMessage {
            transaction_id,
            voter: claimed.pubkey,
            vote: Vote::Agree,
        };
        let mut message = intruder.encode(TX_VOTE_KIND, &vote).unwrap();
        message.sender = claimed;
        intruder
            .send_to(&origin.local().pubkey, &message)
            .await
            .unwrap();
    }
    // Step 2: an honest envelope carrying someone else's vote.
    let vote = VoteMessage {
        transaction_id,
        voter: others[0].pubkey,
        vote: Vote::Agree,
    };
    let message = intruder.encode(TX_VOTE_KIND, &vote).unwrap();
    intruder
        .send_to(&origin.local().pubkey, &message)
        .await
        .unwrap();

    let result = origin
        .services()
        .engine()
        .collect_within(
            transaction_id,
            Duration::from_millis(500),
            &CancellationToken::new(),
        )
        .await
        .unwrap();
    assert_eq!((result.agrees, result.disagrees), (0, 0));
    assert_eq!(result.outcome(), Outcome::Indeterminate);
    println!("✓ borrowed identities cast no votes");

    intruder.shutdown();
    network.shutdown().await;
}
