//! The node's shared state and the flows that tie mesh, agreement and
//! ledger together.
//!
//! ```text
//!   submit_transaction
//!          │
//!   open round (self + chain peers) ── tx.vote_request ──▶ peers
//!          │                                               │
//!   collect ◀──────────────────────── tx.vote ◀────────────┘
//!          │
//!   agreed? ── pack next block ── repository.put ── tracker.put
//!                                        │
//!                                 block.announce ──▶ peers
//! ```
//!
//! Joining nodes catch up by fetching blocks index by index once a chain
//! peer introduced itself, and fill gaps the same way when an announced
//! block does not link to their tip.

use {
    crate::{
        block_fetch::MeshBlockFetcher,
        config::NodeConfig,
        error::{NodeError, Result},
        feature::Feature,
        node_info::{NodeInformation, PeerDirectory, NODE_INFO_KIND},
        protocol::{VoteRequest, BLOCK_ANNOUNCE_KIND, TX_VOTE_KIND, TX_VOTE_REQUEST_KIND},
        verifier::TransactionVerifier,
    },
    chrono::{DateTime, Utc},
    log::{debug, info, trace, warn},
    meshledger_agreement::{AgreementEngine, ExecutionResult, Outcome, VoteMessage, VoteReceipt},
    meshledger_ledger::{
        block_repository::BlockFetcher,
        storage::MemoryBlockStore,
        Block, BlockHeader, BlockRepository, HistoryTracker, PutOutcome, Transaction,
        GENESIS_INDEX,
    },
    meshledger_net::{MeshMessenger, PeerInfo},
    solana_pubkey::Pubkey,
    std::sync::{Arc, OnceLock},
    tokio_util::sync::CancellationToken,
    uuid::Uuid,
};

/// What happened to a submitted transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionReport {
    pub result: ExecutionResult,
    /// Header of the block that carries the transaction, when agreed.
    pub block: Option<BlockHeader>,
}

impl TransactionReport {
    pub fn outcome(&self) -> Outcome {
        self.result.outcome()
    }

    /// HTTP-style status code an API layer would answer with.
    pub fn status_code(&self) -> u16 {
        match self.outcome() {
            Outcome::Agreed => 202,
            Outcome::Disagreed => 409,
            Outcome::Indeterminate => 204,
        }
    }
}

/// State shared by every handler and background task of one node.
pub struct NodeServices {
    config: NodeConfig,
    epoch: DateTime<Utc>,
    repository: BlockRepository,
    tracker: Arc<HistoryTracker>,
    engine: AgreementEngine,
    directory: Arc<PeerDirectory>,
    fetcher: Arc<MeshBlockFetcher>,
    verifier: Arc<dyn TransactionVerifier>,
    /// Serialises block production so two agreed transactions never race
    /// for the same index.
    commit_lock: tokio::sync::Mutex<()>,
    sync_lock: tokio::sync::Mutex<()>,
    cancel: CancellationToken,
}

impl NodeServices {
    pub fn new(
        config: NodeConfig,
        verifier: Arc<dyn TransactionVerifier>,
        mesh: Arc<OnceLock<MeshMessenger>>,
        cancel: CancellationToken,
    ) -> Result<Self> {
        let directory = Arc::new(PeerDirectory::new());
        let fetcher = Arc::new(MeshBlockFetcher::new(
            mesh,
            Arc::clone(&directory),
            config.chain_id,
            config.ledger.fetch_timeout(),
        ));
        let repository = BlockRepository::new(
            Arc::new(MemoryBlockStore::new()),
            Arc::clone(&fetcher) as Arc<dyn BlockFetcher>,
        )
        .with_fetch_cache_capacity(config.ledger.fetch_cache_capacity);
        let engine = AgreementEngine::new(config.agreement_config())?;

        Ok(Self {
            config,
            epoch: Utc::now(),
            repository,
            tracker: Arc::new(HistoryTracker::new()),
            engine,
            directory,
            fetcher,
            verifier,
            commit_lock: tokio::sync::Mutex::new(()),
            sync_lock: tokio::sync::Mutex::new(()),
            cancel,
        })
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    pub fn has_feature(&self, feature: Feature) -> bool {
        self.config.has_feature(feature)
    }

    pub fn repository(&self) -> &BlockRepository {
        &self.repository
    }

    pub fn tracker(&self) -> &Arc<HistoryTracker> {
        &self.tracker
    }

    pub fn engine(&self) -> &AgreementEngine {
        &self.engine
    }

    pub fn directory(&self) -> &Arc<PeerDirectory> {
        &self.directory
    }

    /// Block `index` from our chain or, failing that, from a chain peer.
    pub async fn block(&self, index: u64) -> Result<Block> {
        self.repository
            .get(index, &self.cancel)
            .await?
            .ok_or(NodeError::BlockNotFound(index))
    }

    /// The announcement this node sends to each new peer.
    pub fn information(&self, pubkey: Pubkey) -> NodeInformation {
        NodeInformation {
            epoch: self.epoch,
            chain_id: self.config.chain_id,
            initial_block_id: self
                .repository
                .get_local(GENESIS_INDEX)
                .map(|block| block.id())
                .unwrap_or_else(Uuid::nil),
            node_login: self.config.login.clone(),
            node_pub_key: pubkey,
            node_mode: self.config.mode,
        }
    }

    /// Send our [`NodeInformation`] to `peer`.
    pub async fn introduce(&self, mesh: &MeshMessenger, peer: &Pubkey) -> Result<()> {
        let message = mesh.encode(NODE_INFO_KIND, &self.information(mesh.local().pubkey))?;
        mesh.send_to(peer, &message).await?;
        Ok(())
    }

    /// Create the chain. Only a genesis-mode node may do this, and only
    /// while its repository is empty.
    pub fn create_genesis(&self) -> Result<Block> {
        if !self.config.mode.may_emit_genesis() {
            return Err(NodeError::Permission(format!(
                "a {} node may not emit the genesis block",
                self.config.mode
            )));
        }
        let genesis = Block::genesis(Vec::new());
        self.apply(genesis.clone())?;
        info!("created genesis block {} for chain {}", genesis.id(), self.config.chain_id);
        Ok(genesis)
    }

    /// Put `block` into the repository and, when accepted, into the
    /// history tracker.
    fn apply(&self, block: Block) -> Result<()> {
        let index = block.index();
        let outcome = self.repository.put(block.clone());
        if !outcome.is_accepted() {
            return Err(NodeError::BlockRefused { index, outcome });
        }
        if self.has_feature(Feature::Tracker) {
            let touched = self.tracker.put(&block);
            trace!("block {} touched {} cells", index, touched.len());
        }
        Ok(())
    }

    /// Run a vote round on `transaction` and commit it when agreed.
    ///
    /// The involvators are this node and every connected peer of our chain.
    /// A round that stays indeterminate or is disagreed leaves the chain
    /// untouched.
    pub async fn submit_transaction(
        &self,
        mesh: &MeshMessenger,
        transaction: Transaction,
        cancel: &CancellationToken,
    ) -> Result<TransactionReport> {
        let local = mesh.local().pubkey;
        let transaction_id = transaction.id();
        let peers: Vec<Pubkey> = self
            .directory
            .members(&self.config.chain_id)
            .into_iter()
            .filter(|pubkey| mesh.is_peer(pubkey))
            .collect();
        let request = mesh.encode(
            TX_VOTE_REQUEST_KIND,
            &VoteRequest {
                transaction: transaction.clone(),
            },
        )?;

        let mut involvators = Vec::with_capacity(peers.len().saturating_add(1));
        involvators.push(local);
        involvators.extend(peers.iter().copied());
        self.engine.open_round(transaction_id, local, involvators)?;

        self.engine.submit_vote(&VoteMessage {
            transaction_id,
            voter: local,
            vote: self.verifier.verify(&transaction),
        });
        for peer in &peers {
            if let Err(e) = mesh.send_to(peer, &request).await {
                debug!("vote request for {} to {} failed: {}", transaction_id, peer, e);
            }
        }

        let result = self.engine.collect(transaction_id, cancel).await?;
        info!(
            "transaction {}: {} ({} agree, {} disagree)",
            transaction_id,
            result.outcome(),
            result.agrees,
            result.disagrees
        );
        let block = match result.outcome() {
            Outcome::Agreed => Some(self.commit(mesh, transaction).await?),
            Outcome::Disagreed | Outcome::Indeterminate => None,
        };
        Ok(TransactionReport { result, block })
    }

    /// Pack `transaction` into the block after our tip and announce it.
    async fn commit(&self, mesh: &MeshMessenger, transaction: Transaction) -> Result<BlockHeader> {
        let _guard = self.commit_lock.lock().await;
        let block = match self.repository.last() {
            Some(tip) => Block::next(&tip, vec![transaction]),
            None if self.config.mode.may_emit_genesis() => Block::genesis(vec![transaction]),
            None => {
                return Err(NodeError::Permission(format!(
                    "a {} node without a chain may not emit the genesis block",
                    self.config.mode
                )))
            }
        };
        let header = block.header.clone();
        self.apply(block.clone())?;

        let announcement = mesh.encode(BLOCK_ANNOUNCE_KIND, &block)?;
        let delivered = mesh.emit(&announcement).await;
        info!("committed block {} ({}), announced to {} peers", header.index, header.id, delivered);
        Ok(header)
    }

    /// Judge a transaction for its origin and send our vote back.
    pub async fn on_vote_request(
        &self,
        mesh: &MeshMessenger,
        sender: &PeerInfo,
        request: VoteRequest,
    ) -> Result<()> {
        if !self.directory.is_member(&sender.pubkey, &self.config.chain_id) {
            return Err(NodeError::Permission(format!(
                "{} is not a member of chain {}",
                sender.pubkey, self.config.chain_id
            )));
        }
        let vote = VoteMessage {
            transaction_id: request.transaction.id(),
            voter: mesh.local().pubkey,
            vote: self.verifier.verify(&request.transaction),
        };
        debug!("voting {:?} on {} for {}", vote.vote, vote.transaction_id, sender);
        let message = mesh.encode(TX_VOTE_KIND, &vote)?;
        mesh.send_to(&sender.pubkey, &message).await?;
        Ok(())
    }

    /// Count a vote received from `sender`.
    pub fn on_vote(&self, sender: &PeerInfo, vote: &VoteMessage) -> Result<VoteReceipt> {
        if vote.voter != sender.pubkey {
            return Err(NodeError::Permission(format!(
                "{} sent a vote on behalf of {}",
                sender.pubkey, vote.voter
            )));
        }
        let receipt = self.engine.submit_vote(vote);
        trace!("vote from {} on {}: {:?}", sender, vote.transaction_id, receipt);
        Ok(receipt)
    }

    /// Record a peer's announcement and start catching up from it.
    ///
    /// Peers on another chain are disconnected unless this node runs in
    /// multi mode, in which case they stay connected but are never asked
    /// for blocks or votes.
    pub fn on_node_information(
        self: &Arc<Self>,
        mesh: &MeshMessenger,
        sender: &PeerInfo,
        information: NodeInformation,
    ) -> Result<()> {
        if information.node_pub_key != sender.pubkey {
            return Err(NodeError::Permission(format!(
                "{} announced itself as {}",
                sender.pubkey, information.node_pub_key
            )));
        }

        if information.chain_id != self.config.chain_id && !self.config.mode.keeps_foreign_peers() {
            warn!(
                "dropping {}: chain {} differs from ours",
                sender, information.chain_id
            );
            mesh.disconnect(&sender.pubkey);
            return Err(NodeError::ChainMismatch {
                peer: sender.pubkey,
                chain_id: information.chain_id,
            });
        }

        let ours = self.information(mesh.local().pubkey);
        if information.chain_id == ours.chain_id
            && information.has_genesis()
            && ours.has_genesis()
            && information.initial_block_id != ours.initial_block_id
        {
            warn!(
                "dropping {}: genesis {} differs from ours",
                sender, information.initial_block_id
            );
            mesh.disconnect(&sender.pubkey);
            return Err(NodeError::ChainMismatch {
                peer: sender.pubkey,
                chain_id: information.chain_id,
            });
        }

        info!(
            "{} is '{}' ({} node, chain {})",
            sender, information.node_login, information.node_mode, information.chain_id
        );
        let same_chain = information.chain_id == self.config.chain_id;
        let genesis_id = information.initial_block_id;
        self.directory.insert(information);
        let catch_up = same_chain
            && !genesis_id.is_nil()
            && (self.repository.last().is_some()
                || self
                    .directory
                    .vouches_for_genesis(&self.config.chain_id, &genesis_id));

        if catch_up && self.has_feature(Feature::Storage) {
            self.spawn_synchronize(mesh.clone());
        }
        Ok(())
    }

    /// Handle a block gossiped by `sender`.
    pub async fn on_block_announced(
        self: &Arc<Self>,
        mesh: &MeshMessenger,
        sender: &PeerInfo,
        block: Block,
    ) -> Result<()> {
        if !self.directory.is_member(&sender.pubkey, &self.config.chain_id) {
            trace!("ignoring block {} from non-member {}", block.index(), sender);
            return Ok(());
        }
        if block.is_genesis() && !self.is_trusted_genesis(sender, &block) {
            return Err(NodeError::Permission(format!(
                "{} announced genesis {} without a genesis node vouching for it",
                sender,
                block.id()
            )));
        }

        let index = block.index();
        let announcement = mesh.encode(BLOCK_ANNOUNCE_KIND, &block)?;
        match self.apply(block) {
            Ok(()) => {
                debug!("accepted block {} from {}", index, sender);
                mesh.emit_except(&announcement, Some(&sender.pubkey)).await;
                Ok(())
            }
            Err(NodeError::BlockRefused {
                outcome: PutOutcome::Conflict,
                ..
            }) => {
                trace!("already hold block {}", index);
                Ok(())
            }
            Err(NodeError::BlockRefused { outcome, .. })
                if index > self.repository.state().next_index() =>
            {
                debug!("block {} is ahead of our tip ({}), catching up", index, outcome);
                self.spawn_synchronize(mesh.clone());
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    fn is_trusted_genesis(&self, sender: &PeerInfo, block: &Block) -> bool {
        let sender_is_genesis = self
            .directory
            .get(&sender.pubkey)
            .is_some_and(|info| info.node_mode.may_emit_genesis());
        sender_is_genesis
            || self
                .directory
                .vouches_for_genesis(&self.config.chain_id, &block.id())
    }

    fn spawn_synchronize(self: &Arc<Self>, mesh: MeshMessenger) {
        let services = Arc::clone(self);
        tokio::spawn(async move {
            match services.synchronize(&mesh).await {
                Ok(0) => {}
                Ok(applied) => info!("caught up {} blocks", applied),
                Err(e) => warn!("catch-up failed: {}", e),
            }
        });
    }

    /// Fetch and apply blocks after our tip until no peer has the next one.
    ///
    /// Returns how many blocks were applied. Concurrent catch-ups run one
    /// after another.
    pub async fn synchronize(&self, mesh: &MeshMessenger) -> Result<usize> {
        let _guard = self.sync_lock.lock().await;
        let mut applied = 0usize;

        if self.repository.last().is_none() {
            let Some(genesis) = self.fetcher.fetch(GENESIS_INDEX, &self.cancel).await? else {
                return Ok(0);
            };
            if !self
                .directory
                .vouches_for_genesis(&self.config.chain_id, &genesis.id())
            {
                return Err(NodeError::Permission(format!(
                    "fetched genesis {} is not vouched for by a genesis node",
                    genesis.id()
                )));
            }
            self.apply(genesis)?;
            applied = applied.saturating_add(1);
        }

        loop {
            let next = self.repository.state().next_index();
            let Some(block) = self.repository.get(next, &self.cancel).await? else {
                break;
            };
            match self.apply(block) {
                Ok(()) => applied = applied.saturating_add(1),
                Err(NodeError::BlockRefused {
                    outcome: PutOutcome::Conflict,
                    ..
                }) => continue,
                Err(e) => {
                    debug!("stopping catch-up at block {}: {}", next, e);
                    break;
                }
            }
        }
        if applied > 0 {
            debug!("{} now at block {}", mesh.local(), self.repository.state().next_index());
        }
        Ok(applied)
    }
}
