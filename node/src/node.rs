//! A running node: messenger, services and the peer event loop.

use {
    crate::{
        config::NodeConfig,
        error::{NodeError, Result},
        feature::Feature,
        handlers::NodeInfoHandler,
        node_info::NODE_INFO_KIND,
        service::{NodeServices, TransactionReport},
        verifier::TransactionVerifier,
    },
    log::{debug, info, warn},
    meshledger_ledger::{Block, HistoryTracker, Transaction},
    meshledger_net::{MeshMessenger, PeerEvent, PeerInfo},
    parking_lot::Mutex,
    solana_keypair::Keypair,
    solana_pubkey::Pubkey,
    std::{
        collections::HashSet,
        sync::{Arc, OnceLock},
    },
    tokio::{sync::broadcast, task::JoinHandle},
    tokio_util::sync::CancellationToken,
};

/// Peers that already received our node information on their current link.
#[derive(Debug, Default)]
struct WelcomeSet {
    peers: Mutex<HashSet<Pubkey>>,
}

impl WelcomeSet {
    /// True the first time `pubkey` is seen since it last left.
    fn first_sight(&self, pubkey: &Pubkey) -> bool {
        self.peers.lock().insert(*pubkey)
    }

    fn forget(&self, pubkey: &Pubkey) {
        self.peers.lock().remove(pubkey);
    }

    /// Start over from `peers`, e.g. after missing events.
    fn reset(&self, peers: &[PeerInfo]) {
        *self.peers.lock() = peers.iter().map(|peer| peer.pubkey).collect();
    }
}

pub struct Node {
    mesh: MeshMessenger,
    services: Arc<NodeServices>,
    cancel: CancellationToken,
    peer_events: JoinHandle<()>,
}

impl Node {
    /// Start a node: create the chain when in genesis mode, bind the mesh,
    /// dial the configured seeds and begin exchanging node information.
    ///
    /// Cancelling `cancel` stops every task the node spawned.
    pub async fn start(
        config: NodeConfig,
        keypair: Keypair,
        verifier: Arc<dyn TransactionVerifier>,
        cancel: CancellationToken,
    ) -> Result<Self> {
        config.validate()?;
        let mesh_cell = Arc::new(OnceLock::new());
        let services = Arc::new(NodeServices::new(
            config.clone(),
            verifier,
            Arc::clone(&mesh_cell),
            cancel.clone(),
        )?);

        if config.mode.may_emit_genesis() && services.repository().last().is_none() {
            services.create_genesis()?;
        }

        let mut builder = MeshMessenger::builder(Arc::new(keypair), config.mesh_config())
            .handler(NODE_INFO_KIND, Arc::new(NodeInfoHandler::new(&services)));
        for feature in &config.features {
            builder = feature.install(builder, &services, &cancel);
        }
        let mesh = builder.start().await?;
        if mesh_cell.set(mesh.clone()).is_err() {
            warn!("mesh bound twice");
        }
        info!(
            "node '{}' ({} mode, chain {}) listening as {}",
            config.login,
            config.mode,
            config.chain_id,
            mesh.local()
        );

        // Subscribe before dialling so no seed's entry is missed.
        let events = mesh.subscribe();
        let welcomed = Arc::new(WelcomeSet::default());
        let peer_events = tokio::spawn(Self::run_peer_events(
            mesh.clone(),
            Arc::clone(&services),
            Arc::clone(&welcomed),
            events,
            cancel.clone(),
        ));

        for seed in &config.mesh.seeds {
            match mesh.contact(*seed).await {
                Ok(Some(peer)) => info!("joined seed {}", peer),
                Ok(None) => debug!("seed {} already connected", seed),
                Err(e) => warn!("seed {} unreachable: {}", seed, e),
            }
        }
        // Peers that connected between binding and subscribing.
        for peer in mesh.peers() {
            if welcomed.first_sight(&peer.pubkey) {
                Self::welcome(&mesh, &services, &peer).await;
            }
        }

        Ok(Self {
            mesh,
            services,
            cancel,
            peer_events,
        })
    }

    pub fn mesh(&self) -> &MeshMessenger {
        &self.mesh
    }

    pub fn local(&self) -> PeerInfo {
        self.mesh.local()
    }

    pub fn services(&self) -> &Arc<NodeServices> {
        &self.services
    }

    pub fn tracker(&self) -> &Arc<HistoryTracker> {
        self.services.tracker()
    }

    /// Block `index`, fetched from a chain peer when we do not hold it.
    pub async fn block(&self, index: u64) -> Result<Block> {
        self.services.block(index).await
    }

    /// Put `transaction` to a vote among our chain peers and commit it when
    /// agreed.
    pub async fn submit_transaction(&self, transaction: Transaction) -> Result<TransactionReport> {
        if !self.services.has_feature(Feature::Endpoint) {
            return Err(NodeError::Permission(
                "the endpoint feature is disabled".into(),
            ));
        }
        self.services
            .submit_transaction(&self.mesh, transaction, &self.cancel)
            .await
    }

    /// Stop all node tasks and close every link.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        self.mesh.shutdown();
        if let Err(e) = self.peer_events.await {
            warn!("peer event task ended abnormally: {}", e);
        }
        info!("node {} stopped", self.mesh.local());
    }

    async fn welcome(mesh: &MeshMessenger, services: &NodeServices, peer: &PeerInfo) {
        if let Err(e) = services.introduce(mesh, &peer.pubkey).await {
            debug!("could not introduce ourselves to {}: {}", peer, e);
        }
        if services.has_feature(Feature::Routing) {
            if let Err(e) = mesh.invite_peers().await {
                debug!("invite after {} entered failed: {}", peer, e);
            }
        }
    }

    async fn run_peer_events(
        mesh: MeshMessenger,
        services: Arc<NodeServices>,
        welcomed: Arc<WelcomeSet>,
        mut events: broadcast::Receiver<PeerEvent>,
        cancel: CancellationToken,
    ) {
        loop {
            let event = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                event = events.recv() => event,
            };
            match event {
                Ok(PeerEvent::Entered(peer)) => {
                    if welcomed.first_sight(&peer.pubkey) {
                        Self::welcome(&mesh, &services, &peer).await;
                    }
                }
                Ok(PeerEvent::Left(peer)) => {
                    welcomed.forget(&peer.pubkey);
                    if services.directory().remove(&peer.pubkey).is_some() {
                        debug!("forgot node information of {}", peer);
                    }
                }
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    warn!("missed {} peer events, re-introducing to all peers", missed);
                    let peers = mesh.peers();
                    welcomed.reset(&peers);
                    for peer in &peers {
                        Self::welcome(&mesh, &services, peer).await;
                    }
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
        debug!("peer event loop for {} exited", mesh.local());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_peer_is_welcomed_once_per_link() {
        let welcomed = WelcomeSet::default();
        let peer = Pubkey::new_unique();
        assert!(welcomed.first_sight(&peer));
        // The start-up pass and the entered event both see the seed.
        assert!(!welcomed.first_sight(&peer));

        welcomed.forget(&peer);
        assert!(welcomed.first_sight(&peer));
        assert!(welcomed.first_sight(&Pubkey::new_unique()));

        // After lost events only the current peers count as welcomed.
        let current = PeerInfo::new(Pubkey::new_unique(), "127.0.0.1:1".parse().unwrap());
        welcomed.reset(&[current]);
        assert!(!welcomed.first_sight(&current.pubkey));
        assert!(welcomed.first_sight(&peer));
    }
}
