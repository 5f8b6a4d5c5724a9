//! Mesh message handlers, one per message kind.
//!
//! Handlers decode the payload and hand it to [`NodeServices`]. Node-level
//! failures are logged here; only payloads that fail to decode surface to
//! the messenger as errors.

use {
    crate::{
        node_info::NodeInformation,
        protocol::{BlockRequest, BlockResponse, VoteRequest},
        service::NodeServices,
    },
    async_trait::async_trait,
    log::{debug, warn},
    meshledger_agreement::VoteMessage,
    meshledger_ledger::{Block, Transaction},
    meshledger_net::{error::Result, Message, MeshMessenger, MessageHandler},
    std::sync::Arc,
    tokio_util::sync::CancellationToken,
};

/// `node.info`: remember the peer and catch up from it.
pub struct NodeInfoHandler {
    services: Arc<NodeServices>,
}

impl NodeInfoHandler {
    pub fn new(services: &Arc<NodeServices>) -> Self {
        Self {
            services: Arc::clone(services),
        }
    }
}

#[async_trait]
impl MessageHandler for NodeInfoHandler {
    async fn handle(&self, mesh: &MeshMessenger, message: &Message) -> Result<Option<Vec<u8>>> {
        let information: NodeInformation = message.decode(mesh.codec())?;
        if let Err(e) = self
            .services
            .on_node_information(mesh, &message.sender, information)
        {
            warn!("node information from {}: {}", message.sender, e);
        }
        Ok(None)
    }
}

/// `block.get`: serve a block from the local chain.
pub struct BlockGetHandler {
    services: Arc<NodeServices>,
}

impl BlockGetHandler {
    pub fn new(services: &Arc<NodeServices>) -> Self {
        Self {
            services: Arc::clone(services),
        }
    }
}

#[async_trait]
impl MessageHandler for BlockGetHandler {
    async fn handle(&self, mesh: &MeshMessenger, message: &Message) -> Result<Option<Vec<u8>>> {
        let BlockRequest { index } = message.decode(mesh.codec())?;
        let block = self.services.repository().get_local(index);
        debug!(
            "{} asked for block {}: {}",
            message.sender,
            index,
            if block.is_some() { "found" } else { "missing" }
        );
        mesh.codec()
            .encode_payload(&BlockResponse { block })
            .map(Some)
    }
}

/// `block.announce`: apply and relay a gossiped block.
pub struct BlockAnnounceHandler {
    services: Arc<NodeServices>,
}

impl BlockAnnounceHandler {
    pub fn new(services: &Arc<NodeServices>) -> Self {
        Self {
            services: Arc::clone(services),
        }
    }
}

#[async_trait]
impl MessageHandler for BlockAnnounceHandler {
    async fn handle(&self, mesh: &MeshMessenger, message: &Message) -> Result<Option<Vec<u8>>> {
        let block: Block = message.decode(mesh.codec())?;
        let index = block.index();
        if let Err(e) = self
            .services
            .on_block_announced(mesh, &message.sender, block)
            .await
        {
            warn!("block {} from {}: {}", index, message.sender, e);
        }
        Ok(None)
    }
}

/// `tx.submit`: run the agreement pipeline for a peer's transaction.
///
/// The round outlives the handler, so it runs on its own task.
pub struct TxSubmitHandler {
    services: Arc<NodeServices>,
    cancel: CancellationToken,
}

impl TxSubmitHandler {
    pub fn new(services: &Arc<NodeServices>, cancel: CancellationToken) -> Self {
        Self {
            services: Arc::clone(services),
            cancel,
        }
    }
}

#[async_trait]
impl MessageHandler for TxSubmitHandler {
    async fn handle(&self, mesh: &MeshMessenger, message: &Message) -> Result<Option<Vec<u8>>> {
        let transaction: Transaction = message.decode(mesh.codec())?;
        debug!("{} submitted transaction {}", message.sender, transaction.id());
        let services = Arc::clone(&self.services);
        let mesh = mesh.clone();
        let cancel = self.cancel.clone();
        tokio::spawn(async move {
            let id = transaction.id();
            if let Err(e) = services.submit_transaction(&mesh, transaction, &cancel).await {
                warn!("transaction {} failed: {}", id, e);
            }
        });
        Ok(None)
    }
}

/// `tx.vote_request`: judge a transaction and vote back to its origin.
pub struct VoteRequestHandler {
    services: Arc<NodeServices>,
}

impl VoteRequestHandler {
    pub fn new(services: &Arc<NodeServices>) -> Self {
        Self {
            services: Arc::clone(services),
        }
    }
}

#[async_trait]
impl MessageHandler for VoteRequestHandler {
    async fn handle(&self, mesh: &MeshMessenger, message: &Message) -> Result<Option<Vec<u8>>> {
        let request: VoteRequest = message.decode(mesh.codec())?;
        if let Err(e) = self
            .services
            .on_vote_request(mesh, &message.sender, request)
            .await
        {
            warn!("vote request from {}: {}", message.sender, e);
        }
        Ok(None)
    }
}

/// `tx.vote`: count a vote on a round we opened.
pub struct VoteHandler {
    services: Arc<NodeServices>,
}

impl VoteHandler {
    pub fn new(services: &Arc<NodeServices>) -> Self {
        Self {
            services: Arc::clone(services),
        }
    }
}

#[async_trait]
impl MessageHandler for VoteHandler {
    async fn handle(&self, mesh: &MeshMessenger, message: &Message) -> Result<Option<Vec<u8>>> {
        let vote: VoteMessage = message.decode(mesh.codec())?;
        if let Err(e) = self.services.on_vote(&message.sender, &vote) {
            warn!("vote from {}: {}", message.sender, e);
        }
        Ok(None)
    }
}
