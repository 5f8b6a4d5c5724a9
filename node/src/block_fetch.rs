//! Fetching missing blocks from mesh peers.
//!
//! Used by the block repository whenever a block is neither stored locally
//! nor cached. Peers on our chain are asked one after another in random
//! order until one of them holds the block; a peer that times out or fails
//! is skipped, and there are no further retries.

use {
    crate::{
        node_info::PeerDirectory,
        protocol::{BlockRequest, BlockResponse, BLOCK_GET_KIND},
    },
    async_trait::async_trait,
    log::{debug, trace},
    meshledger_ledger::{
        block_repository::BlockFetcher,
        error::{LedgerError, Result},
        Block,
    },
    meshledger_net::{MeshError, MeshMessenger},
    rand::seq::SliceRandom,
    solana_pubkey::Pubkey,
    std::{
        sync::{Arc, OnceLock},
        time::Duration,
    },
    tokio_util::sync::CancellationToken,
    uuid::Uuid,
};

/// [`BlockFetcher`] that asks connected peers over `block.get`.
///
/// The messenger is bound after construction because the repository has to
/// exist before the messenger's handlers are registered.
pub struct MeshBlockFetcher {
    mesh: Arc<OnceLock<MeshMessenger>>,
    directory: Arc<PeerDirectory>,
    chain_id: Uuid,
    timeout: Duration,
}

impl MeshBlockFetcher {
    pub fn new(
        mesh: Arc<OnceLock<MeshMessenger>>,
        directory: Arc<PeerDirectory>,
        chain_id: Uuid,
        timeout: Duration,
    ) -> Self {
        Self {
            mesh,
            directory,
            chain_id,
            timeout,
        }
    }

    fn candidates(&self, mesh: &MeshMessenger) -> Vec<Pubkey> {
        let mut peers: Vec<Pubkey> = self
            .directory
            .members(&self.chain_id)
            .into_iter()
            .filter(|pubkey| mesh.is_peer(pubkey))
            .collect();
        peers.shuffle(&mut rand::rng());
        peers
    }

    async fn ask(
        &self,
        mesh: &MeshMessenger,
        peer: &Pubkey,
        index: u64,
        cancel: &CancellationToken,
    ) -> Result<Option<Block>> {
        let request = mesh.encode(BLOCK_GET_KIND, &BlockRequest { index })?;
        let reply = match mesh.request(peer, request, self.timeout, cancel).await {
            Ok(reply) => reply,
            Err(MeshError::Cancelled) => return Err(LedgerError::Cancelled),
            Err(e) => return Err(e.into()),
        };
        let BlockResponse { block } = reply.decode(mesh.codec())?;
        Ok(block)
    }
}

#[async_trait]
impl BlockFetcher for MeshBlockFetcher {
    async fn fetch(&self, index: u64, cancel: &CancellationToken) -> Result<Option<Block>> {
        let Some(mesh) = self.mesh.get() else {
            return Ok(None);
        };

        for peer in self.candidates(mesh) {
            match self.ask(mesh, &peer, index, cancel).await {
                Ok(Some(block)) => {
                    debug!("fetched block {} from {}", index, peer);
                    return Ok(Some(block));
                }
                Ok(None) => trace!("{} does not hold block {}", peer, index),
                Err(LedgerError::Cancelled) => return Err(LedgerError::Cancelled),
                Err(e) => debug!("asking {} for block {} failed: {}", peer, index, e),
            }
        }
        Ok(None)
    }
}
