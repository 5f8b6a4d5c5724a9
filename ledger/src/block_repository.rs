//! Block repository: the accepted chain plus on-demand retrieval from peers.
//!
//! Reads try the local store, then a cache of blocks previously fetched
//! from the mesh, then ask the [`BlockFetcher`]. Writes go through
//! [`BlockRepository::put`], which enforces chain order under one lock so
//! two concurrent puts can never both extend the same tip.

use {
    crate::{
        error::{LedgerError, Result},
        storage::BlockStore,
        types::{Block, BlockHeader, GENESIS_INDEX},
    },
    async_trait::async_trait,
    log::{debug, info, warn},
    parking_lot::Mutex,
    std::{collections::BTreeMap, fmt, sync::Arc},
    tokio_util::sync::CancellationToken,
    uuid::Uuid,
};

/// Default number of mesh-fetched blocks kept in memory.
pub const DEFAULT_FETCH_CACHE_CAPACITY: usize = 1_024;

/// Source of blocks this node does not hold, usually mesh peers.
#[async_trait]
pub trait BlockFetcher: Send + Sync {
    /// Ask peers for the block at `index`. `Ok(None)` when nobody has it.
    async fn fetch(&self, index: u64, cancel: &CancellationToken) -> Result<Option<Block>>;
}

/// Fetcher for nodes without peers.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoFetcher;

#[async_trait]
impl BlockFetcher for NoFetcher {
    async fn fetch(&self, _index: u64, _cancel: &CancellationToken) -> Result<Option<Block>> {
        Ok(None)
    }
}

/// Result of [`BlockRepository::put`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutOutcome {
    /// The block extends the chain.
    Accepted,
    /// A block already occupies this index or an earlier one.
    Conflict,
    /// The block does not link to the current tip.
    Rejected,
}

impl PutOutcome {
    /// HTTP-style status code for API layers.
    pub fn status_code(self) -> u16 {
        match self {
            Self::Accepted => 202,
            Self::Conflict => 409,
            Self::Rejected => 400,
        }
    }

    pub fn is_accepted(self) -> bool {
        self == Self::Accepted
    }
}

impl fmt::Display for PutOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Accepted => "accepted",
            Self::Conflict => "conflict",
            Self::Rejected => "rejected",
        };
        write!(f, "{} ({})", name, self.status_code())
    }
}

/// Summary of the accepted chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryState {
    pub last: Option<BlockHeader>,
    pub block_count: usize,
}

impl RepositoryState {
    /// Index the next accepted block must carry.
    pub fn next_index(&self) -> u64 {
        self.last
            .as_ref()
            .map_or(GENESIS_INDEX, |header| header.index.saturating_add(1))
    }
}

pub struct BlockRepository {
    store: Arc<dyn BlockStore>,
    fetcher: Arc<dyn BlockFetcher>,
    fetched: Mutex<BTreeMap<u64, Block>>,
    fetch_cache_capacity: usize,
    put_lock: Mutex<()>,
}

impl fmt::Debug for BlockRepository {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlockRepository")
            .field("blocks", &self.store.len())
            .field("fetched", &self.fetched.lock().len())
            .finish_non_exhaustive()
    }
}

impl BlockRepository {
    pub fn new(store: Arc<dyn BlockStore>, fetcher: Arc<dyn BlockFetcher>) -> Self {
        Self {
            store,
            fetcher,
            fetched: Mutex::new(BTreeMap::new()),
            fetch_cache_capacity: DEFAULT_FETCH_CACHE_CAPACITY,
            put_lock: Mutex::new(()),
        }
    }

    pub fn with_fetch_cache_capacity(mut self, capacity: usize) -> Self {
        self.fetch_cache_capacity = capacity;
        self
    }

    /// Block at `index`, asking peers when it is not held locally.
    ///
    /// Genesis is never fetched: a node that lacks it has not joined a
    /// chain yet.
    pub async fn get(&self, index: u64, cancel: &CancellationToken) -> Result<Option<Block>> {
        if cancel.is_cancelled() {
            return Err(LedgerError::Cancelled);
        }
        if let Some(block) = self.get_local(index) {
            return Ok(Some(block));
        }
        if index == GENESIS_INDEX {
            return Ok(None);
        }

        let fetched = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(LedgerError::Cancelled),
            fetched = self.fetcher.fetch(index, cancel) => fetched?,
        };
        match fetched {
            Some(block) if block.header.index == index => {
                debug!("fetched block {} ({}) from mesh", index, block.id());
                self.cache_fetched(block.clone());
                Ok(Some(block))
            }
            Some(block) => {
                warn!(
                    "peer answered request for block {} with block {}",
                    index,
                    block.index()
                );
                Ok(None)
            }
            None => Ok(None),
        }
    }

    /// Block at `index` if held locally, without asking peers.
    pub fn get_local(&self, index: u64) -> Option<Block> {
        self.store
            .get(index)
            .or_else(|| self.fetched.lock().get(&index).cloned())
    }

    pub fn get_by_id(&self, id: &Uuid) -> Option<Block> {
        self.store.get_by_id(id).or_else(|| {
            self.fetched
                .lock()
                .values()
                .find(|block| block.id() == *id)
                .cloned()
        })
    }

    /// Append `block` to the chain if it links to the current tip.
    pub fn put(&self, block: Block) -> PutOutcome {
        let _guard = self.put_lock.lock();
        let outcome = match self.store.last() {
            None if block.is_genesis() => PutOutcome::Accepted,
            None => PutOutcome::Rejected,
            Some(last) if block.header.index <= last.index => PutOutcome::Conflict,
            Some(last)
                if block.header.index == last.index.saturating_add(1)
                    && block.header.previous_id == last.id =>
            {
                PutOutcome::Accepted
            }
            Some(_) => PutOutcome::Rejected,
        };

        if !outcome.is_accepted() {
            debug!("put of block {} ({}): {}", block.index(), block.id(), outcome);
            return outcome;
        }
        let index = block.header.index;
        let id = block.header.id;
        if !self.store.insert(block) {
            return PutOutcome::Conflict;
        }
        self.fetched.lock().remove(&index);
        info!("accepted block {} ({})", index, id);
        PutOutcome::Accepted
    }

    pub fn last(&self) -> Option<BlockHeader> {
        self.store.last()
    }

    pub fn state(&self) -> RepositoryState {
        let _guard = self.put_lock.lock();
        RepositoryState {
            last: self.store.last(),
            block_count: self.store.len(),
        }
    }

    fn cache_fetched(&self, block: Block) {
        if self.fetch_cache_capacity == 0 {
            return;
        }
        let mut fetched = self.fetched.lock();
        fetched.insert(block.header.index, block);
        while fetched.len() > self.fetch_cache_capacity {
            fetched.pop_first();
        }
    }
}
