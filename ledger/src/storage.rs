//! Storage boundary.
//!
//! Durable backends live outside this crate; the repository and tracker
//! only need these two traits. In-memory implementations back tests and
//! single-process nodes.

use {
    crate::types::{Block, BlockHeader},
    parking_lot::RwLock,
    std::collections::{BTreeMap, HashMap},
    uuid::Uuid,
};

/// Opaque byte-keyed table.
pub trait KeyValueTable: Send + Sync {
    fn get(&self, key: &[u8]) -> Option<Vec<u8>>;
    /// Store `value` under `key`. Returns `false` if the backend refused.
    fn set(&self, key: &[u8], value: Vec<u8>) -> bool;
}

#[derive(Debug, Default)]
pub struct MemoryTable {
    entries: RwLock<HashMap<Vec<u8>, Vec<u8>>>,
}

impl MemoryTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl KeyValueTable for MemoryTable {
    fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        self.entries.read().get(key).cloned()
    }

    fn set(&self, key: &[u8], value: Vec<u8>) -> bool {
        self.entries.write().insert(key.to_vec(), value);
        true
    }
}

/// Persistence for accepted blocks. Ordering rules are enforced by the
/// repository, not the store.
pub trait BlockStore: Send + Sync {
    fn get(&self, index: u64) -> Option<Block>;
    fn get_by_id(&self, id: &Uuid) -> Option<Block>;
    /// Insert `block`. Returns `false` if its index is already occupied.
    fn insert(&self, block: Block) -> bool;
    /// Header of the highest-indexed block.
    fn last(&self) -> Option<BlockHeader>;
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Default)]
struct Blocks {
    by_index: BTreeMap<u64, Block>,
    by_id: HashMap<Uuid, u64>,
}

#[derive(Debug, Default)]
pub struct MemoryBlockStore {
    blocks: RwLock<Blocks>,
}

impl MemoryBlockStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl BlockStore for MemoryBlockStore {
    fn get(&self, index: u64) -> Option<Block> {
        self.blocks.read().by_index.get(&index).cloned()
    }

    fn get_by_id(&self, id: &Uuid) -> Option<Block> {
        let blocks = self.blocks.read();
        let index = blocks.by_id.get(id)?;
        blocks.by_index.get(index).cloned()
    }

    fn insert(&self, block: Block) -> bool {
        let mut blocks = self.blocks.write();
        if blocks.by_index.contains_key(&block.header.index) {
            return false;
        }
        blocks.by_id.insert(block.header.id, block.header.index);
        blocks.by_index.insert(block.header.index, block);
        true
    }

    fn last(&self) -> Option<BlockHeader> {
        self.blocks
            .read()
            .by_index
            .last_key_value()
            .map(|(_, block)| block.header.clone())
    }

    fn len(&self) -> usize {
        self.blocks.read().by_index.len()
    }
}
