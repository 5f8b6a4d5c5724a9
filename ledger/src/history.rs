//! Versioned row/column history.
//!
//! Every cell write in an applied block becomes a [`HistoryColumn`]
//! version stamped with the writing transaction's timestamp, the block
//! index and the transaction id. Versions are keyed by their position in the
//! chain `(block index, transaction position, behaviour position)`, so the
//! current value of a cell is its highest-positioned version and applying
//! the same block twice rewrites identical versions.
//!
//! All state sits behind one `RwLock`; [`HistoryTracker::put`] applies a
//! whole block under the write lock.

use {
    crate::{
        storage::KeyValueTable,
        types::{Block, HistoryColumnKey},
    },
    chrono::{DateTime, Utc},
    log::{debug, warn},
    parking_lot::RwLock,
    serde::{Deserialize, Serialize},
    std::{
        collections::{BTreeMap, BTreeSet},
        fmt,
        ops::Bound,
        sync::Arc,
    },
    uuid::Uuid,
};

/// One version of one cell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryColumn {
    pub key: HistoryColumnKey,
    pub timestamp: DateTime<Utc>,
    pub block_index: u64,
    pub transaction_id: Uuid,
    pub value: Vec<u8>,
}

/// Current values of every column of a row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryRow {
    pub row: String,
    pub columns: BTreeMap<String, HistoryColumn>,
}

impl HistoryRow {
    pub fn get(&self, column: &str) -> Option<&HistoryColumn> {
        self.columns.get(column)
    }
}

/// Position of a write within the chain.
type Stamp = (u64, usize, usize);

#[derive(Debug, Default)]
struct Cells {
    versions: BTreeMap<HistoryColumnKey, BTreeMap<Stamp, HistoryColumn>>,
    last_block: Option<u64>,
}

impl Cells {
    fn current(&self, key: &HistoryColumnKey) -> Option<&HistoryColumn> {
        self.versions
            .get(key)
            .and_then(|versions| versions.last_key_value())
            .map(|(_, column)| column)
    }
}

pub struct HistoryTracker {
    cells: RwLock<Cells>,
    surface: Option<Arc<dyn KeyValueTable>>,
}

impl fmt::Debug for HistoryTracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let cells = self.cells.read();
        f.debug_struct("HistoryTracker")
            .field("cells", &cells.versions.len())
            .field("last_block", &cells.last_block)
            .field("surface", &self.surface.is_some())
            .finish()
    }
}

impl Default for HistoryTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl HistoryTracker {
    pub fn new() -> Self {
        Self {
            cells: RwLock::new(Cells::default()),
            surface: None,
        }
    }

    /// Also write current values through to `surface`, keyed `row/column`.
    pub fn with_surface(mut self, surface: Arc<dyn KeyValueTable>) -> Self {
        self.surface = Some(surface);
        self
    }

    /// Apply every cell write in `block`. Returns the distinct keys touched,
    /// in key order.
    pub fn put(&self, block: &Block) -> Vec<HistoryColumnKey> {
        let index = block.header.index;
        let mut touched = BTreeSet::new();
        let mut cells = self.cells.write();

        for (tx_pos, transaction) in block.transactions.iter().enumerate() {
            for (behaviour_pos, behaviour) in transaction.behaviours.iter().enumerate() {
                for (key, value) in &behaviour.changes {
                    let column = HistoryColumn {
                        key: key.clone(),
                        timestamp: transaction.header.timestamp,
                        block_index: index,
                        transaction_id: transaction.header.id,
                        value: value.clone(),
                    };
                    cells
                        .versions
                        .entry(key.clone())
                        .or_default()
                        .insert((index, tx_pos, behaviour_pos), column);
                    touched.insert(key.clone());
                }
            }
        }
        cells.last_block = cells.last_block.max(Some(index));

        if let Some(surface) = &self.surface {
            for key in &touched {
                let Some(current) = cells.current(key) else {
                    continue;
                };
                if !surface.set(&key.surface_key(), current.value.clone()) {
                    warn!("surface table refused {}", key);
                }
            }
        }

        debug!("block {} touched {} cells", index, touched.len());
        touched.into_iter().collect()
    }

    /// Current version of one cell.
    pub fn get_column(&self, key: &HistoryColumnKey) -> Option<HistoryColumn> {
        self.cells.read().current(key).cloned()
    }

    /// Current versions of every column in `row`.
    pub fn get_row(&self, row: &str) -> Option<HistoryRow> {
        let cells = self.cells.read();
        let start = HistoryColumnKey::new(row, "");
        let columns: BTreeMap<String, HistoryColumn> = cells
            .versions
            .range((Bound::Included(&start), Bound::Unbounded))
            .take_while(|(key, _)| key.row == row)
            .filter_map(|(key, versions)| {
                versions
                    .last_key_value()
                    .map(|(_, column)| (key.column.clone(), column.clone()))
            })
            .collect();
        if columns.is_empty() {
            return None;
        }
        Some(HistoryRow {
            row: row.to_string(),
            columns,
        })
    }

    /// Value of `key` as of the end of block `block_index`.
    pub fn get_column_at(&self, key: &HistoryColumnKey, block_index: u64) -> Option<HistoryColumn> {
        self.cells
            .read()
            .versions
            .get(key)?
            .range(..=(block_index, usize::MAX, usize::MAX))
            .next_back()
            .map(|(_, column)| column.clone())
    }

    /// Every version of `key`, oldest first.
    pub fn column_history(&self, key: &HistoryColumnKey) -> Vec<HistoryColumn> {
        self.cells
            .read()
            .versions
            .get(key)
            .map(|versions| versions.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Highest block index applied so far.
    pub fn last_block(&self) -> Option<u64> {
        self.cells.read().last_block
    }

    /// Number of distinct cells ever written.
    pub fn cell_count(&self) -> usize {
        self.cells.read().versions.len()
    }
}
