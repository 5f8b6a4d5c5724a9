//! Block, transaction and cell types.
//!
//! A [`Block`] carries ordered [`Transaction`]s; each transaction carries
//! [`Behaviour`]s, and each behaviour maps [`HistoryColumnKey`]s to the new
//! value of that cell.

use {
    chrono::{DateTime, Utc},
    serde::{Deserialize, Serialize},
    std::{collections::BTreeMap, fmt},
    uuid::Uuid,
};

/// Index of the first block of every chain.
pub const GENESIS_INDEX: u64 = 0;

// ---------------------------------------------------------------------------
// Cells
// ---------------------------------------------------------------------------

/// Address of one ledger cell.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct HistoryColumnKey {
    pub row: String,
    pub column: String,
}

impl HistoryColumnKey {
    pub fn new(row: impl Into<String>, column: impl Into<String>) -> Self {
        Self {
            row: row.into(),
            column: column.into(),
        }
    }

    /// Key bytes for flat key-value tables: the row's length as a `u64`
    /// (little endian), the row, then the column. Distinct cells never
    /// share a key even when names contain `/`.
    pub fn surface_key(&self) -> Vec<u8> {
        let mut key = Vec::with_capacity(
            8usize
                .saturating_add(self.row.len())
                .saturating_add(self.column.len()),
        );
        key.extend_from_slice(&(self.row.len() as u64).to_le_bytes());
        key.extend_from_slice(self.row.as_bytes());
        key.extend_from_slice(self.column.as_bytes());
        key
    }
}

impl fmt::Display for HistoryColumnKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.row, self.column)
    }
}

/// A named set of cell writes produced by executing transaction logic.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Behaviour {
    pub name: String,
    pub changes: BTreeMap<HistoryColumnKey, Vec<u8>>,
}

impl Behaviour {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            changes: BTreeMap::new(),
        }
    }

    /// Builder-style cell write.
    pub fn set(mut self, key: HistoryColumnKey, value: impl Into<Vec<u8>>) -> Self {
        self.changes.insert(key, value.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Transactions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionHeader {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub header: TransactionHeader,
    pub behaviours: Vec<Behaviour>,
}

impl Transaction {
    /// A new transaction stamped now with a fresh id.
    pub fn new(behaviours: Vec<Behaviour>) -> Self {
        Self {
            header: TransactionHeader {
                id: Uuid::new_v4(),
                timestamp: Utc::now(),
            },
            behaviours,
        }
    }

    pub fn id(&self) -> Uuid {
        self.header.id
    }

    /// Whether any behaviour writes at least one cell.
    pub fn has_changes(&self) -> bool {
        self.behaviours.iter().any(|behaviour| !behaviour.is_empty())
    }
}

// ---------------------------------------------------------------------------
// Blocks
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    pub index: u64,
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    /// Id of the preceding block; nil for Genesis.
    pub previous_id: Uuid,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub header: BlockHeader,
    pub transactions: Vec<Transaction>,
}

impl Block {
    /// The first block of a chain.
    pub fn genesis(transactions: Vec<Transaction>) -> Self {
        Self {
            header: BlockHeader {
                index: GENESIS_INDEX,
                id: Uuid::new_v4(),
                timestamp: Utc::now(),
                previous_id: Uuid::nil(),
            },
            transactions,
        }
    }

    /// The block that follows `previous`.
    pub fn next(previous: &BlockHeader, transactions: Vec<Transaction>) -> Self {
        Self {
            header: BlockHeader {
                index: previous.index.saturating_add(1),
                id: Uuid::new_v4(),
                timestamp: Utc::now(),
                previous_id: previous.id,
            },
            transactions,
        }
    }

    pub fn index(&self) -> u64 {
        self.header.index
    }

    pub fn id(&self) -> Uuid {
        self.header.id
    }

    /// Index 0 with a nil predecessor.
    pub fn is_genesis(&self) -> bool {
        self.header.index == GENESIS_INDEX && self.header.previous_id.is_nil()
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        meshledger_net::codec::{ByteOrder, FrameCodec},
        test_case::test_case,
    };

    #[test]
    fn test_chain_links() {
        let genesis = Block::genesis(vec![]);
        assert!(genesis.is_genesis());
        let next = Block::next(&genesis.header, vec![]);
        assert_eq!(next.index(), 1);
        assert_eq!(next.header.previous_id, genesis.id());
        assert!(!next.is_genesis());
    }

    #[test]
    fn test_transaction_changes() {
        let empty = Transaction::new(vec![Behaviour::new("noop")]);
        assert!(!empty.has_changes());
        let write = Transaction::new(vec![
            Behaviour::new("deposit").set(HistoryColumnKey::new("row1", "balance"), "100")
        ]);
        assert!(write.has_changes());
        assert_ne!(empty.id(), write.id());
    }

    #[test]
    fn test_column_key_order_groups_rows() {
        let mut keys = vec![
            HistoryColumnKey::new("b", "a"),
            HistoryColumnKey::new("a", "z"),
            HistoryColumnKey::new("a", "b"),
        ];
        keys.sort();
        assert_eq!(keys[0], HistoryColumnKey::new("a", "b"));
        assert_eq!(keys[1], HistoryColumnKey::new("a", "z"));
        assert_eq!(keys[2].to_string(), "b/a");
    }

    #[test_case(ByteOrder::Little ; "little endian")]
    #[test_case(ByteOrder::Big ; "big endian")]
    fn test_block_survives_the_wire(order: ByteOrder) {
        let codec = FrameCodec::new(order, 1 << 20);
        let genesis = Block::genesis(vec![]);
        let block = Block::next(
            &genesis.header,
            vec![
                Transaction::new(vec![
                    Behaviour::new("deposit")
                        .set(HistoryColumnKey::new("row1", "balance"), "100")
                        .set(HistoryColumnKey::new("row1", "owner"), "alice"),
                    Behaviour::new("noop"),
                ]),
                Transaction::new(vec![Behaviour::new("withdraw")
                    .set(HistoryColumnKey::new("row2", "balance"), vec![0u8, 255, 7])]),
            ],
        );

        let bytes = codec.encode_payload(&block).unwrap();
        let decoded: Block = codec.decode_payload(&bytes).unwrap();
        assert_eq!(decoded, block);
        assert_eq!(decoded.transactions[0].behaviours.len(), 2);
        assert_eq!(decoded.header.previous_id, genesis.id());
    }
}
