//! Node information exchanged once per peer and the directory that keeps it.

use {
    chrono::{DateTime, Utc},
    parking_lot::RwLock,
    serde::{Deserialize, Serialize},
    solana_pubkey::Pubkey,
    std::{collections::HashMap, fmt},
    uuid::Uuid,
};

/// Message kind of a [`NodeInformation`] announcement.
pub const NODE_INFO_KIND: &str = "node.info";

/// How a node takes part in its chain.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeMode {
    /// Joins an existing chain.
    #[default]
    Plain,
    /// Creates the chain: the only mode allowed to emit a genesis block.
    Genesis,
    /// Keeps links to nodes of other chains open so they can route through
    /// it, but only stores and votes on its own chain.
    Multi,
}

impl NodeMode {
    pub fn may_emit_genesis(self) -> bool {
        matches!(self, Self::Genesis)
    }

    pub fn keeps_foreign_peers(self) -> bool {
        matches!(self, Self::Multi)
    }
}

impl fmt::Display for NodeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Plain => "plain",
            Self::Genesis => "genesis",
            Self::Multi => "multi",
        };
        f.write_str(name)
    }
}

/// What a node tells each new peer about itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeInformation {
    /// When the node process started.
    pub epoch: DateTime<Utc>,
    pub chain_id: Uuid,
    /// Id of the genesis block the node holds, nil before it has one.
    pub initial_block_id: Uuid,
    pub node_login: String,
    pub node_pub_key: Pubkey,
    pub node_mode: NodeMode,
}

impl NodeInformation {
    pub fn has_genesis(&self) -> bool {
        !self.initial_block_id.is_nil()
    }
}

/// Information received from connected peers, keyed by identity.
#[derive(Debug, Default)]
pub struct PeerDirectory {
    entries: RwLock<HashMap<Pubkey, NodeInformation>>,
}

impl PeerDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `info`, returning the previous entry for the same node.
    pub fn insert(&self, info: NodeInformation) -> Option<NodeInformation> {
        self.entries.write().insert(info.node_pub_key, info)
    }

    pub fn remove(&self, pubkey: &Pubkey) -> Option<NodeInformation> {
        self.entries.write().remove(pubkey)
    }

    pub fn get(&self, pubkey: &Pubkey) -> Option<NodeInformation> {
        self.entries.read().get(pubkey).cloned()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Whether `pubkey` announced itself as a member of `chain_id`.
    pub fn is_member(&self, pubkey: &Pubkey, chain_id: &Uuid) -> bool {
        self.entries
            .read()
            .get(pubkey)
            .is_some_and(|info| info.chain_id == *chain_id)
    }

    /// Every known member of `chain_id`, sorted for stable iteration.
    pub fn members(&self, chain_id: &Uuid) -> Vec<Pubkey> {
        let mut members: Vec<Pubkey> = self
            .entries
            .read()
            .values()
            .filter(|info| info.chain_id == *chain_id)
            .map(|info| info.node_pub_key)
            .collect();
        members.sort_unstable();
        members
    }

    /// Whether a genesis-mode member of `chain_id` holds the genesis block
    /// `block_id`.
    pub fn vouches_for_genesis(&self, chain_id: &Uuid, block_id: &Uuid) -> bool {
        self.entries.read().values().any(|info| {
            info.chain_id == *chain_id
                && info.node_mode.may_emit_genesis()
                && info.initial_block_id == *block_id
        })
    }
}
