//! TTL-bounded flood discovery.
//!
//! A node announces itself with a [`DISCOVERY_KIND`](crate::message::DISCOVERY_KIND)
//! message whose TTL is the hop budget. Every receiver drops ids it has
//! already processed, dials the announced node if it is a stranger, and
//! forwards the announcement with `ttl - 1` to every neighbour except the
//! one it came from. A TTL of zero is contact-only; negative TTLs are
//! ignored outright.

use {
    crate::message::{DiscoveryAnnouncement, Message, PeerInfo},
    solana_pubkey::Pubkey,
    std::{
        collections::HashMap,
        time::{Duration, Instant},
    },
    uuid::Uuid,
};

/// Number of entries after which expired ids are swept.
const PRUNE_THRESHOLD: usize = 4_096;

/// Recently processed message ids.
#[derive(Debug)]
pub struct SeenCache {
    entries: HashMap<Uuid, Instant>,
    retention: Duration,
}

impl SeenCache {
    pub fn new(retention: Duration) -> Self {
        Self {
            entries: HashMap::new(),
            retention,
        }
    }

    /// Record `id`. Returns `false` if it was seen within the retention
    /// window.
    pub fn insert(&mut self, id: Uuid) -> bool {
        let now = Instant::now();
        if self.entries.len() >= PRUNE_THRESHOLD {
            self.prune(now);
        }
        match self.entries.get(&id) {
            Some(seen) if now.duration_since(*seen) < self.retention => false,
            _ => {
                self.entries.insert(id, now);
                true
            }
        }
    }

    pub fn contains(&self, id: &Uuid) -> bool {
        self.entries
            .get(id)
            .is_some_and(|seen| seen.elapsed() < self.retention)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn prune(&mut self, now: Instant) {
        let retention = self.retention;
        self.entries
            .retain(|_, seen| now.duration_since(*seen) < retention);
    }
}

/// What to do with a fresh discovery announcement.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct RelayPlan {
    /// Node to dial, if it is neither us nor an existing peer.
    pub contact: Option<PeerInfo>,
    /// Copy to forward to all neighbours except `exclude`.
    pub forward: Option<Message>,
    /// Neighbour the announcement arrived from.
    pub exclude: Option<Pubkey>,
}

/// Decide how to react to an announcement that passed de-duplication.
pub fn plan_relay(
    message: &Message,
    announcement: &DiscoveryAnnouncement,
    local: &PeerInfo,
    from: &Pubkey,
    is_peer: impl Fn(&Pubkey) -> bool,
) -> RelayPlan {
    if message.ttl < 0 {
        return RelayPlan::default();
    }
    let advertised = announcement.advertised;
    let contact = (advertised.pubkey != local.pubkey && !is_peer(&advertised.pubkey))
        .then_some(advertised);
    RelayPlan {
        contact,
        forward: message.relayed(*local),
        exclude: Some(*from),
    }
}
