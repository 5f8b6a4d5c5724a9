//! Active peer table.
//!
//! The [`PeerManager`] is the single source of truth for "who are we
//! talking to?". It is keyed by public key, so a second link to an already
//! connected identity is refused here. The messenger keeps it behind a lock
//! and stores its per-link handle in each entry.

use {
    crate::{
        error::{MeshError, Result},
        message::PeerInfo,
    },
    log::{debug, info},
    solana_pubkey::Pubkey,
    std::{collections::HashMap, time::Instant},
};

/// Per-peer bookkeeping.
#[derive(Debug, Clone)]
pub struct PeerStats {
    /// When the link became `Ready`.
    pub connected_at: Instant,
    /// Time of the last message received from this peer.
    pub last_seen: Instant,
    /// Messages we have sent *to* this peer.
    pub messages_sent: u64,
    /// Messages we have received *from* this peer.
    pub messages_received: u64,
    /// Exponentially-weighted moving average of request round trips (ms).
    pub latency_ms: f64,
}

impl PeerStats {
    fn new() -> Self {
        let now = Instant::now();
        Self {
            connected_at: now,
            last_seen: now,
            messages_sent: 0,
            messages_received: 0,
            latency_ms: 0.0,
        }
    }

    pub fn record_received(&mut self) {
        self.messages_received = self.messages_received.saturating_add(1);
        self.last_seen = Instant::now();
    }

    pub fn record_sent(&mut self) {
        self.messages_sent = self.messages_sent.saturating_add(1);
    }

    /// Update the EWMA latency with a new sample.
    pub fn update_latency(&mut self, sample_ms: f64) {
        const ALPHA: f64 = 0.3;
        if self.latency_ms == 0.0 {
            self.latency_ms = sample_ms;
        } else {
            self.latency_ms = ALPHA * sample_ms + (1.0 - ALPHA) * self.latency_ms;
        }
    }
}

/// A connected peer plus whatever handle its owner attaches.
#[derive(Debug)]
pub struct PeerEntry<H> {
    pub info: PeerInfo,
    pub stats: PeerStats,
    pub handle: H,
}

/// Table of connected peers, bounded by `max_peers`.
#[derive(Debug)]
pub struct PeerManager<H> {
    peers: HashMap<Pubkey, PeerEntry<H>>,
    max_peers: usize,
}

impl<H> PeerManager<H> {
    pub fn new(max_peers: usize) -> Self {
        Self {
            peers: HashMap::new(),
            max_peers,
        }
    }

    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }

    pub fn contains(&self, pubkey: &Pubkey) -> bool {
        self.peers.contains_key(pubkey)
    }

    /// Whether some peer advertises `addr`.
    pub fn contains_addr(&self, addr: &std::net::SocketAddr) -> bool {
        self.peers.values().any(|entry| entry.info.addr == *addr)
    }

    /// Insert a newly authenticated peer.
    pub fn add_peer(&mut self, info: PeerInfo, handle: H) -> Result<()> {
        if self.peers.contains_key(&info.pubkey) {
            debug!("peer {} already present", info.pubkey);
            return Err(MeshError::PeerAlreadyConnected(info.pubkey));
        }
        if self.peers.len() >= self.max_peers {
            return Err(MeshError::MaxPeersReached(self.max_peers));
        }
        info!("adding peer {}", info);
        self.peers.insert(
            info.pubkey,
            PeerEntry {
                info,
                stats: PeerStats::new(),
                handle,
            },
        );
        Ok(())
    }

    /// Swap the handle of a connected peer for a newer link's, returning the
    /// old one. Stats restart with the new link.
    pub fn replace_peer(&mut self, info: PeerInfo, handle: H) -> Option<H> {
        let entry = self.peers.get_mut(&info.pubkey)?;
        info!("replacing link to {}", info);
        entry.info = info;
        entry.stats = PeerStats::new();
        Some(std::mem::replace(&mut entry.handle, handle))
    }

    /// Remove a peer, but only if `matches` accepts the stored handle.
    ///
    /// Lets a link tear down its own entry without racing a newer link that
    /// replaced it.
    pub fn remove_peer_if(
        &mut self,
        pubkey: &Pubkey,
        matches: impl FnOnce(&H) -> bool,
    ) -> Option<PeerEntry<H>> {
        if !self.peers.get(pubkey).is_some_and(|entry| matches(&entry.handle)) {
            return None;
        }
        let removed = self.peers.remove(pubkey);
        if removed.is_some() {
            info!("removed peer {}", pubkey);
        }
        removed
    }

    pub fn remove_peer(&mut self, pubkey: &Pubkey) -> Option<PeerEntry<H>> {
        self.remove_peer_if(pubkey, |_| true)
    }

    pub fn get(&self, pubkey: &Pubkey) -> Option<&PeerEntry<H>> {
        self.peers.get(pubkey)
    }

    pub fn get_mut(&mut self, pubkey: &Pubkey) -> Option<&mut PeerEntry<H>> {
        self.peers.get_mut(pubkey)
    }

    pub fn record_received(&mut self, pubkey: &Pubkey) {
        if let Some(entry) = self.peers.get_mut(pubkey) {
            entry.stats.record_received();
        }
    }

    pub fn record_sent(&mut self, pubkey: &Pubkey) {
        if let Some(entry) = self.peers.get_mut(pubkey) {
            entry.stats.record_sent();
        }
    }

    /// Identities of all connected peers.
    pub fn peers(&self) -> Vec<PeerInfo> {
        self.peers.values().map(|entry| entry.info).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PeerEntry<H>> {
        self.peers.values()
    }
}

#[cfg(test)]
mod tests {
    use {super::*, assert_matches::assert_matches, std::net::SocketAddr};

    fn test_peer(n: u8) -> PeerInfo {
        PeerInfo::new(Pubkey::new_unique(), SocketAddr::from(([127, 0, 0, n], 7800)))
    }

    #[test]
    fn test_add_and_query_peer() {
        let mut pm = PeerManager::new(4);
        let info = test_peer(1);
        pm.add_peer(info, ()).unwrap();
        assert_eq!(pm.peer_count(), 1);
        assert!(pm.contains(&info.pubkey));
        assert!(pm.contains_addr(&info.addr));
        assert_eq!(pm.peers(), vec![info]);
    }

    #[test]
    fn test_duplicate_pubkey_refused() {
        let mut pm = PeerManager::new(4);
        let info = test_peer(1);
        pm.add_peer(info, ()).unwrap();
        assert_matches!(
            pm.add_peer(info, ()),
            Err(MeshError::PeerAlreadyConnected(pk)) if pk == info.pubkey
        );
        assert_eq!(pm.peer_count(), 1);
    }

    #[test]
    fn test_max_peers_enforced() {
        let mut pm = PeerManager::new(2);
        pm.add_peer(test_peer(1), ()).unwrap();
        pm.add_peer(test_peer(2), ()).unwrap();
        assert_matches!(
            pm.add_peer(test_peer(3), ()),
            Err(MeshError::MaxPeersReached(2))
        );
    }

    #[test]
    fn test_remove_only_matching_handle() {
        let mut pm = PeerManager::new(4);
        let info = test_peer(1);
        pm.add_peer(info, 7u32).unwrap();
        assert!(pm.remove_peer_if(&info.pubkey, |h| *h == 8).is_none());
        assert!(pm.contains(&info.pubkey));
        let removed = pm.remove_peer_if(&info.pubkey, |h| *h == 7).unwrap();
        assert_eq!(removed.info, info);
        assert!(pm.remove_peer(&info.pubkey).is_none());
    }

    #[test]
    fn test_replace_swaps_handle_and_resets_stats() {
        let mut pm = PeerManager::new(4);
        let info = test_peer(1);
        assert!(pm.replace_peer(info, 1u32).is_none());
        assert_eq!(pm.peer_count(), 0);

        pm.add_peer(info, 1u32).unwrap();
        pm.record_sent(&info.pubkey);
        assert_eq!(pm.replace_peer(info, 2), Some(1));
        let entry = pm.get(&info.pubkey).unwrap();
        assert_eq!(entry.handle, 2);
        assert_eq!(entry.stats.messages_sent, 0);
        assert_eq!(pm.peer_count(), 1);
        // A closing old link must not evict its replacement.
        assert!(pm.remove_peer_if(&info.pubkey, |h| *h == 1).is_none());
        assert!(pm.contains(&info.pubkey));
    }

    #[test]
    fn test_counters() {
        let mut pm = PeerManager::new(4);
        let info = test_peer(1);
        pm.add_peer(info, ()).unwrap();
        pm.record_sent(&info.pubkey);
        pm.record_received(&info.pubkey);
        pm.record_received(&info.pubkey);
        let stats = &pm.get(&info.pubkey).unwrap().stats;
        assert_eq!(stats.messages_sent, 1);
        assert_eq!(stats.messages_received, 2);
    }

    #[test]
    fn test_latency_ewma() {
        let mut stats = PeerStats::new();
        stats.update_latency(100.0);
        assert!((stats.latency_ms - 100.0).abs() < f64::EPSILON);
        stats.update_latency(200.0);
        // 0.3 * 200 + 0.7 * 100 = 130
        assert!((stats.latency_ms - 130.0).abs() < 1e-9);
    }
}
