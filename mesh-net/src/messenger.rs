//! The mesh messenger: owns every [`PeerConnection`], fans messages out,
//! relays discovery and dispatches inbound messages to registered handlers.
//!
//! ```text
//!   TransportListener ──accept──┐        contact(addr)
//!                               ▼             │
//!                     PeerConnection::accept  PeerConnection::connect
//!                               └──────┬──────┘
//!                                      ▼
//!                               register(link) ── PeerEvent::Entered
//!                                      │
//!                               receive loop (one task per link)
//!                                      │
//!          reply_to? ── pending request ── discovery? ── relay
//!                                      │
//!                              handler registry[kind]
//! ```
//!
//! Messages from one peer are dispatched in arrival order on that peer's
//! receive task, so a handler that blocks delays only its own link. Handlers
//! that need to wait on other peers must spawn.

use {
    crate::{
        codec::FrameCodec,
        config::MeshConfig,
        connection::{LocalIdentity, PeerConnection},
        discovery::{plan_relay, SeenCache},
        error::{MeshError, Result},
        message::{DiscoveryAnnouncement, Message, PeerInfo, DISCOVERY_KIND},
        peer_manager::{PeerManager, PeerStats},
        transport::TransportListener,
    },
    async_trait::async_trait,
    futures::future::{join_all, BoxFuture},
    log::{debug, info, trace, warn},
    parking_lot::{Mutex, RwLock},
    serde::Serialize,
    solana_keypair::Keypair,
    solana_pubkey::Pubkey,
    std::{
        collections::HashMap,
        fmt,
        net::SocketAddr,
        sync::Arc,
        time::{Duration, Instant},
    },
    tokio::{
        net::TcpStream,
        sync::{broadcast, oneshot},
    },
    tokio_util::sync::CancellationToken,
    uuid::Uuid,
};

/// Peer lifecycle notification. Each subscriber sees every event once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerEvent {
    Entered(PeerInfo),
    Left(PeerInfo),
}

impl PeerEvent {
    pub fn peer(&self) -> PeerInfo {
        match self {
            Self::Entered(peer) | Self::Left(peer) => *peer,
        }
    }
}

/// Handles inbound messages of one type tag.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    /// Process `message`. Returning `Some(data)` sends a reply carrying
    /// `data` back over the link the message arrived on.
    async fn handle(&self, mesh: &MeshMessenger, message: &Message) -> Result<Option<Vec<u8>>>;
}

struct PeerLink {
    connection: Arc<PeerConnection>,
    cancel: CancellationToken,
}

/// Collects handlers, then binds the listener and starts the messenger.
///
/// The registry is frozen once [`MeshMessengerBuilder::start`] returns.
pub struct MeshMessengerBuilder {
    keypair: Arc<Keypair>,
    config: MeshConfig,
    handlers: HashMap<String, Arc<dyn MessageHandler>>,
}

impl MeshMessengerBuilder {
    pub fn new(keypair: Arc<Keypair>, config: MeshConfig) -> Self {
        Self {
            keypair,
            config,
            handlers: HashMap::new(),
        }
    }

    /// Register `handler` for messages tagged `kind`, replacing any earlier
    /// registration. The discovery tag is reserved.
    pub fn handler(mut self, kind: impl Into<String>, handler: Arc<dyn MessageHandler>) -> Self {
        let kind = kind.into();
        if kind == DISCOVERY_KIND {
            warn!("ignoring handler for reserved kind '{}'", kind);
            return self;
        }
        if self.handlers.insert(kind.clone(), handler).is_some() {
            warn!("handler for '{}' replaced", kind);
        }
        self
    }

    /// Bind the listener and start accepting peers.
    pub async fn start(self) -> Result<MeshMessenger> {
        self.config.validate()?;
        let listener = TransportListener::bind(self.config.bind_addr).await?;
        let advertised = self
            .config
            .advertised_addr
            .unwrap_or_else(|| listener.local_addr());
        let identity = LocalIdentity::new(self.keypair, advertised);
        let (events, _) = broadcast::channel(self.config.event_buffer_size);

        let messenger = MeshMessenger {
            inner: Arc::new(Inner {
                codec: FrameCodec::new(self.config.byte_order, self.config.max_frame_size),
                seen: Mutex::new(SeenCache::new(self.config.seen_retention())),
                peers: RwLock::new(PeerManager::new(self.config.max_peers)),
                pending: Mutex::new(HashMap::new()),
                handlers: self.handlers,
                shutdown: CancellationToken::new(),
                identity,
                events,
                config: self.config,
            }),
        };

        let acceptor = messenger.clone();
        listener.spawn(messenger.inner.shutdown.clone(), move |stream, addr| {
            let mesh = acceptor.clone();
            tokio::spawn(async move { mesh.accept_inbound(stream, addr).await });
        });
        info!("mesh node {} started", messenger.local());
        Ok(messenger)
    }
}

struct Inner {
    identity: LocalIdentity,
    config: MeshConfig,
    codec: FrameCodec,
    handlers: HashMap<String, Arc<dyn MessageHandler>>,
    peers: RwLock<PeerManager<PeerLink>>,
    seen: Mutex<SeenCache>,
    pending: Mutex<HashMap<Uuid, oneshot::Sender<Message>>>,
    events: broadcast::Sender<PeerEvent>,
    shutdown: CancellationToken,
}

/// Cheaply cloneable handle to a running mesh node.
#[derive(Clone)]
pub struct MeshMessenger {
    inner: Arc<Inner>,
}

impl fmt::Debug for MeshMessenger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MeshMessenger")
            .field("local", &self.inner.identity.info())
            .field("peers", &self.peer_count())
            .finish_non_exhaustive()
    }
}

impl MeshMessenger {
    pub fn builder(keypair: Arc<Keypair>, config: MeshConfig) -> MeshMessengerBuilder {
        MeshMessengerBuilder::new(keypair, config)
    }

    /// Our own identity and advertised endpoint.
    pub fn local(&self) -> PeerInfo {
        self.inner.identity.info()
    }

    pub fn config(&self) -> &MeshConfig {
        &self.inner.config
    }

    pub fn codec(&self) -> &FrameCodec {
        &self.inner.codec
    }

    /// Subscribe to peer events. Dropping the receiver unsubscribes.
    pub fn subscribe(&self) -> broadcast::Receiver<PeerEvent> {
        self.inner.events.subscribe()
    }

    pub fn peers(&self) -> Vec<PeerInfo> {
        self.inner.peers.read().peers()
    }

    pub fn peer_count(&self) -> usize {
        self.inner.peers.read().peer_count()
    }

    pub fn is_peer(&self, pubkey: &Pubkey) -> bool {
        self.inner.peers.read().contains(pubkey)
    }

    pub fn peer_stats(&self, pubkey: &Pubkey) -> Option<PeerStats> {
        self.inner
            .peers
            .read()
            .get(pubkey)
            .map(|entry| entry.stats.clone())
    }

    /// A message from us carrying raw `data`.
    pub fn message(&self, kind: impl Into<String>, data: Vec<u8>) -> Message {
        Message::new(kind, data, self.local())
    }

    /// A message from us carrying `payload` encoded with the mesh codec.
    pub fn encode<T: Serialize>(&self, kind: impl Into<String>, payload: &T) -> Result<Message> {
        Message::encode(&self.inner.codec, kind, payload, self.local())
    }

    /// Dial `addr` and add the peer to the mesh.
    ///
    /// Returns `Ok(None)` when `addr` is ourselves or the identity behind it
    /// is already connected.
    pub async fn contact(&self, addr: SocketAddr) -> Result<Option<PeerInfo>> {
        if addr == self.local().addr {
            return Ok(None);
        }
        let known = self.inner.peers.read().contains_addr(&addr);
        if known {
            debug!("{} is already a peer", addr);
            return Ok(None);
        }
        let connection = PeerConnection::connect(
            addr,
            &self.inner.identity,
            &self.inner.config,
            &self.inner.shutdown,
        )
        .await?;
        self.register(connection).await
    }

    /// Best-effort send to every connected peer. Returns how many sends
    /// succeeded.
    pub async fn emit(&self, message: &Message) -> usize {
        self.emit_except(message, None).await
    }

    /// Like [`Self::emit`] but skipping `exclude`.
    pub async fn emit_except(&self, message: &Message, exclude: Option<&Pubkey>) -> usize {
        let targets: Vec<Arc<PeerConnection>> = self
            .inner
            .peers
            .read()
            .iter()
            .filter(|entry| Some(&entry.info.pubkey) != exclude)
            .map(|entry| Arc::clone(&entry.handle.connection))
            .collect();

        let results = join_all(targets.iter().map(|connection| async move {
            (connection.remote().pubkey, connection.send(message).await)
        }))
        .await;

        let mut delivered = 0usize;
        for (pubkey, result) in results {
            match result {
                Ok(()) => {
                    self.inner.peers.write().record_sent(&pubkey);
                    delivered = delivered.saturating_add(1);
                }
                Err(e) => {
                    debug!("emit '{}' to {} failed: {}", message.kind, pubkey, e);
                    self.disconnect(&pubkey);
                }
            }
        }
        delivered
    }

    /// Send to one connected peer.
    pub async fn send_to(&self, pubkey: &Pubkey, message: &Message) -> Result<()> {
        let connection = self
            .connection(pubkey)
            .ok_or(MeshError::UnknownPeer(*pubkey))?;
        match connection.send(message).await {
            Ok(()) => {
                self.inner.peers.write().record_sent(pubkey);
                Ok(())
            }
            Err(e) => {
                self.disconnect(pubkey);
                Err(e)
            }
        }
    }

    /// Send `message` to `pubkey` and wait for the correlated reply.
    pub async fn request(
        &self,
        pubkey: &Pubkey,
        message: Message,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<Message> {
        let (tx, rx) = oneshot::channel();
        self.inner.pending.lock().insert(message.id, tx);
        let started = Instant::now();

        let outcome = self.await_reply(pubkey, &message, rx, timeout, cancel).await;
        self.inner.pending.lock().remove(&message.id);

        if outcome.is_ok() {
            if let Some(entry) = self.inner.peers.write().get_mut(pubkey) {
                entry
                    .stats
                    .update_latency(started.elapsed().as_secs_f64() * 1000.0);
            }
        }
        outcome
    }

    async fn await_reply(
        &self,
        pubkey: &Pubkey,
        message: &Message,
        rx: oneshot::Receiver<Message>,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<Message> {
        self.send_to(pubkey, message).await?;
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(MeshError::Cancelled),
            reply = tokio::time::timeout(timeout, rx) => match reply {
                Ok(Ok(reply)) => Ok(reply),
                Ok(Err(_)) => Err(MeshError::ChannelClosed),
                Err(_) => Err(MeshError::Timeout(timeout.as_millis() as u64)),
            },
        }
    }

    /// Announce ourselves to the mesh with the configured hop budget.
    pub async fn invite_peers(&self) -> Result<usize> {
        let local = self.local();
        let message = self
            .encode(DISCOVERY_KIND, &DiscoveryAnnouncement { advertised: local })?
            .with_ttl(self.inner.config.max_ttl);
        self.inner.seen.lock().insert(message.id);
        let delivered = self.emit(&message).await;
        debug!(
            "invited peers with ttl {} via {} links",
            message.ttl, delivered
        );
        Ok(delivered)
    }

    /// Close the link to `pubkey`. `PeerEvent::Left` follows once the
    /// receive task winds down.
    pub fn disconnect(&self, pubkey: &Pubkey) -> bool {
        match self.inner.peers.read().get(pubkey) {
            Some(entry) => {
                entry.handle.cancel.cancel();
                true
            }
            None => false,
        }
    }

    /// Stop accepting and tear down every link.
    pub fn shutdown(&self) {
        info!("mesh node {} shutting down", self.local());
        self.inner.shutdown.cancel();
    }

    pub fn is_shut_down(&self) -> bool {
        self.inner.shutdown.is_cancelled()
    }

    fn connection(&self, pubkey: &Pubkey) -> Option<Arc<PeerConnection>> {
        self.inner
            .peers
            .read()
            .get(pubkey)
            .map(|entry| Arc::clone(&entry.handle.connection))
    }

    async fn accept_inbound(self, stream: TcpStream, addr: SocketAddr) {
        let connection = match PeerConnection::accept(
            stream,
            &self.inner.identity,
            &self.inner.config,
            &self.inner.shutdown,
        )
        .await
        {
            Ok(connection) => connection,
            Err(e) => {
                debug!("rejected inbound link from {}: {}", addr, e);
                return;
            }
        };
        if let Err(e) = self.register(connection).await {
            warn!("could not register inbound link from {}: {}", addr, e);
        }
    }

    /// Add an authenticated link to the peer table.
    ///
    /// When both ends dial each other at once, each side ends up with two
    /// links to the same identity. Both sides keep the link dialled by the
    /// lower public key and close the other.
    async fn register(&self, connection: PeerConnection) -> Result<Option<PeerInfo>> {
        let remote = connection.remote();
        let local = self.local().pubkey;
        if remote.pubkey == local {
            connection.close().await;
            return Ok(None);
        }
        let connection = Arc::new(connection);
        let cancel = self.inner.shutdown.child_token();
        let link = PeerLink {
            connection: Arc::clone(&connection),
            cancel: cancel.clone(),
        };

        let registration = {
            let mut peers = self.inner.peers.write();
            let existing = peers
                .get(&remote.pubkey)
                .map(|entry| entry.handle.connection.initiator());
            let preferred = local.min(remote.pubkey);
            match existing {
                None => peers.add_peer(remote, link).map(|()| None),
                Some(kept) if kept != preferred && connection.initiator() == preferred => {
                    Ok(peers.replace_peer(remote, link))
                }
                Some(_) => Err(MeshError::PeerAlreadyConnected(remote.pubkey)),
            }
        };
        match registration {
            Ok(None) => {
                info!("peer entered: {}", remote);
                let _ = self.inner.events.send(PeerEvent::Entered(remote));
            }
            Ok(Some(replaced)) => {
                debug!("kept the link to {} dialled by {}", remote, connection.initiator());
                replaced.cancel.cancel();
                replaced.connection.close().await;
                // Anything sent on the old link may be lost; owners start over.
                let _ = self.inner.events.send(PeerEvent::Left(remote));
                let _ = self.inner.events.send(PeerEvent::Entered(remote));
            }
            Err(MeshError::PeerAlreadyConnected(_)) => {
                debug!("dropping duplicate link to {}", remote);
                connection.close().await;
                return Ok(None);
            }
            Err(e) => {
                connection.close().await;
                return Err(e);
            }
        }

        tokio::spawn(self.clone().receive_loop(connection, cancel));
        Ok(Some(remote))
    }

    fn receive_loop(
        self,
        connection: Arc<PeerConnection>,
        cancel: CancellationToken,
    ) -> BoxFuture<'static, ()> {
        Box::pin(async move {
            let remote = connection.remote();
            loop {
                match connection.receive(&cancel).await {
                    Ok(Some(message)) => {
                        self.inner.peers.write().record_received(&remote.pubkey);
                        self.dispatch(&connection, message).await;
                    }
                    Ok(None) => break,
                    Err(e) => {
                        warn!("link to {} failed: {}", remote, e);
                        break;
                    }
                }
            }
            self.drop_link(&connection).await;
        })
    }

    async fn drop_link(&self, connection: &Arc<PeerConnection>) {
        let remote = connection.remote();
        let removed = self
            .inner
            .peers
            .write()
            .remove_peer_if(&remote.pubkey, |link| {
                Arc::ptr_eq(&link.connection, connection)
            });
        connection.close().await;
        if removed.is_some() {
            info!("peer left: {}", remote);
            let _ = self.inner.events.send(PeerEvent::Left(remote));
        }
    }

    async fn dispatch(&self, connection: &PeerConnection, message: Message) {
        // Handlers trust `sender`, so it must be the identity the link proved.
        let remote = connection.remote();
        if message.sender.pubkey != remote.pubkey {
            warn!(
                "dropping '{}' from {}: claims to come from {}",
                message.kind, remote, message.sender
            );
            return;
        }

        if let Some(request_id) = message.reply_to {
            let waiter = self.inner.pending.lock().remove(&request_id);
            match waiter {
                Some(waiter) => {
                    let _ = waiter.send(message);
                }
                None => trace!("dropping late reply to {}", request_id),
            }
            return;
        }

        if message.kind == DISCOVERY_KIND {
            self.on_discovery(connection, message).await;
            return;
        }

        let Some(handler) = self.inner.handlers.get(&message.kind).cloned() else {
            debug!("no handler for '{}' from {}", message.kind, message.sender);
            return;
        };
        match handler.handle(self, &message).await {
            Ok(Some(data)) => {
                let reply = message.reply(data, self.local());
                match connection.send(&reply).await {
                    Ok(()) => {
                        self.inner
                            .peers
                            .write()
                            .record_sent(&connection.remote().pubkey);
                    }
                    Err(e) => debug!("reply to {} failed: {}", connection.remote(), e),
                }
            }
            Ok(None) => {}
            Err(e) => warn!("handler for '{}' failed: {}", message.kind, e),
        }
    }

    async fn on_discovery(&self, connection: &PeerConnection, message: Message) {
        let fresh = self.inner.seen.lock().insert(message.id);
        if !fresh {
            trace!("dropping duplicate discovery {}", message.id);
            return;
        }
        let announcement: DiscoveryAnnouncement = match message.decode(&self.inner.codec) {
            Ok(announcement) => announcement,
            Err(e) => {
                warn!("malformed discovery from {}: {}", connection.remote(), e);
                return;
            }
        };

        let from = connection.remote().pubkey;
        let plan = {
            let peers = self.inner.peers.read();
            plan_relay(&message, &announcement, &self.local(), &from, |pk| {
                peers.contains(pk)
            })
        };

        if let Some(target) = plan.contact {
            let mesh = self.clone();
            tokio::spawn(async move {
                match mesh.contact(target.addr).await {
                    Ok(Some(peer)) => debug!("discovered {}", peer),
                    Ok(None) => {}
                    Err(e) => debug!("could not contact {}: {}", target, e),
                }
            });
        }
        if let Some(forward) = plan.forward {
            let delivered = self.emit_except(&forward, plan.exclude.as_ref()).await;
            trace!(
                "relayed discovery {} (ttl {}) to {} peers",
                forward.id,
                forward.ttl,
                delivered
            );
        }
    }
}
