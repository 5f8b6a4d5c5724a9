//! One authenticated, framed TCP link to a remote peer.
//!
//! A [`PeerConnection`] only exists once the handshake has succeeded; the
//! `Connecting` and `Authenticating` phases run inside
//! [`PeerConnection::connect`] / [`PeerConnection::accept`]. Status changes
//! are published on a `watch` channel so owners can observe the lifecycle.

use {
    crate::{
        codec::FrameCodec,
        config::MeshConfig,
        error::{MeshError, Result},
        message::{Handshake, Message, PeerInfo},
    },
    log::{debug, info, warn},
    serde::{de::DeserializeOwned, Serialize},
    solana_keypair::Keypair,
    solana_signature::Signature,
    solana_pubkey::Pubkey,
    solana_signer::Signer,
    std::{fmt, future::Future, net::SocketAddr, str::FromStr, sync::Arc, time::Duration},
    tokio::{
        io::AsyncWriteExt,
        net::{
            tcp::{OwnedReadHalf, OwnedWriteHalf},
            TcpStream,
        },
        sync::{watch, Mutex},
    },
    tokio_util::sync::CancellationToken,
};

/// Length of the random challenge, before hex encoding.
const PHRASE_LEN: usize = 32;

/// Connection lifecycle.
///
/// ```text
///  Disconnected -> Connecting -> Authenticating -> Ready
///        ^                                          |
///        +------------- (reset) <-------------------+
///  any state -> Faulted
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeStatus {
    Disconnected,
    Connecting,
    Authenticating,
    Ready,
    Faulted,
}

impl NodeStatus {
    /// Whether moving from `self` to `next` is a legal transition.
    pub fn can_transition_to(self, next: NodeStatus) -> bool {
        match next {
            Self::Disconnected | Self::Faulted => true,
            Self::Connecting => self == Self::Disconnected,
            Self::Authenticating => self == Self::Connecting,
            Self::Ready => self == Self::Authenticating,
        }
    }
}

impl fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Disconnected => "Disconnected",
            Self::Connecting => "Connecting",
            Self::Authenticating => "Authenticating",
            Self::Ready => "Ready",
            Self::Faulted => "Faulted",
        };
        f.write_str(name)
    }
}

/// Status holder that enforces [`NodeStatus::can_transition_to`].
#[derive(Debug)]
pub struct StatusTracker {
    tx: watch::Sender<NodeStatus>,
}

impl Default for StatusTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusTracker {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(NodeStatus::Disconnected);
        Self { tx }
    }

    pub fn current(&self) -> NodeStatus {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<NodeStatus> {
        self.tx.subscribe()
    }

    /// Move to `next`, rejecting illegal transitions atomically.
    pub fn advance(&self, next: NodeStatus) -> Result<()> {
        let mut rejected = None;
        self.tx.send_if_modified(|status| {
            if !status.can_transition_to(next) {
                rejected = Some(*status);
                return false;
            }
            let changed = *status != next;
            *status = next;
            changed
        });
        match rejected {
            Some(from) => Err(MeshError::InvalidStatus { from, to: next }),
            None => Ok(()),
        }
    }

    fn fault(&self) {
        self.tx.send_replace(NodeStatus::Faulted);
    }
}

/// The local node's signing identity and advertised endpoint.
#[derive(Clone)]
pub struct LocalIdentity {
    keypair: Arc<Keypair>,
    info: PeerInfo,
}

impl LocalIdentity {
    pub fn new(keypair: Arc<Keypair>, advertised: SocketAddr) -> Self {
        let info = PeerInfo::new(keypair.pubkey(), advertised);
        Self { keypair, info }
    }

    pub fn info(&self) -> PeerInfo {
        self.info
    }

    pub fn keypair(&self) -> &Keypair {
        &self.keypair
    }
}

impl fmt::Debug for LocalIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalIdentity")
            .field("info", &self.info)
            .finish_non_exhaustive()
    }
}

/// An authenticated link. Sending and receiving may run concurrently.
#[derive(Debug)]
pub struct PeerConnection {
    remote: PeerInfo,
    initiator: Pubkey,
    socket_addr: SocketAddr,
    codec: FrameCodec,
    reader: Mutex<OwnedReadHalf>,
    writer: Mutex<OwnedWriteHalf>,
    status: StatusTracker,
}

impl PeerConnection {
    /// Active open: dial `addr` and prove our identity to the acceptor.
    pub async fn connect(
        addr: SocketAddr,
        identity: &LocalIdentity,
        config: &MeshConfig,
        cancel: &CancellationToken,
    ) -> Result<Self> {
        let codec = FrameCodec::new(config.byte_order, config.max_frame_size);
        let status = StatusTracker::new();
        status.advance(NodeStatus::Connecting)?;

        let stream = match bounded(config.connect_timeout(), cancel, TcpStream::connect(addr)).await
        {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                status.fault();
                return Err(MeshError::ConnectionFailed(addr, e.to_string()));
            }
            Err(e) => {
                status.fault();
                return Err(e);
            }
        };
        let _ = stream.set_nodelay(true);
        status.advance(NodeStatus::Authenticating)?;

        let (mut reader, mut writer) = stream.into_split();
        let outcome = bounded(
            config.handshake_timeout(),
            cancel,
            authenticate_outbound(&codec, &mut reader, &mut writer, identity, addr, cancel),
        )
        .await;
        let remote = match outcome {
            Ok(Ok(remote)) => remote,
            Ok(Err(e)) | Err(e) => {
                status.fault();
                let _ = writer.shutdown().await;
                warn!("handshake with {} failed: {}", addr, e);
                return Err(e);
            }
        };

        status.advance(NodeStatus::Ready)?;
        info!("connected to {}", remote);
        Ok(Self {
            remote,
            initiator: identity.info().pubkey,
            socket_addr: addr,
            codec,
            reader: Mutex::new(reader),
            writer: Mutex::new(writer),
            status,
        })
    }

    /// Passive open: challenge the dialer on an accepted socket.
    pub async fn accept(
        stream: TcpStream,
        identity: &LocalIdentity,
        config: &MeshConfig,
        cancel: &CancellationToken,
    ) -> Result<Self> {
        let codec = FrameCodec::new(config.byte_order, config.max_frame_size);
        let status = StatusTracker::new();
        status.advance(NodeStatus::Connecting)?;
        let socket_addr = stream.peer_addr()?;
        let _ = stream.set_nodelay(true);
        status.advance(NodeStatus::Authenticating)?;

        let (mut reader, mut writer) = stream.into_split();
        let outcome = bounded(
            config.handshake_timeout(),
            cancel,
            authenticate_inbound(&codec, &mut reader, &mut writer, identity, cancel),
        )
        .await;
        let remote = match outcome {
            Ok(Ok(remote)) => remote,
            Ok(Err(e)) | Err(e) => {
                status.fault();
                let _ = writer.shutdown().await;
                warn!("inbound handshake from {} failed: {}", socket_addr, e);
                return Err(e);
            }
        };

        status.advance(NodeStatus::Ready)?;
        info!("accepted {} from {}", remote, socket_addr);
        Ok(Self {
            remote,
            initiator: remote.pubkey,
            socket_addr,
            codec,
            reader: Mutex::new(reader),
            writer: Mutex::new(writer),
            status,
        })
    }

    /// Identity the remote proved during the handshake.
    pub fn remote(&self) -> PeerInfo {
        self.remote
    }

    /// Key of the side that dialled this link.
    pub fn initiator(&self) -> Pubkey {
        self.initiator
    }

    /// Actual socket address of the remote end.
    pub fn socket_addr(&self) -> SocketAddr {
        self.socket_addr
    }

    pub fn status(&self) -> NodeStatus {
        self.status.current()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<NodeStatus> {
        self.status.subscribe()
    }

    fn ensure_ready(&self) -> Result<()> {
        match self.status.current() {
            NodeStatus::Ready => Ok(()),
            other => Err(MeshError::NotReady(other)),
        }
    }

    /// Frame and send one message.
    pub async fn send(&self, message: &Message) -> Result<()> {
        self.ensure_ready()?;
        let payload = self.codec.encode_payload(message)?;
        let mut writer = self.writer.lock().await;
        if let Err(e) = self.codec.write_frame(&mut *writer, &payload).await {
            self.status.fault();
            return Err(e);
        }
        Ok(())
    }

    /// Send a keep-alive frame.
    pub async fn keep_alive(&self) -> Result<()> {
        self.ensure_ready()?;
        let mut writer = self.writer.lock().await;
        self.codec.write_keep_alive(&mut *writer).await
    }

    /// Wait for the next message.
    ///
    /// `Ok(None)` means the link ended gracefully (remote close or `cancel`)
    /// and the status is now `Disconnected`. Corrupt frames fault the link.
    pub async fn receive(&self, cancel: &CancellationToken) -> Result<Option<Message>> {
        self.ensure_ready()?;
        let mut reader = self.reader.lock().await;
        let payload = match self.codec.read_frame(&mut *reader, cancel).await {
            Ok(Some(payload)) => payload,
            Ok(None) => {
                debug!("link to {} ended", self.remote);
                let _ = self.status.advance(NodeStatus::Disconnected);
                return Ok(None);
            }
            Err(e) => {
                self.status.fault();
                return Err(e);
            }
        };
        match self.codec.decode_payload::<Message>(&payload) {
            Ok(message) => Ok(Some(message)),
            Err(e) => {
                self.status.fault();
                Err(MeshError::CorruptMessage(e.to_string()))
            }
        }
    }

    /// Shut the link down. Idempotent.
    pub async fn close(&self) {
        if self.status.current() == NodeStatus::Ready {
            let _ = self.status.advance(NodeStatus::Disconnected);
        }
        let mut writer = self.writer.lock().await;
        let _ = writer.shutdown().await;
    }
}

/// Run `fut` under a deadline and a cancellation token.
async fn bounded<F, T>(limit: Duration, cancel: &CancellationToken, fut: F) -> Result<T>
where
    F: Future<Output = T>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(MeshError::Cancelled),
        res = tokio::time::timeout(limit, fut) => {
            res.map_err(|_| MeshError::Timeout(limit.as_millis() as u64))
        }
    }
}

async fn write_handshake<T: Serialize>(
    codec: &FrameCodec,
    writer: &mut OwnedWriteHalf,
    value: &T,
) -> Result<()> {
    let payload = codec.encode_payload(value)?;
    codec.write_frame(writer, &payload).await
}

async fn read_handshake<T: DeserializeOwned>(
    codec: &FrameCodec,
    reader: &mut OwnedReadHalf,
    cancel: &CancellationToken,
) -> Result<T> {
    let payload = codec
        .read_frame(reader, cancel)
        .await?
        .ok_or(MeshError::ConnectionClosed)?;
    codec
        .decode_payload(&payload)
        .map_err(|e| MeshError::HandshakeFailed(e.to_string()))
}

async fn authenticate_outbound(
    codec: &FrameCodec,
    reader: &mut OwnedReadHalf,
    writer: &mut OwnedWriteHalf,
    identity: &LocalIdentity,
    addr: SocketAddr,
    cancel: &CancellationToken,
) -> Result<PeerInfo> {
    let request: Handshake = read_handshake(codec, reader, cancel).await?;
    let Handshake::Request {
        phrase_to_sign,
        acceptor,
    } = request
    else {
        return Err(MeshError::HandshakeFailed(format!(
            "expected Request, got {}",
            request.kind()
        )));
    };

    let counter_phrase = random_phrase();
    let signature = identity.keypair().sign_message(phrase_to_sign.as_bytes());
    let response = Handshake::Response {
        peer: identity.info(),
        phrase_signed: signature.to_string(),
        counter_phrase: counter_phrase.clone(),
    };
    write_handshake(codec, writer, &response).await?;

    match read_handshake(codec, reader, cancel).await? {
        Handshake::Outcome {
            accepted: true,
            counter_signed: Some(counter_signed),
        } => {
            if verify_phrase(&acceptor, &counter_phrase, &counter_signed) {
                Ok(acceptor)
            } else {
                Err(MeshError::AuthenticationFailed(acceptor.pubkey))
            }
        }
        Handshake::Outcome {
            accepted: true,
            counter_signed: None,
        } => Err(MeshError::AuthenticationFailed(acceptor.pubkey)),
        Handshake::Outcome {
            accepted: false, ..
        } => Err(MeshError::HandshakeRejected(addr)),
        other => Err(MeshError::HandshakeFailed(format!(
            "expected Outcome, got {}",
            other.kind()
        ))),
    }
}

async fn authenticate_inbound(
    codec: &FrameCodec,
    reader: &mut OwnedReadHalf,
    writer: &mut OwnedWriteHalf,
    identity: &LocalIdentity,
    cancel: &CancellationToken,
) -> Result<PeerInfo> {
    let phrase_to_sign = random_phrase();
    let request = Handshake::Request {
        phrase_to_sign: phrase_to_sign.clone(),
        acceptor: identity.info(),
    };
    write_handshake(codec, writer, &request).await?;

    let response: Handshake = read_handshake(codec, reader, cancel).await?;
    let Handshake::Response {
        peer,
        phrase_signed,
        counter_phrase,
    } = response
    else {
        return Err(MeshError::HandshakeFailed(format!(
            "expected Response, got {}",
            response.kind()
        )));
    };

    let accepted = verify_phrase(&peer, &phrase_to_sign, &phrase_signed);
    let counter_signed = accepted.then(|| {
        identity
            .keypair()
            .sign_message(counter_phrase.as_bytes())
            .to_string()
    });
    let outcome = Handshake::Outcome {
        accepted,
        counter_signed,
    };
    write_handshake(codec, writer, &outcome).await?;
    if accepted {
        Ok(peer)
    } else {
        Err(MeshError::AuthenticationFailed(peer.pubkey))
    }
}

fn random_phrase() -> String {
    hex::encode(rand::random::<[u8; PHRASE_LEN]>())
}

/// Check `signed` is `peer`'s signature over `phrase`.
pub fn verify_phrase(peer: &PeerInfo, phrase: &str, signed: &str) -> bool {
    Signature::from_str(signed)
        .map(|signature| signature.verify(peer.pubkey.as_ref(), phrase.as_bytes()))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{codec::ByteOrder, error::ErrorKind},
        assert_matches::assert_matches,
        tokio::net::TcpListener,
    };

    fn identity(addr: SocketAddr) -> LocalIdentity {
        LocalIdentity::new(Arc::new(Keypair::new()), addr)
    }

    async fn pair(
        config: &MeshConfig,
    ) -> (PeerConnection, PeerConnection, LocalIdentity, LocalIdentity) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let acceptor = identity(addr);
        let dialer = identity("127.0.0.1:1".parse().unwrap());
        let cancel = CancellationToken::new();

        let accept = {
            let acceptor = acceptor.clone();
            let config = config.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move {
                let (stream, _) = listener.accept().await.unwrap();
                PeerConnection::accept(stream, &acceptor, &config, &cancel).await
            })
        };
        let outbound = PeerConnection::connect(addr, &dialer, config, &cancel)
            .await
            .unwrap();
        let inbound = accept.await.unwrap().unwrap();
        (outbound, inbound, dialer, acceptor)
    }

    #[test]
    fn test_status_transitions() {
        use NodeStatus::*;
        assert!(Disconnected.can_transition_to(Connecting));
        assert!(Connecting.can_transition_to(Authenticating));
        assert!(Authenticating.can_transition_to(Ready));
        assert!(Ready.can_transition_to(Disconnected));
        assert!(Authenticating.can_transition_to(Faulted));
        assert!(!Disconnected.can_transition_to(Ready));
        assert!(!Ready.can_transition_to(Connecting));
        assert!(!Faulted.can_transition_to(Ready));
    }

    #[test]
    fn test_tracker_rejects_skipping_states() {
        let tracker = StatusTracker::new();
        let watcher = tracker.subscribe();
        assert_matches!(
            tracker.advance(NodeStatus::Ready),
            Err(MeshError::InvalidStatus {
                from: NodeStatus::Disconnected,
                to: NodeStatus::Ready
            })
        );
        tracker.advance(NodeStatus::Connecting).unwrap();
        assert_eq!(*watcher.borrow(), NodeStatus::Connecting);
    }

    #[test]
    fn test_verify_phrase() {
        let keypair = Keypair::new();
        let peer = PeerInfo::new(keypair.pubkey(), "127.0.0.1:1".parse().unwrap());
        let signed = keypair.sign_message(b"challenge").to_string();
        assert!(verify_phrase(&peer, "challenge", &signed));
        assert!(!verify_phrase(&peer, "other", &signed));
        assert!(!verify_phrase(&peer, "challenge", "not-base58!"));
    }

    #[tokio::test]
    async fn test_handshake_and_exchange() {
        let config = MeshConfig::dev_default();
        let (outbound, inbound, dialer, acceptor) = pair(&config).await;
        assert_eq!(outbound.status(), NodeStatus::Ready);
        assert_eq!(inbound.status(), NodeStatus::Ready);
        assert_eq!(outbound.remote(), acceptor.info());
        assert_eq!(inbound.remote(), dialer.info());
        assert_eq!(outbound.initiator(), dialer.info().pubkey);
        assert_eq!(inbound.initiator(), dialer.info().pubkey);

        let message = Message::new("ping", b"hi".to_vec(), dialer.info());
        outbound.keep_alive().await.unwrap();
        outbound.send(&message).await.unwrap();
        let cancel = CancellationToken::new();
        let received = inbound.receive(&cancel).await.unwrap().unwrap();
        assert_eq!(received, message);

        outbound.close().await;
        assert_eq!(outbound.status(), NodeStatus::Disconnected);
        assert_matches!(inbound.receive(&cancel).await, Ok(None));
        assert_eq!(inbound.status(), NodeStatus::Disconnected);
        assert_matches!(
            inbound.send(&message).await,
            Err(MeshError::NotReady(NodeStatus::Disconnected))
        );
    }

    #[tokio::test]
    async fn test_big_endian_link() {
        let config = MeshConfig {
            byte_order: ByteOrder::Big,
            ..MeshConfig::dev_default()
        };
        let (outbound, inbound, dialer, _) = pair(&config).await;
        let message = Message::new("ping", vec![7; 300], dialer.info());
        outbound.send(&message).await.unwrap();
        let received = inbound
            .receive(&CancellationToken::new())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(received, message);
    }

    #[tokio::test]
    async fn test_forged_signature_is_rejected() {
        let config = MeshConfig::dev_default();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let acceptor = identity(addr);
        let cancel = CancellationToken::new();

        let accept = {
            let config = config.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move {
                let (stream, _) = listener.accept().await.unwrap();
                PeerConnection::accept(stream, &acceptor, &config, &cancel).await
            })
        };

        // Claim someone else's key but sign with our own.
        let codec = FrameCodec::new(config.byte_order, config.max_frame_size);
        let stream = TcpStream::connect(addr).await.unwrap();
        let (mut reader, mut writer) = stream.into_split();
        let request: Handshake = read_handshake(&codec, &mut reader, &cancel).await.unwrap();
        let Handshake::Request { phrase_to_sign, .. } = request else {
            panic!("expected request");
        };
        let impostor = Keypair::new();
        let claimed = PeerInfo::new(Keypair::new().pubkey(), "127.0.0.1:1".parse().unwrap());
        let response = Handshake::Response {
            peer: claimed,
            phrase_signed: impostor.sign_message(phrase_to_sign.as_bytes()).to_string(),
            counter_phrase: "counter".to_string(),
        };
        write_handshake(&codec, &mut writer, &response).await.unwrap();
        let outcome: Handshake = read_handshake(&codec, &mut reader, &cancel).await.unwrap();
        assert_eq!(
            outcome,
            Handshake::Outcome {
                accepted: false,
                counter_signed: None
            }
        );

        let err = accept.await.unwrap().unwrap_err();
        assert_matches!(err, MeshError::AuthenticationFailed(pk) if pk == claimed.pubkey);
        assert_eq!(err.kind(), ErrorKind::Connectivity);
    }

    #[tokio::test]
    async fn test_acceptor_claiming_foreign_key_is_rejected() {
        let config = MeshConfig::dev_default();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let victim = PeerInfo::new(Keypair::new().pubkey(), addr);
        let cancel = CancellationToken::new();

        // Answers the dialer with the victim's key but its own signature.
        let fake_acceptor = {
            let config = config.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move {
                let codec = FrameCodec::new(config.byte_order, config.max_frame_size);
                let (stream, _) = listener.accept().await.unwrap();
                let (mut reader, mut writer) = stream.into_split();
                let request = Handshake::Request {
                    phrase_to_sign: "phrase".to_string(),
                    acceptor: victim,
                };
                write_handshake(&codec, &mut writer, &request).await.unwrap();
                let response: Handshake =
                    read_handshake(&codec, &mut reader, &cancel).await.unwrap();
                let Handshake::Response { counter_phrase, .. } = response else {
                    panic!("expected response");
                };
                let outcome = Handshake::Outcome {
                    accepted: true,
                    counter_signed: Some(
                        Keypair::new()
                            .sign_message(counter_phrase.as_bytes())
                            .to_string(),
                    ),
                };
                write_handshake(&codec, &mut writer, &outcome).await.unwrap();
                // Keep the socket open until the dialer gives up.
                let _ = read_handshake::<Handshake>(&codec, &mut reader, &cancel).await;
            })
        };

        let err = PeerConnection::connect(
            addr,
            &identity("127.0.0.1:1".parse().unwrap()),
            &config,
            &cancel,
        )
        .await
        .unwrap_err();
        assert_matches!(err, MeshError::AuthenticationFailed(pk) if pk == victim.pubkey);
        assert_eq!(err.kind(), ErrorKind::Connectivity);
        fake_acceptor.await.unwrap();
    }

    #[tokio::test]
    async fn test_corrupt_payload_faults_link() {
        let config = MeshConfig::dev_default();
        let (outbound, inbound, _, _) = pair(&config).await;
        let mut status = inbound.subscribe_status();
        assert_eq!(*status.borrow_and_update(), NodeStatus::Ready);

        // A well-formed frame whose payload is not a message.
        {
            let mut writer = outbound.writer.lock().await;
            outbound
                .codec
                .write_frame(&mut *writer, &[0xff; 7])
                .await
                .unwrap();
        }
        let err = inbound
            .receive(&CancellationToken::new())
            .await
            .unwrap_err();
        assert_matches!(err, MeshError::CorruptMessage(_));
        assert_eq!(err.kind(), ErrorKind::Connectivity);
        assert_eq!(inbound.status(), NodeStatus::Faulted);
        status.changed().await.unwrap();
        assert_eq!(*status.borrow(), NodeStatus::Faulted);
    }

    #[tokio::test]
    async fn test_connect_refused() {
        let config = MeshConfig::dev_default();
        // Bind then drop to get a port nobody listens on.
        let addr = TcpListener::bind("127.0.0.1:0")
            .await
            .unwrap()
            .local_addr()
            .unwrap();
        let err = PeerConnection::connect(
            addr,
            &identity("127.0.0.1:1".parse().unwrap()),
            &config,
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Connectivity);
    }

    #[tokio::test]
    async fn test_silent_acceptor_times_out() {
        let config = MeshConfig {
            handshake_timeout_ms: 100,
            ..MeshConfig::dev_default()
        };
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let _hold = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
            drop(stream);
        });
        let err = PeerConnection::connect(
            addr,
            &identity("127.0.0.1:1".parse().unwrap()),
            &config,
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();
        assert_matches!(err, MeshError::Timeout(100));
        assert_eq!(err.kind(), ErrorKind::Incomplete);
    }
}
