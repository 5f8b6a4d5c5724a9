//! TCP listener for inbound mesh links.
//!
//! The listener only accepts sockets; authentication and registration are
//! delegated to the callback so the messenger owns the link lifecycle.

use {
    crate::error::Result,
    log::{debug, error, info},
    std::net::SocketAddr,
    tokio::net::{TcpListener, TcpStream},
    tokio_util::sync::CancellationToken,
};

/// A bound, not yet accepting, mesh listener.
#[derive(Debug)]
pub struct TransportListener {
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl TransportListener {
    /// Bind `addr`. Port 0 picks an ephemeral port, see [`Self::local_addr`].
    pub async fn bind(addr: SocketAddr) -> Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;
        info!("mesh transport listening on {}", local_addr);
        Ok(Self {
            listener,
            local_addr,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Accept until `cancel` fires, handing each socket to `on_accept`.
    pub fn spawn<F>(
        self,
        cancel: CancellationToken,
        mut on_accept: F,
    ) -> tokio::task::JoinHandle<()>
    where
        F: FnMut(TcpStream, SocketAddr) + Send + 'static,
    {
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    accepted = self.listener.accept() => match accepted {
                        Ok((stream, addr)) => {
                            debug!("accepted mesh connection from {}", addr);
                            on_accept(stream, addr);
                        }
                        Err(e) => {
                            error!("accept error: {}", e);
                        }
                    },
                }
            }
            info!("mesh transport on {} stopped", self.local_addr);
        })
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        std::time::Duration,
        tokio::{io::AsyncWriteExt, sync::mpsc},
    };

    #[tokio::test]
    async fn test_listener_hands_off_sockets() {
        let listener = TransportListener::bind("127.0.0.1:0".parse().unwrap())
            .await
            .unwrap();
        let addr = listener.local_addr();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let task = listener.spawn(cancel.clone(), move |stream, from| {
            let _ = tx.send((stream, from));
        });

        let mut client = TcpStream::connect(addr).await.unwrap();
        client.write_all(b"x").await.unwrap();
        let (_stream, from) = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("timeout waiting for socket")
            .expect("channel closed");
        assert_eq!(from, client.local_addr().unwrap());

        cancel.cancel();
        task.await.unwrap();
    }
}
