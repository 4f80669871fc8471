//! Transport abstraction for the sync protocol.
//!
//! A transport moves whole frames over one ordered, reliable connection.
//! [`FramedTransport`] puts a `u32` little-endian length in front of every
//! frame and works over any async byte stream: TCP in production, in-memory
//! duplex pipes in tests.

use async_trait::async_trait;
use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{Result, SyncError};
use crate::wire::limits::MAX_FRAME_LEN;

/// Frame-level transport over a single connection.
#[async_trait]
pub trait Transport: Send {
    /// Send one frame.
    async fn send(&mut self, frame: Bytes) -> Result<()>;

    /// Receive the next frame.
    ///
    /// Returns `None` when the peer closed the connection between frames.
    async fn recv(&mut self) -> Result<Option<Bytes>>;
}

/// Length-prefixed frames over an async byte stream.
pub struct FramedTransport<S> {
    stream: S,
}

impl<S> FramedTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    pub fn new(stream: S) -> Self {
        Self { stream }
    }

    pub fn into_inner(self) -> S {
        self.stream
    }
}

#[async_trait]
impl<S> Transport for FramedTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn send(&mut self, frame: Bytes) -> Result<()> {
        if frame.len() > MAX_FRAME_LEN {
            return Err(SyncError::Protocol(format!(
                "frame of {} bytes exceeds limit {}",
                frame.len(),
                MAX_FRAME_LEN
            )));
        }
        self.stream.write_u32_le(frame.len() as u32).await?;
        self.stream.write_all(&frame).await?;
        self.stream.flush().await?;
        Ok(())
    }

    async fn recv(&mut self) -> Result<Option<Bytes>> {
        let len = match self.stream.read_u32_le().await {
            Ok(len) => len as usize,
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        if len > MAX_FRAME_LEN {
            return Err(SyncError::Protocol(format!(
                "peer announced a frame of {} bytes, limit {}",
                len, MAX_FRAME_LEN
            )));
        }
        let mut buf = vec![0u8; len];
        self.stream.read_exact(&mut buf).await?;
        Ok(Some(Bytes::from(buf)))
    }
}

/// Client side: opens one connection per command.
#[async_trait]
pub trait Connector: Send + Sync {
    type Transport: Transport;

    async fn connect(&self) -> Result<Self::Transport>;
}

/// Server side: hands out accepted connections one at a time.
#[async_trait]
pub trait Listener: Send {
    type Transport: Transport;

    async fn accept(&mut self) -> Result<Self::Transport>;
}

/// TCP transport.
pub mod tcp {
    use super::*;
    use crate::config::SyncConfig;
    use std::net::SocketAddr;
    use tokio::net::{TcpListener, TcpStream};

    /// Connects to a fixed server address.
    #[derive(Debug, Clone)]
    pub struct TcpConnector {
        address: String,
    }

    impl TcpConnector {
        pub fn new(address: impl Into<String>) -> Self {
            Self {
                address: address.into(),
            }
        }

        /// Connect to `config.server_address`.
        pub fn from_config(config: &SyncConfig) -> Self {
            Self::new(config.server_address.clone())
        }

        pub fn address(&self) -> &str {
            &self.address
        }
    }

    #[async_trait]
    impl Connector for TcpConnector {
        type Transport = FramedTransport<TcpStream>;

        async fn connect(&self) -> Result<Self::Transport> {
            let stream = TcpStream::connect(&self.address)
                .await
                .map_err(|e| SyncError::Connection(format!("{}: {}", self.address, e)))?;
            stream.set_nodelay(true)?;
            Ok(FramedTransport::new(stream))
        }
    }

    /// A bound TCP socket.
    pub struct TcpAcceptor {
        listener: TcpListener,
    }

    impl TcpAcceptor {
        pub async fn bind(address: &str) -> Result<Self> {
            let listener = TcpListener::bind(address)
                .await
                .map_err(|e| SyncError::Connection(format!("bind {}: {}", address, e)))?;
            Ok(Self { listener })
        }

        pub fn local_addr(&self) -> Result<SocketAddr> {
            Ok(self.listener.local_addr()?)
        }
    }

    #[async_trait]
    impl Listener for TcpAcceptor {
        type Transport = FramedTransport<TcpStream>;

        async fn accept(&mut self) -> Result<Self::Transport> {
            let (stream, peer) = self.listener.accept().await?;
            tracing::debug!(peer = %peer, "accepted connection");
            stream.set_nodelay(true)?;
            Ok(FramedTransport::new(stream))
        }
    }
}

/// A simple in-memory transport for testing.
///
/// Connections are `tokio::io::duplex` pipes carrying the same framing as TCP.
pub mod memory {
    use super::*;
    use tokio::io::DuplexStream;
    use tokio::sync::mpsc;

    const PIPE_CAPACITY: usize = 64 * 1024;

    /// A connected pair of in-memory transports.
    pub fn pair() -> (FramedTransport<DuplexStream>, FramedTransport<DuplexStream>) {
        let (a, b) = tokio::io::duplex(PIPE_CAPACITY);
        (FramedTransport::new(a), FramedTransport::new(b))
    }

    /// Create a connector and the listener it reaches.
    pub fn memory_network() -> (MemoryConnector, MemoryListener) {
        let (tx, rx) = mpsc::channel(16);
        (MemoryConnector { tx }, MemoryListener { rx })
    }

    #[derive(Clone)]
    pub struct MemoryConnector {
        tx: mpsc::Sender<DuplexStream>,
    }

    #[async_trait]
    impl Connector for MemoryConnector {
        type Transport = FramedTransport<DuplexStream>;

        async fn connect(&self) -> Result<Self::Transport> {
            let (client, server) = tokio::io::duplex(PIPE_CAPACITY);
            self.tx
                .send(server)
                .await
                .map_err(|_| SyncError::Connection("memory listener dropped".into()))?;
            Ok(FramedTransport::new(client))
        }
    }

    pub struct MemoryListener {
        rx: mpsc::Receiver<DuplexStream>,
    }

    #[async_trait]
    impl Listener for MemoryListener {
        type Transport = FramedTransport<DuplexStream>;

        async fn accept(&mut self) -> Result<Self::Transport> {
            match self.rx.recv().await {
                Some(stream) => Ok(FramedTransport::new(stream)),
                None => Err(SyncError::Closed),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::memory::{memory_network, pair};
    use super::*;

    #[tokio::test]
    async fn test_memory_transport_send_recv() {
        let (mut a, mut b) = pair();

        a.send(Bytes::from_static(b"hello")).await.unwrap();
        a.send(Bytes::new()).await.unwrap();

        assert_eq!(b.recv().await.unwrap().unwrap(), Bytes::from_static(b"hello"));
        assert_eq!(b.recv().await.unwrap().unwrap(), Bytes::new());
    }

    #[tokio::test]
    async fn test_recv_after_close_is_none() {
        let (a, mut b) = pair();
        drop(a);
        assert!(b.recv().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_oversized_frame_rejected() {
        let (mut a, _b) = pair();
        let frame = Bytes::from(vec![0u8; MAX_FRAME_LEN + 1]);
        assert!(matches!(a.send(frame).await, Err(SyncError::Protocol(_))));
    }

    #[tokio::test]
    async fn test_memory_network_connects() {
        let (connector, mut listener) = memory_network();

        let mut client = connector.connect().await.unwrap();
        let mut server = listener.accept().await.unwrap();

        client.send(Bytes::from_static(b"ping")).await.unwrap();
        assert_eq!(server.recv().await.unwrap().unwrap(), Bytes::from_static(b"ping"));
        server.send(Bytes::from_static(b"pong")).await.unwrap();
        assert_eq!(client.recv().await.unwrap().unwrap(), Bytes::from_static(b"pong"));
    }

    #[tokio::test]
    async fn test_tcp_transport() {
        use super::tcp::{TcpAcceptor, TcpConnector};

        let mut acceptor = TcpAcceptor::bind("127.0.0.1:0").await.unwrap();
        let address = acceptor.local_addr().unwrap().to_string();

        let server = tokio::spawn(async move {
            let mut conn = acceptor.accept().await.unwrap();
            let frame = conn.recv().await.unwrap().unwrap();
            conn.send(frame).await.unwrap();
        });

        let config = crate::config::SyncConfig {
            server_address: address.clone(),
            ..Default::default()
        };
        let connector = TcpConnector::from_config(&config);
        assert_eq!(connector.address(), address);

        let mut client = connector.connect().await.unwrap();
        client.send(Bytes::from_static(b"echo")).await.unwrap();
        assert_eq!(client.recv().await.unwrap().unwrap(), Bytes::from_static(b"echo"));
        server.await.unwrap();
    }
}
