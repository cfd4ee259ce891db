//! Transport connection and dialer seam

use crate::{Error, Result};
use async_trait::async_trait;
use scanport_protocol::{FrameCodec, Request, Response};
use std::io;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::sync::OwnedSemaphorePermit;
use tokio::time::timeout;

/// Byte stream a connection runs over. Blanket-implemented for anything
/// async-read/write, so dialers can hand back TCP, TLS-wrapped, or in-memory
/// streams.
pub trait Transport: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> Transport for T {}

/// Type-erased transport returned by a [`Dialer`].
pub type BoxedTransport = Box<dyn Transport>;

/// Produces the byte stream for one new connection. Transport security and
/// authentication live behind this seam; the pool never sees them.
#[async_trait]
pub trait Dialer: Send + Sync {
    async fn dial(&self, host: &str) -> Result<BoxedTransport>;
}

/// Plain TCP dialer.
pub struct TcpDialer;

#[async_trait]
impl Dialer for TcpDialer {
    async fn dial(&self, host: &str) -> Result<BoxedTransport> {
        let stream = TcpStream::connect(host)
            .await
            .map_err(|e| Error::Dial(format!("{host}: {e}")))?;
        // Disable Nagle; query frames are small and latency-sensitive.
        stream
            .set_nodelay(true)
            .map_err(|e| Error::Dial(format!("{host}: {e}")))?;
        Ok(Box::new(stream))
    }
}

/// One pooled connection: the transport, its frame codec, and the create
/// permit that authorises its existence.
///
/// Dropping a `Conn` closes the transport and releases the permit, so every
/// close path (overflow discard, unhealthy return, shrink, shutdown) keeps
/// the permit accounting consistent without further bookkeeping.
pub struct Conn {
    transport: BoxedTransport,
    codec: FrameCodec,
    id: u64,
    permit: Option<OwnedSemaphorePermit>,
}

impl Conn {
    pub(crate) fn new(
        transport: BoxedTransport,
        codec: FrameCodec,
        id: u64,
        permit: Option<OwnedSemaphorePermit>,
    ) -> Self {
        Self {
            transport,
            codec,
            id,
            permit,
        }
    }

    /// Identity of this connection, unique within its pool.
    pub fn id(&self) -> u64 {
        self.id
    }

    pub(crate) fn take_permit(&mut self) -> Option<OwnedSemaphorePermit> {
        self.permit.take()
    }

    /// Send one request frame, bounded by `deadline`.
    pub async fn send(&mut self, req: &Request, deadline: Duration) -> Result<()> {
        match timeout(deadline, self.codec.send(&mut self.transport, req)).await {
            Ok(res) => res.map_err(Error::from),
            Err(_) => Err(Error::Io(io::Error::new(
                io::ErrorKind::TimedOut,
                "write deadline exceeded",
            ))),
        }
    }

    /// Receive one response frame, bounded by `deadline`.
    pub async fn receive(&mut self, deadline: Duration) -> Result<Response> {
        match timeout(deadline, self.codec.receive(&mut self.transport)).await {
            Ok(res) => res.map_err(Error::from),
            Err(_) => Err(Error::Io(io::Error::new(
                io::ErrorKind::TimedOut,
                "read deadline exceeded",
            ))),
        }
    }
}

impl std::fmt::Debug for Conn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Conn").field("id", &self.id).finish()
    }
}
