//! Query client facade
//!
//! One [`QueryClient`] per remote query port. Every operation borrows a
//! connection from the owned pool, drives one request/response exchange over
//! it, and returns it flagged healthy or unhealthy.
//!
//! ```text
//! ---> Request                 ---> Request
//!      <--- Response                <--- Response
//!      <--- Response                <--- Response
//!      ...                     ---> EndStream
//!      <--- StreamEnd               <--- Response (residue)
//!                                   <--- StreamEnd
//! ```

use crate::config::ClientConfig;
use crate::conn::{Conn, Dialer, TcpDialer};
use crate::pool::ConnectionPool;
use crate::{Error, Result};
use scanport_protocol::{IndexStats, Request, Response, Span};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

/// Pooled client for one scanport endpoint.
pub struct QueryClient {
    raddr: String,
    pool: Arc<ConnectionPool>,
    read_deadline: Duration,
    write_deadline: Duration,
    log_prefix: String,
}

impl QueryClient {
    /// Client over plain TCP.
    pub fn new(raddr: impl Into<String>, config: ClientConfig) -> Self {
        Self::with_dialer(raddr, config, Arc::new(TcpDialer))
    }

    /// Client with a custom dialer (TLS termination, authentication, test
    /// transports).
    pub fn with_dialer(
        raddr: impl Into<String>,
        config: ClientConfig,
        dialer: Arc<dyn Dialer>,
    ) -> Self {
        let raddr = raddr.into();
        let pool = ConnectionPool::new(raddr.clone(), &config, dialer);
        let client = Self {
            log_prefix: format!("[ScanportClient:{raddr:?}]"),
            raddr,
            pool,
            read_deadline: config.read_deadline,
            write_deadline: config.write_deadline,
        };
        info!("{} started ...", client.log_prefix);
        client
    }

    /// Remote address this client talks to.
    pub fn raddr(&self) -> &str {
        &self.raddr
    }

    /// The underlying pool, exposed for observability.
    pub fn pool(&self) -> &Arc<ConnectionPool> {
        &self.pool
    }

    /// Close the client and every open connection. Idempotent.
    pub fn close(&self) {
        self.pool.close();
        info!("{} ... stopped", self.log_prefix);
    }

    /// Aggregate statistics for an index span.
    ///
    /// A single-shot exchange: one statistics response followed by the
    /// end-of-stream marker. A server-side failure carried inside the
    /// response surfaces as [`Error::Server`] without affecting the
    /// connection's health.
    pub async fn statistics(&self, index: &str, bucket: &str, span: Span) -> Result<IndexStats> {
        let mut conn = self.pool.acquire().await?;
        let mut healthy = true;
        let result = self
            .statistics_on(&mut conn, index, bucket, span, &mut healthy)
            .await;
        self.pool.release(conn, healthy);
        result
    }

    async fn statistics_on(
        &self,
        conn: &mut Conn,
        index: &str,
        bucket: &str,
        span: Span,
        healthy: &mut bool,
    ) -> Result<IndexStats> {
        let req = Request::Statistics {
            index: index.to_owned(),
            bucket: bucket.to_owned(),
            span,
        };
        if let Err(err) = conn.send(&req, self.write_deadline).await {
            error!(
                "{} statistics() request transport failed `{}`",
                self.log_prefix, err
            );
            *healthy = false;
            return Err(err);
        }

        let resp = match conn.receive(self.read_deadline).await {
            Ok(resp) => resp,
            Err(err) => {
                error!(
                    "{} statistics() response transport failed `{}`",
                    self.log_prefix, err
                );
                *healthy = false;
                return Err(err);
            }
        };
        let (stats, embedded_err) = match resp {
            Response::Statistics { stats, error } => (stats, error),
            _ => {
                *healthy = false;
                return Err(Error::Protocol);
            }
        };

        match conn.receive(self.read_deadline).await {
            Ok(Response::StreamEnd) => {}
            Ok(_) => {
                *healthy = false;
                return Err(Error::Protocol);
            }
            Err(err) => {
                error!(
                    "{} statistics() response transport failed `{}`",
                    self.log_prefix, err
                );
                *healthy = false;
                return Err(err);
            }
        }

        if let Some(msg) = embedded_err {
            return Err(Error::Server(msg));
        }
        stats.ok_or(Error::Protocol)
    }

    /// Range scan over an index span.
    ///
    /// `handler` is invoked once per response frame (or transport error) and
    /// decides whether the stream continues. Returning `false` triggers a
    /// cooperative stream close: the client asks the server to end the
    /// stream and drains residue frames until the end-of-stream marker, so
    /// no half-open stream is ever left behind.
    ///
    /// Transport failures after the request is on the wire are delivered to
    /// the handler, not returned.
    pub async fn scan<F>(
        &self,
        index: &str,
        bucket: &str,
        span: Span,
        distinct: bool,
        page_size: i64,
        limit: i64,
        handler: F,
    ) -> Result<()>
    where
        F: FnMut(Result<Response>) -> bool + Send,
    {
        let req = Request::Scan {
            index: index.to_owned(),
            bucket: bucket.to_owned(),
            span,
            distinct,
            page_size,
            limit,
        };
        self.stream_request("scan", req, handler).await
    }

    /// Full scan of an index. Same streaming contract as [`Self::scan`].
    pub async fn scan_all<F>(
        &self,
        index: &str,
        bucket: &str,
        page_size: i64,
        limit: i64,
        handler: F,
    ) -> Result<()>
    where
        F: FnMut(Result<Response>) -> bool + Send,
    {
        let req = Request::ScanAll {
            index: index.to_owned(),
            bucket: bucket.to_owned(),
            page_size,
            limit,
        };
        self.stream_request("scan_all", req, handler).await
    }

    async fn stream_request<F>(&self, op: &str, req: Request, mut handler: F) -> Result<()>
    where
        F: FnMut(Result<Response>) -> bool + Send,
    {
        let mut conn = self.pool.acquire().await?;

        if let Err(err) = conn.send(&req, self.write_deadline).await {
            error!(
                "{} {}() request transport failed `{}`",
                self.log_prefix, op, err
            );
            self.pool.release(conn, false);
            return Err(err);
        }

        let healthy = loop {
            let (cont, healthy) = self.stream_response(&mut conn, &mut handler).await;
            if !cont {
                break healthy;
            }
        };
        self.pool.release(conn, healthy);
        Ok(())
    }

    /// Receive one frame and hand it to the handler. Returns
    /// `(continue, healthy)`.
    async fn stream_response<F>(&self, conn: &mut Conn, handler: &mut F) -> (bool, bool)
    where
        F: FnMut(Result<Response>) -> bool + Send,
    {
        match conn.receive(self.read_deadline).await {
            Err(err) => {
                if !err.is_end_of_input() {
                    error!(
                        "{} connection {} response transport failed `{}`",
                        self.log_prefix,
                        conn.id(),
                        err
                    );
                }
                handler(Err(err));
                (false, false)
            }
            Ok(Response::StreamEnd) => {
                debug!(
                    "{} connection {} received stream end",
                    self.log_prefix,
                    conn.id()
                );
                handler(Ok(Response::StreamEnd));
                (false, true)
            }
            Ok(resp) => {
                if handler(Ok(resp)) {
                    (true, true)
                } else {
                    // Caller lost interest while the stream is live.
                    match self.close_stream(conn).await {
                        Ok(()) => (false, true),
                        Err(err) => {
                            error!(
                                "{} connection {} stream close failed `{}`",
                                self.log_prefix,
                                conn.id(),
                                err
                            );
                            (false, false)
                        }
                    }
                }
            }
        }
    }

    /// Cooperative stream close: ask the server to end the stream, then
    /// drain until the end-of-stream marker arrives. End-of-input from the
    /// peer is an acceptable termination and is suppressed.
    async fn close_stream(&self, conn: &mut Conn) -> Result<()> {
        conn.send(&Request::EndStream, self.write_deadline).await?;
        debug!(
            "{} connection {} transmitted end-stream request",
            self.log_prefix,
            conn.id()
        );
        loop {
            match conn.receive(self.read_deadline).await {
                Ok(Response::StreamEnd) => return Ok(()),
                // Residue frames the server had in flight; keep draining.
                Ok(_) => continue,
                Err(err) if err.is_end_of_input() => {
                    debug!("{} connection {} closed", self.log_prefix, conn.id());
                    return Ok(());
                }
                Err(err) => return Err(err),
            }
        }
    }
}
