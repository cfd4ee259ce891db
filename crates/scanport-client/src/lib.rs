//! # scanport-client
//!
//! Async Rust client for scanport, the streaming query port for secondary
//! index scans.
//!
//! ## Features
//!
//! - **Connection pooling**: a bounded reservoir of reusable connections per
//!   endpoint, with controlled overflow under contention
//! - **Adaptive retention**: a background routine tracks sustained load via
//!   an EWMA and shrinks the pool in bounded batches without starving live
//!   traffic
//! - **Health-aware returns**: connections that saw a transport or protocol
//!   failure are closed instead of recycled
//! - **Streaming scans**: per-frame deadlines, handler-driven consumption,
//!   and cooperative stream close on cancellation
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use scanport_client::{ClientConfig, QueryClient};
//! use scanport_protocol::{Inclusion, Span};
//!
//! # async fn example() -> scanport_client::Result<()> {
//! let client = QueryClient::new("127.0.0.1:9101", ClientConfig::default());
//!
//! // Single-shot statistics.
//! let stats = client
//!     .statistics("idx-age", "users", Span::range("20", "40", Inclusion::Both))
//!     .await?;
//! println!("{} entries in span", stats.count);
//!
//! // Streaming scan; return false from the handler to cancel early.
//! client
//!     .scan_all("idx-age", "users", 100, 0, |item| {
//!         matches!(item, Ok(resp) if !resp.is_stream_end())
//!     })
//!     .await?;
//!
//! client.close();
//! # Ok(())
//! # }
//! ```
//!
//! ## Acquisition observability
//!
//! An optional process-wide hook is notified once per pool acquisition with
//! the host, the stage that concluded the attempt, the start time, and the
//! error if any. See [`set_acquire_hook`].

pub mod client;
pub mod config;
pub mod conn;
pub mod error;
mod ewma;
pub mod pool;

pub use client::QueryClient;
pub use config::{ClientConfig, ClientConfigBuilder};
pub use conn::{BoxedTransport, Conn, Dialer, TcpDialer, Transport};
pub use error::{Error, Result};
pub use pool::{set_acquire_hook, AcquireHook, ConnectionPool, PoolStats};

// Re-export protocol types used in the public API.
pub use scanport_protocol::{
    Inclusion, IndexEntry, IndexStats, Request, Response, ScanRange, Span,
};
