//! Shared test dialers and fixtures
#![allow(dead_code)]

use async_trait::async_trait;
use scanport_client::{BoxedTransport, Dialer, Error, Result};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use tokio::io::DuplexStream;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_test_writer()
        .try_init();
}

/// Dialer handing out in-memory streams, counting invocations. The server
/// halves are parked so the transports stay open for the test's lifetime.
pub struct MemDialer {
    dials: AtomicUsize,
    parked: Mutex<Vec<DuplexStream>>,
}

impl MemDialer {
    pub fn new() -> Self {
        Self {
            dials: AtomicUsize::new(0),
            parked: Mutex::new(Vec::new()),
        }
    }

    pub fn dials(&self) -> usize {
        self.dials.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Dialer for MemDialer {
    async fn dial(&self, _host: &str) -> Result<BoxedTransport> {
        self.dials.fetch_add(1, Ordering::SeqCst);
        let (client, server) = tokio::io::duplex(4096);
        self.parked.lock().unwrap().push(server);
        Ok(Box::new(client))
    }
}

/// Dialer that always refuses.
pub struct FailDialer;

#[async_trait]
impl Dialer for FailDialer {
    async fn dial(&self, host: &str) -> Result<BoxedTransport> {
        Err(Error::Dial(format!("{host}: connection refused")))
    }
}

/// Dialer that succeeds for the first `ok_dials` attempts and refuses
/// afterwards.
pub struct FlakyDialer {
    ok_dials: usize,
    dials: AtomicUsize,
    parked: Mutex<Vec<DuplexStream>>,
}

impl FlakyDialer {
    pub fn new(ok_dials: usize) -> Self {
        Self {
            ok_dials,
            dials: AtomicUsize::new(0),
            parked: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl Dialer for FlakyDialer {
    async fn dial(&self, host: &str) -> Result<BoxedTransport> {
        let n = self.dials.fetch_add(1, Ordering::SeqCst);
        if n >= self.ok_dials {
            return Err(Error::Dial(format!("{host}: connection refused")));
        }
        let (client, server) = tokio::io::duplex(4096);
        self.parked.lock().unwrap().push(server);
        Ok(Box::new(client))
    }
}
