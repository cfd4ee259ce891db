//! Bounded connection pool with EWMA-driven retention
//!
//! The pool keeps up to `pool_size` idle connections in a bounded channel
//! and authorises up to `pool_size + pool_overflow` live connections through
//! a counting semaphore of create permits. One permit is held for every
//! existing connection, idle or borrowed; the permit travels inside the
//! [`Conn`] itself, so any path that drops a connection also releases its
//! slot.
//!
//! Acquisition is a three-stage race tuned for hot callers: a non-blocking
//! fast path, a short bounded wait for a peer to return a connection, then a
//! race between an idle arrival, a create permit, and the caller's budget.
//!
//! A background routine samples the active-connection count once per second
//! into a five-minute EWMA and closes surplus idle connections in bounded
//! batches, so bursty workloads do not oscillate the pool size.

use crate::config::ClientConfig;
use crate::conn::{Conn, Dialer};
use crate::ewma::Ewma;
use crate::{Error, Result};
use async_channel::{Receiver, Sender, TryRecvError, TrySendError};
use once_cell::sync::Lazy;
use scanport_protocol::{FrameCodec, WireFormat};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use tokio::sync::{watch, OwnedSemaphorePermit, Semaphore};
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

// Tick cadence of the release routine. The EWMA decay constant is derived
// from the five-second tick; change them together.
const CONN_RELEASE_INTERVAL: u32 = 5;
// Seconds between connection-count log lines.
const CONN_COUNT_LOG_INTERVAL: u32 = 60;

// ============================================================================
// Acquisition hook
// ============================================================================

/// Process-wide observability callback, notified once per acquisition with
/// the host, the stage that concluded the attempt (`short-circuit`,
/// `avail1`, `avail2`, `create`), the start time, and the error if any.
pub type AcquireHook = Arc<dyn Fn(&str, &'static str, Instant, Option<&Error>) + Send + Sync>;

static ACQUIRE_HOOK: Lazy<RwLock<Option<AcquireHook>>> = Lazy::new(|| RwLock::new(None));

/// Install or clear the process-wide acquisition hook.
pub fn set_acquire_hook(hook: Option<AcquireHook>) {
    *ACQUIRE_HOOK.write().expect("acquire hook lock poisoned") = hook;
}

fn fire_acquire_hook(host: &str, stage: &'static str, start: Instant, err: Option<&Error>) {
    let hook = ACQUIRE_HOOK
        .read()
        .expect("acquire hook lock poisoned")
        .clone();
    if let Some(hook) = hook {
        // The hook is best-effort observability; a panicking hook must not
        // take the pool down with it.
        if catch_unwind(AssertUnwindSafe(|| hook(host, stage, start, err))).is_err() {
            warn!("acquire hook panicked; ignoring");
        }
    }
}

// ============================================================================
// Connection pool
// ============================================================================

/// Counter snapshot. The counters are maintained with independent atomics;
/// a snapshot taken under concurrent traffic is advisory, not transactional.
#[derive(Debug, Clone, Copy)]
pub struct PoolStats {
    /// Connections currently borrowed by callers
    pub active: i32,
    /// Connections currently idle in the pool
    pub free: i32,
}

/// Bounded reservoir of connections to a single host.
pub struct ConnectionPool {
    host: String,
    dialer: Arc<dyn Dialer>,
    idle_tx: Sender<Conn>,
    idle_rx: Receiver<Conn>,
    create_permits: Arc<Semaphore>,
    pool_size: usize,
    max_payload: usize,
    timeout: Duration,
    avail_timeout: Duration,
    min_pool_size_wm: i32,
    rel_conn_batch_size: i32,
    cur_active: AtomicI32,
    free_conns: AtomicI32,
    next_conn_id: AtomicU64,
    stop_tx: watch::Sender<bool>,
    closed: AtomicBool,
    log_prefix: String,
}

impl ConnectionPool {
    /// Create a pool and spawn its retention routine.
    pub fn new(host: impl Into<String>, config: &ClientConfig, dialer: Arc<dyn Dialer>) -> Arc<Self> {
        let host = host.into();
        // A zero-capacity pool still needs a channel; `release` short-circuits
        // deposits for it, so the slot is never used.
        let (idle_tx, idle_rx) = async_channel::bounded(config.pool_size.max(1));
        let (stop_tx, stop_rx) = watch::channel(false);
        let pool = Arc::new(Self {
            log_prefix: format!("[Scanport-connpool:{host}]"),
            host,
            dialer,
            idle_tx,
            idle_rx,
            create_permits: Arc::new(Semaphore::new(config.pool_size + config.pool_overflow)),
            pool_size: config.pool_size,
            max_payload: config.max_payload,
            timeout: config.conn_pool_timeout,
            avail_timeout: config.conn_pool_avail_wait_timeout,
            min_pool_size_wm: config.min_pool_size_wm,
            rel_conn_batch_size: config.rel_conn_batch_size,
            cur_active: AtomicI32::new(0),
            free_conns: AtomicI32::new(0),
            next_conn_id: AtomicU64::new(0),
            stop_tx,
            closed: AtomicBool::new(false),
        });
        info!(
            "{} started poolsize {} overflow {} low WM {} relconn batch size {} ...",
            pool.log_prefix,
            config.pool_size,
            config.pool_overflow,
            config.min_pool_size_wm,
            config.rel_conn_batch_size
        );
        Self::spawn_release_routine(&pool, stop_rx);
        pool
    }

    /// Remote endpoint this pool dials.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Snapshot of the active/free counters.
    pub fn stats(&self) -> PoolStats {
        PoolStats {
            active: self.cur_active.load(Ordering::Relaxed),
            free: self.free_conns.load(Ordering::Relaxed),
        }
    }

    /// Create permits not currently held by a connection.
    pub fn available_permits(&self) -> usize {
        self.create_permits.available_permits()
    }

    /// Acquire a connection within the configured default budget.
    pub async fn acquire(&self) -> Result<Conn> {
        self.acquire_timeout(self.timeout).await
    }

    /// Acquire a connection within `budget`.
    pub async fn acquire_timeout(&self, budget: Duration) -> Result<Conn> {
        let start = Instant::now();
        let mut stage: &'static str = "short-circuit";
        let result = self.acquire_inner(budget, &mut stage).await;
        fire_acquire_hook(&self.host, stage, start, result.as_ref().err());
        result
    }

    async fn acquire_inner(&self, budget: Duration, stage: &mut &'static str) -> Result<Conn> {
        // Stage A: non-blocking fast path.
        match self.idle_rx.try_recv() {
            Ok(conn) => {
                debug!("{} connection from pool", self.log_prefix);
                return Ok(self.book_idle(conn));
            }
            Err(TryRecvError::Closed) => return Err(Error::ClosedPool),
            Err(TryRecvError::Empty) => {}
        }

        // Stage B: give a peer a short window to return a connection before
        // considering creating one.
        match timeout(self.avail_timeout, self.idle_rx.recv()).await {
            Ok(Ok(conn)) => {
                *stage = "avail1";
                debug!("{} connection (avail1) from pool", self.log_prefix);
                return Ok(self.book_idle(conn));
            }
            Ok(Err(_)) => {
                *stage = "avail1";
                return Err(Error::ClosedPool);
            }
            Err(_) => {}
        }

        // Stage C: race an idle arrival against a create permit for the rest
        // of the caller's budget. Tie-breaks are nondeterministic.
        let deadline = sleep(budget);
        tokio::pin!(deadline);
        tokio::select! {
            res = self.idle_rx.recv() => {
                *stage = "avail2";
                match res {
                    Ok(conn) => {
                        debug!("{} connection (avail2) from pool", self.log_prefix);
                        Ok(self.book_idle(conn))
                    }
                    Err(_) => Err(Error::ClosedPool),
                }
            }
            permit = Arc::clone(&self.create_permits).acquire_owned() => {
                *stage = "create";
                let permit = permit.map_err(|_| Error::ClosedPool)?;
                // On dial failure the permit is dropped inside mk_conn,
                // releasing the slot for the next caller.
                let conn = self.mk_conn(permit).await?;
                self.cur_active.fetch_add(1, Ordering::Relaxed);
                debug!("{} connection (create) from pool", self.log_prefix);
                Ok(conn)
            }
            _ = &mut deadline => Err(Error::PoolTimeout),
        }
    }

    fn book_idle(&self, conn: Conn) -> Conn {
        self.free_conns.fetch_sub(1, Ordering::Relaxed);
        self.cur_active.fetch_add(1, Ordering::Relaxed);
        conn
    }

    async fn mk_conn(&self, permit: OwnedSemaphorePermit) -> Result<Conn> {
        info!("{} open new connection ...", self.log_prefix);
        let transport = self.dialer.dial(&self.host).await?;
        let codec = FrameCodec::new(self.max_payload, WireFormat::Postcard);
        let id = self.next_conn_id.fetch_add(1, Ordering::Relaxed);
        Ok(Conn::new(transport, codec, id, Some(permit)))
    }

    /// Return a borrowed connection.
    ///
    /// A healthy connection is deposited back for reuse unless the idle
    /// buffer is full (overflow discard) or the pool has been closed; both
    /// degrade to closing the connection locally. An unhealthy return closes
    /// the connection, shrinking live capacity by one until a later acquire
    /// creates a replacement.
    pub fn release(&self, conn: Conn, healthy: bool) {
        self.cur_active.fetch_sub(1, Ordering::Relaxed);
        if !healthy {
            info!(
                "{} closing unhealthy connection {}",
                self.log_prefix,
                conn.id()
            );
            return;
        }
        // Zero-capacity pools never bank idle connections.
        if self.pool_size == 0 {
            return;
        }
        match self.idle_tx.try_send(conn) {
            Ok(()) => {
                self.free_conns.fetch_add(1, Ordering::Relaxed);
                debug!("{} connection reclaimed to pool", self.log_prefix);
            }
            Err(TrySendError::Full(conn)) => {
                debug!(
                    "{} closing overflow connection {}",
                    self.log_prefix,
                    conn.id()
                );
                drop(conn);
            }
            Err(TrySendError::Closed(conn)) => {
                // Lost the race against close(); close locally.
                debug!(
                    "{} pool closed, closing connection {}",
                    self.log_prefix,
                    conn.id()
                );
                drop(conn);
            }
        }
    }

    /// Replace a connection the caller believes is stale.
    ///
    /// On success the old transport is closed and a fresh connection (with
    /// the old connection's create permit) is returned. On failure the
    /// original connection comes back together with the dial error, and the
    /// caller decides whether to return it unhealthy.
    pub async fn renew(&self, mut conn: Conn) -> (Conn, Result<()>) {
        match self.dialer.dial(&self.host).await {
            Ok(transport) => {
                info!(
                    "{} closing connection {} for renewal",
                    self.log_prefix,
                    conn.id()
                );
                let permit = conn.take_permit();
                let codec = FrameCodec::new(self.max_payload, WireFormat::Postcard);
                let id = self.next_conn_id.fetch_add(1, Ordering::Relaxed);
                (Conn::new(transport, codec, id, permit), Ok(()))
            }
            Err(err) => (conn, Err(err)),
        }
    }

    /// Shut the pool down. Idempotent and tolerant of concurrent returns.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let _ = self.stop_tx.send(true);
        // Wake Stage-C waiters blocked on a permit.
        self.create_permits.close();
        // No further deposits succeed past this point; a concurrent release
        // observes the closed channel and closes its connection locally.
        self.idle_rx.close();
        while let Ok(conn) = self.idle_rx.try_recv() {
            self.free_conns.fetch_sub(1, Ordering::Relaxed);
            drop(conn);
        }
        info!("{} ... stopped", self.log_prefix);
    }

    // ========================================================================
    // Retention
    // ========================================================================

    fn spawn_release_routine(pool: &Arc<Self>, mut stop_rx: watch::Receiver<bool>) {
        let weak = Arc::downgrade(pool);
        tokio::spawn(async move {
            let mut ewma = Ewma::five_minute(CONN_RELEASE_INTERVAL as u64);
            let mut i = 0u32;
            let mut j = 0u32;
            loop {
                tokio::select! {
                    _ = sleep(Duration::from_secs(1)) => {}
                    _ = stop_rx.changed() => {
                        if let Some(pool) = weak.upgrade() {
                            info!("{} stopping release routine", pool.log_prefix);
                        }
                        return;
                    }
                }
                let Some(pool) = weak.upgrade() else { return };

                let act = pool.cur_active.load(Ordering::Relaxed);
                ewma.update(act as i64);

                if i == CONN_RELEASE_INTERVAL - 1 {
                    ewma.tick();
                    if let Some(retain) = pool.conns_to_retain(ewma.rate()) {
                        debug!("{} releasing connections ...", pool.log_prefix);
                        pool.release_idle(retain);
                    }
                }

                if j == CONN_COUNT_LOG_INTERVAL - 1 {
                    info!(
                        "{} active conns {}, free conns {}",
                        pool.log_prefix,
                        act,
                        pool.free_conns.load(Ordering::Relaxed)
                    );
                }

                i = (i + 1) % CONN_RELEASE_INTERVAL;
                j = (j + 1) % CONN_COUNT_LOG_INTERVAL;
            }
        });
    }

    /// Retention target for this tick, or `None` when the pool is already at
    /// or below it. The target keeps the larger of the current active count,
    /// the smoothed sustained load, and the configured floor, and steps down
    /// by at most `rel_conn_batch_size` per iteration.
    fn conns_to_retain(&self, rate: f64) -> Option<i32> {
        let act = self.cur_active.load(Ordering::Relaxed);
        let free = self.free_conns.load(Ordering::Relaxed);
        let num = self.min_pool_size_wm.max(act.max(rate.round() as i32));
        let total = act + free;
        if total > num {
            Some(num.max(total - self.rel_conn_batch_size))
        } else {
            None
        }
    }

    fn release_idle(&self, retain: i32) {
        loop {
            let free = self.free_conns.load(Ordering::Relaxed);
            let act = self.cur_active.load(Ordering::Relaxed);
            if act + free <= retain || free <= 0 {
                break;
            }
            match self.idle_rx.try_recv() {
                Ok(conn) => {
                    self.free_conns.fetch_sub(1, Ordering::Relaxed);
                    // Dropping the connection closes its transport and
                    // releases its create permit.
                    drop(conn);
                }
                // Nothing idle right now; stop this iteration.
                Err(_) => break,
            }
        }
    }
}

impl std::fmt::Debug for ConnectionPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("host", &self.host)
            .field("pool_size", &self.pool_size)
            .field("stats", &self.stats())
            .finish()
    }
}
