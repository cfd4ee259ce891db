//! Client and pool configuration

use std::time::Duration;

/// Configuration for a [`QueryClient`](crate::QueryClient) and its pool.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Idle connections kept per endpoint
    pub pool_size: usize,
    /// Additional live connections permitted beyond `pool_size`
    pub pool_overflow: usize,
    /// Maximum bytes per frame, in either direction
    pub max_payload: usize,
    /// Per-frame read deadline; resets on every frame, so a slow but
    /// progressing stream does not time out as a whole
    pub read_deadline: Duration,
    /// Per-frame write deadline
    pub write_deadline: Duration,
    /// Default acquisition budget
    pub conn_pool_timeout: Duration,
    /// How long acquisition waits for an idle connection before considering
    /// creating a new one
    pub conn_pool_avail_wait_timeout: Duration,
    /// Retention floor: the background loop never shrinks the pool below
    /// this many live connections
    pub min_pool_size_wm: i32,
    /// Maximum connections closed per shrink iteration
    pub rel_conn_batch_size: i32,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            pool_size: 32,
            pool_overflow: 8,
            max_payload: 1024 * 1024,
            read_deadline: Duration::from_secs(30),
            write_deadline: Duration::from_secs(10),
            conn_pool_timeout: Duration::from_secs(1),
            conn_pool_avail_wait_timeout: Duration::from_millis(1),
            min_pool_size_wm: 4,
            rel_conn_batch_size: 8,
        }
    }
}

impl ClientConfig {
    /// Create a new builder
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder::default()
    }
}

/// Builder for [`ClientConfig`]
#[derive(Default)]
pub struct ClientConfigBuilder {
    config: ClientConfig,
}

impl ClientConfigBuilder {
    /// Set idle pool capacity
    pub fn pool_size(mut self, size: usize) -> Self {
        self.config.pool_size = size;
        self
    }

    /// Set overflow capacity beyond the idle pool
    pub fn pool_overflow(mut self, overflow: usize) -> Self {
        self.config.pool_overflow = overflow;
        self
    }

    /// Set maximum frame payload size
    pub fn max_payload(mut self, bytes: usize) -> Self {
        self.config.max_payload = bytes;
        self
    }

    /// Set per-frame read deadline
    pub fn read_deadline(mut self, deadline: Duration) -> Self {
        self.config.read_deadline = deadline;
        self
    }

    /// Set per-frame write deadline
    pub fn write_deadline(mut self, deadline: Duration) -> Self {
        self.config.write_deadline = deadline;
        self
    }

    /// Set default acquisition budget
    pub fn conn_pool_timeout(mut self, timeout: Duration) -> Self {
        self.config.conn_pool_timeout = timeout;
        self
    }

    /// Set how long acquisition waits for an idle connection before racing
    /// creation
    pub fn conn_pool_avail_wait_timeout(mut self, timeout: Duration) -> Self {
        self.config.conn_pool_avail_wait_timeout = timeout;
        self
    }

    /// Set the retention floor
    pub fn min_pool_size_wm(mut self, watermark: i32) -> Self {
        self.config.min_pool_size_wm = watermark;
        self
    }

    /// Set the per-iteration shrink batch size
    pub fn rel_conn_batch_size(mut self, batch: i32) -> Self {
        self.config.rel_conn_batch_size = batch;
        self
    }

    /// Build the configuration
    pub fn build(self) -> ClientConfig {
        self.config
    }
}
