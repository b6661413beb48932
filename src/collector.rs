//! Connection pool registry and gauge publisher.
//!
//! A [`PoolCollector`] is created by the application and handed to every
//! client constructor. Each client registers its pool under a unique name;
//! scraping reads the live statistics of every registered pool and publishes
//! them as gauges labeled with that name:
//!
//! - `db_open_connections` - connections checked out of the pool
//! - `db_unused_connections` - idle connections
//! - `db_max_connections` - configured pool capacity

use crate::error::{PqError, PqResult};
use metrics::{describe_gauge, gauge};
use sqlx::PgPool;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Name used when a pool is registered with an empty name.
pub const DEFAULT_POOL_NAME: &str = "default";

pub const OPEN_CONNECTIONS: &str = "db_open_connections";
pub const UNUSED_CONNECTIONS: &str = "db_unused_connections";
pub const MAX_CONNECTIONS: &str = "db_max_connections";

/// Live statistics of a connection pool.
pub trait PoolStats: Send + Sync {
    /// Connections currently checked out.
    fn acquired(&self) -> u32;
    fn idle(&self) -> u32;
    fn max(&self) -> u32;
}

impl PoolStats for PgPool {
    fn acquired(&self) -> u32 {
        self.size().saturating_sub(self.num_idle() as u32)
    }

    fn idle(&self) -> u32 {
        self.num_idle() as u32
    }

    fn max(&self) -> u32 {
        self.options().get_max_connections()
    }
}

/// Gauge values for one registered pool at scrape time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolGauges {
    pub name: String,
    pub acquired: u32,
    pub idle: u32,
    pub max: u32,
}

impl PoolGauges {
    fn read(name: &str, pool: &dyn PoolStats) -> Self {
        Self {
            name: name.to_string(),
            acquired: pool.acquired(),
            idle: pool.idle(),
            max: pool.max(),
        }
    }

    /// Publish the three gauges through the `metrics` facade.
    pub fn publish(&self) {
        gauge!(OPEN_CONNECTIONS, "name" => self.name.clone()).set(self.acquired as f64);
        gauge!(UNUSED_CONNECTIONS, "name" => self.name.clone()).set(self.idle as f64);
        gauge!(MAX_CONNECTIONS, "name" => self.name.clone()).set(self.max as f64);
    }
}

/// Registry of named pools.
///
/// Cloning is cheap; clones share the same registry.
#[derive(Clone, Default)]
pub struct PoolCollector {
    pools: Arc<RwLock<HashMap<String, Arc<dyn PoolStats>>>>,
}

impl PoolCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `pool` under `name` and return the name actually used.
    ///
    /// An empty name registers as [`DEFAULT_POOL_NAME`]. Fails with
    /// [`PqError::AlreadyRegistered`] if the name is taken.
    pub async fn register<P>(&self, name: &str, pool: P) -> PqResult<String>
    where
        P: PoolStats + 'static,
    {
        let name = resolve_name(name);
        let mut pools = self.pools.write().await;
        if pools.contains_key(&name) {
            return Err(PqError::AlreadyRegistered { name });
        }
        pools.insert(name.clone(), Arc::new(pool));
        debug!(pool = %name, registered = pools.len(), "Pool registered");
        Ok(name)
    }

    /// Remove a pool. Returns whether it was registered.
    pub async fn unregister(&self, name: &str) -> bool {
        let name = resolve_name(name);
        let removed = self.pools.write().await.remove(&name).is_some();
        if removed {
            debug!(pool = %name, "Pool unregistered");
        }
        removed
    }

    pub async fn contains(&self, name: &str) -> bool {
        self.pools.read().await.contains_key(&resolve_name(name))
    }

    pub async fn len(&self) -> usize {
        self.pools.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.pools.read().await.is_empty()
    }

    /// Registered names, sorted.
    pub async fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.pools.read().await.keys().cloned().collect();
        names.sort();
        names
    }

    /// Read the statistics of every registered pool, sorted by name.
    pub async fn snapshot(&self) -> Vec<PoolGauges> {
        let mut gauges: Vec<PoolGauges> = {
            let pools = self.pools.read().await;
            pools
                .iter()
                .map(|(name, pool)| PoolGauges::read(name, pool.as_ref()))
                .collect()
        };
        gauges.sort_by(|a, b| a.name.cmp(&b.name));
        gauges
    }

    /// Scrape every pool and publish its gauges.
    pub async fn collect(&self) -> Vec<PoolGauges> {
        let gauges = self.snapshot().await;
        for pool in &gauges {
            pool.publish();
        }
        gauges
    }

    /// Spawn a task that runs [`collect`](Self::collect) every `every`.
    ///
    /// The task runs until the returned handle is aborted or the runtime
    /// shuts down. A zero interval is rejected.
    pub fn start_scrape_task(&self, every: Duration) -> PqResult<JoinHandle<()>> {
        if every.is_zero() {
            return Err(PqError::config("scrape interval must be greater than zero"));
        }
        let collector = self.clone();
        info!(interval_ms = every.as_millis() as u64, "Starting pool scrape task");
        Ok(tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            loop {
                interval.tick().await;
                collector.collect().await;
            }
        }))
    }
}

impl std::fmt::Debug for PoolCollector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoolCollector")
            .field("shared", &Arc::strong_count(&self.pools))
            .finish()
    }
}

fn resolve_name(name: &str) -> String {
    if name.is_empty() {
        DEFAULT_POOL_NAME.to_string()
    } else {
        name.to_string()
    }
}

/// Register descriptions for the pool gauges with the installed recorder.
pub fn describe_pool_metrics() {
    describe_gauge!(OPEN_CONNECTIONS, "Connections checked out of the pool");
    describe_gauge!(UNUSED_CONNECTIONS, "Idle connections in the pool");
    describe_gauge!(MAX_CONNECTIONS, "Maximum number of connections in the pool");
}
