//! Pool-backed driver adapter.
//!
//! [`PgClient`] is the innermost link of every client chain: it turns each
//! operation into exactly one sqlx call on a [`PgPool`].

use crate::batch::{Batch, BatchResults};
use crate::client::{Executor, Method, Transactor, TxFn};
use crate::config::Config;
use crate::db::executor::{bounded, run, run_batch};
use crate::db::transaction::{PgTxExecutor, run_transaction};
use crate::error::{PqError, PqResult};
use crate::param::Param;
use crate::rows::{Row, Rows, RowsAffected};
use async_trait::async_trait;
use sqlx::PgPool;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Driver adapter over a PostgreSQL pool.
#[derive(Debug, Clone)]
pub struct PgClient {
    pool: PgPool,
    query_timeout: Option<Duration>,
}

impl PgClient {
    /// Wrap an existing pool.
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            query_timeout: None,
        }
    }

    /// Bound every statement by `limit`.
    pub fn with_query_timeout(mut self, limit: Option<Duration>) -> Self {
        self.query_timeout = limit.filter(|d| !d.is_zero());
        self
    }

    /// Open a pool and wait for its first connection.
    pub async fn connect(config: &Config) -> PqResult<Self> {
        let config = config.clone().with_defaults();
        config.validate()?;
        let options = config.connect_options()?;

        info!(
            pool = %config.pool_name(),
            url = %config.redacted_conn_string(),
            max_connections = config.max_connections,
            "Connecting to PostgreSQL"
        );

        let pool = config
            .pool_options()
            .connect_with(options)
            .await
            .map_err(|e| {
                PqError::connection(format!(
                    "failed to connect to {}: {}",
                    config.redacted_conn_string(),
                    e
                ))
            })?;

        debug!(pool = %config.pool_name(), size = pool.size(), "Pool ready");
        Ok(Self::new(pool).with_query_timeout(config.query_timeout))
    }

    /// Build a pool that opens connections on first use.
    pub fn connect_lazy(config: &Config) -> PqResult<Self> {
        let config = config.clone().with_defaults();
        config.validate()?;
        let options = config.connect_options()?;
        let pool = config.pool_options().connect_lazy_with(options);
        Ok(Self::new(pool).with_query_timeout(config.query_timeout))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn query_timeout(&self) -> Option<Duration> {
        self.query_timeout
    }
}

#[async_trait]
impl Executor for PgClient {
    async fn exec(&self, sql: &str, args: &[Param]) -> PqResult<RowsAffected> {
        let set = bounded(self.query_timeout, Method::Exec, run(&self.pool, sql, args)).await?;
        Ok(RowsAffected::new(set.rows_affected))
    }

    async fn query(&self, sql: &str, args: &[Param]) -> PqResult<Rows> {
        let set = bounded(self.query_timeout, Method::Query, run(&self.pool, sql, args)).await?;
        Ok(Rows::new(set.rows))
    }

    async fn query_row(&self, sql: &str, args: &[Param]) -> Row {
        match bounded(self.query_timeout, Method::QueryRow, run(&self.pool, sql, args)).await {
            Ok(set) => Row::new(set.rows.into_iter().next()),
            Err(err) => Row::from_error(err),
        }
    }

    /// Runs the batch on one connection inside an implicit transaction. The
    /// first failing statement rolls the whole batch back.
    async fn send_batch(&self, batch: Batch) -> BatchResults {
        if batch.is_empty() {
            return BatchResults::empty();
        }

        let mut tx = match self.pool.begin().await {
            Ok(tx) => tx,
            Err(e) => return BatchResults::aborted(PqError::begin(e.into()), batch.len()),
        };

        let (results, succeeded) = run_batch(&mut tx, &batch, self.query_timeout).await;

        if succeeded {
            if let Err(e) = tx.commit().await {
                return BatchResults::aborted(PqError::commit(e.into()), batch.len());
            }
        } else if let Err(e) = tx.rollback().await {
            warn!(error = %e, statements = batch.len(), "Failed to roll back aborted batch");
        }

        results
    }
}

#[async_trait]
impl Transactor for PgClient {
    async fn transaction(&self, f: TxFn) -> PqResult<()> {
        let tx = PgTxExecutor::start(&self.pool, self.query_timeout).await?;
        run_transaction(tx, f).await
    }
}
