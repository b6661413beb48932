//! PostgreSQL client layers.
//!
//! This library wraps a sqlx PostgreSQL pool behind a small [`Client`]
//! contract and lets cross-cutting concerns be stacked around it:
//! latency histograms ([`Measured`]), tracing spans ([`Traced`]) and pool
//! gauges ([`PoolCollector`]).
//!
//! ```ignore
//! let collector = PoolCollector::new();
//! let config = Config::new(url)
//!     .with_name("orders")
//!     .with_metrics(true)
//!     .with_tracing(true);
//! let client = new_client(config, &collector).await?;
//!
//! let result = client
//!     .exec("INSERT INTO users (email) VALUES ($1)", &params!["a@example.com"])
//!     .await;
//! if is_duplicated(&result) {
//!     // already there
//! }
//! ```

pub mod batch;
pub mod client;
pub mod collector;
pub mod config;
pub mod db;
pub mod error;
pub mod logging;
mod macros;
pub mod middleware;
pub mod param;
pub mod rows;

pub use batch::{Batch, BatchResults};
pub use client::{Client, Executor, Method, Transactor, TxFn, TxFuture, tx_fn};
pub use collector::{PoolCollector, PoolGauges, PoolStats, describe_pool_metrics};
pub use config::Config;
pub use db::{PgClient, PgTxExecutor, PqClient, new_client, new_client_lazy, new_client_with_layers};
pub use error::{PqError, PqResult, UNIQUE_VIOLATION, is_duplicated};
pub use logging::LogLevel;
pub use middleware::{
    DurationObserver, HistogramObserver, Layer, MeasureLayer, Measured, TraceLayer, Traced,
    compose, describe_operation_metrics,
};
pub use param::Param;
pub use rows::{Row, Rows, RowsAffected};

/// Register descriptions for every metric this crate emits.
pub fn describe_metrics() {
    describe_operation_metrics();
    describe_pool_metrics();
}
