//! Latency metrics decorator.

use crate::batch::{Batch, BatchResults};
use crate::client::{Client, Executor, Method, Transactor, TxFn, tx_fn};
use crate::error::PqResult;
use crate::middleware::Layer;
use crate::param::Param;
use crate::rows::{Row, Rows, RowsAffected};
use async_trait::async_trait;
use metrics::{Unit, describe_histogram, histogram};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Histogram of operation latencies, labeled `client_name` and `method`.
pub const OPERATION_DURATIONS: &str = "pq_operations_durations_seconds";

/// Receives one observation per completed operation.
pub trait DurationObserver: Send + Sync {
    fn observe(&self, client_name: &str, method: Method, elapsed: Duration);
}

/// Records into [`OPERATION_DURATIONS`] through the `metrics` facade.
#[derive(Debug, Default, Clone, Copy)]
pub struct HistogramObserver;

impl DurationObserver for HistogramObserver {
    fn observe(&self, client_name: &str, method: Method, elapsed: Duration) {
        histogram!(
            OPERATION_DURATIONS,
            "client_name" => client_name.to_string(),
            "method" => method.as_str()
        )
        .record(elapsed.as_secs_f64());
    }
}

/// Register the histogram description with the installed recorder.
pub fn describe_operation_metrics() {
    describe_histogram!(
        OPERATION_DURATIONS,
        Unit::Seconds,
        "Duration of PostgreSQL client operations"
    );
}

/// Wrapper that records the wall-clock duration of every operation.
///
/// Successful and failed calls are both observed. Statements issued inside
/// a transaction callback are measured on their own as well as being part
/// of the `transaction` observation.
///
/// # Example
///
/// ```ignore
/// let client = Measured::new(PgClient::new(pool), "orders");
/// ```
pub struct Measured<C> {
    inner: C,
    name: Arc<str>,
    observer: Arc<dyn DurationObserver>,
}

impl<C> Measured<C> {
    /// Wrap `inner`, labeling its observations with `client_name`.
    pub fn new(inner: C, client_name: impl Into<String>) -> Self {
        Self::with_observer(inner, client_name, Arc::new(HistogramObserver))
    }

    pub fn with_observer(
        inner: C,
        client_name: impl Into<String>,
        observer: Arc<dyn DurationObserver>,
    ) -> Self {
        Self {
            inner,
            name: Arc::from(client_name.into()),
            observer,
        }
    }

    pub fn client_name(&self) -> &str {
        &self.name
    }

    /// Get a reference to the inner client.
    pub fn inner(&self) -> &C {
        &self.inner
    }

    /// Consume the wrapper and return the inner client.
    pub fn into_inner(self) -> C {
        self.inner
    }

    async fn timed<T>(&self, method: Method, fut: impl Future<Output = T>) -> T {
        let start = Instant::now();
        let out = fut.await;
        self.observer.observe(&self.name, method, start.elapsed());
        out
    }
}

#[async_trait]
impl<C: Executor> Executor for Measured<C> {
    async fn exec(&self, sql: &str, args: &[Param]) -> PqResult<RowsAffected> {
        self.timed(Method::Exec, self.inner.exec(sql, args)).await
    }

    async fn query(&self, sql: &str, args: &[Param]) -> PqResult<Rows> {
        self.timed(Method::Query, self.inner.query(sql, args)).await
    }

    async fn query_row(&self, sql: &str, args: &[Param]) -> Row {
        self.timed(Method::QueryRow, self.inner.query_row(sql, args))
            .await
    }

    async fn send_batch(&self, batch: Batch) -> BatchResults {
        self.timed(Method::SendBatch, self.inner.send_batch(batch))
            .await
    }
}

#[async_trait]
impl<C: Transactor> Transactor for Measured<C> {
    async fn transaction(&self, f: TxFn) -> PqResult<()> {
        let name = Arc::clone(&self.name);
        let observer = Arc::clone(&self.observer);
        let measured_fn = tx_fn(move |tx| {
            Box::pin(async move {
                let tx = Measured {
                    inner: tx,
                    name,
                    observer,
                };
                f(&tx).await
            })
        });
        self.timed(Method::Transaction, self.inner.transaction(measured_fn))
            .await
    }
}

/// [`Layer`] that adds [`Measured`].
#[derive(Clone)]
pub struct MeasureLayer {
    client_name: String,
    observer: Arc<dyn DurationObserver>,
}

impl MeasureLayer {
    pub fn new(client_name: impl Into<String>) -> Self {
        Self::with_observer(client_name, Arc::new(HistogramObserver))
    }

    pub fn with_observer(
        client_name: impl Into<String>,
        observer: Arc<dyn DurationObserver>,
    ) -> Self {
        Self {
            client_name: client_name.into(),
            observer,
        }
    }
}

impl Layer for MeasureLayer {
    fn wrap(&self, inner: Arc<dyn Client>) -> Arc<dyn Client> {
        Arc::new(Measured::with_observer(
            inner,
            self.client_name.clone(),
            Arc::clone(&self.observer),
        ))
    }
}
