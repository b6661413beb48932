//! Client decorators.
//!
//! Each decorator wraps any [`Client`] and adds one cross-cutting concern
//! without changing results or errors:
//!
//! ```ignore
//! let driver: Arc<dyn Client> = Arc::new(PgClient::new(pool));
//!
//! // Outer to inner: metrics see the time spent tracing too
//! let client = compose(
//!     driver,
//!     &[Box::new(MeasureLayer::new("orders")), Box::new(TraceLayer::new(false))],
//! );
//!
//! client.exec("DELETE FROM carts WHERE expired", &[]).await?;
//! ```
//!
//! # Available decorators
//!
//! - [`Measured`] - latency histogram per client name and method
//! - [`Traced`] - one `tracing` span per operation

mod measured;
mod traced;

pub use measured::{
    DurationObserver, HistogramObserver, MeasureLayer, Measured, OPERATION_DURATIONS,
    describe_operation_metrics,
};
pub use traced::{TraceLayer, Traced};

use crate::client::Client;
use std::sync::Arc;

/// Wraps a client in one decorator.
pub trait Layer: Send + Sync {
    fn wrap(&self, inner: Arc<dyn Client>) -> Arc<dyn Client>;
}

/// Apply `layers` around `inner`. The first layer ends up outermost.
pub fn compose(inner: Arc<dyn Client>, layers: &[Box<dyn Layer>]) -> Arc<dyn Client> {
    layers
        .iter()
        .rev()
        .fold(inner, |chain, layer| layer.wrap(chain))
}

#[cfg(test)]
pub(crate) mod testing {
    //! Fakes shared by the decorator tests.

    use crate::batch::{Batch, BatchResults};
    use crate::client::{Executor, Transactor, TxFn};
    use crate::error::{PqError, PqResult};
    use crate::param::Param;
    use crate::rows::{Row, Rows, RowsAffected};
    use async_trait::async_trait;
    use std::sync::Mutex;

    pub(crate) fn duplicate_key() -> PqError {
        PqError::database(
            "duplicate key value violates unique constraint \"users_pkey\"",
            Some("23505".to_string()),
            Some("users_pkey".to_string()),
        )
    }

    /// Client that answers without a database. With `fail` set every
    /// operation fails with a unique violation.
    #[derive(Default)]
    pub(crate) struct FakeClient {
        pub(crate) fail: bool,
        pub(crate) calls: Mutex<Vec<String>>,
    }

    impl FakeClient {
        pub(crate) fn failing() -> Self {
            Self {
                fail: true,
                ..Default::default()
            }
        }

        pub(crate) fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        fn record(&self, call: impl Into<String>) {
            self.calls.lock().unwrap().push(call.into());
        }
    }

    #[async_trait]
    impl Executor for FakeClient {
        async fn exec(&self, sql: &str, _args: &[Param]) -> PqResult<RowsAffected> {
            self.record(format!("exec:{sql}"));
            if self.fail {
                return Err(duplicate_key());
            }
            Ok(RowsAffected::new(7))
        }

        async fn query(&self, sql: &str, _args: &[Param]) -> PqResult<Rows> {
            self.record(format!("query:{sql}"));
            if self.fail {
                return Err(duplicate_key());
            }
            Ok(Rows::empty())
        }

        async fn query_row(&self, sql: &str, _args: &[Param]) -> Row {
            self.record(format!("query_row:{sql}"));
            if self.fail {
                return Row::from_error(duplicate_key());
            }
            Row::empty()
        }

        async fn send_batch(&self, batch: Batch) -> BatchResults {
            self.record(format!("send_batch:{}", batch.len()));
            if self.fail {
                return BatchResults::aborted(duplicate_key(), batch.len());
            }
            BatchResults::empty()
        }
    }

    #[async_trait]
    impl Transactor for FakeClient {
        async fn transaction(&self, f: TxFn) -> PqResult<()> {
            self.record("transaction");
            f(self).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::FakeClient;
    use super::*;
    use crate::batch::{Batch, BatchResults};
    use crate::client::{Executor, Transactor, TxFn};
    use crate::error::PqResult;
    use crate::param::Param;
    use crate::rows::{Row, Rows, RowsAffected};
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Appends its tag to a shared log before delegating.
    struct Tagged {
        tag: &'static str,
        log: Arc<Mutex<Vec<&'static str>>>,
        inner: Arc<dyn Client>,
    }

    #[async_trait]
    impl Executor for Tagged {
        async fn exec(&self, sql: &str, args: &[Param]) -> PqResult<RowsAffected> {
            self.log.lock().unwrap().push(self.tag);
            self.inner.exec(sql, args).await
        }

        async fn query(&self, sql: &str, args: &[Param]) -> PqResult<Rows> {
            self.inner.query(sql, args).await
        }

        async fn query_row(&self, sql: &str, args: &[Param]) -> Row {
            self.inner.query_row(sql, args).await
        }

        async fn send_batch(&self, batch: Batch) -> BatchResults {
            self.inner.send_batch(batch).await
        }
    }

    #[async_trait]
    impl Transactor for Tagged {
        async fn transaction(&self, f: TxFn) -> PqResult<()> {
            self.inner.transaction(f).await
        }
    }

    struct TagLayer {
        tag: &'static str,
        log: Arc<Mutex<Vec<&'static str>>>,
    }

    impl Layer for TagLayer {
        fn wrap(&self, inner: Arc<dyn Client>) -> Arc<dyn Client> {
            Arc::new(Tagged {
                tag: self.tag,
                log: self.log.clone(),
                inner,
            })
        }
    }

    #[tokio::test]
    async fn test_compose_first_layer_is_outermost() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let layers: Vec<Box<dyn Layer>> = vec![
            Box::new(TagLayer {
                tag: "outer",
                log: log.clone(),
            }),
            Box::new(TagLayer {
                tag: "inner",
                log: log.clone(),
            }),
        ];
        let client = compose(Arc::new(FakeClient::default()), &layers);

        let affected = client.exec("SELECT 1", &[]).await.unwrap();
        assert_eq!(affected.rows_affected(), 7);
        assert_eq!(*log.lock().unwrap(), ["outer", "inner"]);
    }

    #[tokio::test]
    async fn test_compose_without_layers_is_identity() {
        let fake = Arc::new(FakeClient::default());
        let client = compose(fake.clone(), &[]);
        client.query("SELECT 1", &[]).await.unwrap();
        assert_eq!(fake.calls(), ["query:SELECT 1"]);
    }
}
