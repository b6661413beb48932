//! Transaction-scoped executor and the commit/rollback protocol.

use crate::batch::{Batch, BatchResults};
use crate::client::{Executor, Method, TxFn};
use crate::db::executor::{bounded, run, run_batch};
use crate::error::{PqError, PqResult};
use crate::param::Param;
use crate::rows::{Row, Rows, RowsAffected};
use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Transaction};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::debug;

/// Access mode applied to every transaction right after `BEGIN`.
const TRANSACTION_MODE: &str =
    "SET TRANSACTION ISOLATION LEVEL READ COMMITTED, READ WRITE, NOT DEFERRABLE";

/// Fails with `25P02` when the transaction is in the aborted state.
const ABORTED_CHECK: &str = "SELECT 1";

/// Executor bound to one open transaction.
///
/// Handed to transaction callbacks as `&dyn Executor`. Statements issued
/// through it are serialized on the transaction's connection.
///
/// A failed statement is remembered. Postgres answers `COMMIT` on an aborted
/// transaction with a silent `ROLLBACK`, so commit checks the transaction
/// state first and reports [`PqError::TxAborted`] instead of success. A
/// callback that recovered with `ROLLBACK TO SAVEPOINT` still commits.
pub struct PgTxExecutor {
    tx: Mutex<Transaction<'static, Postgres>>,
    query_timeout: Option<Duration>,
    failed: AtomicBool,
}

impl PgTxExecutor {
    /// Begin a transaction on `pool` and apply the transaction mode.
    pub(crate) async fn start(pool: &PgPool, query_timeout: Option<Duration>) -> PqResult<Self> {
        use sqlx::Executor as _;

        let mut tx = pool
            .begin()
            .await
            .map_err(|e| PqError::begin(e.into()))?;
        // Dropping `tx` on failure queues the rollback.
        (&mut *tx)
            .execute(TRANSACTION_MODE)
            .await
            .map_err(|e| PqError::begin(e.into()))?;

        debug!("Transaction started");
        Ok(Self {
            tx: Mutex::new(tx),
            query_timeout,
            failed: AtomicBool::new(false),
        })
    }

    fn track<T>(&self, result: PqResult<T>) -> PqResult<T> {
        if result.is_err() {
            self.failed.store(true, Ordering::Release);
        }
        result
    }
}

#[async_trait]
impl Executor for PgTxExecutor {
    async fn exec(&self, sql: &str, args: &[Param]) -> PqResult<RowsAffected> {
        let mut tx = self.tx.lock().await;
        let result =
            bounded(self.query_timeout, Method::Exec, run(&mut **tx, sql, args)).await;
        let set = self.track(result)?;
        Ok(RowsAffected::new(set.rows_affected))
    }

    async fn query(&self, sql: &str, args: &[Param]) -> PqResult<Rows> {
        let mut tx = self.tx.lock().await;
        let result =
            bounded(self.query_timeout, Method::Query, run(&mut **tx, sql, args)).await;
        let set = self.track(result)?;
        Ok(Rows::new(set.rows))
    }

    async fn query_row(&self, sql: &str, args: &[Param]) -> Row {
        let mut tx = self.tx.lock().await;
        let result =
            bounded(self.query_timeout, Method::QueryRow, run(&mut **tx, sql, args)).await;
        match self.track(result) {
            Ok(set) => Row::new(set.rows.into_iter().next()),
            Err(err) => Row::from_error(err),
        }
    }

    /// Runs inside the surrounding transaction; a failing statement skips
    /// the rest of the batch but leaves the rollback to the callback.
    async fn send_batch(&self, batch: Batch) -> BatchResults {
        let mut tx = self.tx.lock().await;
        let (results, ok) = run_batch(&mut **tx, &batch, self.query_timeout).await;
        if !ok {
            self.failed.store(true, Ordering::Release);
        }
        results
    }
}

/// Ends a transaction one way or the other.
#[async_trait]
pub(crate) trait TxControl: Executor + Sized {
    async fn commit(self) -> PqResult<()>;
    async fn rollback(self) -> PqResult<()>;
}

#[async_trait]
impl TxControl for PgTxExecutor {
    async fn commit(self) -> PqResult<()> {
        use sqlx::Executor as _;

        let failed = self.failed.load(Ordering::Acquire);
        let mut tx = self.tx.into_inner();
        if failed && (&mut *tx).execute(ABORTED_CHECK).await.is_err() {
            tx.rollback().await?;
            debug!("Aborted transaction rolled back");
            return Err(PqError::TxAborted);
        }
        tx.commit().await?;
        debug!("Transaction committed");
        Ok(())
    }

    async fn rollback(self) -> PqResult<()> {
        self.tx.into_inner().rollback().await?;
        debug!("Transaction rolled back");
        Ok(())
    }
}

/// Run `f` against `tx`, then commit on success or roll back on failure.
///
/// A rollback failure is merged into the callback's error; a commit failure
/// is returned as [`PqError::Commit`].
pub(crate) async fn run_transaction<T: TxControl>(tx: T, f: TxFn) -> PqResult<()> {
    let outcome = f(&tx).await;
    match outcome {
        Ok(()) => tx.commit().await.map_err(PqError::commit),
        Err(cause) => match tx.rollback().await {
            Ok(()) => Err(cause),
            Err(rollback) => Err(PqError::rollback(cause, rollback)),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::tx_fn;
    use std::sync::Arc;
    use std::sync::Mutex as StdMutex;

    #[derive(Default)]
    struct FakeTx {
        commit_fails: bool,
        aborted: bool,
        rollback_fails: bool,
        log: Arc<StdMutex<Vec<String>>>,
    }

    impl FakeTx {
        fn record(&self, entry: &str) {
            self.log.lock().unwrap().push(entry.to_string());
        }
    }

    #[async_trait]
    impl Executor for FakeTx {
        async fn exec(&self, sql: &str, _args: &[Param]) -> PqResult<RowsAffected> {
            self.record(sql);
            Ok(RowsAffected::new(1))
        }

        async fn query(&self, sql: &str, _args: &[Param]) -> PqResult<Rows> {
            self.record(sql);
            Ok(Rows::empty())
        }

        async fn query_row(&self, sql: &str, _args: &[Param]) -> Row {
            self.record(sql);
            Row::empty()
        }

        async fn send_batch(&self, _batch: Batch) -> BatchResults {
            BatchResults::empty()
        }
    }

    #[async_trait]
    impl TxControl for FakeTx {
        async fn commit(self) -> PqResult<()> {
            self.record("COMMIT");
            if self.aborted {
                return Err(PqError::TxAborted);
            }
            if self.commit_fails {
                return Err(PqError::database(
                    "deferred constraint violated",
                    Some("23505".to_string()),
                    None,
                ));
            }
            Ok(())
        }

        async fn rollback(self) -> PqResult<()> {
            self.record("ROLLBACK");
            if self.rollback_fails {
                return Err(PqError::connection("connection reset"));
            }
            Ok(())
        }
    }

    fn insert_then(fail: bool) -> TxFn {
        tx_fn(move |tx| {
            Box::pin(async move {
                tx.exec("INSERT", &[]).await?;
                if fail {
                    return Err(PqError::other("callback failed"));
                }
                Ok(())
            })
        })
    }

    #[tokio::test]
    async fn test_success_commits() {
        let tx = FakeTx::default();
        let log = tx.log.clone();
        run_transaction(tx, insert_then(false)).await.unwrap();
        assert_eq!(*log.lock().unwrap(), ["INSERT", "COMMIT"]);
    }

    #[tokio::test]
    async fn test_callback_failure_rolls_back() {
        let tx = FakeTx::default();
        let log = tx.log.clone();
        let err = run_transaction(tx, insert_then(true)).await.unwrap_err();
        assert_eq!(err.to_string(), "callback failed");
        assert_eq!(*log.lock().unwrap(), ["INSERT", "ROLLBACK"]);
    }

    #[tokio::test]
    async fn test_rollback_failure_is_merged() {
        let tx = FakeTx {
            rollback_fails: true,
            ..Default::default()
        };
        let err = run_transaction(tx, insert_then(true)).await.unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("callback failed"), "{msg}");
        assert!(msg.contains("connection reset"), "{msg}");
        assert!(matches!(err, PqError::Rollback { .. }));
    }

    #[tokio::test]
    async fn test_commit_failure_is_surfaced() {
        let tx = FakeTx {
            commit_fails: true,
            ..Default::default()
        };
        let log = tx.log.clone();
        let err = run_transaction(tx, insert_then(false)).await.unwrap_err();
        assert!(err.to_string().starts_with("commit transaction: "));
        assert!(err.is_unique_violation());
        assert_eq!(*log.lock().unwrap(), ["INSERT", "COMMIT"]);
    }

    #[tokio::test]
    async fn test_aborted_transaction_is_not_reported_as_committed() {
        let tx = FakeTx {
            aborted: true,
            ..Default::default()
        };
        let err = run_transaction(tx, insert_then(false)).await.unwrap_err();
        match err {
            PqError::Commit(inner) => assert!(matches!(*inner, PqError::TxAborted)),
            other => panic!("unexpected error: {other}"),
        }
    }
}
