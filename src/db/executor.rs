//! Statement execution on a pool or an open connection.
//!
//! Every statement is read to completion: row-returning statements have
//! their rows buffered, everything else contributes to the affected row
//! count. When a statement carries no arguments the raw SQL is sent through
//! the simple query protocol, which also allows multi-statement scripts.

use crate::batch::{Batch, BatchResults};
use crate::client::Method;
use crate::db::params::bind_all;
use crate::error::{PqError, PqResult};
use crate::param::Param;
use crate::rows::ResultSet;
use futures_util::TryStreamExt;
use sqlx::postgres::PgConnection;
use sqlx::{Either, Postgres};
use std::future::Future;
use std::time::Duration;
use tokio::time::timeout;
use tracing::debug;

/// Run one statement through any sqlx executor.
pub(crate) async fn run<'c, E>(executor: E, sql: &'c str, args: &'c [Param]) -> PqResult<ResultSet>
where
    E: sqlx::Executor<'c, Database = Postgres>,
{
    debug!(sql = %sql, params = args.len(), "Executing statement");

    let mut stream = if args.is_empty() {
        executor.fetch_many(sql)
    } else {
        executor.fetch_many(bind_all(sql, args))
    };

    let mut set = ResultSet::default();
    while let Some(step) = stream.try_next().await? {
        match step {
            Either::Left(done) => set.rows_affected += done.rows_affected(),
            Either::Right(row) => set.rows.push(row),
        }
    }
    Ok(set)
}

/// Bound `fut` by the statement timeout, if one is configured.
pub(crate) async fn bounded<T, F>(limit: Option<Duration>, method: Method, fut: F) -> PqResult<T>
where
    F: Future<Output = PqResult<T>>,
{
    match limit {
        None => fut.await,
        Some(limit) => match timeout(limit, fut).await {
            Ok(result) => result,
            Err(_) => Err(timeout_error(method, limit)),
        },
    }
}

fn timeout_error(method: Method, limit: Duration) -> PqError {
    PqError::timeout(format!("{} exceeded {}ms", method, limit.as_millis()))
}

/// Run every queued statement in order on one connection.
///
/// Stops at the first failure; the failing statement reports its own error
/// and every later one reports [`PqError::BatchAborted`]. Returns the
/// results together with a flag telling whether all statements succeeded.
pub(crate) async fn run_batch(
    conn: &mut PgConnection,
    batch: &Batch,
    limit: Option<Duration>,
) -> (BatchResults, bool) {
    let mut results = Vec::with_capacity(batch.len());
    let mut failed = None;

    for (index, item) in batch.iter().enumerate() {
        if let Some(failed) = failed {
            results.push(Err(PqError::BatchAborted { index, failed }));
            continue;
        }
        let result = bounded(
            limit,
            Method::SendBatch,
            run(&mut *conn, item.sql(), item.args()),
        )
        .await;
        if result.is_err() {
            failed = Some(index);
        }
        results.push(result);
    }

    (BatchResults::new(results), failed.is_none())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_bounded_without_limit_passes_result_through() {
        let result = bounded(None, Method::Exec, async { Ok::<_, PqError>(5) }).await;
        assert_eq!(result.unwrap(), 5);
    }

    #[tokio::test]
    async fn test_bounded_times_out() {
        let result: PqResult<()> = bounded(
            Some(Duration::from_millis(10)),
            Method::Query,
            async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            },
        )
        .await;
        let err = result.unwrap_err();
        assert_eq!(err.to_string(), "Timeout: query exceeded 10ms");
    }

    #[tokio::test]
    async fn test_bounded_keeps_inner_error() {
        let result: PqResult<()> = bounded(
            Some(Duration::from_secs(1)),
            Method::Exec,
            async { Err(PqError::NoRows) },
        )
        .await;
        assert!(result.unwrap_err().is_no_rows());
    }
}
