//! The client contract shared by the driver adapter and every decorator.
//!
//! A [`Client`] is anything that can both execute statements ([`Executor`])
//! and run a callback inside a transaction ([`Transactor`]). Decorators take
//! any `Client` and return another one, so call sites never change when
//! metrics or tracing are switched on.

use crate::batch::{Batch, BatchResults};
use crate::error::PqResult;
use crate::param::Param;
use crate::rows::{Row, Rows, RowsAffected};
use async_trait::async_trait;
use futures_util::future::BoxFuture;
use std::fmt;
use std::sync::Arc;

/// Client operation, used as the `method` label and in span names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Exec,
    Query,
    QueryRow,
    Transaction,
    SendBatch,
}

impl Method {
    pub const ALL: [Method; 5] = [
        Method::Exec,
        Method::Query,
        Method::QueryRow,
        Method::Transaction,
        Method::SendBatch,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Exec => "exec",
            Method::Query => "query",
            Method::QueryRow => "query_row",
            Method::Transaction => "transaction",
            Method::SendBatch => "send_batch",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Statement execution.
///
/// Arguments are bound positionally to `$1, $2, ...`. Statements without
/// arguments are sent as simple queries and may contain several
/// `;`-separated statements.
#[async_trait]
pub trait Executor: Send + Sync {
    /// Run a statement and report how many rows it touched.
    async fn exec(&self, sql: &str, args: &[Param]) -> PqResult<RowsAffected>;

    /// Run a statement and return its result set.
    async fn query(&self, sql: &str, args: &[Param]) -> PqResult<Rows>;

    /// Run a statement expected to return at most one row.
    ///
    /// Errors are deferred to [`Row::scan`].
    async fn query_row(&self, sql: &str, args: &[Param]) -> Row;

    /// Send every queued statement over one connection.
    async fn send_batch(&self, batch: Batch) -> BatchResults;
}

/// Future returned by a transaction callback.
pub type TxFuture<'e> = BoxFuture<'e, PqResult<()>>;

/// Transaction callback. It receives an executor bound to the open
/// transaction; returning `Ok` commits, returning `Err` rolls back.
pub type TxFn = Box<dyn for<'e> FnOnce(&'e dyn Executor) -> TxFuture<'e> + Send>;

/// Box a closure as a [`TxFn`].
///
/// ```ignore
/// client
///     .transaction(tx_fn(|tx| {
///         Box::pin(async move {
///             tx.exec("INSERT INTO audit (msg) VALUES ($1)", &params!["hi"]).await?;
///             Ok(())
///         })
///     }))
///     .await?;
/// ```
pub fn tx_fn<F>(f: F) -> TxFn
where
    F: for<'e> FnOnce(&'e dyn Executor) -> TxFuture<'e> + Send + 'static,
{
    Box::new(f)
}

#[async_trait]
pub trait Transactor: Send + Sync {
    /// Run `f` inside a transaction.
    ///
    /// Commits when `f` succeeds and rolls back when it fails. Failures of
    /// begin, commit and rollback are all returned to the caller.
    async fn transaction(&self, f: TxFn) -> PqResult<()>;
}

/// Both halves of the client contract.
pub trait Client: Executor + Transactor {}

impl<T: Executor + Transactor + ?Sized> Client for T {}

#[async_trait]
impl<T: Executor + ?Sized> Executor for &T {
    async fn exec(&self, sql: &str, args: &[Param]) -> PqResult<RowsAffected> {
        (**self).exec(sql, args).await
    }

    async fn query(&self, sql: &str, args: &[Param]) -> PqResult<Rows> {
        (**self).query(sql, args).await
    }

    async fn query_row(&self, sql: &str, args: &[Param]) -> Row {
        (**self).query_row(sql, args).await
    }

    async fn send_batch(&self, batch: Batch) -> BatchResults {
        (**self).send_batch(batch).await
    }
}

#[async_trait]
impl<T: Executor + ?Sized> Executor for Arc<T> {
    async fn exec(&self, sql: &str, args: &[Param]) -> PqResult<RowsAffected> {
        (**self).exec(sql, args).await
    }

    async fn query(&self, sql: &str, args: &[Param]) -> PqResult<Rows> {
        (**self).query(sql, args).await
    }

    async fn query_row(&self, sql: &str, args: &[Param]) -> Row {
        (**self).query_row(sql, args).await
    }

    async fn send_batch(&self, batch: Batch) -> BatchResults {
        (**self).send_batch(batch).await
    }
}

#[async_trait]
impl<T: Transactor + ?Sized> Transactor for &T {
    async fn transaction(&self, f: TxFn) -> PqResult<()> {
        (**self).transaction(f).await
    }
}

#[async_trait]
impl<T: Transactor + ?Sized> Transactor for Arc<T> {
    async fn transaction(&self, f: TxFn) -> PqResult<()> {
        (**self).transaction(f).await
    }
}
