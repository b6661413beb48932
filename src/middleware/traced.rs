//! Tracing decorator.
//!
//! Opens one span per operation, named `pq.<method>`. Spans follow the
//! OpenTelemetry database conventions so they export cleanly through
//! `tracing-opentelemetry`:
//!
//! - `db.system` - always `postgresql`
//! - `db.operation` - the client method
//! - `db.statement` - the SQL, or the queued statements of a batch
//! - `db.args` - bound arguments, only when enabled (one list per queued
//!   statement for batches)
//! - `otel.status_code` / `error.message` - set on failure

use crate::batch::{Batch, BatchResults};
use crate::client::{Client, Executor, Method, Transactor, TxFn, tx_fn};
use crate::error::{PqError, PqResult};
use crate::middleware::Layer;
use crate::param::Param;
use crate::rows::{Row, Rows, RowsAffected};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::field::{Empty, debug, display};
use tracing::{Instrument, Span, error, info_span};

macro_rules! operation_span {
    ($name:literal, $method:expr) => {
        info_span!(
            $name,
            db.system = "postgresql",
            db.operation = $method.as_str(),
            db.statement = Empty,
            db.args = Empty,
            otel.kind = "client",
            otel.status_code = Empty,
            error.message = Empty,
        )
    };
}

fn operation_span(method: Method) -> Span {
    match method {
        Method::Exec => operation_span!("pq.exec", method),
        Method::Query => operation_span!("pq.query", method),
        Method::QueryRow => operation_span!("pq.query_row", method),
        Method::Transaction => operation_span!("pq.transaction", method),
        Method::SendBatch => operation_span!("pq.send_batch", method),
    }
}

fn record_error(span: &Span, err: &PqError) {
    span.record("otel.status_code", "ERROR");
    span.record("error.message", display(err));
    error!(
        parent: span,
        error = %err,
        sql_state = err.sql_state(),
        "PostgreSQL operation failed"
    );
}

/// Wrapper that traces every operation of the inner client.
///
/// Arguments are left out of spans unless enabled with
/// [`Traced::with_args`], since they may carry personal data.
pub struct Traced<C> {
    inner: C,
    include_args: bool,
}

impl<C> Traced<C> {
    pub fn new(inner: C) -> Self {
        Self::with_args(inner, false)
    }

    /// Wrap `inner`, recording bound arguments as `db.args` when
    /// `include_args` is set.
    pub fn with_args(inner: C, include_args: bool) -> Self {
        Self {
            inner,
            include_args,
        }
    }

    pub fn inner(&self) -> &C {
        &self.inner
    }

    pub fn into_inner(self) -> C {
        self.inner
    }

    fn statement_span(&self, method: Method, sql: &str, args: &[Param]) -> Span {
        let span = operation_span(method);
        span.record("db.statement", sql);
        if self.include_args && !args.is_empty() {
            span.record("db.args", debug(args));
        }
        span
    }
}

#[async_trait]
impl<C: Executor> Executor for Traced<C> {
    async fn exec(&self, sql: &str, args: &[Param]) -> PqResult<RowsAffected> {
        let span = self.statement_span(Method::Exec, sql, args);
        let result = self.inner.exec(sql, args).instrument(span.clone()).await;
        if let Err(err) = &result {
            record_error(&span, err);
        }
        result
    }

    async fn query(&self, sql: &str, args: &[Param]) -> PqResult<Rows> {
        let span = self.statement_span(Method::Query, sql, args);
        let result = self.inner.query(sql, args).instrument(span.clone()).await;
        if let Err(err) = &result {
            record_error(&span, err);
        }
        result
    }

    async fn query_row(&self, sql: &str, args: &[Param]) -> Row {
        let span = self.statement_span(Method::QueryRow, sql, args);
        let row = self
            .inner
            .query_row(sql, args)
            .instrument(span.clone())
            .await;
        if let Some(err) = row.error() {
            record_error(&span, err);
        }
        row
    }

    async fn send_batch(&self, batch: Batch) -> BatchResults {
        let span = operation_span(Method::SendBatch);
        let statements = batch.statements();
        span.record("db.statement", statements.as_str());
        if self.include_args && batch.iter().any(|queued| !queued.args().is_empty()) {
            let args: Vec<&[Param]> = batch.iter().map(|queued| queued.args()).collect();
            span.record("db.args", debug(&args));
        }
        let results = self.inner.send_batch(batch).instrument(span.clone()).await;
        if let Some(err) = results.first_error() {
            record_error(&span, err);
        }
        results
    }
}

#[async_trait]
impl<C: Transactor> Transactor for Traced<C> {
    async fn transaction(&self, f: TxFn) -> PqResult<()> {
        let span = operation_span(Method::Transaction);
        let include_args = self.include_args;
        let traced_fn = tx_fn(move |tx| {
            Box::pin(async move {
                let tx = Traced::with_args(tx, include_args);
                f(&tx).await
            })
        });
        let result = self
            .inner
            .transaction(traced_fn)
            .instrument(span.clone())
            .await;
        if let Err(err) = &result {
            record_error(&span, err);
        }
        result
    }
}

/// [`Layer`] that adds [`Traced`].
#[derive(Debug, Clone, Copy, Default)]
pub struct TraceLayer {
    include_args: bool,
}

impl TraceLayer {
    pub fn new(include_args: bool) -> Self {
        Self { include_args }
    }
}

impl Layer for TraceLayer {
    fn wrap(&self, inner: Arc<dyn Client>) -> Arc<dyn Client> {
        Arc::new(Traced::with_args(inner, self.include_args))
    }
}
