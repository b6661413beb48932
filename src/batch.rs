//! Statement batches.
//!
//! A [`Batch`] queues statements that are sent together over one connection.
//! [`BatchResults`] hands back one result per queued statement, in queue
//! order.

use crate::error::{PqError, PqResult};
use crate::param::Param;
use crate::rows::{ResultSet, Row, Rows, RowsAffected};
use std::collections::VecDeque;
use std::fmt;

/// A queued statement and its arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct QueuedQuery {
    sql: String,
    args: Vec<Param>,
}

impl QueuedQuery {
    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn args(&self) -> &[Param] {
        &self.args
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Batch {
    items: Vec<QueuedQuery>,
}

impl Batch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a statement.
    pub fn queue(&mut self, sql: impl Into<String>, args: Vec<Param>) -> &mut Self {
        self.items.push(QueuedQuery {
            sql: sql.into(),
            args,
        });
        self
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &QueuedQuery> {
        self.items.iter()
    }

    /// All queued SQL joined with `; `, for logs and spans.
    pub fn statements(&self) -> String {
        self.items
            .iter()
            .map(|item| item.sql.as_str())
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// Per-statement results of a sent batch.
///
/// Each reader method consumes the next result. Reading past the last
/// statement fails with [`PqError::BatchExhausted`].
#[derive(Default)]
pub struct BatchResults {
    results: VecDeque<PqResult<ResultSet>>,
}

impl BatchResults {
    pub(crate) fn new(results: Vec<PqResult<ResultSet>>) -> Self {
        Self {
            results: results.into(),
        }
    }

    /// Results for a batch that failed as a whole: the first reader sees
    /// `err`, every later statement reports itself as skipped.
    pub(crate) fn aborted(err: PqError, len: usize) -> Self {
        let mut results = VecDeque::with_capacity(len.max(1));
        results.push_back(Err(err));
        for index in 1..len {
            results.push_back(Err(PqError::BatchAborted { index, failed: 0 }));
        }
        Self { results }
    }

    /// Results of an empty batch.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Results not read yet.
    pub fn remaining(&self) -> usize {
        self.results.len()
    }

    /// The first unread failure, if any.
    pub fn first_error(&self) -> Option<&PqError> {
        self.results.iter().find_map(|result| result.as_ref().err())
    }

    fn next_result(&mut self) -> PqResult<ResultSet> {
        self.results
            .pop_front()
            .unwrap_or(Err(PqError::BatchExhausted))
    }

    /// Read the next result as a row count.
    pub fn exec(&mut self) -> PqResult<RowsAffected> {
        self.next_result()
            .map(|set| RowsAffected::new(set.rows_affected))
    }

    /// Read the next result as a result set.
    pub fn query(&mut self) -> PqResult<Rows> {
        self.next_result().map(|set| Rows::new(set.rows))
    }

    /// Read the next result as a single row.
    pub fn query_row(&mut self) -> Row {
        match self.next_result() {
            Ok(set) => Row::new(set.rows.into_iter().next()),
            Err(err) => Row::from_error(err),
        }
    }

    /// Drain the unread results, returning the first failure among them.
    pub fn close(self) -> PqResult<()> {
        for result in self.results {
            result?;
        }
        Ok(())
    }
}

impl fmt::Debug for BatchResults {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchResults")
            .field("remaining", &self.results.len())
            .field("failed", &self.first_error().is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params;

    fn done(rows_affected: u64) -> PqResult<ResultSet> {
        Ok(ResultSet {
            rows_affected,
            rows: Vec::new(),
        })
    }

    #[test]
    fn test_batch_queue_keeps_order() {
        let mut batch = Batch::new();
        batch
            .queue("INSERT INTO t VALUES ($1)", params![1])
            .queue("DELETE FROM t", params![]);
        assert_eq!(batch.len(), 2);
        assert_eq!(
            batch.statements(),
            "INSERT INTO t VALUES ($1); DELETE FROM t"
        );
        assert_eq!(batch.iter().next().unwrap().args(), &[Param::Int(1)]);
    }

    #[test]
    fn test_results_read_in_queue_order() {
        let mut results = BatchResults::new(vec![done(2), done(5)]);
        assert_eq!(results.exec().unwrap().rows_affected(), 2);
        assert_eq!(results.exec().unwrap().rows_affected(), 5);
        assert!(matches!(results.exec(), Err(PqError::BatchExhausted)));
    }

    #[test]
    fn test_query_row_on_statement_without_rows() {
        let mut results = BatchResults::new(vec![done(0)]);
        let err = results.query_row().scan::<(i32,)>().unwrap_err();
        assert!(err.is_no_rows());
    }

    #[test]
    fn test_close_surfaces_unread_failure() {
        let results = BatchResults::new(vec![
            done(1),
            Err(PqError::database("boom", Some("42P01".to_string()), None)),
        ]);
        assert_eq!(results.first_error().and_then(|e| e.sql_state()), Some("42P01"));
        let err = results.close().unwrap_err();
        assert_eq!(err.sql_state(), Some("42P01"));
    }

    #[test]
    fn test_aborted_batch_reports_every_statement() {
        let mut results = BatchResults::aborted(PqError::connection("reset"), 3);
        assert_eq!(results.remaining(), 3);
        assert!(matches!(results.exec(), Err(PqError::Connection { .. })));
        assert!(matches!(
            results.query(),
            Err(PqError::BatchAborted { index: 1, failed: 0 })
        ));
        assert!(results.close().is_err());
    }
}
