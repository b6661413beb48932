//! Result set handles returned by [`Executor`](crate::Executor) calls.
//!
//! Rows are read off the connection by the driver adapter before the call
//! returns, so holding a [`Rows`] or [`Row`] never pins a pooled connection.

use crate::error::{PqError, PqResult};
use sqlx::postgres::PgRow;
use sqlx::{Decode, FromRow, Postgres, Row as _, Type};
use std::fmt;

/// Everything one statement produced on the wire.
#[derive(Default)]
pub(crate) struct ResultSet {
    pub(crate) rows_affected: u64,
    pub(crate) rows: Vec<PgRow>,
}

/// Number of rows modified by a statement.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RowsAffected(u64);

impl RowsAffected {
    pub fn new(count: u64) -> Self {
        Self(count)
    }

    pub fn rows_affected(&self) -> u64 {
        self.0
    }
}

impl From<u64> for RowsAffected {
    fn from(count: u64) -> Self {
        Self(count)
    }
}

impl From<RowsAffected> for u64 {
    fn from(value: RowsAffected) -> Self {
        value.0
    }
}

impl fmt::Display for RowsAffected {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Result set of a query.
///
/// Iterating yields rows in server order. The set closes itself once the
/// last row has been read; [`Rows::close`] discards whatever is left and may
/// be called any number of times.
#[derive(Default)]
pub struct Rows {
    rows: std::vec::IntoIter<PgRow>,
    closed: bool,
}

impl Rows {
    pub(crate) fn new(rows: Vec<PgRow>) -> Self {
        Self {
            rows: rows.into_iter(),
            closed: false,
        }
    }

    /// An empty, open result set.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Discard the remaining rows.
    pub fn close(&mut self) {
        self.rows = Vec::new().into_iter();
        self.closed = true;
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Rows not read yet.
    pub fn remaining(&self) -> usize {
        self.rows.len()
    }

    /// Decode every remaining row into `T`.
    pub fn decode<T>(self) -> PqResult<Vec<T>>
    where
        T: for<'r> FromRow<'r, PgRow>,
    {
        self.map(|row| T::from_row(&row).map_err(PqError::from))
            .collect()
    }
}

impl Iterator for Rows {
    type Item = PgRow;

    fn next(&mut self) -> Option<PgRow> {
        if self.closed {
            return None;
        }
        let next = self.rows.next();
        if next.is_none() {
            self.closed = true;
        }
        next
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.rows.size_hint()
    }
}

impl fmt::Debug for Rows {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rows")
            .field("remaining", &self.rows.len())
            .field("closed", &self.closed)
            .finish()
    }
}

/// Single-row result with a deferred error.
///
/// Any error raised while querying is held until [`Row::scan`] is called. An
/// empty result scans as [`PqError::NoRows`]; rows after the first are
/// ignored.
pub struct Row {
    result: PqResult<Option<PgRow>>,
}

impl Row {
    pub(crate) fn new(row: Option<PgRow>) -> Self {
        Self { result: Ok(row) }
    }

    /// A row handle for a query that found nothing.
    pub fn empty() -> Self {
        Self { result: Ok(None) }
    }

    /// A row handle carrying a query failure.
    pub fn from_error(err: PqError) -> Self {
        Self { result: Err(err) }
    }

    /// The deferred query error, if the query failed.
    pub fn error(&self) -> Option<&PqError> {
        self.result.as_ref().err()
    }

    /// Decode the row into `T`.
    pub fn scan<T>(self) -> PqResult<T>
    where
        T: for<'r> FromRow<'r, PgRow>,
    {
        let row = self.into_row()?;
        T::from_row(&row).map_err(PqError::from)
    }

    /// Decode a single column by position.
    pub fn scan_column<T>(self, index: usize) -> PqResult<T>
    where
        T: for<'r> Decode<'r, Postgres> + Type<Postgres>,
    {
        let row = self.into_row()?;
        row.try_get(index).map_err(PqError::from)
    }

    /// The raw driver row.
    pub fn into_row(self) -> PqResult<PgRow> {
        self.result?.ok_or(PqError::NoRows)
    }
}

impl fmt::Debug for Row {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.result {
            Ok(Some(_)) => f.write_str("Row(<row>)"),
            Ok(None) => f.write_str("Row(<empty>)"),
            Err(err) => f.debug_tuple("Row").field(err).finish(),
        }
    }
}
