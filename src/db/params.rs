//! Parameter binding for PostgreSQL statements.

use crate::param::Param;
use sqlx::Postgres;
use sqlx::postgres::PgArguments;
use sqlx::query::Query;
use sqlx::types::Json;

pub(crate) type PgQuery<'q> = Query<'q, Postgres, PgArguments>;

/// Bind a parameter to a PostgreSQL query.
pub(crate) fn bind_param<'q>(query: PgQuery<'q>, param: &'q Param) -> PgQuery<'q> {
    match param {
        Param::Null => query.bind(None::<String>),
        Param::Bool(v) => query.bind(*v),
        Param::Int(v) => query.bind(*v),
        Param::Float(v) => query.bind(*v),
        Param::String(v) => query.bind(v.as_str()),
        Param::Bytes(v) => query.bind(v.as_slice()),
        Param::Json(v) => query.bind(Json(v)),
        Param::Timestamp(v) => query.bind(*v),
    }
}

/// Prepare `sql` with every argument bound in order.
pub(crate) fn bind_all<'q>(sql: &'q str, args: &'q [Param]) -> PgQuery<'q> {
    args.iter().fold(sqlx::query(sql), bind_param)
}
