//! PostgreSQL driver adapter.
//!
//! This module provides the innermost client of every chain:
//! - Pool-backed execution ([`PgClient`])
//! - Transaction-scoped execution ([`PgTxExecutor`])
//! - Parameter binding and statement timeouts
//! - Client construction and pool registration ([`PqClient`])

pub(crate) mod executor;
pub mod handle;
pub(crate) mod params;
pub mod pool;
pub mod transaction;

pub use handle::{PqClient, new_client, new_client_lazy, new_client_with_layers};
pub use pool::PgClient;
pub use transaction::PgTxExecutor;
