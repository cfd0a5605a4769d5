//! Database access: client seam, pooled connections, chunked and merged
//! row streams.

pub mod client;
#[allow(clippy::module_inception)]
pub mod connector;
pub mod errors;
pub mod memory;
pub mod merge;
pub mod pool;
pub mod row;
pub mod value;

pub use client::{SqlClient, SqlRowValues, SqlTransaction};
pub use connector::{QueryBatch, QuerySet, SqlConnector};
pub use errors::{SqlDiagnostics, SqlError};
pub use memory::{MemorySqlClient, TransactionLog};
pub use merge::MergeSorted;
pub use pool::{mismatched_parameters, PoolHandle, PoolMismatch, PoolRegistry, PooledTransaction};
pub use row::{SqlRecord, SqlRow, SqlRowMeta};
pub use value::{compare_keys, SqlValue};
