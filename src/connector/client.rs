use async_trait::async_trait;
use futures_util::stream::BoxStream;

use super::errors::SqlError;
use super::value::SqlValue;

pub type SqlRowValues = Vec<SqlValue>;

/// Database access seam. Implementations wrap a driver and translate its
/// errors into [`SqlError`] with diagnostics.
#[async_trait]
pub trait SqlClient: Send + Sync + std::fmt::Debug {
    /// Run a query and collect all rows
    async fn query(&self, sql: &str) -> Result<Vec<SqlRowValues>, SqlError>;

    /// Run a query and stream its rows in result order
    fn query_stream(&self, sql: &str) -> BoxStream<'static, Result<SqlRowValues, SqlError>>;

    async fn begin(&self) -> Result<Box<dyn SqlTransaction>, SqlError>;
}

#[async_trait]
pub trait SqlTransaction: Send {
    async fn execute(&mut self, sql: &str) -> Result<Vec<SqlRowValues>, SqlError>;

    async fn commit(self: Box<Self>) -> Result<(), SqlError>;

    async fn rollback(self: Box<Self>) -> Result<(), SqlError>;
}
