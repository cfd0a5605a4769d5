//! In-memory [`SqlClient`] answering queries from registered responses

use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use futures_util::stream::{self, BoxStream, StreamExt};

use super::client::{SqlClient, SqlRowValues, SqlTransaction};
use super::errors::SqlError;

#[derive(Debug, Clone, PartialEq)]
pub struct TransactionLog {
    pub statements: Vec<String>,
    pub committed: bool,
}

#[derive(Debug, Default)]
struct State {
    responses: Vec<(String, Result<Vec<SqlRowValues>, SqlError>)>,
    executed: Vec<String>,
    transactions: Vec<TransactionLog>,
}

/// Responses are matched by the longest registered prefix of the SQL text,
/// unmatched statements return no rows
#[derive(Debug, Clone, Default)]
pub struct MemorySqlClient {
    state: Arc<Mutex<State>>,
}

impl MemorySqlClient {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn on(&self, prefix: impl Into<String>, rows: Vec<SqlRowValues>) -> &Self {
        self.state().responses.push((prefix.into(), Ok(rows)));
        self
    }

    pub fn fail(&self, prefix: impl Into<String>, error: SqlError) -> &Self {
        self.state().responses.push((prefix.into(), Err(error)));
        self
    }

    /// Statements run outside of transactions, in order
    pub fn executed(&self) -> Vec<String> {
        self.state().executed.clone()
    }

    pub fn transactions(&self) -> Vec<TransactionLog> {
        self.state().transactions.clone()
    }

    fn answer(&self, sql: &str) -> Result<Vec<SqlRowValues>, SqlError> {
        let state = self.state();
        state
            .responses
            .iter()
            .filter(|(prefix, _)| sql.starts_with(prefix.as_str()))
            .max_by_key(|(prefix, _)| prefix.len())
            .map(|(_, response)| response.clone())
            .unwrap_or_else(|| Ok(vec![]))
    }
}

#[async_trait]
impl SqlClient for MemorySqlClient {
    async fn query(&self, sql: &str) -> Result<Vec<SqlRowValues>, SqlError> {
        self.state().executed.push(sql.to_string());
        self.answer(sql)
    }

    fn query_stream(&self, sql: &str) -> BoxStream<'static, Result<SqlRowValues, SqlError>> {
        self.state().executed.push(sql.to_string());
        match self.answer(sql) {
            Ok(rows) => stream::iter(rows.into_iter().map(Ok)).boxed(),
            Err(e) => stream::iter(vec![Err(e)]).boxed(),
        }
    }

    async fn begin(&self) -> Result<Box<dyn SqlTransaction>, SqlError> {
        Ok(Box::new(MemoryTransaction {
            client: self.clone(),
            statements: vec![],
        }))
    }
}

struct MemoryTransaction {
    client: MemorySqlClient,
    statements: Vec<String>,
}

impl MemoryTransaction {
    fn finish(self, committed: bool) {
        self.client.state().transactions.push(TransactionLog {
            statements: self.statements,
            committed,
        });
    }
}

#[async_trait]
impl SqlTransaction for MemoryTransaction {
    async fn execute(&mut self, sql: &str) -> Result<Vec<SqlRowValues>, SqlError> {
        self.statements.push(sql.to_string());
        self.client.answer(sql)
    }

    async fn commit(self: Box<Self>) -> Result<(), SqlError> {
        self.finish(true);
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), SqlError> {
        self.finish(false);
        Ok(())
    }
}
