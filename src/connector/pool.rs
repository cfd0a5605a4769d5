//! Connection pool handle and the registry of shared pools

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use futures_util::stream::{self, BoxStream, StreamExt};
use log::{debug, info};
use thiserror::Error;
use tokio::sync::Semaphore;

use super::client::{SqlClient, SqlRowValues, SqlTransaction};
use super::errors::SqlError;
use crate::config::ConnectionInfo;

/// Limits concurrent use of a [`SqlClient`] to `max_connections` queries.
///
/// A stream holds its permit until it is dropped, so abandoned streams
/// return their connection.
#[derive(Debug, Clone)]
pub struct PoolHandle {
    client: Arc<dyn SqlClient>,
    permits: Arc<Semaphore>,
    max_connections: usize,
}

impl PoolHandle {
    pub fn new(client: Arc<dyn SqlClient>, max_connections: usize) -> Self {
        PoolHandle {
            client,
            permits: Arc::new(Semaphore::new(max_connections.max(1))),
            max_connections: max_connections.max(1),
        }
    }

    pub fn max_connections(&self) -> usize {
        self.max_connections
    }

    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    pub async fn query(&self, sql: &str) -> Result<Vec<SqlRowValues>, SqlError> {
        let _permit = self.permits.acquire().await.map_err(|_| SqlError::Closed)?;
        self.client.query(sql).await
    }

    pub fn query_stream(&self, sql: &str) -> BoxStream<'static, Result<SqlRowValues, SqlError>> {
        let permits = self.permits.clone();
        let client = self.client.clone();
        let sql = sql.to_string();

        stream::once(async move {
            let permit = permits.acquire_owned().await.map_err(|_| SqlError::Closed)?;
            Ok::<_, SqlError>((permit, client.query_stream(&sql)))
        })
        .map(|acquired| match acquired {
            Ok((permit, rows)) => rows
                .map(move |row| {
                    let _held = &permit;
                    row
                })
                .boxed(),
            Err(e) => stream::iter(vec![Err(e)]).boxed(),
        })
        .flatten()
        .boxed()
    }

    /// Transactions hold a permit until they are committed or rolled back
    pub async fn begin(&self) -> Result<PooledTransaction, SqlError> {
        let permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| SqlError::Closed)?;
        let transaction = self.client.begin().await?;
        Ok(PooledTransaction {
            transaction,
            _permit: permit,
        })
    }

    pub fn close(&self) {
        self.permits.close();
    }
}

pub struct PooledTransaction {
    transaction: Box<dyn SqlTransaction>,
    _permit: tokio::sync::OwnedSemaphorePermit,
}

impl PooledTransaction {
    pub async fn execute(&mut self, sql: &str) -> Result<Vec<SqlRowValues>, SqlError> {
        debug!("{}", sql);
        self.transaction.execute(sql).await
    }

    pub async fn commit(self) -> Result<(), SqlError> {
        self.transaction.commit().await
    }

    pub async fn rollback(self) -> Result<(), SqlError> {
        self.transaction.rollback().await
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("parameters do not match [{}]", parameters.join(","))]
pub struct PoolMismatch {
    pub parameters: Vec<String>,
}

/// Names of the connection parameters that differ between `a` and `b`
pub fn mismatched_parameters(a: &ConnectionInfo, b: &ConnectionInfo) -> Vec<String> {
    let mut parameters = Vec::new();
    let mut check = |name: &str, equal: bool| {
        if !equal {
            parameters.push(name.to_string());
        }
    };

    check("dialect", a.dialect == b.dialect);
    check("host", a.host == b.host);
    check("database", a.database == b.database);
    check("user", a.user == b.user);
    check("password", a.password == b.password);
    check("schemas", a.schemas == b.schemas);
    check("maxConnections", a.pool.max_connections == b.pool.max_connections);
    check(
        "minConnections",
        a.pool.effective_min_connections() == b.pool.effective_min_connections(),
    );
    check("idleTimeout", a.pool.idle_timeout == b.pool.idle_timeout);
    check("initFailFast", a.pool.init_fail_fast == b.pool.init_fail_fast);
    check("driverOptions", a.driver_options == b.driver_options);

    parameters
}

/// Pools owned by the application and handed to providers. Shared pools are
/// keyed by dataset, non shared pools are never reused.
#[derive(Debug, Default)]
pub struct PoolRegistry {
    shared: Mutex<HashMap<String, (ConnectionInfo, PoolHandle)>>,
}

impl PoolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_create<F>(&self, info: &ConnectionInfo, create: F) -> Result<PoolHandle, PoolMismatch>
    where
        F: FnOnce() -> Arc<dyn SqlClient>,
    {
        let max_connections = info.pool.max_connections.max(1) as usize;

        if !info.pool.shared {
            return Ok(PoolHandle::new(create(), max_connections));
        }

        let key = info.dataset_identifier();
        let mut shared = self.shared.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

        if let Some((existing, handle)) = shared.get(&key) {
            let parameters = mismatched_parameters(existing, info);
            if !parameters.is_empty() {
                return Err(PoolMismatch { parameters });
            }
            debug!("Reusing shared connection pool for {}", key);
            return Ok(handle.clone());
        }

        info!(
            "Creating shared connection pool for {} with {} connections",
            key, max_connections
        );
        let handle = PoolHandle::new(create(), max_connections);
        shared.insert(key, (info.clone(), handle.clone()));
        Ok(handle)
    }
}
