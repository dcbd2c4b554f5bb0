//! Persistence gateway: owns the single logical Postgres connection
//!
//! All SQL in the application goes through [`PgGateway`]. It keeps one
//! connection open for the process lifetime, reconnects when the link dies,
//! and recovers from a statement that left the session in an aborted
//! transaction so one failure never poisons unrelated statements.

use chrono::{DateTime, Utc};
use sqlx::postgres::{PgArguments, PgConnection, PgRow};
use sqlx::{Connection, Postgres};
use thiserror::Error;
use tokio::sync::Mutex;
use uuid::Uuid;

/// Storage-layer errors surfaced to callers
///
/// `Query` is retryable only by the caller re-issuing the operation; the
/// gateway never retries on its own.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Cannot reach storage. Fatal at startup; at runtime each operation
    /// re-attempts connect before giving up with this error.
    #[error("database connection failed: {0}")]
    Connectivity(#[source] sqlx::Error),

    /// A statement failed to execute. The transaction has been rolled back.
    #[error("statement failed: {0}")]
    Query(#[source] sqlx::Error),
}

impl StorageError {
    /// True when the underlying error is a unique-constraint violation.
    ///
    /// Callers that treat duplicate inserts as idempotent success (chat and
    /// class registration) check this instead of inspecting SQLSTATE codes.
    pub fn is_unique_violation(&self) -> bool {
        match self {
            StorageError::Query(sqlx::Error::Database(db)) => db.is_unique_violation(),
            _ => false,
        }
    }
}

/// Positional statement parameter
///
/// Keeps statements as plain parameterized strings while still binding with
/// the proper Postgres types.
#[derive(Debug, Clone)]
pub enum SqlParam {
    Text(String),
    OptText(Option<String>),
    Int(i64),
    Uuid(Uuid),
    Timestamp(DateTime<Utc>),
}

struct GatewayState {
    conn: Option<PgConnection>,
    /// Set when a failed statement may have left the session in an aborted
    /// transaction; cleared by issuing ROLLBACK before the next statement.
    poisoned: bool,
}

/// Single-connection Postgres gateway
///
/// The connection is process-wide shared state, so all access is serialized
/// behind an async mutex. Worker tasks for different chats share this one
/// gateway.
pub struct PgGateway {
    url: String,
    inner: Mutex<GatewayState>,
}

impl PgGateway {
    /// Creates a gateway for the given connection URL. Does not connect yet;
    /// call [`connect`](Self::connect) or let the first operation do it.
    pub fn new(url: String) -> Self {
        Self {
            url,
            inner: Mutex::new(GatewayState {
                conn: None,
                poisoned: false,
            }),
        }
    }

    /// Opens the connection if needed. Idempotent: a healthy open connection
    /// is pinged and left alone, a dead one is replaced.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Connectivity` if the server cannot be reached.
    pub async fn connect(&self) -> Result<(), StorageError> {
        let mut state = self.inner.lock().await;
        ensure_connected(&self.url, &mut state).await
    }

    /// Releases the connection. Safe to call when already closed.
    pub async fn close(&self) {
        let mut state = self.inner.lock().await;
        if let Some(conn) = state.conn.take() {
            if let Err(e) = conn.close().await {
                log::warn!("Error closing database connection: {}", e);
            } else {
                log::info!("Database connection closed");
            }
        }
        state.poisoned = false;
    }

    /// Executes a write statement inside its own transaction.
    ///
    /// On failure the transaction is rolled back, the failing statement and
    /// parameters are logged at debug level only, and the error is surfaced
    /// for the caller to decide on wording.
    ///
    /// # Returns
    ///
    /// The number of rows affected.
    pub async fn execute(&self, statement: &str, params: &[SqlParam]) -> Result<u64, StorageError> {
        let mut guard = self.inner.lock().await;
        let state = &mut *guard;
        ensure_connected(&self.url, state).await?;
        clear_aborted(state).await;

        let Some(conn) = state.conn.as_mut() else {
            return Err(StorageError::Connectivity(sqlx::Error::PoolClosed));
        };

        let mut tx = match conn.begin().await {
            Ok(tx) => tx,
            Err(e) => {
                log::debug!("Failed to begin transaction for statement: {}: {}", statement, e);
                state.poisoned = true;
                return Err(StorageError::Query(e));
            }
        };

        match bind_params(sqlx::query(statement), params).execute(&mut *tx).await {
            Ok(done) => {
                tx.commit().await.map_err(|e| {
                    log::debug!("Commit failed for statement: {}: {}", statement, e);
                    StorageError::Query(e)
                })?;
                Ok(done.rows_affected())
            }
            Err(e) => {
                log::debug!(
                    "Statement failed: {} with params {:?}: {}",
                    statement,
                    params,
                    e
                );
                if tx.rollback().await.is_err() {
                    state.poisoned = true;
                }
                Err(StorageError::Query(e))
            }
        }
    }

    /// Runs a read statement and returns at most one row.
    pub async fn query_one(
        &self,
        statement: &str,
        params: &[SqlParam],
    ) -> Result<Option<PgRow>, StorageError> {
        let mut guard = self.inner.lock().await;
        let state = &mut *guard;
        ensure_connected(&self.url, state).await?;
        clear_aborted(state).await;

        let Some(conn) = state.conn.as_mut() else {
            return Err(StorageError::Connectivity(sqlx::Error::PoolClosed));
        };

        match bind_params(sqlx::query(statement), params)
            .fetch_optional(&mut *conn)
            .await
        {
            Ok(row) => Ok(row),
            Err(e) => {
                log::debug!(
                    "Query failed: {} with params {:?}: {}",
                    statement,
                    params,
                    e
                );
                state.poisoned = true;
                Err(StorageError::Query(e))
            }
        }
    }

    /// Runs a read statement and returns all rows.
    pub async fn query_all(
        &self,
        statement: &str,
        params: &[SqlParam],
    ) -> Result<Vec<PgRow>, StorageError> {
        let mut guard = self.inner.lock().await;
        let state = &mut *guard;
        ensure_connected(&self.url, state).await?;
        clear_aborted(state).await;

        let Some(conn) = state.conn.as_mut() else {
            return Err(StorageError::Connectivity(sqlx::Error::PoolClosed));
        };

        match bind_params(sqlx::query(statement), params)
            .fetch_all(&mut *conn)
            .await
        {
            Ok(rows) => Ok(rows),
            Err(e) => {
                log::debug!(
                    "Query failed: {} with params {:?}: {}",
                    statement,
                    params,
                    e
                );
                state.poisoned = true;
                Err(StorageError::Query(e))
            }
        }
    }
}

/// Pings an existing connection and reconnects when it is gone or dead.
async fn ensure_connected(url: &str, state: &mut GatewayState) -> Result<(), StorageError> {
    if let Some(conn) = state.conn.as_mut() {
        if conn.ping().await.is_ok() {
            return Ok(());
        }
        log::warn!("Database connection lost, reconnecting");
        state.conn = None;
        state.poisoned = false;
    }

    let conn = PgConnection::connect(url)
        .await
        .map_err(StorageError::Connectivity)?;
    log::info!("Database connection established");
    state.conn = Some(conn);
    Ok(())
}

/// Rolls back an aborted transaction left over from a failed statement.
///
/// Issuing ROLLBACK outside a transaction only raises a server-side notice,
/// so this is safe to run unconditionally once the flag is set.
async fn clear_aborted(state: &mut GatewayState) {
    if !state.poisoned {
        return;
    }
    if let Some(conn) = state.conn.as_mut() {
        if let Err(e) = sqlx::query("ROLLBACK").execute(&mut *conn).await {
            log::warn!("Failed to roll back aborted transaction: {}", e);
        }
    }
    state.poisoned = false;
}

fn bind_params<'q>(
    mut query: sqlx::query::Query<'q, Postgres, PgArguments>,
    params: &'q [SqlParam],
) -> sqlx::query::Query<'q, Postgres, PgArguments> {
    for param in params {
        query = match param {
            SqlParam::Text(v) => query.bind(v.as_str()),
            SqlParam::OptText(v) => query.bind(v.as_deref()),
            SqlParam::Int(v) => query.bind(*v),
            SqlParam::Uuid(v) => query.bind(*v),
            SqlParam::Timestamp(v) => query.bind(*v),
        };
    }
    query
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unique_violation_detection_ignores_other_errors() {
        let err = StorageError::Query(sqlx::Error::RowNotFound);
        assert!(!err.is_unique_violation());

        let err = StorageError::Connectivity(sqlx::Error::PoolClosed);
        assert!(!err.is_unique_violation());
    }

    #[test]
    fn test_sql_param_debug_is_loggable() {
        let params = vec![
            SqlParam::Text("CS101".to_string()),
            SqlParam::OptText(None),
            SqlParam::Int(3),
        ];
        let rendered = format!("{:?}", params);
        assert!(rendered.contains("CS101"));
        assert!(rendered.contains("None"));
    }
}
