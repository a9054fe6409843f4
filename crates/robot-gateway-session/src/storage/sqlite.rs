//! SQLite operation log storage (feature-gated).

use async_trait::async_trait;
use robot_gateway_core::{LogEntry, OperationLogStore, UserId, traits::StorageError};
use sqlx::{
    Row,
    sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions},
};

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS operation_log (
    seq          INTEGER PRIMARY KEY AUTOINCREMENT,
    operation    TEXT    NOT NULL,
    timestamp_ms INTEGER NOT NULL,
    user_id      TEXT    NOT NULL
)";

fn internal(e: sqlx::Error) -> StorageError {
    StorageError::Internal(e.to_string())
}

/// SQLite storage implementation.
pub struct SqliteLogStore {
    pool: SqlitePool,
}

impl SqliteLogStore {
    /// Open (creating if needed) the database at `database_url`,
    /// e.g. `sqlite://gateway.db` or `sqlite::memory:`.
    ///
    /// # Errors
    /// Returns error if database connection or schema setup fails.
    pub async fn new(database_url: &str) -> Result<Self, StorageError> {
        let options: SqliteConnectOptions = database_url
            .parse::<SqliteConnectOptions>()
            .map_err(|e| StorageError::Unavailable(e.to_string()))?
            .create_if_missing(true);

        // A single connection keeps `sqlite::memory:` databases shared.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::Unavailable(e.to_string()))?;

        sqlx::query(SCHEMA).execute(&pool).await.map_err(internal)?;
        tracing::info!(database_url, "Operation log database ready");

        Ok(Self { pool })
    }
}

#[async_trait]
impl OperationLogStore for SqliteLogStore {
    async fn append(&self, mut entry: LogEntry) -> Result<LogEntry, StorageError> {
        let result = sqlx::query(
            "INSERT INTO operation_log (operation, timestamp_ms, user_id) VALUES (?, ?, ?)",
        )
        .bind(&entry.operation)
        .bind(entry.timestamp)
        .bind(entry.user_id.as_str())
        .execute(&self.pool)
        .await
        .map_err(internal)?;

        entry.seq = u64::try_from(result.last_insert_rowid())
            .map_err(|e| StorageError::Internal(e.to_string()))?;
        Ok(entry)
    }

    async fn query(&self, limit: usize) -> Result<Vec<LogEntry>, StorageError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = sqlx::query(
            "SELECT seq, operation, timestamp_ms, user_id FROM operation_log
             ORDER BY timestamp_ms DESC, seq DESC LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(internal)?;

        rows.into_iter()
            .map(|row| {
                let seq: i64 = row.try_get("seq").map_err(internal)?;
                Ok(LogEntry {
                    seq: u64::try_from(seq).map_err(|e| StorageError::Internal(e.to_string()))?,
                    operation: row.try_get("operation").map_err(internal)?,
                    timestamp: row.try_get("timestamp_ms").map_err(internal)?,
                    user_id: UserId::new(row.try_get::<String, _>("user_id").map_err(internal)?),
                })
            })
            .collect()
    }
}
