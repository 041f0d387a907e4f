//! Local application state backed by SQLite.
//!
//! Holds users, conferência flags, couriers, deliveries and crate balances,
//! the geocode cache and RDP grants. The schema is applied inline via
//! `include_str!` on every open; statements are idempotent.

mod backup;
mod conferencia;
mod deliveries;
mod geocode_cache;
mod rdp_grants;
mod users;

use std::path::Path;
use std::str::FromStr;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use tracing::info;

pub use backup::BackupResult;
pub use conferencia::ToggleOutcome;
pub use deliveries::{Courier, CrateBalance, DeliveryInput, DeliveryRecord, ReconcileOutcome};
pub use geocode_cache::CachedCoordinates;
pub use rdp_grants::RdpGrant;
pub use users::{NewUser, UserPatch, UserRecord, UserSummary};

/// Errors from the local store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Underlying SQLite failure.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A unique constraint was violated.
    #[error("{0}")]
    Conflict(String),

    /// The target row does not exist.
    #[error("{0}")]
    NotFound(String),

    /// The request is malformed for this operation.
    #[error("{0}")]
    Invalid(String),

    /// A stored value could not be interpreted.
    #[error("corrupt value in {table}.{column}: {value}")]
    Corrupt {
        /// Table name.
        table: &'static str,
        /// Column name.
        column: &'static str,
        /// Offending value.
        value: String,
    },

    /// Filesystem failure around the database file or backups.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    /// Map a unique violation to [`StoreError::Conflict`] with `message`.
    fn conflict_on_unique(e: sqlx::Error, message: &str) -> Self {
        match &e {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                Self::Conflict(message.to_owned())
            }
            _ => Self::Database(e),
        }
    }
}

const SCHEMA: &str = include_str!("../../migrations/001_schema.sql");

/// Handle to the SQLite database. Cheap to clone.
#[derive(Debug, Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    /// Open (or create) the database at `path` and apply the schema.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created, the database
    /// cannot be opened, or migration fails.
    pub async fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .pragma("foreign_keys", "ON");

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.migrate().await?;
        info!(path = %path.display(), "local database ready");
        Ok(store)
    }

    /// Open a private in-memory database with the schema applied.
    ///
    /// # Errors
    ///
    /// Returns an error if migration fails.
    pub async fn open_in_memory() -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?
            .pragma("foreign_keys", "ON");
        // One connection that never recycles: each connection would otherwise
        // see its own empty database.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    /// Apply the schema and bring legacy databases up to date.
    async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::raw_sql(SCHEMA).execute(&self.pool).await?;
        self.ensure_permissions_column().await?;
        self.ensure_delivery_client_column().await?;
        Ok(())
    }

    /// Add `users.permissions` to databases created before it existed.
    ///
    /// # Errors
    ///
    /// Returns an error if the table cannot be inspected or altered.
    pub async fn ensure_permissions_column(&self) -> Result<bool, StoreError> {
        self.add_missing_column("users", "permissions", "TEXT DEFAULT '[]'")
            .await
    }

    /// Add `entregas.codigoCliente` to databases created before it existed.
    /// Rows saved before then keep a null client.
    ///
    /// # Errors
    ///
    /// Returns an error if the table cannot be inspected or altered.
    pub async fn ensure_delivery_client_column(&self) -> Result<bool, StoreError> {
        self.add_missing_column("entregas", "codigoCliente", "INTEGER")
            .await
    }

    async fn add_missing_column(
        &self,
        table: &'static str,
        column: &'static str,
        declaration: &'static str,
    ) -> Result<bool, StoreError> {
        let columns: Vec<(i64, String, String, i64, Option<String>, i64)> =
            sqlx::query_as(&format!("PRAGMA table_info({table})"))
                .fetch_all(&self.pool)
                .await?;
        if columns.iter().any(|(_, name, ..)| name == column) {
            return Ok(false);
        }
        sqlx::raw_sql(&format!("ALTER TABLE {table} ADD COLUMN {column} {declaration}"))
            .execute(&self.pool)
            .await?;
        info!(table, column, "added missing column");
        Ok(true)
    }

    /// Underlying pool, for tests and one-off maintenance.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Close all connections.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

/// Current time in the format stored in timestamp columns.
fn now_text() -> String {
    timestamp_text(chrono::Utc::now())
}

/// RFC 3339 with second precision and `Z`, so text order is time order.
fn timestamp_text(at: chrono::DateTime<chrono::Utc>) -> String {
    at.to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
}

/// RFC 3339, or SQLite's `CURRENT_TIMESTAMP` form (`YYYY-MM-DD HH:MM:SS`)
/// read as UTC.
fn parse_timestamp(
    table: &'static str,
    column: &'static str,
    value: &str,
) -> Result<chrono::DateTime<chrono::Utc>, StoreError> {
    chrono::DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&chrono::Utc))
        .or_else(|_| {
            chrono::NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S")
                .map(|naive| naive.and_utc())
        })
        .map_err(|_| StoreError::Corrupt {
            table,
            column,
            value: value.to_owned(),
        })
}
