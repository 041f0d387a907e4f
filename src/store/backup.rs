//! Consistent snapshots with `VACUUM INTO`.

use std::path::{Path, PathBuf};

use chrono::Utc;
use tracing::info;

use super::{Store, StoreError};

/// Where a snapshot was written.
#[derive(Debug, Clone)]
pub struct BackupResult {
    /// Timestamped directory holding the snapshot.
    pub backup_dir: PathBuf,
    /// Snapshot file.
    pub database: PathBuf,
    /// Snapshot size in bytes.
    pub size_bytes: u64,
}

impl Store {
    /// Write a snapshot to `{backups_dir}/{timestamp}/app.db`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Invalid`], before anything is created, when the
    /// path holds characters that cannot be inlined into SQL. Otherwise
    /// returns an error if the directory cannot be created or the vacuum
    /// fails.
    pub async fn backup_into(&self, backups_dir: &Path) -> Result<BackupResult, StoreError> {
        let timestamp = Utc::now().format("%Y%m%d-%H%M%S-%3f").to_string();
        let backup_dir = backups_dir.join(timestamp);
        let database = backup_dir.join("app.db");
        let dest = database
            .to_str()
            .ok_or_else(|| StoreError::Invalid("backup path is not valid UTF-8".to_owned()))?;

        // VACUUM INTO takes no bound parameters.
        if !dest
            .chars()
            .all(|c| c.is_alphanumeric() || matches!(c, '/' | '\\' | ':' | '.' | '-' | '_' | ' '))
        {
            return Err(StoreError::Invalid(format!(
                "backup path contains disallowed characters: {dest}"
            )));
        }

        tokio::fs::create_dir_all(&backup_dir).await?;
        sqlx::raw_sql(&format!("VACUUM INTO '{dest}'"))
            .execute(&self.pool)
            .await?;

        let size_bytes = tokio::fs::metadata(&database).await?.len();
        info!(path = %database.display(), size_bytes, "database snapshot written");
        Ok(BackupResult {
            backup_dir,
            database,
            size_bytes,
        })
    }
}
