use crate::config;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use thiserror::Error;
use tracing::{instrument, trace};

/// Key under which the server base URL is stored.
pub const SERVER_URL_KEY: &str = "serverUrl";

/// Device-local key-value settings backed by [SQLite](https://www.sqlite.org/).
pub struct SettingsStore {
    pool: SqlitePool,
}

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("sqlite error: {0}")]
    SqliteError(#[from] sqlx::Error),

    /// Returned from [`SettingsStore::remove`].
    #[error("setting not found: {0}")]
    NotFound(String),
}

impl SettingsStore {
    pub async fn open(config: &config::Storage) -> Result<Self, SettingsError> {
        Self::connect(&format!("sqlite:{}?mode=rwc", config.settings_path)).await
    }

    pub async fn open_in_memory() -> Result<Self, SettingsError> {
        Self::connect("sqlite::memory:").await
    }

    async fn connect(url: &str) -> Result<Self, SettingsError> {
        // an in-memory database lives as long as its single connection
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect(url)
            .await?;

        sqlx::query(
            r#"
CREATE TABLE IF NOT EXISTS settings (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
        "#,
        )
        .execute(&pool)
        .await?;

        Ok(Self { pool })
    }

    #[instrument(skip(self))]
    pub async fn get(&self, key: &str) -> Result<Option<String>, SettingsError> {
        trace!("Reading setting {}", key);

        #[derive(sqlx::FromRow)]
        struct SettingRow {
            value: String,
        }

        let value = sqlx::query_as::<_, SettingRow>("SELECT value FROM settings WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?
            .map(|r| r.value);

        Ok(value)
    }

    #[instrument(skip(self))]
    pub async fn set(&self, key: &str, value: &str) -> Result<(), SettingsError> {
        sqlx::query(
            r#"
INSERT INTO settings VALUES (?, ?)
ON CONFLICT(key) DO UPDATE SET value=excluded.value
            "#,
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn remove(&self, key: &str) -> Result<(), SettingsError> {
        let deleted_rows_count = sqlx::query("DELETE FROM settings WHERE key = ?")
            .bind(key)
            .execute(&self.pool)
            .await?
            .rows_affected();

        if deleted_rows_count == 0 {
            return Err(SettingsError::NotFound(key.to_string()));
        }

        Ok(())
    }
}
