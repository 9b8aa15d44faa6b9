//! Local key/value cache for settings.

use std::future::Future;
use std::path::Path;
use std::pin::Pin;

use rusqlite::OptionalExtension;
use tokio_rusqlite::Connection;

use crate::settings::error::SettingsResult;

/// Boxed future type for cache operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Key/value settings cache.
pub trait SettingsCache: Send + Sync {
    /// Read a value.
    ///
    /// # Errors
    /// Returns an error if storage access fails.
    fn get(&self, key: &str) -> StoreFuture<'_, SettingsResult<Option<String>>>;

    /// Write a value, replacing any previous one.
    ///
    /// # Errors
    /// Returns an error if storage access fails.
    fn put(&self, key: &str, value: &str) -> StoreFuture<'_, SettingsResult<()>>;

    /// Remove a value.
    ///
    /// # Errors
    /// Returns an error if storage access fails.
    fn remove(&self, key: &str) -> StoreFuture<'_, SettingsResult<()>>;
}

/// `SQLite` implementation of the settings cache.
pub struct SqliteSettingsCache {
    conn: Connection,
}

impl SqliteSettingsCache {
    /// Open (or create) a cache file.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened.
    pub async fn open(path: impl AsRef<Path>) -> SettingsResult<Self> {
        let conn = Connection::open(path.as_ref()).await?;
        Self::new(conn).await
    }

    /// Open a cache that lives for the process only.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened.
    pub async fn open_in_memory() -> SettingsResult<Self> {
        let conn = Connection::open_in_memory().await?;
        Self::new(conn).await
    }

    /// Initialize the cache table on an existing connection.
    ///
    /// # Errors
    /// Returns an error if the table cannot be created.
    pub async fn new(conn: Connection) -> SettingsResult<Self> {
        conn.call(|conn| {
            conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS settings_cache (
                    key TEXT PRIMARY KEY,
                    value TEXT NOT NULL,
                    updated_at INTEGER NOT NULL
                )",
            )?;
            Ok(())
        })
        .await?;

        Ok(Self { conn })
    }
}

impl SettingsCache for SqliteSettingsCache {
    fn get(&self, key: &str) -> StoreFuture<'_, SettingsResult<Option<String>>> {
        let key = key.to_string();
        Box::pin(async move {
            let value = self
                .conn
                .call(move |conn| {
                    let value: Option<String> = conn
                        .query_row(
                            "SELECT value FROM settings_cache WHERE key = ?1",
                            rusqlite::params![key],
                            |row| row.get(0),
                        )
                        .optional()?;
                    Ok(value)
                })
                .await?;
            Ok(value)
        })
    }

    fn put(&self, key: &str, value: &str) -> StoreFuture<'_, SettingsResult<()>> {
        let key = key.to_string();
        let value = value.to_string();
        Box::pin(async move {
            let updated_at = chrono::Utc::now().timestamp_millis();
            self.conn
                .call(move |conn| {
                    conn.execute(
                        "INSERT OR REPLACE INTO settings_cache (key, value, updated_at)
                         VALUES (?1, ?2, ?3)",
                        rusqlite::params![key, value, updated_at],
                    )?;
                    Ok(())
                })
                .await?;
            Ok(())
        })
    }

    fn remove(&self, key: &str) -> StoreFuture<'_, SettingsResult<()>> {
        let key = key.to_string();
        Box::pin(async move {
            self.conn
                .call(move |conn| {
                    conn.execute(
                        "DELETE FROM settings_cache WHERE key = ?1",
                        rusqlite::params![key],
                    )?;
                    Ok(())
                })
                .await?;
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_get_remove() {
        let cache = SqliteSettingsCache::open_in_memory().await.unwrap();
        assert_eq!(cache.get("theme").await.unwrap(), None);

        cache.put("theme", "dark").await.unwrap();
        cache.put("theme", "light").await.unwrap();
        assert_eq!(cache.get("theme").await.unwrap(), Some("light".to_string()));

        cache.remove("theme").await.unwrap();
        assert_eq!(cache.get("theme").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_file_cache_survives_reopen() {
        let path = std::env::temp_dir().join(format!(
            "agent-chat-cache-{}.db",
            uuid::Uuid::new_v4()
        ));

        {
            let cache = SqliteSettingsCache::open(&path).await.unwrap();
            cache.put("ai-agent-config", "{}").await.unwrap();
        }
        let reopened = SqliteSettingsCache::open(&path).await.unwrap();
        assert_eq!(
            reopened.get("ai-agent-config").await.unwrap(),
            Some("{}".to_string())
        );

        drop(reopened);
        let _ = std::fs::remove_file(&path);
    }
}
