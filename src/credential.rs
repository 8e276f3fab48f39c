use std::path::PathBuf;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Pool, Row, Sqlite, sqlite::{SqliteConnectOptions, SqliteJournalMode, SqliteSynchronous}};
use tokio::sync::RwLock;

pub const CREDENTIAL_KEY: &str = "GEMINI_API_KEY";
const KEY_PREFIX: &str = "AIza";
const MIN_KEY_LEN: usize = 20;

/// Superficial check used by the key-entry prompt before saving.
pub fn is_valid_key_format(key: &str) -> bool {
    let key = key.trim();
    key.starts_with(KEY_PREFIX) && key.len() > MIN_KEY_LEN
}

/// Chat input that is probably a pasted API key.
pub fn looks_like_credential(text: &str) -> bool {
    text.trim().starts_with(KEY_PREFIX)
}

#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn load(&self) -> anyhow::Result<Option<String>>;
    async fn save(&self, key: &str) -> anyhow::Result<()>;
    async fn remove(&self) -> anyhow::Result<bool>;
}

#[derive(Clone)]
pub struct SqliteCredentialStore {
    pool: Pool<Sqlite>,
}

impl SqliteCredentialStore {
    pub async fn initialize(database_url: Option<String>) -> anyhow::Result<Self> {
        let url = match database_url {
            Some(u) => u,
            None => resolve_default_db_url()?,
        };
        let options = url.parse::<SqliteConnectOptions>()?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Full);
        let pool = Pool::<Sqlite>::connect_with(options).await?;
        sqlx::query("PRAGMA busy_timeout = 5000;").execute(&pool).await?;
        sqlx::query("CREATE TABLE IF NOT EXISTS kv_store (key TEXT PRIMARY KEY NOT NULL, value TEXT NOT NULL, updated_at TEXT NOT NULL)")
            .execute(&pool)
            .await?;
        Ok(Self { pool })
    }

    #[cfg(test)]
    pub fn pool(&self) -> &Pool<Sqlite> { &self.pool }
}

fn resolve_default_db_url() -> anyhow::Result<String> {
    let base = std::env::var("XDG_DATA_HOME").ok().map(PathBuf::from).unwrap_or_else(|| {
        let home = std::env::var("HOME").unwrap_or_else(|_| ".".into());
        PathBuf::from(home).join(".local").join("share")
    });
    let dir = base.join("tien_nhan_chat");
    std::fs::create_dir_all(&dir)?;
    let path = dir.join("tien_nhan.db");
    Ok(format!("sqlite://{}", path.to_string_lossy()))
}

#[async_trait]
impl CredentialStore for SqliteCredentialStore {
    async fn load(&self) -> anyhow::Result<Option<String>> {
        let row = sqlx::query("SELECT value FROM kv_store WHERE key = ?1")
            .bind(CREDENTIAL_KEY)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| r.get::<String, _>("value")))
    }

    async fn save(&self, key: &str) -> anyhow::Result<()> {
        sqlx::query("INSERT INTO kv_store (key, value, updated_at) VALUES (?1, ?2, ?3) ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at")
            .bind(CREDENTIAL_KEY)
            .bind(key.trim())
            .bind(Utc::now().to_rfc3339())
            .execute(&self.pool).await?;
        Ok(())
    }

    async fn remove(&self) -> anyhow::Result<bool> {
        let res = sqlx::query("DELETE FROM kv_store WHERE key = ?1")
            .bind(CREDENTIAL_KEY)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected() > 0)
    }
}

/// Process-local store, used when nothing should touch the disk.
#[derive(Default)]
pub struct MemoryCredentialStore {
    value: RwLock<Option<String>>,
}

impl MemoryCredentialStore {
    #[cfg(test)]
    pub fn with_key(key: &str) -> Self {
        Self { value: RwLock::new(Some(key.trim().to_string())) }
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn load(&self) -> anyhow::Result<Option<String>> {
        Ok(self.value.read().await.clone())
    }

    async fn save(&self, key: &str) -> anyhow::Result<()> {
        *self.value.write().await = Some(key.trim().to_string());
        Ok(())
    }

    async fn remove(&self) -> anyhow::Result<bool> {
        Ok(self.value.write().await.take().is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn key_format_checks() {
        assert!(is_valid_key_format("  AIzaSyA1234567890abcdefg  "));
        assert!(!is_valid_key_format("AIzaShort"));
        assert!(!is_valid_key_format("sk-1234567890abcdefghijkl"));
        assert!(looks_like_credential(" AIzaFAKEKEY1234567890"));
        assert!(!looks_like_credential("Xin chào AIza"));
    }

    #[tokio::test]
    async fn sqlite_store_round_trip_survives_reopen() {
        let dir = tempdir().unwrap();
        let url = format!("sqlite://{}", dir.path().join("kv.db").to_string_lossy());

        let store = SqliteCredentialStore::initialize(Some(url.clone())).await.unwrap();
        assert_eq!(store.load().await.unwrap(), None);
        store.save(" AIzaFirstKey1234567890 ").await.unwrap();
        store.save("AIzaSecondKey123456789").await.unwrap();
        drop(store);

        let store = SqliteCredentialStore::initialize(Some(url)).await.unwrap();
        assert_eq!(store.load().await.unwrap().as_deref(), Some("AIzaSecondKey123456789"));
        let row = sqlx::query("SELECT count(*) as c FROM kv_store").fetch_one(store.pool()).await.unwrap();
        assert_eq!(row.get::<i64, _>("c"), 1);

        assert!(store.remove().await.unwrap());
        assert!(!store.remove().await.unwrap());
        assert_eq!(store.load().await.unwrap(), None);
    }

    #[tokio::test]
    async fn memory_store_behaves_like_sqlite() {
        let store = MemoryCredentialStore::default();
        assert_eq!(store.load().await.unwrap(), None);
        store.save("AIzaMemoryKey123456789").await.unwrap();
        assert_eq!(store.load().await.unwrap().as_deref(), Some("AIzaMemoryKey123456789"));
        assert!(store.remove().await.unwrap());
        assert_eq!(store.load().await.unwrap(), None);
    }
}
