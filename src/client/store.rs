//! Client-local persistence of the signed-in marker.
//!
//! [`Storage`] is the key/value backend: [`FileStorage`] survives restarts
//! (the "local storage" of a desktop or CLI client), [`MemoryStorage`] lives
//! as long as the process (the "session storage" of a tab).
//! [`SessionStore`] layers the TTL-bound [`AuthCacheEntry`] on top.

use crate::client::error::StorageError;
use async_trait::async_trait;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::fs;
use tokio::io::AsyncWriteExt;

/// Fixed key under which the sign-in cache entry is persisted.
pub const AUTH_CACHE_KEY: &str = "predikt:auth:v1";

/// Key under which the server session token is persisted between runs.
pub const SESSION_TOKEN_KEY: &str = "predikt:session:v1";

/// Default lifetime of a cached sign-in.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(12 * 60 * 60);

/// Milliseconds since the Unix epoch.
pub fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

/// Epoch milliseconds `ttl` from now, saturating at `u64::MAX`.
pub fn expiry_after(ttl: Duration) -> u64 {
    let ttl_ms = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX);
    now_millis().saturating_add(ttl_ms)
}

/// String key/value storage backend.
#[async_trait]
pub trait Storage: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError>;
    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;
    async fn remove(&self, key: &str) -> Result<(), StorageError>;
}

/// Process-lifetime storage.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.entries().get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.entries().insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.entries().remove(key);
        Ok(())
    }
}

/// Directory-backed storage: one JSON file per key.
///
/// File structure: `{dir}/{key}.json`, with characters outside
/// `[A-Za-z0-9._-]` in the key replaced by `_`.
#[derive(Debug, Clone)]
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let name: String = key
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.dir.join(format!("{}.json", name))
    }
}

#[async_trait]
impl Storage for FileStorage {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        match fs::read_to_string(self.path_for(key)).await {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Atomic write: temp file, fsync, then rename over the target.
    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        fs::create_dir_all(&self.dir).await?;

        let path = self.path_for(key);
        let temp_path = path.with_extension("tmp");
        let mut file = fs::File::create(&temp_path).await?;
        file.write_all(value.as_bytes()).await?;
        file.sync_all().await?;
        drop(file);

        fs::rename(&temp_path, &path).await?;
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StorageError> {
        match fs::remove_file(self.path_for(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// A persisted value carrying its own expiry.
pub trait Expiring {
    /// Expiry as epoch milliseconds.
    fn expires_at(&self) -> u64;
}

/// Read `key` as JSON, dropping it when malformed or expired.
pub(crate) async fn read_unexpired<T>(storage: &dyn Storage, key: &str) -> Option<T>
where
    T: DeserializeOwned + Expiring,
{
    let raw = match storage.get(key).await {
        Ok(Some(raw)) => raw,
        Ok(None) => return None,
        Err(e) => {
            tracing::warn!(key, error = %e, "Failed to read cached entry");
            return None;
        }
    };

    let entry = match serde_json::from_str::<T>(&raw) {
        Ok(entry) if entry.expires_at() > now_millis() => return Some(entry),
        Ok(_) => {
            tracing::debug!(key, "Cached entry expired");
            None
        }
        Err(e) => {
            tracing::warn!(key, error = %e, "Discarding malformed cached entry");
            None
        }
    };

    if let Err(e) = storage.remove(key).await {
        tracing::warn!(key, error = %e, "Failed to remove stale cached entry");
    }
    entry
}

/// Locally persisted proof of a prior successful sign-in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthCacheEntry {
    /// Signature bytes joined by `,`.
    pub sig: String,
    /// Expiry, epoch milliseconds.
    pub exp: u64,
    /// Wallet the entry was issued for. Entries written without it match any wallet.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wallet: Option<String>,
}

impl AuthCacheEntry {
    pub fn new(signature: &[u8], wallet: &str, ttl: Duration) -> Self {
        Self {
            sig: signature
                .iter()
                .map(|b| b.to_string())
                .collect::<Vec<_>>()
                .join(","),
            exp: expiry_after(ttl),
            wallet: Some(wallet.to_string()),
        }
    }

    pub fn belongs_to(&self, wallet: &str) -> bool {
        self.wallet.as_deref().is_none_or(|w| w == wallet)
    }
}

impl Expiring for AuthCacheEntry {
    fn expires_at(&self) -> u64 {
        self.exp
    }
}

/// Server session token kept alongside the cache entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedSession {
    pub token: String,
    /// Expiry, epoch milliseconds.
    pub exp: u64,
}

impl Expiring for SavedSession {
    fn expires_at(&self) -> u64 {
        self.exp
    }
}

/// TTL-bound cache of [`AuthCacheEntry`] values over a [`Storage`] backend.
#[derive(Clone)]
pub struct SessionStore {
    storage: Arc<dyn Storage>,
    ttl: Duration,
}

impl SessionStore {
    pub fn new(storage: Arc<dyn Storage>, ttl: Duration) -> Self {
        Self { storage, ttl }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Returns the entry if present and unexpired. Malformed or expired entries are removed.
    pub async fn read(&self, key: &str) -> Option<AuthCacheEntry> {
        read_unexpired(self.storage.as_ref(), key).await
    }

    pub async fn write(&self, key: &str, entry: &AuthCacheEntry) -> Result<(), StorageError> {
        let json = serde_json::to_string(entry)?;
        self.storage.set(key, &json).await
    }

    pub async fn clear(&self, key: &str) -> Result<(), StorageError> {
        self.storage.remove(key).await
    }

    pub async fn load_session_token(&self) -> Option<String> {
        read_unexpired::<SavedSession>(self.storage.as_ref(), SESSION_TOKEN_KEY)
            .await
            .map(|saved| saved.token)
    }

    pub async fn save_session_token(&self, token: &str) -> Result<(), StorageError> {
        let saved = SavedSession {
            token: token.to_string(),
            exp: expiry_after(self.ttl),
        };
        let json = serde_json::to_string(&saved)?;
        self.storage.set(SESSION_TOKEN_KEY, &json).await
    }

    pub async fn forget_session_token(&self) -> Result<(), StorageError> {
        self.storage.remove(SESSION_TOKEN_KEY).await
    }
}

impl std::fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStore").field("ttl", &self.ttl).finish()
    }
}
