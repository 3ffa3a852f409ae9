//! Per-client-id token cache with optional file persistence.
mod file_store;

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::{Arc, Mutex, OnceLock, PoisonError, RwLock},
    time::Duration,
};

use chrono::Utc;

use self::file_store::FileStore;
use crate::token::AccessToken;

/// Tokens are considered expired this long before their actual expiry, so that a
/// token handed out is still accepted when it reaches the API.
pub const DEFAULT_EXPIRY_MARGIN: Duration = Duration::from_secs(5);

/// Stores the most recent valid token of each client id.
///
/// Uses `Arc` internally for cheap cloning; clones share their entries.
///
/// If created with [`TokenCache::persistent`], every stored token is also written to
/// a file in the token directory and a lookup that misses in memory falls back to
/// that file. This lets a new process reuse a token issued to a previous one.
/// Persistence is best-effort: I/O errors are logged and otherwise ignored.
#[derive(Debug, Clone)]
pub struct TokenCache {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    tokens: RwLock<HashMap<String, AccessToken>>,
    fetch_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    file_store: Option<FileStore>,
    margin: Duration,
}

impl TokenCache {
    /// An in-memory cache that lives as long as its last clone.
    #[must_use]
    pub fn new() -> Self {
        Self::with_store(None, DEFAULT_EXPIRY_MARGIN)
    }

    /// A cache that mirrors its entries into `token_dir`.
    /// The directory is created on first write.
    #[must_use]
    pub fn persistent(token_dir: impl Into<PathBuf>) -> Self {
        Self::with_store(Some(FileStore::new(token_dir)), DEFAULT_EXPIRY_MARGIN)
    }

    /// Same cache configuration with a different expiry margin.
    /// The returned cache does not share entries with `self`.
    #[must_use]
    pub fn with_margin(self, margin: Duration) -> Self {
        Self::with_store(self.inner.file_store.clone(), margin)
    }

    /// The process-wide cache for the token endpoint `token_url`, persisted in
    /// `token_dir` if given.
    ///
    /// Every call with the same arguments returns a handle to the same entries.
    /// Client ids are only unique per token endpoint, so different endpoints never
    /// share entries, neither in memory nor on disk.
    #[must_use]
    pub fn shared(token_url: &str, token_dir: Option<&Path>) -> Self {
        static SHARED: OnceLock<Mutex<HashMap<(String, Option<PathBuf>), TokenCache>>> =
            OnceLock::new();

        let mut caches = SHARED
            .get_or_init(Mutex::default)
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        caches
            .entry((token_url.to_string(), token_dir.map(Path::to_path_buf)))
            .or_insert_with(|| {
                let file_store = token_dir.map(|dir| FileStore::new(dir).scoped(token_url));
                Self::with_store(file_store, DEFAULT_EXPIRY_MARGIN)
            })
            .clone()
    }

    fn with_store(file_store: Option<FileStore>, margin: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                tokens: RwLock::new(HashMap::new()),
                fetch_locks: Mutex::new(HashMap::new()),
                file_store,
                margin,
            }),
        }
    }

    #[must_use]
    pub fn margin(&self) -> Duration {
        self.inner.margin
    }

    /// Directory tokens are persisted to, if persistence is enabled.
    #[must_use]
    pub fn token_dir(&self) -> Option<&Path> {
        self.inner.file_store.as_ref().map(FileStore::dir)
    }

    /// Returns the token of `client_id` if it is still valid.
    ///
    /// Expired entries are evicted, in memory and on disk. On an in-memory miss the
    /// persisted file is consulted; a valid persisted token is loaded back into
    /// memory unless another token was stored there first.
    #[must_use]
    pub fn lookup(&self, client_id: &str) -> Option<AccessToken> {
        let now = Utc::now();
        let margin = self.inner.margin;

        let cached = self
            .inner
            .tokens
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(client_id)
            .cloned();

        if let Some(token) = cached {
            if token.is_valid_at(now, margin) {
                return Some(token);
            }
            tracing::debug!("Cached token for client `{client_id}` expired. Evicting.");
            let mut tokens = self
                .inner
                .tokens
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            // Another thread may have stored a fresh token in the meantime.
            if tokens.get(client_id) == Some(&token) {
                tokens.remove(client_id);
            }
        }

        let file_store = self.inner.file_store.as_ref()?;
        let token = file_store.read(client_id)?;
        if !token.is_valid_at(now, margin) {
            tracing::debug!("Persisted token for client `{client_id}` expired. Removing.");
            if let Err(e) = file_store.remove(client_id) {
                tracing::warn!("Failed to remove expired token for client `{client_id}`: {e}");
            }
            return None;
        }

        tracing::debug!("Loaded persisted token for client `{client_id}`.");
        let token = self
            .inner
            .tokens
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(client_id.to_string())
            .or_insert(token)
            .clone();
        Some(token)
    }

    /// Stores `token` as the current token of `client_id`, replacing any previous one.
    pub fn store(&self, client_id: &str, token: AccessToken) {
        self.inner
            .tokens
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(client_id.to_string(), token.clone());

        if let Some(file_store) = &self.inner.file_store {
            if let Err(e) = file_store.write(client_id, &token) {
                tracing::warn!(
                    "Failed to persist token for client `{client_id}` to `{}`: {e}",
                    file_store.dir().display()
                );
            }
        }
    }

    /// Forgets the token of `client_id`, in memory and on disk.
    /// The next token request for this client goes to the backend.
    pub fn invalidate(&self, client_id: &str) -> Option<AccessToken> {
        let removed = self
            .inner
            .tokens
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(client_id);

        if let Some(file_store) = &self.inner.file_store {
            if let Err(e) = file_store.remove(client_id) {
                tracing::warn!("Failed to remove persisted token for client `{client_id}`: {e}");
            }
        }
        removed
    }

    /// Lock serializing token fetches for one client id.
    ///
    /// Lookups never take this lock, and fetches for other client ids are not
    /// affected by it.
    pub(crate) fn fetch_lock(&self, client_id: &str) -> Arc<Mutex<()>> {
        self.inner
            .fetch_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(client_id.to_string())
            .or_default()
            .clone()
    }
}

impl Default for TokenCache {
    fn default() -> Self {
        Self::new()
    }
}
