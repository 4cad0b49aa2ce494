//! Token storage.
//!
//! The [`TokenStore`] trait is the only place a token pair lives on the client.
//! Every operation is a short synchronous critical section: a pair is written
//! and read as a unit, so a reader never sees a new access token next to an
//! old refresh token.
//!
//! Two backends ship with the crate:
//! - [`MemoryTokenStore`] keeps the pair in process (tests, short-lived tools)
//! - [`FileTokenStore`] keeps the pair in a JSON file replaced by rename

use std::collections::{BTreeMap, HashMap};
use std::io::ErrorKind as IoErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use castgate_types::{ErrorKind, TokenPair};
use thiserror::Error;
use tracing::warn;

/// Errors raised by a token store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The persistence medium could not be reached.
    #[error("token storage unavailable: {0}")]
    Unavailable(String),

    /// Stored content could not be encoded.
    #[error("token storage serialization error: {0}")]
    Serialization(String),
}

impl StoreError {
    /// Taxonomy kind for this error. Always [`ErrorKind::StorageUnavailable`].
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::StorageUnavailable
    }
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        Self::Unavailable(err.to_string())
    }
}

/// Persistence key names, namespaced by application identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageKeys {
    /// Key holding the access token (`<app>_access_token`)
    pub access: String,
    /// Key holding the refresh token (`<app>_refresh_token`)
    pub refresh: String,
}

impl StorageKeys {
    /// Build the key names for an application.
    pub fn new(app_name: &str) -> Self {
        Self {
            access: format!("{app_name}_access_token"),
            refresh: format!("{app_name}_refresh_token"),
        }
    }

    fn read(&self, entries: &impl Fn(&str) -> Option<String>) -> Option<TokenPair> {
        let pair = TokenPair::new(entries(&self.access)?, entries(&self.refresh)?);
        pair.is_complete().then_some(pair)
    }
}

/// Storage for the active token pair.
pub trait TokenStore: Send + Sync {
    /// Replace the stored pair as a unit.
    fn save(&self, pair: &TokenPair) -> Result<(), StoreError>;

    /// Load the stored pair, or `None` when no complete pair is stored.
    fn load(&self) -> Result<Option<TokenPair>, StoreError>;

    /// Remove the stored pair. Clearing an empty store succeeds.
    fn clear(&self) -> Result<(), StoreError>;
}

impl<T: TokenStore + ?Sized> TokenStore for Arc<T> {
    fn save(&self, pair: &TokenPair) -> Result<(), StoreError> {
        (**self).save(pair)
    }

    fn load(&self) -> Result<Option<TokenPair>, StoreError> {
        (**self).load()
    }

    fn clear(&self) -> Result<(), StoreError> {
        (**self).clear()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ============================================================================
// Memory store
// ============================================================================

/// In-process token store.
///
/// Entries are kept under the namespaced key names so that the layout matches
/// what a browser or file backend would hold.
#[derive(Debug)]
pub struct MemoryTokenStore {
    keys: StorageKeys,
    entries: Mutex<HashMap<String, String>>,
    unavailable: AtomicBool,
}

impl MemoryTokenStore {
    /// Create an empty store for an application.
    pub fn new(app_name: &str) -> Self {
        Self {
            keys: StorageKeys::new(app_name),
            entries: Mutex::new(HashMap::new()),
            unavailable: AtomicBool::new(false),
        }
    }

    /// Simulate an unreachable medium. Every operation fails while set.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Raw value stored under a key.
    pub fn raw(&self, key: &str) -> Option<String> {
        lock(&self.entries).get(key).cloned()
    }

    /// Key names used by this store.
    pub fn keys(&self) -> &StorageKeys {
        &self.keys
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("memory store disabled".to_string()));
        }
        Ok(())
    }
}

impl TokenStore for MemoryTokenStore {
    fn save(&self, pair: &TokenPair) -> Result<(), StoreError> {
        self.check()?;
        let mut entries = lock(&self.entries);
        entries.insert(self.keys.access.clone(), pair.access_token.clone());
        entries.insert(self.keys.refresh.clone(), pair.refresh_token.clone());
        Ok(())
    }

    fn load(&self) -> Result<Option<TokenPair>, StoreError> {
        self.check()?;
        let entries = lock(&self.entries);
        Ok(self.keys.read(&|key| entries.get(key).cloned()))
    }

    fn clear(&self) -> Result<(), StoreError> {
        self.check()?;
        let mut entries = lock(&self.entries);
        entries.remove(&self.keys.access);
        entries.remove(&self.keys.refresh);
        Ok(())
    }
}

// ============================================================================
// File store
// ============================================================================

/// Token store backed by a single JSON file.
///
/// `save` writes a sibling temp file and renames it over the target, so the
/// file on disk always holds either the old pair or the new one.
#[derive(Debug)]
pub struct FileTokenStore {
    keys: StorageKeys,
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileTokenStore {
    /// Create a store writing to `path`. The parent directory must exist.
    pub fn new(app_name: &str, path: impl Into<PathBuf>) -> Self {
        Self {
            keys: StorageKeys::new(app_name),
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl TokenStore for FileTokenStore {
    fn save(&self, pair: &TokenPair) -> Result<(), StoreError> {
        let _guard = lock(&self.write_lock);

        let mut entries = BTreeMap::new();
        entries.insert(self.keys.access.as_str(), pair.access_token.as_str());
        entries.insert(self.keys.refresh.as_str(), pair.refresh_token.as_str());
        let body = serde_json::to_vec(&entries)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;

        let temp = self.temp_path();
        std::fs::write(&temp, body)?;
        std::fs::rename(&temp, &self.path)?;
        Ok(())
    }

    fn load(&self) -> Result<Option<TokenPair>, StoreError> {
        let body = match std::fs::read(&self.path) {
            Ok(body) => body,
            Err(e) if e.kind() == IoErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let entries: BTreeMap<String, String> = match serde_json::from_slice(&body) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Ignoring unreadable token file");
                return Ok(None);
            }
        };

        Ok(self.keys.read(&|key| entries.get(key).cloned()))
    }

    fn clear(&self) -> Result<(), StoreError> {
        let _guard = lock(&self.write_lock);
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == IoErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
