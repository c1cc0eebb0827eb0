//! Local player identity and the key-value store that keeps it.

use crate::error::{ClientError, ClientErrorKind};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, instrument, warn};

/// Store key holding the current username.
pub const CURRENT_USER_KEY: &str = "onevoneme.currentUser";

/// Shortest accepted username.
pub const MIN_USERNAME_LEN: usize = 3;

/// Longest accepted username.
pub const MAX_USERNAME_LEN: usize = 32;

/// The username this client plays as.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, derive_more::Display)]
#[display("{username}")]
pub struct PlayerIdentity {
    username: String,
}

impl PlayerIdentity {
    /// Trims `raw` and drops every character outside `[A-Za-z0-9_-]`.
    pub fn sanitize(raw: &str) -> String {
        raw.trim()
            .chars()
            .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '-')
            .collect()
    }

    /// Sanitizes and validates a username.
    #[instrument]
    pub fn parse(raw: &str) -> Result<Self, ClientError> {
        let username = Self::sanitize(raw);
        let len = username.chars().count();
        if len < MIN_USERNAME_LEN || len > MAX_USERNAME_LEN {
            return Err(ClientError::new(ClientErrorKind::InvalidUsername {
                reason: format!(
                    "must be {MIN_USERNAME_LEN}-{MAX_USERNAME_LEN} characters of letters, digits, '_' or '-' (got {len})"
                ),
            }));
        }
        Ok(Self { username })
    }

    /// The username.
    pub fn username(&self) -> &str {
        &self.username
    }
}

/// Swappable key-value storage for session-scoped values.
pub trait SessionStore: Send + Sync + std::fmt::Debug {
    /// Reads a value.
    fn get(&self, key: &str) -> Result<Option<String>, ClientError>;
    /// Writes a value.
    fn set(&self, key: &str, value: &str) -> Result<(), ClientError>;
    /// Removes a value. Removing a missing key is not an error.
    fn clear(&self, key: &str) -> Result<(), ClientError>;
}

/// In-process store; forgets everything when dropped.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    values: Mutex<HashMap<String, String>>,
}

impl MemorySessionStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn values(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, String>>, ClientError> {
        self.values
            .lock()
            .map_err(|_| ClientError::store("memory store lock poisoned"))
    }
}

impl SessionStore for MemorySessionStore {
    fn get(&self, key: &str) -> Result<Option<String>, ClientError> {
        Ok(self.values()?.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), ClientError> {
        self.values()?.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn clear(&self, key: &str) -> Result<(), ClientError> {
        self.values()?.remove(key);
        Ok(())
    }
}

/// Store backed by a JSON object in a file.
///
/// A missing file reads as empty. Every write rewrites the whole file.
#[derive(Debug)]
pub struct FileSessionStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileSessionStore {
    /// Creates a store at `path`. Nothing is touched until first use.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    /// Backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[instrument(skip(self), fields(path = %self.path.display()))]
    fn read_all(&self) -> Result<BTreeMap<String, String>, ClientError> {
        match std::fs::read_to_string(&self.path) {
            Ok(content) if content.trim().is_empty() => Ok(BTreeMap::new()),
            Ok(content) => Ok(serde_json::from_str(&content)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(e.into()),
        }
    }

    #[instrument(skip(self, values), fields(path = %self.path.display(), entries = values.len()))]
    fn write_all(&self, values: &BTreeMap<String, String>) -> Result<(), ClientError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, serde_json::to_string_pretty(values)?)?;
        debug!("Session file written");
        Ok(())
    }

    fn update(
        &self,
        change: impl FnOnce(&mut BTreeMap<String, String>),
    ) -> Result<(), ClientError> {
        let _guard = self
            .lock
            .lock()
            .map_err(|_| ClientError::store("file store lock poisoned"))?;
        let mut values = self.read_all()?;
        change(&mut values);
        self.write_all(&values)
    }
}

impl SessionStore for FileSessionStore {
    fn get(&self, key: &str) -> Result<Option<String>, ClientError> {
        Ok(self.read_all()?.remove(key))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), ClientError> {
        self.update(|values| {
            values.insert(key.to_string(), value.to_string());
        })
    }

    fn clear(&self, key: &str) -> Result<(), ClientError> {
        self.update(|values| {
            values.remove(key);
        })
    }
}

/// Holds the locally known identity on top of a [`SessionStore`].
#[derive(Debug, Clone)]
pub struct IdentityStore {
    store: Arc<dyn SessionStore>,
}

impl IdentityStore {
    /// Wraps a session store.
    pub fn new(store: Arc<dyn SessionStore>) -> Self {
        Self { store }
    }

    /// Identity kept in memory only.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemorySessionStore::new()))
    }

    /// The remembered identity, if any.
    ///
    /// A stored value that no longer passes validation is dropped and
    /// reported as no identity.
    #[instrument(skip(self))]
    pub fn current(&self) -> Result<Option<PlayerIdentity>, ClientError> {
        let Some(raw) = self.store.get(CURRENT_USER_KEY)? else {
            return Ok(None);
        };
        match PlayerIdentity::parse(&raw) {
            Ok(identity) if identity.username() == raw => Ok(Some(identity)),
            _ => {
                warn!(stored = %raw, "Discarding invalid stored username");
                self.store.clear(CURRENT_USER_KEY)?;
                Ok(None)
            }
        }
    }

    /// Remembers `identity` as the current player.
    #[instrument(skip(self), fields(username = %identity))]
    pub fn remember(&self, identity: &PlayerIdentity) -> Result<(), ClientError> {
        self.store.set(CURRENT_USER_KEY, identity.username())?;
        info!("Identity stored");
        Ok(())
    }

    /// Forgets the current player (logout).
    #[instrument(skip(self))]
    pub fn forget(&self) -> Result<(), ClientError> {
        self.store.clear(CURRENT_USER_KEY)?;
        info!("Identity cleared");
        Ok(())
    }
}
