//! Persistence of the session record.
//!
//! A [`SessionStorage`] holds exactly one canonical [`Session`] record. Every write replaces the
//! whole record, so readers never observe a session with only some of its fields updated.
//!
//! Older frontends kept the session in a set of loosely coupled named slots, see
//! [`LegacySlots`]. [`FileStorage`] migrates such files to the canonical record on first load.

use std::fmt;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use mediport_types::Role;
use serde::{Deserialize, Serialize};

use crate::StorageError;
use crate::session::{AccessToken, DEFAULT_SCHEME, Session};

/// A persistent slot for the current session.
///
/// Implementations must make [`store`](Self::store) atomic with respect to concurrent
/// [`load`](Self::load) calls, including from other processes sharing the same backing store.
pub trait SessionStorage: fmt::Debug + Send + Sync {
    /// Loads the stored session, returning `None` if nothing was stored yet.
    fn load(&self) -> Result<Option<Session>, StorageError>;

    /// Replaces the stored session.
    fn store(&self, session: &Session) -> Result<(), StorageError>;

    /// Removes the stored session, so that the next [`load`](Self::load) returns `None`.
    fn clear(&self) -> Result<(), StorageError>;
}

/// Process-local session storage.
///
/// Clones share the same slot, which allows several contexts to observe a common session.
#[derive(Clone, Debug, Default)]
pub struct MemoryStorage {
    slot: Arc<Mutex<Option<Session>>>,
}

impl MemoryStorage {
    /// Creates empty storage.
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self) -> std::sync::MutexGuard<'_, Option<Session>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl SessionStorage for MemoryStorage {
    fn load(&self) -> Result<Option<Session>, StorageError> {
        Ok(self.slot().clone())
    }

    fn store(&self, session: &Session) -> Result<(), StorageError> {
        *self.slot() = Some(session.clone());
        Ok(())
    }

    fn clear(&self) -> Result<(), StorageError> {
        *self.slot() = None;
        Ok(())
    }
}

/// Session storage backed by a JSON file.
///
/// Writes go to a temporary file in the same directory which is then renamed over the session
/// file. Files in the [`LegacySlots`] layout are reconciled and rewritten in the canonical layout
/// when loaded.
#[derive(Clone, Debug)]
pub struct FileStorage {
    path: PathBuf,
}

/// Slot names that only occur in the legacy layout.
const LEGACY_KEYS: [&str; 4] = ["authToken", "isLoggedIn", "tokenType", "userRole"];

fn is_legacy(record: &serde_json::Value) -> bool {
    record
        .as_object()
        .is_some_and(|record| LEGACY_KEYS.iter().any(|key| record.contains_key(*key)))
}

impl FileStorage {
    /// Creates storage for the file at `path`.
    ///
    /// The file and its parent directories are created on the first write.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Returns the path of the session file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SessionStorage for FileStorage {
    fn load(&self) -> Result<Option<Session>, StorageError> {
        let contents = match std::fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };

        let record: serde_json::Value = serde_json::from_str(&contents)?;
        if !is_legacy(&record) {
            return Ok(Some(serde_json::from_value(record)?));
        }

        tracing::info!(path = %self.path.display(), "migrating legacy session record");
        let mut slots: LegacySlots = serde_json::from_value(record)?;
        slots.reconcile();
        let session = slots.into_session();
        self.store(&session)?;
        Ok(Some(session))
    }

    fn store(&self, session: &Session) -> Result<(), StorageError> {
        let dir = match self.path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(dir)?;

        let mut file = tempfile::NamedTempFile::new_in(dir)?;
        serde_json::to_writer_pretty(&mut file, session)?;
        file.flush()?;
        file.persist(&self.path).map_err(|err| err.error)?;
        Ok(())
    }

    fn clear(&self) -> Result<(), StorageError> {
        match std::fs::remove_file(&self.path) {
            Err(err) if err.kind() != io::ErrorKind::NotFound => Err(err.into()),
            _ => Ok(()),
        }
    }
}

/// The historical session layout of named slots.
///
/// The token was kept under two slot names, `token` and `authToken`, which were expected to hold
/// the same value. Empty slots count as absent.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LegacySlots {
    /// The primary token slot.
    pub token: Option<String>,
    /// The secondary token slot.
    pub auth_token: Option<String>,
    /// The authorization scheme, for example `"Bearer"`.
    pub token_type: Option<String>,
    /// `"true"` while logged in.
    pub is_logged_in: Option<String>,
    /// The descriptive name of the user's role.
    pub user_role: Option<String>,
    /// The remembered username.
    pub username: Option<String>,
}

fn present(slot: &Option<String>) -> Option<&str> {
    slot.as_deref().filter(|value| !value.is_empty())
}

impl LegacySlots {
    /// Repairs a partially written record.
    ///
    /// If exactly one of the two token slots is set, the other one is backfilled from it. A
    /// missing scheme is set to `"Bearer"`. The logged-in slot is left untouched.
    pub fn reconcile(&mut self) {
        match (present(&self.token), present(&self.auth_token)) {
            (Some(token), None) => self.auth_token = Some(token.to_owned()),
            (None, Some(token)) => self.token = Some(token.to_owned()),
            _ => (),
        }

        if present(&self.token_type).is_none() {
            self.token_type = Some(DEFAULT_SCHEME.to_owned());
        }
    }

    /// Converts the slots into a canonical [`Session`].
    ///
    /// The primary token slot wins over the secondary one. Unknown role names yield a session
    /// without a role.
    pub fn into_session(self) -> Session {
        let token = present(&self.token)
            .or(present(&self.auth_token))
            .map(AccessToken::new);

        Session {
            token,
            scheme: present(&self.token_type)
                .unwrap_or(DEFAULT_SCHEME)
                .to_owned(),
            logged_in: self.is_logged_in.as_deref() == Some("true"),
            role: present(&self.user_role).and_then(Role::from_name),
            username: present(&self.username).map(str::to_owned),
        }
    }
}
