//! Session Store
//!
//! Persists the single backend-assigned session identifier so a conversation
//! survives a restart of the host surface. The stored value is opaque; the
//! console never inspects or expires it.

use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use thiserror::Error;

/// Errors that can occur while persisting a session id
#[derive(Debug, Error)]
pub enum SessionStoreError {
    /// Failed to write the session file
    #[error("Failed to write session file {path}: {source}")]
    WriteError {
        /// File being written
        path: PathBuf,
        /// Underlying IO error
        #[source]
        source: std::io::Error,
    },

    /// Failed to remove the session file
    #[error("Failed to clear session file {path}: {source}")]
    ClearError {
        /// File being removed
        path: PathBuf,
        /// Underlying IO error
        #[source]
        source: std::io::Error,
    },

    /// No usable state directory on this platform
    #[error("No state directory available for session persistence")]
    NoStateDir,
}

/// Storage for the active session identifier
pub trait SessionStore: Send + Sync {
    /// Current session id, if one has been stored
    fn get(&self) -> Option<String>;

    /// Replace the stored session id
    fn set(&self, id: &str) -> Result<(), SessionStoreError>;

    /// Forget the stored session id
    fn clear(&self) -> Result<(), SessionStoreError>;
}

/// Process-lifetime store
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    id: Mutex<Option<String>>,
}

impl MemorySessionStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for MemorySessionStore {
    fn get(&self) -> Option<String> {
        self.id.lock().clone()
    }

    fn set(&self, id: &str) -> Result<(), SessionStoreError> {
        *self.id.lock() = Some(id.to_string());
        Ok(())
    }

    fn clear(&self) -> Result<(), SessionStoreError> {
        self.id.lock().take();
        Ok(())
    }
}

/// File-backed store, one file per host instance name
///
/// Survives host restarts; two instances with different names never see each
/// other's sessions.
#[derive(Debug, Clone)]
pub struct FileSessionStore {
    path: PathBuf,
}

impl FileSessionStore {
    /// Store for `instance` under the platform state directory
    ///
    /// Resolves to `$XDG_STATE_HOME/k13d/sessions/<instance>`, falling back to
    /// the local data directory on platforms without a state dir.
    pub fn for_instance(instance: &str) -> Result<Self, SessionStoreError> {
        let base = dirs::state_dir()
            .or_else(dirs::data_local_dir)
            .ok_or(SessionStoreError::NoStateDir)?;
        Ok(Self::at(
            base.join("k13d").join("sessions").join(sanitize_instance(instance)),
        ))
    }

    /// Store backed by an explicit file path
    #[must_use]
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Backing file path
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Keep instance names from escaping the sessions directory
fn sanitize_instance(instance: &str) -> String {
    let cleaned: String = instance
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .collect();

    match cleaned.trim_matches('.') {
        "" => "default".to_string(),
        name => name.to_string(),
    }
}

impl SessionStore for FileSessionStore {
    fn get(&self) -> Option<String> {
        match std::fs::read_to_string(&self.path) {
            Ok(contents) => {
                let id = contents.trim();
                (!id.is_empty()).then(|| id.to_string())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "Failed to read session file");
                None
            }
        }
    }

    fn set(&self, id: &str) -> Result<(), SessionStoreError> {
        let write_err = |source| SessionStoreError::WriteError {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(write_err)?;
        }
        std::fs::write(&self.path, id).map_err(write_err)?;

        tracing::debug!(path = %self.path.display(), "Session id persisted");
        Ok(())
    }

    fn clear(&self) -> Result<(), SessionStoreError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(SessionStoreError::ClearError {
                path: self.path.clone(),
                source,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_memory_store_set_get_clear() {
        let store = MemorySessionStore::new();
        assert_eq!(store.get(), None);

        store.set("abc").unwrap();
        assert_eq!(store.get().as_deref(), Some("abc"));

        store.set("def").unwrap();
        assert_eq!(store.get().as_deref(), Some("def"));

        store.clear().unwrap();
        assert_eq!(store.get(), None);
    }

    #[test]
    fn test_file_store_survives_new_handle() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("default");

        FileSessionStore::at(&path).set("session-42").unwrap();

        // A fresh handle simulates a restarted host
        let reopened = FileSessionStore::at(&path);
        assert_eq!(reopened.get().as_deref(), Some("session-42"));
    }

    #[test]
    fn test_file_store_instances_are_isolated() {
        let dir = TempDir::new().unwrap();
        let a = FileSessionStore::at(dir.path().join("a"));
        let b = FileSessionStore::at(dir.path().join("b"));

        a.set("one").unwrap();
        assert_eq!(a.get().as_deref(), Some("one"));
        assert_eq!(b.get(), None);
    }

    #[test]
    fn test_file_store_missing_or_blank_reads_none() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("blank");

        let store = FileSessionStore::at(&path);
        assert_eq!(store.get(), None);

        std::fs::write(&path, "  \n").unwrap();
        assert_eq!(store.get(), None);
    }

    #[test]
    fn test_file_store_clear_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let store = FileSessionStore::at(dir.path().join("s"));

        store.clear().unwrap();
        store.set("x").unwrap();
        store.clear().unwrap();
        assert_eq!(store.get(), None);
        assert!(!store.path().exists());
    }

    #[test]
    fn test_sanitize_instance() {
        assert_eq!(sanitize_instance("work"), "work");
        assert_eq!(sanitize_instance("../etc/passwd"), "_etc_passwd");
        assert_eq!(sanitize_instance(""), "default");
        assert_eq!(sanitize_instance(".."), "default");
    }
}
