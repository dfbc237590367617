use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// Persistence for the bearer credential.
///
/// Pure storage: no validation, no side effects beyond persistence. Safe to
/// use before any other component is initialized. Implementations absorb
/// their own I/O failures; a credential that cannot be read is "absent".
///
/// # Example
///
/// ```rust,ignore
/// impl CredentialStore for KeyringStore {
///     fn save(&self, token: &str) { self.entry.set_password(token).ok(); }
///     fn read(&self) -> Option<String> { self.entry.get_password().ok() }
///     fn clear(&self) { self.entry.delete_credential().ok(); }
/// }
/// ```
pub trait CredentialStore: Send + Sync + 'static {
    /// Persist `token`, replacing any previous credential.
    fn save(&self, token: &str);

    /// The persisted credential, if any.
    fn read(&self) -> Option<String>;

    /// Remove the persisted credential. Clearing an empty store is a no-op.
    fn clear(&self);
}

/// In-process credential store.
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    token: Mutex<Option<String>>,
}

impl MemoryCredentialStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-seeded with a credential.
    #[must_use]
    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            token: Mutex::new(Some(token.into())),
        }
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn save(&self, token: &str) {
        *self.token.lock() = Some(token.to_owned());
    }

    fn read(&self) -> Option<String> {
        self.token.lock().clone()
    }

    fn clear(&self) {
        self.token.lock().take();
    }
}

/// On-disk document; the credential lives under the fixed `token` key.
#[derive(Serialize, Deserialize)]
struct StoredCredential {
    token: String,
}

/// Credential store backed by a small JSON file.
#[derive(Debug, Clone)]
pub struct FileCredentialStore {
    path: PathBuf,
}

impl FileCredentialStore {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CredentialStore for FileCredentialStore {
    fn save(&self, token: &str) {
        let doc = StoredCredential {
            token: token.to_owned(),
        };
        let result = serde_json::to_vec(&doc)
            .map_err(std::io::Error::other)
            .and_then(|bytes| {
                if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
                    std::fs::create_dir_all(parent)?;
                }
                std::fs::write(&self.path, bytes)
            });
        if let Err(e) = result {
            tracing::warn!(path = %self.path.display(), error = %e, "Failed to persist credential");
        }
    }

    fn read(&self) -> Option<String> {
        let bytes = match std::fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return None,
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "Failed to read credential");
                return None;
            }
        };
        match serde_json::from_slice::<StoredCredential>(&bytes) {
            Ok(doc) if !doc.token.is_empty() => Some(doc.token),
            Ok(_) => None,
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "Stored credential is unreadable");
                None
            }
        }
    }

    fn clear(&self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "Failed to clear credential");
            }
        }
    }
}
