//! Versioned JSON document store for the identity aggregate.

use super::traits::IdentityStore;
use crate::models::Identity;
use crate::{Error, Result};
use std::path::{Path, PathBuf};

/// Persists [`Identity`] as a single JSON document, replaced atomically.
///
/// Writes go to a temp file in the same directory followed by a rename, so
/// a crash mid-write leaves the previous document intact. Every save bumps
/// the document version.
pub struct JsonIdentityStore {
    path: PathBuf,
}

fn io_err(operation: &str, e: &std::io::Error) -> Error {
    Error::StorageUnavailable {
        operation: operation.to_string(),
        cause: e.to_string(),
    }
}

impl JsonIdentityStore {
    /// Creates a store writing to `<data_dir>/identity.json`.
    #[must_use]
    pub fn new(data_dir: &Path) -> Self {
        Self {
            path: data_dir.join("identity.json"),
        }
    }

    /// The document path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl IdentityStore for JsonIdentityStore {
    fn load(&self) -> Result<Option<Identity>> {
        let contents = match std::fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(io_err("load_identity", &e)),
        };
        let identity: Identity = serde_json::from_str(&contents)
            .map_err(|e| Error::Validation(format!("corrupt identity document: {e}")))?;
        Ok(Some(identity))
    }

    fn save(&self, identity: &mut Identity) -> Result<()> {
        identity.version += 1;

        let json = serde_json::to_string_pretty(identity).map_err(|e| {
            Error::StorageUnavailable {
                operation: "save_identity".to_string(),
                cause: e.to_string(),
            }
        })?;

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| io_err("save_identity", &e))?;
        }

        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json).map_err(|e| io_err("save_identity", &e))?;
        std::fs::rename(&tmp, &self.path).map_err(|e| io_err("save_identity", &e))?;

        tracing::debug!(version = identity.version, path = %self.path.display(), "identity saved");
        Ok(())
    }
}
