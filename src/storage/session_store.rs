use crate::common::{DevMode, JarvisError, Result};
use crate::service::protocol::AuthenticatedUser;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

const STORAGE_VERSION: u32 = 1;
const SESSION_FILE: &str = "jarvis_user.bincode";

#[derive(Serialize, Deserialize)]
struct StoredSession {
    version: u32,
    user: AuthenticatedUser,
}

/// Persists the logged-in user between runs.
pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    pub fn new_with_dev_mode(dev_mode: &DevMode) -> Result<Self> {
        let data_dir = dev_mode.data_dir();
        fs::create_dir_all(&data_dir)?;
        if dev_mode.is_enabled() {
            tracing::debug!("SessionStore using dev directory: {:?}", data_dir);
        }
        Ok(Self { path: data_dir.join(SESSION_FILE) })
    }

    pub fn new_with_path(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn save(&self, user: &AuthenticatedUser) -> Result<()> {
        let stored = StoredSession { version: STORAGE_VERSION, user: user.clone() };
        let encoded = bincode::serialize(&stored)
            .map_err(|e| JarvisError::Storage(format!("Failed to serialize: {}", e)))?;
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, encoded)?;
        Ok(())
    }

    /// Stored user, if any. A corrupt file is treated as absent.
    pub fn load(&self) -> Result<Option<AuthenticatedUser>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let data = fs::read(&self.path)?;
        match bincode::deserialize::<StoredSession>(&data) {
            Ok(stored) => Ok(Some(stored.user)),
            Err(e) => {
                tracing::warn!("Ignoring unreadable session file {:?}: {}", self.path, e);
                Ok(None)
            }
        }
    }

    pub fn clear(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
