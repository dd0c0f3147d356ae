use directories::ProjectDirs;
use std::fs;
use std::path::PathBuf;
use crate::common::error::{JarvisError, Result};

/// Where persisted data lives: `./dev_data` in development mode, the
/// platform project directories otherwise.
#[derive(Debug, Clone)]
pub struct DevMode {
    enabled: bool,
    base_dir: PathBuf,
}

impl DevMode {
    pub fn new(enabled: bool) -> Result<Self> {
        let base_dir = if enabled {
            PathBuf::from("./dev_data")
        } else {
            let dirs = ProjectDirs::from("com", "jarvis", "Jarvis")
                .ok_or_else(|| JarvisError::Storage("Failed to get project dirs".into()))?;
            dirs.data_dir().to_path_buf()
        };

        let mode = Self { enabled, base_dir };
        fs::create_dir_all(mode.data_dir())?;
        fs::create_dir_all(mode.captures_dir())?;

        if enabled {
            tracing::info!("Development mode enabled - data will be saved to: {}", mode.base_dir.display());
        }

        Ok(mode)
    }

    /// Rooted at an explicit directory. Used by tests and embedders.
    pub fn with_base_dir(base_dir: PathBuf) -> Result<Self> {
        let mode = Self { enabled: true, base_dir };
        fs::create_dir_all(mode.data_dir())?;
        fs::create_dir_all(mode.captures_dir())?;
        Ok(mode)
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn data_dir(&self) -> PathBuf {
        if self.enabled {
            self.base_dir.join("session")
        } else {
            self.base_dir.clone()
        }
    }

    pub fn captures_dir(&self) -> PathBuf {
        self.base_dir.join("captures")
    }

    pub fn get_capture_path(&self, prefix: &str) -> PathBuf {
        let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
        self.captures_dir().join(format!("{}_{}.jpg", prefix, timestamp))
    }
}
