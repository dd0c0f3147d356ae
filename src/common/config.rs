use serde::{Deserialize, Serialize};
use std::path::Path;
use crate::common::error::{JarvisError, Result};

pub const DEFAULT_CONFIG_PATH: &str = "configs/jarvis.toml";
pub const API_URL_ENV: &str = "JARVIS_API_URL";

/// Zoom levels offered on the auth screen.
pub const ZOOM_LEVELS: [f32; 3] = [1.0, 1.4, 1.8];

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub camera: CameraConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub chat: ChatConfig,
    #[serde(default)]
    pub voice: VoiceConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ApiConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

fn default_base_url() -> String { "http://localhost:8000".to_string() }
fn default_request_timeout() -> u64 { 30 }
fn default_connect_timeout() -> u64 { 10 }

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            request_timeout_secs: default_request_timeout(),
            connect_timeout_secs: default_connect_timeout(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CameraConfig {
    #[serde(default)]
    pub device_index: u32,
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
    #[serde(default = "default_warmup_frames")]
    pub warmup_frames: u32,
    #[serde(default = "default_warmup_delay")]
    pub warmup_delay_ms: u64,
}

fn default_width() -> u32 { 640 }
fn default_height() -> u32 { 480 }
fn default_warmup_frames() -> u32 { 3 }
fn default_warmup_delay() -> u64 { 50 }

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            device_index: 0,
            width: default_width(),
            height: default_height(),
            warmup_frames: default_warmup_frames(),
            warmup_delay_ms: default_warmup_delay(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AuthConfig {
    #[serde(default = "default_validate_interval")]
    pub validate_interval_ms: u64,
    #[serde(default = "default_track_interval")]
    pub track_interval_ms: u64,
    #[serde(default = "default_initial_delay")]
    pub initial_validate_delay_ms: u64,
    #[serde(default = "default_zoom")]
    pub default_zoom: f32,
}

fn default_validate_interval() -> u64 { 2000 }
fn default_track_interval() -> u64 { 400 }
fn default_initial_delay() -> u64 { 500 }
fn default_zoom() -> f32 { 1.4 }

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            validate_interval_ms: default_validate_interval(),
            track_interval_ms: default_track_interval(),
            initial_validate_delay_ms: default_initial_delay(),
            default_zoom: default_zoom(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ChatMode {
    #[default]
    Backend,
    Mock,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ChatConfig {
    #[serde(default)]
    pub mode: ChatMode,
    #[serde(default = "default_mock_delay_min")]
    pub mock_delay_min_ms: u64,
    #[serde(default = "default_mock_delay_max")]
    pub mock_delay_max_ms: u64,
}

fn default_mock_delay_min() -> u64 { 800 }
fn default_mock_delay_max() -> u64 { 1200 }

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            mode: ChatMode::default(),
            mock_delay_min_ms: default_mock_delay_min(),
            mock_delay_max_ms: default_mock_delay_max(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct VoiceConfig {
    #[serde(default)]
    pub speak_replies: bool,
    /// External text-to-speech program; the reply is written to its stdin.
    #[serde(default)]
    pub tts_command: Option<String>,
}

impl Config {
    /// Load from the default location, falling back to built-in defaults
    /// when no file exists there.
    pub fn load() -> Result<Self> {
        let path = Path::new(DEFAULT_CONFIG_PATH);
        let mut config = if path.exists() {
            Self::read_file(path)?
        } else {
            tracing::debug!("No config at {}, using defaults", path.display());
            Config::default()
        };
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    pub fn load_from_path(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(JarvisError::Config(format!(
                "Config file not found: {}", path.display()
            )));
        }
        let mut config = Self::read_file(path)?;
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    fn read_file(path: &Path) -> Result<Self> {
        tracing::info!("Loading config from: {}", path.display());
        let contents = std::fs::read_to_string(path)?;
        toml::from_str(&contents)
            .map_err(|e| JarvisError::Config(format!("Config parse error: {}", e)))
    }

    fn apply_env(&mut self) {
        if let Ok(url) = std::env::var(API_URL_ENV) {
            if !url.trim().is_empty() {
                self.api.base_url = url;
            }
        }
        self.api.base_url = self.api.base_url.trim_end_matches('/').to_string();
    }

    pub fn validate(&self) -> Result<()> {
        if self.api.base_url.trim().is_empty() {
            return Err(JarvisError::Config("API base URL must not be empty".into()));
        }

        if self.camera.width == 0 || self.camera.width > 4096 {
            return Err(JarvisError::Config(format!(
                "Camera width must be between 1 and 4096, got {}", self.camera.width
            )));
        }
        if self.camera.height == 0 || self.camera.height > 4096 {
            return Err(JarvisError::Config(format!(
                "Camera height must be between 1 and 4096, got {}", self.camera.height
            )));
        }

        if self.auth.validate_interval_ms == 0 || self.auth.track_interval_ms == 0 {
            return Err(JarvisError::Config("Poll intervals must be greater than zero".into()));
        }
        if !ZOOM_LEVELS.contains(&self.auth.default_zoom) {
            return Err(JarvisError::Config(format!(
                "Zoom must be one of {:?}, got {}", ZOOM_LEVELS, self.auth.default_zoom
            )));
        }

        if self.chat.mock_delay_min_ms > self.chat.mock_delay_max_ms {
            return Err(JarvisError::Config(format!(
                "Mock delay range is inverted: {}..{}",
                self.chat.mock_delay_min_ms, self.chat.mock_delay_max_ms
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_auth_screen_timings() {
        let config = Config::default();
        assert_eq!(config.auth.validate_interval_ms, 2000);
        assert_eq!(config.auth.track_interval_ms, 400);
        assert_eq!(config.auth.initial_validate_delay_ms, 500);
        assert_eq!(config.auth.default_zoom, 1.4);
        assert_eq!(config.camera.width, 640);
        assert_eq!(config.camera.height, 480);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_toml_fills_in_defaults() {
        let config: Config = toml::from_str(
            r#"
            [api]
            base_url = "http://jarvis.local:9000"

            [chat]
            mode = "mock"
            "#,
        )
        .unwrap();
        assert_eq!(config.api.base_url, "http://jarvis.local:9000");
        assert_eq!(config.api.request_timeout_secs, 30);
        assert_eq!(config.chat.mode, ChatMode::Mock);
        assert_eq!(config.camera.height, 480);
    }

    #[test]
    fn rejects_unsupported_zoom() {
        let mut config = Config::default();
        config.auth.default_zoom = 2.5;
        assert!(matches!(config.validate(), Err(JarvisError::Config(_))));
    }

    #[test]
    fn rejects_zero_interval() {
        let mut config = Config::default();
        config.auth.track_interval_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        let err = Config::load_from_path(Path::new("/nonexistent/jarvis.toml")).unwrap_err();
        assert!(matches!(err, JarvisError::Config(_)));
    }

    #[test]
    fn loads_file_and_trims_trailing_slash() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("jarvis.toml");
        std::fs::write(&path, "[api]\nbase_url = \"http://example.test/\"\n").unwrap();
        let config = Config::load_from_path(&path).unwrap();
        if std::env::var(API_URL_ENV).is_err() {
            assert_eq!(config.api.base_url, "http://example.test");
        }
    }

    #[test]
    fn shipped_config_is_valid() {
        let config: Config = toml::from_str(include_str!("../../configs/jarvis.toml")).unwrap();
        assert_eq!(config.chat.mode, ChatMode::Backend);
        assert_eq!(config.voice.tts_command, None);
        assert!(config.validate().is_ok());
    }
}
