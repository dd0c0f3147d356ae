use thiserror::Error;

#[derive(Error, Debug)]
pub enum JarvisError {
    #[error("Camera access denied: {0}")]
    CameraDenied(String),

    #[error("Camera error: {0}")]
    Camera(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("{detail} (HTTP {status})")]
    Api { status: u16, detail: String },

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Config error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

impl From<reqwest::Error> for JarvisError {
    fn from(e: reqwest::Error) -> Self {
        JarvisError::Network(e.to_string())
    }
}

impl JarvisError {
    /// Message suitable for an inline error line on the auth screen.
    pub fn user_message(&self) -> String {
        match self {
            JarvisError::Api { detail, .. } => detail.clone(),
            JarvisError::CameraDenied(_) => "Camera access denied. Face is required.".to_string(),
            other => other.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, JarvisError>;
