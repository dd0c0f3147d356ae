// Core modules
pub mod core;
pub mod camera;
pub mod storage;
pub mod service;
pub mod cli;
pub mod common;

// Re-export commonly used types
pub use common::{Config, DevMode, JarvisError, Result, SessionContext};
pub use crate::core::{AuthFlowController, ChatSession, Tab, VoiceController};
pub use camera::{CameraCapture, CapturedFrame, V4l2Source, Zoom};
pub use storage::{SessionManager, SessionStore};
pub use service::{protocol, ApiClient, FaceAuthApi};
