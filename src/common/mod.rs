pub mod config;
pub mod dev_mode;
pub mod error;
pub mod session;

pub use config::{Config, ChatMode, ZOOM_LEVELS};
pub use dev_mode::DevMode;
pub use error::{JarvisError, Result};
pub use session::SessionContext;
