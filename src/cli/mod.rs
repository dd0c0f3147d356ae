pub mod ascii_preview;
pub mod auth_screen;
pub mod chat_repl;
pub mod logs;

pub use ascii_preview::{clear_screen, poll_key, AsciiRenderer};
pub use logs::{LogEntry, LogKind, SystemLog};
