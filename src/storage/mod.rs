pub mod session_manager;
pub mod session_store;

pub use session_manager::SessionManager;
pub use session_store::SessionStore;
