use crate::common::{Result, SessionContext};
use crate::service::protocol::AuthenticatedUser;
use crate::storage::session_store::SessionStore;
use std::sync::Arc;
use tokio::sync::watch;

/// Root owner of the authenticated session: the in-memory user, the
/// persisted copy and the token installed in the [`SessionContext`].
pub struct SessionManager {
    context: Arc<SessionContext>,
    store: SessionStore,
    user: watch::Sender<Option<AuthenticatedUser>>,
}

impl SessionManager {
    pub fn new(store: SessionStore) -> Arc<Self> {
        let (user, _) = watch::channel(None);
        let manager = Arc::new(Self { context: SessionContext::new(), store, user });

        let weak = Arc::downgrade(&manager);
        manager.context.on_unauthorized(move || {
            if let Some(manager) = weak.upgrade() {
                if let Err(e) = manager.logout() {
                    tracing::error!("Logout after 401 failed: {}", e);
                }
            }
        });
        manager
    }

    pub fn context(&self) -> Arc<SessionContext> {
        self.context.clone()
    }

    /// Reinstate a previously persisted user. Entries without a token are
    /// ignored.
    pub fn restore(&self) -> Result<Option<AuthenticatedUser>> {
        let stored = self.store.load()?.filter(|u| !u.token.is_empty());
        if let Some(user) = &stored {
            tracing::info!("Restored session for {}", user.name);
            self.context.set_token(Some(user.token.clone()));
            self.user.send_replace(Some(user.clone()));
        }
        Ok(stored)
    }

    pub fn login(&self, user: AuthenticatedUser) -> Result<()> {
        self.store.save(&user)?;
        self.context.set_token(Some(user.token.clone()));
        tracing::info!("Logged in as {} ({})", user.name, user.user_id);
        self.user.send_replace(Some(user));
        Ok(())
    }

    pub fn logout(&self) -> Result<()> {
        self.user.send_replace(None);
        self.context.set_token(None);
        self.store.clear()?;
        tracing::info!("Logged out");
        Ok(())
    }

    pub fn current_user(&self) -> Option<AuthenticatedUser> {
        self.user.borrow().clone()
    }

    /// Observe login/logout transitions.
    pub fn subscribe(&self) -> watch::Receiver<Option<AuthenticatedUser>> {
        self.user.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager(dir: &std::path::Path) -> Arc<SessionManager> {
        SessionManager::new(SessionStore::new_with_path(dir.join("session.bincode")))
    }

    fn ada() -> AuthenticatedUser {
        AuthenticatedUser { user_id: "u-7".into(), name: "Ada".into(), token: "tok-7".into() }
    }

    #[test]
    fn login_installs_token_and_persists() {
        let dir = tempfile::tempdir().unwrap();
        let session = manager(dir.path());
        session.login(ada()).unwrap();

        assert_eq!(session.context().token().as_deref(), Some("tok-7"));
        assert_eq!(session.current_user(), Some(ada()));

        let reopened = manager(dir.path());
        assert_eq!(reopened.restore().unwrap(), Some(ada()));
        assert_eq!(reopened.context().token().as_deref(), Some("tok-7"));
    }

    #[test]
    fn unauthorized_logs_out() {
        let dir = tempfile::tempdir().unwrap();
        let session = manager(dir.path());
        session.login(ada()).unwrap();
        let mut changes = session.subscribe();
        changes.mark_unchanged();

        assert!(session.context().report_unauthorized("tok-7"));
        assert_eq!(session.current_user(), None);
        assert_eq!(session.context().token(), None);
        assert!(changes.has_changed().unwrap());
        assert_eq!(manager(dir.path()).restore().unwrap(), None);
    }

    #[test]
    fn late_401_from_previous_login_keeps_new_session() {
        let dir = tempfile::tempdir().unwrap();
        let session = manager(dir.path());
        session.login(ada()).unwrap();
        session.logout().unwrap();
        let grace = AuthenticatedUser { user_id: "u-8".into(), name: "Grace".into(), token: "tok-8".into() };
        session.login(grace.clone()).unwrap();

        assert!(!session.context().report_unauthorized("tok-7"));
        assert_eq!(session.current_user(), Some(grace));
        assert_eq!(session.context().token().as_deref(), Some("tok-8"));
    }

    #[test]
    fn restore_skips_tokenless_user() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new_with_path(dir.path().join("session.bincode"));
        store
            .save(&AuthenticatedUser { user_id: "u".into(), name: "N".into(), token: String::new() })
            .unwrap();
        let session = SessionManager::new(store);
        assert_eq!(session.restore().unwrap(), None);
        assert_eq!(session.context().token(), None);
    }
}
