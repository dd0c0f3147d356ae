//! Shared session capabilities handed to the HTTP client.
//!
//! The context holds the bearer token and the unauthorized callback. It is
//! owned by the root [`SessionManager`](crate::storage::SessionManager) and
//! injected by reference into everything that talks to the backend.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};

type UnauthorizedCallback = Arc<dyn Fn() + Send + Sync>;

#[derive(Default)]
pub struct SessionContext {
    token: RwLock<Option<String>>,
    on_unauthorized: Mutex<Option<UnauthorizedCallback>>,
    // Set once the callback has fired for the current token.
    unauthorized_fired: AtomicBool,
}

impl SessionContext {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn token(&self) -> Option<String> {
        self.token.read().ok().and_then(|t| t.clone())
    }

    /// Install or clear the bearer token. A new token re-arms the
    /// unauthorized callback.
    pub fn set_token(&self, token: Option<String>) {
        let armed = token.is_some();
        if let Ok(mut slot) = self.token.write() {
            *slot = token;
        }
        if armed {
            self.unauthorized_fired.store(false, Ordering::SeqCst);
        }
    }

    pub fn on_unauthorized<F>(&self, callback: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        if let Ok(mut slot) = self.on_unauthorized.lock() {
            *slot = Some(Arc::new(callback));
        }
    }

    /// Called for every 401 with the token the rejected request carried.
    /// Reports for a token that is no longer installed are ignored. Only
    /// the first report per token reaches the callback; returns whether
    /// this call fired it.
    pub fn report_unauthorized(&self, sent_token: &str) -> bool {
        if self.token().as_deref() != Some(sent_token) {
            tracing::debug!("Ignoring 401 for a superseded token");
            return false;
        }
        if self.unauthorized_fired.swap(true, Ordering::SeqCst) {
            return false;
        }
        let callback = self.on_unauthorized.lock().ok().and_then(|c| c.clone());
        match callback {
            Some(cb) => {
                tracing::warn!("Backend rejected session token, logging out");
                cb();
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn token_round_trip() {
        let ctx = SessionContext::new();
        assert_eq!(ctx.token(), None);
        ctx.set_token(Some("abc".into()));
        assert_eq!(ctx.token().as_deref(), Some("abc"));
        ctx.set_token(None);
        assert_eq!(ctx.token(), None);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_401s_fire_callback_once() {
        let ctx = SessionContext::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        ctx.on_unauthorized(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        ctx.set_token(Some("t".into()));

        let mut handles = Vec::new();
        for _ in 0..16 {
            let ctx = ctx.clone();
            handles.push(tokio::spawn(async move { ctx.report_unauthorized("t") }));
        }
        let mut fired = 0;
        for h in handles {
            if h.await.unwrap() {
                fired += 1;
            }
        }

        assert_eq!(fired, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn new_token_rearms_callback() {
        let ctx = SessionContext::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        ctx.on_unauthorized(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        ctx.set_token(Some("first".into()));
        ctx.report_unauthorized("first");
        ctx.report_unauthorized("first");
        ctx.set_token(Some("second".into()));
        ctx.report_unauthorized("second");

        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn late_401_for_old_token_is_ignored() {
        let ctx = SessionContext::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        ctx.on_unauthorized(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        ctx.set_token(Some("old".into()));
        ctx.set_token(None);
        assert!(!ctx.report_unauthorized("old"));
        ctx.set_token(Some("new".into()));
        assert!(!ctx.report_unauthorized("old"));
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        assert!(ctx.report_unauthorized("new"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
