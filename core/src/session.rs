use crate::auth::{AuthCookie, StoredSession, UserRecord};
use crate::store::{MemorySessionStore, SessionStore};
use anyhow::Result;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tracing::{info, warn};

/// Where the shell should send the user once the session has expired.
pub const SESSION_EXPIRED_REDIRECT: &str = "/login?reason=session_expired";

/// Session lifecycle notifications for the application shell.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    SignedIn { user: Option<UserRecord> },
    SignedOut,
    Expired { redirect: String },
}

/// Owns the session token, its mirrors, and the one-shot expiry guard.
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    persistent: Arc<dyn SessionStore>,
    mirror: MemorySessionStore,
    cookie: RwLock<Option<AuthCookie>>,
    logging_out: AtomicBool,
    events_tx: UnboundedSender<SessionEvent>,
}

impl SessionManager {
    pub fn new(persistent: Arc<dyn SessionStore>) -> (Self, UnboundedReceiver<SessionEvent>) {
        let (events_tx, events_rx) = unbounded_channel();
        let mirror = MemorySessionStore::new();
        let mut cookie = None;
        match persistent.load() {
            Ok(Some(session)) => {
                mirror.save(&session).ok();
                cookie = Some(session.cookie());
            }
            Ok(None) => {}
            Err(err) => warn!(%err, "failed to restore persisted session"),
        }
        (
            Self {
                inner: Arc::new(SessionInner {
                    persistent,
                    mirror,
                    cookie: RwLock::new(cookie),
                    logging_out: AtomicBool::new(false),
                    events_tx,
                }),
            },
            events_rx,
        )
    }

    /// Session backed only by memory, for tests and throwaway shells.
    pub fn in_memory() -> (Self, UnboundedReceiver<SessionEvent>) {
        Self::new(Arc::new(MemorySessionStore::new()))
    }

    /// Current token, read from persistent storage on every call.
    pub fn token(&self) -> Option<String> {
        match self.inner.persistent.load() {
            Ok(session) => session.map(|session| session.auth_token),
            Err(err) => {
                warn!(%err, "failed to read session token");
                None
            }
        }
    }

    pub fn user(&self) -> Option<UserRecord> {
        self.inner
            .persistent
            .load()
            .ok()
            .flatten()
            .and_then(|session| session.user)
    }

    /// Token held by the in-memory mirror of the persisted session.
    pub fn mirror_token(&self) -> Option<String> {
        self.inner
            .mirror
            .load()
            .ok()
            .flatten()
            .map(|session| session.auth_token)
    }

    pub fn cookie(&self) -> Option<AuthCookie> {
        self.inner.cookie.read().clone()
    }

    /// `Cookie` request header value the route gate would see.
    pub fn cookie_header(&self) -> Option<String> {
        self.cookie()
            .filter(|cookie| !cookie.is_expired())
            .map(|cookie| format!("{}={}", crate::auth::AUTH_COOKIE_NAME, cookie.value))
    }

    pub fn is_logging_out(&self) -> bool {
        self.inner.logging_out.load(Ordering::SeqCst)
    }

    /// Store a freshly issued token. Re-arms the expiry guard.
    pub fn establish(&self, token: impl Into<String>, user: Option<UserRecord>) -> Result<()> {
        let cookie = AuthCookie::new(token);
        let session = StoredSession {
            auth_token: cookie.value.clone(),
            user,
            cookie_expires_at: Some(cookie.expires_at),
        };
        self.inner.persistent.save(&session)?;
        self.inner.mirror.save(&session)?;
        *self.inner.cookie.write() = Some(cookie);
        self.inner.logging_out.store(false, Ordering::SeqCst);
        info!(
            user = session.user.as_ref().map(|u| u.email.as_str()).unwrap_or("unknown"),
            "session established"
        );
        self.inner
            .events_tx
            .send(SessionEvent::SignedIn { user: session.user })
            .ok();
        Ok(())
    }

    /// Voluntary logout.
    pub fn sign_out(&self) -> Result<()> {
        self.inner.persistent.clear()?;
        self.inner.mirror.clear()?;
        self.inner.cookie.write().take();
        info!("signed out");
        self.inner.events_tx.send(SessionEvent::SignedOut).ok();
        Ok(())
    }

    /// Clear every copy of the session and publish [`SessionEvent::Expired`].
    ///
    /// Only the first caller does anything; it returns `true`. Concurrent and
    /// later callers return `false` until a new session is established.
    pub fn expire(&self) -> bool {
        if self
            .inner
            .logging_out
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return false;
        }
        if let Err(err) = self.inner.persistent.clear() {
            warn!(%err, "failed to clear persisted session");
        }
        if let Err(err) = self.inner.mirror.clear() {
            warn!(%err, "failed to clear session mirror");
        }
        self.inner.cookie.write().take();
        warn!("session expired, clearing credentials");
        self.inner
            .events_tx
            .send(SessionEvent::Expired {
                redirect: SESSION_EXPIRED_REDIRECT.to_string(),
            })
            .ok();
        true
    }
}
