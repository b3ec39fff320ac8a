use anyhow::{Context, Result};
use querydesk_core::{
    ApiClient, FileSessionStore, GatewayApi, GatewaySettings, RouteGate, SessionEvent,
    SessionManager,
};
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;
use tracing::info;

/// Everything a command needs: the gateway, the session and the route gate.
#[derive(Clone)]
pub struct Shell {
    pub gateway: GatewayApi,
    pub gate: RouteGate,
}

impl Shell {
    /// Build a shell whose session persists under `settings.state_dir`.
    pub fn connect(settings: &GatewaySettings) -> Result<(Self, UnboundedReceiver<SessionEvent>)> {
        let store = FileSessionStore::new(settings.state_dir.clone());
        let (session, events) = SessionManager::new(Arc::new(store));
        let shell = Self::with_session(settings, session)?;
        Ok((shell, events))
    }

    pub fn with_session(settings: &GatewaySettings, session: SessionManager) -> Result<Self> {
        let client = ApiClient::new(settings, session)
            .context("failed to build the HTTP client")?;
        Ok(Self {
            gateway: GatewayApi::new(client),
            gate: RouteGate::new(),
        })
    }

    pub fn session(&self) -> &SessionManager {
        self.gateway.session()
    }
}

/// Text shown to the user for a session event.
pub fn notice_for(event: &SessionEvent) -> String {
    match event {
        SessionEvent::SignedIn { user } => match user {
            Some(user) => format!("Signed in as {}.", user.email),
            None => "Signed in.".to_string(),
        },
        SessionEvent::SignedOut => "Signed out.".to_string(),
        SessionEvent::Expired { redirect } => format!(
            "Your session has expired. Run `querydesk login` to sign in again (redirect: {redirect})."
        ),
    }
}

/// React to session events until every [`SessionManager`] handle is dropped.
///
/// Returns the notices that were shown, in order.
pub fn spawn_session_watcher(mut events: UnboundedReceiver<SessionEvent>) -> JoinHandle<Vec<String>> {
    tokio::spawn(async move {
        let mut shown = Vec::new();
        while let Some(event) = events.recv().await {
            if let SessionEvent::Expired { redirect } = &event {
                info!(%redirect, "session expired, navigating to login");
            }
            let notice = notice_for(&event);
            eprintln!("{notice}");
            shown.push(notice);
        }
        shown
    })
}
