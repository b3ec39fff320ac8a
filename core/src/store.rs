use crate::auth::StoredSession;
use anyhow::{Context, Result};
use parking_lot::RwLock;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use uuid::Uuid;

/// Storage backend for the session token and user record.
pub trait SessionStore: Send + Sync {
    fn load(&self) -> Result<Option<StoredSession>>;
    fn save(&self, session: &StoredSession) -> Result<()>;
    fn clear(&self) -> Result<()>;
}

/// Persistent storage: `session.json` inside a state directory.
#[derive(Clone)]
pub struct FileSessionStore {
    root: PathBuf,
}

impl FileSessionStore {
    pub fn new(root: PathBuf) -> Self {
        fs::create_dir_all(&root).ok();
        Self { root }
    }

    pub fn temporary() -> Self {
        let mut path = std::env::temp_dir();
        path.push(format!("querydesk-{}", Uuid::new_v4()));
        Self::new(path)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn session_path(&self) -> PathBuf {
        self.root.join("session.json")
    }
}

impl SessionStore for FileSessionStore {
    fn load(&self) -> Result<Option<StoredSession>> {
        let path = self.session_path();
        let contents = match fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => {
                return Err(err).with_context(|| format!("failed to read {}", path.display()))
            }
        };
        if contents.trim().is_empty() {
            return Ok(None);
        }
        let session = serde_json::from_str(&contents)
            .with_context(|| format!("failed to decode {}", path.display()))?;
        Ok(Some(session))
    }

    fn save(&self, session: &StoredSession) -> Result<()> {
        let path = self.session_path();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).ok();
        }
        let serialized = serde_json::to_vec_pretty(session)?;
        fs::write(&path, serialized)
            .with_context(|| format!("failed to write {}", path.display()))
    }

    fn clear(&self) -> Result<()> {
        match fs::remove_file(self.session_path()) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err).context("failed to remove session.json"),
        }
    }
}

/// In-process storage. Used as the session mirror and in tests.
#[derive(Clone, Default)]
pub struct MemorySessionStore {
    slot: Arc<RwLock<Option<StoredSession>>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_session(session: StoredSession) -> Self {
        Self {
            slot: Arc::new(RwLock::new(Some(session))),
        }
    }
}

impl SessionStore for MemorySessionStore {
    fn load(&self) -> Result<Option<StoredSession>> {
        Ok(self.slot.read().clone())
    }

    fn save(&self, session: &StoredSession) -> Result<()> {
        *self.slot.write() = Some(session.clone());
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        self.slot.write().take();
        Ok(())
    }
}
