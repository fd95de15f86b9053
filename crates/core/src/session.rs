//! Session context.
//!
//! A [`Session`] is the authenticated state of one staff member: bearer token, user record and
//! the last office they selected. It is an explicit value handed to every service call.
//! Persistence goes through a [`SessionStore`] with a load/save/clear lifecycle.

use crate::models::{Role, User};
use crate::{ClinicError, ClinicResult};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub token: String,
    pub user: User,
    #[serde(default)]
    pub last_office: Option<u32>,
}

impl Session {
    pub fn new(token: impl Into<String>, user: User) -> Self {
        Self {
            token: token.into(),
            user,
            last_office: None,
        }
    }

    pub fn role(&self) -> Role {
        self.user.role
    }

    pub fn is_doctor(&self) -> bool {
        self.user.role == Role::Doctor
    }

    pub fn is_admin(&self) -> bool {
        self.user.role == Role::Administrator
    }

    /// The office the user is working from: the server-assigned one, else the last one chosen here.
    pub fn office(&self) -> Option<u32> {
        self.user.current_office.or(self.last_office)
    }

    pub fn set_office(&mut self, office: u32) {
        self.user.current_office = Some(office);
        self.last_office = Some(office);
    }
}

/// Load/save/clear lifecycle for the persisted session.
pub trait SessionStore: Send + Sync {
    /// Returns `Ok(None)` when nobody is logged in.
    ///
    /// # Errors
    ///
    /// Returns a `ClinicError::Session*` variant if stored data cannot be read.
    fn load(&self) -> ClinicResult<Option<Session>>;

    /// # Errors
    ///
    /// Returns a `ClinicError::Session*` variant if the session cannot be persisted.
    fn save(&self, session: &Session) -> ClinicResult<()>;

    /// Removes token, user and last office. Clearing an empty store is not an error.
    ///
    /// # Errors
    ///
    /// Returns `ClinicError::SessionClear` if stored data exists but cannot be removed.
    fn clear(&self) -> ClinicResult<()>;

    /// Loads the session or fails with `NotAuthenticated`.
    ///
    /// # Errors
    ///
    /// Returns `ClinicError::NotAuthenticated` when no session is stored.
    fn require(&self) -> ClinicResult<Session> {
        self.load()?.ok_or(ClinicError::NotAuthenticated)
    }
}

/// Session persisted as a JSON file.
#[derive(Clone, Debug)]
pub struct FileSessionStore {
    path: PathBuf,
}

impl FileSessionStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }
}

impl SessionStore for FileSessionStore {
    fn load(&self) -> ClinicResult<Option<Session>> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(ClinicError::SessionRead(e)),
        };
        let session =
            serde_json::from_str(&contents).map_err(ClinicError::SessionDeserialization)?;
        Ok(Some(session))
    }

    fn save(&self, session: &Session) -> ClinicResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(ClinicError::SessionWrite)?;
            }
        }
        let json =
            serde_json::to_string_pretty(session).map_err(ClinicError::SessionSerialization)?;
        fs::write(&self.path, json).map_err(ClinicError::SessionWrite)?;
        tracing::debug!("session saved for user {}", session.user.id);
        Ok(())
    }

    fn clear(&self) -> ClinicResult<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(ClinicError::SessionClear(e)),
        }
    }
}

/// In-process session store for tests and embedding.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    inner: Mutex<Option<Session>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_session(session: Session) -> Self {
        Self {
            inner: Mutex::new(Some(session)),
        }
    }

    fn slot(&self) -> std::sync::MutexGuard<'_, Option<Session>> {
        // Poisoning leaves a whole value behind.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl SessionStore for MemorySessionStore {
    fn load(&self) -> ClinicResult<Option<Session>> {
        Ok(self.slot().clone())
    }

    fn save(&self, session: &Session) -> ClinicResult<()> {
        *self.slot() = Some(session.clone());
        Ok(())
    }

    fn clear(&self) -> ClinicResult<()> {
        *self.slot() = None;
        Ok(())
    }
}
