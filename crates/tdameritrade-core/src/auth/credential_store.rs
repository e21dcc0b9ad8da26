use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use serde::{Deserialize, Serialize};

use crate::config::ConfigLocator;

use super::{AuthRequest, AuthResponse, Credential, StorageError};

/// Persistence contract for the login flow.
///
/// `get_state` must hand back exactly what `store_state` recorded for the same caller session,
/// and an empty string when nothing was recorded. Implementations own the notion of a session:
/// a cookie jar, a header, a profile on disk.
pub trait CredentialStore {
    fn store_state(
        &self,
        state: &str,
        response: &mut AuthResponse,
        request: &AuthRequest,
    ) -> Result<(), StorageError>;

    fn get_state(&self, request: &AuthRequest) -> Result<String, StorageError>;

    fn store_token(
        &self,
        credential: &Credential,
        response: &mut AuthResponse,
        request: &AuthRequest,
    ) -> Result<(), StorageError>;

    fn get_token(&self, request: &AuthRequest) -> Result<Option<Credential>, StorageError>;
}

/// Filesystem-backed storage for a single profile in the user configuration directory.
///
/// Reading the state deletes it, so a pending login can be completed at most once.
pub struct FileCredentialStore {
    locator: ConfigLocator,
    profile: String,
}

impl FileCredentialStore {
    pub fn new(locator: ConfigLocator, profile: impl Into<String>) -> Self {
        Self {
            locator,
            profile: profile.into(),
        }
    }

    pub fn with_default_locator(profile: impl Into<String>) -> Result<Self, StorageError> {
        Ok(Self::new(ConfigLocator::new()?, profile))
    }

    pub fn profile(&self) -> &str {
        &self.profile
    }

    /// Forget stored credentials and any pending state for this profile.
    pub fn delete(&self) -> Result<(), StorageError> {
        remove_if_exists(&self.locator.credentials_file(&self.profile))?;
        remove_if_exists(&self.locator.state_file(&self.profile))
    }

    fn write_file(path: &Path, payload: &str) -> Result<(), StorageError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)?;
        file.write_all(payload.as_bytes())?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mut perm = file.metadata()?.permissions();
            perm.set_mode(0o600);
            fs::set_permissions(path, perm)?;
        }

        Ok(())
    }
}

fn remove_if_exists(path: &Path) -> Result<(), StorageError> {
    match fs::remove_file(path) {
        Ok(_) => Ok(()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err.into()),
    }
}

impl CredentialStore for FileCredentialStore {
    fn store_state(
        &self,
        state: &str,
        _response: &mut AuthResponse,
        _request: &AuthRequest,
    ) -> Result<(), StorageError> {
        Self::write_file(&self.locator.state_file(&self.profile), state)
    }

    fn get_state(&self, _request: &AuthRequest) -> Result<String, StorageError> {
        let path = self.locator.state_file(&self.profile);
        let state = match fs::read_to_string(&path) {
            Ok(state) => state,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(String::new()),
            Err(err) => return Err(err.into()),
        };
        remove_if_exists(&path)?;
        Ok(state)
    }

    fn store_token(
        &self,
        credential: &Credential,
        _response: &mut AuthResponse,
        _request: &AuthRequest,
    ) -> Result<(), StorageError> {
        let envelope = CredentialEnvelope {
            version: 1,
            profile: self.profile.clone(),
            credential: credential.clone(),
        };
        let payload = serde_json::to_string_pretty(&envelope)?;
        Self::write_file(&self.locator.credentials_file(&self.profile), &payload)
    }

    fn get_token(&self, _request: &AuthRequest) -> Result<Option<Credential>, StorageError> {
        let path = self.locator.credentials_file(&self.profile);
        if !path.exists() {
            return Ok(None);
        }
        let raw = fs::read_to_string(path)?;
        let envelope: CredentialEnvelope = serde_json::from_str(&raw)?;
        Ok(Some(envelope.credential))
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct CredentialEnvelope {
    version: u32,
    profile: String,
    credential: Credential,
}

/// Cookie naming the session a [`MemoryCredentialStore`] entry belongs to.
pub const SESSION_COOKIE: &str = "tda_session";

/// In-process storage keyed by the `tda_session` cookie of each request.
///
/// Cloning yields another handle to the same map. Reading the state removes it.
#[derive(Debug, Clone, Default)]
pub struct MemoryCredentialStore {
    sessions: Arc<Mutex<HashMap<String, SessionSlot>>>,
}

#[derive(Debug, Default)]
struct SessionSlot {
    state: Option<String>,
    credential: Option<Credential>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn sessions(&self) -> Result<MutexGuard<'_, HashMap<String, SessionSlot>>, StorageError> {
        self.sessions
            .lock()
            .map_err(|_| StorageError::backend("credential map lock poisoned"))
    }

    /// Write access; creates the slot for this session if needed.
    fn with_slot<T>(
        &self,
        request: &AuthRequest,
        f: impl FnOnce(&mut SessionSlot) -> T,
    ) -> Result<T, StorageError> {
        let key = session_key(request);
        Ok(f(self.sessions()?.entry(key).or_default()))
    }
}

fn session_key(request: &AuthRequest) -> String {
    request.cookie(SESSION_COOKIE).unwrap_or_default()
}

impl SessionSlot {
    fn is_empty(&self) -> bool {
        self.state.is_none() && self.credential.is_none()
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn store_state(
        &self,
        state: &str,
        _response: &mut AuthResponse,
        request: &AuthRequest,
    ) -> Result<(), StorageError> {
        self.with_slot(request, |slot| slot.state = Some(state.to_owned()))
    }

    fn get_state(&self, request: &AuthRequest) -> Result<String, StorageError> {
        let key = session_key(request);
        let mut sessions = self.sessions()?;
        let Some(slot) = sessions.get_mut(&key) else {
            return Ok(String::new());
        };
        let state = slot.state.take().unwrap_or_default();
        if slot.is_empty() {
            sessions.remove(&key);
        }
        Ok(state)
    }

    fn store_token(
        &self,
        credential: &Credential,
        _response: &mut AuthResponse,
        request: &AuthRequest,
    ) -> Result<(), StorageError> {
        self.with_slot(request, |slot| slot.credential = Some(credential.clone()))
    }

    fn get_token(&self, request: &AuthRequest) -> Result<Option<Credential>, StorageError> {
        Ok(self
            .sessions()?
            .get(&session_key(request))
            .and_then(|slot| slot.credential.clone()))
    }
}
