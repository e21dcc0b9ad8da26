use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};

use super::{AuthRequest, AuthResponse, Credential, CredentialStore, StorageError};

pub const STATE_COOKIE: &str = "tda_state";
pub const ACCESS_TOKEN_COOKIE: &str = "tda_access_token";
pub const REFRESH_TOKEN_COOKIE: &str = "tda_refresh_token";
pub const TOKEN_EXPIRY_COOKIE: &str = "tda_token_expiry";

/// Keeps the login state and token pair in browser cookies.
///
/// Values are base64url-encoded so opaque provider tokens survive cookie syntax. Cookies are
/// not signed or encrypted; put this behind a signing layer before exposing it publicly.
#[derive(Debug, Clone)]
pub struct CookieCredentialStore {
    path: String,
    secure: bool,
}

impl Default for CookieCredentialStore {
    fn default() -> Self {
        Self {
            path: "/".into(),
            secure: true,
        }
    }
}

impl CookieCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    /// Drop the `Secure` attribute, for plain-http development servers.
    pub fn insecure(mut self) -> Self {
        self.secure = false;
        self
    }

    fn set(
        &self,
        response: &mut AuthResponse,
        name: &str,
        value: &str,
        max_age: Option<i64>,
    ) -> Result<(), StorageError> {
        let mut cookie = format!(
            "{name}={}; Path={}; HttpOnly; SameSite=Lax",
            URL_SAFE_NO_PAD.encode(value),
            self.path
        );
        if let Some(seconds) = max_age {
            cookie.push_str(&format!("; Max-Age={seconds}"));
        }
        if self.secure {
            cookie.push_str("; Secure");
        }
        response
            .set_cookie(&cookie)
            .map_err(|err| StorageError::InvalidCookie {
                name: name.to_owned(),
                reason: err.to_string(),
            })
    }

    fn get(&self, request: &AuthRequest, name: &str) -> Result<Option<String>, StorageError> {
        let Some(raw) = request.cookie(name) else {
            return Ok(None);
        };
        let invalid = |reason: String| StorageError::InvalidCookie {
            name: name.to_owned(),
            reason,
        };
        let bytes = URL_SAFE_NO_PAD
            .decode(raw.as_bytes())
            .map_err(|err| invalid(err.to_string()))?;
        let value = String::from_utf8(bytes).map_err(|err| invalid(err.to_string()))?;
        Ok(Some(value))
    }
}

impl CredentialStore for CookieCredentialStore {
    fn store_state(
        &self,
        state: &str,
        response: &mut AuthResponse,
        _request: &AuthRequest,
    ) -> Result<(), StorageError> {
        self.set(response, STATE_COOKIE, state, None)
    }

    fn get_state(&self, request: &AuthRequest) -> Result<String, StorageError> {
        Ok(self.get(request, STATE_COOKIE)?.unwrap_or_default())
    }

    fn store_token(
        &self,
        credential: &Credential,
        response: &mut AuthResponse,
        _request: &AuthRequest,
    ) -> Result<(), StorageError> {
        let access_max_age = credential
            .expires_at
            .map(|ts| (ts - Utc::now()).num_seconds().max(0));
        let refresh_max_age = credential
            .refresh_expires_at
            .map(|ts| (ts - Utc::now()).num_seconds().max(0));

        self.set(
            response,
            ACCESS_TOKEN_COOKIE,
            &credential.access_token,
            access_max_age,
        )?;
        if let Some(refresh) = &credential.refresh_token {
            self.set(response, REFRESH_TOKEN_COOKIE, refresh, refresh_max_age)?;
        }
        if let Some(expiry) = credential.expires_at {
            self.set(
                response,
                TOKEN_EXPIRY_COOKIE,
                &expiry.timestamp().to_string(),
                access_max_age,
            )?;
        }
        // The login is complete; the state must not be replayable.
        self.set(response, STATE_COOKIE, "", Some(0))
    }

    fn get_token(&self, request: &AuthRequest) -> Result<Option<Credential>, StorageError> {
        let Some(access_token) = self.get(request, ACCESS_TOKEN_COOKIE)? else {
            return Ok(None);
        };
        let refresh_token = self.get(request, REFRESH_TOKEN_COOKIE)?;
        let expires_at = match self.get(request, TOKEN_EXPIRY_COOKIE)? {
            Some(raw) => {
                let seconds = raw.parse::<i64>().map_err(|err| StorageError::InvalidCookie {
                    name: TOKEN_EXPIRY_COOKIE.to_owned(),
                    reason: err.to_string(),
                })?;
                DateTime::<Utc>::from_timestamp(seconds, 0)
            }
            None => None,
        };
        Ok(Some(Credential::new(access_token, refresh_token, expires_at)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use reqwest::header::SET_COOKIE;

    /// Replays `Set-Cookie` headers as the `Cookie` header of the next request.
    fn follow_up(response: &AuthResponse) -> AuthRequest {
        response
            .headers()
            .get_all(SET_COOKIE)
            .iter()
            .map(|value| value.to_str().unwrap())
            .map(|cookie| cookie.split(';').next().unwrap().split_once('=').unwrap())
            .fold(
                AuthRequest::from_target("/callback").unwrap(),
                |request, (name, value)| request.with_cookie(name, value).unwrap(),
            )
    }

    #[test]
    fn state_round_trips_through_cookies() {
        let store = CookieCredentialStore::new();
        let mut response = AuthResponse::new();
        store
            .store_state(
                "state-value",
                &mut response,
                &AuthRequest::from_target("/").unwrap(),
            )
            .unwrap();

        let header = response.headers().get(SET_COOKIE).unwrap().to_str().unwrap();
        assert!(header.starts_with("tda_state="));
        assert!(header.contains("HttpOnly"));
        assert!(header.ends_with("; Secure"));

        assert_eq!(store.get_state(&follow_up(&response)).unwrap(), "state-value");
    }

    #[test]
    fn missing_state_cookie_reads_as_empty() {
        let store = CookieCredentialStore::new();
        let request = AuthRequest::from_target("/callback").unwrap();
        assert_eq!(store.get_state(&request).unwrap(), "");
    }

    #[test]
    fn token_round_trips_through_cookies() {
        let store = CookieCredentialStore::new().insecure();
        let expires_at = DateTime::<Utc>::from_timestamp(Utc::now().timestamp() + 1800, 0);
        let credential = Credential::new("acc+ess/=".into(), Some("refresh".into()), expires_at);
        let mut response = AuthResponse::new();
        store
            .store_token(
                &credential,
                &mut response,
                &AuthRequest::from_target("/").unwrap(),
            )
            .unwrap();

        assert!(response
            .headers()
            .get_all(SET_COOKIE)
            .iter()
            .all(|value| !value.to_str().unwrap().contains("Secure")));

        assert!(response
            .headers()
            .get_all(SET_COOKIE)
            .iter()
            .any(|value| value.to_str().unwrap().starts_with("tda_state=; ")
                && value.to_str().unwrap().contains("Max-Age=0")));

        let loaded = store.get_token(&follow_up(&response)).unwrap().unwrap();
        assert_eq!(loaded.access_token, "acc+ess/=");
        assert_eq!(loaded.refresh_token.as_deref(), Some("refresh"));
        assert_eq!(loaded.expires_at, expires_at);
        assert!(!loaded.will_expire_within(Duration::minutes(10)));
    }

    #[test]
    fn corrupt_cookie_is_a_storage_error() {
        let store = CookieCredentialStore::new();
        let request = AuthRequest::from_target("/callback")
            .unwrap()
            .with_cookie(STATE_COOKIE, "!!!")
            .unwrap();
        assert!(matches!(
            store.get_state(&request),
            Err(StorageError::InvalidCookie { .. })
        ));
    }
}
