mod browser;
mod context;
mod cookie_store;
mod credential;
mod credential_store;
mod error;
mod flow;
mod manual;
mod oauth;
mod orchestrator;
mod state;

pub use browser::{run_loopback_flow, run_with_listener};
pub use context::{AuthRequest, AuthResponse};
pub use cookie_store::{
    CookieCredentialStore, ACCESS_TOKEN_COOKIE, REFRESH_TOKEN_COOKIE, STATE_COOKIE,
    TOKEN_EXPIRY_COOKIE,
};
pub use credential::Credential;
pub use credential_store::{
    CredentialStore, FileCredentialStore, MemoryCredentialStore, SESSION_COOKIE,
};
pub use error::{AuthError, ExchangeError, StorageError};
pub use flow::{is_loopback_redirect, FlowPreference, InvalidFlow, LoginFlow};
pub use manual::{parse_manual_input, run_manual_flow};
pub use oauth::{
    authorization_url, OAuthClient, OAuthConfig, OAuthEndpoints, TokenExchanger, TokenRequest,
    CLIENT_ID_SUFFIX, DEFAULT_AUTHORIZATION_URL, DEFAULT_TOKEN_URL,
};
pub use orchestrator::Authenticator;
pub use state::generate_state;
