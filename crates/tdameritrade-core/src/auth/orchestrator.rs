use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use url::Url;

use super::oauth::{authorization_url, TokenRequest};
use super::state::generate_state;
use super::{
    AuthError, AuthRequest, AuthResponse, Credential, CredentialStore, OAuthClient, OAuthConfig,
    OAuthEndpoints, TokenExchanger,
};
use crate::api::TdAmeritradeClient;

/// Drives the two halves of the authorization-code login and builds authenticated clients.
///
/// Holds only immutable configuration; every in-flight login lives in the credential store,
/// keyed by whatever session identity the store derives from the request. One instance can
/// serve any number of concurrent logins.
pub struct Authenticator<S, E = OAuthClient> {
    store: S,
    exchanger: E,
    config: OAuthConfig,
    endpoints: OAuthEndpoints,
    api_base_url: Option<Url>,
}

impl<S> Authenticator<S, OAuthClient>
where
    S: CredentialStore,
{
    /// Authenticator for the public TD Ameritrade endpoints.
    ///
    /// Appends `@AMER.OAUTHAP` to the client id unless it is already present.
    pub fn new(store: S, config: OAuthConfig) -> Result<Self, AuthError> {
        Self::with_endpoints(store, config, OAuthEndpoints::default())
    }

    /// Same as [`Authenticator::new`] against custom endpoints.
    pub fn with_endpoints(
        store: S,
        config: OAuthConfig,
        endpoints: OAuthEndpoints,
    ) -> Result<Self, AuthError> {
        Ok(Self::with_exchanger(
            store,
            config.with_account_suffix(),
            endpoints,
            OAuthClient::new()?,
        ))
    }
}

impl<S, E> Authenticator<S, E>
where
    S: CredentialStore,
    E: TokenExchanger,
{
    /// Assemble an authenticator from parts. The client id is used verbatim.
    pub fn with_exchanger(
        store: S,
        config: OAuthConfig,
        endpoints: OAuthEndpoints,
        exchanger: E,
    ) -> Self {
        Self {
            store,
            exchanger,
            config,
            endpoints,
            api_base_url: None,
        }
    }

    /// Point authenticated clients at a different API root (must end with `/`).
    pub fn with_api_base_url(mut self, base_url: Url) -> Self {
        self.api_base_url = Some(base_url);
        self
    }

    pub fn config(&self) -> &OAuthConfig {
        &self.config
    }

    pub fn endpoints(&self) -> &OAuthEndpoints {
        &self.endpoints
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Begin a login: record a fresh state for this session and return the provider URL
    /// the user must be redirected to.
    pub fn start(
        &self,
        response: &mut AuthResponse,
        request: &AuthRequest,
    ) -> Result<Url, AuthError> {
        let state = generate_state()?;
        self.store.store_state(&state, response, request)?;
        debug!(client_id = %self.config.client_id, "authorization flow started");
        Ok(authorization_url(&self.config, &self.endpoints, &state))
    }

    /// Complete a login from the provider's callback request.
    ///
    /// The callback must carry a non-empty `code` and a `state` equal to the one recorded by
    /// [`Authenticator::start`] for the same session. Tokens are stored only after both checks
    /// and the exchange succeed. Cancelling `cancel` aborts the exchange.
    pub async fn finish(
        &self,
        cancel: &CancellationToken,
        response: &mut AuthResponse,
        request: &AuthRequest,
    ) -> Result<TdAmeritradeClient, AuthError> {
        let code = non_empty(request.query_param("code")).ok_or(AuthError::MissingCode)?;
        let state = non_empty(request.query_param("state")).ok_or(AuthError::MissingState)?;

        let expected = self.store.get_state(request)?;
        if expected.is_empty() {
            warn!("callback arrived without a pending login state");
            return Err(AuthError::MissingState);
        }
        if state != expected {
            warn!(expected = %expected, got = %state, "callback state mismatch");
            return Err(AuthError::InvalidState {
                expected,
                got: state,
            });
        }

        let token_request = TokenRequest {
            code: &code,
            client_id: &self.config.client_id,
            client_secret: self.config.client_secret.as_deref(),
            redirect_uri: &self.config.redirect_uri,
            token_url: &self.endpoints.token_url,
        };
        let credential = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!("token exchange cancelled");
                return Err(AuthError::Cancelled);
            }
            result = self.exchanger.exchange_code(token_request) => result?,
        };

        self.store.store_token(&credential, response, request)?;
        debug!("authorization flow completed");
        self.client_for(&credential)
    }

    /// Build a client from the token previously stored for this request's session.
    pub fn authenticated_client(
        &self,
        request: &AuthRequest,
    ) -> Result<TdAmeritradeClient, AuthError> {
        let credential = self
            .store
            .get_token(request)?
            .ok_or(AuthError::NotAuthenticated)?;
        self.client_for(&credential)
    }

    /// Build a client that sends `credential` as a bearer token on every request.
    pub fn client_for(&self, credential: &Credential) -> Result<TdAmeritradeClient, AuthError> {
        if credential.is_expired() {
            warn!("access token has expired; API calls will be rejected until the next login");
        }
        let client = match &self.api_base_url {
            Some(base_url) => TdAmeritradeClient::with_base_url(credential, base_url.as_str())?,
            None => TdAmeritradeClient::from_credential(credential)?,
        };
        Ok(client)
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|value| !value.is_empty())
}
