use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use reqwest::Client;
use serde::Deserialize;
use url::Url;

use super::{AuthError, Credential, ExchangeError};

/// Suffix TD Ameritrade requires on consumer keys used for OAuth.
pub const CLIENT_ID_SUFFIX: &str = "@AMER.OAUTHAP";
pub const DEFAULT_AUTHORIZATION_URL: &str = "https://auth.tdameritrade.com/auth";
pub const DEFAULT_TOKEN_URL: &str = "https://api.tdameritrade.com/v1/oauth2/token";

const DEFAULT_USER_AGENT: &str = "tdameritrade-rs/0.1.0";
const DEFAULT_EXCHANGE_TIMEOUT: StdDuration = StdDuration::from_secs(30);

/// OAuth client configuration supplied by consumers.
#[derive(Debug, Clone)]
pub struct OAuthConfig {
    pub client_id: String,
    pub client_secret: Option<String>,
    pub redirect_uri: Url,
}

impl OAuthConfig {
    pub fn new<S: Into<String>>(client_id: S, redirect_uri: Url) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: None,
            redirect_uri,
        }
    }

    pub fn with_secret<S: Into<String>>(mut self, secret: S) -> Self {
        self.client_secret = Some(secret.into());
        self
    }

    /// Append [`CLIENT_ID_SUFFIX`] unless the client id already carries it.
    pub fn with_account_suffix(mut self) -> Self {
        if !self.client_id.ends_with(CLIENT_ID_SUFFIX) {
            self.client_id.push_str(CLIENT_ID_SUFFIX);
        }
        self
    }
}

/// Provider endpoints used by the login flow.
#[derive(Debug, Clone)]
pub struct OAuthEndpoints {
    pub authorization_url: Url,
    pub token_url: Url,
}

impl OAuthEndpoints {
    pub fn new(authorization_url: Url, token_url: Url) -> Self {
        Self {
            authorization_url,
            token_url,
        }
    }
}

impl Default for OAuthEndpoints {
    fn default() -> Self {
        Self {
            authorization_url: Url::parse(DEFAULT_AUTHORIZATION_URL)
                .expect("default authorization URL is valid"),
            token_url: Url::parse(DEFAULT_TOKEN_URL).expect("default token URL is valid"),
        }
    }
}

/// Build the provider URL the user is redirected to. Pure; performs no I/O.
pub fn authorization_url(config: &OAuthConfig, endpoints: &OAuthEndpoints, state: &str) -> Url {
    let mut url = endpoints.authorization_url.clone();
    url.query_pairs_mut()
        .append_pair("client_id", &config.client_id)
        .append_pair("redirect_uri", config.redirect_uri.as_str())
        .append_pair("response_type", "code")
        .append_pair("state", state);
    url
}

/// Everything the token endpoint needs to redeem an authorization code.
#[derive(Debug, Clone, Copy)]
pub struct TokenRequest<'a> {
    pub code: &'a str,
    pub client_id: &'a str,
    pub client_secret: Option<&'a str>,
    pub redirect_uri: &'a Url,
    pub token_url: &'a Url,
}

/// Redeems an authorization code for a token pair.
#[async_trait]
pub trait TokenExchanger: Send + Sync {
    async fn exchange_code(&self, request: TokenRequest<'_>) -> Result<Credential, ExchangeError>;
}

/// Standard authorization-code grant over HTTPS.
#[derive(Debug, Clone)]
pub struct OAuthClient {
    http: Client,
    timeout: StdDuration,
}

impl OAuthClient {
    pub fn new() -> Result<Self, AuthError> {
        let http = Client::builder().user_agent(DEFAULT_USER_AGENT).build()?;
        Ok(Self::with_http(http))
    }

    pub fn with_http(http: Client) -> Self {
        Self {
            http,
            timeout: DEFAULT_EXCHANGE_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: StdDuration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn handle_token_response(
        &self,
        response: reqwest::Response,
    ) -> Result<Credential, ExchangeError> {
        let status = response.status();
        let received_at = Utc::now();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ExchangeError::TokenEndpoint { status, body });
        }

        let payload: TokenResponse = response.json().await?;
        payload.into_credential(received_at)
    }
}

#[async_trait]
impl TokenExchanger for OAuthClient {
    async fn exchange_code(&self, request: TokenRequest<'_>) -> Result<Credential, ExchangeError> {
        let mut form = vec![
            ("grant_type", "authorization_code"),
            ("code", request.code),
            ("redirect_uri", request.redirect_uri.as_str()),
            ("client_id", request.client_id),
        ];

        if let Some(secret) = request.client_secret {
            form.push(("client_secret", secret));
        }

        let response = self
            .http
            .post(request.token_url.clone())
            .form(&form)
            .timeout(self.timeout)
            .send()
            .await?;

        self.handle_token_response(response).await
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: Option<String>,
    token_type: Option<String>,
    expires_in: Option<i64>,
    refresh_token_expires_in: Option<i64>,
    scope: Option<String>,
}

impl TokenResponse {
    fn into_credential(self, received_at: DateTime<Utc>) -> Result<Credential, ExchangeError> {
        if let Some(kind) = &self.token_type {
            if !kind.eq_ignore_ascii_case("bearer") {
                return Err(ExchangeError::InvalidTokenType(kind.clone()));
            }
        }

        let scope = self
            .scope
            .unwrap_or_default()
            .split_whitespace()
            .map(ToOwned::to_owned)
            .collect();

        Ok(Credential {
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            expires_at: self
                .expires_in
                .map(|seconds| received_at + Duration::seconds(seconds)),
            refresh_expires_at: self
                .refresh_token_expires_in
                .map(|seconds| received_at + Duration::seconds(seconds)),
            scope,
            created_at: received_at,
        })
    }
}
