use reqwest::header::{HeaderMap, HeaderValue, InvalidHeaderValue, AUTHORIZATION};
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;
use tracing::debug;
use url::Url;

use crate::auth::Credential;
use crate::services::{
    AccountService, InstrumentService, MarketHoursService, MoverService, PriceHistoryService,
    QuoteService, TransactionService, WatchlistService,
};

pub const DEFAULT_BASE_URL: &str = "https://api.tdameritrade.com/v1/";
const USER_AGENT: &str = "tdameritrade-rs/0.1.0";

/// Errors returned by the REST client.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("HTTP status {status} body: {body}")]
    HttpStatus { status: StatusCode, body: String },
    #[error("invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("base URL must have a trailing slash, but {0:?} does not")]
    InvalidBaseUrl(String),
    #[error("access token is not a valid header value: {0}")]
    InvalidCredential(#[from] InvalidHeaderValue),
    #[error("failed to deserialize response: {0}")]
    Deserialize(#[from] serde_json::Error),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("no data, check time period and/or ticker {0}")]
    NoData(String),
}

pub type ApiResult<T> = Result<T, ApiError>;

/// Authenticated TD Ameritrade REST client.
///
/// Every request carries the access token it was built with as a bearer token. Paths are
/// resolved against the base URL, so the base must end with `/`.
#[derive(Debug, Clone)]
pub struct TdAmeritradeClient {
    http: Client,
    base_url: Url,
}

impl TdAmeritradeClient {
    /// Build a client against the production API.
    pub fn from_credential(credential: &Credential) -> ApiResult<Self> {
        Self::with_base_url(credential, DEFAULT_BASE_URL)
    }

    /// Build a client with a custom API root (useful for testing).
    pub fn with_base_url(credential: &Credential, base_url: &str) -> ApiResult<Self> {
        let base_url = parse_base_url(base_url)?;
        let mut auth_header = HeaderValue::from_str(&format!("Bearer {}", credential.access_token))?;
        auth_header.set_sensitive(true);
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, auth_header);

        let http = Client::builder()
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .build()?;
        Ok(Self { http, base_url })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn set_base_url(&mut self, base_url: &str) -> ApiResult<()> {
        self.base_url = parse_base_url(base_url)?;
        Ok(())
    }

    pub fn quotes(&self) -> QuoteService {
        QuoteService::new(self.clone())
    }

    pub fn instruments(&self) -> InstrumentService {
        InstrumentService::new(self.clone())
    }

    pub fn market_hours(&self) -> MarketHoursService {
        MarketHoursService::new(self.clone())
    }

    pub fn movers(&self) -> MoverService {
        MoverService::new(self.clone())
    }

    pub fn price_history(&self) -> PriceHistoryService {
        PriceHistoryService::new(self.clone())
    }

    pub fn accounts(&self) -> AccountService {
        AccountService::new(self.clone())
    }

    pub fn transactions(&self) -> TransactionService {
        TransactionService::new(self.clone())
    }

    pub fn watchlists(&self) -> WatchlistService {
        WatchlistService::new(self.clone())
    }

    /// `GET` a path relative to the base URL and decode the JSON body.
    pub async fn get<R>(&self, path: &str, query: &[(&str, String)]) -> ApiResult<R>
    where
        R: DeserializeOwned,
    {
        let url = self.endpoint(path)?;
        let response = self.execute(self.http.get(url).query(query)).await?;
        let bytes = response.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Issue a request whose response carries no body of interest. Returns the response headers.
    pub async fn send<B>(&self, method: Method, path: &str, body: Option<&B>) -> ApiResult<HeaderMap>
    where
        B: Serialize + ?Sized,
    {
        let url = self.endpoint(path)?;
        let mut request = self.http.request(method, url);
        if let Some(body) = body {
            request = request.json(body);
        }
        let response = self.execute(request).await?;
        Ok(response.headers().clone())
    }

    fn endpoint(&self, path: &str) -> ApiResult<Url> {
        Ok(self.base_url.join(path)?)
    }

    async fn execute(&self, request: RequestBuilder) -> ApiResult<Response> {
        let response = request.send().await?;
        let status = response.status();
        debug!(url = %response.url(), %status, "TD Ameritrade API response");
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::HttpStatus { status, body });
        }
        Ok(response)
    }
}

fn parse_base_url(raw: &str) -> ApiResult<Url> {
    let url = Url::parse(raw)?;
    if !url.path().ends_with('/') {
        return Err(ApiError::InvalidBaseUrl(raw.to_owned()));
    }
    Ok(url)
}

/// Validate a caller-supplied value that is spliced into a URL path.
pub(crate) fn path_segment<'a>(what: &str, value: &'a str) -> ApiResult<&'a str> {
    if value.is_empty() {
        return Err(ApiError::InvalidArgument(format!("no {what} present")));
    }
    if value.contains(['/', '\\', '?', '#']) {
        return Err(ApiError::InvalidArgument(format!(
            "{what} {value:?} contains reserved characters"
        )));
    }
    // URL resolution treats `.`, `..` and their %2e spellings as dot segments.
    let decoded = value.to_ascii_lowercase().replace("%2e", ".");
    if decoded == "." || decoded == ".." {
        return Err(ApiError::InvalidArgument(format!(
            "{what} {value:?} is not a valid path segment"
        )));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    fn credential() -> Credential {
        Credential::new("test-token".into(), None, None)
    }

    #[test]
    fn base_url_requires_trailing_slash() {
        let err = TdAmeritradeClient::with_base_url(&credential(), "https://api.example.com/v1")
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "base URL must have a trailing slash, but \"https://api.example.com/v1\" does not"
        );

        let mut client = TdAmeritradeClient::from_credential(&credential()).unwrap();
        assert_eq!(client.base_url().as_str(), DEFAULT_BASE_URL);
        assert!(client.set_base_url("https://api.example.com/v2").is_err());
        client.set_base_url("https://api.example.com/v2/").unwrap();
        assert_eq!(client.base_url().as_str(), "https://api.example.com/v2/");
    }

    #[test]
    fn rejects_tokens_that_cannot_be_headers() {
        let bad = Credential::new("bad\ntoken".into(), None, None);
        assert!(matches!(
            TdAmeritradeClient::from_credential(&bad),
            Err(ApiError::InvalidCredential(_))
        ));
    }

    #[test]
    fn path_segments_are_validated() {
        assert_eq!(path_segment("symbol", "BRK.B").unwrap(), "BRK.B");
        assert!(matches!(
            path_segment("symbol", ""),
            Err(ApiError::InvalidArgument(msg)) if msg == "no symbol present"
        ));
        assert!(path_segment("symbol", "../accounts").is_err());
        assert!(path_segment("symbol", "..").is_err());
        assert!(path_segment("symbol", ".").is_err());
        assert!(path_segment("index", "..\\accounts").is_err());
        assert!(path_segment("symbol", "%2E%2e").is_err());
        assert_eq!(path_segment("index", "$SPX.X").unwrap(), "$SPX.X");
    }

    #[tokio::test]
    async fn sends_bearer_token_and_decodes_json() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET)
                .path("/v1/marketdata/SPY/hours")
                .header("authorization", "Bearer test-token")
                .query_param("date", "2024-07-01");
            then.status(200).json_body_obj(&serde_json::json!({ "ok": true }));
        });

        let client =
            TdAmeritradeClient::with_base_url(&credential(), &server.url("/v1/")).unwrap();
        let value: serde_json::Value = client
            .get("marketdata/SPY/hours", &[("date", "2024-07-01".into())])
            .await
            .unwrap();

        mock.assert();
        assert_eq!(value["ok"], true);
    }

    #[tokio::test]
    async fn non_success_status_keeps_body() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(DELETE).path("/v1/accounts/1/orders/2");
            then.status(401).body("{\"error\":\"Not Authorized\"}");
        });

        let client =
            TdAmeritradeClient::with_base_url(&credential(), &server.url("/v1/")).unwrap();
        let err = client
            .send::<()>(Method::DELETE, "accounts/1/orders/2", None)
            .await
            .unwrap_err();
        match err {
            ApiError::HttpStatus { status, body } => {
                assert_eq!(status, StatusCode::UNAUTHORIZED);
                assert!(body.contains("Not Authorized"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn malformed_json_is_a_deserialize_error() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/v1/accounts");
            then.status(200).body("not json");
        });

        let client =
            TdAmeritradeClient::with_base_url(&credential(), &server.url("/v1/")).unwrap();
        let err = client
            .get::<serde_json::Value>("accounts", &[])
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Deserialize(_)));
    }
}
