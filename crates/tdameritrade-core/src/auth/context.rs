use reqwest::header::{HeaderMap, HeaderName, HeaderValue, InvalidHeaderValue, COOKIE, SET_COOKIE};
use url::Url;

use super::AuthError;

/// Inbound request as seen by the login flow: the URL the browser hit plus its headers.
///
/// Credential stores use the headers (usually cookies) to bind stored values to a caller session.
#[derive(Debug, Clone)]
pub struct AuthRequest {
    url: Url,
    headers: HeaderMap,
}

impl AuthRequest {
    pub fn new(url: Url) -> Self {
        Self {
            url,
            headers: HeaderMap::new(),
        }
    }

    /// Parse a callback target, either an absolute URL or a bare path such as `/callback?code=..`.
    pub fn from_target(target: &str) -> Result<Self, AuthError> {
        let url = match Url::parse(target) {
            Ok(url) => url,
            Err(url::ParseError::RelativeUrlWithoutBase) => {
                let path = if target.starts_with('/') {
                    target.to_owned()
                } else {
                    format!("/{target}")
                };
                Url::parse(&format!("http://localhost{path}"))?
            }
            Err(err) => return Err(err.into()),
        };
        Ok(Self::new(url))
    }

    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.append(name, value);
        self
    }

    /// Attach a cookie as a browser would send it back.
    pub fn with_cookie(self, name: &str, value: &str) -> Result<Self, InvalidHeaderValue> {
        let value = HeaderValue::from_str(&format!("{name}={value}"))?;
        Ok(self.with_header(COOKIE, value))
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// First value of a query parameter, if present.
    pub fn query_param(&self, key: &str) -> Option<String> {
        self.url
            .query_pairs()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.into_owned())
    }

    /// Value of a cookie from any `Cookie` header on the request.
    pub fn cookie(&self, name: &str) -> Option<String> {
        self.headers
            .get_all(COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .flat_map(|header| header.split(';'))
            .filter_map(|pair| pair.trim().split_once('='))
            .find(|(key, _)| *key == name)
            .map(|(_, value)| value.to_owned())
    }
}

/// Headers the integrating application must attach to its HTTP response.
///
/// The login flow itself never writes a body; stores record side effects (cookies) here.
#[derive(Debug, Clone, Default)]
pub struct AuthResponse {
    headers: HeaderMap,
}

impl AuthResponse {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append_header(&mut self, name: HeaderName, value: HeaderValue) {
        self.headers.append(name, value);
    }

    pub fn set_cookie(&mut self, cookie: &str) -> Result<(), InvalidHeaderValue> {
        let value = HeaderValue::from_str(cookie)?;
        self.headers.append(SET_COOKIE, value);
        Ok(())
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn into_headers(self) -> HeaderMap {
        self.headers
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_path_only_targets() {
        let request = AuthRequest::from_target("/callback?code=abc&state=xyz").unwrap();
        assert_eq!(request.url().path(), "/callback");
        assert_eq!(request.query_param("code").as_deref(), Some("abc"));
        assert_eq!(request.query_param("state").as_deref(), Some("xyz"));
        assert!(request.query_param("error").is_none());
    }

    #[test]
    fn query_values_are_decoded() {
        let request =
            AuthRequest::from_target("https://localhost:8080/callback?code=a%2Bb%3D&state=s")
                .unwrap();
        assert_eq!(request.query_param("code").as_deref(), Some("a+b="));
    }

    #[test]
    fn reads_cookies_across_headers() {
        let request = AuthRequest::from_target("/callback")
            .unwrap()
            .with_cookie("tda_session", "one")
            .unwrap()
            .with_header(COOKIE, HeaderValue::from_static("theme=dark; tda_state=abc"));
        assert_eq!(request.cookie("tda_session").as_deref(), Some("one"));
        assert_eq!(request.cookie("tda_state").as_deref(), Some("abc"));
        assert!(request.cookie("missing").is_none());
    }

    #[test]
    fn response_collects_set_cookie_headers() {
        let mut response = AuthResponse::new();
        response.set_cookie("a=1; Path=/").unwrap();
        response.set_cookie("b=2; Path=/").unwrap();
        assert_eq!(response.headers().get_all(SET_COOKIE).iter().count(), 2);
        assert!(response.set_cookie("bad\nvalue").is_err());
    }
}
