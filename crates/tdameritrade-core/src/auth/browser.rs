use std::time::Duration;

use reqwest::header::{HeaderName, HeaderValue};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use url::Url;

use super::{
    AuthError, AuthRequest, AuthResponse, Authenticator, CredentialStore, TokenExchanger,
};
use crate::api::TdAmeritradeClient;

const SUCCESS_HTML: &str = r#"<html><body><h1>Authentication complete</h1><p>You may close this window and return to the terminal.</p></body></html>"#;
const ERROR_HTML: &str = r#"<html><body><h1>Authentication failed</h1><p>Please return to the terminal for details.</p></body></html>"#;
const NOT_FOUND_HTML: &str = r#"<html><body><h1>Not found</h1></body></html>"#;
const MAX_REQUEST_BYTES: usize = 16 * 1024;
const REQUEST_READ_TIMEOUT: Duration = Duration::from_secs(10);

/// Run the login in the user's browser, receiving the callback on the redirect URI's own
/// host and port.
///
/// The redirect URI must be plain `http` (TD Ameritrade only redirects to the URI registered
/// for the app, so the listener has to sit exactly there).
pub async fn run_loopback_flow<S, E, F>(
    authenticator: &Authenticator<S, E>,
    cancel: &CancellationToken,
    open_browser: bool,
    notify_authorization_url: F,
) -> Result<TdAmeritradeClient, AuthError>
where
    S: CredentialStore,
    E: TokenExchanger,
    F: Fn(&Url) -> Result<(), AuthError>,
{
    let listener = bind_redirect(&authenticator.config().redirect_uri).await?;
    run_with_listener(
        authenticator,
        listener,
        cancel,
        open_browser,
        notify_authorization_url,
    )
    .await
}

/// Same as [`run_loopback_flow`] with a listener the caller has already bound.
pub async fn run_with_listener<S, E, F>(
    authenticator: &Authenticator<S, E>,
    listener: TcpListener,
    cancel: &CancellationToken,
    open_browser: bool,
    notify_authorization_url: F,
) -> Result<TdAmeritradeClient, AuthError>
where
    S: CredentialStore,
    E: TokenExchanger,
    F: Fn(&Url) -> Result<(), AuthError>,
{
    let redirect_uri = authenticator.config().redirect_uri.clone();
    let mut response = AuthResponse::new();
    let auth_url = authenticator.start(&mut response, &AuthRequest::new(redirect_uri.clone()))?;

    notify_authorization_url(&auth_url)?;

    if open_browser {
        open::that(auth_url.as_str()).map_err(|err| AuthError::BrowserLaunch(err.to_string()))?;
    }

    let (mut stream, request) = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Err(AuthError::Cancelled),
        accepted = accept_callback(&listener, redirect_uri.path()) => accepted?,
    };

    if let Some(error) = request.query_param("error") {
        let _ = respond(&mut stream, 400, ERROR_HTML, &AuthResponse::new()).await;
        return Err(AuthError::AccessDenied(error));
    }

    match authenticator.finish(cancel, &mut response, &request).await {
        Ok(client) => {
            respond(&mut stream, 200, SUCCESS_HTML, &response).await?;
            let _ = stream.shutdown().await;
            Ok(client)
        }
        Err(err) => {
            let _ = respond(&mut stream, 400, ERROR_HTML, &response).await;
            Err(err)
        }
    }
}

async fn bind_redirect(redirect_uri: &Url) -> Result<TcpListener, AuthError> {
    if redirect_uri.scheme() != "http" {
        return Err(AuthError::UnsupportedFlow(
            "loopback login requires an http:// redirect URI",
        ));
    }
    let host = redirect_uri
        .host_str()
        .ok_or(AuthError::UnsupportedFlow("redirect URI has no host"))?
        .trim_start_matches('[')
        .trim_end_matches(']');
    let port = redirect_uri.port_or_known_default().unwrap_or(80);
    TcpListener::bind((host, port))
        .await
        .map_err(AuthError::Bind)
}

/// Accept connections until one targets `callback_path`; anything else (favicon requests and the
/// like) is answered with 404. Connections that close early or send garbage are dropped; only a
/// failing `accept` ends the wait.
async fn accept_callback(
    listener: &TcpListener,
    callback_path: &str,
) -> Result<(TcpStream, AuthRequest), AuthError> {
    loop {
        let (mut stream, addr) = listener.accept().await?;
        let request = match read_request(&mut stream).await {
            Ok(request) => request,
            Err(err) => {
                debug!(peer = %addr, error = %err, "dropping unreadable connection");
                continue;
            }
        };
        if request.url().path() == callback_path {
            debug!(peer = %addr, "received authorization callback");
            return Ok((stream, request));
        }
        debug!(peer = %addr, path = request.url().path(), "ignoring unrelated request");
        let _ = respond(&mut stream, 404, NOT_FOUND_HTML, &AuthResponse::new()).await;
    }
}

async fn read_request(stream: &mut TcpStream) -> Result<AuthRequest, AuthError> {
    let raw = timeout(REQUEST_READ_TIMEOUT, read_request_head(stream))
        .await
        .map_err(|_| {
            AuthError::InvalidAuthorizationResponse("timed out reading request".into())
        })??;
    parse_request(&raw)
}

async fn read_request_head(stream: &mut TcpStream) -> Result<String, AuthError> {
    let mut buffer = Vec::with_capacity(4096);
    let mut chunk = [0u8; 4096];
    loop {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        buffer.extend_from_slice(&chunk[..n]);
        if buffer.windows(4).any(|window| window == b"\r\n\r\n") {
            break;
        }
        if buffer.len() >= MAX_REQUEST_BYTES {
            return Err(AuthError::InvalidAuthorizationResponse(
                "callback request too large".into(),
            ));
        }
    }
    Ok(String::from_utf8_lossy(&buffer).into_owned())
}

fn parse_request(raw: &str) -> Result<AuthRequest, AuthError> {
    let mut lines = raw.lines();
    let first_line = lines
        .next()
        .ok_or_else(|| AuthError::InvalidAuthorizationResponse("missing request line".into()))?;
    let mut parts = first_line.split_whitespace();
    let _method = parts
        .next()
        .ok_or_else(|| AuthError::InvalidAuthorizationResponse("missing method".into()))?;
    let target = parts
        .next()
        .ok_or_else(|| AuthError::InvalidAuthorizationResponse("missing path".into()))?;

    let mut request = AuthRequest::from_target(target)?;
    for line in lines.take_while(|line| !line.is_empty()) {
        let Some((name, value)) = line.split_once(':') else {
            continue;
        };
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.trim().as_bytes()),
            HeaderValue::from_str(value.trim()),
        ) {
            request = request.with_header(name, value);
        }
    }
    Ok(request)
}

async fn respond(
    stream: &mut TcpStream,
    status: u16,
    body: &str,
    extra: &AuthResponse,
) -> Result<(), AuthError> {
    let status_line = match status {
        200 => "HTTP/1.1 200 OK",
        400 => "HTTP/1.1 400 Bad Request",
        404 => "HTTP/1.1 404 Not Found",
        _ => "HTTP/1.1 500 Internal Server Error",
    };
    let mut head = format!(
        "{status_line}\r\nContent-Type: text/html; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n",
        body.len()
    );
    for (name, value) in extra.headers() {
        if let Ok(value) = value.to_str() {
            head.push_str(&format!("{name}: {value}\r\n"));
        }
    }
    head.push_str("\r\n");
    stream.write_all(head.as_bytes()).await?;
    stream.write_all(body.as_bytes()).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use std::sync::{Arc, Mutex};
    use tokio::task::JoinHandle;

    use crate::auth::{MemoryCredentialStore, OAuthConfig, OAuthEndpoints};

    type Pending = Arc<Mutex<Option<JoinHandle<String>>>>;

    async fn loopback_listener() -> (TcpListener, Url) {
        let listener = TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let redirect = Url::parse(&format!("http://127.0.0.1:{port}/callback")).unwrap();
        (listener, redirect)
    }

    fn authenticator(
        redirect: Url,
        token_url: &str,
    ) -> Authenticator<MemoryCredentialStore> {
        let endpoints = OAuthEndpoints::new(
            Url::parse("https://auth.example.com/auth").unwrap(),
            Url::parse(token_url).unwrap(),
        );
        Authenticator::with_endpoints(
            MemoryCredentialStore::new(),
            OAuthConfig::new("CLIENTID", redirect),
            endpoints,
        )
        .unwrap()
    }

    async fn get(port: u16, target: &str) -> String {
        let mut stream = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
        let request =
            format!("GET {target} HTTP/1.1\r\nHost: 127.0.0.1:{port}\r\nConnection: close\r\n\r\n");
        stream.write_all(request.as_bytes()).await.unwrap();
        let mut reply = String::new();
        let _ = stream.read_to_string(&mut reply).await;
        reply
    }

    /// Browser stand-in: after a favicon request, follow the redirect with the given query.
    fn browser(pending: &Pending, query: impl Fn(&str) -> String) -> impl Fn(&Url) -> Result<(), AuthError> {
        let pending = pending.clone();
        move |url: &Url| {
            let state = url
                .query_pairs()
                .find(|(k, _)| k == "state")
                .map(|(_, v)| v.into_owned())
                .unwrap();
            let redirect = url
                .query_pairs()
                .find(|(k, _)| k == "redirect_uri")
                .map(|(_, v)| Url::parse(&v).unwrap())
                .unwrap();
            let port = redirect.port().unwrap();
            let target = format!("/callback?{}", query(&state));
            let handle = tokio::spawn(async move {
                let favicon = get(port, "/favicon.ico").await;
                assert!(favicon.starts_with("HTTP/1.1 404"));
                get(port, &target).await
            });
            *pending.lock().unwrap() = Some(handle);
            Ok(())
        }
    }

    async fn browser_reply(pending: &Pending) -> String {
        let handle = pending.lock().unwrap().take().unwrap();
        handle.await.unwrap()
    }

    #[tokio::test]
    async fn loopback_flow_success() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/token")
                .body_contains("code=test-code");
            then.status(200).json_body_obj(&serde_json::json!({
                "access_token": "abc",
                "refresh_token": "ref",
                "token_type": "Bearer",
                "expires_in": 1800
            }));
        });

        let (listener, redirect) = loopback_listener().await;
        let authenticator = authenticator(redirect.clone(), &server.url("/token"));
        let pending = Pending::default();

        let result = run_with_listener(
            &authenticator,
            listener,
            &CancellationToken::new(),
            false,
            browser(&pending, |state| format!("code=test-code&state={state}")),
        )
        .await;

        assert!(result.is_ok(), "flow failed: {:?}", result.err());
        mock.assert();
        assert!(browser_reply(&pending).await.starts_with("HTTP/1.1 200"));
        let stored = authenticator
            .store()
            .get_token(&AuthRequest::new(redirect))
            .unwrap()
            .unwrap();
        assert_eq!(stored.access_token, "abc");
    }

    #[tokio::test]
    async fn loopback_flow_skips_unreadable_connections() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST).path("/token").body_contains("code=c");
            then.status(200).json_body_obj(&serde_json::json!({
                "access_token": "abc",
                "token_type": "Bearer",
                "expires_in": 1800
            }));
        });

        let (listener, redirect) = loopback_listener().await;
        let port = redirect.port().unwrap();
        let authenticator = authenticator(redirect, &server.url("/token"));
        let pending = Pending::default();
        let slot = pending.clone();

        let result = run_with_listener(
            &authenticator,
            listener,
            &CancellationToken::new(),
            false,
            move |url: &Url| {
                let state = url
                    .query_pairs()
                    .find(|(k, _)| k == "state")
                    .map(|(_, v)| v.into_owned())
                    .unwrap();
                let handle = tokio::spawn(async move {
                    // Speculative connection that never sends a request.
                    drop(TcpStream::connect(("127.0.0.1", port)).await.unwrap());
                    let mut garbage = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
                    garbage.write_all(b"garbage\r\n\r\n").await.unwrap();
                    drop(garbage);
                    get(port, &format!("/callback?code=c&state={state}")).await
                });
                *slot.lock().unwrap() = Some(handle);
                Ok(())
            },
        )
        .await;

        assert!(result.is_ok(), "flow failed: {:?}", result.err());
        mock.assert();
        assert!(browser_reply(&pending).await.starts_with("HTTP/1.1 200"));
    }

    #[tokio::test]
    async fn occupied_redirect_port_is_a_bind_error() {
        let (occupied, redirect) = loopback_listener().await;
        let authenticator = authenticator(redirect, "http://127.0.0.1:9/token");
        let err = run_loopback_flow(&authenticator, &CancellationToken::new(), false, |_| Ok(()))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Bind(_)), "unexpected error: {err:?}");
        drop(occupied);
    }

    #[tokio::test]
    async fn loopback_flow_state_mismatch() {
        let (listener, redirect) = loopback_listener().await;
        let authenticator = authenticator(redirect, "http://127.0.0.1:9/token");
        let pending = Pending::default();

        let err = run_with_listener(
            &authenticator,
            listener,
            &CancellationToken::new(),
            false,
            browser(&pending, |_| "code=test-code&state=wrong".into()),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, AuthError::InvalidState { got, .. } if got == "wrong"));
        assert!(browser_reply(&pending).await.starts_with("HTTP/1.1 400"));
    }

    #[tokio::test]
    async fn loopback_flow_access_denied() {
        let (listener, redirect) = loopback_listener().await;
        let authenticator = authenticator(redirect, "http://127.0.0.1:9/token");
        let pending = Pending::default();

        let err = run_with_listener(
            &authenticator,
            listener,
            &CancellationToken::new(),
            false,
            browser(&pending, |state| format!("error=access_denied&state={state}")),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, AuthError::AccessDenied(reason) if reason == "access_denied"));
        assert!(browser_reply(&pending).await.starts_with("HTTP/1.1 400"));
    }

    #[tokio::test]
    async fn loopback_flow_can_be_cancelled() {
        let (listener, redirect) = loopback_listener().await;
        let authenticator = authenticator(redirect, "http://127.0.0.1:9/token");
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let err = run_with_listener(&authenticator, listener, &cancel, false, |_| Ok(()))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Cancelled));
    }

    #[tokio::test]
    async fn https_redirect_is_not_loopback() {
        let authenticator = authenticator(
            Url::parse("https://127.0.0.1:8080/callback").unwrap(),
            "http://127.0.0.1:9/token",
        );
        let err = run_loopback_flow(&authenticator, &CancellationToken::new(), false, |_| Ok(()))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::UnsupportedFlow(_)));
    }

    #[test]
    fn parses_request_line_and_cookies() {
        let request = parse_request(
            "GET /callback?code=a&state=b HTTP/1.1\r\nHost: localhost\r\nCookie: tda_session=s1\r\n\r\n",
        )
        .unwrap();
        assert_eq!(request.query_param("code").as_deref(), Some("a"));
        assert_eq!(request.cookie("tda_session").as_deref(), Some("s1"));
        assert!(parse_request("").is_err());
    }
}
