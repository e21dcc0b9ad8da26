use std::future::Future;

use tokio_util::sync::CancellationToken;
use url::Url;

use super::{AuthError, AuthRequest, AuthResponse, Authenticator, CredentialStore, TokenExchanger};
use crate::api::TdAmeritradeClient;

/// Execute the copy/paste login: show the authorization URL, then complete the flow from the
/// redirect URL the user pastes back.
pub async fn run_manual_flow<S, E, Notify, Input, Fut>(
    authenticator: &Authenticator<S, E>,
    cancel: &CancellationToken,
    open_browser: bool,
    notify_authorization_url: Notify,
    mut read_input: Input,
) -> Result<TdAmeritradeClient, AuthError>
where
    S: CredentialStore,
    E: TokenExchanger,
    Notify: Fn(&Url) -> Result<(), AuthError>,
    Input: FnMut() -> Fut,
    Fut: Future<Output = Result<String, AuthError>>,
{
    let mut response = AuthResponse::new();
    let origin = AuthRequest::new(authenticator.config().redirect_uri.clone());
    let auth_url = authenticator.start(&mut response, &origin)?;

    notify_authorization_url(&auth_url)?;

    if open_browser {
        open::that(auth_url.as_str()).map_err(|err| AuthError::BrowserLaunch(err.to_string()))?;
    }

    let raw = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Err(AuthError::Cancelled),
        input = read_input() => input?,
    };
    let callback = parse_manual_input(raw.trim())?;
    authenticator.finish(cancel, &mut response, &callback).await
}

/// Turn pasted text into the callback request the provider would have sent.
///
/// Accepts an absolute redirect URL or just its path and query. A bare code is rejected since
/// the state has to travel with it.
pub fn parse_manual_input(input: &str) -> Result<AuthRequest, AuthError> {
    if input.is_empty() {
        return Err(AuthError::InvalidAuthorizationResponse(
            "empty input".into(),
        ));
    }
    if !input.contains('?') {
        return Err(AuthError::InvalidAuthorizationResponse(
            "paste the full redirect URL, including its query string".into(),
        ));
    }

    let request = AuthRequest::from_target(input)?;
    if let Some(error) = request.query_param("error") {
        return Err(AuthError::AccessDenied(error));
    }
    Ok(request)
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use std::sync::{Arc, Mutex};

    use crate::auth::{FileCredentialStore, OAuthConfig, OAuthEndpoints};
    use crate::config::ConfigLocator;
    use tempfile::TempDir;

    fn authenticator(dir: &TempDir, token_url: &str) -> Authenticator<FileCredentialStore> {
        let store = FileCredentialStore::new(
            ConfigLocator::from_root(dir.path().to_path_buf()),
            "default",
        );
        let endpoints = OAuthEndpoints::new(
            Url::parse("https://auth.example.com/auth").unwrap(),
            Url::parse(token_url).unwrap(),
        );
        let config = OAuthConfig::new(
            "CLIENTID",
            Url::parse("https://localhost:8080/callback").unwrap(),
        );
        Authenticator::with_endpoints(store, config, endpoints).unwrap()
    }

    fn capture_state(holder: &Arc<Mutex<String>>) -> impl Fn(&Url) -> Result<(), AuthError> {
        let holder = holder.clone();
        move |url: &Url| {
            let state = url
                .query_pairs()
                .find(|(k, _)| k == "state")
                .map(|(_, v)| v.into_owned())
                .unwrap();
            *holder.lock().unwrap() = state;
            Ok(())
        }
    }

    #[tokio::test]
    async fn manual_flow_with_full_redirect() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/token")
                .body_contains("code=manual-code");
            then.status(200).json_body_obj(&serde_json::json!({
                "access_token": "abc",
                "refresh_token": "ref",
                "token_type": "Bearer",
                "expires_in": 1800,
            }));
        });

        let temp_dir = TempDir::new().unwrap();
        let authenticator = authenticator(&temp_dir, &server.url("/token"));
        let state_holder = Arc::new(Mutex::new(String::new()));
        let read_counter = Arc::new(Mutex::new(0usize));

        let read_input = {
            let state_holder = state_holder.clone();
            let read_counter = read_counter.clone();
            move || {
                let state_holder = state_holder.clone();
                let read_counter = read_counter.clone();
                async move {
                    *read_counter.lock().unwrap() += 1;
                    let state = state_holder.lock().unwrap().clone();
                    Ok(format!(
                        "  https://localhost:8080/callback?code=manual-code&state={state}\n"
                    ))
                }
            }
        };

        let result = run_manual_flow(
            &authenticator,
            &CancellationToken::new(),
            false,
            capture_state(&state_holder),
            read_input,
        )
        .await;

        assert!(result.is_ok(), "flow failed: {:?}", result.err());
        mock.assert();
        assert_eq!(*read_counter.lock().unwrap(), 1);
        let stored = authenticator
            .store()
            .get_token(&AuthRequest::from_target("/").unwrap())
            .unwrap()
            .unwrap();
        assert_eq!(stored.access_token, "abc");
    }

    #[tokio::test]
    async fn manual_flow_state_mismatch() {
        let temp_dir = TempDir::new().unwrap();
        let authenticator = authenticator(&temp_dir, "http://127.0.0.1:9/token");
        let holder = Arc::new(Mutex::new(String::new()));

        let err = run_manual_flow(
            &authenticator,
            &CancellationToken::new(),
            false,
            capture_state(&holder),
            || async { Ok("/callback?code=manual&state=bad".to_string()) },
        )
        .await
        .unwrap_err();

        match err {
            AuthError::InvalidState { expected, got } => {
                assert_eq!(expected, *holder.lock().unwrap());
                assert_eq!(got, "bad");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn manual_flow_cancelled_while_waiting_for_input() {
        let temp_dir = TempDir::new().unwrap();
        let authenticator = authenticator(&temp_dir, "http://127.0.0.1:9/token");
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = run_manual_flow(
            &authenticator,
            &cancel,
            false,
            |_| Ok(()),
            || std::future::pending::<Result<String, AuthError>>(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AuthError::Cancelled));
    }

    #[test]
    fn parse_input_handles_url() {
        let request =
            parse_manual_input("https://localhost:8080/callback?code=abc&state=xyz").unwrap();
        assert_eq!(request.query_param("code").as_deref(), Some("abc"));
        assert_eq!(request.query_param("state").as_deref(), Some("xyz"));
    }

    #[test]
    fn parse_input_handles_path_and_query() {
        let request = parse_manual_input("/callback?code=abc&state=xyz").unwrap();
        assert_eq!(request.url().path(), "/callback");
        assert_eq!(request.query_param("state").as_deref(), Some("xyz"));
    }

    #[test]
    fn parse_input_rejects_bare_code_and_empty_input() {
        assert!(matches!(
            parse_manual_input("code123"),
            Err(AuthError::InvalidAuthorizationResponse(_))
        ));
        assert!(matches!(
            parse_manual_input(""),
            Err(AuthError::InvalidAuthorizationResponse(_))
        ));
    }

    #[test]
    fn parse_input_access_denied() {
        let err =
            parse_manual_input("https://localhost:8080/callback?error=access_denied").unwrap_err();
        assert!(matches!(err, AuthError::AccessDenied(reason) if reason == "access_denied"));
    }
}
