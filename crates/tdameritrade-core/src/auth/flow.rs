use std::env;

use url::{Host, Url};

/// Ways the CLI can drive a login.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginFlow {
    /// Listen on the redirect URI and let the browser deliver the callback.
    Loopback,
    /// Print the authorization URL and read the pasted redirect URL back.
    Manual,
}

/// Helper responsible for inferring which flow to start with.
#[derive(Debug)]
pub struct FlowPreference {
    preferred: LoginFlow,
    browser_available: bool,
}

impl FlowPreference {
    /// Detect the preferred flow from `TDAMERITRADE_AUTH_FLOW`, the redirect URI and terminal
    /// capabilities.
    pub fn detect(redirect_uri: &Url) -> Self {
        let requested = env::var("TDAMERITRADE_AUTH_FLOW")
            .ok()
            .and_then(|value| value.parse::<LoginFlow>().ok());
        Self::resolve(requested, redirect_uri, browser_available())
    }

    fn resolve(requested: Option<LoginFlow>, redirect_uri: &Url, browser_available: bool) -> Self {
        let preferred = match requested {
            Some(flow) => flow,
            None if browser_available && is_loopback_redirect(redirect_uri) => LoginFlow::Loopback,
            None => LoginFlow::Manual,
        };
        Self {
            preferred,
            browser_available,
        }
    }

    /// Preferred flow to offer to the user.
    pub fn preferred(&self) -> LoginFlow {
        self.preferred
    }

    /// Whether we should attempt to spawn the system browser automatically.
    pub fn browser_available(&self) -> bool {
        self.browser_available
    }
}

/// True when a local listener can receive callbacks for this redirect URI.
pub fn is_loopback_redirect(redirect_uri: &Url) -> bool {
    if redirect_uri.scheme() != "http" {
        return false;
    }
    match redirect_uri.host() {
        Some(Host::Domain(domain)) => domain.eq_ignore_ascii_case("localhost"),
        Some(Host::Ipv4(addr)) => addr.is_loopback(),
        Some(Host::Ipv6(addr)) => addr.is_loopback(),
        None => false,
    }
}

fn browser_available() -> bool {
    if env::var_os("TDAMERITRADE_NO_BROWSER").is_some() {
        return false;
    }

    if env::var_os("SSH_CONNECTION").is_some() && env::var_os("DISPLAY").is_none() {
        return false;
    }

    if env::var_os("DISPLAY").is_some() || env::var_os("WAYLAND_DISPLAY").is_some() {
        return true;
    }

    cfg!(target_os = "windows") || cfg!(target_os = "macos")
}

impl std::str::FromStr for LoginFlow {
    type Err = InvalidFlow;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "loopback" | "browser" => Ok(LoginFlow::Loopback),
            "manual" | "paste" => Ok(LoginFlow::Manual),
            other => Err(InvalidFlow(other.to_owned())),
        }
    }
}

impl std::fmt::Display for LoginFlow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let value = match self {
            LoginFlow::Loopback => "loopback",
            LoginFlow::Manual => "manual",
        };
        write!(f, "{value}")
    }
}

/// Error reported when parsing an unsupported flow.
#[derive(Debug, thiserror::Error)]
#[error("invalid login flow '{0}'")]
pub struct InvalidFlow(pub String);

#[cfg(test)]
mod tests {
    use super::*;

    fn url(raw: &str) -> Url {
        Url::parse(raw).unwrap()
    }

    #[test]
    fn parse_flow_variants() {
        assert_eq!("loopback".parse::<LoginFlow>().unwrap(), LoginFlow::Loopback);
        assert_eq!("Browser".parse::<LoginFlow>().unwrap(), LoginFlow::Loopback);
        assert_eq!("manual".parse::<LoginFlow>().unwrap(), LoginFlow::Manual);
        assert_eq!(LoginFlow::Loopback.to_string(), "loopback");
    }

    #[test]
    fn invalid_flow() {
        let err = "api-key".parse::<LoginFlow>().unwrap_err();
        assert_eq!(err.0, "api-key");
    }

    #[test]
    fn loopback_requires_plain_http_on_local_host() {
        assert!(is_loopback_redirect(&url("http://127.0.0.1:8080/callback")));
        assert!(is_loopback_redirect(&url("http://localhost/callback")));
        assert!(is_loopback_redirect(&url("http://[::1]:9000/cb")));
        assert!(!is_loopback_redirect(&url("https://127.0.0.1:8080/callback")));
        assert!(!is_loopback_redirect(&url("http://example.com/callback")));
    }

    #[test]
    fn resolve_prefers_loopback_only_when_possible() {
        let local = url("http://127.0.0.1:8080/callback");
        let remote = url("https://127.0.0.1:8080/callback");

        let pref = FlowPreference::resolve(None, &local, true);
        assert_eq!(pref.preferred(), LoginFlow::Loopback);
        assert!(pref.browser_available());

        assert_eq!(
            FlowPreference::resolve(None, &local, false).preferred(),
            LoginFlow::Manual
        );
        assert_eq!(
            FlowPreference::resolve(None, &remote, true).preferred(),
            LoginFlow::Manual
        );
        assert_eq!(
            FlowPreference::resolve(Some(LoginFlow::Manual), &local, true).preferred(),
            LoginFlow::Manual
        );
    }
}
