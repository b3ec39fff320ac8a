use crate::auth::AUTH_COOKIE_NAME;
use url::form_urlencoded;

/// Outcome of running a page request through the gate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteDecision {
    Pass,
    Redirect(String),
}

/// Route protection for page requests, keyed on the `authToken` cookie.
///
/// Public paths are the sign-in pages: reachable without a session, and
/// bounced to the dashboard with one. Ungated paths (marketing pages, assets,
/// API proxies) never reach the gate. Everything else requires the cookie.
#[derive(Debug, Clone)]
pub struct RouteGate {
    public_paths: Vec<String>,
    ungated_paths: Vec<String>,
    login_path: String,
    home_path: String,
}

impl Default for RouteGate {
    fn default() -> Self {
        Self {
            public_paths: ["/login", "/register", "/forgot-password"]
                .into_iter()
                .map(String::from)
                .collect(),
            ungated_paths: [
                "/blog",
                "/docs",
                "/privacy",
                "/terms",
                "/pricing",
                "/_next",
                "/api",
                "/favicon.ico",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            login_path: "/login".to_string(),
            home_path: "/dashboard".to_string(),
        }
    }
}

impl RouteGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_public(&self, path: &str) -> bool {
        self.public_paths
            .iter()
            .any(|public| matches_prefix(path, public))
    }

    pub fn is_ungated(&self, path: &str) -> bool {
        if path == "/" || has_file_extension(path) {
            return true;
        }
        self.ungated_paths
            .iter()
            .any(|ungated| matches_prefix(path, ungated))
    }

    pub fn evaluate(&self, path: &str, cookie_header: Option<&str>) -> RouteDecision {
        if self.is_ungated(path) {
            return RouteDecision::Pass;
        }
        let signed_in = cookie_header.and_then(session_cookie).is_some();
        let public = self.is_public(path);
        match (public, signed_in) {
            (false, false) => {
                let target: String = form_urlencoded::Serializer::new(String::new())
                    .append_pair("redirect", path)
                    .finish();
                RouteDecision::Redirect(format!("{}?{}", self.login_path, target))
            }
            (true, true) => RouteDecision::Redirect(self.home_path.clone()),
            _ => RouteDecision::Pass,
        }
    }
}

/// Non-empty `authToken` value from a `Cookie` header.
pub fn session_cookie(cookie_header: &str) -> Option<&str> {
    cookie_header
        .split(';')
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == AUTH_COOKIE_NAME)
        .map(|(_, value)| value.trim())
        .filter(|value| !value.is_empty())
}

fn matches_prefix(path: &str, prefix: &str) -> bool {
    path == prefix
        || path
            .strip_prefix(prefix)
            .map(|rest| rest.starts_with('/'))
            .unwrap_or(false)
}

fn has_file_extension(path: &str) -> bool {
    path.rsplit('/')
        .next()
        .map(|segment| segment.contains('.'))
        .unwrap_or(false)
}
