//! Upgrade request checks: path, origin policy and display name.

use percent_encoding::percent_decode_str;
use quiver_protocol::constants::{DEFAULT_USERNAME, MAX_USERNAME_LEN};
use serde::{Deserialize, Serialize};
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request};
use tokio_tungstenite::tungstenite::http::{StatusCode, header};

/// Which browser origins may open a connection.
///
/// Requests without an `Origin` header (non-browser clients) pass every
/// policy; the header only exists to stop cross-site pages.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "kebab-case")]
pub enum OriginPolicy {
    /// Accept any origin.
    Any,
    /// The origin's host must match the request's `Host` header.
    #[default]
    SameHost,
    /// The origin must be one of the listed values, e.g. `https://chat.example.com`.
    AllowList { origins: Vec<String> },
}

impl OriginPolicy {
    /// Returns `true` if a request carrying `origin` (and `host`) may upgrade.
    pub fn allows(&self, origin: Option<&str>, host: Option<&str>) -> bool {
        let Some(origin) = origin else {
            return true;
        };
        match self {
            OriginPolicy::Any => true,
            OriginPolicy::SameHost => match (origin_host(origin), host) {
                (Some(o), Some(h)) => o.eq_ignore_ascii_case(h),
                _ => false,
            },
            OriginPolicy::AllowList { origins } => {
                let origin = origin.trim_end_matches('/');
                origins
                    .iter()
                    .any(|allowed| allowed.trim_end_matches('/').eq_ignore_ascii_case(origin))
            }
        }
    }
}

/// Host part (`host[:port]`) of an origin like `https://host:port`.
fn origin_host(origin: &str) -> Option<&str> {
    let (_, rest) = origin.split_once("://")?;
    let host = rest.split('/').next().unwrap_or(rest);
    (!host.is_empty()).then_some(host)
}

/// Why an upgrade request was refused.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Rejection {
    #[error("no WebSocket endpoint at {0}")]
    NotFound(String),

    #[error("origin {0} not allowed")]
    ForbiddenOrigin(String),
}

impl Rejection {
    /// HTTP response sent instead of the upgrade.
    pub fn into_response(self) -> ErrorResponse {
        let status = match self {
            Rejection::NotFound(_) => StatusCode::NOT_FOUND,
            Rejection::ForbiddenOrigin(_) => StatusCode::FORBIDDEN,
        };
        let mut response = ErrorResponse::new(Some(self.to_string()));
        *response.status_mut() = status;
        response
    }
}

/// Validates an upgrade request and returns the client's display name.
pub fn check_request(req: &Request, path: &str, origin: &OriginPolicy) -> Result<String, Rejection> {
    let uri = req.uri();
    if uri.path() != path {
        return Err(Rejection::NotFound(uri.path().to_string()));
    }

    let headers = req.headers();
    let origin_header = headers.get(header::ORIGIN).and_then(|v| v.to_str().ok());
    let host_header = headers.get(header::HOST).and_then(|v| v.to_str().ok());
    if !origin.allows(origin_header, host_header) {
        return Err(Rejection::ForbiddenOrigin(
            origin_header.unwrap_or_default().to_string(),
        ));
    }

    Ok(username_from_query(uri.query()))
}

/// Extracts the `username` query parameter.
///
/// Form-decoded (`+` is a space), trimmed, and cut to
/// [`MAX_USERNAME_LEN`] characters. Missing or blank names become
/// [`DEFAULT_USERNAME`]. The first occurrence wins.
pub fn username_from_query(query: Option<&str>) -> String {
    let raw = query.into_iter().flat_map(|q| q.split('&')).find_map(|pair| {
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        (form_decode(key) == "username").then(|| form_decode(value))
    });

    match raw {
        Some(name) if !name.trim().is_empty() => {
            name.trim().chars().take(MAX_USERNAME_LEN).collect()
        }
        _ => DEFAULT_USERNAME.to_string(),
    }
}

fn form_decode(s: &str) -> String {
    let spaced = s.replace('+', " ");
    percent_decode_str(&spaced).decode_utf8_lossy().into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_err, assert_ok};

    fn request(uri: &str, origin: Option<&str>, host: &str) -> Request {
        let mut builder = Request::builder().uri(uri).header(header::HOST, host);
        if let Some(o) = origin {
            builder = builder.header(header::ORIGIN, o);
        }
        builder.body(()).unwrap()
    }

    #[test]
    fn username_defaults_when_absent_or_blank() {
        assert_eq!(username_from_query(None), "Anonymous");
        assert_eq!(username_from_query(Some("")), "Anonymous");
        assert_eq!(username_from_query(Some("username=")), "Anonymous");
        assert_eq!(username_from_query(Some("username=%20%20")), "Anonymous");
        assert_eq!(username_from_query(Some("other=x")), "Anonymous");
    }

    #[test]
    fn username_is_form_decoded() {
        assert_eq!(username_from_query(Some("username=Alice")), "Alice");
        assert_eq!(username_from_query(Some("username=Jos%C3%A9")), "José");
        assert_eq!(username_from_query(Some("username=Mary+Ann")), "Mary Ann");
        assert_eq!(username_from_query(Some("x=1&username=Bob&username=Eve")), "Bob");
    }

    #[test]
    fn username_is_truncated() {
        let long = "a".repeat(MAX_USERNAME_LEN + 10);
        let name = username_from_query(Some(&format!("username={long}")));
        assert_eq!(name.chars().count(), MAX_USERNAME_LEN);
    }

    #[test]
    fn same_host_policy() {
        let policy = OriginPolicy::SameHost;
        assert!(policy.allows(None, Some("chat.local:8080")));
        assert!(policy.allows(Some("http://chat.local:8080"), Some("chat.local:8080")));
        assert!(policy.allows(Some("https://CHAT.local:8080/"), Some("chat.local:8080")));
        assert!(!policy.allows(Some("http://evil.example"), Some("chat.local:8080")));
        assert!(!policy.allows(Some("null"), Some("chat.local:8080")));
        assert!(!policy.allows(Some("http://chat.local:8080"), None));
    }

    #[test]
    fn allow_list_policy() {
        let policy = OriginPolicy::AllowList {
            origins: vec!["https://chat.example.com/".into()],
        };
        assert!(policy.allows(Some("https://chat.example.com"), None));
        assert!(!policy.allows(Some("https://other.example.com"), None));
        assert!(policy.allows(None, None));
    }

    #[test]
    fn any_policy_accepts_everything() {
        assert!(OriginPolicy::Any.allows(Some("http://evil.example"), Some("chat.local")));
    }

    #[test]
    fn check_request_extracts_username() {
        let req = request("/ws?username=Alice", Some("http://localhost:8080"), "localhost:8080");
        let name = assert_ok!(check_request(&req, "/ws", &OriginPolicy::SameHost));
        assert_eq!(name, "Alice");
    }

    #[test]
    fn check_request_rejects_wrong_path() {
        let req = request("/index.html", None, "localhost");
        let err = assert_err!(check_request(&req, "/ws", &OriginPolicy::Any));
        assert_eq!(err, Rejection::NotFound("/index.html".into()));
        assert_eq!(err.into_response().status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn check_request_rejects_foreign_origin() {
        let req = request("/ws", Some("http://evil.example"), "localhost:8080");
        let err = assert_err!(check_request(&req, "/ws", &OriginPolicy::SameHost));
        assert!(matches!(err, Rejection::ForbiddenOrigin(_)));
        assert_eq!(err.into_response().status(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn origin_policy_from_toml_shape() {
        let policy: OriginPolicy = serde_json::from_value(serde_json::json!({
            "mode": "allow-list",
            "origins": ["https://a.example"],
        }))
        .unwrap();
        assert_eq!(
            policy,
            OriginPolicy::AllowList {
                origins: vec!["https://a.example".into()]
            }
        );
        let policy: OriginPolicy =
            serde_json::from_value(serde_json::json!({"mode": "same-host"})).unwrap();
        assert_eq!(policy, OriginPolicy::SameHost);
    }
}
