use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub const BASIC_SCHEME: &str = "basic";
pub const DEFAULT_AUTHENTICATION_DEPENDENCY: &str = "authentication";
pub const DEFAULT_AUTHORIZATION_DEPENDENCY: &str = "authorization";

/// Per-operation security declaration from a descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SecurityRequirement {
    pub scheme: String,
    /// Dependency name of the authentication service.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authentication: Option<String>,
    /// Dependency name of the authorization service.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authorization: Option<String>,
}

impl SecurityRequirement {
    pub fn basic() -> Self {
        Self {
            scheme: BASIC_SCHEME.to_string(),
            authentication: None,
            authorization: None,
        }
    }

    pub fn is_basic(&self) -> bool {
        self.scheme.eq_ignore_ascii_case(BASIC_SCHEME)
    }

    pub fn authentication_dependency(&self) -> &str {
        self.authentication.as_deref().unwrap_or(DEFAULT_AUTHENTICATION_DEPENDENCY)
    }

    pub fn authorization_dependency(&self) -> &str {
        self.authorization.as_deref().unwrap_or(DEFAULT_AUTHORIZATION_DEPENDENCY)
    }
}

/// Username and password carried by a `Basic` authorization header.
#[derive(Clone, PartialEq, Eq)]
pub struct BasicCredentials {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for BasicCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BasicCredentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl BasicCredentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Parse an `Authorization` header value. `None` when absent or malformed.
    pub fn from_header(value: &str) -> Option<Self> {
        let (scheme, token) = value.trim().split_once(' ')?;
        if !scheme.eq_ignore_ascii_case("basic") {
            return None;
        }
        let decoded = STANDARD.decode(token.trim()).ok()?;
        let decoded = String::from_utf8(decoded).ok()?;
        let (username, password) = decoded.split_once(':')?;
        if username.is_empty() {
            return None;
        }
        Some(Self::new(username, password))
    }

    pub fn to_header(&self) -> String {
        format!("Basic {}", STANDARD.encode(format!("{}:{}", self.username, self.password)))
    }
}

/// `WWW-Authenticate` challenge for an operation.
pub fn basic_challenge(service: &str, operation: &str) -> String {
    format!("Basic realm=\"{service}/{operation}\"")
}

/// Body sent to an authentication service.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AuthenticateRequest {
    pub username: String,
    pub password: String,
}

/// Body returned by an authentication service on success (201).
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AuthenticateResponse {
    pub id: String,
}

/// Body sent to an authorization service.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizeRequest {
    pub user_id: String,
    pub service: String,
    pub operation: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_basic_header() {
        let creds = BasicCredentials::new("alice", "s3:cret");
        let header = creds.to_header();
        assert_eq!(BasicCredentials::from_header(&header), Some(creds));
        assert_eq!(
            BasicCredentials::from_header("basic YWxpY2U6cHc="),
            Some(BasicCredentials::new("alice", "pw"))
        );
    }

    #[test]
    fn rejects_malformed_headers() {
        assert!(BasicCredentials::from_header("Bearer abc").is_none());
        assert!(BasicCredentials::from_header("Basic !!!").is_none());
        assert!(BasicCredentials::from_header("Basic").is_none());
        // "nocolon"
        assert!(BasicCredentials::from_header("Basic bm9jb2xvbg==").is_none());
    }

    #[test]
    fn challenge_names_service_and_operation() {
        assert_eq!(basic_challenge("users", "create"), "Basic realm=\"users/create\"");
    }

    #[test]
    fn security_dependency_defaults() {
        let sec = SecurityRequirement::basic();
        assert!(sec.is_basic());
        assert_eq!(sec.authentication_dependency(), "authentication");
        assert_eq!(sec.authorization_dependency(), "authorization");
    }
}
