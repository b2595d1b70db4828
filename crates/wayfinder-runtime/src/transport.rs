use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::OnceCell;
use wayfinder_core::ServiceError;
use wayfinder_core::message::parse_cookie_header;

use crate::credentials::{CredentialStore, Credentials};

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Network endpoint of a service instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self { host: host.into(), port }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

/// Outbound HTTPS request.
#[derive(Debug, Clone, PartialEq)]
pub struct TransportRequest {
    pub host: String,
    pub port: u16,
    pub path: String,
    pub method: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<serde_json::Value>,
}

impl TransportRequest {
    pub fn new(method: impl Into<String>, endpoint: &Endpoint, path: impl Into<String>) -> Self {
        Self {
            host: endpoint.host.clone(),
            port: endpoint.port,
            path: path.into(),
            method: method.into(),
            headers: Vec::new(),
            body: None,
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn json(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn endpoint(&self) -> Endpoint {
        Endpoint::new(self.host.clone(), self.port)
    }

    /// Shape checks done before any network activity.
    pub fn validate(&self) -> Result<(), ServiceError> {
        if self.host.trim().is_empty() {
            return Err(ServiceError::Client("request has no host".to_string()));
        }
        if !self.path.starts_with('/') {
            return Err(ServiceError::Client(format!("request path '{}' is not absolute", self.path)));
        }
        let token = !self.method.is_empty()
            && self
                .method
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b"!#$%&'*+-.^_`|~".contains(&b));
        if !token {
            return Err(ServiceError::Client(format!("invalid request method '{}'", self.method)));
        }
        Ok(())
    }
}

/// Normalized view of a remote response.
#[derive(Debug, Clone, PartialEq)]
pub struct TransportResponse {
    pub status: u16,
    pub status_text: String,
    pub cookies: BTreeMap<String, String>,
    /// JSON-decoded body; the raw text when decoding fails, `null` when empty.
    pub body: serde_json::Value,
}

impl TransportResponse {
    pub fn new(status: u16, body: serde_json::Value) -> Self {
        Self {
            status,
            status_text: String::new(),
            cookies: BTreeMap::new(),
            body,
        }
    }

    /// Build from raw parts; `set_cookies` are the `set-cookie` header values.
    pub fn from_raw<'a>(
        status: u16,
        status_text: impl Into<String>,
        set_cookies: impl IntoIterator<Item = &'a str>,
        body: &[u8],
    ) -> Self {
        let mut cookies = BTreeMap::new();
        for header in set_cookies {
            // Attributes follow the first `;`.
            let pair = header.split(';').next().unwrap_or_default();
            cookies.extend(parse_cookie_header(pair));
        }

        Self {
            status,
            status_text: status_text.into(),
            cookies,
            body: decode_body(body),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

fn decode_body(body: &[u8]) -> serde_json::Value {
    if body.iter().all(u8::is_ascii_whitespace) {
        return serde_json::Value::Null;
    }
    serde_json::from_slice(body)
        .unwrap_or_else(|_| serde_json::Value::String(String::from_utf8_lossy(body).into_owned()))
}

/// Sends one request; no retries.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: TransportRequest) -> Result<TransportResponse, ServiceError>;
}

/// Mutually authenticated HTTPS transport using the node credentials.
///
/// The server certificate and host name are not verified, so self-signed
/// peers and local deployments work.
pub struct HttpsTransport {
    credentials: Arc<CredentialStore>,
    timeout: Duration,
    client: OnceCell<reqwest::Client>,
}

impl HttpsTransport {
    pub fn new(credentials: Arc<CredentialStore>) -> Self {
        Self {
            credentials,
            timeout: DEFAULT_REQUEST_TIMEOUT,
            client: OnceCell::new(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn client(&self) -> Result<&reqwest::Client, ServiceError> {
        self.client
            .get_or_try_init(|| async {
                let credentials = self.credentials.ready().await?;
                build_client(&credentials, self.timeout)
            })
            .await
    }
}

fn build_client(credentials: &Credentials, timeout: Duration) -> Result<reqwest::Client, ServiceError> {
    let identity = reqwest::Identity::from_pem(&credentials.identity_pem())
        .map_err(|e| ServiceError::Credentials(format!("invalid client identity: {e}")))?;
    reqwest::Client::builder()
        .use_rustls_tls()
        .identity(identity)
        .danger_accept_invalid_certs(true)
        .timeout(timeout)
        .build()
        .map_err(|e| ServiceError::Transport(format!("failed to build client: {e}")))
}

#[async_trait]
impl Transport for HttpsTransport {
    async fn send(&self, request: TransportRequest) -> Result<TransportResponse, ServiceError> {
        request.validate()?;
        let method = reqwest::Method::from_bytes(request.method.to_ascii_uppercase().as_bytes())
            .map_err(|e| ServiceError::Client(format!("invalid request method: {e}")))?;
        let client = self.client().await?;

        let url = format!("https://{}{}", request.endpoint(), request.path);
        tracing::debug!(%method, %url, "sending request");

        let mut builder = client.request(method, &url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| ServiceError::Transport(format!("{url}: {e}")))?;

        let status = response.status();
        let cookie_headers: Vec<String> = response
            .headers()
            .get_all(reqwest::header::SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok().map(str::to_string))
            .collect();
        let body = response
            .bytes()
            .await
            .map_err(|e| ServiceError::Transport(format!("{url}: {e}")))?;

        Ok(TransportResponse::from_raw(
            status.as_u16(),
            status.canonical_reason().unwrap_or_default(),
            cookie_headers.iter().map(String::as_str),
            &body,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn validates_before_sending() {
        let ep = Endpoint::new("localhost", 8443);
        assert!(TransportRequest::new("GET", &ep, "/yp/v1/").validate().is_ok());

        let err = TransportRequest::new("GET", &Endpoint::new("", 1), "/").validate().unwrap_err();
        assert_eq!(err.code(), "CLIENT_ERROR");
        assert!(TransportRequest::new("GET", &ep, "relative").validate().is_err());
        assert!(TransportRequest::new("BAD METHOD", &ep, "/").validate().is_err());
        assert!(TransportRequest::new("", &ep, "/").validate().is_err());
    }

    #[test]
    fn normalizes_json_text_and_empty_bodies() {
        let res = TransportResponse::from_raw(200, "OK", [], br#"{"location":"h","port":1}"#);
        assert_eq!(res.body, json!({"location": "h", "port": 1}));
        assert!(res.is_success());

        let res = TransportResponse::from_raw(500, "Internal Server Error", [], b"boom");
        assert_eq!(res.body, json!("boom"));

        let res = TransportResponse::from_raw(204, "No Content", [], b"");
        assert_eq!(res.body, serde_json::Value::Null);
    }

    #[test]
    fn parses_cookie_headers() {
        let res = TransportResponse::from_raw(
            200,
            "OK",
            ["session=abc; Path=/; HttpOnly", "theme=dark"],
            b"",
        );
        assert_eq!(res.cookies.get("session").map(String::as_str), Some("abc"));
        assert_eq!(res.cookies.get("theme").map(String::as_str), Some("dark"));
        assert_eq!(res.cookies.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn nothing_is_sent_before_credentials_exist() {
        let transport = HttpsTransport::new(Arc::new(CredentialStore::new()));
        let request = TransportRequest::new("GET", &Endpoint::new("127.0.0.1", 9), "/yp/v1/");

        let pending = tokio::time::timeout(Duration::from_secs(60), transport.send(request)).await;
        assert!(pending.is_err(), "send must wait for the credential store");
        assert!(transport.client.get().is_none());
    }

    #[tokio::test]
    async fn invalid_requests_fail_without_credentials() {
        let transport = HttpsTransport::new(Arc::new(CredentialStore::new()));
        let err = transport
            .send(TransportRequest::new("GET", &Endpoint::new("h", 1), "no-slash"))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "CLIENT_ERROR");
    }

    #[test]
    fn endpoint_brackets_ipv6() {
        assert_eq!(Endpoint::new("::1", 443).to_string(), "[::1]:443");
        assert_eq!(Endpoint::new("host", 443).to_string(), "host:443");
    }
}
