use std::collections::BTreeMap;
use std::net::IpAddr;

use crate::errors::ServiceError;

/// Incoming operation request, immutable once built from the transport request.
#[derive(Debug, Clone, Default)]
pub struct Request {
    cookies: BTreeMap<String, String>,
    path_parameters: BTreeMap<String, String>,
    query_parameters: BTreeMap<String, String>,
    headers: BTreeMap<String, String>,
    body: serde_json::Value,
    remote_ip: Option<IpAddr>,
}

impl Request {
    pub fn builder() -> RequestBuilder {
        RequestBuilder::default()
    }

    /// Reopen the request to adjust it before handing it on.
    pub fn into_builder(self) -> RequestBuilder {
        RequestBuilder { inner: self }
    }

    pub fn cookies(&self) -> &BTreeMap<String, String> {
        &self.cookies
    }

    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.cookies.get(name).map(String::as_str)
    }

    pub fn path_parameters(&self) -> &BTreeMap<String, String> {
        &self.path_parameters
    }

    pub fn path_parameter(&self, name: &str) -> Option<&str> {
        self.path_parameters.get(name).map(String::as_str)
    }

    pub fn query_parameters(&self) -> &BTreeMap<String, String> {
        &self.query_parameters
    }

    pub fn query_parameter(&self, name: &str) -> Option<&str> {
        self.query_parameters.get(name).map(String::as_str)
    }

    /// Header lookup; names are stored lower-cased.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    pub fn body(&self) -> &serde_json::Value {
        &self.body
    }

    pub fn remote_ip(&self) -> Option<IpAddr> {
        self.remote_ip
    }
}

#[derive(Debug, Default)]
pub struct RequestBuilder {
    inner: Request,
}

impl RequestBuilder {
    pub fn cookies(mut self, cookies: BTreeMap<String, String>) -> Self {
        self.inner.cookies = cookies;
        self
    }

    pub fn path_parameters(mut self, params: BTreeMap<String, String>) -> Self {
        self.inner.path_parameters = params;
        self
    }

    pub fn path_parameter(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.inner.path_parameters.insert(name.into(), value.into());
        self
    }

    pub fn query_parameters(mut self, params: BTreeMap<String, String>) -> Self {
        self.inner.query_parameters = params;
        self
    }

    pub fn header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.inner.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    pub fn without_header(mut self, name: &str) -> Self {
        self.inner.headers.remove(&name.to_ascii_lowercase());
        self
    }

    pub fn body(mut self, body: serde_json::Value) -> Self {
        self.inner.body = body;
        self
    }

    pub fn remote_ip(mut self, ip: Option<IpAddr>) -> Self {
        self.inner.remote_ip = ip;
        self
    }

    pub fn build(self) -> Request {
        self.inner
    }
}

/// Parse a `Cookie` header (`a=1; b=2`) into a flat map.
pub fn parse_cookie_header(value: &str) -> BTreeMap<String, String> {
    value
        .split(';')
        .filter_map(|pair| {
            let (name, value) = pair.trim().split_once('=')?;
            let name = name.trim();
            if name.is_empty() {
                return None;
            }
            Some((name.to_string(), value.trim().trim_matches('"').to_string()))
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq)]
pub enum ResponseBody {
    Empty,
    Json(serde_json::Value),
    Text(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseFile {
    pub name: String,
    pub content_type: String,
    pub content: Vec<u8>,
}

/// Outgoing response, populated by a handler and consumed once by the HTTP adapter.
#[derive(Debug)]
pub struct Response {
    status: Option<u16>,
    cookies: BTreeMap<String, String>,
    headers: Vec<(String, String)>,
    body: ResponseBody,
    files: Vec<ResponseFile>,
}

impl Default for Response {
    fn default() -> Self {
        Self::new()
    }
}

impl Response {
    pub fn new() -> Self {
        Self {
            status: None,
            cookies: BTreeMap::new(),
            headers: Vec::new(),
            body: ResponseBody::Empty,
            files: Vec::new(),
        }
    }

    pub fn status(&mut self, status: u16) -> &mut Self {
        self.status = Some(status);
        self
    }

    pub fn cookie(&mut self, name: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.cookies.insert(name.into(), value.into());
        self
    }

    pub fn header(&mut self, name: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn json(&mut self, body: serde_json::Value) -> &mut Self {
        self.body = ResponseBody::Json(body);
        self
    }

    pub fn text(&mut self, body: impl Into<String>) -> &mut Self {
        self.body = ResponseBody::Text(body.into());
        self
    }

    pub fn file(&mut self, file: ResponseFile) -> &mut Self {
        self.files.push(file);
        self
    }

    pub fn current_status(&self) -> Option<u16> {
        self.status
    }

    /// Consume the builder. A response needs a status in 100..=599 and carries
    /// either a body or a single file.
    pub fn finish(self) -> Result<ResponseParts, ServiceError> {
        let status = match self.status {
            Some(status) if (100..=599).contains(&status) => status,
            Some(status) => return Err(ServiceError::Response(format!("invalid status code {status}"))),
            None => return Err(ServiceError::Response("no status code set".to_string())),
        };

        let mut files = self.files;
        let file = match (files.len(), &self.body) {
            (0, _) => None,
            (1, ResponseBody::Empty) => files.pop(),
            (1, _) => {
                return Err(ServiceError::Response("response carries both a body and a file".to_string()));
            }
            (n, _) => return Err(ServiceError::Response(format!("response carries {n} files"))),
        };

        Ok(ResponseParts {
            status,
            cookies: self.cookies,
            headers: self.headers,
            body: self.body,
            file,
        })
    }
}

/// A validated response ready to be written to the transport.
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseParts {
    pub status: u16,
    pub cookies: BTreeMap<String, String>,
    pub headers: Vec<(String, String)>,
    pub body: ResponseBody,
    pub file: Option<ResponseFile>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_accessors() {
        let req = Request::builder()
            .path_parameter("name", "yp")
            .header("Authorization", "Basic abc")
            .cookies(parse_cookie_header("session=42; theme=\"dark\""))
            .body(json!({"k": 1}))
            .build();
        assert_eq!(req.path_parameter("name"), Some("yp"));
        assert_eq!(req.header("authorization"), Some("Basic abc"));
        assert_eq!(req.cookie("session"), Some("42"));
        assert_eq!(req.cookie("theme"), Some("dark"));
        assert_eq!(req.body()["k"], 1);
        assert!(req.remote_ip().is_none());
    }

    #[test]
    fn response_requires_status() {
        let err = Response::new().finish().unwrap_err();
        assert_eq!(err.code(), "RESPONSE_ERROR");

        let mut res = Response::new();
        res.status(1200);
        assert!(res.finish().is_err());
    }

    #[test]
    fn response_finishes_with_body_or_single_file() {
        let mut res = Response::new();
        res.status(200).json(json!({"ok": true})).cookie("a", "b");
        let parts = res.finish().unwrap();
        assert_eq!(parts.status, 200);
        assert_eq!(parts.body, ResponseBody::Json(json!({"ok": true})));
        assert_eq!(parts.cookies["a"], "b");

        let file = ResponseFile {
            name: "report.txt".into(),
            content_type: "text/plain".into(),
            content: b"hi".to_vec(),
        };
        let mut res = Response::new();
        res.status(200).file(file.clone());
        assert_eq!(res.finish().unwrap().file, Some(file.clone()));

        let mut res = Response::new();
        res.status(200).text("x").file(file);
        assert!(res.finish().is_err());
    }
}
