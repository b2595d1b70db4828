//! Axum adapter: exposes every runnable service under `/<name>/v<api>/`.

use std::collections::{BTreeMap, HashMap};
use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{ConnectInfo, Path, Query};
use axum::http::header::{CONTENT_DISPOSITION, CONTENT_TYPE, COOKIE, SET_COOKIE};
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{MethodFilter, MethodRouter, get};
use axum::{Json, Router};
use serde_json::json;
use tower_http::trace::TraceLayer;
use wayfinder_core::message::parse_cookie_header;
use wayfinder_core::{HttpMethod, Request, ResponseBody, ResponseParts};

use crate::authorization::{AuthorizationChain, Principal};
use crate::credentials::CredentialStore;
use crate::identity::ServiceIdentity;
use crate::metrics;
use crate::runnable::RunnableService;

/// Header carrying the user id the authorization chain let through.
/// Any client-supplied value is overwritten.
pub const AUTHENTICATED_USER_HEADER: &str = "x-authenticated-user";

/// Handlers sharing one path, with the operations behind them.
struct PathRoutes {
    methods: MethodRouter,
    taken: Vec<HttpMethod>,
    operations: Vec<String>,
}

impl PathRoutes {
    fn new() -> Self {
        Self {
            methods: MethodRouter::new(),
            taken: Vec::new(),
            operations: Vec::new(),
        }
    }
}

/// Route every service root and deployed operation.
///
/// Paths the router would refuse (conflicting parameter names, malformed
/// patterns) are left out with a warning instead of failing the node.
pub fn build_router(services: &[Arc<RunnableService>], credentials: Arc<CredentialStore>) -> Router {
    let mut patterns = matchit::Router::new();
    let mut router = Router::new();
    for service in services {
        router = mount(router, &mut patterns, service.clone(), credentials.clone());
    }
    router.layer(TraceLayer::new_for_http())
}

fn mount(
    router: Router,
    patterns: &mut matchit::Router<()>,
    service: Arc<RunnableService>,
    credentials: Arc<CredentialStore>,
) -> Router {
    let base = service.context().base_path();
    let identification = service.identification();

    let root_handler = {
        let service = service.clone();
        move || {
            let service = service.clone();
            let credentials = credentials.clone();
            async move { root_document(&service, &credentials) }
        }
    };

    let mut routes: BTreeMap<String, PathRoutes> = BTreeMap::new();
    for path in [base.clone(), format!("{base}/")] {
        let mut root = PathRoutes::new();
        root.methods = get(root_handler.clone());
        root.taken.push(HttpMethod::Get);
        routes.insert(path, root);
    }

    for (operation, op) in service.deployed_operations() {
        let path = format!("{base}{}", op.path);
        let mut entry = routes.remove(&path).unwrap_or_else(PathRoutes::new);

        if entry.taken.contains(&op.http_method) {
            tracing::warn!(
                service = %identification,
                %operation,
                method = %op.http_method,
                path = %path,
                "route already taken, operation not exposed"
            );
            routes.insert(path, entry);
            continue;
        }

        let handler = {
            let service = service.clone();
            let operation = operation.to_string();
            move |params: Option<Path<HashMap<String, String>>>,
                  query: Option<Query<HashMap<String, String>>>,
                  remote: Option<ConnectInfo<SocketAddr>>,
                  headers: HeaderMap,
                  body: Bytes| {
                let service = service.clone();
                let operation = operation.clone();
                async move {
                    let request = into_request(
                        params.map(|Path(p)| p).unwrap_or_default(),
                        query.map(|Query(q)| q).unwrap_or_default(),
                        remote.map(|ConnectInfo(addr)| addr),
                        &headers,
                        &body,
                    );
                    dispatch(&service, &operation, request).await
                }
            }
        };

        entry.methods = entry.methods.on(method_filter(op.http_method), handler);
        entry.taken.push(op.http_method);
        entry.operations.push(operation.to_string());
        routes.insert(path, entry);
        tracing::debug!(service = %identification, %operation, method = %op.http_method, "operation deployed");
    }

    let mut router = router;
    for (path, entry) in routes {
        if let Err(e) = patterns.insert(path.as_str(), ()) {
            tracing::warn!(
                service = %identification,
                path = %path,
                operations = ?entry.operations,
                error = %e,
                "route rejected, not exposed"
            );
            continue;
        }
        router = router.route(&path, entry.methods);
    }
    router
}

fn root_document(service: &RunnableService, credentials: &CredentialStore) -> Response {
    let certificate = credentials.current().map(|c| c.certificate_pem().to_string());
    Json(json!({
        "info": service.context().descriptor(),
        "certificate": certificate,
    }))
    .into_response()
}

fn method_filter(method: HttpMethod) -> MethodFilter {
    match method {
        HttpMethod::Get => MethodFilter::GET,
        HttpMethod::Post => MethodFilter::POST,
        HttpMethod::Put => MethodFilter::PUT,
        HttpMethod::Patch => MethodFilter::PATCH,
        HttpMethod::Delete => MethodFilter::DELETE,
        HttpMethod::Head => MethodFilter::HEAD,
        HttpMethod::Options => MethodFilter::OPTIONS,
    }
}

fn into_request(
    params: HashMap<String, String>,
    query: HashMap<String, String>,
    remote: Option<SocketAddr>,
    headers: &HeaderMap,
    body: &Bytes,
) -> Request {
    let cookies = headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(parse_cookie_header)
        .collect();

    let body = if body.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(body)
            .unwrap_or_else(|_| serde_json::Value::String(String::from_utf8_lossy(body).into_owned()))
    };

    let mut builder = Request::builder()
        .cookies(cookies)
        .path_parameters(params.into_iter().collect())
        .query_parameters(query.into_iter().collect())
        .remote_ip(remote.map(|addr| addr.ip()))
        .body(body);
    for (name, value) in headers {
        if let Ok(value) = value.to_str() {
            builder = builder.header(name.as_str(), value);
        }
    }
    builder.build()
}

async fn dispatch(service: &RunnableService, operation: &str, request: Request) -> Response {
    let chain = AuthorizationChain::new(service, operation);
    let request = match chain.check(&request).await {
        Ok(Principal::User(user)) => with_header(request, AUTHENTICATED_USER_HEADER, &user),
        Ok(Principal::Anonymous) => strip_header(request, AUTHENTICATED_USER_HEADER),
        Err(e) => {
            tracing::info!(service = %service.identification(), %operation, error = %e, "request rejected");
            let parts = chain.rejection(&e);
            metrics::operation(&service.context().name, operation, parts.status);
            return into_response(parts);
        }
    };

    match service.invoke(operation, request).await {
        Ok(parts) => {
            metrics::operation(&service.context().name, operation, parts.status);
            into_response(parts)
        }
        Err(e) => {
            metrics::operation(&service.context().name, operation, 500);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "code": e.code(), "message": "internal server error" })),
            )
                .into_response()
        }
    }
}

fn with_header(request: Request, name: &str, value: &str) -> Request {
    request.into_builder().header(name, value).build()
}

fn strip_header(request: Request, name: &str) -> Request {
    request.into_builder().without_header(name).build()
}

/// Write validated response parts as an HTTP response.
pub fn into_response(parts: ResponseParts) -> Response {
    let status = StatusCode::from_u16(parts.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let mut headers = HeaderMap::new();

    for (name, value) in &parts.headers {
        match (HeaderName::try_from(name.as_str()), HeaderValue::try_from(value.as_str())) {
            (Ok(name), Ok(value)) => {
                headers.append(name, value);
            }
            _ => tracing::warn!(header = %name, "dropping invalid response header"),
        }
    }
    for (name, value) in &parts.cookies {
        if let Ok(cookie) = HeaderValue::try_from(format!("{name}={value}; Path=/")) {
            headers.append(SET_COOKIE, cookie);
        }
    }

    let body = match (parts.file, parts.body) {
        (Some(file), _) => {
            if let Ok(content_type) = HeaderValue::try_from(file.content_type.as_str()) {
                headers.insert(CONTENT_TYPE, content_type);
            }
            if let Ok(disposition) = HeaderValue::try_from(format!("attachment; filename=\"{}\"", file.name)) {
                headers.insert(CONTENT_DISPOSITION, disposition);
            }
            file.content
        }
        (None, ResponseBody::Json(value)) => {
            headers
                .entry(CONTENT_TYPE)
                .or_insert(HeaderValue::from_static("application/json"));
            serde_json::to_vec(&value).unwrap_or_default()
        }
        (None, ResponseBody::Text(text)) => {
            headers
                .entry(CONTENT_TYPE)
                .or_insert(HeaderValue::from_static("text/plain; charset=utf-8"));
            text.into_bytes()
        }
        (None, ResponseBody::Empty) => Vec::new(),
    };

    (status, headers, body).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use wayfinder_core::ResponseFile;

    #[tokio::test]
    async fn writes_cookies_headers_and_json() {
        let parts = ResponseParts {
            status: 201,
            cookies: [("session".to_string(), "abc".to_string())].into_iter().collect(),
            headers: vec![("X-Trace".into(), "1".into()), ("bad header".into(), "x".into())],
            body: ResponseBody::Json(json!({"ok": true})),
            file: None,
        };
        let response = into_response(parts);
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(response.headers()["x-trace"], "1");
        assert_eq!(response.headers()[SET_COOKIE], "session=abc; Path=/");
        assert_eq!(response.headers()[CONTENT_TYPE], "application/json");

        let body = hyper::body::to_bytes(response.into_body()).await.unwrap();
        assert_eq!(serde_json::from_slice::<serde_json::Value>(&body).unwrap(), json!({"ok": true}));
    }

    #[tokio::test]
    async fn writes_file_as_attachment() {
        let parts = ResponseParts {
            status: 200,
            cookies: Default::default(),
            headers: vec![],
            body: ResponseBody::Empty,
            file: Some(ResponseFile {
                name: "report.csv".into(),
                content_type: "text/csv".into(),
                content: b"a,b\n1,2\n".to_vec(),
            }),
        };
        let response = into_response(parts);
        assert_eq!(response.headers()[CONTENT_TYPE], "text/csv");
        assert_eq!(response.headers()[CONTENT_DISPOSITION], "attachment; filename=\"report.csv\"");
        let body = hyper::body::to_bytes(response.into_body()).await.unwrap();
        assert_eq!(&body[..], b"a,b\n1,2\n");
    }

    #[test]
    fn builds_request_from_parts() {
        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_static("a=1; b=2"));
        headers.insert("X-Custom", HeaderValue::from_static("yes"));
        let request = into_request(
            [("id".to_string(), "42".to_string())].into_iter().collect(),
            HashMap::new(),
            Some("10.0.0.7:5000".parse().unwrap()),
            &headers,
            &Bytes::from_static(b"plain text"),
        );
        assert_eq!(request.cookie("b"), Some("2"));
        assert_eq!(request.path_parameter("id"), Some("42"));
        assert_eq!(request.header("x-custom"), Some("yes"));
        assert_eq!(request.remote_ip().unwrap().to_string(), "10.0.0.7");
        assert_eq!(request.body(), &json!("plain text"));
    }

    #[test]
    fn replaces_forged_user_header() {
        let forged = Request::builder().header(AUTHENTICATED_USER_HEADER, "admin").build();
        assert_eq!(with_header(forged.clone(), AUTHENTICATED_USER_HEADER, "u-1").header(AUTHENTICATED_USER_HEADER), Some("u-1"));
        assert_eq!(strip_header(forged, AUTHENTICATED_USER_HEADER).header(AUTHENTICATED_USER_HEADER), None);
    }
}
