//! A whole mesh on one in-process router: every transport call is routed back
//! into the same axum router instead of going over TLS.

use std::net::SocketAddr;
use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::http::{Request as HttpRequest, StatusCode, header};
use serde_json::{Value, json};
use tower::ServiceExt;
use wayfinder_core::{BasicCredentials, DirectoryAddress, ServiceError};
use wayfinder_runtime::http::build_router;
use wayfinder_runtime::loader::{DESCRIPTOR_FILE, load_services};
use wayfinder_runtime::{
    CredentialStore, Credentials, Invocation, Operations, RunnableService, ServiceDirectoryClient,
    ServiceIdentity, ServiceImplementation, Transport, TransportRequest, TransportResponse,
};
use wayfinder_services::register_builtins;

const NODE_PORT: u16 = 8443;

#[derive(Default)]
struct Loopback {
    router: Mutex<Option<Router>>,
}

impl Loopback {
    fn serve(&self, router: Router) {
        *self.router.lock().unwrap() = Some(router);
    }
}

#[async_trait]
impl Transport for Loopback {
    async fn send(&self, request: TransportRequest) -> Result<TransportResponse, ServiceError> {
        request.validate()?;
        let router = self
            .router
            .lock()
            .ok()
            .and_then(|router| router.clone())
            .ok_or_else(|| ServiceError::Transport("mesh not started".into()))?;

        let body = match &request.body {
            Some(body) => Body::from(body.to_string()),
            None => Body::empty(),
        };
        let mut builder = HttpRequest::builder().method(request.method.as_str()).uri(&request.path);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        let mut http = builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(body)
            .map_err(|e| ServiceError::Client(e.to_string()))?;
        http.extensions_mut()
            .insert(ConnectInfo(SocketAddr::from(([127, 0, 0, 1], 50000))));

        let response = router
            .oneshot(http)
            .await
            .map_err(|e| ServiceError::Transport(e.to_string()))?;
        let status = response.status();
        let cookies: Vec<String> = response
            .headers()
            .get_all(header::SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok().map(str::to_string))
            .collect();
        let bytes = hyper::body::to_bytes(response.into_body())
            .await
            .map_err(|e| ServiceError::Transport(e.to_string()))?;
        Ok(TransportResponse::from_raw(
            status.as_u16(),
            status.canonical_reason().unwrap_or_default(),
            cookies.iter().map(String::as_str),
            &bytes,
        ))
    }
}

struct Users;

impl ServiceImplementation for Users {
    fn operations(self: Arc<Self>) -> Operations {
        Operations::new().with("me", |mut inv: Invocation| async move {
            let user = inv.request.header("x-authenticated-user").unwrap_or_default().to_string();
            inv.response.status(200).json(json!({ "id": user }));
            inv.response
        })
    }
}

fn write(root: &Path, dir: &str, descriptor: Value) {
    let path = root.join(dir);
    std::fs::create_dir_all(&path).unwrap();
    std::fs::write(path.join(DESCRIPTOR_FILE), descriptor.to_string()).unwrap();
}

fn services_root() -> tempfile::TempDir {
    let root = tempfile::tempdir().unwrap();
    write(
        root.path(),
        "yp",
        json!({
            "info": {"name": "yp", "api": 1},
            "config": {"location": format!("https://127.0.0.1:{NODE_PORT}")},
            "operations": {
                "register": {"method": "POST", "path": "/register"},
                "lookup": {"method": "GET", "path": "/lookup/:name/:api"},
                "instances": {"method": "GET", "path": "/instances"}
            }
        }),
    );
    write(
        root.path(),
        "authentication",
        json!({
            "info": {"name": "authentication", "api": 1},
            "config": {
                "location": "directory",
                "settings": {"users": [
                    {"id": "u-alice", "username": "alice", "password": "wonderland"},
                    {"id": "u-bob", "username": "bob", "password": "builder"}
                ]}
            },
            "operations": {"authenticate": {"method": "POST", "path": "/authenticate"}}
        }),
    );
    write(
        root.path(),
        "authorization",
        json!({
            "info": {"name": "authorization", "api": 1},
            "config": {
                "location": "directory",
                "settings": {"grants": {"u-alice": {"users": ["me"]}}}
            },
            "operations": {"authorize": {"method": "POST", "path": "/authorize"}}
        }),
    );
    write(
        root.path(),
        "users",
        json!({
            "info": {"name": "users", "api": 1},
            "config": {
                "location": "directory",
                "dependencies": {
                    "authentication": {"api": 1, "location": "directory"},
                    "authorization": {"api": 1, "location": "directory"}
                }
            },
            "operations": {"me": {"method": "GET", "path": "/me", "security": {"scheme": "basic"}}}
        }),
    );
    root
}

struct Mesh {
    router: Router,
    services: Vec<Arc<RunnableService>>,
    _root: tempfile::TempDir,
}

async fn mesh() -> Mesh {
    let root = services_root();
    let loopback = Arc::new(Loopback::default());

    let mut registry = wayfinder_runtime::ImplementationRegistry::new();
    register_builtins(&mut registry, loopback.clone());
    registry.register("users", |_| Ok(Arc::new(Users) as Arc<dyn ServiceImplementation>));

    let directory = Arc::new(ServiceDirectoryClient::new(
        loopback.clone(),
        DirectoryAddress::new("127.0.0.1", NODE_PORT),
    ));
    let credentials = Arc::new(CredentialStore::new());
    credentials.install(Credentials::from_pem("KEY", "CERT")).unwrap();

    // Services without dependencies come up and register first, so the
    // others can resolve theirs when they are created.
    let (independent, dependent): (Vec<_>, Vec<_>) = load_services(root.path(), &registry)
        .unwrap()
        .into_iter()
        .partition(|loaded| loaded.context.dependencies.is_empty());

    let mut services = Vec::new();
    for loaded in independent {
        services.push(RunnableService::create(loaded.context, loaded.implementation, directory.clone()).await);
    }
    loopback.serve(build_router(&services, credentials.clone()));
    for service in &services {
        directory.register(service.context(), NODE_PORT).await;
    }

    let mut late = Vec::new();
    for loaded in dependent {
        late.push(RunnableService::create(loaded.context, loaded.implementation, directory.clone()).await);
    }
    services.extend(late.iter().cloned());
    let router = build_router(&services, credentials);
    loopback.serve(router.clone());
    for service in &late {
        directory.register(service.context(), NODE_PORT).await;
    }

    Mesh {
        router,
        services,
        _root: root,
    }
}

impl Mesh {

    async fn get(&self, uri: &str, authorization: Option<String>) -> (StatusCode, Value) {
        let mut builder = HttpRequest::builder().uri(uri);
        if let Some(value) = authorization {
            builder = builder.header(header::AUTHORIZATION, value);
        }
        let response = self
            .router
            .clone()
            .oneshot(builder.body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = hyper::body::to_bytes(response.into_body()).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }
}

#[tokio::test]
async fn registered_directory_is_found_on_its_port() {
    let mesh = mesh().await;
    let yp = mesh.services.iter().find(|s| s.context().name == "yp").unwrap();

    let register = json!({"info": {"name": "yp", "api": 1}, "port": 8443});
    let request = HttpRequest::builder()
        .method("POST")
        .uri("/yp/v1/register")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(register.to_string()))
        .map(|mut r| {
            r.extensions_mut().insert(ConnectInfo(SocketAddr::from(([10, 1, 2, 3], 40000))));
            r
        })
        .unwrap();
    let response = mesh.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    // The probe for 10.1.2.3 loops back to this router, whose yp root answers 200.
    let (status, body) = mesh.get("/yp/v1/lookup/yp/1", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"location": "10.1.2.3", "port": 8443}));
    assert_eq!(yp.identification(), "yp/v1");
}

#[tokio::test]
async fn unknown_service_lookup_is_404() {
    let mesh = mesh().await;
    let (status, body) = mesh.get("/yp/v1/lookup/ghost/1", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "LOOKUP_ERROR");
}

#[tokio::test]
async fn register_without_body_is_rejected() {
    let mesh = mesh().await;
    let request = HttpRequest::builder()
        .method("POST")
        .uri("/yp/v1/register")
        .body(Body::empty())
        .unwrap();
    let response = mesh.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn basic_chain_runs_against_builtin_services() {
    let mesh = mesh().await;
    let users = mesh.services.iter().find(|s| s.context().name == "users").unwrap();
    assert!(users.dependency("authentication").is_some());
    assert!(users.dependency("authorization").is_some());

    let (_, instances) = mesh.get("/yp/v1/instances", None).await;
    let names: Vec<_> = instances
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["info"]["name"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(names, vec!["authentication", "authorization", "users"]);

    let (status, _) = mesh.get("/users/v1/me", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let alice = BasicCredentials::new("alice", "wonderland").to_header();
    let (status, body) = mesh.get("/users/v1/me", Some(alice)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"id": "u-alice"}));

    let bob = BasicCredentials::new("bob", "builder").to_header();
    let (status, _) = mesh.get("/users/v1/me", Some(bob)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let intruder = BasicCredentials::new("alice", "guess").to_header();
    let (status, _) = mesh.get("/users/v1/me", Some(intruder)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}
