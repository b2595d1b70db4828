use std::sync::Arc;

use serde_json::json;
use wayfinder_core::time::{Clock, SystemClock};
use wayfinder_core::{DirectoryStore, LookupResponse, RegisterRequest, RegisteredServiceEntry, Response};
use wayfinder_runtime::{Invocation, Operations, ServiceImplementation};

/// The `yp` service: registration, lookup and listing over a [`DirectoryStore`].
pub struct DirectoryService {
    store: Arc<dyn DirectoryStore>,
    clock: Arc<dyn Clock>,
}

impl DirectoryService {
    pub fn new(store: Arc<dyn DirectoryStore>) -> Self {
        Self {
            store,
            clock: Arc::new(SystemClock),
        }
    }

    /// Stamp registrations with `clock` instead of the system time.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }
}

impl ServiceImplementation for DirectoryService {
    fn operations(self: Arc<Self>) -> Operations {
        let (register_store, lookup_store, list_store) = (self.store.clone(), self.store.clone(), self.store.clone());
        let clock = self.clock.clone();
        Operations::new()
            .with("register", move |inv| register(register_store.clone(), clock.clone(), inv))
            .with("lookup", move |inv| lookup(lookup_store.clone(), inv))
            .with("instances", move |inv| instances(list_store.clone(), inv))
    }
}

fn bad_request(mut response: Response, message: String) -> Response {
    response.status(400).json(json!({ "code": "CLIENT_ERROR", "message": message }));
    response
}

#[utoipa::path(
    post,
    path = "/yp/v1/register",
    request_body = RegisterRequest,
    responses(
        (status = 204, description = "Instance added to the rotation"),
        (status = 400, description = "Malformed registration")
    )
)]
pub(crate) async fn register(store: Arc<dyn DirectoryStore>, clock: Arc<dyn Clock>, inv: Invocation) -> Response {
    let Invocation { request, response, .. } = inv;

    let registration: RegisterRequest = match serde_json::from_value(request.body().clone()) {
        Ok(registration) => registration,
        Err(e) => return bad_request(response, format!("invalid registration: {e}")),
    };
    let Some(host) = request.remote_ip() else {
        return bad_request(response, "caller address unknown".to_string());
    };

    store
        .register(RegisteredServiceEntry::new(
            registration.info,
            host.to_canonical().to_string(),
            registration.port,
            clock.now_millis(),
        ))
        .await;

    let mut response = response;
    response.status(204);
    response
}

#[utoipa::path(
    get,
    path = "/yp/v1/lookup/{name}/{api}",
    params(
        ("name" = String, Path, description = "Service name"),
        ("api" = u32, Path, description = "API version")
    ),
    responses(
        (status = 200, description = "Next live instance", body = LookupResponse),
        (status = 404, description = "No live instance")
    )
)]
pub(crate) async fn lookup(store: Arc<dyn DirectoryStore>, inv: Invocation) -> Response {
    let Invocation { request, mut response, .. } = inv;

    let name = request.path_parameter("name").unwrap_or_default().to_string();
    let Some(api) = request.path_parameter("api").and_then(|a| a.parse::<u32>().ok()) else {
        return bad_request(response, "api version must be a positive integer".to_string());
    };

    match store.lookup(&name, api).await {
        Some(entry) => {
            let body = LookupResponse { location: entry.host, port: entry.port };
            response.status(200).json(json!(body));
        }
        None => {
            response
                .status(404)
                .json(json!({ "code": "LOOKUP_ERROR", "message": format!("no live instance of {name}/v{api}") }));
        }
    }
    response
}

#[utoipa::path(
    get,
    path = "/yp/v1/instances",
    responses((status = 200, description = "Every registered instance", body = Vec<RegisteredServiceEntry>))
)]
pub(crate) async fn instances(store: Arc<dyn DirectoryStore>, inv: Invocation) -> Response {
    let mut response = inv.response;
    response.status(200).json(json!(store.instances().await));
    response
}
