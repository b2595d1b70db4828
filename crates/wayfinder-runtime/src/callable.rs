use std::sync::Arc;

use tokio::sync::Mutex;
use wayfinder_core::{HttpMethod, ServiceContext, ServiceError};

use crate::directory_client::ServiceDirectoryClient;
use crate::identity::ServiceIdentity;
use crate::transport::{Endpoint, TransportRequest, TransportResponse};

/// A call to one of a remote service's operations.
#[derive(Debug, Clone, PartialEq)]
pub struct CallRequest {
    pub method: HttpMethod,
    /// Path relative to the remote service root, e.g. `/users/42`.
    pub path: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<serde_json::Value>,
}

impl CallRequest {
    pub fn new(method: HttpMethod, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            headers: Vec::new(),
            body: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Get, path)
    }

    pub fn post(path: impl Into<String>, body: serde_json::Value) -> Self {
        Self::new(HttpMethod::Post, path).json(body)
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn json(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }
}

/// Proxy for a remote service. The endpoint is looked up on first use and
/// memoized until [`CallableService::invalidate`].
pub struct CallableService {
    context: ServiceContext,
    directory: Arc<ServiceDirectoryClient>,
    endpoint: Mutex<Option<Endpoint>>,
}

impl CallableService {
    pub fn new(context: ServiceContext, directory: Arc<ServiceDirectoryClient>) -> Self {
        Self {
            context,
            directory,
            endpoint: Mutex::new(None),
        }
    }

    /// Resolve (or return the memoized) endpoint.
    pub async fn resolve(&self) -> Result<Endpoint, ServiceError> {
        let mut slot = self.endpoint.lock().await;
        if let Some(endpoint) = slot.as_ref() {
            return Ok(endpoint.clone());
        }
        let endpoint = self.directory.lookup(&self.context).await?;
        *slot = Some(endpoint.clone());
        Ok(endpoint)
    }

    pub async fn endpoint(&self) -> Option<Endpoint> {
        self.endpoint.lock().await.clone()
    }

    /// Forget the resolved endpoint; the next call looks it up again.
    pub async fn invalidate(&self) {
        self.endpoint.lock().await.take();
    }

    /// Invoke an operation on the remote service. Never sends anything when
    /// the endpoint cannot be resolved.
    pub async fn execute(&self, call: CallRequest) -> Result<TransportResponse, ServiceError> {
        let endpoint = self.resolve().await?;
        let mut request = TransportRequest::new(
            call.method.as_str(),
            &endpoint,
            format!("{}{}", self.context.base_path(), call.path),
        );
        request.headers = call.headers;
        request.body = call.body;

        tracing::debug!(
            service = %self.context.identification(),
            endpoint = %endpoint,
            path = %request.path,
            "calling remote operation"
        );
        self.directory.transport().send(request).await
    }

    /// Fetch the remote service's root document (descriptor and certificate).
    pub async fn info(&self) -> Result<serde_json::Value, ServiceError> {
        let response = self.execute(CallRequest::get("/")).await?;
        if response.status != 200 {
            return Err(ServiceError::Transport(format!(
                "{} answered {} to an info request",
                self.context.identification(),
                response.status
            )));
        }
        Ok(response.body)
    }
}

impl ServiceIdentity for CallableService {
    fn context(&self) -> &ServiceContext {
        &self.context
    }
}
