//! Basic-auth delegation in front of secured operations.
//!
//! The chain never judges credentials itself: it asks the service's
//! authentication dependency who the caller is, then asks the authorization
//! dependency whether that user may run the operation.

use serde_json::json;
use wayfinder_core::auth::{AuthenticateRequest, AuthenticateResponse, AuthorizeRequest, basic_challenge};
use wayfinder_core::{BasicCredentials, Request, ResponseBody, ResponseParts, SecurityRequirement, ServiceError};

use crate::callable::CallRequest;
use crate::identity::ServiceIdentity;
use crate::runnable::RunnableService;

/// Who the chain let through.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Principal {
    /// Operation is not secured by a scheme the chain knows.
    Anonymous,
    /// Authenticated and authorized user id.
    User(String),
}

impl Principal {
    pub fn user_id(&self) -> Option<&str> {
        match self {
            Principal::Anonymous => None,
            Principal::User(id) => Some(id),
        }
    }
}

pub struct AuthorizationChain<'a> {
    service: &'a RunnableService,
    operation: &'a str,
    security: Option<&'a SecurityRequirement>,
}

impl<'a> AuthorizationChain<'a> {
    pub fn new(service: &'a RunnableService, operation: &'a str) -> Self {
        let security = service
            .context()
            .operations
            .get(operation)
            .and_then(|op| op.security.as_ref());
        Self {
            service,
            operation,
            security,
        }
    }

    /// Run the chain for one request.
    ///
    /// `Authentication` and `Authorization` errors are the caller's fault
    /// (401/403); every other error means the chain itself could not reach a
    /// verdict.
    pub async fn check(&self, request: &Request) -> Result<Principal, ServiceError> {
        let Some(security) = self.security.filter(|s| s.is_basic()) else {
            return Ok(Principal::Anonymous);
        };

        let credentials = request
            .header("authorization")
            .and_then(BasicCredentials::from_header)
            .ok_or_else(|| ServiceError::Authentication("missing or malformed basic credentials".into()))?;

        let user_id = self.authenticate(security, credentials).await?;
        self.authorize(security, &user_id).await?;

        tracing::debug!(
            service = %self.service.identification(),
            operation = %self.operation,
            user = %user_id,
            "request authorized"
        );
        Ok(Principal::User(user_id))
    }

    async fn authenticate(
        &self,
        security: &SecurityRequirement,
        credentials: BasicCredentials,
    ) -> Result<String, ServiceError> {
        let name = security.authentication_dependency();
        let dependency = self
            .service
            .dependency(name)
            .ok_or_else(|| ServiceError::Configuration(format!("authentication dependency '{name}' is not wired")))?;

        let body = AuthenticateRequest {
            username: credentials.username,
            password: credentials.password,
        };
        let response = dependency
            .execute(CallRequest::post("/authenticate", json!(body)))
            .await?;

        match response.status {
            201 => serde_json::from_value::<AuthenticateResponse>(response.body)
                .map(|r| r.id)
                .map_err(|e| ServiceError::Transport(format!("authentication service answered without an id: {e}"))),
            status if status >= 500 => Err(ServiceError::Transport(format!(
                "authentication service failed with status {status}"
            ))),
            status => Err(ServiceError::Authentication(format!(
                "authentication service refused credentials ({status})"
            ))),
        }
    }

    async fn authorize(&self, security: &SecurityRequirement, user_id: &str) -> Result<(), ServiceError> {
        let name = security.authorization_dependency();
        let dependency = self
            .service
            .dependency(name)
            .ok_or_else(|| ServiceError::Configuration(format!("authorization dependency '{name}' is not wired")))?;

        let body = AuthorizeRequest {
            user_id: user_id.to_string(),
            service: self.service.context().name.clone(),
            operation: self.operation.to_string(),
        };
        let response = dependency.execute(CallRequest::post("/authorize", json!(body))).await?;

        match response.status {
            204 => Ok(()),
            status if status >= 500 => Err(ServiceError::Transport(format!(
                "authorization service failed with status {status}"
            ))),
            status => Err(ServiceError::Authorization(format!(
                "user '{user_id}' may not call {} ({status})",
                self.operation
            ))),
        }
    }

    /// The response sent instead of running the operation.
    pub fn rejection(&self, error: &ServiceError) -> ResponseParts {
        let status = match error {
            ServiceError::Authentication(_) | ServiceError::Authorization(_) => error.http_status(),
            _ => 500,
        };
        let mut headers = Vec::new();
        if status == 401 {
            headers.push((
                "WWW-Authenticate".to_string(),
                basic_challenge(&self.service.context().name, self.operation),
            ));
        }
        let message = match error {
            ServiceError::Authentication(_) => "authentication required".to_string(),
            ServiceError::Authorization(_) => "forbidden".to_string(),
            other => other.to_string(),
        };
        ResponseParts {
            status,
            cookies: Default::default(),
            headers,
            body: ResponseBody::Json(json!({ "code": error.code(), "message": message })),
            file: None,
        }
    }
}
