use utoipa::OpenApi;
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use wayfinder_core::auth::{AuthenticateRequest, AuthenticateResponse, AuthorizeRequest};
use wayfinder_core::{LookupResponse, RegisterRequest, RegisteredServiceEntry, ServiceInfo};

/// OpenAPI document of the directory protocol and the basic-auth exchange.
#[derive(OpenApi)]
#[openapi(
    paths(
        crate::directory::service::register,
        crate::directory::service::lookup,
        crate::directory::service::instances
    ),
    components(schemas(
        RegisterRequest,
        LookupResponse,
        ServiceInfo,
        RegisteredServiceEntry,
        AuthenticateRequest,
        AuthenticateResponse,
        AuthorizeRequest
    )),
    modifiers(&BasicAuthAddon)
)]
pub struct DirectoryApiDoc;

struct BasicAuthAddon;

impl utoipa::Modify for BasicAuthAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "basic",
                SecurityScheme::Http(HttpBuilder::new().scheme(HttpAuthScheme::Basic).build()),
            )
        }
    }
}
