pub mod auth;
pub mod errors;
pub mod health;
pub mod instance;
pub mod message;
pub mod protocol;
pub mod registry;
pub mod service;
pub mod time;

pub use auth::{BasicCredentials, SecurityRequirement};
pub use errors::{ServiceError, ServiceResult};
pub use health::Liveness;
pub use instance::{RegisteredServiceEntry, ServiceInfo, identification};
pub use message::{Request, Response, ResponseBody, ResponseFile, ResponseParts};
pub use protocol::{DirectoryAddress, Location, LookupResponse, RegisterRequest};
pub use registry::DirectoryStore;
pub use service::{HttpMethod, OperationContext, ServiceContext, ServiceDescriptor};
