//! Hosting, discovery and invocation of Wayfinder services.

pub mod authorization;
pub mod callable;
pub mod config;
pub mod credentials;
pub mod directory_client;
pub mod http;
pub mod identity;
pub mod implementation;
pub mod loader;
pub mod logging;
pub mod metrics;
pub mod orchestrator;
pub mod runnable;
pub mod tls;
pub mod transport;

pub use authorization::{AuthorizationChain, Principal};
pub use callable::{CallRequest, CallableService};
pub use config::{LoggingConfig, NodeConfig};
pub use credentials::{CredentialStore, Credentials};
pub use directory_client::ServiceDirectoryClient;
pub use identity::ServiceIdentity;
pub use implementation::{ImplementationRegistry, Invocation, Operations, ServiceImplementation};
pub use orchestrator::{RunningNode, ServiceOrchestrator};
pub use runnable::RunnableService;
pub use transport::{Endpoint, HttpsTransport, Transport, TransportRequest, TransportResponse};
