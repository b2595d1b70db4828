//! Services every Wayfinder node can host out of the box.

pub mod api_doc;
pub mod authentication;
pub mod authorization;
pub mod directory;

use std::sync::Arc;

use wayfinder_core::DirectoryStore;
use wayfinder_core::auth::{DEFAULT_AUTHENTICATION_DEPENDENCY, DEFAULT_AUTHORIZATION_DEPENDENCY};
use wayfinder_core::protocol::DIRECTORY_SERVICE_NAME;
use wayfinder_runtime::{ImplementationRegistry, ServiceImplementation, Transport};

pub use api_doc::DirectoryApiDoc;
pub use authentication::AuthenticationService;
pub use authorization::AuthorizationService;
pub use directory::{DirectoryService, InMemoryDirectory, LivenessProbe, TransportProbe};

/// Registry with the directory, authentication and authorization services.
///
/// `transport` is used by the directory to probe registered instances.
pub fn builtin_registry(transport: Arc<dyn Transport>) -> ImplementationRegistry {
    let mut registry = ImplementationRegistry::new();
    register_builtins(&mut registry, transport);
    registry
}

/// Add the built-in services to an existing registry.
pub fn register_builtins(registry: &mut ImplementationRegistry, transport: Arc<dyn Transport>) {
    registry
        .register(DIRECTORY_SERVICE_NAME, move |_context| {
            let store: Arc<dyn DirectoryStore> =
                Arc::new(InMemoryDirectory::new(Arc::new(TransportProbe::new(transport.clone()))));
            Ok(Arc::new(DirectoryService::new(store)) as Arc<dyn ServiceImplementation>)
        })
        .register(DEFAULT_AUTHENTICATION_DEPENDENCY, |context| {
            Ok(Arc::new(AuthenticationService::from_context(context)?) as Arc<dyn ServiceImplementation>)
        })
        .register(DEFAULT_AUTHORIZATION_DEPENDENCY, |context| {
            Ok(Arc::new(AuthorizationService::from_context(context)?) as Arc<dyn ServiceImplementation>)
        });
}
