//! Service implementations and the registry that maps service names to them.

use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use wayfinder_core::{Request, Response, ServiceContext, ServiceError};

use crate::callable::CallableService;

/// Dependencies of a running service, by declared name.
pub type Dependencies = Arc<BTreeMap<String, Arc<CallableService>>>;

/// Everything a handler receives for one call.
pub struct Invocation {
    pub operation: String,
    pub request: Request,
    /// Fresh response builder; the handler returns it once populated.
    pub response: Response,
    pub dependencies: Dependencies,
}

impl Invocation {
    pub fn dependency(&self, name: &str) -> Result<Arc<CallableService>, ServiceError> {
        self.dependencies
            .get(name)
            .cloned()
            .ok_or_else(|| ServiceError::Lookup(format!("dependency '{name}' is not available")))
    }
}

pub type OperationHandler = Arc<dyn Fn(Invocation) -> BoxFuture<'static, Response> + Send + Sync>;

/// Operation name → handler table exposed by an implementation.
#[derive(Clone, Default)]
pub struct Operations {
    handlers: BTreeMap<String, OperationHandler>,
}

impl Operations {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with<F, Fut>(mut self, name: impl Into<String>, handler: F) -> Self
    where
        F: Fn(Invocation) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Response> + Send + 'static,
    {
        let handler: OperationHandler =
            Arc::new(move |invocation| Box::pin(handler(invocation)) as BoxFuture<'static, Response>);
        self.handlers.insert(name.into(), handler);
        self
    }

    pub fn get(&self, name: &str) -> Option<OperationHandler> {
        self.handlers.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.handlers.keys().map(String::as_str)
    }
}

/// The code behind a service: its operation handlers and lifecycle hooks.
/// Every hook defaults to a no-op.
#[async_trait]
pub trait ServiceImplementation: Send + Sync + 'static {
    fn operations(self: Arc<Self>) -> Operations;

    async fn on_create_service(&self, _context: &ServiceContext) {}

    async fn on_start_operation(&self, _operation: &str, _request: &Request) {}

    /// `error` is set when the response could not be sent.
    async fn on_finish_operation(&self, _operation: &str, _error: Option<&ServiceError>) {}

    async fn on_destroy_service(&self) {}
}

pub type ImplementationFactory =
    Arc<dyn Fn(&ServiceContext) -> Result<Arc<dyn ServiceImplementation>, ServiceError> + Send + Sync>;

/// Lookup table from service name to implementation factory, filled at startup.
#[derive(Clone, Default)]
pub struct ImplementationRegistry {
    factories: HashMap<String, ImplementationFactory>,
}

impl ImplementationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&mut self, name: impl Into<String>, factory: F) -> &mut Self
    where
        F: Fn(&ServiceContext) -> Result<Arc<dyn ServiceImplementation>, ServiceError> + Send + Sync + 'static,
    {
        self.factories.insert(name.into(), Arc::new(factory));
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// `Ok(None)` when no implementation is registered under the context's name.
    pub fn instantiate(&self, context: &ServiceContext) -> Result<Option<Arc<dyn ServiceImplementation>>, ServiceError> {
        match self.factories.get(&context.name) {
            Some(factory) => factory(context).map(Some),
            None => Ok(None),
        }
    }
}
