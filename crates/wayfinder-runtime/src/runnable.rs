use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};

use wayfinder_core::{OperationContext, Request, Response, ResponseParts, ServiceContext, ServiceError};

use crate::callable::CallableService;
use crate::directory_client::ServiceDirectoryClient;
use crate::identity::ServiceIdentity;
use crate::implementation::{Dependencies, Invocation, Operations, ServiceImplementation};

/// A locally hosted service: context, handlers, hooks and the callable
/// services it depends on.
pub struct RunnableService {
    context: Arc<ServiceContext>,
    implementation: Arc<dyn ServiceImplementation>,
    operations: Operations,
    /// Emptied by [`RunnableService::destroy`].
    dependencies: RwLock<Dependencies>,
}

impl RunnableService {
    /// Bind an implementation to its context and wire its dependencies.
    ///
    /// Every declared dependency is resolved here, through the directory
    /// when it is directory-located. Dependencies that cannot be parsed or
    /// resolved, and declared operations without a handler, are left out
    /// with a warning; the service is still created.
    pub async fn create(
        context: ServiceContext,
        implementation: Arc<dyn ServiceImplementation>,
        directory: Arc<ServiceDirectoryClient>,
    ) -> Arc<Self> {
        let service = context.identification();

        let mut dependencies = BTreeMap::new();
        for (name, dependency) in &context.dependencies {
            let remote = match ServiceContext::for_dependency(name, dependency) {
                Ok(remote) => remote,
                Err(e) => {
                    tracing::warn!(%service, dependency = %name, error = %e, "dependency omitted");
                    continue;
                }
            };
            let callable = CallableService::new(remote, directory.clone());
            if let Err(e) = callable.resolve().await {
                tracing::warn!(%service, dependency = %name, error = %e, "dependency omitted");
                continue;
            }
            dependencies.insert(name.clone(), Arc::new(callable));
        }

        let offered = implementation.clone().operations();
        let mut operations = Operations::new();
        for name in context.operations.keys() {
            match offered.get(name) {
                Some(handler) => {
                    operations = operations.with(name.clone(), move |invocation| handler(invocation));
                }
                None => tracing::warn!(%service, operation = %name, "no handler for declared operation, skipping"),
            }
        }
        for name in offered.names().filter(|n| !context.operations.contains_key(*n)) {
            tracing::debug!(%service, operation = %name, "handler for undeclared operation ignored");
        }

        implementation.on_create_service(&context).await;
        tracing::info!(%service, operations = context.operations.len(), "service created");

        Arc::new(Self {
            context: Arc::new(context),
            implementation,
            operations,
            dependencies: RwLock::new(Arc::new(dependencies)),
        })
    }

    pub fn dependency(&self, name: &str) -> Option<Arc<CallableService>> {
        self.dependencies().get(name).cloned()
    }

    /// Snapshot of the dependency map; empty once the service is destroyed.
    pub fn dependencies(&self) -> Dependencies {
        self.dependencies.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn has_operation(&self, name: &str) -> bool {
        self.operations.contains(name)
    }

    /// Declared operations that have a handler.
    pub fn deployed_operations(&self) -> impl Iterator<Item = (&str, &OperationContext)> {
        self.context
            .operations
            .iter()
            .filter(|(name, _)| self.operations.contains(name))
            .map(|(name, op)| (name.as_str(), op))
    }

    /// Run one operation through Start → Execute → Finish.
    ///
    /// The `Err` case carries the [`ServiceError::Response`] raised when the
    /// handler left the response unsendable; `on_finish_operation` has
    /// already seen it.
    pub async fn invoke(&self, operation: &str, request: Request) -> Result<ResponseParts, ServiceError> {
        let handler = self.operations.get(operation).ok_or_else(|| {
            ServiceError::Configuration(format!("{} has no operation '{operation}'", self.identification()))
        })?;

        self.implementation.on_start_operation(operation, &request).await;

        let response = handler(Invocation {
            operation: operation.to_string(),
            request,
            response: Response::new(),
            dependencies: self.dependencies(),
        })
        .await;

        let outcome = response.finish();
        match &outcome {
            Ok(_) => self.implementation.on_finish_operation(operation, None).await,
            Err(e) => {
                tracing::error!(service = %self.identification(), %operation, error = %e, "handler produced an unsendable response");
                self.implementation.on_finish_operation(operation, Some(e)).await;
            }
        }
        outcome
    }

    /// Run the destroy hook, then drop every dependency.
    pub async fn destroy(&self) {
        self.implementation.on_destroy_service().await;
        *self.dependencies.write().unwrap_or_else(PoisonError::into_inner) = Dependencies::default();
        tracing::info!(service = %self.identification(), "service destroyed");
    }
}

impl ServiceIdentity for RunnableService {
    fn context(&self) -> &ServiceContext {
        &self.context
    }
}
