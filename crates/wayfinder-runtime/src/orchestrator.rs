//! Node startup and shutdown.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum_server::Handle;
use axum_server::tls_rustls::RustlsConfig;
use tokio::task::JoinHandle;
use wayfinder_core::ServiceError;

use crate::config::NodeConfig;
use crate::credentials::{CredentialStore, Credentials};
use crate::directory_client::ServiceDirectoryClient;
use crate::http::build_router;
use crate::identity::ServiceIdentity;
use crate::implementation::ImplementationRegistry;
use crate::loader::load_services;
use crate::runnable::RunnableService;
use crate::tls::server_config;
use crate::transport::{HttpsTransport, Transport};

pub const READINESS_POLL_INTERVAL: Duration = Duration::from_secs(1);
pub const SHUTDOWN_GRACE_PERIOD: Duration = Duration::from_secs(10);

type Generation = JoinHandle<Result<Arc<Credentials>, ServiceError>>;

pub struct ServiceOrchestrator {
    config: Arc<NodeConfig>,
    registry: ImplementationRegistry,
    credentials: Arc<CredentialStore>,
    transport: Option<Arc<dyn Transport>>,
    routes: Router,
}

impl ServiceOrchestrator {
    pub fn new(config: Arc<NodeConfig>, registry: ImplementationRegistry) -> Self {
        Self {
            config,
            registry,
            credentials: Arc::new(CredentialStore::new()),
            transport: None,
            routes: Router::new(),
        }
    }

    /// Use a store that may already hold credentials; generation is skipped
    /// when it does.
    pub fn with_credentials(mut self, credentials: Arc<CredentialStore>) -> Self {
        self.credentials = credentials;
        self
    }

    /// Replace the HTTPS transport used for directory and dependency calls.
    pub fn with_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Extra node-level routes (metrics, API docs) served next to the services.
    pub fn with_routes(mut self, routes: Router) -> Self {
        self.routes = self.routes.merge(routes);
        self
    }

    pub fn credentials(&self) -> Arc<CredentialStore> {
        self.credentials.clone()
    }

    /// Bring the node up: credentials, services, listener, registrations.
    ///
    /// Fails on invalid node configuration, an unreadable services root,
    /// credential generation failure or an unusable listen address. A
    /// single bad service never fails the node.
    pub async fn start(self) -> Result<RunningNode, ServiceError> {
        let directory = self.config.directory_address()?;

        let mut generation = (!self.credentials.is_ready()).then(|| {
            let store = self.credentials.clone();
            let subject = self.config.subject_name.clone();
            tokio::spawn(async move { store.generate(&subject, None).await })
        });

        let loaded = load_services(&self.config.services_root, &self.registry)?;

        let transport: Arc<dyn Transport> = match self.transport {
            Some(transport) => transport,
            None => Arc::new(HttpsTransport::new(self.credentials.clone())),
        };
        let client = Arc::new(ServiceDirectoryClient::new(transport, directory));

        let mut services = Vec::with_capacity(loaded.len());
        for service in loaded {
            services.push(RunnableService::create(service.context, service.implementation, client.clone()).await);
        }

        let router = build_router(&services, self.credentials.clone()).merge(self.routes);

        let credentials = await_credentials(&self.credentials, &mut generation, READINESS_POLL_INTERVAL).await?;
        let tls = RustlsConfig::from_config(server_config(&credentials)?);

        let address = self.config.listen_address();
        let handle = Handle::new();
        let server = {
            let handle = handle.clone();
            tokio::spawn(async move {
                axum_server::bind_rustls(address, tls)
                    .handle(handle)
                    .serve(router.into_make_service_with_connect_info::<SocketAddr>())
                    .await
            })
        };

        let Some(local_addr) = handle.listening().await else {
            let reason = match server.await {
                Ok(Err(e)) => e.to_string(),
                Ok(Ok(())) => "listener closed".to_string(),
                Err(e) => e.to_string(),
            };
            return Err(ServiceError::Configuration(format!("cannot listen on {address}: {reason}")));
        };
        tracing::info!(%local_addr, services = services.len(), "node listening");

        let registrations = services
            .iter()
            .filter(|service| service.context().location.is_directory())
            .map(|service| {
                let service = service.clone();
                let client = client.clone();
                let port = local_addr.port();
                tokio::spawn(async move { client.register(service.context(), port).await })
            })
            .collect();

        Ok(RunningNode {
            local_addr,
            services,
            credentials: self.credentials,
            directory: client,
            handle,
            server,
            registrations,
        })
    }
}

/// Poll the credential store until it is populated.
///
/// A finished generation task that failed ends the wait with its error.
pub async fn await_credentials(
    store: &CredentialStore,
    generation: &mut Option<Generation>,
    interval: Duration,
) -> Result<Arc<Credentials>, ServiceError> {
    loop {
        if let Some(credentials) = store.current() {
            return Ok(credentials);
        }
        if generation.as_ref().is_some_and(|task| task.is_finished()) {
            if let Some(task) = generation.take() {
                return match task.await {
                    Ok(outcome) => outcome,
                    Err(e) => Err(ServiceError::Credentials(format!("generation task failed: {e}"))),
                };
            }
        }
        tracing::debug!("waiting for node credentials");
        tokio::time::sleep(interval).await;
    }
}

/// A node that is serving requests.
pub struct RunningNode {
    local_addr: SocketAddr,
    services: Vec<Arc<RunnableService>>,
    credentials: Arc<CredentialStore>,
    directory: Arc<ServiceDirectoryClient>,
    handle: Handle,
    server: JoinHandle<std::io::Result<()>>,
    registrations: Vec<JoinHandle<u32>>,
}

impl RunningNode {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn services(&self) -> &[Arc<RunnableService>] {
        &self.services
    }

    pub fn directory(&self) -> Arc<ServiceDirectoryClient> {
        self.directory.clone()
    }

    /// True once every background registration has completed.
    pub fn registered(&self) -> bool {
        self.registrations.iter().all(|task| task.is_finished())
    }

    /// Stop listening, abandon pending registrations, destroy services and
    /// drop the credentials.
    pub async fn shutdown(self) {
        self.handle.graceful_shutdown(Some(SHUTDOWN_GRACE_PERIOD));
        for task in &self.registrations {
            task.abort();
        }

        match self.server.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::error!(error = %e, "server error"),
            Err(e) => tracing::error!(error = %e, "server task failed"),
        }

        for service in &self.services {
            service.destroy().await;
        }
        self.credentials.clear();
        tracing::info!("node stopped");
    }
}

impl std::fmt::Debug for RunningNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunningNode")
            .field("local_addr", &self.local_addr)
            .field(
                "services",
                &self.services.iter().map(|s| s.identification()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn waits_for_credentials_on_the_poll_interval() {
        let store = Arc::new(CredentialStore::new());
        let installer = {
            let store = store.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(2500)).await;
                store.install(Credentials::from_pem("KEY", "CERT")).unwrap();
            })
        };

        let started = tokio::time::Instant::now();
        let credentials = await_credentials(&store, &mut None, READINESS_POLL_INTERVAL).await.unwrap();
        assert_eq!(credentials.certificate_pem(), "CERT");
        assert_eq!(started.elapsed(), Duration::from_secs(3));
        installer.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn failed_generation_ends_the_wait() {
        let store = CredentialStore::new();
        let mut generation: Option<Generation> = Some(tokio::spawn(async {
            Err(ServiceError::Credentials("no entropy".to_string()))
        }));

        let err = await_credentials(&store, &mut generation, READINESS_POLL_INTERVAL).await.unwrap_err();
        assert_eq!(err, ServiceError::Credentials("no entropy".to_string()));
        assert!(generation.is_none());
    }
}
