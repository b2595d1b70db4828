use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use axum::Router;
use axum::routing::get;
use clap::Parser;
use metrics_exporter_prometheus::PrometheusBuilder;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;
use wayfinder_runtime::{CredentialStore, HttpsTransport, NodeConfig, ServiceOrchestrator, Transport, logging};
use wayfinder_services::{DirectoryApiDoc, builtin_registry};

#[derive(Parser)]
#[command(name = "wayfinder")]
#[command(about = "Wayfinder service node", long_about = None)]
struct Cli {
    /// JSON node configuration; flags and environment override it
    #[arg(long, env = "WAYFINDER_CONFIG")]
    config: Option<PathBuf>,

    /// Directory holding one subdirectory per service
    #[arg(long, env = "WAYFINDER_SERVICES_ROOT")]
    services_root: Option<PathBuf>,

    #[arg(long, env = "WAYFINDER_BIND_ADDRESS")]
    bind_address: Option<IpAddr>,

    #[arg(long, env = "WAYFINDER_PORT")]
    port: Option<u16>,

    /// Default directory, e.g. directory://yp.local:8443
    #[arg(long, env = "WAYFINDER_DIRECTORY")]
    directory: Option<String>,

    /// Common name of the node certificate
    #[arg(long, env = "WAYFINDER_SUBJECT_NAME")]
    subject_name: Option<String>,

    #[arg(long, env = "WAYFINDER_LOG_LEVEL")]
    log_level: Option<String>,

    #[arg(long, env = "WAYFINDER_LOGGING_ENABLED")]
    logging_enabled: Option<bool>,
}

impl Cli {
    fn node_config(self) -> anyhow::Result<NodeConfig> {
        let mut config = match &self.config {
            Some(path) => NodeConfig::from_file(path)?,
            None => NodeConfig::default(),
        };
        if let Some(root) = self.services_root {
            config.services_root = root;
        }
        if let Some(address) = self.bind_address {
            config.bind_address = address;
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(directory) = self.directory {
            config.directory = directory;
        }
        if let Some(subject) = self.subject_name {
            config.subject_name = subject;
        }
        if let Some(level) = self.log_level {
            config.logging.level = level;
        }
        if let Some(enabled) = self.logging_enabled {
            config.logging.enabled = enabled;
        }
        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = Arc::new(Cli::parse().node_config().context("invalid node configuration")?);
    logging::init(&config.logging)?;

    let recorder = PrometheusBuilder::new().build_recorder();
    let handle = recorder.handle();
    metrics::set_global_recorder(recorder).ok();

    let credentials = Arc::new(CredentialStore::new());
    let transport: Arc<dyn Transport> = Arc::new(HttpsTransport::new(credentials.clone()));

    let routes = Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", DirectoryApiDoc::openapi()))
        .route(
            "/metrics",
            get(move || {
                let rendered = handle.render();
                async move { rendered }
            }),
        );

    let node = ServiceOrchestrator::new(config.clone(), builtin_registry(transport.clone()))
        .with_credentials(credentials)
        .with_transport(transport)
        .with_routes(routes)
        .start()
        .await
        .context("node failed to start")?;
    tracing::info!(
        addr = %node.local_addr(),
        root = %config.services_root.display(),
        "wayfinder node up"
    );

    shutdown_signal().await;
    node.shutdown().await;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("signal received, starting graceful shutdown");
}
