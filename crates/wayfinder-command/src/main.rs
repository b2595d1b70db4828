use std::sync::Arc;

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use wayfinder_core::service::DependencyContext;
use wayfinder_core::{BasicCredentials, DirectoryAddress, HttpMethod, ServiceContext};
use wayfinder_runtime::{CallRequest, CallableService, CredentialStore, HttpsTransport, ServiceDirectoryClient};

#[derive(Parser)]
#[command(name = "wayfinder-cli")]
#[command(about = "Wayfinder operator CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Directory to query, e.g. directory://yp.local:8443
    #[arg(long, env = "WAYFINDER_DIRECTORY", default_value = "directory://localhost:8443")]
    directory: String,

    /// Common name of the ephemeral client certificate
    #[arg(long, env = "WAYFINDER_CLI_SUBJECT", default_value = "wayfinder-cli")]
    subject_name: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Ask the directory for the next live instance of a service
    Lookup { name: String, api: u32 },
    /// Show a service's descriptor and certificate
    Info {
        name: String,
        api: u32,
        /// `directory`, `directory://host[:port]` or a literal URL
        #[arg(long, default_value = "directory")]
        location: String,
    },
    /// Call one operation of a service
    Call {
        name: String,
        api: u32,
        method: HttpMethod,
        /// Path below the service root, e.g. /users/42
        path: String,
        /// JSON request body
        #[arg(long)]
        body: Option<String>,
        #[arg(long, requires = "password")]
        user: Option<String>,
        #[arg(long, env = "WAYFINDER_PASSWORD", requires = "user")]
        password: Option<String>,
        #[arg(long, default_value = "directory")]
        location: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let directory = DirectoryAddress::parse(&cli.directory).context("invalid directory location")?;
    let credentials = Arc::new(CredentialStore::new());
    credentials
        .generate(&cli.subject_name, None)
        .await
        .context("could not create client credentials")?;
    let client = Arc::new(ServiceDirectoryClient::new(
        Arc::new(HttpsTransport::new(credentials)),
        directory,
    ));

    match cli.command {
        Commands::Lookup { name, api } => {
            let service = remote(&name, api, "directory")?;
            let endpoint = client.lookup(&service).await?;
            println!("{}/v{} -> {}", name, api, endpoint);
        }
        Commands::Info { name, api, location } => {
            let service = CallableService::new(remote(&name, api, &location)?, client);
            let info = service.info().await?;
            println!("{}", serde_json::to_string_pretty(&info)?);
        }
        Commands::Call {
            name,
            api,
            method,
            path,
            body,
            user,
            password,
            location,
        } => {
            let service = CallableService::new(remote(&name, api, &location)?, client);
            let mut call = CallRequest::new(method, path);
            if let Some(body) = body {
                call = call.json(serde_json::from_str(&body).context("--body is not valid JSON")?);
            }
            if let (Some(user), Some(password)) = (user, password) {
                call = call.header("Authorization", BasicCredentials::new(user, password).to_header());
            }

            let response = service.execute(call).await?;
            println!("{} {}", response.status, response.status_text);
            for (cookie, value) in &response.cookies {
                println!("cookie {cookie}={value}");
            }
            if !response.body.is_null() {
                println!("{}", serde_json::to_string_pretty(&response.body)?);
            }
            if !response.is_success() {
                bail!("call failed with status {}", response.status);
            }
        }
    }

    Ok(())
}

fn remote(name: &str, api: u32, location: &str) -> anyhow::Result<ServiceContext> {
    let dependency = DependencyContext {
        api_version: api,
        location: location.to_string(),
    };
    Ok(ServiceContext::for_dependency(name, &dependency)?)
}
