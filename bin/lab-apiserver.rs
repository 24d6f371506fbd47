//! HTTP API server for lab environments, progress records and VM claims
//!
//! # Usage
//!
//! ```bash
//! AUTH_FILE=/etc/lab/tokens.yaml cargo run --bin lab-apiserver -- --namespace hobbyfarm
//! ```

use clap::Parser;
use lab_apiserver::auth::{AuthGate, StaticAuthGate};
use lab_apiserver::availability::ScheduledEventAvailability;
use lab_apiserver::client::ResourceClient;
use lab_apiserver::config::Config;
use lab_apiserver::index::ResourceIndex;
use lab_apiserver::resources::VirtualMachineClaim;
use lab_apiserver::server::{self, EnvironmentServer, ProgressServer, Servers, VMClaimServer};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

const INDEX_CHANNEL_CAPACITY: usize = 256;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::parse();
    if let Err(e) = run(config).await {
        error!("Server exited with error: {}", e);
        return Err(e);
    }
    Ok(())
}

async fn run(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    let auth: Arc<dyn AuthGate> = Arc::new(StaticAuthGate::from_file(&config.auth_file)?);
    let client = kube::Client::try_default().await?;
    let shutdown = CancellationToken::new();
    let backoff = config.backoff();
    let namespace = config.namespace.as_str();

    let claims = Arc::new(ResourceIndex::<VirtualMachineClaim>::new());
    let (tx, rx) = mpsc::channel(INDEX_CHANNEL_CAPACITY);
    let subscriber = claims.subscribe(rx);
    let watcher = ResourceIndex::spawn_watch(
        ResourceClient::<VirtualMachineClaim>::namespaced(client.clone(), namespace),
        tx,
        shutdown.child_token(),
    );

    let availability = Arc::new(ScheduledEventAvailability::new(
        ResourceClient::namespaced(client.clone(), namespace),
        ResourceClient::namespaced(client.clone(), namespace),
    ));
    let servers = Servers {
        environment: EnvironmentServer::new(
            Arc::clone(&auth),
            ResourceClient::namespaced(client.clone(), namespace),
            availability,
            backoff.clone(),
            shutdown.clone(),
        ),
        progress: ProgressServer::new(
            Arc::clone(&auth),
            ResourceClient::namespaced(client, namespace),
            backoff,
            shutdown.clone(),
        ),
        vmclaim: VMClaimServer::new(auth, Arc::clone(&claims)),
    };

    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => info!("Received interrupt, shutting down"),
                Err(e) => error!("Failed to listen for interrupt: {}", e),
            }
            shutdown.cancel();
        }
    });

    let listener = tokio::net::TcpListener::bind(config.listen).await?;
    info!(
        "Serving namespace {} on {}",
        config.namespace,
        listener.local_addr()?
    );

    axum::serve(listener, server::routes(servers))
        .with_graceful_shutdown(shutdown.clone().cancelled_owned())
        .await?;

    shutdown.cancel();
    watcher.await?;
    subscriber.await?;
    info!("Shutdown complete");
    Ok(())
}
