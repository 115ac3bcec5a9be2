mod api;
mod archive;
mod config;
mod error;
mod executor;
mod ldap;
mod metrics;
mod models;
mod paths;
mod services;
#[cfg(test)]
mod test_support;

use crate::config::Config;
use crate::executor::ProcessRunner;
use crate::ldap::{DirectoryLookup, Ldap3Connector, LdapClient};
use crate::metrics::ScriptMetrics;
use crate::paths::DatasetPathFactory;
use crate::services::{DatabaseResolver, HandlerBase};
use api::create_router;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const LDAP_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

async fn run_server<F>(shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "dataset_handler=debug,tower_http=debug,axum=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;
    config.validate()?;
    tracing::info!("Starting dataset_handler with config: {:?}", config);

    let directory: Option<Arc<dyn DirectoryLookup>> = if config.ldap.servers.is_empty() {
        None
    } else {
        let client: Arc<dyn DirectoryLookup> = Arc::new(LdapClient::new(
            config.ldap.servers.clone(),
            config.ldap.base_dn.clone(),
            Ldap3Connector::new(LDAP_CONNECT_TIMEOUT),
        )?);
        tracing::info!("Using {} LDAP server(s)", config.ldap.servers.len());
        Some(client)
    };

    let base = HandlerBase {
        scripts: Arc::new(config.scripts.clone()),
        custom_path: config.custom_path.clone(),
        runner: ProcessRunner,
        metrics: Arc::new(ScriptMetrics::new()),
        paths: DatasetPathFactory::new(config.install_root.clone(), config.site_build.clone()),
        resolver: DatabaseResolver::new(Arc::new(config.databases.clone()), directory),
    };

    let app = create_router(base, config.workspace_root.clone());
    let app = app.layer(TraceLayer::new_for_http());

    let addr = format!("{}:{}", config.host, config.port);
    let addr = addr.parse::<SocketAddr>()?;
    tracing::info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", err);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    run_server(shutdown_signal()).await
}
