use anyhow::{Context, Result};
use clap::Parser;
use metrics_exporter_prometheus::PrometheusBuilder;
use std::path::Path;
use std::sync::Arc;
use threadvault::api::ApiServer;
use threadvault::backend::{
    BackendExecutor, ElasticsearchClient, HealthRegistry, SearchIndexClient, SqliteStore,
};
use threadvault::{Config, Gateway};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "threadvault-server")]
#[command(about = "Read-only query gateway for archived comments and submissions")]
#[command(version)]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "threadvault.toml", env = "THREADVAULT_CONFIG")]
    config: String,

    /// Host to bind to (overrides server.bind_addr)
    #[arg(long)]
    host: Option<String>,

    /// Port to listen on (overrides server.bind_addr)
    #[arg(short, long)]
    port: Option<u16>,
}

fn init_tracing(config: &Config) {
    let filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| config.observability.log_level.clone()),
    );
    let registry = tracing_subscriber::registry().with(filter);
    if config.observability.log_format == "json" {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

fn bind_addr(config: &Config, args: &Args) -> String {
    let (default_host, default_port) = config
        .server
        .bind_addr
        .rsplit_once(':')
        .unwrap_or((config.server.bind_addr.as_str(), "8080"));
    let host = args.host.as_deref().unwrap_or(default_host);
    match args.port {
        Some(port) => format!("{host}:{port}"),
        None => format!("{host}:{default_port}"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = Config::load_or_create(Path::new(&args.config))
        .with_context(|| format!("loading config from {}", args.config))?;
    config.apply_env_overrides();
    config.validate()?;

    init_tracing(&config);
    tracing::info!("Config file: {}", args.config);

    let metrics_handle = if config.observability.metrics_enabled {
        Some(
            PrometheusBuilder::new()
                .install_recorder()
                .context("installing Prometheus recorder")?,
        )
    } else {
        None
    };

    let registry = Arc::new(HealthRegistry::new(
        config.search.endpoints.clone(),
        config.health_config(),
    ));
    for endpoint in registry.endpoints() {
        tracing::info!("Search endpoint {} at {}", endpoint.name, endpoint.url);
    }

    let client: Arc<dyn SearchIndexClient> = Arc::new(ElasticsearchClient::new(
        &config.search.comment_index,
        &config.search.submission_index,
    ));
    let _probe = registry.clone().start_probing(client.clone());

    let mut executor = BackendExecutor::new(client, registry, config.per_call_timeout());
    if config.relational.enabled {
        let store = SqliteStore::open(
            &config.relational.path,
            config.relational.pool_size,
            config.acquire_timeout(),
        )
        .with_context(|| {
            format!(
                "opening relational store {}",
                config.relational.path.display()
            )
        })?;
        tracing::info!(
            "Relational fallback enabled ({}, pool of {})",
            config.relational.path.display(),
            config.relational.pool_size
        );
        executor = executor.with_relational(Arc::new(store));
    }

    let gateway = Arc::new(Gateway::new(Arc::new(executor), config.request_timeout()));

    let mut server = ApiServer::with_cors(gateway, config.server.cors.clone());
    if let Some(handle) = metrics_handle {
        server = server.with_metrics(Arc::new(move || handle.render()));
    }

    let addr = bind_addr(&config, &args);
    tracing::info!("Starting threadvault on {}", addr);
    server.serve(&addr).await?;

    Ok(())
}
