//! Funnel server: sales-funnel navigation and checkout pricing over ajax.
//!
//! Loads funnel graphs and the catalog from JSON seed files and serves the
//! ajax endpoint with in-memory session carts.

use anyhow::Context;
use clap::Parser;
use funnel_api::{AjaxOrchestrator, ApiServer, HmacTokenVerifier};
use funnel_core::config::AppConfig;
use funnel_core::event_bus::LogSink;
use funnel_core::memory::InMemoryCatalog;
use funnel_journey::InMemoryFunnelStore;
use funnel_segmentation::SegmentEvaluator;
use std::sync::Arc;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "funnel-server")]
#[command(about = "Sales funnel navigation and checkout pricing service")]
#[command(version)]
struct Cli {
    /// Optional TOML config file
    #[arg(long, short)]
    config: Option<String>,

    /// Node identifier (overrides config)
    #[arg(long, env = "FUNNEL_ENGINE__NODE_ID")]
    node_id: Option<String>,

    /// HTTP port (overrides config)
    #[arg(long, env = "FUNNEL_ENGINE__API__HTTP_PORT")]
    http_port: Option<u16>,

    /// Funnel graph seed file (overrides config)
    #[arg(long, env = "FUNNEL_ENGINE__FUNNEL__GRAPH_PATH")]
    graphs: Option<String>,

    /// Catalog seed file (overrides config)
    #[arg(long, env = "FUNNEL_ENGINE__FUNNEL__CATALOG_PATH")]
    catalog: Option<String>,
}

fn load_store(path: Option<&str>) -> anyhow::Result<InMemoryFunnelStore> {
    let Some(path) = path else {
        warn!("No funnel graph file configured, starting with an empty store");
        return Ok(InMemoryFunnelStore::new());
    };
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading funnel graphs from {}", path))?;
    InMemoryFunnelStore::from_json(&raw).with_context(|| format!("loading funnel graphs from {}", path))
}

fn load_catalog(path: Option<&str>) -> anyhow::Result<InMemoryCatalog> {
    let Some(path) = path else {
        warn!("No catalog file configured, starting with an empty catalog");
        return Ok(InMemoryCatalog::new());
    };
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading catalog from {}", path))?;
    InMemoryCatalog::from_json(&raw).with_context(|| format!("loading catalog from {}", path))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "funnel_server=info,funnel_api=info,tower_http=info".into()),
        )
        .json()
        .init();

    let cli = Cli::parse();

    info!("Funnel server starting up");

    let mut config = AppConfig::load(cli.config.as_deref()).unwrap_or_else(|e| {
        warn!(error = %e, "Failed to load config, using defaults");
        AppConfig::default()
    });

    if let Some(node_id) = cli.node_id {
        config.node_id = node_id;
    }
    if let Some(port) = cli.http_port {
        config.api.http_port = port;
    }
    if let Some(path) = cli.graphs {
        config.funnel.graph_path = Some(path);
    }
    if let Some(path) = cli.catalog {
        config.funnel.catalog_path = Some(path);
    }
    if !config.auth.enforce {
        warn!("Request token enforcement is disabled");
    } else if config.auth.uses_default_secret() {
        warn!("Request tokens are signed with the default secret, set FUNNEL_ENGINE__AUTH__TOKEN_SECRET");
    }

    info!(
        node_id = %config.node_id,
        http_port = config.api.http_port,
        max_decision_hops = config.funnel.max_decision_hops,
        "Configuration loaded"
    );

    let store = Arc::new(load_store(config.funnel.graph_path.as_deref())?);
    let catalog = Arc::new(load_catalog(config.funnel.catalog_path.as_deref())?);
    info!(
        funnels = store.list_funnels().len(),
        products = catalog.product_count(),
        "Seed data loaded"
    );

    let orchestrator = Arc::new(AjaxOrchestrator::assemble(
        store.clone(),
        catalog.clone(),
        Arc::new(SegmentEvaluator::new()),
        Arc::new(HmacTokenVerifier::new(
            &config.auth.token_secret,
            config.auth.enforce,
        )),
        Arc::new(LogSink),
        config.funnel.max_decision_hops,
    ));

    let api_server = ApiServer::new(config.clone(), orchestrator, catalog, store);

    if let Err(e) = api_server.start_metrics().await {
        error!(error = %e, "Failed to start metrics exporter");
    }

    info!("Funnel server is ready to serve traffic");

    api_server.start_http().await?;

    Ok(())
}
