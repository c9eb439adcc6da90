//! Rightsizer - resource rightsizing recommendation service
//!
//! Loads a catalog snapshot at startup, then serves optimize requests over
//! HTTP, quoting costs and requesting explanations from external services.

use anyhow::{Context, Result};
use rightsizer::{api, config::ServerConfig};
use rightsizing_engine::{
    health::{components, HealthRegistry},
    observability::RecommendationLogger,
    recommender::EngineConfig,
    HttpCostQuoter, HttpExplainer, InMemoryCatalog, RightsizingEngine,
};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const ENGINE_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting rightsizer");

    let config = ServerConfig::load()?;
    info!(
        node_name = %config.node_name,
        catalog_path = %config.catalog_path,
        explanations = config.explainer_url.is_some(),
        "Rightsizer configured"
    );

    let health_registry = HealthRegistry::new();
    health_registry.register(components::CATALOG).await;
    health_registry.register(components::COST_SERVICE).await;

    let catalog = InMemoryCatalog::from_path(&config.catalog_path)
        .with_context(|| format!("Failed to load catalog from {}", config.catalog_path))?;
    let catalog_entries = catalog.entry_count();

    let cost = HttpCostQuoter::new(&config.cost_service_url, config.cost_timeout())
        .context("Invalid cost service URL")?;

    let mut builder = RightsizingEngine::builder()
        .catalog(Arc::new(catalog))
        .cost_quoter(Arc::new(cost))
        .health_registry(health_registry.clone())
        .config(EngineConfig {
            explain_timeout: config.explain_timeout(),
            node_name: config.node_name.clone(),
        });
    match &config.explainer_url {
        Some(url) => {
            let explainer = HttpExplainer::new(url, config.explain_timeout())
                .context("Invalid explainer URL")?;
            health_registry.register(components::EXPLAINER).await;
            builder = builder.explainer(Arc::new(explainer));
        }
        None => info!("No explainer configured, descriptions will be empty"),
    }
    let engine = builder.build()?;

    let logger = RecommendationLogger::new(&config.node_name);
    logger.log_startup(ENGINE_VERSION, catalog_entries);

    let app_state = Arc::new(api::AppState::new(engine));

    // Catalog is loaded, start accepting traffic
    health_registry.set_ready(true).await;

    let api_handle = tokio::spawn(api::serve(config.api_port, app_state));

    tokio::select! {
        joined = api_handle => {
            let served = joined.context("API server task panicked")?;
            if let Err(e) = &served {
                error!(error = %e, "API server stopped");
            }
            logger.log_shutdown("API server stopped");
            served
        }
        signal = tokio::signal::ctrl_c() => {
            signal.context("Failed to listen for shutdown signal")?;
            logger.log_shutdown("SIGINT received");
            info!("Shutting down");
            Ok(())
        }
    }
}
