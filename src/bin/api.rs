use gold_pawn_valuation::{
    api::start_server, config::AppConfig, pipeline::ValuationPipeline,
    store::InMemoryEstimationStore,
};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables
    let config = AppConfig::from_env()?;

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.telemetry.log_level)),
        )
        .init();

    if !config.gemini.is_configured() {
        eprintln!("GEMINI_API_KEY not set in .env");
        eprintln!("Image analysis and RAG validation will be unavailable");
    }

    info!("Gold Pawn Valuation - API Server");
    info!(
        port = config.server.port,
        gold_price_per_gram = config.pricing.gold_price_per_gram,
        "Configuration loaded"
    );

    // Create components
    let store = Arc::new(InMemoryEstimationStore::new());
    let pipeline = Arc::new(ValuationPipeline::from_config(&config, store));

    info!(
        validation_available = pipeline.validation_available(),
        "Pipeline initialized"
    );

    // Start API server
    start_server(pipeline, config.server.port).await?;

    Ok(())
}
