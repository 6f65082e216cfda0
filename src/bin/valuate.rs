use clap::Parser;
use gold_pawn_valuation::{
    capability::MockCompletion,
    config::AppConfig,
    models::EncodedImage,
    pipeline::{AnalysisResponse, FixedGoldPriceFeed, ValuationPipeline},
    store::InMemoryEstimationStore,
    valuation::AnalysisInput,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

#[derive(Parser, Debug)]
#[command(
    name = "valuate",
    about = "Appraise a gold jewelry photo or analysis and print the loan offer as JSON",
    version
)]
struct Cli {
    /// Photo of the item (jpeg, png or webp)
    #[arg(long, conflicts_with = "analysis", required_unless_present = "analysis")]
    image: Option<PathBuf>,
    /// JSON file with analysis fields (objectType, estimatedWeight, karat, condition)
    #[arg(long)]
    analysis: Option<PathBuf>,
    /// Override the configured gold price per gram
    #[arg(long)]
    gold_price: Option<u64>,
    /// Run reflective validation on the estimate
    #[arg(long)]
    validate: bool,
    /// Use canned appraiser answers instead of calling Gemini
    #[arg(long)]
    offline: bool,
}

fn mime_for(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .as_deref()
    {
        Some("png") => "image/png",
        Some("webp") => "image/webp",
        _ => "image/jpeg",
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let mut config = AppConfig::from_env()?;
    if let Some(price) = cli.gold_price {
        config.pricing.gold_price_per_gram = price;
    }

    // logs go to stderr; stdout carries the JSON result
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.telemetry.log_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let store = Arc::new(InMemoryEstimationStore::new());
    let pipeline = if cli.offline {
        info!("Running offline with the mock appraiser");
        ValuationPipeline::new(
            Arc::new(FixedGoldPriceFeed::new(config.pricing.gold_price_per_gram)),
            store,
        )
        .with_capability(
            Arc::new(MockCompletion::appraiser()),
            config.timeouts.analysis,
            config.timeouts.capability,
        )
    } else {
        ValuationPipeline::from_config(&config, store)
    };

    let output = match (cli.image, cli.analysis) {
        (Some(path), _) => {
            let bytes = tokio::fs::read(&path).await?;
            let image = EncodedImage::from_bytes(mime_for(&path), &bytes);

            let outcome = pipeline.analyze_image(image).await?;
            let estimation = pipeline
                .estimate_analysis(&outcome.analysis, cli.validate, Uuid::nil())
                .await?;

            serde_json::json!({
                "analysis": AnalysisResponse::from(outcome),
                "estimation": estimation,
            })
        }
        (None, Some(path)) => {
            let text = tokio::fs::read_to_string(&path).await?;
            let input: AnalysisInput = serde_json::from_str(&text)?;
            let estimation = pipeline.estimate(input, cli.validate, Uuid::nil()).await?;
            serde_json::to_value(estimation)?
        }
        (None, None) => return Err("either --image or --analysis is required".into()),
    };

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
