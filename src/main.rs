//! shopscout CLI.
//!
//! Runs one multi-platform product search and prints the merged result as
//! JSON. Configuration comes from the environment (`.env` supported) with
//! flags layered on top.

use anyhow::{Context, Result};
use clap::Parser;
use shopscout::{build_orchestrator, EngineConfig, Platform, SearchFilters, SearchRequest};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "shopscout", about = "Multi-platform product search")]
struct Cli {
    /// Search query text.
    query: String,

    /// Platforms to crawl (comma-separated: lazada,zalora,shopee).
    #[arg(long, value_delimiter = ',', default_value = "lazada,zalora")]
    platforms: Vec<String>,

    #[arg(long)]
    min_price: Option<f64>,

    #[arg(long)]
    max_price: Option<f64>,

    #[arg(long)]
    brand: Option<String>,

    #[arg(long)]
    min_rating: Option<f32>,

    /// Skip the cache read for this request (the result is still written
    /// back).
    #[arg(long)]
    bypass_cache: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let platforms: Vec<Platform> = cli
        .platforms
        .iter()
        .map(|p| p.parse::<Platform>().map_err(anyhow::Error::msg))
        .collect::<Result<_>>()
        .context("invalid --platforms value")?;

    let config = EngineConfig::from_env();
    let orchestrator = build_orchestrator(config)
        .await
        .context("failed to assemble crawl engine")?;

    let request = SearchRequest {
        query: cli.query,
        platforms,
        filters: SearchFilters {
            min_price: cli.min_price,
            max_price: cli.max_price,
            brand: cli.brand,
            min_rating: cli.min_rating,
        },
        bypass_cache: cli.bypass_cache,
    };

    let merged = orchestrator.search(request).await?;
    println!("{}", serde_json::to_string_pretty(&merged)?);

    Ok(())
}
