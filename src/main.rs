use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::sync::Arc;
use tracing::info;

use civic_scraper::common::constants::SOURCE_REGISTRY_DIR;
use civic_scraper::config::Settings;
use civic_scraper::observability::{logging, metrics};
use civic_scraper::pipeline::{PipelineOrchestrator, RunOptions};
use civic_scraper::registry::SourceRegistry;
use civic_scraper::storage::{EventStore, JsonFileEventStore};

#[derive(Parser)]
#[command(name = "civic-scraper")]
#[command(about = "Civic event ingestion pipeline: connectors, normalization, dedup, canonical store")]
#[command(version = "0.1.0")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full ingestion pipeline
    Run {
        /// Comma-separated subset of source ids (default: all enabled)
        #[arg(long)]
        sources: Option<String>,
        /// Reference date for relative-date resolution (YYYY-MM-DD,
        /// default: today)
        #[arg(long)]
        reference_date: Option<NaiveDate>,
        /// Fetch even if a source was fetched within the cadence window
        #[arg(long)]
        bypass_cadence: bool,
    },
    /// List the sources in the registry
    Sources,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load environment variables
    dotenv::dotenv().ok();

    logging::init_logging();
    if let Err(e) = metrics::init() {
        tracing::warn!("metrics recorder not installed: {e}");
    }

    let settings = Settings::load()?;
    let registry = SourceRegistry::load_from_directory(SOURCE_REGISTRY_DIR)?;
    info!("loaded {} source documents from registry", registry.len());

    match cli.command {
        Commands::Run {
            sources,
            reference_date,
            bypass_cadence,
        } => {
            let store: Arc<dyn EventStore> = Arc::new(
                JsonFileEventStore::open_at_root(&settings.pipeline.data_dir)
                    .map_err(anyhow::Error::from)?,
            );
            let orchestrator = PipelineOrchestrator::new(registry, store.clone(), settings);

            let options = RunOptions {
                sources: sources
                    .map(|s| s.split(',').map(|id| id.trim().to_string()).collect()),
                reference_date: reference_date.unwrap_or_else(|| chrono::Utc::now().date_naive()),
                bypass_cadence,
            };

            let report = orchestrator.run(options).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            println!(
                "🗳️  Run finished: {} inserted, {} updated, {} skipped ({} rows in store)",
                report.inserted,
                report.updated,
                report.skipped,
                store.count().await.map_err(anyhow::Error::from)?
            );
        }
        Commands::Sources => {
            let mut configs: Vec<_> = registry.all().collect();
            configs.sort_by(|a, b| a.source_id.cmp(&b.source_id));
            for config in configs {
                let kind = match &config.connector {
                    civic_scraper::registry::ConnectorSpec::Html { .. } => "html",
                    civic_scraper::registry::ConnectorSpec::Actor { .. } => "actor",
                };
                println!(
                    "{:<24} kind={:<5} country={} enabled={}",
                    config.source_id, kind, config.default_country, config.enabled
                );
            }
        }
    }

    Ok(())
}
