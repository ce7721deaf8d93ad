use anyhow::{Context, Result};
use argo_insight::clock::SystemClock;
use argo_insight::config::AppConfig;
use argo_insight::db::SqliteProfileRepository;
use argo_insight::filter::FilterNormalizer;
use argo_insight::llm::LlmClient;
use argo_insight::observability::init_tracing;
use argo_insight::App;
use clap::{Parser, Subcommand};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "argo-insight")]
#[command(about = "Ingest and query ARGO float profiles in natural language")]
struct Args {
    /// Path to the SQLite profile database (or set ARGO_DATABASE_PATH)
    #[arg(short, long, global = true)]
    database: Option<PathBuf>,

    /// Gemini API key (or set GEMINI_API_KEY env var)
    #[arg(long, global = true)]
    api_key: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Bulk-insert a JSON array of profiles from a file
    Ingest { file: PathBuf },
    /// Answer a question about the stored profiles
    Ask { question: String },
    /// Print the canonical form of a raw filter object
    Normalize { filter: String },
    /// List stored profiles
    Profiles {
        #[arg(short, long)]
        limit: Option<usize>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    init_tracing();

    let args = Args::parse();
    let mut config = AppConfig::from_env()?;
    if let Some(database) = args.database {
        config.database_path = database;
    }
    if let Some(api_key) = args.api_key {
        config.gemini_api_key = Some(api_key);
    }

    if let Command::Normalize { filter } = &args.command {
        let raw: Value = serde_json::from_str(filter).context("filter is not valid JSON")?;
        let normalized = FilterNormalizer::new(config.proximity_tolerance).normalize_value(&raw)?;
        println!("{}", serde_json::to_string_pretty(&normalized.to_json())?);
        return Ok(());
    }

    let clock = Arc::new(SystemClock);
    let store = SqliteProfileRepository::open(&config.database_path, clock.clone())
        .with_context(|| format!("opening {}", config.database_path.display()))?;
    let llm = LlmClient::from_config(&config)?;
    if !llm.has_api_key() {
        warn!("GEMINI_API_KEY not set - chat queries will fail");
    }
    let app = App::new(config, Arc::new(store), Arc::new(llm), clock);

    match args.command {
        Command::Ingest { file } => {
            let text = std::fs::read_to_string(&file)
                .with_context(|| format!("reading {}", file.display()))?;
            let body: Value = serde_json::from_str(&text)
                .with_context(|| format!("{} is not valid JSON", file.display()))?;
            let report = app.ingestor.ingest(&body).await?;
            info!("Inserted {} profiles", report.inserted_count);
            for failure in &report.failures {
                warn!("Item {} rejected: {}", failure.index, failure.reason);
            }
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::Ask { question } => {
            let response = app.chat.answer(&question).await?;
            info!("Matched {} profiles with {}", response.count, response.applied_filter);
            println!("{}", serde_json::to_string_pretty(&response)?);
        }
        Command::Profiles { limit } => {
            let mut profiles = app.all_profiles().await?;
            if let Some(limit) = limit {
                profiles.truncate(limit);
            }
            println!("{}", serde_json::to_string_pretty(&profiles)?);
        }
        Command::Normalize { .. } => {}
    }

    Ok(())
}
