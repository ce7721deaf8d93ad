//! HTTP server for the ARGO dashboard

use argo_insight::clock::SystemClock;
use argo_insight::config::AppConfig;
use argo_insight::db::SqliteProfileRepository;
use argo_insight::llm::LlmClient;
use argo_insight::observability::init_tracing;
use argo_insight::server::serve;
use argo_insight::App;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "server")]
#[command(about = "Serve the ARGO profile and chat API")]
struct Args {
    /// Port to listen on (or set PORT)
    #[arg(short, long)]
    port: Option<u16>,

    /// Path to the SQLite profile database (or set ARGO_DATABASE_PATH)
    #[arg(short, long)]
    database: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();
    init_tracing();

    let args = Args::parse();
    let mut config = AppConfig::from_env()?;
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(database) = args.database {
        config.database_path = database;
    }

    let llm = LlmClient::from_config(&config)?;
    if llm.has_api_key() {
        info!("Gemini API key found, using model {}", config.gemini_model);
    } else {
        warn!("GEMINI_API_KEY not set - chat queries will fail with 500");
    }

    let clock = Arc::new(SystemClock);
    let store = SqliteProfileRepository::open(&config.database_path, clock.clone())?;
    info!("Profile database at {}", config.database_path.display());

    let addr = config.bind_addr();
    let app = Arc::new(App::new(config, Arc::new(store), Arc::new(llm), clock));

    let listener = TcpListener::bind(&addr).await?;
    info!("Server listening on http://{}", addr);
    serve(listener, app).await?;
    Ok(())
}
