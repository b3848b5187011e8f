//! mm-api - Measure Master catalog & reconciliation service binary

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

use mm_api::AppState;

#[derive(Debug, Parser)]
#[command(name = "mm-api", about = "Measure Master catalog & measurement reconciliation API")]
struct Args {
    /// Path to TOML config file (default: platform config dir)
    #[arg(long)]
    config: Option<PathBuf>,

    /// SQLite database path (overrides env and config file)
    #[arg(long)]
    database: Option<String>,

    /// Listen address, e.g. 127.0.0.1:8787 (overrides env and config file)
    #[arg(long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let toml_config = mm_common::config::load_toml_config(args.config.as_ref())?;

    // Initialize tracing
    let filter = EnvFilter::try_new(mm_common::config::resolve_log_filter(&toml_config))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("Starting mm-api (Measure Master)");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let db_path = mm_common::config::resolve_database_path(args.database.as_deref(), &toml_config);
    info!("Database: {}", db_path.display());

    // Open the pool and bring the schema up to date
    let db_pool = mm_api::db::init_database_pool(&db_path).await?;
    info!("Database connection established");

    let state = AppState::new(db_pool);
    let app = mm_api::build_router(state);

    let bind = mm_common::config::resolve_bind_address(args.bind.as_deref(), &toml_config);
    let listener = tokio::net::TcpListener::bind(&bind).await?;
    info!("Listening on http://{}", bind);
    info!("Health check: http://{}/health", bind);

    axum::serve(listener, app).await?;

    Ok(())
}
