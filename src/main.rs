//! Hashdice Server Binary
//!
//! Loads configuration, opens the ledger, wires the oracle client and outcome
//! calculator into the settlement engine and serves the HTTP API.

use clap::Parser;
use hashdice::{
    api::ApiServer, BetSettlementEngine, ConfigLoader, CrashDiceCalculator, HashdiceResult,
    HttpHashOracle, LedgerStore,
};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "hashdice")]
#[command(about = "Provably-fair dice settlement server", long_about = None)]
struct Args {
    /// TOML configuration file
    #[arg(long)]
    config: Option<String>,

    /// API server host
    #[arg(long)]
    host: Option<String>,

    /// API server port
    #[arg(long)]
    port: Option<u16>,

    /// Ledger database directory
    #[arg(long)]
    db_path: Option<String>,

    /// Hash oracle base URL
    #[arg(long)]
    oracle_url: Option<String>,
}

#[tokio::main]
async fn main() -> HashdiceResult<()> {
    let args = Args::parse();

    let mut loader = ConfigLoader::new();
    if let Some(path) = &args.config {
        loader = loader.with_path(path);
    }
    let mut config = loader.load()?;

    // Command-line flags win over file and environment
    if let Some(host) = args.host {
        config.api.host = host;
    }
    if let Some(port) = args.port {
        config.api.port = port;
    }
    if let Some(db_path) = args.db_path {
        config.storage.data_directory = db_path;
    }
    if let Some(oracle_url) = args.oracle_url {
        config.oracle.base_url = oracle_url;
    }
    config.validate()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(config.log_filter())),
        )
        .init();

    info!("Starting hashdice v{}", env!("CARGO_PKG_VERSION"));
    info!(
        house_edge = config.engine.house_edge,
        max_target = config.engine.max_target,
        hash_iterations = config.engine.hash_iterations,
        "Engine configuration"
    );

    let store = Arc::new(LedgerStore::open(&config.storage)?);
    let oracle = Arc::new(HttpHashOracle::new(&config.oracle)?);
    info!(endpoint = oracle.endpoint(), "Hash oracle client ready");

    let engine = Arc::new(BetSettlementEngine::new(
        store,
        oracle,
        Arc::new(CrashDiceCalculator),
        config.engine.clone(),
        config.oracle_timeout(),
    ));

    ApiServer::new(config.api.clone(), engine).run().await
}
