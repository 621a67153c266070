use anyhow::Context;
use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use basket_recommender::config::{Config, EngineConfig};
use basket_recommender::db::{
    create_redis_client, Dataset, JsonFileShownStore, RedisShownStore, ShownStore, TablePaths,
};
use basket_recommender::routes::{create_router, AppState};
use basket_recommender::services::{hours_before, shared_rng, RecommendationEngine};

#[derive(Parser)]
#[command(name = "basket-recommender", version, about = "Personalized product recommendations")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP API (default)
    Serve,
    /// Print recommendations as JSON and exit
    Recommend(RecommendArgs),
}

#[derive(Args)]
struct RecommendArgs {
    /// Customer to recommend for, may be repeated
    #[arg(long = "customer", value_name = "ID")]
    customers: Vec<String>,

    /// Recommend for every customer in the transaction table
    #[arg(long, conflicts_with = "customers")]
    all: bool,

    /// Evaluation instant (RFC 3339), defaults to now
    #[arg(long)]
    at: Option<DateTime<Utc>>,

    #[arg(long, value_name = "PATH")]
    products: Option<PathBuf>,

    #[arg(long, value_name = "PATH")]
    transactions: Option<PathBuf>,

    #[arg(long, value_name = "PATH")]
    interactions: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let config = Config::from_env()?;
    let engine_config = load_engine_config(&config)?;

    let store = open_shown_store(&config, &engine_config).await?;
    let rng = shared_rng(engine_config.selection.random_seed);
    let engine = Arc::new(RecommendationEngine::new(engine_config, store, rng));

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(config, engine).await,
        Command::Recommend(args) => recommend(config, engine, args).await,
    }
}

/// Reads the engine document; a missing file means built-in defaults
fn load_engine_config(config: &Config) -> anyhow::Result<EngineConfig> {
    let path = &config.engine_config_path;
    if !path.exists() {
        tracing::warn!(path = %path.display(), "Engine configuration not found, using defaults");
        let defaults = EngineConfig::default();
        defaults.validate()?;
        return Ok(defaults);
    }

    EngineConfig::from_file(path)
        .with_context(|| format!("invalid engine configuration {}", path.display()))
}

async fn open_shown_store(
    config: &Config,
    engine_config: &EngineConfig,
) -> anyhow::Result<Arc<dyn ShownStore>> {
    let window_hours = engine_config.selection.decay_hours;

    let store: Arc<dyn ShownStore> = match &config.redis_url {
        Some(url) => {
            let client = create_redis_client(url).context("invalid REDIS_URL")?;
            let ttl_secs = (window_hours * 3600.0).ceil() as i64;
            Arc::new(RedisShownStore::new(client, ttl_secs))
        }
        None => Arc::new(
            JsonFileShownStore::open(&config.shown_store_path)
                .await
                .with_retention(window_hours),
        ),
    };
    tracing::info!(store = store.name(), "Shown-product store ready");

    let cutoff = hours_before(Utc::now(), window_hours);
    match store.prune(cutoff).await {
        Ok(removed) if removed > 0 => tracing::info!(removed, "Pruned expired shown products"),
        Ok(_) => {}
        Err(e) => tracing::warn!(error = %e, "Failed to prune shown products"),
    }

    Ok(store)
}

async fn serve(config: Config, engine: Arc<RecommendationEngine>) -> anyhow::Result<()> {
    let state = AppState::new(engine, config.table_paths());
    let app = create_router(state);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    tracing::info!(address = %addr, "Server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }
    tracing::info!("Shutting down");
}

async fn recommend(
    config: Config,
    engine: Arc<RecommendationEngine>,
    args: RecommendArgs,
) -> anyhow::Result<()> {
    let defaults = config.table_paths();
    let paths = TablePaths {
        products: args.products.unwrap_or(defaults.products),
        transactions: args.transactions.unwrap_or(defaults.transactions),
        interactions: args.interactions.unwrap_or(defaults.interactions),
    };

    let dataset = tokio::task::spawn_blocking(move || Dataset::load(&paths)).await??;
    let customers = if args.all {
        dataset.customer_ids().to_vec()
    } else {
        args.customers
    };
    if customers.is_empty() {
        anyhow::bail!("no customers given, pass --customer ID or --all");
    }

    let results = engine
        .recommend_batch(Arc::new(dataset), customers, args.at)
        .await;
    println!("{}", serde_json::to_string_pretty(&results)?);
    Ok(())
}
