//! Krishi Sakhi - farming assistant gateway

use clap::Parser;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use krishi_sakhi::{
    config::{Args, LogFormat},
    db::MongoClient,
    eligibility::SchemeCatalog,
    identity::DEFAULT_CLIENT_ID,
    server::{self, AppState},
    store::Stores,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    let args = Args::parse();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("krishi_sakhi={},info", args.log_level).into());
    match args.log_format {
        LogFormat::Text => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init(),
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
    }

    if let Err(e) = args.validate() {
        error!("Configuration error: {}", e);
        std::process::exit(1);
    }

    let budgets = args.budget_table();
    info!("======================================");
    info!("  Krishi Sakhi - farming assistant");
    info!("======================================");
    info!("Node ID: {}", args.node_id);
    info!("Listen: {}", args.listen);
    info!("Environment: {:?}", args.environment);
    info!(
        "Budgets: read {} / write {} / submit {} / generate {}",
        budgets.read, budgets.write, budgets.submit, budgets.generate
    );
    info!("MongoDB: {}", args.mongodb_uri);
    info!("======================================");

    // Catalog problems are configuration errors; refuse to start
    let catalog = match &args.schemes_file {
        Some(path) => SchemeCatalog::from_file(path),
        None => SchemeCatalog::builtin(),
    };
    let catalog = match catalog {
        Ok(catalog) => catalog,
        Err(e) => {
            error!("Failed to load scheme catalog: {}", e);
            std::process::exit(1);
        }
    };
    info!("Scheme catalog: {} schemes", catalog.len());

    // Connect to MongoDB (in-memory fallback only in dev mode)
    let stores = match MongoClient::new(&args.mongodb_uri, &args.mongodb_db).await {
        Ok(client) => Stores::mongo(client).await?,
        Err(e) => {
            if args.dev_mode {
                warn!("MongoDB connection failed (dev mode, using in-memory store): {}", e);
                Stores::memory()
            } else {
                error!("MongoDB connection failed: {}", e);
                std::process::exit(1);
            }
        }
    };
    info!("Store backend: {}", stores.backend_name());

    warn!(
        "Requests without X-User-Id share the '{}' identity and one admission bucket",
        DEFAULT_CLIENT_ID
    );

    let state = Arc::new(AppState::new(args, stores, catalog)?);

    if let Err(e) = server::run(state).await {
        error!("Server error: {:?}", e);
        std::process::exit(1);
    }

    Ok(())
}
