//! gdf-profile - profile reconciliation microservice
//!
//! Keeps GameDev Factory account metadata consistent (quota, premium expiry,
//! achievements, daily tasks) and serves it over HTTP + SSE.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use gdf_common::config::{self, RootFolderInitializer, RootFolderResolver, DEFAULT_PORT};
use gdf_common::events::EventBus;
use tokio::signal;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use gdf_profile::catalog::AdminDirectory;
use gdf_profile::config::{resolve_generation_api_key, EngineSettings};
use gdf_profile::reconcile::{spawn_idle_eviction, DriverDeps};
use gdf_profile::services::{GeminiClient, SupabaseAccountStore};
use gdf_profile::AppState;

const MODULE_NAME: &str = "gdf-profile";

/// Command-line arguments for gdf-profile
#[derive(Parser, Debug)]
#[command(name = "gdf-profile")]
#[command(about = "Profile reconciliation microservice for GameDev Factory")]
#[command(version)]
struct Args {
    /// TOML config file (default: <config dir>/gdf/gdf-profile.toml)
    #[arg(short, long, env = "GDF_CONFIG")]
    config: Option<PathBuf>,

    /// Port to listen on
    #[arg(short, long, env = "GDF_PORT")]
    port: Option<u16>,

    /// Address to bind
    #[arg(long, default_value = "127.0.0.1", env = "GDF_BIND")]
    bind: std::net::IpAddr,

    /// Data folder holding the SQLite database
    #[arg(short, long, env = "GDF_ROOT_FOLDER")]
    root_folder: Option<PathBuf>,

    /// Account store base URL
    #[arg(long, env = "GDF_ACCOUNT_STORE_URL")]
    account_store_url: Option<String>,

    /// Account store public (anon) key
    #[arg(long, env = "GDF_ACCOUNT_STORE_ANON_KEY")]
    account_store_anon_key: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config_path = args
        .config
        .clone()
        .or_else(|| config::config_file_path(MODULE_NAME));
    let toml_config = config::load_or_default(config_path.as_deref());

    // RUST_LOG wins over the configured level
    let default_filter = format!("gdf_profile={0},gdf_common={0},tower_http={0}", toml_config.logging.level);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(
        "Starting {} v{} [{}] built {} ({})",
        MODULE_NAME,
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE"),
    );
    if let Some(path) = &config_path {
        info!("Config file: {}", path.display());
    }

    // Root folder: CLI → ENV → TOML → compiled default
    let root_folder = match args.root_folder.clone() {
        Some(root) => root,
        None => RootFolderResolver::new(MODULE_NAME)
            .with_toml_root(toml_config.root_folder.clone())
            .resolve(),
    };
    let initializer = RootFolderInitializer::new(root_folder);
    initializer
        .ensure_directory_exists()
        .context("Failed to initialize root folder")?;

    let db_path = initializer.database_path();
    info!("Database: {}", db_path.display());
    let db_pool = gdf_common::db::init_database_pool(&db_path)
        .await
        .context("Failed to open database")?;

    let store_url = args
        .account_store_url
        .clone()
        .or_else(|| toml_config.account_store.url.clone())
        .context("Account store URL not configured (--account-store-url, GDF_ACCOUNT_STORE_URL or [account_store].url)")?;
    let anon_key = args
        .account_store_anon_key
        .clone()
        .or_else(|| toml_config.account_store.anon_key.clone())
        .context("Account store anon key not configured (--account-store-anon-key, GDF_ACCOUNT_STORE_ANON_KEY or [account_store].anon_key)")?;
    let store = SupabaseAccountStore::new(&store_url, &anon_key)
        .context("Failed to create account store client")?;
    info!("Account store: {}", store_url);

    let event_bus = EventBus::new(256);
    let admins = AdminDirectory::new(&toml_config.admins);
    info!("Admin directory: {} entries", admins.len());

    let mut deps = DriverDeps::new(Arc::new(store), event_bus)
        .with_admins(admins)
        .with_settings(EngineSettings::from_toml(&toml_config));

    if let Some(api_key) = resolve_generation_api_key(&db_pool, &toml_config).await? {
        let client = GeminiClient::new(&toml_config.generation.endpoint, api_key)
            .context("Failed to create generation client")?;
        deps = deps.with_generator(Arc::new(client));
        info!("Generation service: {}", toml_config.generation.model);
    }

    let state = AppState::new(db_pool, deps);
    spawn_idle_eviction(
        Arc::clone(&state.sessions),
        state.deps().settings.driver_idle_timeout,
    );
    let app = gdf_profile::build_router(state);

    let port = args.port.or(toml_config.port).unwrap_or(DEFAULT_PORT);
    let addr = SocketAddr::new(args.bind, port);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;
    info!("Listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
