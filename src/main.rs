use clap::Parser;
use sqlx::migrate::Migrator;
use std::net::SocketAddr;
use std::path::Path;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use resident_core::cli::{Cli, Commands, DbCommands, handle_config_validate, handle_db_migrate};
use resident_core::config::Config;
use resident_core::services::card::run_status_poller;
use resident_core::{AppState, create_app, db, startup};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = Config::from_env()?;

    // Setup logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    match cli.command {
        Some(Commands::Db(DbCommands::Migrate)) => return handle_db_migrate(&config).await,
        Some(Commands::Config) => return handle_config_validate(&config),
        Some(Commands::Serve) | None => {}
    }

    // Database pool
    let pool = db::create_pool(&config).await?;

    // Run migrations
    let migrator = Migrator::new(Path::new("./migrations")).await?;
    migrator.run(&pool).await?;
    tracing::info!("Database migrations completed");

    let report = startup::validate_environment(&config, &pool).await?;
    report.print();
    if !report.is_valid() {
        tracing::warn!("startup validation failed, continuing anyway");
    }

    let state = AppState::new(pool.clone(), &config);

    // Background poller finishes asynchronously issued cards
    tokio::spawn(run_status_poller(
        pool,
        state.credential.clone(),
        state.notifier.clone(),
        config.card_poll_interval_secs,
    ));

    let app = create_app(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    tracing::info!("listening on {}", addr);

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
