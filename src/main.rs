//! # evosync Main Entry Point
//!
//! Starts the API server plus the in-process reconciliation loop, or runs
//! one of the operational subcommands.

use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;

use evosync::config::ConfigLoader;
use evosync::feed::StatusFeed;
use evosync::migration::{Migrator, MigratorTrait};
use evosync::provider::EvolutionClient;
use evosync::reconcile::RunTrigger;
use evosync::server::{AppState, run_server};
use evosync::{db, telemetry};

#[derive(Parser)]
#[command(name = "evosync", about = "WhatsApp-instance connection reconciliation service")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the API server and the scheduled reconciliation loop
    Serve,
    /// Apply database migrations and exit
    Migrate,
    /// Run one reconciliation pass and exit
    SyncOnce,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Load configuration from layered env files and variables
    let config = ConfigLoader::new().load()?;
    telemetry::init_tracing(&config)?;

    tracing::info!(profile = %config.profile, "Loaded configuration");
    if let Ok(redacted_json) = config.redacted_json() {
        tracing::debug!(config = %redacted_json, "Effective configuration");
    }

    let config = Arc::new(config);
    let db = Arc::new(db::init_pool(&config).await?);
    Migrator::up(db.as_ref(), None).await?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::Migrate => {
            tracing::info!("Migrations applied");
        }
        Command::SyncOnce => {
            let provider = Arc::new(EvolutionClient::from_config(&config.evolution)?);
            let state = AppState::new(config, db, provider, StatusFeed::default());

            let summary = state
                .reconcile_job()
                .run_once(RunTrigger {
                    automatic: false,
                    source: "cli".to_string(),
                })
                .await?;
            println!("{}", summary.message());
        }
        Command::Serve => {
            let provider = Arc::new(EvolutionClient::from_config(&config.evolution)?);
            let state = AppState::new(
                Arc::clone(&config),
                db,
                provider,
                StatusFeed::default(),
            );

            let shutdown = CancellationToken::new();
            let reconciler = config.reconciler.enabled.then(|| {
                tokio::spawn(state.reconcile_job().run(shutdown.clone()))
            });

            let result = run_server(state).await;

            shutdown.cancel();
            if let Some(handle) = reconciler {
                let _ = handle.await;
            }
            result?;
        }
    }

    Ok(())
}
