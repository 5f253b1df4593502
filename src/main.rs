mod config;
mod db;
mod delivery;
mod feed;
#[cfg(test)]
mod http_stub;
mod models;
mod processor;

use anyhow::Context;
use clap::{Parser, Subcommand};
use config::AppConfig;
use db::{PgWarningStore, WarningStore};
use delivery::{DeliveryClient, WarningDelivery};
use feed::FeedClient;
use models::WarningStatus;
use processor::area::AreaClassifier;
use processor::poll_cycle::{CycleSettings, PollCycle};
use processor::scheduler::{self, Schedule};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "nautical-warnings")]
#[command(about = "Polls nautical warnings and forwards them downstream")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the poller (default)
    Run,
    /// Print stored warnings with the given status as JSON
    List {
        /// active | expired
        status: WarningStatus,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load config
    let config = AppConfig::load()?;

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(&config.log_level)
        .init();

    // Init DB
    let pool = db::init_pool(&config.database_url).await?;
    info!("Connected to database");

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => {
            db::ensure_schema(&pool).await?;
            run(config, Arc::new(PgWarningStore::new(pool))).await
        }
        Command::List { status } => {
            let store = PgWarningStore::new(pool);
            let records = store.find_by_status(status).await?;
            println!("{}", serde_json::to_string_pretty(&records)?);
            Ok(())
        }
    }
}

async fn run(config: AppConfig, store: Arc<PgWarningStore>) -> anyhow::Result<()> {
    info!("Starting Nautical Warnings Service...");

    if !config.poller_enabled {
        info!("Poller is disabled, nothing to do");
        return Ok(());
    }

    // Reference areas are loaded once; the service cannot classify without them.
    let classifier = match &config.sea_areas_path {
        Some(path) => AreaClassifier::from_path(path),
        None => AreaClassifier::bundled(),
    }
    .context("loading reference sea areas")?;
    info!("Classifying warnings against {} reference areas", classifier.areas().len());

    let timeout = Duration::from_secs(config.request_timeout_secs);
    let feed = Arc::new(FeedClient::new(&config.feed_url, timeout)?);
    let delivery: Option<Arc<dyn WarningDelivery>> = if config.delivery_enabled {
        Some(Arc::new(DeliveryClient::new(
            &config.delivery_url,
            &config.delivery_user,
            &config.delivery_password,
            timeout,
        )?))
    } else {
        info!("Downstream delivery is disabled");
        None
    };

    let cycle = PollCycle::new(
        store,
        feed,
        delivery,
        Arc::new(classifier),
        CycleSettings {
            retention: config.retention,
            skip_unbuildable: config.skip_unbuildable,
        },
    );
    info!("Expired warnings are kept for {}", config.retention);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Cannot listen for shutdown signal: {}", e);
            // Keep the sender alive so the poller is not stopped.
            std::future::pending::<()>().await;
        }
        let _ = shutdown_tx.send(true);
    });

    let schedule = Schedule {
        initial_delay: Duration::from_secs(config.poll_initial_delay_secs),
        frequency: Duration::from_secs(config.poll_frequency_secs),
    };
    scheduler::run_scheduler(cycle, schedule, shutdown_rx).await;

    info!("Nautical Warnings Service stopped");
    Ok(())
}
