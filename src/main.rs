//! Deposit Watch - deposit reconciliation and alert issuance

use clap::Parser;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use deposit_watch::{
    config::{Args, LogFormat},
    db::MongoClient,
    engine::{spawn_schedule, PassOutcome, Reconciler, ScheduleHandle},
    gateway::{DepositGateway, InMemoryGateway, MongoGateway},
    retention::RetentionSweeper,
};

fn init_tracing(args: &Args) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("deposit_watch={},info", args.log_level).into());

    match args.log_format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
        LogFormat::Text => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init(),
    }
}

async fn connect_gateway(args: &Args) -> anyhow::Result<Arc<dyn DepositGateway>> {
    let connected = match MongoClient::new(&args.mongodb_uri, &args.mongodb_db).await {
        Ok(client) => MongoGateway::new(&client).await,
        Err(e) => Err(e),
    };

    match connected {
        Ok(gateway) => {
            info!("MongoDB connected successfully");
            Ok(Arc::new(gateway))
        }
        Err(e) if args.dev_mode => {
            warn!("MongoDB connection failed (dev mode, using in-memory store): {}", e);
            Ok(Arc::new(InMemoryGateway::new()))
        }
        Err(e) => Err(anyhow::anyhow!("MongoDB connection failed: {}", e)),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    let args = Args::parse();
    init_tracing(&args);

    if let Err(e) = args.validate() {
        error!("{}", e);
        std::process::exit(1);
    }

    info!("======================================");
    info!("  Deposit Watch");
    info!("======================================");
    info!("Mode: {}", if args.dev_mode { "DEVELOPMENT" } else { "PRODUCTION" });
    info!("MongoDB: {} / {}", args.mongodb_uri, args.mongodb_db);
    info!("Schedule: '{}' ({})", args.alert_schedule, args.schedule_timezone);
    info!(
        "Thresholds: near expiration {} days, high value {:.2}",
        args.near_expiration_days, args.high_value_threshold
    );
    if args.retention_enabled {
        info!(
            "Retention: '{}', resolved alerts kept {} days",
            args.retention_schedule, args.retention_days
        );
    } else {
        info!("Retention: disabled");
    }
    info!("======================================");

    let gateway = match connect_gateway(&args).await {
        Ok(gateway) => gateway,
        Err(e) => {
            error!("{}", e);
            std::process::exit(1);
        }
    };

    let reconciler = Arc::new(Reconciler::new(gateway.clone(), args.thresholds()));
    let mut handles: Vec<ScheduleHandle> =
        vec![spawn_schedule(reconciler.clone(), args.alert_cadence()?)];

    if args.retention_enabled {
        let sweeper = Arc::new(RetentionSweeper::new(gateway.clone(), args.retention_days));
        handles.push(spawn_schedule(sweeper, args.retention_cadence()?));
    }

    if args.run_on_startup {
        info!("Running startup reconciliation pass");
        let reconciler = reconciler.clone();
        tokio::spawn(async move {
            if let PassOutcome::Failed(e) = reconciler.run_once().await {
                warn!("Startup pass failed: {}", e);
            }
        });
    }

    // Wait for shutdown signal
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
    }
    info!("Received shutdown signal");

    for handle in handles {
        handle.stopped().await;
    }

    let stats = reconciler.stats();
    info!(
        completed = stats.completed,
        skipped = stats.skipped,
        failed = stats.failed,
        "Deposit Watch shut down"
    );
    Ok(())
}
