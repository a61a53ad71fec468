use clap::{Parser, Subcommand};
use dotenvy::dotenv;
use file_lifecycle::AppState;
use file_lifecycle::config::ServiceConfig;
use file_lifecycle::infrastructure::{authorization, database, scanner, storage};
use file_lifecycle::services::expiration::ExpiryScheduler;
use tokio::signal;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    /// Run the daily expiry scheduler until interrupted (default)
    Serve,
    /// Run one expiry sweep now and exit
    Sweep,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    let args = Args::parse();
    let command = args.command.unwrap_or(Command::Serve);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "file_lifecycle=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("🚀 Starting file lifecycle service [{:?}]...", command);

    let config = ServiceConfig::from_env();
    info!(
        "🛡️  Config: Default Expiry={}d, Virus Scan={}, Scan Timeout={}ms, Policy={:?}",
        config.default_expiry_days,
        config.enable_virus_scan,
        config.scan_timeout_ms,
        config.scan_failure_policy
    );

    let db = database::setup_database().await?;
    let storage_service = storage::setup_storage().await?;

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let scheduler = ExpiryScheduler::new(
        db.clone(),
        storage_service.clone(),
        config.clone(),
        shutdown_rx,
    );

    match command {
        Command::Sweep => {
            let report = scheduler.run_sweep().await;
            println!("{}", report);
        }
        Command::Serve => {
            let scanner_service = scanner::setup_scanner(&config).await?;
            let authz = authorization::setup_authorization(&config)?;
            let state = AppState::new(
                db.clone(),
                storage_service.clone(),
                scanner_service,
                authz,
                config.clone(),
            );
            info!("✅ Services ready (bucket {})", state.storage.bucket());

            let handle = tokio::spawn(scheduler.run());

            shutdown_signal().await;
            let _ = shutdown_tx.send(true);
            handle.await?;

            info!("🛑 Shut down gracefully.");
        }
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("⌨️  Ctrl+C received, starting graceful shutdown...");
        },
        _ = terminate => {
            info!("💤 SIGTERM received, starting graceful shutdown...");
        },
    }
}
