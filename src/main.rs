use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use lessonbook::config::Config;
use lessonbook::directory::DbDirectory;
use lessonbook::scheduler::{spawn_reconciler, LessonPolicy, LessonScheduler, RetryPolicy};
use lessonbook::AppState;

#[derive(Parser, Debug)]
#[command(name = "lessonbook")]
#[command(author, version, about = "Private-lesson scheduling and credit ledger service", long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "lessonbook.toml", env = "LESSONBOOK_CONFIG")]
    config: std::path::PathBuf,

    /// Override log level
    #[arg(short, long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = Config::load(&cli.config)?;

    // Initialize logging
    let log_level = cli
        .log_level
        .as_ref()
        .unwrap_or(&config.logging.level)
        .clone();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_level)),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting lessonbook v{}", env!("CARGO_PKG_VERSION"));

    // Ensure data directory exists
    std::fs::create_dir_all(&config.server.data_dir).with_context(|| {
        format!(
            "Failed to create data directory: {}",
            config.server.data_dir.display()
        )
    })?;

    // Initialize database
    let db = lessonbook::db::init(&config.server.data_dir, &config.storage).await?;

    if config.payments.webhook_secret.is_none() {
        tracing::warn!("payments.webhook_secret is not set, payment webhooks will be rejected");
    }

    // Identity and profiles are read from the locally replicated read models
    let directory = Arc::new(DbDirectory::new(db.clone()));
    let scheduler = Arc::new(LessonScheduler::new(
        db.clone(),
        directory.clone(),
        directory,
        LessonPolicy::from_config(&config),
        RetryPolicy::from_config(&config.storage),
    ));

    let metrics_handle =
        lessonbook::api::metrics::init_metrics().context("Failed to install Prometheus recorder")?;

    spawn_reconciler(scheduler.clone(), config.reconciler.clone());

    let state = Arc::new(
        AppState::new(config.clone(), db.clone(), scheduler).with_metrics(metrics_handle),
    );
    let app = lessonbook::api::create_router(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    tracing::info!("API server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    db.close().await;
    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
