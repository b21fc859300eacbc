mod bootstrap;
mod enrollments;
mod health;
mod mailer;

use std::time::Duration;

use anyhow::Result;
use demande_core::config::{AppConfig, LoadOptions};

fn init_logging(config: &AppConfig) {
    use demande_core::config::LogFormat::*;
    use tracing::Level;

    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);

    match config.logging.format {
        Compact => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).compact().init();
        }
        Pretty => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).pretty().init();
        }
        Json => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).json().init();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    run().await
}

pub async fn run() -> Result<()> {
    // Logging must be up before bootstrap so its events are recorded.
    let config = AppConfig::load(LoadOptions::default())?;
    init_logging(&config);

    let app = bootstrap::bootstrap_with_config(config).await?;
    let (workflow, dispatcher) = bootstrap::enrollment_services(&app)?;
    let dispatcher = tokio::spawn(dispatcher.run());

    let address = format!("{}:{}", app.config.server.bind_address, app.config.server.port);
    let listener = tokio::net::TcpListener::bind(&address).await?;
    let routes = health::router(app.db_pool.clone()).merge(enrollments::router(workflow));

    tracing::info!(
        event_name = "system.server.started",
        correlation_id = "bootstrap",
        bind_address = %address,
        "demande-server listening"
    );
    axum::serve(listener, routes).with_graceful_shutdown(wait_for_shutdown()).await?;
    tracing::info!(
        event_name = "system.server.stopping",
        correlation_id = "shutdown",
        "demande-server stopping"
    );

    // The router owned the last outbox handle, so the dispatcher now runs dry.
    let grace = Duration::from_secs(app.config.server.graceful_shutdown_secs);
    match tokio::time::timeout(grace, dispatcher).await {
        Ok(Ok(report)) => tracing::info!(
            event_name = "system.notifications.drained",
            correlation_id = "shutdown",
            delivered = report.delivered,
            failed = report.failed,
            "notification outbox drained"
        ),
        Ok(Err(error)) => tracing::error!(
            event_name = "system.notifications.dispatcher_failed",
            correlation_id = "shutdown",
            error = %error,
            "notification dispatcher task failed"
        ),
        Err(_) => tracing::warn!(
            event_name = "system.notifications.drain_timeout",
            correlation_id = "shutdown",
            grace_secs = grace.as_secs(),
            "notification outbox not drained before shutdown deadline"
        ),
    }

    app.db_pool.close().await;
    Ok(())
}

async fn wait_for_shutdown() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        tracing::error!(
            event_name = "system.server.signal_error",
            correlation_id = "shutdown",
            error = %error,
            "failed to listen for shutdown signal"
        );
        std::future::pending::<()>().await;
    }
}
