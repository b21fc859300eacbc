use std::sync::Arc;

use demande_core::audit::TracingAuditSink;
use demande_core::config::{AppConfig, ConfigError};
use demande_core::notify::{outbox_channel, NotificationDispatcher};
use demande_core::workflow::EnrollmentWorkflow;
use demande_db::{connect, migrations, DbPool, SqlEnrollmentStore, SqlGradeCatalog};
use thiserror::Error;
use tracing::info;

use crate::mailer::{ConfiguredSender, MailerError, TemplateRenderer};

pub type Dispatcher = NotificationDispatcher<TemplateRenderer, ConfiguredSender>;

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("notification setup failed: {0}")]
    Notifications(#[from] MailerError),
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );

    let db_pool = connect(&config.database).await.map_err(BootstrapError::DatabaseConnect)?;
    info!(
        event_name = "system.bootstrap.database_connected",
        correlation_id = "bootstrap",
        "database connection established"
    );

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(
        event_name = "system.bootstrap.migrations_applied",
        correlation_id = "bootstrap",
        "database migrations applied"
    );

    Ok(Application { config, db_pool })
}

/// Wires the workflow to SQLite and returns the dispatcher that drains its outbox.
pub fn enrollment_services(
    app: &Application,
) -> Result<(EnrollmentWorkflow, Dispatcher), BootstrapError> {
    let renderer = TemplateRenderer::embedded()?;
    let sender = ConfiguredSender::from_config(&app.config.notifications)?;
    info!(
        event_name = "system.bootstrap.notifications_ready",
        correlation_id = "bootstrap",
        sender = sender.kind(),
        "notification sender configured"
    );

    let (outbox, receiver) = outbox_channel();
    let workflow = EnrollmentWorkflow::new(
        Arc::new(SqlGradeCatalog::new(app.db_pool.clone())),
        Arc::new(SqlEnrollmentStore::new(app.db_pool.clone())),
        Arc::new(outbox),
        Arc::new(TracingAuditSink),
        app.config.workflow_settings(),
    );

    Ok((workflow, NotificationDispatcher::new(receiver, renderer, sender)))
}
