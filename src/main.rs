use anyhow::{Context, Result};
use incident_intake::config::Config;
use incident_intake::db::Database;
use incident_intake::mail::{AcceptanceRule, ImapMailSource, MailboxPoller};
use incident_intake::report::ReportBuilder;
use incident_intake::scheduler;
use incident_intake::translation::{GoogleTranslateProvider, TranslationProvider};
use incident_intake::worker::{RequeuePolicy, TranslationWorker};
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file (ignored in production)
    let _ = dotenvy::dotenv();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("incident_intake=info".parse()?),
        )
        .init();

    info!("Starting incident intake");

    // Load configuration from environment
    let config = Config::from_env()?;
    info!(
        "Environment: {}, mailbox: {}@{}:{}/{}",
        config.environment,
        config.mail.username,
        config.mail.host,
        config.mail.port,
        config.mail.folder
    );

    let db = Database::new(&config.database_url)
        .await
        .context("Failed to open ticket store")?;

    let provider: Arc<dyn TranslationProvider> = Arc::new(
        GoogleTranslateProvider::from_config(&config)
            .context("Failed to create translation provider")?,
    );

    let policy = RequeuePolicy::from_config(&config);
    match policy.max_attempts {
        Some(max) => info!("Translation jobs dead-letter after {} attempts", max),
        None => info!("Translation jobs retry until they succeed"),
    }

    let worker = Arc::new(TranslationWorker::new(
        db.clone(),
        Arc::clone(&provider),
        policy,
    ));
    let builder = Arc::new(ReportBuilder::new(db.clone(), provider, worker.queue()));

    let rule = AcceptanceRule::from_config(&config.mail, config.is_production());
    let source = Arc::new(ImapMailSource::new(config.mail.clone()));
    let poller = Arc::new(MailboxPoller::new(source, rule, builder));

    let mut scheduler = scheduler::start_scheduler(
        poller,
        Arc::clone(&worker),
        config.mail_poll_interval(),
        config.translation_tick(),
    )
    .await?;

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;

    info!(
        "Shutting down, {} translation job(s) still queued",
        worker.queue().len()
    );
    scheduler.shutdown().await?;
    db.close().await;

    Ok(())
}
