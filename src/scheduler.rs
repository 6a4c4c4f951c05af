use crate::mail::MailboxPoller;
use crate::worker::TranslationWorker;
use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{debug, error, info};

/// Start the two periodic activities: mailbox polling and translation ticks.
///
/// Each activity guards itself against overlapping runs; the two may run
/// concurrently with each other.
pub async fn start_scheduler(
    poller: Arc<MailboxPoller>,
    worker: Arc<TranslationWorker>,
    poll_interval: Duration,
    tick_interval: Duration,
) -> Result<JobScheduler> {
    let scheduler = JobScheduler::new().await?;

    info!("Scheduling mailbox poll every {:?}", poll_interval);
    let poll_job = Job::new_repeated_async(poll_interval, move |_uuid, _l| {
        let poller = Arc::clone(&poller);

        Box::pin(async move {
            if let Err(e) = poller.poll_once().await {
                error!("Mailbox poll failed: {:#}", e);
            }
        })
    })?;
    scheduler.add(poll_job).await?;

    info!("Scheduling translation tick every {:?}", tick_interval);
    let tick_job = Job::new_repeated_async(tick_interval, move |_uuid, _l| {
        let worker = Arc::clone(&worker);

        Box::pin(async move {
            match worker.tick().await {
                Ok(outcome) => debug!("Translation tick: {:?}", outcome),
                Err(e) => error!("Translation tick failed: {:#}", e),
            }
        })
    })?;
    scheduler.add(tick_job).await?;

    scheduler.start().await?;
    info!("✓ Scheduler started");

    Ok(scheduler)
}
