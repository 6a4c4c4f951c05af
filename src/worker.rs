//! Translation queue and its single consumer.
//!
//! The queue is an unbounded tokio channel created by [`TranslationWorker::new`].
//! Producers (the report builder and the worker's own retries) hold cloned
//! [`TranslationQueue`] handles; the receiver never leaves the worker.

use crate::config::Config;
use crate::db::Database;
use crate::model::{TranslatedField, TranslationJob};
use crate::retry::RetryConfig;
use crate::translation::TranslationProvider;
use anyhow::{Context, Result};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, error, info, warn};

/// Cloneable producer side of the translation queue
#[derive(Clone)]
pub struct TranslationQueue {
    sender: mpsc::UnboundedSender<TranslationJob>,
    pending: Arc<AtomicUsize>,
}

impl TranslationQueue {
    /// Push a job onto the tail of the queue
    pub fn enqueue(&self, job: TranslationJob) -> Result<()> {
        self.pending.fetch_add(1, Ordering::SeqCst);
        if self.sender.send(job).is_err() {
            self.pending.fetch_sub(1, Ordering::SeqCst);
            anyhow::bail!(
                "Translation worker is gone; dropping job for ticket {} ({})",
                job.ticket_id,
                job.target
            );
        }
        Ok(())
    }

    /// Jobs waiting to be processed
    pub fn len(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// What happens to a job whose provider call failed
#[derive(Debug, Clone, Default)]
pub struct RequeuePolicy {
    /// Failed attempts after which a job is dead-lettered. None never gives up.
    pub max_attempts: Option<u32>,
    /// Delay before a failed job re-enters the queue. None re-enqueues at once.
    pub backoff: Option<RetryConfig>,
}

impl RequeuePolicy {
    /// Retry forever, straight back onto the tail of the queue
    pub fn unbounded() -> Self {
        Self::default()
    }

    pub fn from_config(config: &Config) -> Self {
        let backoff = (config.translation_backoff_ms > 0).then(|| {
            RetryConfig::new(
                u32::MAX,
                Duration::from_millis(config.translation_backoff_ms),
            )
            .with_max_delay(Duration::from_secs(300))
        });

        Self {
            max_attempts: config.translation_max_attempts,
            backoff,
        }
    }

    /// Delay before re-enqueueing a job that has failed `attempts` times
    pub fn delay_for(&self, attempts: u32) -> Duration {
        self.backoff
            .as_ref()
            .map(|backoff| backoff.delay_for_attempt(attempts))
            .unwrap_or(Duration::ZERO)
    }

    pub fn is_exhausted(&self, attempts: u32) -> bool {
        self.max_attempts.is_some_and(|max| attempts >= max)
    }
}

/// Result of a single worker tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Queue was empty
    Idle,
    /// A previous tick is still running
    Busy,
    /// Job finished; `translated` fields were written
    Completed { ticket_id: i64, translated: usize },
    /// Job had nothing to do (missing ticket or original-language target)
    Discarded { ticket_id: i64 },
    /// Job failed and went back onto the queue
    Requeued { ticket_id: i64, attempts: u32 },
    /// Job failed and hit the configured attempt cap
    DeadLettered { ticket_id: i64, attempts: u32 },
}

enum JobResult {
    Translated(usize),
    Discarded,
}

pub struct TranslationWorker {
    db: Database,
    provider: Arc<dyn TranslationProvider>,
    policy: RequeuePolicy,
    queue: TranslationQueue,
    receiver: Mutex<mpsc::UnboundedReceiver<TranslationJob>>,
}

impl TranslationWorker {
    pub fn new(db: Database, provider: Arc<dyn TranslationProvider>, policy: RequeuePolicy) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        let queue = TranslationQueue {
            sender,
            pending: Arc::new(AtomicUsize::new(0)),
        };

        Self {
            db,
            provider,
            policy,
            queue,
            receiver: Mutex::new(receiver),
        }
    }

    /// A producer handle onto this worker's queue
    pub fn queue(&self) -> TranslationQueue {
        self.queue.clone()
    }

    /// Pop and process at most one job
    pub async fn tick(&self) -> Result<TickOutcome> {
        let Ok(mut receiver) = self.receiver.try_lock() else {
            debug!("Previous translation tick still running, skipping");
            return Ok(TickOutcome::Busy);
        };

        let mut job = match receiver.try_recv() {
            Ok(job) => job,
            Err(_) => return Ok(TickOutcome::Idle),
        };
        self.queue.pending.fetch_sub(1, Ordering::SeqCst);

        // The receiver guard stays held while the job runs
        match self.process(&job).await {
            Ok(JobResult::Translated(translated)) => {
                info!(
                    "Translated ticket {} into {} ({} field(s) written)",
                    job.ticket_id, job.target, translated
                );
                Ok(TickOutcome::Completed {
                    ticket_id: job.ticket_id,
                    translated,
                })
            }
            Ok(JobResult::Discarded) => Ok(TickOutcome::Discarded {
                ticket_id: job.ticket_id,
            }),
            Err(e) => {
                job.attempts += 1;

                if self.policy.is_exhausted(job.attempts) {
                    error!(
                        "Dead-lettering translation of ticket {} into {} after {} attempts: {:#}",
                        job.ticket_id, job.target, job.attempts, e
                    );
                    return Ok(TickOutcome::DeadLettered {
                        ticket_id: job.ticket_id,
                        attempts: job.attempts,
                    });
                }

                warn!(
                    "Translation of ticket {} into {} failed (attempt {}), re-enqueueing: {:#}",
                    job.ticket_id, job.target, job.attempts, e
                );
                self.requeue(job)?;

                Ok(TickOutcome::Requeued {
                    ticket_id: job.ticket_id,
                    attempts: job.attempts,
                })
            }
        }
    }

    /// Tick until the queue is empty, returning the number of jobs handled.
    ///
    /// Never returns while a job keeps failing under an unbounded policy.
    pub async fn run_until_idle(&self) -> Result<usize> {
        let mut handled = 0;
        loop {
            match self.tick().await? {
                TickOutcome::Idle | TickOutcome::Busy => return Ok(handled),
                _ => handled += 1,
            }
        }
    }

    fn requeue(&self, job: TranslationJob) -> Result<()> {
        let delay = self.policy.delay_for(job.attempts);
        if delay.is_zero() {
            return self.queue.enqueue(job);
        }

        debug!(
            "Re-enqueueing ticket {} ({}) in {:?}",
            job.ticket_id, job.target, delay
        );
        let queue = self.queue.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Err(e) = queue.enqueue(job) {
                error!("{:#}", e);
            }
        });
        Ok(())
    }

    async fn process(&self, job: &TranslationJob) -> Result<JobResult> {
        let Some(ticket) = self.db.get_ticket(job.ticket_id).await? else {
            warn!(
                "Ticket {} no longer exists, dropping {} translation",
                job.ticket_id, job.target
            );
            return Ok(JobResult::Discarded);
        };

        if job.target == ticket.original_language {
            debug!(
                "Ticket {} is already in {}, nothing to translate",
                ticket.id, job.target
            );
            return Ok(JobResult::Discarded);
        }

        let mut translated = 0;
        for field in TranslatedField::ALL {
            if ticket.has_translation(field, job.target) {
                debug!(
                    "Ticket {} already has a {} {}, skipping",
                    ticket.id,
                    job.target,
                    field.as_str()
                );
                continue;
            }

            let text = self
                .provider
                .translate(ticket.text_for(field), ticket.original_language, job.target)
                .await
                .with_context(|| {
                    format!(
                        "{} failed to translate {} of ticket {}",
                        self.provider.provider_name(),
                        field.as_str(),
                        ticket.id
                    )
                })?;

            if self
                .db
                .add_translation(ticket.id, job.target, field, &text)
                .await?
            {
                translated += 1;
            }
        }

        Ok(JobResult::Translated(translated))
    }
}
