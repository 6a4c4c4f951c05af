use crate::db::Database;
use crate::i18n::Language;
use crate::model::{derive_title, NewTicket, TicketStatus, TranslationJob};
use crate::parser::ParsedFields;
use crate::translation::TranslationProvider;
use crate::worker::TranslationQueue;
use anyhow::{Context, Result};
use chrono::Utc;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Turns parsed reports into stored pending tickets and queues their translations
pub struct ReportBuilder {
    db: Database,
    provider: Arc<dyn TranslationProvider>,
    queue: TranslationQueue,
}

impl ReportBuilder {
    pub fn new(db: Database, provider: Arc<dyn TranslationProvider>, queue: TranslationQueue) -> Self {
        Self {
            db,
            provider,
            queue,
        }
    }

    /// Store a report as a NEW ticket and enqueue one job per other language.
    /// Returns the ticket id.
    pub async fn submit(&self, fields: ParsedFields) -> Result<i64> {
        self.submit_message(None, fields).await
    }

    /// Like [`submit`](Self::submit), remembering the Message-ID of the source
    /// mail so the same message never becomes a second ticket.
    pub async fn submit_message(&self, message_id: Option<&str>, fields: ParsedFields) -> Result<i64> {
        let original_language = self.detect_language(&fields.description).await;

        let ticket = NewTicket {
            title: derive_title(&fields.description),
            name: fields.name,
            email: fields.email,
            phone: fields.phone,
            address: fields.address,
            apartment: fields.apartment,
            description: fields.description,
            original_language,
            status: TicketStatus::New,
            received: Utc::now(),
            message_id: message_id.map(str::to_string),
        };

        let id = match self.db.insert_ticket(&ticket).await {
            Ok(id) => id,
            Err(e) => {
                error!("Dropping report from '{}': {:#}", ticket.email, e);
                return Err(e).context("Failed to persist report");
            }
        };

        let mut queued = 0;
        for target in Language::targets_for(original_language) {
            match self.queue.enqueue(TranslationJob::new(id, target)) {
                Ok(()) => queued += 1,
                Err(e) => error!("{:#}", e),
            }
        }

        info!(
            "Created ticket {} ({}), {} translation job(s) queued",
            id, original_language, queued
        );
        Ok(id)
    }

    /// True if a ticket already exists for this Message-ID
    pub async fn is_ingested(&self, message_id: &str) -> Result<bool> {
        self.db.has_message(message_id).await
    }

    async fn detect_language(&self, description: &str) -> Language {
        match self.provider.detect_language(description).await {
            Ok(code) => Language::from_code(&code).unwrap_or_else(|e| {
                warn!("{}, using {}", e, Language::BASE);
                Language::BASE
            }),
            Err(e) => {
                warn!(
                    "{} language detection failed ({}), using {}",
                    self.provider.provider_name(),
                    e,
                    Language::BASE
                );
                Language::BASE
            }
        }
    }
}
