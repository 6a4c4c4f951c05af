use anyhow::{Context, Result};
use std::time::Duration;

/// Mailbox connection and acceptance settings
#[derive(Debug, Clone)]
pub struct MailConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub folder: String,

    // Acceptance
    pub accepted_sender: String,
    pub accepted_recipient: String,
    /// Required outside production
    pub accepted_reply_to: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Config {
    /// "production" enables the production acceptance rule
    pub environment: String,

    // Mail
    pub mail: MailConfig,
    pub mail_poll_interval_secs: u64,

    // Google Translate
    pub google_translate_api_key: String,
    pub google_translate_api_url: String,

    // Storage
    pub database_url: String,

    // Translation queue
    pub translation_tick_secs: u64,
    /// None retries forever
    pub translation_max_attempts: Option<u32>,
    /// Zero re-enqueues immediately
    pub translation_backoff_ms: u64,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let environment =
            std::env::var("ENVIRONMENT").unwrap_or_else(|_| "production".to_string());
        let production = environment == "production";

        let accepted_reply_to = std::env::var("MAIL_ACCEPTED_REPLY_TO").ok();
        if !production && accepted_reply_to.is_none() {
            anyhow::bail!(
                "MAIL_ACCEPTED_REPLY_TO must be set when ENVIRONMENT is '{}'",
                environment
            );
        }

        Ok(Self {
            environment,

            // Mail
            mail: MailConfig {
                host: std::env::var("MAIL_HOST").context("MAIL_HOST not set")?,
                port: std::env::var("MAIL_PORT")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(993),
                username: std::env::var("MAIL_USERNAME").context("MAIL_USERNAME not set")?,
                password: std::env::var("MAIL_PASSWORD").context("MAIL_PASSWORD not set")?,
                folder: std::env::var("MAIL_FOLDER").unwrap_or_else(|_| "INBOX".to_string()),
                accepted_sender: std::env::var("MAIL_ACCEPTED_SENDER")
                    .context("MAIL_ACCEPTED_SENDER not set")?,
                accepted_recipient: std::env::var("MAIL_ACCEPTED_RECIPIENT")
                    .context("MAIL_ACCEPTED_RECIPIENT not set")?,
                accepted_reply_to,
            },
            mail_poll_interval_secs: std::env::var("MAIL_POLL_INTERVAL_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(60),

            // Google Translate
            google_translate_api_key: std::env::var("GOOGLE_TRANSLATE_API_KEY")
                .context("GOOGLE_TRANSLATE_API_KEY not set")?,
            google_translate_api_url: std::env::var("GOOGLE_TRANSLATE_API_URL").unwrap_or_else(
                |_| "https://translation.googleapis.com/language/translate/v2".to_string(),
            ),

            // Storage
            database_url: std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite://intake.db".to_string()),

            // Translation queue
            translation_tick_secs: std::env::var("TRANSLATION_TICK_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(5),
            translation_max_attempts: std::env::var("TRANSLATION_MAX_ATTEMPTS")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|max: &u32| *max > 0),
            translation_backoff_ms: std::env::var("TRANSLATION_BACKOFF_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(0),
        })
    }

    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    pub fn mail_poll_interval(&self) -> Duration {
        Duration::from_secs(self.mail_poll_interval_secs.max(1))
    }

    pub fn translation_tick(&self) -> Duration {
        Duration::from_secs(self.translation_tick_secs.max(1))
    }
}
