//! Translation provider adapter.
//!
//! The pipeline only ever talks to a [`TranslationProvider`]; the Google
//! Translate v2 client below is the production implementation. Calls are
//! awaited inline by the worker, so a batched or queued provider can be
//! dropped in behind the trait without touching the queue or the parser.

use crate::config::Config;
use crate::i18n::Language;
use crate::mail::html::decode_entities;
use crate::retry::{with_retry_if, RetryConfig};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Error returned by a translation provider
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Request never got a response (connect, timeout, body read)
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    /// Provider answered with a non-success status
    #[error("provider API error ({status}): {body}")]
    Api { status: StatusCode, body: String },
    /// Response did not have the expected shape
    #[error("invalid provider response: {0}")]
    InvalidResponse(String),
    /// Provider is misconfigured
    #[error("provider configuration error: {0}")]
    Config(String),
}

impl ProviderError {
    /// Network errors, rate limiting and server errors are transient
    pub fn is_retryable(&self) -> bool {
        match self {
            ProviderError::Http(_) => true,
            ProviderError::Api { status, .. } => {
                *status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
            }
            ProviderError::InvalidResponse(_) | ProviderError::Config(_) => false,
        }
    }
}

/// Language detection and machine translation
#[async_trait]
pub trait TranslationProvider: Send + Sync {
    /// Translate `text` from `source` into `target`
    async fn translate(
        &self,
        text: &str,
        source: Language,
        target: Language,
    ) -> Result<String, ProviderError>;

    /// Detect the language of `text`, returning the provider's language code
    async fn detect_language(&self, text: &str) -> Result<String, ProviderError>;

    /// Name used in logs
    fn provider_name(&self) -> &str;
}

#[derive(Debug, Deserialize)]
struct TranslateResponse {
    data: TranslateData,
}

#[derive(Debug, Deserialize)]
struct TranslateData {
    translations: Vec<Translated>,
}

#[derive(Debug, Deserialize)]
struct Translated {
    #[serde(rename = "translatedText")]
    translated_text: String,
}

#[derive(Debug, Deserialize)]
struct DetectResponse {
    data: DetectData,
}

#[derive(Debug, Deserialize)]
struct DetectData {
    detections: Vec<Vec<Detection>>,
}

#[derive(Debug, Deserialize)]
struct Detection {
    language: String,
}

/// Google Translate API v2 provider
#[derive(Clone)]
pub struct GoogleTranslateProvider {
    api_key: String,
    client: reqwest::Client,
    /// Translate endpoint; detection lives at `{base_url}/detect`
    base_url: String,
    retry: RetryConfig,
}

impl GoogleTranslateProvider {
    pub fn new(api_key: String, base_url: String) -> Result<Self, ProviderError> {
        if api_key.trim().is_empty() {
            return Err(ProviderError::Config("API key cannot be empty".to_string()));
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            api_key,
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            retry: RetryConfig::provider_call(),
        })
    }

    pub fn from_config(config: &Config) -> Result<Self, ProviderError> {
        Self::new(
            config.google_translate_api_key.clone(),
            config.google_translate_api_url.clone(),
        )
    }

    /// Override the in-call retry behaviour
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    async fn post<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
        body: &serde_json::Value,
    ) -> Result<T, ProviderError> {
        let response = self
            .client
            .post(url)
            .query(&[("key", self.api_key.as_str())])
            .json(body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response
                .text()
                .await
                .unwrap_or_else(|e| format!("<failed to read body: {}>", e));
            return Err(ProviderError::Api { status, body });
        }

        response
            .json::<T>()
            .await
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))
    }
}

#[async_trait]
impl TranslationProvider for GoogleTranslateProvider {
    async fn translate(
        &self,
        text: &str,
        source: Language,
        target: Language,
    ) -> Result<String, ProviderError> {
        if text.trim().is_empty() || source == target {
            return Ok(text.to_string());
        }

        let body = json!({
            "q": [text],
            "source": source.code(),
            "target": target.code(),
            "format": "text"
        });

        let response: TranslateResponse = with_retry_if(
            &self.retry,
            &format!("Translation {} -> {}", source, target),
            || self.post(&self.base_url, &body),
            ProviderError::is_retryable,
        )
        .await?;

        let translated = response
            .data
            .translations
            .into_iter()
            .next()
            .map(|t| t.translated_text)
            .ok_or_else(|| {
                ProviderError::InvalidResponse("response contained no translations".to_string())
            })?;

        Ok(decode_entities(&translated))
    }

    async fn detect_language(&self, text: &str) -> Result<String, ProviderError> {
        if text.trim().is_empty() {
            return Err(ProviderError::InvalidResponse(
                "cannot detect language of empty text".to_string(),
            ));
        }

        let url = format!("{}/detect", self.base_url);
        let body = json!({ "q": [text] });

        let response: DetectResponse = with_retry_if(
            &self.retry,
            "Language detection",
            || self.post(&url, &body),
            ProviderError::is_retryable,
        )
        .await?;

        let language = response
            .data
            .detections
            .into_iter()
            .next()
            .and_then(|candidates| candidates.into_iter().next())
            .map(|d| d.language)
            .ok_or_else(|| {
                ProviderError::InvalidResponse("response contained no detections".to_string())
            })?;

        debug!("Detected language: {}", language);
        Ok(language)
    }

    fn provider_name(&self) -> &str {
        "Google Translate"
    }
}
