//! Test doubles shared by unit tests.

use crate::i18n::Language;
use crate::translation::{ProviderError, TranslationProvider};
use async_trait::async_trait;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

/// Provider that "translates" by prefixing the target code: `[en] text`
pub struct MockProvider {
    detected: Option<String>,
    /// Remaining failures, optionally only for one exact input text
    failures: Mutex<(Option<String>, u32)>,
    translate_calls: AtomicU32,
    detect_calls: AtomicU32,
}

impl MockProvider {
    pub fn new() -> Self {
        Self {
            detected: Some("sv".to_string()),
            failures: Mutex::new((None, 0)),
            translate_calls: AtomicU32::new(0),
            detect_calls: AtomicU32::new(0),
        }
    }

    pub fn detecting(mut self, code: &str) -> Self {
        self.detected = Some(code.to_string());
        self
    }

    pub fn failing_detection(mut self) -> Self {
        self.detected = None;
        self
    }

    /// Fail the next `count` translate calls
    pub fn failing_translations(self, count: u32) -> Self {
        *self.failures.lock().unwrap() = (None, count);
        self
    }

    /// Fail the next `count` translate calls for exactly `text`
    pub fn failing_on(self, text: &str, count: u32) -> Self {
        *self.failures.lock().unwrap() = (Some(text.to_string()), count);
        self
    }

    pub fn translate_calls(&self) -> u32 {
        self.translate_calls.load(Ordering::SeqCst)
    }

    pub fn detect_calls(&self) -> u32 {
        self.detect_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TranslationProvider for MockProvider {
    async fn translate(
        &self,
        text: &str,
        _source: Language,
        target: Language,
    ) -> Result<String, ProviderError> {
        self.translate_calls.fetch_add(1, Ordering::SeqCst);

        {
            let mut failures = self.failures.lock().unwrap();
            let applies = failures.0.as_deref().map_or(true, |only| only == text);
            if applies && failures.1 > 0 {
                failures.1 -= 1;
                return Err(ProviderError::InvalidResponse("mock failure".to_string()));
            }
        }

        Ok(format!("[{}] {}", target.code(), text))
    }

    async fn detect_language(&self, _text: &str) -> Result<String, ProviderError> {
        self.detect_calls.fetch_add(1, Ordering::SeqCst);
        self.detected
            .clone()
            .ok_or_else(|| ProviderError::InvalidResponse("mock detection failure".to_string()))
    }

    fn provider_name(&self) -> &str {
        "Mock"
    }
}
