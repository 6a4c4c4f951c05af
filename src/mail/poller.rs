use super::source::{FetchedMail, MailSource};
use super::{extract, html};
use crate::config::MailConfig;
use crate::parser;
use crate::report::ReportBuilder;
use anyhow::{Context, Result};
use mailparse::{addrparse_header, MailAddr, MailHeader, MailHeaderMap};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

/// Addresses a message was sent from, to, and asks replies to go to
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Envelope {
    pub from: Vec<String>,
    pub to: Vec<String>,
    pub reply_to: Vec<String>,
}

impl Envelope {
    pub fn from_headers(headers: &[MailHeader<'_>]) -> Self {
        Self {
            from: addresses(headers, "From"),
            to: addresses(headers, "To"),
            reply_to: addresses(headers, "Reply-To"),
        }
    }
}

fn addresses(headers: &[MailHeader<'_>], name: &str) -> Vec<String> {
    let mut found = Vec::new();

    for header in headers.get_all_headers(name) {
        let list = match addrparse_header(header) {
            Ok(list) => list,
            Err(e) => {
                warn!("Unparseable {} header: {}", name, e);
                continue;
            }
        };

        for addr in list.iter() {
            match addr {
                MailAddr::Single(info) => found.push(info.addr.clone()),
                MailAddr::Group(group) => {
                    found.extend(group.addrs.iter().map(|info| info.addr.clone()))
                }
            }
        }
    }

    found
}

/// Which messages count as incident reports
#[derive(Debug, Clone)]
pub struct AcceptanceRule {
    pub sender: String,
    pub recipient: String,
    /// Only checked outside production
    pub reply_to: Option<String>,
}

impl AcceptanceRule {
    pub fn from_config(config: &MailConfig, production: bool) -> Self {
        Self {
            sender: config.accepted_sender.clone(),
            recipient: config.accepted_recipient.clone(),
            reply_to: if production {
                None
            } else {
                config.accepted_reply_to.clone()
            },
        }
    }

    pub fn accepts(&self, envelope: &Envelope) -> bool {
        let matches = |candidates: &[String], expected: &str| {
            candidates
                .iter()
                .any(|address| address.trim().eq_ignore_ascii_case(expected.trim()))
        };

        matches(&envelope.from, &self.sender)
            && matches(&envelope.to, &self.recipient)
            && self
                .reply_to
                .as_deref()
                .map_or(true, |reply_to| matches(&envelope.reply_to, reply_to))
    }
}

/// Counters for one poll of the mailbox
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollSummary {
    pub inspected: usize,
    pub accepted: usize,
    pub created: usize,
    /// Accepted but empty after cleaning
    pub skipped: usize,
    /// Accepted but already turned into a ticket by an earlier poll
    pub duplicates: usize,
    pub failed: usize,
}

enum MessageOutcome {
    Rejected,
    Empty,
    Duplicate,
    Created(i64),
}

pub struct MailboxPoller {
    source: Arc<dyn MailSource>,
    rule: AcceptanceRule,
    builder: Arc<ReportBuilder>,
    running: Mutex<()>,
}

impl MailboxPoller {
    pub fn new(source: Arc<dyn MailSource>, rule: AcceptanceRule, builder: Arc<ReportBuilder>) -> Self {
        Self {
            source,
            rule,
            builder,
            running: Mutex::new(()),
        }
    }

    /// Fetch unseen mail, turn accepted reports into tickets and mark
    /// everything inspected as seen.
    ///
    /// A mailbox that cannot be reached is an error and leaves every flag
    /// untouched. Failures inside a single message are logged and counted.
    pub async fn poll_once(&self) -> Result<PollSummary> {
        let Ok(_running) = self.running.try_lock() else {
            debug!("Previous mailbox poll still running, skipping");
            return Ok(PollSummary::default());
        };

        let source = Arc::clone(&self.source);
        let messages = tokio::task::spawn_blocking(move || source.fetch_unseen())
            .await
            .context("Mailbox fetch task failed")?
            .context("Failed to fetch unseen mail")?;

        let mut summary = PollSummary {
            inspected: messages.len(),
            ..Default::default()
        };
        if messages.is_empty() {
            debug!("No unseen mail");
            return Ok(summary);
        }
        info!("Inspecting {} unseen message(s)", messages.len());

        for mail in &messages {
            match self.handle_message(mail).await {
                Ok(MessageOutcome::Rejected) => {}
                Ok(MessageOutcome::Empty) => {
                    summary.accepted += 1;
                    summary.skipped += 1;
                }
                Ok(MessageOutcome::Duplicate) => {
                    summary.accepted += 1;
                    summary.duplicates += 1;
                }
                Ok(MessageOutcome::Created(id)) => {
                    summary.accepted += 1;
                    summary.created += 1;
                    debug!("Message uid {} became ticket {}", mail.uid, id);
                }
                Err(e) => {
                    summary.failed += 1;
                    error!("Failed to process message uid {}: {:#}", mail.uid, e);
                }
            }
        }

        let uids: Vec<u32> = messages.iter().map(|mail| mail.uid).collect();
        let source = Arc::clone(&self.source);
        match tokio::task::spawn_blocking(move || source.mark_seen(&uids)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!("Failed to mark messages as seen: {:#}", e),
            Err(e) => error!("Mark-seen task failed: {}", e),
        }

        info!(
            "Mail poll done: {} inspected, {} accepted, {} ticket(s) created, {} duplicate(s), {} failed",
            summary.inspected, summary.accepted, summary.created, summary.duplicates, summary.failed
        );
        Ok(summary)
    }

    async fn handle_message(&self, mail: &FetchedMail) -> Result<MessageOutcome> {
        let parsed = mailparse::parse_mail(&mail.raw).context("Malformed message")?;

        let envelope = Envelope::from_headers(&parsed.headers);
        if !self.rule.accepts(&envelope) {
            debug!(
                "Ignoring message uid {} from {:?} to {:?}",
                mail.uid, envelope.from, envelope.to
            );
            return Ok(MessageOutcome::Rejected);
        }

        // A batch whose seen flags were never stored comes back on the next poll
        let message_id = parsed
            .headers
            .get_first_value("Message-ID")
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty());
        if let Some(id) = &message_id {
            if self.builder.is_ingested(id).await? {
                info!("Message uid {} ({}) is already a ticket, skipping", mail.uid, id);
                return Ok(MessageOutcome::Duplicate);
            }
        }

        let text = html::clean(&extract::extract_text(&parsed));
        if text.is_empty() {
            warn!("Message uid {} has no text content, skipping", mail.uid);
            return Ok(MessageOutcome::Empty);
        }

        let fields = parser::parse(&text);
        let id = self
            .builder
            .submit_message(message_id.as_deref(), fields)
            .await?;
        Ok(MessageOutcome::Created(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::i18n::Language;
    use crate::testing::MockProvider;
    use crate::translation::TranslationProvider;
    use crate::worker::{RequeuePolicy, TranslationWorker};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex as StdMutex;
    use tempfile::TempDir;

    const INTAKE: &str = "felanmalan@example.se";

    #[derive(Default)]
    struct FakeSource {
        messages: Vec<FetchedMail>,
        unreachable: bool,
        fetches: AtomicUsize,
        /// How many upcoming mark_seen calls fail
        mark_seen_failures: AtomicUsize,
        seen: StdMutex<Vec<u32>>,
    }

    impl MailSource for FakeSource {
        fn fetch_unseen(&self) -> Result<Vec<FetchedMail>> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            if self.unreachable {
                anyhow::bail!("connection refused");
            }
            Ok(self.messages.clone())
        }

        fn mark_seen(&self, uids: &[u32]) -> Result<()> {
            if self.mark_seen_failures.load(Ordering::SeqCst) > 0 {
                self.mark_seen_failures.fetch_sub(1, Ordering::SeqCst);
                anyhow::bail!("connection reset");
            }
            self.seen.lock().unwrap().extend_from_slice(uids);
            Ok(())
        }
    }

    fn message(uid: u32, from: &str, body: &str) -> FetchedMail {
        let raw = format!(
            "From: Formular <{}>\r\nTo: {}\r\nReply-To: tester@example.se\r\nSubject: Felanmälan\r\nContent-Type: text/plain; charset=utf-8\r\n\r\n{}",
            from, INTAKE, body
        );
        FetchedMail {
            uid,
            raw: raw.into_bytes(),
        }
    }

    fn message_with_id(uid: u32, message_id: &str, body: &str) -> FetchedMail {
        let mut mail = message(uid, INTAKE, body);
        let mut raw = format!("Message-ID: {}\r\n", message_id).into_bytes();
        raw.extend_from_slice(&mail.raw);
        mail.raw = raw;
        mail
    }

    fn rule(reply_to: Option<&str>) -> AcceptanceRule {
        AcceptanceRule {
            sender: INTAKE.to_string(),
            recipient: INTAKE.to_string(),
            reply_to: reply_to.map(str::to_string),
        }
    }

    struct Harness {
        poller: MailboxPoller,
        source: Arc<FakeSource>,
        provider: Arc<MockProvider>,
        db: Database,
        _worker: TranslationWorker,
        _temp_dir: TempDir,
    }

    async fn harness(source: FakeSource, rule: AcceptanceRule) -> Harness {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.db");
        let db = Database::new(&format!("sqlite://{}", db_path.display()))
            .await
            .unwrap();

        let provider = Arc::new(MockProvider::new());
        let dyn_provider: Arc<dyn TranslationProvider> = provider.clone();
        let worker = TranslationWorker::new(db.clone(), dyn_provider.clone(), RequeuePolicy::unbounded());
        let builder = Arc::new(ReportBuilder::new(db.clone(), dyn_provider, worker.queue()));

        let source = Arc::new(source);
        let poller = MailboxPoller::new(source.clone(), rule, builder);

        Harness {
            poller,
            source,
            provider,
            db,
            _worker: worker,
            _temp_dir: temp_dir,
        }
    }

    // ==================== Envelope Tests ====================

    #[test]
    fn test_envelope_from_headers() {
        let raw = b"From: \"Anna A\" <anna@x.se>\r\nTo: a@y.se, b@y.se\r\nReply-To: r@z.se\r\n\r\nbody";
        let parsed = mailparse::parse_mail(raw).unwrap();
        let envelope = Envelope::from_headers(&parsed.headers);

        assert_eq!(envelope.from, vec!["anna@x.se"]);
        assert_eq!(envelope.to, vec!["a@y.se", "b@y.se"]);
        assert_eq!(envelope.reply_to, vec!["r@z.se"]);
    }

    #[test]
    fn test_envelope_missing_headers() {
        let parsed = mailparse::parse_mail(b"Subject: x\r\n\r\nbody").unwrap();
        assert_eq!(Envelope::from_headers(&parsed.headers), Envelope::default());
    }

    // ==================== Acceptance Tests ====================

    fn envelope(from: &str, to: &str, reply_to: &str) -> Envelope {
        Envelope {
            from: vec![from.to_string()],
            to: vec![to.to_string()],
            reply_to: vec![reply_to.to_string()],
        }
    }

    #[test]
    fn test_accepts_matching_sender_and_recipient() {
        assert!(rule(None).accepts(&envelope(INTAKE, INTAKE, "whatever@x.se")));
    }

    #[test]
    fn test_address_match_ignores_case() {
        assert!(rule(None).accepts(&envelope("FelAnmalan@Example.se", INTAKE, "")));
    }

    #[test]
    fn test_rejects_unlisted_sender() {
        assert!(!rule(None).accepts(&envelope("spam@evil.test", INTAKE, INTAKE)));
    }

    #[test]
    fn test_rejects_wrong_recipient() {
        assert!(!rule(None).accepts(&envelope(INTAKE, "other@example.se", INTAKE)));
    }

    #[test]
    fn test_non_production_requires_reply_to() {
        let rule = rule(Some("tester@example.se"));
        assert!(rule.accepts(&envelope(INTAKE, INTAKE, "tester@example.se")));
        assert!(!rule.accepts(&envelope(INTAKE, INTAKE, "someone@example.se")));
        assert!(!rule.accepts(&Envelope {
            reply_to: vec![],
            ..envelope(INTAKE, INTAKE, "")
        }));
    }

    #[test]
    fn test_from_config_drops_reply_to_in_production() {
        let config = MailConfig {
            host: "imap.example.se".to_string(),
            port: 993,
            username: "u".to_string(),
            password: "p".to_string(),
            folder: "INBOX".to_string(),
            accepted_sender: INTAKE.to_string(),
            accepted_recipient: INTAKE.to_string(),
            accepted_reply_to: Some("tester@example.se".to_string()),
        };

        assert!(AcceptanceRule::from_config(&config, true).reply_to.is_none());
        assert_eq!(
            AcceptanceRule::from_config(&config, false).reply_to.as_deref(),
            Some("tester@example.se")
        );
    }

    // ==================== Poll Tests ====================

    #[tokio::test]
    async fn test_poll_creates_ticket_and_marks_seen() {
        let source = FakeSource {
            messages: vec![message(
                7,
                INTAKE,
                "Namn: Anna\r\nAdress: Storgatan 1\r\nMeddelande: Trasig kran\r\n---\r\nfooter",
            )],
            ..Default::default()
        };
        let h = harness(source, rule(None)).await;

        let summary = h.poller.poll_once().await.unwrap();

        assert_eq!(
            summary,
            PollSummary {
                inspected: 1,
                accepted: 1,
                created: 1,
                skipped: 0,
                duplicates: 0,
                failed: 0
            }
        );
        assert_eq!(*h.source.seen.lock().unwrap(), vec![7]);

        let tickets = h.db.list_by_status(crate::model::TicketStatus::New).await.unwrap();
        assert_eq!(tickets.len(), 1);
        assert_eq!(tickets[0].name, "Anna");
        assert_eq!(tickets[0].description, "Trasig kran");
        assert_eq!(tickets[0].original_language, Language::Sv);
    }

    #[tokio::test]
    async fn test_unlisted_sender_never_reaches_extractor() {
        let source = FakeSource {
            messages: vec![message(3, "spam@evil.test", "Meddelande: Köp nu")],
            ..Default::default()
        };
        let h = harness(source, rule(None)).await;

        let summary = h.poller.poll_once().await.unwrap();

        assert_eq!(summary.inspected, 1);
        assert_eq!(summary.accepted, 0);
        assert_eq!(h.provider.detect_calls(), 0);
        assert_eq!(h.db.ticket_count().await.unwrap(), 0);
        // Rejected mail is still marked seen
        assert_eq!(*h.source.seen.lock().unwrap(), vec![3]);
    }

    #[tokio::test]
    async fn test_unreachable_mailbox_touches_no_flags() {
        let source = FakeSource {
            messages: vec![message(1, INTAKE, "Meddelande: x")],
            unreachable: true,
            ..Default::default()
        };
        let h = harness(source, rule(None)).await;

        let err = h.poller.poll_once().await.unwrap_err();

        assert!(format!("{:#}", err).contains("connection refused"));
        assert!(h.source.seen.lock().unwrap().is_empty());
        assert_eq!(h.db.ticket_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_failures_do_not_abort_batch() {
        let source = FakeSource {
            messages: vec![
                message(1, INTAKE, "Meddelande: Första"),
                message(2, INTAKE, "Meddelande: Andra"),
            ],
            ..Default::default()
        };
        let h = harness(source, rule(None)).await;
        h.db.close().await;

        let summary = h.poller.poll_once().await.unwrap();

        assert_eq!(summary.inspected, 2);
        assert_eq!(summary.failed, 2);
        assert_eq!(h.provider.detect_calls(), 2);
        assert_eq!(*h.source.seen.lock().unwrap(), vec![1, 2]);
    }

    #[tokio::test]
    async fn test_failed_mark_seen_does_not_duplicate_ticket() {
        let source = FakeSource {
            messages: vec![message_with_id(
                9,
                "<form-9@example.se>",
                "Namn: Anna\r\nMeddelande: Trasig kran",
            )],
            mark_seen_failures: AtomicUsize::new(1),
            ..Default::default()
        };
        let h = harness(source, rule(None)).await;

        let first = h.poller.poll_once().await.unwrap();
        assert_eq!(first.created, 1);
        assert!(h.source.seen.lock().unwrap().is_empty());

        // The flag never stuck, so the same message is fetched again
        let second = h.poller.poll_once().await.unwrap();
        assert_eq!(second.inspected, 1);
        assert_eq!(second.created, 0);
        assert_eq!(second.duplicates, 1);
        assert_eq!(*h.source.seen.lock().unwrap(), vec![9]);

        assert_eq!(h.db.ticket_count().await.unwrap(), 1);
        assert_eq!(h.provider.detect_calls(), 1);
    }

    #[tokio::test]
    async fn test_messages_without_message_id_are_not_deduplicated() {
        let source = FakeSource {
            messages: vec![
                message(1, INTAKE, "Meddelande: Första"),
                message(2, INTAKE, "Meddelande: Första"),
            ],
            ..Default::default()
        };
        let h = harness(source, rule(None)).await;

        let summary = h.poller.poll_once().await.unwrap();

        assert_eq!(summary.created, 2);
        assert_eq!(summary.duplicates, 0);
    }

    #[tokio::test]
    async fn test_empty_message_skipped() {
        let source = FakeSource {
            messages: vec![message(5, INTAKE, "   \r\n")],
            ..Default::default()
        };
        let h = harness(source, rule(None)).await;

        let summary = h.poller.poll_once().await.unwrap();

        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.created, 0);
        assert_eq!(*h.source.seen.lock().unwrap(), vec![5]);
    }

    #[tokio::test]
    async fn test_empty_mailbox() {
        let h = harness(FakeSource::default(), rule(None)).await;

        let summary = h.poller.poll_once().await.unwrap();

        assert_eq!(summary, PollSummary::default());
        assert!(h.source.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_poll_is_not_reentrant() {
        let h = harness(FakeSource::default(), rule(None)).await;

        let _running = h.poller.running.lock().await;
        h.poller.poll_once().await.unwrap();

        assert_eq!(h.source.fetches.load(Ordering::SeqCst), 0);
    }
}
