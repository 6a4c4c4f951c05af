//! Mailbox access.
//!
//! [`MailSource`] is blocking on purpose: the `imap` crate is synchronous, and
//! the poller runs every call on the blocking thread pool.

use crate::config::MailConfig;
use anyhow::{Context, Result};
use tracing::{debug, warn};

type ImapSession = imap::Session<native_tls::TlsStream<std::net::TcpStream>>;

/// One unseen message as fetched from the server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedMail {
    pub uid: u32,
    /// Full RFC 822 message
    pub raw: Vec<u8>,
}

/// A mailbox the poller can read unseen messages from
pub trait MailSource: Send + Sync {
    /// Fetch every unseen message without setting its seen flag
    fn fetch_unseen(&self) -> Result<Vec<FetchedMail>>;

    /// Set the seen flag on the given messages
    fn mark_seen(&self, uids: &[u32]) -> Result<()>;
}

/// IMAPS mailbox
pub struct ImapMailSource {
    config: MailConfig,
}

impl ImapMailSource {
    pub fn new(config: MailConfig) -> Self {
        Self { config }
    }

    fn open_session(&self) -> Result<ImapSession> {
        let tls = native_tls::TlsConnector::builder()
            .build()
            .context("Failed to build TLS connector for IMAP")?;

        let client = imap::connect(
            (self.config.host.as_str(), self.config.port),
            self.config.host.as_str(),
            &tls,
        )
        .with_context(|| {
            format!(
                "Failed to connect to IMAP server {}:{}",
                self.config.host, self.config.port
            )
        })?;

        let mut session = client
            .login(&self.config.username, &self.config.password)
            .map_err(|(e, _client)| e)
            .context("Failed to authenticate to IMAP server")?;

        session
            .select(&self.config.folder)
            .with_context(|| format!("Failed to select folder '{}'", self.config.folder))?;

        Ok(session)
    }
}

impl MailSource for ImapMailSource {
    fn fetch_unseen(&self) -> Result<Vec<FetchedMail>> {
        let mut session = self.open_session()?;

        let mut uids: Vec<u32> = session
            .uid_search("UNSEEN")
            .context("Failed to search unseen messages")?
            .into_iter()
            .collect();
        uids.sort_unstable();

        let mut messages = Vec::with_capacity(uids.len());
        for uid in uids {
            // BODY.PEEK leaves \Seen alone until processing is done
            let fetches = match session.uid_fetch(uid.to_string(), "(UID BODY.PEEK[])") {
                Ok(fetches) => fetches,
                Err(e) => {
                    warn!("Failed to fetch message uid {}: {}", uid, e);
                    continue;
                }
            };

            for fetch in fetches.iter() {
                match fetch.body() {
                    Some(raw) => messages.push(FetchedMail {
                        uid: fetch.uid.unwrap_or(uid),
                        raw: raw.to_vec(),
                    }),
                    None => warn!("Message uid {} has no body", uid),
                }
            }
        }

        if let Err(e) = session.logout() {
            debug!("IMAP logout failed: {}", e);
        }

        Ok(messages)
    }

    fn mark_seen(&self, uids: &[u32]) -> Result<()> {
        if uids.is_empty() {
            return Ok(());
        }

        let mut session = self.open_session()?;
        let sequence = uids
            .iter()
            .map(u32::to_string)
            .collect::<Vec<_>>()
            .join(",");

        session
            .uid_store(&sequence, "+FLAGS (\\Seen)")
            .context("Failed to mark messages as seen")?;

        if let Err(e) = session.logout() {
            debug!("IMAP logout failed: {}", e);
        }

        Ok(())
    }
}
