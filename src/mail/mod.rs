//! Mail intake: fetching, acceptance, extraction and HTML cleaning.

pub mod extract;
pub mod html;
pub mod poller;
pub mod source;

pub use poller::{AcceptanceRule, Envelope, MailboxPoller, PollSummary};
pub use source::{FetchedMail, ImapMailSource, MailSource};
