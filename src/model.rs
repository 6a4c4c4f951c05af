use crate::i18n::Language;
use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Longest title derived from a description, in characters
pub const MAX_TITLE_CHARS: usize = 80;

/// Approval state of a pending ticket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TicketStatus {
    New,
    Approved,
    Rejected,
}

impl TicketStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TicketStatus::New => "NEW",
            TicketStatus::Approved => "APPROVED",
            TicketStatus::Rejected => "REJECTED",
        }
    }
}

impl FromStr for TicketStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "NEW" => Ok(TicketStatus::New),
            "APPROVED" => Ok(TicketStatus::Approved),
            "REJECTED" => Ok(TicketStatus::Rejected),
            other => bail!("Unknown ticket status: '{}'", other),
        }
    }
}

impl fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ticket text that gets machine translated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TranslatedField {
    Title,
    Description,
}

impl TranslatedField {
    pub const ALL: [TranslatedField; 2] = [TranslatedField::Title, TranslatedField::Description];

    pub fn as_str(&self) -> &'static str {
        match self {
            TranslatedField::Title => "title",
            TranslatedField::Description => "description",
        }
    }
}

impl FromStr for TranslatedField {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "title" => Ok(TranslatedField::Title),
            "description" => Ok(TranslatedField::Description),
            other => bail!("Unknown translated field: '{}'", other),
        }
    }
}

/// A ticket about to be stored for the first time
#[derive(Debug, Clone, PartialEq)]
pub struct NewTicket {
    pub title: String,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub address: String,
    pub apartment: String,
    pub description: String,
    pub original_language: Language,
    pub status: TicketStatus,
    pub received: DateTime<Utc>,
    /// Message-ID of the mail the report came from
    pub message_id: Option<String>,
}

/// An incident report waiting for human approval
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingTicket {
    pub id: i64,
    pub title: String,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub address: String,
    pub apartment: String,
    pub description: String,
    pub original_language: Language,
    pub title_translations: BTreeMap<Language, String>,
    pub description_translations: BTreeMap<Language, String>,
    pub status: TicketStatus,
    pub received: DateTime<Utc>,
}

impl PendingTicket {
    /// Original (untranslated) text of a field
    pub fn text_for(&self, field: TranslatedField) -> &str {
        match field {
            TranslatedField::Title => &self.title,
            TranslatedField::Description => &self.description,
        }
    }

    pub fn translations(&self, field: TranslatedField) -> &BTreeMap<Language, String> {
        match field {
            TranslatedField::Title => &self.title_translations,
            TranslatedField::Description => &self.description_translations,
        }
    }

    pub fn has_translation(&self, field: TranslatedField, language: Language) -> bool {
        self.translations(field).contains_key(&language)
    }

    /// True once every field exists in every language other than the original
    pub fn is_fully_translated(&self) -> bool {
        Language::targets_for(self.original_language).all(|lang| {
            TranslatedField::ALL
                .iter()
                .all(|field| self.has_translation(*field, lang))
        })
    }

    /// Field text in `language`, falling back to the original text
    pub fn text_in(&self, field: TranslatedField, language: Language) -> &str {
        if language == self.original_language {
            return self.text_for(field);
        }
        self.translations(field)
            .get(&language)
            .map(String::as_str)
            .unwrap_or_else(|| self.text_for(field))
    }

    pub fn title_in(&self, language: Language) -> &str {
        self.text_in(TranslatedField::Title, language)
    }

    pub fn description_in(&self, language: Language) -> &str {
        self.text_in(TranslatedField::Description, language)
    }
}

/// One unit of translation work: one ticket into one language
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TranslationJob {
    pub ticket_id: i64,
    pub target: Language,
    /// Failed attempts so far
    pub attempts: u32,
}

impl TranslationJob {
    pub fn new(ticket_id: i64, target: Language) -> Self {
        Self {
            ticket_id,
            target,
            attempts: 0,
        }
    }
}

/// Derive a ticket title from the first non-empty line of the description
pub fn derive_title(description: &str) -> String {
    let first_line = description
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .unwrap_or_default();

    match first_line.char_indices().nth(MAX_TITLE_CHARS) {
        Some((cut, _)) => first_line[..cut].trim_end().to_string(),
        None => first_line.to_string(),
    }
}
