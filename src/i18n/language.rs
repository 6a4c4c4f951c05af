//! Language type: the closed set of display languages.

use anyhow::{bail, Result};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// A supported display language.
///
/// Serialised as its ISO 639-1 code so translation maps are keyed by code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Language {
    En,
    Sv,
    Uk,
    Pl,
}

impl Language {
    /// Every supported language, in declaration order.
    pub const ALL: [Language; 4] = [Language::En, Language::Sv, Language::Uk, Language::Pl];

    /// Fallback when detection fails or yields an unsupported code.
    pub const BASE: Language = Language::Sv;

    /// Create a Language from a language code string.
    ///
    /// Matching is case-insensitive and ignores a region suffix, so "SV" and
    /// "en-US" are accepted.
    ///
    /// # Returns
    /// * `Ok(Language)` if the code names a supported language
    /// * `Err` if the code is empty or unknown
    pub fn from_code(code: &str) -> Result<Language> {
        let base = code
            .trim()
            .split(|c: char| c == '-' || c == '_')
            .next()
            .unwrap_or_default()
            .to_ascii_lowercase();

        match Language::ALL.iter().find(|lang| lang.code() == base) {
            Some(lang) => Ok(*lang),
            None => bail!("Unknown language code: '{}'", code),
        }
    }

    /// ISO 639-1 code (e.g., "sv").
    pub fn code(&self) -> &'static str {
        match self {
            Language::En => "en",
            Language::Sv => "sv",
            Language::Uk => "uk",
            Language::Pl => "pl",
        }
    }

    /// Name of the language in the language itself.
    pub fn display_name(&self) -> &'static str {
        match self {
            Language::En => "English",
            Language::Sv => "Svenska",
            Language::Uk => "Українська",
            Language::Pl => "Polski",
        }
    }

    /// All languages a text written in `original` must be translated into.
    pub fn targets_for(original: Language) -> impl Iterator<Item = Language> {
        Language::ALL.into_iter().filter(move |lang| *lang != original)
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl Serialize for Language {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.code())
    }
}

impl<'de> Deserialize<'de> for Language {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let code = String::deserialize(deserializer)?;
        Language::from_code(&code).map_err(serde::de::Error::custom)
    }
}
