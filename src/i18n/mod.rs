//! Supported display languages.
//!
//! The set is closed: every language a ticket can be shown in is a variant of
//! [`Language`], and the translation worker fans out over [`Language::ALL`].
//!
//! # Example
//!
//! ```rust,ignore
//! use incident_intake::i18n::Language;
//!
//! let swedish = Language::from_code("sv")?;
//! let targets: Vec<_> = Language::targets_for(swedish).collect();
//! assert_eq!(targets.len(), Language::ALL.len() - 1);
//! ```

mod language;

pub use language::Language;
