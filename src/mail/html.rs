//! HTML-to-text cleaning for report bodies.
//!
//! Report forms arrive as HTML more often than not. Cleaning keeps line
//! structure (block tags become newlines) and puts every field label back at
//! the start of a line, since tag stripping tends to glue labels together.

use crate::parser::{label_literals, SEPARATOR};
use regex::Regex;
use std::sync::OnceLock;

/// Named entities decoded after tag stripping. `&amp;` must stay last.
const ENTITIES: &[(&str, &str)] = &[
    ("&nbsp;", " "),
    ("&lt;", "<"),
    ("&gt;", ">"),
    ("&quot;", "\""),
    ("&apos;", "'"),
    ("&#39;", "'"),
    ("&auml;", "ä"),
    ("&ouml;", "ö"),
    ("&aring;", "å"),
    ("&Auml;", "Ä"),
    ("&Ouml;", "Ö"),
    ("&Aring;", "Å"),
    ("&amp;", "&"),
];

fn script_style_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| {
        Regex::new(r"(?is)<style[^>]*>.*?</style\s*>|<script[^>]*>.*?</script\s*>")
            .expect("valid style/script regex")
    })
}

fn comment_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| Regex::new(r"(?s)<!--.*?-->").expect("valid comment regex"))
}

fn block_tag_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| {
        Regex::new(r"(?i)<br\s*/?>|</?(?:p|div|h[1-6])(?:\s[^>]*)?>").expect("valid block tag regex")
    })
}

fn tag_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| Regex::new(r"(?s)<[^>]*>").expect("valid HTML tag regex"))
}

fn blank_lines_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| Regex::new(r"\n\s*\n").expect("valid blank line regex"))
}

fn horizontal_space_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| Regex::new(r"[ \t]+").expect("valid whitespace regex"))
}

/// Clean raw message text (HTML or plain) into canonical text
pub fn clean(content: &str) -> String {
    let text = content.replace("\r\n", "\n");
    let text = script_style_regex().replace_all(&text, "");
    let text = comment_regex().replace_all(&text, "");
    let text = block_tag_regex().replace_all(&text, "\n");
    let text = tag_regex().replace_all(&text, "");
    let text = decode_entities(&text);

    let text = text.replace(SEPARATOR, &format!("\n{}\n", SEPARATOR));
    let text = break_before_labels(&text);
    let text = blank_lines_regex().replace_all(&text, "\n");
    let text = horizontal_space_regex().replace_all(&text, " ");

    text.trim().to_string()
}

/// Decode the fixed named-entity set
pub fn decode_entities(text: &str) -> String {
    ENTITIES
        .iter()
        .fold(text.to_string(), |acc, (entity, plain)| acc.replace(entity, plain))
}

fn break_before_labels(text: &str) -> String {
    label_literals().fold(text.to_string(), |acc, label| {
        acc.replace(label, &format!("\n{}", label))
    })
}
