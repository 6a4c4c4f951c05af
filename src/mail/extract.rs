//! Content extraction: one text blob out of an arbitrary MIME tree.

use mailparse::{DispositionType, ParsedMail};
use tracing::{debug, warn};

/// Extract the text content of a parsed message.
///
/// Single-part plain text and HTML bodies are returned verbatim. Multipart bodies are walked depth
/// first and every `text/plain` and `text/html` leaf is concatenated; HTML is
/// left raw for [`super::html::clean`]. Attachments and other leaves are
/// ignored. Any other top-level type falls back to the decoded body, or the raw
/// bytes when even that fails.
pub fn extract_text(message: &ParsedMail<'_>) -> String {
    let mimetype = message.ctype.mimetype.to_ascii_lowercase();
    debug!("Message type: {}", mimetype);

    if mimetype == "text/plain" || mimetype == "text/html" {
        return body_or_raw(message);
    }

    if mimetype.starts_with("multipart/") {
        debug!("Found multipart message with {} parts", message.subparts.len());
        let mut leaves = Vec::new();
        collect_text_leaves(message, &mut leaves);
        return leaves.join("\n");
    }

    warn!("Unsupported message type {}, using raw body", mimetype);
    body_or_raw(message)
}

fn collect_text_leaves(part: &ParsedMail<'_>, leaves: &mut Vec<String>) {
    if !part.subparts.is_empty() {
        for subpart in &part.subparts {
            collect_text_leaves(subpart, leaves);
        }
        return;
    }

    if matches!(
        part.get_content_disposition().disposition,
        DispositionType::Attachment
    ) {
        return;
    }

    let mimetype = part.ctype.mimetype.to_ascii_lowercase();
    if mimetype == "text/plain" || mimetype == "text/html" {
        leaves.push(body_or_raw(part));
    }
}

fn body_or_raw(part: &ParsedMail<'_>) -> String {
    match part.get_body() {
        Ok(body) => body,
        Err(e) => {
            warn!("Failed to decode body ({}), using raw bytes", e);
            part.get_body_raw()
                .map(|raw| String::from_utf8_lossy(&raw).into_owned())
                .unwrap_or_default()
        }
    }
}
