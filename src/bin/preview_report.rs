//! Preview report binary - shows what the intake would make of a message
//!
//! Usage:
//!   cargo run --bin preview -- message.eml
//!
//! Prints the envelope, the canonical text and the parsed fields. No mailbox,
//! ticket store or translation provider is touched.

use anyhow::{Context, Result};
use incident_intake::mail::{extract, html, Envelope};
use incident_intake::model::derive_title;
use incident_intake::parser;
use std::fs;
use tracing::info;

fn main() -> Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("incident_intake=info".parse()?),
        )
        .init();

    let path = std::env::args()
        .nth(1)
        .context("Usage: preview <message.eml>")?;

    let raw = fs::read(&path).with_context(|| format!("Failed to read {}", path))?;
    info!("Read {} bytes from {}", raw.len(), path);

    let message = mailparse::parse_mail(&raw).context("Failed to parse message")?;
    let envelope = Envelope::from_headers(&message.headers);
    let text = html::clean(&extract::extract_text(&message));
    let fields = parser::parse(&text);

    println!("From:     {}", envelope.from.join(", "));
    println!("To:       {}", envelope.to.join(", "));
    println!("Reply-To: {}", envelope.reply_to.join(", "));
    println!();
    println!("--- canonical text ---");
    println!("{}", text);
    println!("--- parsed fields ---");
    println!("Title:       {}", derive_title(&fields.description));
    println!("Name:        {}", fields.name);
    println!("Email:       {}", fields.email);
    println!("Phone:       {}", fields.phone);
    println!("Address:     {}", fields.address);
    println!("Apartment:   {}", fields.apartment);
    println!("Description:");
    for line in fields.description.lines() {
        println!("  {}", line);
    }

    Ok(())
}
