use crate::i18n::Language;
use crate::model::{NewTicket, PendingTicket, TicketStatus, TranslatedField};
use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use std::collections::BTreeMap;
use std::str::FromStr;
use std::time::Duration;

const TICKET_COLUMNS: &str = "id, title, name, email, phone, address, apartment, description, \
                              original_language, status, received";

#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open (or create) the ticket store and make sure the schema exists
    pub async fn new(database_url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)
            .with_context(|| format!("Invalid database URL: {}", database_url))?
            .create_if_missing(true)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .with_context(|| format!("Failed to open database at {}", database_url))?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS pending_tickets (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                title TEXT NOT NULL,
                name TEXT NOT NULL,
                email TEXT NOT NULL,
                phone TEXT NOT NULL,
                address TEXT NOT NULL,
                apartment TEXT NOT NULL,
                description TEXT NOT NULL,
                original_language TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'NEW',
                received TEXT NOT NULL,
                message_id TEXT UNIQUE
            )",
        )
        .execute(&pool)
        .await
        .context("Failed to create pending_tickets table")?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS ticket_translations (
                ticket_id INTEGER NOT NULL REFERENCES pending_tickets(id),
                language TEXT NOT NULL,
                field TEXT NOT NULL,
                content TEXT NOT NULL,
                PRIMARY KEY (ticket_id, language, field)
            )",
        )
        .execute(&pool)
        .await
        .context("Failed to create ticket_translations table")?;

        Ok(Self { pool })
    }

    /// Persist a new ticket, returning its id
    pub async fn insert_ticket(&self, ticket: &NewTicket) -> Result<i64> {
        let result = sqlx::query(
            "INSERT INTO pending_tickets
                (title, name, email, phone, address, apartment, description,
                 original_language, status, received, message_id)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        )
        .bind(&ticket.title)
        .bind(&ticket.name)
        .bind(&ticket.email)
        .bind(&ticket.phone)
        .bind(&ticket.address)
        .bind(&ticket.apartment)
        .bind(&ticket.description)
        .bind(ticket.original_language.code())
        .bind(ticket.status.as_str())
        .bind(ticket.received.to_rfc3339())
        .bind(ticket.message_id.as_deref())
        .execute(&self.pool)
        .await
        .context("Failed to insert pending ticket")?;

        Ok(result.last_insert_rowid())
    }

    /// True if a ticket was already created from the mail with this Message-ID
    pub async fn has_message(&self, message_id: &str) -> Result<bool> {
        let found: Option<i64> =
            sqlx::query_scalar("SELECT id FROM pending_tickets WHERE message_id = ?1")
                .bind(message_id)
                .fetch_optional(&self.pool)
                .await
                .with_context(|| format!("Failed to look up message {}", message_id))?;

        Ok(found.is_some())
    }

    /// Load a ticket together with all of its translations
    pub async fn get_ticket(&self, id: i64) -> Result<Option<PendingTicket>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM pending_tickets WHERE id = ?1",
            TICKET_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .with_context(|| format!("Failed to load ticket {}", id))?;

        match row {
            Some(row) => {
                let mut ticket = ticket_from_row(&row)?;
                self.load_translations(&mut ticket).await?;
                Ok(Some(ticket))
            }
            None => Ok(None),
        }
    }

    /// Store one translated field. Existing entries are never overwritten.
    /// Returns true if a row was written.
    pub async fn add_translation(
        &self,
        ticket_id: i64,
        language: Language,
        field: TranslatedField,
        content: &str,
    ) -> Result<bool> {
        let original: Option<String> =
            sqlx::query_scalar("SELECT original_language FROM pending_tickets WHERE id = ?1")
                .bind(ticket_id)
                .fetch_optional(&self.pool)
                .await
                .with_context(|| format!("Failed to look up ticket {}", ticket_id))?;

        match original {
            None => bail!("Ticket {} does not exist", ticket_id),
            Some(code) if code == language.code() => bail!(
                "Ticket {} is written in {}; it cannot carry a translation into it",
                ticket_id,
                language
            ),
            Some(_) => {}
        }

        let result = sqlx::query(
            "INSERT INTO ticket_translations (ticket_id, language, field, content)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT (ticket_id, language, field) DO NOTHING",
        )
        .bind(ticket_id)
        .bind(language.code())
        .bind(field.as_str())
        .bind(content)
        .execute(&self.pool)
        .await
        .with_context(|| {
            format!(
                "Failed to store {} translation ({}) for ticket {}",
                field.as_str(),
                language,
                ticket_id
            )
        })?;

        Ok(result.rows_affected() > 0)
    }

    /// Tickets with the given status, oldest first
    pub async fn list_by_status(&self, status: TicketStatus) -> Result<Vec<PendingTicket>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM pending_tickets WHERE status = ?1 ORDER BY received ASC, id ASC",
            TICKET_COLUMNS
        ))
        .bind(status.as_str())
        .fetch_all(&self.pool)
        .await
        .context("Failed to list tickets")?;

        let mut tickets = Vec::with_capacity(rows.len());
        for row in &rows {
            let mut ticket = ticket_from_row(row)?;
            self.load_translations(&mut ticket).await?;
            tickets.push(ticket);
        }

        Ok(tickets)
    }

    /// Change a ticket's approval state. Returns false if the ticket does not exist.
    pub async fn update_status(&self, id: i64, status: TicketStatus) -> Result<bool> {
        let result = sqlx::query("UPDATE pending_tickets SET status = ?1 WHERE id = ?2")
            .bind(status.as_str())
            .bind(id)
            .execute(&self.pool)
            .await
            .with_context(|| format!("Failed to update status of ticket {}", id))?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn ticket_count(&self) -> Result<usize> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM pending_tickets")
            .fetch_one(&self.pool)
            .await
            .context("Failed to count tickets")?;

        Ok(count as usize)
    }

    /// Close every pooled connection
    pub async fn close(&self) {
        self.pool.close().await;
    }

    async fn load_translations(&self, ticket: &mut PendingTicket) -> Result<()> {
        let rows = sqlx::query(
            "SELECT language, field, content FROM ticket_translations WHERE ticket_id = ?1",
        )
        .bind(ticket.id)
        .fetch_all(&self.pool)
        .await
        .with_context(|| format!("Failed to load translations for ticket {}", ticket.id))?;

        for row in rows {
            let language = Language::from_code(&row.try_get::<String, _>("language")?)?;
            let field: TranslatedField = row.try_get::<String, _>("field")?.parse()?;
            let content: String = row.try_get("content")?;

            let map = match field {
                TranslatedField::Title => &mut ticket.title_translations,
                TranslatedField::Description => &mut ticket.description_translations,
            };
            map.insert(language, content);
        }

        Ok(())
    }
}

fn ticket_from_row(row: &SqliteRow) -> Result<PendingTicket> {
    let received: String = row.try_get("received")?;
    let received = DateTime::parse_from_rfc3339(&received)
        .with_context(|| format!("Invalid received timestamp: {}", received))?
        .with_timezone(&Utc);

    Ok(PendingTicket {
        id: row.try_get("id")?,
        title: row.try_get("title")?,
        name: row.try_get("name")?,
        email: row.try_get("email")?,
        phone: row.try_get("phone")?,
        address: row.try_get("address")?,
        apartment: row.try_get("apartment")?,
        description: row.try_get("description")?,
        original_language: Language::from_code(&row.try_get::<String, _>("original_language")?)?,
        title_translations: BTreeMap::new(),
        description_translations: BTreeMap::new(),
        status: row.try_get::<String, _>("status")?.parse()?,
        received,
    })
}
