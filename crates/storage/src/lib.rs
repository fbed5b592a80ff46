use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    Pool, Row, Sqlite,
};
use std::{
    fs,
    path::{Path, PathBuf},
    str::FromStr,
};

use shared::domain::{ClientId, ConversationKey, LawyerId, ParticipantRole};

/// Durable append-only message log, one ordered sequence per
/// conversation. The gateway persists here before any fan-out.
#[derive(Clone)]
pub struct Storage {
    pool: Pool<Sqlite>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredMessage {
    pub sender: ParticipantRole,
    pub content: String,
    pub sent_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct StoredConversation {
    pub client_id: ClientId,
    pub messages: Vec<StoredMessage>,
    pub last_updated: DateTime<Utc>,
}

impl Storage {
    pub async fn new(database_url: &str) -> Result<Self> {
        ensure_sqlite_parent_dir_exists(database_url)?;

        let connect_options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(connect_options)
            .await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }

    pub async fn health_check(&self) -> Result<()> {
        let _: i64 = sqlx::query_scalar("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .context("sqlite ping failed")?;
        Ok(())
    }

    /// Appends one message, assigning the server timestamp. The
    /// timestamp is clamped to the conversation's `last_updated` so
    /// timestamps within a conversation never decrease, and the
    /// message insert plus conversation upsert commit atomically.
    pub async fn append_message(
        &self,
        key: &ConversationKey,
        sender: ParticipantRole,
        content: &str,
    ) -> Result<StoredMessage> {
        let mut tx = self.pool.begin().await?;

        let last_updated: Option<String> = sqlx::query_scalar(
            "SELECT last_updated FROM conversations WHERE lawyer_id = ?1 AND client_id = ?2",
        )
        .bind(key.lawyer_id.as_str())
        .bind(key.client_id.as_str())
        .fetch_optional(&mut *tx)
        .await?;

        let mut sent_at = Utc::now();
        if let Some(raw) = last_updated {
            let last = parse_timestamp(&raw)?;
            if last > sent_at {
                sent_at = last;
            }
        }
        let sent_at_text = format_timestamp(sent_at);

        sqlx::query(
            r#"
            INSERT INTO messages (lawyer_id, client_id, sender, content, sent_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
        )
        .bind(key.lawyer_id.as_str())
        .bind(key.client_id.as_str())
        .bind(sender.as_str())
        .bind(content)
        .bind(&sent_at_text)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO conversations (lawyer_id, client_id, last_updated)
            VALUES (?1, ?2, ?3)
            ON CONFLICT (lawyer_id, client_id)
            DO UPDATE SET last_updated = excluded.last_updated
            "#,
        )
        .bind(key.lawyer_id.as_str())
        .bind(key.client_id.as_str())
        .bind(&sent_at_text)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(StoredMessage {
            sender,
            content: content.to_string(),
            sent_at,
        })
    }

    /// Full history of one conversation in persistence order.
    pub async fn history(&self, key: &ConversationKey) -> Result<Vec<StoredMessage>> {
        let rows = sqlx::query(
            r#"
            SELECT sender, content, sent_at
            FROM messages
            WHERE lawyer_id = ?1 AND client_id = ?2
            ORDER BY id ASC
            "#,
        )
        .bind(key.lawyer_id.as_str())
        .bind(key.client_id.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(|row| message_from_row(&row)).collect()
    }

    /// Every conversation under one lawyer, most recently updated
    /// first. Backs the polled conversation list.
    pub async fn conversations_for_lawyer(
        &self,
        lawyer_id: &LawyerId,
    ) -> Result<Vec<StoredConversation>> {
        let rows = sqlx::query(
            r#"
            SELECT client_id, last_updated
            FROM conversations
            WHERE lawyer_id = ?1
            ORDER BY last_updated DESC, client_id ASC
            "#,
        )
        .bind(lawyer_id.as_str())
        .fetch_all(&self.pool)
        .await?;

        let mut conversations = Vec::with_capacity(rows.len());
        for row in rows {
            let client_id = ClientId::new(row.get::<String, _>("client_id"));
            let last_updated = parse_timestamp(&row.get::<String, _>("last_updated"))?;
            let key = ConversationKey::new(lawyer_id.clone(), client_id.clone());
            let messages = self.history(&key).await?;
            conversations.push(StoredConversation {
                client_id,
                messages,
                last_updated,
            });
        }
        Ok(conversations)
    }
}

fn message_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<StoredMessage> {
    let sender: String = row.get("sender");
    let sender = sender
        .parse::<ParticipantRole>()
        .map_err(|e| anyhow!("corrupt sender column: {e}"))?;
    Ok(StoredMessage {
        sender,
        content: row.get("content"),
        sent_at: parse_timestamp(&row.get::<String, _>("sent_at"))?,
    })
}

fn format_timestamp(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    let parsed = DateTime::parse_from_rfc3339(raw)
        .with_context(|| format!("invalid stored timestamp: {raw}"))?;
    Ok(parsed.with_timezone(&Utc))
}

fn ensure_sqlite_parent_dir_exists(database_url: &str) -> Result<()> {
    let Some(path) = sqlite_file_path(database_url) else {
        return Ok(());
    };
    let Some(parent) = path.parent() else {
        return Ok(());
    };
    if parent.as_os_str().is_empty() {
        return Ok(());
    }
    fs::create_dir_all(parent).with_context(|| {
        format!(
            "failed to create parent directory '{}' for database url '{database_url}'",
            parent.display()
        )
    })?;
    Ok(())
}

fn sqlite_file_path(database_url: &str) -> Option<PathBuf> {
    if database_url == "sqlite::memory:" || !database_url.starts_with("sqlite:") {
        return None;
    }
    let path = database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .split('?')
        .next()
        .unwrap_or_default();
    if path.is_empty() {
        return None;
    }
    Some(Path::new(path).to_path_buf())
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
