//! SQLite-backed schema store.
//!
//! Every entity type has two physical representations: a relational table
//! holding the exact fields (used for filters and snapshots) and an FTS5
//! mirror over its textual fields (used for ranked matching). Callers never
//! write the two separately; each upsert writes both inside one transaction.
//!
//! FTS5 `bm25()` ranks are negative and lower is better, so every ranked
//! query sorts ascending.

use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite, SqliteConnection, SqlitePool};

use crate::error::Result;
use crate::migrate::ALL_TABLES;
use crate::models::{
    Command, CommandFilters, CommandType, ContentType, Conversation, ConversationFilters, Message,
    SearchHit,
};

/// Limit applied when a filter carries none.
pub const DEFAULT_LIMIT: i64 = 10;

/// Messages at or below this many chars stay out of `messages_fts`.
pub const MIN_FTS_MESSAGE_CHARS: usize = 10;

const CONVERSATION_COLUMNS: &str = "c.id AS id, c.conversation_id AS conversation_id, \
    c.title AS title, c.summary AS summary, c.created_at AS created_at, c.project AS project, \
    c.file_path AS file_path, c.message_count AS message_count";

const MESSAGE_COLUMNS: &str = "m.conversation_id AS conversation_id, \
    m.message_index AS message_index, m.role AS role, m.content AS content, \
    m.content_type AS content_type";

const COMMAND_COLUMNS: &str = "k.id AS id, k.conversation_id AS conversation_id, \
    k.message_index AS message_index, k.command AS command, k.command_type AS command_type, \
    k.context AS context, k.confidence AS confidence";

/// One parsed archive file: the conversation plus everything derived from it.
#[derive(Debug, Clone)]
pub struct ConversationRecord {
    pub conversation: Conversation,
    pub messages: Vec<Message>,
    pub commands: Vec<Command>,
}

/// Turns free text into an FTS5 query: each whitespace token becomes a
/// quoted phrase and the phrases are AND-ed. Returns `None` when nothing
/// searchable remains.
pub fn to_fts_query(raw: &str) -> Option<String> {
    let terms: Vec<String> = raw
        .split_whitespace()
        .map(|t| t.replace('"', ""))
        .filter(|t| t.chars().any(char::is_alphanumeric))
        .map(|t| format!("\"{}\"", t))
        .collect();

    if terms.is_empty() {
        None
    } else {
        Some(terms.join(" "))
    }
}

fn like_pattern(raw: &str) -> String {
    let escaped = raw
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{}%", escaped)
}

fn conversation_from_row(row: &SqliteRow) -> Conversation {
    Conversation {
        id: row.get("id"),
        conversation_id: row.get("conversation_id"),
        title: row.get("title"),
        summary: row.get("summary"),
        created_at: row.get("created_at"),
        project: row.get("project"),
        file_path: row.get("file_path"),
        message_count: row.get("message_count"),
    }
}

fn message_from_row(row: &SqliteRow) -> Message {
    let content_type: String = row.get("content_type");
    Message {
        conversation_id: row.get("conversation_id"),
        message_index: row.get("message_index"),
        role: row.get("role"),
        content: row.get("content"),
        content_type: content_type.parse().unwrap_or(ContentType::Text),
    }
}

fn command_from_row(row: &SqliteRow) -> Command {
    let command_type: String = row.get("command_type");
    Command {
        id: row.get("id"),
        conversation_id: row.get("conversation_id"),
        message_index: row.get("message_index"),
        command: row.get("command"),
        command_type: command_type.parse().unwrap_or(CommandType::Code),
        context: row.get("context"),
        confidence: row.get("confidence"),
    }
}

fn hit_from_row<T>(row: &SqliteRow, item: T) -> SearchHit<T> {
    SearchHit {
        item,
        score: row.get("score"),
        highlight: row.get("highlight"),
    }
}

fn push_conversation_filters(qb: &mut QueryBuilder<'_, Sqlite>, filters: &ConversationFilters) {
    if let Some(project) = &filters.project {
        qb.push(" AND c.project = ").push_bind(project.clone());
    }
    if let Some(from) = &filters.date_from {
        qb.push(" AND c.created_at >= ").push_bind(from.clone());
    }
    if let Some(to) = &filters.date_to {
        qb.push(" AND c.created_at <= ").push_bind(to.clone());
    }
}

// ============ Row writers (shared by every upsert path) ============

async fn upsert_conversation(conn: &mut SqliteConnection, c: &Conversation) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO conversations (id, conversation_id, title, summary, created_at, project, file_path, message_count)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(conversation_id) DO UPDATE SET
            title = excluded.title,
            summary = excluded.summary,
            created_at = excluded.created_at,
            project = excluded.project,
            file_path = excluded.file_path,
            message_count = excluded.message_count
        "#,
    )
    .bind(&c.id)
    .bind(&c.conversation_id)
    .bind(&c.title)
    .bind(&c.summary)
    .bind(&c.created_at)
    .bind(&c.project)
    .bind(&c.file_path)
    .bind(c.message_count)
    .execute(&mut *conn)
    .await?;

    sqlx::query("DELETE FROM conversations_fts WHERE conversation_id = ?")
        .bind(&c.conversation_id)
        .execute(&mut *conn)
        .await?;

    sqlx::query(
        "INSERT INTO conversations_fts (conversation_id, title, summary, project) VALUES (?, ?, ?, ?)",
    )
    .bind(&c.conversation_id)
    .bind(&c.title)
    .bind(&c.summary)
    .bind(c.project.as_deref().unwrap_or(""))
    .execute(&mut *conn)
    .await?;

    Ok(())
}

async fn upsert_message(conn: &mut SqliteConnection, m: &Message) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO messages (conversation_id, message_index, role, content, content_type)
        VALUES (?, ?, ?, ?, ?)
        ON CONFLICT(conversation_id, message_index) DO UPDATE SET
            role = excluded.role,
            content = excluded.content,
            content_type = excluded.content_type
        "#,
    )
    .bind(&m.conversation_id)
    .bind(m.message_index)
    .bind(&m.role)
    .bind(&m.content)
    .bind(m.content_type.as_str())
    .execute(&mut *conn)
    .await?;

    sqlx::query("DELETE FROM messages_fts WHERE conversation_id = ? AND message_index = ?")
        .bind(&m.conversation_id)
        .bind(m.message_index)
        .execute(&mut *conn)
        .await?;

    if m.content.chars().count() > MIN_FTS_MESSAGE_CHARS {
        sqlx::query(
            "INSERT INTO messages_fts (conversation_id, message_index, content) VALUES (?, ?, ?)",
        )
        .bind(&m.conversation_id)
        .bind(m.message_index)
        .bind(&m.content)
        .execute(&mut *conn)
        .await?;
    }

    Ok(())
}

async fn upsert_command(conn: &mut SqliteConnection, k: &Command) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO commands (id, conversation_id, message_index, command, command_type, context, confidence)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(id) DO UPDATE SET
            conversation_id = excluded.conversation_id,
            message_index = excluded.message_index,
            command = excluded.command,
            command_type = excluded.command_type,
            context = excluded.context,
            confidence = excluded.confidence
        "#,
    )
    .bind(&k.id)
    .bind(&k.conversation_id)
    .bind(k.message_index)
    .bind(&k.command)
    .bind(k.command_type.as_str())
    .bind(&k.context)
    .bind(k.confidence)
    .execute(&mut *conn)
    .await?;

    sqlx::query("DELETE FROM commands_fts WHERE command_id = ?")
        .bind(&k.id)
        .execute(&mut *conn)
        .await?;

    sqlx::query(
        "INSERT INTO commands_fts (command_id, conversation_id, command, context) VALUES (?, ?, ?, ?)",
    )
    .bind(&k.id)
    .bind(&k.conversation_id)
    .bind(&k.command)
    .bind(&k.context)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Drops the messages and commands of a conversation (both representations).
async fn purge_children(conn: &mut SqliteConnection, conversation_id: &str) -> Result<()> {
    for sql in [
        "DELETE FROM commands_fts WHERE conversation_id = ?",
        "DELETE FROM commands WHERE conversation_id = ?",
        "DELETE FROM messages_fts WHERE conversation_id = ?",
        "DELETE FROM messages WHERE conversation_id = ?",
    ] {
        sqlx::query(sql)
            .bind(conversation_id)
            .execute(&mut *conn)
            .await?;
    }
    Ok(())
}

/// SQLite implementation of the schema store.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// Truncates every table in one transaction.
    pub async fn clear(&self) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for table in ALL_TABLES {
            sqlx::query(&format!("DELETE FROM {}", table))
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    pub async fn upsert_conversations(&self, rows: &[Conversation]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for row in rows {
            upsert_conversation(&mut tx, row).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// The owning conversations must already exist.
    pub async fn upsert_messages(&self, rows: &[Message]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for row in rows {
            upsert_message(&mut tx, row).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// The owning conversations must already exist.
    pub async fn upsert_commands(&self, rows: &[Command]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for row in rows {
            upsert_command(&mut tx, row).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// Writes a batch of parsed conversations in one transaction.
    ///
    /// A conversation already present is replaced along with its messages
    /// and commands, so re-ingesting a transcript never leaves stale turns.
    pub async fn write_batch(&self, records: &[ConversationRecord]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for record in records {
            purge_children(&mut tx, &record.conversation.conversation_id).await?;
            upsert_conversation(&mut tx, &record.conversation).await?;
            for message in &record.messages {
                upsert_message(&mut tx, message).await?;
            }
            for command in &record.commands {
                upsert_command(&mut tx, command).await?;
            }
        }
        tx.commit().await?;
        Ok(())
    }

    // ============ Ranked queries ============

    pub async fn query_conversations(
        &self,
        query: &str,
        filters: &ConversationFilters,
    ) -> Result<Vec<SearchHit<Conversation>>> {
        let Some(fts) = to_fts_query(query) else {
            return Ok(Vec::new());
        };

        let mut qb = QueryBuilder::<Sqlite>::new(format!(
            "SELECT {}, bm25(conversations_fts) AS score, \
             snippet(conversations_fts, -1, '>>>', '<<<', '...', 24) AS highlight \
             FROM conversations_fts \
             JOIN conversations c ON c.conversation_id = conversations_fts.conversation_id \
             WHERE conversations_fts MATCH ",
            CONVERSATION_COLUMNS
        ));
        qb.push_bind(fts);
        push_conversation_filters(&mut qb, filters);
        qb.push(" ORDER BY score ASC, c.created_at DESC LIMIT ")
            .push_bind(filters.limit.unwrap_or(DEFAULT_LIMIT));

        let rows = qb.build().fetch_all(&self.pool).await?;
        Ok(rows
            .iter()
            .map(|row| hit_from_row(row, conversation_from_row(row)))
            .collect())
    }

    /// Ranked message matches, filtered by their conversation's fields.
    pub async fn query_messages(
        &self,
        query: &str,
        filters: &ConversationFilters,
    ) -> Result<Vec<SearchHit<Message>>> {
        let Some(fts) = to_fts_query(query) else {
            return Ok(Vec::new());
        };

        let mut qb = QueryBuilder::<Sqlite>::new(format!(
            "SELECT {}, bm25(messages_fts) AS score, \
             snippet(messages_fts, 2, '>>>', '<<<', '...', 32) AS highlight \
             FROM messages_fts \
             JOIN messages m ON m.conversation_id = messages_fts.conversation_id \
                AND m.message_index = messages_fts.message_index \
             JOIN conversations c ON c.conversation_id = m.conversation_id \
             WHERE messages_fts MATCH ",
            MESSAGE_COLUMNS
        ));
        qb.push_bind(fts);
        push_conversation_filters(&mut qb, filters);
        qb.push(" ORDER BY score ASC, m.message_index ASC LIMIT ")
            .push_bind(filters.limit.unwrap_or(DEFAULT_LIMIT));

        let rows = qb.build().fetch_all(&self.pool).await?;
        Ok(rows
            .iter()
            .map(|row| hit_from_row(row, message_from_row(row)))
            .collect())
    }

    pub async fn query_commands(
        &self,
        query: &str,
        filters: &CommandFilters,
    ) -> Result<Vec<SearchHit<Command>>> {
        let Some(fts) = to_fts_query(query) else {
            return Ok(Vec::new());
        };

        let mut qb = QueryBuilder::<Sqlite>::new(format!(
            "SELECT {}, bm25(commands_fts) AS score, \
             snippet(commands_fts, -1, '>>>', '<<<', '...', 24) AS highlight \
             FROM commands_fts \
             JOIN commands k ON k.id = commands_fts.command_id \
             WHERE commands_fts MATCH ",
            COMMAND_COLUMNS
        ));
        qb.push_bind(fts);
        if let Some(kind) = filters.command_type {
            qb.push(" AND k.command_type = ").push_bind(kind.as_str());
        }
        qb.push(" ORDER BY score ASC, k.confidence DESC LIMIT ")
            .push_bind(filters.limit.unwrap_or(DEFAULT_LIMIT));

        let rows = qb.build().fetch_all(&self.pool).await?;
        Ok(rows
            .iter()
            .map(|row| hit_from_row(row, command_from_row(row)))
            .collect())
    }

    /// Case-insensitive substring scan over relational message content.
    pub async fn scan_messages(&self, needle: &str, limit: i64) -> Result<Vec<Message>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM messages m WHERE m.content LIKE ? ESCAPE '\\' \
             ORDER BY m.conversation_id, m.message_index LIMIT ?",
            MESSAGE_COLUMNS
        ))
        .bind(like_pattern(needle))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(message_from_row).collect())
    }

    // ============ Lookups ============

    pub async fn get_conversation(&self, conversation_id: &str) -> Result<Option<Conversation>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM conversations c WHERE c.conversation_id = ?",
            CONVERSATION_COLUMNS
        ))
        .bind(conversation_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(conversation_from_row))
    }

    /// Messages with `message_index` in `[start, start + count)`.
    pub async fn get_messages(
        &self,
        conversation_id: &str,
        start: i64,
        count: i64,
    ) -> Result<Vec<Message>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM messages m \
             WHERE m.conversation_id = ? AND m.message_index >= ? AND m.message_index < ? \
             ORDER BY m.message_index ASC",
            MESSAGE_COLUMNS
        ))
        .bind(conversation_id)
        .bind(start)
        .bind(start.saturating_add(count))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(message_from_row).collect())
    }

    pub async fn count_messages_for(&self, conversation_id: &str) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM messages WHERE conversation_id = ?")
            .bind(conversation_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    // ============ Snapshot reads ============

    pub async fn get_all_conversations(&self) -> Result<Vec<Conversation>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM conversations c ORDER BY c.created_at DESC, c.conversation_id ASC",
            CONVERSATION_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(conversation_from_row).collect())
    }

    /// At most `cap` messages, in conversation order.
    pub async fn get_all_messages(&self, cap: i64) -> Result<Vec<Message>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM messages m ORDER BY m.conversation_id, m.message_index LIMIT ?",
            MESSAGE_COLUMNS
        ))
        .bind(cap)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(message_from_row).collect())
    }

    pub async fn get_all_commands(&self) -> Result<Vec<Command>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM commands k ORDER BY k.conversation_id, k.message_index, k.id",
            COMMAND_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(command_from_row).collect())
    }

    // ============ Counts ============

    pub async fn count_conversations(&self) -> Result<i64> {
        self.count("conversations").await
    }

    pub async fn count_messages(&self) -> Result<i64> {
        self.count("messages").await
    }

    pub async fn count_commands(&self) -> Result<i64> {
        self.count("commands").await
    }

    async fn count(&self, table: &str) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", table))
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}
