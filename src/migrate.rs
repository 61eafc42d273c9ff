use crate::error::Result;
use sqlx::SqlitePool;

/// FTS5 mirrors: `(name, column list)`.
const FTS_TABLES: &[(&str, &str)] = &[
    (
        "conversations_fts",
        "conversation_id UNINDEXED, title, summary, project",
    ),
    (
        "messages_fts",
        "conversation_id UNINDEXED, message_index UNINDEXED, content",
    ),
    (
        "commands_fts",
        "command_id UNINDEXED, conversation_id UNINDEXED, command, context",
    ),
];

pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS conversations (
            id TEXT PRIMARY KEY,
            conversation_id TEXT NOT NULL UNIQUE,
            title TEXT NOT NULL DEFAULT '',
            summary TEXT NOT NULL DEFAULT '',
            created_at TEXT NOT NULL DEFAULT '',
            project TEXT,
            file_path TEXT NOT NULL,
            message_count INTEGER NOT NULL DEFAULT 0
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS messages (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            conversation_id TEXT NOT NULL,
            message_index INTEGER NOT NULL,
            role TEXT NOT NULL DEFAULT '',
            content TEXT NOT NULL,
            content_type TEXT NOT NULL DEFAULT 'text',
            UNIQUE(conversation_id, message_index),
            FOREIGN KEY (conversation_id) REFERENCES conversations(conversation_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS commands (
            id TEXT PRIMARY KEY,
            conversation_id TEXT NOT NULL,
            message_index INTEGER NOT NULL,
            command TEXT NOT NULL,
            command_type TEXT NOT NULL,
            context TEXT NOT NULL DEFAULT '',
            confidence REAL NOT NULL,
            FOREIGN KEY (conversation_id) REFERENCES conversations(conversation_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // FTS5 CREATE is not idempotent natively, so we check first
    for (name, columns) in FTS_TABLES {
        let exists: bool = sqlx::query_scalar(
            "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type='table' AND name=?",
        )
        .bind(name)
        .fetch_one(pool)
        .await?;

        if !exists {
            sqlx::query(&format!(
                "CREATE VIRTUAL TABLE {} USING fts5({})",
                name, columns
            ))
            .execute(pool)
            .await?;
        }
    }

    // Create indexes
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_conversations_project ON conversations(project)")
        .execute(pool)
        .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_conversations_created_at ON conversations(created_at)",
    )
    .execute(pool)
    .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_commands_conversation ON commands(conversation_id, message_index)",
    )
    .execute(pool)
    .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_commands_type ON commands(command_type)")
        .execute(pool)
        .await?;

    Ok(())
}

/// Names of every table the store truncates on rebuild, children first.
pub const ALL_TABLES: &[&str] = &[
    "commands_fts",
    "messages_fts",
    "conversations_fts",
    "commands",
    "messages",
    "conversations",
];
