//! Index statistics and health overview.
//!
//! Summarizes what is indexed: conversation, message, and command counts,
//! plus per-project and per-command-type breakdowns. Used by `convo stats`
//! and, via [`SearchIndex::stats`], by the `get_search_stats` tool.

use anyhow::Result;
use sqlx::Row;

use crate::index::SearchIndex;

/// Per-project breakdown of the archive.
struct ProjectStats {
    project: String,
    conversations: i64,
    messages: i64,
    last_created_at: String,
}

/// Run the stats command: query the store and print a summary.
pub async fn run_stats(index: &SearchIndex) -> Result<()> {
    let stats = index.stats().await?;
    let pool = index.store().pool();

    println!("convo index stats");
    println!("=================");
    println!();
    match &index.config().db.path {
        Some(path) => {
            let size = std::fs::metadata(path).map(|m| m.len()).unwrap_or(0);
            println!("  Database:      {}", path.display());
            println!("  Size:          {}", format_bytes(size));
        }
        None => println!("  Database:      (in memory)"),
    }
    println!(
        "  Last build:    {}",
        stats
            .last_built_at
            .as_deref()
            .map(format_relative)
            .unwrap_or_else(|| "never (this process)".to_string())
    );
    println!("  Initialized:   {}", if stats.initialized { "yes" } else { "no" });
    println!();
    println!("  Conversations: {}", stats.conversations);
    println!("  Messages:      {}", stats.messages);
    println!("  Commands:      {}", stats.commands);

    let type_rows = sqlx::query(
        "SELECT command_type, COUNT(*) AS n FROM commands GROUP BY command_type ORDER BY n DESC",
    )
    .fetch_all(pool)
    .await?;

    if !type_rows.is_empty() {
        let parts: Vec<String> = type_rows
            .iter()
            .map(|row| {
                let kind: String = row.get("command_type");
                let n: i64 = row.get("n");
                format!("{} {}", n, kind)
            })
            .collect();
        println!("                 ({})", parts.join(", "));
    }

    let project_rows = sqlx::query(
        r#"
        SELECT
            COALESCE(c.project, '') AS project,
            COUNT(DISTINCT c.conversation_id) AS conversations,
            COUNT(m.id) AS messages,
            MAX(c.created_at) AS last_created_at
        FROM conversations c
        LEFT JOIN messages m ON m.conversation_id = c.conversation_id
        GROUP BY COALESCE(c.project, '')
        ORDER BY conversations DESC, project ASC
        "#,
    )
    .fetch_all(pool)
    .await?;

    let projects: Vec<ProjectStats> = project_rows
        .iter()
        .map(|row| ProjectStats {
            project: row.get("project"),
            conversations: row.get("conversations"),
            messages: row.get("messages"),
            last_created_at: row.get("last_created_at"),
        })
        .collect();

    if !projects.is_empty() {
        println!();
        println!("  By project:");
        println!(
            "  {:<28} {:>8} {:>9}   {}",
            "PROJECT", "CONVOS", "MESSAGES", "LATEST"
        );
        println!("  {}", "-".repeat(72));

        for p in &projects {
            let name = if p.project.is_empty() {
                "(none)"
            } else {
                p.project.as_str()
            };
            println!(
                "  {:<28} {:>8} {:>9}   {}",
                name, p.conversations, p.messages, p.last_created_at
            );
        }
    }

    println!();
    Ok(())
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

/// Format an RFC 3339 timestamp relative to now (e.g. "3 hours ago").
fn format_relative(rfc3339: &str) -> String {
    let Ok(then) = chrono::DateTime::parse_from_rfc3339(rfc3339) else {
        return rfc3339.to_string();
    };
    let delta = chrono::Utc::now().timestamp() - then.timestamp();

    if delta < 0 {
        rfc3339.to_string()
    } else if delta < 60 {
        "just now".to_string()
    } else if delta < 3600 {
        let mins = delta / 60;
        format!("{} min{} ago", mins, if mins == 1 { "" } else { "s" })
    } else if delta < 86400 {
        let hours = delta / 3600;
        format!("{} hour{} ago", hours, if hours == 1 { "" } else { "s" })
    } else {
        then.format("%Y-%m-%d %H:%M").to_string()
    }
}
