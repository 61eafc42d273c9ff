//! Archive file discovery and parsing.
//!
//! The archive is a flat directory of `*.json` transcripts. Each file maps to
//! one [`ConversationRecord`]: the conversation row, its non-empty messages
//! (classified), and every command the extractor finds in them.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Deserializer};
use sha2::{Digest, Sha256};

use crate::classify::classify_content;
use crate::error::IndexError;
use crate::extract::extract_commands;
use crate::models::{Conversation, Message};
use crate::store::ConversationRecord;

/// On-disk transcript layout. Every field is optional.
#[derive(Debug, Default, Deserialize)]
pub struct ArchiveFile {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub metadata: Option<ArchiveMetadata>,
    #[serde(default)]
    pub messages: Option<Vec<ArchiveMessage>>,
}

/// A field of the wrong JSON type reads as absent.
#[derive(Debug, Default, Deserialize)]
pub struct ArchiveMetadata {
    #[serde(default, deserialize_with = "lenient_string")]
    pub conversation_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub created_at: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub updated_at: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub model: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub project: Option<String>,
    #[serde(default, deserialize_with = "lenient_count")]
    pub user_turn_count: Option<i64>,
    #[serde(default, deserialize_with = "lenient_count")]
    pub assistant_turn_count: Option<i64>,
}

/// Strings pass through and numbers are rendered; anything else is `None`.
fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => Some(s),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

/// Integers pass through and finite floats are truncated; anything else is
/// `None`.
fn lenient_count<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f as i64)),
        _ => None,
    })
}

#[derive(Debug, Default, Deserialize)]
pub struct ArchiveMessage {
    #[serde(default)]
    pub role: Option<String>,
    /// A string, or an array of blocks carrying `text`.
    #[serde(default)]
    pub content: serde_json::Value,
}

impl ArchiveMessage {
    pub fn text(&self) -> String {
        content_text(&self.content)
    }
}

/// Flattens message content. Block arrays are joined with newlines; any
/// other shape reads as empty.
pub fn content_text(content: &serde_json::Value) -> String {
    match content {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Array(blocks) => blocks
            .iter()
            .filter_map(|block| match block {
                serde_json::Value::String(s) => Some(s.as_str()),
                other => other.get("text").and_then(|t| t.as_str()),
            })
            .collect::<Vec<_>>()
            .join("\n"),
        _ => String::new(),
    }
}

/// Stable derived identity: first 16 hex chars of SHA-256.
pub fn derive_id(conversation_id: &str) -> String {
    let digest = Sha256::digest(conversation_id.as_bytes());
    let hex = format!("{:x}", digest);
    hex[..16].to_string()
}

/// Lists `*.json` files directly inside `dir`, sorted by file name.
pub fn list_archive(dir: &Path) -> Result<Vec<PathBuf>, IndexError> {
    let unreadable = |source| IndexError::ArchiveUnreadable {
        path: dir.to_path_buf(),
        source,
    };

    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(unreadable)? {
        let path = entry.map_err(unreadable)?.path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == "json") {
            files.push(path);
        }
    }

    files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(files)
}

/// Reads and parses one archive file.
pub fn read_archive_file(path: &Path) -> Result<ConversationRecord> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let file: ArchiveFile = serde_json::from_str(&raw)
        .with_context(|| format!("Failed to parse {}", path.display()))?;
    Ok(to_record(path, file))
}

/// Maps a parsed file into store rows, classifying messages and extracting
/// commands along the way.
pub fn to_record(path: &Path, file: ArchiveFile) -> ConversationRecord {
    let metadata = file.metadata.unwrap_or_default();

    let conversation_id = metadata
        .conversation_id
        .filter(|id| !id.trim().is_empty())
        .unwrap_or_else(|| {
            path.file_stem()
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_default()
        });

    let conversation = Conversation {
        id: derive_id(&conversation_id),
        conversation_id: conversation_id.clone(),
        title: file.title.unwrap_or_default(),
        summary: file.summary.unwrap_or_default(),
        created_at: metadata.created_at.unwrap_or_default(),
        project: metadata.project.filter(|p| !p.is_empty()),
        file_path: path.display().to_string(),
        message_count: metadata
            .user_turn_count
            .unwrap_or(0)
            .saturating_add(metadata.assistant_turn_count.unwrap_or(0)),
    };

    let mut messages = Vec::new();
    let mut commands = Vec::new();

    for (index, raw) in file.messages.unwrap_or_default().iter().enumerate() {
        let content = raw.text();
        if content.is_empty() {
            continue;
        }
        let message_index = index as i64;

        commands.extend(extract_commands(&conversation_id, message_index, &content));
        messages.push(Message {
            conversation_id: conversation_id.clone(),
            message_index,
            role: raw.role.clone().unwrap_or_default(),
            content_type: classify_content(&content),
            content,
        });
    }

    ConversationRecord {
        conversation,
        messages,
        commands,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CommandType, ContentType};
    use serde_json::json;
    use tempfile::TempDir;

    fn parse(value: serde_json::Value) -> ArchiveFile {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn full_file_maps_to_record() {
        let file = parse(json!({
            "title": "Firebase setup",
            "summary": "Deploying the site",
            "metadata": {
                "conversation_id": "abc-123",
                "created_at": "2024-05-01T10:00:00Z",
                "project": "site",
                "user_turn_count": 3,
                "assistant_turn_count": 4
            },
            "messages": [
                { "role": "user", "content": "How do I deploy?" },
                { "role": "assistant", "content": "Run `npm install -g firebase-tools` then `firebase login`" },
                { "role": "user", "content": "" }
            ]
        }));
        let record = to_record(Path::new("/a/abc.json"), file);

        assert_eq!(record.conversation.conversation_id, "abc-123");
        assert_eq!(record.conversation.id, derive_id("abc-123"));
        assert_eq!(record.conversation.id.len(), 16);
        assert_eq!(record.conversation.message_count, 7);
        assert_eq!(record.conversation.project.as_deref(), Some("site"));

        assert_eq!(record.messages.len(), 2);
        assert_eq!(record.messages[1].message_index, 1);
        assert_eq!(record.messages[1].content_type, ContentType::Code);

        assert_eq!(record.commands.len(), 2);
        assert!(record
            .commands
            .iter()
            .all(|c| c.command_type == CommandType::Cli && c.message_index == 1));
    }

    #[test]
    fn missing_metadata_falls_back_to_file_stem() {
        let record = to_record(Path::new("/a/chat-42.json"), parse(json!({})));
        assert_eq!(record.conversation.conversation_id, "chat-42");
        assert_eq!(record.conversation.title, "");
        assert_eq!(record.conversation.message_count, 0);
        assert!(record.conversation.project.is_none());
        assert!(record.messages.is_empty());
    }

    #[test]
    fn block_content_is_joined() {
        let value = json!([{ "type": "text", "text": "first" }, { "type": "image" }, { "text": "second" }]);
        assert_eq!(content_text(&value), "first\nsecond");
        assert_eq!(content_text(&json!(42)), "");
        assert_eq!(content_text(&serde_json::Value::Null), "");
    }

    #[test]
    fn message_indices_keep_source_positions() {
        let file = parse(json!({
            "metadata": { "conversation_id": "c" },
            "messages": [
                { "role": "user", "content": "" },
                { "role": "assistant", "content": "hello there" }
            ]
        }));
        let record = to_record(Path::new("c.json"), file);
        assert_eq!(record.messages.len(), 1);
        assert_eq!(record.messages[0].message_index, 1);
    }

    #[test]
    fn whitespace_only_messages_are_kept() {
        let file = parse(json!({
            "metadata": { "conversation_id": "c" },
            "messages": [
                { "role": "user", "content": "   " },
                { "role": "assistant", "content": [] },
                { "role": "user", "content": "\n\t" }
            ]
        }));
        let record = to_record(Path::new("c.json"), file);
        let indices: Vec<i64> = record.messages.iter().map(|m| m.message_index).collect();
        assert_eq!(indices, vec![0, 2]);
        assert_eq!(record.messages[0].content, "   ");
        assert_eq!(record.messages[0].content_type, ContentType::Text);
        assert!(record.commands.is_empty());
    }

    #[test]
    fn huge_turn_counts_saturate() {
        let file = parse(json!({
            "metadata": {
                "conversation_id": "big",
                "user_turn_count": i64::MAX,
                "assistant_turn_count": 1
            }
        }));
        let record = to_record(Path::new("big.json"), file);
        assert_eq!(record.conversation.message_count, i64::MAX);
    }

    #[test]
    fn numeric_ids_and_float_counts_are_accepted() {
        let file = parse(json!({
            "metadata": {
                "conversation_id": 12345,
                "created_at": "2024-05-01",
                "project": ["not", "a", "string"],
                "user_turn_count": 2.0,
                "assistant_turn_count": "three"
            },
            "messages": [{ "role": "user", "content": "numbers everywhere" }]
        }));
        let record = to_record(Path::new("/a/export.json"), file);
        assert_eq!(record.conversation.conversation_id, "12345");
        assert_eq!(record.conversation.id, derive_id("12345"));
        assert_eq!(record.conversation.message_count, 2);
        assert!(record.conversation.project.is_none());
        assert_eq!(record.messages[0].conversation_id, "12345");
    }

    #[test]
    fn list_archive_is_flat_sorted_and_json_only() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("b.json"), "{}").unwrap();
        std::fs::write(tmp.path().join("a.json"), "{}").unwrap();
        std::fs::write(tmp.path().join("notes.txt"), "x").unwrap();
        std::fs::create_dir(tmp.path().join("nested")).unwrap();
        std::fs::write(tmp.path().join("nested").join("c.json"), "{}").unwrap();

        let files = list_archive(tmp.path()).unwrap();
        let names: Vec<String> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["a.json", "b.json"]);
    }

    #[test]
    fn missing_archive_is_unreadable() {
        let err = list_archive(Path::new("/no/such/archive")).unwrap_err();
        assert!(matches!(err, IndexError::ArchiveUnreadable { .. }));
    }

    #[test]
    fn malformed_json_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("bad.json");
        std::fs::write(&path, "{ not json").unwrap();
        let err = read_archive_file(&path).unwrap_err();
        assert!(err.to_string().contains("bad.json"));
    }
}
