//! Core data models used throughout the index.
//!
//! Conversations, messages, and commands are the three persisted entity
//! types. Search hits and stats are transient and only flow back to callers.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::error::IndexError;

/// One transcript with its metadata.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Conversation {
    /// Derived, stable identity (hash of `conversation_id`).
    pub id: String,
    /// External unique key from the archive metadata (or the file stem).
    pub conversation_id: String,
    pub title: String,
    pub summary: String,
    /// ISO-8601 string, compared lexically.
    pub created_at: String,
    pub project: Option<String>,
    pub file_path: String,
    /// Sum of recorded user and assistant turn counts.
    pub message_count: i64,
}

/// One turn within a conversation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Message {
    pub conversation_id: String,
    pub message_index: i64,
    pub role: String,
    pub content: String,
    pub content_type: ContentType,
}

/// A command, code, or config snippet extracted from a message.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Command {
    pub id: String,
    pub conversation_id: String,
    pub message_index: i64,
    pub command: String,
    pub command_type: CommandType,
    pub context: String,
    pub confidence: f64,
}

/// Classification of a message body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    Text,
    Code,
    Command,
}

impl ContentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::Text => "text",
            ContentType::Code => "code",
            ContentType::Command => "command",
        }
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContentType {
    type Err = IndexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(ContentType::Text),
            "code" => Ok(ContentType::Code),
            "command" => Ok(ContentType::Command),
            other => Err(IndexError::InvalidQuery(format!(
                "unknown content type: '{}'",
                other
            ))),
        }
    }
}

/// Kind of an extracted command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandType {
    Cli,
    Code,
    Config,
}

impl CommandType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommandType::Cli => "cli",
            CommandType::Code => "code",
            CommandType::Config => "config",
        }
    }

    /// Parses a command-type filter value. `any` (or an empty string)
    /// disables the filter and yields `None`.
    pub fn parse_filter(value: &str) -> Result<Option<Self>, IndexError> {
        match value.trim() {
            "" | "any" => Ok(None),
            other => other.parse().map(Some),
        }
    }
}

impl fmt::Display for CommandType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CommandType {
    type Err = IndexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cli" => Ok(CommandType::Cli),
            "code" => Ok(CommandType::Code),
            "config" => Ok(CommandType::Config),
            other => Err(IndexError::InvalidQuery(format!(
                "unknown command type: '{}'. Use cli, code, config, or any.",
                other
            ))),
        }
    }
}

/// Filters for conversation and message queries.
#[derive(Debug, Clone, Default)]
pub struct ConversationFilters {
    /// Exact match on the stored project.
    pub project: Option<String>,
    /// Inclusive lower bound on `created_at` (lexical).
    pub date_from: Option<String>,
    /// Inclusive upper bound on `created_at` (lexical).
    pub date_to: Option<String>,
    pub limit: Option<i64>,
}

impl ConversationFilters {
    /// In-memory equivalent of the SQL filter clauses.
    pub fn matches(&self, conversation: &Conversation) -> bool {
        if let Some(project) = &self.project {
            if conversation.project.as_deref() != Some(project.as_str()) {
                return false;
            }
        }
        if let Some(from) = &self.date_from {
            if conversation.created_at.as_str() < from.as_str() {
                return false;
            }
        }
        if let Some(to) = &self.date_to {
            if conversation.created_at.as_str() > to.as_str() {
                return false;
            }
        }
        true
    }
}

/// Filters for command queries.
#[derive(Debug, Clone, Default)]
pub struct CommandFilters {
    pub command_type: Option<CommandType>,
    pub limit: Option<i64>,
}

/// A matched entity with its score.
///
/// Scores are lower-is-better for both FTS5 rank and fuzzy distance.
#[derive(Debug, Clone, Serialize)]
pub struct SearchHit<T> {
    #[serde(flatten)]
    pub item: T,
    pub score: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub highlight: Option<String>,
}

impl<T> SearchHit<T> {
    pub fn new(item: T, score: f64) -> Self {
        Self {
            item,
            score,
            highlight: None,
        }
    }
}

/// Tagged union over the three searchable entity kinds.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum SearchResult {
    Conversation(SearchHit<Conversation>),
    Message(SearchHit<Message>),
    Command(SearchHit<Command>),
}

impl SearchResult {
    pub fn score(&self) -> f64 {
        match self {
            SearchResult::Conversation(h) => h.score,
            SearchResult::Message(h) => h.score,
            SearchResult::Command(h) => h.score,
        }
    }

    /// External conversation id the hit belongs to.
    pub fn conversation_id(&self) -> &str {
        match self {
            SearchResult::Conversation(h) => &h.item.conversation_id,
            SearchResult::Message(h) => &h.item.conversation_id,
            SearchResult::Command(h) => &h.item.conversation_id,
        }
    }
}

/// Row counts plus build status.
#[derive(Debug, Clone, Serialize)]
pub struct IndexStats {
    pub conversations: i64,
    pub messages: i64,
    pub commands: i64,
    pub initialized: bool,
    pub last_built_at: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_type_filter_any_disables() {
        assert_eq!(CommandType::parse_filter("any").unwrap(), None);
        assert_eq!(CommandType::parse_filter("").unwrap(), None);
        assert_eq!(
            CommandType::parse_filter("config").unwrap(),
            Some(CommandType::Config)
        );
        assert!(CommandType::parse_filter("shell").is_err());
    }

    #[test]
    fn search_result_serializes_with_kind_tag() {
        let hit = SearchHit::new(
            Command {
                id: "c1:0:0".to_string(),
                conversation_id: "c1".to_string(),
                message_index: 0,
                command: "npm test".to_string(),
                command_type: CommandType::Cli,
                context: "npm test".to_string(),
                confidence: 0.9,
            },
            -1.5,
        );
        let value = serde_json::to_value(SearchResult::Command(hit)).unwrap();
        assert_eq!(value["kind"], "command");
        assert_eq!(value["command_type"], "cli");
        assert_eq!(value["score"], -1.5);
        assert!(value.get("highlight").is_none());
    }
}
