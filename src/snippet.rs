//! Bounded conversation retrieval.
//!
//! A snippet is a window of consecutive messages from one conversation.
//! Used by the `convo snippet` CLI command and the
//! `get_conversation_snippet` tool.

use anyhow::Result;
use serde::Serialize;

use crate::index::SearchIndex;
use crate::models::{Conversation, Message};

pub const DEFAULT_MESSAGE_COUNT: i64 = 10;

/// A window of messages plus the conversation they belong to.
#[derive(Debug, Clone, Serialize)]
pub struct ConversationSnippet {
    pub conversation: Conversation,
    pub message_start: i64,
    pub message_count: i64,
    /// Stored message rows for the conversation (empty turns are never stored).
    pub total_messages: i64,
    pub messages: Vec<Message>,
}

/// CLI entry point: fetches a snippet and prints it to stdout.
pub async fn run_snippet(
    index: &SearchIndex,
    conversation_id: &str,
    start: i64,
    count: i64,
) -> Result<()> {
    let snippet = index
        .conversation_snippet(conversation_id, start, count)
        .await?;
    let c = &snippet.conversation;

    println!("--- Conversation ---");
    println!("id:              {}", c.conversation_id);
    println!(
        "title:           {}",
        if c.title.is_empty() { "(untitled)" } else { c.title.as_str() }
    );
    if let Some(ref project) = c.project {
        println!("project:         {}", project);
    }
    println!("created_at:      {}", c.created_at);
    println!("file:            {}", c.file_path);
    println!(
        "messages:        {}..{} of {} stored",
        snippet.message_start,
        window_end(snippet.message_start, snippet.message_count),
        snippet.total_messages
    );
    println!();

    for message in &snippet.messages {
        println!(
            "[{}] {} ({})",
            message.message_index, message.role, message.content_type
        );
        println!("{}", message.content);
        println!();
    }

    if snippet.messages.is_empty() {
        println!("(no messages in this range)");
    }

    Ok(())
}

/// Exclusive end of a message window, clamped at `i64::MAX`.
fn window_end(start: i64, count: i64) -> i64 {
    start.saturating_add(count)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_end_adds_count() {
        assert_eq!(window_end(0, DEFAULT_MESSAGE_COUNT), 10);
        assert_eq!(window_end(5, 3), 8);
    }

    #[test]
    fn window_end_saturates_for_huge_offsets() {
        assert_eq!(window_end(i64::MAX, 10), i64::MAX);
        assert_eq!(window_end(i64::MAX - 1, i64::MAX), i64::MAX);
    }
}
