//! Conversation search as presented to users and tools.
//!
//! The conversation feed merges ranked conversation hits (title, summary,
//! project) with ranked message hits, so a conversation is found whether the
//! query matches its metadata or something said in it. When the ranked
//! tiers find nothing, the fuzzy snapshot is consulted with the same
//! filters applied in memory.

use std::collections::HashMap;

use anyhow::Result;
use tracing::debug;

use crate::index::SearchIndex;
use crate::models::{
    CommandFilters, Conversation, ConversationFilters, Message, SearchHit, SearchResult,
};

/// Combines conversation and message hits, keeping the best (lowest) score
/// per conversation, sorted ascending and truncated to `limit`.
pub fn conversation_feed(
    conversations: Vec<SearchHit<Conversation>>,
    messages: Vec<SearchHit<Message>>,
    limit: usize,
) -> Vec<SearchResult> {
    let mut best: HashMap<String, SearchResult> = HashMap::new();

    let candidates = conversations
        .into_iter()
        .map(SearchResult::Conversation)
        .chain(messages.into_iter().map(SearchResult::Message));

    for candidate in candidates {
        let key = candidate.conversation_id().to_string();
        let better = best
            .get(&key)
            .map_or(true, |existing| candidate.score() < existing.score());
        if better {
            best.insert(key, candidate);
        }
    }

    let mut feed: Vec<SearchResult> = best.into_values().collect();
    feed.sort_by(|a, b| {
        a.score()
            .total_cmp(&b.score())
            .then_with(|| a.conversation_id().cmp(b.conversation_id()))
    });
    feed.truncate(limit);
    feed
}

/// Runs the full conversation search: ranked feed, then fuzzy fallback.
pub async fn search_feed(
    index: &SearchIndex,
    query: &str,
    filters: &ConversationFilters,
) -> Result<Vec<SearchResult>> {
    let limit = index.config().effective_limit(filters.limit) as usize;

    let (conversations, messages) = index.search_feed_parts(query, filters).await?;
    let feed = conversation_feed(conversations, messages, limit);
    if !feed.is_empty() {
        debug!(query, results = feed.len(), "conversation feed: full-text");
        return Ok(feed);
    }

    let fuzzy: Vec<SearchResult> = index
        .fuzzy_search_conversations(query, index.config().retrieval.max_limit as usize)
        .await?
        .into_iter()
        .filter(|hit| filters.matches(&hit.item))
        .take(limit)
        .map(SearchResult::Conversation)
        .collect();
    debug!(query, results = fuzzy.len(), "conversation feed: fuzzy");
    Ok(fuzzy)
}

/// CLI entry point for `convo search`.
pub async fn run_search(
    index: &SearchIndex,
    query: &str,
    filters: &ConversationFilters,
) -> Result<()> {
    if query.trim().is_empty() {
        println!("No results.");
        return Ok(());
    }

    let results = search_feed(index, query, filters).await?;
    if results.is_empty() {
        println!("No results.");
        return Ok(());
    }

    for (i, result) in results.iter().enumerate() {
        match result {
            SearchResult::Conversation(hit) => {
                let c = &hit.item;
                println!(
                    "{}. [{:.2}] {}",
                    i + 1,
                    hit.score,
                    if c.title.is_empty() { "(untitled)" } else { c.title.as_str() }
                );
                println!("    created: {}", c.created_at);
                if let Some(ref project) = c.project {
                    println!("    project: {}", project);
                }
                if let Some(ref highlight) = hit.highlight {
                    println!("    match: \"{}\"", highlight.replace('\n', " ").trim());
                }
                println!("    id: {}", c.conversation_id);
            }
            SearchResult::Message(hit) => {
                let m = &hit.item;
                println!(
                    "{}. [{:.2}] message {} ({})",
                    i + 1,
                    hit.score,
                    m.message_index,
                    m.role
                );
                let excerpt = hit.highlight.as_deref().unwrap_or(&m.content);
                println!("    match: \"{}\"", excerpt.replace('\n', " ").trim());
                println!("    id: {}", m.conversation_id);
            }
            SearchResult::Command(hit) => {
                println!("{}. [{:.2}] {}", i + 1, hit.score, hit.item.command);
                println!("    id: {}", hit.item.conversation_id);
            }
        }
        println!();
    }

    Ok(())
}

/// CLI entry point for `convo commands`.
pub async fn run_commands(
    index: &SearchIndex,
    query: &str,
    filters: &CommandFilters,
    fuzzy_only: bool,
) -> Result<()> {
    let (strategy, hits) = if fuzzy_only {
        let limit = index.config().effective_limit(filters.limit) as usize;
        let hits = index
            .fuzzy_search_commands(query, limit)
            .await?
            .into_iter()
            .filter(|hit| {
                filters
                    .command_type
                    .map_or(true, |kind| hit.item.command_type == kind)
            })
            .collect::<Vec<_>>();
        ("fuzzy", hits)
    } else {
        let found = index.find_commands(query, filters).await?;
        (found.strategy.as_str(), found.hits)
    };

    if hits.is_empty() {
        println!("No commands found.");
        return Ok(());
    }

    println!("{} command(s) via {}", hits.len(), strategy);
    println!();
    for (i, hit) in hits.iter().enumerate() {
        let k = &hit.item;
        println!(
            "{}. [{}] {}  (confidence {:.2}, score {:.2})",
            i + 1,
            k.command_type,
            k.command,
            k.confidence,
            hit.score
        );
        println!("    from: {} #{}", k.conversation_id, k.message_index);
        for line in k.context.lines() {
            println!("    | {}", line);
        }
        println!();
    }

    Ok(())
}
