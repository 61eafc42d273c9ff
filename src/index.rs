//! The query engine.
//!
//! [`SearchIndex`] owns the SQLite store and the fuzzy snapshot. It is built
//! explicitly with [`SearchIndex::open`] and [`SearchIndex::build`]; every
//! search or lookup fails with [`IndexError::NotInitialized`] until a build
//! (or [`SearchIndex::attach_existing`]) has succeeded.
//!
//! The mutable state sits behind a `tokio` `RwLock`. A build holds the write
//! lock from the clear to the snapshot, so readers either see the previous
//! complete index state or wait for the new one.

use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{RwLock, RwLockReadGuard};
use tracing::{debug, info};

use crate::config::Config;
use crate::db;
use crate::error::{IndexError, Result};
use crate::extract::{extract_candidates, SCAN_CONTEXT_LINES};
use crate::fuzzy::FuzzySnapshot;
use crate::ingest::{ingest_archive, BuildReport};
use crate::migrate;
use crate::models::{
    Command, CommandFilters, Conversation, ConversationFilters, IndexStats, Message, SearchHit,
};
use crate::progress::{BuildProgressEvent, BuildProgressReporter};
use crate::snippet::ConversationSnippet;
use crate::store::SqliteStore;

/// Messages inspected by the scan fallback of [`SearchIndex::find_commands`].
const SCAN_MESSAGE_LIMIT: i64 = 200;

#[derive(Default)]
struct IndexState {
    initialized: bool,
    fuzzy: Option<Arc<FuzzySnapshot>>,
    last_built_at: Option<DateTime<Utc>>,
}

/// Which tier of [`SearchIndex::find_commands`] produced the results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStrategy {
    FullText,
    Fuzzy,
    Scan,
}

impl MatchStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchStrategy::FullText => "full_text",
            MatchStrategy::Fuzzy => "fuzzy",
            MatchStrategy::Scan => "scan",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CommandMatches {
    pub strategy: MatchStrategy,
    pub hits: Vec<SearchHit<Command>>,
}

pub struct SearchIndex {
    config: Config,
    store: SqliteStore,
    state: RwLock<IndexState>,
}

impl SearchIndex {
    /// Connects to the configured store and runs migrations. The returned
    /// index is not initialized.
    pub async fn open(config: &Config) -> Result<Self> {
        let pool = db::connect(config).await?;
        migrate::run_migrations(&pool).await?;
        Ok(Self {
            config: config.clone(),
            store: SqliteStore::new(pool),
            state: RwLock::new(IndexState::default()),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &SqliteStore {
        &self.store
    }

    pub async fn close(&self) {
        self.store.close().await;
    }

    /// Rebuilds everything from `archive`: clear, batched ingestion, then
    /// the fuzzy snapshot.
    pub async fn build(
        &self,
        archive: &Path,
        reporter: &dyn BuildProgressReporter,
    ) -> Result<BuildReport> {
        let mut state = self.state.write().await;
        state.initialized = false;
        state.fuzzy = None;

        info!(archive = %archive.display(), "building search index");
        self.store.clear().await?;

        let report = ingest_archive(
            &self.store,
            archive,
            self.config.archive.batch_size,
            reporter,
        )
        .await?;

        reporter.report(BuildProgressEvent::Snapshotting);
        state.fuzzy = Some(Arc::new(self.snapshot().await?));
        state.initialized = true;
        state.last_built_at = Some(Utc::now());

        info!(
            conversations = report.conversations,
            messages = report.messages,
            commands = report.commands,
            "search index ready"
        );
        Ok(report)
    }

    /// Serves an already-populated file-backed store without re-ingesting.
    /// Returns `false` (and stays uninitialized) for in-memory or empty
    /// stores.
    pub async fn attach_existing(&self) -> Result<bool> {
        if self.config.db.path.is_none() {
            return Ok(false);
        }

        let mut state = self.state.write().await;
        if self.store.count_conversations().await? == 0 {
            return Ok(false);
        }

        state.fuzzy = Some(Arc::new(self.snapshot().await?));
        state.initialized = true;
        info!("attached to existing index");
        Ok(true)
    }

    async fn snapshot(&self) -> Result<FuzzySnapshot> {
        let conversations = self.store.get_all_conversations().await?;
        let messages = self
            .store
            .get_all_messages(self.config.retrieval.snapshot_message_cap)
            .await?;
        let commands = self.store.get_all_commands().await?;
        Ok(FuzzySnapshot::build(
            conversations,
            messages,
            commands,
            &self.config.fuzzy,
        ))
    }

    async fn ready(&self) -> Result<RwLockReadGuard<'_, IndexState>> {
        let state = self.state.read().await;
        if !state.initialized {
            return Err(IndexError::NotInitialized);
        }
        Ok(state)
    }

    async fn fuzzy(&self) -> Result<Arc<FuzzySnapshot>> {
        self.ready()
            .await?
            .fuzzy
            .clone()
            .ok_or(IndexError::FuzzyUnavailable)
    }

    fn clamp_conversation_filters(&self, filters: &ConversationFilters) -> ConversationFilters {
        ConversationFilters {
            limit: Some(self.config.effective_limit(filters.limit)),
            ..filters.clone()
        }
    }

    fn clamp_command_filters(&self, filters: &CommandFilters) -> CommandFilters {
        CommandFilters {
            limit: Some(self.config.effective_limit(filters.limit)),
            ..filters.clone()
        }
    }

    // ============ Ranked search ============

    pub async fn search_conversations(
        &self,
        query: &str,
        filters: &ConversationFilters,
    ) -> Result<Vec<SearchHit<Conversation>>> {
        let _state = self.ready().await?;
        self.store
            .query_conversations(query, &self.clamp_conversation_filters(filters))
            .await
    }

    pub async fn search_messages(
        &self,
        query: &str,
        filters: &ConversationFilters,
    ) -> Result<Vec<SearchHit<Message>>> {
        let _state = self.ready().await?;
        self.store
            .query_messages(query, &self.clamp_conversation_filters(filters))
            .await
    }

    /// Conversation and message hits for one query, read under a single
    /// guard so both come from the same build.
    pub async fn search_feed_parts(
        &self,
        query: &str,
        filters: &ConversationFilters,
    ) -> Result<(Vec<SearchHit<Conversation>>, Vec<SearchHit<Message>>)> {
        let _state = self.ready().await?;
        let filters = self.clamp_conversation_filters(filters);
        let conversations = self.store.query_conversations(query, &filters).await?;
        let messages = self.store.query_messages(query, &filters).await?;
        Ok((conversations, messages))
    }

    pub async fn search_commands(
        &self,
        query: &str,
        filters: &CommandFilters,
    ) -> Result<Vec<SearchHit<Command>>> {
        let _state = self.ready().await?;
        self.store
            .query_commands(query, &self.clamp_command_filters(filters))
            .await
    }

    // ============ Fuzzy search ============

    pub async fn fuzzy_search_conversations(
        &self,
        query: &str,
        limit: usize,
    ) -> Result<Vec<SearchHit<Conversation>>> {
        Ok(self.fuzzy().await?.conversations.search(query, limit))
    }

    pub async fn fuzzy_search_messages(
        &self,
        query: &str,
        limit: usize,
    ) -> Result<Vec<SearchHit<Message>>> {
        Ok(self.fuzzy().await?.messages.search(query, limit))
    }

    pub async fn fuzzy_search_commands(
        &self,
        query: &str,
        limit: usize,
    ) -> Result<Vec<SearchHit<Command>>> {
        Ok(self.fuzzy().await?.commands.search(query, limit))
    }

    /// Command lookup with fallbacks: full-text rank, then the fuzzy
    /// snapshot, then a substring scan over raw messages re-running the
    /// extractor with a wider context window.
    pub async fn find_commands(
        &self,
        query: &str,
        filters: &CommandFilters,
    ) -> Result<CommandMatches> {
        let filters = self.clamp_command_filters(filters);
        let limit = filters.limit.unwrap_or(self.config.retrieval.default_limit);

        let state = self.ready().await?;

        let hits = self.store.query_commands(query, &filters).await?;
        if !hits.is_empty() {
            debug!(query, hits = hits.len(), "find_commands: full-text");
            return Ok(CommandMatches {
                strategy: MatchStrategy::FullText,
                hits,
            });
        }

        if let Some(fuzzy) = state.fuzzy.clone() {
            let hits = fuzzy.commands.search_where(query, limit as usize, |c| {
                filters.command_type.map_or(true, |kind| c.command_type == kind)
            });
            if !hits.is_empty() {
                debug!(query, hits = hits.len(), "find_commands: fuzzy");
                return Ok(CommandMatches {
                    strategy: MatchStrategy::Fuzzy,
                    hits,
                });
            }
        }

        let hits = self.scan_commands(query, &filters, limit).await?;
        debug!(query, hits = hits.len(), "find_commands: scan");
        Ok(CommandMatches {
            strategy: MatchStrategy::Scan,
            hits,
        })
    }

    async fn scan_commands(
        &self,
        query: &str,
        filters: &CommandFilters,
        limit: i64,
    ) -> Result<Vec<SearchHit<Command>>> {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            return Ok(Vec::new());
        }

        let messages = self.store.scan_messages(query.trim(), SCAN_MESSAGE_LIMIT).await?;
        let mut hits = Vec::new();

        for message in &messages {
            let candidates = extract_candidates(&message.content, SCAN_CONTEXT_LINES);
            for (ordinal, candidate) in candidates.into_iter().enumerate() {
                if !candidate.command.to_lowercase().contains(&needle) {
                    continue;
                }
                if filters
                    .command_type
                    .is_some_and(|kind| kind != candidate.command_type)
                {
                    continue;
                }
                let score = 1.0 - candidate.confidence;
                hits.push(SearchHit::new(
                    Command {
                        id: format!(
                            "{}:{}:{}",
                            message.conversation_id, message.message_index, ordinal
                        ),
                        conversation_id: message.conversation_id.clone(),
                        message_index: message.message_index,
                        command: candidate.command,
                        command_type: candidate.command_type,
                        context: candidate.context,
                        confidence: candidate.confidence,
                    },
                    score,
                ));
            }
        }

        hits.truncate(limit.max(0) as usize);
        Ok(hits)
    }

    // ============ Lookups ============

    pub async fn get_conversation(&self, conversation_id: &str) -> Result<Conversation> {
        let _state = self.ready().await?;
        self.store
            .get_conversation(conversation_id)
            .await?
            .ok_or_else(|| IndexError::not_found("conversation", conversation_id))
    }

    /// Messages with `message_index` in `[start, start + count)`.
    pub async fn conversation_snippet(
        &self,
        conversation_id: &str,
        start: i64,
        count: i64,
    ) -> Result<ConversationSnippet> {
        if start < 0 {
            return Err(IndexError::InvalidQuery(
                "message_start must be >= 0".to_string(),
            ));
        }
        if count < 1 {
            return Err(IndexError::InvalidQuery(
                "message_count must be >= 1".to_string(),
            ));
        }

        let _state = self.ready().await?;
        let conversation = self
            .store
            .get_conversation(conversation_id)
            .await?
            .ok_or_else(|| IndexError::not_found("conversation", conversation_id))?;
        let messages = self
            .store
            .get_messages(conversation_id, start, count)
            .await?;
        let total_messages = self.store.count_messages_for(conversation_id).await?;

        Ok(ConversationSnippet {
            conversation,
            message_start: start,
            message_count: count,
            total_messages,
            messages,
        })
    }

    /// Row counts and build status. Works before the first build.
    pub async fn stats(&self) -> Result<IndexStats> {
        let state = self.state.read().await;
        Ok(IndexStats {
            conversations: self.store.count_conversations().await?,
            messages: self.store.count_messages().await?,
            commands: self.store.count_commands().await?,
            initialized: state.initialized,
            last_built_at: state.last_built_at.map(|t| t.to_rfc3339()),
        })
    }
}
