//! Tool trait, registry, and the built-in tools.
//!
//! Every transport (MCP stdio, HTTP) dispatches through one
//! [`ToolRegistry`]. A tool receives its JSON parameters plus a
//! [`ToolContext`] giving access to the search index and the project
//! workspace, and returns a JSON payload.
//!
//! Errors are `anyhow` at this boundary. Engine errors keep their
//! [`IndexError`] inside so transports can map them to status codes.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde_json::{json, Value};

use crate::error::IndexError;
use crate::index::SearchIndex;
use crate::models::{CommandFilters, CommandType, ConversationFilters};
use crate::progress::NoProgress;
use crate::search::search_feed;
use crate::snippet::DEFAULT_MESSAGE_COUNT;
use crate::workspace::Workspace;

/// A tool callable by an agent.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Lowercase identifier with underscores, used as the route and MCP name.
    fn name(&self) -> &str;

    /// One-line description for agent discovery.
    fn description(&self) -> &str;

    /// Whether the tool only reads. `build_search_index` is the exception.
    fn read_only(&self) -> bool {
        true
    }

    /// JSON Schema (`type: "object"`) for the parameters.
    fn parameters_schema(&self) -> Value;

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value>;
}

/// Shared state handed to every tool invocation.
#[derive(Clone)]
pub struct ToolContext {
    pub index: Arc<SearchIndex>,
    pub workspace: Option<Arc<Workspace>>,
    pub archive: PathBuf,
}

impl ToolContext {
    pub fn new(index: Arc<SearchIndex>, workspace: Option<Workspace>, archive: PathBuf) -> Self {
        Self {
            index,
            workspace: workspace.map(Arc::new),
            archive,
        }
    }

    fn workspace(&self) -> Result<Arc<Workspace>> {
        match &self.workspace {
            Some(ws) => Ok(Arc::clone(ws)),
            None => bail!("workspace search is not configured: set [workspace].projects_root or --workspace"),
        }
    }
}

fn invalid(message: impl Into<String>) -> anyhow::Error {
    IndexError::InvalidQuery(message.into()).into()
}

fn required_str<'a>(params: &'a Value, name: &str) -> Result<&'a str> {
    match params.get(name).and_then(Value::as_str) {
        Some(s) if !s.trim().is_empty() => Ok(s),
        _ => Err(invalid(format!("{} must be a non-empty string", name))),
    }
}

fn optional_str(params: &Value, name: &str) -> Option<String> {
    params
        .get(name)
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
        .map(str::to_string)
}

fn optional_i64(params: &Value, name: &str) -> Result<Option<i64>> {
    match params.get(name) {
        None | Some(Value::Null) => Ok(None),
        Some(v) => v
            .as_i64()
            .map(Some)
            .ok_or_else(|| invalid(format!("{} must be an integer", name))),
    }
}

// ============ Conversation tools ============

pub struct SearchConversationsTool;

#[async_trait]
impl Tool for SearchConversationsTool {
    fn name(&self) -> &str {
        "search_conversations"
    }

    fn description(&self) -> &str {
        "Search archived conversations by title, summary, project, and message text"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": { "type": "string", "description": "Search text" },
                "limit": { "type": "integer", "description": "Max results", "default": 10 },
                "project": { "type": "string", "description": "Exact project name" },
                "date_from": { "type": "string", "description": "Earliest created_at (ISO-8601, inclusive)" },
                "date_to": { "type": "string", "description": "Latest created_at (ISO-8601, inclusive)" }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value> {
        let query = required_str(&params, "query")?;
        let filters = ConversationFilters {
            project: optional_str(&params, "project"),
            date_from: optional_str(&params, "date_from"),
            date_to: optional_str(&params, "date_to"),
            limit: optional_i64(&params, "limit")?,
        };

        let results = search_feed(&ctx.index, query, &filters).await?;
        Ok(json!({
            "query": query,
            "count": results.len(),
            "results": results
        }))
    }
}

pub struct ConversationSnippetTool;

#[async_trait]
impl Tool for ConversationSnippetTool {
    fn name(&self) -> &str {
        "get_conversation_snippet"
    }

    fn description(&self) -> &str {
        "Fetch a window of messages from one conversation"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "conversation_id": { "type": "string", "description": "Conversation id from a search result" },
                "message_start": { "type": "integer", "description": "First message index", "default": 0 },
                "message_count": { "type": "integer", "description": "Number of messages", "default": DEFAULT_MESSAGE_COUNT }
            },
            "required": ["conversation_id"]
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value> {
        let conversation_id = required_str(&params, "conversation_id")?;
        let start = optional_i64(&params, "message_start")?.unwrap_or(0);
        let count = optional_i64(&params, "message_count")?.unwrap_or(DEFAULT_MESSAGE_COUNT);

        let snippet = ctx
            .index
            .conversation_snippet(conversation_id, start, count)
            .await?;
        Ok(serde_json::to_value(&snippet)?)
    }
}

// ============ Workspace tools ============

pub struct SearchProjectsTool;

#[async_trait]
impl Tool for SearchProjectsTool {
    fn name(&self) -> &str {
        "search_projects"
    }

    fn description(&self) -> &str {
        "Search source files across the project workspace"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": { "type": "string", "description": "Text to find (case-insensitive)" },
                "file_types": {
                    "type": "array",
                    "items": { "type": "string" },
                    "description": "File extensions to include, e.g. [\"rs\", \"ts\"]"
                },
                "limit": { "type": "integer", "description": "Max hits", "default": 10 }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value> {
        let query = required_str(&params, "query")?;
        let file_types: Option<Vec<String>> = match params.get("file_types") {
            None | Some(Value::Null) => None,
            Some(Value::Array(items)) => Some(
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect(),
            ),
            Some(_) => return Err(invalid("file_types must be an array of strings")),
        };
        let limit = ctx.index.config().effective_limit(optional_i64(&params, "limit")?) as usize;

        let workspace = ctx.workspace()?;
        let needle = query.to_string();
        let results = tokio::task::spawn_blocking(move || {
            workspace.search_projects(&needle, file_types.as_deref(), limit)
        })
        .await
        .context("workspace search task panicked")??;
        Ok(json!({
            "query": query,
            "count": results.len(),
            "results": results
        }))
    }
}

pub struct ProjectOverviewTool;

#[async_trait]
impl Tool for ProjectOverviewTool {
    fn name(&self) -> &str {
        "get_project_overview"
    }

    fn description(&self) -> &str {
        "Describe a workspace project: technologies, layout, and README excerpt"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "project_name": { "type": "string", "description": "Directory name under the workspace root" }
            },
            "required": ["project_name"]
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value> {
        let name = required_str(&params, "project_name")?;
        let workspace = ctx.workspace()?;
        let name = name.to_string();
        let overview = tokio::task::spawn_blocking(move || workspace.project_overview(&name))
            .await
            .context("project overview task panicked")??;
        Ok(serde_json::to_value(&overview)?)
    }
}

// ============ Command and index tools ============

pub struct FindCommandTool;

#[async_trait]
impl Tool for FindCommandTool {
    fn name(&self) -> &str {
        "find_command"
    }

    fn description(&self) -> &str {
        "Find shell commands and snippets mentioned in past conversations"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": { "type": "string", "description": "Command text or keywords" },
                "command_type": {
                    "type": "string",
                    "enum": ["cli", "code", "config", "any"],
                    "default": "any"
                },
                "limit": { "type": "integer", "description": "Max results", "default": 10 }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value> {
        let query = required_str(&params, "query")?;
        let command_type = match optional_str(&params, "command_type") {
            Some(value) => CommandType::parse_filter(&value)?,
            None => None,
        };
        let filters = CommandFilters {
            command_type,
            limit: optional_i64(&params, "limit")?,
        };

        let found = ctx.index.find_commands(query, &filters).await?;
        Ok(json!({
            "query": query,
            "strategy": found.strategy,
            "count": found.hits.len(),
            "results": found.hits
        }))
    }
}

pub struct BuildIndexTool;

#[async_trait]
impl Tool for BuildIndexTool {
    fn name(&self) -> &str {
        "build_search_index"
    }

    fn description(&self) -> &str {
        "Rebuild the search index from the conversation archive"
    }

    fn read_only(&self) -> bool {
        false
    }

    fn parameters_schema(&self) -> Value {
        json!({ "type": "object", "properties": {} })
    }

    async fn execute(&self, _params: Value, ctx: &ToolContext) -> Result<Value> {
        let report = ctx.index.build(&ctx.archive, &NoProgress).await?;
        let stats = ctx.index.stats().await?;
        Ok(json!({
            "archive": ctx.archive.display().to_string(),
            "report": report,
            "stats": stats
        }))
    }
}

pub struct StatsTool;

#[async_trait]
impl Tool for StatsTool {
    fn name(&self) -> &str {
        "get_search_stats"
    }

    fn description(&self) -> &str {
        "Report indexed conversation, message, and command counts"
    }

    fn parameters_schema(&self) -> Value {
        json!({ "type": "object", "properties": {} })
    }

    async fn execute(&self, _params: Value, ctx: &ToolContext) -> Result<Value> {
        Ok(serde_json::to_value(ctx.index.stats().await?)?)
    }
}

// ============ Registry ============

/// Ordered set of tools exposed by the transports.
pub struct ToolRegistry {
    tools: Vec<Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self { tools: Vec::new() }
    }

    /// Registry pre-loaded with every built-in tool, in listing order.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(SearchConversationsTool));
        registry.register(Box::new(ConversationSnippetTool));
        registry.register(Box::new(SearchProjectsTool));
        registry.register(Box::new(ProjectOverviewTool));
        registry.register(Box::new(FindCommandTool));
        registry.register(Box::new(BuildIndexTool));
        registry.register(Box::new(StatsTool));
        registry
    }

    pub fn register(&mut self, tool: Box<dyn Tool>) {
        self.tools.push(tool);
    }

    pub fn tools(&self) -> &[Box<dyn Tool>] {
        &self.tools
    }

    pub fn find(&self, name: &str) -> Option<&dyn Tool> {
        self.tools
            .iter()
            .find(|t| t.name() == name)
            .map(|t| t.as_ref())
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}
