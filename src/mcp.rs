//! MCP protocol bridge over stdio.
//!
//! Exposes the [`ToolRegistry`] as MCP tools via `list_tools` / `call_tool`.
//! Started by `convo serve mcp`; the agent talks JSON-RPC over this
//! process's stdin/stdout, so nothing else may write to stdout while it runs.

use std::borrow::Cow;
use std::sync::Arc;

use rmcp::model::*;
use rmcp::transport::stdio;
use rmcp::{ErrorData as McpError, ServerHandler, ServiceExt};
use tracing::info;

use crate::tools::{ToolContext, ToolRegistry};

/// Bridges the tool registry to the MCP JSON-RPC protocol.
#[derive(Clone)]
pub struct McpBridge {
    ctx: ToolContext,
    tools: Arc<ToolRegistry>,
}

impl McpBridge {
    pub fn new(ctx: ToolContext, tools: Arc<ToolRegistry>) -> Self {
        Self { ctx, tools }
    }

    /// Convert a registry tool into an rmcp `Tool` descriptor.
    fn to_mcp_tool(tool: &dyn crate::tools::Tool) -> Tool {
        let input_schema: Arc<serde_json::Map<String, serde_json::Value>> =
            match tool.parameters_schema() {
                serde_json::Value::Object(map) => Arc::new(map),
                _ => Arc::new(serde_json::Map::new()),
            };

        Tool {
            name: Cow::Owned(tool.name().to_string()),
            title: None,
            description: Some(Cow::Owned(tool.description().to_string())),
            input_schema,
            output_schema: None,
            annotations: Some(ToolAnnotations::new().read_only(tool.read_only())),
            execution: None,
            icons: None,
            meta: None,
        }
    }
}

impl ServerHandler for McpBridge {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::LATEST,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: "convo-index".to_string(),
                title: Some("Conversation Index".to_string()),
                version: env!("CARGO_PKG_VERSION").to_string(),
                description: None,
                icons: None,
                website_url: None,
            },
            instructions: Some(
                "Search an archive of past AI conversations. Call build_search_index once, \
                 then use search_conversations to find conversations, get_conversation_snippet \
                 to read them, and find_command to recover shell commands. search_projects and \
                 get_project_overview look at the local project workspace."
                    .to_string(),
            ),
        }
    }

    fn list_tools(
        &self,
        _request: Option<PaginatedRequestParams>,
        _context: rmcp::service::RequestContext<rmcp::RoleServer>,
    ) -> impl std::future::Future<Output = Result<ListToolsResult, McpError>> + Send + '_ {
        let tools: Vec<Tool> = self
            .tools
            .tools()
            .iter()
            .map(|t| Self::to_mcp_tool(t.as_ref()))
            .collect();
        std::future::ready(Ok(ListToolsResult::with_all_items(tools)))
    }

    fn get_tool(&self, name: &str) -> Option<Tool> {
        self.tools.find(name).map(Self::to_mcp_tool)
    }

    async fn call_tool(
        &self,
        request: CallToolRequestParams,
        _context: rmcp::service::RequestContext<rmcp::RoleServer>,
    ) -> Result<CallToolResult, McpError> {
        let tool = self.tools.find(&request.name).ok_or_else(|| {
            McpError::new(
                ErrorCode::METHOD_NOT_FOUND,
                format!("no tool registered with name: {}", request.name),
                None,
            )
        })?;

        let params = request
            .arguments
            .map(serde_json::Value::Object)
            .unwrap_or(serde_json::Value::Object(serde_json::Map::new()));

        match tool.execute(params, &self.ctx).await {
            Ok(result) => {
                let text = serde_json::to_string_pretty(&result).unwrap_or_default();
                Ok(CallToolResult::success(vec![Content::text(text)]))
            }
            Err(e) => Ok(CallToolResult::error(vec![Content::text(format!(
                "{}: {:#}",
                request.name, e
            ))])),
        }
    }
}

/// Serves the registry over stdin/stdout until the client disconnects.
pub async fn run_stdio(ctx: ToolContext, tools: Arc<ToolRegistry>) -> anyhow::Result<()> {
    info!(tools = tools.len(), "MCP server on stdio");
    let service = McpBridge::new(ctx, tools).serve(stdio()).await?;
    service.waiting().await?;
    Ok(())
}
