//! Shared MCP server instance
//!
//! One [`ToolServer`] is built lazily per process and bound to every
//! streaming session. It owns the tool registry (and through it the docs
//! index) and answers MCP requests through rmcp's [`ServerHandler`].
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────┐
//! │  ToolServer                          │
//! │  - ToolRegistry (builtin tools)      │
//! │  - DocsIndex loaded at build time    │
//! │  - Implements ServerHandler          │
//! └──────────────┬───────────────────────┘
//!                │ serve(transport, inbound)
//!                ▼
//!   rmcp::service::serve_server_with_ct over the session's queues
//! ```
//!
//! # Dispatch
//!
//! rmcp performs the `initialize` handshake, answers `ping`, spawns each
//! request on its own task and correlates responses by request id. Only
//! `tools/list` and `tools/call` reach the registry.

use crate::config::ServerConfig;
use crate::error::McpServiceError;
use crate::mcp::transport::SseTransport;
use crate::tools::command::{CommandRunner, ProcessRunner};
use crate::tools::docs::DocsIndex;
use crate::tools::{ToolContext, ToolRegistry};
use rmcp::handler::server::ServerHandler;
use rmcp::model::{
    CallToolRequestParam, CallToolResult, ClientJsonRpcMessage, Implementation, ListToolsResult,
    PaginatedRequestParam, ProtocolVersion, ServerCapabilities, ServerInfo,
};
use rmcp::service::{serve_server_with_ct, RequestContext, RoleServer};
use rmcp::ErrorData;
use std::sync::Arc;
use tokio::sync::mpsc;

pub const SERVER_NAME: &str = "akashic-mcp";

/// Cheap to clone; every clone shares one registry
#[derive(Clone)]
pub struct ToolServer {
    registry: Arc<ToolRegistry>,
}

impl ToolServer {
    pub fn new(registry: ToolRegistry) -> Self {
        Self {
            registry: Arc::new(registry),
        }
    }

    /// Builds the server with the builtin tool catalog
    ///
    /// # Errors
    ///
    /// * `McpServiceError::DocsIndex` - The docs directory exists but cannot be read
    /// * `McpServiceError::ToolRegistry` - Builtin registration failed
    pub async fn build(config: &ServerConfig) -> Result<Self, McpServiceError> {
        Self::build_with_runner(config, Arc::new(ProcessRunner)).await
    }

    pub async fn build_with_runner(
        config: &ServerConfig,
        runner: Arc<dyn CommandRunner>,
    ) -> Result<Self, McpServiceError> {
        let docs_dir = config.tools.docs_dir.clone();
        let docs = tokio::task::spawn_blocking(move || DocsIndex::load(&docs_dir))
            .await?
            .map_err(|e| McpServiceError::DocsIndex(e.to_string()))?;

        let context = ToolContext::with_runner(config.tools.clone(), docs, runner);
        let registry = ToolRegistry::with_builtin_tools(context)
            .map_err(|e| McpServiceError::ToolRegistry(e.to_string()))?;

        tracing::info!(tools = registry.len(), "Tool server built");
        Ok(Self::new(registry))
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Serves one session until it closes
    ///
    /// Runs the rmcp server loop over the transport's queues. The loop is
    /// bound to the transport's close token both ways: closing the session
    /// stops the loop, and a loop that stops for any other reason (failed
    /// handshake, inbound queue gone) closes the session.
    pub async fn serve(
        self,
        transport: Arc<SseTransport>,
        inbound: mpsc::Receiver<ClientJsonRpcMessage>,
    ) {
        let session_id = transport.session_id().unwrap_or_default().to_string();
        let closed = transport.close_token();
        let io = transport.server_io(inbound);
        tracing::debug!(session_id = %session_id, "Session server started");

        match serve_server_with_ct(self, io, closed.clone()).await {
            Ok(running) => match running.waiting().await {
                Ok(reason) => {
                    tracing::debug!(session_id = %session_id, ?reason, "Session server stopped")
                }
                Err(e) => {
                    tracing::error!(session_id = %session_id, error = %e, "Session server task failed")
                }
            },
            Err(e) => {
                tracing::warn!(session_id = %session_id, error = %e, "Session handshake failed");
            }
        }

        closed.cancel();
    }
}

impl ServerHandler for ToolServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::default(),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: SERVER_NAME.to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                title: None,
                website_url: None,
                icons: None,
            },
            instructions: Some(
                "Tools for building akashic engine games: docs search, project scaffolding, \
                 asset management, checks and packaging."
                    .to_string(),
            ),
        }
    }

    async fn list_tools(
        &self,
        _request: Option<PaginatedRequestParam>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, ErrorData> {
        Ok(ListToolsResult::with_all_items(self.registry.definitions()))
    }

    /// Unknown tools and invalid arguments come back as `isError` results
    async fn call_tool(
        &self,
        request: CallToolRequestParam,
        _context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, ErrorData> {
        Ok(self.registry.call(&request.name, request.arguments).await)
    }
}
