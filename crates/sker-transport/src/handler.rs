//! Bridges the MCP SDK's [`rmcp::ServerHandler`] callbacks to
//! [`sker_core::Dispatcher`], the engine's own transport-agnostic entry
//! point. The SDK's JSON-RPC framing itself is a black box (spec §1) —
//! this module only translates typed request/response records on either
//! side of it.

use std::sync::Arc;

use rmcp::ErrorData as McpError;
use rmcp::model::{
    CallToolRequestParam, CallToolResult, Content, GetPromptRequestParam, GetPromptResult,
    ListPromptsResult, ListResourcesResult, ListToolsResult, PaginatedRequestParam, Prompt,
    ReadResourceRequestParam, ReadResourceResult, Resource, ResourceContents, ServerCapabilities,
    ServerInfo,
};
use rmcp::service::{RequestContext, RoleServer};
use rmcp::ServerHandler;
use sker_core::{Dispatcher, InboundRequest, RequestKind, SkerError};

/// Implements the MCP server surface on top of a [`Dispatcher`], shared by
/// every transport in this crate.
#[derive(Clone)]
pub struct SkerServerHandler {
    dispatcher: Arc<dyn Dispatcher>,
    server_name: String,
    server_version: String,
}

impl SkerServerHandler {
    pub fn new(dispatcher: Arc<dyn Dispatcher>, server_name: String, server_version: String) -> Self {
        Self {
            dispatcher,
            server_name,
            server_version,
        }
    }

    async fn dispatch(&self, kind: RequestKind, name: String, arguments: serde_json::Value) -> Result<serde_json::Value, McpError> {
        let request = InboundRequest {
            id: serde_json::Value::Null,
            kind,
            name,
            arguments,
        };
        self.dispatcher
            .dispatch(request)
            .await
            .map_err(skerr_to_mcp)
    }
}

/// Maps [`SkerError`] onto the JSON-RPC error codes spec.md §7 assigns,
/// preserving the handler-facing message and attaching `data.code` for the
/// app-level codes the spec calls out by name.
fn skerr_to_mcp(err: SkerError) -> McpError {
    let code = err.code() as i32;
    let data = Some(serde_json::json!({ "code": err.data_code() }));
    McpError::new(rmcp::model::ErrorCode(code), err.to_string(), data)
}

impl ServerHandler for SkerServerHandler {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            server_info: rmcp::model::Implementation {
                name: self.server_name.clone(),
                version: self.server_version.clone(),
            },
            capabilities: ServerCapabilities::builder()
                .enable_tools()
                .enable_resources()
                .enable_prompts()
                .build(),
            ..Default::default()
        }
    }

    async fn list_tools(
        &self,
        _request: Option<PaginatedRequestParam>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, McpError> {
        let tools = self
            .dispatcher
            .list(RequestKind::Tool)
            .into_iter()
            .filter_map(|entry| serde_json::from_value(entry).ok())
            .collect();
        Ok(ListToolsResult {
            tools,
            next_cursor: None,
        })
    }

    async fn call_tool(
        &self,
        request: CallToolRequestParam,
        _context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, McpError> {
        let arguments = request
            .arguments
            .map(serde_json::Value::Object)
            .unwrap_or(serde_json::Value::Null);
        match self.dispatch(RequestKind::Tool, request.name.to_string(), arguments).await {
            Ok(value) => Ok(CallToolResult::success(vec![Content::json(value)?])),
            Err(err) => Ok(CallToolResult::error(vec![Content::text(err.message.clone())])),
        }
    }

    async fn list_resources(
        &self,
        _request: Option<PaginatedRequestParam>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListResourcesResult, McpError> {
        let resources: Vec<Resource> = self
            .dispatcher
            .list(RequestKind::Resource)
            .into_iter()
            .filter_map(|entry| serde_json::from_value(entry).ok())
            .collect();
        Ok(ListResourcesResult {
            resources,
            next_cursor: None,
        })
    }

    async fn read_resource(
        &self,
        request: ReadResourceRequestParam,
        _context: RequestContext<RoleServer>,
    ) -> Result<ReadResourceResult, McpError> {
        let arguments = serde_json::json!({ "uri": request.uri });
        let value = self
            .dispatch(RequestKind::Resource, request.uri.clone(), arguments)
            .await?;
        let text = value.as_str().map(str::to_string).unwrap_or_else(|| value.to_string());
        Ok(ReadResourceResult {
            contents: vec![ResourceContents::text(text, request.uri)],
        })
    }

    async fn list_prompts(
        &self,
        _request: Option<PaginatedRequestParam>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListPromptsResult, McpError> {
        let prompts: Vec<Prompt> = self
            .dispatcher
            .list(RequestKind::Prompt)
            .into_iter()
            .filter_map(|entry| serde_json::from_value(entry).ok())
            .collect();
        Ok(ListPromptsResult {
            prompts,
            next_cursor: None,
        })
    }

    async fn get_prompt(
        &self,
        request: GetPromptRequestParam,
        _context: RequestContext<RoleServer>,
    ) -> Result<GetPromptResult, McpError> {
        let arguments = request
            .arguments
            .map(serde_json::Value::Object)
            .unwrap_or(serde_json::Value::Null);
        let value = self.dispatch(RequestKind::Prompt, request.name, arguments).await?;
        let result: GetPromptResult = serde_json::from_value(value)
            .map_err(|e| McpError::internal_error(format!("malformed prompt result: {e}"), None))?;
        Ok(result)
    }
}
