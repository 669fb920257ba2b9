//! The default transport (spec §6: `server.transport.type` defaults to
//! `stdio`): serves MCP over the process's own stdin/stdout.

use std::sync::Arc;

use async_trait::async_trait;
use rmcp::ServiceExt;
use rmcp::transport::stdio;
use sker_core::{Dispatcher, SkerError, SkerResult, Transport};

use crate::handler::SkerServerHandler;

/// Serves the engine over stdio, the transport a client spawns the host
/// process under.
pub struct StdioTransport {
    server_name: String,
    server_version: String,
}

impl StdioTransport {
    pub fn new(server_name: impl Into<String>, server_version: impl Into<String>) -> Self {
        Self {
            server_name: server_name.into(),
            server_version: server_version.into(),
        }
    }
}

#[async_trait]
impl Transport for StdioTransport {
    async fn serve(&self, dispatcher: Arc<dyn Dispatcher>) -> SkerResult<()> {
        let handler = SkerServerHandler::new(dispatcher, self.server_name.clone(), self.server_version.clone());
        let service = handler
            .serve(stdio())
            .await
            .map_err(|e| SkerError::Internal(format!("stdio transport failed to start: {e}")))?;
        service
            .waiting()
            .await
            .map_err(|e| SkerError::Internal(format!("stdio transport exited: {e}")))?;
        Ok(())
    }
}
