//! The optional HTTP transport (spec §6: `server.transport.type = "http"`),
//! built on the MCP SDK's streamable-HTTP server support with `axum` as
//! the listener, matching the teacher's own `axum`-based HTTP server
//! capability.

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use rmcp::transport::streamable_http_server::{
    StreamableHttpServerConfig, StreamableHttpService, session::local::LocalSessionManager,
};
use sker_core::{Dispatcher, SkerError, SkerResult, Transport};

use crate::handler::SkerServerHandler;

/// `server.transport.http.*` fields relevant to standing up the listener
/// (spec §6); CORS/DNS-rebinding/session fields are applied by the
/// runtime's config resolver before this struct is built.
#[derive(Debug, Clone)]
pub struct HttpTransportConfig {
    pub host: String,
    pub port: u16,
    pub request_timeout: std::time::Duration,
}

impl Default for HttpTransportConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
            request_timeout: std::time::Duration::from_secs(30),
        }
    }
}

pub struct HttpTransport {
    config: HttpTransportConfig,
    server_name: String,
    server_version: String,
}

impl HttpTransport {
    pub fn new(config: HttpTransportConfig, server_name: impl Into<String>, server_version: impl Into<String>) -> Self {
        Self {
            config,
            server_name: server_name.into(),
            server_version: server_version.into(),
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn serve(&self, dispatcher: Arc<dyn Dispatcher>) -> SkerResult<()> {
        let server_name = self.server_name.clone();
        let server_version = self.server_version.clone();
        let service = StreamableHttpService::new(
            move || Ok(SkerServerHandler::new(Arc::clone(&dispatcher), server_name.clone(), server_version.clone())),
            LocalSessionManager::default().into(),
            StreamableHttpServerConfig {
                sse_keep_alive: Some(self.config.request_timeout),
                stateful_mode: true,
            },
        );

        let app = axum::Router::new().nest_service("/mcp", service);
        let addr: SocketAddr = format!("{}:{}", self.config.host, self.config.port)
            .parse()
            .map_err(|e| SkerError::Internal(format!("invalid transport.http address: {e}")))?;

        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| SkerError::Internal(format!("binding {addr}: {e}")))?;
        tracing::info!(%addr, "http transport listening");
        axum::serve(listener, app)
            .await
            .map_err(|e| SkerError::Internal(format!("http transport exited: {e}")))?;
        Ok(())
    }
}
