use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use super::error::InvokeError;
use super::manager::ProviderState;

/// Tool metadata cached from a provider's `tools/list` handshake.
#[derive(Debug, Clone)]
pub struct ServerToolInfo {
    pub name: String,
    pub description: Option<String>,
    pub input_schema: Option<Value>,
}

/// The uniform surface an orchestrator sees: named providers exposing named,
/// schema-typed tools. Mirrors the shape of the compiled HTTP descriptors so
/// callers treat both transports alike.
#[async_trait]
pub trait ToolServerInterface: Send + Sync {
    async fn invoke_tool(
        &self,
        provider: &str,
        tool: &str,
        arguments: Value,
        timeout: Duration,
    ) -> Result<Value, InvokeError>;

    async fn tool_metadata(&self, provider: &str, tool: &str) -> Option<ServerToolInfo>;

    async fn provider_state(&self, provider: &str) -> Option<ProviderState>;
}
