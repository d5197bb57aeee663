use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use serde_json::{Value, json};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::config::ServerConfig;

use super::error::{InvokeError, TransportError};
use super::interface::{ServerToolInfo, ToolServerInterface};
use super::process::ServerProcess;

const PROTOCOL_VERSION: &str = "2024-11-05";

/// Lifecycle of one named provider.
///
/// `Starting` covers spawn, the initialization handshake, and the tool
/// listing; any failure in that window parks the provider in `Degraded`,
/// which stays queryable but refuses invocations. `Terminated` is final:
/// a terminated provider is reconstructed, never resumed, so it always
/// comes back with a fresh process and a fresh in-flight table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderState {
    NotStarted,
    Starting,
    Ready,
    Degraded,
    Terminated,
}

impl ProviderState {
    pub fn as_str(self) -> &'static str {
        match self {
            ProviderState::NotStarted => "not started",
            ProviderState::Starting => "starting",
            ProviderState::Ready => "ready",
            ProviderState::Degraded => "degraded",
            ProviderState::Terminated => "terminated",
        }
    }
}

impl fmt::Display for ProviderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of starting one provider during `connect_all`.
#[derive(Debug)]
pub enum ConnectResult {
    Ready { tools: usize },
    Degraded { error: TransportError },
}

/// A shutdown failure for one provider; `shutdown_all` aggregates these
/// instead of short-circuiting.
#[derive(Debug)]
pub struct ShutdownFailure {
    pub provider: String,
    pub error: TransportError,
}

struct ProviderHandle {
    config: ServerConfig,
    process: ServerProcess,
    state: RwLock<ProviderState>,
    tools: RwLock<Vec<ServerToolInfo>>,
}

/// Sole owner of every provider process. Starts them independently, exposes
/// one `invoke` surface over all of them, and guarantees termination of the
/// whole arena on its own shutdown path.
pub struct ServerManager {
    providers: HashMap<String, Arc<ProviderHandle>>,
    startup_timeout: Duration,
}

impl ServerManager {
    pub fn new(configs: Vec<ServerConfig>, startup_timeout: Duration) -> Self {
        let providers = configs
            .into_iter()
            .map(|config| {
                let name = config.name.clone();
                let handle = Arc::new(ProviderHandle {
                    process: ServerProcess::new(name.clone()),
                    config,
                    state: RwLock::new(ProviderState::NotStarted),
                    tools: RwLock::new(Vec::new()),
                });
                (name, handle)
            })
            .collect();
        Self {
            providers,
            startup_timeout,
        }
    }

    pub fn provider_names(&self) -> Vec<String> {
        self.providers.keys().cloned().collect()
    }

    /// Start every configured provider concurrently. One provider's failure
    /// degrades that provider only; the rest still come up.
    pub async fn connect_all(&self) -> HashMap<String, ConnectResult> {
        let startups = self.providers.iter().map(|(name, handle)| {
            let name = name.clone();
            let handle = Arc::clone(handle);
            let timeout = self.startup_timeout;
            async move { (name, handle.connect(timeout).await) }
        });
        join_all(startups).await.into_iter().collect()
    }

    /// Invoke one tool on one provider. Fails fast with a typed result when
    /// the provider is unknown or not `Ready`, so callers can fall back
    /// instead of unwinding.
    pub async fn invoke(
        &self,
        provider: &str,
        tool: &str,
        arguments: Value,
        timeout: Duration,
    ) -> Result<Value, InvokeError> {
        let handle = self
            .providers
            .get(provider)
            .ok_or_else(|| InvokeError::UnknownProvider {
                provider: provider.to_string(),
            })?;

        let state = *handle.state.read().await;
        if state != ProviderState::Ready {
            return Err(InvokeError::ProviderUnavailable {
                provider: provider.to_string(),
                state,
            });
        }

        let params = json!({
            "name": tool,
            "arguments": match arguments {
                Value::Null => Value::Object(Default::default()),
                other => other,
            }
        });
        match handle.process.call("tools/call", params, timeout).await {
            Ok(result) => unwrap_tool_result(provider, tool, result),
            Err(error) => {
                if matches!(error, TransportError::Terminated { .. }) {
                    warn!(provider, "provider process terminated during a call");
                    *handle.state.write().await = ProviderState::Terminated;
                }
                Err(error.into())
            }
        }
    }

    pub async fn status(&self, provider: &str) -> Option<ProviderState> {
        match self.providers.get(provider) {
            Some(handle) => Some(*handle.state.read().await),
            None => None,
        }
    }

    /// Provider name and state for every configured provider.
    pub async fn statuses(&self) -> Vec<(String, ProviderState)> {
        let mut out = Vec::with_capacity(self.providers.len());
        for (name, handle) in &self.providers {
            out.push((name.clone(), *handle.state.read().await));
        }
        out
    }

    /// Cached tool metadata for one provider, populated by the handshake.
    pub async fn tools(&self, provider: &str) -> Option<Vec<ServerToolInfo>> {
        match self.providers.get(provider) {
            Some(handle) => Some(handle.tools.read().await.clone()),
            None => None,
        }
    }

    /// Shut every provider down concurrently, waiting for all of them.
    /// Failures are collected, not short-circuited, so one stuck provider
    /// never blocks the cleanup of the others.
    pub async fn shutdown_all(&self) -> Vec<ShutdownFailure> {
        let shutdowns = self.providers.iter().map(|(name, handle)| {
            let name = name.clone();
            let handle = Arc::clone(handle);
            async move {
                *handle.state.write().await = ProviderState::Terminated;
                match handle.process.shutdown().await {
                    Ok(()) => None,
                    Err(error) => Some(ShutdownFailure {
                        provider: name,
                        error,
                    }),
                }
            }
        });
        join_all(shutdowns).await.into_iter().flatten().collect()
    }
}

impl ProviderHandle {
    async fn connect(&self, timeout: Duration) -> ConnectResult {
        *self.state.write().await = ProviderState::Starting;
        match self.start_sequence(timeout).await {
            Ok(tools) => {
                info!(provider = %self.config.name, tools, "provider ready");
                *self.state.write().await = ProviderState::Ready;
                ConnectResult::Ready { tools }
            }
            Err(error) => {
                warn!(
                    provider = %self.config.name,
                    %error,
                    "provider failed to start, continuing without it"
                );
                // Reap whatever half-started; the handle stays queryable.
                let _ = self.process.shutdown().await;
                *self.state.write().await = ProviderState::Degraded;
                ConnectResult::Degraded { error }
            }
        }
    }

    async fn start_sequence(&self, timeout: Duration) -> Result<usize, TransportError> {
        self.process.start(&self.config).await?;

        let init = self
            .process
            .call(
                "initialize",
                json!({
                    "protocolVersion": PROTOCOL_VERSION,
                    "capabilities": {},
                    "clientInfo": {
                        "name": env!("CARGO_PKG_NAME"),
                        "version": env!("CARGO_PKG_VERSION"),
                    }
                }),
                timeout,
            )
            .await?;
        debug!(
            provider = %self.config.name,
            server_info = ?init.get("serverInfo"),
            "handshake complete"
        );
        self.process
            .notify("notifications/initialized", json!({}))
            .await?;

        let listed = self.process.call("tools/list", json!({}), timeout).await?;
        let tools = parse_tool_listing(&listed);
        let count = tools.len();
        *self.tools.write().await = tools;
        Ok(count)
    }
}

#[async_trait]
impl ToolServerInterface for ServerManager {
    async fn invoke_tool(
        &self,
        provider: &str,
        tool: &str,
        arguments: Value,
        timeout: Duration,
    ) -> Result<Value, InvokeError> {
        self.invoke(provider, tool, arguments, timeout).await
    }

    async fn tool_metadata(&self, provider: &str, tool: &str) -> Option<ServerToolInfo> {
        self.tools(provider)
            .await?
            .into_iter()
            .find(|info| info.name == tool)
    }

    async fn provider_state(&self, provider: &str) -> Option<ProviderState> {
        self.status(provider).await
    }
}

fn parse_tool_listing(listed: &Value) -> Vec<ServerToolInfo> {
    listed
        .get("tools")
        .and_then(Value::as_array)
        .map(|tools| {
            tools
                .iter()
                .filter_map(|tool| {
                    let name = tool.get("name").and_then(Value::as_str)?;
                    Some(ServerToolInfo {
                        name: name.to_string(),
                        description: tool
                            .get("description")
                            .and_then(Value::as_str)
                            .map(str::to_string),
                        input_schema: tool.get("inputSchema").cloned(),
                    })
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Unwrap the `tools/call` result envelope into a success payload or a
/// typed failure carrying the provider's message. Text content that parses
/// as JSON is returned as JSON, matching what the legacy receipts expect.
fn unwrap_tool_result(provider: &str, tool: &str, result: Value) -> Result<Value, InvokeError> {
    let text = result
        .get("content")
        .and_then(Value::as_array)
        .and_then(|content| {
            content.iter().find_map(|item| {
                (item.get("type").and_then(Value::as_str) == Some("text"))
                    .then(|| item.get("text").and_then(Value::as_str))
                    .flatten()
            })
        });

    if result
        .get("isError")
        .and_then(Value::as_bool)
        .unwrap_or(false)
    {
        return Err(InvokeError::Tool {
            provider: provider.to_string(),
            tool: tool.to_string(),
            message: text.unwrap_or("tool reported an error").to_string(),
        });
    }

    match text {
        Some(text) => Ok(serde_json::from_str(text)
            .unwrap_or_else(|_| json!({ "result": text }))),
        // No content array: pass the raw result through untouched.
        None => Ok(result),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_tool_listing() {
        let tools = parse_tool_listing(&json!({
            "tools": [
                {"name": "write_file", "description": "Write a file", "inputSchema": {"type": "object"}},
                {"name": "read_file"},
                {"description": "nameless, skipped"}
            ]
        }));
        assert_eq!(tools.len(), 2);
        assert_eq!(tools[0].name, "write_file");
        assert_eq!(tools[0].description.as_deref(), Some("Write a file"));
        assert!(tools[1].input_schema.is_none());
    }

    #[test]
    fn unwraps_json_text_content() {
        let value = unwrap_tool_result(
            "filesystem",
            "write_file",
            json!({"content": [{"type": "text", "text": "{\"status\":\"success\"}"}]}),
        )
        .unwrap();
        assert_eq!(value, json!({"status": "success"}));
    }

    #[test]
    fn wraps_plain_text_content() {
        let value = unwrap_tool_result(
            "filesystem",
            "write_file",
            json!({"content": [{"type": "text", "text": "wrote 2 bytes"}]}),
        )
        .unwrap();
        assert_eq!(value, json!({"result": "wrote 2 bytes"}));
    }

    #[test]
    fn error_envelope_becomes_typed_failure() {
        let err = unwrap_tool_result(
            "calendar",
            "create_event",
            json!({
                "isError": true,
                "content": [{"type": "text", "text": "missing credentials"}]
            }),
        )
        .unwrap_err();
        let InvokeError::Tool { message, .. } = err else {
            panic!("expected tool error, got {err:?}");
        };
        assert_eq!(message, "missing credentials");
    }
}
