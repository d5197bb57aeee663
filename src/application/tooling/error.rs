use thiserror::Error;

use super::manager::ProviderState;

/// Failures at the process/byte-stream level of one provider.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to start provider '{server}': {source}")]
    Spawn {
        server: String,
        #[source]
        source: std::io::Error,
    },

    #[error("provider '{server}' transport error: {message}")]
    Transport { server: String, message: String },

    #[error("provider '{server}' request '{method}' timed out after {timeout_ms} ms")]
    Timeout {
        server: String,
        method: String,
        timeout_ms: u64,
    },

    #[error("provider '{server}' process terminated")]
    Terminated { server: String },

    #[error("provider '{server}' sent an unparseable frame: {detail}")]
    MalformedFrame { server: String, detail: String },

    #[error("provider '{server}' returned JSON-RPC error {code}: {message}")]
    Rpc {
        server: String,
        code: i64,
        message: String,
    },
}

/// Failures surfaced by the manager's invocation path. All recoverable:
/// callers are expected to fall back rather than abort.
#[derive(Debug, Error)]
pub enum InvokeError {
    #[error("no provider named '{provider}' is configured")]
    UnknownProvider { provider: String },

    #[error("provider '{provider}' is {state} and cannot serve tool calls")]
    ProviderUnavailable {
        provider: String,
        state: ProviderState,
    },

    #[error("provider '{provider}' tool '{tool}' failed: {message}")]
    Tool {
        provider: String,
        tool: String,
        message: String,
    },

    #[error(transparent)]
    Transport(#[from] TransportError),
}
