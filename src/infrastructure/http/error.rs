use thiserror::Error;

/// Failures invoking a compiled descriptor against the legacy service.
/// Remote non-2xx responses keep their status and body so callers can tell
/// a missing order from a broken service.
#[derive(Debug, Error)]
pub enum HttpInvokeError {
    #[error("tool '{tool}' requires argument '{name}'")]
    MissingRequiredArgument { tool: String, name: String },

    #[error("request to the legacy service failed: {source}")]
    Transport {
        #[from]
        source: reqwest::Error,
    },

    #[error("legacy service returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
}
