use serde::{Deserialize, Serialize};
use serde_json::Value;

const JSONRPC_VERSION: &str = "2.0";

#[derive(Debug, Serialize)]
pub struct RpcRequest {
    pub jsonrpc: &'static str,
    pub id: u64,
    pub method: String,
    pub params: Value,
}

impl RpcRequest {
    pub fn new(id: u64, method: impl Into<String>, params: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            id,
            method: method.into(),
            params,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RpcNotification {
    pub jsonrpc: &'static str,
    pub method: String,
    pub params: Value,
}

impl RpcNotification {
    pub fn new(method: impl Into<String>, params: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            method: method.into(),
            params,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
    #[serde(default)]
    pub data: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct RawFrame {
    #[serde(default)]
    id: Option<Value>,
    #[serde(default)]
    method: Option<String>,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcError>,
    #[serde(default)]
    params: Option<Value>,
}

/// One inbound frame, decoded and classified exactly once at the transport
/// boundary. Downstream code never re-inspects raw JSON-RPC shapes.
#[derive(Debug)]
pub enum InboundFrame {
    /// A reply to a request this client sent.
    Response {
        id: u64,
        outcome: Result<Value, RpcError>,
    },
    /// An unsolicited server-to-client notification (no id).
    Notification { method: String, params: Value },
    /// Anything else: a server-initiated request, or an id shape this
    /// client never allocates. Logged and dropped by the request path.
    Unroutable { detail: String },
}

impl InboundFrame {
    /// Parse one framed line. A line that is not a JSON object is a framing
    /// error and fails the transport, not this function's concern to soften.
    pub fn parse(line: &str) -> Result<Self, serde_json::Error> {
        let frame: RawFrame = serde_json::from_str(line)?;
        Ok(Self::classify(frame))
    }

    fn classify(frame: RawFrame) -> Self {
        match (frame.id, frame.method) {
            (None, Some(method)) => InboundFrame::Notification {
                method,
                params: frame.params.unwrap_or(Value::Null),
            },
            (Some(id), method) => {
                if let Some(request) = method {
                    return InboundFrame::Unroutable {
                        detail: format!("server-initiated request '{request}'"),
                    };
                }
                let Some(id) = id.as_u64() else {
                    return InboundFrame::Unroutable {
                        detail: format!("response with non-integer id {id}"),
                    };
                };
                let outcome = match frame.error {
                    Some(error) => Err(error),
                    None => Ok(frame.result.unwrap_or(Value::Null)),
                };
                InboundFrame::Response { id, outcome }
            }
            (None, None) => InboundFrame::Unroutable {
                detail: "frame without id or method".to_string(),
            },
        }
    }
}
