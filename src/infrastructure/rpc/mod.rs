mod types;

pub use types::{InboundFrame, RpcError, RpcNotification, RpcRequest};
