mod error;
mod interface;
mod manager;
mod process;

pub use error::{InvokeError, TransportError};
pub use interface::{ServerToolInfo, ToolServerInterface};
pub use manager::{ConnectResult, ProviderState, ServerManager, ShutdownFailure};
pub use process::ServerProcess;
