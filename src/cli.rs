use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "bridge",
    version,
    about = "Expose a schema-described HTTP API and external MCP tool servers as one tool surface"
)]
pub struct Cli {
    #[arg(long)]
    pub config: Option<PathBuf>,
    /// Override the configured API description URL
    #[arg(long)]
    pub openapi_url: Option<String>,
    /// Override the configured legacy service base URL
    #[arg(long)]
    pub base_url: Option<String>,
    #[command(subcommand)]
    pub command: BridgeCommand,
}

#[derive(Subcommand, Debug)]
pub enum BridgeCommand {
    /// Compile the API description and list every available tool
    Tools,
    /// Invoke one compiled tool against the legacy service
    Invoke {
        /// Compiled tool name (see `tools`)
        tool: String,
        /// Arguments as a JSON object
        #[arg(long, default_value = "{}")]
        args: String,
    },
    /// Call one tool on an external provider
    Call {
        provider: String,
        tool: String,
        /// Arguments as a JSON object
        #[arg(long, default_value = "{}")]
        args: String,
    },
    /// Connect the configured providers and report their states
    Providers,
}
