use clap::Parser;
use mcp_bridge::Cli;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    if let Err(error) = mcp_bridge::run(cli).await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}
