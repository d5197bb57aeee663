pub mod application;
pub mod cli;
pub mod config;
pub mod constants;
pub mod domain;
pub mod infrastructure;

pub use application::{catalog, tooling};
pub use cli::{BridgeCommand, Cli};
pub use config::{AppConfig, ConfigError, ServerConfig};
pub use domain::{ApiDocument, ToolDescriptor};
pub use infrastructure::{http, rpc};

use std::error::Error;

use serde_json::{Map as JsonMap, Value};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt};

use application::tooling::{ConnectResult, ServerManager, ShutdownFailure};
use infrastructure::http::HttpInvoker;

pub async fn run(cli: Cli) -> Result<(), Box<dyn Error>> {
    init_tracing();
    info!("starting bridge");

    let config_path = cli.config.as_deref();
    let mut config = AppConfig::load(config_path)?;
    if let Some(path) = config_path {
        info!(path = %path.display(), "loaded configuration from file");
    } else {
        info!("loaded configuration from default path");
    }

    if let Some(url) = cli.base_url {
        // Keep the description URL in step with an overridden base unless
        // the caller pinned it separately.
        if cli.openapi_url.is_none() {
            config.openapi_url = format!("{}/openapi.json", url.trim_end_matches('/'));
        }
        config.base_url = url;
    }
    if let Some(url) = cli.openapi_url {
        config.openapi_url = url;
    }

    match cli.command {
        BridgeCommand::Tools => run_tools(&config).await,
        BridgeCommand::Invoke { tool, args } => run_invoke(&config, &tool, &args).await,
        BridgeCommand::Call {
            provider,
            tool,
            args,
        } => run_call(&config, &provider, &tool, &args).await,
        BridgeCommand::Providers => run_providers(&config).await,
    }
}

async fn run_tools(config: &AppConfig) -> Result<(), Box<dyn Error>> {
    let client = reqwest::Client::new();
    let document = http::fetch_document(&client, &config.openapi_url).await?;
    let outcome = catalog::compile(&document);
    for warning in &outcome.warnings {
        warn!(%warning, "compile lint");
    }
    for failure in &outcome.failures {
        warn!(
            tool = %failure.tool,
            path = %failure.path,
            error = %failure.error,
            "operation skipped"
        );
    }

    println!(
        "HTTP tools from {} {} ({}):",
        document.title,
        document.version,
        outcome.tools.len()
    );
    for descriptor in &outcome.tools {
        println!(
            "  {:<32} {} {}",
            descriptor.name,
            descriptor.invocation.method.as_str(),
            descriptor.invocation.path_template
        );
        println!("      {}", descriptor.description);
    }

    if !config.servers.is_empty() {
        let manager = ServerManager::new(config.servers.clone(), config.startup_timeout());
        report_connect(manager.connect_all().await);
        let mut statuses = manager.statuses().await;
        statuses.sort_by(|a, b| a.0.cmp(&b.0));
        for (provider, state) in statuses {
            println!("Provider '{provider}' [{state}]:");
            if let Some(tools) = manager.tools(&provider).await {
                for tool in tools {
                    println!(
                        "  {:<32} {}",
                        tool.name,
                        tool.description.unwrap_or_default()
                    );
                }
            }
        }
        report_shutdown(manager.shutdown_all().await);
    }
    Ok(())
}

async fn run_invoke(config: &AppConfig, tool: &str, args: &str) -> Result<(), Box<dyn Error>> {
    let client = reqwest::Client::new();
    let document = http::fetch_document(&client, &config.openapi_url).await?;
    let outcome = catalog::compile(&document);
    let descriptor = outcome
        .tools
        .iter()
        .find(|descriptor| descriptor.name == tool)
        .ok_or_else(|| format!("no compiled tool named '{tool}' (run `bridge tools` to list)"))?;

    let arguments = parse_arguments(args)?;
    let invoker = HttpInvoker::new(config.base_url.clone());
    let result = invoker.invoke(descriptor, &arguments).await?;
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

async fn run_call(
    config: &AppConfig,
    provider: &str,
    tool: &str,
    args: &str,
) -> Result<(), Box<dyn Error>> {
    let configs: Vec<ServerConfig> = config
        .servers
        .iter()
        .filter(|server| server.name == provider)
        .cloned()
        .collect();
    let manager = ServerManager::new(configs, config.startup_timeout());
    report_connect(manager.connect_all().await);

    let arguments = parse_arguments(args)?;
    let result = manager
        .invoke(
            provider,
            tool,
            Value::Object(arguments),
            config.request_timeout(),
        )
        .await;
    report_shutdown(manager.shutdown_all().await);

    println!("{}", serde_json::to_string_pretty(&result?)?);
    Ok(())
}

async fn run_providers(config: &AppConfig) -> Result<(), Box<dyn Error>> {
    let manager = ServerManager::new(config.servers.clone(), config.startup_timeout());
    let mut results: Vec<(String, ConnectResult)> =
        manager.connect_all().await.into_iter().collect();
    results.sort_by(|a, b| a.0.cmp(&b.0));
    for (provider, result) in &results {
        match result {
            ConnectResult::Ready { tools } => {
                println!("{provider:<20} ready ({tools} tools)");
            }
            ConnectResult::Degraded { error } => {
                println!("{provider:<20} degraded: {error}");
            }
        }
    }
    report_shutdown(manager.shutdown_all().await);
    Ok(())
}

fn parse_arguments(args: &str) -> Result<JsonMap<String, Value>, Box<dyn Error>> {
    let value: Value = serde_json::from_str(args)?;
    match value {
        Value::Object(map) => Ok(map),
        _ => Err("arguments must be a JSON object".into()),
    }
}

fn report_connect(results: std::collections::HashMap<String, ConnectResult>) {
    for (provider, result) in results {
        if let ConnectResult::Degraded { error } = result {
            warn!(%provider, %error, "provider degraded, continuing without it");
        }
    }
}

fn report_shutdown(failures: Vec<ShutdownFailure>) {
    for failure in failures {
        warn!(
            provider = %failure.provider,
            error = %failure.error,
            "provider shutdown failed"
        );
    }
}

fn init_tracing() {
    static INIT: std::sync::Once = std::sync::Once::new();
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_level(true)
            .init();
    });
}
