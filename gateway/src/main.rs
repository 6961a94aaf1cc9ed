use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use tokio::net::TcpListener;

use gateway::backend::supervisor::STOP_GRACE;
use gateway::backend::{BackendDescriptor, BackendRegistry};
use gateway::config::GatewayFileConfig;
use gateway::server::{aggregate, GatewayServer, ServerInfo, ServerMode};

#[derive(Parser)]
#[command(name = "gateway")]
#[command(about = "Unified TCP gateway for stdio tool-server backends")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to gateway.json (default: search upward from cwd)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Increase verbosity (-v info, -vv debug, -vvv trace). Default is warn.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the gateway: shared backends, aggregated catalog
    Serve {
        /// Listen host (overrides config)
        #[arg(long, env = "GATEWAY_HOST")]
        host: Option<String>,
        /// Listen port (overrides config)
        #[arg(short, long, env = "GATEWAY_PORT")]
        port: Option<u16>,
    },
    /// Bridge one backend, spawning a fresh process per connection
    Bridge {
        /// Backend launch command
        #[arg(long)]
        command: String,
        /// Arguments passed to the backend command
        args: Vec<String>,
        /// Listen host
        #[arg(long, default_value = "0.0.0.0")]
        host: String,
        /// Listen port
        #[arg(short, long, default_value = "8766")]
        port: u16,
        /// Namespace prefix for the backend's tools
        #[arg(long, default_value = "main")]
        prefix: String,
        /// Display name (defaults to the command)
        #[arg(long)]
        name: Option<String>,
        /// Environment overrides, KEY=VALUE (repeatable)
        #[arg(short = 'e', long = "env")]
        env: Vec<String>,
    },
    /// Start configured backends, print the aggregated tool catalog, exit
    Tools,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    rpc_common::init_tracing("gateway", cli.verbose)?;

    match cli.command {
        Commands::Serve { host, port } => run_serve(cli.config.as_deref(), host, port).await,
        Commands::Bridge {
            command,
            args,
            host,
            port,
            prefix,
            name,
            env,
        } => run_bridge(command, args, host, port, prefix, name, env).await,
        Commands::Tools => run_tools(cli.config.as_deref()).await,
    }
}

async fn run_serve(
    config_path: Option<&std::path::Path>,
    host: Option<String>,
    port: Option<u16>,
) -> Result<()> {
    let config = GatewayFileConfig::load(config_path)?;
    let host = host.unwrap_or_else(|| config.gateway.host.clone());
    let port = port.unwrap_or(config.gateway.port);

    let registry = Arc::new(BackendRegistry::start_from_config(&config).await?);
    tracing::info!(
        "Serving {} backend(s) as '{}'",
        registry.len(),
        config.gateway.name
    );

    let listener = TcpListener::bind((host.as_str(), port))
        .await
        .with_context(|| format!("failed to bind {}:{}", host, port))?;

    let server = Arc::new(GatewayServer::new(
        ServerInfo::from_config(&config.gateway),
        ServerMode::Gateway(registry),
    ));
    server.run(listener).await
}

async fn run_bridge(
    command: String,
    args: Vec<String>,
    host: String,
    port: u16,
    prefix: String,
    name: Option<String>,
    env: Vec<String>,
) -> Result<()> {
    let env = parse_env_overrides(&env)?;
    let name = name.unwrap_or_else(|| command.clone());

    let template = BackendDescriptor {
        id: prefix.clone(),
        name,
        prefix,
        command,
        args,
        env,
    };
    tracing::info!(
        "Bridging '{}' with one fresh process per connection",
        template.command
    );

    let listener = TcpListener::bind((host.as_str(), port))
        .await
        .with_context(|| format!("failed to bind {}:{}", host, port))?;

    let server = Arc::new(GatewayServer::new(
        ServerInfo {
            name: template.name.clone(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        },
        ServerMode::Isolated(template),
    ));
    server.run(listener).await
}

async fn run_tools(config_path: Option<&std::path::Path>) -> Result<()> {
    let config = GatewayFileConfig::load(config_path)?;
    println!("Starting {} configured backend(s)...\n", config.servers.len());

    let registry = BackendRegistry::start_from_config(&config).await?;
    let tools = aggregate::collect_namespaced_tools(&registry).await;

    if tools.is_empty() {
        println!("No tools found.");
    } else {
        println!("Aggregated tools ({}):", tools.len());
        for tool in &tools {
            let name = tool.get("name").and_then(|v| v.as_str()).unwrap_or("?");
            let description = tool
                .get("description")
                .and_then(|v| v.as_str())
                .unwrap_or("No description")
                .lines()
                .next()
                .unwrap_or("");
            println!("  {} - {}", name, description);
        }
    }

    registry.shutdown_all(STOP_GRACE).await;
    Ok(())
}

fn parse_env_overrides(pairs: &[String]) -> Result<HashMap<String, String>> {
    let mut env = HashMap::new();
    for pair in pairs {
        let (key, value) = pair
            .split_once('=')
            .with_context(|| format!("invalid env override '{}', expected KEY=VALUE", pair))?;
        env.insert(key.to_string(), value.to_string());
    }
    Ok(env)
}
