use anyhow::Result;
use clap::{Parser, Subcommand};
use mailgate::config::{find_config_file, get_config, load_config, Config};
use mailgate::mail::BridgeMailFactory;
use mailgate::mcp::{run_stdio, serve, AppState, EngineConfig, EngineFactory, SessionRegistry};
use mailgate::prompts::PromptRegistry;
use mailgate::tools::{ToolDeps, ToolRegistry};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Mailgate - MCP gateway exposing mailbox tools over stdio and streamable HTTP
#[derive(Parser, Debug)]
#[command(name = "mailgate")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "MCP gateway exposing mailbox tools over stdio and streamable HTTP", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose logging (can be used multiple times for more verbosity: -v, -vv, -vvv)
    #[arg(long, short, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(long, short)]
    quiet: bool,

    /// Configuration file path
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the MCP gateway (for Claude Desktop and other MCP clients)
    Serve {
        /// Run in stdio mode (single implicit session)
        #[arg(long, default_value_t = true)]
        stdio: bool,

        /// Run in streamable HTTP mode (overrides --stdio)
        #[arg(long)]
        http: bool,

        /// Port for HTTP mode
        #[arg(long, short, default_value_t = 5555)]
        port: u16,

        /// Host to bind to for HTTP mode
        #[arg(long, default_value = "127.0.0.1")]
        host: String,
    },
}

/// Initialize tracing. In HTTP mode diagnostics go to stderr; in stdio mode
/// they go to a file because stdout is the protocol channel and stderr may
/// be discarded by the MCP client host.
fn init_logging(cli: &Cli, config: &Config, use_http: bool) -> Result<()> {
    let log_level = match cli.verbose {
        0 => config.logging.level.clone(),
        1 => "debug".to_string(),
        _ => "trace".to_string(),
    };
    let env_filter = if cli.quiet {
        "error".to_string()
    } else {
        log_level
    };
    let filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| format!("mailgate={}", env_filter)),
    );

    if use_http {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    } else {
        let path = std::env::var("MAILGATE_LOG_FILE")
            .map(PathBuf::from)
            .ok()
            .or_else(|| config.logging.file.clone())
            .unwrap_or_else(|| PathBuf::from("mailgate.log"));
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)?;
        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(Arc::new(file))
                    .with_ansi(false),
            )
            .init();
    }
    Ok(())
}

fn engine_factory(config: &Config) -> EngineFactory {
    let http = reqwest::Client::new();
    let deps = ToolDeps {
        mail: Arc::new(BridgeMailFactory::new(&config.mail.bridge_base)),
        http,
        default_instructions: config.mail.default_instructions.clone(),
    };
    EngineFactory::new(
        EngineConfig::default(),
        Arc::new(ToolRegistry::with_email_tools(deps)),
        Arc::new(PromptRegistry::with_email_prompts()),
    )
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let (stdio, http, port, host) = match &cli.command {
        Some(Commands::Serve {
            stdio,
            http,
            port,
            host,
        }) => (*stdio, *http, Some(*port), Some(host.clone())),
        None => (true, false, None, None),
    };
    let use_http = http || !stdio;

    // Configuration has to be resolved before logging so the log file path
    // can come from it.
    let config = if let Some(config_path) = &cli.config {
        load_config(config_path)?
    } else if let Some(config_path) = find_config_file() {
        load_config(&config_path)?
    } else {
        get_config()
    };

    init_logging(&cli, &config, use_http)?;

    let engines = engine_factory(&config);

    if use_http {
        let host = host.unwrap_or_else(|| config.server.host.clone());
        let port = port.unwrap_or(config.server.port);
        let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
        let state = AppState {
            registry: SessionRegistry::new(),
            engines,
        };
        if let Err(e) = serve(addr, state).await {
            tracing::error!(error = %e, "HTTP server failed");
            return Err(e);
        }
    } else {
        tracing::info!("running MCP gateway in stdio mode");
        run_stdio(engines.build()).await?;
    }

    Ok(())
}
