use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Result, bail};
use clap::{Args, Parser, Subcommand};
use tracing::{info, warn};

use mcp_gateway_server::config::{DEFAULT_KEEP_ALIVE_INTERVAL, parse_toolsets};
use mcp_gateway_server::{LoggingOptions, ServerConfig, logging, run_sse_server, run_stdio_server};

#[derive(Parser)]
#[command(name = "mcp-gateway-server")]
#[command(about = "MCP server that trusts identity asserted by an upstream gateway")]
#[command(version)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct GlobalArgs {
    /// Comma separated toolsets to enable, or "all"
    #[arg(long, global = true, env = "GITHUB_TOOLSETS", default_value = "all")]
    toolsets: String,
    /// Start with only the dynamic toolset tools and let clients enable more
    #[arg(long, global = true, env = "GITHUB_DYNAMIC_TOOLSETS", default_value_t = false)]
    dynamic_toolsets: bool,
    /// Hide every tool that writes
    #[arg(long, global = true, env = "GITHUB_READ_ONLY", default_value_t = false)]
    read_only: bool,
    /// Append logs to this file instead of stderr
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,
    /// Log every tool listing and tool call with its outcome
    #[arg(long, global = true, default_value_t = false)]
    enable_command_logging: bool,
    /// API host, e.g. a GitHub Enterprise Server hostname
    #[arg(long = "gh-host", global = true, env = "GITHUB_HOST", default_value = "")]
    host: String,
    /// Static token for the process
    #[arg(
        long,
        global = true,
        env = "GITHUB_PERSONAL_ACCESS_TOKEN",
        hide_env_values = true,
        default_value = ""
    )]
    token: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve MCP over HTTP with server-sent events behind a gateway
    Sse {
        #[arg(short, long, env = "PORT", default_value_t = 8080)]
        port: u16,
        /// Externally visible base URL advertised in the endpoint event
        #[arg(long, default_value = "")]
        base_url: String,
        /// Path prefix for the MCP routes, e.g. /mcp
        #[arg(long, default_value = "")]
        base_path: String,
        /// Let requests without gateway identity headers through
        #[arg(long, env = "GITHUB_ALLOW_UNAUTHENTICATED", default_value_t = false)]
        allow_unauthenticated: bool,
        /// Seconds between SSE keep-alive comments, 0 to disable
        #[arg(long, default_value_t = DEFAULT_KEEP_ALIVE_INTERVAL.as_secs())]
        keep_alive_interval: u64,
    },
    /// Serve MCP over stdin/stdout
    Stdio,
}

impl GlobalArgs {
    fn into_config(self) -> ServerConfig {
        ServerConfig {
            host: self.host,
            token: self.token,
            enabled_toolsets: parse_toolsets(&self.toolsets),
            dynamic_toolsets: self.dynamic_toolsets,
            read_only: self.read_only,
            logging: LoggingOptions {
                log_file_path: self.log_file,
                enable_command_logging: self.enable_command_logging,
                debug: logging::debug_from_env(),
            },
            ..Default::default()
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = cli.global.into_config();

    logging::init(&config.logging)?;

    match cli.command {
        Commands::Sse {
            port,
            base_url,
            base_path,
            allow_unauthenticated,
            keep_alive_interval,
        } => {
            config.listen_addr = format!("0.0.0.0:{}", port);
            config.base_url = base_url;
            config.base_path = base_path;
            config.require_authentication = !allow_unauthenticated;
            config.keep_alive = keep_alive_interval > 0;
            if config.keep_alive {
                config.keep_alive_interval = Duration::from_secs(keep_alive_interval);
            }

            if config.token.is_empty() && config.require_authentication {
                warn!(
                    "GITHUB_PERSONAL_ACCESS_TOKEN not set, relying on per-request gateway credentials"
                );
            }

            info!(
                version = %config.version,
                port,
                read_only = config.read_only,
                "Starting SSE server"
            );
            run_sse_server(config).await?;
        }
        Commands::Stdio => {
            if config.token.is_empty() {
                bail!("GITHUB_PERSONAL_ACCESS_TOKEN not set");
            }
            run_stdio_server(config).await?;
        }
    }

    Ok(())
}
