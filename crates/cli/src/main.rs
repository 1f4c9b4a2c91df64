use clap::{Parser, Subcommand};
use std::path::PathBuf;
use weixin::config::{self, Credentials};
use weixin::signature;
use weixin::Weixin;

#[derive(Parser)]
#[command(name = "weixin")]
#[command(about = "Weixin webhook gateway", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show version
    Version,

    /// Run the webhook gateway. Keyword replies come from weixin.replies in the config file.
    Gateway {
        /// Config file path (default: WEIXIN_CONFIG_PATH or ~/.weixin/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,

        /// HTTP port (default from config or 15152)
        #[arg(long, short)]
        port: Option<u16>,
    },

    /// Print the signature the provider would send for a timestamp and nonce (for manual testing).
    Sign {
        /// Config file path (default: WEIXIN_CONFIG_PATH or ~/.weixin/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,

        /// Unix timestamp in seconds (default: now)
        #[arg(long)]
        timestamp: Option<String>,

        /// Nonce value
        #[arg(long, default_value = "0")]
        nonce: String,
    },

    /// Send a text message to a user through the custom-send API.
    Send {
        /// Config file path (default: WEIXIN_CONFIG_PATH or ~/.weixin/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,

        /// Recipient user id (openid)
        to_user: String,

        /// Message text
        content: String,
    },
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Version) => {
            println!("weixin {}", env!("CARGO_PKG_VERSION"));
        }
        Some(Commands::Gateway { config, port }) => {
            if let Err(e) = run_gateway(config, port).await {
                log::error!("gateway failed: {:#}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Sign {
            config,
            timestamp,
            nonce,
        }) => {
            if let Err(e) = run_sign(config, timestamp, nonce) {
                log::error!("sign failed: {:#}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Send {
            config,
            to_user,
            content,
        }) => {
            if let Err(e) = run_send(config, to_user, content).await {
                log::error!("send failed: {:#}", e);
                std::process::exit(1);
            }
        }
        None => {
            println!("Run with --help for usage");
        }
    }
}

async fn run_gateway(config_path: Option<PathBuf>, port: Option<u16>) -> anyhow::Result<()> {
    let (mut config, path) = config::load_config(config_path)?;
    log::debug!("using config {}", path.display());
    if let Some(p) = port {
        config.gateway.port = p;
    }
    log::info!(
        "starting gateway on {}:{}",
        config.gateway.bind,
        config.gateway.port
    );
    weixin::gateway::run_gateway(config).await
}

fn run_sign(
    config_path: Option<PathBuf>,
    timestamp: Option<String>,
    nonce: String,
) -> anyhow::Result<()> {
    let (config, _) = config::load_config(config_path)?;
    let credentials = Credentials::from_config(&config);
    let token = credentials
        .token
        .ok_or_else(|| anyhow::anyhow!("no token configured (set weixin.token or WEIXIN_TOKEN)"))?;
    let timestamp = timestamp.unwrap_or_else(|| chrono::Utc::now().timestamp().to_string());
    let sig = signature::compute_signature(&token, &timestamp, &nonce);
    println!("signature={}&timestamp={}&nonce={}", sig, timestamp, nonce);
    Ok(())
}

async fn run_send(
    config_path: Option<PathBuf>,
    to_user: String,
    content: String,
) -> anyhow::Result<()> {
    let (config, _) = config::load_config(config_path)?;
    let weixin = Weixin::new(Credentials::from_config(&config));
    let response = weixin.send(&to_user, &content).await?;
    println!("{}", response);
    Ok(())
}
