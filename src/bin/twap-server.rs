// TWAP paper trading server
// Live exchange prices, simulated TWAP execution and a real-time price stream

use clap::{Parser, Subcommand};
use std::path::Path;
use std::str::FromStr;
use tracing::{error, info, warn, Level};
use twap_paper_trader::api::{self, AppState};
use twap_paper_trader::{Config, ConfigError, Exchange, ExchangeRestClient, PairFormat, TradingService};

#[derive(Parser)]
#[command(name = "twap-server")]
#[command(version)]
#[command(about = "TWAP paper trading server", long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Configuration file path
    #[arg(short, long, global = true, default_value = "config.toml")]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Start feeds, scheduler and the HTTP/WebSocket API
    Serve {
        /// Listen address, overrides [server] bind
        #[arg(short, long)]
        bind: Option<String>,
    },

    /// Fetch and print the pairs an exchange lists
    Pairs {
        /// binance or kraken
        exchange: String,

        /// streaming or query
        #[arg(short, long, default_value = "streaming")]
        format: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Config may be missing for `init`; logging falls back to defaults then
    let config = match &cli.command {
        Commands::Init { .. } => None,
        _ => Some(load_config_or_exit(&cli.config)),
    };

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        config
            .as_ref()
            .and_then(|config| Level::from_str(&config.logging.level).ok())
            .unwrap_or(Level::INFO)
    };
    tracing_subscriber::fmt().with_max_level(level).init();

    match cli.command {
        Commands::Init { force } => init_config(&cli.config, force)?,
        Commands::Serve { bind } => serve(config.unwrap_or_default(), bind).await?,
        Commands::Pairs { exchange, format } => {
            print_pairs(&config.unwrap_or_default(), &exchange, &format).await?
        }
    }

    Ok(())
}

/// Load config or exit with a helpful message
fn load_config_or_exit(path: &str) -> Config {
    match Config::from_file(path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("❌ Configuration error: {}", e);
            if matches!(e, ConfigError::FileRead(_)) {
                eprintln!("💡 Run `twap-server init` to create {}", path);
            }
            std::process::exit(1);
        }
    }
}

fn init_config(path: &str, force: bool) -> Result<(), ConfigError> {
    if Path::new(path).exists() && !force {
        warn!("{} already exists, use --force to overwrite", path);
        return Ok(());
    }
    Config::default().to_file(path)?;
    info!("📝 Created {}", path);
    Ok(())
}

async fn serve(config: Config, bind: Option<String>) -> Result<(), Box<dyn std::error::Error>> {
    let bind = bind.unwrap_or_else(|| config.server.bind.clone());
    if config.server.auth_token.is_none() {
        warn!("No [server] auth_token configured, order routes are open to every caller");
    }

    let (service, feeds) = TradingService::start(&config).await?;
    let state = AppState::new(service.clone(), config.server.auth_token.clone());

    let listener = tokio::net::TcpListener::bind(&bind).await?;
    info!("🚀 TWAP paper trader listening on {}", bind);

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
        info!("Shutting down");
    };
    api::serve(listener, state, shutdown).await?;

    service.shutdown();
    for feed in feeds {
        let _ = feed.await;
    }
    Ok(())
}

async fn print_pairs(config: &Config, exchange: &str, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let exchange: Exchange = exchange.parse()?;
    let format = match format {
        "streaming" => PairFormat::Streaming,
        "query" => PairFormat::Query,
        other => return Err(format!("unknown format '{}', expected streaming or query", other).into()),
    };

    let client = ExchangeRestClient::from_config(&config.exchanges);
    let listings = client.fetch_pairs(exchange).await?;
    for listing in &listings {
        let marker = if listing.derived { " (derived)" } else { "" };
        println!("{:<16} {}{}", listing.symbol(format), listing.pair, marker);
    }
    info!("{} pairs listed on {}", listings.len(), exchange);
    Ok(())
}
