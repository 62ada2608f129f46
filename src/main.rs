// Trade bot CLI: single entry point for running the manager

use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::{error, info};

use steam_trade_bot::clients::steam_web;
use steam_trade_bot::core::ManagerEvent;
use steam_trade_bot::{Config, TradeManager};

#[derive(Parser)]
#[command(name = "trade-bot")]
#[command(version = "0.2.0")]
#[command(about = "Steam trade-offer manager for a box-opening service", long_about = None)]
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
    /// Write a config template to fill in
    Init,

    /// Run the manager: poll offers, accept/cancel, recover items
    Run,

    /// Show configuration and remote reachability
    Status,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .init();

    let result = match cli.command {
        Commands::Init => init(&cli.config),
        Commands::Run => run(&cli.config).await,
        Commands::Status => status(&cli.config).await,
    };

    if let Err(e) = result {
        error!("{}", e);
        std::process::exit(1);
    }
}

fn init(path: &str) -> Result<(), Box<dyn std::error::Error>> {
    if std::path::Path::new(path).exists() {
        return Err(format!("{} already exists", path).into());
    }

    Config::default().to_file(path)?;
    info!("wrote config template to {}, fill in the account section", path);
    Ok(())
}

async fn run(path: &str) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::from_file(path)?;

    let (transport, session) = steam_web::connected(
        config.account.api_key.clone(),
        config.account.steam_id,
        device_id(config.account.steam_id),
    )?;

    let mut manager = TradeManager::new(config, Arc::new(transport), Arc::new(session))?;
    let mut events = manager.subscribe();
    manager.start().await;

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(ManagerEvent::NewItems { offer, items }) => {
                    info!(offer_id = ?offer.id, count = items.len(), "received new items");
                }
                Ok(ManagerEvent::NewOffer(offer)) => {
                    info!(offer_id = ?offer.id, partner = offer.partner, "incoming offer");
                }
                Ok(ManagerEvent::SentOfferChanged { offer, old_state }) => {
                    info!(offer_id = ?offer.id, "sent offer {:?} -> {:?}", old_state, offer.state);
                }
                Ok(ManagerEvent::ReceivedOfferChanged { offer, old_state }) => {
                    info!(offer_id = ?offer.id, "received offer {:?} -> {:?}", old_state, offer.state);
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(missed)) => {
                    info!("event stream lagged, missed {} events", missed);
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            },
            _ = tokio::signal::ctrl_c() => {
                info!("shutting down");
                break;
            }
        }
    }

    Ok(())
}

async fn status(path: &str) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::from_file(path)?;
    println!("account:       {}", config.account.account_name);
    println!("steam id:      {}", config.account.steam_id);
    println!("app/context:   {}/{}", config.trading.app_id, config.trading.context_id);
    println!("auto accept:   {}", config.trading.auto_offer_accept);
    println!("poll interval: {}ms", config.trading.poll_interval_ms);

    use steam_trade_bot::OfferTransport;
    let transport = steam_trade_bot::SteamWebClient::new(config.account.api_key.clone())?;
    match transport.get_offers().await {
        Ok(snapshot) => println!(
            "steam:         reachable ({} sent, {} received offers)",
            snapshot.sent.len(),
            snapshot.received.len()
        ),
        Err(e) => println!("steam:         unreachable ({})", e),
    }

    Ok(())
}

/// Stable per-account device id for mobile confirmations.
fn device_id(steam_id: u64) -> String {
    format!("android:{:x}", steam_id)
}
