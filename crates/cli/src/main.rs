use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::sync::{mpsc, watch};
use tracing::info;

use orb_core::config_loader::ConfigLoader;
use orb_core::session::SessionClock;
use orb_engine::{JsonFileStore, PaperAccount, TradeLog};
use orb_feed::{ReplayBroker, ReplayFeed, ReplayResolver};
use orb_runtime::TickLoop;
use orb_strategy::{BreakoutDetector, SpreadExecutor};

#[derive(Parser)]
#[command(name = "orb-agent")]
#[command(about = "Opening-range breakout paper trading agent", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a recorded session through the trading loop
    Replay {
        /// Config file path
        #[arg(short, long, default_value = "config/Config.toml")]
        config: String,
        /// Tick CSV (timestamp,symbol,price)
        #[arg(long)]
        ticks: PathBuf,
        /// Bar CSV for opening ranges (symbol,timestamp,open,high,low,close,volume)
        #[arg(long)]
        bars: PathBuf,
        /// Option-chain snapshot CSV (underlying,option_type,strike_offset,symbol,premium,bid,ask)
        #[arg(long)]
        chain: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Replay {
            config,
            ticks,
            bars,
            chain,
        } => replay(&config, &ticks, &bars, &chain).await,
    }
}

async fn replay(
    config_path: &str,
    ticks: &PathBuf,
    bars: &PathBuf,
    chain: &PathBuf,
) -> anyhow::Result<()> {
    let config = ConfigLoader::load_from(config_path)?;
    let clock = SessionClock::new(&config.session);

    let store = JsonFileStore::new(&config.store.positions_file);
    let trade_log =
        TradeLog::new(&config.store.trade_log_file).context("opening trade log")?;
    let account = PaperAccount::new(&config.account, store, trade_log);
    let detector = BreakoutDetector::new(clock.clone(), config.strategy.max_range_pct);
    let executor = SpreadExecutor::new(&config.account, &config.strategy);

    let mut broker = ReplayBroker::new();
    broker.load_bars_csv(bars).context("loading bar data")?;
    let resolver = ReplayResolver::from_csv(chain).context("loading option chain")?;
    let feed = ReplayFeed::from_csv(ticks).context("loading ticks")?;

    let (tick_tx, tick_rx) = mpsc::channel(1024);
    let (stop_tx, stop_rx) = watch::channel(false);

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Ctrl-C received, stopping after the current cycle");
            let _ = stop_tx.send(true);
        }
    });
    let producer = tokio::spawn(feed.stream(tick_tx));

    let tick_loop = TickLoop::new(
        config.runtime.clone(),
        clock,
        config.strategy.instruments.clone(),
        account,
        detector,
        executor,
        Arc::new(broker),
        Arc::new(resolver),
        tick_rx,
        stop_rx,
    );
    tick_loop.run().await;
    producer.await?;
    Ok(())
}
