//! Live Finnhub trade board
//!
//! Subscribes to the trade stream for a list of tickers and prints the
//! last price, volume and time of each one every few seconds until Ctrl-C.
//!
//! # Usage
//!
//! ```bash
//! FINNHUB_API_KEY=... finnhub-live AAPL AMZN BINANCE:BTCUSDT --every 5
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info};

use apys::finnhub::{ListenerState, QuoteBoard, StreamListener};

#[derive(Parser, Debug)]
#[command(name = "finnhub-live")]
#[command(about = "Print a live board of Finnhub trades")]
struct Args {
    /// Tickers to subscribe to
    #[arg(required = true)]
    tickers: Vec<String>,

    /// API key
    #[arg(long, env = "FINNHUB_API_KEY", hide_env_values = true)]
    api_key: String,

    /// Seconds between board prints
    #[arg(short, long, default_value = "5")]
    every: u64,

    /// Write each board to this CSV file as well
    #[arg(long)]
    csv: Option<std::path::PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive("apys=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let board = Arc::new(QuoteBoard::new(&args.tickers));
    let listener = Arc::new(StreamListener::new(&args.api_key, args.tickers.clone()));
    let (cancel_tx, cancel_rx) = watch::channel(false);

    let listener_task = {
        let board = board.clone();
        let listener = listener.clone();
        tokio::spawn(async move { listener.run(&board, cancel_rx).await })
    };

    let mut interval = tokio::time::interval(Duration::from_secs(args.every.max(1)));
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Ctrl-C received, shutting down");
                break;
            }
            _ = interval.tick() => {
                let snapshot = board.snapshot().await?;
                println!("{}", snapshot);
                if let Some(path) = &args.csv {
                    snapshot.save_csv(path)?;
                }
                if listener.state() == ListenerState::Closed {
                    error!("Trade stream closed, exiting");
                    break;
                }
            }
        }
    }

    cancel_tx.send_replace(true);
    listener_task
        .await
        .context("Listener task panicked")?
        .context("Trade stream failed")?;

    println!("{}", board.snapshot().await?);
    Ok(())
}
