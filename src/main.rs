use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use apys::alpha::{AlphaClient, Interval, MovingAverage, OutputSize};
use apys::config::ApiConfig;
use apys::credentials::CredentialRecord;
use apys::defillama::DefiLlamaClient;
use apys::finnhub::{quote_table, FinnhubClient, ListenerState};
use apys::iol::{Adjustment, Country, IolClient, Market};
use apys::primary::{BookBoard, Environment, MarketDataEntry, MarketDataListener, PrimaryClient};
use apys::table::Table;
use apys::token::Token;

#[derive(Parser, Debug)]
#[command(name = "apys")]
#[command(about = "Market-data, DeFi and brokerage API clients with tabular output")]
struct Args {
    #[command(subcommand)]
    command: Commands,

    /// Also write the resulting table to this CSV file
    #[arg(long, global = true)]
    csv: Option<PathBuf>,

    /// Print verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Alpha Vantage stocks, FX, crypto and indicators
    Alpha {
        /// API key
        #[arg(long, env = "ALPHA_VANTAGE_API_KEY", hide_env_values = true)]
        api_key: String,

        #[command(subcommand)]
        command: AlphaCommand,
    },

    /// Finnhub reference data and quotes
    Finnhub {
        /// API key
        #[arg(long, env = "FINNHUB_API_KEY", hide_env_values = true)]
        api_key: String,

        #[command(subcommand)]
        command: FinnhubCommand,
    },

    /// DefiLlama total value locked
    Llama {
        #[command(subcommand)]
        command: LlamaCommand,
    },

    /// InvertirOnline brokerage
    Iol {
        #[arg(short, long, env = "IOL_USERNAME")]
        username: Option<String>,

        #[arg(short, long, env = "IOL_PASSWORD", hide_env_values = true)]
        password: Option<String>,

        /// JSON credential file; a refreshed token is written back to it
        #[arg(long)]
        credentials: Option<PathBuf>,

        #[command(subcommand)]
        command: IolCommand,
    },

    /// Primary (Matba-Rofex) futures and options gateway
    Primary {
        #[arg(short, long, env = "PRIMARY_USER")]
        user: Option<String>,

        #[arg(short, long, env = "PRIMARY_PASSWORD", hide_env_values = true)]
        password: Option<String>,

        #[arg(short, long, env = "PRIMARY_ACCOUNT")]
        account: Option<String>,

        /// Use the live gateway instead of reMarkets
        #[arg(long)]
        live: bool,

        /// JSON credential file; a refreshed token is written back to it
        #[arg(long)]
        credentials: Option<PathBuf>,

        #[command(subcommand)]
        command: PrimaryCommand,
    },
}

#[derive(Subcommand, Debug)]
enum AlphaCommand {
    /// Symbol search by keywords
    Search { keywords: String },

    Intraday {
        symbol: String,
        #[arg(short, long, value_enum, default_value_t = Interval::Min15)]
        interval: Interval,
        #[arg(long, value_enum, default_value_t = OutputSize::Compact)]
        size: OutputSize,
    },

    Daily {
        symbol: String,
        #[arg(long, value_enum, default_value_t = OutputSize::Compact)]
        size: OutputSize,
        /// Adjusted series (premium)
        #[arg(long)]
        adjusted: bool,
    },

    Weekly {
        symbol: String,
        #[arg(long)]
        adjusted: bool,
    },

    Monthly {
        symbol: String,
        #[arg(long)]
        adjusted: bool,
    },

    /// Latest quote
    Quote { symbol: String },

    FxIntraday {
        from: String,
        to: String,
        #[arg(short, long, value_enum, default_value_t = Interval::Min15)]
        interval: Interval,
        #[arg(long, value_enum, default_value_t = OutputSize::Compact)]
        size: OutputSize,
    },

    FxDaily {
        from: String,
        to: String,
        #[arg(long, value_enum, default_value_t = OutputSize::Compact)]
        size: OutputSize,
    },

    FxWeekly { from: String, to: String },

    FxMonthly { from: String, to: String },

    /// Realtime exchange rate
    FxQuote { from: String, to: String },

    CryptoIntraday {
        symbol: String,
        #[arg(short, long, default_value = "USD")]
        market: String,
        #[arg(short, long, value_enum, default_value_t = Interval::Min15)]
        interval: Interval,
        #[arg(long, value_enum, default_value_t = OutputSize::Compact)]
        size: OutputSize,
    },

    CryptoDaily {
        symbol: String,
        #[arg(short, long, default_value = "USD")]
        market: String,
    },

    CryptoWeekly {
        symbol: String,
        #[arg(short, long, default_value = "USD")]
        market: String,
    },

    CryptoMonthly {
        symbol: String,
        #[arg(short, long, default_value = "USD")]
        market: String,
    },

    CryptoQuote { from: String, to: String },

    /// Simple or exponential moving average
    MovingAverage {
        symbol: String,
        #[arg(short, long, value_enum, default_value_t = MovingAverage::Sma)]
        kind: MovingAverage,
        /// 1min, 5min, 15min, 30min, 60min, daily, weekly or monthly
        #[arg(short, long, default_value = "daily")]
        interval: String,
        #[arg(short, long, default_value = "14")]
        period: u32,
        /// close, open, high or low
        #[arg(short, long, default_value = "close")]
        series_type: String,
    },

    /// Physical (or with --digital, crypto) currency codes
    Currencies {
        #[arg(long)]
        digital: bool,
    },
}

#[derive(Subcommand, Debug)]
enum FinnhubCommand {
    Search { query: String },
    CryptoExchanges,
    Quote { symbol: String },
}

#[derive(Subcommand, Debug)]
enum LlamaCommand {
    Protocols,
    /// Historical TVL of one protocol
    Protocol { slug: String },
    /// Current TVL of one protocol
    Tvl { slug: String },
    /// TVL history, all chains or one
    Charts { chain: Option<String> },
    Chains,
}

#[derive(Subcommand, Debug)]
enum IolCommand {
    /// Daily series between two dates (YYYY-MM-DD)
    Daily {
        symbol: String,
        from: NaiveDate,
        /// Defaults to today
        to: Option<NaiveDate>,
        #[arg(short, long, value_enum, default_value_t = Market::Bcba)]
        market: Market,
        #[arg(long)]
        adjusted: bool,
    },

    LastPrice {
        symbol: String,
        #[arg(short, long, value_enum, default_value_t = Market::Bcba)]
        market: Market,
    },

    Info {
        symbol: String,
        #[arg(short, long, value_enum, default_value_t = Market::Bcba)]
        market: Market,
    },

    Options {
        symbol: String,
        #[arg(short, long, value_enum, default_value_t = Market::Bcba)]
        market: Market,
    },

    /// Mutual funds, all or one
    Fci { symbol: Option<String> },

    Instruments {
        #[arg(short, long, value_enum, default_value_t = Country::Argentina)]
        country: Country,
    },

    Panels {
        /// Instrument class, e.g. acciones
        instrument: String,
        #[arg(short, long, value_enum, default_value_t = Country::Argentina)]
        country: Country,
    },

    /// Last prices of a whole screen
    Screen {
        instrument: String,
        screen: String,
        #[arg(short, long, value_enum, default_value_t = Country::Argentina)]
        country: Country,
    },
}

#[derive(Subcommand, Debug)]
enum PrimaryCommand {
    Segments,

    Instruments {
        /// Include contract details
        #[arg(long)]
        details: bool,
    },

    Detail {
        symbol: String,
        #[arg(short, long, default_value = "ROFX")]
        market: String,
    },

    /// Detailed instruments of one CFI family (ESXXXX stocks, DBXXXX bonds, ...)
    Cficode { code: String },

    MarketData {
        symbol: String,
        #[arg(short, long, default_value = "ROFX")]
        market: String,
        /// Entry codes; all when omitted
        #[arg(short, long, value_enum, value_delimiter = ',')]
        entries: Vec<MarketDataEntry>,
        #[arg(short, long, default_value = "1")]
        depth: u32,
    },

    /// Live book board from the market-data socket until Ctrl-C
    Stream {
        #[arg(required = true)]
        symbols: Vec<String>,
        #[arg(short, long, default_value = "ROFX")]
        market: String,
        /// Seconds between board prints
        #[arg(long, default_value = "5")]
        every: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let args = Args::parse();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(if args.verbose { Level::DEBUG } else { Level::INFO })
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let csv = args.csv.as_deref();
    match args.command {
        Commands::Alpha { api_key, command } => run_alpha(api_key, command, csv).await?,
        Commands::Finnhub { api_key, command } => run_finnhub(api_key, command, csv).await?,
        Commands::Llama { command } => run_llama(command, csv).await?,
        Commands::Iol { username, password, credentials, command } => {
            run_iol(username, password, credentials, command, csv).await?
        }
        Commands::Primary { user, password, account, live, credentials, command } => {
            let environment = if live { Environment::Live } else { Environment::Remarkets };
            run_primary(user, password, account, environment, credentials, command, csv).await?
        }
    }

    Ok(())
}

/// Print the table preview and optionally save it
fn emit(table: &Table, csv: Option<&Path>) -> Result<()> {
    println!("{}", table);
    if let Some(path) = csv {
        table.save_csv(path)?;
        info!("Saved {} rows to {}", table.len(), path.display());
    }
    Ok(())
}

async fn run_alpha(api_key: String, command: AlphaCommand, csv: Option<&Path>) -> Result<()> {
    let client = AlphaClient::new(&ApiConfig::new(apys::alpha::client::BASE_URL).with_env_overrides()?, api_key)?;

    let table = match command {
        AlphaCommand::Search { keywords } => client.symbol_search(&keywords).await?,
        AlphaCommand::Intraday { symbol, interval, size } => {
            client.stock_intraday(&symbol, interval, size).await?
        }
        AlphaCommand::Daily { symbol, size, adjusted } => {
            if adjusted {
                client.stock_daily_adjusted(&symbol, size).await?
            } else {
                client.stock_daily(&symbol, size).await?
            }
        }
        AlphaCommand::Weekly { symbol, adjusted } => {
            if adjusted {
                client.stock_weekly_adjusted(&symbol).await?
            } else {
                client.stock_weekly(&symbol).await?
            }
        }
        AlphaCommand::Monthly { symbol, adjusted } => {
            if adjusted {
                client.stock_monthly_adjusted(&symbol).await?
            } else {
                client.stock_monthly(&symbol).await?
            }
        }
        AlphaCommand::Quote { symbol } => client.global_quote(&symbol).await?,
        AlphaCommand::FxIntraday { from, to, interval, size } => {
            client.fx_intraday(&from, &to, interval, size).await?
        }
        AlphaCommand::FxDaily { from, to, size } => client.fx_daily(&from, &to, size).await?,
        AlphaCommand::FxWeekly { from, to } => client.fx_weekly(&from, &to).await?,
        AlphaCommand::FxMonthly { from, to } => client.fx_monthly(&from, &to).await?,
        AlphaCommand::FxQuote { from, to } => client.fx_quote(&from, &to).await?,
        AlphaCommand::CryptoIntraday { symbol, market, interval, size } => {
            client.crypto_intraday(&symbol, &market, interval, size).await?
        }
        AlphaCommand::CryptoDaily { symbol, market } => client.crypto_daily(&symbol, &market).await?,
        AlphaCommand::CryptoWeekly { symbol, market } => client.crypto_weekly(&symbol, &market).await?,
        AlphaCommand::CryptoMonthly { symbol, market } => {
            client.crypto_monthly(&symbol, &market).await?
        }
        AlphaCommand::CryptoQuote { from, to } => client.crypto_quote(&from, &to).await?,
        AlphaCommand::MovingAverage { symbol, kind, interval, period, series_type } => {
            client
                .moving_average(&symbol, kind, &interval, period, &series_type)
                .await?
        }
        AlphaCommand::Currencies { digital } => {
            if digital {
                client.digital_currencies().await?
            } else {
                client.physical_currencies().await?
            }
        }
    };
    emit(&table, csv)
}

async fn run_finnhub(api_key: String, command: FinnhubCommand, csv: Option<&Path>) -> Result<()> {
    let config = ApiConfig::new(apys::finnhub::client::BASE_URL).with_env_overrides()?;
    let client = FinnhubClient::new(&config, api_key)?;

    match command {
        FinnhubCommand::Search { query } => emit(&client.symbol_lookup(&query).await?, csv),
        FinnhubCommand::CryptoExchanges => {
            for exchange in client.crypto_exchanges().await? {
                println!("{}", exchange);
            }
            Ok(())
        }
        FinnhubCommand::Quote { symbol } => {
            let quote = client.quote(&symbol).await?;
            emit(&quote_table(&symbol, &quote)?, csv)
        }
    }
}

async fn run_llama(command: LlamaCommand, csv: Option<&Path>) -> Result<()> {
    let client = DefiLlamaClient::from_env()?;

    match command {
        LlamaCommand::Protocols => emit(&client.protocols().await?, csv),
        LlamaCommand::Protocol { slug } => {
            let history = client.protocol(&slug).await?;
            if let Some(name) = history.metadata.get("name").and_then(|v| v.as_str()) {
                println!("{}", name);
            }
            if let Some(current) = &history.current_chain_tvls {
                println!("{}", current);
            }
            emit(&history.tvl, csv)
        }
        LlamaCommand::Tvl { slug } => {
            println!("{}", client.protocol_tvl(&slug).await?);
            Ok(())
        }
        LlamaCommand::Charts { chain } => {
            let table = match chain {
                Some(chain) => client.chart_chain(&chain).await?,
                None => client.charts().await?,
            };
            emit(&table, csv)
        }
        LlamaCommand::Chains => emit(&client.chains().await?, csv),
    }
}

/// Merge command-line credentials over the optional credential file
fn load_credentials(
    username: Option<String>,
    password: Option<String>,
    path: Option<&Path>,
) -> Result<CredentialRecord> {
    let mut record = match path {
        Some(path) if path.exists() => CredentialRecord::load(path)?,
        _ => CredentialRecord::default(),
    };
    if let Some(username) = username {
        record.username = username;
    }
    if let Some(password) = password {
        record.password = password;
    }
    if record.username.is_empty() || record.password.is_empty() {
        anyhow::bail!("Username and password are required (flags, environment or --credentials file)");
    }
    Ok(record)
}

/// Persist `token` when it differs from the one in the file
fn save_token(record: CredentialRecord, token: &Token, path: Option<&Path>) -> Result<()> {
    if let Some(path) = path {
        if record.token().as_ref() != Some(token) {
            record.with_token(token).save(path)?;
            info!("Stored refreshed token in {}", path.display());
        }
    }
    Ok(())
}

async fn run_iol(
    username: Option<String>,
    password: Option<String>,
    credentials: Option<PathBuf>,
    command: IolCommand,
    csv: Option<&Path>,
) -> Result<()> {
    let record = load_credentials(username, password, credentials.as_deref())?;
    let config = ApiConfig::new(apys::iol::client::BASE_URL).with_env_overrides()?;
    let client = IolClient::new(&config, record.username.clone(), record.password.clone())?;

    let token = client
        .fresh_token(record.token())
        .await
        .context("Could not obtain an IOL token")?;
    save_token(record, &token, credentials.as_deref())?;

    let table = match command {
        IolCommand::Daily { symbol, from, to, market, adjusted } => {
            let to = to.unwrap_or_else(|| Utc::now().date_naive());
            client
                .symbol_daily(&token, &symbol, market, from, to, Adjustment::from_flag(adjusted))
                .await?
        }
        IolCommand::LastPrice { symbol, market } => {
            client.symbol_last_price(&token, &symbol, market).await?
        }
        IolCommand::Info { symbol, market } => client.symbol_info(&token, &symbol, market).await?,
        IolCommand::Options { symbol, market } => {
            client.symbol_options(&token, &symbol, market).await?
        }
        IolCommand::Fci { symbol } => client.fci_info(&token, symbol.as_deref()).await?,
        IolCommand::Instruments { country } => client.instruments(&token, country).await?,
        IolCommand::Panels { instrument, country } => {
            client.panels(&token, country, &instrument).await?
        }
        IolCommand::Screen { instrument, screen, country } => {
            client
                .screen_last_price(&token, &instrument, &screen, country)
                .await?
        }
    };
    emit(&table, csv)
}

async fn run_primary(
    user: Option<String>,
    password: Option<String>,
    account: Option<String>,
    environment: Environment,
    credentials: Option<PathBuf>,
    command: PrimaryCommand,
    csv: Option<&Path>,
) -> Result<()> {
    let record = load_credentials(user, password, credentials.as_deref())?;
    let config = ApiConfig::new(environment.base_url()).with_env_overrides()?;
    let account = account.or_else(|| record.account.clone());
    let client = PrimaryClient::new(&config, record.username.clone(), record.password.clone())?
        .with_account(account);
    info!("Primary gateway {:?}, account {:?}", environment, client.account());

    let token = client
        .fresh_token(record.token())
        .await
        .context("Could not obtain a Primary token")?;
    save_token(record, &token, credentials.as_deref())?;

    let table = match command {
        PrimaryCommand::Stream { symbols, market, every } => {
            return stream_primary(environment, token, symbols, market, every, csv).await;
        }
        PrimaryCommand::Segments => client.segments(&token).await?,
        PrimaryCommand::Instruments { details } => {
            if details {
                client.detailed_instruments(&token).await?
            } else {
                client.instruments(&token).await?
            }
        }
        PrimaryCommand::Detail { symbol, market } => {
            client.instrument_detail(&token, &symbol, &market).await?
        }
        PrimaryCommand::Cficode { code } => client.instruments_by_cficode(&token, &code).await?,
        PrimaryCommand::MarketData { symbol, market, entries, depth } => {
            let entries = if entries.is_empty() {
                MarketDataEntry::ALL.to_vec()
            } else {
                entries
            };
            client
                .market_data(&token, &symbol, &market, &entries, depth)
                .await?
        }
    };
    emit(&table, csv)
}

async fn stream_primary(
    environment: Environment,
    token: Token,
    symbols: Vec<String>,
    market: String,
    every: u64,
    csv: Option<&Path>,
) -> Result<()> {
    let board = BookBoard::new(&symbols);
    let listener = MarketDataListener::new(environment, token, symbols).with_market(market);
    let mut states = listener.watch_state();
    let (cancel_tx, cancel_rx) = tokio::sync::watch::channel(false);

    let printer = async {
        let mut interval = tokio::time::interval(Duration::from_secs(every.max(1)));
        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    info!("Ctrl-C received, shutting down");
                    break;
                }
                _ = states.wait_for(|s| *s == ListenerState::Closed) => break,
                _ = interval.tick() => emit(&board.snapshot().await?, csv)?,
            }
        }
        cancel_tx.send_replace(true);
        Ok::<_, anyhow::Error>(())
    };

    let (ran, printed) = tokio::join!(listener.run(&board, cancel_rx), printer);
    ran.context("Market data socket failed")?;
    printed?;
    emit(&board.snapshot().await?, csv)
}
