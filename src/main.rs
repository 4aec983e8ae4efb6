// src/main.rs
use futures_bot::adapter::OperatorMenu;
use futures_bot::application::usecase::OrderPipeline;
use futures_bot::config::Config;
use futures_bot::domain::errors::{AppError, AppResult};
use futures_bot::domain::repository::ExchangeRepository;
use futures_bot::infrastructure::{BinanceFuturesRepository, LogAuditSink, RetryingExecutor};

use clap::Parser;
use rust_decimal::Decimal;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Interactive order bot for Binance USDⓈ-M futures
#[derive(Parser, Debug)]
#[command(name = "futures_bot", version, about)]
struct Args {
    /// JSON configuration file (instead of environment variables)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Overrides BINANCE_API_KEY
    #[arg(long)]
    api_key: Option<String>,

    /// Overrides BINANCE_API_SECRET
    #[arg(long)]
    api_secret: Option<String>,

    /// Trade on the live exchange instead of the testnet
    #[arg(long)]
    live: bool,

    /// Maximum notional per order in USDT (0 disables the check)
    #[arg(long)]
    max_order_value: Option<Decimal>,

    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> AppResult<()> {
    let args = Args::parse();

    // Load configuration
    let mut config = match &args.config {
        Some(path) => Config::from_file(path)?,
        None => Config::from_env_with(|name| match name {
            "BINANCE_API_KEY" => args.api_key.clone(),
            "BINANCE_API_SECRET" => args.api_secret.clone(),
            _ => None,
        })?,
    };
    apply_args(&mut config, &args);

    // Initialize logging
    let log_path = config.init_logging()?;

    log::info!("Starting futures_bot v{}", env!("CARGO_PKG_VERSION"));
    if let Some(path) = &log_path {
        log::info!("Logging to {}", path.display());
    }

    if !config.exchange.testnet && !confirm_live()? {
        log::info!("Live trading not confirmed. Exiting.");
        return Ok(());
    }

    let exchange = BinanceFuturesRepository::new(
        config.exchange.api_key.clone(),
        config.exchange.api_secret.clone(),
        config.exchange.testnet,
    )
    .with_timeout(Duration::from_millis(config.exchange.request_timeout_ms))
    .with_recv_window(config.exchange.recv_window_ms);
    let testnet = exchange.is_testnet();
    let exchange: Arc<dyn ExchangeRepository> = Arc::new(exchange);

    let executor = RetryingExecutor::new(config.retry_policy(), Arc::new(config.rate_limiter()));
    let pipeline = OrderPipeline::new(exchange, executor)
        .with_validator(config.validator())
        .with_safety_gate(config.safety_gate())
        .with_audit_sink(Arc::new(LogAuditSink));
    let pipeline = Arc::new(pipeline);

    // Connect to exchange
    log::info!("Connecting to exchange...");
    let balance = pipeline.check_connection().await.map_err(|e| {
        log::error!("Connection check failed: {}", e);
        AppError::from(e)
    })?;
    log::info!("Wallet balance: {} USDT", balance.total_wallet_balance);
    match pipeline.safety_gate().max_order_value() {
        Some(limit) => log::info!("Max order value: {} USDT", limit),
        None => log::info!("Max order value: disabled"),
    }
    log::info!("Testnet: {}", testnet);

    let stdin = io::stdin();
    let mut menu = OperatorMenu::new(pipeline, stdin.lock(), io::stdout(), testnet);
    menu.run().await?;

    log::info!("Shutdown complete. Goodbye!");
    Ok(())
}

/// Command-line flags override the configuration source
fn apply_args(config: &mut Config, args: &Args) {
    if let Some(key) = &args.api_key {
        config.exchange.api_key = key.clone();
    }
    if let Some(secret) = &args.api_secret {
        config.exchange.api_secret = secret.clone();
    }
    if args.live {
        config.exchange.testnet = false;
    }
    if let Some(limit) = args.max_order_value {
        config.safety.max_order_value = Some(limit);
    }
    if let Some(level) = &args.log_level {
        config.logging.level = level.clone();
    }
}

fn confirm_live() -> AppResult<bool> {
    let mut stdout = io::stdout();
    writeln!(stdout, "WARNING: LIVE TRADING MODE. Real funds are at risk.")?;
    write!(stdout, "Type CONFIRM to continue: ")?;
    stdout.flush()?;

    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    Ok(line.trim() == "CONFIRM")
}
