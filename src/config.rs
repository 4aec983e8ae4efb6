// src/config.rs
use crate::domain::errors::{AppError, AppResult};
use crate::domain::service::{OrderValidator, SafetyGate};
use crate::infrastructure::rate_limit::RateLimiter;
use crate::infrastructure::retry::RetryPolicy;
use chrono::Local;
use dotenv::dotenv;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// Order bot configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    /// Exchange API credentials and transport settings
    pub exchange: ExchangeConfig,

    /// Order value ceiling and quantity floor
    pub safety: SafetyConfig,

    /// Outbound request budget
    pub rate_limit: RateLimitConfig,

    /// Retry and backoff settings
    pub retry: RetryConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExchangeConfig {
    pub api_key: String,
    pub api_secret: String,

    /// Use the futures testnet
    pub testnet: bool,

    pub request_timeout_ms: u64,
    pub recv_window_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct SafetyConfig {
    /// Maximum notional per order in USDT; `None` or zero disables the check
    pub max_order_value: Option<Decimal>,

    pub min_order_quantity: Option<Decimal>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RateLimitConfig {
    /// Calls allowed per window; `None` means unlimited
    pub capacity: Option<u32>,
    pub window_ms: u64,

    /// Minimum spacing between two calls
    pub request_delay_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub multiplier: u32,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    /// Log level (e.g., "info", "debug", "warn", "error")
    pub level: String,

    /// Log to file
    pub to_file: bool,

    /// Directory for timestamped log files
    pub log_dir: String,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> AppResult<Self> {
        Self::from_env_with(|_| None)
    }

    /// Environment variables, with `overrides` taking precedence (command-line flags)
    pub fn from_env_with<F>(overrides: F) -> AppResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        // Load .env file if it exists
        dotenv().ok();
        Self::from_lookup(|name| overrides(name).or_else(|| env::var(name).ok()))
    }

    /// Build the configuration from any variable source
    pub fn from_lookup<F>(lookup: F) -> AppResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Config::default();
        let required = |name: &str| {
            lookup(name)
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| AppError::Config(format!("Missing {} environment variable", name)))
        };

        let exchange = ExchangeConfig {
            api_key: required("BINANCE_API_KEY")?,
            api_secret: required("BINANCE_API_SECRET")?,
            testnet: parse_var(&lookup, "USE_TESTNET")?.unwrap_or(defaults.exchange.testnet),
            request_timeout_ms: parse_var(&lookup, "REQUEST_TIMEOUT_MS")?
                .unwrap_or(defaults.exchange.request_timeout_ms),
            recv_window_ms: parse_var(&lookup, "RECV_WINDOW_MS")?
                .unwrap_or(defaults.exchange.recv_window_ms),
        };

        let safety = SafetyConfig {
            max_order_value: parse_var(&lookup, "MAX_ORDER_VALUE_USDT")?,
            min_order_quantity: parse_var(&lookup, "MIN_ORDER_QUANTITY")?,
        };

        let rate_limit = RateLimitConfig {
            capacity: parse_var(&lookup, "RATE_LIMIT_CAPACITY")?,
            window_ms: parse_var(&lookup, "RATE_LIMIT_WINDOW_MS")?
                .unwrap_or(defaults.rate_limit.window_ms),
            request_delay_ms: parse_var(&lookup, "REQUEST_DELAY_MS")?
                .unwrap_or(defaults.rate_limit.request_delay_ms),
        };

        let retry = RetryConfig {
            max_attempts: parse_var(&lookup, "RETRY_MAX_ATTEMPTS")?
                .unwrap_or(defaults.retry.max_attempts),
            base_delay_ms: parse_var(&lookup, "RETRY_BASE_DELAY_MS")?
                .unwrap_or(defaults.retry.base_delay_ms),
            max_delay_ms: parse_var(&lookup, "RETRY_MAX_DELAY_MS")?
                .unwrap_or(defaults.retry.max_delay_ms),
            multiplier: parse_var(&lookup, "RETRY_MULTIPLIER")?
                .unwrap_or(defaults.retry.multiplier),
        };

        let logging = LoggingConfig {
            level: lookup("LOG_LEVEL").unwrap_or(defaults.logging.level),
            to_file: parse_var(&lookup, "LOG_TO_FILE")?.unwrap_or(defaults.logging.to_file),
            log_dir: lookup("LOG_DIR").unwrap_or(defaults.logging.log_dir),
        };

        Ok(Config {
            exchange,
            safety,
            rate_limit,
            retry,
            logging,
        })
    }

    /// Load configuration from a file
    pub fn from_file<P: AsRef<Path>>(path: P) -> AppResult<Self> {
        let mut file = File::open(path).map_err(|e| {
            AppError::Config(format!("Failed to open config file: {}", e))
        })?;

        let mut contents = String::new();
        file.read_to_string(&mut contents).map_err(|e| {
            AppError::Config(format!("Failed to read config file: {}", e))
        })?;

        let config: Config = serde_json::from_str(&contents).map_err(|e| {
            AppError::Config(format!("Failed to parse config file: {}", e))
        })?;

        Ok(config)
    }

    /// Save configuration to a file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> AppResult<()> {
        let contents = serde_json::to_string_pretty(self).map_err(|e| {
            AppError::Config(format!("Failed to serialize config: {}", e))
        })?;

        fs::write(path, contents).map_err(|e| {
            AppError::Config(format!("Failed to write config file: {}", e))
        })?;

        Ok(())
    }

    pub fn rate_limiter(&self) -> RateLimiter {
        let limiter = match self.rate_limit.capacity {
            Some(capacity) if capacity > 0 => {
                RateLimiter::new(capacity, Duration::from_millis(self.rate_limit.window_ms))
            }
            _ => RateLimiter::unlimited(),
        };
        limiter.with_min_interval(Duration::from_millis(self.rate_limit.request_delay_ms))
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retry.max_attempts,
            base_delay: Duration::from_millis(self.retry.base_delay_ms),
            max_delay: Duration::from_millis(self.retry.max_delay_ms),
            multiplier: self.retry.multiplier,
        }
    }

    pub fn safety_gate(&self) -> SafetyGate {
        SafetyGate::new(self.safety.max_order_value)
    }

    pub fn validator(&self) -> OrderValidator {
        OrderValidator::new(self.safety.min_order_quantity)
    }

    /// Initialize logging based on configuration.
    /// Returns the log file path when file logging is on.
    pub fn init_logging(&self) -> AppResult<Option<PathBuf>> {
        let mut builder = env_logger::Builder::new();

        // Set log level
        let log_level = match self.logging.level.to_lowercase().as_str() {
            "trace" => log::LevelFilter::Trace,
            "debug" => log::LevelFilter::Debug,
            "info" => log::LevelFilter::Info,
            "warn" => log::LevelFilter::Warn,
            "error" => log::LevelFilter::Error,
            _ => log::LevelFilter::Info,
        };

        builder.filter_level(log_level);
        builder.format(|buf, record| {
            writeln!(
                buf,
                "{} - {} - {} - {}",
                Local::now().format("%Y-%m-%d %H:%M:%S"),
                record.target(),
                record.level(),
                record.args()
            )
        });

        // Configure output
        let mut log_path = None;
        if self.logging.to_file {
            fs::create_dir_all(&self.logging.log_dir).map_err(|e| {
                AppError::Config(format!("Failed to create log directory: {}", e))
            })?;
            let path = Path::new(&self.logging.log_dir).join(format!(
                "trading_bot_{}.log",
                Local::now().format("%Y%m%d_%H%M%S")
            ));
            let file = File::create(&path).map_err(|e| {
                AppError::Config(format!("Failed to create log file: {}", e))
            })?;

            builder.target(env_logger::Target::Pipe(Box::new(TeeWriter { file })));
            log_path = Some(path);
        }

        builder
            .try_init()
            .map_err(|e| AppError::Config(format!("Failed to initialize logger: {}", e)))?;

        Ok(log_path)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            exchange: ExchangeConfig {
                api_key: "".to_string(),
                api_secret: "".to_string(),
                testnet: true,
                request_timeout_ms: 10_000,
                recv_window_ms: 5_000,
            },
            safety: SafetyConfig::default(),
            rate_limit: RateLimitConfig {
                capacity: None,
                window_ms: 60_000,
                request_delay_ms: 0,
            },
            retry: RetryConfig {
                max_attempts: 3,
                base_delay_ms: 500,
                max_delay_ms: 8_000,
                multiplier: 2,
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                to_file: true,
                log_dir: "logs".to_string(),
            },
        }
    }
}

fn parse_var<T, F>(lookup: &F, name: &str) -> AppResult<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        Some(raw) if !raw.trim().is_empty() => raw
            .trim()
            .to_lowercase()
            .parse()
            .map(Some)
            .map_err(|e| AppError::Config(format!("Invalid {} '{}': {}", name, raw, e))),
        _ => Ok(None),
    }
}

/// Every log line goes to the session file and to stderr
struct TeeWriter {
    file: File,
}

impl Write for TeeWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.file.write_all(buf)?;
        io::stderr().write_all(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()?;
        io::stderr().flush()
    }
}
