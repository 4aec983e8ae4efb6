// src/domain/errors.rs
use rust_decimal::Decimal;
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Exchange error: {0}")]
    Exchange(#[from] ExchangeError),

    #[error("{0}")]
    Pipeline(#[from] PipelineError),
}

/// Local input checks; never retried
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("Invalid symbol: {0}")]
    InvalidSymbol(String),

    #[error("Unknown symbol: {0}")]
    UnknownSymbol(String),

    #[error("Symbol {0} is not tradable")]
    NotTradable(String),

    #[error("Invalid side: {0}. Must be 'BUY' or 'SELL'")]
    InvalidSide(String),

    #[error("Invalid {field}: {value}")]
    InvalidNumber { field: &'static str, value: String },

    #[error("Invalid quantity: {0}. Must be positive")]
    InvalidQuantity(Decimal),

    #[error("Quantity {quantity} below minimum {minimum}")]
    BelowMinimumQuantity { quantity: Decimal, minimum: Decimal },

    #[error("Invalid price: {0}. Must be positive")]
    InvalidPrice(Decimal),

    #[error("Invalid stop price: {0}. Must be positive")]
    InvalidStopPrice(Decimal),

    #[error("Invalid trigger: {side} stop {stop_price} must be {expected} market price {market_price}")]
    InvalidTrigger {
        side: &'static str,
        stop_price: Decimal,
        market_price: Decimal,
        expected: &'static str,
    },
}

impl ValidationError {
    /// Name of the request field that failed
    pub fn field(&self) -> &'static str {
        match self {
            ValidationError::InvalidSymbol(_)
            | ValidationError::UnknownSymbol(_)
            | ValidationError::NotTradable(_) => "symbol",
            ValidationError::InvalidSide(_) => "side",
            ValidationError::InvalidNumber { field, .. } => field,
            ValidationError::InvalidQuantity(_) | ValidationError::BelowMinimumQuantity { .. } => {
                "quantity"
            }
            ValidationError::InvalidPrice(_) => "price",
            ValidationError::InvalidStopPrice(_) | ValidationError::InvalidTrigger { .. } => {
                "stop_price"
            }
        }
    }
}

/// Rounding onto the exchange grid produced an unusable value
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PrecisionError {
    #[error("Quantity {quantity} rounds to zero with step {step}")]
    ZeroQuantity { quantity: Decimal, step: Decimal },

    #[error("Price {price} rounds to zero with tick {tick}")]
    ZeroPrice { price: Decimal, tick: Decimal },

    #[error("Quantity {quantity} below exchange minimum {minimum}")]
    BelowMinQuantity { quantity: Decimal, minimum: Decimal },

    #[error("Notional {notional} below exchange minimum {minimum}")]
    BelowMinNotional { notional: Decimal, minimum: Decimal },

    #[error("{field} {value} is out of range for the exchange grid")]
    OutOfRange { field: &'static str, value: Decimal },

    #[error("Notional of {quantity} at {price} is out of range")]
    NotionalOverflow { quantity: Decimal, price: Decimal },
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SafetyError {
    #[error("Order value ${notional} exceeds maximum ${limit}")]
    MaxOrderValueExceeded { notional: Decimal, limit: Decimal },

    #[error("Order value of {quantity} at {price} is out of range")]
    ValueOverflow { quantity: Decimal, price: Decimal },
}

/// Transport failures, classified for the retrying executor
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExchangeError {
    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Rate limit exceeded ({code}): {message}")]
    RateLimited { code: i64, message: String },

    #[error("Server error (HTTP {status}): {message}")]
    Server { status: u16, message: String },

    #[error("Authentication error ({code}): {message}")]
    Authentication { code: i64, message: String },

    #[error("Insufficient balance ({code}): {message}")]
    InsufficientBalance { code: i64, message: String },

    #[error("Order not found ({code}): {message}")]
    OrderNotFound { code: i64, message: String },

    #[error("Request rejected ({code}): {message}")]
    Rejected { code: i64, message: String },

    #[error("Invalid symbol: {0}")]
    InvalidSymbol(String),

    #[error("Failed to decode response: {0}")]
    Decode(String),

    #[error("Not supported: {0}")]
    Unsupported(String),
}

impl ExchangeError {
    /// Network timeouts, throttling and server-side failures
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ExchangeError::Timeout(_)
                | ExchangeError::Connection(_)
                | ExchangeError::Network(_)
                | ExchangeError::RateLimited { .. }
                | ExchangeError::Server { .. }
        )
    }

    /// Whether the request may have reached the matching engine.
    /// Only a refused connection or an explicit throttle proves it did not.
    pub fn may_have_executed(&self) -> bool {
        !matches!(
            self,
            ExchangeError::Connection(_) | ExchangeError::RateLimited { .. }
        )
    }

    pub fn code(&self) -> Option<i64> {
        match self {
            ExchangeError::RateLimited { code, .. }
            | ExchangeError::Authentication { code, .. }
            | ExchangeError::InsufficientBalance { code, .. }
            | ExchangeError::OrderNotFound { code, .. }
            | ExchangeError::Rejected { code, .. } => Some(*code),
            ExchangeError::Server { status, .. } => Some(i64::from(*status)),
            _ => None,
        }
    }

    /// Classify a Binance API error by HTTP status and exchange code
    pub fn from_api(status: u16, code: i64, message: String) -> Self {
        match (status, code) {
            (429 | 418, _) | (_, -1003 | -1015) => ExchangeError::RateLimited { code, message },
            (500..=599, _) | (_, -1001 | -1006 | -1007) => {
                ExchangeError::Server { status, message }
            }
            (401, _) | (_, -1002 | -1022 | -2014 | -2015) => {
                ExchangeError::Authentication { code, message }
            }
            (_, -2018 | -2019) => ExchangeError::InsufficientBalance { code, message },
            (_, -2011 | -2013) => ExchangeError::OrderNotFound { code, message },
            (_, -1121) => ExchangeError::InvalidSymbol(message),
            _ => ExchangeError::Rejected { code, message },
        }
    }
}

/// Outcome of the retrying executor when no response could be returned
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExecutorError {
    #[error("Transient exchange error after {attempts} attempt(s): {last}")]
    Transient { attempts: u32, last: ExchangeError },

    #[error("Exchange rejected request: {0}")]
    Final(ExchangeError),

    #[error("Order {client_order_id} state is ambiguous after {attempts} attempt(s): {reason}")]
    AmbiguousState {
        client_order_id: String,
        attempts: u32,
        reason: String,
    },
}

impl ExecutorError {
    pub fn exchange_error(&self) -> Option<&ExchangeError> {
        match self {
            ExecutorError::Transient { last, .. } => Some(last),
            ExecutorError::Final(e) => Some(e),
            ExecutorError::AmbiguousState { .. } => None,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TrackerError {
    #[error("Order not found: {0}")]
    NotFound(String),

    #[error("Order {id} cannot move from {from} to {to}")]
    IllegalTransition {
        id: String,
        from: crate::domain::model::OrderStatus,
        to: crate::domain::model::OrderStatus,
    },
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CancelError {
    #[error("Order not found: {0}")]
    NotFound(String),

    #[error("Order {id} is already {status}")]
    AlreadyTerminal {
        id: String,
        status: crate::domain::model::OrderStatus,
    },

    #[error("Cancel request failed: {0}")]
    Exchange(ExecutorError),
}

/// Pipeline stage at which an order failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum Stage {
    Input,
    SymbolRules,
    MarketPrice,
    Validation,
    Formatting,
    Safety,
    Dispatch,
    Tracking,
    Cancel,
    Query,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            Stage::Input => "input",
            Stage::SymbolRules => "symbol-rules",
            Stage::MarketPrice => "market-price",
            Stage::Validation => "validation",
            Stage::Formatting => "formatting",
            Stage::Safety => "safety",
            Stage::Dispatch => "dispatch",
            Stage::Tracking => "tracking",
            Stage::Cancel => "cancel",
            Stage::Query => "query",
        };
        f.write_str(s)
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum OrderError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Precision error: {0}")]
    Precision(#[from] PrecisionError),

    #[error("Safety error: {0}")]
    Safety(#[from] SafetyError),

    #[error("{0}")]
    Executor(#[from] ExecutorError),

    #[error("Cancel error: {0}")]
    Cancel(#[from] CancelError),

    #[error("Tracker error: {0}")]
    Tracker(#[from] TrackerError),
}

/// Any failure that leaves the pipeline, with the stage and symbol it happened at
#[derive(Error, Debug, Clone, PartialEq)]
#[error("[{stage}] {symbol}: {kind}")]
pub struct PipelineError {
    pub stage: Stage,
    pub symbol: String,
    #[source]
    pub kind: OrderError,
}

impl PipelineError {
    pub fn new(stage: Stage, symbol: &str, kind: impl Into<OrderError>) -> Self {
        Self {
            stage,
            symbol: symbol.to_string(),
            kind: kind.into(),
        }
    }

    /// Original exchange error code, when the failure came from the exchange
    pub fn exchange_code(&self) -> Option<i64> {
        match &self.kind {
            OrderError::Executor(e) | OrderError::Cancel(CancelError::Exchange(e)) => {
                e.exchange_error().and_then(ExchangeError::code)
            }
            _ => None,
        }
    }

    pub fn is_safety(&self) -> bool {
        matches!(self.kind, OrderError::Safety(_))
    }
}

// Result type alias for convenience
pub type AppResult<T> = Result<T, AppError>;
pub type ExchangeResult<T> = Result<T, ExchangeError>;
pub type PipelineResult<T> = Result<T, PipelineError>;
