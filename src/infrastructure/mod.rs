pub mod audit;
pub mod exchange;
pub mod rate_limit;
pub mod retry;

pub use audit::{LogAuditSink, MemoryAuditSink};
pub use exchange::BinanceFuturesRepository;
pub use rate_limit::RateLimiter;
pub use retry::{RetryPolicy, RetryingExecutor};
