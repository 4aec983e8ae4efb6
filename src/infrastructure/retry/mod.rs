// src/infrastructure/retry/mod.rs
// Bounded retries with exponential backoff around single exchange calls

use std::future::Future;
use std::sync::Arc;
use tokio::time::{sleep, Duration};

use crate::domain::errors::{ExchangeError, ExchangeResult, ExecutorError};
use crate::domain::model::{NormalizedOrder, OrderSnapshot};
use crate::domain::repository::ExchangeRepository;
use crate::infrastructure::rate_limit::RateLimiter;

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts including the first one
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
            multiplier: 2,
        }
    }
}

impl RetryPolicy {
    /// Delay after the `attempt`-th failure (1-based): base × multiplier^(attempt-1), capped
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = self
            .multiplier
            .max(1)
            .checked_pow(attempt.saturating_sub(1))
            .unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

pub struct RetryingExecutor {
    policy: RetryPolicy,
    limiter: Arc<RateLimiter>,
}

impl RetryingExecutor {
    pub fn new(policy: RetryPolicy, limiter: Arc<RateLimiter>) -> Self {
        let policy = RetryPolicy {
            max_attempts: policy.max_attempts.max(1),
            ..policy
        };
        Self { policy, limiter }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Run an idempotent call (query, price, balance) with retries on transient errors.
    /// Every attempt takes one rate-limit permit.
    pub async fn execute<T, F, Fut>(&self, operation: &str, mut call: F) -> Result<T, ExecutorError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = ExchangeResult<T>>,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            self.limiter.acquire().await;

            let error = match call().await {
                Ok(value) => return Ok(value),
                Err(e) => e,
            };

            if !error.is_transient() {
                log::error!("{} failed permanently: {}", operation, error);
                return Err(ExecutorError::Final(error));
            }
            if attempt >= self.policy.max_attempts {
                log::error!("{} failed after {} attempt(s): {}", operation, attempt, error);
                return Err(ExecutorError::Transient {
                    attempts: attempt,
                    last: error,
                });
            }

            let delay = self.policy.delay_for(attempt);
            log::warn!(
                "{} failed (attempt {}/{}): {}. Retrying in {:?}",
                operation,
                attempt,
                self.policy.max_attempts,
                error,
                delay
            );
            sleep(delay).await;
        }
    }

    /// Submit an order without ever sending it twice.
    ///
    /// When a failed attempt may have reached the exchange, the order is looked
    /// up by its client id before anything else happens. Found: that order is
    /// the result. Confirmed absent: resubmit. Unknown: `AmbiguousState`.
    pub async fn place_order(
        &self,
        exchange: &dyn ExchangeRepository,
        order: &NormalizedOrder,
        client_order_id: &str,
    ) -> Result<OrderSnapshot, ExecutorError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            self.limiter.acquire().await;

            let error = match exchange.place_order(order, client_order_id).await {
                Ok(snapshot) => return Ok(snapshot),
                Err(e) => e,
            };

            if !error.is_transient() {
                log::error!("Order {} rejected: {}", client_order_id, error);
                return Err(ExecutorError::Final(error));
            }

            let exhausted = attempt >= self.policy.max_attempts;
            if !exhausted || error.may_have_executed() {
                let delay = self.policy.delay_for(attempt);
                log::warn!(
                    "Order {} placement failed (attempt {}/{}): {}. Checking again in {:?}",
                    client_order_id,
                    attempt,
                    self.policy.max_attempts,
                    error,
                    delay
                );
                sleep(delay).await;
            }

            if error.may_have_executed() {
                match self.lookup(exchange, &order.symbol, client_order_id).await {
                    Ok(Some(snapshot)) => {
                        log::warn!(
                            "Order {} was accepted despite the error ({}), exchange id {}",
                            client_order_id,
                            error,
                            snapshot.order_id
                        );
                        return Ok(snapshot);
                    }
                    Ok(None) => {
                        log::info!("Order {} confirmed absent on the exchange", client_order_id);
                    }
                    Err(reason) => {
                        log::error!("Order {} state unknown: {}", client_order_id, reason);
                        return Err(ExecutorError::AmbiguousState {
                            client_order_id: client_order_id.to_string(),
                            attempts: attempt,
                            reason,
                        });
                    }
                }
            }

            if exhausted {
                log::error!(
                    "Order {} not placed after {} attempt(s): {}",
                    client_order_id,
                    attempt,
                    error
                );
                return Err(ExecutorError::Transient {
                    attempts: attempt,
                    last: error,
                });
            }
        }
    }

    /// Cancel an order, reading it back when a retry answers "unknown order".
    ///
    /// An earlier attempt that may have reached the exchange can have cancelled
    /// the order already. In that case the order's terminal state from the
    /// exchange is the result; a still-open order keeps the original error.
    pub async fn cancel_order(
        &self,
        exchange: &dyn ExchangeRepository,
        symbol: &str,
        order_id: &str,
    ) -> Result<OrderSnapshot, ExecutorError> {
        let mut attempt = 0;
        let mut maybe_sent = false;
        loop {
            attempt += 1;
            self.limiter.acquire().await;

            let error = match exchange.cancel_order(symbol, order_id).await {
                Ok(snapshot) => return Ok(snapshot),
                Err(e) => e,
            };

            if maybe_sent && matches!(error, ExchangeError::OrderNotFound { .. }) {
                return self.reconcile_cancel(exchange, symbol, order_id, attempt, error).await;
            }
            if !error.is_transient() {
                log::error!("Cancel of order {} refused: {}", order_id, error);
                return Err(ExecutorError::Final(error));
            }
            maybe_sent |= error.may_have_executed();
            if attempt >= self.policy.max_attempts {
                log::error!("Cancel of order {} failed after {} attempt(s): {}", order_id, attempt, error);
                return Err(ExecutorError::Transient {
                    attempts: attempt,
                    last: error,
                });
            }

            let delay = self.policy.delay_for(attempt);
            log::warn!(
                "Cancel of order {} failed (attempt {}/{}): {}. Retrying in {:?}",
                order_id,
                attempt,
                self.policy.max_attempts,
                error,
                delay
            );
            sleep(delay).await;
        }
    }

    async fn reconcile_cancel(
        &self,
        exchange: &dyn ExchangeRepository,
        symbol: &str,
        order_id: &str,
        attempts: u32,
        not_found: ExchangeError,
    ) -> Result<OrderSnapshot, ExecutorError> {
        let result = self
            .execute("get_order", || exchange.get_order(symbol, order_id))
            .await;

        match result {
            Ok(snapshot) if snapshot.status.is_terminal() => {
                log::warn!(
                    "Order {} is already {} on the exchange ({})",
                    order_id,
                    snapshot.status,
                    not_found
                );
                Ok(snapshot)
            }
            Ok(snapshot) => {
                log::error!("Order {} is still {} but cancel answered: {}", order_id, snapshot.status, not_found);
                Err(ExecutorError::Final(not_found))
            }
            Err(e) => {
                log::error!("Order {} state unknown after cancel: {}", order_id, e);
                Err(ExecutorError::AmbiguousState {
                    client_order_id: order_id.to_string(),
                    attempts,
                    reason: format!("status read-back failed: {}", e),
                })
            }
        }
    }

    async fn lookup(
        &self,
        exchange: &dyn ExchangeRepository,
        symbol: &str,
        client_order_id: &str,
    ) -> Result<Option<OrderSnapshot>, String> {
        let result = self
            .execute("find_order_by_client_id", || {
                exchange.find_order_by_client_id(symbol, client_order_id)
            })
            .await;

        match result {
            Ok(found) => Ok(found),
            Err(ExecutorError::Final(ExchangeError::OrderNotFound { .. })) => Ok(None),
            Err(e) => Err(format!("status lookup failed: {}", e)),
        }
    }
}
