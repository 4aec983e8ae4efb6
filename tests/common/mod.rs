// tests/common/mod.rs
// Scripted in-memory exchange shared by the integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use futures_bot::application::usecase::OrderPipeline;
use futures_bot::domain::errors::{ExchangeError, ExchangeResult};
use futures_bot::domain::model::{
    AccountBalance, NormalizedOrder, OrderSnapshot, OrderStatus, SymbolRules,
};
use futures_bot::domain::repository::ExchangeRepository;
use futures_bot::domain::service::SafetyGate;
use futures_bot::infrastructure::{MemoryAuditSink, RateLimiter, RetryPolicy, RetryingExecutor};
use tokio::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Ping,
    Place { client_order_id: String, quantity: Decimal },
    Lookup { client_order_id: String },
    GetOrder { order_id: String },
    Cancel { order_id: String },
    Price { symbol: String },
    Rules { symbol: String },
    Balance,
}

/// Replays queued results; once a queue is empty the call succeeds normally
#[derive(Default)]
pub struct ScriptedExchange {
    rules: Mutex<HashMap<String, SymbolRules>>,
    prices: Mutex<HashMap<String, Decimal>>,
    place_results: Mutex<VecDeque<ExchangeResult<OrderStatus>>>,
    lookup_results: Mutex<VecDeque<ExchangeResult<Option<OrderStatus>>>>,
    order_statuses: Mutex<VecDeque<OrderStatus>>,
    cancel_results: Mutex<VecDeque<ExchangeResult<OrderStatus>>>,
    calls: Mutex<Vec<Call>>,
    next_order_id: Mutex<u64>,
}

impl ScriptedExchange {
    pub fn new() -> Self {
        let exchange = Self::default();
        exchange.list(btc_rules(), dec!(50000));
        exchange
    }

    pub fn list(&self, rules: SymbolRules, price: Decimal) {
        self.prices.lock().unwrap().insert(rules.symbol.clone(), price);
        self.rules.lock().unwrap().insert(rules.symbol.clone(), rules);
    }

    pub fn script_place(&self, result: ExchangeResult<OrderStatus>) {
        self.place_results.lock().unwrap().push_back(result);
    }

    pub fn script_lookup(&self, result: ExchangeResult<Option<OrderStatus>>) {
        self.lookup_results.lock().unwrap().push_back(result);
    }

    pub fn script_order_status(&self, status: OrderStatus) {
        self.order_statuses.lock().unwrap().push_back(status);
    }

    pub fn script_cancel(&self, result: ExchangeResult<OrderStatus>) {
        self.cancel_results.lock().unwrap().push_back(result);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn place_calls(&self) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|c| matches!(c, Call::Place { .. }))
            .collect()
    }

    pub fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.calls().iter().filter(|c| pred(c)).count()
    }

    fn log(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }

    fn snapshot(&self, order_id: String, client_order_id: &str, symbol: &str, status: OrderStatus) -> OrderSnapshot {
        let raw = match status {
            OrderStatus::Submitted | OrderStatus::Pending => "NEW".to_string(),
            other => other.to_string(),
        };
        OrderSnapshot {
            order_id,
            client_order_id: Some(client_order_id.to_string()),
            symbol: symbol.to_string(),
            status,
            raw_status: raw,
            orig_quantity: dec!(0.01),
            executed_quantity: if status == OrderStatus::Filled { dec!(0.01) } else { Decimal::ZERO },
            average_price: None,
            updated_at: Utc::now(),
        }
    }

    fn new_order_id(&self) -> String {
        let mut next = self.next_order_id.lock().unwrap();
        *next += 1;
        (1000 + *next).to_string()
    }
}

#[async_trait]
impl ExchangeRepository for ScriptedExchange {
    async fn ping(&self) -> ExchangeResult<()> {
        self.log(Call::Ping);
        Ok(())
    }

    async fn place_order(&self, order: &NormalizedOrder, client_order_id: &str) -> ExchangeResult<OrderSnapshot> {
        self.log(Call::Place {
            client_order_id: client_order_id.to_string(),
            quantity: order.quantity,
        });
        let scripted = self.place_results.lock().unwrap().pop_front();
        let status = match scripted {
            Some(Err(e)) => return Err(e),
            Some(Ok(status)) => status,
            None => OrderStatus::Submitted,
        };
        Ok(self.snapshot(self.new_order_id(), client_order_id, &order.symbol, status))
    }

    async fn get_order(&self, symbol: &str, order_id: &str) -> ExchangeResult<OrderSnapshot> {
        self.log(Call::GetOrder { order_id: order_id.to_string() });
        let status = self.order_statuses.lock().unwrap().pop_front();
        match status {
            Some(status) => Ok(self.snapshot(order_id.to_string(), "fb-unknown", symbol, status)),
            None => Err(ExchangeError::OrderNotFound {
                code: -2013,
                message: "Order does not exist.".into(),
            }),
        }
    }

    async fn find_order_by_client_id(
        &self,
        symbol: &str,
        client_order_id: &str,
    ) -> ExchangeResult<Option<OrderSnapshot>> {
        self.log(Call::Lookup { client_order_id: client_order_id.to_string() });
        let scripted = self.lookup_results.lock().unwrap().pop_front();
        match scripted {
            Some(Err(e)) => Err(e),
            Some(Ok(Some(status))) => Ok(Some(self.snapshot(
                self.new_order_id(),
                client_order_id,
                symbol,
                status,
            ))),
            Some(Ok(None)) | None => Ok(None),
        }
    }

    async fn cancel_order(&self, symbol: &str, order_id: &str) -> ExchangeResult<OrderSnapshot> {
        self.log(Call::Cancel { order_id: order_id.to_string() });
        let scripted = self.cancel_results.lock().unwrap().pop_front();
        let status = match scripted {
            Some(Err(e)) => return Err(e),
            Some(Ok(status)) => status,
            None => OrderStatus::Canceled,
        };
        Ok(self.snapshot(order_id.to_string(), "fb-unknown", symbol, status))
    }

    async fn get_price(&self, symbol: &str) -> ExchangeResult<Decimal> {
        self.log(Call::Price { symbol: symbol.to_string() });
        self.prices
            .lock()
            .unwrap()
            .get(symbol)
            .copied()
            .ok_or_else(|| ExchangeError::InvalidSymbol(symbol.to_string()))
    }

    async fn get_symbol_rules(&self, symbol: &str) -> ExchangeResult<SymbolRules> {
        self.log(Call::Rules { symbol: symbol.to_string() });
        self.rules
            .lock()
            .unwrap()
            .get(symbol)
            .cloned()
            .ok_or_else(|| ExchangeError::InvalidSymbol(format!("Symbol {} not found", symbol)))
    }

    async fn get_account_balance(&self) -> ExchangeResult<AccountBalance> {
        self.log(Call::Balance);
        Ok(AccountBalance {
            total_wallet_balance: dec!(1000),
            total_unrealized_pnl: Decimal::ZERO,
            total_margin_balance: dec!(1000),
            available_balance: dec!(1000),
        })
    }
}

pub fn btc_rules() -> SymbolRules {
    SymbolRules {
        symbol: "BTCUSDT".to_string(),
        price_tick: dec!(0.1),
        quantity_step: dec!(0.001),
        min_quantity: dec!(0.001),
        min_notional: dec!(5),
        tradable: true,
    }
}

pub fn timeout() -> ExchangeError {
    ExchangeError::Timeout("operation timed out".into())
}

pub fn fast_policy() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 3,
        base_delay: Duration::from_millis(500),
        max_delay: Duration::from_secs(8),
        multiplier: 2,
    }
}

pub struct Harness {
    pub exchange: Arc<ScriptedExchange>,
    pub audit: Arc<MemoryAuditSink>,
    pub pipeline: Arc<OrderPipeline>,
}

pub fn harness(max_order_value: Option<Decimal>) -> Harness {
    harness_with_limiter(max_order_value, RateLimiter::unlimited())
}

pub fn harness_with_limiter(max_order_value: Option<Decimal>, limiter: RateLimiter) -> Harness {
    let exchange = Arc::new(ScriptedExchange::new());
    let audit = Arc::new(MemoryAuditSink::new());
    let executor = RetryingExecutor::new(fast_policy(), Arc::new(limiter));
    let pipeline = OrderPipeline::new(exchange.clone(), executor)
        .with_safety_gate(SafetyGate::new(max_order_value))
        .with_audit_sink(audit.clone());
    Harness {
        exchange,
        audit,
        pipeline: Arc::new(pipeline),
    }
}
