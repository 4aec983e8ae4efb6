// src/application/usecase/order_pipeline.rs
// Order submission pipeline: validate, format, gate, dispatch, track

use rust_decimal::Decimal;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use crate::application::dto::OrderTicket;
use crate::application::usecase::order_tracker::OrderLifecycleTracker;
use crate::domain::errors::{
    CancelError, ExchangeError, ExecutorError, PipelineError, PipelineResult, Stage, TrackerError,
    ValidationError,
};
use crate::domain::model::{
    AccountBalance, NormalizedOrder, OrderRecord, OrderRequest, OrderSnapshot, OrderStatus,
    SymbolRules,
};
use crate::domain::repository::{AuditEntry, AuditSink, ExchangeRepository};
use crate::domain::service::{OrderValidator, PrecisionFormatter, SafetyGate};
use crate::infrastructure::audit::LogAuditSink;
use crate::infrastructure::retry::RetryingExecutor;

const ACCOUNT: &str = "ACCOUNT";

#[derive(Debug, Clone, Copy, Default)]
pub struct PlaceOptions {
    /// Skip the order value ceiling; only after an explicit operator override
    pub bypass_safety: bool,
}

pub struct OrderPipeline {
    exchange: Arc<dyn ExchangeRepository>,
    executor: RetryingExecutor,
    validator: OrderValidator,
    formatter: PrecisionFormatter,
    safety: SafetyGate,
    tracker: Mutex<OrderLifecycleTracker>,
    // `None` caches "not listed by the exchange"
    rules: RwLock<HashMap<String, Option<SymbolRules>>>,
    audit: Arc<dyn AuditSink>,
}

impl OrderPipeline {
    pub fn new(exchange: Arc<dyn ExchangeRepository>, executor: RetryingExecutor) -> Self {
        Self {
            exchange,
            executor,
            validator: OrderValidator::default(),
            formatter: PrecisionFormatter::new(),
            safety: SafetyGate::disabled(),
            tracker: Mutex::new(OrderLifecycleTracker::new()),
            rules: RwLock::new(HashMap::new()),
            audit: Arc::new(LogAuditSink),
        }
    }

    pub fn with_validator(mut self, validator: OrderValidator) -> Self {
        self.validator = validator;
        self
    }

    pub fn with_safety_gate(mut self, safety: SafetyGate) -> Self {
        self.safety = safety;
        self
    }

    pub fn with_audit_sink(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }

    pub fn safety_gate(&self) -> &SafetyGate {
        &self.safety
    }

    /// Normalize raw operator input, then place it
    pub async fn place_ticket(&self, ticket: OrderTicket, options: PlaceOptions) -> PipelineResult<OrderRecord> {
        let raw = json!({
            "symbol": ticket.symbol,
            "side": ticket.side,
            "quantity": ticket.quantity,
            "price": ticket.price,
            "stop_price": ticket.stop_price,
        });
        let symbol = ticket.symbol.trim().to_uppercase();
        let request = ticket.into_request().map_err(|e| {
            self.audit_error("place_order", Stage::Input, raw.clone(), &e);
            PipelineError::new(Stage::Input, &symbol, e)
        })?;
        self.audit_ok("place_order", Stage::Input, raw, to_json(&request));
        self.place(request, options).await
    }

    /// Run one order through every stage. Failures carry the stage they happened at.
    pub async fn place(&self, request: OrderRequest, options: PlaceOptions) -> PipelineResult<OrderRecord> {
        let symbol = request.symbol.clone();
        let request_json = to_json(&request);

        let rules = self.symbol_rules(&symbol).await?;
        let market_price = match &rules {
            Some(r) if r.tradable => self.current_price(&symbol).await?,
            // Validation rejects the symbol before the price matters
            _ => Decimal::ZERO,
        };

        if let Err(e) = self.validator.validate(&request, rules.as_ref(), market_price) {
            self.audit_error("place_order", Stage::Validation, request_json, &e);
            return Err(PipelineError::new(Stage::Validation, &symbol, e));
        }
        self.audit_ok(
            "place_order",
            Stage::Validation,
            request_json.clone(),
            json!({ "market_price": market_price }),
        );

        // Validation guarantees the rules are present
        let Some(rules) = rules else {
            return Err(PipelineError::new(
                Stage::Validation,
                &symbol,
                ValidationError::UnknownSymbol(symbol.clone()),
            ));
        };

        let order = match self.formatter.format(&request, &rules, market_price) {
            Ok(order) => order,
            Err(e) => {
                self.audit_error("place_order", Stage::Formatting, request_json, &e);
                return Err(PipelineError::new(Stage::Formatting, &symbol, e));
            }
        };
        let order_json = to_json(&order);
        self.audit_ok("place_order", Stage::Formatting, request_json, order_json.clone());

        if options.bypass_safety {
            log::warn!(
                "SAFETY OVERRIDE - ORDER_VALUE: operator bypassed the order value check for {} {} {}",
                order.side,
                order.quantity,
                symbol
            );
            self.audit_ok("place_order", Stage::Safety, order_json.clone(), json!("override"));
        } else {
            match self.safety.check(&order, market_price) {
                Ok(notional) => {
                    self.audit_ok("place_order", Stage::Safety, order_json.clone(), json!({ "notional": notional }))
                }
                Err(e) => {
                    self.audit_error("place_order", Stage::Safety, order_json, &e);
                    return Err(PipelineError::new(Stage::Safety, &symbol, e));
                }
            }
        }

        self.dispatch(order, order_json).await
    }

    async fn dispatch(&self, order: NormalizedOrder, order_json: Value) -> PipelineResult<OrderRecord> {
        let symbol = order.symbol.clone();
        let client_id = new_client_order_id();
        let request_json = json!({ "client_order_id": client_id, "order": order_json });

        self.tracker.lock().await.open(&client_id, &order);

        let result = self
            .executor
            .place_order(self.exchange.as_ref(), &order, &client_id)
            .await;

        let mut tracker = self.tracker.lock().await;
        match result {
            Ok(ack) => {
                self.audit_ok("place_order", Stage::Dispatch, request_json.clone(), to_json(&ack));
                let record = tracker.record(&client_id, &ack).map_err(|e| {
                    self.audit_error("place_order", Stage::Tracking, request_json, &e);
                    PipelineError::new(Stage::Tracking, &symbol, e)
                })?;
                log::info!(
                    "Order {} placed: {} {} {} {} (exchange id {})",
                    client_id,
                    record.side,
                    record.quantity,
                    record.symbol,
                    record.kind,
                    ack.order_id
                );
                Ok(record)
            }
            Err(e) => {
                self.audit_error("place_order", Stage::Dispatch, request_json, &e);
                let closed = match &e {
                    ExecutorError::Final(_) => tracker.reject(&client_id, &e.to_string()),
                    _ => tracker.fail(&client_id, &e.to_string()),
                };
                if let Err(tracking) = closed {
                    log::error!("Could not close order {}: {}", client_id, tracking);
                }
                Err(PipelineError::new(Stage::Dispatch, &symbol, e))
            }
        }
    }

    /// Tracked record, refreshed from the exchange while it is still open
    pub async fn status(&self, id: &str) -> PipelineResult<OrderRecord> {
        let record = self
            .tracker
            .lock()
            .await
            .status(id)
            .map_err(|e| PipelineError::new(Stage::Query, "-", e))?;

        let Some(order_id) = record.exchange_order_id.clone() else {
            return Ok(record);
        };
        if record.status.is_terminal() {
            return Ok(record);
        }

        let snapshot = self.query_exchange_order(&record.symbol, &order_id).await?;
        match self.tracker.lock().await.apply(id, &snapshot) {
            Ok(updated) => Ok(updated),
            Err(TrackerError::IllegalTransition { from, to, .. }) => {
                log::warn!("Ignoring stale status {} for order {} (currently {})", to, id, from);
                Ok(record)
            }
            Err(e) => Err(PipelineError::new(Stage::Tracking, &record.symbol, e)),
        }
    }

    /// Raw exchange view of any order, tracked or not
    pub async fn query_exchange_order(&self, symbol: &str, order_id: &str) -> PipelineResult<OrderSnapshot> {
        let request = json!({ "symbol": symbol, "order_id": order_id });
        let exchange = self.exchange.clone();
        let result = self
            .executor
            .execute("get_order", || {
                let exchange = exchange.clone();
                async move { exchange.get_order(symbol, order_id).await }
            })
            .await;

        match result {
            Ok(snapshot) => {
                self.audit_ok("get_order", Stage::Query, request, to_json(&snapshot));
                Ok(snapshot)
            }
            Err(e) => {
                self.audit_error("get_order", Stage::Query, request, &e);
                Err(PipelineError::new(Stage::Query, symbol, e))
            }
        }
    }

    /// Cancel an open order. Terminal orders are refused without calling the exchange.
    pub async fn cancel(&self, id: &str) -> PipelineResult<OrderRecord> {
        let record = self.tracker.lock().await.check_cancellable(id).map_err(|e| {
            self.audit_error("cancel_order", Stage::Cancel, json!({ "id": id }), &e);
            PipelineError::new(Stage::Cancel, "-", e)
        })?;
        let symbol = record.symbol.clone();
        let request = json!({ "id": id, "symbol": symbol, "order_id": record.exchange_order_id });

        let Some(order_id) = record.exchange_order_id.clone() else {
            let e = CancelError::NotFound(format!("{} (not acknowledged by the exchange)", id));
            self.audit_error("cancel_order", Stage::Cancel, request, &e);
            return Err(PipelineError::new(Stage::Cancel, &symbol, e));
        };

        let result = self
            .executor
            .cancel_order(self.exchange.as_ref(), &symbol, &order_id)
            .await;

        let snapshot = match result {
            Ok(snapshot) => snapshot,
            Err(e) => {
                self.audit_error("cancel_order", Stage::Cancel, request, &e);
                return Err(PipelineError::new(Stage::Cancel, &symbol, CancelError::Exchange(e)));
            }
        };

        let mut tracker = self.tracker.lock().await;
        let outcome = if snapshot.status == OrderStatus::Canceled {
            tracker.cancel(id, &snapshot)
        } else {
            // Finished another way before the cancel landed
            let status = match tracker.apply(id, &snapshot) {
                Ok(updated) => updated.status,
                Err(e) => {
                    log::warn!("Could not apply status {} to order {}: {}", snapshot.status, id, e);
                    snapshot.status
                }
            };
            Err(CancelError::AlreadyTerminal {
                id: id.to_string(),
                status,
            })
        };

        match outcome {
            Ok(updated) => {
                self.audit_ok("cancel_order", Stage::Cancel, request, to_json(&snapshot));
                Ok(updated)
            }
            Err(e) => {
                self.audit_error("cancel_order", Stage::Cancel, request, &e);
                Err(PipelineError::new(Stage::Cancel, &symbol, e))
            }
        }
    }

    pub async fn current_price(&self, symbol: &str) -> PipelineResult<Decimal> {
        let exchange = self.exchange.clone();
        let result = self
            .executor
            .execute("get_price", || {
                let exchange = exchange.clone();
                async move { exchange.get_price(symbol).await }
            })
            .await;

        match result {
            Ok(price) => {
                self.audit_ok("get_price", Stage::MarketPrice, json!({ "symbol": symbol }), json!(price));
                Ok(price)
            }
            Err(e) => {
                self.audit_error("get_price", Stage::MarketPrice, json!({ "symbol": symbol }), &e);
                Err(PipelineError::new(Stage::MarketPrice, symbol, e))
            }
        }
    }

    pub async fn account_balance(&self) -> PipelineResult<AccountBalance> {
        let exchange = self.exchange.clone();
        self.executor
            .execute("get_account_balance", || {
                let exchange = exchange.clone();
                async move { exchange.get_account_balance().await }
            })
            .await
            .map_err(|e| PipelineError::new(Stage::Query, ACCOUNT, e))
    }

    /// Ping plus a signed account read; returns the balance on success
    pub async fn check_connection(&self) -> PipelineResult<AccountBalance> {
        let exchange = self.exchange.clone();
        self.executor
            .execute("ping", || {
                let exchange = exchange.clone();
                async move { exchange.ping().await }
            })
            .await
            .map_err(|e| PipelineError::new(Stage::Query, ACCOUNT, e))?;
        self.account_balance().await
    }

    /// Session orders in submission order
    pub async fn orders(&self) -> Vec<OrderRecord> {
        self.tracker.lock().await.records()
    }

    /// Cached per session; `None` when the exchange does not list the symbol
    async fn symbol_rules(&self, symbol: &str) -> PipelineResult<Option<SymbolRules>> {
        if let Some(cached) = self.rules.read().await.get(symbol) {
            return Ok(cached.clone());
        }

        let exchange = self.exchange.clone();
        let result = self
            .executor
            .execute("get_symbol_rules", || {
                let exchange = exchange.clone();
                async move { exchange.get_symbol_rules(symbol).await }
            })
            .await;

        let rules = match result {
            Ok(rules) => Some(rules),
            Err(ExecutorError::Final(ExchangeError::InvalidSymbol(reason))) => {
                log::warn!("{}", reason);
                None
            }
            Err(e) => {
                self.audit_error("get_symbol_rules", Stage::SymbolRules, json!({ "symbol": symbol }), &e);
                return Err(PipelineError::new(Stage::SymbolRules, symbol, e));
            }
        };

        self.audit_ok(
            "get_symbol_rules",
            Stage::SymbolRules,
            json!({ "symbol": symbol }),
            to_json(&rules),
        );
        self.rules.write().await.insert(symbol.to_string(), rules.clone());
        Ok(rules)
    }

    fn audit_ok(&self, operation: &str, stage: Stage, request: Value, response: Value) {
        self.audit.record(AuditEntry::response(operation, stage, request, response));
    }

    fn audit_error(&self, operation: &str, stage: Stage, request: Value, error: &dyn std::fmt::Display) {
        self.audit.record(AuditEntry::error(operation, stage, request, error));
    }
}

/// Idempotency key sent as `newClientOrderId`
pub fn new_client_order_id() -> String {
    format!("fb-{}", Uuid::new_v4().simple())
}

fn to_json<T: serde::Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or(Value::Null)
}
