// src/domain/repository/mod.rs
// Interfaces to the collaborators the pipeline consumes

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use crate::domain::errors::{ExchangeError, ExchangeResult, Stage};
use crate::domain::model::{AccountBalance, NormalizedOrder, OrderSnapshot, SymbolRules};

/// Signed transport to the futures exchange
#[async_trait]
pub trait ExchangeRepository: Send + Sync {
    /// Connectivity and credential check
    async fn ping(&self) -> ExchangeResult<()>;

    /// Submit an order tagged with its idempotency key
    async fn place_order(
        &self,
        order: &NormalizedOrder,
        client_order_id: &str,
    ) -> ExchangeResult<OrderSnapshot>;

    async fn get_order(&self, symbol: &str, order_id: &str) -> ExchangeResult<OrderSnapshot>;

    /// Look up an order by the idempotency key it was submitted with.
    /// `Ok(None)` means the exchange positively reports no such order.
    async fn find_order_by_client_id(
        &self,
        symbol: &str,
        client_order_id: &str,
    ) -> ExchangeResult<Option<OrderSnapshot>> {
        let _ = (symbol, client_order_id);
        Err(ExchangeError::Unsupported("client order id lookup".into()))
    }

    async fn cancel_order(&self, symbol: &str, order_id: &str) -> ExchangeResult<OrderSnapshot>;

    async fn get_price(&self, symbol: &str) -> ExchangeResult<Decimal>;

    async fn get_symbol_rules(&self, symbol: &str) -> ExchangeResult<SymbolRules>;

    async fn get_account_balance(&self) -> ExchangeResult<AccountBalance>;
}

/// One stage transition in the pipeline
#[derive(Debug, Clone, Serialize)]
pub struct AuditEntry {
    pub timestamp: DateTime<Utc>,
    pub operation: String,
    pub stage: Stage,
    pub request: serde_json::Value,
    pub outcome: AuditOutcome,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditOutcome {
    Response(serde_json::Value),
    Error(String),
}

impl AuditEntry {
    pub fn response(
        operation: &str,
        stage: Stage,
        request: serde_json::Value,
        response: serde_json::Value,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            operation: operation.to_string(),
            stage,
            request,
            outcome: AuditOutcome::Response(response),
        }
    }

    pub fn error(
        operation: &str,
        stage: Stage,
        request: serde_json::Value,
        error: impl ToString,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            operation: operation.to_string(),
            stage,
            request,
            outcome: AuditOutcome::Error(error.to_string()),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self.outcome, AuditOutcome::Error(_))
    }
}

/// Append-only sink for the audit trail
pub trait AuditSink: Send + Sync {
    fn record(&self, entry: AuditEntry);
}
