// src/domain/model/mod.rs
// Core domain models for the order pipeline

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::fmt;

/// Exchange trading rules for one symbol, fetched once per session
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SymbolRules {
    pub symbol: String,
    pub price_tick: Decimal,
    pub quantity_step: Decimal,
    pub min_quantity: Decimal,
    pub min_notional: Decimal,
    pub tradable: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderSide::Buy => "BUY",
            OrderSide::Sell => "SELL",
        }
    }
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Order type with the fields each variant requires
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum OrderKind {
    Market,
    Limit { price: Decimal },
    StopLimit { price: Decimal, stop_price: Decimal },
}

impl OrderKind {
    pub fn name(&self) -> &'static str {
        match self {
            OrderKind::Market => "MARKET",
            OrderKind::Limit { .. } => "LIMIT",
            OrderKind::StopLimit { .. } => "STOP_LIMIT",
        }
    }

    /// Limit price, if the order carries one
    pub fn price(&self) -> Option<Decimal> {
        match self {
            OrderKind::Market => None,
            OrderKind::Limit { price } | OrderKind::StopLimit { price, .. } => Some(*price),
        }
    }

    pub fn stop_price(&self) -> Option<Decimal> {
        match self {
            OrderKind::StopLimit { stop_price, .. } => Some(*stop_price),
            _ => None,
        }
    }
}

impl fmt::Display for OrderKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            OrderKind::Market => write!(f, "MARKET"),
            OrderKind::Limit { price } => write!(f, "LIMIT {}", price),
            OrderKind::StopLimit { price, stop_price } => {
                write!(f, "STOP_LIMIT stop={} limit={}", stop_price, price)
            }
        }
    }
}

/// Operator order as it enters the pipeline
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderRequest {
    pub symbol: String,
    pub side: OrderSide,
    pub kind: OrderKind,
    pub quantity: Decimal,
}

/// Order whose quantity and prices sit on the symbol's step/tick grid
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NormalizedOrder {
    pub symbol: String,
    pub side: OrderSide,
    pub kind: OrderKind,
    pub quantity: Decimal,
}

impl NormalizedOrder {
    /// Price used for notional checks: the limit price, or the market price
    pub fn reference_price(&self, market_price: Decimal) -> Decimal {
        self.kind.price().unwrap_or(market_price)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum OrderStatus {
    Pending,
    Submitted,
    PartiallyFilled,
    Filled,
    Canceled,
    Rejected,
    Failed,
}

impl OrderStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Filled | OrderStatus::Canceled | OrderStatus::Rejected | OrderStatus::Failed
        )
    }

    pub fn is_cancellable(&self) -> bool {
        matches!(
            self,
            OrderStatus::Pending | OrderStatus::Submitted | OrderStatus::PartiallyFilled
        )
    }

    /// Whether the lifecycle may move from `self` to `next`.
    /// Staying in the same non-terminal status is allowed (e.g. more partial fills).
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        match (self, next) {
            (Pending, _) => next != Pending,
            (Submitted, Submitted) => true,
            (Submitted, PartiallyFilled | Filled | Canceled | Rejected | Failed) => true,
            (PartiallyFilled, PartiallyFilled | Filled | Canceled) => true,
            _ => false,
        }
    }

    /// Map a raw exchange status string onto the lifecycle
    pub fn from_exchange(status: &str) -> Self {
        match status {
            "NEW" => OrderStatus::Submitted,
            "PARTIALLY_FILLED" => OrderStatus::PartiallyFilled,
            "FILLED" => OrderStatus::Filled,
            "CANCELED" | "EXPIRED" | "EXPIRED_IN_MATCH" => OrderStatus::Canceled,
            "REJECTED" => OrderStatus::Rejected,
            _ => OrderStatus::Submitted,
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            OrderStatus::Pending => "PENDING",
            OrderStatus::Submitted => "SUBMITTED",
            OrderStatus::PartiallyFilled => "PARTIALLY_FILLED",
            OrderStatus::Filled => "FILLED",
            OrderStatus::Canceled => "CANCELED",
            OrderStatus::Rejected => "REJECTED",
            OrderStatus::Failed => "FAILED",
        };
        f.write_str(s)
    }
}

/// Exchange view of an order, returned by placement, query and cancel calls
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderSnapshot {
    pub order_id: String,
    pub client_order_id: Option<String>,
    pub symbol: String,
    pub status: OrderStatus,
    pub raw_status: String,
    pub orig_quantity: Decimal,
    pub executed_quantity: Decimal,
    pub average_price: Option<Decimal>,
    pub updated_at: DateTime<Utc>,
}

/// Session record of one submitted order
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderRecord {
    pub client_request_id: String,
    pub exchange_order_id: Option<String>,
    pub symbol: String,
    pub side: OrderSide,
    pub kind: OrderKind,
    pub quantity: Decimal,
    pub executed_quantity: Decimal,
    pub status: OrderStatus,
    pub failure: Option<String>,
    pub submitted_at: DateTime<Utc>,
    pub last_updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AccountBalance {
    pub total_wallet_balance: Decimal,
    pub total_unrealized_pnl: Decimal,
    pub total_margin_balance: Decimal,
    pub available_balance: Decimal,
}
