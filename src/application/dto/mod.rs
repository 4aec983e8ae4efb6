// src/application/dto/mod.rs
// Data transfer objects: raw operator input and exchange payloads

pub mod parser;

use rust_decimal::Decimal;
use serde::Deserialize;
use std::str::FromStr;

use crate::domain::errors::ValidationError;
use crate::domain::model::{OrderKind, OrderRequest, OrderSide};

/// Order fields exactly as the operator typed them
#[derive(Debug, Clone, Default)]
pub struct OrderTicket {
    pub symbol: String,
    pub side: String,
    pub quantity: String,
    pub price: Option<String>,
    pub stop_price: Option<String>,
}

impl OrderTicket {
    pub fn market(symbol: &str, side: &str, quantity: &str) -> Self {
        Self {
            symbol: symbol.to_string(),
            side: side.to_string(),
            quantity: quantity.to_string(),
            ..Default::default()
        }
    }

    pub fn limit(symbol: &str, side: &str, quantity: &str, price: &str) -> Self {
        Self {
            price: Some(price.to_string()),
            ..Self::market(symbol, side, quantity)
        }
    }

    pub fn stop_limit(symbol: &str, side: &str, quantity: &str, stop_price: &str, price: &str) -> Self {
        Self {
            price: Some(price.to_string()),
            stop_price: Some(stop_price.to_string()),
            ..Self::market(symbol, side, quantity)
        }
    }

    /// Normalize the raw fields into a typed request.
    /// The order type follows from which prices are present.
    pub fn into_request(self) -> Result<OrderRequest, ValidationError> {
        let symbol = normalize_symbol(&self.symbol)?;
        let side = parse_side(&self.side)?;
        let quantity = parse_decimal("quantity", &self.quantity)?;

        let kind = match (self.price, self.stop_price) {
            (None, None) => OrderKind::Market,
            (Some(price), None) => OrderKind::Limit {
                price: parse_decimal("price", &price)?,
            },
            (Some(price), Some(stop_price)) => OrderKind::StopLimit {
                price: parse_decimal("price", &price)?,
                stop_price: parse_decimal("stop_price", &stop_price)?,
            },
            (None, Some(stop_price)) => {
                return Err(ValidationError::InvalidNumber {
                    field: "price",
                    value: format!("missing limit price for stop {}", stop_price.trim()),
                })
            }
        };

        Ok(OrderRequest {
            symbol,
            side,
            kind,
            quantity,
        })
    }
}

/// Uppercase, trim, and quote in USDT when no quote asset was given
pub fn normalize_symbol(raw: &str) -> Result<String, ValidationError> {
    let mut symbol = raw.trim().to_uppercase();
    if symbol.is_empty() || !symbol.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(ValidationError::InvalidSymbol(raw.to_string()));
    }
    if !symbol.ends_with("USDT") {
        symbol.push_str("USDT");
    }
    Ok(symbol)
}

pub fn parse_side(raw: &str) -> Result<OrderSide, ValidationError> {
    match raw.trim().to_uppercase().as_str() {
        "BUY" => Ok(OrderSide::Buy),
        "SELL" => Ok(OrderSide::Sell),
        other => Err(ValidationError::InvalidSide(other.to_string())),
    }
}

pub fn parse_decimal(field: &'static str, raw: &str) -> Result<Decimal, ValidationError> {
    Decimal::from_str(raw.trim()).map_err(|_| ValidationError::InvalidNumber {
        field,
        value: raw.to_string(),
    })
}

/// `/fapi/v1/order` response (place, query and cancel share the shape)
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FuturesOrderResponse {
    pub order_id: u64,
    pub symbol: String,
    pub status: String,
    pub client_order_id: Option<String>,
    pub orig_qty: Option<String>,
    pub executed_qty: Option<String>,
    pub avg_price: Option<String>,
    pub update_time: Option<i64>,
}

/// `/fapi/v1/exchangeInfo` response, reduced to what the pipeline needs
#[derive(Debug, Clone, Deserialize)]
pub struct ExchangeInfoResponse {
    pub symbols: Vec<SymbolInfo>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SymbolInfo {
    pub symbol: String,
    pub status: String,
    pub filters: Vec<serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TickerPriceResponse {
    pub symbol: String,
    pub price: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkPriceResponse {
    pub symbol: String,
    pub mark_price: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorBody {
    pub code: i64,
    pub msg: String,
}
