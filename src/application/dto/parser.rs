// src/application/dto/parser.rs
// Parsers for futures REST payloads

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde_json::Value;
use std::str::FromStr;

use super::{ApiErrorBody, ExchangeInfoResponse, FuturesOrderResponse, MarkPriceResponse, TickerPriceResponse};
use crate::domain::errors::{ExchangeError, ExchangeResult};
use crate::domain::model::{AccountBalance, OrderSnapshot, OrderStatus, SymbolRules};

fn parse_decimal(value: &str, field: &str) -> ExchangeResult<Decimal> {
    Decimal::from_str(value)
        .map_err(|e| ExchangeError::Decode(format!("Failed to parse {} '{}': {}", field, value, e)))
}

fn parse_optional(value: Option<&str>, field: &str) -> ExchangeResult<Decimal> {
    match value {
        Some(v) if !v.is_empty() => parse_decimal(v, field),
        _ => Ok(Decimal::ZERO),
    }
}

impl FuturesOrderResponse {
    pub fn into_snapshot(self) -> ExchangeResult<OrderSnapshot> {
        let executed_quantity = parse_optional(self.executed_qty.as_deref(), "executedQty")?;
        let average_price = parse_optional(self.avg_price.as_deref(), "avgPrice")?;
        let updated_at = self
            .update_time
            .and_then(DateTime::<Utc>::from_timestamp_millis)
            .unwrap_or_else(Utc::now);

        Ok(OrderSnapshot {
            order_id: self.order_id.to_string(),
            client_order_id: self.client_order_id,
            symbol: self.symbol,
            status: OrderStatus::from_exchange(&self.status),
            raw_status: self.status,
            orig_quantity: parse_optional(self.orig_qty.as_deref(), "origQty")?,
            executed_quantity,
            average_price: (average_price > Decimal::ZERO).then_some(average_price),
            updated_at,
        })
    }
}

pub fn parse_order(body: &str) -> ExchangeResult<OrderSnapshot> {
    let response: FuturesOrderResponse = serde_json::from_str(body)
        .map_err(|e| ExchangeError::Decode(format!("Failed to parse order response: {}", e)))?;
    response.into_snapshot()
}

/// Extract one symbol's trading rules from an exchange info payload
pub fn parse_symbol_rules(body: &str, symbol: &str) -> ExchangeResult<SymbolRules> {
    let info: ExchangeInfoResponse = serde_json::from_str(body)
        .map_err(|e| ExchangeError::Decode(format!("Failed to parse exchange info: {}", e)))?;

    let entry = info
        .symbols
        .into_iter()
        .find(|s| s.symbol == symbol)
        .ok_or_else(|| ExchangeError::InvalidSymbol(format!("Symbol {} not found in exchange info", symbol)))?;

    let filter = |kind: &str| entry.filters.iter().find(|f| f["filterType"] == kind);
    let field = |f: Option<&Value>, name: &str| -> ExchangeResult<Decimal> {
        match f.and_then(|f| f[name].as_str()) {
            Some(v) => parse_decimal(v, name),
            None => Ok(Decimal::ZERO),
        }
    };

    let price_filter = filter("PRICE_FILTER");
    let lot_size = filter("LOT_SIZE");
    let min_notional = filter("MIN_NOTIONAL");

    Ok(SymbolRules {
        symbol: entry.symbol.clone(),
        price_tick: field(price_filter, "tickSize")?.normalize(),
        quantity_step: field(lot_size, "stepSize")?.normalize(),
        min_quantity: field(lot_size, "minQty")?.normalize(),
        min_notional: field(min_notional, "notional")?.normalize(),
        tradable: entry.status == "TRADING",
    })
}

pub fn parse_ticker_price(body: &str) -> ExchangeResult<Decimal> {
    let ticker: TickerPriceResponse = serde_json::from_str(body)
        .map_err(|e| ExchangeError::Decode(format!("Failed to parse ticker: {}", e)))?;
    parse_decimal(&ticker.price, "price")
}

pub fn parse_mark_price(body: &str) -> ExchangeResult<Decimal> {
    let mark: MarkPriceResponse = serde_json::from_str(body)
        .map_err(|e| ExchangeError::Decode(format!("Failed to parse mark price: {}", e)))?;
    parse_decimal(&mark.mark_price, "markPrice")
}

/// Account summary, falling back through the older field names
pub fn parse_account_balance(body: &str) -> ExchangeResult<AccountBalance> {
    let account: Value = serde_json::from_str(body)
        .map_err(|e| ExchangeError::Decode(format!("Failed to parse account: {}", e)))?;

    let first = |names: &[&str]| -> ExchangeResult<Decimal> {
        names
            .iter()
            .find_map(|name| account[*name].as_str().map(|v| (*name, v)))
            .map(|(name, v)| parse_decimal(v, name))
            .unwrap_or(Ok(Decimal::ZERO))
    };

    Ok(AccountBalance {
        total_wallet_balance: first(&["totalWalletBalance", "balance"])?,
        total_unrealized_pnl: first(&["totalUnrealizedProfit", "totalUnrealizedPnl"])?,
        total_margin_balance: first(&["totalMarginBalance", "totalWalletBalance", "balance"])?,
        available_balance: first(&["availableBalance", "totalWalletBalance", "balance"])?,
    })
}

/// Binance error body `{"code": -2013, "msg": "..."}`
pub fn parse_api_error(body: &str) -> Option<ApiErrorBody> {
    serde_json::from_str(body).ok()
}
