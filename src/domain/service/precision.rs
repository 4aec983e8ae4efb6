// src/domain/service/precision.rs
// Rounds order quantities and prices onto the exchange grid

use rust_decimal::{Decimal, RoundingStrategy};

use crate::domain::errors::PrecisionError;
use crate::domain::model::{NormalizedOrder, OrderKind, OrderRequest, SymbolRules};

/// Rounds down to a multiple of `step`. A non-positive step leaves the value as is.
/// `None` when the value does not fit the decimal range on the grid.
pub fn floor_to_step(value: Decimal, step: Decimal) -> Option<Decimal> {
    if step <= Decimal::ZERO {
        return Some(value);
    }
    let steps = value.checked_div(step)?.floor();
    Some(steps.checked_mul(step)?.normalize())
}

/// Rounds half away from zero to a multiple of `tick`
pub fn round_to_tick(value: Decimal, tick: Decimal) -> Option<Decimal> {
    if tick <= Decimal::ZERO {
        return Some(value);
    }
    let ticks = value
        .checked_div(tick)?
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero);
    Some(ticks.checked_mul(tick)?.normalize())
}

#[derive(Debug, Default, Clone, Copy)]
pub struct PrecisionFormatter;

impl PrecisionFormatter {
    pub fn new() -> Self {
        Self
    }

    /// Produce the order that will actually be sent.
    ///
    /// Quantity is floored to `quantity_step` so the operator never gets more than
    /// asked for; prices are rounded to the nearest `price_tick`. `market_price`
    /// is the reference for the minimum-notional check of market orders.
    pub fn format(
        &self,
        request: &OrderRequest,
        rules: &SymbolRules,
        market_price: Decimal,
    ) -> Result<NormalizedOrder, PrecisionError> {
        let quantity = floor_to_step(request.quantity, rules.quantity_step).ok_or(
            PrecisionError::OutOfRange {
                field: "quantity",
                value: request.quantity,
            },
        )?;
        if quantity <= Decimal::ZERO {
            return Err(PrecisionError::ZeroQuantity {
                quantity: request.quantity,
                step: rules.quantity_step,
            });
        }
        if rules.min_quantity > Decimal::ZERO && quantity < rules.min_quantity {
            return Err(PrecisionError::BelowMinQuantity {
                quantity,
                minimum: rules.min_quantity,
            });
        }

        let kind = match request.kind {
            OrderKind::Market => OrderKind::Market,
            OrderKind::Limit { price } => OrderKind::Limit {
                price: self.format_price(price, rules)?,
            },
            OrderKind::StopLimit { price, stop_price } => OrderKind::StopLimit {
                price: self.format_price(price, rules)?,
                stop_price: self.format_price(stop_price, rules)?,
            },
        };

        let order = NormalizedOrder {
            symbol: request.symbol.clone(),
            side: request.side,
            kind,
            quantity,
        };

        let price = order.reference_price(market_price);
        let notional = order
            .quantity
            .checked_mul(price)
            .ok_or(PrecisionError::NotionalOverflow {
                quantity: order.quantity,
                price,
            })?;
        if rules.min_notional > Decimal::ZERO && notional < rules.min_notional {
            return Err(PrecisionError::BelowMinNotional {
                notional,
                minimum: rules.min_notional,
            });
        }

        Ok(order)
    }

    fn format_price(&self, price: Decimal, rules: &SymbolRules) -> Result<Decimal, PrecisionError> {
        let rounded = round_to_tick(price, rules.price_tick).ok_or(PrecisionError::OutOfRange {
            field: "price",
            value: price,
        })?;
        if rounded <= Decimal::ZERO {
            return Err(PrecisionError::ZeroPrice {
                price,
                tick: rules.price_tick,
            });
        }
        Ok(rounded)
    }
}
