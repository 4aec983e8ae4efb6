// src/domain/service/safety.rs
// Order value ceiling

use rust_decimal::Decimal;

use crate::domain::errors::SafetyError;
use crate::domain::model::NormalizedOrder;

#[derive(Debug, Clone, Default)]
pub struct SafetyGate {
    max_order_value: Option<Decimal>,
}

impl SafetyGate {
    /// `None` or a non-positive ceiling disables the gate
    pub fn new(max_order_value: Option<Decimal>) -> Self {
        Self {
            max_order_value: max_order_value.filter(|v| *v > Decimal::ZERO),
        }
    }

    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn is_enabled(&self) -> bool {
        self.max_order_value.is_some()
    }

    pub fn max_order_value(&self) -> Option<Decimal> {
        self.max_order_value
    }

    /// Reject the order when its notional exceeds the ceiling.
    ///
    /// Notional is `quantity × limit price`, or `quantity × current_price` for
    /// market orders. Returns the computed notional when the order passes.
    pub fn check(&self, order: &NormalizedOrder, current_price: Decimal) -> Result<Decimal, SafetyError> {
        let price = order.reference_price(current_price);
        let notional = order
            .quantity
            .checked_mul(price)
            .ok_or(SafetyError::ValueOverflow {
                quantity: order.quantity,
                price,
            })?;

        let Some(limit) = self.max_order_value else {
            return Ok(notional);
        };

        let passed = notional <= limit;
        log::warn!(
            "SAFETY CHECK {} - ORDER_VALUE: Order value: ${:.2}, Max: ${:.2}",
            if passed { "PASSED" } else { "FAILED" },
            notional,
            limit
        );

        if passed {
            Ok(notional)
        } else {
            Err(SafetyError::MaxOrderValueExceeded { notional, limit })
        }
    }
}
