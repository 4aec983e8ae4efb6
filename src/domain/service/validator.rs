// src/domain/service/validator.rs
// Local, synchronous checks run before an order is formatted

use rust_decimal::Decimal;

use crate::domain::errors::ValidationError;
use crate::domain::model::{OrderKind, OrderRequest, OrderSide, SymbolRules};

#[derive(Debug, Default, Clone)]
pub struct OrderValidator {
    min_quantity: Option<Decimal>,
}

impl OrderValidator {
    pub fn new(min_quantity: Option<Decimal>) -> Self {
        Self {
            min_quantity: min_quantity.filter(|m| *m > Decimal::ZERO),
        }
    }

    /// Check the request field by field; the first failure is returned.
    ///
    /// `rules` is the cached exchange entry for the symbol (`None` when the
    /// exchange does not list it). `market_price` is only consulted for the
    /// trigger side of stop orders.
    pub fn validate(
        &self,
        request: &OrderRequest,
        rules: Option<&SymbolRules>,
        market_price: Decimal,
    ) -> Result<(), ValidationError> {
        self.validate_symbol(&request.symbol, rules)?;

        // Side is a closed enum here; OrderTicket parsing rejects anything else.
        self.validate_quantity(request.quantity)?;

        match request.kind {
            OrderKind::Market => Ok(()),
            OrderKind::Limit { price } => validate_price(price),
            OrderKind::StopLimit { price, stop_price } => {
                validate_price(price)?;
                if stop_price <= Decimal::ZERO {
                    return Err(ValidationError::InvalidStopPrice(stop_price));
                }
                validate_trigger(request.side, stop_price, market_price)
            }
        }
    }

    fn validate_symbol(&self, symbol: &str, rules: Option<&SymbolRules>) -> Result<(), ValidationError> {
        if symbol.is_empty() || !symbol.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(ValidationError::InvalidSymbol(symbol.to_string()));
        }
        match rules {
            Some(rules) if rules.symbol == symbol => {
                if rules.tradable {
                    Ok(())
                } else {
                    Err(ValidationError::NotTradable(symbol.to_string()))
                }
            }
            _ => Err(ValidationError::UnknownSymbol(symbol.to_string())),
        }
    }

    fn validate_quantity(&self, quantity: Decimal) -> Result<(), ValidationError> {
        if quantity <= Decimal::ZERO {
            return Err(ValidationError::InvalidQuantity(quantity));
        }
        if let Some(minimum) = self.min_quantity {
            if quantity < minimum {
                return Err(ValidationError::BelowMinimumQuantity { quantity, minimum });
            }
        }
        Ok(())
    }
}

fn validate_price(price: Decimal) -> Result<(), ValidationError> {
    if price <= Decimal::ZERO {
        return Err(ValidationError::InvalidPrice(price));
    }
    Ok(())
}

/// A buy stop must trigger above the market, a sell stop below it
fn validate_trigger(
    side: OrderSide,
    stop_price: Decimal,
    market_price: Decimal,
) -> Result<(), ValidationError> {
    let (ok, expected) = match side {
        OrderSide::Buy => (stop_price > market_price, "above"),
        OrderSide::Sell => (stop_price < market_price, "below"),
    };
    if ok {
        Ok(())
    } else {
        Err(ValidationError::InvalidTrigger {
            side: side.as_str(),
            stop_price,
            market_price,
            expected,
        })
    }
}
