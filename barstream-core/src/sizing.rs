//! Position sizing on top of the ticker registry.
//!
//! Sizers turn an order's direction into a share quantity. They read prices
//! from the [`TickerRegistry`] and account state through [`PortfolioView`];
//! they never decide whether to trade.

use crate::engine::TickerRegistry;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::{warn, Span};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderAction {
    Bot,
    Sld,
    /// Net the current position to zero.
    Exit,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuggestedOrder {
    pub ticker: String,
    pub action: OrderAction,
    pub quantity: u64,
}

impl SuggestedOrder {
    pub fn new(ticker: impl Into<String>, action: OrderAction) -> Self {
        Self {
            ticker: ticker.into(),
            action,
            quantity: 0,
        }
    }
}

/// Read-only account state needed for sizing.
pub trait PortfolioView {
    fn equity(&self) -> f64;

    /// Signed position: positive long, negative short, zero flat.
    fn position(&self, ticker: &str) -> i64;
}

#[derive(Debug, Error, PartialEq)]
pub enum SizingError {
    #[error("no weight configured for '{ticker}'")]
    MissingWeight { ticker: String },

    #[error("no price known for '{ticker}'")]
    NoPrice { ticker: String },

    #[error("adjusted close for '{ticker}' is not positive: {price}")]
    NonPositivePrice { ticker: String, price: f64 },
}

/// Full liquidation and dollar-weighted rebalance.
///
/// `Exit` orders flatten the current position. `Bot`/`Sld` orders get
/// `floor(weight * equity / adj_close)` shares.
pub struct LiquidateRebalanceSizer {
    weights: BTreeMap<String, f64>,
    span: Span,
}

impl LiquidateRebalanceSizer {
    pub fn new(weights: BTreeMap<String, f64>, span: Span) -> Self {
        Self { weights, span }
    }

    pub fn weight(&self, ticker: &str) -> Option<f64> {
        self.weights.get(ticker).copied()
    }

    pub fn size_order(
        &self,
        portfolio: &dyn PortfolioView,
        registry: &TickerRegistry,
        order: SuggestedOrder,
    ) -> Result<SuggestedOrder, SizingError> {
        if order.action == OrderAction::Exit {
            let current = portfolio.position(&order.ticker);
            let action = if current > 0 {
                OrderAction::Sld
            } else {
                OrderAction::Bot
            };
            return Ok(SuggestedOrder {
                action,
                quantity: current.unsigned_abs(),
                ..order
            });
        }

        let weight = self
            .weight(&order.ticker)
            .ok_or_else(|| SizingError::MissingWeight {
                ticker: order.ticker.clone(),
            })?;
        let price = registry
            .current(&order.ticker)
            .map(|s| s.adj_close)
            .ok_or_else(|| SizingError::NoPrice {
                ticker: order.ticker.clone(),
            })?;
        if price <= 0.0 || !price.is_finite() {
            return Err(SizingError::NonPositivePrice {
                ticker: order.ticker.clone(),
                price,
            });
        }

        let raw = (weight * portfolio.equity() / price).floor();
        let quantity = if raw > 0.0 { raw as u64 } else { 0 };
        if quantity == 0 {
            warn!(
                parent: &self.span,
                ticker = %order.ticker,
                equity = portfolio.equity(),
                price,
                "sized quantity is zero; initial capital may be too low"
            );
        }
        Ok(SuggestedOrder { quantity, ..order })
    }
}
