//! Discount calculator: a pure function of the catalog price and the rule.

use std::sync::Arc;

use funnel_core::error::{FunnelError, FunnelResult, RecordKind};
use funnel_core::types::{DiscountType, Product, ProductDiscountSpec, ProductId};
use funnel_core::Catalog;
use serde::{Deserialize, Serialize};

/// Result of evaluating one discount rule.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "outcome", content = "price")]
pub enum DiscountOutcome {
    Price(f64),
    /// Neither a type nor a value is configured; the line keeps its price.
    NoOp,
}

impl DiscountOutcome {
    pub fn price(&self) -> Option<f64> {
        match self {
            DiscountOutcome::Price(p) => Some(*p),
            DiscountOutcome::NoOp => None,
        }
    }
}

#[derive(Clone)]
pub struct DiscountCalculator {
    catalog: Arc<dyn Catalog>,
}

impl DiscountCalculator {
    pub fn new(catalog: Arc<dyn Catalog>) -> Self {
        Self { catalog }
    }

    /// Computes the discounted unit price of `product_id`.
    ///
    /// Only `fixed` and `fixed-sale` subtract an amount, so a missing type
    /// with a value present is a percent discount. A missing value with a
    /// type present discounts nothing. Negative values count as zero. The
    /// result never drops below zero.
    pub fn compute(
        &self,
        product_id: ProductId,
        discount_type: Option<DiscountType>,
        discount_value: Option<f64>,
    ) -> FunnelResult<DiscountOutcome> {
        if discount_type.is_none() && discount_value.is_none() {
            return Ok(DiscountOutcome::NoOp);
        }

        let product = self
            .catalog
            .product(product_id)
            .ok_or_else(|| FunnelError::not_found(RecordKind::Product, product_id))?;

        let discount_type = discount_type.unwrap_or(DiscountType::Percent);
        let value = discount_value.unwrap_or(0.0).max(0.0);
        Ok(DiscountOutcome::Price(discounted_price(
            &product,
            discount_type,
            value,
        )))
    }

    pub fn compute_spec(&self, spec: &ProductDiscountSpec) -> FunnelResult<DiscountOutcome> {
        self.compute(spec.product_id, spec.discount_type, spec.discount_value)
    }

    /// The undiscounted price a line shows when no rule applies.
    pub fn catalog_price(&self, product_id: ProductId) -> FunnelResult<f64> {
        self.catalog
            .product(product_id)
            .map(|p| p.active_price())
            .ok_or_else(|| FunnelError::not_found(RecordKind::Product, product_id))
    }
}

impl std::fmt::Debug for DiscountCalculator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiscountCalculator").finish()
    }
}

fn discounted_price(product: &Product, discount_type: DiscountType, value: f64) -> f64 {
    // Sale variants fall back to the regular price when no sale is running.
    let base = if discount_type.is_sale() {
        product.sale_price.unwrap_or(product.regular_price)
    } else {
        product.regular_price
    };

    let reduction = if discount_type.is_fixed() {
        value
    } else {
        base * value / 100.0
    };

    (base - reduction).max(0.0)
}
