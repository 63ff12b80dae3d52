use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

pub type FunnelId = u64;
pub type PageId = u64;
pub type ProductId = u64;

/// Identifier of a node inside a funnel graph.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// The kind of page a funnel step renders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StepType {
    Checkout,
    Upsell,
    Downsell,
    Decision,
    Thankyou,
    SalesPage,
}

impl StepType {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepType::Checkout => "checkout",
            StepType::Upsell => "upsell",
            StepType::Downsell => "downsell",
            StepType::Decision => "decision",
            StepType::Thankyou => "thankyou",
            StepType::SalesPage => "sales-page",
        }
    }

    /// Upsell and downsell steps are shown as accept/reject offers.
    pub fn is_offer(&self) -> bool {
        matches!(self, StepType::Upsell | StepType::Downsell)
    }
}

impl std::fmt::Display for StepType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a discount is derived from a product's catalog price.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DiscountType {
    Fixed,
    Percent,
    FixedSale,
    PercentSale,
}

impl DiscountType {
    /// `*-sale` variants discount from the sale price.
    pub fn is_sale(&self) -> bool {
        matches!(self, DiscountType::FixedSale | DiscountType::PercentSale)
    }

    pub fn is_fixed(&self) -> bool {
        matches!(self, DiscountType::Fixed | DiscountType::FixedSale)
    }
}

/// A product offered by a funnel step together with its discount rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductDiscountSpec {
    pub product_id: ProductId,
    #[serde(default = "default_quantity")]
    pub quantity: u32,
    #[serde(default)]
    pub discount_type: Option<DiscountType>,
    #[serde(default)]
    pub discount_value: Option<f64>,
}

fn default_quantity() -> u32 {
    1
}

impl ProductDiscountSpec {
    pub fn new(product_id: ProductId, quantity: u32) -> Self {
        Self {
            product_id,
            quantity,
            discount_type: None,
            discount_value: None,
        }
    }

    pub fn with_discount(mut self, discount_type: DiscountType, value: f64) -> Self {
        self.discount_type = Some(discount_type);
        self.discount_value = Some(value);
        self
    }

    /// Quantity to use when the stored quantity is zero.
    pub fn effective_quantity(&self) -> u32 {
        self.quantity.max(1)
    }
}

/// A segmentation condition. Opaque to navigation; only the condition
/// evaluator interprets `operator` and `value`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub field: String,
    pub operator: String,
    #[serde(default)]
    pub value: serde_json::Value,
}

impl Condition {
    pub fn new(field: &str, operator: &str, value: serde_json::Value) -> Self {
        Self {
            field: field.to_string(),
            operator: operator.to_string(),
            value,
        }
    }
}

/// Segmentation facts about the current visitor, keyed by condition field.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VisitorFacts {
    values: BTreeMap<String, serde_json::Value>,
}

impl VisitorFacts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: &str, value: serde_json::Value) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: &str, value: serde_json::Value) {
        self.values.insert(key.to_string(), value);
    }

    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.values.get(key)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// One line of the externally owned cart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CartLine {
    pub key: String,
    pub product_id: ProductId,
    pub variation_id: Option<ProductId>,
    pub quantity: u32,
    pub unit_price: f64,
}

impl CartLine {
    /// The id discount specs are matched against: the variation when present.
    pub fn item_id(&self) -> ProductId {
        self.variation_id.unwrap_or(self.product_id)
    }

    pub fn matches(&self, id: ProductId) -> bool {
        self.product_id == id || self.variation_id == Some(id)
    }

    pub fn line_total(&self) -> f64 {
        self.unit_price * self.quantity as f64
    }
}

/// Catalog record for a product or a product variation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    #[serde(default)]
    pub name: String,
    pub regular_price: f64,
    #[serde(default)]
    pub sale_price: Option<f64>,
    /// Set when this record is a variation of another product.
    #[serde(default)]
    pub parent_id: Option<ProductId>,
    #[serde(default = "default_in_stock")]
    pub in_stock: bool,
}

fn default_in_stock() -> bool {
    true
}

impl Product {
    pub fn new(id: ProductId, regular_price: f64) -> Self {
        Self {
            id,
            name: format!("Product {}", id),
            regular_price,
            sale_price: None,
            parent_id: None,
            in_stock: true,
        }
    }

    pub fn with_sale_price(mut self, sale_price: f64) -> Self {
        self.sale_price = Some(sale_price);
        self
    }

    pub fn variation_of(mut self, parent_id: ProductId) -> Self {
        self.parent_id = Some(parent_id);
        self
    }

    /// The price a buyer currently pays without funnel discounts.
    pub fn active_price(&self) -> f64 {
        self.sale_price.unwrap_or(self.regular_price)
    }
}

/// Coupon with optional order-amount gates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Coupon {
    pub code: String,
    #[serde(default)]
    pub minimum_amount: Option<f64>,
    #[serde(default)]
    pub maximum_amount: Option<f64>,
}

/// Per-request state of one offered bump or upsell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BumpSelectionState {
    NotOffered,
    Offered,
    Accepted,
    Rejected,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_type_wire_names() {
        let parsed: StepType = serde_json::from_str("\"sales-page\"").unwrap();
        assert_eq!(parsed, StepType::SalesPage);
        assert_eq!(
            serde_json::to_string(&StepType::Thankyou).unwrap(),
            "\"thankyou\""
        );
        assert!(StepType::Downsell.is_offer());
        assert!(!StepType::Checkout.is_offer());
    }

    #[test]
    fn test_discount_type_flags() {
        let parsed: DiscountType = serde_json::from_str("\"percent-sale\"").unwrap();
        assert!(parsed.is_sale());
        assert!(!parsed.is_fixed());
        assert!(DiscountType::Fixed.is_fixed());
    }

    #[test]
    fn test_spec_defaults_quantity() {
        let spec: ProductDiscountSpec = serde_json::from_str(r#"{"product_id": 5}"#).unwrap();
        assert_eq!(spec.quantity, 1);
        assert!(spec.discount_type.is_none());
        assert!(spec.discount_value.is_none());
    }

    #[test]
    fn test_cart_line_matches_variation() {
        let line = CartLine {
            key: "k".into(),
            product_id: 10,
            variation_id: Some(11),
            quantity: 3,
            unit_price: 2.5,
        };
        assert_eq!(line.item_id(), 11);
        assert!(line.matches(10));
        assert!(line.matches(11));
        assert_eq!(line.line_total(), 7.5);
    }
}
