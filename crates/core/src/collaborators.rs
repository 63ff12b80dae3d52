//! Capabilities this core consumes but does not own: the cart engine, the
//! product/coupon catalog, segmentation and request-token checks.

use crate::error::{ConditionError, FunnelResult};
use crate::types::{CartLine, Condition, Coupon, Product, ProductId, VisitorFacts};

/// The external cart engine. This core reads lines and requests mutations;
/// it never keeps cart state of its own between calls.
pub trait CartStore {
    /// Current lines in cart order.
    fn get_items(&self) -> Vec<CartLine>;

    /// Adds `quantity` of a product or variation; returns the line key.
    fn add_item(&mut self, product_id: ProductId, quantity: u32) -> FunnelResult<String>;

    fn remove_item(&mut self, line_key: &str) -> FunnelResult<()>;

    fn set_quantity(&mut self, line_key: &str, quantity: u32) -> FunnelResult<()>;

    fn overwrite_price(&mut self, line_key: &str, price: f64) -> FunnelResult<()>;

    fn apply_coupon(&mut self, code: &str) -> FunnelResult<()>;

    fn remove_coupons(&mut self);

    fn applied_coupons(&self) -> Vec<String>;

    /// Finds the line holding `id` as product or variation.
    fn find_line(&self, id: ProductId) -> Option<CartLine> {
        self.get_items().into_iter().find(|line| line.matches(id))
    }

    fn contains_product(&self, id: ProductId) -> bool {
        self.find_line(id).is_some()
    }
}

/// Read-only product and coupon lookup.
pub trait Catalog: Send + Sync {
    fn product(&self, id: ProductId) -> Option<Product>;

    fn coupon(&self, code: &str) -> Option<Coupon>;
}

/// Evaluates a condition list against visitor facts.
pub trait ConditionEvaluator: Send + Sync {
    fn evaluate(
        &self,
        conditions: &[Condition],
        facts: &VisitorFacts,
    ) -> Result<bool, ConditionError>;
}

/// Validates the request-scoped authorization token.
pub trait TokenVerifier: Send + Sync {
    fn verify(&self, session_id: &str, token: &str) -> bool;
}
