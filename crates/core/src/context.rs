//! Request-scoped state threaded through every navigation and pricing call.

use std::collections::BTreeMap;

use crate::collaborators::CartStore;
use crate::types::{BumpSelectionState, ProductId, VisitorFacts};

/// Everything one visitor action may read or accumulate. Built when the
/// request arrives and dropped when the response is sent.
pub struct RequestContext<'a> {
    pub session_id: String,
    pub cart: &'a mut dyn CartStore,
    pub facts: VisitorFacts,
    /// Upsell-scoped prices accepted during this request, by product id.
    pub upsell_prices: BTreeMap<ProductId, f64>,
    /// Selection state per bump id.
    pub bump_states: BTreeMap<String, BumpSelectionState>,
}

impl<'a> RequestContext<'a> {
    pub fn new(session_id: impl Into<String>, cart: &'a mut dyn CartStore) -> Self {
        Self {
            session_id: session_id.into(),
            cart,
            facts: VisitorFacts::new(),
            upsell_prices: BTreeMap::new(),
            bump_states: BTreeMap::new(),
        }
    }

    pub fn with_facts(mut self, facts: VisitorFacts) -> Self {
        self.facts = facts;
        self
    }

    /// Refreshes the cart-derived facts (`cart_total`, `cart_item_quantity`)
    /// from a freshly computed subtotal and the current cart lines.
    pub fn refresh_cart_facts(&mut self, subtotal: f64) {
        let quantity: u64 = self
            .cart
            .get_items()
            .iter()
            .map(|line| line.quantity as u64)
            .sum();
        self.facts.insert("cart_total", serde_json::json!(subtotal));
        self.facts.insert("cart_item_quantity", serde_json::json!(quantity));
    }
}
