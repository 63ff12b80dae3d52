//! Price application pipeline.
//!
//! Every recalculation event (page render, quantity change, upsell accept,
//! order validation) funnels through [`PricePipeline::apply`]. Prices are
//! always derived from catalog prices and the merged spec set, never from
//! the line's current price, so running the pipeline again on an unchanged
//! cart yields the same result.

use std::collections::BTreeMap;
use std::sync::Arc;

use funnel_core::error::FunnelResult;
use funnel_core::types::{CartLine, ProductDiscountSpec, ProductId};
use funnel_core::{Catalog, RequestContext};
use funnel_journey::FunnelNode;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::calculator::{DiscountCalculator, DiscountOutcome};
use crate::coupons::{AutoCouponReport, CouponGates};

/// Where a price rule came from. Later sources override earlier ones for
/// the same product.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpecSource {
    Funnel,
    Bump,
    Upsell,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PriceRule {
    Discount(ProductDiscountSpec),
    /// A price already settled during this request, such as an accepted upsell.
    Fixed(f64),
}

/// Price rules keyed by product or variation id.
#[derive(Debug, Clone, Default)]
pub struct SpecSet {
    rules: BTreeMap<ProductId, (SpecSource, PriceRule)>,
}

impl SpecSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, source: SpecSource, spec: ProductDiscountSpec) {
        self.rules
            .insert(spec.product_id, (source, PriceRule::Discount(spec)));
    }

    pub fn insert_price(&mut self, product_id: ProductId, price: f64) {
        self.rules
            .insert(product_id, (SpecSource::Upsell, PriceRule::Fixed(price)));
    }

    /// Merges funnel specs, bump specs and upsell prices, in increasing
    /// precedence.
    pub fn merge(
        funnel: &[ProductDiscountSpec],
        bumps: &[ProductDiscountSpec],
        upsell_prices: &BTreeMap<ProductId, f64>,
    ) -> Self {
        let mut set = Self::new();
        for spec in funnel {
            set.insert(SpecSource::Funnel, spec.clone());
        }
        for spec in bumps {
            set.insert(SpecSource::Bump, spec.clone());
        }
        for (product_id, price) in upsell_prices {
            set.insert_price(*product_id, *price);
        }
        set
    }

    /// Rules of a checkout step: its product list and the first product of
    /// every bump, plus prices accepted earlier in the request.
    pub fn for_checkout(
        checkout: Option<&FunnelNode>,
        upsell_prices: &BTreeMap<ProductId, f64>,
    ) -> Self {
        let (funnel, bumps): (Vec<ProductDiscountSpec>, Vec<ProductDiscountSpec>) = match checkout {
            Some(node) => (
                node.product_specs().to_vec(),
                node.data
                    .bumps
                    .iter()
                    .filter_map(|b| b.product().cloned())
                    .collect(),
            ),
            None => (Vec::new(), Vec::new()),
        };
        Self::merge(&funnel, &bumps, upsell_prices)
    }

    /// The variation id is tried before the parent product id.
    pub fn rule_for(&self, line: &CartLine) -> Option<&(SpecSource, PriceRule)> {
        line.variation_id
            .and_then(|v| self.rules.get(&v))
            .or_else(|| self.rules.get(&line.product_id))
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdjustedItem {
    pub line_key: String,
    pub product_id: ProductId,
    pub quantity: u32,
    pub unit_price: f64,
    pub source: SpecSource,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceComputationResult {
    pub subtotal: f64,
    pub adjusted_items: Vec<AdjustedItem>,
    #[serde(skip)]
    pub gates: CouponGates,
}

/// Outcome of a recalculation triggered by a cart edit.
#[derive(Debug, Clone, PartialEq)]
pub struct Recalculation {
    pub pricing: PriceComputationResult,
    pub coupons: AutoCouponReport,
}

#[derive(Clone)]
pub struct PricePipeline {
    calculator: DiscountCalculator,
    catalog: Arc<dyn Catalog>,
}

impl PricePipeline {
    pub fn new(catalog: Arc<dyn Catalog>) -> Self {
        Self {
            calculator: DiscountCalculator::new(catalog.clone()),
            catalog,
        }
    }

    pub fn calculator(&self) -> &DiscountCalculator {
        &self.calculator
    }

    pub fn catalog(&self) -> &dyn Catalog {
        self.catalog.as_ref()
    }

    /// Overwrites the price of every line a rule matches, recomputes the
    /// subtotal and derives fresh coupon gates. Prices are computed for all
    /// lines before any is written, so a failing lookup leaves the cart
    /// untouched.
    pub fn apply(
        &self,
        ctx: &mut RequestContext<'_>,
        specs: &SpecSet,
    ) -> FunnelResult<PriceComputationResult> {
        let mut adjusted_items = Vec::new();
        for line in ctx.cart.get_items() {
            let Some((source, rule)) = specs.rule_for(&line) else {
                continue;
            };
            let unit_price = match rule {
                PriceRule::Fixed(price) => (*price).max(0.0),
                // A parent's rule prices the variation from its own catalog record.
                PriceRule::Discount(spec) => match self.calculator.compute(
                    line.item_id(),
                    spec.discount_type,
                    spec.discount_value,
                )? {
                    DiscountOutcome::Price(price) => price,
                    DiscountOutcome::NoOp => continue,
                },
            };
            adjusted_items.push(AdjustedItem {
                line_key: line.key.clone(),
                product_id: line.item_id(),
                quantity: line.quantity,
                unit_price,
                source: *source,
            });
        }

        for item in &adjusted_items {
            ctx.cart.overwrite_price(&item.line_key, item.unit_price)?;
        }

        let subtotal: f64 = ctx.cart.get_items().iter().map(CartLine::line_total).sum();
        ctx.refresh_cart_facts(subtotal);

        metrics::counter!("funnel.pricing.applied").increment(1);
        debug!(
            session_id = %ctx.session_id,
            rules = specs.len(),
            adjusted = adjusted_items.len(),
            subtotal,
            "Prices applied"
        );

        Ok(PriceComputationResult {
            subtotal,
            adjusted_items,
            gates: CouponGates::new(subtotal),
        })
    }

    /// Full recalculation for a checkout step, including upsell prices
    /// accepted earlier in the request.
    pub fn recalculate(
        &self,
        ctx: &mut RequestContext<'_>,
        checkout: Option<&FunnelNode>,
    ) -> FunnelResult<PriceComputationResult> {
        let specs = SpecSet::for_checkout(checkout, &ctx.upsell_prices);
        self.apply(ctx, &specs)
    }

    /// Recalculation after the cart changed: reprice, then re-apply the
    /// checkout's auto-apply coupons against the new gates.
    pub fn after_cart_edit(
        &self,
        ctx: &mut RequestContext<'_>,
        checkout: Option<&FunnelNode>,
    ) -> FunnelResult<Recalculation> {
        let pricing = self.recalculate(ctx, checkout)?;
        let codes = checkout
            .and_then(|node| node.data.optimization.as_ref())
            .map(|o| o.auto_apply_coupons.as_slice())
            .unwrap_or(&[]);
        let coupons = pricing
            .gates
            .reapply_auto_coupons(ctx.cart, self.catalog.as_ref(), codes);
        Ok(Recalculation { pricing, coupons })
    }
}

impl std::fmt::Debug for PricePipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PricePipeline").finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use funnel_core::error::{FunnelError, RecordKind};
    use funnel_core::memory::{InMemoryCart, InMemoryCatalog};
    use funnel_core::types::{Coupon, DiscountType, Product};
    use funnel_core::CartStore;
    use funnel_journey::boundary::parse_funnels;

    fn catalog() -> Arc<InMemoryCatalog> {
        Arc::new(
            InMemoryCatalog::new()
                .with_product(Product::new(100, 50.0))
                .with_product(Product::new(5, 20.0))
                .with_product(Product::new(7, 40.0))
                .with_product(Product::new(8, 30.0))
                .with_product(Product::new(81, 36.0).variation_of(8))
                .with_coupon(Coupon {
                    code: "OVER100".into(),
                    minimum_amount: Some(100.0),
                    maximum_amount: None,
                }),
        )
    }

    fn fixed(product_id: ProductId, value: f64) -> ProductDiscountSpec {
        ProductDiscountSpec::new(product_id, 1).with_discount(DiscountType::Fixed, value)
    }

    fn checkout_node() -> FunnelNode {
        let raw = r#"[{
            "id": 1,
            "nodes": [
                {"id": "c", "type": "checkout", "page_id": 10, "targets": [{"nodeId": "t"}],
                 "data": {
                    "products": {"list": [{"product_id": 100, "quantity": 2, "discount_type": "fixed", "discount_value": 10}]},
                    "bumps": [{"id": "b1", "products": {"list": [
                        {"product_id": 5, "discount_type": "percent", "discount_value": 50},
                        {"product_id": 7, "discount_type": "percent", "discount_value": 50}
                    ]}}],
                    "optimization": {"auto_apply_coupons": ["OVER100"]}
                 }},
                {"id": "t", "type": "thankyou", "page_id": 11}
            ]
        }]"#;
        parse_funnels(raw).unwrap().remove(0).nodes.remove(0)
    }

    #[test]
    fn test_fixed_discount_subtotal() {
        let catalog = catalog();
        let pipeline = PricePipeline::new(catalog.clone());
        let mut cart = InMemoryCart::new(catalog);
        cart.add_item(100, 2).unwrap();

        let mut ctx = RequestContext::new("s", &mut cart);
        let specs = SpecSet::merge(&[fixed(100, 10.0)], &[], &BTreeMap::new());
        let result = pipeline.apply(&mut ctx, &specs).unwrap();

        assert_eq!(result.subtotal, 80.0);
        assert_eq!(result.adjusted_items.len(), 1);
        assert_eq!(result.adjusted_items[0].unit_price, 40.0);
        assert_eq!(ctx.facts.get("cart_total"), Some(&serde_json::json!(80.0)));
    }

    #[test]
    fn test_apply_is_idempotent() {
        let catalog = catalog();
        let pipeline = PricePipeline::new(catalog.clone());
        let mut cart = InMemoryCart::new(catalog);
        cart.add_item(100, 2).unwrap();
        cart.add_item(7, 1).unwrap();

        let mut ctx = RequestContext::new("s", &mut cart);
        let specs = SpecSet::merge(
            &[fixed(100, 10.0)],
            &[ProductDiscountSpec::new(7, 1).with_discount(DiscountType::Percent, 25.0)],
            &BTreeMap::new(),
        );
        let first = pipeline.apply(&mut ctx, &specs).unwrap();
        let second = pipeline.apply(&mut ctx, &specs).unwrap();
        let third = pipeline.apply(&mut ctx, &specs).unwrap();

        assert_eq!(first, second);
        assert_eq!(second, third);
        assert_eq!(first.subtotal, 110.0);
    }

    #[test]
    fn test_unmatched_lines_keep_price() {
        let catalog = catalog();
        let pipeline = PricePipeline::new(catalog.clone());
        let mut cart = InMemoryCart::new(catalog);
        cart.add_item(5, 1).unwrap();
        let key = cart.add_item(7, 1).unwrap();
        cart.overwrite_price(&key, 33.0).unwrap();

        let mut ctx = RequestContext::new("s", &mut cart);
        let specs = SpecSet::merge(&[fixed(5, 5.0)], &[], &BTreeMap::new());
        let result = pipeline.apply(&mut ctx, &specs).unwrap();
        assert_eq!(result.subtotal, 15.0 + 33.0);
    }

    #[test]
    fn test_precedence() {
        let upsell = BTreeMap::from([(7, 12.0)]);
        let specs = SpecSet::merge(
            &[fixed(7, 1.0), fixed(5, 1.0)],
            &[fixed(7, 2.0), fixed(5, 3.0)],
            &upsell,
        );
        let line = |product_id| CartLine {
            key: "k".into(),
            product_id,
            variation_id: None,
            quantity: 1,
            unit_price: 0.0,
        };
        assert_eq!(specs.rule_for(&line(7)), Some(&(SpecSource::Upsell, PriceRule::Fixed(12.0))));
        assert_eq!(
            specs.rule_for(&line(5)),
            Some(&(SpecSource::Bump, PriceRule::Discount(fixed(5, 3.0))))
        );
    }

    #[test]
    fn test_variation_matching() {
        let catalog = catalog();
        let pipeline = PricePipeline::new(catalog.clone());
        let mut cart = InMemoryCart::new(catalog);
        cart.add_item(81, 1).unwrap();

        let mut ctx = RequestContext::new("s", &mut cart);
        let by_variation = SpecSet::merge(&[fixed(81, 6.0), fixed(8, 1.0)], &[], &BTreeMap::new());
        assert_eq!(pipeline.apply(&mut ctx, &by_variation).unwrap().subtotal, 30.0);

        let by_parent = SpecSet::merge(&[fixed(8, 1.0)], &[], &BTreeMap::new());
        let result = pipeline.apply(&mut ctx, &by_parent).unwrap();
        assert_eq!(result.subtotal, 35.0);
        assert_eq!(result.adjusted_items[0].product_id, 81);
    }

    #[test]
    fn test_noop_spec_leaves_line() {
        let catalog = catalog();
        let pipeline = PricePipeline::new(catalog.clone());
        let mut cart = InMemoryCart::new(catalog);
        cart.add_item(100, 1).unwrap();

        let mut ctx = RequestContext::new("s", &mut cart);
        let specs = SpecSet::merge(&[ProductDiscountSpec::new(100, 1)], &[], &BTreeMap::new());
        let result = pipeline.apply(&mut ctx, &specs).unwrap();
        assert!(result.adjusted_items.is_empty());
        assert_eq!(result.subtotal, 50.0);
    }

    #[test]
    fn test_failed_lookup_leaves_cart_untouched() {
        let full = catalog();
        let mut cart = InMemoryCart::new(full.clone());
        cart.add_item(100, 1).unwrap();
        cart.add_item(5, 1).unwrap();

        // Pipeline backed by a catalog that lacks product 5.
        let partial = Arc::new(InMemoryCatalog::new().with_product(Product::new(100, 50.0)));
        let pipeline = PricePipeline::new(partial);
        let mut ctx = RequestContext::new("s", &mut cart);
        let specs = SpecSet::merge(&[fixed(100, 10.0), fixed(5, 1.0)], &[], &BTreeMap::new());

        let err = pipeline.apply(&mut ctx, &specs).unwrap_err();
        assert!(matches!(err, FunnelError::NotFound { kind: RecordKind::Product, .. }));
        assert_eq!(cart.get_items()[0].unit_price, 50.0);
    }

    #[test]
    fn test_checkout_specs_and_auto_coupons() {
        let catalog = catalog();
        let pipeline = PricePipeline::new(catalog.clone());
        let node = checkout_node();
        let mut cart = InMemoryCart::new(catalog);
        cart.add_item(100, 2).unwrap();

        let mut ctx = RequestContext::new("s", &mut cart);
        let below = pipeline.after_cart_edit(&mut ctx, Some(&node)).unwrap();
        assert_eq!(below.pricing.subtotal, 80.0);
        assert_eq!(below.coupons.skipped, vec!["OVER100".to_string()]);

        // Only the first product of a bump is priced.
        ctx.cart.add_item(5, 1).unwrap();
        ctx.cart.add_item(7, 1).unwrap();
        let above = pipeline.after_cart_edit(&mut ctx, Some(&node)).unwrap();
        assert_eq!(above.pricing.subtotal, 80.0 + 10.0 + 40.0);
        assert_eq!(above.coupons.applied, vec!["OVER100".to_string()]);
        assert_eq!(ctx.cart.applied_coupons(), vec!["OVER100".to_string()]);

        // Gates are derived again after the cart shrinks.
        let key = ctx.cart.find_line(7).unwrap().key;
        ctx.cart.remove_item(&key).unwrap();
        let again = pipeline.after_cart_edit(&mut ctx, Some(&node)).unwrap();
        assert_eq!(again.pricing.subtotal, 90.0);
        assert!(ctx.cart.applied_coupons().is_empty());
    }

    #[test]
    fn test_repeated_hooks_match_single_pass() {
        let catalog = catalog();
        let pipeline = PricePipeline::new(catalog.clone());
        let node = checkout_node();

        let mut once = InMemoryCart::new(catalog.clone());
        once.add_item(100, 2).unwrap();
        once.add_item(5, 3).unwrap();
        let mut many = once.clone();

        let mut ctx = RequestContext::new("a", &mut once);
        let single = pipeline.after_cart_edit(&mut ctx, Some(&node)).unwrap();

        let mut ctx = RequestContext::new("b", &mut many);
        let mut last = None;
        for _ in 0..4 {
            pipeline.recalculate(&mut ctx, Some(&node)).unwrap();
            last = Some(pipeline.after_cart_edit(&mut ctx, Some(&node)).unwrap());
        }
        let last = last.unwrap();

        assert_eq!(single.pricing, last.pricing);
        assert_eq!(single.coupons, last.coupons);
        assert_eq!(once.applied_coupons(), many.applied_coupons());
        assert_eq!(once.get_items(), many.get_items());
    }

    #[test]
    fn test_upsell_price_applies_last() {
        let catalog = catalog();
        let pipeline = PricePipeline::new(catalog.clone());
        let node = checkout_node();
        let mut cart = InMemoryCart::new(catalog);
        cart.add_item(5, 1).unwrap();

        let mut ctx = RequestContext::new("s", &mut cart);
        ctx.upsell_prices.insert(5, 4.5);
        let result = pipeline.recalculate(&mut ctx, Some(&node)).unwrap();
        assert_eq!(result.subtotal, 4.5);
        assert_eq!(result.adjusted_items[0].source, SpecSource::Upsell);
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        const PRODUCTS: [ProductId; 5] = [100, 5, 7, 8, 81];

        fn cart_lines() -> impl Strategy<Value = Vec<(ProductId, u32)>> {
            proptest::collection::vec((proptest::sample::select(PRODUCTS.to_vec()), 1u32..5), 0..6)
        }

        fn spec() -> impl Strategy<Value = ProductDiscountSpec> {
            let kind = proptest::option::of(prop_oneof![
                Just(DiscountType::Fixed),
                Just(DiscountType::FixedSale),
                Just(DiscountType::Percent),
                Just(DiscountType::PercentSale),
            ]);
            (
                proptest::sample::select(PRODUCTS.to_vec()),
                kind,
                proptest::option::of(0.0f64..120.0),
            )
                .prop_map(|(product_id, discount_type, discount_value)| ProductDiscountSpec {
                    product_id,
                    quantity: 1,
                    discount_type,
                    discount_value,
                })
        }

        fn spec_set() -> impl Strategy<Value = SpecSet> {
            (
                proptest::collection::vec(spec(), 0..5),
                proptest::collection::vec(spec(), 0..3),
                proptest::collection::btree_map(proptest::sample::select(PRODUCTS.to_vec()), 0.0f64..60.0, 0..2),
            )
                .prop_map(|(funnel, bumps, upsell)| SpecSet::merge(&funnel, &bumps, &upsell))
        }

        fn fill(lines: &[(ProductId, u32)]) -> InMemoryCart {
            let mut cart = InMemoryCart::new(catalog());
            for (product_id, quantity) in lines {
                cart.add_item(*product_id, *quantity).unwrap();
            }
            cart
        }

        proptest! {
            #[test]
            fn property_apply_is_idempotent(lines in cart_lines(), specs in spec_set()) {
                let pipeline = PricePipeline::new(catalog());
                let mut cart = fill(&lines);

                let mut ctx = RequestContext::new("s", &mut cart);
                let first = pipeline.apply(&mut ctx, &specs).unwrap();
                let after_first = ctx.cart.get_items();
                let second = pipeline.apply(&mut ctx, &specs).unwrap();

                prop_assert_eq!(first, second);
                prop_assert_eq!(after_first, ctx.cart.get_items());
            }

            #[test]
            fn property_repeated_cart_edits_match_single_pass(
                lines in cart_lines(),
                passes in 2usize..5,
            ) {
                let pipeline = PricePipeline::new(catalog());
                let node = checkout_node();
                let mut once = fill(&lines);
                let mut many = once.clone();

                let mut ctx = RequestContext::new("a", &mut once);
                let single = pipeline.after_cart_edit(&mut ctx, Some(&node)).unwrap();

                let mut ctx = RequestContext::new("b", &mut many);
                let mut last = pipeline.after_cart_edit(&mut ctx, Some(&node)).unwrap();
                for _ in 1..passes {
                    last = pipeline.after_cart_edit(&mut ctx, Some(&node)).unwrap();
                }

                prop_assert_eq!(single.pricing, last.pricing);
                prop_assert_eq!(once.applied_coupons(), many.applied_coupons());
                prop_assert_eq!(once.get_items(), many.get_items());
            }
        }
    }
}
