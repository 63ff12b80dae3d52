//! Bump and upsell manager: every cart mutation a visitor's offer choice
//! causes, each followed by a price recalculation.

use std::sync::Arc;

use funnel_core::error::{FunnelError, FunnelResult};
use funnel_core::event_bus::{make_event, EventSink, FunnelEventType};
use funnel_core::types::{BumpSelectionState, CartLine, ProductId, StepType};
use funnel_core::RequestContext;
use funnel_journey::{FunnelNode, NextStep, StepResolver};
use funnel_pricing::{PriceComputationResult, PricePipeline, Recalculation};
use tracing::{info, warn};

use crate::state_machine::SelectionStateMachine;
use crate::types::{
    BumpOffer, BundleSelection, QuantityChange, QuantityMode, SelectionMode, UpsellOutcome,
};

pub struct OfferManager {
    resolver: StepResolver,
    pipeline: PricePipeline,
    events: Arc<dyn EventSink>,
}

impl OfferManager {
    pub fn new(resolver: StepResolver, pipeline: PricePipeline, events: Arc<dyn EventSink>) -> Self {
        Self {
            resolver,
            pipeline,
            events,
        }
    }

    pub fn resolver(&self) -> &StepResolver {
        &self.resolver
    }

    pub fn pipeline(&self) -> &PricePipeline {
        &self.pipeline
    }

    /// Works out which bumps of a checkout are shown and which are already
    /// taken, recording the states in the request context.
    pub fn offered_bumps(
        &self,
        ctx: &mut RequestContext<'_>,
        checkout: &FunnelNode,
    ) -> Vec<BumpOffer> {
        let subtotal: f64 = ctx.cart.get_items().iter().map(CartLine::line_total).sum();
        ctx.refresh_cart_facts(subtotal);

        let mut offers = Vec::new();
        for bump in &checkout.data.bumps {
            let Some(spec) = bump.product() else {
                continue;
            };

            let state = if ctx.bump_states.get(&bump.id) == Some(&BumpSelectionState::Rejected) {
                BumpSelectionState::Rejected
            } else if !self.resolver.decisions().holds(&bump.conditions, &ctx.facts) {
                BumpSelectionState::NotOffered
            } else if ctx.cart.contains_product(spec.product_id) {
                BumpSelectionState::Accepted
            } else {
                BumpSelectionState::Offered
            };

            ctx.bump_states.insert(bump.id.clone(), state);
            offers.push(BumpOffer {
                bump_id: bump.id.clone(),
                product_id: spec.product_id,
                quantity: spec.effective_quantity(),
                state,
            });
        }
        offers
    }

    /// Accepts an upsell or downsell: adds its product unless already in the
    /// cart, records the upsell price, reprices and moves forward. If the
    /// reprice or navigation fails, the added line is taken out again.
    pub fn accept_upsell(
        &self,
        ctx: &mut RequestContext<'_>,
        offer: &FunnelNode,
        checkout: Option<&FunnelNode>,
    ) -> FunnelResult<UpsellOutcome> {
        if !offer.step_type.is_offer() {
            return Err(FunnelError::Validation(format!(
                "step {} is a {} step, not an offer",
                offer.id, offer.step_type
            )));
        }
        let spec = offer.offered_product().cloned().ok_or_else(|| {
            FunnelError::Validation(format!("offer step {} has no product", offer.id))
        })?;

        let calculator = self.pipeline.calculator();
        let price = calculator.compute_spec(&spec)?.price();
        if price.is_none() {
            calculator.catalog_price(spec.product_id)?;
        }

        let mut selection = SelectionStateMachine::starting_at(BumpSelectionState::Offered);
        selection.transition(BumpSelectionState::Accepted)?;

        let product_id = spec.product_id;
        let added_key = if ctx.cart.contains_product(product_id) {
            None
        } else {
            Some(ctx.cart.add_item(product_id, spec.effective_quantity())?)
        };
        // A line the visitor already had keeps its own price.
        let price = price.filter(|_| added_key.is_some());
        let previous_price = match price {
            Some(p) => ctx.upsell_prices.insert(product_id, p),
            None => None,
        };

        let (pricing, next) = match self.settle(ctx, offer, checkout) {
            Ok(settled) => settled,
            Err(e) => {
                if let Some(key) = &added_key {
                    if let Err(rollback) = ctx.cart.remove_item(key) {
                        warn!(error = %rollback, line_key = %key, "Failed to roll back upsell line");
                    }
                }
                if price.is_some() {
                    match previous_price {
                        Some(p) => ctx.upsell_prices.insert(product_id, p),
                        None => ctx.upsell_prices.remove(&product_id),
                    };
                }
                return Err(e);
            }
        };

        let added = added_key.is_some();
        metrics::counter!("funnel.offers.accepted").increment(1);
        self.emit_step(ctx, offer, FunnelEventType::UpsellAccepted, None);
        if added && offer.step_type == StepType::Upsell {
            let revenue = ctx
                .cart
                .find_line(product_id)
                .map(|line| line.line_total())
                .unwrap_or_default();
            self.emit_step(ctx, offer, FunnelEventType::UpsellRevenue, Some(revenue));
        }
        self.emit_step(ctx, offer, FunnelEventType::StepPassed, None);

        info!(
            funnel_id = offer.funnel_id,
            node_id = %offer.id,
            product_id,
            added,
            next_page = next.node().page(),
            "Upsell accepted"
        );

        Ok(UpsellOutcome {
            product_id,
            added,
            price,
            pricing,
            next,
        })
    }

    fn settle(
        &self,
        ctx: &mut RequestContext<'_>,
        offer: &FunnelNode,
        checkout: Option<&FunnelNode>,
    ) -> FunnelResult<(PriceComputationResult, NextStep)> {
        let recalculation = self.pipeline.after_cart_edit(ctx, checkout)?;
        let next = self.resolver.next(offer, &ctx.facts)?;
        Ok((recalculation.pricing, next))
    }

    /// Rejects an upsell or downsell. The cart is left alone.
    pub fn reject_upsell(
        &self,
        ctx: &RequestContext<'_>,
        offer: &FunnelNode,
    ) -> FunnelResult<NextStep> {
        if !offer.step_type.is_offer() {
            return Err(FunnelError::Validation(format!(
                "step {} is a {} step, not an offer",
                offer.id, offer.step_type
            )));
        }
        let mut selection = SelectionStateMachine::starting_at(BumpSelectionState::Offered);
        selection.transition(BumpSelectionState::Rejected)?;

        let next = self.resolver.next_no(offer, &ctx.facts)?;

        metrics::counter!("funnel.offers.rejected").increment(1);
        self.emit_step(ctx, offer, FunnelEventType::UpsellRejected, None);
        self.emit_step(ctx, offer, FunnelEventType::StepPassed, None);
        info!(
            funnel_id = offer.funnel_id,
            node_id = %offer.id,
            next_page = next.node().page(),
            "Upsell rejected"
        );
        Ok(next)
    }

    /// Applies a bundle table choice on a checkout step.
    pub fn select_bundle(
        &self,
        ctx: &mut RequestContext<'_>,
        checkout: &FunnelNode,
        selection: &BundleSelection,
    ) -> FunnelResult<Recalculation> {
        if let Some(key) = &selection.line_key {
            self.set_line_quantity(ctx, key, selection.quantity)?;
            return self.pipeline.after_cart_edit(ctx, Some(checkout));
        }

        let product_id = selection.product_id;
        match selection.mode {
            SelectionMode::Radio => {
                let configured = self.radio_quantity(ctx, checkout, product_id)?;
                if configured != selection.quantity {
                    metrics::counter!("funnel.offers.tamper_rejected").increment(1);
                    warn!(
                        session_id = %ctx.session_id,
                        product_id,
                        configured,
                        requested = selection.quantity,
                        "Bundle quantity does not match the offer"
                    );
                    self.events.emit(
                        make_event(FunnelEventType::TamperRejected, ctx.session_id.clone())
                            .with_funnel(checkout.funnel_id)
                            .with_step(checkout.page(), checkout.step_type)
                            .with_detail(format!(
                                "product {} requested with quantity {}",
                                product_id, selection.quantity
                            )),
                    );
                    return Err(FunnelError::Validation(format!(
                        "quantity {} does not match the offered quantity for product {}",
                        selection.quantity, product_id
                    )));
                }
                self.pipeline.calculator().catalog_price(product_id)?;

                for line in ctx.cart.get_items() {
                    ctx.cart.remove_item(&line.key)?;
                }
                ctx.cart.add_item(product_id, configured)?;
            }
            SelectionMode::Checkbox => {
                self.offered_bumps(ctx, checkout);
                self.track_bump_choice(ctx, checkout, product_id, selection.checked)?;

                if selection.checked {
                    ctx.cart.add_item(product_id, selection.quantity)?;
                } else if let Some(line) = ctx.cart.find_line(product_id) {
                    ctx.cart.remove_item(&line.key)?;
                }
            }
        }

        self.pipeline.after_cart_edit(ctx, Some(checkout))
    }

    /// Quantity the checkout offers `product_id` at. With `reset_cart`,
    /// products already in the cart are options at their current quantity.
    fn radio_quantity(
        &self,
        ctx: &RequestContext<'_>,
        checkout: &FunnelNode,
        product_id: ProductId,
    ) -> FunnelResult<u32> {
        let products = checkout.data.products.as_ref();
        if let Some(spec) = products.and_then(|p| p.spec_for(product_id)) {
            return Ok(spec.effective_quantity());
        }

        let reset_cart = products.map_or(true, |p| p.reset_cart);
        if reset_cart {
            if let Some(line) = ctx.cart.find_line(product_id) {
                return Ok(line.quantity);
            }
        }

        Err(FunnelError::Validation(format!(
            "product {} is not offered on this checkout",
            product_id
        )))
    }

    /// Moves the state of every bump offering `product_id`.
    fn track_bump_choice(
        &self,
        ctx: &mut RequestContext<'_>,
        checkout: &FunnelNode,
        product_id: ProductId,
        checked: bool,
    ) -> FunnelResult<()> {
        let target = if checked {
            BumpSelectionState::Accepted
        } else {
            BumpSelectionState::Offered
        };

        for bump in &checkout.data.bumps {
            if bump.product().map(|s| s.product_id) != Some(product_id) {
                continue;
            }
            let current = ctx
                .bump_states
                .get(&bump.id)
                .copied()
                .unwrap_or(BumpSelectionState::NotOffered);
            let mut selection = SelectionStateMachine::starting_at(current);
            selection.transition(target).map_err(|_| {
                FunnelError::Validation(format!("bump {} is not offered", bump.id))
            })?;
            ctx.bump_states.insert(bump.id.clone(), selection.state);
        }
        Ok(())
    }

    /// Direct cart edits from the order summary.
    pub fn change_quantity(
        &self,
        ctx: &mut RequestContext<'_>,
        change: &QuantityChange,
        checkout: Option<&FunnelNode>,
    ) -> FunnelResult<Recalculation> {
        match change.mode {
            QuantityMode::Add => {
                let product_id = parse_product_id(&change.id)?;
                ctx.cart.add_item(product_id, change.quantity)?;
            }
            QuantityMode::Remove => {
                let product_id = parse_product_id(&change.id)?;
                if let Some(line) = ctx.cart.find_line(product_id) {
                    ctx.cart.remove_item(&line.key)?;
                }
            }
            QuantityMode::Set => self.set_line_quantity(ctx, &change.id, change.quantity)?,
        }

        self.pipeline.after_cart_edit(ctx, checkout)
    }

    fn set_line_quantity(
        &self,
        ctx: &mut RequestContext<'_>,
        line_key: &str,
        quantity: u32,
    ) -> FunnelResult<()> {
        if quantity == 0 {
            ctx.cart.remove_item(line_key)
        } else {
            ctx.cart.set_quantity(line_key, quantity)
        }
    }

    fn emit_step(
        &self,
        ctx: &RequestContext<'_>,
        step: &FunnelNode,
        event_type: FunnelEventType,
        amount: Option<f64>,
    ) {
        let mut event = make_event(event_type, ctx.session_id.clone())
            .with_funnel(step.funnel_id)
            .with_step(step.page(), step.step_type);
        if let Some(amount) = amount {
            event = event.with_amount(amount);
        }
        self.events.emit(event);
    }
}

impl std::fmt::Debug for OfferManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OfferManager")
            .field("resolver", &self.resolver)
            .finish()
    }
}

fn parse_product_id(raw: &str) -> FunnelResult<ProductId> {
    raw.trim()
        .parse::<ProductId>()
        .map_err(|_| FunnelError::Validation(format!("invalid product id `{}`", raw)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use funnel_core::event_bus::{capture_sink, CaptureSink};
    use funnel_core::memory::{InMemoryCart, InMemoryCatalog};
    use funnel_core::types::Product;
    use funnel_core::{CartStore, Catalog};
    use funnel_journey::{DecisionEvaluator, FunnelStore, InMemoryFunnelStore};
    use funnel_segmentation::SegmentEvaluator;

    const FUNNEL: &str = r#"[{
        "id": 1,
        "name": "Spring sale",
        "nodes": [
            {"id": "c", "type": {"key": "checkout"}, "page_id": 10, "targets": [{"nodeId": "gate"}],
             "data": {
                "products": {"list": [
                    {"product_id": 100, "quantity": 2, "discount_type": "fixed", "discount_value": 10},
                    {"product_id": 101, "quantity": 1}
                ]},
                "bumps": [{
                    "id": "b1",
                    "conditions": [{"field": "cart_total", "operator": "is-greater-than", "value": 50}],
                    "products": {"list": [{"product_id": 5, "discount_type": "percent", "discount_value": 50}]}
                }]
             }},
            {"id": "gate", "type": {"key": "decision"}, "targets": [{"nodeId": "up"}, {"nodeId": "down"}],
             "data": {"conditions": [{"field": "cart_total", "operator": ">", "value": 100}]}},
            {"id": "up", "type": {"key": "upsell"}, "page_id": 20, "targets": [{"nodeId": "none"}, {"nodeId": "down"}],
             "data": {"products": {"list": [{"product_id": 7, "quantity": 2, "discount_type": "fixed", "discount_value": 5}]}}},
            {"id": "down", "type": {"key": "downsell"}, "page_id": 21, "targets": [{"nodeId": "thanks"}, {"nodeId": "none"}],
             "data": {"products": {"list": [{"product_id": 8, "discount_type": "percent", "discount_value": 10}]}}},
            {"id": "thanks", "type": {"key": "thankyou"}, "page_id": 30}
        ]
    }]"#;

    struct Fixture {
        catalog: Arc<InMemoryCatalog>,
        store: Arc<InMemoryFunnelStore>,
        events: Arc<CaptureSink>,
        manager: OfferManager,
    }

    fn fixture() -> Fixture {
        let catalog = Arc::new(
            InMemoryCatalog::new()
                .with_product(Product::new(100, 50.0))
                .with_product(Product::new(101, 30.0))
                .with_product(Product::new(5, 20.0))
                .with_product(Product::new(7, 40.0))
                .with_product(Product::new(8, 30.0)),
        );
        let store = Arc::new(InMemoryFunnelStore::from_json(FUNNEL).unwrap());
        let events = capture_sink();

        let funnel_store: Arc<dyn FunnelStore> = store.clone();
        let decisions = DecisionEvaluator::new(funnel_store.clone(), Arc::new(SegmentEvaluator::new()));
        let resolver = StepResolver::new(funnel_store, decisions);
        let catalog_dyn: Arc<dyn Catalog> = catalog.clone();
        let manager = OfferManager::new(resolver, PricePipeline::new(catalog_dyn), events.clone());

        Fixture {
            catalog,
            store,
            events,
            manager,
        }
    }

    fn page(f: &Fixture, page_id: u64) -> FunnelNode {
        f.store.node_by_page(page_id).unwrap()
    }

    #[test]
    fn test_accept_upsell_adds_line_and_reprices() {
        let f = fixture();
        let checkout = page(&f, 10);
        let upsell = page(&f, 20);
        let mut cart = InMemoryCart::new(f.catalog.clone());
        cart.add_item(100, 2).unwrap();

        let mut ctx = RequestContext::new("s-1", &mut cart);
        let outcome = f.manager.accept_upsell(&mut ctx, &upsell, Some(&checkout)).unwrap();

        assert!(outcome.added);
        assert_eq!(outcome.price, Some(35.0));
        assert_eq!(ctx.upsell_prices.get(&7), Some(&35.0));
        assert_eq!(outcome.pricing.subtotal, 80.0 + 70.0);
        assert!(outcome.next.is_terminal());
        assert_eq!(outcome.next.node().page_id, Some(30));

        let lines: Vec<_> = cart.get_items().into_iter().filter(|l| l.product_id == 7).collect();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].quantity, 2);
        assert_eq!(lines[0].unit_price, 35.0);

        assert_eq!(f.events.count_type(FunnelEventType::UpsellRevenue), 1);
        let revenue = f
            .events
            .events()
            .into_iter()
            .find(|e| e.event_type == FunnelEventType::UpsellRevenue)
            .unwrap();
        assert_eq!(revenue.amount, Some(70.0));
        assert_eq!(f.events.count_type(FunnelEventType::StepPassed), 1);
    }

    #[test]
    fn test_accept_upsell_already_in_cart() {
        let f = fixture();
        let upsell = page(&f, 20);
        let mut cart = InMemoryCart::new(f.catalog.clone());
        cart.add_item(7, 3).unwrap();

        let mut ctx = RequestContext::new("s-1", &mut cart);
        let outcome = f.manager.accept_upsell(&mut ctx, &upsell, None).unwrap();

        assert!(!outcome.added);
        assert_eq!(outcome.price, None);
        assert!(ctx.upsell_prices.is_empty());
        assert_eq!(cart.get_items().len(), 1);
        assert_eq!(cart.get_items()[0].quantity, 3);
        assert_eq!(cart.get_items()[0].unit_price, 40.0);
        assert_eq!(f.events.count_type(FunnelEventType::UpsellRevenue), 0);
    }

    #[test]
    fn test_accept_requires_offer_step() {
        let f = fixture();
        let checkout = page(&f, 10);
        let mut cart = InMemoryCart::new(f.catalog.clone());
        let mut ctx = RequestContext::new("s-1", &mut cart);
        assert!(matches!(
            f.manager.accept_upsell(&mut ctx, &checkout, None),
            Err(FunnelError::Validation(_))
        ));
        assert!(cart.get_items().is_empty());
    }

    #[test]
    fn test_reject_follows_no_edge() {
        let f = fixture();
        let mut cart = InMemoryCart::new(f.catalog.clone());
        cart.add_item(100, 1).unwrap();
        let ctx = RequestContext::new("s-1", &mut cart);

        let next = f.manager.reject_upsell(&ctx, &page(&f, 20)).unwrap();
        assert_eq!(next.node().page_id, Some(21));

        let next = f.manager.reject_upsell(&ctx, &page(&f, 21)).unwrap();
        assert!(next.is_terminal());
        assert_eq!(f.events.count_type(FunnelEventType::UpsellRejected), 2);
        drop(ctx);
        assert_eq!(cart.get_items().len(), 1);
    }

    #[test]
    fn test_radio_selection_replaces_cart() {
        let f = fixture();
        let checkout = page(&f, 10);
        let mut cart = InMemoryCart::new(f.catalog.clone());
        cart.add_item(101, 1).unwrap();
        cart.add_item(5, 1).unwrap();

        let mut ctx = RequestContext::new("s-1", &mut cart);
        let selection = BundleSelection {
            product_id: 100,
            quantity: 2,
            mode: SelectionMode::Radio,
            checked: true,
            line_key: None,
        };
        let result = f.manager.select_bundle(&mut ctx, &checkout, &selection).unwrap();
        assert_eq!(result.pricing.subtotal, 80.0);

        let items = cart.get_items();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].product_id, 100);
        assert_eq!(items[0].quantity, 2);
    }

    #[test]
    fn test_radio_tamper_rejected_without_mutation() {
        let f = fixture();
        let checkout = page(&f, 10);
        let mut cart = InMemoryCart::new(f.catalog.clone());
        cart.add_item(101, 1).unwrap();
        let before = cart.get_items();

        let mut ctx = RequestContext::new("s-1", &mut cart);
        let selection = BundleSelection {
            product_id: 100,
            quantity: 5,
            mode: SelectionMode::Radio,
            checked: true,
            line_key: None,
        };
        let err = f.manager.select_bundle(&mut ctx, &checkout, &selection).unwrap_err();
        assert!(matches!(err, FunnelError::Validation(_)));
        assert_eq!(f.events.count_type(FunnelEventType::TamperRejected), 1);
        drop(ctx);
        assert_eq!(cart.get_items(), before);
    }

    #[test]
    fn test_radio_cart_products_are_options() {
        let f = fixture();
        let checkout = page(&f, 10);
        let mut cart = InMemoryCart::new(f.catalog.clone());
        cart.add_item(8, 3).unwrap();
        cart.add_item(100, 2).unwrap();

        let mut ctx = RequestContext::new("s-1", &mut cart);
        let pick = |quantity| BundleSelection {
            product_id: 8,
            quantity,
            mode: SelectionMode::Radio,
            checked: true,
            line_key: None,
        };
        assert!(f.manager.select_bundle(&mut ctx, &checkout, &pick(1)).is_err());
        f.manager.select_bundle(&mut ctx, &checkout, &pick(3)).unwrap();
        drop(ctx);
        let items = cart.get_items();
        assert_eq!(items.len(), 1);
        assert_eq!((items[0].product_id, items[0].quantity), (8, 3));

        // Not in the list and not in the cart.
        let mut ctx = RequestContext::new("s-1", &mut cart);
        let stranger = BundleSelection {
            product_id: 7,
            quantity: 1,
            mode: SelectionMode::Radio,
            checked: true,
            line_key: None,
        };
        assert!(f.manager.select_bundle(&mut ctx, &checkout, &stranger).is_err());
    }

    #[test]
    fn test_checkbox_bump_states() {
        let f = fixture();
        let checkout = page(&f, 10);
        let mut cart = InMemoryCart::new(f.catalog.clone());
        cart.add_item(100, 1).unwrap();

        let mut ctx = RequestContext::new("s-1", &mut cart);
        let offers = f.manager.offered_bumps(&mut ctx, &checkout);
        assert_eq!(offers[0].state, BumpSelectionState::NotOffered);

        // Bump is hidden while the cart is at or below 50.
        let add_bump = BundleSelection {
            product_id: 5,
            quantity: 1,
            mode: SelectionMode::Checkbox,
            checked: true,
            line_key: None,
        };
        assert!(f.manager.select_bundle(&mut ctx, &checkout, &add_bump).is_err());

        ctx.cart.add_item(101, 1).unwrap();
        let result = f.manager.select_bundle(&mut ctx, &checkout, &add_bump).unwrap();
        assert_eq!(ctx.bump_states.get("b1"), Some(&BumpSelectionState::Accepted));
        // 100 is priced at 40 by the funnel list, the bump at half price.
        assert_eq!(result.pricing.subtotal, 40.0 + 30.0 + 10.0);

        let remove_bump = BundleSelection {
            checked: false,
            ..add_bump
        };
        f.manager.select_bundle(&mut ctx, &checkout, &remove_bump).unwrap();
        assert_eq!(ctx.bump_states.get("b1"), Some(&BumpSelectionState::Offered));
        assert!(!ctx.cart.contains_product(5));
    }

    #[test]
    fn test_bundle_line_key_edit() {
        let f = fixture();
        let checkout = page(&f, 10);
        let mut cart = InMemoryCart::new(f.catalog.clone());
        let key = cart.add_item(101, 1).unwrap();

        let mut ctx = RequestContext::new("s-1", &mut cart);
        let edit = BundleSelection {
            product_id: 0,
            quantity: 4,
            mode: SelectionMode::Checkbox,
            checked: true,
            line_key: Some(key),
        };
        let result = f.manager.select_bundle(&mut ctx, &checkout, &edit).unwrap();
        assert_eq!(result.pricing.subtotal, 120.0);
    }

    #[test]
    fn test_change_quantity_modes() {
        let f = fixture();
        let checkout = page(&f, 10);
        let mut cart = InMemoryCart::new(f.catalog.clone());
        let mut ctx = RequestContext::new("s-1", &mut cart);

        let add = QuantityChange {
            id: "100".into(),
            quantity: 2,
            mode: QuantityMode::Add,
        };
        let result = f.manager.change_quantity(&mut ctx, &add, Some(&checkout)).unwrap();
        assert_eq!(result.pricing.subtotal, 80.0);

        let key = ctx.cart.find_line(100).unwrap().key;
        let set = QuantityChange {
            id: key.clone(),
            quantity: 3,
            mode: QuantityMode::Set,
        };
        let result = f.manager.change_quantity(&mut ctx, &set, Some(&checkout)).unwrap();
        assert_eq!(result.pricing.subtotal, 120.0);

        let zero = QuantityChange {
            id: key,
            quantity: 0,
            mode: QuantityMode::Set,
        };
        f.manager.change_quantity(&mut ctx, &zero, None).unwrap();
        assert!(ctx.cart.get_items().is_empty());

        let bad = QuantityChange {
            id: "abc".into(),
            quantity: 1,
            mode: QuantityMode::Remove,
        };
        assert!(matches!(
            f.manager.change_quantity(&mut ctx, &bad, None),
            Err(FunnelError::Validation(_))
        ));
    }
}
