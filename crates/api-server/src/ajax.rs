//! Ajax orchestrator: maps a `sub_action` to its handler, checks the
//! request token and turns handler results into wire payloads.

use std::collections::BTreeMap;
use std::sync::Arc;

use funnel_core::error::{FunnelError, FunnelResult};
use funnel_core::event_bus::{make_event, EventSink, FunnelEventType};
use funnel_core::types::{FunnelId, PageId, ProductId, StepType};
use funnel_core::{CartStore, Catalog, ConditionEvaluator, RequestContext, TokenVerifier};
use funnel_journey::{DecisionEvaluator, FunnelNode, FunnelStore, StepResolver};
use funnel_offers::{BumpOffer, BundleSelection, OfferManager, QuantityChange};
use funnel_pricing::PricePipeline;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::wire::{
    AjaxRequest, AjaxResponse, ApplyCouponParams, BundleModify, BundleParams, ChangeQtyParams,
    Navigation, PopupParams, PricingPayload, RecalculateParams, UpsellParams, UpsellStepsParams,
};

/// Every visitor action the orchestrator serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AjaxAction {
    ApplyCoupon,
    ChangeCartItemQty,
    ModifyCartByBundleProducts,
    CallFunnelPopups,
    PerformUpsellAcceptButton,
    PerformUpsellRejectButton,
    RecalculateTotals,
    FunnelUpsellSteps,
}

impl AjaxAction {
    pub const ALL: [AjaxAction; 8] = [
        AjaxAction::ApplyCoupon,
        AjaxAction::ChangeCartItemQty,
        AjaxAction::ModifyCartByBundleProducts,
        AjaxAction::CallFunnelPopups,
        AjaxAction::PerformUpsellAcceptButton,
        AjaxAction::PerformUpsellRejectButton,
        AjaxAction::RecalculateTotals,
        AjaxAction::FunnelUpsellSteps,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AjaxAction::ApplyCoupon => "apply_coupon",
            AjaxAction::ChangeCartItemQty => "change_cart_item_qty",
            AjaxAction::ModifyCartByBundleProducts => "modify_cart_by_bundle_products",
            AjaxAction::CallFunnelPopups => "call_funnel_popups",
            AjaxAction::PerformUpsellAcceptButton => "perform_upsell_accept_button",
            AjaxAction::PerformUpsellRejectButton => "perform_upsell_reject_button",
            AjaxAction::RecalculateTotals => "recalculate_totals",
            AjaxAction::FunnelUpsellSteps => "funnel_upsell_steps",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|a| a.as_str() == name.trim())
    }

    /// Actions that move the visitor to another step.
    pub fn is_navigation(&self) -> bool {
        matches!(
            self,
            AjaxAction::CallFunnelPopups
                | AjaxAction::PerformUpsellAcceptButton
                | AjaxAction::PerformUpsellRejectButton
        )
    }
}

impl std::fmt::Display for AjaxAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Serialize)]
struct CouponPayload {
    code: String,
    #[serde(flatten)]
    pricing: PricingPayload,
}

#[derive(Debug, Serialize)]
struct BundlePayload {
    #[serde(flatten)]
    pricing: PricingPayload,
    bumps: Vec<BumpOffer>,
}

#[derive(Debug, Serialize)]
struct PopupPayload {
    #[serde(flatten)]
    navigation: Navigation,
    /// True when the next step is an upsell or downsell shown as a popup.
    popup: bool,
}

#[derive(Debug, Serialize)]
struct AcceptPayload {
    #[serde(flatten)]
    navigation: Navigation,
    added: bool,
    upsell_prices: BTreeMap<ProductId, f64>,
    #[serde(flatten)]
    pricing: PricingPayload,
}

#[derive(Debug, Serialize)]
struct UpsellStepsPayload {
    funnel_id: u64,
    has_upsell: bool,
    steps: Vec<Navigation>,
}

pub struct AjaxOrchestrator {
    offers: OfferManager,
    verifier: Arc<dyn TokenVerifier>,
    events: Arc<dyn EventSink>,
}

impl AjaxOrchestrator {
    pub fn new(
        offers: OfferManager,
        verifier: Arc<dyn TokenVerifier>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            offers,
            verifier,
            events,
        }
    }

    /// Wires resolver, pipeline and offer manager over the given collaborators.
    pub fn assemble(
        store: Arc<dyn FunnelStore>,
        catalog: Arc<dyn Catalog>,
        conditions: Arc<dyn ConditionEvaluator>,
        verifier: Arc<dyn TokenVerifier>,
        events: Arc<dyn EventSink>,
        max_decision_hops: usize,
    ) -> Self {
        let decisions =
            DecisionEvaluator::new(store.clone(), conditions).with_max_hops(max_decision_hops);
        let resolver = StepResolver::new(store, decisions);
        let pipeline = PricePipeline::new(catalog);
        let offers = OfferManager::new(resolver, pipeline, events.clone());
        Self::new(offers, verifier, events)
    }

    pub fn offers(&self) -> &OfferManager {
        &self.offers
    }

    /// Handles a request and always produces a wire response.
    pub fn handle(&self, request: &AjaxRequest, cart: &mut dyn CartStore) -> AjaxResponse {
        match self.dispatch(request, cart) {
            Ok(data) => AjaxResponse::ok(data),
            Err(e) => AjaxResponse::failure(&e),
        }
    }

    /// Checks the request token against its session id.
    pub fn authorize(&self, request: &AjaxRequest) -> FunnelResult<()> {
        let token = request.auth_token.as_deref().unwrap_or_default();
        if self.verifier.verify(&request.session_id, token) {
            return Ok(());
        }
        warn!(
            session_id = %request.session_id,
            sub_action = %request.sub_action,
            "Request token rejected"
        );
        Err(FunnelError::Unauthorized)
    }

    pub fn dispatch(&self, request: &AjaxRequest, cart: &mut dyn CartStore) -> FunnelResult<Value> {
        let action = AjaxAction::from_name(&request.sub_action).ok_or_else(|| {
            FunnelError::Validation(format!("unknown sub_action `{}`", request.sub_action))
        })?;
        metrics::counter!("funnel.ajax.requests", "action" => action.as_str()).increment(1);

        if let Err(e) = self.authorize(request) {
            metrics::counter!("funnel.ajax.errors", "action" => action.as_str()).increment(1);
            return Err(e);
        }

        let mut ctx = RequestContext::new(request.session_id.clone(), cart)
            .with_facts(request.facts.clone());

        let result = self.run(action, request, &mut ctx);
        match &result {
            Ok(_) => debug!(session_id = %ctx.session_id, action = %action, "Ajax action handled"),
            Err(e) => {
                metrics::counter!("funnel.ajax.errors", "action" => action.as_str()).increment(1);
                warn!(
                    session_id = %ctx.session_id,
                    action = %action,
                    error = %e,
                    "Ajax action failed"
                );
            }
        }
        result
    }

    fn run(
        &self,
        action: AjaxAction,
        request: &AjaxRequest,
        ctx: &mut RequestContext<'_>,
    ) -> FunnelResult<Value> {
        match action {
            AjaxAction::ApplyCoupon => self.apply_coupon(ctx, request.params()?),
            AjaxAction::ChangeCartItemQty => self.change_cart_item_qty(ctx, request.params()?),
            AjaxAction::ModifyCartByBundleProducts => {
                self.modify_cart_by_bundle_products(ctx, request.params()?)
            }
            AjaxAction::CallFunnelPopups => self.call_funnel_popups(ctx, request.params()?),
            AjaxAction::PerformUpsellAcceptButton => self.accept_upsell(ctx, request.params()?),
            AjaxAction::PerformUpsellRejectButton => self.reject_upsell(ctx, request.params()?),
            AjaxAction::RecalculateTotals => self.recalculate_totals(ctx, request.params()?),
            AjaxAction::FunnelUpsellSteps => self.funnel_upsell_steps(request.params()?),
        }
    }

    fn page(&self, page_id: PageId) -> FunnelResult<FunnelNode> {
        self.offers.resolver().current_page(page_id)
    }

    fn optional_page(&self, page_id: Option<PageId>) -> FunnelResult<Option<FunnelNode>> {
        page_id.map(|p| self.page(p)).transpose()
    }

    /// Rebuilds client-carried upsell prices from the funnel's own offer
    /// steps. Only the product ids are taken from the request; products no
    /// offer step sells at a discount are dropped.
    fn trusted_upsell_prices(
        &self,
        funnel_id: FunnelId,
        posted: &BTreeMap<ProductId, f64>,
    ) -> FunnelResult<BTreeMap<ProductId, f64>> {
        if posted.is_empty() {
            return Ok(BTreeMap::new());
        }
        let steps = self.offers.resolver().offer_steps(funnel_id);
        let calculator = self.offers.pipeline().calculator();

        let mut trusted = BTreeMap::new();
        for &product_id in posted.keys() {
            let spec = steps
                .iter()
                .filter_map(FunnelNode::offered_product)
                .find(|spec| spec.product_id == product_id);
            let price = match spec {
                Some(spec) => calculator.compute_spec(spec)?.price(),
                None => None,
            };
            match price {
                Some(price) => {
                    trusted.insert(product_id, price);
                }
                None => {
                    warn!(
                        funnel_id,
                        product_id, "Ignoring upsell price for a product no offer step discounts"
                    );
                    metrics::counter!("funnel.ajax.upsell_prices_dropped").increment(1);
                }
            }
        }
        Ok(trusted)
    }

    fn apply_coupon(
        &self,
        ctx: &mut RequestContext<'_>,
        params: ApplyCouponParams,
    ) -> FunnelResult<Value> {
        let code = params.code.trim().to_string();
        if code.is_empty() {
            return Err(FunnelError::Validation("coupon code is required".into()));
        }
        let checkout = self.optional_page(params.checkout_id)?;

        let pipeline = self.offers.pipeline();
        let pricing = pipeline.recalculate(ctx, checkout.as_ref())?;

        let mut event = make_event(FunnelEventType::CouponApplied, ctx.session_id.clone())
            .with_detail(code.clone());
        if let Some(node) = &checkout {
            event = event
                .with_funnel(node.funnel_id)
                .with_step(node.page(), node.step_type);
        }

        match pricing.gates.apply(ctx.cart, pipeline.catalog(), &code) {
            Ok(coupon) => {
                self.events.emit(event.with_amount(pricing.subtotal));
                let payload = CouponPayload {
                    code: coupon.code,
                    pricing: PricingPayload::new(&pricing, ctx.cart.applied_coupons()),
                };
                Ok(serde_json::to_value(payload)?)
            }
            Err(e) => {
                event.event_type = FunnelEventType::CouponRejected;
                self.events.emit(event);
                Err(e)
            }
        }
    }

    fn change_cart_item_qty(
        &self,
        ctx: &mut RequestContext<'_>,
        params: ChangeQtyParams,
    ) -> FunnelResult<Value> {
        let checkout = self.optional_page(params.related_checkout)?;
        let change = QuantityChange {
            id: params.id,
            quantity: params.qty,
            mode: params.mode,
        };
        let recalculation = self
            .offers
            .change_quantity(ctx, &change, checkout.as_ref())?;
        let payload = PricingPayload::new(&recalculation.pricing, ctx.cart.applied_coupons());
        Ok(serde_json::to_value(payload)?)
    }

    fn modify_cart_by_bundle_products(
        &self,
        ctx: &mut RequestContext<'_>,
        params: BundleParams,
    ) -> FunnelResult<Value> {
        let line_key = params.key.filter(|k| !k.trim().is_empty());
        if line_key.is_none() && params.id == 0 {
            return Err(FunnelError::Validation("product id is required".into()));
        }
        let checkout = self.page(params.checkout_id)?;

        let selection = BundleSelection {
            product_id: params.id,
            quantity: params.qty,
            mode: params.mode,
            checked: params.modify != Some(BundleModify::Remove),
            line_key,
        };
        let recalculation = self.offers.select_bundle(ctx, &checkout, &selection)?;
        let bumps = self.offers.offered_bumps(ctx, &checkout);

        let payload = BundlePayload {
            pricing: PricingPayload::new(&recalculation.pricing, ctx.cart.applied_coupons()),
            bumps,
        };
        Ok(serde_json::to_value(payload)?)
    }

    fn call_funnel_popups(
        &self,
        ctx: &mut RequestContext<'_>,
        params: PopupParams,
    ) -> FunnelResult<Value> {
        let step = self.page(params.step)?;
        let checkout = (step.step_type == StepType::Checkout).then_some(&step);
        // Decisions downstream read the cart facts.
        self.offers.pipeline().recalculate(ctx, checkout)?;

        let next = self.offers.resolver().next(&step, &ctx.facts)?;
        let payload = PopupPayload {
            navigation: Navigation::from(&next),
            popup: next.node().step_type.is_offer(),
        };
        Ok(serde_json::to_value(payload)?)
    }

    fn accept_upsell(
        &self,
        ctx: &mut RequestContext<'_>,
        params: UpsellParams,
    ) -> FunnelResult<Value> {
        let offer = self.page(params.upsell_id)?;
        let checkout = self.optional_page(params.checkout_id)?;
        let trusted = self.trusted_upsell_prices(offer.funnel_id, &params.upsell_prices)?;
        ctx.upsell_prices.extend(trusted);

        let outcome = self.offers.accept_upsell(ctx, &offer, checkout.as_ref())?;
        info!(
            session_id = %ctx.session_id,
            upsell_page = params.upsell_id,
            next_page = outcome.next.node().page(),
            "Upsell accepted via ajax"
        );

        let payload = AcceptPayload {
            navigation: Navigation::from(&outcome.next),
            added: outcome.added,
            upsell_prices: ctx.upsell_prices.clone(),
            pricing: PricingPayload::new(&outcome.pricing, ctx.cart.applied_coupons()),
        };
        Ok(serde_json::to_value(payload)?)
    }

    fn reject_upsell(&self, ctx: &RequestContext<'_>, params: UpsellParams) -> FunnelResult<Value> {
        let offer = self.page(params.upsell_id)?;
        let next = self.offers.reject_upsell(ctx, &offer)?;
        Ok(serde_json::to_value(Navigation::from(&next))?)
    }

    fn recalculate_totals(
        &self,
        ctx: &mut RequestContext<'_>,
        params: RecalculateParams,
    ) -> FunnelResult<Value> {
        let checkout = self.page(params.checkout_id)?;
        let trusted = self.trusted_upsell_prices(checkout.funnel_id, &params.upsell_prices)?;
        ctx.upsell_prices.extend(trusted);

        let recalculation = self.offers.pipeline().after_cart_edit(ctx, Some(&checkout))?;
        let payload = PricingPayload::new(&recalculation.pricing, ctx.cart.applied_coupons());
        Ok(serde_json::to_value(payload)?)
    }

    /// Popups are armed only when every offer step's product can be sold.
    fn funnel_upsell_steps(&self, params: UpsellStepsParams) -> FunnelResult<Value> {
        let checkout = self.page(params.checkout_id)?;
        let steps = self.offers.resolver().offer_steps(checkout.funnel_id);
        let catalog = self.offers.pipeline().catalog();

        let all_in_stock = steps.iter().all(|step| {
            step.offered_product()
                .and_then(|spec| catalog.product(spec.product_id))
                .is_some_and(|product| product.in_stock)
        });

        let payload = UpsellStepsPayload {
            funnel_id: checkout.funnel_id,
            has_upsell: !steps.is_empty() && all_in_stock,
            steps: steps
                .iter()
                .map(|step| Navigation {
                    next_id: step.page(),
                    next_type: step.step_type.as_str().to_string(),
                })
                .collect(),
        };
        Ok(serde_json::to_value(payload)?)
    }
}

impl std::fmt::Debug for AjaxOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AjaxOrchestrator")
            .field("offers", &self.offers)
            .finish()
    }
}
