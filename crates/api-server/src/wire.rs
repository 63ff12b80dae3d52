//! Ajax wire format: the request envelope, per-action parameters and the
//! `{ success, data }` response.

use std::collections::BTreeMap;

use funnel_core::error::FunnelError;
use funnel_core::types::{PageId, ProductId, VisitorFacts};
use funnel_journey::NextStep;
use funnel_offers::{QuantityMode, SelectionMode};
use funnel_pricing::{AdjustedItem, PriceComputationResult};
use serde::de::{self, DeserializeOwned, Deserializer};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// `POST { sub_action, auth_token, session_id, ...params }`.
#[derive(Debug, Clone, Deserialize)]
pub struct AjaxRequest {
    pub sub_action: String,
    #[serde(default)]
    pub auth_token: Option<String>,
    pub session_id: String,
    /// Segmentation facts the page collected about the visitor.
    #[serde(default)]
    pub facts: VisitorFacts,
    #[serde(flatten)]
    pub params: serde_json::Map<String, Value>,
}

impl AjaxRequest {
    pub fn new(sub_action: &str, session_id: &str) -> Self {
        Self {
            sub_action: sub_action.to_string(),
            auth_token: None,
            session_id: session_id.to_string(),
            facts: VisitorFacts::new(),
            params: serde_json::Map::new(),
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    pub fn with_param(mut self, key: &str, value: Value) -> Self {
        self.params.insert(key.to_string(), value);
        self
    }

    pub fn with_facts(mut self, facts: VisitorFacts) -> Self {
        self.facts = facts;
        self
    }

    /// Decodes the flattened parameters into an action's parameter type.
    pub fn params<T: DeserializeOwned>(&self) -> Result<T, FunnelError> {
        serde_json::from_value(Value::Object(self.params.clone()))
            .map_err(|e| FunnelError::Validation(format!("invalid parameters: {}", e)))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AjaxResponse {
    pub success: bool,
    pub data: Value,
}

impl AjaxResponse {
    pub fn ok(data: impl Serialize) -> Self {
        Self {
            success: true,
            data: serde_json::to_value(data).unwrap_or(Value::Null),
        }
    }

    pub fn failure(err: &FunnelError) -> Self {
        Self {
            success: false,
            data: serde_json::json!({
                "error": err.code(),
                "message": err.to_string(),
            }),
        }
    }
}

/// Navigation directive: where the visitor goes next.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Navigation {
    pub next_id: PageId,
    pub next_type: String,
}

impl From<&NextStep> for Navigation {
    fn from(next: &NextStep) -> Self {
        let node = next.node();
        Self {
            next_id: node.page(),
            next_type: node.step_type.as_str().to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricingPayload {
    pub subtotal: f64,
    pub adjusted_items: Vec<AdjustedItem>,
    pub coupons: Vec<String>,
}

impl PricingPayload {
    pub fn new(result: &PriceComputationResult, coupons: Vec<String>) -> Self {
        Self {
            subtotal: result.subtotal,
            adjusted_items: result.adjusted_items.clone(),
            coupons,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApplyCouponParams {
    #[serde(default)]
    pub code: String,
    #[serde(default, deserialize_with = "loose_opt_u64")]
    pub checkout_id: Option<PageId>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChangeQtyParams {
    #[serde(deserialize_with = "loose_string")]
    pub id: String,
    #[serde(deserialize_with = "loose_u32")]
    pub qty: u32,
    #[serde(default = "default_qty_mode")]
    pub mode: QuantityMode,
    #[serde(default, deserialize_with = "loose_opt_u64")]
    pub related_checkout: Option<PageId>,
}

fn default_qty_mode() -> QuantityMode {
    QuantityMode::Set
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BundleModify {
    Add,
    Remove,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BundleParams {
    #[serde(default, deserialize_with = "loose_u64")]
    pub id: ProductId,
    #[serde(default = "default_qty", deserialize_with = "loose_u32")]
    pub qty: u32,
    #[serde(rename = "type", default = "default_selection_mode")]
    pub mode: SelectionMode,
    #[serde(deserialize_with = "loose_u64")]
    pub checkout_id: PageId,
    #[serde(default)]
    pub modify: Option<BundleModify>,
    #[serde(default)]
    pub key: Option<String>,
}

fn default_qty() -> u32 {
    1
}

fn default_selection_mode() -> SelectionMode {
    SelectionMode::Checkbox
}

#[derive(Debug, Clone, Deserialize)]
pub struct PopupParams {
    #[serde(deserialize_with = "loose_u64")]
    pub step: PageId,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpsellParams {
    #[serde(deserialize_with = "loose_u64")]
    pub upsell_id: PageId,
    #[serde(default, deserialize_with = "loose_opt_u64")]
    pub checkout_id: Option<PageId>,
    /// Upsell prices accepted on earlier popups of the same order.
    #[serde(default)]
    pub upsell_prices: BTreeMap<ProductId, f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RecalculateParams {
    #[serde(deserialize_with = "loose_u64")]
    pub checkout_id: PageId,
    #[serde(default)]
    pub upsell_prices: BTreeMap<ProductId, f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpsellStepsParams {
    #[serde(deserialize_with = "loose_u64")]
    pub checkout_id: PageId,
}

// Form-encoded clients send numbers as strings.

fn loose_string<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    match Value::deserialize(d)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(de::Error::custom(format!("expected an id, got {}", other))),
    }
}

fn loose_u64<'de, D: Deserializer<'de>>(d: D) -> Result<u64, D::Error> {
    let raw = loose_string(d)?;
    raw.trim()
        .parse()
        .map_err(|_| de::Error::custom(format!("expected a number, got `{}`", raw)))
}

fn loose_u32<'de, D: Deserializer<'de>>(d: D) -> Result<u32, D::Error> {
    let raw = loose_string(d)?;
    raw.trim()
        .parse()
        .map_err(|_| de::Error::custom(format!("expected a quantity, got `{}`", raw)))
}

fn loose_opt_u64<'de, D: Deserializer<'de>>(d: D) -> Result<Option<u64>, D::Error> {
    match Value::deserialize(d)? {
        Value::Null => Ok(None),
        Value::String(s) if s.trim().is_empty() || s.trim() == "0" => Ok(None),
        Value::Number(n) if n.as_u64() == Some(0) => Ok(None),
        Value::String(s) => s
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| de::Error::custom(format!("expected a number, got `{}`", s))),
        Value::Number(n) => n
            .as_u64()
            .map(Some)
            .ok_or_else(|| de::Error::custom(format!("expected a page id, got {}", n))),
        other => Err(de::Error::custom(format!("expected a page id, got {}", other))),
    }
}
