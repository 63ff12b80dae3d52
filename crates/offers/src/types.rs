use funnel_core::types::{BumpSelectionState, ProductId};
use funnel_journey::NextStep;
use funnel_pricing::PriceComputationResult;
use serde::{Deserialize, Serialize};

/// A bump as presented on a checkout page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BumpOffer {
    pub bump_id: String,
    pub product_id: ProductId,
    pub quantity: u32,
    pub state: BumpSelectionState,
}

/// How a checkout's product table lets the visitor choose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionMode {
    /// Exactly one product: choosing one replaces the cart.
    Radio,
    /// Independent add/remove per product.
    Checkbox,
}

/// A visitor's choice in a bundle or bump table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BundleSelection {
    pub product_id: ProductId,
    pub quantity: u32,
    pub mode: SelectionMode,
    /// Checkbox state after the click. Ignored in radio mode.
    #[serde(default = "default_checked")]
    pub checked: bool,
    /// When set, the quantity field of this cart line was edited instead.
    #[serde(default)]
    pub line_key: Option<String>,
}

fn default_checked() -> bool {
    true
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuantityMode {
    Add,
    Remove,
    Set,
}

/// A direct cart quantity edit. `id` is a product or variation id for
/// `add`/`remove` and a cart line key for `set`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuantityChange {
    pub id: String,
    pub quantity: u32,
    pub mode: QuantityMode,
}

/// Result of accepting an upsell or downsell.
#[derive(Debug, Clone)]
pub struct UpsellOutcome {
    pub product_id: ProductId,
    /// False when the product was already in the cart.
    pub added: bool,
    /// Upsell-scoped unit price given to the added line. `None` when the
    /// offer carries no discount or the product was already in the cart.
    pub price: Option<f64>,
    pub pricing: PriceComputationResult,
    pub next: NextStep,
}
