use funnel_core::types::{
    Condition, FunnelId, NodeId, PageId, ProductDiscountSpec, ProductId, StepType,
};
use serde::{Deserialize, Serialize};

/// A funnel definition: its nodes in editor order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunnelGraph {
    pub funnel_id: FunnelId,
    pub name: String,
    pub nodes: Vec<FunnelNode>,
}

impl FunnelGraph {
    pub fn node(&self, id: &NodeId) -> Option<&FunnelNode> {
        self.nodes.iter().find(|n| &n.id == id)
    }

    /// The funnel's thank-you step, used whenever no explicit successor exists.
    pub fn terminal(&self) -> Option<&FunnelNode> {
        self.nodes
            .iter()
            .find(|n| n.step_type == StepType::Thankyou)
    }
}

/// One validated step of a funnel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunnelNode {
    pub id: NodeId,
    pub funnel_id: FunnelId,
    pub step_type: StepType,
    /// Absent only on decision nodes, which never render a page.
    pub page_id: Option<PageId>,
    /// `targets[0]` is the forward (yes) edge, `targets[1]` the reject (no)
    /// edge. `None` entries resolve to the funnel's terminal step.
    pub targets: Vec<Option<NodeId>>,
    pub data: NodeData,
}

impl FunnelNode {
    pub fn is_decision(&self) -> bool {
        self.step_type == StepType::Decision
    }

    pub fn page(&self) -> PageId {
        self.page_id.unwrap_or_default()
    }

    pub fn forward(&self) -> Option<&NodeId> {
        self.targets.first().and_then(Option::as_ref)
    }

    pub fn reject(&self) -> Option<&NodeId> {
        self.targets.get(1).and_then(Option::as_ref)
    }

    /// Offered products of this step, empty when the step sells nothing.
    pub fn product_specs(&self) -> &[ProductDiscountSpec] {
        self.data
            .products
            .as_ref()
            .map(|p| p.list.as_slice())
            .unwrap_or(&[])
    }

    /// The single product an upsell/downsell step offers.
    pub fn offered_product(&self) -> Option<&ProductDiscountSpec> {
        self.product_specs().first()
    }
}

/// Step payload edited in the funnel builder.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeData {
    #[serde(default)]
    pub conditions: ConditionSet,
    #[serde(default)]
    pub products: Option<ProductList>,
    #[serde(default)]
    pub bumps: Vec<BumpConfig>,
    #[serde(default)]
    pub optimization: Option<Optimization>,
}

/// Condition data as stored. Unparseable data is kept, not rejected, so a
/// segmentation misconfiguration degrades a branch instead of blocking the
/// whole funnel from loading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "state", content = "value")]
pub enum ConditionSet {
    Valid(Vec<Condition>),
    Malformed(String),
}

impl Default for ConditionSet {
    fn default() -> Self {
        ConditionSet::Valid(Vec::new())
    }
}

impl ConditionSet {
    pub fn is_empty(&self) -> bool {
        matches!(self, ConditionSet::Valid(list) if list.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductList {
    #[serde(default)]
    pub list: Vec<ProductDiscountSpec>,
    /// In exclusive selection mode, whether products already in the cart
    /// count as selectable options.
    #[serde(default = "default_reset_cart")]
    pub reset_cart: bool,
}

fn default_reset_cart() -> bool {
    true
}

impl ProductList {
    pub fn new(list: Vec<ProductDiscountSpec>) -> Self {
        Self {
            list,
            reset_cart: true,
        }
    }

    pub fn spec_for(&self, product_id: ProductId) -> Option<&ProductDiscountSpec> {
        self.list.iter().find(|s| s.product_id == product_id)
    }
}

/// An order bump configured on a checkout step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BumpConfig {
    pub id: String,
    #[serde(default)]
    pub conditions: ConditionSet,
    pub products: ProductList,
}

impl BumpConfig {
    /// A bump offers exactly one product: the first of its list.
    pub fn product(&self) -> Option<&ProductDiscountSpec> {
        self.products.list.first()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Optimization {
    #[serde(default)]
    pub auto_apply_coupons: Vec<String>,
}

/// Where navigation lands after a visitor action.
#[derive(Debug, Clone)]
pub enum NextStep {
    Step(FunnelNode),
    /// No explicit successor: the funnel's thank-you step.
    Terminal(FunnelNode),
}

impl NextStep {
    pub fn node(&self) -> &FunnelNode {
        match self {
            NextStep::Step(node) | NextStep::Terminal(node) => node,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, NextStep::Terminal(_))
    }
}
