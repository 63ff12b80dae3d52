//! Storage boundary: loosely shaped funnel JSON in, validated graphs out.
//!
//! The editor stores nodes as `{ id, type: { key }, page_id, targets: [{ nodeId }], data }`
//! with `"none"` marking an unset target.

use funnel_core::error::{FunnelError, FunnelResult};
use funnel_core::types::{Condition, FunnelId, NodeId, PageId, StepType};
use serde::Deserialize;

use crate::types::{
    BumpConfig, ConditionSet, FunnelGraph, FunnelNode, NodeData, Optimization, ProductList,
};

const NONE_SENTINEL: &str = "none";

#[derive(Debug, Clone, Deserialize)]
pub struct RawFunnel {
    pub id: FunnelId,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub nodes: Vec<RawNode>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawNode {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: RawStepType,
    #[serde(default)]
    pub page_id: Option<PageId>,
    #[serde(default)]
    pub targets: Vec<RawTarget>,
    #[serde(default)]
    pub data: RawNodeData,
}

/// Step type stored either bare (`"upsell"`) or wrapped (`{ "key": "upsell" }`).
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RawStepType {
    Bare(StepType),
    Keyed { key: StepType },
}

impl RawStepType {
    fn step_type(&self) -> StepType {
        match self {
            RawStepType::Bare(t) | RawStepType::Keyed { key: t } => *t,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawTarget {
    #[serde(rename = "nodeId", default)]
    pub node_id: Option<String>,
}

impl RawTarget {
    fn resolve(&self) -> Option<NodeId> {
        self.node_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty() && *id != NONE_SENTINEL && *id != "0")
            .map(NodeId::new)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawNodeData {
    #[serde(default)]
    pub conditions: serde_json::Value,
    #[serde(default)]
    pub products: Option<ProductList>,
    #[serde(default)]
    pub bumps: Vec<RawBump>,
    #[serde(default)]
    pub optimization: Option<Optimization>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawBump {
    pub id: String,
    #[serde(default)]
    pub conditions: serde_json::Value,
    pub products: ProductList,
}

/// Parses stored condition data without failing the node.
pub fn parse_conditions(value: serde_json::Value) -> ConditionSet {
    match value {
        serde_json::Value::Null => ConditionSet::Valid(Vec::new()),
        serde_json::Value::Array(_) => match serde_json::from_value::<Vec<Condition>>(value) {
            Ok(list) => ConditionSet::Valid(list),
            Err(e) => ConditionSet::Malformed(e.to_string()),
        },
        other => ConditionSet::Malformed(format!("expected a condition list, got {}", other)),
    }
}

impl FunnelNode {
    pub fn from_raw(funnel_id: FunnelId, raw: RawNode) -> FunnelResult<Self> {
        let step_type = raw.kind.step_type();
        let targets: Vec<Option<NodeId>> = raw.targets.iter().map(RawTarget::resolve).collect();
        let page_id = raw.page_id.filter(|p| *p > 0);

        if step_type == StepType::Decision && targets.len() != 2 {
            return Err(FunnelError::Configuration(format!(
                "decision node {} in funnel {} must have exactly two targets, found {}",
                raw.id,
                funnel_id,
                targets.len()
            )));
        }
        if step_type != StepType::Decision && page_id.is_none() {
            return Err(FunnelError::Configuration(format!(
                "{} node {} in funnel {} has no page",
                step_type, raw.id, funnel_id
            )));
        }

        let bumps = raw
            .data
            .bumps
            .into_iter()
            .map(|b| BumpConfig {
                id: b.id,
                conditions: parse_conditions(b.conditions),
                products: b.products,
            })
            .collect();

        Ok(FunnelNode {
            id: NodeId::new(raw.id),
            funnel_id,
            step_type,
            page_id,
            targets,
            data: NodeData {
                conditions: parse_conditions(raw.data.conditions),
                products: raw.data.products,
                bumps,
                optimization: raw.data.optimization,
            },
        })
    }
}

impl TryFrom<RawFunnel> for FunnelGraph {
    type Error = FunnelError;

    fn try_from(raw: RawFunnel) -> FunnelResult<Self> {
        let funnel_id = raw.id;
        let nodes = raw
            .nodes
            .into_iter()
            .map(|n| FunnelNode::from_raw(funnel_id, n))
            .collect::<FunnelResult<Vec<_>>>()?;
        Ok(FunnelGraph {
            funnel_id,
            name: raw.name,
            nodes,
        })
    }
}

/// Parses a JSON array of raw funnels.
pub fn parse_funnels(raw: &str) -> FunnelResult<Vec<FunnelGraph>> {
    let funnels: Vec<RawFunnel> = serde_json::from_str(raw)?;
    funnels.into_iter().map(FunnelGraph::try_from).collect()
}
