use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use dashmap::DashMap;
use funnel_core::error::{FunnelError, FunnelResult};
use funnel_core::types::{FunnelId, NodeId, PageId, StepType};
use tracing::info;

use crate::boundary::parse_funnels;
use crate::types::{FunnelGraph, FunnelNode};

/// Read-only view of funnel graphs owned by the funnel editor.
pub trait FunnelStore: Send + Sync {
    fn node(&self, funnel_id: FunnelId, node_id: &NodeId) -> Option<FunnelNode>;

    fn node_by_page(&self, page_id: PageId) -> Option<FunnelNode>;

    /// Nodes of a funnel in editor order.
    fn nodes(&self, funnel_id: FunnelId) -> Vec<FunnelNode>;

    fn terminal(&self, funnel_id: FunnelId) -> Option<FunnelNode>;
}

/// Funnel graphs held in memory, validated when they are registered.
#[derive(Clone, Default)]
pub struct InMemoryFunnelStore {
    funnels: Arc<DashMap<FunnelId, FunnelGraph>>,
    pages: Arc<DashMap<PageId, (FunnelId, NodeId)>>,
}

impl std::fmt::Debug for InMemoryFunnelStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryFunnelStore")
            .field("funnels", &self.funnels.len())
            .field("pages", &self.pages.len())
            .finish()
    }
}

impl InMemoryFunnelStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a JSON array of funnels and registers each one.
    pub fn from_json(raw: &str) -> FunnelResult<Self> {
        let store = Self::new();
        for graph in parse_funnels(raw)? {
            store.register(graph)?;
        }
        Ok(store)
    }

    /// Validates and stores a funnel, replacing any previous version.
    pub fn register(&self, graph: FunnelGraph) -> FunnelResult<()> {
        validate_graph(&graph)?;

        for node in &graph.nodes {
            if let Some(page) = node.page_id {
                if let Some(owner) = self.pages.get(&page) {
                    if owner.0 != graph.funnel_id {
                        return Err(FunnelError::Configuration(format!(
                            "page {} already belongs to funnel {}",
                            page, owner.0
                        )));
                    }
                }
            }
        }

        self.pages.retain(|_, (funnel, _)| *funnel != graph.funnel_id);
        for node in &graph.nodes {
            if let Some(page) = node.page_id {
                self.pages.insert(page, (graph.funnel_id, node.id.clone()));
            }
        }

        info!(
            funnel_id = graph.funnel_id,
            name = %graph.name,
            nodes = graph.nodes.len(),
            "Registered funnel"
        );
        self.funnels.insert(graph.funnel_id, graph);
        Ok(())
    }

    pub fn get_funnel(&self, funnel_id: FunnelId) -> Option<FunnelGraph> {
        self.funnels.get(&funnel_id).map(|r| r.clone())
    }

    pub fn list_funnels(&self) -> Vec<FunnelId> {
        let mut ids: Vec<FunnelId> = self.funnels.iter().map(|r| *r.key()).collect();
        ids.sort_unstable();
        ids
    }

    pub fn remove_funnel(&self, funnel_id: FunnelId) -> FunnelResult<()> {
        self.funnels.remove(&funnel_id).ok_or_else(|| {
            FunnelError::not_found(funnel_core::RecordKind::Funnel, funnel_id)
        })?;
        self.pages.retain(|_, (funnel, _)| *funnel != funnel_id);
        info!(funnel_id, "Removed funnel");
        Ok(())
    }
}

impl FunnelStore for InMemoryFunnelStore {
    fn node(&self, funnel_id: FunnelId, node_id: &NodeId) -> Option<FunnelNode> {
        self.funnels
            .get(&funnel_id)
            .and_then(|g| g.node(node_id).cloned())
    }

    fn node_by_page(&self, page_id: PageId) -> Option<FunnelNode> {
        let (funnel_id, node_id) = self.pages.get(&page_id).map(|r| r.clone())?;
        self.node(funnel_id, &node_id)
    }

    fn nodes(&self, funnel_id: FunnelId) -> Vec<FunnelNode> {
        self.funnels
            .get(&funnel_id)
            .map(|g| g.nodes.clone())
            .unwrap_or_default()
    }

    fn terminal(&self, funnel_id: FunnelId) -> Option<FunnelNode> {
        self.funnels
            .get(&funnel_id)
            .and_then(|g| g.terminal().cloned())
    }
}

/// Save-time checks: unique ids and pages, resolvable targets, a terminal
/// step, and no cycle made only of decision nodes.
pub fn validate_graph(graph: &FunnelGraph) -> FunnelResult<()> {
    let mut ids = HashSet::new();
    let mut pages = HashSet::new();
    for node in &graph.nodes {
        if !ids.insert(&node.id) {
            return Err(FunnelError::Configuration(format!(
                "funnel {} has duplicate node id {}",
                graph.funnel_id, node.id
            )));
        }
        if let Some(page) = node.page_id {
            if !pages.insert(page) {
                return Err(FunnelError::Configuration(format!(
                    "funnel {} uses page {} twice",
                    graph.funnel_id, page
                )));
            }
        }
    }

    for node in &graph.nodes {
        for target in node.targets.iter().flatten() {
            if !ids.contains(target) {
                return Err(FunnelError::Configuration(format!(
                    "node {} in funnel {} points at missing node {}",
                    node.id, graph.funnel_id, target
                )));
            }
        }
    }

    if !graph
        .nodes
        .iter()
        .any(|n| n.step_type == StepType::Thankyou)
    {
        return Err(FunnelError::Configuration(format!(
            "funnel {} has no thank-you step",
            graph.funnel_id
        )));
    }

    if let Some(node) = find_decision_cycle(graph) {
        return Err(FunnelError::Configuration(format!(
            "funnel {} has a decision cycle through node {}",
            graph.funnel_id, node
        )));
    }

    Ok(())
}

#[derive(Clone, Copy, PartialEq)]
enum Mark {
    Visiting,
    Done,
}

/// Depth-first search over decision-to-decision edges, iterative so a
/// deep graph cannot overflow the stack.
fn find_decision_cycle(graph: &FunnelGraph) -> Option<NodeId> {
    let decisions: HashMap<&NodeId, &FunnelNode> = graph
        .nodes
        .iter()
        .filter(|n| n.is_decision())
        .map(|n| (&n.id, n))
        .collect();
    let mut marks: HashMap<&NodeId, Mark> = HashMap::new();

    for start in decisions.keys() {
        if marks.contains_key(start) {
            continue;
        }
        let mut stack: Vec<(&NodeId, usize)> = vec![(start, 0)];
        marks.insert(start, Mark::Visiting);

        while let Some((id, edge)) = stack.pop() {
            let node = decisions[id];
            let next = node.targets.iter().flatten().nth(edge);
            match next {
                None => {
                    marks.insert(id, Mark::Done);
                }
                Some(target) => {
                    stack.push((id, edge + 1));
                    if !decisions.contains_key(target) {
                        continue;
                    }
                    match marks.get(target) {
                        Some(Mark::Visiting) => return Some(target.clone()),
                        Some(Mark::Done) => {}
                        None => {
                            marks.insert(target, Mark::Visiting);
                            stack.push((target, 0));
                        }
                    }
                }
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::NodeData;

    fn node(id: &str, step_type: StepType, page: Option<PageId>, targets: &[Option<&str>]) -> FunnelNode {
        FunnelNode {
            id: NodeId::new(id),
            funnel_id: 1,
            step_type,
            page_id: page,
            targets: targets.iter().map(|t| t.map(NodeId::new)).collect(),
            data: NodeData::default(),
        }
    }

    fn graph(nodes: Vec<FunnelNode>) -> FunnelGraph {
        FunnelGraph {
            funnel_id: 1,
            name: "Test".into(),
            nodes,
        }
    }

    #[test]
    fn test_register_and_lookup() {
        let store = InMemoryFunnelStore::new();
        store
            .register(graph(vec![
                node("checkout", StepType::Checkout, Some(10), &[Some("thanks")]),
                node("thanks", StepType::Thankyou, Some(11), &[]),
            ]))
            .unwrap();

        assert_eq!(store.node_by_page(10).unwrap().id, NodeId::new("checkout"));
        assert_eq!(store.terminal(1).unwrap().page_id, Some(11));
        assert_eq!(store.nodes(1).len(), 2);
        assert_eq!(store.list_funnels(), vec![1]);
    }

    #[test]
    fn test_missing_terminal_rejected() {
        let store = InMemoryFunnelStore::new();
        let err = store
            .register(graph(vec![node("checkout", StepType::Checkout, Some(10), &[None])]))
            .unwrap_err();
        assert!(matches!(err, FunnelError::Configuration(_)));
    }

    #[test]
    fn test_dangling_target_rejected() {
        let err = validate_graph(&graph(vec![
            node("checkout", StepType::Checkout, Some(10), &[Some("ghost")]),
            node("thanks", StepType::Thankyou, Some(11), &[]),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("ghost"));
    }

    #[test]
    fn test_decision_cycle_rejected() {
        let err = validate_graph(&graph(vec![
            node("d1", StepType::Decision, None, &[Some("d2"), Some("thanks")]),
            node("d2", StepType::Decision, None, &[Some("thanks"), Some("d1")]),
            node("thanks", StepType::Thankyou, Some(11), &[]),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("decision cycle"));
    }

    #[test]
    fn test_cycle_through_pages_allowed() {
        validate_graph(&graph(vec![
            node("d1", StepType::Decision, None, &[Some("up"), Some("thanks")]),
            node("up", StepType::Upsell, Some(12), &[Some("d1"), None]),
            node("thanks", StepType::Thankyou, Some(11), &[]),
        ]))
        .unwrap();
    }

    #[test]
    fn test_page_owned_by_other_funnel() {
        let store = InMemoryFunnelStore::new();
        store
            .register(graph(vec![node("thanks", StepType::Thankyou, Some(11), &[])]))
            .unwrap();

        let mut other = graph(vec![node("thanks", StepType::Thankyou, Some(11), &[])]);
        other.funnel_id = 2;
        other.nodes[0].funnel_id = 2;
        assert!(store.register(other).is_err());
    }

    #[test]
    fn test_reregister_replaces_pages() {
        let store = InMemoryFunnelStore::new();
        store
            .register(graph(vec![node("thanks", StepType::Thankyou, Some(11), &[])]))
            .unwrap();
        store
            .register(graph(vec![node("thanks", StepType::Thankyou, Some(15), &[])]))
            .unwrap();
        assert!(store.node_by_page(11).is_none());
        assert!(store.node_by_page(15).is_some());

        store.remove_funnel(1).unwrap();
        assert!(store.node_by_page(15).is_none());
        assert!(store.remove_funnel(1).is_err());
    }

    #[test]
    fn test_from_json() {
        let raw = r#"[{
            "id": 3,
            "name": "Spring",
            "nodes": [
                {"id": "c", "type": {"key": "checkout"}, "page_id": 30, "targets": [{"nodeId": "t"}]},
                {"id": "t", "type": {"key": "thankyou"}, "page_id": 31}
            ]
        }]"#;
        let store = InMemoryFunnelStore::from_json(raw).unwrap();
        assert_eq!(store.get_funnel(3).unwrap().name, "Spring");
    }
}
