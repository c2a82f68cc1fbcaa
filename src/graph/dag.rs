//! Wraps the low-level Registry with parsing, validation and ordering.

use super::definition::{EdgeDefinition, GraphDefinition, NodeDefinition};
use super::error::GraphError;
use crate::analysis::topology;
use crate::store::{EdgeRole, Link, NodeId, NodeKind, Registry};
use tracing::{debug, warn};

/// An immutable, validated PAM formula.
///
/// Built once per calculation request and shared read-only by any number of
/// executions. "Changing" a graph means parsing a new one.
#[derive(Debug, Clone)]
pub struct PricingGraph {
    pub(crate) store: Registry,
    output: NodeId,
    /// Nodes the output depends on. Only these are ordered and evaluated.
    live: Vec<bool>,
    order: Vec<NodeId>,
}

impl PricingGraph {
    /// Validates a definition and lays it out in the arena.
    ///
    /// Checks, in order: unique ids, node configs, edge endpoints, the output
    /// node, and acyclicity of everything the output depends on.
    pub fn parse(definition: &GraphDefinition) -> Result<Self, GraphError> {
        let mut store = Registry::new();

        for NodeDefinition { id, node_type, config } in &definition.nodes {
            let kind = NodeKind::from_config(*node_type, config).map_err(|e| GraphError::InvalidConfig {
                node_id: id.clone(),
                reason: e.to_string(),
            })?;
            if store.add_node(id.clone(), kind).is_none() {
                return Err(GraphError::DuplicateNode { id: id.clone() });
            }
        }

        let mut links = Vec::with_capacity(definition.edges.len());
        for EdgeDefinition { from, to, role } in &definition.edges {
            let resolve = |id: &String| {
                store.lookup(id).ok_or_else(|| GraphError::DanglingEdge {
                    from: from.clone(),
                    to: to.clone(),
                    missing: id.clone(),
                })
            };
            links.push(Link { from: resolve(from)?, to: resolve(to)?, role: *role });
        }
        store.set_links(&links);

        let output = store
            .lookup(&definition.output)
            .ok_or_else(|| GraphError::MissingOutput { id: definition.output.clone() })?;

        let live = topology::upstream_from(&store, output);
        let order = topology::sort(&store, &live).map_err(|cycle| GraphError::CyclicGraph {
            nodes: cycle.into_iter().map(|n| store.ids[n.index()].clone()).collect(),
        })?;

        debug!(
            nodes = store.count(),
            edges = links.len(),
            evaluated = order.len(),
            output = %definition.output,
            "parsed pricing graph"
        );

        let graph = Self { store, output, live, order };
        let unreachable = graph.unreachable();
        if !unreachable.is_empty() {
            warn!(nodes = ?unreachable, "nodes do not feed the output and will not be evaluated");
        }
        Ok(graph)
    }

    pub fn from_json(json: &str) -> Result<Self, GraphError> {
        Self::parse(&GraphDefinition::from_json(json)?)
    }

    /// Rebuilds the stored form. Parsing the result yields an equal graph.
    pub fn to_definition(&self) -> Result<GraphDefinition, GraphError> {
        let mut nodes = Vec::with_capacity(self.node_count());
        for (i, kind) in self.store.kinds.iter().enumerate() {
            let config = kind.to_config().map_err(|e| GraphError::InvalidConfig {
                node_id: self.store.ids[i].clone(),
                reason: e.to_string(),
            })?;
            nodes.push(NodeDefinition { id: self.store.ids[i].clone(), node_type: kind.node_type(), config });
        }

        // Edges are emitted grouped by target, which preserves every node's
        // predecessor order.
        let mut edges = Vec::with_capacity(self.store.parents_flat.len());
        for i in 0..self.node_count() {
            let to = NodeId::new(i);
            for (&from, &role) in self.predecessors(to).iter().zip(self.predecessor_roles(to)) {
                edges.push(EdgeDefinition { from: self.id(from).to_string(), to: self.id(to).to_string(), role });
            }
        }

        Ok(GraphDefinition { nodes, edges, output: self.id(self.output).to_string() })
    }

    pub fn to_json(&self) -> Result<String, GraphError> {
        serde_json::to_string(&self.to_definition()?).map_err(GraphError::from)
    }

    // --- Accessors ---
    pub fn node_count(&self) -> usize { self.store.count() }
    pub fn output(&self) -> NodeId { self.output }
    pub fn output_id(&self) -> &str { self.id(self.output) }
    pub fn id(&self, node: NodeId) -> &str { &self.store.ids[node.index()] }
    pub fn kind(&self, node: NodeId) -> &NodeKind { &self.store.kinds[node.index()] }
    pub fn lookup(&self, id: &str) -> Option<NodeId> { self.store.lookup(id) }
    pub fn predecessors(&self, node: NodeId) -> &[NodeId] { self.store.get_parents(node) }
    pub fn predecessor_roles(&self, node: NodeId) -> &[Option<EdgeRole>] { self.store.get_parent_roles(node) }
    pub fn is_live(&self, node: NodeId) -> bool { self.live[node.index()] }

    /// Predecessor ids of `id` in edge declaration order, or `None` for an unknown id.
    pub fn predecessors_of(&self, id: &str) -> Option<Vec<&str>> {
        let node = self.lookup(id)?;
        Some(self.predecessors(node).iter().map(|&p| self.id(p)).collect())
    }

    /// Evaluation order of every node the output depends on. Deterministic:
    /// ties are broken by declaration order.
    pub fn topological_order(&self) -> &[NodeId] { &self.order }

    pub fn topological_ids(&self) -> Vec<&str> {
        self.order.iter().map(|&n| self.id(n)).collect()
    }

    /// Nodes declared in the definition that the output does not depend on.
    pub fn unreachable(&self) -> Vec<&str> {
        (0..self.node_count())
            .filter(|&i| !self.live[i])
            .map(|i| self.store.ids[i].as_str())
            .collect()
    }

    /// Nodes whose value changes when `id` changes, in declaration order,
    /// including `id` itself.
    pub fn dependents_of(&self, id: &str) -> Option<Vec<&str>> {
        let node = self.lookup(id)?;
        let mut hits: Vec<NodeId> = topology::downstream_from(&self.store, &[node]).into_iter().collect();
        hits.sort();
        Some(hits.into_iter().map(|n| self.id(n)).collect())
    }
}
