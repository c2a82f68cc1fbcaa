use crate::store::{NodeId, Registry};
use petgraph::algo::tarjan_scc;
use petgraph::graph::DiGraph;
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashSet, VecDeque};

/// Marks every node the `target` depends on, including `target` itself.
pub fn upstream_from(registry: &Registry, target: NodeId) -> Vec<bool> {
    let mut live = vec![false; registry.count()];
    let mut queue = VecDeque::from([target]);

    while let Some(node) = queue.pop_front() {
        if !live[node.index()] {
            live[node.index()] = true;
            queue.extend(registry.get_parents(node).iter().copied());
        }
    }
    live
}

/// Identifies all nodes downstream from the given start nodes.
pub fn downstream_from(registry: &Registry, start_nodes: &[NodeId]) -> HashSet<NodeId> {
    let mut visited = HashSet::new();
    let mut queue = VecDeque::from(start_nodes.to_vec());

    while let Some(node) = queue.pop_front() {
        if visited.insert(node) {
            queue.extend(registry.children(node));
        }
    }
    visited
}

/// Topological sort of the nodes flagged in `live`, using Kahn's algorithm.
///
/// Among nodes whose dependencies are all satisfied, the one declared first is
/// emitted first, so the order is identical across runs. On failure, returns
/// the nodes that take part in a cycle.
pub fn sort(registry: &Registry, live: &[bool]) -> Result<Vec<NodeId>, Vec<NodeId>> {
    let count = registry.count();
    let mut in_degree = vec![0usize; count];
    let mut ready = BinaryHeap::new();
    let mut live_count = 0;

    for i in 0..count {
        if !live[i] {
            continue;
        }
        live_count += 1;
        // Parallel edges count twice; they are also released twice below.
        in_degree[i] = registry.get_parents(NodeId::new(i)).len();
        if in_degree[i] == 0 {
            ready.push(Reverse(NodeId::new(i)));
        }
    }

    let mut order = Vec::with_capacity(live_count);
    while let Some(Reverse(node)) = ready.pop() {
        order.push(node);
        for child in registry.children(node) {
            let idx = child.index();
            if !live[idx] {
                continue;
            }
            in_degree[idx] -= 1;
            if in_degree[idx] == 0 {
                ready.push(Reverse(child));
            }
        }
    }

    if order.len() != live_count {
        return Err(cycle_members(registry, live));
    }
    Ok(order)
}

/// Finds the nodes of `live` that sit on a cycle (non-trivial strongly
/// connected components, or self-loops), sorted by declaration order.
fn cycle_members(registry: &Registry, live: &[bool]) -> Vec<NodeId> {
    let mut graph: DiGraph<NodeId, ()> = DiGraph::with_capacity(registry.count(), registry.parents_flat.len());
    let handles: Vec<_> = (0..registry.count()).map(|i| graph.add_node(NodeId::new(i))).collect();

    for i in (0..registry.count()).filter(|&i| live[i]) {
        for &parent in registry.get_parents(NodeId::new(i)) {
            if live[parent.index()] {
                graph.add_edge(handles[parent.index()], handles[i], ());
            }
        }
    }

    let mut members: Vec<NodeId> = tarjan_scc(&graph)
        .into_iter()
        .filter(|scc| scc.len() > 1 || graph.contains_edge(scc[0], scc[0]))
        .flatten()
        .map(|ix| graph[ix])
        .collect();
    members.sort();
    members
}
