use super::types::*;
use std::collections::HashMap;

/// Columnar node arena.
///
/// Nodes live in parallel vectors indexed by [`NodeId`]. Predecessors are held
/// in a CSR layout (`parents_flat` sliced by `parents_ranges`) in edge
/// declaration order; successors in a per-node linked list.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    // Columnar Arrays
    pub kinds: Vec<NodeKind>,
    pub ids: Vec<String>,

    // Topology (CSR Parents)
    pub parents_flat: Vec<NodeId>,
    pub parent_roles: Vec<Option<EdgeRole>>,
    pub parents_ranges: Vec<(u32, u32)>, // (start, count)

    // Downstream traversal helpers
    pub first_child: Vec<u32>,
    pub child_targets: Vec<NodeId>,
    pub next_child: Vec<u32>,

    lookup: HashMap<String, NodeId>,
}

/// A resolved edge ready to be laid out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Link {
    pub from: NodeId,
    pub to: NodeId,
    pub role: Option<EdgeRole>,
}

impl Registry {
    pub fn new() -> Self { Self::default() }
    pub fn count(&self) -> usize { self.kinds.len() }

    /// Appends a node. Returns `None` when the id is already taken.
    pub fn add_node(&mut self, id: String, kind: NodeKind) -> Option<NodeId> {
        if self.lookup.contains_key(&id) {
            return None;
        }
        let node = NodeId::new(self.kinds.len());
        self.lookup.insert(id.clone(), node);
        self.ids.push(id);
        self.kinds.push(kind);
        self.parents_ranges.push((0, 0));
        self.first_child.push(u32::MAX);
        Some(node)
    }

    /// Lays out every edge at once. Parents are bucketed by target with a
    /// stable counting sort, so each node keeps its edges in declaration order.
    pub fn set_links(&mut self, links: &[Link]) {
        let count = self.count();
        let mut in_degree = vec![0u32; count];
        for link in links {
            in_degree[link.to.index()] += 1;
        }

        let mut start = 0u32;
        for (i, &deg) in in_degree.iter().enumerate() {
            self.parents_ranges[i] = (start, deg);
            start += deg;
        }

        let mut cursor: Vec<u32> = self.parents_ranges.iter().map(|&(s, _)| s).collect();
        self.parents_flat = vec![NodeId::default(); links.len()];
        self.parent_roles = vec![None; links.len()];
        self.first_child = vec![u32::MAX; count];
        self.child_targets.clear();
        self.next_child.clear();

        for link in links {
            let slot = &mut cursor[link.to.index()];
            self.parents_flat[*slot as usize] = link.from;
            self.parent_roles[*slot as usize] = link.role;
            *slot += 1;

            // Children (Adjacency list for downstream lookups)
            let p_idx = link.from.index();
            let head = self.first_child[p_idx];
            let new_edge = self.child_targets.len() as u32;
            self.child_targets.push(link.to);
            self.next_child.push(head);
            self.first_child[p_idx] = new_edge;
        }
    }

    pub fn lookup(&self, id: &str) -> Option<NodeId> {
        self.lookup.get(id).copied()
    }

    #[inline(always)]
    pub fn get_parents(&self, id: NodeId) -> &[NodeId] {
        let (start, count) = self.parents_ranges[id.index()];
        &self.parents_flat[start as usize..(start + count) as usize]
    }

    #[inline(always)]
    pub fn get_parent_roles(&self, id: NodeId) -> &[Option<EdgeRole>] {
        let (start, count) = self.parents_ranges[id.index()];
        &self.parent_roles[start as usize..(start + count) as usize]
    }

    /// Successors of a node, most recently declared edge first.
    pub fn children(&self, id: NodeId) -> Children<'_> {
        Children { registry: self, edge: self.first_child[id.index()] }
    }
}

pub struct Children<'a> {
    registry: &'a Registry,
    edge: u32,
}

impl Iterator for Children<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        if self.edge == u32::MAX {
            return None;
        }
        let idx = self.edge as usize;
        self.edge = self.registry.next_child[idx];
        Some(self.registry.child_targets[idx])
    }
}
