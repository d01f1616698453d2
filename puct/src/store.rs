//! Arena storage for search-tree nodes.
//!
//! Nodes live in a slab of slots addressed by [`NodeId`]; freed slots are
//! recycled through a free list. Ownership follows the tree's edges:
//! each populated child edge holds one reference to its destination, and a
//! node is freed exactly when its reference count reaches zero during a
//! release traversal. Releases queue nodes on a garbage list which is swept
//! at commit time, so expansion in progress never observes a half-freed
//! subtree.
//!
//! The store also hosts the optional transposition lookup: a map from
//! masked state bytes to the node for that position, consulted at expansion
//! and maintained on insert/remove.

use std::collections::HashMap;

use search_core::{BaseState, HashMask};
use tracing::warn;

use crate::node::{Node, NodeId};

/// Slab of nodes plus the transposition lookup.
pub struct NodeStore {
    slots: Vec<Option<Node>>,
    free: Vec<u32>,
    number_of_nodes: usize,
    allocated_memory: usize,

    hash_mask: HashMask,
    lookup: Option<HashMap<Box<[u8]>, NodeId>>,

    garbage: Vec<NodeId>,
}

impl NodeStore {
    /// An empty store. `use_transpositions` enables the lookup map.
    pub fn new(hash_mask: HashMask, use_transpositions: bool) -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            number_of_nodes: 0,
            allocated_memory: 0,
            hash_mask,
            lookup: use_transpositions.then(HashMap::new),
            garbage: Vec::new(),
        }
    }

    /// The mask under which states are compared for identity.
    #[inline]
    pub fn hash_mask(&self) -> &HashMask {
        &self.hash_mask
    }

    /// Live node count.
    #[inline]
    pub fn number_of_nodes(&self) -> usize {
        self.number_of_nodes
    }

    /// Approximate bytes held by live nodes.
    #[inline]
    pub fn allocated_memory(&self) -> usize {
        self.allocated_memory
    }

    /// Move a node into the store, returning its id.
    pub fn insert(&mut self, node: Node) -> NodeId {
        self.number_of_nodes += 1;
        self.allocated_memory += node.allocated_size as usize;

        let id = match self.free.pop() {
            Some(slot) => {
                self.slots[slot as usize] = Some(node);
                NodeId(slot)
            }
            None => {
                self.slots.push(Some(node));
                NodeId(self.slots.len() as u32 - 1)
            }
        };

        if let Some(lookup) = self.lookup.as_mut() {
            let key = self.slots[id.0 as usize]
                .as_ref()
                .unwrap()
                .state()
                .masked_key(&self.hash_mask);
            // First node for a position wins; later same-position nodes at
            // other depths stay out of the lookup.
            lookup.entry(key).or_insert(id);
        }

        id
    }

    /// Borrow a live node. Panics on a freed id (programming error).
    #[inline]
    pub fn get(&self, id: NodeId) -> &Node {
        self.slots[id.0 as usize]
            .as_ref()
            .expect("node id refers to a freed slot")
    }

    /// Mutably borrow a live node.
    #[inline]
    pub fn get_mut(&mut self, id: NodeId) -> &mut Node {
        self.slots[id.0 as usize]
            .as_mut()
            .expect("node id refers to a freed slot")
    }

    /// Look up a transposition for `state` expected at `depth`. A node at a
    /// different depth is not attached (cycle risk). On a hit the node's
    /// reference count is incremented for the caller's new edge.
    pub fn lookup_transposition(&mut self, state: &BaseState, depth: u16) -> Option<NodeId> {
        let lookup = self.lookup.as_ref()?;
        let key = state.masked_key(&self.hash_mask);
        let id = *lookup.get(&key)?;

        if self.get(id).game_depth != depth {
            return None;
        }

        self.get_mut(id).ref_count += 1;
        Some(id)
    }

    /// Drop one reference to `id`. On reaching zero the node's subtree is
    /// released and the node queued on the garbage list for [`sweep`].
    ///
    /// [`sweep`]: NodeStore::sweep
    pub fn release(&mut self, id: NodeId) {
        let node = self.get_mut(id);
        assert!(node.ref_count > 0, "release of a node with no references");

        node.ref_count -= 1;
        if node.ref_count == 0 {
            self.release_children(id);
            self.garbage.push(id);
        }
    }

    /// Clear every populated child edge of `id`, dropping references and
    /// cascading through subtrees that reach zero.
    fn release_children(&mut self, id: NodeId) {
        for i in 0..self.get(id).num_children() {
            let Some(target) = self.get(id).child(i).to_node else {
                continue;
            };

            // A node already on the garbage list means we walked a cycle.
            if self.get(target).ref_count == 0 {
                warn!("cycle found while releasing nodes, skipping");
                continue;
            }

            self.get_mut(id).child_mut(i).to_node = None;
            self.release(target);
        }
    }

    /// Free everything on the garbage list; returns the number of nodes
    /// removed.
    pub fn sweep(&mut self) -> usize {
        let garbage = std::mem::take(&mut self.garbage);
        let count = garbage.len();
        for id in garbage {
            self.remove(id);
        }
        count
    }

    fn remove(&mut self, id: NodeId) {
        let node = self.slots[id.0 as usize]
            .take()
            .expect("double free of a node slot");

        if let Some(lookup) = self.lookup.as_mut() {
            let key = node.state().masked_key(&self.hash_mask);
            // Only erase the entry if it points at this node; a colliding
            // position at another depth keeps its mapping.
            if lookup.get(&key) == Some(&id) {
                lookup.remove(&key);
            }
        }

        self.allocated_memory -= node.allocated_size as usize;
        self.number_of_nodes -= 1;
        self.free.push(id.0);
    }

    /// Child indices of `id` sorted by destination visits (descending),
    /// ties broken by `policy_prob`, or by `next_prob` when
    /// `by_next_prob` is set.
    pub fn sorted_children(&self, id: NodeId, by_next_prob: bool) -> Vec<usize> {
        let node = self.get(id);
        let mut order: Vec<usize> = (0..node.num_children()).collect();

        order.sort_by(|&a, &b| {
            let ca = node.child(a);
            let cb = node.child(b);
            let visits_a = ca.to_node.map_or(0, |n| self.get(n).visits);
            let visits_b = cb.to_node.map_or(0, |n| self.get(n).visits);

            visits_b.cmp(&visits_a).then_with(|| {
                let (pa, pb) = if by_next_prob {
                    (ca.next_prob, cb.next_prob)
                } else {
                    (ca.policy_prob, cb.policy_prob)
                };
                pb.partial_cmp(&pa).unwrap_or(std::cmp::Ordering::Equal)
            })
        });

        order
    }
}
