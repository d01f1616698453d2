//! Request/reply adapter between tree nodes and the evaluator.
//!
//! Bundles one non-finalised node into an [`EvalRequest`] (channel-encoding
//! the node's state plus as much parent history as the transformer wants)
//! and maps the [`ModelReply`] back onto the node: child priors from the
//! lead role's policy head, node scores from the reward head.

use search_core::StateTransformer;

use crate::evaluator::{EvalRequest, ModelReply};
use crate::node::NodeId;
use crate::store::NodeStore;

/// One pending evaluation of a node.
#[derive(Debug, Clone, Copy)]
pub struct NodeRequest {
    node: NodeId,
}

impl NodeRequest {
    pub fn new(node: NodeId) -> Self {
        Self { node }
    }

    #[inline]
    pub fn node(&self) -> NodeId {
        self.node
    }

    /// Encode the node (and up to `num_prev_states` ancestors, most recent
    /// first) into an evaluation request.
    pub fn build(&self, store: &NodeStore, transformer: &dyn StateTransformer) -> EvalRequest {
        let node = store.get(self.node);

        let mut prev_ids = Vec::with_capacity(transformer.num_prev_states());
        let mut cur = node.parent;
        for _ in 0..transformer.num_prev_states() {
            let Some(id) = cur else { break };
            prev_ids.push(id);
            cur = store.get(id).parent;
        }

        let prev_states: Vec<_> = prev_ids.iter().map(|&id| store.get(id).state()).collect();

        let mut channels = vec![0.0; transformer.channel_len()];
        transformer.to_channels(node.state(), &prev_states, &mut channels);

        // Dense policy length per role: enough to index every legal this
        // node's children use.
        let mut policy_sizes = vec![0usize; node.role_count()];
        for child in node.children() {
            for (role, legal) in child.joint_move.iter().enumerate() {
                policy_sizes[role] = policy_sizes[role].max(legal as usize + 1);
            }
        }

        EvalRequest {
            channels,
            policy_sizes,
            num_rewards: transformer.num_rewards(),
        }
    }

    /// Fold the network's answer into the node: floored and normalised
    /// child priors, clamped per-role scores.
    pub fn apply(
        &self,
        store: &mut NodeStore,
        transformer: &dyn StateTransformer,
        reply: &ModelReply,
    ) {
        let node = store.get_mut(self.node);
        let role_count = node.role_count();

        // Child priors from the lead role's policy head; for simultaneous
        // nodes the joint prior is the product across roles.
        let mut total_prediction = 0.0f32;
        for i in 0..node.num_children() {
            let raw = match node.lead_role {
                Some(lead) => {
                    let legal = node.child(i).joint_move.get(lead);
                    reply.policy(lead)[legal as usize]
                }
                None => {
                    let mv = node.child(i).joint_move.clone();
                    (0..role_count)
                        .map(|role| reply.policy(role)[mv.get(role) as usize])
                        .product()
                }
            };

            // Give every move at least some probability.
            let floored = raw.max(0.001);
            node.child_mut(i).policy_prob_orig = floored;
            total_prediction += floored;
        }

        // Cannot be zero given the per-child floor.
        assert!(total_prediction > f32::MIN_POSITIVE, "zero policy mass");

        for i in 0..node.num_children() {
            let child = node.child_mut(i);
            child.policy_prob_orig /= total_prediction;
            child.policy_prob = child.policy_prob_orig;
        }

        for role in 0..role_count {
            let mut s = reply.reward(role);
            if transformer.num_rewards() == 3 {
                s += reply.reward(2) / 2.0;
            }
            let s = s.clamp(0.0, 1.0);

            node.set_final_score(role, s);
            node.set_current_score(role, s);
        }
    }
}
