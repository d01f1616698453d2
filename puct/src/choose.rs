//! Final move selection at the root.
//!
//! Two policies: top-visits (greedy over the visit counts, with a
//! best-guess override when the runner-up looks better) and temperature
//! sampling over a smoothed visit distribution, active early in the game
//! per the depth schedule.

use rand::Rng;
use rand_chacha::ChaCha20Rng;

use crate::config::PuctConfig;
use crate::node::NodeId;
use crate::store::NodeStore;

/// Smoothing added to every child's visit share so nothing reaches zero.
const VISIT_SMOOTHING: f32 = 0.1;

/// Mix of raw policy kept when the visit counts are too thin to trust.
const LINGER_PCT: f32 = 0.1;

/// Most-visited child of `node`, preferring proven wins on a finalised
/// node, with the converge override between the top two.
pub(crate) fn top_visits(store: &NodeStore, config: &PuctConfig, node: NodeId) -> usize {
    let order = store.sorted_children(node, false);
    assert!(!order.is_empty(), "choose on a childless node");

    let node_ref = store.get(node);
    let role = node_ref.scoring_role();

    // A sharpened winning score means some child is a proven win; take it
    // over whatever gathered the most visits.
    if node_ref.is_finalised() && node_ref.current_score(role) > 1.0 {
        for &i in &order {
            let Some(to_node) = node_ref.child(i).to_node else {
                continue;
            };
            let target = store.get(to_node);
            if target.is_finalised() && target.current_score(role) > 0.99 {
                return i;
            }
        }
    }

    // Best-guess override: a close runner-up with the better score is the
    // likelier answer had the search run longer.
    if config.top_visits_best_guess_converge_ratio > 0.0 && order.len() >= 2 {
        let (c0, c1) = (node_ref.child(order[0]), node_ref.child(order[1]));
        if let (Some(n0), Some(n1)) = (c0.to_node, c1.to_node) {
            let (n0, n1) = (store.get(n0), store.get(n1));
            let threshold = n0.visits as f32 * config.top_visits_best_guess_converge_ratio;
            return if n1.visits as f32 > threshold
                && n1.current_score(role) > n0.current_score(role)
            {
                order[1]
            } else {
                order[0]
            };
        }
    }

    order[0]
}

/// The temperature for `game_depth`, or `None` once past the schedule.
fn temperature_for_depth(config: &PuctConfig, game_depth: u16) -> Option<f32> {
    if game_depth >= config.depth_temperature_stop {
        return None;
    }

    debug_assert!(config.temperature > 0.0);

    let ramp = 1.0
        + (game_depth as f32 - config.depth_temperature_start as f32)
            * config.depth_temperature_increment;
    let multiplier = ramp.max(1.0);

    Some((config.temperature * multiplier).min(config.depth_temperature_max))
}

/// Write the temperature-shaped distribution into each child's
/// `next_prob`. With `use_linger` a slice of the raw policy is mixed in,
/// which also covers the zero-playout case. Returns nothing; read the
/// children (or [`NodeStore::sorted_children`] with `by_next_prob`) after.
pub(crate) fn set_probabilities(
    store: &mut NodeStore,
    node: NodeId,
    temperature: f32,
    use_linger: bool,
) {
    let node = store.get_mut(node);
    debug_assert!(node.num_children() > 0);

    let node_visits = node.visits as f32 + VISIT_SMOOTHING * node.num_children() as f32;

    let mut total_probability = 0.0f32;
    for i in 0..node.num_children() {
        let child = node.child(i);
        let child_visits = if child.to_node.is_some() {
            child.traversals as f32 + VISIT_SMOOTHING
        } else {
            VISIT_SMOOTHING
        };

        let share = child_visits / node_visits;
        let prob = if use_linger {
            LINGER_PCT * child.policy_prob + (1.0 - LINGER_PCT) * share
        } else {
            share
        };

        let shaped = prob.powf(temperature);
        node.child_mut(i).next_prob = shaped;
        total_probability += shaped;
    }

    for i in 0..node.num_children() {
        node.child_mut(i).next_prob /= total_probability;
    }
}

/// Temperature sampling per the depth schedule; falls back to top-visits
/// past the schedule's stop depth.
pub(crate) fn temperature(
    store: &mut NodeStore,
    config: &PuctConfig,
    rng: &mut ChaCha20Rng,
    node: NodeId,
    game_depth: u16,
) -> usize {
    let Some(temp) = temperature_for_depth(config, game_depth) else {
        return top_visits(store, config, node);
    };

    // With fewer playouts than children the visit counts say little; let
    // the raw policy linger in the distribution.
    let use_linger = {
        let n = store.get(node);
        n.visits < n.num_children() as u32
    };

    set_probabilities(store, node, temp, use_linger);
    let order = store.sorted_children(node, true);

    let expected_probability = rng.gen::<f32>() * config.random_scale;

    let node = store.get(node);
    let mut seen_probability = 0.0f32;
    for &i in &order {
        seen_probability += node.child(i).next_prob;
        if seen_probability > expected_probability {
            return i;
        }
    }

    // Rounding overshoot: settle for the tail.
    *order.last().expect("choose on a childless node")
}
