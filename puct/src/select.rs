//! Child selection.
//!
//! One call picks the next edge to descend: PUCT score over the children,
//! Dirichlet noise mixed into the priors at the root, a first-play-urgency
//! prior for unvisited children, immediate descent into proven wins, and
//! skip handling for children that are mid-expansion. The exploration
//! constant is recomputed per call and cached on the node.

use rand::Rng;
use rand_chacha::ChaCha20Rng;
use rand_distr::{Distribution, Gamma};

use crate::config::PuctConfig;
use crate::node::NodeId;
use crate::search::SearchStats;
use crate::store::NodeStore;

/// One step of a recorded descent, consumed by back-propagation.
#[derive(Debug, Clone, Copy)]
pub struct PathElement {
    pub node: NodeId,
    /// Child actually descended; `None` on the leaf element.
    pub choice: Option<usize>,
    /// Child with the best actual score at selection time.
    pub best: Option<usize>,
    /// Expansion count at selection time, for the minimax decay.
    pub num_children_expanded: u16,
}

impl PathElement {
    pub fn leaf(node: NodeId, num_children_expanded: u16) -> Self {
        Self {
            node,
            choice: None,
            best: None,
            num_children_expanded,
        }
    }
}

pub type Path = Vec<PathElement>;

/// Growth base for the visit-scaled exploration constant, as published.
const CPUCT_BASE: f64 = 19652.0;

/// Recompute and cache the node's exploration constant. Returns the best
/// expanded-child score, which the end-game expansion throttle consults
/// (batched variant only; 0 otherwise).
fn set_puct_constant(
    store: &mut NodeStore,
    config: &PuctConfig,
    node_id: NodeId,
    depth: usize,
) -> f32 {
    let node = store.get(node_id);

    let constant = if config.batched() {
        let base = if depth == 0 {
            config.puct_constant_root
        } else {
            config.puct_constant
        };
        base + ((1.0 + node.visits as f64 + CPUCT_BASE) / CPUCT_BASE).ln() as f32
    } else if config.puct_constant_before >= 0.0 {
        let threshold = if depth == 0 {
            config.puct_before_root_expansions
        } else {
            config.puct_before_expansions
        };
        if node.num_children_expanded.min(node.num_children() as u16) >= threshold {
            config.puct_constant_after
        } else {
            config.puct_constant_before
        }
    } else if depth == 0 {
        config.puct_constant_root
    } else {
        config.puct_constant
    };

    let best_score = if config.batched() {
        if node.visits < config.batch_size as u32 {
            node.current_score(node.scoring_role())
        } else {
            let role = node.scoring_role();
            let mut best = -1.0f32;
            for child in node.children() {
                if let Some(to_node) = child.to_node {
                    best = best.max(store.get(to_node).current_score(role));
                }
            }
            best
        }
    } else {
        0.0
    };

    store.get_mut(node_id).puct_constant = constant;
    best_score
}

/// Sample one Dirichlet noise value per child. Only at the root, only when
/// enabled, and skipped entirely when the gamma draw degenerates.
fn dirichlet_noise(
    store: &mut NodeStore,
    config: &PuctConfig,
    rng: &mut ChaCha20Rng,
    node_id: NodeId,
    depth: usize,
) -> Option<Vec<f64>> {
    if depth != 0 || config.dirichlet_noise_alpha < 0.0 {
        return None;
    }

    let gamma = Gamma::new(config.dirichlet_noise_alpha as f64, 1.0).ok()?;
    let num_children = store.get(node_id).num_children();

    let mut noise = Vec::with_capacity(num_children);
    let mut total = 0.0f64;
    for _ in 0..num_children {
        let sample = gamma.sample(rng);
        noise.push(sample);
        total += sample;
    }

    if total < f64::MIN_POSITIVE {
        return None;
    }

    let node = store.get_mut(node_id);
    for (i, value) in noise.iter_mut().enumerate() {
        *value /= total;
        node.child_mut(i).dirichlet_noise = *value as f32;
    }

    Some(noise)
}

/// Pick the next child of `node_id` to descend, recording the step on
/// `path`. Returns `None` when every child is masked or withheld, in which
/// case the caller yields to the pending evaluations.
pub(crate) fn select_child(
    store: &mut NodeStore,
    config: &PuctConfig,
    rng: &mut ChaCha20Rng,
    stats: &mut SearchStats,
    node_id: NodeId,
    path: &mut Path,
) -> Option<usize> {
    debug_assert!(!store.get(node_id).is_terminal());
    debug_assert!(store.get(node_id).num_children() > 0);

    let depth = path.len();
    let node_best_score = set_puct_constant(store, config, node_id, depth);

    // Nothing to select.
    if store.get(node_id).num_children() == 1 {
        let nce = store.get(node_id).num_children_expanded;
        path.push(PathElement {
            node: node_id,
            choice: Some(0),
            best: Some(0),
            num_children_expanded: nce,
        });
        return Some(0);
    }

    let noise = dirichlet_noise(store, config, rng, node_id, depth);

    let node = store.get(node_id);
    let role = node.scoring_role();
    let num_children = node.num_children();
    let num_children_expanded = node.num_children_expanded;
    let sqrt_node_visits = ((node.visits + 1) as f64).sqrt();
    let puct_constant = node.puct_constant as f64;

    // First-play urgency: value head's own estimate, discounted by how
    // much policy mass has already been explored.
    let mut prior_score = node.final_score(role) as f64;
    let fpu_discount = if depth == 0 {
        config.fpu_prior_discount_root
    } else {
        config.fpu_prior_discount
    };
    if noise.is_none() && fpu_discount > 0.0 {
        let mut total_policy_visited = 0.0f64;
        for child in node.children() {
            if child.to_node.is_some() && child.traversals > 0 {
                total_policy_visited += child.policy_prob as f64;
            }
        }
        prior_score -= fpu_discount as f64 * total_policy_visited.sqrt();
    }

    // End-game throttle: stop opening new children once enough undecided
    // expansions carry extreme scores.
    let mut allow_expansions = true;
    if config.batched() && depth > 0 {
        let node = store.get(node_id);
        if node.visits < config.expand_threshold_visits || node_best_score > 0.98 {
            let mut non_final_expansions = 0u16;
            for child in node.children() {
                let Some(to_node) = child.to_node else { continue };
                let target = store.get(to_node);
                if !target.is_finalised() {
                    let score = target.current_score(role);
                    if score > 0.98 || score < 0.02 {
                        non_final_expansions += 1;
                    }
                }
            }
            if non_final_expansions >= config.number_of_expansions_end_game {
                allow_expansions = false;
            }
        }
    }

    let mut best_score = f64::NEG_INFINITY;
    let mut best_child: Option<usize> = None;

    let mut best_actual_score = -1.0f64;
    let mut best_actual: Option<usize> = None;

    let mut bad_fallback: Option<usize> = None;

    let mut debug_scores: Vec<(usize, f32, f32)> = Vec::with_capacity(num_children);

    for i in 0..num_children {
        let node = store.get(node_id);
        let child = node.child(i);

        // Skip children that are mid-expansion, and subtrees with nothing
        // selectable under them.
        if child.unselectable {
            continue;
        }
        if let Some(to_node) = child.to_node {
            let target = store.get(to_node);
            if target.num_children() > 0
                && target.unselectable_count as usize == target.num_children()
            {
                continue;
            }
        }
        if child.to_node.is_none() && !allow_expansions {
            continue;
        }

        let traversals = (child.traversals + 1) as f64;
        let inflight_visits = if config.batched() {
            child.to_node.map_or(0.0, |t| store.get(t).inflight_visits as f64)
        } else {
            0.0
        };

        let mut child_pct = child.policy_prob as f64;
        if let Some(noise) = &noise {
            let pct = config.dirichlet_noise_pct as f64;
            child_pct = (1.0 - pct) * child_pct + pct * noise[i];
        }

        let mut exploration_score =
            puct_constant * child_pct * sqrt_node_visits / (traversals + inflight_visits);

        let child_traversals = child.traversals;
        let mut child_score = prior_score;

        if let Some(to_node) = child.to_node {
            let target = store.get(to_node);
            child_score = target.current_score(role) as f64;

            // Finalised children are enforced harder than the network's own
            // optimism: proven wins are taken (or amplified at the root),
            // proven losses become a last resort, everything else stops
            // exploring.
            if target.is_finalised() {
                if child_score > 0.99 {
                    if depth > 0 {
                        path.push(PathElement {
                            node: node_id,
                            choice: Some(i),
                            best: Some(i),
                            num_children_expanded,
                        });
                        return Some(i);
                    }

                    child_score *= 1.0 + puct_constant;
                } else if child_score < 0.01 {
                    bad_fallback = Some(i);
                    continue;
                } else {
                    exploration_score = 0.0;
                }
            }

            if child_score > best_actual_score {
                best_actual_score = child_score;
                best_actual = Some(i);
            }
        }

        // Parallel descents diverge: a random share of the in-flight count
        // drags the value estimate down.
        if config.batched() && inflight_visits > 0.0 {
            let discounted_visits = inflight_visits * (rng.gen::<f64>() + 0.25);
            if child_traversals > 16 && discounted_visits > 0.1 {
                let t = child_traversals as f64;
                child_score = (child_score * t) / (t + discounted_visits);
            }
        }

        debug_scores.push((i, child_score as f32, exploration_score as f32));

        let score = child_score + exploration_score;
        if score > best_score {
            best_score = score;
            best_child = Some(i);
        }
    }

    {
        let node = store.get_mut(node_id);
        for (i, node_score, puct_score) in debug_scores {
            let child = node.child_mut(i);
            child.debug_node_score = node_score;
            child.debug_puct_score = puct_score;
        }
    }

    // Fallback order when the argmax found nothing: best known child, then
    // a proven loss, then give up and let the caller yield.
    let chosen = best_child.or(best_actual).or(bad_fallback);

    match chosen {
        Some(choice) => {
            let best = best_actual.unwrap_or(choice);
            path.push(PathElement {
                node: node_id,
                choice: Some(choice),
                best: Some(best),
                num_children_expanded,
            });
            Some(choice)
        }
        None => {
            stats.num_blocked += 1;
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{Finalised, Node};
    use crate::testing::StepGame;
    use rand::SeedableRng;
    use search_core::{HashMask, StateMachine};

    fn setup(branching: usize) -> (NodeStore, NodeId) {
        let mut sm = StepGame::new(branching, 2);
        let mut store = NodeStore::new(HashMask::all(1), false);
        let state = sm.initial_state();
        let id = store.insert(Node::create(&state, &mut sm));
        (store, id)
    }

    fn select(
        store: &mut NodeStore,
        config: &PuctConfig,
        node: NodeId,
        path: &mut Path,
    ) -> Option<usize> {
        let mut rng = ChaCha20Rng::seed_from_u64(1);
        let mut stats = SearchStats::default();
        select_child(store, config, &mut rng, &mut stats, node, path)
    }

    #[test]
    fn test_single_child_shortcut() {
        let (mut store, root) = setup(1);
        let config = PuctConfig::default();

        let mut path = Path::new();
        let choice = select(&mut store, &config, root, &mut path);

        assert_eq!(choice, Some(0));
        assert_eq!(path.len(), 1);
        assert_eq!(path[0].choice, Some(0));
    }

    #[test]
    fn test_unvisited_children_follow_priors() {
        let (mut store, root) = setup(3);
        let config = PuctConfig::default();

        {
            let node = store.get_mut(root);
            node.child_mut(0).policy_prob = 0.2;
            node.child_mut(1).policy_prob = 0.6;
            node.child_mut(2).policy_prob = 0.2;
        }

        let mut path = Path::new();
        let choice = select(&mut store, &config, root, &mut path);
        assert_eq!(choice, Some(1));
    }

    #[test]
    fn test_ties_break_to_first_legal() {
        let (mut store, root) = setup(3);
        let config = PuctConfig::default();

        // Equal priors, no visits anywhere: first child wins.
        let mut path = Path::new();
        assert_eq!(select(&mut store, &config, root, &mut path), Some(0));
    }

    #[test]
    fn test_finalised_win_returned_immediately_below_root() {
        let (mut store, parent) = setup(3);
        let config = PuctConfig::default();

        let mut sm = StepGame::new(3, 2);
        let mut state = sm.new_base_state();
        state.bytes_mut()[0] = 1;
        let winner = store.insert(Node::create(&state, &mut sm));
        {
            let w = store.get_mut(winner);
            w.finalised = Finalised::Proven;
            w.set_current_score(0, 1.0);
        }
        store.get_mut(parent).child_mut(2).to_node = Some(winner);
        store.get_mut(parent).num_children_expanded = 1;

        // Depth 1: a proven win short-circuits the scoring loop.
        let mut path = vec![PathElement::leaf(parent, 0)];
        let choice = select(&mut store, &config, parent, &mut path);
        assert_eq!(choice, Some(2));
    }

    #[test]
    fn test_proven_loss_is_last_resort() {
        let (mut store, parent) = setup(2);
        let config = PuctConfig::default();

        let mut sm = StepGame::new(2, 2);
        let mut state = sm.new_base_state();
        state.bytes_mut()[0] = 1;

        let loser = store.insert(Node::create(&state, &mut sm));
        {
            let l = store.get_mut(loser);
            l.finalised = Finalised::Proven;
            l.set_current_score(0, 0.0);
        }
        store.get_mut(parent).child_mut(0).to_node = Some(loser);
        store.get_mut(parent).num_children_expanded = 1;

        // The unexpanded sibling still beats a proven loss.
        let mut path = vec![PathElement::leaf(parent, 0)];
        let choice = select(&mut store, &config, parent, &mut path);
        assert_eq!(choice, Some(1));
    }

    #[test]
    fn test_unselectable_children_are_skipped() {
        let (mut store, root) = setup(2);
        let config = PuctConfig::default();

        store.get_mut(root).child_mut(0).unselectable = true;
        store.get_mut(root).unselectable_count = 1;

        let mut path = Path::new();
        assert_eq!(select(&mut store, &config, root, &mut path), Some(1));
    }

    #[test]
    fn test_all_unselectable_blocks() {
        let (mut store, root) = setup(2);
        let config = PuctConfig::default();

        {
            let node = store.get_mut(root);
            node.child_mut(0).unselectable = true;
            node.child_mut(1).unselectable = true;
            node.unselectable_count = 2;
        }

        let mut rng = ChaCha20Rng::seed_from_u64(1);
        let mut stats = SearchStats::default();
        let mut path = Path::new();
        let choice = select_child(&mut store, &config, &mut rng, &mut stats, root, &mut path);

        assert_eq!(choice, None);
        assert!(path.is_empty());
        assert_eq!(stats.num_blocked, 1);
    }

    #[test]
    fn test_noise_disabled_is_deterministic() {
        let config = PuctConfig::default();
        assert!(config.dirichlet_noise_alpha < 0.0);

        let picks: Vec<Option<usize>> = (0..3)
            .map(|_| {
                let (mut store, root) = setup(4);
                store.get_mut(root).child_mut(2).policy_prob = 0.9;
                let mut path = Path::new();
                select(&mut store, &config, root, &mut path)
            })
            .collect();

        assert!(picks.iter().all(|&p| p == Some(2)));
    }

    #[test]
    fn test_root_noise_recorded_on_children() {
        let (mut store, root) = setup(3);
        let mut config = PuctConfig::default();
        config.dirichlet_noise_alpha = 0.3;

        let mut path = Path::new();
        select(&mut store, &config, root, &mut path).unwrap();

        let total: f32 = store
            .get(root)
            .children()
            .iter()
            .map(|c| c.dirichlet_noise)
            .sum();
        assert!((total - 1.0).abs() < 1e-4);
    }

    #[test]
    fn test_fpu_discount_lowers_unvisited_value() {
        let (mut store, parent) = setup(2);
        let mut config = PuctConfig::default();
        config.fpu_prior_discount = 10.0;
        // Kill the exploration term so only the value part differs.
        config.puct_constant = 0.0;
        config.puct_constant_root = 0.0;

        let mut sm = StepGame::new(2, 2);
        let mut state = sm.new_base_state();
        state.bytes_mut()[0] = 1;
        let visited = store.insert(Node::create(&state, &mut sm));
        {
            let v = store.get_mut(visited);
            v.visits = 4;
            v.set_current_score(0, 0.4);
        }
        {
            let node = store.get_mut(parent);
            node.set_final_score(0, 0.9);
            node.visits = 4;
            node.child_mut(0).to_node = Some(visited);
            node.child_mut(0).traversals = 4;
            node.num_children_expanded = 1;
        }

        // Without the discount the unvisited child would carry 0.9; the
        // discount drops it below the visited child's 0.4.
        let mut path = vec![PathElement::leaf(parent, 0)];
        let choice = select(&mut store, &config, parent, &mut path);
        assert_eq!(choice, Some(0));
    }
}
