//! The search session: playouts, back-propagation and the root controller.
//!
//! A [`PuctSearch`] owns one search tree between moves of a game. The
//! caller establishes a root, asks for playouts with
//! [`on_next_move`](PuctSearch::on_next_move), commits the chosen move with
//! [`apply_move`](PuctSearch::apply_move) (keeping the chosen subtree,
//! releasing the siblings), and resets at the end of the game.
//!
//! One playout descends from the root ([`select`](crate::select)), expands
//! the chosen edge when it has no destination yet, and walks the recorded
//! path backwards folding the leaf's scores into every node's running mean.
//! In the batched variant up to `batch_size` descents are in flight at
//! once: a descent that reaches an evaluation parks (child masked as
//! unselectable, `inflight_visits` raised along its path) and the parked
//! set is flushed through [`Evaluator::evaluate_batch`] in one call.

use std::time::{Duration, Instant};

use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;
use search_core::{BaseState, JointMove, StateMachine, StateTransformer};
use thiserror::Error;
use tracing::{debug, info, trace, warn};

use crate::choose;
use crate::config::{ChoosePolicy, PuctConfig};
use crate::evaluator::{Evaluator, EvaluatorError};
use crate::node::{move_string, Finalised, Node, NodeId};
use crate::request::NodeRequest;
use crate::select::{select_child, Path, PathElement};
use crate::store::NodeStore;

/// Errors arising from misuse of the session surface.
#[derive(Debug, Error)]
pub enum PuctError {
    #[error("root already established")]
    RootAlreadyEstablished,

    #[error("no root established")]
    NoRoot,

    #[error("cannot establish root on a terminal state")]
    TerminalRoot,

    #[error("move not found among root children")]
    MoveNotFound,

    #[error("no node at game depth {0} on the retained path")]
    DepthNotOnPath(u16),

    #[error(transparent)]
    Evaluator(#[from] EvaluatorError),
}

/// Counters for one `on_next_move` call.
#[derive(Debug, Default, Clone)]
pub struct SearchStats {
    pub num_evaluations: u64,
    pub num_tree_playouts: u64,
    pub playouts_finals: u64,
    pub playouts_max_depth: usize,
    pub playouts_total_depth: u64,
    pub num_transpositions_attached: u64,
    pub num_blocked: u64,
}

/// A descent parked at the evaluation boundary (batched variant).
struct PendingEval {
    node: NodeId,
    parent: NodeId,
    child_index: usize,
    path: Path,
}

/// How one playout attempt ended.
enum PlayoutOutcome {
    /// Backed up; carries the path length.
    Completed(usize),
    /// Parked awaiting evaluation.
    Parked,
    /// Nothing selectable anywhere; the caller must flush pending work.
    Blocked,
}

/// Report interval for verbose progress lines.
const REPORT_EVERY: Duration = Duration::from_millis(2500);

/// One PUCT search session over an externally supplied game.
pub struct PuctSearch<'a> {
    sm: &'a mut dyn StateMachine,
    transformer: &'a dyn StateTransformer,
    evaluator: &'a dyn Evaluator,
    config: PuctConfig,
    rng: ChaCha20Rng,

    store: NodeStore,
    root: Option<NodeId>,
    /// First root of the session; anchors the retained spine in the
    /// non-transposition variant.
    initial_root: Option<NodeId>,
    game_depth: u16,

    /// Scratch successor state for expansions.
    expand_scratch: BaseState,

    number_repeat_states_draw: u16,
    repeat_states_score: f32,

    pending: Vec<PendingEval>,
    stats: SearchStats,
}

impl<'a> PuctSearch<'a> {
    pub fn new(
        sm: &'a mut dyn StateMachine,
        transformer: &'a dyn StateTransformer,
        evaluator: &'a dyn Evaluator,
        config: PuctConfig,
        seed: u64,
    ) -> Self {
        let hash_mask = transformer.create_hash_mask(&sm.new_base_state());
        let store = NodeStore::new(hash_mask, config.use_transpositions);
        let expand_scratch = sm.new_base_state();

        let number_repeat_states_draw = if config.use_legals_count_draw > 0 {
            config.use_legals_count_draw as u16
        } else {
            0
        };
        let repeat_states_score = config.repeat_states_score;

        Self {
            sm,
            transformer,
            evaluator,
            config,
            rng: ChaCha20Rng::seed_from_u64(seed),
            store,
            root: None,
            initial_root: None,
            game_depth: 0,
            expand_scratch,
            number_repeat_states_draw,
            repeat_states_score,
            pending: Vec::new(),
            stats: SearchStats::default(),
        }
    }

    /// Replace the configuration. The transposition toggle is fixed at
    /// construction; everything else takes effect immediately.
    pub fn update_config(&mut self, config: PuctConfig) {
        if config.verbose {
            debug!(
                puct_constant = config.puct_constant,
                puct_constant_root = config.puct_constant_root,
                dirichlet_noise_alpha = config.dirichlet_noise_alpha,
                fpu_prior_discount = config.fpu_prior_discount,
                batch_size = config.batch_size,
                think_time = config.think_time,
                "config updated"
            );
        }

        if config.use_legals_count_draw > 0 {
            self.number_repeat_states_draw = config.use_legals_count_draw as u16;
        }
        self.repeat_states_score = config.repeat_states_score;
        self.config = config;
    }

    /// Enable the repeat-state draw rule: expansions matching one of the
    /// last `n` ancestor states are finalised with `score` for every role.
    pub fn set_repeat_state_draw(&mut self, n: u16, score: f32) {
        self.number_repeat_states_draw = n;
        self.repeat_states_score = score;
    }

    #[inline]
    pub fn root(&self) -> Option<NodeId> {
        self.root
    }

    #[inline]
    pub fn node(&self, id: NodeId) -> &Node {
        self.store.get(id)
    }

    #[inline]
    pub fn number_of_nodes(&self) -> usize {
        self.store.number_of_nodes()
    }

    #[inline]
    pub fn allocated_memory(&self) -> usize {
        self.store.allocated_memory()
    }

    #[inline]
    pub fn stats(&self) -> &SearchStats {
        &self.stats
    }

    #[inline]
    pub fn game_depth(&self) -> u16 {
        self.game_depth
    }

    // ------------------------------------------------------------------
    // node creation and expansion

    /// Create the node for `state`, evaluating it unless it is finalised
    /// or has a single child (nothing for the network to guide).
    fn create_node(&mut self, parent: Option<NodeId>, state: &BaseState) -> Result<NodeId, PuctError> {
        let (id, needs_eval) = self.create_node_raw(parent, state);
        if needs_eval {
            self.evaluate_now(id)?;
        }
        Ok(id)
    }

    fn create_node_raw(&mut self, parent: Option<NodeId>, state: &BaseState) -> (NodeId, bool) {
        let mut node = Node::create(state, self.sm);
        node.parent = parent;
        if let Some(parent) = parent {
            node.game_depth = self.store.get(parent).game_depth + 1;
        }

        let id = self.store.insert(node);
        if let Some(parent) = parent {
            self.store.get_mut(parent).num_children_expanded += 1;
        }

        let node = self.store.get_mut(id);
        if node.is_finalised() {
            // Sharpen proven results past what the network can express, so
            // real wins outrank predicted ones and real losses sink below
            // predicted ones.
            for role in 0..node.role_count() {
                let s = node.current_score(role);
                if s > 0.99 {
                    node.set_current_score(role, s * 1.05);
                } else if s < 0.01 {
                    node.set_current_score(role, -0.05);
                }
            }
            return (id, false);
        }

        (id, node.num_children() > 1)
    }

    fn evaluate_now(&mut self, id: NodeId) -> Result<(), PuctError> {
        let request = NodeRequest::new(id);
        let eval_request = request.build(&self.store, self.transformer);
        let reply = self.evaluator.evaluate(&eval_request)?;
        request.apply(&mut self.store, self.transformer, &reply);
        self.stats.num_evaluations += 1;
        Ok(())
    }

    /// Compute the successor state for `child_index` of `parent` into the
    /// scratch buffer.
    fn compute_child_state(&mut self, parent: NodeId, child_index: usize) {
        self.sm.update_bases(self.store.get(parent).state());
        self.sm.next_state(
            &self.store.get(parent).child(child_index).joint_move,
            &mut self.expand_scratch,
        );
    }

    /// Synchronous expansion: transposition attach or create-and-evaluate.
    /// Used outside the playout loop (move commits, preset expansions).
    fn expand_child(&mut self, parent: NodeId, child_index: usize) -> Result<NodeId, PuctError> {
        self.compute_child_state(parent, child_index);

        let next_depth = self.store.get(parent).game_depth + 1;
        if let Some(hit) = self.store.lookup_transposition(&self.expand_scratch, next_depth) {
            self.attach_child(parent, child_index, hit);
            return Ok(hit);
        }

        let scratch = self.expand_scratch.clone();
        let id = self.create_node(Some(parent), &scratch)?;
        self.store.get_mut(parent).child_mut(child_index).to_node = Some(id);
        Ok(id)
    }

    fn attach_child(&mut self, parent: NodeId, child_index: usize, target: NodeId) {
        self.store.get_mut(parent).child_mut(child_index).to_node = Some(target);
        self.store.get_mut(parent).num_children_expanded += 1;
        self.stats.num_transpositions_attached += 1;
    }

    /// Repeat-state rule: walk up the parent chain comparing states under
    /// the hash mask; on a match the new node becomes a finalised draw.
    fn check_repeat_states(&mut self, id: NodeId) {
        if self.number_repeat_states_draw == 0 {
            return;
        }

        let mut cur = self.store.get(id).parent;
        for _ in 0..self.number_repeat_states_draw {
            let Some(ancestor) = cur else { break };

            let repeated = {
                let mask = self.store.hash_mask();
                self.store
                    .get(id)
                    .state()
                    .masked_eq(self.store.get(ancestor).state(), mask)
            };

            if repeated {
                let score = self.repeat_states_score;
                let node = self.store.get_mut(id);
                for role in 0..node.role_count() {
                    node.set_current_score(role, score);
                }
                node.finalised = Finalised::RepeatDraw;
                return;
            }

            cur = self.store.get(ancestor).parent;
        }
    }

    // ------------------------------------------------------------------
    // playout and back-propagation

    /// One descent from the root: select, expand, and either back up the
    /// reached scores or park at the evaluation boundary.
    fn tree_playout(&mut self) -> Result<PlayoutOutcome, PuctError> {
        let root = self.root.expect("playout without a root");
        debug_assert!(!self.store.get(root).is_terminal());

        let mut path = Path::new();
        let mut current = root;

        loop {
            let node = self.store.get(current);
            if node.is_finalised() {
                path.push(PathElement::leaf(current, node.num_children_expanded));
                break;
            }

            let choice = select_child(
                &mut self.store,
                &self.config,
                &mut self.rng,
                &mut self.stats,
                current,
                &mut path,
            );
            let Some(choice) = choice else {
                // Abandon this descent; undo its reservations.
                for element in &path {
                    let node = self.store.get_mut(element.node);
                    if node.inflight_visits > 0 {
                        node.inflight_visits -= 1;
                    }
                }
                return Ok(PlayoutOutcome::Blocked);
            };

            if self.config.batched() {
                self.store.get_mut(current).inflight_visits += 1;
            }

            if let Some(next) = self.store.get(current).child(choice).to_node {
                current = next;
                continue;
            }

            // Expansion of the chosen edge.
            self.compute_child_state(current, choice);
            let next_depth = self.store.get(current).game_depth + 1;

            if let Some(hit) = self.store.lookup_transposition(&self.expand_scratch, next_depth) {
                self.attach_child(current, choice, hit);
                let node = self.store.get(hit);
                path.push(PathElement::leaf(hit, node.num_children_expanded));
                break;
            }

            let scratch = self.expand_scratch.clone();
            let (id, needs_eval) = self.create_node_raw(Some(current), &scratch);
            self.store.get_mut(current).child_mut(choice).to_node = Some(id);
            self.check_repeat_states(id);

            let node = self.store.get(id);
            if node.is_finalised() {
                path.push(PathElement::leaf(id, node.num_children_expanded));
                break;
            }

            if needs_eval {
                if self.config.batched() {
                    // Park: mask the edge until the reply lands.
                    self.store.get_mut(current).child_mut(choice).unselectable = true;
                    self.store.get_mut(current).unselectable_count += 1;
                    self.pending.push(PendingEval {
                        node: id,
                        parent: current,
                        child_index: choice,
                        path,
                    });
                    return Ok(PlayoutOutcome::Parked);
                }

                self.evaluate_now(id)?;
                path.push(PathElement::leaf(id, 0));
                break;
            }

            // Single child, nothing to evaluate: keep descending.
            current = id;
        }

        let leaf = path.last().expect("empty playout path").node;
        if self.store.get(leaf).is_finalised() {
            self.stats.playouts_finals += 1;
        }

        let depth = self.finish_playout(leaf, path);
        Ok(PlayoutOutcome::Completed(depth))
    }

    /// Read the leaf's scores and back-propagate along the path.
    fn finish_playout(&mut self, leaf: NodeId, path: Path) -> usize {
        let node = self.store.get(leaf);
        let mut scores: Vec<f32> = (0..node.role_count())
            .map(|role| node.current_score(role))
            .collect();

        self.back_propagate(&mut scores, &path);
        self.stats.num_tree_playouts += 1;
        path.len()
    }

    /// Hand every parked descent to the evaluator as one batch, then back
    /// up each of them.
    fn flush_pending(&mut self) -> Result<(), PuctError> {
        if self.pending.is_empty() {
            return Ok(());
        }

        let parked = std::mem::take(&mut self.pending);
        let requests: Vec<_> = parked
            .iter()
            .map(|p| NodeRequest::new(p.node).build(&self.store, self.transformer))
            .collect();

        let replies = self.evaluator.evaluate_batch(&requests)?;
        debug_assert_eq!(replies.len(), parked.len());
        self.stats.num_evaluations += parked.len() as u64;

        for (pending, reply) in parked.into_iter().zip(replies) {
            NodeRequest::new(pending.node).apply(&mut self.store, self.transformer, &reply);

            let parent = self.store.get_mut(pending.parent);
            parent.child_mut(pending.child_index).unselectable = false;
            parent.unselectable_count -= 1;

            let mut path = pending.path;
            let node = self.store.get(pending.node);
            path.push(PathElement::leaf(pending.node, node.num_children_expanded));

            let depth = self.finish_playout(pending.node, path);
            self.stats.playouts_max_depth = self.stats.playouts_max_depth.max(depth);
            self.stats.playouts_total_depth += depth as u64;
        }

        Ok(())
    }

    /// If every child of `id` is expanded and finalised (or one is already
    /// a proven win), return the child whose score the node should adopt.
    fn force_finalise_candidate(&self, id: NodeId) -> Option<usize> {
        let node = self.store.get(id);
        let role = node.scoring_role();

        let mut best_score = -1.0f32;
        let mut best: Option<usize> = None;

        for (i, child) in node.children().iter().enumerate() {
            let Some(to_node) = child.to_node else {
                return None;
            };
            let target = self.store.get(to_node);
            if !target.is_finalised() {
                return None;
            }

            let score = target.current_score(role);
            if score > 0.99 {
                return Some(i);
            }
            if score > best_score {
                best_score = score;
                best = Some(i);
            }
        }

        best
    }

    /// Minimax mix: when the selected child was not the best-scoring one
    /// and the node is young, pull the backed-up scores towards the best
    /// child's. Decays to nothing as the node matures.
    fn back_up_minimax(&self, scores: &mut [f32], element: &PathElement) {
        let node = self.store.get(element.node);
        if node.lead_role.is_none() {
            return;
        }

        let Some(best) = element.best else { return };
        let Some(best_node) = node.child(best).to_node else {
            return;
        };
        if self.config.minimax_backup_ratio <= 0.0 {
            return;
        }
        if element.choice == element.best {
            return;
        }
        if node.visits == 0 || node.visits > self.config.minimax_threshold_visits {
            return;
        }

        let mut ratio = self.config.minimax_backup_ratio as f64;
        if element.num_children_expanded as usize == node.num_children() {
            ratio -= ratio * (node.visits as f64 / self.config.minimax_threshold_visits as f64);
            ratio = ratio.clamp(0.0, 1.0);
        }

        let best_node = self.store.get(best_node);
        for (role, score) in scores.iter_mut().enumerate() {
            *score =
                (ratio * best_node.current_score(role) as f64 + (1.0 - ratio) * *score as f64) as f32;
        }
    }

    /// Walk the path leaf-to-root folding `scores` into each node.
    fn back_propagate(&mut self, scores: &mut [f32], path: &[PathElement]) {
        let mut finalise_once = true;

        for element in path.iter().rev() {
            // Forced finalisation, at most once per back-prop so cascades
            // spread over successive playouts.
            let node = self.store.get(element.node);
            if finalise_once && !node.is_finalised() && node.lead_role.is_some() {
                finalise_once = false;

                if let Some(best) = self.force_finalise_candidate(element.node) {
                    let from = self.store.get(element.node).child(best).to_node.unwrap();
                    let copied: Vec<f32> = (0..scores.len())
                        .map(|role| self.store.get(from).current_score(role))
                        .collect();

                    let node = self.store.get_mut(element.node);
                    for (role, score) in copied.into_iter().enumerate() {
                        node.set_current_score(role, score);
                    }
                    node.finalised = Finalised::Proven;
                }
            }

            let node = self.store.get(element.node);
            if node.is_finalised() {
                // Finalised scores propagate unchanged upward.
                for (role, score) in scores.iter_mut().enumerate() {
                    *score = node.current_score(role);
                }
            } else {
                if self.config.batched() {
                    self.back_up_minimax(scores, element);
                }

                let node = self.store.get_mut(element.node);
                let visits = node.visits as f32;
                for (role, score) in scores.iter().enumerate() {
                    let mean = (visits * node.current_score(role) + score) / (visits + 1.0);
                    node.set_current_score(role, mean);
                }
            }

            let node = self.store.get_mut(element.node);
            node.visits += 1;
            if node.inflight_visits > 0 {
                node.inflight_visits -= 1;
            }
            if let Some(choice) = element.choice {
                node.child_mut(choice).traversals += 1;
            }
        }
    }

    // ------------------------------------------------------------------
    // playout drivers

    /// Top-two convergence: the most-visited root child leads the runner-up
    /// by more than `count` visits and has the better score.
    fn converged(&self, count: u32) -> bool {
        let Some(root) = self.root else { return true };
        let order = self.store.sorted_children(root, false);
        if order.len() < 2 {
            return true;
        }

        let node = self.store.get(root);
        let role = node.scoring_role();
        let (Some(n0), Some(n1)) = (
            node.child(order[0]).to_node,
            node.child(order[1]).to_node,
        ) else {
            return false;
        };

        let (n0, n1) = (self.store.get(n0), self.store.get(n1));
        n0.current_score(role) > n1.current_score(role) && n0.visits > n1.visits + count
    }

    /// Single-worker loop: bounded by the evaluation budget, with a
    /// convergence-driven overtime allowance.
    fn playout_loop(
        &mut self,
        max_evaluations: i64,
        end_time: Option<Instant>,
    ) -> Result<(), PuctError> {
        let max_iterations = if max_evaluations < 0 {
            u64::MAX
        } else {
            max_evaluations as u64 * 2
        };

        let start = Instant::now();
        let mut next_report = start + REPORT_EVERY;
        let mut iterations = 0u64;

        while iterations < max_iterations {
            if max_evaluations > 0 && self.stats.num_evaluations > max_evaluations as u64 {
                if self.converged(8) {
                    break;
                }
                let overtime = (max_evaluations as f32
                    * self.config.evaluation_multiplier_to_convergence)
                    as u64;
                if self.stats.num_evaluations > overtime {
                    break;
                }
            }

            if let Some(end) = end_time {
                if Instant::now() > end {
                    break;
                }
            }

            if let PlayoutOutcome::Completed(depth) = self.tree_playout()? {
                self.stats.playouts_max_depth = self.stats.playouts_max_depth.max(depth);
                self.stats.playouts_total_depth += depth as u64;
            }

            iterations += 1;

            if self.config.verbose && Instant::now() > next_report {
                next_report = Instant::now() + REPORT_EVERY;
                self.report_progress(iterations);
            }
        }

        if self.config.verbose {
            info!(
                evaluations = self.stats.num_evaluations,
                iterations,
                elapsed = ?start.elapsed(),
                "playout loop done"
            );
        }

        Ok(())
    }

    /// Batched loop: interleaves up to `batch_size` descents, stopping on
    /// the think-time schedule, the evaluation budget, or the deadline.
    fn playout_loop_batched(
        &mut self,
        max_evaluations: i64,
        end_time: Option<Instant>,
    ) -> Result<(), PuctError> {
        let start = Instant::now();
        let use_think_time = self.config.think_time > 0.0;
        let think = Duration::from_secs_f32(self.config.think_time.max(0.0));

        // Tiny searches gain nothing from parallel descents.
        let pending_cap = if (0..=1000).contains(&max_evaluations) {
            1
        } else {
            self.config.batch_size as usize
        };

        let mut next_report = start + REPORT_EVERY;
        let mut iterations = 0u64;

        loop {
            let root = self.root.expect("batched playouts without a root");
            if self.store.get(root).is_finalised() && iterations > 1000 {
                break;
            }

            if let Some(end) = end_time {
                if Instant::now() > end {
                    break;
                }
            }

            if max_evaluations > 0
                && self.stats.num_evaluations >= max_evaluations as u64
                && self.pending.is_empty()
            {
                break;
            }

            if use_think_time && iterations % 20 == 0 {
                let elapsed = start.elapsed();
                if elapsed > Duration::from_millis(250) {
                    if elapsed > think && self.converged(self.config.converge_relaxed) {
                        break;
                    }
                    if elapsed > think.mul_f32(1.33)
                        && self.converged(self.config.converge_non_relaxed)
                    {
                        break;
                    }
                    if elapsed > think.mul_f32(1.75) {
                        break;
                    }
                }
            }

            match self.tree_playout()? {
                PlayoutOutcome::Completed(depth) => {
                    self.stats.playouts_max_depth = self.stats.playouts_max_depth.max(depth);
                    self.stats.playouts_total_depth += depth as u64;
                }
                PlayoutOutcome::Parked => {
                    if self.pending.len() >= pending_cap {
                        self.flush_pending()?;
                    }
                }
                PlayoutOutcome::Blocked => {
                    if self.pending.is_empty() {
                        warn!("selection blocked with nothing in flight");
                        break;
                    }
                    self.flush_pending()?;
                }
            }

            iterations += 1;

            if self.config.verbose && Instant::now() > next_report {
                next_report = Instant::now() + REPORT_EVERY;
                self.report_progress(iterations);
            }
        }

        // Drain whatever was still parked.
        self.flush_pending()?;

        if self.config.verbose {
            info!(
                evaluations = self.stats.num_evaluations,
                playouts = self.stats.num_tree_playouts,
                blocked = self.stats.num_blocked,
                elapsed = ?start.elapsed(),
                "batched playout loop done"
            );
        }

        Ok(())
    }

    fn report_progress(&self, iterations: u64) {
        let Some(root) = self.root else { return };
        let node = self.store.get(root);
        let role = node.scoring_role();

        let playouts = self.stats.num_tree_playouts.max(1);
        let best = choose::top_visits(&self.store, &self.config, root);
        let best_score = node
            .child(best)
            .to_node
            .map(|id| self.store.get(id).current_score(role));

        info!(
            evaluations = self.stats.num_evaluations,
            iterations,
            avg_depth = self.stats.playouts_total_depth as f64 / playouts as f64,
            max_depth = self.stats.playouts_max_depth,
            nodes = self.store.number_of_nodes(),
            best_score,
            "search progress"
        );
    }

    // ------------------------------------------------------------------
    // root controller

    /// Create the session root from `state` (or the game's initial state).
    pub fn establish_root(&mut self, state: Option<&BaseState>) -> Result<NodeId, PuctError> {
        if self.root.is_some() {
            return Err(PuctError::RootAlreadyEstablished);
        }

        let state = match state {
            Some(s) => s.clone(),
            None => self.sm.initial_state(),
        };

        self.sm.update_bases(&state);
        if self.sm.is_terminal() {
            return Err(PuctError::TerminalRoot);
        }

        let id = self.create_node(None, &state)?;
        self.store.get_mut(id).game_depth = self.game_depth;
        self.root = Some(id);
        if !self.config.use_transpositions {
            self.initial_root = Some(id);
        }

        Ok(id)
    }

    /// Run the playout driver and pick a move. Returns the chosen root
    /// child index. With `max_evaluations == 0` the playout loop is
    /// skipped entirely (any preset expansions still run).
    pub fn on_next_move(
        &mut self,
        max_evaluations: i64,
        end_time: Option<Instant>,
    ) -> Result<usize, PuctError> {
        let root = self.root.ok_or(PuctError::NoRoot)?;
        self.stats = SearchStats::default();

        // Warm-up: pre-expand every root child with a visit floor.
        if self.config.root_expansions_preset_visits > 0 {
            let preset = self.config.root_expansions_preset_visits as u32;
            for i in 0..self.store.get(root).num_children() {
                if self.store.get(root).child(i).to_node.is_some() {
                    continue;
                }
                let id = self.expand_child(root, i)?;
                let node = self.store.get_mut(id);
                node.visits = node.visits.max(preset);
            }
        }

        if max_evaluations != 0 {
            if self.config.batched() {
                self.playout_loop_batched(max_evaluations, end_time)?;
            } else {
                self.playout_loop(max_evaluations, end_time)?;
            }
        }

        let choice = self.choose(None)?;

        if max_evaluations != 0 && self.config.verbose {
            self.log_debug(choice);
        }

        Ok(choice)
    }

    /// Commit `joint_move` at the root.
    pub fn apply_move(&mut self, joint_move: &JointMove) -> Result<NodeId, PuctError> {
        let root = self.root.ok_or(PuctError::NoRoot)?;
        let index = self
            .store
            .get(root)
            .find_child(joint_move)
            .ok_or(PuctError::MoveNotFound)?;

        trace!(mv = %move_string(joint_move, self.sm), "applying move");
        self.fast_apply_move(index)
    }

    /// Commit the root child at `child_index`: its subtree becomes the new
    /// root, every sibling subtree is released.
    pub fn fast_apply_move(&mut self, child_index: usize) -> Result<NodeId, PuctError> {
        let root = self.root.ok_or(PuctError::NoRoot)?;
        let nodes_before = self.store.number_of_nodes();

        if self.store.get(root).child(child_index).to_node.is_none() {
            self.expand_child(root, child_index)?;
        }
        let new_root = self.store.get(root).child(child_index).to_node.unwrap();

        for i in 0..self.store.get(root).num_children() {
            if i == child_index {
                continue;
            }
            let Some(sibling) = self.store.get(root).child(i).to_node else {
                continue;
            };
            self.store.get_mut(root).child_mut(i).to_node = None;
            self.store.release(sibling);
        }

        if self.config.use_transpositions {
            // The old root goes too; the chosen edge's reference transfers
            // to the session itself.
            self.store.get_mut(root).child_mut(child_index).to_node = None;
            self.store.release(root);
            self.store.get_mut(new_root).parent = None;
        }

        let removed = self.store.sweep();
        if removed > 0 && self.config.verbose {
            info!(removed, before = nodes_before, "released sibling subtrees");
        }

        self.root = Some(new_root);
        self.game_depth += 1;

        Ok(new_root)
    }

    /// Drop the whole tree and restart counting from `game_depth`.
    pub fn reset(&mut self, game_depth: u16) {
        let anchor = if self.config.use_transpositions {
            self.root
        } else {
            self.initial_root
        };

        if let Some(anchor) = anchor {
            self.store.release(anchor);
            let removed = self.store.sweep();
            if self.config.verbose {
                info!(removed, "tree released on reset");
            }
        }

        self.root = None;
        self.initial_root = None;
        self.pending.clear();
        self.stats = SearchStats::default();

        if self.store.number_of_nodes() != 0 {
            warn!(
                count = self.store.number_of_nodes(),
                bytes = self.store.allocated_memory(),
                "nodes leaked across reset"
            );
        }

        self.game_depth = game_depth;
    }

    /// History replay: move the root back to the ancestor at `depth` along
    /// the retained spine. Requires the non-transposition variant (the
    /// transposition variant frees old roots as it goes).
    pub fn jump_root(&mut self, depth: u16) -> Result<NodeId, PuctError> {
        let mut cur = self.root.ok_or(PuctError::NoRoot)?;

        while self.store.get(cur).game_depth > depth {
            cur = self
                .store
                .get(cur)
                .parent
                .ok_or(PuctError::DepthNotOnPath(depth))?;
        }

        if self.store.get(cur).game_depth != depth {
            return Err(PuctError::DepthNotOnPath(depth));
        }

        self.root = Some(cur);
        self.game_depth = depth;
        Ok(cur)
    }

    // ------------------------------------------------------------------
    // choice

    /// Pick a child of `node` (default: the root) under the configured
    /// choice policy.
    pub fn choose(&mut self, node: Option<NodeId>) -> Result<usize, PuctError> {
        let node = match node {
            Some(id) => id,
            None => self.root.ok_or(PuctError::NoRoot)?,
        };

        let choice = match self.config.choose {
            ChoosePolicy::TopVisits => choose::top_visits(&self.store, &self.config, node),
            ChoosePolicy::Temperature => choose::temperature(
                &mut self.store,
                &self.config,
                &mut self.rng,
                node,
                self.game_depth,
            ),
        };

        Ok(choice)
    }

    /// The temperature-shaped probability of each child of `node`, in
    /// child order. Sums to 1.
    pub fn get_probabilities(
        &mut self,
        node: NodeId,
        temperature: f32,
        use_linger: bool,
    ) -> Vec<f32> {
        choose::set_probabilities(&mut self.store, node, temperature, use_linger);
        self.store
            .get(node)
            .children()
            .iter()
            .map(|c| c.next_prob)
            .collect()
    }

    // ------------------------------------------------------------------
    // debug dump

    /// Log the tree below the root, following the top-visits line, down to
    /// `max_dump_depth`.
    fn log_debug(&mut self, root_choice: usize) {
        let Some(mut cur) = self.root else { return };

        for level in 0..self.config.max_dump_depth {
            let node = self.store.get(cur);
            if node.num_children() == 0 {
                break;
            }

            let next_choice = if level == 0 {
                root_choice
            } else {
                choose::top_visits(&self.store, &self.config, cur)
            };

            self.dump_node(cur, next_choice);

            match self.store.get(cur).child(next_choice).to_node {
                Some(next) => cur = next,
                None => break,
            }
        }
    }

    fn dump_node(&self, id: NodeId, highlight: usize) {
        let node = self.store.get(id);
        let scores: Vec<String> = (0..node.role_count())
            .map(|r| format!("{:.2}", node.current_score(r)))
            .collect();

        debug!(
            visits = node.visits,
            scores = %scores.join(" "),
            children = node.num_children(),
            depth = node.game_depth,
            lead_role = ?node.lead_role,
            puct_constant = node.puct_constant,
            finalised = ?node.finalised,
            "node"
        );

        for &i in &self.store.sorted_children(id, false) {
            let child = node.child(i);
            let (tag, visits, score) = match child.to_node {
                None => ("?", 0, String::from("----")),
                Some(t) => {
                    let target = self.store.get(t);
                    let tag = match target.finalised {
                        Finalised::RepeatDraw => "Z",
                        Finalised::Terminal => "T",
                        Finalised::Proven => "F",
                        Finalised::No => "*",
                    };
                    (tag, target.visits, format!("{:.2}", target.current_score(node.scoring_role())))
                }
            };

            debug!(
                mv = %move_string(&child.joint_move, self.sm),
                tag,
                traversals = child.traversals,
                extra_visits = visits.saturating_sub(child.traversals),
                policy = %format!("{:.1}/{:.1}/{:.1}",
                    child.policy_prob_orig * 100.0,
                    child.policy_prob * 100.0,
                    child.next_prob * 100.0),
                score = %score,
                node_score = child.debug_node_score,
                puct_score = child.debug_puct_score,
                chosen = i == highlight,
                "  child"
            );
        }
    }
}
