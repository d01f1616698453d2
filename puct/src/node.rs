//! Search-tree nodes.
//!
//! One [`Node`] per reached game state, holding the state blob, the running
//! per-role value estimates, and an inline array of [`Child`] edges (the
//! cross product of per-role legal moves). Nodes live in the
//! [`NodeStore`](crate::store::NodeStore) arena and reference each other by
//! [`NodeId`], so edges are plain integers rather than owning pointers.

use search_core::{BaseState, JointMove, RoleIndex, StateMachine};

/// Index into the node arena. Newtype for type safety.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(pub u32);

/// Why a node's scores are exact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Finalised {
    /// Scores are still estimates.
    No,
    /// The state machine reported a terminal state.
    Terminal,
    /// Every line below is decided; scores copied from the best child.
    Proven,
    /// The repeat-state rule declared this position a draw.
    RepeatDraw,
}

/// One edge out of a node: a joint move, an optional destination, and the
/// prior/visit bookkeeping the selection formula reads.
#[derive(Debug, Clone)]
pub struct Child {
    /// The joint move labelling this edge.
    pub joint_move: JointMove,

    /// Destination node, populated on expansion.
    pub to_node: Option<NodeId>,

    /// Network prior after flooring and normalisation.
    pub policy_prob_orig: f32,

    /// Working prior; equals `policy_prob_orig` unless mutated by a caller
    /// (noise mixing happens per selection call, not here).
    pub policy_prob: f32,

    /// Last root-noise sample drawn for this edge, kept for the tree dump.
    pub dirichlet_noise: f32,

    /// Scratch probability used by temperature sampling and the dump.
    pub next_prob: f32,

    /// Descents through this edge. Differs from the destination's `visits`
    /// under transpositions.
    pub traversals: u32,

    /// Set while the destination is being created; selection skips it.
    pub unselectable: bool,

    /// Last seen value/exploration decomposition, for the dump.
    pub debug_node_score: f32,
    pub debug_puct_score: f32,
}

/// A search-tree node.
#[derive(Debug, Clone)]
pub struct Node {
    /// The game state this node represents.
    state: BaseState,

    /// Back-reference; `None` at the session root.
    pub parent: Option<NodeId>,

    /// Completed back-propagations through this node.
    pub visits: u32,

    /// Reserved descents not yet backed up (batched variant only).
    pub inflight_visits: u16,

    /// Child slots referencing this node; relevant under transpositions.
    pub ref_count: u16,

    /// Children currently masked from selection.
    pub unselectable_count: u16,

    /// Child slots with a populated `to_node`.
    pub num_children_expanded: u16,

    /// Whether (and why) the scores are exact.
    pub finalised: Finalised,

    /// Role whose move defines the child edges; `None` when more than one
    /// role has a real choice (simultaneous moves).
    pub lead_role: Option<RoleIndex>,

    /// Plies from the initial root of this search session.
    pub game_depth: u16,

    /// Cached dynamic exploration constant, set during selection.
    pub puct_constant: f32,

    /// Approximate heap footprint, for the leak report on reset.
    pub allocated_size: u32,

    current_score: Box<[f32]>,
    final_score: Box<[f32]>,
    children: Box<[Child]>,
}

impl Node {
    /// Build a node for `state` by querying the state machine: terminal
    /// detection, goal values, per-role legals and the lead role. The
    /// machine is repositioned onto `state`.
    pub fn create(state: &BaseState, sm: &mut dyn StateMachine) -> Node {
        let role_count = sm.role_count();
        sm.update_bases(state);

        let mut lead_role = Some(0);
        let mut children: Box<[Child]> = Box::new([]);
        let mut finalised = Finalised::No;

        if sm.is_terminal() {
            finalised = Finalised::Terminal;
        } else {
            // The lead role is the one with the most legal moves; if more
            // than one role has a real choice the moves are simultaneous.
            let mut max_moves = 1;
            let mut lead = 0;
            for role in 0..role_count {
                let count = sm.legal_moves(role).len();
                if count > max_moves {
                    max_moves = count;
                    lead = role;
                }
            }

            if max_moves > 1 {
                let rest_one = (0..role_count)
                    .filter(|&role| role != lead)
                    .all(|role| sm.legal_moves(role).len() == 1);
                lead_role = if rest_one { Some(lead) } else { None };
            }

            children = init_children(sm, role_count);
        }

        let mut node = Node {
            state: state.clone(),
            parent: None,
            visits: 0,
            inflight_visits: 0,
            ref_count: 1,
            unselectable_count: 0,
            num_children_expanded: 0,
            finalised,
            lead_role,
            game_depth: 0,
            puct_constant: 1.44,
            allocated_size: 0,
            current_score: vec![0.0; role_count].into_boxed_slice(),
            final_score: vec![0.0; role_count].into_boxed_slice(),
            children,
        };

        if node.is_terminal() {
            for role in 0..role_count {
                let score = sm.goal_value(role) as f32 / 100.0;
                node.final_score[role] = score;
                node.current_score[role] = score;
            }
        }

        node.allocated_size = node.footprint() as u32;
        node
    }

    /// The state this node represents.
    #[inline]
    pub fn state(&self) -> &BaseState {
        &self.state
    }

    /// Terminal means the state machine gave no moves to anyone.
    #[inline]
    pub fn is_terminal(&self) -> bool {
        self.children.is_empty()
    }

    #[inline]
    pub fn is_finalised(&self) -> bool {
        self.finalised != Finalised::No
    }

    /// The role whose perspective scores this node: the lead role, or role
    /// 0 for simultaneous nodes.
    #[inline]
    pub fn scoring_role(&self) -> RoleIndex {
        self.lead_role.unwrap_or(0)
    }

    #[inline]
    pub fn num_children(&self) -> usize {
        self.children.len()
    }

    #[inline]
    pub fn child(&self, i: usize) -> &Child {
        &self.children[i]
    }

    #[inline]
    pub fn child_mut(&mut self, i: usize) -> &mut Child {
        &mut self.children[i]
    }

    #[inline]
    pub fn children(&self) -> &[Child] {
        &self.children
    }

    #[inline]
    pub fn children_mut(&mut self) -> &mut [Child] {
        &mut self.children
    }

    /// Index of the child carrying `joint_move`, if any.
    pub fn find_child(&self, joint_move: &JointMove) -> Option<usize> {
        self.children
            .iter()
            .position(|c| &c.joint_move == joint_move)
    }

    #[inline]
    pub fn current_score(&self, role: RoleIndex) -> f32 {
        self.current_score[role]
    }

    #[inline]
    pub fn set_current_score(&mut self, role: RoleIndex, score: f32) {
        self.current_score[role] = score;
    }

    /// Value as predicted by the network's value head, or the terminal
    /// goal.
    #[inline]
    pub fn final_score(&self, role: RoleIndex) -> f32 {
        self.final_score[role]
    }

    #[inline]
    pub fn set_final_score(&mut self, role: RoleIndex, score: f32) {
        self.final_score[role] = score;
    }

    #[inline]
    pub fn role_count(&self) -> usize {
        self.current_score.len()
    }

    /// Approximate heap bytes held by this node.
    fn footprint(&self) -> usize {
        std::mem::size_of::<Node>()
            + self.state.byte_count()
            + 2 * self.current_score.len() * std::mem::size_of::<f32>()
            + self.children.len()
                * (std::mem::size_of::<Child>()
                    + self.role_count() * std::mem::size_of::<search_core::LegalIndex>())
    }
}

/// Children are the cross product of per-role legals, enumerated with role
/// 0 outermost so sibling order is stable across runs.
fn init_children(sm: &dyn StateMachine, role_count: usize) -> Box<[Child]> {
    let mut total = 1usize;
    for role in 0..role_count {
        total *= sm.legal_moves(role).len();
    }

    let mut children = Vec::with_capacity(total);
    let mut joint_move = JointMove::new(role_count);
    fill_children(sm, role_count, 0, &mut joint_move, &mut children);
    debug_assert_eq!(children.len(), total);

    children.into_boxed_slice()
}

fn fill_children(
    sm: &dyn StateMachine,
    role_count: usize,
    role: RoleIndex,
    joint_move: &mut JointMove,
    out: &mut Vec<Child>,
) {
    let legals = sm.legal_moves(role);
    let final_role = role == role_count - 1;

    for &legal in legals {
        joint_move.set(role, legal);

        if final_role {
            out.push(Child {
                joint_move: joint_move.clone(),
                to_node: None,
                policy_prob_orig: 1.0,
                policy_prob: 1.0,
                dirichlet_noise: 0.0,
                next_prob: 0.0,
                traversals: 0,
                unselectable: false,
                debug_node_score: 0.0,
                debug_puct_score: 0.0,
            });
        } else {
            fill_children(sm, role_count, role + 1, joint_move, out);
        }
    }
}

/// Render a joint move through the state machine's move names.
pub fn move_string(joint_move: &JointMove, sm: &dyn StateMachine) -> String {
    let parts: Vec<String> = (0..joint_move.role_count())
        .map(|role| sm.legal_to_move(role, joint_move.get(role)))
        .collect();
    format!("({})", parts.join(" "))
}
