//! Synthetic games seeding the search scenarios.

use search_core::{
    BaseState, HashMask, JointMove, LegalIndex, RoleIndex, StateMachine, StateTransformer,
};

/// Linear two-role game: role 0 picks one of `branching` moves (role 1 is
/// forced into a no-op) and any move advances a ply counter; terminal at
/// `depth` plies with fixed goals. `branching == 1` gives the single-legal
/// chain.
///
/// State layout: `[ply]`.
pub struct ChainGame {
    depth: u8,
    goals: [u8; 2],
    current: BaseState,
    legals: [Vec<LegalIndex>; 2],
}

impl ChainGame {
    pub fn new(branching: usize, depth: u8) -> Self {
        Self {
            depth,
            goals: [100, 0],
            current: BaseState::zeroed(1),
            legals: [(0..branching as LegalIndex).collect(), vec![0]],
        }
    }
}

impl StateMachine for ChainGame {
    fn role_count(&self) -> usize {
        2
    }

    fn initial_state(&self) -> BaseState {
        BaseState::zeroed(1)
    }

    fn new_base_state(&self) -> BaseState {
        BaseState::zeroed(1)
    }

    fn update_bases(&mut self, state: &BaseState) {
        self.current.assign(state);
    }

    fn next_state(&mut self, _joint_move: &JointMove, out: &mut BaseState) {
        out.bytes_mut()[0] = self.current.bytes()[0] + 1;
    }

    fn is_terminal(&self) -> bool {
        self.current.bytes()[0] >= self.depth
    }

    fn goal_value(&self, role: RoleIndex) -> u8 {
        self.goals[role]
    }

    fn legal_moves(&self, role: RoleIndex) -> &[LegalIndex] {
        &self.legals[role]
    }

    fn legal_to_move(&self, role: RoleIndex, legal: LegalIndex) -> String {
        if role == 0 {
            format!("advance-{legal}")
        } else {
            "noop".to_string()
        }
    }
}

/// Depth-1 game where role 0 chooses between an immediate win (move 0) and
/// an immediate loss (move 1).
///
/// State layout: `[ply, chosen]`.
pub struct WinLossGame {
    current: BaseState,
    legals: [Vec<LegalIndex>; 2],
}

impl WinLossGame {
    pub fn new() -> Self {
        Self {
            current: BaseState::zeroed(2),
            legals: [vec![0, 1], vec![0]],
        }
    }
}

impl StateMachine for WinLossGame {
    fn role_count(&self) -> usize {
        2
    }

    fn initial_state(&self) -> BaseState {
        BaseState::zeroed(2)
    }

    fn new_base_state(&self) -> BaseState {
        BaseState::zeroed(2)
    }

    fn update_bases(&mut self, state: &BaseState) {
        self.current.assign(state);
    }

    fn next_state(&mut self, joint_move: &JointMove, out: &mut BaseState) {
        let bytes = out.bytes_mut();
        bytes[0] = 1;
        bytes[1] = joint_move.get(0) as u8;
    }

    fn is_terminal(&self) -> bool {
        self.current.bytes()[0] >= 1
    }

    fn goal_value(&self, role: RoleIndex) -> u8 {
        let won = self.current.bytes()[1] == 0;
        match (role, won) {
            (0, true) | (1, false) => 100,
            _ => 0,
        }
    }

    fn legal_moves(&self, role: RoleIndex) -> &[LegalIndex] {
        &self.legals[role]
    }

    fn legal_to_move(&self, role: RoleIndex, legal: LegalIndex) -> String {
        match (role, legal) {
            (0, 0) => "win".to_string(),
            (0, 1) => "lose".to_string(),
            _ => "noop".to_string(),
        }
    }
}

/// Endless two-phase cycle: the single legal move toggles the state
/// between phase 0 and phase 1. Only the repeat-state rule can end a
/// search here.
///
/// State layout: `[phase]`.
pub struct CycleGame {
    current: BaseState,
    legals: [Vec<LegalIndex>; 2],
}

impl CycleGame {
    pub fn new() -> Self {
        Self {
            current: BaseState::zeroed(1),
            legals: [vec![0], vec![0]],
        }
    }
}

impl StateMachine for CycleGame {
    fn role_count(&self) -> usize {
        2
    }

    fn initial_state(&self) -> BaseState {
        BaseState::zeroed(1)
    }

    fn new_base_state(&self) -> BaseState {
        BaseState::zeroed(1)
    }

    fn update_bases(&mut self, state: &BaseState) {
        self.current.assign(state);
    }

    fn next_state(&mut self, _joint_move: &JointMove, out: &mut BaseState) {
        out.bytes_mut()[0] = (self.current.bytes()[0] + 1) % 2;
    }

    fn is_terminal(&self) -> bool {
        false
    }

    fn goal_value(&self, _role: RoleIndex) -> u8 {
        0
    }

    fn legal_moves(&self, role: RoleIndex) -> &[LegalIndex] {
        &self.legals[role]
    }

    fn legal_to_move(&self, _role: RoleIndex, _legal: LegalIndex) -> String {
        "cycle".to_string()
    }
}

/// Pass-through transformer for the synthetic games: channels are the raw
/// state bytes plus zero-padded history, the hash mask covers everything.
pub struct BytesTransformer {
    state_len: usize,
    role_count: usize,
}

impl BytesTransformer {
    pub fn new(state_len: usize, role_count: usize) -> Self {
        Self {
            state_len,
            role_count,
        }
    }
}

impl StateTransformer for BytesTransformer {
    fn num_prev_states(&self) -> usize {
        1
    }

    fn num_policies(&self) -> usize {
        self.role_count
    }

    fn num_rewards(&self) -> usize {
        self.role_count
    }

    fn channel_len(&self) -> usize {
        self.state_len * 2
    }

    fn create_hash_mask(&self, tmp: &BaseState) -> HashMask {
        HashMask::all(tmp.byte_count())
    }

    fn to_channels(&self, state: &BaseState, prev_states: &[&BaseState], out: &mut [f32]) {
        for (i, b) in state.bytes().iter().enumerate() {
            out[i] = *b as f32;
        }
        if let Some(prev) = prev_states.first() {
            for (i, b) in prev.bytes().iter().enumerate() {
                out[self.state_len + i] = *b as f32;
            }
        }
    }
}
