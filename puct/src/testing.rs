//! Small state machines and a pass-through transformer for unit tests.

use search_core::{BaseState, HashMask, JointMove, LegalIndex, RoleIndex, StateMachine, StateTransformer};

/// Linear game: role 0 picks one of `branching` moves, every other role is
/// forced into a no-op, and any move advances a ply counter. Terminal once
/// the counter reaches `depth`, with fixed goals.
///
/// State layout: `[ply]`.
pub struct StepGame {
    role_count: usize,
    depth: u8,
    goals: [u8; 2],
    current: BaseState,
    legals: Vec<Vec<LegalIndex>>,
}

impl StepGame {
    pub fn new(branching: usize, role_count: usize) -> Self {
        let legals = (0..role_count)
            .map(|role| {
                if role == 0 {
                    (0..branching as LegalIndex).collect()
                } else {
                    vec![0]
                }
            })
            .collect();

        Self {
            role_count,
            depth: 5,
            goals: [100, 0],
            current: BaseState::zeroed(1),
            legals,
        }
    }

    pub fn with_depth(mut self, depth: u8) -> Self {
        self.depth = depth;
        self
    }

    pub fn with_goals(mut self, goals: [u8; 2]) -> Self {
        self.goals = goals;
        self
    }

    fn ply(&self) -> u8 {
        self.current.bytes()[0]
    }
}

impl StateMachine for StepGame {
    fn role_count(&self) -> usize {
        self.role_count
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
        out.bytes_mut()[0] = self.ply() + 1;
    }

    fn is_terminal(&self) -> bool {
        self.ply() >= self.depth
    }

    fn goal_value(&self, role: RoleIndex) -> u8 {
        self.goals[role.min(1)]
    }

    fn legal_moves(&self, role: RoleIndex) -> &[LegalIndex] {
        &self.legals[role]
    }

    fn legal_to_move(&self, role: RoleIndex, legal: LegalIndex) -> String {
        if role == 0 {
            format!("step-{legal}")
        } else {
            "noop".to_string()
        }
    }
}

/// Two roles each pick one of `n` moves simultaneously; the game ends after
/// one ply. Matching moves score for role 0, mismatches for role 1.
///
/// State layout: `[ply, move0, move1]`.
pub struct SimultaneousGame {
    current: BaseState,
    legals: Vec<LegalIndex>,
}

impl SimultaneousGame {
    pub fn new(n: usize) -> Self {
        Self {
            current: BaseState::zeroed(3),
            legals: (0..n as LegalIndex).collect(),
        }
    }
}

impl StateMachine for SimultaneousGame {
    fn role_count(&self) -> usize {
        2
    }

    fn initial_state(&self) -> BaseState {
        BaseState::zeroed(3)
    }

    fn new_base_state(&self) -> BaseState {
        BaseState::zeroed(3)
    }

    fn update_bases(&mut self, state: &BaseState) {
        self.current.assign(state);
    }

    fn next_state(&mut self, joint_move: &JointMove, out: &mut BaseState) {
        let bytes = out.bytes_mut();
        bytes[0] = self.current.bytes()[0] + 1;
        bytes[1] = joint_move.get(0) as u8;
        bytes[2] = joint_move.get(1) as u8;
    }

    fn is_terminal(&self) -> bool {
        self.current.bytes()[0] >= 1
    }

    fn goal_value(&self, role: RoleIndex) -> u8 {
        let matched = self.current.bytes()[1] == self.current.bytes()[2];
        match (role, matched) {
            (0, true) | (1, false) => 100,
            _ => 0,
        }
    }

    fn legal_moves(&self, _role: RoleIndex) -> &[LegalIndex] {
        &self.legals
    }

    fn legal_to_move(&self, _role: RoleIndex, legal: LegalIndex) -> String {
        format!("pick-{legal}")
    }
}

/// Depth-1 game: role 0 chooses between an immediate win (move 0) and an
/// immediate loss (move 1); role 1 is a forced no-op.
///
/// State layout: `[ply, chosen]`.
pub struct WinLossGame {
    current: BaseState,
    legals: Vec<Vec<LegalIndex>>,
}

impl WinLossGame {
    pub fn new() -> Self {
        Self {
            current: BaseState::zeroed(2),
            legals: vec![vec![0, 1], vec![0]],
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

/// Pass-through transformer: channels are the raw state bytes (plus
/// zero-padded history slots), the hash mask covers the whole state.
pub struct BytesTransformer {
    state_len: usize,
    role_count: usize,
    prev_states: usize,
}

impl BytesTransformer {
    pub fn new(state_len: usize, role_count: usize) -> Self {
        Self {
            state_len,
            role_count,
            prev_states: 1,
        }
    }
}

impl StateTransformer for BytesTransformer {
    fn num_prev_states(&self) -> usize {
        self.prev_states
    }

    fn num_policies(&self) -> usize {
        self.role_count
    }

    fn num_rewards(&self) -> usize {
        self.role_count
    }

    fn channel_len(&self) -> usize {
        self.state_len * (1 + self.prev_states)
    }

    fn create_hash_mask(&self, tmp: &BaseState) -> HashMask {
        HashMask::all(tmp.byte_count())
    }

    fn to_channels(&self, state: &BaseState, prev_states: &[&BaseState], out: &mut [f32]) {
        for (i, b) in state.bytes().iter().enumerate() {
            out[i] = *b as f32;
        }
        for (slot, prev) in prev_states.iter().enumerate() {
            let offset = self.state_len * (1 + slot);
            for (i, b) in prev.bytes().iter().enumerate() {
                out[offset + i] = *b as f32;
            }
        }
    }
}
