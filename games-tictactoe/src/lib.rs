//! Tic-tac-toe in general-game-playing form.
//!
//! Both roles move every turn: the role on the move places a mark, the
//! other role plays the forced no-op. This is the standard GGP rendering of
//! an alternating-turn game, and it gives the search a well-defined lead
//! role at every node.
//!
//! Provides the [`StateMachine`] implementation ([`TicTacToe`]) and a
//! matching [`StateTransformer`] ([`TicTacToeTransformer`]), used by the
//! `puct` crate's integration tests and benches.

use search_core::{
    BaseState, HashMask, JointMove, LegalIndex, RoleIndex, StateMachine, StateTransformer,
};

/// Legal-index of the forced no-op, for either role.
pub const NOOP: LegalIndex = 9;

/// Encoded state size: board (9) + current player (1) + winner (1).
pub const STATE_BYTES: usize = 11;

/// Floats per state in the channel encoding: two mark planes plus the
/// current-player pair.
pub const STATE_CHANNELS: usize = 20;

const LINES: [[usize; 3]; 8] = [
    [0, 1, 2],
    [3, 4, 5],
    [6, 7, 8], // rows
    [0, 3, 6],
    [1, 4, 7],
    [2, 5, 8], // columns
    [0, 4, 8],
    [2, 4, 6], // diagonals
];

/// Decoded game state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct State {
    /// 0 = empty, 1 = x, 2 = o.
    pub board: [u8; 9],
    /// 1 = x, 2 = o.
    pub current_player: u8,
    /// 0 = ongoing, 1 = x, 2 = o, 3 = draw.
    pub winner: u8,
}

impl State {
    pub fn new() -> Self {
        Self {
            board: [0; 9],
            current_player: 1,
            winner: 0,
        }
    }

    pub fn is_done(&self) -> bool {
        self.winner != 0
    }

    /// Place the current player's mark and return the successor.
    pub fn make_move(&self, cell: u8) -> State {
        debug_assert!(!self.is_done());
        debug_assert!(cell < 9 && self.board[cell as usize] == 0);

        let mut next = *self;
        next.board[cell as usize] = self.current_player;
        next.winner = check_winner(&next.board);
        if next.winner == 0 {
            next.current_player = if self.current_player == 1 { 2 } else { 1 };
        }
        next
    }

    pub fn encode(&self, out: &mut BaseState) {
        let bytes = out.bytes_mut();
        bytes[..9].copy_from_slice(&self.board);
        bytes[9] = self.current_player;
        bytes[10] = self.winner;
    }

    pub fn decode(state: &BaseState) -> State {
        let bytes = state.bytes();
        debug_assert_eq!(bytes.len(), STATE_BYTES);

        let mut board = [0u8; 9];
        board.copy_from_slice(&bytes[..9]);
        State {
            board,
            current_player: bytes[9],
            winner: bytes[10],
        }
    }
}

impl Default for State {
    fn default() -> Self {
        Self::new()
    }
}

/// Winner of the board: 0 ongoing, 1/2 a player, 3 draw.
pub fn check_winner(board: &[u8; 9]) -> u8 {
    for line in &LINES {
        let [a, b, c] = *line;
        if board[a] != 0 && board[a] == board[b] && board[b] == board[c] {
            return board[a];
        }
    }

    if board.iter().all(|&cell| cell != 0) {
        return 3;
    }

    0
}

/// The state machine: positioned with `update_bases`, queried for legals,
/// terminality and goals, stepped with `next_state`.
pub struct TicTacToe {
    state: State,
    legals: [Vec<LegalIndex>; 2],
}

impl TicTacToe {
    pub fn new() -> Self {
        let mut sm = Self {
            state: State::new(),
            legals: [Vec::new(), Vec::new()],
        };
        sm.refresh_legals();
        sm
    }

    fn refresh_legals(&mut self) {
        self.legals[0].clear();
        self.legals[1].clear();

        if self.state.is_done() {
            return;
        }

        let mover = (self.state.current_player - 1) as usize;
        for (cell, &mark) in self.state.board.iter().enumerate() {
            if mark == 0 {
                self.legals[mover].push(cell as LegalIndex);
            }
        }
        self.legals[1 - mover].push(NOOP);
    }
}

impl Default for TicTacToe {
    fn default() -> Self {
        Self::new()
    }
}

impl StateMachine for TicTacToe {
    fn role_count(&self) -> usize {
        2
    }

    fn initial_state(&self) -> BaseState {
        let mut out = BaseState::zeroed(STATE_BYTES);
        State::new().encode(&mut out);
        out
    }

    fn new_base_state(&self) -> BaseState {
        BaseState::zeroed(STATE_BYTES)
    }

    fn update_bases(&mut self, state: &BaseState) {
        self.state = State::decode(state);
        self.refresh_legals();
    }

    fn next_state(&mut self, joint_move: &JointMove, out: &mut BaseState) {
        let mover = (self.state.current_player - 1) as RoleIndex;
        let cell = joint_move.get(mover);
        debug_assert_ne!(cell, NOOP);
        debug_assert_eq!(joint_move.get(1 - mover), NOOP);

        self.state.make_move(cell as u8).encode(out);
    }

    fn is_terminal(&self) -> bool {
        self.state.is_done()
    }

    fn goal_value(&self, role: RoleIndex) -> u8 {
        match (self.state.winner, role) {
            (1, 0) | (2, 1) => 100,
            (3, _) => 50,
            _ => 0,
        }
    }

    fn legal_moves(&self, role: RoleIndex) -> &[LegalIndex] {
        &self.legals[role]
    }

    fn legal_to_move(&self, _role: RoleIndex, legal: LegalIndex) -> String {
        if legal == NOOP {
            "noop".to_string()
        } else {
            format!("mark-{}-{}", legal / 3, legal % 3)
        }
    }
}

/// Channel encoding: per state a plane of x marks, a plane of o marks and
/// the current-player pair; history states are appended in the same
/// layout. The whole encoded state participates in position identity.
pub struct TicTacToeTransformer {
    prev_states: usize,
}

impl TicTacToeTransformer {
    pub fn new() -> Self {
        Self { prev_states: 1 }
    }

    pub fn with_prev_states(prev_states: usize) -> Self {
        Self { prev_states }
    }

    fn encode_one(state: &BaseState, out: &mut [f32]) {
        let decoded = State::decode(state);
        for (cell, &mark) in decoded.board.iter().enumerate() {
            if mark == 1 {
                out[cell] = 1.0;
            } else if mark == 2 {
                out[9 + cell] = 1.0;
            }
        }
        if decoded.current_player == 1 {
            out[18] = 1.0;
        } else {
            out[19] = 1.0;
        }
    }
}

impl Default for TicTacToeTransformer {
    fn default() -> Self {
        Self::new()
    }
}

impl StateTransformer for TicTacToeTransformer {
    fn num_prev_states(&self) -> usize {
        self.prev_states
    }

    fn num_policies(&self) -> usize {
        2
    }

    fn num_rewards(&self) -> usize {
        2
    }

    fn channel_len(&self) -> usize {
        STATE_CHANNELS * (1 + self.prev_states)
    }

    fn create_hash_mask(&self, tmp: &BaseState) -> HashMask {
        HashMask::all(tmp.byte_count())
    }

    fn to_channels(&self, state: &BaseState, prev_states: &[&BaseState], out: &mut [f32]) {
        Self::encode_one(state, &mut out[..STATE_CHANNELS]);
        for (slot, prev) in prev_states.iter().take(self.prev_states).enumerate() {
            let offset = STATE_CHANNELS * (1 + slot);
            Self::encode_one(prev, &mut out[offset..offset + STATE_CHANNELS]);
        }
    }
}

#[cfg(test)]
mod tests;
