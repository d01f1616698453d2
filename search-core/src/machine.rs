//! The game rules contract.
//!
//! A [`StateMachine`] is a stateful view over a game's rules: the caller
//! positions it on a base state with [`StateMachine::update_bases`] and then
//! queries legals, terminality and goal values for that position, or derives
//! a successor state with [`StateMachine::next_state`]. The search engine is
//! careful to re-position the machine before every group of queries, so
//! implementations are free to cache whatever the last `update_bases` made
//! current.

use crate::moves::{JointMove, LegalIndex, RoleIndex};
use crate::state::BaseState;

/// Stateful game rules: legal moves, successor states, terminal detection
/// and goal values.
///
/// All query methods (`is_terminal`, `goal_value`, `legal_moves`) refer to
/// the state most recently passed to [`StateMachine::update_bases`].
pub trait StateMachine {
    /// Number of roles (players) in the game. Fixed for the machine's
    /// lifetime.
    fn role_count(&self) -> usize;

    /// The game's initial state.
    fn initial_state(&self) -> BaseState;

    /// A zeroed state of the right size for this game, for use as an
    /// output buffer.
    fn new_base_state(&self) -> BaseState;

    /// Position the machine on `state`; subsequent queries refer to it.
    fn update_bases(&mut self, state: &BaseState);

    /// Write the successor of the current state under `joint_move` into
    /// `out`. Does not reposition the machine.
    fn next_state(&mut self, joint_move: &JointMove, out: &mut BaseState);

    /// Whether the current state is terminal.
    fn is_terminal(&self) -> bool;

    /// Goal value for `role` in the current state, in 0..=100. Only
    /// meaningful on terminal states.
    fn goal_value(&self, role: RoleIndex) -> u8;

    /// Legal move indices for `role` in the current state. Non-terminal
    /// states have at least one legal per role (a forced no-op counts).
    fn legal_moves(&self, role: RoleIndex) -> &[LegalIndex];

    /// Human-readable rendering of one legal, for logs and tree dumps.
    fn legal_to_move(&self, role: RoleIndex, legal: LegalIndex) -> String;
}
