//! State-to-network-input transformation.
//!
//! The transformer owns the game-specific encoding of states into the float
//! channels the policy/value network consumes, and decides how much history
//! (previous states) the encoding includes. It also produces the
//! [`HashMask`] under which two states count as the same position — used by
//! the transposition map and the repeat-state draw rule.

use crate::state::{BaseState, HashMask};

/// Converts base states into network-input channels.
pub trait StateTransformer {
    /// How many previous states the encoding includes alongside the
    /// current one.
    fn num_prev_states(&self) -> usize;

    /// Number of policy heads the network produces (one per role).
    fn num_policies(&self) -> usize;

    /// Number of reward outputs per evaluation: either one per role, or 3
    /// for the win/loss/draw-mid head layout.
    fn num_rewards(&self) -> usize;

    /// Total length of the channel buffer written by
    /// [`StateTransformer::to_channels`].
    fn channel_len(&self) -> usize;

    /// The mask under which states are compared for identity. `tmp` is a
    /// scratch state of the right size for this game.
    fn create_hash_mask(&self, tmp: &BaseState) -> HashMask;

    /// Encode `state` (and up to [`num_prev_states`](Self::num_prev_states)
    /// previous states, most recent first — fewer near the start of a game)
    /// into `out`, which is `channel_len` floats, pre-zeroed.
    fn to_channels(&self, state: &BaseState, prev_states: &[&BaseState], out: &mut [f32]);
}
