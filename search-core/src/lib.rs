//! Core contracts for the PUCT search engine
//!
//! This crate defines the types and traits the search engine shares with its
//! collaborators:
//!
//! - [`BaseState`]: an opaque per-game state blob, plus [`HashMask`] for
//!   masked comparison and hashing
//! - [`JointMove`]: one legal-index per role, describing a transition
//! - [`StateMachine`]: the stateful game rules contract (legals, successor
//!   states, terminal detection, goal values)
//! - [`StateTransformer`]: conversion of states into network-input channels,
//!   and the hash mask used for repeat-state detection and transpositions
//!
//! No search logic lives here; the `puct` crate builds on these contracts.

pub mod machine;
pub mod moves;
pub mod state;
pub mod transform;

pub use machine::StateMachine;
pub use moves::{JointMove, LegalIndex, RoleIndex};
pub use state::{BaseState, HashMask};
pub use transform::StateTransformer;
