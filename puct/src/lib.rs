//! Network-guided PUCT tree search for general multi-role games.
//!
//! This crate is the decision engine of an AlphaZero-style play system:
//! given a game (a [`StateMachine`](search_core::StateMachine)), a
//! state-to-channels encoding (a
//! [`StateTransformer`](search_core::StateTransformer)) and a policy/value
//! network behind an [`Evaluator`], a [`PuctSearch`] session repeatedly
//!
//! 1. **selects** a path from the root by PUCT score (priors + value
//!    estimates + exploration, Dirichlet noise at the root),
//! 2. **expands** the reached edge, evaluating the new state through the
//!    network (or adopting a transposition), and
//! 3. **backs up** the leaf's per-role scores into every node on the path,
//!    proving positions outright where every line below is decided.
//!
//! Between moves the tree is reused: committing a move promotes the chosen
//! child to root and releases the sibling subtrees.
//!
//! Two driver variants share the engine. The single-worker variant runs one
//! playout at a time against an evaluation budget. The batched variant
//! keeps up to `batch_size` descents in flight, parking each at its
//! evaluation boundary and flushing the parked set through
//! [`Evaluator::evaluate_batch`] in one call, with think-time stopping
//! rules. Selection masks in-flight edges and penalises crowded ones, so
//! concurrent descents spread over the tree.
//!
//! ```rust,ignore
//! use puct::{PuctConfig, PuctSearch, UniformEvaluator};
//!
//! let mut sm = games_tictactoe::TicTacToe::new();
//! let transformer = games_tictactoe::TicTacToeTransformer::new();
//! let evaluator = UniformEvaluator::new();
//!
//! let config = PuctConfig::for_competition();
//! let mut search = PuctSearch::new(&mut sm, &transformer, &evaluator, config, 42);
//!
//! search.establish_root(None)?;
//! let choice = search.on_next_move(800, None)?;
//! search.fast_apply_move(choice)?;
//! ```

mod choose;
pub mod config;
pub mod evaluator;
pub mod node;
pub mod request;
pub mod search;
mod select;
pub mod store;

#[cfg(test)]
pub(crate) mod testing;

pub use config::{ChoosePolicy, PuctConfig};
pub use evaluator::{EvalRequest, Evaluator, EvaluatorError, ModelReply, UniformEvaluator};
pub use node::{move_string, Child, Finalised, Node, NodeId};
pub use request::NodeRequest;
pub use search::{PuctError, PuctSearch, SearchStats};
pub use store::NodeStore;
