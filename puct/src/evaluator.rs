//! The network evaluation contract.
//!
//! The search engine never runs the policy/value network itself; it hands an
//! [`EvalRequest`] (channel-encoded state plus the expected output shapes)
//! to an [`Evaluator`] and consumes the [`ModelReply`]. In production the
//! evaluator fronts a batching inference server; for tests and benches the
//! [`UniformEvaluator`] answers immediately with flat priors.
//!
//! `evaluate` is observably synchronous: when it returns, the reply is
//! complete. The batched playout driver gathers several requests and hands
//! them to `evaluate_batch` in one call so a real backend can run them as a
//! single forward pass.

use thiserror::Error;

/// Errors an evaluator backend can produce.
#[derive(Debug, Error)]
pub enum EvaluatorError {
    #[error("evaluation failed: {0}")]
    EvaluationFailed(String),

    #[error("model error: {0}")]
    ModelError(String),
}

/// One state, encoded and ready for the network.
#[derive(Debug, Clone)]
pub struct EvalRequest {
    /// Channel-encoded state (current plus history), as written by the
    /// transformer.
    pub channels: Vec<f32>,

    /// Per role: length of the dense policy vector the reply must carry.
    pub policy_sizes: Vec<usize>,

    /// Number of reward outputs expected (one per role, or 3 for the
    /// win/loss/draw-mid head layout).
    pub num_rewards: usize,
}

/// The network's answer for one request.
#[derive(Debug, Clone)]
pub struct ModelReply {
    policies: Vec<Vec<f32>>,
    rewards: Vec<f32>,
}

impl ModelReply {
    pub fn new(policies: Vec<Vec<f32>>, rewards: Vec<f32>) -> Self {
        Self { policies, rewards }
    }

    /// Dense policy for `role`, indexed by that role's legal-index.
    #[inline]
    pub fn policy(&self, role: usize) -> &[f32] {
        &self.policies[role]
    }

    /// The `i`-th reward output, in [0, 1].
    #[inline]
    pub fn reward(&self, i: usize) -> f32 {
        self.rewards[i]
    }
}

/// A policy/value network behind a request/reply interface.
pub trait Evaluator {
    /// Evaluate a single state. Observably synchronous: the reply is
    /// complete when this returns.
    fn evaluate(&self, request: &EvalRequest) -> Result<ModelReply, EvaluatorError>;

    /// Evaluate several states at once. The default loops over
    /// [`evaluate`](Self::evaluate); real backends override this to batch
    /// the forward pass.
    fn evaluate_batch(&self, requests: &[EvalRequest]) -> Result<Vec<ModelReply>, EvaluatorError> {
        requests.iter().map(|r| self.evaluate(r)).collect()
    }
}

/// Flat evaluator: uniform policy over every slot, neutral value for every
/// role. Lets the search run as plain visit-count MCTS in tests.
#[derive(Debug, Clone, Default)]
pub struct UniformEvaluator;

impl UniformEvaluator {
    pub fn new() -> Self {
        Self
    }
}

impl Evaluator for UniformEvaluator {
    fn evaluate(&self, request: &EvalRequest) -> Result<ModelReply, EvaluatorError> {
        let policies = request
            .policy_sizes
            .iter()
            .map(|&len| {
                let p = if len > 0 { 1.0 / len as f32 } else { 0.0 };
                vec![p; len]
            })
            .collect();

        let rewards = vec![0.5; request.num_rewards];

        Ok(ModelReply::new(policies, rewards))
    }
}
