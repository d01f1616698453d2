//! Search configuration.

use serde::Deserialize;

/// How the final move is picked from the searched root.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChoosePolicy {
    /// Most-visited child, with the best-guess convergence override.
    TopVisits,
    /// Sample from a temperature-shaped visit distribution, falling back to
    /// top-visits past the temperature depth schedule.
    Temperature,
}

/// Configuration for a PUCT search session.
///
/// One struct covers both the single-worker and the batched variant; the
/// batched machinery (in-flight accounting, think-time stopping, minimax
/// back-up) activates when `batch_size > 1`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PuctConfig {
    /// Emit progress reports and the post-move tree dump.
    pub verbose: bool,

    /// How many plies of the tree the verbose dump descends.
    pub max_dump_depth: u16,

    /// Exploration constant away from the root.
    pub puct_constant: f32,

    /// Exploration constant at the root.
    pub puct_constant_root: f32,

    /// Before/after split (single-worker variant): start from
    /// `puct_constant_before` and switch to `puct_constant_after` once
    /// enough children are expanded. Disabled when negative.
    pub puct_constant_before: f32,
    pub puct_constant_after: f32,
    pub puct_before_expansions: u16,
    pub puct_before_root_expansions: u16,

    /// Pre-expand every root child up to this many visits before the
    /// playout loop. Disabled when negative.
    pub root_expansions_preset_visits: i32,

    /// Dirichlet alpha for root noise; negative disables noise entirely.
    pub dirichlet_noise_alpha: f32,

    /// Fraction of the root prior replaced by noise.
    pub dirichlet_noise_pct: f32,

    /// First-play-urgency discount applied to unvisited children, away
    /// from the root. Disabled when negative.
    pub fpu_prior_discount: f32,

    /// First-play-urgency discount at the root. Disabled when negative.
    pub fpu_prior_discount_root: f32,

    /// Final move selection policy.
    pub choose: ChoosePolicy,

    /// Base sampling temperature for [`ChoosePolicy::Temperature`].
    pub temperature: f32,

    /// Game depth at which the temperature ramp starts.
    pub depth_temperature_start: u16,

    /// Game depth at which temperature sampling stops (top-visits after).
    pub depth_temperature_stop: u16,

    /// Upper bound on the ramped temperature.
    pub depth_temperature_max: f32,

    /// Per-ply temperature ramp increment.
    pub depth_temperature_increment: f32,

    /// Scale on the uniform draw used by temperature sampling; < 1 biases
    /// towards the head of the sorted distribution.
    pub random_scale: f32,

    /// Second-ranked child overrides the top when it has at least this
    /// visit ratio and a better score. Disabled when non-positive.
    pub top_visits_best_guess_converge_ratio: f32,

    /// Single-worker variant: keep playing out past the evaluation budget
    /// until converged, up to budget times this multiplier.
    pub evaluation_multiplier_to_convergence: f32,

    /// Batched variant think time in seconds; non-positive disables the
    /// think-time stopping rules.
    pub think_time: f32,

    /// Visit-lead thresholds for the relaxed / strict convergence checks.
    pub converge_relaxed: u32,
    pub converge_non_relaxed: u32,

    /// Number of cooperative descents in flight; 1 selects the
    /// single-worker variant.
    pub batch_size: u16,

    /// End-game expansion throttle: below this visit count a node may stop
    /// expanding new children once enough decided lines exist.
    pub expand_threshold_visits: u32,

    /// How many extreme-scored, unfinalised expansions a node tolerates
    /// before selection stops opening new children.
    pub number_of_expansions_end_game: u16,

    /// Minimax back-up mix ratio for young nodes; non-positive disables.
    pub minimax_backup_ratio: f32,

    /// Visit count past which the minimax mix no longer applies.
    pub minimax_threshold_visits: u32,

    /// Accepted for self-play drivers, which squash root policies outside
    /// the core; the core stores but does not apply them.
    pub noise_policy_squash_pct: f32,
    pub noise_policy_squash_prob: f32,

    /// Enables the repeat-state draw rule with this many ancestors checked;
    /// `set_repeat_state_draw` overrides it at runtime.
    pub use_legals_count_draw: i32,

    /// Score assigned to every role when a repeat state is detected.
    pub repeat_states_score: f32,

    /// Attach transpositions through the depth-keyed lookup map.
    pub use_transpositions: bool,
}

impl Default for PuctConfig {
    fn default() -> Self {
        Self {
            verbose: false,
            max_dump_depth: 2,
            puct_constant: 0.85,
            puct_constant_root: 2.5,
            puct_constant_before: -1.0,
            puct_constant_after: -1.0,
            puct_before_expansions: 4,
            puct_before_root_expansions: 4,
            root_expansions_preset_visits: -1,
            dirichlet_noise_alpha: -1.0,
            dirichlet_noise_pct: 0.25,
            fpu_prior_discount: -1.0,
            fpu_prior_discount_root: -1.0,
            choose: ChoosePolicy::TopVisits,
            temperature: 1.0,
            depth_temperature_start: 5,
            depth_temperature_stop: 10,
            depth_temperature_max: 5.0,
            depth_temperature_increment: 0.5,
            random_scale: 0.5,
            top_visits_best_guess_converge_ratio: 0.8,
            evaluation_multiplier_to_convergence: 2.0,
            think_time: -1.0,
            converge_relaxed: 5000,
            converge_non_relaxed: 1000,
            batch_size: 1,
            expand_threshold_visits: 42,
            number_of_expansions_end_game: 3,
            minimax_backup_ratio: -1.0,
            minimax_threshold_visits: 200,
            noise_policy_squash_pct: 0.0,
            noise_policy_squash_prob: 0.0,
            use_legals_count_draw: 0,
            repeat_states_score: 0.5,
            use_transpositions: false,
        }
    }
}

impl PuctConfig {
    /// Competitive-play defaults: no root noise, greedy choice.
    pub fn for_competition() -> Self {
        Self {
            puct_constant_before: 2.5,
            puct_constant_after: 0.9,
            fpu_prior_discount: 0.25,
            ..Self::default()
        }
    }

    /// Self-play defaults: root noise on, temperature sampling, batched
    /// descents with transpositions.
    pub fn for_self_play() -> Self {
        Self {
            dirichlet_noise_alpha: 0.1,
            choose: ChoosePolicy::Temperature,
            batch_size: 32,
            use_transpositions: true,
            minimax_backup_ratio: 0.75,
            ..Self::default()
        }
    }

    /// Small deterministic config for tests.
    pub fn for_testing() -> Self {
        Self::default()
    }

    /// Builder: set the exploration constants.
    pub fn with_puct_constant(mut self, c: f32) -> Self {
        self.puct_constant = c;
        self.puct_constant_root = c;
        self
    }

    /// Builder: set the choice policy.
    pub fn with_choose(mut self, choose: ChoosePolicy) -> Self {
        self.choose = choose;
        self
    }

    /// Builder: set the number of in-flight descents.
    pub fn with_batch_size(mut self, batch_size: u16) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Builder: enable or disable transposition attachment.
    pub fn with_transpositions(mut self, on: bool) -> Self {
        self.use_transpositions = on;
        self
    }

    /// Whether the batched machinery is active.
    #[inline]
    pub fn batched(&self) -> bool {
        self.batch_size > 1
    }
}
