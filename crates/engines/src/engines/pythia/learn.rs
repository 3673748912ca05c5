//! The featurewise SARSA learning engine.
//!
//! Owns one tile-coded Q-table per configured feature, pools their values
//! (sum or max), and selects actions ε-greedily. Exploration uses a seeded
//! xorshift generator rather than an OS RNG so a run replays exactly given
//! the same seed and trace.

use crate::config::{PythiaConfig, QPooling};

use super::features::FeatureKnowledge;
use super::state::State;

/// Small deterministic PRNG (xorshift64).
#[derive(Debug)]
struct XorShift64 {
    state: u64,
}

impl XorShift64 {
    fn new(seed: u64) -> Self {
        // A zero seed would lock the generator at zero forever.
        Self {
            state: seed.max(1),
        }
    }

    fn next_u64(&mut self) -> u64 {
        let mut x = self.state;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.state = x;
        x
    }

    /// Uniform draw in `[0, 1)` from the top 24 bits.
    fn next_f32(&mut self) -> f32 {
        (self.next_u64() >> 40) as f32 / (1u64 << 24) as f32
    }

    /// Uniform draw in `0..n`.
    fn next_below(&mut self, n: usize) -> usize {
        (self.next_u64() % n as u64) as usize
    }
}

/// Featurewise learning engine state.
#[derive(Debug)]
pub(super) struct LearningEngine {
    epsilon: f32,
    num_actions: usize,
    features: Vec<FeatureKnowledge>,
    pooling: QPooling,
    enable_dyn_action_fallback: bool,
    rng: XorShift64,
}

impl LearningEngine {
    pub fn new(cfg: &PythiaConfig) -> Self {
        let num_actions = cfg.actions.len();
        let features = cfg
            .features
            .iter()
            .map(|f| FeatureKnowledge::new(f.clone(), cfg.alpha, cfg.gamma, num_actions))
            .collect();
        Self {
            epsilon: cfg.epsilon,
            num_actions,
            features,
            pooling: cfg.pooling,
            enable_dyn_action_fallback: cfg.enable_dyn_action_fallback,
            rng: XorShift64::new(cfg.seed),
        }
    }

    /// Pooled Q-value of `(state, action)` across all feature tables.
    pub fn consult_q(&self, state: &State, action: usize) -> f32 {
        debug_assert!(action < self.num_actions);
        match self.pooling {
            QPooling::Sum => self
                .features
                .iter()
                .map(|f| f.retrieve_q(state, action))
                .sum(),
            QPooling::Max => self
                .features
                .iter()
                .map(|f| f.retrieve_q(state, action))
                .fold(f32::MIN, f32::max),
        }
    }

    /// Argmax over the pooled Q-values.
    ///
    /// In low-bandwidth regimes the fallback applies: the running maximum
    /// starts at zero and action 0 competes like any other, so when every
    /// Q-value has gone negative the argmax collapses to action 0. In
    /// high-bandwidth regimes the maximum is seeded with Q(s, 0) instead,
    /// letting a genuinely better action win outright.
    fn max_action(&self, state: &State) -> usize {
        let fallback = !self.enable_dyn_action_fallback || !state.is_high_bw;

        let (mut max_q, init) = if fallback {
            (0.0, 0)
        } else {
            (self.consult_q(state, 0), 1)
        };
        let mut selected = 0;
        for action in init..self.num_actions {
            let q = self.consult_q(state, action);
            if q > max_q {
                max_q = q;
                selected = action;
            }
        }
        selected
    }

    /// ε-greedy action selection.
    pub fn choose_action(&mut self, state: &State) -> usize {
        if self.rng.next_f32() < self.epsilon {
            self.rng.next_below(self.num_actions)
        } else {
            self.max_action(state)
        }
    }

    /// SARSA update `(S, A, R, S', A')` applied to every feature table.
    pub fn learn(
        &mut self,
        state1: &State,
        action1: usize,
        reward: i32,
        state2: &State,
        action2: usize,
    ) {
        for feature in &mut self.features {
            feature.update_q(state1, action1, reward, state2, action2);
        }
    }
}
