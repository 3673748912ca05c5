//! The perceptron prefetch filter's weight tables.
//!
//! Nine feature hashers each index an independent weight table; a
//! prediction is the sum of the nine selected weights. Training pushes the
//! weights toward or away from the prefetch decision depending on whether
//! the decision later proved right, but only while the sum is not already
//! saturated past the training band.

use crate::common::{sign_magnitude, LOG2_BLOCK_SIZE, LOG2_PAGE_SIZE};
use crate::config::SppConfig;

/// Everything a perceptron index depends on, captured at prediction time.
///
/// Filter entries store these inputs so training can replay the exact
/// indices when the outcome of a prefetch becomes known much later.
#[derive(Clone, Copy, Debug, Default)]
pub(super) struct PercInputs {
    /// Address the lookahead step trained from.
    pub base_addr: u64,
    /// Triggering instruction pointer.
    pub ip: u64,
    /// Previous three instruction pointers.
    pub ip_1: u64,
    /// Second-previous instruction pointer.
    pub ip_2: u64,
    /// Third-previous instruction pointer.
    pub ip_3: u64,
    /// Accumulated delta from the trigger to the candidate.
    pub delta: i32,
    /// Signature before the current access folded in.
    pub last_sig: u32,
    /// Signature after the current access folded in.
    pub curr_sig: u32,
    /// Path confidence of the candidate.
    pub confidence: u32,
    /// Lookahead depth of the candidate.
    pub depth: u32,
}

/// Perceptron weight state.
#[derive(Debug)]
pub(super) struct Perceptron {
    /// One weight table per feature, each with its own depth.
    weights: Vec<Vec<i32>>,
    threshold_hi: i32,
    pos_update_threshold: i32,
    neg_update_threshold: i32,
    counter_max: i32,
}

impl Perceptron {
    pub fn new(cfg: &SppConfig) -> Self {
        let weights = cfg.perc_depths.iter().map(|&d| vec![0; d]).collect();
        Self {
            weights,
            threshold_hi: cfg.perc_threshold_hi,
            pos_update_threshold: cfg.pos_update_threshold,
            neg_update_threshold: cfg.neg_update_threshold,
            counter_max: crate::config::defaults::SPP_PERC_COUNTER_MAX,
        }
    }

    /// Computes the per-feature table indices for one candidate.
    fn indices(&self, inputs: &PercInputs) -> Vec<usize> {
        let cache_line = inputs.base_addr >> LOG2_BLOCK_SIZE;
        let page_addr = inputs.base_addr >> LOG2_PAGE_SIZE;
        let sig_delta = u64::from(sign_magnitude(inputs.delta, 7));

        let pre_hash: [u64; 9] = [
            inputs.base_addr,
            cache_line,
            page_addr,
            u64::from(inputs.confidence) ^ page_addr,
            u64::from(inputs.curr_sig) ^ sig_delta,
            inputs.ip_1 ^ (inputs.ip_2 >> 1) ^ (inputs.ip_3 >> 2),
            inputs.ip ^ u64::from(inputs.depth),
            inputs.ip ^ sig_delta,
            u64::from(inputs.confidence),
        ];

        pre_hash
            .iter()
            .zip(&self.weights)
            .map(|(&raw, table)| (raw % table.len() as u64) as usize)
            .collect()
    }

    /// Sums the selected weights: the candidate's perceptron score.
    pub fn predict(&self, inputs: &PercInputs) -> i32 {
        self.indices(inputs)
            .iter()
            .zip(&self.weights)
            .map(|(&index, table)| table[index])
            .sum()
    }

    /// Trains the weights for one remembered candidate.
    ///
    /// `direction` is `true` when the original decision proved correct. A
    /// wrong decision always pushes the weights away from the side the sum
    /// chose; a correct one reinforces it only while the sum is inside the
    /// `(neg, pos)` training band.
    pub fn update(&mut self, inputs: &PercInputs, direction: bool, perc_sum: i32) {
        let indices = self.indices(inputs);
        let chose_prefetch = perc_sum >= self.threshold_hi;

        let step = if !direction {
            if chose_prefetch {
                -1
            } else {
                1
            }
        } else if perc_sum > self.neg_update_threshold && perc_sum < self.pos_update_threshold {
            if chose_prefetch {
                1
            } else {
                -1
            }
        } else {
            return;
        };

        for (&index, table) in indices.iter().zip(&mut self.weights) {
            let weight = table[index] + step;
            table[index] = weight.clamp(-(self.counter_max + 1), self.counter_max);
        }
    }
}
