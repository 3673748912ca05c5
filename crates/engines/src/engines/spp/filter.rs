//! Dual quotient filters and the global accuracy register.
//!
//! The main filter remembers every issued L2 prefetch; the reject filter
//! remembers candidates the perceptron turned down. Later demand and
//! eviction events replay the remembered perceptron inputs to train the
//! filter with the true outcome:
//! - demand hit on a filtered prefetch → the prefetch was useful;
//! - demand hit on a rejected candidate → the rejection was wrong;
//! - eviction of an unused prefetch → the prefetch was wasted.

use crate::common::{hash64, LOG2_BLOCK_SIZE};

use super::perceptron::{PercInputs, Perceptron};

/// Event kinds the filter distinguishes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(super) enum FilterRequest {
    /// Issue attempt for an L2-bound prefetch.
    L2cPrefetch,
    /// Issue attempt for an LLC-only prefetch.
    LlcPrefetch,
    /// Demand access observed by the cache.
    Demand,
    /// Cache-line eviction observed by the cache.
    Evict,
    /// Candidate the perceptron rejected (logged for counterfactuals).
    PercReject,
}

/// Main-filter entry: an issued prefetch and its perceptron inputs.
#[derive(Clone, Copy, Debug, Default)]
struct FilterEntry {
    /// Line was prefetched and not yet evicted.
    valid: bool,
    /// Line has seen a demand access.
    useful: bool,
    remainder: u64,
    inputs: PercInputs,
    perc_sum: i32,
}

/// Reject-filter entry: a candidate the perceptron turned down.
#[derive(Clone, Copy, Debug, Default)]
struct RejectEntry {
    valid: bool,
    remainder: u64,
    inputs: PercInputs,
    perc_sum: i32,
}

/// Global accuracy counters shared across the engine.
///
/// `pf_useful / pf_issued` feeds the lookahead confidence product; both
/// counters halve when `pf_issued` passes its cap so the ratio survives.
#[derive(Debug, Default)]
pub(super) struct GlobalCounters {
    /// Issued L2 prefetches (capped).
    pub pf_issued: u64,
    /// Issued prefetches later demanded (capped).
    pub pf_useful: u64,
    /// `100 * pf_useful / pf_issued`, refreshed each access.
    pub accuracy: u64,
}

impl GlobalCounters {
    /// Refreshes the accuracy percentage from the raw counters.
    pub fn refresh_accuracy(&mut self) {
        self.accuracy = if self.pf_issued == 0 {
            0
        } else {
            100 * self.pf_useful / self.pf_issued
        };
    }

    /// Counts an issued L2 prefetch, halving both counters at the cap.
    pub fn count_issued(&mut self, cap: u64) {
        self.pf_issued += 1;
        if self.pf_issued > cap {
            self.pf_issued >>= 1;
            self.pf_useful >>= 1;
        }
    }
}

/// The dual quotient filter.
#[derive(Debug)]
pub(super) struct PrefetchFilter {
    entries: Vec<FilterEntry>,
    reject: Vec<RejectEntry>,
    remainder_bits: u32,
    remainder_bits_reject: u32,
}

impl PrefetchFilter {
    pub fn new() -> Self {
        Self {
            entries: vec![
                FilterEntry::default();
                1 << crate::config::defaults::SPP_QUOTIENT_BITS
            ],
            reject: vec![
                RejectEntry::default();
                1 << crate::config::defaults::SPP_QUOTIENT_BITS_REJECT
            ],
            remainder_bits: crate::config::defaults::SPP_REMAINDER_BITS,
            remainder_bits_reject: crate::config::defaults::SPP_REMAINDER_BITS_REJECT,
        }
    }

    fn slots(&self, check_addr: u64) -> (usize, u64, usize, u64) {
        let cache_line = check_addr >> LOG2_BLOCK_SIZE;
        let hash = hash64(cache_line);
        let quotient = ((hash >> self.remainder_bits) as usize) & (self.entries.len() - 1);
        let remainder = hash % (1 << self.remainder_bits);
        let quotient_rej = ((hash >> self.remainder_bits_reject) as usize) & (self.reject.len() - 1);
        let remainder_rej = hash % (1 << self.remainder_bits_reject);
        (quotient, remainder, quotient_rej, remainder_rej)
    }

    /// Processes one filter event.
    ///
    /// For issue attempts, returns `false` when the line is already present
    /// (the caller must not prefetch it again); the entry's perceptron
    /// inputs are logged otherwise. Demand and eviction events return `true`
    /// and train the perceptron as a side effect.
    pub fn check(
        &mut self,
        counters: &mut GlobalCounters,
        perc: &mut Perceptron,
        check_addr: u64,
        request: FilterRequest,
        inputs: &PercInputs,
        perc_sum: i32,
    ) -> bool {
        let (quotient, remainder, quotient_rej, remainder_rej) = self.slots(check_addr);

        match request {
            FilterRequest::PercReject => {
                let entry = &self.entries[quotient];
                if (entry.valid || entry.useful) && entry.remainder == remainder {
                    // Would have been redundant even if accepted.
                    return false;
                }
                self.reject[quotient_rej] = RejectEntry {
                    valid: true,
                    remainder: remainder_rej,
                    inputs: *inputs,
                    perc_sum,
                };
            }

            FilterRequest::L2cPrefetch => {
                let entry = &mut self.entries[quotient];
                if (entry.valid || entry.useful) && entry.remainder == remainder {
                    return false;
                }
                *entry = FilterEntry {
                    valid: true,
                    useful: false,
                    remainder,
                    inputs: *inputs,
                    perc_sum,
                };
            }

            FilterRequest::LlcPrefetch => {
                let entry = &self.entries[quotient];
                if (entry.valid || entry.useful) && entry.remainder == remainder {
                    return false;
                }
                // Low-confidence LLC prefetches are not remembered: if the
                // candidate later earns an L2 prefetch it should go through
                // and promote the line out of the LLC.
            }

            FilterRequest::Demand => {
                let entry = &mut self.entries[quotient];
                if entry.remainder == remainder && !entry.useful {
                    entry.useful = true;
                    if entry.valid {
                        counters.pf_useful += 1;
                        // The prefetch led to a demand hit.
                        let inputs = entry.inputs;
                        let sum = entry.perc_sum;
                        perc.update(&inputs, true, sum);
                    }
                }
                let prefetched =
                    self.entries[quotient].valid && self.entries[quotient].remainder == remainder;
                if !prefetched {
                    let rejected = &mut self.reject[quotient_rej];
                    if rejected.valid && rejected.remainder == remainder_rej {
                        // Not prefetched, but rejecting it was a mistake.
                        let inputs = rejected.inputs;
                        let sum = rejected.perc_sum;
                        rejected.valid = false;
                        rejected.remainder = 0;
                        perc.update(&inputs, false, sum);
                    }
                }
            }

            FilterRequest::Evict => {
                let entry = &mut self.entries[quotient];
                if entry.valid && !entry.useful {
                    if counters.pf_useful > 0 {
                        counters.pf_useful -= 1;
                    }
                    // Prefetched, never used: the prefetch was wasted.
                    let inputs = entry.inputs;
                    let sum = entry.perc_sum;
                    perc.update(&inputs, false, sum);
                }
                let entry = &mut self.entries[quotient];
                entry.valid = false;
                entry.useful = false;
                entry.remainder = 0;
                let rejected = &mut self.reject[quotient_rej];
                rejected.valid = false;
                rejected.remainder = 0;
            }
        }

        true
    }
}
