//! Signature table, pattern table, and the cross-page carry register.
//!
//! The signature table compresses each page's delta history into a 12-bit
//! shift-XOR signature; the pattern table correlates a signature with the
//! deltas that followed it, each guarded by a 4-bit counter. Counters never
//! clamp: when one would overflow, the whole set halves, preserving the
//! ratios the confidence computation depends on.

use tracing::trace;

use crate::common::{hash64, sign_magnitude};
use crate::config::defaults::{
    SPP_SIG_BITS, SPP_SIG_DELTA_BITS, SPP_SIG_SHIFT, SPP_ST_TAG_BITS,
};
use crate::config::SppConfig;

use super::filter::{FilterRequest, PrefetchFilter};
use super::perceptron::{PercInputs, Perceptron};

/// Folds a delta into a signature.
pub(super) fn next_signature(sig: u32, delta: i32) -> u32 {
    let sig_delta = sign_magnitude(delta, SPP_SIG_DELTA_BITS);
    ((sig << SPP_SIG_SHIFT) ^ sig_delta) & ((1 << SPP_SIG_BITS) - 1)
}

/// One tracked page in the signature table.
#[derive(Clone, Copy, Debug, Default)]
struct StWay {
    valid: bool,
    /// Partial page tag (low 16 bits of the page number).
    tag: u32,
    last_offset: u32,
    sig: u32,
    /// LRU rank within the table.
    lru: u32,
}

/// Fully-associative signature table (one set).
#[derive(Debug)]
pub(super) struct SignatureTable {
    ways: Vec<StWay>,
}

/// One cross-page carry entry.
#[derive(Clone, Copy, Debug, Default)]
struct GhrEntry {
    valid: bool,
    sig: u32,
    confidence: u32,
    offset: u32,
    delta: i32,
}

/// Carry register for prefetches that crossed their page boundary.
///
/// When a later signature-table miss lands on the offset such a prefetch
/// predicted, the stored signature bootstraps the new page's signature
/// instead of starting cold.
#[derive(Debug)]
pub(super) struct CarryRegister {
    entries: Vec<GhrEntry>,
    /// Recent page numbers for the distinct-page issue throttle.
    pub page_tracker: Vec<u64>,
    /// Previous three instruction pointers (features for the perceptron).
    pub ip_1: u64,
    /// Second-previous instruction pointer.
    pub ip_2: u64,
    /// Third-previous instruction pointer.
    pub ip_3: u64,
    ip_0: u64,
}

impl CarryRegister {
    pub fn new(cfg: &SppConfig) -> Self {
        Self {
            entries: vec![GhrEntry::default(); cfg.ghr_entries],
            page_tracker: vec![0; cfg.pages_tracked],
            ip_1: 0,
            ip_2: 0,
            ip_3: 0,
            ip_0: 0,
        }
    }

    /// Shifts the IP history by one access.
    pub fn push_ip(&mut self, ip: u64) {
        self.ip_3 = self.ip_2;
        self.ip_2 = self.ip_1;
        self.ip_1 = self.ip_0;
        self.ip_0 = ip;
    }

    /// Records the most recent page and counts the distinct pages tracked.
    pub fn track_page(&mut self, page: u64) -> usize {
        for i in (1..self.page_tracker.len()).rev() {
            self.page_tracker[i] = self.page_tracker[i - 1];
        }
        self.page_tracker[0] = page;

        let mut distinct = 0;
        for i in 0..self.page_tracker.len() {
            if !self.page_tracker[..i].contains(&self.page_tracker[i]) {
                distinct += 1;
            }
        }
        distinct
    }

    /// Parks a page-crossing candidate, evicting the lowest-confidence
    /// entry; an entry for the same destination offset is refreshed.
    pub fn update_entry(&mut self, sig: u32, confidence: u32, offset: u32, delta: i32) {
        let mut min_conf = u32::MAX;
        let mut victim = 0;
        for (index, entry) in self.entries.iter_mut().enumerate() {
            if entry.valid && entry.offset == offset {
                entry.sig = sig;
                entry.confidence = confidence;
                entry.delta = delta;
                return;
            }
            if entry.confidence < min_conf {
                min_conf = entry.confidence;
                victim = index;
            }
        }
        self.entries[victim] = GhrEntry {
            valid: true,
            sig,
            confidence,
            offset,
            delta,
        };
    }

    /// Highest-confidence carry entry targeting `page_offset`.
    pub fn check_entry(&self, page_offset: u32) -> Option<(u32, i32)> {
        let mut best: Option<(u32, i32)> = None;
        let mut max_conf = 0;
        for entry in &self.entries {
            if entry.offset == page_offset && entry.confidence > max_conf {
                max_conf = entry.confidence;
                best = Some((entry.sig, entry.delta));
            }
        }
        best
    }
}

impl SignatureTable {
    pub fn new(cfg: &SppConfig) -> Self {
        let ways = (0..cfg.st_ways)
            .map(|i| StWay {
                lru: i as u32,
                ..StWay::default()
            })
            .collect();
        Self { ways }
    }

    /// Reads and evolves the page's signature for one access.
    ///
    /// Returns `(last_sig, curr_sig, delta)`: the signature before this
    /// access (0 suppresses pattern training), the evolved signature that
    /// drives the lookahead, and the observed delta. A table miss with a
    /// matching carry entry bootstraps the signature across the page
    /// boundary.
    pub fn read_and_update(
        &mut self,
        ghr: &CarryRegister,
        page: u64,
        page_offset: u32,
    ) -> (u32, u32, i32) {
        let partial_page = (page & ((1 << SPP_ST_TAG_BITS) - 1)) as u32;
        let mut last_sig = 0;
        let mut curr_sig = 0;
        let mut delta = 0;
        let mut st_hit = false;

        let mut touched = None;
        if let Some(way) = self
            .ways
            .iter()
            .position(|w| w.valid && w.tag == partial_page)
        {
            st_hit = true;
            let entry = &mut self.ways[way];
            last_sig = entry.sig;
            delta = page_offset as i32 - entry.last_offset as i32;
            if delta != 0 {
                entry.sig = next_signature(last_sig, delta);
                curr_sig = entry.sig;
                entry.last_offset = page_offset;
            } else {
                // Same line twice: nothing to train on.
                last_sig = 0;
            }
            touched = Some(way);
        }

        if touched.is_none() {
            // Claim an invalid way, or replace the LRU one.
            let way = self
                .ways
                .iter()
                .position(|w| !w.valid)
                .or_else(|| {
                    self.ways
                        .iter()
                        .position(|w| w.lru == self.ways.len() as u32 - 1)
                });
            debug_assert!(way.is_some(), "signature table lost its LRU permutation");
            if let Some(way) = way {
                let entry = &mut self.ways[way];
                entry.valid = true;
                entry.tag = partial_page;
                entry.sig = 0;
                entry.last_offset = page_offset;
                curr_sig = 0;
                touched = Some(way);
            }
        }

        let Some(way) = touched else {
            return (0, 0, 0);
        };

        if !st_hit {
            // Cross-page carry: seed the fresh signature from the parked
            // prefetch that predicted this offset.
            if let Some((carry_sig, carry_delta)) = ghr.check_entry(page_offset) {
                self.ways[way].sig = next_signature(carry_sig, carry_delta);
                curr_sig = self.ways[way].sig;
                trace!(page, page_offset, curr_sig, "signature bootstrapped across page");
            }
        }

        // Promote to MRU.
        let rank = self.ways[way].lru;
        for other in &mut self.ways {
            if other.lru < rank {
                other.lru += 1;
            }
        }
        self.ways[way].lru = 0;

        (last_sig, curr_sig, delta)
    }
}

/// One pattern-table way.
#[derive(Clone, Copy, Debug, Default)]
struct PtWay {
    delta: i32,
    c_delta: u32,
}

/// One pattern-table set.
#[derive(Clone, Debug, Default)]
struct PtSet {
    ways: Vec<PtWay>,
    c_sig: u32,
}

/// A prefetch candidate produced by one lookahead step.
#[derive(Clone, Copy, Debug)]
pub(super) struct Candidate {
    /// Delta relative to the current lookahead base.
    pub delta: i32,
    /// Path confidence.
    pub confidence: u32,
    /// Perceptron score at selection time.
    pub perc_sum: i32,
}

/// Host occupancy snapshot threaded into the pattern read.
#[derive(Clone, Copy, Debug)]
pub(super) struct QueueState {
    /// Prefetch-queue capacity.
    pub pq_size: usize,
    /// Prefetch-queue occupancy.
    pub pq_occupancy: usize,
    /// MSHR capacity.
    pub mshr_size: usize,
    /// MSHR occupancy.
    pub mshr_occupancy: usize,
}

/// Signature → delta correlation table.
#[derive(Debug)]
pub(super) struct PatternTable {
    sets: Vec<PtSet>,
    counter_max: u32,
    threshold_hi: i32,
    threshold_lo: i32,
}

impl PatternTable {
    pub fn new(cfg: &SppConfig) -> Self {
        let sets = vec![
            PtSet {
                ways: vec![PtWay::default(); cfg.pt_ways],
                c_sig: 0,
            };
            cfg.pt_sets
        ];
        Self {
            sets,
            counter_max: (1 << crate::config::defaults::SPP_COUNTER_BITS) - 1,
            threshold_hi: cfg.perc_threshold_hi,
            threshold_lo: cfg.perc_threshold_lo,
        }
    }

    fn set_of(&self, sig: u32) -> usize {
        (hash64(u64::from(sig)) % self.sets.len() as u64) as usize
    }

    /// Trains the `(signature, delta)` correlation for one observed delta.
    pub fn update_pattern(&mut self, last_sig: u32, curr_delta: i32) {
        let set_index = self.set_of(last_sig);
        let counter_max = self.counter_max;
        let set = &mut self.sets[set_index];

        if let Some(way) = set.ways.iter().position(|w| w.delta == curr_delta) {
            set.ways[way].c_delta += 1;
        } else {
            // Replace the least-reinforced way; its counter restarts at 0
            // so an established delta is not displaced by one stray miss.
            let victim = set
                .ways
                .iter()
                .enumerate()
                .min_by_key(|(_, w)| w.c_delta)
                .map_or(0, |(i, _)| i);
            set.ways[victim] = PtWay {
                delta: curr_delta,
                c_delta: 0,
            };
        }
        set.c_sig += 1;
        if set.c_sig > counter_max {
            for way in &mut set.ways {
                way.c_delta >>= 1;
            }
            set.c_sig >>= 1;
        }
    }

    /// Delta stored in `way` of the set selected by `sig`.
    pub fn way_delta(&self, sig: u32, way: usize) -> i32 {
        self.sets[self.set_of(sig)].ways[way].delta
    }

    /// Reads prefetch candidates for one lookahead step.
    ///
    /// Appends qualifying candidates to `queue`, advances `depth` and
    /// `lookahead_conf`, logs perceptron-rejected same-page candidates into
    /// the reject filter, and returns the way to follow for the next step
    /// (the highest-confidence accepted candidate).
    #[allow(clippy::too_many_arguments)]
    pub fn read_pattern(
        &self,
        perc: &mut Perceptron,
        filter: &mut PrefetchFilter,
        counters: &mut super::filter::GlobalCounters,
        ghr: &CarryRegister,
        queues: QueueState,
        curr_sig: u32,
        last_sig: u32,
        addr: u64,
        base_addr: u64,
        train_addr: u64,
        curr_ip: u64,
        train_delta: i32,
        depth: &mut u32,
        lookahead_conf: &mut u32,
        queue: &mut Vec<Candidate>,
        stats: &mut crate::stats::SppStats,
    ) -> Option<usize> {
        let set = &self.sets[self.set_of(curr_sig)];
        if set.c_sig == 0 {
            return None;
        }

        let mut lookahead_way = None;
        let mut max_conf = 0;
        let mut found_candidate = false;

        for (way_index, way) in set.ways.iter().enumerate() {
            let local_conf = 100 * way.c_delta / set.c_sig;
            let pf_conf = if *depth > 0 {
                (counters.accuracy * u64::from(way.c_delta) / u64::from(set.c_sig)
                    * u64::from(*lookahead_conf)
                    / 100) as u32
            } else {
                local_conf
            };

            let inputs = PercInputs {
                base_addr: train_addr,
                ip: curr_ip,
                ip_1: ghr.ip_1,
                ip_2: ghr.ip_2,
                ip_3: ghr.ip_3,
                delta: train_delta + way.delta,
                last_sig,
                curr_sig,
                confidence: pf_conf,
                depth: *depth,
            };
            let perc_sum = perc.predict(&inputs);
            let do_pf = perc_sum >= self.threshold_lo;
            let fill_l2 = perc_sum >= self.threshold_hi;

            // L2-bound candidates wait for room in both queues.
            if fill_l2
                && (queues.mshr_occupancy >= queues.mshr_size
                    || queues.pq_occupancy >= queues.pq_size)
            {
                continue;
            }

            if pf_conf > 0 && do_pf && queue.len() < 100 {
                queue.push(Candidate {
                    delta: way.delta,
                    confidence: pf_conf,
                    perc_sum,
                });
                if pf_conf > max_conf {
                    lookahead_way = Some(way_index);
                    max_conf = pf_conf;
                }
                found_candidate = true;
            }

            // Remember same-page candidates the perceptron suppressed, so
            // a later demand on them can correct the filter.
            if pf_conf > 0 && queue.len() < queues.mshr_size && perc_sum < self.threshold_hi {
                let pf_addr = block_offset(base_addr, i64::from(way.delta));
                if same_page(addr, pf_addr) {
                    let _ = filter.check(
                        counters,
                        perc,
                        pf_addr,
                        FilterRequest::PercReject,
                        &inputs,
                        perc_sum,
                    );
                    stats.perc_rejected += 1;
                }
            }
        }

        *lookahead_conf = max_conf;
        if found_candidate {
            *depth += 1;
        }
        lookahead_way
    }
}

/// Applies a signed line delta to a block-aligned copy of `base`.
pub(super) fn block_offset(base: u64, delta_lines: i64) -> u64 {
    let base = base & !((1u64 << crate::common::LOG2_BLOCK_SIZE) - 1);
    (base as i64 + (delta_lines << crate::common::LOG2_BLOCK_SIZE)) as u64
}

/// Whether two byte addresses share a 4 KiB page.
pub(super) fn same_page(a: u64, b: u64) -> bool {
    (a >> crate::common::LOG2_PAGE_SIZE) == (b >> crate::common::LOG2_PAGE_SIZE)
}
