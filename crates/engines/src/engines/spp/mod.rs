//! Signature-path lookahead prefetcher with a perceptron filter.
//!
//! Each access evolves its page's 12-bit delta signature and trains the
//! pattern table with the observed delta. Prefetching then *looks ahead*:
//! starting from the demand line, the engine repeatedly consults the
//! pattern table for candidate deltas, asks the perceptron whether each is
//! worth issuing (L2, LLC-only, or reject), and follows the most confident
//! candidate into the next step. Path confidence decays multiplicatively
//! with depth, scaled by the measured global accuracy, so cold paths
//! terminate quickly.
//!
//! Issued and rejected candidates are remembered in dual quotient filters;
//! later demand and eviction events replay their stored perceptron inputs
//! to train the filter with ground truth (see [`filter`]).

mod filter;
mod pattern;
mod perceptron;

use tracing::info;

use crate::common::{page_addr, page_offset};
use crate::config::defaults::SPP_GLOBAL_COUNTER_MAX;
use crate::config::SppConfig;
use crate::host::{AccessType, CacheHost};
use crate::stats::SppStats;

use self::filter::{FilterRequest, GlobalCounters, PrefetchFilter};
use self::pattern::{
    block_offset, next_signature, same_page, CarryRegister, Candidate, PatternTable, QueueState,
    SignatureTable,
};
use self::perceptron::{PercInputs, Perceptron};

use super::PrefetchEngine;

/// SPP+PPF engine state.
#[derive(Debug)]
pub struct SppPpf {
    cfg: SppConfig,
    st: SignatureTable,
    pt: PatternTable,
    filter: PrefetchFilter,
    ghr: CarryRegister,
    perc: Perceptron,
    counters: GlobalCounters,
    stats: SppStats,
}

impl SppPpf {
    /// Creates an SPP+PPF engine from its configuration.
    pub fn new(cfg: SppConfig) -> Self {
        let st = SignatureTable::new(&cfg);
        let pt = PatternTable::new(&cfg);
        let perc = Perceptron::new(&cfg);
        let ghr = CarryRegister::new(&cfg);
        Self {
            cfg,
            st,
            pt,
            filter: PrefetchFilter::new(),
            ghr,
            perc,
            counters: GlobalCounters::default(),
            stats: SppStats::default(),
        }
    }

    /// Returns the engine's counters.
    pub fn stats(&self) -> &SppStats {
        &self.stats
    }

    /// Current `pf_useful` / `pf_issued` counters (useful never exceeds
    /// issued).
    pub fn accuracy_counters(&self) -> (u64, u64) {
        (self.counters.pf_useful, self.counters.pf_issued)
    }
}

impl PrefetchEngine for SppPpf {
    fn initialize(&mut self) {
        info!(
            st_ways = self.cfg.st_ways,
            pt_sets = self.cfg.pt_sets,
            pt_ways = self.cfg.pt_ways,
            ghr = self.cfg.ghr_entries,
            perc_features = self.cfg.perc_depths.len(),
            "SPP+PPF engine configured"
        );
    }

    fn operate(
        &mut self,
        host: &mut dyn CacheHost,
        addr: u64,
        ip: u64,
        _cache_hit: bool,
        _useful_prefetch: bool,
        _access: AccessType,
        _metadata_in: u32,
    ) -> u32 {
        let page = page_addr(addr);
        let offset = page_offset(addr) as u32;
        let queues = QueueState {
            pq_size: host.pq_size(),
            pq_occupancy: host.pq_occupancy(),
            mshr_size: host.mshr_size(),
            mshr_occupancy: host.mshr_occupancy(),
        };

        self.counters.refresh_accuracy();
        let distinct_pages = self.ghr.track_page(page);

        // Stage 1: read and evolve the page signature. `last_sig` and the
        // delta train the pattern table; `curr_sig` reads candidates.
        let (last_sig, mut curr_sig, delta) = self.st.read_and_update(&self.ghr, page, offset);

        // The demand also updates the filter's accuracy bookkeeping.
        let _ = self.filter.check(
            &mut self.counters,
            &mut self.perc,
            addr,
            FilterRequest::Demand,
            &PercInputs::default(),
            0,
        );

        // Stage 2: train the delta correlation.
        if last_sig != 0 {
            self.pt.update_pattern(last_sig, delta);
        }

        self.ghr.push_ip(ip);

        // Stage 3: lookahead.
        let mut base_addr = addr;
        let mut lookahead_conf = 100u32;
        let mut depth = 0u32;
        let mut prev_delta = 0i32;
        let mut num_pf = 0usize;
        let mut queue: Vec<Candidate> = Vec::new();
        let mut queue_head = 0usize;
        let issue_limit = queues.pq_size.div_ceil(distinct_pages.max(1));

        loop {
            let train_addr = addr;
            let train_delta = prev_delta;

            let lookahead_way = self.pt.read_pattern(
                &mut self.perc,
                &mut self.filter,
                &mut self.counters,
                &self.ghr,
                queues,
                curr_sig,
                last_sig,
                addr,
                base_addr,
                train_addr,
                ip,
                train_delta,
                &mut depth,
                &mut lookahead_conf,
                &mut queue,
                &mut self.stats,
            );

            let mut advanced = false;
            while queue_head < queue.len() {
                let candidate = queue[queue_head];
                let pf_addr = block_offset(base_addr, i64::from(candidate.delta));
                let fill_l2 = candidate.perc_sum >= self.cfg.perc_threshold_hi;

                if same_page(addr, pf_addr) {
                    if num_pf < issue_limit {
                        let inputs = PercInputs {
                            base_addr: train_addr,
                            ip,
                            ip_1: self.ghr.ip_1,
                            ip_2: self.ghr.ip_2,
                            ip_3: self.ghr.ip_3,
                            delta: train_delta + candidate.delta,
                            last_sig,
                            curr_sig,
                            confidence: candidate.confidence,
                            depth: depth.saturating_sub(1),
                        };
                        let request = if fill_l2 {
                            FilterRequest::L2cPrefetch
                        } else {
                            FilterRequest::LlcPrefetch
                        };
                        if self.filter.check(
                            &mut self.counters,
                            &mut self.perc,
                            pf_addr,
                            request,
                            &inputs,
                            candidate.perc_sum,
                        ) {
                            let _ = host.prefetch_line(pf_addr, fill_l2, 5);
                            num_pf += 1;
                            if fill_l2 {
                                self.counters.count_issued(SPP_GLOBAL_COUNTER_MAX);
                                self.stats.l2_issued += 1;
                            } else {
                                self.stats.llc_issued += 1;
                            }
                        } else {
                            self.stats.filter_dropped += 1;
                        }
                    }
                } else {
                    // Page-crossing candidate: park it so the next page's
                    // first access can inherit the signature.
                    self.ghr.update_entry(
                        curr_sig,
                        candidate.confidence,
                        (page_offset(pf_addr)) as u32,
                        candidate.delta,
                    );
                    self.stats.ghr_carries += 1;
                }
                advanced = true;
                queue_head += 1;
            }

            // Follow the most confident way into the next lookahead step.
            if let Some(way) = lookahead_way {
                let next_delta = self.pt.way_delta(curr_sig, way);
                base_addr = block_offset(base_addr, i64::from(next_delta));
                prev_delta += next_delta;
                curr_sig = next_signature(curr_sig, next_delta);
                self.stats.lookahead_steps += 1;
            }

            if !advanced {
                break;
            }
        }

        0
    }

    fn fill(
        &mut self,
        _host: &mut dyn CacheHost,
        _addr: u64,
        _set: usize,
        _way: usize,
        _was_prefetch: bool,
        evicted_addr: u64,
        _metadata_in: u32,
    ) -> u32 {
        let _ = self.filter.check(
            &mut self.counters,
            &mut self.perc,
            evicted_addr,
            FilterRequest::Evict,
            &PercInputs::default(),
            0,
        );
        0
    }
}
