//! Per-page latency-driven delta mining prefetcher.
//!
//! The key idea: when a demand hits a line that an earlier prefetch brought
//! in, look back `latency` cycles in the demand history to find which delta
//! *would have* issued that prefetch just in time, and reinforce it. The
//! max-counter delta of a page — its *berti* — then drives prediction.
//!
//! State is spread over five arenas (see [`tables`]):
//! - **Current pages:** footprint, first offset, and candidate deltas of the
//!   pages being mined, under true LRU.
//! - **Previous requests / previous prefetches:** circular time-stamped logs
//!   used for the latency matching.
//! - **Record pages:** archived footprints of completed pages.
//! - **IP table:** hashed-IP pointers into the record table, serving as an
//!   IP-keyed prior for pages never seen before.
//!
//! Prediction follows a confidence cascade from exact page+offset record
//! matches down to IP-only priors. The first access of a page triggers a
//! *burst* that walks the predicted footprint in the berti direction; an
//! interrupted burst leaves a bookmark and resumes on the next access.

mod tables;

use tracing::{info, trace};

use crate::common::{line_addr, LOG2_BLOCK_SIZE, PAGE_BLOCKS};
use crate::config::BertiConfig;
use crate::host::{AccessType, CacheHost};
use crate::stats::BertiStats;

use self::tables::{CurrentPageTable, PrevPrefetchTable, PrevRequestTable, RecordPageTable};

use super::PrefetchEngine;

/// Bits of a line address below the page number.
const PAGE_BLOCKS_BITS: u32 = 6;

/// Outcome of one burst emission attempt.
enum BurstStep {
    /// Prefetch issued; the burst continues.
    Issued,
    /// Offset not eligible (not in footprint, or already demanded).
    Skipped,
    /// Back-pressure or burst cap; the burst stops here.
    Stop,
}

/// Berti engine state.
#[derive(Debug)]
pub struct Berti {
    cfg: BertiConfig,
    current: CurrentPageTable,
    prev_requests: PrevRequestTable,
    prev_prefetches: PrevPrefetchTable,
    records: RecordPageTable,
    /// Hashed IP → record-pages slot; the record table length is null.
    ip_table: Vec<usize>,
    stats: BertiStats,
}

impl Berti {
    /// Creates a Berti engine from its configuration.
    pub fn new(cfg: BertiConfig) -> Self {
        let current = CurrentPageTable::new(cfg.current_pages, cfg.num_candidates, cfg.ctr_max);
        let prev_requests = PrevRequestTable::new(cfg.prev_requests, cfg.current_pages, cfg.time_bits);
        let prev_prefetches =
            PrevPrefetchTable::new(cfg.prev_prefetches, cfg.current_pages, cfg.time_bits);
        let records = RecordPageTable::new(cfg.record_pages);
        let ip_table = vec![cfg.record_pages; cfg.ip_table];
        Self {
            cfg,
            current,
            prev_requests,
            prev_prefetches,
            records,
            ip_table,
            stats: BertiStats::default(),
        }
    }

    /// Returns the engine's counters.
    pub fn stats(&self) -> &BertiStats {
        &self.stats
    }

    fn ip_index(&self, ip: u64) -> usize {
        (ip & (self.ip_table.len() as u64 - 1)) as usize
    }

    fn null_record(&self) -> usize {
        self.records.len()
    }

    /// Harvests candidate deltas from the request log around `target_cycle`
    /// and reinforces them into the current page. A zero delta ends the
    /// harvest.
    fn mine_candidates(&mut self, index: usize, offset: u64, target_cycle: u64) {
        let mut deltas = Vec::with_capacity(self.cfg.candidates_per_access);
        self.prev_requests.candidates(
            index,
            offset,
            target_cycle,
            self.cfg.candidates_per_access,
            &mut deltas,
        );
        for delta in deltas {
            if delta == 0 {
                break;
            }
            debug_assert!(delta.unsigned_abs() < PAGE_BLOCKS as u32);
            self.current.add_candidate(index, delta);
            self.stats.candidates_added += 1;
        }
    }

    /// Archives a still-valid current page into the record table through its
    /// IP pointer.
    fn record_current_page(&mut self, index: usize) {
        let entry = self.current.get(index);
        if entry.u_vector == 0 {
            return;
        }
        let pointer = self.ip_table[entry.ip_index as usize];
        debug_assert!(pointer < self.records.len());
        if pointer >= self.records.len() {
            return;
        }
        let (berti, _) = self.current.best(index);
        let (page, u_vector, first_offset) = {
            let entry = self.current.get(index);
            (entry.page, entry.u_vector, entry.first_offset)
        };
        self.records
            .insert(pointer, page, u_vector, first_offset, berti);
        self.stats.pages_recorded += 1;
    }

    /// Attempts one burst prefetch at page offset `i`.
    fn burst_step(
        &mut self,
        host: &mut dyn CacheHost,
        page: u64,
        index: usize,
        i: i64,
        u_vector: u64,
        bursts: usize,
        cycle: u64,
    ) -> BurstStep {
        if !(0..PAGE_BLOCKS as i64).contains(&i) {
            return BurstStep::Skipped;
        }
        let offset = i as u64;
        if u_vector & (1 << offset) == 0 || self.current.requested(index, offset) {
            return BurstStep::Skipped;
        }
        if host.pq_occupancy() >= host.pq_size() || bursts >= self.cfg.max_burst {
            return BurstStep::Stop;
        }
        let pf_line = (page << PAGE_BLOCKS_BITS) | offset;
        if !host.prefetch_line(pf_line << LOG2_BLOCK_SIZE, true, 0) {
            return BurstStep::Stop;
        }
        self.prev_prefetches.add(index, offset, cycle);
        self.stats.burst_issued += 1;
        BurstStep::Issued
    }

    /// Walks the predicted footprint from `first_burst` in the direction of
    /// `berti`, bookmarking where back-pressure interrupts it.
    fn run_burst(
        &mut self,
        host: &mut dyn CacheHost,
        page: u64,
        index: usize,
        first_burst: i64,
        first_offset: u64,
        berti: i32,
        u_vector: u64,
        cycle: u64,
    ) {
        let mut bursts = 0usize;
        if berti > 0 {
            let mut i = first_burst;
            while i < PAGE_BLOCKS as i64 {
                match self.burst_step(host, page, index, i, u_vector, bursts, cycle) {
                    BurstStep::Issued => bursts += 1,
                    BurstStep::Skipped => {}
                    BurstStep::Stop => {
                        self.current.set_last_burst(index, i as u64);
                        self.stats.burst_bookmarked += 1;
                        return;
                    }
                }
                i += 1;
            }
        } else if berti < 0 {
            let mut i = first_burst;
            while i >= 0 {
                match self.burst_step(host, page, index, i, u_vector, bursts, cycle) {
                    BurstStep::Issued => bursts += 1,
                    BurstStep::Skipped => {}
                    BurstStep::Stop => {
                        self.current.set_last_burst(index, i as u64);
                        self.stats.burst_bookmarked += 1;
                        return;
                    }
                }
                i -= 1;
            }
        } else {
            // Berti 0: zig-zag outward from the first offset in both
            // directions, covering the whole footprint.
            let mut i = first_burst;
            let mut j = 2 * first_offset as i64 - i;
            while i < PAGE_BLOCKS as i64 || j >= 0 {
                match self.burst_step(host, page, index, i, u_vector, bursts, cycle) {
                    BurstStep::Issued => bursts += 1,
                    BurstStep::Skipped => {}
                    BurstStep::Stop => {
                        self.current.set_last_burst(index, i as u64);
                        self.stats.burst_bookmarked += 1;
                        return;
                    }
                }
                match self.burst_step(host, page, index, j, u_vector, bursts, cycle) {
                    BurstStep::Issued => bursts += 1,
                    BurstStep::Skipped => {}
                    // The descending arm carries no bookmark; only the
                    // ascending position is resumable.
                    BurstStep::Stop => return,
                }
                i += 1;
                j = 2 * first_offset as i64 - i;
            }
        }
    }
}

impl PrefetchEngine for Berti {
    fn initialize(&mut self) {
        info!(
            current_pages = self.cfg.current_pages,
            prev_requests = self.cfg.prev_requests,
            prev_prefetches = self.cfg.prev_prefetches,
            record_pages = self.cfg.record_pages,
            ip_table = self.cfg.ip_table,
            "Berti engine configured"
        );
    }

    fn operate(
        &mut self,
        host: &mut dyn CacheHost,
        addr: u64,
        ip: u64,
        cache_hit: bool,
        _useful_prefetch: bool,
        _access: AccessType,
        _metadata_in: u32,
    ) -> u32 {
        let cycle = host.current_cycle();
        let line = line_addr(addr);
        let page = line >> PAGE_BLOCKS_BITS;
        let offset = line & (PAGE_BLOCKS - 1);
        let ip_index = self.ip_index(ip) as u64;

        let index = match self.current.lookup(page) {
            Some(index) => {
                if self.current.requested(index, offset) {
                    // Offset already demanded this generation; nothing new.
                    return 0;
                }
                let first_ip = self.current.record_demand(index, offset);
                debug_assert!(self.ip_table[first_ip as usize] != self.null_record());

                if cache_hit {
                    // The hit may be the fruit of an earlier prefetch: use
                    // its measured latency to mine on-time deltas.
                    let pref_latency = self.prev_prefetches.completed_latency(index, offset);
                    if pref_latency != 0 {
                        self.mine_candidates(index, offset, cycle.saturating_sub(pref_latency));
                        self.prev_prefetches.reset_entry(index, offset);
                    }
                }

                if first_ip != ip_index {
                    // Group IPs that touch the same page behind one pointer.
                    self.ip_table[ip_index as usize] = self.ip_table[first_ip as usize];
                }
                index
            }
            None => {
                let victim = self.current.lru_victim();
                self.prev_requests.reset_slot(victim);
                self.prev_prefetches.reset_slot(victim);
                self.record_current_page(victim);
                self.current.install(victim, page, ip_index, offset);
                self.stats.pages_allocated += 1;
                trace!(page, offset, "current page allocated");

                let index_record = self.records.lookup(page, offset);
                let pointer = self.ip_table[ip_index as usize];
                if pointer == self.null_record() {
                    self.ip_table[ip_index as usize] =
                        index_record.unwrap_or_else(|| self.records.lru_victim());
                } else if index_record != Some(pointer) {
                    // The IP points at a different page's record; replicate
                    // it so the summary of this page does not clobber it.
                    let new_pointer = self.records.lru_victim();
                    self.records.copy(pointer, new_pointer);
                    self.ip_table[ip_index as usize] = new_pointer;
                }
                victim
            }
        };

        self.prev_requests.add(index, offset, cycle);

        // Prediction: a confidence cascade over record matches and the
        // page's own mined berti.
        let first_offset = self.current.get(index).first_offset;
        let current_u = self.current.get(index).u_vector;
        let ip_pointer = self.ip_table[ip_index as usize];
        let pgo_pointer = self.records.lookup(page, first_offset);
        let pg_pointer = self.records.lookup_page(page);
        let (current_berti, berti_confidence) = self.current.best(index);

        let mut u_vector = 0u64;
        let mut berti = 0i32;
        let mut recorded = false;
        let mut match_confidence = false;

        let ip_record = (ip_pointer < self.records.len()).then(|| self.records.get(ip_pointer));

        if let Some(record) = pgo_pointer.map(|p| self.records.get(p)) {
            if record.u_vector | current_u == record.u_vector {
                u_vector = record.u_vector;
                berti = record.berti;
                match_confidence = true;
                recorded = true;
            }
        }
        if !recorded {
            if let Some(record) = ip_record {
                if record.first_offset == first_offset
                    && record.u_vector | current_u == record.u_vector
                {
                    u_vector = record.u_vector;
                    berti = record.berti;
                    match_confidence = true;
                    recorded = true;
                }
            }
        }
        if !recorded {
            if current_berti != 0 && berti_confidence >= self.cfg.med_high_confidence {
                u_vector = current_u;
                berti = current_berti;
            } else if let Some(record) = pg_pointer.map(|p| self.records.get(p)) {
                u_vector = record.u_vector;
                berti = record.berti;
                recorded = true;
            } else if let Some(record) = ip_record {
                if record.u_vector != 0 {
                    u_vector = record.u_vector;
                    berti = record.berti;
                    recorded = true;
                }
            }
        }

        // Burst on the first access of a page, or to resume a bookmark.
        if first_offset == offset || self.current.get(index).last_burst != 0 {
            let last_burst = self.current.get(index).last_burst;
            let first_burst = if last_burst != 0 {
                self.current.set_last_burst(index, 0);
                last_burst as i64
            } else if berti >= 0 {
                offset as i64 + 1
            } else {
                offset as i64 - 1
            };
            if recorded && match_confidence {
                self.run_burst(
                    host,
                    page,
                    index,
                    first_burst,
                    first_offset,
                    berti,
                    u_vector,
                    cycle,
                );
            }
        }

        // Always chase the single berti-distance line as well, unless a
        // burst already covered it.
        if berti != 0 {
            let pf_offset = offset as i64 + i64::from(berti);
            if (0..PAGE_BLOCKS as i64).contains(&pf_offset) {
                let pf_offset = pf_offset as u64;
                if !self.current.requested(index, pf_offset)
                    && !self.prev_prefetches.contains(index, pf_offset)
                    && (!match_confidence || u_vector & (1 << pf_offset) != 0)
                {
                    let pf_line = (page << PAGE_BLOCKS_BITS) | pf_offset;
                    if host.prefetch_line(pf_line << LOG2_BLOCK_SIZE, true, 0) {
                        self.prev_prefetches.add(index, pf_offset, cycle);
                        self.stats.delta_issued += 1;
                    }
                }
            }
        }

        0
    }

    fn fill(
        &mut self,
        host: &mut dyn CacheHost,
        addr: u64,
        _set: usize,
        _way: usize,
        _was_prefetch: bool,
        evicted_addr: u64,
        _metadata_in: u32,
    ) -> u32 {
        let cycle = host.current_cycle();
        let line = line_addr(addr);
        let page = line >> PAGE_BLOCKS_BITS;
        let offset = line & (PAGE_BLOCKS - 1);

        if let Some(index) = self.current.lookup(page) {
            let mut pref_latency = self.prev_prefetches.complete_and_latency(index, offset, cycle);
            let demand_latency = self.prev_requests.latency(index, offset, cycle);

            // A prefetch hit marks when the miss actually started; without
            // one, the demand's own latency is the best estimate.
            if pref_latency == 0 {
                pref_latency = demand_latency;
            }
            if demand_latency != 0 {
                self.mine_candidates(
                    index,
                    offset,
                    cycle.saturating_sub(pref_latency + demand_latency),
                );
            }
        }

        let evicted_page = evicted_addr >> crate::common::LOG2_PAGE_SIZE;
        if let Some(victim) = self.current.lookup(evicted_page) {
            self.record_current_page(victim);
            self.current.remove(victim);
        }

        0
    }
}
