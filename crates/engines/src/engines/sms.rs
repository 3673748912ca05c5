//! Spatial memory streaming prefetcher.
//!
//! Learns which line offsets of a 2 KiB region are touched between the first
//! access to the region (the *trigger*) and the region's eviction — one
//! *generation* — then replays the recorded footprint the next time the same
//! `(pc, trigger offset)` signature starts a generation.
//!
//! Three tables implement the generation lifecycle:
//! - **Filter table (FT):** regions seen exactly once, FIFO.
//! - **Accumulation table (AT):** regions with two or more accesses; the
//!   footprint bitmap accumulates here. Oldest-age eviction ends the
//!   generation.
//! - **Pattern history table (PHT):** set-associative signature → footprint
//!   store consulted on each new generation.
//!
//! Replayed candidates are queued into a bounded prefetch buffer and drained
//! a few per cycle so a dense pattern cannot flood the host queue.

use std::collections::VecDeque;

use tracing::info;

use crate::common::{Bitmap64, LOG2_BLOCK_SIZE};
use crate::config::SmsConfig;
use crate::host::{AccessType, CacheHost};
use crate::stats::SmsStats;

use super::PrefetchEngine;

/// Filter table entry: a region with a single access so far.
#[derive(Clone, Copy)]
struct FtEntry {
    region: u64,
    pc: u64,
    trigger_offset: u32,
}

/// Accumulation table entry: a region actively collecting its footprint.
#[derive(Clone, Copy)]
struct AtEntry {
    region: u64,
    pc: u64,
    trigger_offset: u32,
    pattern: Bitmap64,
    age: u32,
}

/// Pattern history entry: a finished generation's footprint.
#[derive(Clone, Copy)]
struct PhtEntry {
    signature: u64,
    pattern: Bitmap64,
    age: u32,
}

/// SMS engine state.
#[derive(Debug)]
pub struct Sms {
    cfg: SmsConfig,
    filter_table: VecDeque<FtEntry>,
    acc_table: VecDeque<AtEntry>,
    pht: Vec<VecDeque<PhtEntry>>,
    pref_buffer: VecDeque<u64>,
    stats: SmsStats,
}

impl std::fmt::Debug for FtEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "FtEntry({:#x}@{})", self.region, self.trigger_offset)
    }
}

impl std::fmt::Debug for AtEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "AtEntry({:#x}, {})", self.region, self.pattern)
    }
}

impl std::fmt::Debug for PhtEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PhtEntry({:#x}, {})", self.signature, self.pattern)
    }
}

impl Sms {
    /// Creates an SMS engine from its configuration.
    pub fn new(cfg: SmsConfig) -> Self {
        let pht = vec![VecDeque::new(); cfg.pht_sets()];
        Self {
            cfg,
            filter_table: VecDeque::new(),
            acc_table: VecDeque::new(),
            pht,
            pref_buffer: VecDeque::new(),
            stats: SmsStats::default(),
        }
    }

    /// Returns the engine's counters.
    pub fn stats(&self) -> &SmsStats {
        &self.stats
    }

    /// Bits of a region address below the region number.
    fn region_offset_bits(&self) -> u32 {
        self.cfg.region_size_log - LOG2_BLOCK_SIZE
    }

    /// Generation signature: trigger PC concatenated with the trigger offset.
    fn signature(&self, pc: u64, offset: u32) -> u64 {
        (pc << self.region_offset_bits()) + u64::from(offset)
    }

    fn insert_filter_table(&mut self, pc: u64, region: u64, offset: u32) {
        self.stats.ft.insert += 1;
        if self.filter_table.len() >= self.cfg.ft_size {
            self.stats.ft.evict += 1;
            let _ = self.filter_table.pop_front();
        }
        self.filter_table.push_back(FtEntry {
            region,
            pc,
            trigger_offset: offset,
        });
    }

    /// Promotes a filter-table entry into the accumulation table with the
    /// trigger bit and the second access's bit already set.
    fn insert_acc_table(&mut self, entry: FtEntry, offset: u32) {
        self.stats.at.insert += 1;
        if self.acc_table.len() >= self.cfg.at_size {
            let victim = self.acc_table_victim();
            self.evict_acc_table(victim);
        }
        let mut pattern = Bitmap64::new();
        pattern.set(entry.trigger_offset);
        pattern.set(offset);
        for existing in &mut self.acc_table {
            existing.age += 1;
        }
        self.acc_table.push_back(AtEntry {
            region: entry.region,
            pc: entry.pc,
            trigger_offset: entry.trigger_offset,
            pattern,
            age: 0,
        });
    }

    /// Index of the oldest accumulation-table entry.
    fn acc_table_victim(&self) -> usize {
        let mut victim = 0;
        let mut max_age = 0;
        for (index, entry) in self.acc_table.iter().enumerate() {
            if entry.age >= max_age {
                max_age = entry.age;
                victim = index;
            }
        }
        victim
    }

    /// Ends a generation: archives the footprint into the PHT.
    fn evict_acc_table(&mut self, victim: usize) {
        self.stats.at.evict += 1;
        if let Some(entry) = self.acc_table.remove(victim) {
            self.insert_pht(&entry);
        }
    }

    fn refresh_acc_age(&mut self, current: usize) {
        for entry in &mut self.acc_table {
            entry.age += 1;
        }
        self.acc_table[current].age = 0;
    }

    fn insert_pht(&mut self, entry: &AtEntry) {
        self.stats.pht.lookup += 1;
        let signature = self.signature(entry.pc, entry.trigger_offset);
        let set = (signature % self.pht.len() as u64) as usize;

        if let Some(way) = self.pht[set].iter().position(|p| p.signature == signature) {
            self.stats.pht.hit += 1;
            self.pht[set][way].pattern = entry.pattern;
            self.refresh_pht_age(set, way);
            return;
        }

        if self.pht[set].len() >= self.cfg.pht_assoc {
            self.stats.pht.evict += 1;
            let victim = Self::pht_victim(&self.pht[set]);
            let _ = self.pht[set].remove(victim);
        }
        self.stats.pht.insert += 1;
        for existing in &mut self.pht[set] {
            existing.age += 1;
        }
        self.pht[set].push_back(PhtEntry {
            signature,
            pattern: entry.pattern,
            age: 0,
        });
    }

    /// Index of the oldest entry in a PHT set.
    fn pht_victim(set: &VecDeque<PhtEntry>) -> usize {
        let mut victim = 0;
        let mut max_age = 0;
        for (index, entry) in set.iter().enumerate() {
            if entry.age >= max_age {
                max_age = entry.age;
                victim = index;
            }
        }
        victim
    }

    fn refresh_pht_age(&mut self, set: usize, current: usize) {
        for entry in &mut self.pht[set] {
            entry.age += 1;
        }
        self.pht[set][current].age = 0;
    }

    /// Looks up the PHT for a fresh trigger and collects the pattern's
    /// candidate addresses, excluding the trigger line itself.
    fn generate_prefetch(&mut self, pc: u64, region: u64, offset: u32, out: &mut Vec<u64>) {
        let signature = self.signature(pc, offset);
        let set = (signature % self.pht.len() as u64) as usize;
        self.stats.pht.lookup += 1;
        let Some(way) = self.pht[set].iter().position(|p| p.signature == signature) else {
            return;
        };
        self.stats.pht.hit += 1;

        let pattern = self.pht[set][way].pattern;
        for index in 0..self.cfg.region_blocks() {
            if pattern.test(index) && index != offset {
                let addr = (region << self.cfg.region_size_log)
                    + (u64::from(index) << LOG2_BLOCK_SIZE);
                out.push(addr);
            }
        }
        self.refresh_pht_age(set, way);
        self.stats.generated += out.len() as u64;
    }

    /// Queues candidates into the bounded prefetch buffer; overflow spills.
    fn buffer_prefetch(&mut self, candidates: &[u64]) {
        for (count, addr) in candidates.iter().enumerate() {
            if self.pref_buffer.len() >= self.cfg.pref_buffer_size {
                self.stats.spilled += (candidates.len() - count) as u64;
                break;
            }
            self.pref_buffer.push_back(*addr);
            self.stats.buffered += 1;
        }
    }
}

impl PrefetchEngine for Sms {
    fn initialize(&mut self) {
        info!(
            ft = self.cfg.ft_size,
            at = self.cfg.at_size,
            pht_sets = self.pht.len(),
            pht_assoc = self.cfg.pht_assoc,
            region_bytes = 1u64 << self.cfg.region_size_log,
            "SMS engine configured"
        );
    }

    fn operate(
        &mut self,
        _host: &mut dyn CacheHost,
        addr: u64,
        ip: u64,
        _cache_hit: bool,
        _useful_prefetch: bool,
        _access: AccessType,
        _metadata_in: u32,
    ) -> u32 {
        let region = addr >> self.cfg.region_size_log;
        let offset = ((addr >> LOG2_BLOCK_SIZE) & u64::from(self.cfg.region_blocks() - 1)) as u32;

        self.stats.at.lookup += 1;
        if let Some(index) = self.acc_table.iter().position(|e| e.region == region) {
            // Active generation: accumulate the footprint.
            self.stats.at.hit += 1;
            self.acc_table[index].pattern.set(offset);
            self.refresh_acc_age(index);
            return 0;
        }

        self.stats.ft.lookup += 1;
        if let Some(index) = self.filter_table.iter().position(|e| e.region == region) {
            // Second distinct access: the region graduates to the AT.
            self.stats.ft.hit += 1;
            if let Some(entry) = self.filter_table.remove(index) {
                self.insert_acc_table(entry, offset);
            }
            return 0;
        }

        // New generation: remember the trigger and replay any recorded
        // footprint for this signature.
        self.insert_filter_table(ip, region, offset);
        let mut candidates = Vec::new();
        self.generate_prefetch(ip, region, offset, &mut candidates);
        self.buffer_prefetch(&candidates);
        0
    }

    fn fill(
        &mut self,
        _host: &mut dyn CacheHost,
        _addr: u64,
        _set: usize,
        _way: usize,
        _was_prefetch: bool,
        _evicted_addr: u64,
        _metadata_in: u32,
    ) -> u32 {
        0
    }

    fn cycle(&mut self, host: &mut dyn CacheHost) {
        let mut count = 0;
        while count < self.cfg.pref_degree {
            let Some(&addr) = self.pref_buffer.front() else {
                break;
            };
            if !host.prefetch_line(addr, true, 0) {
                break;
            }
            let _ = self.pref_buffer.pop_front();
            self.stats.issued += 1;
            count += 1;
        }
    }
}
