//! A scriptable cache-host mock.
//!
//! Records every prefetch the engine under test emits and lets a test dial
//! in queue geometry, DRAM bandwidth, and back-pressure (reject everything,
//! or accept only the first N requests).

use pfsim_core::CacheHost;

/// Mock host with a prefetch log and programmable back-pressure.
pub struct MockHost {
    /// Current simulated cycle; tests advance it manually.
    pub cycle: u64,
    /// Prefetch-queue capacity reported to the engine.
    pub pq_size: usize,
    /// Prefetch-queue occupancy reported to the engine.
    pub pq_occupancy: usize,
    /// MSHR capacity reported to the engine.
    pub mshr_size: usize,
    /// MSHR occupancy reported to the engine.
    pub mshr_occupancy: usize,
    /// Quantised DRAM bandwidth reported to the engine.
    pub dram_bw: u8,
    /// Accept at most this many more prefetches; `None` means unlimited.
    pub accept_budget: Option<usize>,
    /// Every accepted prefetch: `(addr, fill_l2, metadata)`.
    pub issued: Vec<(u64, bool, u32)>,
}

impl MockHost {
    /// A host with roomy queues, zero bandwidth, and no back-pressure.
    pub fn new() -> Self {
        Self {
            cycle: 0,
            pq_size: 16,
            pq_occupancy: 0,
            mshr_size: 16,
            mshr_occupancy: 0,
            dram_bw: 0,
            accept_budget: None,
            issued: Vec::new(),
        }
    }

    /// Issued prefetch addresses, in emission order.
    pub fn issued_addrs(&self) -> Vec<u64> {
        self.issued.iter().map(|&(addr, _, _)| addr).collect()
    }

    /// Issued line addresses (byte addresses with block bits dropped).
    pub fn issued_lines(&self) -> Vec<u64> {
        self.issued.iter().map(|&(addr, _, _)| addr >> 6).collect()
    }

    /// Forgets everything issued so far.
    pub fn clear_issued(&mut self) {
        self.issued.clear();
    }
}

impl Default for MockHost {
    fn default() -> Self {
        Self::new()
    }
}

impl CacheHost for MockHost {
    fn current_cycle(&self) -> u64 {
        self.cycle
    }

    fn pq_size(&self) -> usize {
        self.pq_size
    }

    fn pq_occupancy(&self) -> usize {
        self.pq_occupancy
    }

    fn mshr_size(&self) -> usize {
        self.mshr_size
    }

    fn mshr_occupancy(&self) -> usize {
        self.mshr_occupancy
    }

    fn dram_bw(&self) -> u8 {
        self.dram_bw
    }

    fn prefetch_line(&mut self, addr: u64, fill_l2: bool, metadata: u32) -> bool {
        if let Some(budget) = self.accept_budget {
            if budget == 0 {
                return false;
            }
            self.accept_budget = Some(budget - 1);
        }
        self.issued.push((addr, fill_l2, metadata));
        true
    }
}
