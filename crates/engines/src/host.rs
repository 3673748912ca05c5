//! Host-facing contract between the cache simulator and the engines.
//!
//! The host cache drives each engine with three events (`operate`, `fill`,
//! `cycle`) and exposes a small read-only query surface plus one output:
//! `prefetch_line`. Engines never block, never propagate errors, and never
//! call back outside these methods.

/// Demand access categories the host reports with each `operate` event.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AccessType {
    /// Ordinary demand load.
    Load,
    /// Read-for-ownership (store miss).
    Rfo,
    /// A prefetch generated by a cache closer to the core.
    Prefetch,
    /// Dirty-line writeback traffic.
    Writeback,
    /// Page-walk translation access.
    Translation,
}

/// Read-only queries and the prefetch emission path the host provides.
///
/// Implementations are expected to be cheap; engines may call the occupancy
/// queries several times per `operate`.
pub trait CacheHost {
    /// Current simulated cycle. Strictly non-decreasing across events.
    fn current_cycle(&self) -> u64;

    /// Capacity of the prefetch queue feeding this cache.
    fn pq_size(&self) -> usize;

    /// Number of prefetch-queue slots currently occupied.
    fn pq_occupancy(&self) -> usize;

    /// Capacity of the miss-status handling register file.
    fn mshr_size(&self) -> usize;

    /// Number of MSHR slots currently occupied.
    fn mshr_occupancy(&self) -> usize;

    /// Quantised normalised DRAM utilisation in `0..=15`.
    ///
    /// A value of `n` means the current usage lies between `n/16` and
    /// `(n+1)/16` of peak bandwidth.
    fn dram_bw(&self) -> u8;

    /// Requests a prefetch of the line containing `addr`.
    ///
    /// `fill_l2` selects the higher fill level; `metadata` is an opaque
    /// engine-specific payload carried with the request. Returns `false`
    /// when the request was dropped (queue full) — engines treat that as a
    /// stop signal for the current event and do not roll back table state.
    fn prefetch_line(&mut self, addr: u64, fill_l2: bool, metadata: u32) -> bool;
}
