//! SPP+PPF Engine Tests.
//!
//! Trains the signature path on striding traces and verifies candidate
//! emission, lookahead depth, page clipping, and the global accuracy
//! counters' invariant.

use pfsim_core::config::SppConfig;
use pfsim_core::engines::spp::SppPpf;
use pfsim_core::{AccessType, PrefetchEngine};

use crate::common::MockHost;

fn access(engine: &mut SppPpf, host: &mut MockHost, page: u64, offset: u64, ip: u64) {
    host.cycle += 10;
    let addr = (page << 12) | (offset << 6);
    let _ = engine.operate(host, addr, ip, false, false, AccessType::Load, 0);
}

/// Walks `pages` consecutive pages with a stride-1 pattern of `len` lines
/// each, training the signature→delta correlation along the way.
fn warm_stride_1(engine: &mut SppPpf, host: &mut MockHost, pages: u64, len: u64) {
    for page in 0x40..(0x40 + pages) {
        for offset in 0..len {
            access(engine, host, page, offset, 0x1111);
        }
    }
}

// ══════════════════════════════════════════════════════════
// 1. Candidate emission after training
// ══════════════════════════════════════════════════════════

/// A trained stride-1 signature path yields prefetch candidates on a fresh
/// page as soon as the path re-establishes itself.
#[test]
fn trained_path_emits_candidates() {
    let mut engine = SppPpf::new(SppConfig::default());
    let mut host = MockHost::new();
    warm_stride_1(&mut engine, &mut host, 8, 12);

    host.clear_issued();
    for offset in 0..3 {
        access(&mut engine, &mut host, 0x900, offset, 0x1111);
    }
    assert!(
        !host.issued.is_empty(),
        "a re-established stride-1 path must prefetch"
    );
    // Every candidate stays inside the trigger page.
    for addr in host.issued_addrs() {
        assert_eq!(addr >> 12, 0x900, "prefetch left the trigger page");
    }
}

/// With a warm path and non-zero global accuracy, the lookahead walks more
/// than one hop: candidates appear beyond the next line.
#[test]
fn lookahead_walks_multiple_hops() {
    let mut engine = SppPpf::new(SppConfig::default());
    let mut host = MockHost::new();
    // Long runs build both the signature chain and the accuracy counters
    // (prefetched lines are demanded a few accesses later).
    warm_stride_1(&mut engine, &mut host, 16, 24);

    host.clear_issued();
    for offset in 0..4 {
        access(&mut engine, &mut host, 0x901, offset, 0x1111);
    }
    let lines: Vec<u64> = host.issued_lines();
    let deepest = lines
        .iter()
        .map(|&line| line & 63)
        .max()
        .expect("candidates expected after warmup");
    assert!(
        deepest >= 5,
        "lookahead should reach past the next line, got offset {deepest}"
    );
}

// ══════════════════════════════════════════════════════════
// 2. Cold behaviour
// ══════════════════════════════════════════════════════════

/// With no trained patterns, the engine stays silent.
#[test]
fn cold_engine_is_silent() {
    let mut engine = SppPpf::new(SppConfig::default());
    let mut host = MockHost::new();
    access(&mut engine, &mut host, 0x10, 0, 0x2222);
    access(&mut engine, &mut host, 0x11, 17, 0x2222);
    assert!(host.issued.is_empty());
}

// ══════════════════════════════════════════════════════════
// 3. Accuracy counters
// ══════════════════════════════════════════════════════════

/// `pf_useful` never exceeds `pf_issued`, across warmup, demand reuse, and
/// evictions.
#[test]
fn useful_never_exceeds_issued() {
    let mut engine = SppPpf::new(SppConfig::default());
    let mut host = MockHost::new();
    warm_stride_1(&mut engine, &mut host, 12, 16);
    let (useful, issued) = engine.accuracy_counters();
    assert!(useful <= issued, "useful {useful} > issued {issued}");

    // Evictions decrement the useful side; the invariant must survive.
    for line in 0x40u64 << 6..(0x40 << 6) + 64 {
        let _ = engine.fill(&mut host, 0, 0, 0, false, line << 6, 0);
        let (useful, issued) = engine.accuracy_counters();
        assert!(useful <= issued, "useful {useful} > issued {issued}");
    }
}

// ══════════════════════════════════════════════════════════
// 4. Filter deduplication
// ══════════════════════════════════════════════════════════

/// Re-running the identical trigger immediately does not re-issue the same
/// L2 prefetch address twice.
#[test]
fn filter_suppresses_duplicate_issue() {
    let mut engine = SppPpf::new(SppConfig::default());
    let mut host = MockHost::new();
    warm_stride_1(&mut engine, &mut host, 8, 12);

    host.clear_issued();
    for offset in 0..6 {
        access(&mut engine, &mut host, 0x910, offset, 0x1111);
    }
    let mut l2_addrs: Vec<u64> = host
        .issued
        .iter()
        .filter(|&&(_, fill_l2, _)| fill_l2)
        .map(|&(addr, _, _)| addr)
        .collect();
    let total = l2_addrs.len();
    l2_addrs.sort_unstable();
    l2_addrs.dedup();
    assert_eq!(l2_addrs.len(), total, "an L2 prefetch address repeated");
}
