//! Berti Engine Tests.
//!
//! Drives the latency-matched delta mining end to end: demand traces plus
//! fill notifications grow a page's candidate counters, page eviction
//! archives the footprint, and a re-triggered page replays it as a burst
//! in the berti direction, with bookmarks under back-pressure.

use pfsim_core::config::BertiConfig;
use pfsim_core::engines::berti::Berti;
use pfsim_core::{AccessType, PrefetchEngine};

use crate::common::MockHost;

const PAGE: u64 = 0x1234;
const IP: u64 = 0x55_0000;

fn addr(page: u64, offset: u64) -> u64 {
    (page << 12) | (offset << 6)
}

fn demand(engine: &mut Berti, host: &mut MockHost, page: u64, offset: u64, hit: bool) {
    let _ = engine.operate(host, addr(page, offset), IP, hit, false, AccessType::Load, 0);
}

fn fill(engine: &mut Berti, host: &mut MockHost, page: u64, offset: u64) {
    let _ = engine.fill(host, addr(page, offset), 0, 0, false, 0, 0);
}

/// Walks page `PAGE` at stride 3, modelling the cache honestly: demand
/// misses are followed by their fill, engine prefetches land shortly after
/// issue, and demands to prefetched lines arrive as hits. The short
/// prefetch latency keeps the mining window tight, so delta +3 collects
/// the most reinforcements. Eviction then archives `{5, 8, 11, 14, 17,
/// 20}` with berti = +3.
fn train_stride_3(engine: &mut Berti, host: &mut MockHost) {
    let offsets = [5u64, 8, 11, 14, 17, 20];
    let mut filled_by_prefetch = Vec::new();
    for (step, &offset) in offsets.iter().enumerate() {
        host.cycle = 200 * (step as u64 + 1);
        let hit = filled_by_prefetch.contains(&offset);
        let before = host.issued.len();
        demand(engine, host, PAGE, offset, hit);

        let prefetched: Vec<u64> = host.issued[before..]
            .iter()
            .map(|&(a, _, _)| (a >> 6) & 63)
            .collect();
        if !hit {
            host.cycle += 10;
            fill(engine, host, PAGE, offset);
        }
        for pf_offset in prefetched {
            host.cycle += 10;
            fill(engine, host, PAGE, pf_offset);
            filled_by_prefetch.push(pf_offset);
        }
    }
    // The page leaves the cache: its footprint moves to the record table.
    host.cycle += 100;
    let _ = engine.fill(host, addr(0x9999, 0), 0, 0, false, addr(PAGE, 0), 0);
}

// ══════════════════════════════════════════════════════════
// 1. Burst replay from the record table
// ══════════════════════════════════════════════════════════

/// Re-triggering a recorded page at its first offset bursts the recorded
/// footprint beyond the trigger, in the berti direction, in order.
#[test]
fn recorded_page_bursts_footprint() {
    let mut engine = Berti::new(BertiConfig::default());
    let mut host = MockHost::new();
    train_stride_3(&mut engine, &mut host);

    host.clear_issued();
    host.cycle = 5000;
    demand(&mut engine, &mut host, PAGE, 5, false);

    let lines: Vec<u64> = host.issued_lines();
    let expected: Vec<u64> = [8u64, 11, 14, 17, 20]
        .iter()
        .map(|&offset| (PAGE << 6) | offset)
        .collect();
    assert_eq!(lines, expected, "burst must replay the footprint in order");
    for addr in host.issued_addrs() {
        assert_eq!(addr >> 12, PAGE, "prefetch left the trigger page");
    }
}

/// Back-pressure interrupts the burst; the bookmark resumes it on the next
/// demand to the page.
#[test]
fn interrupted_burst_resumes_from_bookmark() {
    let mut engine = Berti::new(BertiConfig::default());
    let mut host = MockHost::new();
    train_stride_3(&mut engine, &mut host);

    // Accept only two of the five burst prefetches.
    host.clear_issued();
    host.cycle = 5000;
    host.accept_budget = Some(2);
    demand(&mut engine, &mut host, PAGE, 5, false);
    assert_eq!(
        host.issued_lines(),
        vec![(PAGE << 6) | 8, (PAGE << 6) | 11],
        "burst must stop at the back-pressure point"
    );

    // The next access to a recorded offset resumes where the burst left
    // off.
    host.clear_issued();
    host.accept_budget = None;
    host.cycle = 5100;
    demand(&mut engine, &mut host, PAGE, 8, false);
    assert_eq!(
        host.issued_lines(),
        vec![(PAGE << 6) | 14, (PAGE << 6) | 17, (PAGE << 6) | 20],
        "bookmark must resume the remaining footprint"
    );
}

// ══════════════════════════════════════════════════════════
// 2. Zig-zag burst for berti 0
// ══════════════════════════════════════════════════════════

/// A recorded page whose berti is 0 replays its footprint in both
/// directions around the first offset, staying in the page.
#[test]
fn zero_berti_bursts_zig_zag() {
    let mut engine = Berti::new(BertiConfig::default());
    let mut host = MockHost::new();

    // Touch {5, 3, 7} without fills: no candidate is ever mined, so the
    // archived berti is 0.
    for (step, offset) in [5u64, 3, 7].into_iter().enumerate() {
        host.cycle = 100 * (step as u64 + 1);
        demand(&mut engine, &mut host, PAGE, offset, false);
    }
    let _ = engine.fill(&mut host, addr(0x9999, 0), 0, 0, false, addr(PAGE, 0), 0);

    host.clear_issued();
    host.cycle = 4000;
    demand(&mut engine, &mut host, PAGE, 5, false);

    let mut lines = host.issued_lines();
    lines.sort_unstable();
    assert_eq!(
        lines,
        vec![(PAGE << 6) | 3, (PAGE << 6) | 7],
        "zig-zag must cover both recorded neighbours exactly once"
    );
}

// ══════════════════════════════════════════════════════════
// 3. Single-delta prefetch from the page's own mined berti
// ══════════════════════════════════════════════════════════

/// Once mining reinforces a delta past the confidence bar, mid-page
/// demands chase a single berti-distance line.
#[test]
fn mined_delta_issues_single_prefetch() {
    let mut engine = Berti::new(BertiConfig::default());
    let mut host = MockHost::new();

    // Two fills at stride 3 push the +3 counter to the medium-high bar.
    for (step, offset) in [5u64, 8, 11].into_iter().enumerate() {
        host.cycle = 200 * (step as u64 + 1);
        demand(&mut engine, &mut host, PAGE, offset, false);
        host.cycle += 10;
        fill(&mut engine, &mut host, PAGE, offset);
    }

    // The next demand trusts the page's own berti (+3) and prefetches one
    // line ahead of the access.
    host.clear_issued();
    host.cycle = 800;
    demand(&mut engine, &mut host, PAGE, 14, false);
    assert!(
        host.issued_lines().contains(&((PAGE << 6) | 17)),
        "expected the berti-distance line to be prefetched"
    );
}
