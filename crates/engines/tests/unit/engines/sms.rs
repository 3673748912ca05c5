//! SMS Engine Tests.
//!
//! Verifies the generation lifecycle (filter table → accumulation table →
//! pattern history table), footprint replay on a recurring signature, and
//! the drained prefetch buffer's back-pressure behaviour.

use pfsim_core::config::SmsConfig;
use pfsim_core::engines::sms::Sms;
use pfsim_core::{AccessType, PrefetchEngine};

use crate::common::MockHost;

/// Region-relative access: `region` selects a 2 KiB region, `offset` the
/// line within it.
fn access(engine: &mut Sms, host: &mut MockHost, region: u64, offset: u64, pc: u64) {
    let addr = (region << 11) | (offset << 6);
    let _ = engine.operate(host, addr, pc, false, false, AccessType::Load, 0);
}

/// Drains the prefetch buffer until no more requests come out.
fn drain(engine: &mut Sms, host: &mut MockHost) {
    loop {
        let before = host.issued.len();
        engine.cycle(host);
        if host.issued.len() == before {
            break;
        }
        host.cycle += 1;
    }
}

// ══════════════════════════════════════════════════════════
// 1. Generation lifecycle and replay
// ══════════════════════════════════════════════════════════

/// A recorded footprint replays on the next generation with the same
/// signature, excluding the trigger line itself.
#[test]
fn footprint_replays_on_matching_signature() {
    // A single-entry accumulation table forces the generation to end as
    // soon as another region starts accumulating.
    let cfg = SmsConfig {
        at_size: 1,
        ..SmsConfig::default()
    };
    let mut engine = Sms::new(cfg);
    let mut host = MockHost::new();
    let pc = 0x400_1000;

    // Generation on region 7: trigger at offset 4, then 9 and 14.
    access(&mut engine, &mut host, 7, 4, pc);
    access(&mut engine, &mut host, 7, 9, pc);
    access(&mut engine, &mut host, 7, 14, pc);

    // Region 8 graduates to the accumulation table, evicting region 7 and
    // archiving its {4, 9, 14} footprint under (pc, trigger 4).
    access(&mut engine, &mut host, 8, 2, pc);
    access(&mut engine, &mut host, 8, 3, pc);

    // A fresh region triggered by the same pc at offset 4 hits the PHT.
    host.clear_issued();
    access(&mut engine, &mut host, 20, 4, pc);
    drain(&mut engine, &mut host);

    let expected: Vec<u64> = [9u64, 14]
        .iter()
        .map(|&offset| (20 << 11) | (offset << 6))
        .collect();
    assert_eq!(host.issued_addrs(), expected);
}

/// A signature that was never recorded generates nothing.
#[test]
fn unknown_signature_is_silent() {
    let mut engine = Sms::new(SmsConfig::default());
    let mut host = MockHost::new();
    access(&mut engine, &mut host, 3, 5, 0xABCD);
    drain(&mut engine, &mut host);
    assert!(host.issued.is_empty());
}

/// Replay candidates always stay inside the trigger's region.
#[test]
fn replay_stays_in_region() {
    let cfg = SmsConfig {
        at_size: 1,
        ..SmsConfig::default()
    };
    let mut engine = Sms::new(cfg);
    let mut host = MockHost::new();
    let pc = 0x77_0000;

    for offset in [0u64, 7, 21, 31] {
        access(&mut engine, &mut host, 40, offset, pc);
    }
    access(&mut engine, &mut host, 41, 1, pc);
    access(&mut engine, &mut host, 41, 2, pc);

    host.clear_issued();
    access(&mut engine, &mut host, 50, 0, pc);
    drain(&mut engine, &mut host);

    for addr in host.issued_addrs() {
        assert_eq!(addr >> 11, 50, "prefetch left the trigger region");
    }
    assert_eq!(host.issued.len(), 3);
}

// ══════════════════════════════════════════════════════════
// 2. Buffer drain and back-pressure
// ══════════════════════════════════════════════════════════

/// One cycle drains at most `pref_degree` buffered prefetches.
#[test]
fn drain_rate_is_bounded() {
    let cfg = SmsConfig {
        at_size: 1,
        pref_degree: 2,
        ..SmsConfig::default()
    };
    let mut engine = Sms::new(cfg);
    let mut host = MockHost::new();
    let pc = 0x5050;

    // Record a five-line footprint, then retrigger it.
    for offset in [0u64, 3, 6, 9, 12] {
        access(&mut engine, &mut host, 60, offset, pc);
    }
    access(&mut engine, &mut host, 61, 1, pc);
    access(&mut engine, &mut host, 61, 2, pc);
    host.clear_issued();
    access(&mut engine, &mut host, 62, 0, pc);

    engine.cycle(&mut host);
    assert_eq!(host.issued.len(), 2, "degree bounds the per-cycle drain");
    engine.cycle(&mut host);
    assert_eq!(host.issued.len(), 4);
}

/// A rejected prefetch stops the drain and stays buffered for later.
#[test]
fn back_pressure_preserves_buffer() {
    let cfg = SmsConfig {
        at_size: 1,
        ..SmsConfig::default()
    };
    let mut engine = Sms::new(cfg);
    let mut host = MockHost::new();
    let pc = 0x6060;

    for offset in [0u64, 5, 10] {
        access(&mut engine, &mut host, 70, offset, pc);
    }
    access(&mut engine, &mut host, 71, 1, pc);
    access(&mut engine, &mut host, 71, 2, pc);
    host.clear_issued();
    access(&mut engine, &mut host, 72, 0, pc);

    // Host accepts exactly one request, then pushes back.
    host.accept_budget = Some(1);
    engine.cycle(&mut host);
    assert_eq!(host.issued.len(), 1);

    // Lifting the back-pressure releases the rest of the footprint.
    host.accept_budget = None;
    engine.cycle(&mut host);
    assert_eq!(host.issued.len(), 2);
}
