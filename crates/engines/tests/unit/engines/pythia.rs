//! Pythia Engine Tests.
//!
//! Exercises the reinforcement loop end to end: prediction and tracking,
//! reward attribution (timely, out-of-bounds, no-prefetch), the one-slot
//! SARSA buffer, the dynamic degree, and determinism under a fixed seed.

use pfsim_core::config::{PythiaConfig, PythiaFeature, PythiaFeatureConfig};
use pfsim_core::engines::pythia::{Pythia, State};
use pfsim_core::{AccessType, PrefetchEngine};

use crate::common::MockHost;

fn addr(page: u64, offset: u64) -> u64 {
    (page << 12) | (offset << 6)
}

fn access(engine: &mut Pythia, host: &mut MockHost, page: u64, offset: u64, pc: u64) {
    host.cycle += 10;
    let _ = engine.operate(host, addr(page, offset), pc, false, false, AccessType::Load, 0);
}

/// A greedy single-feature configuration whose Q-values depend only on the
/// PC, with a one-entry tracker so every prediction trains promptly.
fn pc_only_config(alpha: f32, gamma: f32) -> PythiaConfig {
    PythiaConfig {
        alpha,
        gamma,
        epsilon: 0.0,
        pt_size: 1,
        features: vec![PythiaFeatureConfig {
            feature: PythiaFeature::Pc,
            num_tilings: 1,
            num_tiles: 256,
            hash: pfsim_core::common::HashKind::Knuth,
            enable_tiling_offset: false,
        }],
        ..PythiaConfig::default()
    }
}

fn pc_state(pc: u64) -> State {
    State {
        pc,
        ..State::default()
    }
}

// ══════════════════════════════════════════════════════════
// 1. Prediction and tracking
// ══════════════════════════════════════════════════════════

/// A greedy engine with optimistic Q-values prefetches the first action's
/// delta (+1) on a fresh page.
#[test]
fn greedy_engine_prefetches_plus_one() {
    let mut engine = Pythia::new(pc_only_config(1.0, 0.0));
    let mut host = MockHost::new();
    access(&mut engine, &mut host, 0x70, 0, 0xAAA0);
    assert_eq!(host.issued_addrs(), vec![addr(0x70, 1)]);
}

/// Issued prefetches never leave the trigger page.
#[test]
fn prefetches_stay_in_page() {
    let mut engine = Pythia::new(PythiaConfig {
        epsilon: 0.0,
        ..PythiaConfig::default()
    });
    let mut host = MockHost::new();
    for step in 0..200u64 {
        let page = 0x100 + step % 7;
        let offset = (step * 13) % 64;
        access(&mut engine, &mut host, page, offset, 0xBBB0 + step % 3);
        for a in host.issued_addrs() {
            assert_eq!(a >> 12, page, "prefetch left the trigger page");
        }
        host.clear_issued();
    }
}

// ══════════════════════════════════════════════════════════
// 2. SARSA training through the one-slot buffer
// ══════════════════════════════════════════════════════════

/// With α = 1 and γ = 0, one timely-rewarded decision trains its Q-value
/// to exactly the timely reward.
#[test]
fn sarsa_trains_to_timely_reward() {
    let mut engine = Pythia::new(pc_only_config(1.0, 0.0));
    let mut host = MockHost::new();
    let pc = 0xAAA4;

    // Decision: page 0x70 offset 0 → prefetch offset 1.
    access(&mut engine, &mut host, 0x70, 0, pc);
    assert_eq!(host.issued_addrs(), vec![addr(0x70, 1)]);

    // The prefetch lands, then the demand hits it: timely.
    let _ = engine.fill(&mut host, addr(0x70, 1), 0, 0, true, 0, 0);
    access(&mut engine, &mut host, 0x70, 1, pc);

    // Two more tracker pushes move the rewarded entry through the one-slot
    // buffer and trigger the SARSA step.
    access(&mut engine, &mut host, 0x71, 0, pc);

    assert_eq!(engine.stats().reward.correct_timely, 1);
    let q = engine.q_value(&pc_state(pc), 0);
    assert!(
        (q - 20.0).abs() < f32::EPSILON,
        "Q(s, +1) should equal the timely reward, got {q}"
    );
}

/// Two rounds of timely outcomes on the same (state, action) strictly
/// increase the pooled Q-value each time.
#[test]
fn timely_rewards_increase_pooled_q() {
    let mut engine = Pythia::new(pc_only_config(
        pfsim_core::config::defaults::PYTHIA_ALPHA,
        0.0,
    ));
    let mut host = MockHost::new();
    let pc = 0xAAA8;
    let q0 = engine.q_value(&pc_state(pc), 0);

    let mut run_round = |engine: &mut Pythia, host: &mut MockHost, page: u64| {
        access(engine, host, page, 0, pc);
        let _ = engine.fill(host, addr(page, 1), 0, 0, true, 0, 0);
        access(engine, host, page, 1, pc);
        access(engine, host, page + 0x100, 0, pc);
    };

    run_round(&mut engine, &mut host, 0x80);
    let q1 = engine.q_value(&pc_state(pc), 0);
    assert!(q1 > q0, "first timely outcome must raise Q ({q1} vs {q0})");

    run_round(&mut engine, &mut host, 0x81);
    let q2 = engine.q_value(&pc_state(pc), 0);
    assert!(q2 > q1, "second timely outcome must raise Q ({q2} vs {q1})");
}

// ══════════════════════════════════════════════════════════
// 3. Reward taxonomy
// ══════════════════════════════════════════════════════════

/// An action pointing below the page earns the out-of-bounds penalty
/// immediately.
#[test]
fn out_of_page_prediction_is_penalised() {
    let config = PythiaConfig {
        actions: vec![-1, 0],
        epsilon: 0.0,
        ..PythiaConfig::default()
    };
    let mut engine = Pythia::new(config);
    let mut host = MockHost::new();

    // Offset 0 with delta −1 leaves the page.
    access(&mut engine, &mut host, 0x90, 0, 0xCCC0);
    assert!(host.issued.is_empty());
    assert_eq!(engine.stats().reward.out_of_bounds, 1);
}

/// A tracker full of silent decisions charges the "none" reward as they
/// age out.
#[test]
fn silent_decisions_earn_none_reward() {
    let config = PythiaConfig {
        actions: vec![0],
        epsilon: 0.0,
        pt_size: 2,
        ..PythiaConfig::default()
    };
    let mut engine = Pythia::new(config);
    let mut host = MockHost::new();

    for step in 0..6u64 {
        access(&mut engine, &mut host, 0xA0 + step, 0, 0xDDD0);
    }
    assert!(host.issued.is_empty());
    assert!(engine.stats().reward.none >= 3);
    assert!(engine.stats().train_called >= 3);
}

// ══════════════════════════════════════════════════════════
// 4. Dynamic degree
// ══════════════════════════════════════════════════════════

/// Repeating the same action on one page grows its confidence until the
/// degree steps up and extra strided prefetches appear.
#[test]
fn repeated_action_raises_degree() {
    let mut engine = Pythia::new(PythiaConfig {
        epsilon: 0.0,
        features: pc_only_config(1.0, 0.0).features,
        ..PythiaConfig::default()
    });
    let mut host = MockHost::new();
    let pc = 0xEEE0;

    // Sequential walk: the +1 action repeats, its confidence climbing.
    access(&mut engine, &mut host, 0xB0, 0, pc);
    access(&mut engine, &mut host, 0xB0, 1, pc);
    access(&mut engine, &mut host, 0xB0, 2, pc);
    host.clear_issued();

    // Confidence 2 selects degree 2: the prediction and one extra stride.
    access(&mut engine, &mut host, 0xB0, 3, pc);
    assert_eq!(
        host.issued_addrs(),
        vec![addr(0xB0, 4), addr(0xB0, 5)],
        "degree 2 must add the second strided line"
    );
}

// ══════════════════════════════════════════════════════════
// 5. Determinism
// ══════════════════════════════════════════════════════════

/// Identical seeds and traces replay identical prefetch decisions.
#[test]
fn fixed_seed_is_deterministic() {
    let config = PythiaConfig {
        epsilon: 0.2,
        ..PythiaConfig::default()
    };
    let mut a = Pythia::new(config.clone());
    let mut b = Pythia::new(config);
    let mut host_a = MockHost::new();
    let mut host_b = MockHost::new();

    for step in 0..300u64 {
        let page = 0xC0 + step % 5;
        let offset = (step * 7) % 64;
        access(&mut a, &mut host_a, page, offset, 0xF000 + step % 4);
        access(&mut b, &mut host_b, page, offset, 0xF000 + step % 4);
    }
    assert_eq!(host_a.issued, host_b.issued);
}
