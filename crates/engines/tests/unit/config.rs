//! Configuration Tests.
//!
//! Verifies defaults, JSON deserialization, shape validation, and the
//! engine dispatcher.

use pfsim_core::config::{Config, ConfigError, EngineKind};
use pfsim_core::engines::{build_engine, PrefetchEngine};
use pretty_assertions::assert_eq;

// ══════════════════════════════════════════════════════════
// 1. Defaults
// ══════════════════════════════════════════════════════════

/// Default configuration describes the baseline table geometries.
#[test]
fn default_geometries() {
    let config = Config::default();
    assert_eq!(config.engine, EngineKind::Ipcp);
    assert_eq!(config.ipcp.ghb_entries, 8);
    assert_eq!(config.ipcp.degree, 3);
    assert_eq!(config.sms.ft_size, 64);
    assert_eq!(config.sms.at_size, 32);
    assert_eq!(config.sms.pht_sets(), 128);
    assert_eq!(config.sms.region_blocks(), 32);
    assert_eq!(config.berti.current_pages, 64);
    assert_eq!(config.spp.pt_sets, 2048);
    assert_eq!(config.spp.perc_depths.len(), 9);
    assert_eq!(config.pythia.actions.len(), 15);
    assert!(config.pythia.actions.contains(&0));
}

/// Every default engine config passes validation and builds.
#[test]
fn defaults_build() {
    for engine in [
        EngineKind::Ipcp,
        EngineKind::Sms,
        EngineKind::Berti,
        EngineKind::SppPpf,
        EngineKind::Pythia,
    ] {
        let config = Config {
            engine,
            ..Config::default()
        };
        let mut built = build_engine(&config).expect("default config must build");
        built.initialize();
    }
}

// ══════════════════════════════════════════════════════════
// 2. JSON deserialization
// ══════════════════════════════════════════════════════════

/// Partial JSON overrides merge over the defaults.
#[test]
fn json_overrides() {
    let json = r#"{
        "engine": "Pythia",
        "pythia": { "seed": 42, "epsilon": 0.0, "actions": [1, -1, 0] },
        "berti": { "prev_requests": 256 }
    }"#;
    let config: Config = serde_json::from_str(json).expect("valid config JSON");
    assert_eq!(config.engine, EngineKind::Pythia);
    assert_eq!(config.pythia.seed, 42);
    assert_eq!(config.pythia.actions, vec![1, -1, 0]);
    assert_eq!(config.berti.prev_requests, 256);
    // Untouched sections keep their defaults.
    assert_eq!(config.sms.pht_size, 2048);
}

/// The SPP alias resolves to the combined engine.
#[test]
fn spp_alias() {
    let config: Config = serde_json::from_str(r#"{ "engine": "Spp" }"#).expect("alias accepted");
    assert_eq!(config.engine, EngineKind::SppPpf);
}

// ══════════════════════════════════════════════════════════
// 3. Validation
// ══════════════════════════════════════════════════════════

/// An empty action list is rejected.
#[test]
fn pythia_empty_actions_rejected() {
    let mut config = Config {
        engine: EngineKind::Pythia,
        ..Config::default()
    };
    config.pythia.actions.clear();
    assert!(matches!(
        build_engine(&config),
        Err(ConfigError::EmptyActionList)
    ));
}

/// Degree thresholds must stay one shorter than the degree list.
#[test]
fn pythia_degree_shape_rejected() {
    let mut config = Config {
        engine: EngineKind::Pythia,
        ..Config::default()
    };
    config.pythia.degree_thresholds = vec![1, 3];
    assert!(matches!(
        build_engine(&config),
        Err(ConfigError::DegreeShape { .. })
    ));
}

/// Berti rings must be powers of two.
#[test]
fn berti_ring_power_of_two() {
    let mut config = Config {
        engine: EngineKind::Berti,
        ..Config::default()
    };
    config.berti.prev_requests = 100;
    assert!(matches!(
        build_engine(&config),
        Err(ConfigError::NotPowerOfTwo { .. })
    ));
}

/// The SMS region must fit the 64-entry pattern bitmap.
#[test]
fn sms_region_must_fit_bitmap() {
    let mut config = Config {
        engine: EngineKind::Sms,
        ..Config::default()
    };
    config.sms.region_size_log = 13;
    assert!(matches!(
        build_engine(&config),
        Err(ConfigError::BadRegionSize { .. })
    ));
}
