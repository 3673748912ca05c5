//! Data-cache prefetcher engines for a cycle-level cache-hierarchy simulator.
//!
//! This crate implements a family of hardware data prefetchers as plug-in
//! state machines driven by a simulator host:
//! 1. **IPCP:** instruction-pointer-based stride/stream/complex-delta classifier.
//! 2. **SMS:** spatial pattern learning over fixed-size memory regions.
//! 3. **Berti:** per-page latency-driven delta mining.
//! 4. **SPP+PPF:** signature-path lookahead gated by a perceptron filter.
//! 5. **Pythia:** tile-coded feature-wise SARSA reinforcement learner.
//!
//! Engines observe demand accesses through the [`engines::PrefetchEngine`]
//! contract, query the host through [`host::CacheHost`], and emit prefetch
//! requests back through `prefetch_line`. All engines are single-threaded
//! passive state machines; the host drives them serially.

/// Common utilities (pattern bitmaps, hashing, sign-magnitude coding).
pub mod common;
/// Engine configuration (defaults, enums, hierarchical config structures).
pub mod config;
/// The prefetcher implementations and the engine dispatcher.
pub mod engines;
/// Host-facing contract: access types and the host query/emission surface.
pub mod host;
/// Per-engine statistics collection and reporting.
pub mod stats;

/// Root configuration type; use `Config::default()` or deserialize from JSON.
pub use crate::config::{Config, ConfigError, EngineKind};
/// Engine capability trait and dispatcher.
pub use crate::engines::{build_engine, PrefetchEngine};
/// Host query/emission surface implemented by the cache simulator.
pub use crate::host::{AccessType, CacheHost};
