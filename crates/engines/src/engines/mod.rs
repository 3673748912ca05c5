//! Prefetcher engine implementations.
//!
//! This module contains the engine contract and the five engines:
//! IPCP, SMS, Berti, SPP+PPF, and Pythia. Engines are independent and
//! swappable; exactly one is active per cache instance, selected by
//! [`Config::engine`] and constructed through [`build_engine`].

/// Per-page latency-driven delta mining prefetcher.
pub mod berti;

/// Instruction-pointer classifying prefetcher (stream/stride/complex/NL).
pub mod ipcp;

/// Tile-coded feature-wise SARSA reinforcement-learning prefetcher.
pub mod pythia;

/// Spatial memory streaming prefetcher (region pattern learning).
pub mod sms;

/// Signature-path lookahead prefetcher with perceptron filter.
pub mod spp;

pub use self::berti::Berti;
pub use self::ipcp::Ipcp;
pub use self::pythia::Pythia;
pub use self::sms::Sms;
pub use self::spp::SppPpf;

use crate::config::{Config, ConfigError, EngineKind};
use crate::host::{AccessType, CacheHost};

/// The four-event contract every engine presents to the host cache.
///
/// The host drives these methods serially; no two execute concurrently for
/// one engine instance, and every method returns promptly. Table state
/// updated before a back-pressured emission attempt is not rolled back.
pub trait PrefetchEngine {
    /// One-time table setup; emits the engine's configuration banner.
    fn initialize(&mut self) {}

    /// Observes one demand access and emits zero or more prefetches.
    ///
    /// Returns the metadata word to propagate with the access (engines that
    /// do not use metadata return 0).
    #[allow(clippy::too_many_arguments)]
    fn operate(
        &mut self,
        host: &mut dyn CacheHost,
        addr: u64,
        ip: u64,
        cache_hit: bool,
        useful_prefetch: bool,
        access: AccessType,
        metadata_in: u32,
    ) -> u32;

    /// Observes a cache-line install (and the line it displaced).
    #[allow(clippy::too_many_arguments)]
    fn fill(
        &mut self,
        host: &mut dyn CacheHost,
        addr: u64,
        set: usize,
        way: usize,
        was_prefetch: bool,
        evicted_addr: u64,
        metadata_in: u32,
    ) -> u32;

    /// One host clock tick; drains any internal prefetch buffer.
    fn cycle(&mut self, host: &mut dyn CacheHost) {
        let _ = host;
    }
}

/// Builds the engine selected by `config.engine` after validating its
/// parameters.
///
/// # Errors
///
/// Returns a [`ConfigError`] when the selected engine's configuration fails
/// shape validation (empty action list, non-power-of-two ring, ...).
pub fn build_engine(config: &Config) -> Result<Box<dyn PrefetchEngine>, ConfigError> {
    Ok(match config.engine {
        EngineKind::Ipcp => {
            config.ipcp.validate()?;
            Box::new(Ipcp::new(config.ipcp.clone()))
        }
        EngineKind::Sms => {
            config.sms.validate()?;
            Box::new(Sms::new(config.sms.clone()))
        }
        EngineKind::Berti => {
            config.berti.validate()?;
            Box::new(Berti::new(config.berti.clone()))
        }
        EngineKind::SppPpf => {
            config.spp.validate()?;
            Box::new(SppPpf::new(config.spp.clone()))
        }
        EngineKind::Pythia => {
            config.pythia.validate()?;
            Box::new(Pythia::new(config.pythia.clone()))
        }
    })
}
