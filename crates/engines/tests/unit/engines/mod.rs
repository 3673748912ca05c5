//! Unit tests and trace scenarios for the prefetcher engines.

/// Berti delta mining, bursts, and bookmarks.
pub mod berti;

/// IPCP class precedence, confidence, and the speculative next-line bit.
pub mod ipcp;

/// Pythia SARSA training, rewards, and dynamic degree.
pub mod pythia;

/// SMS generations and pattern replay.
pub mod sms;

/// SPP+PPF signature lookahead and accuracy counters.
pub mod spp;
