//! Configuration system for the prefetcher engines.
//!
//! This module defines all configuration structures and enums used to
//! parameterize the engines. It provides:
//! 1. **Defaults:** baseline hardware constants for every engine's tables.
//! 2. **Structures:** a root [`Config`] selecting the active engine plus one
//!    config struct per engine.
//! 3. **Validation:** shape checks that turn malformed configs into
//!    [`ConfigError`]s before an engine is built.
//!
//! Configuration is supplied as JSON from the host harness, or use
//! `Config::default()` for the built-in table geometries.

use serde::Deserialize;
use thiserror::Error;

use crate::common::HashKind;

/// Default configuration constants for all engines.
///
/// These values define the baseline table geometries and thresholds when not
/// explicitly overridden in a JSON configuration.
pub mod defaults {
    /// IPCP IP-tracker index width (1024 buckets).
    pub const IPCP_INDEX_BITS: u32 = 10;

    /// IPCP IP-tracker tag width.
    pub const IPCP_TAG_BITS: u32 = 6;

    /// IPCP global history buffer entries.
    pub const IPCP_GHB_ENTRIES: usize = 8;

    /// IPCP delta prediction table entries (one per 12-bit signature).
    pub const IPCP_DPT_ENTRIES: usize = 4096;

    /// IPCP base prefetch degree (streams use twice this).
    pub const IPCP_DEGREE: usize = 3;

    /// Misses between speculative-next-line re-evaluations.
    pub const IPCP_MISS_INTERVAL: u64 = 256;

    /// Misses-per-kilocycle ceiling above which speculative NL is disabled.
    pub const IPCP_SPEC_NL_THRESHOLD: f64 = 15.0;

    /// SMS filter table entries (FIFO).
    pub const SMS_FT_SIZE: usize = 64;

    /// SMS accumulation table entries (oldest-age eviction).
    pub const SMS_AT_SIZE: usize = 32;

    /// SMS pattern history table entries.
    pub const SMS_PHT_SIZE: usize = 2048;

    /// SMS pattern history table associativity.
    pub const SMS_PHT_ASSOC: usize = 16;

    /// log2 of the SMS spatial region size in bytes (2 KiB).
    pub const SMS_REGION_SIZE_LOG: u32 = 11;

    /// SMS prefetch-buffer drain rate per cycle.
    pub const SMS_PREF_DEGREE: usize = 4;

    /// SMS prefetch buffer capacity.
    pub const SMS_PREF_BUFFER_SIZE: usize = 256;

    /// Berti current-pages table entries (true LRU).
    pub const BERTI_CURRENT_PAGES: usize = 64;

    /// Berti previous-requests ring entries (power of two).
    pub const BERTI_PREV_REQUESTS: usize = 128;

    /// Berti previous-prefetches ring entries (power of two).
    pub const BERTI_PREV_PREFETCHES: usize = 64;

    /// Berti record-pages table entries (true LRU).
    pub const BERTI_RECORD_PAGES: usize = 1024;

    /// Berti IP table entries (power of two).
    pub const BERTI_IP_TABLE: usize = 1024;

    /// Candidate deltas tracked per current page.
    pub const BERTI_NUM_CANDIDATES: usize = 10;

    /// Candidate deltas harvested per access from the request history.
    pub const BERTI_CANDIDATES_PER_ACCESS: usize = 8;

    /// Counter value at which a page's best delta is trusted on its own.
    pub const BERTI_MED_HIGH_CONFIDENCE: u32 = 2;

    /// Saturation ceiling of the per-delta counters.
    pub const BERTI_CTR_MAX: u32 = 63;

    /// Maximum prefetches issued by one burst.
    pub const BERTI_MAX_BURST: usize = 8;

    /// Width of the wrapped timestamp field in the history rings.
    pub const BERTI_TIME_BITS: u32 = 16;

    /// SPP signature table ways (single set).
    pub const SPP_ST_WAYS: usize = 256;

    /// SPP signature table partial-page tag bits.
    pub const SPP_ST_TAG_BITS: u32 = 16;

    /// SPP pattern table sets.
    pub const SPP_PT_SETS: usize = 2048;

    /// SPP pattern table ways.
    pub const SPP_PT_WAYS: usize = 4;

    /// Width of the per-delta and per-signature counters.
    pub const SPP_COUNTER_BITS: u32 = 4;

    /// SPP signature shift per step.
    pub const SPP_SIG_SHIFT: u32 = 3;

    /// SPP signature width.
    pub const SPP_SIG_BITS: u32 = 12;

    /// Sign-magnitude width of deltas folded into signatures.
    pub const SPP_SIG_DELTA_BITS: u32 = 7;

    /// Main prefetch filter quotient bits (1024 sets).
    pub const SPP_QUOTIENT_BITS: u32 = 10;

    /// Main prefetch filter remainder bits.
    pub const SPP_REMAINDER_BITS: u32 = 6;

    /// Reject filter quotient bits (1024 sets).
    pub const SPP_QUOTIENT_BITS_REJECT: u32 = 10;

    /// Reject filter remainder bits.
    pub const SPP_REMAINDER_BITS_REJECT: u32 = 8;

    /// Cap (and halving trigger) for the global accuracy counters.
    pub const SPP_GLOBAL_COUNTER_MAX: u64 = (1 << 10) - 1;

    /// SPP cross-page carry register entries.
    pub const SPP_GHR_ENTRIES: usize = 8;

    /// Pages remembered for the distinct-page issue throttle.
    pub const SPP_PAGES_TRACKED: usize = 6;

    /// Perceptron weight saturation (−(MAX+1)..=MAX).
    pub const SPP_PERC_COUNTER_MAX: i32 = 15;

    /// Perceptron sum at or above which a candidate fills L2.
    pub const SPP_PERC_THRESHOLD_HI: i32 = -5;

    /// Perceptron sum at or above which a candidate fills the LLC only.
    pub const SPP_PERC_THRESHOLD_LO: i32 = -15;

    /// Upper edge of the correct-but-unsaturated training band.
    pub const SPP_POS_UPDATE_THRESHOLD: i32 = 90;

    /// Lower edge of the correct-but-unsaturated training band.
    pub const SPP_NEG_UPDATE_THRESHOLD: i32 = -80;

    /// Pythia SARSA learning rate.
    pub const PYTHIA_ALPHA: f32 = 0.006_508_803;

    /// Pythia SARSA discount factor.
    pub const PYTHIA_GAMMA: f32 = 0.556_300_97;

    /// Pythia ε-greedy exploration probability.
    pub const PYTHIA_EPSILON: f32 = 0.001_822_844_4;

    /// Pythia RNG seed (runs are deterministic given this value).
    pub const PYTHIA_SEED: u64 = 200;

    /// Pythia signature table entries (FIFO).
    pub const PYTHIA_ST_SIZE: usize = 64;

    /// Pythia prefetch tracker entries (FIFO).
    pub const PYTHIA_PT_SIZE: usize = 256;

    /// History depth of the per-page PC/offset/delta queues.
    pub const PYTHIA_MAX_HISTORY: usize = 5;

    /// Per-page action tracker entries.
    pub const PYTHIA_ACTION_TRACKER_SIZE: usize = 2;

    /// DRAM bandwidth level at or above which the high-bandwidth reward
    /// set applies and the action fallback is disabled.
    pub const PYTHIA_HIGH_BW_THRESHOLD: u8 = 4;

    /// Per-feature tilings in the Q representation.
    pub const PYTHIA_NUM_TILINGS: u32 = 3;
}

/// Selects which prefetcher engine a cache instance runs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum EngineKind {
    /// Instruction-pointer classifying prefetcher (stream/stride/complex/NL).
    #[default]
    Ipcp,
    /// Spatial memory streaming (region pattern learning).
    Sms,
    /// Per-page latency-driven delta mining.
    Berti,
    /// Signature-path lookahead with perceptron filter.
    #[serde(alias = "Spp")]
    SppPpf,
    /// Tile-coded feature-wise SARSA learner.
    Pythia,
}

/// Q-value pooling across Pythia's per-feature tables.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum QPooling {
    /// Sum the per-feature Q-values.
    Sum,
    /// Take the maximum per-feature Q-value.
    #[default]
    Max,
}

/// State attributes a Pythia feature table may key on.
///
/// Composite variants concatenate the named attributes (shift-and-fold)
/// before hashing.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum PythiaFeature {
    /// Trigger program counter.
    Pc,
    /// Line offset within the page.
    Offset,
    /// Last observed delta on the page.
    Delta,
    /// Full byte address.
    Address,
    /// Page number.
    Page,
    /// PC concatenated with the page offset.
    PcOffset,
    /// PC XOR-folded with the page number.
    PcPage,
    /// PC concatenated with the sign-magnitude delta.
    PcDelta,
    /// PC, offset, and delta concatenated.
    PcOffsetDelta,
    /// Shift-XOR signature of the recent PC path.
    PcPath,
    /// Shift-XOR signature of the recent delta path.
    DeltaPath,
    /// Shift-XOR signature of the recent offset path.
    OffsetPath,
    /// PC path concatenated with the current offset.
    PcPathOffset,
    /// PC path concatenated with the delta path.
    PcPathDeltaPath,
}

/// Root configuration: the active engine plus every engine's parameters.
///
/// # Examples
///
/// ```
/// use pfsim_core::config::{Config, EngineKind};
///
/// let config = Config::default();
/// assert_eq!(config.engine, EngineKind::Ipcp);
/// assert_eq!(config.berti.current_pages, 64);
///
/// let json = r#"{
///     "engine": "Pythia",
///     "pythia": { "seed": 7, "pt_size": 128 }
/// }"#;
/// let config: Config = serde_json::from_str(json).unwrap();
/// assert_eq!(config.engine, EngineKind::Pythia);
/// assert_eq!(config.pythia.seed, 7);
/// assert_eq!(config.pythia.pt_size, 128);
/// ```
#[derive(Clone, Debug, Default, Deserialize)]
pub struct Config {
    /// Engine driven by this cache instance.
    #[serde(default)]
    pub engine: EngineKind,

    /// IPCP parameters.
    #[serde(default)]
    pub ipcp: IpcpConfig,

    /// SMS parameters.
    #[serde(default)]
    pub sms: SmsConfig,

    /// Berti parameters.
    #[serde(default)]
    pub berti: BertiConfig,

    /// SPP+PPF parameters.
    #[serde(default)]
    pub spp: SppConfig,

    /// Pythia parameters.
    #[serde(default)]
    pub pythia: PythiaConfig,
}

/// IPCP engine parameters.
#[derive(Clone, Debug, Deserialize)]
pub struct IpcpConfig {
    /// IP-tracker index width; the table holds `2^index_bits` buckets.
    #[serde(default = "IpcpConfig::default_index_bits")]
    pub index_bits: u32,

    /// IP-tracker tag width (bits of the IP above the index).
    #[serde(default = "IpcpConfig::default_tag_bits")]
    pub tag_bits: u32,

    /// Global history buffer entries.
    #[serde(default = "IpcpConfig::default_ghb_entries")]
    pub ghb_entries: usize,

    /// Delta prediction table entries.
    #[serde(default = "IpcpConfig::default_dpt_entries")]
    pub dpt_entries: usize,

    /// Base prefetch degree; stream-class accesses use twice this.
    #[serde(default = "IpcpConfig::default_degree")]
    pub degree: usize,

    /// Misses between speculative-next-line re-evaluations.
    #[serde(default = "IpcpConfig::default_miss_interval")]
    pub miss_interval: u64,

    /// MPKC ceiling above which the speculative next-line bit is cleared.
    #[serde(default = "IpcpConfig::default_spec_nl_threshold")]
    pub spec_nl_threshold: f64,
}

impl IpcpConfig {
    fn default_index_bits() -> u32 {
        defaults::IPCP_INDEX_BITS
    }
    fn default_tag_bits() -> u32 {
        defaults::IPCP_TAG_BITS
    }
    fn default_ghb_entries() -> usize {
        defaults::IPCP_GHB_ENTRIES
    }
    fn default_dpt_entries() -> usize {
        defaults::IPCP_DPT_ENTRIES
    }
    fn default_degree() -> usize {
        defaults::IPCP_DEGREE
    }
    fn default_miss_interval() -> u64 {
        defaults::IPCP_MISS_INTERVAL
    }
    fn default_spec_nl_threshold() -> f64 {
        defaults::IPCP_SPEC_NL_THRESHOLD
    }

    /// Checks the table geometry for internal consistency.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.dpt_entries.is_power_of_two() {
            return Err(ConfigError::NotPowerOfTwo {
                table: "ipcp.dpt_entries",
                size: self.dpt_entries,
            });
        }
        if self.degree == 0 || self.ghb_entries == 0 {
            return Err(ConfigError::ZeroSize {
                field: if self.degree == 0 {
                    "ipcp.degree"
                } else {
                    "ipcp.ghb_entries"
                },
            });
        }
        Ok(())
    }
}

impl Default for IpcpConfig {
    fn default() -> Self {
        Self {
            index_bits: defaults::IPCP_INDEX_BITS,
            tag_bits: defaults::IPCP_TAG_BITS,
            ghb_entries: defaults::IPCP_GHB_ENTRIES,
            dpt_entries: defaults::IPCP_DPT_ENTRIES,
            degree: defaults::IPCP_DEGREE,
            miss_interval: defaults::IPCP_MISS_INTERVAL,
            spec_nl_threshold: defaults::IPCP_SPEC_NL_THRESHOLD,
        }
    }
}

/// SMS engine parameters.
#[derive(Clone, Debug, Deserialize)]
pub struct SmsConfig {
    /// Filter table entries.
    #[serde(default = "SmsConfig::default_ft_size")]
    pub ft_size: usize,

    /// Accumulation table entries.
    #[serde(default = "SmsConfig::default_at_size")]
    pub at_size: usize,

    /// Pattern history table entries.
    #[serde(default = "SmsConfig::default_pht_size")]
    pub pht_size: usize,

    /// Pattern history table ways per set.
    #[serde(default = "SmsConfig::default_pht_assoc")]
    pub pht_assoc: usize,

    /// log2 of the spatial region size in bytes.
    #[serde(default = "SmsConfig::default_region_size_log")]
    pub region_size_log: u32,

    /// Prefetches drained from the buffer per cycle.
    #[serde(default = "SmsConfig::default_pref_degree")]
    pub pref_degree: usize,

    /// Prefetch buffer capacity; excess candidates spill.
    #[serde(default = "SmsConfig::default_pref_buffer_size")]
    pub pref_buffer_size: usize,
}

impl SmsConfig {
    fn default_ft_size() -> usize {
        defaults::SMS_FT_SIZE
    }
    fn default_at_size() -> usize {
        defaults::SMS_AT_SIZE
    }
    fn default_pht_size() -> usize {
        defaults::SMS_PHT_SIZE
    }
    fn default_pht_assoc() -> usize {
        defaults::SMS_PHT_ASSOC
    }
    fn default_region_size_log() -> u32 {
        defaults::SMS_REGION_SIZE_LOG
    }
    fn default_pref_degree() -> usize {
        defaults::SMS_PREF_DEGREE
    }
    fn default_pref_buffer_size() -> usize {
        defaults::SMS_PREF_BUFFER_SIZE
    }

    /// Number of PHT sets implied by size and associativity.
    pub fn pht_sets(&self) -> usize {
        self.pht_size / self.pht_assoc
    }

    /// Line offsets per spatial region.
    pub fn region_blocks(&self) -> u32 {
        1 << (self.region_size_log - crate::common::LOG2_BLOCK_SIZE)
    }

    /// Checks the table geometry for internal consistency.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.pht_assoc == 0 || self.pht_size % self.pht_assoc != 0 {
            return Err(ConfigError::BadAssociativity {
                size: self.pht_size,
                assoc: self.pht_assoc,
            });
        }
        if self.region_size_log <= crate::common::LOG2_BLOCK_SIZE
            || self.region_blocks() > crate::common::bitmap::BITMAP_MAX_SIZE
        {
            return Err(ConfigError::BadRegionSize {
                log2: self.region_size_log,
            });
        }
        Ok(())
    }
}

impl Default for SmsConfig {
    fn default() -> Self {
        Self {
            ft_size: defaults::SMS_FT_SIZE,
            at_size: defaults::SMS_AT_SIZE,
            pht_size: defaults::SMS_PHT_SIZE,
            pht_assoc: defaults::SMS_PHT_ASSOC,
            region_size_log: defaults::SMS_REGION_SIZE_LOG,
            pref_degree: defaults::SMS_PREF_DEGREE,
            pref_buffer_size: defaults::SMS_PREF_BUFFER_SIZE,
        }
    }
}

/// Berti engine parameters.
#[derive(Clone, Debug, Deserialize)]
pub struct BertiConfig {
    /// Current-pages table entries (true-LRU).
    #[serde(default = "BertiConfig::default_current_pages")]
    pub current_pages: usize,

    /// Previous-requests ring entries (power of two).
    #[serde(default = "BertiConfig::default_prev_requests")]
    pub prev_requests: usize,

    /// Previous-prefetches ring entries (power of two).
    #[serde(default = "BertiConfig::default_prev_prefetches")]
    pub prev_prefetches: usize,

    /// Record-pages table entries (true-LRU).
    #[serde(default = "BertiConfig::default_record_pages")]
    pub record_pages: usize,

    /// IP table entries (power of two; indexed by the low IP bits).
    #[serde(default = "BertiConfig::default_ip_table")]
    pub ip_table: usize,

    /// Candidate deltas tracked per current page.
    #[serde(default = "BertiConfig::default_num_candidates")]
    pub num_candidates: usize,

    /// Candidate deltas harvested per access from the request history.
    #[serde(default = "BertiConfig::default_candidates_per_access")]
    pub candidates_per_access: usize,

    /// Counter value at which the page's own best delta is trusted.
    #[serde(default = "BertiConfig::default_med_high_confidence")]
    pub med_high_confidence: u32,

    /// Saturation ceiling of the per-delta counters.
    #[serde(default = "BertiConfig::default_ctr_max")]
    pub ctr_max: u32,

    /// Maximum prefetches issued by one burst.
    #[serde(default = "BertiConfig::default_max_burst")]
    pub max_burst: usize,

    /// Width of the wrapped timestamp field.
    #[serde(default = "BertiConfig::default_time_bits")]
    pub time_bits: u32,
}

impl BertiConfig {
    fn default_current_pages() -> usize {
        defaults::BERTI_CURRENT_PAGES
    }
    fn default_prev_requests() -> usize {
        defaults::BERTI_PREV_REQUESTS
    }
    fn default_prev_prefetches() -> usize {
        defaults::BERTI_PREV_PREFETCHES
    }
    fn default_record_pages() -> usize {
        defaults::BERTI_RECORD_PAGES
    }
    fn default_ip_table() -> usize {
        defaults::BERTI_IP_TABLE
    }
    fn default_num_candidates() -> usize {
        defaults::BERTI_NUM_CANDIDATES
    }
    fn default_candidates_per_access() -> usize {
        defaults::BERTI_CANDIDATES_PER_ACCESS
    }
    fn default_med_high_confidence() -> u32 {
        defaults::BERTI_MED_HIGH_CONFIDENCE
    }
    fn default_ctr_max() -> u32 {
        defaults::BERTI_CTR_MAX
    }
    fn default_max_burst() -> usize {
        defaults::BERTI_MAX_BURST
    }
    fn default_time_bits() -> u32 {
        defaults::BERTI_TIME_BITS
    }

    /// Checks the table geometry for internal consistency.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (table, size) in [
            ("berti.prev_requests", self.prev_requests),
            ("berti.prev_prefetches", self.prev_prefetches),
            ("berti.ip_table", self.ip_table),
        ] {
            if !size.is_power_of_two() {
                return Err(ConfigError::NotPowerOfTwo { table, size });
            }
        }
        if self.current_pages == 0 || self.record_pages == 0 {
            return Err(ConfigError::ZeroSize {
                field: if self.current_pages == 0 {
                    "berti.current_pages"
                } else {
                    "berti.record_pages"
                },
            });
        }
        Ok(())
    }
}

impl Default for BertiConfig {
    fn default() -> Self {
        Self {
            current_pages: defaults::BERTI_CURRENT_PAGES,
            prev_requests: defaults::BERTI_PREV_REQUESTS,
            prev_prefetches: defaults::BERTI_PREV_PREFETCHES,
            record_pages: defaults::BERTI_RECORD_PAGES,
            ip_table: defaults::BERTI_IP_TABLE,
            num_candidates: defaults::BERTI_NUM_CANDIDATES,
            candidates_per_access: defaults::BERTI_CANDIDATES_PER_ACCESS,
            med_high_confidence: defaults::BERTI_MED_HIGH_CONFIDENCE,
            ctr_max: defaults::BERTI_CTR_MAX,
            max_burst: defaults::BERTI_MAX_BURST,
            time_bits: defaults::BERTI_TIME_BITS,
        }
    }
}

/// SPP+PPF engine parameters.
#[derive(Clone, Debug, Deserialize)]
pub struct SppConfig {
    /// Signature table ways (single set).
    #[serde(default = "SppConfig::default_st_ways")]
    pub st_ways: usize,

    /// Pattern table sets.
    #[serde(default = "SppConfig::default_pt_sets")]
    pub pt_sets: usize,

    /// Pattern table ways per set.
    #[serde(default = "SppConfig::default_pt_ways")]
    pub pt_ways: usize,

    /// Cross-page carry register entries.
    #[serde(default = "SppConfig::default_ghr_entries")]
    pub ghr_entries: usize,

    /// Pages remembered for the distinct-page issue throttle.
    #[serde(default = "SppConfig::default_pages_tracked")]
    pub pages_tracked: usize,

    /// Perceptron weight table depth per feature (nine features).
    #[serde(default = "SppConfig::default_perc_depths")]
    pub perc_depths: Vec<usize>,

    /// Perceptron sum at or above which a candidate fills L2.
    #[serde(default = "SppConfig::default_perc_threshold_hi")]
    pub perc_threshold_hi: i32,

    /// Perceptron sum at or above which a candidate fills the LLC only.
    #[serde(default = "SppConfig::default_perc_threshold_lo")]
    pub perc_threshold_lo: i32,

    /// Upper edge of the correct-but-unsaturated training band.
    #[serde(default = "SppConfig::default_pos_update_threshold")]
    pub pos_update_threshold: i32,

    /// Lower edge of the correct-but-unsaturated training band.
    #[serde(default = "SppConfig::default_neg_update_threshold")]
    pub neg_update_threshold: i32,
}

impl SppConfig {
    fn default_st_ways() -> usize {
        defaults::SPP_ST_WAYS
    }
    fn default_pt_sets() -> usize {
        defaults::SPP_PT_SETS
    }
    fn default_pt_ways() -> usize {
        defaults::SPP_PT_WAYS
    }
    fn default_ghr_entries() -> usize {
        defaults::SPP_GHR_ENTRIES
    }
    fn default_pages_tracked() -> usize {
        defaults::SPP_PAGES_TRACKED
    }
    fn default_perc_depths() -> Vec<usize> {
        vec![2048, 4096, 4096, 4096, 1024, 4096, 1024, 2048, 128]
    }
    fn default_perc_threshold_hi() -> i32 {
        defaults::SPP_PERC_THRESHOLD_HI
    }
    fn default_perc_threshold_lo() -> i32 {
        defaults::SPP_PERC_THRESHOLD_LO
    }
    fn default_pos_update_threshold() -> i32 {
        defaults::SPP_POS_UPDATE_THRESHOLD
    }
    fn default_neg_update_threshold() -> i32 {
        defaults::SPP_NEG_UPDATE_THRESHOLD
    }

    /// Checks the table geometry for internal consistency.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.perc_depths.is_empty() {
            return Err(ConfigError::NoFeatures);
        }
        if self.st_ways == 0 || self.pt_sets == 0 || self.pt_ways == 0 {
            return Err(ConfigError::ZeroSize {
                field: "spp table geometry",
            });
        }
        if self.perc_threshold_lo > self.perc_threshold_hi {
            return Err(ConfigError::ThresholdOrder {
                lo: self.perc_threshold_lo,
                hi: self.perc_threshold_hi,
            });
        }
        Ok(())
    }
}

impl Default for SppConfig {
    fn default() -> Self {
        Self {
            st_ways: defaults::SPP_ST_WAYS,
            pt_sets: defaults::SPP_PT_SETS,
            pt_ways: defaults::SPP_PT_WAYS,
            ghr_entries: defaults::SPP_GHR_ENTRIES,
            pages_tracked: defaults::SPP_PAGES_TRACKED,
            perc_depths: Self::default_perc_depths(),
            perc_threshold_hi: defaults::SPP_PERC_THRESHOLD_HI,
            perc_threshold_lo: defaults::SPP_PERC_THRESHOLD_LO,
            pos_update_threshold: defaults::SPP_POS_UPDATE_THRESHOLD,
            neg_update_threshold: defaults::SPP_NEG_UPDATE_THRESHOLD,
        }
    }
}

/// Reward magnitudes for one bandwidth regime.
#[derive(Clone, Copy, Debug, Deserialize)]
pub struct RewardSet {
    /// Demand hit on an already-filled prefetch.
    pub correct_timely: i32,
    /// Demand hit on a still-in-flight prefetch.
    pub correct_untimely: i32,
    /// Prefetch evicted from the tracker without a demand hit.
    pub incorrect: i32,
    /// "No prefetch" decision that never saw a demand.
    pub none: i32,
    /// Chosen offset fell outside the page.
    pub out_of_bounds: i32,
    /// Re-chose an address already being tracked.
    pub tracker_hit: i32,
}

impl RewardSet {
    /// Reward magnitudes applied while DRAM bandwidth is below the
    /// high-bandwidth threshold.
    pub const fn low_bw() -> Self {
        Self {
            correct_timely: 20,
            correct_untimely: 12,
            incorrect: -8,
            none: -4,
            out_of_bounds: -12,
            tracker_hit: -2,
        }
    }

    /// Reward magnitudes applied in the high-bandwidth regime; penalises
    /// wasted prefetches harder and tolerates silence better.
    pub const fn high_bw() -> Self {
        Self {
            correct_timely: 20,
            correct_untimely: 12,
            incorrect: -14,
            none: -2,
            out_of_bounds: -12,
            tracker_hit: -2,
        }
    }
}

/// One tile-coded feature table in Pythia's Q representation.
#[derive(Clone, Debug, Deserialize)]
pub struct PythiaFeatureConfig {
    /// State attribute(s) this table keys on.
    pub feature: PythiaFeature,

    /// Independent tilings (each with its own XOR offset).
    #[serde(default = "PythiaFeatureConfig::default_num_tilings")]
    pub num_tilings: u32,

    /// Tiles per tiling.
    pub num_tiles: u32,

    /// Word mixer applied to the folded feature value.
    #[serde(default)]
    pub hash: HashKind,

    /// XOR a per-tiling constant into the raw index to decorrelate tilings.
    #[serde(default = "PythiaFeatureConfig::default_tiling_offset")]
    pub enable_tiling_offset: bool,
}

impl PythiaFeatureConfig {
    fn default_num_tilings() -> u32 {
        defaults::PYTHIA_NUM_TILINGS
    }
    const fn default_tiling_offset() -> bool {
        true
    }
}

/// Pythia engine parameters.
#[derive(Clone, Debug, Deserialize)]
pub struct PythiaConfig {
    /// SARSA learning rate.
    #[serde(default = "PythiaConfig::default_alpha")]
    pub alpha: f32,

    /// SARSA discount factor.
    #[serde(default = "PythiaConfig::default_gamma")]
    pub gamma: f32,

    /// ε-greedy exploration probability.
    #[serde(default = "PythiaConfig::default_epsilon")]
    pub epsilon: f32,

    /// RNG seed; identical seeds and traces replay identically.
    #[serde(default = "PythiaConfig::default_seed")]
    pub seed: u64,

    /// Action list: candidate deltas, including 0 for "no prefetch".
    #[serde(default = "PythiaConfig::default_actions")]
    pub actions: Vec<i32>,

    /// Signature table entries.
    #[serde(default = "PythiaConfig::default_st_size")]
    pub st_size: usize,

    /// Prefetch tracker entries.
    #[serde(default = "PythiaConfig::default_pt_size")]
    pub pt_size: usize,

    /// History depth of the per-page PC/offset/delta queues.
    #[serde(default = "PythiaConfig::default_max_history")]
    pub max_history: usize,

    /// Per-page action tracker entries.
    #[serde(default = "PythiaConfig::default_action_tracker_size")]
    pub action_tracker_size: usize,

    /// Scale the prefetch degree with per-page action confidence.
    #[serde(default = "PythiaConfig::default_true")]
    pub enable_dyn_degree: bool,

    /// Ascending action-confidence thresholds selecting the degree.
    #[serde(default = "PythiaConfig::default_degree_thresholds")]
    pub degree_thresholds: Vec<i32>,

    /// Degrees selected by the thresholds (one longer than the thresholds).
    #[serde(default = "PythiaConfig::default_dyn_degrees")]
    pub dyn_degrees: Vec<u32>,

    /// Attribute an immediate penalty to out-of-page predictions.
    #[serde(default = "PythiaConfig::default_true")]
    pub enable_reward_out_of_bounds: bool,

    /// Attribute an immediate penalty to re-predicted tracked addresses.
    #[serde(default)]
    pub enable_reward_tracker_hit: bool,

    /// Use the high-bandwidth reward set when bandwidth is high.
    #[serde(default = "PythiaConfig::default_true")]
    pub enable_hbw_reward: bool,

    /// Exclude action index 0 from argmax only in low-bandwidth regimes.
    #[serde(default = "PythiaConfig::default_true")]
    pub enable_dyn_action_fallback: bool,

    /// DRAM bandwidth level at or above which the regime is "high".
    #[serde(default = "PythiaConfig::default_high_bw_threshold")]
    pub high_bw_threshold: u8,

    /// Reward magnitudes in the low-bandwidth regime.
    #[serde(default = "RewardSet::low_bw")]
    pub rewards: RewardSet,

    /// Reward magnitudes in the high-bandwidth regime.
    #[serde(default = "RewardSet::high_bw")]
    pub rewards_hbw: RewardSet,

    /// Q-value pooling across feature tables.
    #[serde(default)]
    pub pooling: QPooling,

    /// Tile-coded feature tables.
    #[serde(default = "PythiaConfig::default_features")]
    pub features: Vec<PythiaFeatureConfig>,
}

impl PythiaConfig {
    fn default_alpha() -> f32 {
        defaults::PYTHIA_ALPHA
    }
    fn default_gamma() -> f32 {
        defaults::PYTHIA_GAMMA
    }
    fn default_epsilon() -> f32 {
        defaults::PYTHIA_EPSILON
    }
    fn default_seed() -> u64 {
        defaults::PYTHIA_SEED
    }
    fn default_actions() -> Vec<i32> {
        vec![1, 3, 4, 5, 10, 11, 12, 22, 23, 30, 32, -1, -3, -6, 0]
    }
    fn default_st_size() -> usize {
        defaults::PYTHIA_ST_SIZE
    }
    fn default_pt_size() -> usize {
        defaults::PYTHIA_PT_SIZE
    }
    fn default_max_history() -> usize {
        defaults::PYTHIA_MAX_HISTORY
    }
    fn default_action_tracker_size() -> usize {
        defaults::PYTHIA_ACTION_TRACKER_SIZE
    }
    const fn default_true() -> bool {
        true
    }
    fn default_degree_thresholds() -> Vec<i32> {
        vec![1, 3, 8]
    }
    fn default_dyn_degrees() -> Vec<u32> {
        vec![1, 2, 4, 6]
    }
    fn default_high_bw_threshold() -> u8 {
        defaults::PYTHIA_HIGH_BW_THRESHOLD
    }
    fn default_features() -> Vec<PythiaFeatureConfig> {
        vec![
            PythiaFeatureConfig {
                feature: PythiaFeature::Pc,
                num_tilings: defaults::PYTHIA_NUM_TILINGS,
                num_tiles: 12,
                hash: HashKind::Knuth,
                enable_tiling_offset: true,
            },
            PythiaFeatureConfig {
                feature: PythiaFeature::PcDelta,
                num_tilings: defaults::PYTHIA_NUM_TILINGS,
                num_tiles: 128,
                hash: HashKind::Knuth,
                enable_tiling_offset: true,
            },
        ]
    }

    /// Checks the action space, degree mapping, and feature tables.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.actions.is_empty() {
            return Err(ConfigError::EmptyActionList);
        }
        if self.actions.len() > crate::common::PAGE_BLOCKS as usize {
            return Err(ConfigError::TooManyActions {
                count: self.actions.len(),
            });
        }
        if self.degree_thresholds.len() + 1 != self.dyn_degrees.len() {
            return Err(ConfigError::DegreeShape {
                thresholds: self.degree_thresholds.len(),
                degrees: self.dyn_degrees.len(),
            });
        }
        if self.degree_thresholds.windows(2).any(|w| w[0] >= w[1]) {
            return Err(ConfigError::ThresholdsNotAscending);
        }
        if self.features.is_empty() {
            return Err(ConfigError::NoFeatures);
        }
        if self
            .features
            .iter()
            .any(|f| f.num_tilings == 0 || f.num_tiles == 0)
        {
            return Err(ConfigError::ZeroSize {
                field: "pythia feature tiling",
            });
        }
        Ok(())
    }
}

impl Default for PythiaConfig {
    fn default() -> Self {
        Self {
            alpha: defaults::PYTHIA_ALPHA,
            gamma: defaults::PYTHIA_GAMMA,
            epsilon: defaults::PYTHIA_EPSILON,
            seed: defaults::PYTHIA_SEED,
            actions: Self::default_actions(),
            st_size: defaults::PYTHIA_ST_SIZE,
            pt_size: defaults::PYTHIA_PT_SIZE,
            max_history: defaults::PYTHIA_MAX_HISTORY,
            action_tracker_size: defaults::PYTHIA_ACTION_TRACKER_SIZE,
            enable_dyn_degree: true,
            degree_thresholds: Self::default_degree_thresholds(),
            dyn_degrees: Self::default_dyn_degrees(),
            enable_reward_out_of_bounds: true,
            enable_reward_tracker_hit: false,
            enable_hbw_reward: true,
            enable_dyn_action_fallback: true,
            high_bw_threshold: defaults::PYTHIA_HIGH_BW_THRESHOLD,
            rewards: RewardSet::low_bw(),
            rewards_hbw: RewardSet::high_bw(),
            pooling: QPooling::default(),
            features: Self::default_features(),
        }
    }
}

/// Configuration shape errors detected before an engine is built.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The action list is empty.
    #[error("action list must not be empty")]
    EmptyActionList,

    /// The action list exceeds the per-page line count.
    #[error("action list holds {count} entries; at most one per page line is supported")]
    TooManyActions {
        /// Number of configured actions.
        count: usize,
    },

    /// Degree list and threshold list lengths disagree.
    #[error("degree list ({degrees}) must be one longer than the threshold list ({thresholds})")]
    DegreeShape {
        /// Number of configured thresholds.
        thresholds: usize,
        /// Number of configured degrees.
        degrees: usize,
    },

    /// Thresholds are not strictly ascending.
    #[error("confidence thresholds must be strictly ascending")]
    ThresholdsNotAscending,

    /// A ring or hashed table size is not a power of two.
    #[error("{table} size {size} must be a power of two")]
    NotPowerOfTwo {
        /// Which table the size belongs to.
        table: &'static str,
        /// The offending size.
        size: usize,
    },

    /// A table or degree was configured as zero.
    #[error("{field} must be non-zero")]
    ZeroSize {
        /// Which field was zero.
        field: &'static str,
    },

    /// A set-associative table size is not divisible by its associativity.
    #[error("table size {size} is not divisible by associativity {assoc}")]
    BadAssociativity {
        /// Total entries.
        size: usize,
        /// Ways per set.
        assoc: usize,
    },

    /// The spatial region does not fit the pattern bitmap.
    #[error("region size 2^{log2} does not fit a 64-entry pattern bitmap")]
    BadRegionSize {
        /// log2 of the configured region size.
        log2: u32,
    },

    /// No feature tables configured.
    #[error("at least one feature table must be configured")]
    NoFeatures,

    /// Perceptron thresholds are inverted.
    #[error("low threshold {lo} must not exceed high threshold {hi}")]
    ThresholdOrder {
        /// Reject/LLC boundary.
        lo: i32,
        /// LLC/L2 boundary.
        hi: i32,
    },
}
