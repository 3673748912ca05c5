//! Instruction-pointer classifying prefetcher.
//!
//! Classifies each load IP into one of four classes and prefetches
//! accordingly:
//! - **Stream:** the recent access neighbourhood forms a dense ascending or
//!   descending run; prefetch a block of consecutive lines.
//! - **Constant stride:** the IP repeats one delta; prefetch multiples of it.
//! - **Complex stride:** the IP's delta history, compressed into a 12-bit
//!   signature, predicts the next delta; chase the signature graph.
//! - **Next line:** fallback single-line prefetch, gated by a speculative
//!   bit that tracks recent miss pressure (MPKC).
//!
//! One class wins per access, in the precedence order above. Prefetches
//! carry a metadata word encoding the stride, class, and speculative bit.

use tracing::info;

use crate::common::{line_addr, page_addr, sign_magnitude, PAGE_BLOCKS};
use crate::common::{LOG2_BLOCK_SIZE, LOG2_PAGE_SIZE};
use crate::config::IpcpConfig;
use crate::host::{AccessType, CacheHost};
use crate::stats::IpcpStats;

use super::PrefetchEngine;

/// Prefetch class carried in metadata bits `[11:8]`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u16)]
pub enum PrefetchClass {
    /// Dense ascending/descending run detected in the history buffer.
    Stream = 1,
    /// Repeating single delta.
    ConstantStride = 2,
    /// Signature-predicted delta chain.
    ComplexStride = 3,
    /// Next-line fallback.
    NextLine = 4,
}

/// Per-IP tracking entry.
#[derive(Clone, Copy, Default)]
struct IpTracker {
    /// Tag bits of the owning IP; a mismatch means a conflict.
    tag: u16,
    /// Last page this IP touched.
    last_page: u64,
    /// Last line offset within that page.
    last_offset: u64,
    /// Last confirmed stride (updated only when confidence drains to 0).
    last_stride: i64,
    /// Constant-stride confidence (2-bit saturating).
    conf: i32,
    /// Complex-stride signature (12 bits of delta history).
    signature: u16,
    /// Stream direction: `true` for ascending.
    str_dir: bool,
    /// Stream detected for this IP.
    str_valid: bool,
    /// Strong stream; once set, `str_valid` latches until re-evaluation.
    str_strength: bool,
    /// Entry holds live data for its tag.
    valid: bool,
}

/// Signature-indexed next-delta prediction entry.
#[derive(Clone, Copy, Default)]
struct DeltaPrediction {
    /// Predicted next delta.
    delta: i32,
    /// 2-bit saturating confidence.
    conf: i32,
}

/// IPCP engine state.
pub struct Ipcp {
    cfg: IpcpConfig,
    /// IP-indexed trackers (`2^index_bits` buckets).
    trackers: Vec<IpTracker>,
    /// Delta prediction table, indexed by signature.
    dpt: Vec<DeltaPrediction>,
    /// Global history buffer of recent line addresses, newest first.
    ghb: Vec<u64>,
    /// Cycle stamp of the last speculative-NL evaluation.
    prev_cycle: u64,
    /// Misses since the last evaluation.
    num_misses: u64,
    /// Misses per kilocycle measured at the last evaluation.
    mpkc: f64,
    /// Speculative next-line enable bit.
    spec_nl: bool,
    stats: IpcpStats,
}

impl std::fmt::Debug for Ipcp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ipcp")
            .field("spec_nl", &self.spec_nl)
            .field("mpkc", &self.mpkc)
            .finish_non_exhaustive()
    }
}

impl Ipcp {
    /// Creates an IPCP engine from its configuration.
    pub fn new(cfg: IpcpConfig) -> Self {
        let trackers = vec![IpTracker::default(); 1 << cfg.index_bits];
        let dpt = vec![DeltaPrediction::default(); cfg.dpt_entries];
        let ghb = vec![0; cfg.ghb_entries];
        Self {
            cfg,
            trackers,
            dpt,
            ghb,
            prev_cycle: 0,
            num_misses: 0,
            mpkc: 0.0,
            spec_nl: false,
            stats: IpcpStats::default(),
        }
    }

    /// Returns the engine's counters.
    pub fn stats(&self) -> &IpcpStats {
        &self.stats
    }

    /// Current speculative next-line bit (exposed for instrumentation).
    pub fn spec_nl(&self) -> bool {
        self.spec_nl
    }

    /// Folds a new delta into a 12-bit signature.
    fn update_sig(old_sig: u16, delta: i64) -> u16 {
        let sig_delta = sign_magnitude(delta as i32, 7);
        ((u32::from(old_sig) << 1) ^ sig_delta) as u16 & 0xFFF
    }

    /// Encodes the metadata word: bits `[7:0]` sign-magnitude stride,
    /// `[11:8]` class, `[12]` speculative-NL bit.
    fn encode_metadata(stride: i32, class: PrefetchClass, spec_nl: bool) -> u32 {
        let mut metadata = sign_magnitude(stride, 7);
        metadata |= u32::from(class as u16) << 8;
        metadata |= u32::from(spec_nl) << 12;
        metadata
    }

    /// 2-bit saturating confidence shared by the CS and CPLX classes:
    /// increment on a stride match, decrement otherwise, never wrapping.
    fn update_conf(stride: i64, pred_stride: i64, conf: i32) -> i32 {
        if stride == pred_stride {
            (conf + 1).min(3)
        } else {
            (conf - 1).max(0)
        }
    }

    /// Scans the history buffer around `cl_addr` for a dense run and updates
    /// the tracker's stream direction/validity/strength.
    fn check_for_stream(&mut self, index: usize, cl_addr: u64) {
        let entries = self.cfg.ghb_entries;
        let mut pos_count = 0;
        let mut neg_count = 0;

        let mut check_addr = cl_addr;
        for _ in 0..entries {
            check_addr = check_addr.wrapping_sub(1);
            if self.ghb.contains(&check_addr) {
                pos_count += 1;
            }
        }
        check_addr = cl_addr;
        for _ in 0..entries {
            check_addr = check_addr.wrapping_add(1);
            if self.ghb.contains(&check_addr) {
                neg_count += 1;
            }
        }

        let tracker = &mut self.trackers[index];
        let count = if pos_count > neg_count {
            tracker.str_dir = true;
            pos_count
        } else {
            tracker.str_dir = false;
            neg_count
        };

        if count > entries / 2 {
            tracker.str_valid = true;
            if count >= (entries * 3) / 4 {
                tracker.str_strength = true;
            }
        } else if !tracker.str_strength {
            // A weak stream loses validity as soon as the run breaks.
            tracker.str_valid = false;
        }
    }

    /// Records a novel line address at the head of the history buffer.
    fn update_ghb(&mut self, cl_addr: u64) {
        if !self.ghb.contains(&cl_addr) {
            for i in (1..self.ghb.len()).rev() {
                self.ghb[i] = self.ghb[i - 1];
            }
            self.ghb[0] = cl_addr;
        }
    }
}

impl PrefetchEngine for Ipcp {
    fn initialize(&mut self) {
        info!(
            trackers = self.trackers.len(),
            ghb = self.cfg.ghb_entries,
            dpt = self.cfg.dpt_entries,
            degree = self.cfg.degree,
            "IPCP engine configured"
        );
    }

    fn operate(
        &mut self,
        host: &mut dyn CacheHost,
        addr: u64,
        ip: u64,
        cache_hit: bool,
        _useful_prefetch: bool,
        _access: AccessType,
        _metadata_in: u32,
    ) -> u32 {
        let curr_page = page_addr(addr);
        let cl_addr = line_addr(addr);
        let cl_offset = cl_addr & (PAGE_BLOCKS - 1);
        let ip_tag = ((ip >> self.cfg.index_bits) & ((1 << self.cfg.tag_bits) - 1)) as u16;
        let mut degree = self.cfg.degree;
        let mut num_prefs = 0usize;

        if !cache_hit {
            self.num_misses += 1;
            self.stats.misses_observed += 1;
        }

        // Re-evaluate the speculative next-line bit on miss pressure.
        let ct = host.current_cycle();
        if self.num_misses == self.cfg.miss_interval {
            self.mpkc = (self.num_misses as f64 / (ct - self.prev_cycle) as f64) * 1000.0;
            self.prev_cycle = ct;
            self.spec_nl = self.mpkc <= self.cfg.spec_nl_threshold;
            self.num_misses = 0;
            self.stats.spec_nl_flips += 1;
        }

        let index = (ip & ((1 << self.cfg.index_bits) - 1)) as usize;
        if self.trackers[index].tag != ip_tag {
            let tracker = &mut self.trackers[index];
            if tracker.valid {
                // Conflict: let the incumbent age out before replacing it.
                tracker.valid = false;
            } else {
                *tracker = IpTracker {
                    tag: ip_tag,
                    last_page: curr_page,
                    last_offset: cl_offset,
                    valid: true,
                    ..IpTracker::default()
                };
            }

            // A fresh or conflicting IP still earns one next-line prefetch.
            let pf_address = (cl_addr + 1) << LOG2_BLOCK_SIZE;
            let metadata = Self::encode_metadata(1, PrefetchClass::NextLine, self.spec_nl);
            if host.prefetch_line(pf_address, true, metadata) {
                self.stats.next_line_issued += 1;
            }
            return 0;
        }
        // Same IP seen again: refresh the valid bit.
        self.trackers[index].valid = true;

        let stride = {
            let tracker = &self.trackers[index];
            let mut stride = cl_offset as i64 - tracker.last_offset as i64;
            if stride == 0 {
                // Same line twice in a row carries no information.
                return 0;
            }
            // Correct the delta when the trigger crossed a page boundary.
            if curr_page != tracker.last_page {
                if stride < 0 {
                    stride += PAGE_BLOCKS as i64;
                } else {
                    stride -= PAGE_BLOCKS as i64;
                }
            }
            stride
        };

        let tracker = &mut self.trackers[index];
        tracker.conf = Self::update_conf(stride, tracker.last_stride, tracker.conf);
        if tracker.conf == 0 {
            tracker.last_stride = stride;
        }

        let dpt_mask = self.dpt.len() - 1;
        let last_signature = tracker.signature as usize & dpt_mask;
        let dpt_entry = &mut self.dpt[last_signature];
        dpt_entry.conf = Self::update_conf(stride, i64::from(dpt_entry.delta), dpt_entry.conf);
        if dpt_entry.conf == 0 {
            dpt_entry.delta = stride as i32;
        }

        let mut signature = Self::update_sig(last_signature as u16, stride);
        self.trackers[index].signature = signature;

        self.check_for_stream(index, cl_addr);

        let tracker = self.trackers[index];
        if tracker.str_valid {
            // Streams prefetch with twice the usual degree.
            degree *= 2;
            for i in 0..degree {
                let (pf_address, metadata) = if tracker.str_dir {
                    (
                        (cl_addr + i as u64 + 1) << LOG2_BLOCK_SIZE,
                        Self::encode_metadata(1, PrefetchClass::Stream, self.spec_nl),
                    )
                } else {
                    (
                        (cl_addr.wrapping_sub(i as u64 + 1)) << LOG2_BLOCK_SIZE,
                        Self::encode_metadata(-1, PrefetchClass::Stream, self.spec_nl),
                    )
                };
                if (pf_address >> LOG2_PAGE_SIZE) != (addr >> LOG2_PAGE_SIZE) {
                    break;
                }
                if !host.prefetch_line(pf_address, true, metadata) {
                    break;
                }
                self.stats.stream_issued += 1;
                num_prefs += 1;
            }
        } else if tracker.conf > 1 && tracker.last_stride != 0 {
            for i in 0..degree {
                let pf_address = ((cl_addr as i64 + tracker.last_stride * (i as i64 + 1)) as u64)
                    << LOG2_BLOCK_SIZE;
                if (pf_address >> LOG2_PAGE_SIZE) != (addr >> LOG2_PAGE_SIZE) {
                    break;
                }
                let metadata = Self::encode_metadata(
                    tracker.last_stride as i32,
                    PrefetchClass::ConstantStride,
                    self.spec_nl,
                );
                if !host.prefetch_line(pf_address, true, metadata) {
                    break;
                }
                self.stats.const_stride_issued += 1;
                num_prefs += 1;
            }
        } else if self.dpt[signature as usize & dpt_mask].delta != 0 {
            // Chase the signature graph; each hop appends the predicted
            // delta and re-hashes the signature.
            let mut pref_offset = 0i64;
            for _ in 0..degree {
                let entry = self.dpt[signature as usize & dpt_mask];
                pref_offset += i64::from(entry.delta);
                let pf_address = ((cl_addr as i64 + pref_offset) as u64) << LOG2_BLOCK_SIZE;
                if (pf_address >> LOG2_PAGE_SIZE) != (addr >> LOG2_PAGE_SIZE) || entry.delta == 0 {
                    break;
                }
                // Complex-stride prefetches are not strided at L2; encode 0.
                let metadata = Self::encode_metadata(0, PrefetchClass::ComplexStride, self.spec_nl);
                if entry.conf > 0 {
                    if !host.prefetch_line(pf_address, true, metadata) {
                        break;
                    }
                    self.stats.complex_issued += 1;
                    num_prefs += 1;
                }
                signature = Self::update_sig(signature, i64::from(entry.delta));
            }
        }

        // Nothing issued: fall back to one speculative next-line prefetch.
        if num_prefs == 0 && self.spec_nl {
            let pf_address = (cl_addr + 1) << LOG2_BLOCK_SIZE;
            let metadata = Self::encode_metadata(1, PrefetchClass::NextLine, self.spec_nl);
            if host.prefetch_line(pf_address, true, metadata) {
                self.stats.next_line_issued += 1;
            }
        }

        let tracker = &mut self.trackers[index];
        tracker.last_offset = cl_offset;
        tracker.last_page = curr_page;

        self.update_ghb(cl_addr);

        0
    }

    fn fill(
        &mut self,
        _host: &mut dyn CacheHost,
        _addr: u64,
        _set: usize,
        _way: usize,
        _was_prefetch: bool,
        _evicted_addr: u64,
        _metadata_in: u32,
    ) -> u32 {
        0
    }
}
