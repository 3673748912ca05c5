//! Pythia's observable state and tracking entries.
//!
//! A [`State`] is the feature tuple the learner conditions on: the trigger
//! PC and address, the page-local delta, three path signatures summarizing
//! the page's recent history, and the DRAM bandwidth level. Signature-table
//! entries maintain the per-page histories the signatures derive from;
//! prefetch-tracker entries carry a state/action pair until its reward is
//! known.

use std::collections::VecDeque;

use crate::common::{sign_magnitude, Bitmap64};

/// Widths and shifts of the path signatures.
const DELTA_SIG_BITS: u32 = 12;
const DELTA_SIG_SHIFT: u32 = 3;
const PC_SIG_SHIFT: u32 = 4;
const OFFSET_SIG_BITS: u32 = 24;
const OFFSET_SIG_SHIFT: u32 = 4;

/// How many trailing history values feed each signature.
const SIG_WINDOW: usize = 4;

/// The feature tuple observed at one access.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct State {
    /// Triggering program counter.
    pub pc: u64,
    /// Full byte address of the access.
    pub address: u64,
    /// Page number.
    pub page: u64,
    /// Line offset within the page.
    pub offset: u32,
    /// Most recent delta observed on the page (0 when none).
    pub delta: i32,
    /// Shift-XOR signature of the page's recent deltas.
    pub local_delta_sig: u32,
    /// Shift-XOR signature of the page's recent PCs.
    pub local_pc_sig: u32,
    /// Shift-XOR signature of the page's recent offsets.
    pub local_offset_sig: u32,
    /// Quantised DRAM bandwidth at observation time.
    pub bw_level: u8,
    /// Whether the bandwidth level is at or above the high threshold.
    pub is_high_bw: bool,
}

/// Reward categories, each with distinct magnitudes per bandwidth regime.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RewardKind {
    /// No reward assigned yet.
    #[default]
    Unassigned,
    /// Demand hit a prefetch that had already been filled.
    CorrectTimely,
    /// Demand hit a prefetch still in flight.
    CorrectUntimely,
    /// Prefetch evicted from the tracker without a demand hit.
    Incorrect,
    /// "No prefetch" decision that never saw a demand.
    NoPrefetch,
    /// Chosen offset fell outside the page.
    OutOfBounds,
    /// Re-chose an address already being tracked.
    TrackerHit,
}

/// A recently-chosen action and its repeat count on one page.
#[derive(Clone, Copy, Debug)]
pub(super) struct ActionTrack {
    pub action: i32,
    pub conf: i32,
}

/// Per-page history entry of the signature table.
#[derive(Clone, Debug)]
pub(super) struct StEntry {
    pub page: u64,
    pcs: VecDeque<u64>,
    offsets: VecDeque<u32>,
    deltas: VecDeque<i32>,
    /// Offsets already predicted on this page (deduplicates tracking).
    pub bmp_pred: Bitmap64,
    /// Recent actions on this page, with per-action repeat counters.
    action_tracker: VecDeque<ActionTrack>,
    pub total_prefetches: u32,
    max_history: usize,
    action_tracker_size: usize,
}

impl StEntry {
    pub fn new(
        page: u64,
        pc: u64,
        offset: u32,
        max_history: usize,
        action_tracker_size: usize,
    ) -> Self {
        let mut pcs = VecDeque::with_capacity(max_history);
        let mut offsets = VecDeque::with_capacity(max_history);
        pcs.push_back(pc);
        offsets.push_back(offset);
        Self {
            page,
            pcs,
            offsets,
            deltas: VecDeque::with_capacity(max_history),
            bmp_pred: Bitmap64::new(),
            action_tracker: VecDeque::new(),
            total_prefetches: 0,
            max_history,
            action_tracker_size,
        }
    }

    /// Folds one access into the page's history queues.
    pub fn update(&mut self, pc: u64, offset: u32) {
        if self.pcs.len() >= self.max_history {
            let _ = self.pcs.pop_front();
        }
        self.pcs.push_back(pc);

        if let Some(&last) = self.offsets.back() {
            let delta = offset as i32 - last as i32;
            if self.deltas.len() >= self.max_history {
                let _ = self.deltas.pop_front();
            }
            self.deltas.push_back(delta);
        }

        if self.offsets.len() >= self.max_history {
            let _ = self.offsets.pop_front();
        }
        self.offsets.push_back(offset);
    }

    /// Most recent delta, or 0 before the second access.
    pub fn last_delta(&self) -> i32 {
        self.deltas.back().copied().unwrap_or(0)
    }

    /// 12-bit signature over the last deltas, evolved SPP-style.
    pub fn delta_sig(&self) -> u32 {
        let start = self.deltas.len().saturating_sub(SIG_WINDOW);
        let mut sig = 0u32;
        for &delta in self.deltas.iter().skip(start) {
            let sig_delta = sign_magnitude(delta, 7);
            sig = ((sig << DELTA_SIG_SHIFT) ^ sig_delta) & ((1 << DELTA_SIG_BITS) - 1);
        }
        sig
    }

    /// 32-bit signature over the last PCs.
    pub fn pc_sig(&self) -> u32 {
        let start = self.pcs.len().saturating_sub(SIG_WINDOW);
        let mut sig = 0u32;
        for &pc in self.pcs.iter().skip(start) {
            sig = (sig << PC_SIG_SHIFT) ^ (pc as u32);
        }
        sig
    }

    /// 24-bit signature over the last offsets.
    pub fn offset_sig(&self) -> u32 {
        let start = self.offsets.len().saturating_sub(SIG_WINDOW);
        let mut sig = 0u32;
        for &offset in self.offsets.iter().skip(start) {
            sig = (sig << OFFSET_SIG_SHIFT) ^ offset;
        }
        sig & ((1 << OFFSET_SIG_BITS) - 1)
    }

    /// Notes a prediction on this page; first-time offsets also feed the
    /// action tracker that drives the dynamic degree.
    pub fn track_prefetch(&mut self, pred_offset: u32, action: i32) {
        if !self.bmp_pred.test(pred_offset) {
            self.bmp_pred.set(pred_offset);
            self.total_prefetches += 1;
            self.insert_action(action);
        }
    }

    fn insert_action(&mut self, action: i32) {
        if let Some(pos) = self.action_tracker.iter().position(|t| t.action == action) {
            let mut track = self.action_tracker[pos];
            track.conf += 1;
            let _ = self.action_tracker.remove(pos);
            self.action_tracker.push_back(track);
        } else {
            if self.action_tracker.len() >= self.action_tracker_size {
                let _ = self.action_tracker.pop_front();
            }
            self.action_tracker.push_back(ActionTrack { action, conf: 0 });
        }
    }

    /// Repeat count of `action` on this page, if recently chosen.
    pub fn action_confidence(&self, action: i32) -> Option<i32> {
        self.action_tracker
            .iter()
            .find(|t| t.action == action)
            .map(|t| t.conf)
    }
}

/// One outstanding prediction awaiting its reward.
#[derive(Clone, Debug)]
pub(super) struct PtEntry {
    /// Generated prefetch address, or the no-prefetch sentinel.
    pub address: u64,
    /// State the decision was made in.
    pub state: State,
    /// Index into the action list.
    pub action_index: usize,
    /// Set when the prefetched line lands in the cache.
    pub is_filled: bool,
    /// Assigned reward value.
    pub reward: i32,
    /// Assigned reward category.
    pub reward_kind: RewardKind,
    /// Whether a reward has been assigned (at most one per entry).
    pub has_reward: bool,
}

impl PtEntry {
    pub fn new(address: u64, state: State, action_index: usize) -> Self {
        Self {
            address,
            state,
            action_index,
            is_filled: false,
            reward: 0,
            reward_kind: RewardKind::Unassigned,
            has_reward: false,
        }
    }
}
