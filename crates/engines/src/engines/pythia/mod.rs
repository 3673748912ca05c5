//! Tile-coded feature-wise SARSA prefetcher.
//!
//! Treats prefetching as a contextual reinforcement-learning problem: the
//! *state* is a feature tuple drawn from the per-page signature table (PC,
//! offset, delta, path signatures, DRAM bandwidth level), the *action* is a
//! signed line delta from a fixed list (0 meaning "don't prefetch"), and
//! the *reward* arrives later, when the fate of the prefetch is known.
//!
//! Rewards are attributed through a FIFO prefetch tracker: a demand hit
//! rewards the entry (timely or not depending on whether the fill already
//! happened), out-of-page and duplicate predictions are penalised
//! immediately, and entries evicted without a demand are charged as
//! incorrect (or as "none" for no-prefetch decisions). Because SARSA needs
//! `(S, A, R, S', A')` and the successor pair is only known at the *next*
//! eviction, exactly one evicted entry is buffered in `last_evicted`.

mod features;
mod learn;
mod state;

pub use self::state::{RewardKind, State};

use std::collections::VecDeque;

use tracing::{info, trace};

use crate::common::{line_addr, page_addr, page_offset, PAGE_BLOCKS};
use crate::common::{LOG2_BLOCK_SIZE, LOG2_PAGE_SIZE};
use crate::config::{PythiaConfig, RewardSet};
use crate::host::{AccessType, CacheHost};
use crate::stats::PythiaStats;

use self::learn::LearningEngine;
use self::state::{PtEntry, StEntry};

use super::PrefetchEngine;

/// Tracker address for decisions that fetch nothing.
const NO_PREFETCH_ADDR: u64 = 0xdead_beef;

/// Pythia engine state.
#[derive(Debug)]
pub struct Pythia {
    cfg: PythiaConfig,
    /// Per-page history, FIFO.
    signature_table: VecDeque<StEntry>,
    brain: LearningEngine,
    /// Outstanding decisions awaiting reward, FIFO.
    tracker: VecDeque<PtEntry>,
    /// The single buffered eviction SARSA trains against.
    last_evicted: Option<PtEntry>,
    /// Bandwidth level sampled at the current access.
    bw_level: u8,
    stats: PythiaStats,
}

impl Pythia {
    /// Creates a Pythia engine from its configuration.
    pub fn new(cfg: PythiaConfig) -> Self {
        let brain = LearningEngine::new(&cfg);
        let mut stats = PythiaStats::default();
        stats.predict.action_dist = vec![0; cfg.actions.len()];
        Self {
            cfg,
            signature_table: VecDeque::new(),
            brain,
            tracker: VecDeque::new(),
            last_evicted: None,
            bw_level: 0,
            stats,
        }
    }

    /// Returns the engine's counters.
    pub fn stats(&self) -> &PythiaStats {
        &self.stats
    }

    /// Pooled Q-value of `(state, action)` — exposed for instrumentation.
    pub fn q_value(&self, state: &State, action_index: usize) -> f32 {
        self.brain.consult_q(state, action_index)
    }

    fn is_high_bw(&self) -> bool {
        self.bw_level >= self.cfg.high_bw_threshold
    }

    fn reward_set(&self) -> &RewardSet {
        if self.cfg.enable_hbw_reward && self.is_high_bw() {
            &self.cfg.rewards_hbw
        } else {
            &self.cfg.rewards
        }
    }

    fn compute_reward(&self, kind: RewardKind) -> i32 {
        let set = self.reward_set();
        match kind {
            RewardKind::CorrectTimely => set.correct_timely,
            RewardKind::CorrectUntimely => set.correct_untimely,
            RewardKind::Incorrect => set.incorrect,
            RewardKind::NoPrefetch => set.none,
            RewardKind::OutOfBounds => set.out_of_bounds,
            RewardKind::TrackerHit => set.tracker_hit,
            RewardKind::Unassigned => 0,
        }
    }

    fn count_reward(&mut self, kind: RewardKind) {
        match kind {
            RewardKind::CorrectTimely => self.stats.reward.correct_timely += 1,
            RewardKind::CorrectUntimely => self.stats.reward.correct_untimely += 1,
            RewardKind::Incorrect => self.stats.reward.incorrect += 1,
            RewardKind::NoPrefetch => self.stats.reward.none += 1,
            RewardKind::OutOfBounds => self.stats.reward.out_of_bounds += 1,
            RewardKind::TrackerHit => self.stats.reward.tracker_hit += 1,
            RewardKind::Unassigned => {}
        }
    }

    /// Assigns a reward to a tracker entry; at most one per entry.
    fn assign_reward(entry: &mut PtEntry, kind: RewardKind, reward: i32) {
        debug_assert!(!entry.has_reward);
        entry.reward = reward;
        entry.reward_kind = kind;
        entry.has_reward = true;
    }

    /// Rewards the oldest tracked prefetch matching a demanded line.
    fn reward_demand(&mut self, address: u64) {
        let line = line_addr(address);
        let found = self.tracker.iter_mut().find(|entry| {
            entry.address != NO_PREFETCH_ADDR && line_addr(entry.address) == line
        });
        let Some(entry) = found else {
            return;
        };
        if entry.has_reward {
            // A prefetch can see several demand reuses; only the first counts.
            return;
        }
        let kind = if entry.is_filled {
            RewardKind::CorrectTimely
        } else {
            RewardKind::CorrectUntimely
        };
        let set = if self.cfg.enable_hbw_reward && self.bw_level >= self.cfg.high_bw_threshold {
            &self.cfg.rewards_hbw
        } else {
            &self.cfg.rewards
        };
        let reward = match kind {
            RewardKind::CorrectTimely => set.correct_timely,
            _ => set.correct_untimely,
        };
        Self::assign_reward(entry, kind, reward);
        self.count_reward(kind);
    }

    /// Looks up (and refreshes) the page's signature-table entry.
    fn update_local_state(&mut self, pc: u64, page: u64, offset: u32) -> usize {
        self.stats.st.lookup += 1;
        if let Some(pos) = self.signature_table.iter().position(|e| e.page == page) {
            self.stats.st.hit += 1;
            if let Some(mut entry) = self.signature_table.remove(pos) {
                entry.update(pc, offset);
                self.signature_table.push_back(entry);
            }
            return self.signature_table.len() - 1;
        }

        if self.signature_table.len() >= self.cfg.st_size {
            self.stats.st.evict += 1;
            let _ = self.signature_table.pop_front();
        }
        self.stats.st.insert += 1;
        self.signature_table.push_back(StEntry::new(
            page,
            pc,
            offset,
            self.cfg.max_history,
            self.cfg.action_tracker_size,
        ));
        self.signature_table.len() - 1
    }

    /// Inserts a decision into the tracker, returning whether the address
    /// is new. An eviction made on the way triggers the buffered SARSA
    /// step.
    fn track(&mut self, address: u64, state: State, action_index: usize) -> bool {
        self.stats.track.called += 1;
        let line = line_addr(address);
        let already_tracked = self.tracker.iter().any(|entry| {
            entry.address == address
                || (entry.address != NO_PREFETCH_ADDR
                    && address != NO_PREFETCH_ADDR
                    && line_addr(entry.address) == line)
        });

        if already_tracked && address != NO_PREFETCH_ADDR {
            self.stats.track.same_address += 1;
            return false;
        }

        if self.tracker.len() >= self.cfg.pt_size {
            self.stats.track.evict += 1;
            if let Some(evicted) = self.tracker.pop_front() {
                if let Some(mut last) = self.last_evicted.take() {
                    if !last.has_reward {
                        // Evicted without a demand: incorrect, or "none"
                        // for a decision that fetched nothing.
                        let kind = if last.address == NO_PREFETCH_ADDR {
                            RewardKind::NoPrefetch
                        } else {
                            RewardKind::Incorrect
                        };
                        let reward = self.compute_reward(kind);
                        Self::assign_reward(&mut last, kind, reward);
                        self.count_reward(kind);
                    }
                    self.train(&last, &evicted);
                }
                self.last_evicted = Some(evicted);
            }
        }

        self.tracker.push_back(PtEntry::new(address, state, action_index));
        debug_assert!(self.tracker.len() <= self.cfg.pt_size);
        !already_tracked
    }

    /// One SARSA step: the buffered eviction against the fresh one.
    fn train(&mut self, last: &PtEntry, current: &PtEntry) {
        debug_assert!(last.has_reward);
        self.stats.train_called += 1;
        trace!(
            reward = last.reward,
            action = last.action_index,
            "SARSA step"
        );
        self.brain.learn(
            &last.state,
            last.action_index,
            last.reward,
            &current.state,
            current.action_index,
        );
    }

    /// Degree for this prediction, from the page's action repeat count.
    fn dyn_degree(&self, page: u64, action: i32) -> u32 {
        let Some(entry) = self.signature_table.iter().find(|e| e.page == page) else {
            return 1;
        };
        let Some(conf) = entry.action_confidence(action) else {
            return 1;
        };
        for (threshold, &degree) in self.cfg.degree_thresholds.iter().zip(&self.cfg.dyn_degrees) {
            if conf <= *threshold {
                return degree;
            }
        }
        *self.cfg.dyn_degrees.last().unwrap_or(&1)
    }

    /// Notes a prediction in the page's signature-table entry.
    fn track_in_st(&mut self, page: u64, pred_offset: u32, action: i32) {
        if let Some(entry) = self.signature_table.iter_mut().find(|e| e.page == page) {
            entry.track_prefetch(pred_offset, action);
        }
    }

    /// Strided multiples of the action for degrees above 1.
    fn gen_multi_degree(
        &mut self,
        page: u64,
        offset: u32,
        action: i32,
        degree: u32,
        pref_addr: &mut Vec<u64>,
    ) {
        for step in 2..=degree {
            let predicted = offset as i32 + step as i32 * action;
            if (0..PAGE_BLOCKS as i32).contains(&predicted) {
                let addr = (page << LOG2_PAGE_SIZE) + ((predicted as u64) << LOG2_BLOCK_SIZE);
                pref_addr.push(addr);
                self.stats.predict.multi_degree += 1;
            }
        }
    }

    /// The decision path: choose an action, size the degree, generate the
    /// addresses, and track the decision for delayed reward.
    fn predict(&mut self, page: u64, offset: u32, state: State, pref_addr: &mut Vec<u64>) {
        self.stats.predict.called += 1;

        let action_index = self.brain.choose_action(&state);
        debug_assert!(action_index < self.cfg.actions.len());
        self.stats.predict.action_dist[action_index] += 1;
        let action = self.cfg.actions[action_index];

        let degree = if self.cfg.enable_dyn_degree {
            self.dyn_degree(page, action)
        } else {
            1
        };

        if action == 0 {
            // The agent chose silence; track it so silence can be rewarded.
            let _ = self.track(NO_PREFETCH_ADDR, state, action_index);
            return;
        }

        let predicted = offset as i32 + action;
        if !(0..PAGE_BLOCKS as i32).contains(&predicted) {
            self.stats.predict.out_of_bounds += 1;
            if self.cfg.enable_reward_out_of_bounds {
                let reward = self.compute_reward(RewardKind::OutOfBounds);
                let _ = self.track(NO_PREFETCH_ADDR, state, action_index);
                if let Some(entry) = self.tracker.back_mut() {
                    if !entry.has_reward {
                        Self::assign_reward(entry, RewardKind::OutOfBounds, reward);
                    }
                }
                self.count_reward(RewardKind::OutOfBounds);
            }
            return;
        }

        let addr = (page << LOG2_PAGE_SIZE) + ((predicted as u64) << LOG2_BLOCK_SIZE);
        if self.track(addr, state, action_index) {
            pref_addr.push(addr);
            self.track_in_st(page, predicted as u32, action);
            if degree > 1 {
                self.gen_multi_degree(page, offset, action, degree, pref_addr);
            }
        } else if self.cfg.enable_reward_tracker_hit {
            let reward = self.compute_reward(RewardKind::TrackerHit);
            let _ = self.track(NO_PREFETCH_ADDR, state, action_index);
            if let Some(entry) = self.tracker.back_mut() {
                if !entry.has_reward {
                    Self::assign_reward(entry, RewardKind::TrackerHit, reward);
                }
            }
            self.count_reward(RewardKind::TrackerHit);
        }

        self.stats.predict.issued += pref_addr.len() as u64;
    }

    /// Marks a tracked prefetch as landed; rewards given later become
    /// "timely".
    fn register_fill(&mut self, address: u64) {
        let line = line_addr(address);
        if let Some(entry) = self.tracker.iter_mut().find(|entry| {
            entry.address != NO_PREFETCH_ADDR && line_addr(entry.address) == line
        }) {
            entry.is_filled = true;
            self.stats.fill_matched += 1;
        }
    }
}

impl PrefetchEngine for Pythia {
    fn initialize(&mut self) {
        info!(
            actions = self.cfg.actions.len(),
            st = self.cfg.st_size,
            pt = self.cfg.pt_size,
            features = self.cfg.features.len(),
            seed = self.cfg.seed,
            "Pythia engine configured"
        );
    }

    fn operate(
        &mut self,
        host: &mut dyn CacheHost,
        addr: u64,
        ip: u64,
        _cache_hit: bool,
        _useful_prefetch: bool,
        _access: AccessType,
        _metadata_in: u32,
    ) -> u32 {
        let page = page_addr(addr);
        let offset = page_offset(addr) as u32;
        self.bw_level = host.dram_bw();

        // Reward-on-demand precedes everything else this access changes.
        self.reward_demand(addr);

        let st_index = self.update_local_state(ip, page, offset);
        let entry = &self.signature_table[st_index];
        let state = State {
            pc: ip,
            address: addr,
            page,
            offset,
            delta: entry.last_delta(),
            local_delta_sig: entry.delta_sig(),
            local_pc_sig: entry.pc_sig(),
            local_offset_sig: entry.offset_sig(),
            bw_level: self.bw_level,
            is_high_bw: self.is_high_bw(),
        };

        let mut pref_addr = Vec::new();
        self.predict(page, offset, state, &mut pref_addr);

        for addr in pref_addr {
            let _ = host.prefetch_line(addr, true, 0);
        }

        0
    }

    fn fill(
        &mut self,
        _host: &mut dyn CacheHost,
        addr: u64,
        _set: usize,
        _way: usize,
        _was_prefetch: bool,
        _evicted_addr: u64,
        _metadata_in: u32,
    ) -> u32 {
        self.register_fill(addr);
        0
    }
}
