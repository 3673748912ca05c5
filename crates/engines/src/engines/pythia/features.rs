//! Tile-coded per-feature Q-tables.
//!
//! Each configured feature owns `num_tilings` independent tilings of
//! `num_tiles` tiles, with one Q-value per action in every tile. A state
//! activates one tile per tiling: the feature's attributes are folded into
//! a 32-bit word, XORed with a per-tiling constant to decorrelate the
//! tilings, hashed, and reduced modulo the tile count. The feature's
//! Q-value is the sum over its tilings; pooling across features happens in
//! the learning engine.

use crate::common::{folded_xor, hash, sign_magnitude};
use crate::config::{PythiaFeature, PythiaFeatureConfig};

use super::state::State;

/// Per-tiling XOR constants disambiguating otherwise-identical tilings.
const TILING_OFFSETS: [u32; 32] = [
    0xaca081b9, 0x666a1c67, 0xc11d6a53, 0x8e5d97c1, 0x0d1cad54, 0x874f71cb, 0x20d2fa13, 0x73f7c4a7,
    0x0b701f6c, 0x8388d86d, 0xf72ac9f2, 0xbab16d82, 0x524ac258, 0xb5900302, 0xb48ccc72, 0x632f05bf,
    0xe7111073, 0xeb602af4, 0xf3f29ebb, 0x2a6184f2, 0x461da5da, 0x6693471d, 0x62fd0138, 0xc484efb3,
    0x81c9eeeb, 0x860f3766, 0x334faf86, 0x5e81e881, 0x14bc2195, 0xf47671a8, 0x75414279, 0x357bc5e0,
];

/// One feature's tile-coded Q-table.
#[derive(Debug)]
pub(super) struct FeatureKnowledge {
    cfg: PythiaFeatureConfig,
    alpha: f32,
    gamma: f32,
    /// `[tiling][tile][action]`, optimistically initialised to `1/(1−γ)`.
    qtable: Vec<Vec<Vec<f32>>>,
}

impl FeatureKnowledge {
    pub fn new(cfg: PythiaFeatureConfig, alpha: f32, gamma: f32, num_actions: usize) -> Self {
        debug_assert!(gamma < 1.0);
        debug_assert!(cfg.num_tilings as usize <= TILING_OFFSETS.len());
        let init = 1.0 / (1.0 - gamma);
        let qtable = vec![
            vec![vec![init; num_actions]; cfg.num_tiles as usize];
            cfg.num_tilings as usize
        ];
        Self {
            cfg,
            alpha,
            gamma,
            qtable,
        }
    }

    /// Projects the state attributes this feature keys on into one word.
    fn raw_index(&self, state: &State) -> u32 {
        let pc = state.pc;
        let offset = u64::from(state.offset);
        let sig_delta = u64::from(sign_magnitude(state.delta, 7));

        match self.cfg.feature {
            PythiaFeature::Pc => folded_xor(pc, 2),
            PythiaFeature::Offset => state.offset,
            PythiaFeature::Delta => sig_delta as u32,
            PythiaFeature::Address => folded_xor(state.address, 2),
            PythiaFeature::Page => folded_xor(state.page, 2),
            PythiaFeature::PcOffset => folded_xor((pc << 6) + offset, 2),
            PythiaFeature::PcPage => folded_xor((pc << 16) ^ state.page, 2),
            PythiaFeature::PcDelta => folded_xor((pc << 7) + sig_delta, 2),
            PythiaFeature::PcOffsetDelta => {
                folded_xor((((pc << 6) + offset) << 7) + sig_delta, 2)
            }
            PythiaFeature::PcPath => state.local_pc_sig,
            PythiaFeature::DeltaPath => state.local_delta_sig,
            PythiaFeature::OffsetPath => state.local_offset_sig,
            PythiaFeature::PcPathOffset => {
                folded_xor((u64::from(state.local_pc_sig) << 6) + offset, 2)
            }
            PythiaFeature::PcPathDeltaPath => folded_xor(
                (u64::from(state.local_pc_sig) << 16) + u64::from(state.local_delta_sig),
                2,
            ),
        }
    }

    /// Active tile of `tiling` for `state`.
    fn tile_index(&self, tiling: usize, state: &State) -> usize {
        let mut raw = self.raw_index(state);
        if self.cfg.enable_tiling_offset {
            raw ^= TILING_OFFSETS[tiling];
        }
        (hash(self.cfg.hash, raw) % self.cfg.num_tiles) as usize
    }

    /// This feature's Q-value: the sum over its tilings.
    pub fn retrieve_q(&self, state: &State, action: usize) -> f32 {
        (0..self.qtable.len())
            .map(|tiling| self.qtable[tiling][self.tile_index(tiling, state)][action])
            .sum()
    }

    /// One SARSA step applied to every tiling's active tile.
    pub fn update_q(
        &mut self,
        state1: &State,
        action1: usize,
        reward: i32,
        state2: &State,
        action2: usize,
    ) {
        for tiling in 0..self.qtable.len() {
            let tile1 = self.tile_index(tiling, state1);
            let tile2 = self.tile_index(tiling, state2);
            let q_sa1 = self.qtable[tiling][tile1][action1];
            let q_sa2 = self.qtable[tiling][tile2][action2];
            let updated = q_sa1 + self.alpha * (reward as f32 + self.gamma * q_sa2 - q_sa1);
            self.qtable[tiling][tile1][action1] = updated;
        }
    }
}
