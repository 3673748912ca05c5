//! Hashing and Delta Coding Tests.
//!
//! Verifies the folded-XOR compaction, the mixer catalogue, and the
//! sign-magnitude round trip the signature paths depend on.

use pfsim_core::common::{
    folded_xor, hash, sign_magnitude, sign_magnitude_decode, HashKind,
};
use proptest::prelude::*;

// ══════════════════════════════════════════════════════════
// 1. Folded XOR
// ══════════════════════════════════════════════════════════

/// Folding splits the word into equal parts and XORs them.
#[test]
fn folded_xor_two_folds() {
    assert_eq!(folded_xor(0xFFFF_0000_0000_FFFF, 2), 0xFFFF_FFFF);
    assert_eq!(folded_xor(0xAAAA_AAAA_AAAA_AAAA, 2), 0);
}

proptest! {
    /// A value already within the 32-bit target width folds to itself.
    #[test]
    fn folded_xor_identity_on_target_width(x: u32) {
        prop_assert_eq!(folded_xor(u64::from(x), 2), x);
    }
}

// ══════════════════════════════════════════════════════════
// 2. Sign-magnitude coding
// ══════════════════════════════════════════════════════════

/// The 7-bit wire form: negatives set bit 6 above the magnitude.
#[test]
fn sign_magnitude_encoding() {
    assert_eq!(sign_magnitude(5, 7), 5);
    assert_eq!(sign_magnitude(-5, 7), 5 | 0x40);
    assert_eq!(sign_magnitude(0, 7), 0);
}

proptest! {
    /// Encode/decode round-trips for every delta the field can hold.
    #[test]
    fn sign_magnitude_round_trip(d in -63i32..=63) {
        prop_assert_eq!(sign_magnitude_decode(sign_magnitude(d, 7), 7), d);
    }

    /// The encoding always fits the field width.
    #[test]
    fn sign_magnitude_fits_width(d in -63i32..=63) {
        prop_assert!(sign_magnitude(d, 7) < 128);
    }
}

// ══════════════════════════════════════════════════════════
// 3. Mixer catalogue
// ══════════════════════════════════════════════════════════

/// Each mixer is deterministic and the catalogue members disagree with the
/// identity on a sample input.
#[test]
fn mixers_are_deterministic_and_mix() {
    let kinds = [
        HashKind::Jenkins,
        HashKind::Knuth,
        HashKind::Murmur3,
        HashKind::Jenkins32,
        HashKind::Shift32,
        HashKind::ShiftMult32,
        HashKind::Wang6,
        HashKind::Wang5,
        HashKind::Wang4,
    ];
    let sample = 0x1234_5678;
    for kind in kinds {
        assert_eq!(hash(kind, sample), hash(kind, sample));
        assert_ne!(hash(kind, sample), sample, "{kind:?} failed to mix");
    }
    assert_eq!(hash(HashKind::Identity, sample), sample);
}

/// Nearby keys scatter under the default mixer.
#[test]
fn knuth_scatters_neighbours() {
    let a = hash(HashKind::Knuth, 1000) % 128;
    let b = hash(HashKind::Knuth, 1008) % 128;
    assert_ne!(a, b);
}
