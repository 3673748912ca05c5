//! Pattern Bitmap Tests.
//!
//! Verifies the bitmap algebra the spatial engines rely on: OR is
//! commutative and associative, population counts are subadditive under OR,
//! and compression/rotation respect the configured width.

use pfsim_core::common::Bitmap64;
use proptest::prelude::*;

// ══════════════════════════════════════════════════════════
// 1. Basic set/test/count
// ══════════════════════════════════════════════════════════

/// Setting and testing individual bits round-trips.
#[test]
fn set_and_test() {
    let mut bmp = Bitmap64::new();
    assert!(!bmp.test(5));
    bmp.set(5);
    bmp.set(63);
    assert!(bmp.test(5));
    assert!(bmp.test(63));
    assert_eq!(bmp.count(64), 2);
    bmp.clear(5);
    assert!(!bmp.test(5));
    assert_eq!(bmp.count(64), 1);
}

/// `value(size)` masks away bits above the configured width.
#[test]
fn value_masks_to_width() {
    let bmp = Bitmap64::from_raw(u64::MAX);
    assert_eq!(bmp.value(32), 0xFFFF_FFFF);
    assert_eq!(bmp.count(32), 32);
    assert_eq!(bmp.value(64), u64::MAX);
}

// ══════════════════════════════════════════════════════════
// 2. Rotation
// ══════════════════════════════════════════════════════════

/// A 32-bit rotate left keeps bits inside the low 32 positions.
#[test]
fn rotate_left_width_32() {
    let mut bmp = Bitmap64::new();
    bmp.set(31);
    let rotated = bmp.rotate_left(1, 32);
    assert!(rotated.test(0));
    assert_eq!(rotated.count(64), 1);
}

/// Left and right rotation by the same amount are inverses.
#[test]
fn rotate_round_trip() {
    let bmp = Bitmap64::from_raw(0x0000_0000_dead_beef);
    let there = bmp.rotate_left(13, 32);
    let back = there.rotate_right(13, 32);
    assert_eq!(back.value(32), bmp.value(32));
}

// ══════════════════════════════════════════════════════════
// 3. Compression
// ══════════════════════════════════════════════════════════

/// Compression ORs each chunk down to one bit.
#[test]
fn compress_by_two() {
    // Bits 0 and 3 set: chunks (0,1) and (2,3) each contain one set bit.
    let bmp = Bitmap64::from_raw(0b1001);
    let compressed = bmp.compress(2, 64);
    assert!(compressed.test(0));
    assert!(compressed.test(1));
    assert_eq!(compressed.count(64), 2);
}

/// Decompression replicates each bit across its chunk.
#[test]
fn decompress_by_two() {
    let bmp = Bitmap64::from_raw(0b10);
    let expanded = bmp.decompress(2, 64);
    assert_eq!(expanded.value(64), 0b1100);
}

/// Compressing a decompressed map returns the original low bits.
#[test]
fn compress_inverts_decompress() {
    let bmp = Bitmap64::from_raw(0b1011_0101);
    let expanded = bmp.decompress(4, 64);
    let compressed = expanded.compress(4, 64);
    assert_eq!(compressed.value(16), bmp.value(16));
}

// ══════════════════════════════════════════════════════════
// 4. Algebraic properties
// ══════════════════════════════════════════════════════════

proptest! {
    /// OR is commutative.
    #[test]
    fn or_commutative(a: u64, b: u64) {
        let (a, b) = (Bitmap64::from_raw(a), Bitmap64::from_raw(b));
        prop_assert_eq!(a.or(b), b.or(a));
    }

    /// OR is associative.
    #[test]
    fn or_associative(a: u64, b: u64, c: u64) {
        let (a, b, c) = (Bitmap64::from_raw(a), Bitmap64::from_raw(b), Bitmap64::from_raw(c));
        prop_assert_eq!(a.or(b).or(c), a.or(b.or(c)));
    }

    /// Population count is subadditive under OR.
    #[test]
    fn count_subadditive(a: u64, b: u64) {
        let (a, b) = (Bitmap64::from_raw(a), Bitmap64::from_raw(b));
        prop_assert!(a.or(b).count(64) <= a.count(64) + b.count(64));
    }

    /// Agreement plus disagreement covers the whole width.
    #[test]
    fn same_plus_diff_is_width(a: u64, b: u64) {
        let (a, b) = (Bitmap64::from_raw(a), Bitmap64::from_raw(b));
        prop_assert_eq!(a.count_same(b, 64) + a.count_diff(b, 64), 64);
    }
}
