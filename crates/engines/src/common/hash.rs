//! Hash catalogue, folded XOR, and sign-magnitude delta coding.
//!
//! The engines compact 64-bit program counters and addresses into table
//! indices in two steps: a folded XOR brings the value down to 32 bits, and
//! one of a small catalogue of bijective word mixers scrambles it. Which
//! mixer to use is a per-feature choice, so the catalogue is addressed
//! through [`HashKind`].

use serde::Deserialize;

/// Folds a 64-bit value into 32 bits by splitting it into `folds` equal
/// parts and XORing them together.
///
/// `folds` must be a power of two greater than one. A value that already
/// fits the target width is returned unchanged when `folds == 2`.
pub fn folded_xor(value: u64, folds: u32) -> u32 {
    debug_assert!(folds > 1 && folds.is_power_of_two());
    let bits_per_fold = 64 / folds;
    let mask = if folds == 2 {
        u64::from(u32::MAX)
    } else {
        (1 << bits_per_fold) - 1
    };
    let mut folded = 0;
    for fold in 0..folds {
        folded ^= (value >> (fold * bits_per_fold)) & mask;
    }
    folded as u32
}

/// Selects one of the catalogued word mixers.
///
/// Each variant is a full-width bijection on `u32`; they differ only in
/// mixing structure. Engines pick one per feature table so that distinct
/// features decorrelate even when fed the same raw value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum HashKind {
    /// No mixing; the key indexes the table directly.
    Identity,
    /// Robert Jenkins' 32-bit integer mix.
    Jenkins,
    /// Knuth's multiplicative method.
    #[default]
    Knuth,
    /// The murmur3 finalizer.
    Murmur3,
    /// Jenkins' add/shift/XOR round sequence.
    Jenkins32,
    /// Shift-XOR mix with a single multiply by 2057.
    Shift32,
    /// Shift-XOR mix with an odd-constant multiply.
    ShiftMult32,
    /// Thomas Wang's six-shift integer hash.
    Wang6,
    /// Thomas Wang's five-shift integer hash.
    Wang5,
    /// Thomas Wang's four-shift integer hash.
    Wang4,
}

/// Applies the selected mixer to `key`.
pub fn hash(kind: HashKind, key: u32) -> u32 {
    match kind {
        HashKind::Identity => key,
        HashKind::Jenkins => jenkins(key),
        HashKind::Knuth => knuth(key),
        HashKind::Murmur3 => murmur3(key),
        HashKind::Jenkins32 => jenkins32(key),
        HashKind::Shift32 => shift32(key),
        HashKind::ShiftMult32 => shift_mult32(key),
        HashKind::Wang6 => wang6(key),
        HashKind::Wang5 => wang5(key),
        HashKind::Wang4 => wang4(key),
    }
}

/// Mixes a 64-bit key down to a well-distributed 64-bit hash.
///
/// Jenkins mix followed by Knuth's multiplicative step; used where a full
/// 64-bit input (line address, page number) must index a table directly.
pub fn hash64(key: u64) -> u64 {
    let mut key = key;
    key = key.wrapping_add(key << 12);
    key ^= key >> 22;
    key = key.wrapping_add(key << 4);
    key ^= key >> 9;
    key = key.wrapping_add(key << 10);
    key ^= key >> 2;
    key = key.wrapping_add(key << 7);
    key ^= key >> 12;
    (key >> 3).wrapping_mul(2654435761)
}

fn jenkins(mut key: u32) -> u32 {
    key = key.wrapping_add(key << 12);
    key ^= key >> 22;
    key = key.wrapping_add(key << 4);
    key ^= key >> 9;
    key = key.wrapping_add(key << 10);
    key ^= key >> 2;
    key = key.wrapping_add(key << 7);
    key ^= key >> 12;
    key
}

fn knuth(key: u32) -> u32 {
    (key >> 3).wrapping_mul(2654435761)
}

fn murmur3(mut key: u32) -> u32 {
    key ^= key >> 16;
    key = key.wrapping_mul(0x85eb_ca6b);
    key ^= key >> 13;
    key = key.wrapping_mul(0xc2b2_ae35);
    key ^= key >> 16;
    key
}

fn jenkins32(mut key: u32) -> u32 {
    key = key.wrapping_add(0x7ed5_5d16).wrapping_add(key << 12);
    key = (key ^ 0xc761_c23c) ^ (key >> 19);
    key = key.wrapping_add(0x1656_67b1).wrapping_add(key << 5);
    key = key.wrapping_add(0xd3a2_646c) ^ (key << 9);
    key = key.wrapping_add(0xfd70_46c5).wrapping_add(key << 3);
    key = (key ^ 0xb55a_4f09) ^ (key >> 16);
    key
}

fn shift32(mut key: u32) -> u32 {
    key = (!key).wrapping_add(key << 15);
    key ^= key >> 12;
    key = key.wrapping_add(key << 2);
    key ^= key >> 4;
    key = key.wrapping_mul(2057);
    key ^= key >> 16;
    key
}

fn shift_mult32(mut key: u32) -> u32 {
    key = (key ^ 61) ^ (key >> 16);
    key = key.wrapping_add(key << 3);
    key ^= key >> 4;
    key = key.wrapping_mul(0x27d4_eb2d);
    key ^= key >> 15;
    key
}

fn wang6(mut key: u32) -> u32 {
    key = key.wrapping_add(!(key << 15));
    key ^= key >> 10;
    key = key.wrapping_add(key << 3);
    key ^= key >> 6;
    key = key.wrapping_add(!(key << 11));
    key ^= key >> 16;
    key
}

fn wang5(mut key: u32) -> u32 {
    key = key.wrapping_add(key << 10);
    key ^= key >> 6;
    key = key.wrapping_add(key << 3);
    key ^= key >> 11;
    key = key.wrapping_add(key << 15);
    key
}

fn wang4(mut key: u32) -> u32 {
    key = key.wrapping_add(key << 3);
    key ^= key >> 11;
    key = key.wrapping_add(key << 15);
    key ^= key >> 7;
    key
}

/// Encodes a signed delta into `bits`-bit sign-magnitude form.
///
/// Negative deltas set the top bit and carry the magnitude below it:
/// `|d| | (1 << (bits - 1))`. Magnitudes wider than `bits - 1` spill into
/// higher bits; the decode round-trips only for in-range deltas, which is
/// all the signature paths feed it.
#[inline]
pub fn sign_magnitude(delta: i32, bits: u32) -> u32 {
    if delta < 0 {
        delta.unsigned_abs() | (1 << (bits - 1))
    } else {
        delta as u32
    }
}

/// Decodes a `bits`-bit sign-magnitude value back into a signed delta.
#[inline]
pub fn sign_magnitude_decode(value: u32, bits: u32) -> i32 {
    let sign = 1 << (bits - 1);
    if value & sign != 0 {
        -((value & (sign - 1)) as i32)
    } else {
        value as i32
    }
}
