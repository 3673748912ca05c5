//! Fixed-width pattern bitmap.
//!
//! A 64-entry bitset used for per-page access footprints. The spatial engines
//! record which line offsets of a page (or region) were touched and replay the
//! pattern later; the learning engines use it to deduplicate predictions.
//! All operations are width-aware so the same type serves 2 KiB regions
//! (32 bits) and 4 KiB pages (64 bits).
//!
//! # Performance
//!
//! Counting and rotating compile down to the platform's popcount/rotate
//! instructions; nothing here allocates.

use std::fmt;

/// Maximum number of bits a [`Bitmap64`] can hold.
pub const BITMAP_MAX_SIZE: u32 = 64;

/// A fixed 64-entry bitset.
///
/// Bit `i` corresponds to line offset `i` within the owning page or region.
#[derive(Clone, Copy, Default, PartialEq, Eq, Debug)]
pub struct Bitmap64(pub u64);

impl Bitmap64 {
    /// Creates an empty bitmap.
    #[inline]
    pub const fn new() -> Self {
        Self(0)
    }

    /// Creates a bitmap from a raw 64-bit value.
    #[inline]
    pub const fn from_raw(bits: u64) -> Self {
        Self(bits)
    }

    /// Returns the raw bits, masked to the low `size` bits.
    #[inline]
    pub const fn value(self, size: u32) -> u64 {
        if size >= BITMAP_MAX_SIZE {
            self.0
        } else {
            self.0 & ((1 << size) - 1)
        }
    }

    /// Sets bit `index`.
    #[inline]
    pub fn set(&mut self, index: u32) {
        debug_assert!(index < BITMAP_MAX_SIZE);
        self.0 |= 1 << index;
    }

    /// Clears bit `index`.
    #[inline]
    pub fn clear(&mut self, index: u32) {
        debug_assert!(index < BITMAP_MAX_SIZE);
        self.0 &= !(1 << index);
    }

    /// Tests bit `index`.
    #[inline]
    pub const fn test(self, index: u32) -> bool {
        (self.0 >> index) & 1 != 0
    }

    /// Resets all bits.
    #[inline]
    pub fn reset(&mut self) {
        self.0 = 0;
    }

    /// Counts the bits set within the low `size` bits.
    #[inline]
    pub const fn count(self, size: u32) -> u32 {
        self.value(size).count_ones()
    }

    /// Counts positions within the low `size` bits where both maps agree.
    pub const fn count_same(self, other: Self, size: u32) -> u32 {
        let agree = !(self.0 ^ other.0);
        Self(agree).count(size)
    }

    /// Counts positions within the low `size` bits where the maps differ.
    pub const fn count_diff(self, other: Self, size: u32) -> u32 {
        Self(self.0 ^ other.0).count(size)
    }

    /// Bitwise OR of two maps.
    #[inline]
    pub const fn or(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// Bitwise AND of two maps.
    #[inline]
    pub const fn and(self, other: Self) -> Self {
        Self(self.0 & other.0)
    }

    /// Rotates the low `size` bits left by `amount`.
    pub const fn rotate_left(self, amount: u32, size: u32) -> Self {
        if size >= BITMAP_MAX_SIZE {
            return Self(self.0.rotate_left(amount));
        }
        let amount = amount % size;
        let bits = self.value(size);
        let rotated = (bits << amount) | (bits >> (size - amount));
        Self(rotated & ((1 << size) - 1))
    }

    /// Rotates the low `size` bits right by `amount`.
    pub const fn rotate_right(self, amount: u32, size: u32) -> Self {
        if size >= BITMAP_MAX_SIZE {
            return Self(self.0.rotate_right(amount));
        }
        let amount = amount % size;
        let bits = self.value(size);
        let rotated = (bits >> amount) | (bits << (size - amount));
        Self(rotated & ((1 << size) - 1))
    }

    /// Compresses the low `size` bits by ORing together `granularity`-bit
    /// chunks: result bit `i` is set when any bit of chunk `i` is set.
    pub fn compress(self, granularity: u32, size: u32) -> Self {
        debug_assert!(granularity > 0 && size % granularity == 0);
        let chunk_mask = if granularity >= BITMAP_MAX_SIZE {
            u64::MAX
        } else {
            (1 << granularity) - 1
        };
        let mut out = 0u64;
        let chunks = size / granularity;
        for chunk in 0..chunks {
            if (self.0 >> (chunk * granularity)) & chunk_mask != 0 {
                out |= 1 << chunk;
            }
        }
        Self(out)
    }

    /// Inverse of [`compress`](Self::compress): replicates each of the low
    /// `size / granularity` bits across a `granularity`-bit chunk.
    pub fn decompress(self, granularity: u32, size: u32) -> Self {
        debug_assert!(granularity > 0 && size % granularity == 0);
        let chunk_mask = if granularity >= BITMAP_MAX_SIZE {
            u64::MAX
        } else {
            (1 << granularity) - 1
        };
        let mut out = 0u64;
        let chunks = size / granularity;
        for chunk in 0..chunks {
            if (self.0 >> chunk) & 1 != 0 {
                out |= chunk_mask << (chunk * granularity);
            }
        }
        Self(out)
    }
}

impl fmt::Display for Bitmap64 {
    /// Renders the bitmap as a 64-character 0/1 string, bit 63 first.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:064b}", self.0)
    }
}
