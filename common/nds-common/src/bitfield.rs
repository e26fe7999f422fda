//! Fixed-size bit vector used to track memory invalidations.
//!
//! Unlike a general purpose bitset, construction from a bit range and iteration over set bits are
//! both word-at-a-time, and the backing words are exposed so callers can splice whole 32-bit or
//! 64-bit chunks between fields of different sizes.

use bincode::{Decode, Encode};
use std::ops::{BitAnd, BitAndAssign, BitOr, BitOrAssign};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Encode, Decode)]
pub struct BitField<const WORDS: usize>([u64; WORDS]);

impl<const WORDS: usize> BitField<WORDS> {
    pub const BITS: usize = WORDS * 64;

    #[must_use]
    pub const fn new() -> Self {
        Self([0; WORDS])
    }

    /// Create a field with bits `start..start + len` set.
    ///
    /// # Panics
    ///
    /// Panics if the range extends past the end of the field.
    #[must_use]
    pub fn from_range(start: usize, len: usize) -> Self {
        let mut field = Self::new();
        if len == 0 {
            return field;
        }

        let end = start + len;
        assert!(end <= Self::BITS, "bit range {start}..{end} out of bounds for {} bits", Self::BITS);

        let start_word = start / 64;
        let end_word = (end - 1) / 64;

        if start_word == end_word {
            // len <= 64 here; build the mask without overflowing the shift when len == 64
            let mask = if len == 64 { !0 } else { ((1_u64 << len) - 1) << (start % 64) };
            field.0[start_word] = mask;
            return field;
        }

        field.0[start_word] = !0 << (start % 64);
        field.0[start_word + 1..end_word].fill(!0);
        field.0[end_word] = match end % 64 {
            0 => !0,
            rem => (1 << rem) - 1,
        };

        field
    }

    #[inline]
    #[must_use]
    pub fn get(&self, i: usize) -> bool {
        self.0[i / 64] & (1 << (i % 64)) != 0
    }

    #[inline]
    pub fn set(&mut self, i: usize) {
        self.0[i / 64] |= 1 << (i % 64);
    }

    #[inline]
    pub fn clear(&mut self, i: usize) {
        self.0[i / 64] &= !(1 << (i % 64));
    }

    #[inline]
    pub fn assign(&mut self, i: usize, value: bool) {
        if value {
            self.set(i);
        } else {
            self.clear(i);
        }
    }

    #[inline]
    pub fn clear_all(&mut self) {
        self.0.fill(0);
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.iter().all(|&word| word == 0)
    }

    #[must_use]
    pub fn count_ones(&self) -> u32 {
        self.0.iter().map(|word| word.count_ones()).sum()
    }

    /// Returns the current contents and clears the field.
    #[must_use]
    pub fn take(&mut self) -> Self {
        std::mem::take(self)
    }

    #[inline]
    #[must_use]
    pub fn words(&self) -> &[u64; WORDS] {
        &self.0
    }

    #[inline]
    pub fn words_mut(&mut self) -> &mut [u64; WORDS] {
        &mut self.0
    }

    /// Read the `i`th 32-bit chunk, i.e. bits `32 * i..32 * (i + 1)`.
    #[inline]
    #[must_use]
    pub fn chunk32(&self, i: usize) -> u32 {
        (self.0[i / 2] >> (32 * (i % 2))) as u32
    }

    /// OR `value` into the `i`th 32-bit chunk.
    #[inline]
    pub fn or_chunk32(&mut self, i: usize, value: u32) {
        self.0[i / 2] |= u64::from(value) << (32 * (i % 2));
    }

    #[must_use]
    pub fn iter_ones(&self) -> Ones<'_, WORDS> {
        Ones { field: self, word_idx: 0, remaining: self.0.first().copied().unwrap_or(0) }
    }
}

impl<const WORDS: usize> Default for BitField<WORDS> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const WORDS: usize> BitOrAssign<&Self> for BitField<WORDS> {
    fn bitor_assign(&mut self, rhs: &Self) {
        for (word, &other) in self.0.iter_mut().zip(&rhs.0) {
            *word |= other;
        }
    }
}

impl<const WORDS: usize> BitOrAssign for BitField<WORDS> {
    fn bitor_assign(&mut self, rhs: Self) {
        *self |= &rhs;
    }
}

impl<const WORDS: usize> BitAndAssign<&Self> for BitField<WORDS> {
    fn bitand_assign(&mut self, rhs: &Self) {
        for (word, &other) in self.0.iter_mut().zip(&rhs.0) {
            *word &= other;
        }
    }
}

impl<const WORDS: usize> BitAndAssign for BitField<WORDS> {
    fn bitand_assign(&mut self, rhs: Self) {
        *self &= &rhs;
    }
}

impl<const WORDS: usize> BitOr for BitField<WORDS> {
    type Output = Self;

    fn bitor(mut self, rhs: Self) -> Self::Output {
        self |= &rhs;
        self
    }
}

impl<const WORDS: usize> BitAnd for BitField<WORDS> {
    type Output = Self;

    fn bitand(mut self, rhs: Self) -> Self::Output {
        self &= &rhs;
        self
    }
}

/// Iterator over the indices of set bits, in ascending order.
#[derive(Debug, Clone)]
pub struct Ones<'a, const WORDS: usize> {
    field: &'a BitField<WORDS>,
    word_idx: usize,
    remaining: u64,
}

impl<const WORDS: usize> Iterator for Ones<'_, WORDS> {
    type Item = usize;

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        while self.remaining == 0 {
            self.word_idx += 1;
            if self.word_idx >= WORDS {
                return None;
            }
            self.remaining = self.field.0[self.word_idx];
        }

        let bit = self.remaining.trailing_zeros() as usize;
        self.remaining &= self.remaining - 1;

        Some(self.word_idx * 64 + bit)
    }
}

impl<'a, const WORDS: usize> IntoIterator for &'a BitField<WORDS> {
    type Item = usize;
    type IntoIter = Ones<'a, WORDS>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter_ones()
    }
}
