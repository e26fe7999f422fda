use std::ops::RangeInclusive;

pub trait GetBit: Copy {
    #[must_use]
    fn bit(self, i: u8) -> bool;

    #[must_use]
    fn bits(self, range: RangeInclusive<u8>) -> Self;

    #[must_use]
    fn with_bit(self, i: u8, value: bool) -> Self;
}

macro_rules! impl_get_bit {
    ($($t:ty),* $(,)?) => {
        $(
            impl GetBit for $t {
                #[inline]
                fn bit(self, i: u8) -> bool {
                    debug_assert!(i < (<$t>::BITS as u8));
                    self & (1 << i) != 0
                }

                #[inline]
                fn bits(self, range: RangeInclusive<u8>) -> Self {
                    let start = *range.start();
                    let end = *range.end();
                    debug_assert!(end < (<$t>::BITS as u8));

                    (self >> start) & ((1 << (end - start + 1)) - 1)
                }

                #[inline]
                fn with_bit(self, i: u8, value: bool) -> Self {
                    debug_assert!(i < (<$t>::BITS as u8));
                    (self & !(1 << i)) | (<$t>::from(value) << i)
                }
            }
        )*
    };
}

impl_get_bit!(u8, u16, u32, u64);

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn bit_field_extraction() {
        let value: u8 = 0b1001_1010;
        assert!(value.bit(7));
        assert!(!value.bit(6));
        assert_eq!(value.bits(0..=2), 0b010);
        assert_eq!(value.bits(3..=4), 0b11);
    }

    #[test]
    fn with_bit_sets_and_clears() {
        let value: u16 = 0x0047;
        assert_eq!(value.with_bit(1, false), 0x0045);
        assert_eq!(value.with_bit(3, true), 0x004F);
        assert_eq!(value.with_bit(0, true), 0x0047);
    }
}
