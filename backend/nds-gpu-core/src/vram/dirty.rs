//! VRAM dirty tracking
//!
//! Writes through a window with a single mapped bank mark that bank's dirty bits immediately.
//! Writes through a window with zero or several banks only mark the destination's "written"
//! bits, and [`sync_written`] later fans those out to whichever banks are mapped at that time.
//!
//! Consumers then reconcile through a [`TrackingSet`], which remembers the window masks that the
//! consumer last saw. A window whose mask changed is reported dirty in its entirety; otherwise the
//! dirty bits of its banks are reported.

use crate::vram::bank::Banks;
use crate::vram::map::WindowTable;
use crate::vram::{BankId, BankMask, Destination};
use bincode::de::{BorrowDecoder, Decoder};
use bincode::enc::Encoder;
use bincode::error::{DecodeError, EncodeError};
use bincode::{BorrowDecode, Decode, Encode};
use nds_common::BitField;

/// Dirty tracking granularity in bytes.
pub const DIRTY_GRANULARITY: u32 = 512;
const GRANULARITY_SHIFT: u32 = DIRTY_GRANULARITY.trailing_zeros();

/// One bit per 512-byte unit of the largest (128 KiB) bank.
pub type BankDirty = BitField<4>;

#[derive(Debug, Clone)]
pub(crate) struct DirtyState {
    pub(crate) banks: [BankDirty; BankId::ALL.len()],
    pub(crate) written_a_bg: BitField<16>,
    pub(crate) written_a_obj: BitField<8>,
    pub(crate) written_b_bg: BitField<4>,
    pub(crate) written_b_obj: BitField<4>,
    pub(crate) written_arm7: BitField<8>,
}

impl DirtyState {
    pub(crate) fn new() -> Self {
        Self {
            banks: [BankDirty::new(); BankId::ALL.len()],
            written_a_bg: BitField::new(),
            written_a_obj: BitField::new(),
            written_b_bg: BitField::new(),
            written_b_obj: BitField::new(),
            written_arm7: BitField::new(),
        }
    }

    fn all_dirty() -> Self {
        let mut state = Self::new();
        for bank in BankId::ALL {
            state.mark_bank_fully_dirty(bank);
        }
        state
    }

    pub(crate) fn mark_bank_fully_dirty(&mut self, bank: BankId) {
        self.banks[bank as usize] =
            BankDirty::from_range(0, bank.len() >> GRANULARITY_SHIFT as usize);
    }

    #[inline]
    pub(crate) fn mark_bank(&mut self, bank: BankId, offset: usize) {
        self.banks[bank as usize].set(offset >> GRANULARITY_SHIFT);
    }

    /// Record a write through a window whose bank is not uniquely known. Returns `false` for
    /// destinations that have no written bitfield, in which case the caller has to mark banks
    /// directly.
    #[inline]
    pub(crate) fn mark_written(&mut self, destination: Destination, address: u32) -> bool {
        fn mark<const WORDS: usize>(written: &mut BitField<WORDS>, address: u32) {
            let len = (BitField::<WORDS>::BITS as u32) << GRANULARITY_SHIFT;
            written.set(((address & (len - 1)) >> GRANULARITY_SHIFT) as usize);
        }

        match destination {
            Destination::ABg => mark(&mut self.written_a_bg, address),
            Destination::AObj => mark(&mut self.written_a_obj, address),
            Destination::BBg => mark(&mut self.written_b_bg, address),
            Destination::BObj => mark(&mut self.written_b_obj, address),
            Destination::Arm7 => mark(&mut self.written_arm7, address),
            _ => return false,
        }

        true
    }
}

// Dirty bits are not persisted. A freshly loaded state reports every bank as dirty so that
// consumers re-read everything on their next reconciliation.
impl Encode for DirtyState {
    fn encode<E: Encoder>(&self, _encoder: &mut E) -> Result<(), EncodeError> {
        Ok(())
    }
}

impl<Context> Decode<Context> for DirtyState {
    fn decode<D: Decoder<Context = Context>>(_decoder: &mut D) -> Result<Self, DecodeError> {
        Ok(Self::all_dirty())
    }
}

impl<'de, Context> BorrowDecode<'de, Context> for DirtyState {
    fn borrow_decode<D: BorrowDecoder<'de, Context = Context>>(
        _decoder: &mut D,
    ) -> Result<Self, DecodeError> {
        Ok(Self::all_dirty())
    }
}

/// Move every set bit of `written` into the dirty bits of the banks currently mapped at that
/// location, then clear `written`.
pub(crate) fn sync_written<const WINDOWS: usize, const SHIFT: u32, const WORDS: usize>(
    table: &WindowTable<WINDOWS, SHIFT>,
    written: &mut BitField<WORDS>,
    bank_dirty: &mut [BankDirty; BankId::ALL.len()],
) {
    let pending = written.take();
    for unit in &pending {
        let window = unit >> (SHIFT - GRANULARITY_SHIFT);
        for bank in table.mask(window) {
            let bank_units = (bank.addr_mask() >> GRANULARITY_SHIFT) as usize;
            bank_dirty[bank as usize].set(unit & bank_units);
        }
    }
}

/// A consumer's last observed view of one destination's window masks.
///
/// Consumers that reconcile the same destination must each keep their own tracking set. All of
/// them share the per-bank dirty bits, so whichever reconciles first consumes those bits.
#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub struct TrackingSet<const WINDOWS: usize, const WORDS: usize> {
    mappings: [BankMask; WINDOWS],
}

pub type ABgTrackingSet = TrackingSet<32, 16>;
pub type AObjTrackingSet = TrackingSet<16, 8>;
pub type BBgTrackingSet = TrackingSet<8, 4>;
pub type BObjTrackingSet = TrackingSet<8, 4>;
pub type TextureTrackingSet = TrackingSet<4, 16>;
pub type TexPalTrackingSet = TrackingSet<8, 4>;

impl<const WINDOWS: usize, const WORDS: usize> TrackingSet<WINDOWS, WORDS> {
    #[must_use]
    pub fn new() -> Self {
        Self { mappings: [BankMask::EMPTY; WINDOWS] }
    }

    /// Force every window to compare as remapped on the next reconciliation.
    pub fn invalidate_all(&mut self) {
        self.mappings = [BankMask::INVALID; WINDOWS];
    }

    #[must_use]
    pub fn mappings(&self) -> &[BankMask; WINDOWS] {
        &self.mappings
    }

    pub(crate) fn derive_state<const SHIFT: u32>(
        &mut self,
        table: &WindowTable<WINDOWS, SHIFT>,
        bank_dirty: &mut [BankDirty; BankId::ALL.len()],
    ) -> BitField<WORDS> {
        let window_len = 1_u32 << SHIFT;
        let units_per_window = (window_len >> GRANULARITY_SHIFT) as usize;
        debug_assert_eq!(WINDOWS * units_per_window, BitField::<WORDS>::BITS);

        let mut result = BitField::new();
        let mut banks_to_clear = BankMask::EMPTY;

        for (window, (observed, &current)) in
            self.mappings.iter_mut().zip(table.masks()).enumerate()
        {
            banks_to_clear |= current;

            if *observed != current {
                result |= BitField::from_range(window * units_per_window, units_per_window);
                *observed = current;
                continue;
            }

            for bank in current {
                fold_bank_dirty(&mut result, window, window_len, bank, &bank_dirty[bank as usize]);
            }
        }

        for bank in banks_to_clear {
            bank_dirty[bank as usize].clear_all();
        }

        result
    }
}

impl<const WINDOWS: usize, const WORDS: usize> Default for TrackingSet<WINDOWS, WORDS> {
    fn default() -> Self {
        Self::new()
    }
}

/// OR one bank's dirty bits into the result range for `window`.
///
/// # Panics
///
/// Panics if `window_len` is neither 16 KiB nor 128 KiB.
fn fold_bank_dirty<const WORDS: usize>(
    result: &mut BitField<WORDS>,
    window: usize,
    window_len: u32,
    bank: BankId,
    bank_dirty: &BankDirty,
) {
    match window_len {
        // 32 units per window; a bank spanning several windows repeats every len / 16K windows
        0x4000 => {
            let chunk = window & ((bank.len() >> 14) - 1);
            result.or_chunk32(window, bank_dirty.chunk32(chunk));
        }
        // 256 units per window, exactly one full bank
        0x20000 => {
            let words = result.words_mut();
            for (i, &word) in bank_dirty.words().iter().enumerate() {
                words[window * 4 + i] |= word;
            }
        }
        _ => panic!("unsupported VRAM mapping granularity: {window_len:#X} bytes"),
    }
}

/// Copy every dirty 512-byte unit of a destination into `flat`, which is laid out linearly over
/// the destination's address space. Returns whether anything was copied.
pub(crate) fn copy_linear<const WINDOWS: usize, const SHIFT: u32, const WORDS: usize>(
    flat: &mut [u8],
    table: &WindowTable<WINDOWS, SHIFT>,
    banks: &Banks,
    dirty: &BitField<WORDS>,
    mut slow_access: impl FnMut(u32) -> u64,
) -> bool {
    let granularity = DIRTY_GRANULARITY as usize;
    let mut changed = false;

    for unit in dirty {
        let address = (unit << GRANULARITY_SHIFT) as u32;
        let dst = &mut flat[unit * granularity..(unit + 1) * granularity];

        match table.direct(WindowTable::<WINDOWS, SHIFT>::window_of(address)) {
            Some(direct) => {
                let offset = direct.offset(address, WindowTable::<WINDOWS, SHIFT>::WINDOW_LEN);
                dst.copy_from_slice(&banks.get(direct.bank)[offset..offset + granularity]);
            }
            None => {
                for (i, chunk) in dst.chunks_exact_mut(8).enumerate() {
                    chunk.copy_from_slice(&slow_access(address + 8 * i as u32).to_le_bytes());
                }
            }
        }

        changed = true;
    }

    changed
}
