//! NDS VRAM: nine fixed-size banks that guest software maps into the 2D engines' BG/OBJ memory,
//! extended palettes, 3D texture/texture palette memory, the LCDC region, and the ARM7 window

mod bank;
mod dirty;
mod map;


use crate::engine::EngineId;
use crate::vram::bank::Banks;
use crate::vram::dirty::{DirtyState, copy_linear, sync_written};
use crate::vram::map::{BankMapping, Map, WriteOutcome, decode_mapping};
use bincode::{Decode, Encode};
use nds_common::BitField;
use nds_common::num::GetBit;
use nds_proc_macros::{EnumAll, EnumDisplay};
use std::iter::FusedIterator;
use std::ops::{BitOr, BitOrAssign};

pub use dirty::{
    ABgTrackingSet, AObjTrackingSet, BBgTrackingSet, BObjTrackingSet, BankDirty,
    DIRTY_GRANULARITY, TexPalTrackingSet, TextureTrackingSet, TrackingSet,
};
pub use map::WindowTable;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Encode, Decode, EnumAll, EnumDisplay)]
pub enum BankId {
    A = 0,
    B = 1,
    C = 2,
    D = 3,
    E = 4,
    F = 5,
    G = 6,
    H = 7,
    I = 8,
}

impl BankId {
    #[must_use]
    #[allow(clippy::len_without_is_empty)]
    pub const fn len(self) -> usize {
        match self {
            Self::A | Self::B | Self::C | Self::D => 128 * 1024,
            Self::E => 64 * 1024,
            Self::F | Self::G | Self::I => 16 * 1024,
            Self::H => 32 * 1024,
        }
    }

    #[must_use]
    pub const fn addr_mask(self) -> u32 {
        (self.len() - 1) as u32
    }

    /// Bits of VRAMCNT that are writable for this bank.
    #[must_use]
    pub const fn control_mask(self) -> u8 {
        match self {
            Self::A | Self::B => 0x9B,
            Self::C | Self::D | Self::F | Self::G => 0x9F,
            Self::E => 0x87,
            Self::H | Self::I => 0x83,
        }
    }

    // Start of this bank in the 1 MiB LCDC region
    const fn lcdc_base(self) -> u32 {
        match self {
            Self::A => 0x00000,
            Self::B => 0x20000,
            Self::C => 0x40000,
            Self::D => 0x60000,
            Self::E => 0x80000,
            Self::F => 0x90000,
            Self::G => 0x94000,
            Self::H => 0x98000,
            Self::I => 0xA0000,
        }
    }

    fn from_lcdc_address(address: u32) -> Option<Self> {
        match address & 0xFFFFF {
            0x00000..=0x1FFFF => Some(Self::A),
            0x20000..=0x3FFFF => Some(Self::B),
            0x40000..=0x5FFFF => Some(Self::C),
            0x60000..=0x7FFFF => Some(Self::D),
            0x80000..=0x8FFFF => Some(Self::E),
            0x90000..=0x93FFF => Some(Self::F),
            0x94000..=0x97FFF => Some(Self::G),
            0x98000..=0x9FFFF => Some(Self::H),
            0xA0000..=0xA3FFF => Some(Self::I),
            _ => None,
        }
    }
}

/// Set of banks, one bit per [`BankId`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Encode, Decode)]
pub struct BankMask(u16);

impl BankMask {
    pub const EMPTY: Self = Self(0);

    const VALID_BITS: u16 = (1 << BankId::ALL.len()) - 1;

    // Never produced by a mapping change; compares unequal to every real mask
    pub(crate) const INVALID: Self = Self(!0);

    #[must_use]
    pub const fn from_bank(bank: BankId) -> Self {
        Self(1 << bank as u16)
    }

    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    #[must_use]
    pub const fn contains(self, bank: BankId) -> bool {
        self.0 & (1 << bank as u16) != 0
    }

    pub fn insert(&mut self, bank: BankId) {
        self.0 |= 1 << bank as u16;
    }

    pub fn remove(&mut self, bank: BankId) {
        self.0 &= !(1 << bank as u16);
    }

    /// The mapped bank if exactly one is present.
    #[inline]
    #[must_use]
    pub fn single(self) -> Option<BankId> {
        if self.0 != 0 && self.0 & (self.0 - 1) == 0 {
            BankId::ALL.get(self.0.trailing_zeros() as usize).copied()
        } else {
            None
        }
    }

    #[must_use]
    pub fn iter(self) -> BankMaskIter {
        BankMaskIter(self.0 & Self::VALID_BITS)
    }
}

impl BitOr for BankMask {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self::Output {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for BankMask {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl IntoIterator for BankMask {
    type Item = BankId;
    type IntoIter = BankMaskIter;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl FromIterator<BankId> for BankMask {
    fn from_iter<T: IntoIterator<Item = BankId>>(iter: T) -> Self {
        let mut mask = Self::EMPTY;
        for bank in iter {
            mask.insert(bank);
        }
        mask
    }
}

/// Iterates the banks of a [`BankMask`] in ascending order.
#[derive(Debug, Clone)]
pub struct BankMaskIter(u16);

impl Iterator for BankMaskIter {
    type Item = BankId;

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        if self.0 == 0 {
            return None;
        }

        let bank = self.0.trailing_zeros() as usize;
        self.0 &= self.0 - 1;
        BankId::ALL.get(bank).copied()
    }
}

impl FusedIterator for BankMaskIter {}

/// VRAMCNT_x value, already masked to the bank's writable bits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Encode, Decode)]
pub struct BankControl(u8);

impl BankControl {
    #[must_use]
    pub fn new(bank: BankId, value: u8) -> Self {
        Self(value & bank.control_mask())
    }

    #[must_use]
    pub const fn raw(self) -> u8 {
        self.0
    }

    #[must_use]
    pub fn enabled(self) -> bool {
        self.0.bit(7)
    }

    /// Bank mode select.
    #[must_use]
    pub fn mst(self) -> u8 {
        self.0.bits(0..=2)
    }

    #[must_use]
    pub fn offset(self) -> u8 {
        self.0.bits(3..=4)
    }
}

/// An address space that banks can be mapped into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Encode, Decode, EnumAll)]
pub enum Destination {
    Lcdc,
    ABg,
    AObj,
    BBg,
    BObj,
    ABgExtPal,
    AObjExtPal,
    BBgExtPal,
    BObjExtPal,
    Texture,
    TexPal,
    Arm7,
}

impl Destination {
    /// Number of mapping windows; for LCDC this is one window per bank.
    #[must_use]
    pub const fn window_count(self) -> usize {
        match self {
            Self::Lcdc => BankId::ALL.len(),
            Self::ABg => 32,
            Self::AObj => 16,
            Self::BBg | Self::BObj | Self::TexPal => 8,
            Self::ABgExtPal | Self::BBgExtPal | Self::Texture => 4,
            Self::Arm7 => 2,
            Self::AObjExtPal | Self::BObjExtPal => 1,
        }
    }

    /// Size of the destination's address space in bytes.
    #[must_use]
    pub const fn len(self) -> u32 {
        match self {
            Self::Lcdc => 0xA4000,
            Self::ABg | Self::Texture => 512 * 1024,
            Self::AObj | Self::Arm7 => 256 * 1024,
            Self::BBg | Self::BObj | Self::TexPal => 128 * 1024,
            Self::ABgExtPal | Self::BBgExtPal => 32 * 1024,
            Self::AObjExtPal | Self::BObjExtPal => 8 * 1024,
        }
    }

    /// Destination selected by bits 21-23 of an ARM9 address in 0x06000000-0x06FFFFFF.
    #[must_use]
    pub fn from_arm9_address(address: u32) -> Self {
        match address.bits(21..=23) {
            0 => Self::ABg,
            1 => Self::BBg,
            2 => Self::AObj,
            3 => Self::BObj,
            _ => Self::Lcdc,
        }
    }
}

/// Extended palette slots that went stale because of a bank control write. The owning display
/// engine must drop any palette it decoded from those slots.
#[must_use]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExtPalInvalidation {
    // Bit N set = BG extended palette slots N and N+1 (N in {0, 2})
    bg_slots: [u8; 2],
    obj: [bool; 2],
}

impl ExtPalInvalidation {
    #[must_use]
    pub fn is_empty(self) -> bool {
        self == Self::default()
    }

    /// Base slots (0 and/or 2) of the BG extended palette slot pairs that went stale.
    pub fn bg_base_slots(self, engine: EngineId) -> impl Iterator<Item = usize> {
        let slots = self.bg_slots[engine as usize];
        [0, 2].into_iter().filter(move |&slot| slots.bit(slot as u8))
    }

    #[must_use]
    pub fn obj(self, engine: EngineId) -> bool {
        self.obj[engine as usize]
    }

    fn record(&mut self, mapping: &BankMapping) {
        let bg_engine = match mapping.destination {
            Destination::ABgExtPal => EngineId::A,
            Destination::BBgExtPal => EngineId::B,
            Destination::AObjExtPal => {
                self.obj[EngineId::A as usize] = true;
                return;
            }
            Destination::BObjExtPal => {
                self.obj[EngineId::B as usize] = true;
                return;
            }
            _ => return,
        };

        for slot in mapping.windows() {
            self.bg_slots[bg_engine as usize] |= 1 << (slot & !1);
        }
    }
}

/// VRAM bank storage and mapping state.
#[derive(Debug, Clone, Encode, Decode)]
pub struct Vram {
    banks: Banks,
    control: [BankControl; BankId::ALL.len()],
    map: Map,
    dirty: DirtyState,
}

impl Vram {
    #[must_use]
    pub fn new() -> Self {
        Self {
            banks: Banks::new(),
            control: [BankControl::default(); BankId::ALL.len()],
            map: Map::default(),
            dirty: DirtyState::new(),
        }
    }

    /// Zero every bank and unmap everything.
    pub fn reset(&mut self) {
        self.banks.clear();
        self.control = [BankControl::default(); BankId::ALL.len()];
        self.map = Map::default();
        self.dirty = DirtyState::new();
    }

    #[must_use]
    pub fn bank_control(&self, bank: BankId) -> u8 {
        self.control[bank as usize].raw()
    }

    /// VRAMCNT_x write. Remaps the bank if the masked value changed and returns the extended
    /// palette slots whose contents went stale.
    pub fn write_bank_control(&mut self, bank: BankId, value: u8) -> ExtPalInvalidation {
        let new = BankControl::new(bank, value);
        let old = self.control[bank as usize];

        log::debug!(
            "VRAMCNT_{bank} write: {value:02X} (enabled={}, MST={}, offset={})",
            new.enabled(),
            new.mst(),
            new.offset()
        );

        let mut invalidation = ExtPalInvalidation::default();
        if new == old {
            return invalidation;
        }
        self.control[bank as usize] = new;

        if let Some(mapping) = decode_mapping(bank, old) {
            self.map.apply(&mapping, bank, false);
            invalidation.record(&mapping);
        }

        match decode_mapping(bank, new) {
            Some(mapping) => {
                log::trace!(
                    "Mapping VRAM bank {bank} to {:?} windows {:?}",
                    mapping.destination,
                    mapping.spans()
                );
                self.map.apply(&mapping, bank, true);
                invalidation.record(&mapping);
            }
            None if new.enabled() => {
                log::debug!("VRAM bank {bank} enabled with unused MST {}", new.mst());
            }
            None => {}
        }

        invalidation
    }

    /// VRAMSTAT: bit 0 set when bank C is mapped to the ARM7, bit 1 when bank D is.
    #[must_use]
    pub fn arm7_status(&self) -> u8 {
        let is_arm7 = |bank: BankId| {
            decode_mapping(bank, self.control[bank as usize])
                .is_some_and(|mapping| mapping.destination == Destination::Arm7)
        };

        u8::from(is_arm7(BankId::C)) | (u8::from(is_arm7(BankId::D)) << 1)
    }

    /// Raw bank contents, bypassing all mapping.
    #[must_use]
    pub fn bank(&self, bank: BankId) -> &[u8] {
        self.banks.get(bank)
    }

    #[must_use]
    pub fn mapping(&self, destination: Destination, window: usize) -> BankMask {
        self.map.mask(destination, window)
    }

    #[must_use]
    pub fn bank_dirty(&self, bank: BankId) -> &BankDirty {
        &self.dirty.banks[bank as usize]
    }

    fn read_lcdc<const N: usize>(&self, address: u32) -> [u8; N] {
        let address = address & !(N as u32 - 1);
        match BankId::from_lcdc_address(address) {
            Some(bank) if self.map.lcdc.contains(bank) => {
                self.banks.read(bank, ((address - bank.lcdc_base()) & bank.addr_mask()) as usize)
            }
            _ => [0; N],
        }
    }

    fn write_lcdc<const N: usize>(&mut self, address: u32, bytes: [u8; N]) {
        let address = address & !(N as u32 - 1);
        match BankId::from_lcdc_address(address) {
            Some(bank) if self.map.lcdc.contains(bank) => {
                let offset = ((address - bank.lcdc_base()) & bank.addr_mask()) as usize;
                self.banks.write(bank, offset, bytes);
                self.dirty.mark_bank(bank, offset);
            }
            _ => {
                log::trace!("Dropped LCDC write to unmapped address {address:05X}");
            }
        }
    }

    #[inline]
    fn read_bytes<const N: usize>(&self, destination: Destination, address: u32) -> [u8; N] {
        let banks = &self.banks;
        match destination {
            Destination::Lcdc => self.read_lcdc(address & 0xFFFFF),
            Destination::ABg => self.map.a_bg.read(banks, address),
            Destination::AObj => self.map.a_obj.read(banks, address),
            Destination::BBg => self.map.b_bg.read(banks, address),
            Destination::BObj => self.map.b_obj.read(banks, address),
            Destination::ABgExtPal => self.map.a_bg_ext_pal.read(banks, address),
            Destination::AObjExtPal => self.map.a_obj_ext_pal.read(banks, address),
            Destination::BBgExtPal => self.map.b_bg_ext_pal.read(banks, address),
            Destination::BObjExtPal => self.map.b_obj_ext_pal.read(banks, address),
            Destination::Texture => self.map.texture.read(banks, address),
            Destination::TexPal => self.map.tex_pal.read(banks, address),
            Destination::Arm7 => self.map.arm7.read(banks, address),
        }
    }

    #[inline]
    fn write_bytes<const N: usize>(
        &mut self,
        destination: Destination,
        address: u32,
        bytes: [u8; N],
    ) {
        let banks = &mut self.banks;
        let outcome = match destination {
            Destination::Lcdc => {
                self.write_lcdc(address & 0xFFFFF, bytes);
                return;
            }
            Destination::ABg => self.map.a_bg.write(banks, address, bytes),
            Destination::AObj => self.map.a_obj.write(banks, address, bytes),
            Destination::BBg => self.map.b_bg.write(banks, address, bytes),
            Destination::BObj => self.map.b_obj.write(banks, address, bytes),
            Destination::ABgExtPal => self.map.a_bg_ext_pal.write(banks, address, bytes),
            Destination::AObjExtPal => self.map.a_obj_ext_pal.write(banks, address, bytes),
            Destination::BBgExtPal => self.map.b_bg_ext_pal.write(banks, address, bytes),
            Destination::BObjExtPal => self.map.b_obj_ext_pal.write(banks, address, bytes),
            Destination::Texture => self.map.texture.write(banks, address, bytes),
            Destination::TexPal => self.map.tex_pal.write(banks, address, bytes),
            Destination::Arm7 => self.map.arm7.write(banks, address, bytes),
        };

        match outcome {
            WriteOutcome::Unique { bank, offset } => self.dirty.mark_bank(bank, offset),
            WriteOutcome::Shared(mask) => {
                if !self.dirty.mark_written(destination, address) {
                    for bank in mask {
                        self.dirty.mark_bank(bank, (address & bank.addr_mask()) as usize);
                    }
                }
            }
        }
    }

    #[must_use]
    pub fn read_byte(&self, destination: Destination, address: u32) -> u8 {
        let [value] = self.read_bytes(destination, address);
        value
    }

    #[must_use]
    pub fn read_halfword(&self, destination: Destination, address: u32) -> u16 {
        u16::from_le_bytes(self.read_bytes(destination, address))
    }

    #[must_use]
    pub fn read_word(&self, destination: Destination, address: u32) -> u32 {
        u32::from_le_bytes(self.read_bytes(destination, address))
    }

    #[must_use]
    pub fn read_doubleword(&self, destination: Destination, address: u32) -> u64 {
        u64::from_le_bytes(self.read_bytes(destination, address))
    }

    pub fn write_byte(&mut self, destination: Destination, address: u32, value: u8) {
        self.write_bytes(destination, address, [value]);
    }

    pub fn write_halfword(&mut self, destination: Destination, address: u32, value: u16) {
        self.write_bytes(destination, address, value.to_le_bytes());
    }

    pub fn write_word(&mut self, destination: Destination, address: u32, value: u32) {
        self.write_bytes(destination, address, value.to_le_bytes());
    }

    // $06000000-$06FFFFFF as seen from the ARM9

    #[must_use]
    pub fn read_arm9_byte(&self, address: u32) -> u8 {
        self.read_byte(Destination::from_arm9_address(address), address)
    }

    #[must_use]
    pub fn read_arm9_halfword(&self, address: u32) -> u16 {
        self.read_halfword(Destination::from_arm9_address(address), address)
    }

    #[must_use]
    pub fn read_arm9_word(&self, address: u32) -> u32 {
        self.read_word(Destination::from_arm9_address(address), address)
    }

    pub fn write_arm9_byte(&mut self, address: u32, value: u8) {
        self.write_byte(Destination::from_arm9_address(address), address, value);
    }

    pub fn write_arm9_halfword(&mut self, address: u32, value: u16) {
        self.write_halfword(Destination::from_arm9_address(address), address, value);
    }

    pub fn write_arm9_word(&mut self, address: u32, value: u32) {
        self.write_word(Destination::from_arm9_address(address), address, value);
    }

    // $06000000-$06FFFFFF as seen from the ARM7: two 128 KiB windows, mirrored

    #[must_use]
    pub fn read_arm7_byte(&self, address: u32) -> u8 {
        self.read_byte(Destination::Arm7, address)
    }

    #[must_use]
    pub fn read_arm7_halfword(&self, address: u32) -> u16 {
        self.read_halfword(Destination::Arm7, address)
    }

    #[must_use]
    pub fn read_arm7_word(&self, address: u32) -> u32 {
        self.read_word(Destination::Arm7, address)
    }

    pub fn write_arm7_byte(&mut self, address: u32, value: u8) {
        self.write_byte(Destination::Arm7, address, value);
    }

    pub fn write_arm7_halfword(&mut self, address: u32, value: u16) {
        self.write_halfword(Destination::Arm7, address, value);
    }

    pub fn write_arm7_word(&mut self, address: u32, value: u32) {
        self.write_word(Destination::Arm7, address, value);
    }

    /// Color `index` of BG extended palette `slot` (0-3).
    #[must_use]
    pub fn bg_ext_pal_color(&self, engine: EngineId, slot: usize, index: u16) -> u16 {
        let destination = match engine {
            EngineId::A => Destination::ABgExtPal,
            EngineId::B => Destination::BBgExtPal,
        };
        let address = ((slot as u32) << 13) | (u32::from(index) << 1);
        self.read_halfword(destination, address)
    }

    /// Color `index` of the OBJ extended palette.
    #[must_use]
    pub fn obj_ext_pal_color(&self, engine: EngineId, index: u16) -> u16 {
        let destination = match engine {
            EngineId::A => Destination::AObjExtPal,
            EngineId::B => Destination::BObjExtPal,
        };
        self.read_halfword(destination, u32::from(index) << 1)
    }

    /// Fan every pending "written" bit out into the dirty bits of the banks currently mapped at
    /// that location. Must run before any reconciliation.
    pub fn sync_dirty_flags(&mut self) {
        let dirty = &mut self.dirty;
        sync_written(&self.map.a_bg, &mut dirty.written_a_bg, &mut dirty.banks);
        sync_written(&self.map.a_obj, &mut dirty.written_a_obj, &mut dirty.banks);
        sync_written(&self.map.b_bg, &mut dirty.written_b_bg, &mut dirty.banks);
        sync_written(&self.map.b_obj, &mut dirty.written_b_obj, &mut dirty.banks);
        sync_written(&self.map.arm7, &mut dirty.written_arm7, &mut dirty.banks);
    }
}

impl Default for Vram {
    fn default() -> Self {
        Self::new()
    }
}

macro_rules! impl_tracked_destination {
    ($(
        $destination:ident: $table:ident, $tracking:ty, $words:literal,
        $derive_fn:ident, $flatten_fn:ident, $flatten_with_fn:ident;
    )*) => {
        impl Vram {
            $(
                #[doc = concat!("Reconcile `tracking` against the current `", stringify!($destination), "` mapping.")]
                ///
                /// Returns one bit per 512-byte unit that changed since `tracking` last observed
                /// this destination, and clears the dirty bits of every bank it inspected.
                pub fn $derive_fn(&mut self, tracking: &mut $tracking) -> BitField<$words> {
                    tracking.derive_state(&self.map.$table, &mut self.dirty.banks)
                }

                #[doc = concat!("Copy every dirty unit of `", stringify!($destination), "` into `flat`.")]
                ///
                /// # Panics
                ///
                /// Panics if `flat` is shorter than the destination.
                pub fn $flatten_fn(&self, flat: &mut [u8], dirty: &BitField<$words>) -> bool {
                    self.$flatten_with_fn(flat, dirty, |address| {
                        self.read_doubleword(Destination::$destination, address)
                    })
                }

                /// Same as the plain flatten, with a caller-supplied reader for units whose window
                /// does not have exactly one bank.
                ///
                /// # Panics
                ///
                /// Panics if `flat` is shorter than the destination.
                pub fn $flatten_with_fn(
                    &self,
                    flat: &mut [u8],
                    dirty: &BitField<$words>,
                    slow_access: impl FnMut(u32) -> u64,
                ) -> bool {
                    assert!(
                        flat.len() >= Destination::$destination.len() as usize,
                        "flattened buffer too small: {} bytes",
                        flat.len()
                    );
                    copy_linear(flat, &self.map.$table, &self.banks, dirty, slow_access)
                }
            )*
        }
    };
}

impl_tracked_destination! {
    ABg: a_bg, ABgTrackingSet, 16, derive_a_bg, flatten_a_bg, flatten_a_bg_with;
    AObj: a_obj, AObjTrackingSet, 8, derive_a_obj, flatten_a_obj, flatten_a_obj_with;
    BBg: b_bg, BBgTrackingSet, 4, derive_b_bg, flatten_b_bg, flatten_b_bg_with;
    BObj: b_obj, BObjTrackingSet, 4, derive_b_obj, flatten_b_obj, flatten_b_obj_with;
    Texture: texture, TextureTrackingSet, 16, derive_texture, flatten_texture, flatten_texture_with;
    TexPal: tex_pal, TexPalTrackingSet, 4, derive_tex_pal, flatten_tex_pal, flatten_tex_pal_with;
}
