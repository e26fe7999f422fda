//! Per-destination window tables and bank control decoding
//!
//! Every destination's address space is split into fixed-size windows, and each window records
//! the set of banks currently mapped onto it. A window with exactly one bank also caches that
//! bank's location so that the common case never has to iterate the mask.

use crate::vram::bank::Banks;
use crate::vram::{BankControl, BankId, BankMask, Destination};
use bincode::de::{BorrowDecoder, Decoder};
use bincode::enc::Encoder;
use bincode::error::{DecodeError, EncodeError};
use bincode::{BorrowDecode, Decode, Encode};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct DirectWindow {
    pub(crate) bank: BankId,
    base: u32,
}

impl DirectWindow {
    #[inline]
    pub(crate) fn offset(self, address: u32, window_len: u32) -> usize {
        (self.base + (address & (window_len - 1))) as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WriteOutcome {
    Unique { bank: BankId, offset: usize },
    Shared(BankMask),
}

#[derive(Debug, Clone)]
pub struct WindowTable<const WINDOWS: usize, const SHIFT: u32> {
    masks: [BankMask; WINDOWS],
    direct: [Option<DirectWindow>; WINDOWS],
}

impl<const WINDOWS: usize, const SHIFT: u32> WindowTable<WINDOWS, SHIFT> {
    pub const WINDOW_LEN: u32 = 1 << SHIFT;
    pub const LEN: u32 = (WINDOWS as u32) << SHIFT;

    pub(crate) fn new() -> Self {
        Self { masks: [BankMask::EMPTY; WINDOWS], direct: [None; WINDOWS] }
    }

    fn from_masks(masks: [BankMask; WINDOWS]) -> Self {
        let mut table = Self { masks, direct: [None; WINDOWS] };
        for window in 0..WINDOWS {
            table.refresh_direct(window);
        }
        table
    }

    pub(crate) fn masks(&self) -> &[BankMask; WINDOWS] {
        &self.masks
    }

    #[inline]
    pub(crate) fn mask(&self, window: usize) -> BankMask {
        self.masks[window]
    }

    #[inline]
    pub(crate) fn direct(&self, window: usize) -> Option<DirectWindow> {
        self.direct[window]
    }

    #[inline]
    pub(crate) fn window_of(address: u32) -> usize {
        ((address & (Self::LEN - 1)) >> SHIFT) as usize
    }

    fn refresh_direct(&mut self, window: usize) {
        self.direct[window] = self.masks[window].single().map(|bank| DirectWindow {
            bank,
            base: ((window as u32) << SHIFT) & bank.addr_mask(),
        });
    }

    #[inline]
    pub(crate) fn read<const N: usize>(&self, banks: &Banks, address: u32) -> [u8; N] {
        let address = address & (Self::LEN - 1) & !(N as u32 - 1);
        let window = (address >> SHIFT) as usize;

        if let Some(direct) = self.direct[window] {
            return banks.read(direct.bank, direct.offset(address, Self::WINDOW_LEN));
        }

        let mut value = [0; N];
        for bank in self.masks[window] {
            let bytes: [u8; N] = banks.read(bank, (address & bank.addr_mask()) as usize);
            for (v, b) in value.iter_mut().zip(bytes) {
                *v |= b;
            }
        }
        value
    }

    #[inline]
    pub(crate) fn write<const N: usize>(
        &self,
        banks: &mut Banks,
        address: u32,
        bytes: [u8; N],
    ) -> WriteOutcome {
        let address = address & (Self::LEN - 1) & !(N as u32 - 1);
        let window = (address >> SHIFT) as usize;

        if let Some(direct) = self.direct[window] {
            let offset = direct.offset(address, Self::WINDOW_LEN);
            banks.write(direct.bank, offset, bytes);
            return WriteOutcome::Unique { bank: direct.bank, offset };
        }

        let mask = self.masks[window];
        for bank in mask {
            banks.write(bank, (address & bank.addr_mask()) as usize, bytes);
        }
        WriteOutcome::Shared(mask)
    }
}

impl<const WINDOWS: usize, const SHIFT: u32> Default for WindowTable<WINDOWS, SHIFT> {
    fn default() -> Self {
        Self::new()
    }
}

// Only the masks are persisted; direct windows are derived state
impl<const WINDOWS: usize, const SHIFT: u32> Encode for WindowTable<WINDOWS, SHIFT> {
    fn encode<E: Encoder>(&self, encoder: &mut E) -> Result<(), EncodeError> {
        self.masks.encode(encoder)
    }
}

impl<const WINDOWS: usize, const SHIFT: u32, Context> Decode<Context>
    for WindowTable<WINDOWS, SHIFT>
{
    fn decode<D: Decoder<Context = Context>>(decoder: &mut D) -> Result<Self, DecodeError> {
        let masks = <[BankMask; WINDOWS]>::decode(decoder)?;
        Ok(Self::from_masks(masks))
    }
}

impl<'de, const WINDOWS: usize, const SHIFT: u32, Context> BorrowDecode<'de, Context>
    for WindowTable<WINDOWS, SHIFT>
{
    fn borrow_decode<D: BorrowDecoder<'de, Context = Context>>(
        decoder: &mut D,
    ) -> Result<Self, DecodeError> {
        let masks = <[BankMask; WINDOWS]>::decode(decoder)?;
        Ok(Self::from_masks(masks))
    }
}

/// Window mask storage that a bank can be mapped into or out of.
trait MaskTable {
    fn map_range(&mut self, base: usize, count: usize, bank: BankId);

    fn unmap_range(&mut self, base: usize, count: usize, bank: BankId);
}

impl<const WINDOWS: usize, const SHIFT: u32> MaskTable for WindowTable<WINDOWS, SHIFT> {
    fn map_range(&mut self, base: usize, count: usize, bank: BankId) {
        for window in base..base + count {
            self.masks[window].insert(bank);
            self.refresh_direct(window);
        }
    }

    fn unmap_range(&mut self, base: usize, count: usize, bank: BankId) {
        for window in base..base + count {
            self.masks[window].remove(bank);
            self.refresh_direct(window);
        }
    }
}

// LCDC is indexed by bank rather than by address window
impl MaskTable for BankMask {
    fn map_range(&mut self, _base: usize, _count: usize, bank: BankId) {
        self.insert(bank);
    }

    fn unmap_range(&mut self, _base: usize, _count: usize, bank: BankId) {
        self.remove(bank);
    }
}

pub type ABgTable = WindowTable<32, 14>;
pub type AObjTable = WindowTable<16, 14>;
pub type BBgTable = WindowTable<8, 14>;
pub type BObjTable = WindowTable<8, 14>;
pub type ABgExtPalTable = WindowTable<4, 13>;
pub type AObjExtPalTable = WindowTable<1, 13>;
pub type BBgExtPalTable = WindowTable<4, 13>;
pub type BObjExtPalTable = WindowTable<1, 13>;
pub type TextureTable = WindowTable<4, 17>;
pub type TexPalTable = WindowTable<8, 14>;
pub type Arm7Table = WindowTable<2, 17>;

#[derive(Debug, Clone, Default, Encode, Decode)]
pub(crate) struct Map {
    pub(crate) lcdc: BankMask,
    pub(crate) a_bg: ABgTable,
    pub(crate) a_obj: AObjTable,
    pub(crate) b_bg: BBgTable,
    pub(crate) b_obj: BObjTable,
    pub(crate) a_bg_ext_pal: ABgExtPalTable,
    pub(crate) a_obj_ext_pal: AObjExtPalTable,
    pub(crate) b_bg_ext_pal: BBgExtPalTable,
    pub(crate) b_obj_ext_pal: BObjExtPalTable,
    pub(crate) texture: TextureTable,
    pub(crate) tex_pal: TexPalTable,
    pub(crate) arm7: Arm7Table,
}

impl Map {
    fn table_mut(&mut self, destination: Destination) -> &mut dyn MaskTable {
        match destination {
            Destination::Lcdc => &mut self.lcdc,
            Destination::ABg => &mut self.a_bg,
            Destination::AObj => &mut self.a_obj,
            Destination::BBg => &mut self.b_bg,
            Destination::BObj => &mut self.b_obj,
            Destination::ABgExtPal => &mut self.a_bg_ext_pal,
            Destination::AObjExtPal => &mut self.a_obj_ext_pal,
            Destination::BBgExtPal => &mut self.b_bg_ext_pal,
            Destination::BObjExtPal => &mut self.b_obj_ext_pal,
            Destination::Texture => &mut self.texture,
            Destination::TexPal => &mut self.tex_pal,
            Destination::Arm7 => &mut self.arm7,
        }
    }

    pub(crate) fn mask(&self, destination: Destination, window: usize) -> BankMask {
        match destination {
            Destination::Lcdc => {
                let bank = BankId::ALL[window];
                if self.lcdc.contains(bank) { BankMask::from_bank(bank) } else { BankMask::EMPTY }
            }
            Destination::ABg => self.a_bg.mask(window),
            Destination::AObj => self.a_obj.mask(window),
            Destination::BBg => self.b_bg.mask(window),
            Destination::BObj => self.b_obj.mask(window),
            Destination::ABgExtPal => self.a_bg_ext_pal.mask(window),
            Destination::AObjExtPal => self.a_obj_ext_pal.mask(window),
            Destination::BBgExtPal => self.b_bg_ext_pal.mask(window),
            Destination::BObjExtPal => self.b_obj_ext_pal.mask(window),
            Destination::Texture => self.texture.mask(window),
            Destination::TexPal => self.tex_pal.mask(window),
            Destination::Arm7 => self.arm7.mask(window),
        }
    }

    pub(crate) fn apply(&mut self, mapping: &BankMapping, bank: BankId, map: bool) {
        let table = self.table_mut(mapping.destination);
        for &(base, count) in mapping.spans() {
            if map {
                table.map_range(base, count, bank);
            } else {
                table.unmap_range(base, count, bank);
            }
        }
    }
}

/// Where a bank control value places its bank.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct BankMapping {
    pub(crate) destination: Destination,
    spans: [(usize, usize); 2],
    span_count: usize,
}

impl BankMapping {
    fn new(destination: Destination, base: usize, count: usize) -> Self {
        Self { destination, spans: [(base, count), (0, 0)], span_count: 1 }
    }

    fn split(destination: Destination, first: (usize, usize), second: (usize, usize)) -> Self {
        Self { destination, spans: [first, second], span_count: 2 }
    }

    /// `(first window, window count)` pairs.
    pub(crate) fn spans(&self) -> &[(usize, usize)] {
        &self.spans[..self.span_count]
    }

    pub(crate) fn windows(&self) -> impl Iterator<Item = usize> + '_ {
        self.spans().iter().flat_map(|&(base, count)| base..base + count)
    }
}

/// Decode a (masked) control value into the windows it maps. Returns `None` for disabled banks
/// and for MST values that select nothing.
pub(crate) fn decode_mapping(bank: BankId, control: BankControl) -> Option<BankMapping> {
    use BankId::*;
    use Destination as Dst;

    if !control.enabled() {
        return None;
    }

    let ofs = control.offset() as usize;
    let mapping = match (bank, control.mst()) {
        (_, 0) => BankMapping::new(Dst::Lcdc, bank as usize, 1),
        (A | B | C | D, 1) => BankMapping::new(Dst::ABg, ofs * 8, 8),
        (A | B, 2) => BankMapping::new(Dst::AObj, (ofs & 1) * 8, 8),
        (A | B | C | D, 3) => BankMapping::new(Dst::Texture, ofs, 1),
        (C | D, 2) => BankMapping::new(Dst::Arm7, ofs & 1, 1),
        (C, 4) => BankMapping::new(Dst::BBg, 0, 8),
        (D, 4) => BankMapping::new(Dst::BObj, 0, 8),
        (E, 1) => BankMapping::new(Dst::ABg, 0, 4),
        (E, 2) => BankMapping::new(Dst::AObj, 0, 4),
        (E, 3) => BankMapping::new(Dst::TexPal, 0, 4),
        (E, 4) => BankMapping::new(Dst::ABgExtPal, 0, 4),
        (F | G, mst @ 1..=3) => {
            let base = (ofs & 1) + ((ofs & 2) << 1);
            match mst {
                1 => BankMapping::split(Dst::ABg, (base, 1), (base + 2, 1)),
                2 => BankMapping::split(Dst::AObj, (base, 1), (base + 2, 1)),
                _ => BankMapping::new(Dst::TexPal, base, 1),
            }
        }
        (F | G, 4) => BankMapping::new(Dst::ABgExtPal, (ofs & 1) * 2, 2),
        (F | G, 5) => BankMapping::new(Dst::AObjExtPal, 0, 1),
        (H, 1) => BankMapping::split(Dst::BBg, (0, 2), (4, 2)),
        (H, 2) => BankMapping::new(Dst::BBgExtPal, 0, 4),
        (I, 1) => BankMapping::split(Dst::BBg, (2, 2), (6, 2)),
        (I, 2) => BankMapping::new(Dst::BObj, 0, 8),
        (I, 3) => BankMapping::new(Dst::BObjExtPal, 0, 1),
        _ => return None,
    };

    Some(mapping)
}
