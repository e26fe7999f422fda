//! Palette RAM and OAM for the two 2D engines
//!
//! Both regions are 2 KiB and mirrored across their bus ranges. Address bit 10 selects the
//! engine: the low 1 KiB belongs to engine A and the high 1 KiB to engine B.

use crate::engine::{EngineId, EngineMemory};
use crate::vram::Vram;
use bincode::{Decode, Encode};
use nds_common::num::GetBit;

const PALETTE_RAM_LEN_HALFWORDS: usize = 1024;
const OAM_LEN_HALFWORDS: usize = 1024;

// Per engine: 256 BG colors + 256 OBJ colors, or 128 OAM entries
const ENGINE_LEN_HALFWORDS: usize = 512;

#[derive(Debug, Clone, Encode, Decode)]
pub struct EngineRam {
    palette_ram: Box<[u16; PALETTE_RAM_LEN_HALFWORDS]>,
    oam: Box<[u16; OAM_LEN_HALFWORDS]>,
}

impl EngineRam {
    #[must_use]
    pub fn new() -> Self {
        Self {
            palette_ram: Box::new([0; PALETTE_RAM_LEN_HALFWORDS]),
            oam: Box::new([0; OAM_LEN_HALFWORDS]),
        }
    }

    pub fn clear(&mut self) {
        self.palette_ram.fill(0);
        self.oam.fill(0);
    }

    /// Engine that owns the palette RAM or OAM halfword at `address`.
    #[must_use]
    pub fn engine_for_address(address: u32) -> EngineId {
        if address.bit(10) { EngineId::B } else { EngineId::A }
    }

    #[must_use]
    pub fn read_palette_ram(&self, address: u32) -> u16 {
        self.palette_ram[halfword_index(address, PALETTE_RAM_LEN_HALFWORDS)]
    }

    pub fn write_palette_ram(&mut self, address: u32, value: u16) {
        self.palette_ram[halfword_index(address, PALETTE_RAM_LEN_HALFWORDS)] = value;
    }

    #[must_use]
    pub fn read_oam(&self, address: u32) -> u16 {
        self.oam[halfword_index(address, OAM_LEN_HALFWORDS)]
    }

    pub fn write_oam(&mut self, address: u32, value: u16) {
        self.oam[halfword_index(address, OAM_LEN_HALFWORDS)] = value;
    }

    /// One engine's half of palette RAM, BG colors first.
    #[must_use]
    pub fn palette_ram(&self, engine: EngineId) -> &[u16] {
        let start = engine as usize * ENGINE_LEN_HALFWORDS;
        &self.palette_ram[start..start + ENGINE_LEN_HALFWORDS]
    }

    #[must_use]
    pub fn oam(&self, engine: EngineId) -> &[u16] {
        let start = engine as usize * ENGINE_LEN_HALFWORDS;
        &self.oam[start..start + ENGINE_LEN_HALFWORDS]
    }

    pub(crate) fn memory<'a>(&'a self, engine: EngineId, vram: &'a Vram) -> EngineMemory<'a> {
        EngineMemory { vram, palette_ram: self.palette_ram(engine), oam: self.oam(engine) }
    }
}

impl Default for EngineRam {
    fn default() -> Self {
        Self::new()
    }
}

fn halfword_index(address: u32, len_halfwords: usize) -> usize {
    ((address >> 1) as usize) & (len_halfwords - 1)
}
