//! Interfaces to the 2D display engines and the 3D engine
//!
//! The GPU core owns VRAM, palette RAM and OAM, and drives scanline timing; the engines themselves
//! only read that memory and receive per-line callbacks.

use crate::vram::Vram;
use bincode::{Decode, Encode};
use nds_proc_macros::EnumAll;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Encode, Decode, EnumAll)]
pub enum EngineId {
    A = 0,
    B = 1,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Encode, Decode)]
pub enum Screen {
    Top = 0,
    Bottom = 1,
}

/// Framebuffer that an engine should draw into until the next reassignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Encode, Decode)]
pub struct FramebufferTarget {
    /// Index of the back buffer in the double-buffered pair
    pub buffer: usize,
    pub screen: Screen,
}

/// Memory an engine renders from.
#[derive(Debug, Clone, Copy)]
pub struct EngineMemory<'a> {
    pub vram: &'a Vram,
    /// This engine's 512 palette RAM entries: 256 BG colors, then 256 OBJ colors
    pub palette_ram: &'a [u16],
    /// This engine's 128 OAM entries, 4 halfwords each
    pub oam: &'a [u16],
}

pub trait DisplayEngine {
    fn reset(&mut self);

    fn set_enabled(&mut self, enabled: bool);

    /// Called on construction of the GPU and whenever the renderer changes. Accelerated output
    /// lines are `3 * 256 + 1` pixels wide.
    fn set_render_settings(&mut self, accelerated: bool);

    /// Render `line` into `output`, the line's row of this engine's current framebuffer.
    fn draw_scanline(&mut self, line: u32, memory: EngineMemory<'_>, output: &mut [u32]);

    /// Sprites are evaluated one line ahead of the background layers.
    fn draw_sprites(&mut self, line: u32, memory: EngineMemory<'_>);

    /// Recompute window visibility for the new VCOUNT.
    fn check_windows(&mut self, vcount: u32);

    fn vblank(&mut self);

    fn vblank_end(&mut self);

    fn set_framebuffer(&mut self, target: FramebufferTarget);

    /// BG extended palette slots `base_slot` and `base_slot + 1` were remapped.
    fn bg_ext_pal_dirty(&mut self, base_slot: usize);

    fn obj_ext_pal_dirty(&mut self);

    /// Whether display capture or main memory display currently reads the display FIFO.
    fn uses_fifo(&self) -> bool;

    fn sample_fifo(&mut self, x: u32, pixels: u32);
}

pub trait Engine3d {
    fn reset(&mut self);

    fn set_enabled(&mut self, geometry: bool, rendering: bool);

    fn vblank(&mut self);

    fn vcount_144(&mut self);

    fn vcount_215(&mut self);

    /// Read back and composite the finished frame. Only called with the accelerated renderer.
    fn composite_frame(&mut self) {}
}
