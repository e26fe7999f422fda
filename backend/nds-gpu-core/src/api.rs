//! NDS GPU public interface

#[cfg(test)]
mod tests;

use crate::engine::{DisplayEngine, Engine3d, EngineId, Screen};
use crate::engine_ram::EngineRam;
use crate::framebuffer::{CLEAR_COLOR, Framebuffers};
use crate::lcd::LcdState;
use crate::vram::{BankId, ExtPalInvalidation, Vram};
use bincode::error::{DecodeError, EncodeError};
use bincode::{Decode, Encode};
use nds_common::num::GetBit;
use nds_config::NdsRenderer;
use thiserror::Error;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Encode, Decode)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct NdsGpuConfig {
    pub renderer: NdsRenderer,
}

#[derive(Debug, Error)]
pub enum GpuStateError {
    #[error("Error encoding GPU state: {0}")]
    Encode(#[from] EncodeError),
    #[error("Error decoding GPU state: {0}")]
    Decode(#[from] DecodeError),
    #[error("GPU state has {0} unexpected trailing bytes")]
    TrailingBytes(usize),
}

/// The VRAM controller, palette RAM and OAM, LCD timing and framebuffers, plus the engines that
/// render from them.
#[derive(Debug)]
pub struct Gpu<E, R> {
    pub(crate) vram: Vram,
    pub(crate) engine_ram: EngineRam,
    pub(crate) lcd: LcdState,
    pub(crate) engine_a: E,
    pub(crate) engine_b: E,
    pub(crate) engine_3d: R,
    pub(crate) framebuffers: Framebuffers,
    pub(crate) power_control: u16,
    pub(crate) config: NdsGpuConfig,
}

impl<E: DisplayEngine, R: Engine3d> Gpu<E, R> {
    #[must_use]
    pub fn new(engine_a: E, engine_b: E, engine_3d: R, config: NdsGpuConfig) -> Self {
        let mut gpu = Self {
            vram: Vram::new(),
            engine_ram: EngineRam::new(),
            lcd: LcdState::new(),
            engine_a,
            engine_b,
            engine_3d,
            framebuffers: Framebuffers::new(config.renderer),
            power_control: 0,
            config,
        };

        let accelerated = config.renderer.is_accelerated();
        gpu.engine_a.set_render_settings(accelerated);
        gpu.engine_b.set_render_settings(accelerated);

        gpu.reset();

        gpu
    }

    pub fn reset(&mut self) {
        log::debug!("Resetting GPU");

        self.vram.reset();
        self.engine_ram.clear();

        let front_buffer = self.lcd.front_buffer;
        self.lcd = LcdState { front_buffer, ..LcdState::new() };

        self.framebuffers.fill(CLEAR_COLOR);

        self.engine_a.reset();
        self.engine_b.reset();
        self.engine_3d.reset();

        // Engine A starts out on the bottom screen regardless of POWCNT1
        let targets = self.framebuffers.assign(self.lcd.front_buffer, false);
        self.engine_a.set_framebuffer(targets[EngineId::A as usize]);
        self.engine_b.set_framebuffer(targets[EngineId::B as usize]);
    }

    pub fn reload_config(&mut self, config: NdsGpuConfig) {
        let renderer_changed = config.renderer != self.config.renderer;
        self.config = config;

        if renderer_changed {
            log::info!("GPU renderer changed to {}", config.renderer);

            let accelerated = config.renderer.is_accelerated();
            self.engine_a.set_render_settings(accelerated);
            self.engine_b.set_render_settings(accelerated);

            self.framebuffers = Framebuffers::new(config.renderer);
            self.assign_framebuffers();
        }
    }

    pub(crate) fn assign_framebuffers(&mut self) {
        let swap = self.power_control.bit(15);
        let [a, b] = self.framebuffers.assign(self.lcd.front_buffer, swap);
        self.engine_a.set_framebuffer(a);
        self.engine_b.set_framebuffer(b);
    }

    /// VRAMCNT_A-I write. Engines are told about any extended palette slots that went stale.
    pub fn write_bank_control(&mut self, bank: BankId, value: u8) {
        let invalidation = self.vram.write_bank_control(bank, value);
        self.apply_ext_pal_invalidation(invalidation);
    }

    fn apply_ext_pal_invalidation(&mut self, invalidation: ExtPalInvalidation) {
        if invalidation.is_empty() {
            return;
        }

        for (id, engine) in [(EngineId::A, &mut self.engine_a), (EngineId::B, &mut self.engine_b)]
        {
            for base_slot in invalidation.bg_base_slots(id) {
                engine.bg_ext_pal_dirty(base_slot);
            }

            if invalidation.obj(id) {
                engine.obj_ext_pal_dirty();
            }
        }
    }

    #[must_use]
    pub fn read_bank_control(&self, bank: BankId) -> u8 {
        self.vram.bank_control(bank)
    }

    /// VRAMSTAT (ARM7 side)
    #[must_use]
    pub fn read_vramstat(&self) -> u8 {
        self.vram.arm7_status()
    }

    #[must_use]
    pub fn read_power_control(&self) -> u16 {
        self.power_control
    }

    /// POWCNT1 write.
    pub fn write_power_control(&mut self, value: u16) {
        log::debug!(
            "POWCNT1 write: {value:04X} (engine A={}, engine B={}, 3D geometry={}, 3D rendering={}, swap={})",
            value.bit(1),
            value.bit(9),
            value.bit(3),
            value.bit(2),
            value.bit(15)
        );

        if !value.bit(0) {
            log::warn!("POWCNT1 bit 0 (LCD power) cleared: {value:04X}");
        }

        self.power_control = value;

        self.engine_a.set_enabled(value.bit(1));
        self.engine_b.set_enabled(value.bit(9));
        self.engine_3d.set_enabled(value.bit(3), value.bit(2));

        self.assign_framebuffers();
    }

    fn engine_powered(&self, engine: EngineId) -> bool {
        match engine {
            EngineId::A => self.power_control.bit(1),
            EngineId::B => self.power_control.bit(9),
        }
    }

    /// Palette RAM read ($05000000-$05FFFFFF). An engine's half reads as zero while that engine
    /// is powered off.
    #[must_use]
    pub fn read_palette_ram(&self, address: u32) -> u16 {
        if self.engine_powered(EngineRam::engine_for_address(address)) {
            self.engine_ram.read_palette_ram(address)
        } else {
            0
        }
    }

    /// Palette RAM write. Writes to a powered-off engine's half are dropped.
    pub fn write_palette_ram(&mut self, address: u32, value: u16) {
        if self.engine_powered(EngineRam::engine_for_address(address)) {
            self.engine_ram.write_palette_ram(address, value);
        } else {
            log::trace!("Dropped palette RAM write to powered-off engine: {address:08X}");
        }
    }

    /// OAM read ($07000000-$07FFFFFF), gated by engine power the same way as palette RAM.
    #[must_use]
    pub fn read_oam(&self, address: u32) -> u16 {
        if self.engine_powered(EngineRam::engine_for_address(address)) {
            self.engine_ram.read_oam(address)
        } else {
            0
        }
    }

    pub fn write_oam(&mut self, address: u32, value: u16) {
        if self.engine_powered(EngineRam::engine_for_address(address)) {
            self.engine_ram.write_oam(address, value);
        } else {
            log::trace!("Dropped OAM write to powered-off engine: {address:08X}");
        }
    }

    /// Palette RAM and OAM contents, ignoring engine power.
    #[must_use]
    pub fn engine_ram(&self) -> &EngineRam {
        &self.engine_ram
    }

    #[must_use]
    pub fn vram(&self) -> &Vram {
        &self.vram
    }

    /// Direct access for the bus. Bank control writes must go through
    /// [`Self::write_bank_control`] so that engines see palette invalidations.
    pub fn vram_mut(&mut self) -> &mut Vram {
        &mut self.vram
    }

    #[must_use]
    pub fn engine(&self, id: EngineId) -> &E {
        match id {
            EngineId::A => &self.engine_a,
            EngineId::B => &self.engine_b,
        }
    }

    pub fn engine_mut(&mut self, id: EngineId) -> &mut E {
        match id {
            EngineId::A => &mut self.engine_a,
            EngineId::B => &mut self.engine_b,
        }
    }

    #[must_use]
    pub fn engine_3d(&self) -> &R {
        &self.engine_3d
    }

    pub fn engine_3d_mut(&mut self) -> &mut R {
        &mut self.engine_3d
    }

    #[must_use]
    pub fn config(&self) -> NdsGpuConfig {
        self.config
    }

    /// The most recently completed frame for `screen`.
    #[must_use]
    pub fn front_framebuffer(&self, screen: Screen) -> &[u32] {
        self.framebuffers.buffer(self.lcd.front_buffer, screen)
    }

    #[must_use]
    pub fn front_buffer_index(&self) -> usize {
        self.lcd.front_buffer
    }
}

impl<E, R> Gpu<E, R>
where
    E: DisplayEngine + Encode + Decode<()>,
    R: Engine3d + Encode + Decode<()>,
{
    /// # Errors
    ///
    /// Returns an error if encoding fails, which only happens if an engine's own encoding fails.
    pub fn save_state(&self) -> Result<Vec<u8>, GpuStateError> {
        let state = (
            &self.vram,
            &self.engine_ram,
            &self.lcd,
            self.power_control,
            &self.engine_a,
            &self.engine_b,
            &self.engine_3d,
        );
        let bytes = bincode::encode_to_vec(state, bincode::config::standard())?;

        log::debug!("Saved GPU state ({} bytes)", bytes.len());

        Ok(bytes)
    }

    /// Restore state written by [`Self::save_state`]. Mapping caches are rebuilt and every VRAM
    /// bank is reported dirty to the next reconciliation.
    ///
    /// # Errors
    ///
    /// Returns an error if `bytes` is not a valid GPU state. The current state is left untouched
    /// in that case.
    pub fn load_state(&mut self, bytes: &[u8]) -> Result<(), GpuStateError> {
        let ((vram, engine_ram, lcd, power_control, engine_a, engine_b, engine_3d), bytes_read): (
            (Vram, EngineRam, LcdState, u16, E, E, R),
            usize,
        ) = bincode::decode_from_slice(bytes, bincode::config::standard())?;

        if bytes_read != bytes.len() {
            return Err(GpuStateError::TrailingBytes(bytes.len() - bytes_read));
        }

        self.vram = vram;
        self.engine_ram = engine_ram;
        self.lcd = lcd;
        self.power_control = power_control;
        self.engine_a = engine_a;
        self.engine_b = engine_b;
        self.engine_3d = engine_3d;

        self.assign_framebuffers();

        log::debug!("Loaded GPU state ({bytes_read} bytes)");

        Ok(())
    }
}
