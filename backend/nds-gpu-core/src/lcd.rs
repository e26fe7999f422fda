//! LCD timing: scanline and frame sequencing, DISPSTAT/VCOUNT, and the display FIFO
//!
//! Every phase change runs as a scheduled event. A line is 2130 ARM9 cycles long: the line starts
//! (StartScanline), HBlank begins 1584 cycles later (StartHBlank), and the next line starts at the
//! end of HBlank. After line 262 the frame ends (FinishFrame) and the next one starts immediately.


use crate::api::Gpu;
use crate::engine::{DisplayEngine, Engine3d, EngineId};
use crate::system::{Cpu, DmaTiming, GpuEvent, GpuSystem, Irq, LcdEvent};
use bincode::{Decode, Encode};
use nds_common::num::GetBit;
use std::ops::Range;

pub const LINE_CYCLES: u64 = 355 * 6;
pub const HBLANK_CYCLES: u64 = 48 + 256 * 6;
pub const LINES_PER_FRAME: u32 = 263;

const VISIBLE_LINES: u32 = 192;
const VBLANK_START: u32 = VISIBLE_LINES;
const LAST_LINE: u32 = LINES_PER_FRAME - 1;

// Start-of-display DMA is eligible while VCOUNT is in this range and stopped at its end
const START_OF_DISPLAY_DMA_LINES: Range<u32> = 2..194;

// The FIFO starts 16 cycles before display start, so the first sample is not 8-pixel aligned
const FIFO_FIRST_SAMPLE_CYCLES: u64 = 32;
const FIFO_SAMPLE_CYCLES: u64 = 6 * 8;

const VBLANK_FLAG: u16 = 1 << 0;
const HBLANK_FLAG: u16 = 1 << 1;
const VCOUNT_MATCH_BIT: u8 = 2;

// Status bits and bit 6 are read-only
const DISPSTAT_READ_ONLY_MASK: u16 = 0x0047;
const DISPSTAT_WRITE_MASK: u16 = 0xFFB8;

#[derive(Debug, Clone, Encode, Decode)]
pub(crate) struct LcdState {
    pub(crate) vcount: u32,
    pub(crate) next_vcount: Option<u32>,
    pub(crate) total_scanlines: u32,
    // DISPSTAT and its VCOUNT match target, per CPU
    pub(crate) dispstat: [u16; 2],
    pub(crate) vmatch: [u16; 2],
    pub(crate) run_fifo: bool,
    pub(crate) front_buffer: usize,
    pub(crate) frame_complete: bool,
}

impl LcdState {
    pub(crate) fn new() -> Self {
        Self {
            vcount: 0,
            next_vcount: None,
            total_scanlines: 0,
            dispstat: [0; 2],
            vmatch: [0; 2],
            run_fifo: false,
            front_buffer: 0,
            frame_complete: false,
        }
    }
}

impl<E: DisplayEngine, R: Engine3d> Gpu<E, R> {
    /// Start line 0 of a new frame. Hosts call this once after reset; frames then chain through
    /// [`Self::handle_event`].
    pub fn start_frame(&mut self, system: &mut impl GpuSystem) {
        let cycles = system.cycles();
        self.start_frame_at(cycles, system);
    }

    /// Dispatch an event previously passed to [`GpuSystem::schedule`]. `cycles` is the cycle
    /// count the event was scheduled for.
    pub fn handle_event(&mut self, event: GpuEvent, cycles: u64, system: &mut impl GpuSystem) {
        match event {
            GpuEvent::Lcd(LcdEvent::StartScanline(line)) => {
                self.start_scanline(line, cycles, system);
            }
            GpuEvent::Lcd(LcdEvent::StartHBlank(line)) => self.start_hblank(line, cycles, system),
            GpuEvent::Lcd(LcdEvent::FinishFrame(lines)) => self.finish_frame(lines, cycles, system),
            GpuEvent::DisplayFifo(x) => self.display_fifo(x, cycles, system),
        }
    }

    fn start_frame_at(&mut self, cycles: u64, system: &mut impl GpuSystem) {
        // Only run the display FIFO if it is used for display/capture or a DMA channel feeds it
        self.lcd.run_fifo = self.engine_a.uses_fifo()
            || system.dmas_in_mode(Cpu::Arm9, DmaTiming::DisplayFifo);

        self.start_scanline(0, cycles, system);
    }

    fn start_scanline(&mut self, line: u32, cycles: u64, system: &mut impl GpuSystem) {
        let lcd = &mut self.lcd;

        let next_vcount = lcd.next_vcount.take();
        lcd.vcount = match (line, next_vcount) {
            (0, _) => 0,
            (_, Some(vcount)) => vcount,
            (_, None) => lcd.vcount + 1,
        };
        let vcount = lcd.vcount;

        log::trace!("Starting line {line} with VCOUNT={vcount}");

        for cpu in Cpu::ALL {
            let stat = &mut lcd.dispstat[cpu as usize];
            *stat &= !HBLANK_FLAG;

            let matched = vcount == u32::from(lcd.vmatch[cpu as usize]);
            *stat = stat.with_bit(VCOUNT_MATCH_BIT, matched);
            if matched && stat.bit(5) {
                system.set_irq(cpu, Irq::VCountMatch);
            }
        }

        self.engine_a.check_windows(vcount);
        self.engine_b.check_windows(vcount);

        if START_OF_DISPLAY_DMA_LINES.contains(&vcount) {
            system.check_dmas(Cpu::Arm9, DmaTiming::StartOfDisplay);
        } else if vcount == START_OF_DISPLAY_DMA_LINES.end {
            system.stop_dmas(Cpu::Arm9, DmaTiming::StartOfDisplay);
        }

        if line < VISIBLE_LINES {
            if line == 0 {
                self.engine_a.vblank_end();
                self.engine_b.vblank_end();
            }

            if self.lcd.run_fifo {
                let fifo_cycles = cycles + FIFO_FIRST_SAMPLE_CYCLES;
                system.schedule(GpuEvent::DisplayFifo(0), fifo_cycles);
            }
        }

        if vcount == LAST_LINE {
            for stat in &mut self.lcd.dispstat {
                *stat &= !VBLANK_FLAG;
            }
        } else if vcount == VBLANK_START {
            self.start_vblank(system);
        } else if vcount == 144 {
            self.engine_3d.vcount_144();
        }

        system.schedule(GpuEvent::Lcd(LcdEvent::StartHBlank(line)), cycles + HBLANK_CYCLES);
    }

    fn start_vblank(&mut self, system: &mut impl GpuSystem) {
        log::trace!("VBlank start");

        for stat in &mut self.lcd.dispstat {
            *stat |= VBLANK_FLAG;
        }

        system.stop_dmas(Cpu::Arm9, DmaTiming::DisplayFifo);

        system.check_dmas(Cpu::Arm9, DmaTiming::VBlank);
        system.check_dmas(Cpu::Arm7, DmaTiming::VBlank);

        for cpu in Cpu::ALL {
            if self.lcd.dispstat[cpu as usize].bit(3) {
                system.set_irq(cpu, Irq::VBlank);
            }
        }

        self.engine_a.vblank();
        self.engine_b.vblank();
        self.engine_3d.vblank();

        if self.config.renderer.is_accelerated() {
            self.engine_3d.composite_frame();
        }
    }

    fn start_hblank(&mut self, line: u32, cycles: u64, system: &mut impl GpuSystem) {
        for stat in &mut self.lcd.dispstat {
            *stat |= HBLANK_FLAG;
        }

        let vcount = self.lcd.vcount;
        if vcount < VISIBLE_LINES {
            if line < VISIBLE_LINES {
                let memory = self.engine_ram.memory(EngineId::A, &self.vram);
                let output = self.framebuffers.line_mut(EngineId::A, line);
                self.engine_a.draw_scanline(line, memory, output);

                let memory = self.engine_ram.memory(EngineId::B, &self.vram);
                let output = self.framebuffers.line_mut(EngineId::B, line);
                self.engine_b.draw_scanline(line, memory, output);
            }

            // Sprites are rendered one line in advance
            if line < VISIBLE_LINES - 1 {
                let ram = &self.engine_ram;
                self.engine_a.draw_sprites(line + 1, ram.memory(EngineId::A, &self.vram));
                self.engine_b.draw_sprites(line + 1, ram.memory(EngineId::B, &self.vram));
            }

            system.check_dmas(Cpu::Arm9, DmaTiming::HBlank);
        } else if vcount == 215 {
            self.engine_3d.vcount_215();
        } else if vcount == LAST_LINE {
            self.engine_a.draw_sprites(0, self.engine_ram.memory(EngineId::A, &self.vram));
            self.engine_b.draw_sprites(0, self.engine_ram.memory(EngineId::B, &self.vram));
        }

        for cpu in Cpu::ALL {
            if self.lcd.dispstat[cpu as usize].bit(4) {
                system.set_irq(cpu, Irq::HBlank);
            }
        }

        let next_line_cycles = cycles + (LINE_CYCLES - HBLANK_CYCLES);
        let event = if vcount < LAST_LINE {
            LcdEvent::StartScanline(line + 1)
        } else {
            LcdEvent::FinishFrame(line + 1)
        };
        system.schedule(GpuEvent::Lcd(event), next_line_cycles);
    }

    fn finish_frame(&mut self, lines: u32, cycles: u64, system: &mut impl GpuSystem) {
        log::trace!("Frame finished after {lines} lines");

        self.lcd.front_buffer ^= 1;
        self.assign_framebuffers();

        self.lcd.total_scanlines = lines;
        self.lcd.frame_complete = true;

        self.start_frame_at(cycles, system);
    }

    fn display_fifo(&mut self, x: u32, cycles: u64, system: &mut impl GpuSystem) {
        if x == 8 {
            self.engine_a.sample_fifo(0, 5);
        } else if x > 8 {
            self.engine_a.sample_fifo(x - 11, 8);
        }

        if x < 256 {
            // Transfer the next 8 pixels
            system.check_dmas(Cpu::Arm9, DmaTiming::DisplayFifo);
            system.schedule(GpuEvent::DisplayFifo(x + 8), cycles + FIFO_SAMPLE_CYCLES);
        } else {
            self.engine_a.sample_fifo(253, 3);
        }
    }

    #[must_use]
    pub fn read_dispstat(&self, cpu: Cpu) -> u16 {
        self.lcd.dispstat[cpu as usize]
    }

    pub fn write_dispstat(&mut self, cpu: Cpu, value: u16) {
        let value = value & DISPSTAT_WRITE_MASK;
        let stat = &mut self.lcd.dispstat[cpu as usize];
        *stat = (*stat & DISPSTAT_READ_ONLY_MASK) | value;

        // 9-bit match target; bit 8 of the target is DISPSTAT bit 7
        let vmatch = (value >> 8) | ((value & 0x80) << 1);
        self.lcd.vmatch[cpu as usize] = vmatch;

        log::debug!(
            "{cpu:?} DISPSTAT write: {value:04X} (VBlank IRQ={}, HBlank IRQ={}, VCOUNT IRQ={}, VCOUNT target={vmatch})",
            value.bit(3),
            value.bit(4),
            value.bit(5)
        );
    }

    #[must_use]
    pub fn read_vcount(&self) -> u16 {
        self.lcd.vcount as u16
    }

    /// VCOUNT writes take effect at the start of the next line.
    pub fn write_vcount(&mut self, value: u16) {
        let value = u32::from(value & 0x1FF);
        if self.lcd.vcount < VBLANK_START {
            log::warn!("VCOUNT write {value} during active display (VCOUNT={})", self.lcd.vcount);
        } else {
            log::debug!("VCOUNT write {value} (VCOUNT={})", self.lcd.vcount);
        }

        self.lcd.next_vcount = Some(value);
    }

    #[must_use]
    pub fn vcount(&self) -> u32 {
        self.lcd.vcount
    }

    /// Number of lines in the most recently completed frame.
    #[must_use]
    pub fn total_scanlines(&self) -> u32 {
        self.lcd.total_scanlines
    }

    #[must_use]
    pub fn frame_complete(&self) -> bool {
        self.lcd.frame_complete
    }

    pub fn clear_frame_complete(&mut self) {
        self.lcd.frame_complete = false;
    }
}
