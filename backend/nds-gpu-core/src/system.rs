//! Signals exchanged with the rest of the system: scheduling, interrupts and DMA triggers

use bincode::{Decode, Encode};
use nds_proc_macros::EnumAll;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Encode, Decode, EnumAll)]
pub enum Cpu {
    Arm9 = 0,
    Arm7 = 1,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Encode, Decode)]
pub enum Irq {
    VBlank = 0,
    HBlank = 1,
    VCountMatch = 2,
}

/// DMA start timings that the LCD controller triggers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Encode, Decode)]
pub enum DmaTiming {
    VBlank,
    HBlank,
    StartOfDisplay,
    DisplayFifo,
}

impl DmaTiming {
    /// Start mode number in the DMA controller's encoding; ARM7 modes are offset by 0x10.
    #[must_use]
    pub fn start_mode(self, cpu: Cpu) -> u8 {
        let mode = match self {
            Self::VBlank => 1,
            Self::HBlank => 2,
            Self::StartOfDisplay => 3,
            Self::DisplayFifo => 4,
        };

        match cpu {
            Cpu::Arm9 => mode,
            Cpu::Arm7 => 0x10 | mode,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Encode, Decode)]
pub enum LcdEvent {
    StartScanline(u32),
    StartHBlank(u32),
    FinishFrame(u32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Encode, Decode)]
pub enum GpuEvent {
    Lcd(LcdEvent),
    /// Display FIFO sample at pixel X
    DisplayFifo(u32),
}

/// Scheduling slot; scheduling an event replaces any pending event in the same channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Encode, Decode, EnumAll)]
pub enum EventChannel {
    Lcd = 0,
    DisplayFifo = 1,
}

impl GpuEvent {
    #[must_use]
    pub fn channel(self) -> EventChannel {
        match self {
            Self::Lcd(_) => EventChannel::Lcd,
            Self::DisplayFifo(_) => EventChannel::DisplayFifo,
        }
    }
}

/// Everything outside the GPU that scanline timing talks to.
pub trait GpuSystem {
    /// Current ARM9 bus cycle count.
    fn cycles(&self) -> u64;

    /// Schedule `event` at absolute time `target_cycles`, superseding any pending event in the
    /// same channel. Events scheduled for the same cycle must fire in scheduling order.
    fn schedule(&mut self, event: GpuEvent, target_cycles: u64);

    fn set_irq(&mut self, cpu: Cpu, irq: Irq);

    fn check_dmas(&mut self, cpu: Cpu, timing: DmaTiming);

    fn stop_dmas(&mut self, cpu: Cpu, timing: DmaTiming);

    /// Whether any enabled DMA channel uses the given start timing.
    fn dmas_in_mode(&self, cpu: Cpu, timing: DmaTiming) -> bool;
}
