//! Recording engines and a scheduler-backed system for driving whole frames in tests

use crate::api::{Gpu, NdsGpuConfig};
use crate::engine::{DisplayEngine, Engine3d, EngineMemory, FramebufferTarget};
use crate::scheduler::Scheduler;
use crate::system::{Cpu, DmaTiming, GpuEvent, GpuSystem, Irq};
use bincode::{Decode, Encode};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Encode, Decode)]
pub(crate) enum EngineCall {
    SetRenderSettings(bool),
    Reset,
    SetEnabled(bool),
    DrawScanline(u32),
    DrawSprites(u32),
    CheckWindows(u32),
    VBlank,
    VBlankEnd,
    SetFramebuffer(FramebufferTarget),
    BgExtPalDirty(usize),
    ObjExtPalDirty,
    SampleFifo(u32, u32),
}

#[derive(Debug, Clone, Default, Encode, Decode)]
pub(crate) struct MockEngine {
    pub(crate) calls: Vec<EngineCall>,
    pub(crate) uses_fifo: bool,
    /// Each drawn line is filled with `color | line`
    pub(crate) color: u32,
    /// Palette RAM entry 0 and OAM entry 0 as of the last drawn line
    pub(crate) seen_memory: Option<(u16, u16)>,
}

impl MockEngine {
    pub(crate) fn new(color: u32) -> Self {
        Self { calls: Vec::new(), uses_fifo: false, color, seen_memory: None }
    }

    pub(crate) fn count(&self, predicate: impl Fn(&EngineCall) -> bool) -> usize {
        self.calls.iter().filter(|&call| predicate(call)).count()
    }

    /// Most recent framebuffer assignment.
    pub(crate) fn framebuffer(&self) -> Option<FramebufferTarget> {
        self.calls.iter().rev().find_map(|call| match call {
            EngineCall::SetFramebuffer(target) => Some(*target),
            _ => None,
        })
    }
}

impl DisplayEngine for MockEngine {
    fn set_render_settings(&mut self, accelerated: bool) {
        self.calls.push(EngineCall::SetRenderSettings(accelerated));
    }

    fn reset(&mut self) {
        self.calls.push(EngineCall::Reset);
    }

    fn set_enabled(&mut self, enabled: bool) {
        self.calls.push(EngineCall::SetEnabled(enabled));
    }

    fn draw_scanline(&mut self, line: u32, memory: EngineMemory<'_>, output: &mut [u32]) {
        self.calls.push(EngineCall::DrawScanline(line));
        self.seen_memory = Some((memory.palette_ram[0], memory.oam[0]));
        output.fill(self.color | line);
    }

    fn draw_sprites(&mut self, line: u32, _memory: EngineMemory<'_>) {
        self.calls.push(EngineCall::DrawSprites(line));
    }

    fn check_windows(&mut self, vcount: u32) {
        self.calls.push(EngineCall::CheckWindows(vcount));
    }

    fn vblank(&mut self) {
        self.calls.push(EngineCall::VBlank);
    }

    fn vblank_end(&mut self) {
        self.calls.push(EngineCall::VBlankEnd);
    }

    fn set_framebuffer(&mut self, target: FramebufferTarget) {
        self.calls.push(EngineCall::SetFramebuffer(target));
    }

    fn bg_ext_pal_dirty(&mut self, base_slot: usize) {
        self.calls.push(EngineCall::BgExtPalDirty(base_slot));
    }

    fn obj_ext_pal_dirty(&mut self) {
        self.calls.push(EngineCall::ObjExtPalDirty);
    }

    fn uses_fifo(&self) -> bool {
        self.uses_fifo
    }

    fn sample_fifo(&mut self, x: u32, pixels: u32) {
        self.calls.push(EngineCall::SampleFifo(x, pixels));
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Encode, Decode)]
pub(crate) enum Engine3dCall {
    Reset,
    SetEnabled { geometry: bool, rendering: bool },
    VBlank,
    VCount144,
    VCount215,
    CompositeFrame,
}

#[derive(Debug, Clone, Default, Encode, Decode)]
pub(crate) struct MockEngine3d {
    pub(crate) calls: Vec<Engine3dCall>,
}

impl MockEngine3d {
    pub(crate) fn count(&self, call: Engine3dCall) -> usize {
        self.calls.iter().filter(|&&c| c == call).count()
    }
}

impl Engine3d for MockEngine3d {
    fn reset(&mut self) {
        self.calls.push(Engine3dCall::Reset);
    }

    fn set_enabled(&mut self, geometry: bool, rendering: bool) {
        self.calls.push(Engine3dCall::SetEnabled { geometry, rendering });
    }

    fn vblank(&mut self) {
        self.calls.push(Engine3dCall::VBlank);
    }

    fn vcount_144(&mut self) {
        self.calls.push(Engine3dCall::VCount144);
    }

    fn vcount_215(&mut self) {
        self.calls.push(Engine3dCall::VCount215);
    }

    fn composite_frame(&mut self) {
        self.calls.push(Engine3dCall::CompositeFrame);
    }
}

#[derive(Debug, Clone)]
pub(crate) struct MockSystem {
    pub(crate) scheduler: Scheduler,
    pub(crate) cycles: u64,
    pub(crate) irqs: Vec<(Cpu, Irq)>,
    pub(crate) dma_checks: Vec<(Cpu, DmaTiming)>,
    pub(crate) dma_stops: Vec<(Cpu, DmaTiming)>,
    pub(crate) fifo_dma_enabled: bool,
}

impl MockSystem {
    pub(crate) fn new() -> Self {
        Self {
            scheduler: Scheduler::new(),
            cycles: 0,
            irqs: Vec::new(),
            dma_checks: Vec::new(),
            dma_stops: Vec::new(),
            fifo_dma_enabled: false,
        }
    }

    pub(crate) fn irq_count(&self, cpu: Cpu, irq: Irq) -> usize {
        self.irqs.iter().filter(|&&entry| entry == (cpu, irq)).count()
    }

    pub(crate) fn dma_check_count(&self, cpu: Cpu, timing: DmaTiming) -> usize {
        self.dma_checks.iter().filter(|&&entry| entry == (cpu, timing)).count()
    }

    pub(crate) fn dma_stop_count(&self, cpu: Cpu, timing: DmaTiming) -> usize {
        self.dma_stops.iter().filter(|&&entry| entry == (cpu, timing)).count()
    }
}

impl GpuSystem for MockSystem {
    fn cycles(&self) -> u64 {
        self.cycles
    }

    fn schedule(&mut self, event: GpuEvent, target_cycles: u64) {
        self.scheduler.insert_or_update(event, target_cycles);
    }

    fn set_irq(&mut self, cpu: Cpu, irq: Irq) {
        self.irqs.push((cpu, irq));
    }

    fn check_dmas(&mut self, cpu: Cpu, timing: DmaTiming) {
        self.dma_checks.push((cpu, timing));
    }

    fn stop_dmas(&mut self, cpu: Cpu, timing: DmaTiming) {
        self.dma_stops.push((cpu, timing));
    }

    fn dmas_in_mode(&self, cpu: Cpu, timing: DmaTiming) -> bool {
        cpu == Cpu::Arm9 && timing == DmaTiming::DisplayFifo && self.fifo_dma_enabled
    }
}

pub(crate) type TestGpu = Gpu<MockEngine, MockEngine3d>;

pub(crate) const ENGINE_A_COLOR: u32 = 0xAAAA_0000;
pub(crate) const ENGINE_B_COLOR: u32 = 0xBBBB_0000;

pub(crate) fn new_gpu(config: NdsGpuConfig) -> TestGpu {
    Gpu::new(
        MockEngine::new(ENGINE_A_COLOR),
        MockEngine::new(ENGINE_B_COLOR),
        MockEngine3d::default(),
        config,
    )
}

/// Pop the next scheduled event, advance time to it, and run it.
pub(crate) fn step(gpu: &mut TestGpu, system: &mut MockSystem) -> (GpuEvent, u64) {
    let cycles = system.scheduler.next_event_cycles();
    let (event, cycles) = system.scheduler.pop(cycles).expect("no event scheduled");
    system.cycles = cycles;
    gpu.handle_event(event, cycles, system);
    (event, cycles)
}

/// Run events until a frame finishes and the next frame's line 0 has started.
pub(crate) fn run_frame(gpu: &mut TestGpu, system: &mut MockSystem) {
    gpu.clear_frame_complete();
    while !gpu.frame_complete() {
        step(gpu, system);
    }
}
