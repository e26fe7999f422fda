use super::*;
use crate::engine::FramebufferTarget;
use crate::system::Cpu;
use crate::testing::{
    ENGINE_B_COLOR, Engine3dCall, EngineCall, MockEngine, MockSystem, new_gpu, run_frame, step,
};
use crate::vram::{BankDirty, Destination};
use test_log::test;

fn ext_pal_calls(engine: &MockEngine) -> Vec<EngineCall> {
    engine
        .calls
        .iter()
        .copied()
        .filter(|call| matches!(call, EngineCall::BgExtPalDirty(_) | EngineCall::ObjExtPalDirty))
        .collect()
}

#[test]
fn new_gpu_starts_white_on_back_buffer() {
    let gpu = new_gpu(NdsGpuConfig::default());

    for screen in [Screen::Top, Screen::Bottom] {
        assert!(gpu.front_framebuffer(screen).iter().all(|&pixel| pixel == 0xFFFF_FFFF));
    }

    assert_eq!(
        gpu.engine(EngineId::A).calls,
        vec![
            EngineCall::SetRenderSettings(false),
            EngineCall::Reset,
            EngineCall::SetFramebuffer(FramebufferTarget { buffer: 1, screen: Screen::Bottom })
        ]
    );
    assert_eq!(
        gpu.engine(EngineId::B).calls,
        vec![
            EngineCall::SetRenderSettings(false),
            EngineCall::Reset,
            EngineCall::SetFramebuffer(FramebufferTarget { buffer: 1, screen: Screen::Top })
        ]
    );
    assert_eq!(gpu.engine_3d().calls, vec![Engine3dCall::Reset]);
}

#[test]
fn bank_control_reports_stale_extended_palettes() {
    let mut gpu = new_gpu(NdsGpuConfig::default());

    gpu.write_bank_control(BankId::E, 0x84);
    gpu.write_bank_control(BankId::E, 0x84);
    gpu.write_bank_control(BankId::G, 0x85);
    gpu.write_bank_control(BankId::I, 0x83);
    gpu.write_bank_control(BankId::A, 0x81);
    gpu.write_bank_control(BankId::E, 0x80);

    assert_eq!(
        ext_pal_calls(gpu.engine(EngineId::A)),
        vec![
            EngineCall::BgExtPalDirty(0),
            EngineCall::BgExtPalDirty(2),
            EngineCall::ObjExtPalDirty,
            EngineCall::BgExtPalDirty(0),
            EngineCall::BgExtPalDirty(2),
        ]
    );
    assert_eq!(ext_pal_calls(gpu.engine(EngineId::B)), vec![EngineCall::ObjExtPalDirty]);

    assert_eq!(gpu.read_bank_control(BankId::E), 0x80);
    let lcdc_e = gpu.vram().mapping(Destination::Lcdc, BankId::E as usize);
    assert_eq!(lcdc_e.single(), Some(BankId::E));
}

#[test]
fn vramstat_follows_bank_controls() {
    let mut gpu = new_gpu(NdsGpuConfig::default());
    assert_eq!(gpu.read_vramstat(), 0);

    gpu.write_bank_control(BankId::D, 0x82);
    assert_eq!(gpu.read_vramstat(), 0b10);

    gpu.write_bank_control(BankId::D, 0x84);
    assert_eq!(gpu.read_vramstat(), 0);
}

#[test]
fn power_control_enables_engines_and_routes_screens() {
    let mut gpu = new_gpu(NdsGpuConfig::default());

    gpu.write_power_control(0x820F);
    assert_eq!(gpu.read_power_control(), 0x820F);

    let engine_a = &gpu.engine(EngineId::A).calls;
    assert_eq!(
        &engine_a[engine_a.len() - 2..],
        &[
            EngineCall::SetEnabled(true),
            EngineCall::SetFramebuffer(FramebufferTarget { buffer: 1, screen: Screen::Top })
        ]
    );
    let engine_b = &gpu.engine(EngineId::B).calls;
    assert_eq!(
        &engine_b[engine_b.len() - 2..],
        &[
            EngineCall::SetEnabled(true),
            EngineCall::SetFramebuffer(FramebufferTarget { buffer: 1, screen: Screen::Bottom })
        ]
    );
    assert_eq!(
        gpu.engine_3d().calls.last(),
        Some(&Engine3dCall::SetEnabled { geometry: true, rendering: true })
    );

    gpu.engine_3d_mut().calls.clear();
    gpu.write_power_control(0x0003);

    let engine_b = &gpu.engine(EngineId::B).calls;
    assert_eq!(engine_b[engine_b.len() - 2], EngineCall::SetEnabled(false));
    assert_eq!(
        gpu.engine(EngineId::A).framebuffer(),
        Some(FramebufferTarget { buffer: 1, screen: Screen::Bottom })
    );
    assert_eq!(
        gpu.engine_3d().calls,
        vec![Engine3dCall::SetEnabled { geometry: false, rendering: false }]
    );
}

#[test]
fn reset_clears_state_but_keeps_buffer_parity() {
    let mut gpu = new_gpu(NdsGpuConfig::default());
    let mut system = MockSystem::new();
    gpu.write_bank_control(BankId::C, 0x84);
    gpu.vram_mut().write_arm9_word(0x0620_0000, 0x1234_5678);
    gpu.write_dispstat(Cpu::Arm9, 0x0008);
    gpu.write_power_control(0x0203);
    gpu.write_palette_ram(0x0500_0000, 0x7FFF);
    gpu.write_oam(0x0700_0400, 0x1234);
    gpu.start_frame(&mut system);
    run_frame(&mut gpu, &mut system);
    assert_eq!(gpu.front_buffer_index(), 1);

    gpu.reset();

    assert_eq!(gpu.read_palette_ram(0x0500_0000), 0);
    assert_eq!(gpu.read_oam(0x0700_0400), 0);

    assert_eq!(gpu.front_buffer_index(), 1);
    assert_eq!(gpu.read_bank_control(BankId::C), 0);
    assert_eq!(gpu.vram().read_arm9_word(0x0620_0000), 0);
    assert_eq!(gpu.read_dispstat(Cpu::Arm9), 0);
    assert_eq!(gpu.vcount(), 0);
    for screen in [Screen::Top, Screen::Bottom] {
        assert!(gpu.front_framebuffer(screen).iter().all(|&pixel| pixel == 0xFFFF_FFFF));
    }
    assert_eq!(
        gpu.engine(EngineId::A).framebuffer(),
        Some(FramebufferTarget { buffer: 0, screen: Screen::Bottom })
    );
}

#[test]
fn save_state_round_trip() {
    let mut gpu = new_gpu(NdsGpuConfig::default());
    let mut system = MockSystem::new();
    gpu.write_bank_control(BankId::A, 0x81);
    gpu.vram_mut().write_arm9_word(0x0600_0100, 0x1234_5678);
    gpu.write_dispstat(Cpu::Arm9, 0x0018);
    gpu.write_power_control(0x820F);
    gpu.write_palette_ram(0x0500_0402, 0x03E0);
    gpu.write_oam(0x0700_0006, 0x0123);
    gpu.start_frame(&mut system);
    while gpu.vcount() != 50 {
        step(&mut gpu, &mut system);
    }

    let bytes = gpu.save_state().unwrap();

    let mut restored = new_gpu(NdsGpuConfig::default());
    restored.load_state(&bytes).unwrap();

    assert_eq!(restored.vram().read_arm9_word(0x0600_0100), 0x1234_5678);
    assert_eq!(restored.read_bank_control(BankId::A), 0x81);
    assert_eq!(restored.read_dispstat(Cpu::Arm9), gpu.read_dispstat(Cpu::Arm9));
    assert_eq!(restored.read_power_control(), 0x820F);
    assert_eq!(restored.read_palette_ram(0x0500_0402), 0x03E0);
    assert_eq!(restored.read_oam(0x0700_0006), 0x0123);
    assert_eq!(restored.vcount(), 50);

    // Engine state comes along, then the engines are pointed at the restored back buffer
    let engine_a = restored.engine(EngineId::A);
    assert_eq!(engine_a.calls.len(), gpu.engine(EngineId::A).calls.len() + 1);
    assert_eq!(engine_a.framebuffer(), Some(FramebufferTarget { buffer: 1, screen: Screen::Top }));

    // Dirty bits are not saved
    assert_eq!(*restored.vram().bank_dirty(BankId::A), BankDirty::from_range(0, 256));
    assert_eq!(*restored.vram().bank_dirty(BankId::F), BankDirty::from_range(0, 32));

    // Both copies finish the frame identically from here on
    let mut restored_system = system.clone();
    run_frame(&mut gpu, &mut system);
    run_frame(&mut restored, &mut restored_system);
    assert_eq!(gpu.total_scanlines(), 263);
    assert_eq!(restored.total_scanlines(), 263);
    assert_eq!(restored_system.irqs, system.irqs);
    for screen in [Screen::Top, Screen::Bottom] {
        assert_eq!(
            restored.front_framebuffer(screen)[50 * 256..],
            gpu.front_framebuffer(screen)[50 * 256..]
        );
    }
    assert_eq!(restored.front_framebuffer(Screen::Bottom)[60 * 256], ENGINE_B_COLOR | 60);
}

#[test]
fn load_state_rejects_bad_input() {
    let mut gpu = new_gpu(NdsGpuConfig::default());
    gpu.write_bank_control(BankId::B, 0x80);
    let mut bytes = gpu.save_state().unwrap();

    gpu.write_bank_control(BankId::B, 0x00);

    bytes.push(0);
    assert!(matches!(gpu.load_state(&bytes), Err(GpuStateError::TrailingBytes(1))));
    assert!(matches!(gpu.load_state(&bytes[..100]), Err(GpuStateError::Decode(_))));
    assert_eq!(gpu.read_bank_control(BankId::B), 0x00);

    bytes.pop();
    gpu.load_state(&bytes).unwrap();
    assert_eq!(gpu.read_bank_control(BankId::B), 0x80);
}

#[test]
fn reload_config_reallocates_framebuffers() {
    let mut gpu = new_gpu(NdsGpuConfig::default());
    assert_eq!(gpu.front_framebuffer(Screen::Top).len(), 256 * 192);

    let calls = gpu.engine(EngineId::A).calls.len();
    gpu.reload_config(NdsGpuConfig::default());
    assert_eq!(gpu.engine(EngineId::A).calls.len(), calls);

    let accelerated = NdsGpuConfig { renderer: NdsRenderer::Accelerated };
    gpu.reload_config(accelerated);
    assert_eq!(gpu.config(), accelerated);
    assert_eq!(
        gpu.front_framebuffer(Screen::Top).len(),
        NdsRenderer::Accelerated.framebuffer_len()
    );
    assert_eq!(gpu.engine(EngineId::A).calls.len(), calls + 2);
    assert!(gpu.engine(EngineId::B).calls.contains(&EngineCall::SetRenderSettings(true)));
}

#[test]
fn palette_and_oam_follow_engine_power() {
    let mut gpu = new_gpu(NdsGpuConfig::default());

    // Both engines off: writes are dropped and reads return zero
    gpu.write_palette_ram(0x0500_0000, 0x7FFF);
    gpu.write_oam(0x0700_0400, 0x1234);
    assert_eq!(gpu.read_palette_ram(0x0500_0000), 0);
    assert_eq!(gpu.engine_ram().read_palette_ram(0x0500_0000), 0);
    assert_eq!(gpu.engine_ram().read_oam(0x0700_0400), 0);

    // Engine A only
    gpu.write_power_control(0x0003);
    gpu.write_palette_ram(0x0500_0000, 0x7FFF);
    gpu.write_palette_ram(0x0500_0400, 0x001F);
    gpu.write_oam(0x0700_0002, 0x4321);
    assert_eq!(gpu.read_palette_ram(0x0500_0000), 0x7FFF);
    assert_eq!(gpu.read_palette_ram(0x0500_0800), 0x7FFF);
    assert_eq!(gpu.read_palette_ram(0x0500_0400), 0);
    assert_eq!(gpu.read_oam(0x07FF_F802), 0x4321);

    // Engine B on, engine A off: engine A's contents survive but read as zero
    gpu.write_power_control(0x0201);
    gpu.write_palette_ram(0x0500_0400, 0x001F);
    assert_eq!(gpu.read_palette_ram(0x0500_0400), 0x001F);
    assert_eq!(gpu.read_palette_ram(0x0500_0000), 0);
    assert_eq!(gpu.read_oam(0x0700_0002), 0);
    assert_eq!(gpu.engine_ram().palette_ram(EngineId::A)[0], 0x7FFF);

    gpu.write_power_control(0x0203);
    assert_eq!(gpu.read_oam(0x0700_0002), 0x4321);
}

#[test]
fn engines_render_from_their_own_palette_and_oam() {
    let mut gpu = new_gpu(NdsGpuConfig::default());
    let mut system = MockSystem::new();
    gpu.write_power_control(0x0203);
    gpu.write_palette_ram(0x0500_0000, 0x1111);
    gpu.write_palette_ram(0x0500_0400, 0x2222);
    gpu.write_oam(0x0700_0000, 0x3333);
    gpu.write_oam(0x0700_0400, 0x4444);

    gpu.start_frame(&mut system);
    while gpu.engine(EngineId::A).seen_memory.is_none() {
        step(&mut gpu, &mut system);
    }

    assert_eq!(gpu.engine(EngineId::A).seen_memory, Some((0x1111, 0x3333)));
    assert_eq!(gpu.engine(EngineId::B).seen_memory, Some((0x2222, 0x4444)));
}
