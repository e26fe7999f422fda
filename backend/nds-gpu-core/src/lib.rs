//! NDS GPU core: VRAM bank mapping with dirty tracking, and LCD scanline timing
//!
//! The 2D display engines, the 3D engine, and the rest of the system (scheduler, interrupts, DMA)
//! are supplied by the host through the traits in [`engine`] and [`system`].

pub mod api;
pub mod engine;
pub mod engine_ram;
mod framebuffer;
pub mod lcd;
pub mod scheduler;
pub mod system;
pub mod vram;

#[cfg(test)]
mod testing;

pub use api::{Gpu, GpuStateError, NdsGpuConfig};
