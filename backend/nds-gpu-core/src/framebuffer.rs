//! Double-buffered output for the two screens

use crate::engine::{EngineId, FramebufferTarget, Screen};
use nds_config::{NdsRenderer, SCREEN_HEIGHT};

pub(crate) const CLEAR_COLOR: u32 = 0xFFFFFFFF;

#[derive(Debug, Clone)]
pub(crate) struct Framebuffers {
    // Indexed by [buffer][screen]
    buffers: [[Box<[u32]>; 2]; 2],
    line_len: usize,
    targets: [FramebufferTarget; 2],
}

impl Framebuffers {
    pub(crate) fn new(renderer: NdsRenderer) -> Self {
        let len = renderer.framebuffer_len();
        let new_buffer = || vec![CLEAR_COLOR; len].into_boxed_slice();

        Self {
            buffers: [[new_buffer(), new_buffer()], [new_buffer(), new_buffer()]],
            line_len: len / SCREEN_HEIGHT as usize,
            targets: [
                FramebufferTarget { buffer: 1, screen: Screen::Bottom },
                FramebufferTarget { buffer: 1, screen: Screen::Top },
            ],
        }
    }

    pub(crate) fn fill(&mut self, color: u32) {
        for buffer in self.buffers.iter_mut().flatten() {
            buffer.fill(color);
        }
    }

    /// Point both engines at the back buffer. Engine A draws the top screen when `swap` is set,
    /// otherwise the bottom screen.
    pub(crate) fn assign(&mut self, front: usize, swap: bool) -> [FramebufferTarget; 2] {
        let back = front ^ 1;
        let (a_screen, b_screen) =
            if swap { (Screen::Top, Screen::Bottom) } else { (Screen::Bottom, Screen::Top) };

        self.targets = [
            FramebufferTarget { buffer: back, screen: a_screen },
            FramebufferTarget { buffer: back, screen: b_screen },
        ];
        self.targets
    }

    pub(crate) fn line_mut(&mut self, engine: EngineId, line: u32) -> &mut [u32] {
        let FramebufferTarget { buffer, screen } = self.targets[engine as usize];
        let start = line as usize * self.line_len;
        &mut self.buffers[buffer][screen as usize][start..start + self.line_len]
    }

    pub(crate) fn buffer(&self, buffer: usize, screen: Screen) -> &[u32] {
        &self.buffers[buffer][screen as usize]
    }
}
