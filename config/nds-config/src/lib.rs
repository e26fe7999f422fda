use bincode::{Decode, Encode};
use nds_proc_macros::{EnumAll, EnumDisplay};

pub const SCREEN_WIDTH: u32 = 256;
pub const SCREEN_HEIGHT: u32 = 192;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Encode, Decode, EnumDisplay, EnumAll)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "clap", derive(nds_proc_macros::CustomValueEnum))]
pub enum NdsRenderer {
    #[default]
    Software,
    Accelerated,
}

impl NdsRenderer {
    #[must_use]
    pub fn is_accelerated(self) -> bool {
        self == Self::Accelerated
    }

    /// Length in pixels of one screen's framebuffer.
    ///
    /// The accelerated compositor needs three layers per line plus one control word per line.
    #[must_use]
    pub fn framebuffer_len(self) -> usize {
        let width = match self {
            Self::Software => SCREEN_WIDTH as usize,
            Self::Accelerated => 3 * SCREEN_WIDTH as usize + 1,
        };
        width * SCREEN_HEIGHT as usize
    }
}
