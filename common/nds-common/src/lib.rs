pub mod bitfield;
pub mod num;

pub use bitfield::BitField;
