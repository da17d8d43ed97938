//! Leaf text primitives shared by the jot buffer core.

pub mod chars;
pub mod line_ending;
