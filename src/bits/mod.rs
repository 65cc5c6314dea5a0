//! Bit-level plumbing shared by the entropy coder and the bitstream writers.

pub mod writer;

pub use writer::{category_of, BitString};
