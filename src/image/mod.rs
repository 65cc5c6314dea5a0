//! Frame representations and chroma subsampling.

pub mod frame;
pub mod subsample;

pub use frame::{Plane, PlanarFrame, SignedPlane, YCbCrFrame};
pub use subsample::ChromaMode;
