//! GPU plumbing shared by the bake stages.

pub mod batching;
pub mod context;
pub mod readback;
pub mod volume;

pub use batching::{SliceBatches, GROUP_DIM, MAX_TEXELS_PER_DISPATCH};
pub use context::GpuContext;
pub use volume::{DistanceVolume, VolumeDims};
