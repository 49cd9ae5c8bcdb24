//! GPU signed distance field baker.
//!
//! Bakes triangle meshes into signed distance volumes with exact
//! point-to-triangle distances: welds the input geometry into one triangle
//! soup, brute-forces the unsigned field, floods signs in from the volume
//! boundary, optionally shrink-wraps concave creases smooth, and exports the
//! result as a half-float [`VolumeAsset`]. Every stage is resumable; one
//! [`SdfBaker::do_work`] call issues at most one bounded GPU dispatch, so a
//! bake can run inside a frame loop without hitching it.

// Core pipeline modules
pub mod asset;
pub mod baker;
pub mod error;

// GPU plumbing
pub mod gpu;

// Input geometry
pub mod mesh;

// Resumable stage implementations
pub mod stages;

pub use asset::VolumeAsset;
pub use baker::{BakeSettings, BakeStage, SdfBaker, SdfPlacement};
pub use error::{BakeError, BakeResult};
pub use gpu::{GpuContext, VolumeDims};
pub use mesh::{
    reconcile_targets, HeightfieldData, MeshBounds, SourceMesh, SubmeshRange, TargetRendererInfo,
};

// Re-export wgpu so callers can share a device with their own passes
pub use wgpu;
