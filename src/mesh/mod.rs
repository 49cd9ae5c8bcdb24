//! Mesh input types for the bake pipeline.

pub mod bounds;
pub mod source;
pub mod target;

pub use bounds::MeshBounds;
pub use source::{SourceMesh, SubmeshRange};
pub use target::{reconcile_targets, HeightfieldData, TargetRendererInfo};
