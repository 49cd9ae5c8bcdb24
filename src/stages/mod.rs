//! Resumable GPU stages of the bake pipeline.
//!
//! Every stage owns its pipelines and intermediate resources, advances by one
//! bounded dispatch per `do_work` call, and hands its product to the next
//! stage by value when the scheduler transitions. Keeping each `do_work`
//! bounded is what lets the baker run incrementally from a frame loop.

pub mod brute_force;
pub mod export;
pub mod shrink_wrap;
pub mod sign_convert;
pub mod weld;

pub use brute_force::BruteForceDistanceStage;
pub use export::ExportStage;
pub use shrink_wrap::ShrinkWrapStage;
pub use sign_convert::SignConvertStage;
pub use weld::WeldMeshStage;
