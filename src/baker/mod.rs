//! Bake scheduling.
//!
//! [`SdfBaker`] drives the five GPU stages as a resumable state machine:
//! weld, unsigned distance, sign resolution, shrink wrap, export. One call to
//! [`SdfBaker::do_work`] performs at most one bounded unit of GPU work, so a
//! bake of any size can be spread across a frame loop without hitching it.
//! Stage resources are created lazily at each transition and handed forward
//! by value, so cancelling a bake is just dropping the current stage.

pub mod placement;
pub mod settings;

pub use placement::SdfPlacement;
pub use settings::BakeSettings;

use std::mem;

use glam::{Mat4, Vec3};

use crate::asset::VolumeAsset;
use crate::error::{BakeError, BakeResult};
use crate::gpu::GpuContext;
use crate::mesh::TargetRendererInfo;
use crate::stages::{
    BruteForceDistanceStage, ExportStage, ShrinkWrapStage, SignConvertStage, WeldMeshStage,
};

/// Where a bake currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BakeStage {
    Waiting,
    GetTriangles,
    UnsignedDistance,
    SignedDistance,
    Expansion,
    Exporting,
    Done,
}

enum StageState {
    Waiting,
    GetTriangles(WeldMeshStage),
    UnsignedDistance(BruteForceDistanceStage),
    SignedDistance(SignConvertStage),
    Expansion(ShrinkWrapStage),
    Exporting(ExportStage),
    Done(Option<VolumeAsset>),
}

/// Incremental signed distance field baker.
///
/// Configure through [`SdfBaker::attempt_save_settings`], start with
/// [`SdfBaker::begin_bake`], then call [`SdfBaker::do_work`] until it
/// returns true and collect the asset with [`SdfBaker::take_bake_result`].
pub struct SdfBaker {
    context: GpuContext,
    settings: BakeSettings,
    targets: Vec<TargetRendererInfo>,
    root_position: Vec3,
    placement: Option<SdfPlacement>,
    stage: StageState,
}

impl SdfBaker {
    pub fn new(context: GpuContext) -> Self {
        Self {
            context,
            settings: BakeSettings::default(),
            targets: Vec::new(),
            root_position: Vec3::ZERO,
            placement: None,
            stage: StageState::Waiting,
        }
    }

    /// Stage new settings, targets, and bake origin.
    ///
    /// Refused (returning false) unless the baker is waiting; otherwise the
    /// configuration is applied and the return value says whether any of it
    /// actually differed from what was already staged.
    pub fn attempt_save_settings(
        &mut self,
        settings: BakeSettings,
        targets: Vec<TargetRendererInfo>,
        root_position: Vec3,
    ) -> bool {
        if !matches!(self.stage, StageState::Waiting) {
            log::warn!(
                "[SdfBaker] Settings change refused during {:?}",
                self.stage()
            );
            return false;
        }

        let changed = self.settings != settings
            || self.root_position != root_position
            || self.targets.len() != targets.len()
            || self
                .targets
                .iter()
                .zip(targets.iter())
                .any(|(stored, fresh)| !stored.same_bake_inputs(fresh));

        self.settings = settings;
        self.root_position = root_position;
        self.targets = targets;
        changed
    }

    /// Validate the staged configuration and start a bake.
    ///
    /// Any in-flight bake is released first. On error the baker stays in
    /// `Waiting`; settings and targets are untouched either way.
    pub fn begin_bake(&mut self) -> BakeResult<()> {
        self.cleanup_and_reset();

        self.settings.validate()?;

        let weld = WeldMeshStage::new(
            self.context.device().clone(),
            self.context.queue().clone(),
            &self.targets,
            self.root_position,
        )?;

        log::info!(
            "[SdfBaker] Bake started: pixel size {}, padding {}, shrink wrap radius {}",
            self.settings.pixel_size,
            self.settings.padding,
            self.settings.shrink_wrap_radius
        );
        self.stage = StageState::GetTriangles(weld);
        Ok(())
    }

    /// Advance the bake by one bounded unit of GPU work.
    ///
    /// Returns true once the bake has finished and the asset is available.
    /// Calling in `Waiting` is a no-op returning false; a stage failure
    /// resets the baker to `Waiting`.
    pub fn do_work(&mut self) -> BakeResult<bool> {
        let stage = mem::replace(&mut self.stage, StageState::Waiting);
        match self.advance(stage) {
            Ok(next) => {
                self.stage = next;
                Ok(matches!(self.stage, StageState::Done(_)))
            }
            Err(e) => {
                self.placement = None;
                Err(e)
            }
        }
    }

    fn advance(&mut self, stage: StageState) -> BakeResult<StageState> {
        let device = self.context.device().clone();
        let queue = self.context.queue().clone();

        Ok(match stage {
            StageState::Waiting => StageState::Waiting,
            StageState::Done(asset) => StageState::Done(asset),

            StageState::GetTriangles(mut weld) => {
                if weld.do_work()? {
                    let (welded, triangle_count, bounds) = weld.into_parts()?;
                    let placement = SdfPlacement::derive(
                        bounds,
                        self.settings.padding,
                        self.settings.pixel_size,
                    );
                    log::info!(
                        "[SdfBaker] Volume placed: {}x{}x{} voxels over {:?}",
                        placement.dims.width,
                        placement.dims.height,
                        placement.dims.depth,
                        placement.box_size
                    );
                    self.placement = Some(placement);
                    StageState::UnsignedDistance(BruteForceDistanceStage::new(
                        device,
                        queue,
                        welded,
                        triangle_count,
                        &placement,
                    )?)
                } else {
                    StageState::GetTriangles(weld)
                }
            }

            StageState::UnsignedDistance(mut stage) => {
                if stage.do_work()? {
                    StageState::SignedDistance(SignConvertStage::new(
                        device,
                        queue,
                        stage.into_output(),
                        self.settings.pixel_size,
                    )?)
                } else {
                    StageState::UnsignedDistance(stage)
                }
            }

            StageState::SignedDistance(mut stage) => {
                if stage.do_work()? {
                    StageState::Expansion(ShrinkWrapStage::new(
                        device,
                        queue,
                        stage.into_result(),
                        self.settings.shrink_wrap_radius,
                        self.settings.pixel_size,
                    )?)
                } else {
                    StageState::SignedDistance(stage)
                }
            }

            StageState::Expansion(mut stage) => {
                if stage.do_work()? {
                    let placement = self.placement.ok_or_else(|| {
                        BakeError::InvalidInput("volume placement missing at export".into())
                    })?;
                    StageState::Exporting(ExportStage::new(
                        device,
                        queue,
                        stage.into_result(),
                        placement,
                    )?)
                } else {
                    StageState::Expansion(stage)
                }
            }

            StageState::Exporting(mut stage) => {
                if stage.do_work()? {
                    log::info!("[SdfBaker] Bake complete");
                    StageState::Done(stage.into_asset())
                } else {
                    StageState::Exporting(stage)
                }
            }
        })
    }

    /// Blended progress over the four counted stages, 0 to 1. Welding
    /// reports 0 (it completes in one call); a finished bake reports
    /// exactly 1.
    pub fn percentage_done(&self) -> f32 {
        match &self.stage {
            StageState::Waiting | StageState::GetTriangles(_) => 0.0,
            StageState::UnsignedDistance(s) => s.progress() / 4.0,
            StageState::SignedDistance(s) => (1.0 + s.progress()) / 4.0,
            StageState::Expansion(s) => (2.0 + s.progress()) / 4.0,
            StageState::Exporting(s) => (3.0 + s.progress()) / 4.0,
            StageState::Done(_) => 1.0,
        }
    }

    /// Drop any in-flight bake and return to `Waiting`. Settings and
    /// targets are kept; all stage GPU resources are released.
    pub fn cleanup_and_reset(&mut self) {
        self.stage = StageState::Waiting;
        self.placement = None;
    }

    pub fn stage(&self) -> BakeStage {
        match &self.stage {
            StageState::Waiting => BakeStage::Waiting,
            StageState::GetTriangles(_) => BakeStage::GetTriangles,
            StageState::UnsignedDistance(_) => BakeStage::UnsignedDistance,
            StageState::SignedDistance(_) => BakeStage::SignedDistance,
            StageState::Expansion(_) => BakeStage::Expansion,
            StageState::Exporting(_) => BakeStage::Exporting,
            StageState::Done(_) => BakeStage::Done,
        }
    }

    pub fn is_waiting(&self) -> bool {
        matches!(self.stage, StageState::Waiting)
    }

    pub fn is_finished(&self) -> bool {
        matches!(self.stage, StageState::Done(_))
    }

    pub fn settings(&self) -> &BakeSettings {
        &self.settings
    }

    pub fn targets(&self) -> &[TargetRendererInfo] {
        &self.targets
    }

    pub fn root_position(&self) -> Vec3 {
        self.root_position
    }

    /// Volume placement of the current bake; `None` until the weld stage
    /// has completed.
    pub fn placement(&self) -> Option<&SdfPlacement> {
        self.placement.as_ref()
    }

    pub fn sdf_lower_corner(&self) -> Option<Vec3> {
        self.placement.map(|p| p.lower_corner)
    }

    pub fn sdf_size(&self) -> Option<Vec3> {
        self.placement.map(|p| p.box_size)
    }

    /// Maps bake-space positions into the volume's unit cube.
    pub fn object_to_sdf(&self) -> Option<Mat4> {
        self.placement.map(|p| p.object_to_sdf)
    }

    /// The finished asset, if the bake is done and it has not been taken.
    pub fn bake_result(&self) -> Option<&VolumeAsset> {
        match &self.stage {
            StageState::Done(asset) => asset.as_ref(),
            _ => None,
        }
    }

    /// Move the finished asset out of the baker.
    pub fn take_bake_result(&mut self) -> Option<VolumeAsset> {
        match &mut self.stage {
            StageState::Done(asset) => asset.take(),
            _ => None,
        }
    }

    pub fn context(&self) -> &GpuContext {
        &self.context
    }
}
