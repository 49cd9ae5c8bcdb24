//! Per-renderer bake targets.
//!
//! One [`TargetRendererInfo`] exists per renderer found under the bake target
//! root. The list is rebuilt from a fresh hierarchy scan on every settings
//! edit; [`reconcile_targets`] carries user toggles forward for renderers that
//! survived the rescan and defensively repairs toggle arrays that were mutated
//! outside the owning API.

use std::sync::Arc;

use glam::Mat4;

use super::source::SourceMesh;
use crate::error::{BakeError, BakeResult};

/// Scalar heightfield that modulates surface expansion in the weld stage.
/// Sampled bilinearly by mesh UV; a missing heightfield acts as constant 1.
#[derive(Debug, Clone)]
pub struct HeightfieldData {
    width: u32,
    height: u32,
    samples: Vec<f32>,
}

impl HeightfieldData {
    pub fn new(width: u32, height: u32, samples: Vec<f32>) -> BakeResult<Self> {
        if width == 0 || height == 0 || samples.len() as u64 != width as u64 * height as u64 {
            return Err(BakeError::InvalidInput(format!(
                "heightfield {}x{} does not match {} samples",
                width,
                height,
                samples.len()
            )));
        }
        Ok(Self {
            width,
            height,
            samples,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }
}

/// One renderer under the bake target root.
#[derive(Debug, Clone)]
pub struct TargetRendererInfo {
    pub mesh: Arc<SourceMesh>,
    /// Local-to-world transform of the renderer.
    pub transform: Mat4,
    pub enabled: bool,
    /// Invariant: length equals `mesh.submesh_count()`.
    pub submesh_enabled: Vec<bool>,
    /// Displacement along the world-space vertex normal applied before
    /// fielding, for "inflate mesh first" bakes. Zero disables expansion.
    pub expansion_distance: f32,
    pub expansion_heightfield: Option<Arc<HeightfieldData>>,
}

impl TargetRendererInfo {
    pub fn new(mesh: Arc<SourceMesh>, transform: Mat4) -> Self {
        let submesh_enabled = vec![true; mesh.submesh_count()];
        Self {
            mesh,
            transform,
            enabled: true,
            submesh_enabled,
            expansion_distance: 0.0,
            expansion_heightfield: None,
        }
    }

    /// Restore the submesh-toggle invariant if the array was resized outside
    /// the owning API. Returns true if a repair was needed.
    pub fn repair_submesh_toggles(&mut self) -> bool {
        if self.submesh_enabled.len() == self.mesh.submesh_count() {
            return false;
        }
        log::warn!(
            "[TargetRendererInfo] Submesh toggles for '{}' had length {}, expected {}; resetting to all enabled",
            self.mesh.name(),
            self.submesh_enabled.len(),
            self.mesh.submesh_count()
        );
        self.submesh_enabled = vec![true; self.mesh.submesh_count()];
        true
    }

    /// Total index count over enabled submeshes; zero when the renderer is
    /// disabled.
    pub fn enabled_index_count(&self) -> u64 {
        if !self.enabled {
            return 0;
        }
        (0..self.mesh.submesh_count())
            .filter(|&i| self.submesh_enabled.get(i).copied().unwrap_or(false))
            .map(|i| self.mesh.submesh_index_count(i) as u64)
            .sum()
    }

    /// True when baking this target would weld the same geometry as `other`.
    /// Mesh and heightfield identity is by allocation, matching
    /// [`reconcile_targets`].
    pub fn same_bake_inputs(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.mesh, &other.mesh)
            && self.transform == other.transform
            && self.enabled == other.enabled
            && self.submesh_enabled == other.submesh_enabled
            && self.expansion_distance == other.expansion_distance
            && match (&self.expansion_heightfield, &other.expansion_heightfield) {
                (None, None) => true,
                (Some(a), Some(b)) => Arc::ptr_eq(a, b),
                _ => false,
            }
    }
}

/// Merge a fresh hierarchy scan with the previously stored target list.
///
/// A scanned entry at the same position referencing the same mesh keeps the
/// stored enable flag, submesh toggles, and expansion parameters; anything
/// else takes the scan's defaults. Returns the merged list and whether the
/// stored settings were clean (no tampered toggle arrays).
pub fn reconcile_targets(
    previous: &[TargetRendererInfo],
    scanned: Vec<TargetRendererInfo>,
) -> (Vec<TargetRendererInfo>, bool) {
    let mut clean = true;

    let merged = scanned
        .into_iter()
        .enumerate()
        .map(|(index, mut info)| {
            if let Some(prev) = previous.get(index) {
                if Arc::ptr_eq(&prev.mesh, &info.mesh) {
                    info.enabled = prev.enabled;
                    info.submesh_enabled = prev.submesh_enabled.clone();
                    info.expansion_distance = prev.expansion_distance;
                    info.expansion_heightfield = prev.expansion_heightfield.clone();
                    if info.repair_submesh_toggles() {
                        clean = false;
                    }
                }
            }
            info
        })
        .collect();

    (merged, clean)
}
