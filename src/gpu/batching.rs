//! Depth-slice work decomposition shared by the volume stages.
//!
//! Distance, sign, and shrink-wrap kernels all cover the volume in z-layer
//! batches sized so one dispatch touches at most [`MAX_TEXELS_PER_DISPATCH`]
//! texels. Keeping the decomposition in one place keeps the three stages'
//! progress arithmetic in agreement.

use super::volume::VolumeDims;

/// Texel budget for a single dispatch (a 2048x2048 slice).
pub const MAX_TEXELS_PER_DISPATCH: u32 = 2048 * 2048;

/// Workgroup edge length of the volume kernels (4x4x4 threads).
pub const GROUP_DIM: u32 = 4;

pub(crate) fn div_round_up(value: u32, divisor: u32) -> u32 {
    (value + divisor - 1) / divisor
}

/// Plan for covering a volume in bounded depth-slice batches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SliceBatches {
    groups_x: u32,
    groups_y: u32,
    groups_z: u32,
    layers_per_dispatch: u32,
    batch_count: u32,
}

impl SliceBatches {
    pub fn plan(dims: VolumeDims) -> Self {
        let groups_x = div_round_up(dims.width, GROUP_DIM);
        let groups_y = div_round_up(dims.height, GROUP_DIM);

        let min_texels_per_slice = dims.width * dims.height * GROUP_DIM;
        let mut layers_per_dispatch =
            div_round_up(MAX_TEXELS_PER_DISPATCH, min_texels_per_slice) * GROUP_DIM;
        // Dispatching past the volume depth wastes groups and can exceed the
        // 65535 workgroups-per-dimension limit on narrow volumes; batch
        // boundaries are unaffected by this clamp.
        layers_per_dispatch =
            layers_per_dispatch.min(div_round_up(dims.depth, GROUP_DIM) * GROUP_DIM);

        let batch_count = div_round_up(dims.depth, layers_per_dispatch);

        Self {
            groups_x,
            groups_y,
            groups_z: layers_per_dispatch / GROUP_DIM,
            layers_per_dispatch,
            batch_count,
        }
    }

    /// Number of dispatches needed to touch every voxel once.
    pub fn batch_count(&self) -> u32 {
        self.batch_count
    }

    /// First z layer covered by `batch`.
    pub fn layer_offset(&self, batch: u32) -> u32 {
        batch * self.layers_per_dispatch
    }

    /// Workgroup counts for one batch dispatch.
    pub fn workgroups(&self) -> (u32, u32, u32) {
        (self.groups_x, self.groups_y, self.groups_z)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn div_round_up_rounds_up_only_on_remainder() {
        assert_eq!(div_round_up(8, 4), 2);
        assert_eq!(div_round_up(9, 4), 3);
        assert_eq!(div_round_up(1, 1024), 1);
        assert_eq!(div_round_up(1024, 1024), 1);
        assert_eq!(div_round_up(1025, 1024), 2);
    }

    #[test]
    fn small_volume_fits_one_batch() {
        let plan = SliceBatches::plan(VolumeDims::new(8, 8, 9));
        assert_eq!(plan.batch_count(), 1);
        // Layers are clamped near the depth, rounded to the workgroup edge.
        let (gx, gy, gz) = plan.workgroups();
        assert_eq!((gx, gy), (2, 2));
        assert_eq!(gz, 3);
        assert_eq!(plan.layer_offset(0), 0);
    }

    #[test]
    fn full_size_slice_batches_in_workgroup_chunks() {
        // A 2048x2048 slice exhausts the budget, so batches advance by the
        // minimum of one workgroup depth (4 layers).
        let plan = SliceBatches::plan(VolumeDims::new(2048, 2048, 64));
        assert_eq!(plan.batch_count(), 16);
        assert_eq!(plan.layer_offset(1), 4);
        let (gx, gy, gz) = plan.workgroups();
        assert_eq!((gx, gy, gz), (512, 512, 1));
    }

    #[test]
    fn batches_cover_every_layer_exactly_once() {
        for depth in [1, 3, 4, 5, 63, 64, 65, 200] {
            let dims = VolumeDims::new(512, 512, depth);
            let plan = SliceBatches::plan(dims);
            let mut covered = 0u32;
            for batch in 0..plan.batch_count() {
                let start = plan.layer_offset(batch);
                assert!(start < depth, "batch {} starts past depth {}", batch, depth);
                covered = covered.max(start);
            }
            // Last batch must start within the volume and reach at least the
            // final layer given groups_z * GROUP_DIM layers per dispatch.
            let (_, _, gz) = plan.workgroups();
            assert!(covered + gz * GROUP_DIM >= depth);
        }
    }

    #[test]
    fn workgroup_counts_stay_under_dispatch_limit() {
        // Narrow volumes used to blow past 65535 z workgroups without the
        // depth clamp.
        let plan = SliceBatches::plan(VolumeDims::new(2, 2, 16));
        let (_, _, gz) = plan.workgroups();
        assert!(gz <= 65_535);
        assert_eq!(plan.batch_count(), 1);
    }
}
