//! SDF grid placement derived from the welded mesh bounds.

use glam::{Mat4, Vec3};

use crate::gpu::VolumeDims;
use crate::mesh::MeshBounds;

/// Where the voxel grid sits in world space.
///
/// Derived exactly once per bake, at the transition out of the weld stage,
/// because the welded bounds cannot be known earlier. Voxel sample points are
/// `lower_corner + voxel_index * pixel_size`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SdfPlacement {
    pub dims: VolumeDims,
    pub lower_corner: Vec3,
    pub box_size: Vec3,
    /// Maps world positions into normalized [0,1]^3 SDF texture space.
    pub object_to_sdf: Mat4,
    pub pixel_size: f32,
}

impl SdfPlacement {
    /// Each axis gets the smallest dimension whose span covers the padded
    /// bounds: `dim[i] = ceil((extent[i] + padding) * 2 / pixel_size)`. The
    /// grid is centered on the bounds, so the realized box can be slightly
    /// larger than the padded bounds but never smaller.
    pub fn derive(bounds: MeshBounds, padding: f32, pixel_size: f32) -> Self {
        let extents = bounds.extents();
        let dims = VolumeDims::new(
            axis_dim(extents.x, padding, pixel_size),
            axis_dim(extents.y, padding, pixel_size),
            axis_dim(extents.z, padding, pixel_size),
        );

        let box_size = dims.as_vec3() * pixel_size;
        let lower_corner = bounds.center() - box_size * 0.5;
        let object_to_sdf =
            Mat4::from_scale(box_size.recip()) * Mat4::from_translation(-lower_corner);

        Self {
            dims,
            lower_corner,
            box_size,
            object_to_sdf,
            pixel_size,
        }
    }
}

fn axis_dim(extent: f32, padding: f32, pixel_size: f32) -> u32 {
    ((extent + padding) * 2.0 / pixel_size).ceil() as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bounds(center: Vec3, extents: Vec3) -> MeshBounds {
        MeshBounds {
            min: center - extents,
            max: center + extents,
        }
    }

    #[test]
    fn dims_are_minimal_covering() {
        let placement = SdfPlacement::derive(
            bounds(Vec3::ZERO, Vec3::new(0.5, 0.30, 0.125)),
            0.2,
            0.1,
        );
        let dims = [
            placement.dims.width,
            placement.dims.height,
            placement.dims.depth,
        ];
        let extents = [0.5f32, 0.30, 0.125];

        for (dim, extent) in dims.iter().zip(extents) {
            let needed = 2.0 * (extent + 0.2);
            assert!(*dim as f32 * 0.1 >= needed - 1e-5);
            assert!(
                ((*dim - 1) as f32) * 0.1 < needed,
                "dim {} not minimal for extent {}",
                dim,
                extent
            );
        }
    }

    #[test]
    fn exactly_divisible_extent_does_not_over_round() {
        // (0.3 + 0.2) * 2 / 0.1 = 10 exactly.
        let placement = SdfPlacement::derive(bounds(Vec3::ZERO, Vec3::splat(0.3)), 0.2, 0.1);
        assert_eq!(placement.dims, VolumeDims::new(10, 10, 10));
    }

    #[test]
    fn axes_are_sized_independently() {
        let placement = SdfPlacement::derive(
            bounds(Vec3::new(1.0, 2.0, 3.0), Vec3::new(0.5, 1.0, 0.1)),
            0.2,
            0.1,
        );
        assert_eq!(placement.dims, VolumeDims::new(14, 24, 6));
    }

    #[test]
    fn grid_is_centered_on_the_bounds() {
        let center = Vec3::new(1.0, -2.0, 0.5);
        let placement = SdfPlacement::derive(bounds(center, Vec3::splat(0.25)), 0.2, 0.1);

        let recovered_center = placement.lower_corner + placement.box_size * 0.5;
        assert!((recovered_center - center).length() < 1e-5);
    }

    #[test]
    fn object_to_sdf_maps_corners_to_unit_cube() {
        let placement = SdfPlacement::derive(
            bounds(Vec3::new(0.5, 0.5, 0.5), Vec3::splat(0.3)),
            0.2,
            0.1,
        );

        let lower = placement
            .object_to_sdf
            .transform_point3(placement.lower_corner);
        let upper = placement
            .object_to_sdf
            .transform_point3(placement.lower_corner + placement.box_size);

        assert!(lower.length() < 1e-5);
        assert!((upper - Vec3::ONE).length() < 1e-5);
    }

    #[test]
    fn flat_geometry_still_gets_positive_dims() {
        // A flat triangle has zero extent along one axis; padding keeps the
        // grid non-degenerate.
        let placement = SdfPlacement::derive(
            bounds(Vec3::ZERO, Vec3::new(0.5, 0.5, 0.0)),
            0.2,
            0.1,
        );
        assert!(placement.dims.depth >= 1);
        assert_eq!(placement.dims.depth, 4);
    }
}
