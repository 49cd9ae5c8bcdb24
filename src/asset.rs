//! Baked distance field assets.
//!
//! The end product of a bake: the voxel grid downconverted to half floats,
//! together with the placement needed to sample it in object space. Assets
//! serialize with a small magic/version header in front of the bincode body
//! so stale files fail loudly instead of deserializing garbage.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use glam::Vec3;
use half::f16;
use serde::{Deserialize, Serialize};

use crate::error::{BakeError, BakeResult};
use crate::gpu::VolumeDims;

const ASSET_MAGIC: &[u8; 8] = b"SDFVOL\0\0";
const ASSET_VERSION: u32 = 1;

/// A baked signed distance volume.
///
/// `values` is laid out slice-major: index `(z * height + y) * width + x`.
/// Distances are in world units, positive outside the surface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VolumeAsset {
    pub dims: VolumeDims,
    pub lower_corner: Vec3,
    pub pixel_size: f32,
    pub values: Vec<f16>,
}

impl VolumeAsset {
    /// World-space size of the volume box.
    pub fn size(&self) -> Vec3 {
        self.dims.as_vec3() * self.pixel_size
    }

    /// Maps bake-space positions into the unit cube of the volume, matching
    /// the transform the baker reports.
    pub fn object_to_volume(&self) -> glam::Mat4 {
        glam::Mat4::from_scale(self.size().recip())
            * glam::Mat4::from_translation(-self.lower_corner)
    }

    /// Stored value at a voxel coordinate. Coordinates are not checked
    /// against the dims; callers sample through [`VolumeAsset::sample`].
    fn value_at(&self, x: u32, y: u32, z: u32) -> f32 {
        let index = (z as usize * self.dims.height as usize + y as usize)
            * self.dims.width as usize
            + x as usize;
        self.values[index].to_f32()
    }

    /// Trilinear sample at a bake-space position, clamped to the volume.
    ///
    /// Voxel `(0, 0, 0)` sits exactly at `lower_corner`, so the continuous
    /// coordinate is `(position - lower_corner) / pixel_size`.
    pub fn sample(&self, position: Vec3) -> f32 {
        let max_coord = (self.dims.as_vec3() - Vec3::ONE).max(Vec3::ZERO);
        let coord = ((position - self.lower_corner) / self.pixel_size)
            .clamp(Vec3::ZERO, max_coord);

        let base = coord.floor();
        let frac = coord - base;

        let x0 = base.x as u32;
        let y0 = base.y as u32;
        let z0 = base.z as u32;
        let x1 = (x0 + 1).min(self.dims.width - 1);
        let y1 = (y0 + 1).min(self.dims.height - 1);
        let z1 = (z0 + 1).min(self.dims.depth - 1);

        let lerp = |a: f32, b: f32, t: f32| a + (b - a) * t;

        let c00 = lerp(self.value_at(x0, y0, z0), self.value_at(x1, y0, z0), frac.x);
        let c10 = lerp(self.value_at(x0, y1, z0), self.value_at(x1, y1, z0), frac.x);
        let c01 = lerp(self.value_at(x0, y0, z1), self.value_at(x1, y0, z1), frac.x);
        let c11 = lerp(self.value_at(x0, y1, z1), self.value_at(x1, y1, z1), frac.x);

        let c0 = lerp(c00, c10, frac.y);
        let c1 = lerp(c01, c11, frac.y);
        lerp(c0, c1, frac.z)
    }

    /// Write the asset to `path`, replacing any existing file.
    pub fn save(&self, path: &Path) -> BakeResult<()> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        writer.write_all(ASSET_MAGIC)?;
        writer.write_all(&ASSET_VERSION.to_le_bytes())?;
        bincode::serialize_into(&mut writer, self)?;
        writer.flush()?;

        log::info!(
            "[VolumeAsset] Saved {}x{}x{} volume to {}",
            self.dims.width,
            self.dims.height,
            self.dims.depth,
            path.display()
        );
        Ok(())
    }

    /// Read an asset back, validating header and payload shape.
    pub fn load(path: &Path) -> BakeResult<Self> {
        let file = File::open(path)?;
        let mut reader = BufReader::new(file);

        let mut magic = [0u8; 8];
        reader.read_exact(&mut magic)?;
        if &magic != ASSET_MAGIC {
            return Err(BakeError::AssetFormat(format!(
                "{} is not a distance volume asset",
                path.display()
            )));
        }

        let mut version_bytes = [0u8; 4];
        reader.read_exact(&mut version_bytes)?;
        let version = u32::from_le_bytes(version_bytes);
        if version != ASSET_VERSION {
            return Err(BakeError::AssetFormat(format!(
                "unsupported asset version {} (expected {})",
                version, ASSET_VERSION
            )));
        }

        let asset: VolumeAsset = bincode::deserialize_from(&mut reader)?;
        if asset.dims.width == 0 || asset.dims.height == 0 || asset.dims.depth == 0 {
            return Err(BakeError::AssetFormat(format!(
                "asset has a degenerate dimension {}x{}x{}",
                asset.dims.width, asset.dims.height, asset.dims.depth
            )));
        }
        let expected = asset.dims.texel_count();
        if asset.values.len() as u64 != expected {
            return Err(BakeError::AssetFormat(format!(
                "asset holds {} values for a {} texel volume",
                asset.values.len(),
                expected
            )));
        }
        if !(asset.pixel_size.is_finite() && asset.pixel_size > 0.0) {
            return Err(BakeError::AssetFormat(format!(
                "asset has invalid pixel size {}",
                asset.pixel_size
            )));
        }
        Ok(asset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient_asset() -> VolumeAsset {
        // 2x2x2 volume whose value equals the x index, so interpolation
        // along x is easy to predict.
        let dims = VolumeDims::new(2, 2, 2);
        let values = (0..8).map(|i| f16::from_f32((i % 2) as f32)).collect();
        VolumeAsset {
            dims,
            lower_corner: Vec3::ZERO,
            pixel_size: 1.0,
            values,
        }
    }

    #[test]
    fn sample_at_grid_points_returns_stored_values() {
        let asset = gradient_asset();
        assert_eq!(asset.sample(Vec3::ZERO), 0.0);
        assert_eq!(asset.sample(Vec3::new(1.0, 0.0, 0.0)), 1.0);
        assert_eq!(asset.sample(Vec3::new(1.0, 1.0, 1.0)), 1.0);
    }

    #[test]
    fn sample_interpolates_between_grid_points() {
        let asset = gradient_asset();
        let mid = asset.sample(Vec3::new(0.5, 0.25, 0.75));
        assert!((mid - 0.5).abs() < 1e-6);
    }

    #[test]
    fn sample_clamps_outside_the_volume() {
        let asset = gradient_asset();
        assert_eq!(asset.sample(Vec3::new(-10.0, 0.0, 0.0)), 0.0);
        assert_eq!(asset.sample(Vec3::new(10.0, 0.0, 0.0)), 1.0);
    }

    #[test]
    fn save_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("unit.sdfvol");

        let asset = gradient_asset();
        asset.save(&path).unwrap();
        let loaded = VolumeAsset::load(&path).unwrap();
        assert_eq!(loaded, asset);
    }

    #[test]
    fn load_rejects_unrelated_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("not_an_asset.bin");
        std::fs::write(&path, b"definitely not a volume").unwrap();

        match VolumeAsset::load(&path) {
            Err(BakeError::AssetFormat(_)) => {}
            other => panic!("expected a format error, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn object_to_volume_maps_corners_to_unit_cube() {
        let asset = VolumeAsset {
            dims: VolumeDims::new(4, 8, 2),
            lower_corner: Vec3::new(-1.0, 0.5, 2.0),
            pixel_size: 0.5,
            values: vec![f16::ZERO; 64],
        };
        let m = asset.object_to_volume();
        let lo = m.transform_point3(asset.lower_corner);
        let hi = m.transform_point3(asset.lower_corner + asset.size());
        assert!(lo.length() < 1e-6);
        assert!((hi - Vec3::ONE).length() < 1e-6);
    }
}
