//! Bake configuration.

use serde::{Deserialize, Serialize};

use crate::error::{BakeError, BakeResult};

/// User-facing bake parameters. Applied through
/// [`SdfBaker::attempt_save_settings`](crate::baker::SdfBaker::attempt_save_settings)
/// or [`SdfBaker::begin_bake`](crate::baker::SdfBaker::begin_bake); never
/// mutated while a bake is in progress.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BakeSettings {
    /// World-space edge length of one voxel.
    pub pixel_size: f32,
    /// World-space margin added around the welded bounds on every side.
    pub padding: f32,
    /// Radius of the shrink-wrap smoothing pass. Zero skips the recompute and
    /// leaves the signed field unchanged.
    pub shrink_wrap_radius: f32,
}

impl Default for BakeSettings {
    fn default() -> Self {
        Self {
            pixel_size: 0.01,
            padding: 0.04,
            shrink_wrap_radius: 0.0,
        }
    }
}

impl BakeSettings {
    pub fn validate(&self) -> BakeResult<()> {
        if !(self.pixel_size > 0.0) || !self.pixel_size.is_finite() {
            return Err(BakeError::InvalidSettings(format!(
                "pixel_size must be positive, got {}",
                self.pixel_size
            )));
        }
        if !(self.padding > 0.0) || !self.padding.is_finite() {
            return Err(BakeError::InvalidSettings(format!(
                "padding must be positive, got {}",
                self.padding
            )));
        }
        if !(self.shrink_wrap_radius >= 0.0) || !self.shrink_wrap_radius.is_finite() {
            return Err(BakeError::InvalidSettings(format!(
                "shrink_wrap_radius must be non-negative, got {}",
                self.shrink_wrap_radius
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_settings_are_valid() {
        assert!(BakeSettings::default().validate().is_ok());
    }

    #[test]
    fn rejects_non_positive_pixel_size_and_padding() {
        let mut settings = BakeSettings::default();
        settings.pixel_size = 0.0;
        assert!(settings.validate().is_err());

        settings = BakeSettings::default();
        settings.padding = -0.1;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn rejects_nan_parameters() {
        let mut settings = BakeSettings::default();
        settings.pixel_size = f32::NAN;
        assert!(settings.validate().is_err());

        settings = BakeSettings::default();
        settings.shrink_wrap_radius = f32::NAN;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn zero_radius_is_valid() {
        let settings = BakeSettings {
            shrink_wrap_radius: 0.0,
            ..Default::default()
        };
        assert!(settings.validate().is_ok());
    }
}
