// Copyright (c) 2025 Steven Rosenthal smr@dt3.org
// See LICENSE file in root directory for license terms.

use crate::error::{AnalysisError, Result};

/// Physical size of one voxel along each axis.
#[derive(Clone, Debug, PartialEq)]
pub struct Calibration {
    voxel_width: f64,
    voxel_height: f64,
    voxel_depth: f64,
    unit: String,
}

impl Calibration {
    /// Fails with [AnalysisError::InvalidCalibration] unless all three sizes
    /// are finite and strictly positive.
    pub fn new(voxel_width: f64, voxel_height: f64, voxel_depth: f64,
               unit: &str) -> Result<Self> {
        let valid = |v: f64| v.is_finite() && v > 0.0;
        if !(valid(voxel_width) && valid(voxel_height) && valid(voxel_depth)) {
            return Err(AnalysisError::InvalidCalibration {
                width: voxel_width,
                height: voxel_height,
                depth: voxel_depth,
            });
        }
        Ok(Calibration { voxel_width, voxel_height, voxel_depth,
                         unit: unit.to_string() })
    }

    /// Square pixels in XY, `xy` by `xy` by `z` microns.
    pub fn isotropic_xy(xy: f64, z: f64) -> Result<Self> {
        Self::new(xy, xy, z, "µm")
    }

    /// One micron cube voxels.
    pub fn unit_microns() -> Self {
        Calibration { voxel_width: 1.0, voxel_height: 1.0, voxel_depth: 1.0,
                      unit: "µm".to_string() }
    }

    pub fn voxel_width(&self) -> f64 {
        self.voxel_width
    }

    pub fn voxel_height(&self) -> f64 {
        self.voxel_height
    }

    pub fn voxel_depth(&self) -> f64 {
        self.voxel_depth
    }

    pub fn unit(&self) -> &str {
        &self.unit
    }

    /// Physical volume of a single voxel.
    pub fn voxel_volume(&self) -> f64 {
        self.voxel_width * self.voxel_height * self.voxel_depth
    }

    /// Physical area of one XY pixel.
    pub fn pixel_area(&self) -> f64 {
        self.voxel_width * self.voxel_height
    }

    /// Converts a physical distance into voxel counts along (x, y, z).
    pub fn voxel_radii(&self, distance: f64) -> (f64, f64, f64) {
        (distance / self.voxel_width,
         distance / self.voxel_height,
         distance / self.voxel_depth)
    }
}
