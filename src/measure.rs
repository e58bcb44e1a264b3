// Copyright (c) 2025 Steven Rosenthal smr@dt3.org
// See LICENSE file in root directory for license terms.

use crate::calibration::Calibration;
use crate::error::Result;
use crate::objects::{ObjectPopulation, VoxelObject};
use crate::roi::{union_pixel_count, Roi};
use crate::volume::BoundingBox;

/// Physical volume of one object.
pub fn volume_of_object(object: &VoxelObject, calibration: &Calibration) -> f64 {
    object.volume(calibration)
}

/// Summed physical volume of every object in `population`, using the
/// population's own calibration.
pub fn volume_of_population(population: &ObjectPopulation) -> f64 {
    population.voxel_count() as f64 * population.calibration().voxel_volume()
}

/// Physical volume under the union of `rois`, replicated through every slice
/// of `bounds`.
pub fn roi_volume(rois: &[Roi], bounds: &BoundingBox, calibration: &Calibration)
                  -> Result<f64> {
    if rois.is_empty() || bounds.is_empty() {
        return Ok(0.0);
    }
    let (width, height, depth) = bounds.extent();
    let pixels = union_pixel_count(rois, width as u32, height as u32)?;
    Ok(pixels as f64 * calibration.pixel_area() * depth as f64 *
       calibration.voxel_depth())
}

/// Per-image volumes, in cubic calibration units.
#[derive(Clone, Debug, PartialEq)]
pub struct VolumeSummary {
    pub image_name: String,
    pub image_volume: f64,
    pub image_minus_roi_volume: f64,
    pub vessel_volume: f64,
    pub inside_volume: f64,
    pub outside_volume: f64,
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;
    use crate::volume::Voxel;
    use super::*;

    #[test]
    fn test_population_volume() {
        let cal = Calibration::new(0.5, 0.5, 2.0, "µm").unwrap();
        let a = VoxelObject::new(1, vec![Voxel::new(0, 0, 0), Voxel::new(1, 0, 0)]);
        let b = VoxelObject::new(2, vec![Voxel::new(5, 5, 0)]);
        assert_abs_diff_eq!(volume_of_object(&a, &cal), 1.0, epsilon = 1e-12);
        let population = ObjectPopulation::from_objects(vec![a, b], cal.clone());
        assert_abs_diff_eq!(volume_of_population(&population), 1.5, epsilon = 1e-12);
        assert_eq!(volume_of_population(&ObjectPopulation::empty(cal)), 0.0);
    }

    #[test]
    fn test_roi_volume() {
        let cal = Calibration::isotropic_xy(0.5, 2.0).unwrap();
        let bounds = BoundingBox::of_grid(10, 10, 5);
        let rois = vec![Roi::rectangle("a", 0.0, 0.0, 4.0, 4.0)];
        // 16 pixels of 0.25 µm² through 5 slices of 2 µm.
        assert_abs_diff_eq!(roi_volume(&rois, &bounds, &cal).unwrap(), 40.0,
                            epsilon = 1e-9);
        assert_eq!(roi_volume(&[], &bounds, &cal).unwrap(), 0.0);

        let square = vec![Roi::new("sq", vec![[2.0, 2.0], [6.0, 2.0], [6.0, 6.0],
                                             [2.0, 6.0]])];
        assert_abs_diff_eq!(roi_volume(&square, &bounds, &cal).unwrap(), 40.0,
                            epsilon = 1e-9);
    }
}
