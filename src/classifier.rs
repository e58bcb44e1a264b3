// Copyright (c) 2025 Steven Rosenthal smr@dt3.org
// See LICENSE file in root directory for license terms.

//! Splits astrocytes into the parts inside and outside the dilated vessels.
//!
//! The astrocytes are painted into a scratch mask and a copy of it is kept.
//! Painting each dilated vessel as background then leaves only the outside
//! voxels in the mask, and subtracting the mask from the copy gives exactly
//! the erased voxels. Every astrocyte voxel therefore ends up in exactly one
//! of the two labeled results. An astrocyte straddling a vessel boundary is
//! split into an inside object and an outside object.

use std::time::Instant;

use log::{debug, info};

use crate::calibration::Calibration;
use crate::dilate::dilate;
use crate::error::{AnalysisError, Result};
use crate::labeling::{ConnectedComponentLabeler, Connectivity};
use crate::objects::ObjectPopulation;
use crate::painter::{draw, draw_population, subtract};
use crate::volume::{BoundingBox, VolumeGrid, BACKGROUND, FOREGROUND};

/// Astrocyte populations on either side of the vessel envelope.
#[derive(Clone, Debug, PartialEq)]
pub struct Partition {
    pub inside: ObjectPopulation,
    pub outside: ObjectPopulation,
}

#[derive(Copy, Clone, Debug)]
pub struct SpatialClassifier {
    pub labeler: ConnectedComponentLabeler,

    /// Physical distance by which each vessel is grown before partitioning.
    pub dilation_radius: f64,
}

impl SpatialClassifier {
    pub fn new(dilation_radius: f64, connectivity: Connectivity) -> Self {
        SpatialClassifier { labeler: ConnectedComponentLabeler::new(connectivity),
                            dilation_radius }
    }

    /// `bounds` must be anchored at the origin and contain every astrocyte
    /// voxel. Vessel voxels outside `bounds` are allowed; their dilation is
    /// clipped.
    pub fn partition(&self, astrocytes: &ObjectPopulation, vessels: &ObjectPopulation,
                     bounds: &BoundingBox, calibration: &Calibration) -> Result<Partition> {
        if !self.dilation_radius.is_finite() || self.dilation_radius < 0.0 {
            return Err(AnalysisError::InvalidParameter {
                name: "dilation radius",
                value: self.dilation_radius,
                reason: "must be finite and non-negative",
            });
        }
        let partition_start = Instant::now();
        let (width, height, depth) = bounds.grid_dimensions()?;
        let mut outside_mask = VolumeGrid::filled(width, height, depth, BACKGROUND,
                                                  calibration.clone())?;
        draw_population(astrocytes, &mut outside_mask, FOREGROUND)?;
        let astrocyte_mask = outside_mask.clone();

        let mut envelope_voxels = 0;
        for vessel in vessels {
            let dilated = dilate(vessel, bounds, self.dilation_radius, calibration)?;
            envelope_voxels += dilated.len();
            draw(&dilated, &mut outside_mask, BACKGROUND)?;
        }
        debug!("Erased {} dilated vessel voxels (with overlaps) from {} vessels",
               envelope_voxels, vessels.len());

        let outside = self.labeler.label(&outside_mask);
        let inside_mask = subtract(&astrocyte_mask, &outside_mask)?;
        drop(astrocyte_mask);
        drop(outside_mask);
        let inside = self.labeler.label(&inside_mask);

        info!("Partitioned {} astrocyte voxels into {} inside ({} objects) and \
               {} outside ({} objects) in {:?}",
              astrocytes.voxel_count(), inside.voxel_count(), inside.len(),
              outside.voxel_count(), outside.len(), partition_start.elapsed());
        Ok(Partition { inside, outside })
    }
}

/// Partitions with 26-connectivity relabeling; returns (inside, outside).
pub fn partition_in_out(astrocytes: &ObjectPopulation, vessels: &ObjectPopulation,
                        bounds: &BoundingBox, dilation_radius: f64,
                        calibration: &Calibration)
                        -> Result<(ObjectPopulation, ObjectPopulation)> {
    let classifier = SpatialClassifier::new(dilation_radius, Connectivity::default());
    let partition = classifier.partition(astrocytes, vessels, bounds, calibration)?;
    Ok((partition.inside, partition.outside))
}

#[cfg(test)]
mod tests {
    use crate::measure::volume_of_population;
    use crate::objects::VoxelObject;
    use crate::volume::Voxel;
    use super::*;

    fn block(label: u32, min: (i32, i32, i32), max: (i32, i32, i32)) -> VoxelObject {
        let mut voxels = Vec::new();
        for z in min.2..=max.2 {
            for y in min.1..=max.1 {
                for x in min.0..=max.0 {
                    voxels.push(Voxel::new(x, y, z));
                }
            }
        }
        VoxelObject::new(label, voxels)
    }

    fn population(objects: Vec<VoxelObject>) -> ObjectPopulation {
        ObjectPopulation::from_objects(objects, Calibration::unit_microns())
    }

    fn bounds() -> BoundingBox {
        BoundingBox::of_grid(10, 10, 5)
    }

    #[test]
    fn test_cube_inside_vessel() {
        let cal = Calibration::unit_microns();
        let astrocytes = population(vec![block(1, (3, 3, 1), (5, 5, 3))]);
        let vessels = population(vec![block(1, (0, 0, 0), (9, 9, 4))]);
        let (inside, outside) = partition_in_out(&astrocytes, &vessels, &bounds(), 2.0,
                                                 &cal).unwrap();
        assert!(outside.is_empty());
        assert_eq!(inside.len(), 1);
        assert_eq!(volume_of_population(&inside), 27.0);
    }

    #[test]
    fn test_no_vessels() {
        let cal = Calibration::unit_microns();
        let astrocytes = population(vec![block(1, (3, 3, 1), (5, 5, 3))]);
        let vessels = population(vec![]);
        let (inside, outside) = partition_in_out(&astrocytes, &vessels, &bounds(), 2.0,
                                                 &cal).unwrap();
        assert!(inside.is_empty());
        assert_eq!(volume_of_population(&outside), 27.0);
        assert_eq!(outside.objects()[0], block(1, (3, 3, 1), (5, 5, 3)));
    }

    #[test]
    fn test_one_cube_each_side() {
        let cal = Calibration::unit_microns();
        let astrocytes = population(vec![block(1, (1, 1, 1), (2, 2, 2)),
                                         block(2, (7, 7, 1), (8, 8, 2))]);
        // Dilated by 1 the vessel reaches x = 4.
        let vessels = population(vec![block(1, (0, 0, 0), (3, 9, 4))]);
        let (inside, outside) = partition_in_out(&astrocytes, &vessels, &bounds(), 1.0,
                                                 &cal).unwrap();
        assert_eq!(inside.len(), 1);
        assert_eq!(outside.len(), 1);
        assert_eq!(volume_of_population(&inside), 8.0);
        assert_eq!(volume_of_population(&outside), 8.0);
        assert!(inside.objects()[0].contains(Voxel::new(1, 1, 1)));
        assert!(outside.objects()[0].contains(Voxel::new(8, 8, 2)));
    }

    #[test]
    fn test_straddling_astrocyte_is_split() {
        let cal = Calibration::unit_microns();
        let astrocytes = population(vec![block(1, (2, 2, 2), (7, 3, 2))]);
        let vessels = population(vec![block(1, (0, 0, 0), (3, 9, 4))]);
        let classifier = SpatialClassifier::new(1.0, Connectivity::TwentySix);
        let partition = classifier.partition(&astrocytes, &vessels, &bounds(), &cal)
            .unwrap();
        // x = 2..=4 inside, x = 5..=7 outside, two rows each.
        assert_eq!(partition.inside.voxel_count(), 6);
        assert_eq!(partition.outside.voxel_count(), 6);
        for v in partition.inside.objects()[0].voxels() {
            assert!(!partition.outside.objects()[0].contains(*v));
        }
    }

    #[test]
    fn test_anisotropic_envelope() {
        // 0.5 µm pixels, 2 µm slices: 1 µm reaches 2 voxels in XY, none in Z.
        let cal = Calibration::isotropic_xy(0.5, 2.0).unwrap();
        let astrocytes = ObjectPopulation::from_objects(
            vec![block(1, (6, 5, 2), (6, 5, 2)), block(2, (4, 4, 3), (4, 4, 3))],
            cal.clone());
        let vessels = ObjectPopulation::from_objects(vec![block(1, (4, 5, 2), (4, 5, 2))],
                                                     cal.clone());
        let (inside, outside) = partition_in_out(&astrocytes, &vessels, &bounds(), 1.0,
                                                 &cal).unwrap();
        assert_eq!(inside.voxel_count(), 1);
        assert!(inside.objects()[0].contains(Voxel::new(6, 5, 2)));
        assert_eq!(outside.voxel_count(), 1);
    }

    #[test]
    fn test_rejects_bad_inputs() {
        let cal = Calibration::unit_microns();
        let astrocytes = population(vec![block(1, (8, 8, 4), (10, 8, 4))]);
        let vessels = population(vec![]);
        let err = partition_in_out(&astrocytes, &vessels, &bounds(), 1.0, &cal)
            .unwrap_err();
        assert!(matches!(err, AnalysisError::VoxelOutOfBounds { .. }));

        let astrocytes = population(vec![]);
        assert!(partition_in_out(&astrocytes, &vessels, &bounds(), -2.0, &cal)
                .unwrap_err().is_configuration());
    }
}
