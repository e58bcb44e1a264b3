// Copyright (c) 2025 Steven Rosenthal smr@dt3.org
// See LICENSE file in root directory for license terms.

//! Anisotropic dilation of a single object.
//!
//! A physical radius becomes a per-axis radius in voxels, so one micron of
//! growth covers more voxels along a finely sampled axis than along a coarse
//! one. The structuring element is the ellipsoid with those semi-axes. Only
//! the object's surface voxels need to stamp the ellipsoid: a point reached
//! from an interior voxel is also reached from a surface voxel with a kernel
//! offset that is shorter on some axis, and the ellipsoid is closed under
//! such shortening.

use std::time::Instant;

use log::debug;

use crate::calibration::Calibration;
use crate::error::{AnalysisError, Result};
use crate::objects::VoxelObject;
use crate::volume::{BoundingBox, Voxel};

const FACE_OFFSETS: [(i32, i32, i32); 6] =
    [(-1, 0, 0), (1, 0, 0), (0, -1, 0), (0, 1, 0), (0, 0, -1), (0, 0, 1)];

// Offsets (dx, dy, dz) with sum((d / r)^2) <= 1.
fn ellipsoid_offsets(rx: f64, ry: f64, rz: f64) -> Vec<(i32, i32, i32)> {
    let (ex, ey, ez) = (rx.floor() as i32, ry.floor() as i32, rz.floor() as i32);
    let term = |d: i32, r: f64| if d == 0 { 0.0 } else { (d as f64 / r).powi(2) };
    let mut offsets = Vec::new();
    for dz in -ez..=ez {
        for dy in -ey..=ey {
            for dx in -ex..=ex {
                if term(dx, rx) + term(dy, ry) + term(dz, rz) <= 1.0 + 1e-9 {
                    offsets.push((dx, dy, dz));
                }
            }
        }
    }
    offsets
}

// Dense occupancy over a box.
struct LocalMask {
    region: BoundingBox,
    width: usize,
    height: usize,
    bits: Vec<bool>,
}

impl LocalMask {
    fn new(region: BoundingBox) -> Self {
        let (width, height, depth) = region.extent();
        LocalMask { region, width, height, bits: vec![false; width * height * depth] }
    }

    fn mark(&mut self, v: Voxel) {
        if !self.region.contains(v) {
            return;
        }
        let x = (v.x as i64 - self.region.xmin as i64) as usize;
        let y = (v.y as i64 - self.region.ymin as i64) as usize;
        let z = (v.z as i64 - self.region.zmin as i64) as usize;
        self.bits[x + self.width * (y + self.height * z)] = true;
    }

    // Marked voxels in scan order.
    fn voxels(&self) -> Vec<Voxel> {
        let plane = self.width * self.height;
        self.bits.iter().enumerate()
            .filter(|(_, set)| **set)
            .map(|(index, _)| {
                let rem = index % plane;
                Voxel::new(self.region.xmin + (rem % self.width) as i32,
                           self.region.ymin + (rem / self.width) as i32,
                           self.region.zmin + (index / plane) as i32)
            })
            .collect()
    }
}

/// Grows `object` by `radius` physical units along each axis, using
/// `calibration` to convert the radius into voxels per axis. Voxels of the
/// result that fall outside `bounds` are dropped; this includes any voxels of
/// `object` itself that lie outside. The returned object keeps the input's
/// label.
///
/// Fails with [AnalysisError::InvalidParameter] if `radius` is negative or
/// not finite.
pub fn dilate(object: &VoxelObject, bounds: &BoundingBox, radius: f64,
              calibration: &Calibration) -> Result<VoxelObject> {
    if !radius.is_finite() || radius < 0.0 {
        return Err(AnalysisError::InvalidParameter {
            name: "dilation radius",
            value: radius,
            reason: "must be finite and non-negative",
        });
    }
    let dilate_start = Instant::now();
    let (rx, ry, rz) = calibration.voxel_radii(radius);
    let region = object.bounding_box()
        .expanded(rx.floor() as i32, ry.floor() as i32, rz.floor() as i32)
        .intersection(bounds);
    if object.is_empty() || region.is_empty() {
        return Ok(VoxelObject::new(object.label(), Vec::new()));
    }

    let kernel = ellipsoid_offsets(rx, ry, rz);
    let mut mask = LocalMask::new(region);
    let mut surface_count = 0;
    for &v in object.voxels() {
        mask.mark(v);
        let on_surface = FACE_OFFSETS.iter().any(|&(dx, dy, dz)| {
            !object.contains(Voxel::new(v.x.saturating_add(dx), v.y.saturating_add(dy),
                                        v.z.saturating_add(dz)))
        });
        if !on_surface {
            continue;
        }
        surface_count += 1;
        for &(dx, dy, dz) in &kernel {
            mask.mark(Voxel::new(v.x.saturating_add(dx), v.y.saturating_add(dy),
                                 v.z.saturating_add(dz)));
        }
    }
    let dilated = VoxelObject::from_sorted(object.label(), mask.voxels());
    debug!("Dilated object {} ({} voxels, {} on surface) by {:.2}x{:.2}x{:.2} voxels \
            to {} voxels in {:?}",
           object.label(), object.len(), surface_count, rx, ry, rz,
           dilated.len(), dilate_start.elapsed());
    Ok(dilated)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn single(x: i32, y: i32, z: i32) -> VoxelObject {
        VoxelObject::new(3, vec![Voxel::new(x, y, z)])
    }

    #[test]
    fn test_kernel_shapes() {
        assert_eq!(ellipsoid_offsets(0.0, 0.0, 0.0), vec![(0, 0, 0)]);
        assert_eq!(ellipsoid_offsets(1.0, 1.0, 1.0).len(), 7);
        assert_eq!(ellipsoid_offsets(1.5, 1.5, 1.5).len(), 19);
        assert_eq!(ellipsoid_offsets(2.0, 2.0, 0.5).len(), 13);
    }

    #[test]
    fn test_isotropic_dilation() {
        let cal = Calibration::unit_microns();
        let dilated = dilate(&single(5, 5, 5), &BoundingBox::unbounded(), 1.0, &cal)
            .unwrap();
        assert_eq!(dilated.len(), 7);
        assert_eq!(dilated.label(), 3);
        assert!(dilated.contains(Voxel::new(5, 5, 4)));
        assert!(!dilated.contains(Voxel::new(6, 6, 5)));
    }

    #[test]
    fn test_anisotropic_dilation() {
        // 2 voxel radius in XY, a quarter voxel in Z.
        let cal = Calibration::isotropic_xy(0.5, 4.0).unwrap();
        let dilated = dilate(&single(5, 5, 5), &BoundingBox::unbounded(), 1.0, &cal)
            .unwrap();
        assert_eq!(dilated.len(), 13);
        assert!(dilated.voxels().iter().all(|v| v.z == 5));
        assert!(dilated.contains(Voxel::new(7, 5, 5)));
        assert!(!dilated.contains(Voxel::new(7, 6, 5)));
    }

    #[test]
    fn test_clipped_at_corner() {
        let cal = Calibration::unit_microns();
        let bounds = BoundingBox::of_grid(10, 10, 5);
        let dilated = dilate(&single(0, 0, 0), &bounds, 1.0, &cal).unwrap();
        assert_eq!(dilated.len(), 4);
        assert!(dilated.voxels().iter().all(|&v| bounds.contains(v)));
    }

    #[test]
    fn test_interior_voxels_do_not_change_result() {
        // A solid 5x5x5 cube dilated by 2 must match the brute-force union
        // of kernels over every voxel.
        let cal = Calibration::unit_microns();
        let mut voxels = Vec::new();
        for z in 0..5 {
            for y in 0..5 {
                for x in 0..5 {
                    voxels.push(Voxel::new(x, y, z));
                }
            }
        }
        let object = VoxelObject::new(1, voxels.clone());
        let dilated = dilate(&object, &BoundingBox::unbounded(), 2.0, &cal).unwrap();

        let kernel = ellipsoid_offsets(2.0, 2.0, 2.0);
        let mut brute = Vec::new();
        for v in &voxels {
            for &(dx, dy, dz) in &kernel {
                brute.push(Voxel::new(v.x + dx, v.y + dy, v.z + dz));
            }
        }
        assert_eq!(dilated, VoxelObject::new(1, brute));
    }

    #[test]
    fn test_zero_radius_and_input_unchanged() {
        let cal = Calibration::unit_microns();
        let object = VoxelObject::new(2, vec![Voxel::new(1, 1, 1), Voxel::new(2, 1, 1),
                                              Voxel::new(12, 1, 1)]);
        let before = object.clone();
        let dilated = dilate(&object, &BoundingBox::of_grid(10, 10, 5), 0.0, &cal)
            .unwrap();
        assert_eq!(object, before);
        // The voxel outside the bounds is clipped.
        assert_eq!(dilated.voxels(), &[Voxel::new(1, 1, 1), Voxel::new(2, 1, 1)]);
    }

    #[test]
    fn test_empty_and_invalid() {
        let cal = Calibration::unit_microns();
        let empty = VoxelObject::new(1, Vec::new());
        assert!(dilate(&empty, &BoundingBox::unbounded(), 3.0, &cal).unwrap().is_empty());
        let err = dilate(&single(0, 0, 0), &BoundingBox::unbounded(), -1.0, &cal)
            .unwrap_err();
        assert!(err.is_configuration());
        assert!(dilate(&single(0, 0, 0), &BoundingBox::unbounded(), f64::NAN, &cal)
                .is_err());
    }
}
