// Copyright (c) 2025 Steven Rosenthal smr@dt3.org
// See LICENSE file in root directory for license terms.

//! Rasterization of objects and regions into grids the caller owns.

use std::ops::Sub;

use log::debug;

use crate::error::{AnalysisError, Result};
use crate::objects::{ObjectPopulation, VoxelObject};
use crate::roi::{union_mask, Roi};
use crate::volume::VolumeGrid;

// Fails if any voxel of `object` lies outside `grid`. Only the bounding box
// corners need checking.
fn check_fits<T: Copy>(object: &VoxelObject, grid: &VolumeGrid<T>) -> Result<()> {
    let bb = object.bounding_box();
    let bounds = grid.bounds();
    if bb.is_empty() || (bounds.contains((bb.xmin, bb.ymin, bb.zmin).into()) &&
                         bounds.contains((bb.xmax, bb.ymax, bb.zmax).into())) {
        return Ok(());
    }
    // Report the first offending voxel.
    let bad = object.voxels().iter()
        .find(|&&v| !bounds.contains(v))
        .copied()
        .unwrap_or((bb.xmin, bb.ymin, bb.zmin).into());
    Err(AnalysisError::VoxelOutOfBounds { label: object.label(),
                                          x: bad.x, y: bad.y, z: bad.z,
                                          dims: grid.dimensions() })
}

/// Sets every voxel of `object` to `value` in `grid`. Nothing is written if
/// any voxel of `object` falls outside the grid.
pub fn draw<T: Copy>(object: &VoxelObject, grid: &mut VolumeGrid<T>, value: T)
                     -> Result<()> {
    check_fits(object, grid)?;
    for &v in object.voxels() {
        grid.set(v, value);
    }
    Ok(())
}

/// Draws every object of `population` with the same `value`.
pub fn draw_population<T: Copy>(population: &ObjectPopulation, grid: &mut VolumeGrid<T>,
                                value: T) -> Result<()> {
    for object in population {
        draw(object, grid, value)?;
    }
    Ok(())
}

/// Sets to `background` every voxel, in every slice, that lies inside any of
/// `rois`.
pub fn clear_regions<T: Copy>(grid: &mut VolumeGrid<T>, rois: &[Roi], background: T)
                              -> Result<()> {
    if rois.is_empty() {
        return Ok(());
    }
    let mask = union_mask(rois, grid.width() as u32, grid.height() as u32)?;
    let inside: Vec<usize> = mask.as_raw().iter().enumerate()
        .filter(|(_, p)| **p != 0)
        .map(|(i, _)| i)
        .collect();
    for z in 0..grid.depth() {
        let slice = grid.slice_mut(z);
        for &i in &inside {
            slice[i] = background;
        }
    }
    debug!("Cleared {} pixels per slice under {} ROIs", inside.len(), rois.len());
    Ok(())
}

/// Voxel-wise `max(0, a - b)` as a new grid with `a`'s calibration.
pub fn subtract<T>(a: &VolumeGrid<T>, b: &VolumeGrid<T>) -> Result<VolumeGrid<T>>
where T: Copy + Default + PartialOrd + Sub<Output = T> {
    a.check_same_dimensions(b)?;
    let mut result = a.clone();
    for (r, &s) in result.as_mut_slice().iter_mut().zip(b.as_slice()) {
        *r = if *r > s { *r - s } else { T::default() };
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use crate::calibration::Calibration;
    use crate::volume::{Voxel, BACKGROUND, FOREGROUND};
    use super::*;

    fn grid(w: usize, h: usize, d: usize) -> VolumeGrid<u8> {
        VolumeGrid::filled(w, h, d, BACKGROUND, Calibration::unit_microns()).unwrap()
    }

    #[test]
    fn test_draw() {
        let mut g = grid(4, 4, 2);
        let object = VoxelObject::new(1, vec![Voxel::new(0, 0, 0), Voxel::new(3, 3, 1)]);
        draw(&object, &mut g, FOREGROUND).unwrap();
        assert_eq!(g.count_foreground(), 2);
        assert_eq!(g.get(Voxel::new(3, 3, 1)), Some(FOREGROUND));
        draw(&object, &mut g, BACKGROUND).unwrap();
        assert_eq!(g.count_foreground(), 0);
    }

    #[test]
    fn test_draw_out_of_bounds_writes_nothing() {
        let mut g = grid(4, 4, 2);
        let object = VoxelObject::new(5, vec![Voxel::new(1, 1, 0), Voxel::new(1, 1, 2)]);
        let err = draw(&object, &mut g, FOREGROUND).unwrap_err();
        assert!(matches!(err, AnalysisError::VoxelOutOfBounds { label: 5, z: 2, .. }));
        assert_eq!(g.count_foreground(), 0);
    }

    #[test]
    fn test_clear_regions() {
        let mut g = grid(6, 6, 3).map(|_| FOREGROUND);
        clear_regions(&mut g, &[], BACKGROUND).unwrap();
        assert_eq!(g.count_foreground(), 108);

        let roi = Roi::rectangle("artefact", 1.0, 1.0, 2.0, 3.0);
        clear_regions(&mut g, &[roi], BACKGROUND).unwrap();
        assert_eq!(g.count_foreground(), 108 - 3 * 6);
        for z in 0..3 {
            assert_eq!(g.get(Voxel::new(2, 3, z)), Some(BACKGROUND));
            assert_eq!(g.get(Voxel::new(3, 3, z)), Some(FOREGROUND));
        }
    }

    #[test]
    fn test_subtract_saturates() {
        let cal = Calibration::unit_microns();
        let a = VolumeGrid::from_vec(4, 1, 1, vec![255_u8, 255, 0, 10], cal.clone()).unwrap();
        let b = VolumeGrid::from_vec(4, 1, 1, vec![255_u8, 0, 255, 3], cal.clone()).unwrap();
        assert_eq!(subtract(&a, &b).unwrap().as_slice(), &[0, 255, 0, 7]);

        let c = VolumeGrid::filled(4, 2, 1, 0_u8, cal).unwrap();
        assert!(matches!(subtract(&a, &c), Err(AnalysisError::DimensionMismatch { .. })));
    }
}
