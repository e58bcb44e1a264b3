// Copyright (c) 2025 Steven Rosenthal smr@dt3.org
// See LICENSE file in root directory for license terms.

//! Owned 3D sample arrays with an attached [Calibration].
//!
//! Samples are stored x-fastest, then y, then z. The same order is used
//! whenever voxels are enumerated ("scan order"), which makes labeling and
//! every derived population reproducible.

use crate::calibration::Calibration;
use crate::error::{AnalysisError, Result};

/// Value of a foreground voxel in a binary grid.
pub const FOREGROUND: u8 = 255;

/// Value of a background voxel in a binary grid.
pub const BACKGROUND: u8 = 0;

/// Integer voxel coordinate.
#[derive(Copy, Clone, Debug, Eq, Hash, PartialEq, Ord, PartialOrd)]
pub struct Voxel {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl Voxel {
    pub fn new(x: i32, y: i32, z: i32) -> Self {
        Voxel { x, y, z }
    }

    /// Ordering key matching scan order (z slowest, x fastest).
    pub fn scan_key(&self) -> (i32, i32, i32) {
        (self.z, self.y, self.x)
    }
}

impl From<(i32, i32, i32)> for Voxel {
    fn from((x, y, z): (i32, i32, i32)) -> Self {
        Voxel { x, y, z }
    }
}

/// Inclusive integer bounds. A box with `xmin > xmax` is empty.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct BoundingBox {
    pub xmin: i32,
    pub xmax: i32,
    pub ymin: i32,
    pub ymax: i32,
    pub zmin: i32,
    pub zmax: i32,
}

impl BoundingBox {
    pub fn empty() -> Self {
        BoundingBox { xmin: i32::MAX, xmax: i32::MIN,
                      ymin: i32::MAX, ymax: i32::MIN,
                      zmin: i32::MAX, zmax: i32::MIN }
    }

    /// Covers every representable voxel.
    pub fn unbounded() -> Self {
        BoundingBox { xmin: i32::MIN, xmax: i32::MAX,
                      ymin: i32::MIN, ymax: i32::MAX,
                      zmin: i32::MIN, zmax: i32::MAX }
    }

    /// Bounds of a `width` x `height` x `depth` grid anchored at the origin.
    /// Callers guarantee the dimensions are non-zero and fit in i32.
    pub fn of_grid(width: usize, height: usize, depth: usize) -> Self {
        BoundingBox { xmin: 0, xmax: width as i32 - 1,
                      ymin: 0, ymax: height as i32 - 1,
                      zmin: 0, zmax: depth as i32 - 1 }
    }

    pub fn is_empty(&self) -> bool {
        self.xmin > self.xmax || self.ymin > self.ymax || self.zmin > self.zmax
    }

    pub fn contains(&self, v: Voxel) -> bool {
        v.x >= self.xmin && v.x <= self.xmax &&
            v.y >= self.ymin && v.y <= self.ymax &&
            v.z >= self.zmin && v.z <= self.zmax
    }

    /// Grows the box to include `v`.
    pub fn include(&mut self, v: Voxel) {
        self.xmin = self.xmin.min(v.x);
        self.xmax = self.xmax.max(v.x);
        self.ymin = self.ymin.min(v.y);
        self.ymax = self.ymax.max(v.y);
        self.zmin = self.zmin.min(v.z);
        self.zmax = self.zmax.max(v.z);
    }

    /// Pads the box by the given amount on each side of each axis.
    pub fn expanded(&self, dx: i32, dy: i32, dz: i32) -> Self {
        if self.is_empty() {
            return *self;
        }
        BoundingBox { xmin: self.xmin.saturating_sub(dx),
                      xmax: self.xmax.saturating_add(dx),
                      ymin: self.ymin.saturating_sub(dy),
                      ymax: self.ymax.saturating_add(dy),
                      zmin: self.zmin.saturating_sub(dz),
                      zmax: self.zmax.saturating_add(dz) }
    }

    pub fn intersection(&self, other: &BoundingBox) -> Self {
        BoundingBox { xmin: self.xmin.max(other.xmin),
                      xmax: self.xmax.min(other.xmax),
                      ymin: self.ymin.max(other.ymin),
                      ymax: self.ymax.min(other.ymax),
                      zmin: self.zmin.max(other.zmin),
                      zmax: self.zmax.min(other.zmax) }
    }

    /// Extent along each axis in voxels; zero for an empty box.
    pub fn extent(&self) -> (usize, usize, usize) {
        if self.is_empty() {
            return (0, 0, 0);
        }
        let span = |lo: i32, hi: i32| (hi as i64 - lo as i64 + 1) as usize;
        (span(self.xmin, self.xmax), span(self.ymin, self.ymax),
         span(self.zmin, self.zmax))
    }

    /// Dimensions of the grid this box describes. The box must be anchored
    /// at the origin.
    pub fn grid_dimensions(&self) -> Result<(usize, usize, usize)> {
        let (w, h, d) = self.extent();
        if self.is_empty() || self.xmin != 0 || self.ymin != 0 || self.zmin != 0 {
            return Err(AnalysisError::EmptyGrid(w, h, d));
        }
        Ok((w, h, d))
    }
}

/// Scalar sample types that can be thresholded and filtered.
pub trait Sample: Copy + Default + PartialOrd + Send + Sync + 'static {
    fn to_f64(self) -> f64;
}

impl Sample for u8 {
    fn to_f64(self) -> f64 {
        self as f64
    }
}

impl Sample for u16 {
    fn to_f64(self) -> f64 {
        self as f64
    }
}

impl Sample for f32 {
    fn to_f64(self) -> f64 {
        self as f64
    }
}

/// A 3D array of samples with fixed dimensions and a calibration.
#[derive(Clone, Debug, PartialEq)]
pub struct VolumeGrid<T> {
    width: usize,
    height: usize,
    depth: usize,
    data: Vec<T>,
    calibration: Calibration,
}

/// Binary mask: [FOREGROUND] or [BACKGROUND] per voxel.
pub type BinaryGrid = VolumeGrid<u8>;

fn check_dimensions(width: usize, height: usize, depth: usize) -> Result<usize> {
    if width == 0 || height == 0 || depth == 0 {
        return Err(AnalysisError::EmptyGrid(width, height, depth));
    }
    let limit = i32::MAX as usize;
    if width > limit || height > limit || depth > limit {
        return Err(AnalysisError::GridTooLarge(width, height, depth));
    }
    width.checked_mul(height)
        .and_then(|n| n.checked_mul(depth))
        .ok_or(AnalysisError::GridTooLarge(width, height, depth))
}

impl<T: Copy> VolumeGrid<T> {
    /// Creates a grid with every voxel set to `value`.
    pub fn filled(width: usize, height: usize, depth: usize, value: T,
                  calibration: Calibration) -> Result<Self> {
        let len = check_dimensions(width, height, depth)?;
        Ok(VolumeGrid { width, height, depth, data: vec![value; len],
                        calibration })
    }

    /// Wraps `data`, which must be in scan order.
    pub fn from_vec(width: usize, height: usize, depth: usize, data: Vec<T>,
                    calibration: Calibration) -> Result<Self> {
        let len = check_dimensions(width, height, depth)?;
        if data.len() != len {
            return Err(AnalysisError::DataLength { expected: len,
                                                   actual: data.len() });
        }
        Ok(VolumeGrid { width, height, depth, data, calibration })
    }

    /// Creates a grid by evaluating `f(x, y, z)` at every voxel.
    pub fn from_fn<F>(width: usize, height: usize, depth: usize,
                      calibration: Calibration, mut f: F) -> Result<Self>
    where F: FnMut(usize, usize, usize) -> T {
        let len = check_dimensions(width, height, depth)?;
        let mut data = Vec::with_capacity(len);
        for z in 0..depth {
            for y in 0..height {
                for x in 0..width {
                    data.push(f(x, y, z));
                }
            }
        }
        Ok(VolumeGrid { width, height, depth, data, calibration })
    }
}

impl<T> VolumeGrid<T> {
    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn dimensions(&self) -> (usize, usize, usize) {
        (self.width, self.height, self.depth)
    }

    pub fn calibration(&self) -> &Calibration {
        &self.calibration
    }

    pub fn bounds(&self) -> BoundingBox {
        BoundingBox::of_grid(self.width, self.height, self.depth)
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Total physical volume covered by the grid.
    pub fn physical_volume(&self) -> f64 {
        self.data.len() as f64 * self.calibration.voxel_volume()
    }

    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.data
    }

    /// Samples of slice `z`, row-major.
    pub fn slice(&self, z: usize) -> &[T] {
        let plane = self.width * self.height;
        &self.data[z * plane..(z + 1) * plane]
    }

    pub fn slice_mut(&mut self, z: usize) -> &mut [T] {
        let plane = self.width * self.height;
        &mut self.data[z * plane..(z + 1) * plane]
    }

    /// Linear index of `v`, or None if it lies outside the grid.
    pub fn index_of(&self, v: Voxel) -> Option<usize> {
        if v.x < 0 || v.y < 0 || v.z < 0 {
            return None;
        }
        let (x, y, z) = (v.x as usize, v.y as usize, v.z as usize);
        if x >= self.width || y >= self.height || z >= self.depth {
            return None;
        }
        Some(x + self.width * (y + self.height * z))
    }

    /// Voxel at linear index `index`.
    pub fn voxel_at(&self, index: usize) -> Voxel {
        let plane = self.width * self.height;
        let z = index / plane;
        let rem = index % plane;
        Voxel::new((rem % self.width) as i32, (rem / self.width) as i32, z as i32)
    }

    /// Fails with [AnalysisError::DimensionMismatch] unless `other` has the
    /// same dimensions.
    pub fn check_same_dimensions<U>(&self, other: &VolumeGrid<U>) -> Result<()> {
        if self.dimensions() != other.dimensions() {
            return Err(AnalysisError::DimensionMismatch {
                left: self.dimensions(),
                right: other.dimensions(),
            });
        }
        Ok(())
    }

    /// Fails with [AnalysisError::CalibrationMismatch] unless `other` has the
    /// same voxel sizes and unit.
    pub fn check_same_calibration<U>(&self, other: &VolumeGrid<U>) -> Result<()> {
        if self.calibration != other.calibration {
            let sizes = |c: &Calibration| (c.voxel_width(), c.voxel_height(), c.voxel_depth());
            return Err(AnalysisError::CalibrationMismatch {
                left: sizes(&self.calibration),
                right: sizes(&other.calibration),
            });
        }
        Ok(())
    }
}

impl<T: Copy> VolumeGrid<T> {
    pub fn get(&self, v: Voxel) -> Option<T> {
        self.index_of(v).map(|i| self.data[i])
    }

    /// Sets `v` to `value`. Returns false, without writing, when `v` is
    /// outside the grid.
    pub fn set(&mut self, v: Voxel, value: T) -> bool {
        match self.index_of(v) {
            Some(i) => {
                self.data[i] = value;
                true
            },
            None => false,
        }
    }

    /// A grid of the same dimensions and calibration, set to `value`.
    pub fn same_dimensions<U: Copy>(&self, value: U) -> VolumeGrid<U> {
        VolumeGrid { width: self.width, height: self.height, depth: self.depth,
                     data: vec![value; self.data.len()],
                     calibration: self.calibration.clone() }
    }

    pub fn map<U, F>(&self, f: F) -> VolumeGrid<U>
    where F: Fn(T) -> U {
        VolumeGrid { width: self.width, height: self.height, depth: self.depth,
                     data: self.data.iter().map(|&v| f(v)).collect(),
                     calibration: self.calibration.clone() }
    }
}

impl BinaryGrid {
    /// Number of [FOREGROUND] voxels.
    pub fn count_foreground(&self) -> usize {
        self.data.iter().filter(|&&v| v == FOREGROUND).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cal() -> Calibration {
        Calibration::unit_microns()
    }

    #[test]
    fn test_rejects_empty_dimensions() {
        assert!(matches!(VolumeGrid::filled(0, 2, 2, 0_u8, cal()),
                         Err(AnalysisError::EmptyGrid(0, 2, 2))));
        assert!(matches!(VolumeGrid::from_vec(2, 2, 2, vec![0_u8; 7], cal()),
                         Err(AnalysisError::DataLength { expected: 8, actual: 7 })));
    }

    #[test]
    fn test_scan_order() {
        let grid = VolumeGrid::from_fn(3, 2, 2, cal(),
                                       |x, y, z| (x + 10 * y + 100 * z) as u16)
            .unwrap();
        assert_eq!(grid.as_slice()[..4], [0, 1, 2, 10]);
        assert_eq!(grid.get(Voxel::new(2, 1, 1)), Some(112));
        assert_eq!(grid.get(Voxel::new(3, 0, 0)), None);
        assert_eq!(grid.get(Voxel::new(-1, 0, 0)), None);
        assert_eq!(grid.voxel_at(7), Voxel::new(1, 0, 1));
        assert_eq!(grid.index_of(Voxel::new(1, 0, 1)), Some(7));
        assert_eq!(grid.slice(1), &[100, 101, 102, 110, 111, 112]);
    }

    #[test]
    fn test_set_outside_is_ignored() {
        let mut grid = VolumeGrid::filled(2, 2, 2, BACKGROUND, cal()).unwrap();
        assert!(grid.set(Voxel::new(1, 1, 1), FOREGROUND));
        assert!(!grid.set(Voxel::new(2, 0, 0), FOREGROUND));
        assert_eq!(grid.count_foreground(), 1);
    }

    #[test]
    fn test_dimension_check() {
        let a = VolumeGrid::filled(2, 2, 2, 0_u8, cal()).unwrap();
        let b = VolumeGrid::filled(2, 2, 3, 0_u8, cal()).unwrap();
        assert!(a.check_same_dimensions(&a.same_dimensions(1_u16)).is_ok());
        assert!(matches!(a.check_same_dimensions(&b),
                         Err(AnalysisError::DimensionMismatch { .. })));

        // Sample types need not be Copy.
        let names = a.map(|v| format!("{}", v));
        assert_eq!(names.dimensions(), (2, 2, 2));
        assert!(a.check_same_dimensions(&names).is_ok());
        assert!(names.check_same_dimensions(&b).is_err());
    }

    #[test]
    fn test_calibration_check() {
        let a = VolumeGrid::filled(2, 2, 2, 0_u8, cal()).unwrap();
        let coarse = Calibration::isotropic_xy(1.0, 2.0).unwrap();
        let b = VolumeGrid::filled(2, 2, 2, 0_u16, coarse).unwrap();
        assert!(a.check_same_calibration(&a.same_dimensions(1_u16)).is_ok());
        match a.check_same_calibration(&b) {
            Err(AnalysisError::CalibrationMismatch { left, right }) => {
                assert_eq!(left, (1.0, 1.0, 1.0));
                assert_eq!(right, (1.0, 1.0, 2.0));
            },
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_bounding_box() {
        let mut bb = BoundingBox::empty();
        assert!(bb.is_empty());
        assert_eq!(bb.extent(), (0, 0, 0));
        bb.include(Voxel::new(2, 3, 4));
        bb.include(Voxel::new(1, 5, 4));
        assert_eq!(bb, BoundingBox { xmin: 1, xmax: 2, ymin: 3, ymax: 5,
                                     zmin: 4, zmax: 4 });
        assert_eq!(bb.extent(), (2, 3, 1));
        let grown = bb.expanded(2, 0, 1);
        assert_eq!(grown.xmin, -1);
        assert_eq!(grown.zmax, 5);
        let clipped = grown.intersection(&BoundingBox::of_grid(10, 10, 5));
        assert_eq!(clipped.xmin, 0);
        assert_eq!(clipped.zmax, 4);
        assert!(BoundingBox::of_grid(3, 3, 3).contains(Voxel::new(2, 2, 2)));
        assert!(!BoundingBox::of_grid(3, 3, 3).contains(Voxel::new(3, 2, 2)));
        assert_eq!(BoundingBox::of_grid(4, 5, 6).grid_dimensions().unwrap(),
                   (4, 5, 6));
        assert!(bb.grid_dimensions().is_err());
        assert!(BoundingBox::unbounded().contains(Voxel::new(i32::MIN, 0, i32::MAX)));
    }
}
