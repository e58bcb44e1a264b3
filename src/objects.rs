// Copyright (c) 2025 Steven Rosenthal smr@dt3.org
// See LICENSE file in root directory for license terms.

use std::time::Instant;

use log::{info, warn};

use crate::calibration::Calibration;
use crate::volume::{BoundingBox, Voxel};

/// A labeled set of voxels forming one connected component.
#[derive(Clone, Debug, PartialEq)]
pub struct VoxelObject {
    label: u32,

    // Sorted in scan order, no duplicates.
    voxels: Vec<Voxel>,
}

impl VoxelObject {
    /// Builds an object from voxels in any order; duplicates are dropped.
    pub fn new(label: u32, mut voxels: Vec<Voxel>) -> Self {
        voxels.sort_unstable_by_key(|v| v.scan_key());
        voxels.dedup();
        VoxelObject { label, voxels }
    }

    // `voxels` must already be in scan order without duplicates.
    pub(crate) fn from_sorted(label: u32, voxels: Vec<Voxel>) -> Self {
        debug_assert!(voxels.windows(2).all(|w| w[0].scan_key() < w[1].scan_key()));
        VoxelObject { label, voxels }
    }

    pub fn label(&self) -> u32 {
        self.label
    }

    pub fn voxels(&self) -> &[Voxel] {
        &self.voxels
    }

    pub fn len(&self) -> usize {
        self.voxels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.voxels.is_empty()
    }

    pub fn contains(&self, v: Voxel) -> bool {
        self.voxels.binary_search_by_key(&v.scan_key(), |w| w.scan_key()).is_ok()
    }

    pub fn bounding_box(&self) -> BoundingBox {
        let mut bb = BoundingBox::empty();
        for &v in &self.voxels {
            bb.include(v);
        }
        bb
    }

    /// Physical volume: voxel count times the calibrated voxel volume.
    pub fn volume(&self, calibration: &Calibration) -> f64 {
        self.voxels.len() as f64 * calibration.voxel_volume()
    }
}

/// Ordered collection of objects extracted from one grid. Labels are
/// `1..=len()` in population order.
#[derive(Clone, Debug, PartialEq)]
pub struct ObjectPopulation {
    objects: Vec<VoxelObject>,
    calibration: Calibration,
}

impl ObjectPopulation {
    pub fn empty(calibration: Calibration) -> Self {
        ObjectPopulation { objects: Vec::new(), calibration }
    }

    /// Takes ownership of `objects` and relabels them `1..=N` in order.
    pub fn from_objects(objects: Vec<VoxelObject>, calibration: Calibration) -> Self {
        let mut population = ObjectPopulation { objects, calibration };
        population.reset_labels();
        population
    }

    pub fn objects(&self) -> &[VoxelObject] {
        &self.objects
    }

    pub fn iter(&self) -> std::slice::Iter<'_, VoxelObject> {
        self.objects.iter()
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn calibration(&self) -> &Calibration {
        &self.calibration
    }

    pub fn get(&self, label: u32) -> Option<&VoxelObject> {
        if label == 0 {
            return None;
        }
        self.objects.get(label as usize - 1)
    }

    /// Total number of voxels over all objects.
    pub fn voxel_count(&self) -> usize {
        self.objects.iter().map(|o| o.len()).sum()
    }

    /// Renumbers labels densely from 1 in population order.
    pub fn reset_labels(&mut self) {
        for (i, object) in self.objects.iter_mut().enumerate() {
            object.label = i as u32 + 1;
        }
    }

    /// Drops every object whose volume is below `min_volume` or above
    /// `max_volume`, then renumbers the survivors from 1.
    pub fn filter_by_size(mut self, min_volume: f64, max_volume: f64) -> Self {
        let filter_start = Instant::now();
        let before = self.objects.len();
        let calibration = self.calibration.clone();
        self.objects.retain(|o| {
            let volume = o.volume(&calibration);
            !(volume < min_volume || volume > max_volume)
        });
        self.reset_labels();
        info!("Size filter [{}, {}] kept {} of {} objects in {:?}",
              min_volume, max_volume, self.objects.len(), before,
              filter_start.elapsed());
        if before > 0 && self.objects.is_empty() {
            warn!("Size filter removed every object");
        }
        self
    }
}

impl<'a> IntoIterator for &'a ObjectPopulation {
    type Item = &'a VoxelObject;
    type IntoIter = std::slice::Iter<'a, VoxelObject>;

    fn into_iter(self) -> Self::IntoIter {
        self.objects.iter()
    }
}

/// Free-function form of [ObjectPopulation::filter_by_size].
pub fn filter_by_size(population: ObjectPopulation, min_volume: f64,
                      max_volume: f64) -> ObjectPopulation {
    population.filter_by_size(min_volume, max_volume)
}
