// Copyright (c) 2025 Steven Rosenthal smr@dt3.org
// See LICENSE file in root directory for license terms.

//! Connected-component extraction over binary grids.
//!
//! Labeling is a two-pass raster algorithm. The first pass walks the grid
//! in scan order (x fastest, then y, then z) and gives each foreground voxel
//! the provisional label of an already-visited neighbor, recording
//! equivalences whenever neighbors disagree. The second pass resolves the
//! equivalences and numbers the final objects in the order their first
//! voxel is met, so identical input always yields identical labels.

use std::fmt;
use std::str::FromStr;
use std::time::Instant;

use log::{debug, info, warn};

use crate::error::{AnalysisError, Result};
use crate::objects::{ObjectPopulation, VoxelObject};
use crate::volume::{BinaryGrid, Voxel, BACKGROUND};

/// Which voxels count as adjacent.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum Connectivity {
    /// Face neighbors only.
    Six,
    /// Face and edge neighbors.
    Eighteen,
    /// Face, edge and corner neighbors.
    #[default]
    TwentySix,
}

impl Connectivity {
    /// Offsets of the neighbors that precede a voxel in scan order.
    fn backward_offsets(&self) -> Vec<(i32, i32, i32)> {
        let max_manhattan = match self {
            Connectivity::Six => 1,
            Connectivity::Eighteen => 2,
            Connectivity::TwentySix => 3,
        };
        let mut offsets = Vec::new();
        for dz in -1_i32..=0 {
            for dy in -1_i32..=1 {
                for dx in -1_i32..=1 {
                    let precedes = dz < 0 || (dz == 0 && (dy < 0 || (dy == 0 && dx < 0)));
                    let manhattan = dx.abs() + dy.abs() + dz.abs();
                    if precedes && manhattan <= max_manhattan {
                        offsets.push((dx, dy, dz));
                    }
                }
            }
        }
        offsets
    }

    pub fn neighbor_count(&self) -> usize {
        match self {
            Connectivity::Six => 6,
            Connectivity::Eighteen => 18,
            Connectivity::TwentySix => 26,
        }
    }
}

impl fmt::Display for Connectivity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.neighbor_count())
    }
}

impl FromStr for Connectivity {
    type Err = AnalysisError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "6" => Ok(Connectivity::Six),
            "18" => Ok(Connectivity::Eighteen),
            "26" => Ok(Connectivity::TwentySix),
            _ => Err(AnalysisError::InvalidParameter {
                name: "connectivity",
                value: s.trim().parse().unwrap_or(f64::NAN),
                reason: "must be 6, 18 or 26",
            }),
        }
    }
}

// Root of `label`, compressing the path on the way.
fn find_root(parents: &mut [u32], label: u32) -> u32 {
    let mut root = label;
    while parents[root as usize] != root {
        root = parents[root as usize];
    }
    let mut current = label;
    while parents[current as usize] != root {
        let next = parents[current as usize];
        parents[current as usize] = root;
        current = next;
    }
    root
}

// Merges the sets of `a` and `b`; the smaller root wins.
fn union(parents: &mut [u32], a: u32, b: u32) -> u32 {
    let root_a = find_root(parents, a);
    let root_b = find_root(parents, b);
    let (keep, absorb) = if root_a < root_b { (root_a, root_b) } else { (root_b, root_a) };
    parents[absorb as usize] = keep;
    keep
}

/// Extracts connected foreground regions from binary grids.
#[derive(Copy, Clone, Debug, Default)]
pub struct ConnectedComponentLabeler {
    pub connectivity: Connectivity,
}

impl ConnectedComponentLabeler {
    pub fn new(connectivity: Connectivity) -> Self {
        ConnectedComponentLabeler { connectivity }
    }

    /// Every non-background voxel is foreground. Returns one object per
    /// connected region, labeled `1..=N` in order of first voxel.
    pub fn label(&self, grid: &BinaryGrid) -> ObjectPopulation {
        let label_start = Instant::now();
        let (width, height, depth) = grid.dimensions();
        let samples = grid.as_slice();
        let offsets = self.connectivity.backward_offsets();

        // Provisional label per voxel; 0 is background.
        let mut provisional = vec![0_u32; samples.len()];
        let mut parents: Vec<u32> = vec![0];
        for z in 0..depth {
            for y in 0..height {
                for x in 0..width {
                    let index = x + width * (y + height * z);
                    if samples[index] == BACKGROUND {
                        continue;
                    }
                    let mut assigned = 0_u32;
                    for &(dx, dy, dz) in &offsets {
                        let nx = x as i64 + dx as i64;
                        let ny = y as i64 + dy as i64;
                        let nz = z as i64 + dz as i64;
                        if nx < 0 || ny < 0 || nz < 0 || nx >= width as i64 || ny >= height as i64 {
                            continue;
                        }
                        let neighbor = provisional[nx as usize +
                                                   width * (ny as usize + height * nz as usize)];
                        if neighbor == 0 {
                            continue;
                        }
                        assigned = if assigned == 0 {
                            find_root(&mut parents, neighbor)
                        } else {
                            union(&mut parents, assigned, neighbor)
                        };
                    }
                    if assigned == 0 {
                        assigned = parents.len() as u32;
                        parents.push(assigned);
                    }
                    provisional[index] = assigned;
                }
            }
        }
        debug!("First labeling pass made {} provisional labels",
               parents.len() - 1);

        // Final labels in order of first appearance.
        let mut final_of_root = vec![0_u32; parents.len()];
        let mut voxel_lists: Vec<Vec<Voxel>> = Vec::new();
        for (index, &label) in provisional.iter().enumerate() {
            if label == 0 {
                continue;
            }
            let root = find_root(&mut parents, label) as usize;
            if final_of_root[root] == 0 {
                voxel_lists.push(Vec::new());
                final_of_root[root] = voxel_lists.len() as u32;
            }
            voxel_lists[final_of_root[root] as usize - 1].push(grid.voxel_at(index));
        }
        let objects: Vec<VoxelObject> = voxel_lists.into_iter().enumerate()
            .map(|(i, voxels)| VoxelObject::from_sorted(i as u32 + 1, voxels))
            .collect();
        info!("Labeling ({}-connected) found {} objects in {:?}",
              self.connectivity, objects.len(), label_start.elapsed());
        if objects.is_empty() {
            warn!("No foreground objects found");
        }
        ObjectPopulation::from_objects(objects, grid.calibration().clone())
    }
}

/// Labels `grid` with the default (26) connectivity.
pub fn label(grid: &BinaryGrid) -> ObjectPopulation {
    ConnectedComponentLabeler::default().label(grid)
}

#[cfg(test)]
mod tests {
    use crate::calibration::Calibration;
    use crate::volume::{VolumeGrid, FOREGROUND};
    use super::*;

    fn grid_with(dims: (usize, usize, usize), voxels: &[(i32, i32, i32)]) -> BinaryGrid {
        let mut grid = VolumeGrid::filled(dims.0, dims.1, dims.2, BACKGROUND,
                                          Calibration::unit_microns()).unwrap();
        for &v in voxels {
            assert!(grid.set(v.into(), FOREGROUND));
        }
        grid
    }

    #[test]
    fn test_backward_offsets() {
        assert_eq!(Connectivity::Six.backward_offsets().len(), 3);
        assert_eq!(Connectivity::Eighteen.backward_offsets().len(), 9);
        assert_eq!(Connectivity::TwentySix.backward_offsets().len(), 13);
    }

    #[test]
    fn test_diagonal_contact_depends_on_connectivity() {
        // Two voxels touching only at a corner.
        let grid = grid_with((3, 3, 3), &[(0, 0, 0), (1, 1, 1)]);
        assert_eq!(ConnectedComponentLabeler::new(Connectivity::TwentySix)
                   .label(&grid).len(), 1);
        assert_eq!(ConnectedComponentLabeler::new(Connectivity::Eighteen)
                   .label(&grid).len(), 2);
        assert_eq!(ConnectedComponentLabeler::new(Connectivity::Six)
                   .label(&grid).len(), 2);

        // Touching along an edge.
        let grid = grid_with((3, 3, 3), &[(0, 0, 0), (1, 1, 0)]);
        assert_eq!(ConnectedComponentLabeler::new(Connectivity::Eighteen)
                   .label(&grid).len(), 1);
        assert_eq!(ConnectedComponentLabeler::new(Connectivity::Six)
                   .label(&grid).len(), 2);
    }

    #[test]
    fn test_labels_follow_scan_order() {
        // Object B's first voxel (z = 0) precedes object A's (z = 1) even
        // though A has smaller x.
        let grid = grid_with((6, 2, 2), &[(0, 0, 1), (1, 0, 1), (4, 1, 0), (4, 1, 1)]);
        let population = label(&grid);
        assert_eq!(population.len(), 2);
        assert_eq!(population.objects()[0].label(), 1);
        assert_eq!(population.objects()[0].voxels(),
                   &[Voxel::new(4, 1, 0), Voxel::new(4, 1, 1)]);
        assert_eq!(population.objects()[1].label(), 2);
        assert_eq!(population.objects()[1].len(), 2);
    }

    #[test]
    fn test_u_shape_merges() {
        // The two arms get different provisional labels and meet at the
        // bottom row.
        // x . x
        // x . x
        // x x x
        let grid = grid_with((3, 3, 1), &[(0, 0, 0), (2, 0, 0), (0, 1, 0), (2, 1, 0),
                                          (0, 2, 0), (1, 2, 0), (2, 2, 0)]);
        let population = ConnectedComponentLabeler::new(Connectivity::Six).label(&grid);
        assert_eq!(population.len(), 1);
        assert_eq!(population.objects()[0].len(), 7);
    }

    #[test]
    fn test_empty_grid() {
        let grid = grid_with((4, 4, 4), &[]);
        let population = label(&grid);
        assert!(population.is_empty());
    }

    #[test]
    fn test_deterministic() {
        let voxels: Vec<(i32, i32, i32)> = (0..40)
            .map(|i| ((i * 7) % 9, (i * 5) % 8, (i * 3) % 5))
            .collect();
        let grid = grid_with((9, 8, 5), &voxels);
        assert_eq!(label(&grid), label(&grid));
        assert_eq!(label(&grid).voxel_count(), grid.count_foreground());
    }
}
