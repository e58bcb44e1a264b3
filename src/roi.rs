// Copyright (c) 2025 Steven Rosenthal smr@dt3.org
// See LICENSE file in root directory for license terms.

//! 2D polygon regions of interest, replicated across every slice.

use std::fs;
use std::path::Path;

use image::{GrayImage, Luma};
use imageproc::point::Point;
use log::debug;
use serde::{Deserialize, Serialize};

use crate::error::{AnalysisError, Result};

const INSIDE: Luma<u8> = Luma([255]);

// Vertices farther than this from the origin are rejected.
const MAX_COORDINATE: f32 = (1_u32 << 30) as f32;

/// A closed polygon. Vertices are in pixel edge coordinates: pixel `(x, y)`
/// spans `x..x+1`, `y..y+1`.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct Roi {
    #[serde(default)]
    pub name: String,
    pub points: Vec<[f32; 2]>,
}

impl Roi {
    pub fn new(name: &str, points: Vec<[f32; 2]>) -> Self {
        Roi { name: name.to_string(), points }
    }

    /// Axis-aligned rectangle covering pixels `x..x+width`, `y..y+height`.
    pub fn rectangle(name: &str, x: f32, y: f32, width: f32, height: f32) -> Self {
        Roi::new(name, vec![[x, y], [x + width, y], [x + width, y + height],
                            [x, y + height]])
    }

    fn invalid(&self, reason: String) -> AnalysisError {
        AnalysisError::InvalidRoi { name: self.name.clone(), reason }
    }

    // Vertices with repeated points and the closing point removed.
    fn vertices(&self) -> Result<Vec<Point<f32>>> {
        let mut vertices: Vec<Point<f32>> = Vec::with_capacity(self.points.len());
        for p in &self.points {
            if !p[0].is_finite() || !p[1].is_finite() {
                return Err(self.invalid("non-finite vertex".to_string()));
            }
            if p[0].abs() > MAX_COORDINATE || p[1].abs() > MAX_COORDINATE {
                return Err(self.invalid(format!("vertex ({}, {}) out of range", p[0], p[1])));
            }
            let vertex = Point::new(p[0], p[1]);
            if vertices.last() != Some(&vertex) {
                vertices.push(vertex);
            }
        }
        while vertices.len() > 1 && vertices.first() == vertices.last() {
            vertices.pop();
        }
        if vertices.len() < 3 {
            return Err(self.invalid(format!("needs at least 3 distinct vertices, has {}",
                                            vertices.len())));
        }
        Ok(vertices)
    }

    /// Paints into `mask` every pixel whose centre lies inside the polygon,
    /// by the even-odd rule.
    pub fn rasterize_into(&self, mask: &mut GrayImage) -> Result<()> {
        let vertices = self.vertices()?;
        let width = mask.width() as i64;
        let mut crossings: Vec<f64> = Vec::new();
        for y in 0..mask.height() {
            let yc = y as f64 + 0.5;
            crossings.clear();
            for (i, a) in vertices.iter().enumerate() {
                let b = &vertices[(i + 1) % vertices.len()];
                let (ax, ay, bx, by) = (a.x as f64, a.y as f64, b.x as f64, b.y as f64);
                if (ay > yc) != (by > yc) {
                    crossings.push(ax + (yc - ay) * (bx - ax) / (by - ay));
                }
            }
            crossings.sort_by(f64::total_cmp);
            for span in crossings.chunks_exact(2) {
                // Pixels whose centre x + 0.5 lies in [span[0], span[1]).
                let first = ((span[0] - 0.5).ceil() as i64).max(0);
                let end = ((span[1] - 0.5).ceil() as i64).min(width);
                for x in first..end {
                    mask.put_pixel(x as u32, y, INSIDE);
                }
            }
        }
        Ok(())
    }
}

/// Mask of the union of `rois` over a `width` x `height` slice. Pixels inside
/// any polygon are 255.
pub fn union_mask(rois: &[Roi], width: u32, height: u32) -> Result<GrayImage> {
    let mut mask = GrayImage::new(width, height);
    for roi in rois {
        roi.rasterize_into(&mut mask)?;
    }
    Ok(mask)
}

/// Number of pixels covered by the union of `rois`.
pub fn union_pixel_count(rois: &[Roi], width: u32, height: u32) -> Result<usize> {
    let mask = union_mask(rois, width, height)?;
    Ok(mask.pixels().filter(|p| p.0[0] != 0).count())
}

/// Reads a JSON list of polygons: `[{"name": "a", "points": [[x, y], ...]}]`.
pub fn load_rois(path: &Path) -> Result<Vec<Roi>> {
    let text = fs::read_to_string(path)?;
    let rois: Vec<Roi> = serde_json::from_str(&text).map_err(|source| {
        AnalysisError::RoiParse { path: path.to_path_buf(), source }
    })?;
    for roi in &rois {
        roi.vertices()?;
    }
    debug!("Loaded {} ROIs from {:?}", rois.len(), path);
    Ok(rois)
}
