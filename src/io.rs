// Copyright (c) 2025 Steven Rosenthal smr@dt3.org
// See LICENSE file in root directory for license terms.

//! Reading slice stacks and writing overlay images.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use image::{Rgb, RgbImage};
use log::{debug, info, warn};

use crate::calibration::Calibration;
use crate::error::{AnalysisError, Result};
use crate::pipeline::Overlays;
use crate::volume::{VolumeGrid, BACKGROUND};

pub use crate::roi::load_rois;

const SLICE_EXTENSIONS: [&str; 3] = ["tif", "tiff", "png"];

// Slice files in `dir`, sorted by file name.
fn slice_paths(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut paths = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        let is_slice = path.is_file() && path.extension()
            .and_then(|e| e.to_str())
            .map(|e| SLICE_EXTENSIONS.iter().any(|s| s.eq_ignore_ascii_case(e)))
            .unwrap_or(false);
        if is_slice {
            paths.push(path);
        } else {
            debug!("Skipping {:?}", path);
        }
    }
    paths.sort();
    Ok(paths)
}

/// Reads every grayscale slice file in `dir`, in file name order, into one
/// stack. 8-bit samples are widened to 16 bits (v becomes v * 257). All
/// slices must have the same size.
pub fn load_stack(dir: &Path, calibration: &Calibration) -> Result<VolumeGrid<u16>> {
    let load_start = Instant::now();
    let paths = slice_paths(dir)?;
    if paths.is_empty() {
        return Err(AnalysisError::NoSlices(dir.to_path_buf()));
    }
    let mut size: Option<(u32, u32)> = None;
    let mut data: Vec<u16> = Vec::new();
    for path in &paths {
        let slice = image::open(path)
            .map_err(|source| AnalysisError::Image { path: path.clone(), source })?
            .to_luma16();
        let dimensions = slice.dimensions();
        match size {
            None => size = Some(dimensions),
            Some(expected) if expected != dimensions => {
                return Err(AnalysisError::SliceMismatch { path: path.clone(), expected,
                                                          actual: dimensions });
            },
            Some(_) => (),
        }
        data.extend_from_slice(slice.as_raw());
    }
    let (width, height) = size.unwrap_or((0, 0));
    let grid = VolumeGrid::from_vec(width as usize, height as usize, paths.len(), data,
                                    calibration.clone())?;
    info!("Loaded {}x{}x{} stack from {:?} in {:?}",
          width, height, paths.len(), dir, load_start.elapsed());
    Ok(grid)
}

/// Writes one RGB PNG per slice into `dir` as `<name>_z<slice>.png`: inside
/// astrocytes red, outside astrocytes green, vessels blue. Returns the paths
/// written.
pub fn save_overlays(dir: &Path, name: &str, overlays: &Overlays) -> Result<Vec<PathBuf>> {
    overlays.inside.check_same_dimensions(&overlays.outside)?;
    overlays.inside.check_same_dimensions(&overlays.vessels)?;
    fs::create_dir_all(dir)?;
    let (width, height, depth) = overlays.inside.dimensions();
    let mut written = Vec::with_capacity(depth);
    for z in 0..depth {
        let (inside, outside, vessels) =
            (overlays.inside.slice(z), overlays.outside.slice(z), overlays.vessels.slice(z));
        let mut rgb = RgbImage::new(width as u32, height as u32);
        for (i, pixel) in rgb.pixels_mut().enumerate() {
            *pixel = Rgb([inside[i], outside[i], vessels[i]]);
        }
        let path = dir.join(format!("{}_z{:04}.png", name, z));
        rgb.save(&path)
            .map_err(|source| AnalysisError::Image { path: path.clone(), source })?;
        written.push(path);
    }
    if overlays.inside.as_slice().iter().all(|&v| v == BACKGROUND) &&
        overlays.outside.as_slice().iter().all(|&v| v == BACKGROUND) {
        warn!("Overlays for {} contain no astrocytes", name);
    }
    debug!("Wrote {} overlay slices to {:?}", written.len(), dir);
    Ok(written)
}

#[cfg(test)]
mod tests {
    use image::{GrayImage, ImageBuffer, Luma};
    use crate::volume::{Voxel, FOREGROUND};
    use super::*;

    #[test]
    fn test_load_stack_sorted() {
        let dir = tempfile::tempdir().unwrap();
        for z in 0..3_u16 {
            let slice: ImageBuffer<Luma<u16>, Vec<u16>> =
                ImageBuffer::from_fn(4, 2, |x, y| Luma([1000 * z + 10 * y as u16 + x as u16]));
            // Written out of order; loading sorts by name.
            slice.save(dir.path().join(format!("s{}.png", 2 - z))).unwrap();
        }
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();
        let cal = Calibration::isotropic_xy(0.3, 1.0).unwrap();
        let grid = load_stack(dir.path(), &cal).unwrap();
        assert_eq!(grid.dimensions(), (4, 2, 3));
        assert_eq!(grid.calibration(), &cal);
        assert_eq!(grid.get(Voxel::new(3, 1, 0)), Some(2013));
        assert_eq!(grid.get(Voxel::new(0, 0, 2)), Some(0));
    }

    #[test]
    fn test_load_stack_widens_8_bit() {
        let dir = tempfile::tempdir().unwrap();
        GrayImage::from_pixel(2, 2, Luma([2])).save(dir.path().join("a.png")).unwrap();
        let grid = load_stack(dir.path(), &Calibration::unit_microns()).unwrap();
        assert_eq!(grid.as_slice(), &[514, 514, 514, 514]);
    }

    #[test]
    fn test_load_stack_errors() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(load_stack(dir.path(), &Calibration::unit_microns()),
                         Err(AnalysisError::NoSlices(_))));
        GrayImage::new(2, 2).save(dir.path().join("a.png")).unwrap();
        GrayImage::new(3, 2).save(dir.path().join("b.png")).unwrap();
        let err = load_stack(dir.path(), &Calibration::unit_microns()).unwrap_err();
        assert!(matches!(err, AnalysisError::SliceMismatch { expected: (2, 2),
                                                             actual: (3, 2), .. }));
        assert_eq!(err.kind(), "image");
    }

    #[test]
    fn test_save_overlays() {
        let cal = Calibration::unit_microns();
        let blank = VolumeGrid::filled(3, 2, 2, BACKGROUND, cal).unwrap();
        let mut overlays = Overlays { vessels: blank.clone(), inside: blank.clone(),
                                      outside: blank };
        overlays.inside.set(Voxel::new(0, 0, 1), FOREGROUND);
        overlays.vessels.set(Voxel::new(0, 0, 1), FOREGROUND);
        overlays.outside.set(Voxel::new(2, 1, 0), FOREGROUND);

        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("img");
        let written = save_overlays(&out, "img", &overlays).unwrap();
        assert_eq!(written, vec![out.join("img_z0000.png"), out.join("img_z0001.png")]);
        let slice1 = image::open(&written[1]).unwrap().to_rgb8();
        assert_eq!(slice1.get_pixel(0, 0), &Rgb([255, 0, 255]));
        let slice0 = image::open(&written[0]).unwrap().to_rgb8();
        assert_eq!(slice0.get_pixel(2, 1), &Rgb([0, 255, 0]));
        assert_eq!(slice0.get_pixel(0, 0), &Rgb([0, 0, 0]));
    }
}
