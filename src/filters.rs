// Copyright (c) 2025 Steven Rosenthal smr@dt3.org
// See LICENSE file in root directory for license terms.

//! Per-slice 2D preprocessing applied before thresholding.

use std::cmp::Ordering;
use std::time::Instant;

use log::debug;

use crate::volume::{Sample, VolumeGrid};

// Offsets of the circular rank-filter kernel: dx^2 + dy^2 <= r^2 + 1.
fn circle_offsets(radius: f64) -> Vec<(i32, i32)> {
    let r2 = radius * radius + 1.0;
    let extent = r2.sqrt().floor() as i32;
    let mut offsets = Vec::new();
    for dy in -extent..=extent {
        for dx in -extent..=extent {
            if ((dx * dx + dy * dy) as f64) <= r2 {
                offsets.push((dx, dy));
            }
        }
    }
    offsets
}

/// Median over a circular neighborhood of `radius` pixels, slice by slice.
/// Near the edges only the in-bounds part of the neighborhood is used. A
/// radius of zero (or less) returns a copy.
pub fn median_filter<T: Sample>(grid: &VolumeGrid<T>, radius: f64) -> VolumeGrid<T> {
    if !(radius > 0.0) {
        return grid.clone();
    }
    let median_start = Instant::now();
    let (width, height, depth) = grid.dimensions();
    let offsets = circle_offsets(radius);
    let mut result = grid.clone();
    let mut window: Vec<T> = Vec::with_capacity(offsets.len());
    for z in 0..depth {
        let src = grid.slice(z);
        let dst = result.slice_mut(z);
        for y in 0..height as i32 {
            for x in 0..width as i32 {
                window.clear();
                for &(dx, dy) in &offsets {
                    let (nx, ny) = (x + dx, y + dy);
                    if nx >= 0 && ny >= 0 && nx < width as i32 && ny < height as i32 {
                        window.push(src[nx as usize + width * ny as usize]);
                    }
                }
                let mid = window.len() / 2;
                let (_, median, _) = window.select_nth_unstable_by(
                    mid, |a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
                dst[x as usize + width * y as usize] = *median;
            }
        }
    }
    debug!("Median filter radius {} ({} pixel kernel) in {:?}",
           radius, offsets.len(), median_start.elapsed());
    result
}

// Gaussian and its scale-normalized second derivative sigma^2 * g'', both
// truncated at ceil(4 sigma). The smoothing kernel sums to one and the
// derivative kernel to zero.
fn gaussian_kernels(sigma: f64) -> (Vec<f32>, Vec<f32>) {
    let half = (4.0 * sigma).ceil() as i32;
    let mut smooth = Vec::with_capacity(2 * half as usize + 1);
    let mut second = Vec::with_capacity(2 * half as usize + 1);
    for i in -half..=half {
        let t = i as f64 / sigma;
        let g = (-0.5 * t * t).exp();
        smooth.push(g);
        second.push((t * t - 1.0) * g);
    }
    let smooth_sum: f64 = smooth.iter().sum();
    let second_mean = second.iter().sum::<f64>() / second.len() as f64;
    let smooth = smooth.iter().map(|&g| (g / smooth_sum) as f32).collect();
    let second = second.iter().map(|&g| ((g - second_mean) / smooth_sum) as f32).collect();
    (smooth, second)
}

// Convolves every row (`horizontal`) or column with `kernel`, replicating
// edge pixels.
fn convolve_1d(src: &[f32], width: usize, height: usize, kernel: &[f32],
               horizontal: bool) -> Vec<f32> {
    let half = (kernel.len() / 2) as i64;
    let mut dst = vec![0.0_f32; src.len()];
    for y in 0..height {
        for x in 0..width {
            let mut acc = 0.0_f32;
            for (k, &weight) in kernel.iter().enumerate() {
                let offset = k as i64 - half;
                let (sx, sy) = if horizontal {
                    ((x as i64 + offset).clamp(0, width as i64 - 1) as usize, y)
                } else {
                    (x, (y as i64 + offset).clamp(0, height as i64 - 1) as usize)
                };
                acc += weight * src[sx + width * sy];
            }
            dst[x + width * y] = acc;
        }
    }
    dst
}

/// Negated, scale-normalized Laplacian of Gaussian, slice by slice. Bright
/// structures of width comparable to `sigma` give positive responses; flat
/// regions give zero. A `sigma` of zero (or less) only converts to f32.
pub fn laplacian_of_gaussian<T: Sample>(grid: &VolumeGrid<T>, sigma: f64) -> VolumeGrid<f32> {
    let mut result = grid.map(|v| v.to_f64() as f32);
    if !(sigma > 0.0) {
        return result;
    }
    let log_start = Instant::now();
    let (width, height, depth) = grid.dimensions();
    let (smooth, second) = gaussian_kernels(sigma);
    for z in 0..depth {
        let slice = result.slice_mut(z);
        let dxx = convolve_1d(&convolve_1d(slice, width, height, &second, true),
                              width, height, &smooth, false);
        let dyy = convolve_1d(&convolve_1d(slice, width, height, &smooth, true),
                              width, height, &second, false);
        for (out, (xx, yy)) in slice.iter_mut().zip(dxx.iter().zip(&dyy)) {
            *out = -(xx + yy);
        }
    }
    debug!("Laplacian of Gaussian sigma {} ({} tap kernels) in {:?}",
           sigma, smooth.len(), log_start.elapsed());
    result
}
