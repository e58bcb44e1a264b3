// Copyright (c) 2025 Steven Rosenthal smr@dt3.org
// See LICENSE file in root directory for license terms.

//! Global automatic thresholding of whole stacks.
//!
//! A single cutoff is computed from the histogram of the entire 3D stack
//! (see [StackHistogram]) and applied uniformly to every slice. A voxel is
//! foreground iff its histogram bin is strictly greater than the selected
//! threshold bin, so moving the cutoff up can only turn foreground into
//! background.
//!
//! The histogram methods follow the classic ImageJ `AutoThresholder`
//! family. Each one maps a 256-bin histogram to a threshold bin, or to None
//! when the method cannot find a split (for example a histogram that never
//! becomes bimodal under smoothing).

use std::fmt;
use std::str::FromStr;
use std::time::Instant;

use log::{debug, info, log_enabled, warn, Level};

use crate::error::{AnalysisError, Result};
use crate::histogram_funcs::{normalized, partial_count, partial_first_moment,
                             partial_second_moment, stats_for_histogram,
                             StackHistogram, NUM_BINS};
use crate::volume::{BinaryGrid, Sample, VolumeGrid, BACKGROUND, FOREGROUND};

const EPSILON: f64 = 2.220446049250313e-16;

/// Smoothing passes allowed before a histogram is declared non-bimodal.
const MAX_SMOOTHING_ITERATIONS: usize = 10_000;

/// Iteration cap for the fixed-point methods.
const MAX_ITERATIONS: usize = 1_000;

#[derive(Copy, Clone, Debug, Eq, Hash, PartialEq)]
pub enum ThresholdMethod {
    Default,
    Intermodes,
    IsoData,
    Li,
    MaxEntropy,
    Mean,
    MinError,
    Minimum,
    Moments,
    Otsu,
    Percentile,
    Triangle,
    Yen,
}

impl ThresholdMethod {
    pub const ALL: [ThresholdMethod; 13] = [
        ThresholdMethod::Default, ThresholdMethod::Intermodes,
        ThresholdMethod::IsoData, ThresholdMethod::Li,
        ThresholdMethod::MaxEntropy, ThresholdMethod::Mean,
        ThresholdMethod::MinError, ThresholdMethod::Minimum,
        ThresholdMethod::Moments, ThresholdMethod::Otsu,
        ThresholdMethod::Percentile, ThresholdMethod::Triangle,
        ThresholdMethod::Yen,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            ThresholdMethod::Default => "Default",
            ThresholdMethod::Intermodes => "Intermodes",
            ThresholdMethod::IsoData => "IsoData",
            ThresholdMethod::Li => "Li",
            ThresholdMethod::MaxEntropy => "MaxEntropy",
            ThresholdMethod::Mean => "Mean",
            ThresholdMethod::MinError => "MinError",
            ThresholdMethod::Minimum => "Minimum",
            ThresholdMethod::Moments => "Moments",
            ThresholdMethod::Otsu => "Otsu",
            ThresholdMethod::Percentile => "Percentile",
            ThresholdMethod::Triangle => "Triangle",
            ThresholdMethod::Yen => "Yen",
        }
    }

    /// Threshold bin for `histogram`, or None when the method finds no split.
    pub fn threshold_bin(&self, histogram: &[u64]) -> Option<usize> {
        if histogram.is_empty() || histogram.iter().all(|&c| c == 0) {
            return None;
        }
        let bin = match self {
            ThresholdMethod::Default => ij_default(histogram),
            ThresholdMethod::Intermodes => intermodes(histogram),
            ThresholdMethod::IsoData => iso_data(histogram),
            ThresholdMethod::Li => li(histogram),
            ThresholdMethod::MaxEntropy => max_entropy(histogram),
            ThresholdMethod::Mean => Some(mean(histogram)),
            ThresholdMethod::MinError => min_error(histogram),
            ThresholdMethod::Minimum => minimum(histogram),
            ThresholdMethod::Moments => moments(histogram),
            ThresholdMethod::Otsu => Some(otsu(histogram)),
            ThresholdMethod::Percentile => Some(percentile(histogram, 0.5)),
            ThresholdMethod::Triangle => Some(triangle(histogram)),
            ThresholdMethod::Yen => yen(histogram),
        };
        bin.map(|b| b.min(histogram.len() - 1))
    }
}

impl fmt::Display for ThresholdMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ThresholdMethod {
    type Err = AnalysisError;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim();
        if wanted.eq_ignore_ascii_case("MinError(I)") {
            return Ok(ThresholdMethod::MinError);
        }
        ThresholdMethod::ALL.iter()
            .find(|m| m.name().eq_ignore_ascii_case(wanted))
            .copied()
            .ok_or_else(|| AnalysisError::UnknownThresholdMethod(s.to_string()))
    }
}

/// Converts a scalar stack into a binary mask. Implementations must be pure
/// and deterministic: the same grid and method always yield the same mask.
pub trait Thresholder {
    fn threshold<T: Sample>(&self, grid: &VolumeGrid<T>, method: ThresholdMethod)
                            -> Result<BinaryGrid>;
}

/// Portable CPU implementation based on [StackHistogram].
#[derive(Copy, Clone, Debug, Default)]
pub struct HistogramThresholder;

impl Thresholder for HistogramThresholder {
    fn threshold<T: Sample>(&self, grid: &VolumeGrid<T>, method: ThresholdMethod)
                            -> Result<BinaryGrid> {
        let threshold_start = Instant::now();
        let histogram = StackHistogram::from_grid(grid);
        if histogram.is_degenerate() {
            warn!("{} threshold: constant stack, mask is empty", method);
            return Ok(grid.same_dimensions(BACKGROUND));
        }
        let bin = match method.threshold_bin(&histogram.counts) {
            Some(bin) => bin,
            None => {
                warn!("{} threshold found no split, mask is empty", method);
                return Ok(grid.same_dimensions(BACKGROUND));
            },
        };
        let mask = grid.map(|v| {
            let v = v.to_f64();
            if !v.is_nan() && histogram.bin_of(v) > bin { FOREGROUND } else { BACKGROUND }
        });
        if log_enabled!(Level::Debug) {
            let stats = stats_for_histogram(&histogram.counts);
            debug!("Histogram mean bin {:.1}, median bin {}, stddev {:.1}",
                   stats.mean, stats.median, stats.stddev);
        }
        info!("{} threshold bin {} (value {:.3}) kept {} of {} voxels in {:?}",
              method, bin, histogram.upper_edge(bin), mask.count_foreground(),
              mask.len(), threshold_start.elapsed());
        Ok(mask)
    }
}

fn first_nonzero(histogram: &[u64]) -> Option<usize> {
    histogram.iter().position(|&c| c > 0)
}

fn last_nonzero(histogram: &[u64]) -> Option<usize> {
    histogram.iter().rposition(|&c| c > 0)
}

// ImageJ's "Default": IsoData variant that ignores the two extreme bins.
fn ij_default(histogram: &[u64]) -> Option<usize> {
    let max_value = histogram.len() - 1;
    let mut data = histogram.to_vec();
    data[0] = 0;
    data[max_value] = 0;
    let (min, max) = match (first_nonzero(&data), last_nonzero(&data)) {
        (Some(min), Some(max)) if min < max => (min, max),
        _ => return Some(histogram.len() / 2),
    };
    let mut moving_index = min;
    let mut result;
    loop {
        let (mut sum1, mut sum2, mut sum3, mut sum4) = (0.0, 0.0, 0.0, 0.0);
        for i in min..=moving_index {
            sum1 += i as f64 * data[i] as f64;
            sum2 += data[i] as f64;
        }
        for i in moving_index + 1..=max {
            sum3 += i as f64 * data[i] as f64;
            sum4 += data[i] as f64;
        }
        result = (sum1 / sum2 + sum3 / sum4) / 2.0;
        moving_index += 1;
        if !((moving_index + 1) as f64 <= result && moving_index < max - 1) {
            break;
        }
    }
    Some(result.round() as usize)
}

fn is_bimodal(y: &[f64]) -> bool {
    let mut modes = 0;
    for k in 1..y.len() - 1 {
        if y[k - 1] < y[k] && y[k + 1] < y[k] {
            modes += 1;
            if modes > 2 {
                return false;
            }
        }
    }
    modes == 2
}

// Smooths with a 3-point running mean until exactly two peaks remain.
fn smooth_until_bimodal(histogram: &[u64]) -> Option<Vec<f64>> {
    let mut smoothed: Vec<f64> = histogram.iter().map(|&c| c as f64).collect();
    let len = smoothed.len();
    let mut iterations = 0;
    while !is_bimodal(&smoothed) {
        let mut previous;
        let mut current = 0.0;
        let mut next = smoothed[0];
        for i in 0..len - 1 {
            previous = current;
            current = next;
            next = smoothed[i + 1];
            smoothed[i] = (previous + current + next) / 3.0;
        }
        smoothed[len - 1] = (current + next) / 3.0;
        iterations += 1;
        if iterations > MAX_SMOOTHING_ITERATIONS {
            debug!("Histogram not bimodal after {} smoothing passes", iterations);
            return None;
        }
    }
    Some(smoothed)
}

fn intermodes(histogram: &[u64]) -> Option<usize> {
    let smoothed = smooth_until_bimodal(histogram)?;
    let mut peak_sum = 0;
    for i in 1..smoothed.len() - 1 {
        if smoothed[i - 1] < smoothed[i] && smoothed[i + 1] < smoothed[i] {
            peak_sum += i;
        }
    }
    Some(peak_sum / 2)
}

fn minimum(histogram: &[u64]) -> Option<usize> {
    let smoothed = smooth_until_bimodal(histogram)?;
    (1..smoothed.len() - 1).find(|&i| {
        smoothed[i - 1] > smoothed[i] && smoothed[i + 1] >= smoothed[i]
    })
}

// Ridler & Calvard iterative intermeans.
fn iso_data(histogram: &[u64]) -> Option<usize> {
    let len = histogram.len();
    let mut g = match (1..len).find(|&i| histogram[i] > 0) {
        Some(i) => i + 1,
        None => 0,
    };
    loop {
        if g + 1 > len - 1 {
            return None;
        }
        let (mut l, mut totl) = (0_u64, 0_u64);
        for i in 0..=g {
            totl += histogram[i];
            l += histogram[i] * i as u64;
        }
        let (mut h, mut toth) = (0_u64, 0_u64);
        for i in g + 1..len {
            toth += histogram[i];
            h += histogram[i] * i as u64;
        }
        if totl > 0 && toth > 0 {
            l /= totl;
            h /= toth;
            if g == ((l + h) as f64 / 2.0).round() as usize {
                return Some(g);
            }
        }
        g += 1;
        if g > len - 2 {
            return None;
        }
    }
}

// Li & Tam minimum cross entropy, iterative form.
fn li(histogram: &[u64]) -> Option<usize> {
    let len = histogram.len();
    let num_pixels = partial_count(histogram, len - 1);
    let mean = partial_first_moment(histogram, len - 1) / num_pixels;
    let tolerance = 0.5;
    let mut new_thresh = mean;
    let mut threshold;
    let mut iterations = 0;
    loop {
        let old_thresh = new_thresh;
        threshold = ((old_thresh + 0.5) as usize).min(len - 1);
        let (mut sum_back, mut num_back) = (0.0, 0.0);
        for ih in 0..=threshold {
            sum_back += ih as f64 * histogram[ih] as f64;
            num_back += histogram[ih] as f64;
        }
        let mean_back = if num_back == 0.0 { 0.0 } else { sum_back / num_back };
        let (mut sum_obj, mut num_obj) = (0.0, 0.0);
        for ih in threshold + 1..len {
            sum_obj += ih as f64 * histogram[ih] as f64;
            num_obj += histogram[ih] as f64;
        }
        let mean_obj = if num_obj == 0.0 { 0.0 } else { sum_obj / num_obj };
        let temp = (mean_back - mean_obj) / (mean_back.ln() - mean_obj.ln());
        new_thresh = if temp < -EPSILON {
            (temp - 0.5).trunc()
        } else {
            (temp + 0.5).trunc()
        };
        iterations += 1;
        // A NaN step ends the iteration, as does convergence.
        if !((new_thresh - old_thresh).abs() > tolerance) || iterations >= MAX_ITERATIONS {
            break;
        }
    }
    Some(threshold)
}

// Kapur, Sahoo & Wong maximum entropy.
fn max_entropy(histogram: &[u64]) -> Option<usize> {
    let len = histogram.len();
    let norm = normalized(histogram);
    let mut p1 = vec![0.0; len];
    let mut p2 = vec![0.0; len];
    p1[0] = norm[0];
    p2[0] = 1.0 - p1[0];
    for ih in 1..len {
        p1[ih] = p1[ih - 1] + norm[ih];
        p2[ih] = 1.0 - p1[ih];
    }
    let first_bin = (0..len).find(|&ih| p1[ih].abs() >= EPSILON).unwrap_or(0);
    let last_bin = (first_bin..len).rev().find(|&ih| p2[ih].abs() >= EPSILON)
        .unwrap_or(len - 1);
    let mut threshold = None;
    let mut max_ent = f64::MIN_POSITIVE;
    for it in first_bin..=last_bin {
        let mut ent_back = 0.0;
        for ih in 0..=it {
            if histogram[ih] != 0 {
                let p = norm[ih] / p1[it];
                ent_back -= p * p.ln();
            }
        }
        let mut ent_obj = 0.0;
        for ih in it + 1..len {
            if histogram[ih] != 0 {
                let p = norm[ih] / p2[it];
                ent_obj -= p * p.ln();
            }
        }
        let tot_ent = ent_back + ent_obj;
        if max_ent < tot_ent {
            max_ent = tot_ent;
            threshold = Some(it);
        }
    }
    threshold
}

fn mean(histogram: &[u64]) -> usize {
    let last = histogram.len() - 1;
    (partial_first_moment(histogram, last) / partial_count(histogram, last)).floor()
        as usize
}

// Kittler & Illingworth minimum error, iterative form seeded with the mean.
fn min_error(histogram: &[u64]) -> Option<usize> {
    let last = histogram.len() - 1;
    let a = |j: usize| partial_count(histogram, j);
    let b = |j: usize| partial_first_moment(histogram, j);
    let c = |j: usize| partial_second_moment(histogram, j);
    let mut threshold = mean(histogram) as i64;
    let mut previous = -2_i64;
    let mut iterations = 0;
    while threshold != previous && iterations < MAX_ITERATIONS {
        iterations += 1;
        let t = threshold.clamp(0, last as i64) as usize;
        let mu = b(t) / a(t);
        let nu = (b(last) - b(t)) / (a(last) - a(t));
        let p = a(t) / a(last);
        let q = (a(last) - a(t)) / a(last);
        let sigma2 = c(t) / a(t) - mu * mu;
        let tau2 = (c(last) - c(t)) / (a(last) - a(t)) - nu * nu;
        let w0 = 1.0 / sigma2 - 1.0 / tau2;
        let w1 = mu / sigma2 - nu / tau2;
        let w2 = mu * mu / sigma2 - nu * nu / tau2 +
            ((sigma2 * q * q) / (tau2 * p * p)).log10();
        let sqterm = w1 * w1 - w0 * w2;
        if sqterm < 0.0 {
            debug!("MinError not converging at bin {}", t);
            break;
        }
        previous = threshold;
        let temp = (w1 + sqterm.sqrt()) / w0;
        if !temp.is_nan() {
            threshold = temp.floor() as i64;
        }
    }
    Some(threshold.clamp(0, last as i64) as usize)
}

// Tsai moment-preserving threshold.
fn moments(histogram: &[u64]) -> Option<usize> {
    let norm = normalized(histogram);
    let m0 = 1.0;
    let (mut m1, mut m2, mut m3) = (0.0, 0.0, 0.0);
    for (i, &h) in norm.iter().enumerate() {
        let di = i as f64;
        m1 += di * h;
        m2 += di * di * h;
        m3 += di * di * di * h;
    }
    let cd = m0 * m2 - m1 * m1;
    let c0 = (-m2 * m2 + m1 * m3) / cd;
    let c1 = (m0 * -m3 + m2 * m1) / cd;
    let z0 = 0.5 * (-c1 - (c1 * c1 - 4.0 * c0).sqrt());
    let z1 = 0.5 * (-c1 + (c1 * c1 - 4.0 * c0).sqrt());
    // Fraction of object pixels in the target binary image.
    let p0 = (z1 - m1) / (z1 - z0);
    if p0.is_nan() {
        return None;
    }
    let mut sum = 0.0;
    for (i, &h) in norm.iter().enumerate() {
        sum += h;
        if sum > p0 {
            return Some(i);
        }
    }
    None
}

// Otsu's between-class variance maximization.
fn otsu(histogram: &[u64]) -> usize {
    let len = histogram.len();
    let n: f64 = histogram.iter().map(|&c| c as f64).sum();
    let s = partial_first_moment(histogram, len - 1);
    let mut sk = 0.0;
    let mut n1 = histogram[0] as f64;
    let mut bcv_max = 0.0;
    let mut k_star = 0;
    for k in 1..len - 1 {
        sk += k as f64 * histogram[k] as f64;
        n1 += histogram[k] as f64;
        let denom = n1 * (n - n1);
        let bcv = if denom != 0.0 {
            let num = (n1 / n) * s - sk;
            num * num / denom
        } else {
            0.0
        };
        if bcv >= bcv_max {
            bcv_max = bcv;
            k_star = k;
        }
    }
    k_star
}

fn percentile(histogram: &[u64], fraction: f64) -> usize {
    let last = histogram.len() - 1;
    let total = partial_count(histogram, last);
    let mut threshold = 0;
    let mut best = 1.0;
    let mut running = 0.0;
    for (i, &c) in histogram.iter().enumerate() {
        running += c as f64;
        let distance = (running / total - fraction).abs();
        if distance < best {
            best = distance;
            threshold = i;
        }
    }
    threshold
}

// Zack's triangle method, with the histogram flipped when the long tail
// lies to the left of the peak.
fn triangle(histogram: &[u64]) -> usize {
    let len = histogram.len();
    let mut data: Vec<f64> = histogram.iter().map(|&c| c as f64).collect();
    let mut min = first_nonzero(histogram).unwrap_or(0);
    if min > 0 {
        min -= 1;
    }
    let mut min2 = (1..len).rev().find(|&i| histogram[i] > 0).unwrap_or(0);
    if min2 < len - 1 {
        min2 += 1;
    }
    let mut max = 0;
    let mut dmax = 0.0;
    for (i, &d) in data.iter().enumerate() {
        if d > dmax {
            max = i;
            dmax = d;
        }
    }
    let inverted = (max as i64 - min as i64) < (min2 as i64 - max as i64);
    if inverted {
        data.reverse();
        min = len - 1 - min2;
        max = len - 1 - max;
    }
    if min == max {
        return min;
    }
    // Line from (min, data[min]) to (max, data[max]); find the bin farthest
    // above it.
    let mut nx = data[max];
    let mut ny = min as f64 - max as f64;
    let norm = (nx * nx + ny * ny).sqrt();
    nx /= norm;
    ny /= norm;
    let d = nx * min as f64 + ny * data[min];
    let mut split = min;
    let mut split_distance = 0.0;
    for i in min + 1..=max {
        let new_distance = nx * i as f64 + ny * data[i] - d;
        if new_distance > split_distance {
            split = i;
            split_distance = new_distance;
        }
    }
    let split = split.saturating_sub(1);
    if inverted {
        len - 1 - split
    } else {
        split
    }
}

// Yen's maximum correlation criterion.
fn yen(histogram: &[u64]) -> Option<usize> {
    let len = histogram.len();
    let norm = normalized(histogram);
    let mut p1 = vec![0.0; len];
    let mut p1_sq = vec![0.0; len];
    let mut p2_sq = vec![0.0; len];
    p1[0] = norm[0];
    p1_sq[0] = norm[0] * norm[0];
    for ih in 1..len {
        p1[ih] = p1[ih - 1] + norm[ih];
        p1_sq[ih] = p1_sq[ih - 1] + norm[ih] * norm[ih];
    }
    for ih in (0..len - 1).rev() {
        p2_sq[ih] = p2_sq[ih + 1] + norm[ih + 1] * norm[ih + 1];
    }
    let mut threshold = None;
    let mut max_crit = f64::MIN;
    for it in 0..len {
        let product = p1_sq[it] * p2_sq[it];
        let spread = p1[it] * (1.0 - p1[it]);
        let crit = -(if product > 0.0 { product.ln() } else { 0.0 }) +
            2.0 * (if spread > 0.0 { spread.ln() } else { 0.0 });
        if crit > max_crit {
            max_crit = crit;
            threshold = Some(it);
        }
    }
    threshold
}
