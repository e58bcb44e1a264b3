// Copyright (c) 2024 Steven Rosenthal smr@dt3.org
// See LICENSE file in root directory for license terms.

use std::time::Instant;

use log::debug;

use crate::volume::{Sample, VolumeGrid};

/// Number of bins used for whole-stack histograms.
pub const NUM_BINS: usize = 256;

#[derive(Debug)]
pub struct HistogramStats {
    pub mean: f64,
    pub median: usize,
    pub stddev: f64,
}

pub fn stats_for_histogram(histogram: &[u64]) -> HistogramStats {
    let mut count = 0;
    let mut first_moment = 0;
    for h in 0..histogram.len() {
        let bin_count = histogram[h];
        count += bin_count;
        first_moment += bin_count * h as u64;
    }
    if count == 0 {
        return HistogramStats{mean: 0.0, median: 0, stddev: 0.0};
    }
    let mean = first_moment as f64 / count as f64;
    let mut second_moment: f64 = 0.0;
    let mut sub_count = 0;
    let mut median = 0;
    for h in 0..histogram.len() {
        let bin_count = histogram[h];
        second_moment += bin_count as f64 * (h as f64 - mean) * (h as f64 - mean);
        if sub_count < count / 2 {
            sub_count += bin_count;
            if sub_count >= count / 2 {
                median = h;
            }
        }
    }
    let stddev = (second_moment / count as f64).sqrt();
    HistogramStats{mean, median, stddev}
}

/// Histogram of an entire stack, with [NUM_BINS] equal-width bins spanning
/// the stack's minimum to maximum sample value.
#[derive(Clone, Debug)]
pub struct StackHistogram {
    pub counts: Vec<u64>,
    pub min: f64,
    pub max: f64,
}

impl StackHistogram {
    pub fn from_grid<T: Sample>(grid: &VolumeGrid<T>) -> StackHistogram {
        let histogram_start = Instant::now();
        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;
        for &v in grid.as_slice() {
            let v = v.to_f64();
            if v.is_nan() {
                continue;
            }
            min = min.min(v);
            max = max.max(v);
        }
        if min > max {
            // Every sample was NaN.
            min = 0.0;
            max = 0.0;
        }
        let mut histogram = StackHistogram{counts: vec![0; NUM_BINS], min, max};
        for &v in grid.as_slice() {
            let v = v.to_f64();
            if v.is_nan() {
                continue;
            }
            let bin = histogram.bin_of(v);
            histogram.counts[bin] += 1;
        }
        debug!("Stack histogram over [{}, {}] built in {:?}",
               min, max, histogram_start.elapsed());
        histogram
    }

    /// True when every sample has the same value, so no split exists.
    pub fn is_degenerate(&self) -> bool {
        !(self.max > self.min)
    }

    /// Bin index of sample value `v`.
    pub fn bin_of(&self, v: f64) -> usize {
        if self.is_degenerate() || v <= self.min {
            return 0;
        }
        let scaled = (v - self.min) / (self.max - self.min) * NUM_BINS as f64;
        (scaled as usize).min(NUM_BINS - 1)
    }

    /// Sample value at the upper edge of `bin`.
    pub fn upper_edge(&self, bin: usize) -> f64 {
        self.min + (bin + 1) as f64 * (self.max - self.min) / NUM_BINS as f64
    }
}

/// Sum of counts in bins `0..=j`.
pub fn partial_count(histogram: &[u64], j: usize) -> f64 {
    histogram[..=j].iter().map(|&c| c as f64).sum()
}

/// First moment of bins `0..=j`.
pub fn partial_first_moment(histogram: &[u64], j: usize) -> f64 {
    histogram[..=j].iter().enumerate()
        .map(|(h, &c)| h as f64 * c as f64).sum()
}

/// Second moment of bins `0..=j`.
pub fn partial_second_moment(histogram: &[u64], j: usize) -> f64 {
    histogram[..=j].iter().enumerate()
        .map(|(h, &c)| (h * h) as f64 * c as f64).sum()
}

/// Histogram normalized to unit total. All zeros if the histogram is empty.
pub fn normalized(histogram: &[u64]) -> Vec<f64> {
    let total: u64 = histogram.iter().sum();
    if total == 0 {
        return vec![0.0; histogram.len()];
    }
    histogram.iter().map(|&c| c as f64 / total as f64).collect()
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;
    use crate::calibration::Calibration;
    use super::*;

    #[test]
    fn test_stats_for_histogram() {
        let mut histogram = [0_u64; 1024];
        histogram[10] = 2;
        histogram[20] = 2;
        let stats = stats_for_histogram(&histogram);
        assert_eq!(stats.mean, 15.0);
        assert_eq!(stats.median, 10);
        assert_eq!(stats.stddev, 5.0);
    }

    #[test]
    fn test_stack_histogram_spans_min_max() {
        let grid = VolumeGrid::from_vec(4, 1, 1, vec![100_u16, 100, 612, 356],
                                       Calibration::unit_microns()).unwrap();
        let histogram = StackHistogram::from_grid(&grid);
        assert_eq!(histogram.min, 100.0);
        assert_eq!(histogram.max, 612.0);
        assert_eq!(histogram.counts.iter().sum::<u64>(), 4);
        assert_eq!(histogram.counts[0], 2);
        assert_eq!(histogram.counts[128], 1);
        assert_eq!(histogram.counts[255], 1);
        assert_abs_diff_eq!(histogram.upper_edge(0), 102.0, epsilon = 1e-9);
    }

    #[test]
    fn test_degenerate_histogram() {
        let grid = VolumeGrid::filled(2, 2, 2, 7.0_f32,
                                      Calibration::unit_microns()).unwrap();
        let histogram = StackHistogram::from_grid(&grid);
        assert!(histogram.is_degenerate());
        assert_eq!(histogram.counts[0], 8);
    }

    #[test]
    fn test_partial_sums() {
        let histogram = [1_u64, 2, 3];
        assert_eq!(partial_count(&histogram, 1), 3.0);
        assert_eq!(partial_first_moment(&histogram, 2), 8.0);
        assert_eq!(partial_second_moment(&histogram, 2), 14.0);
        assert_eq!(normalized(&histogram)[2], 0.5);
        assert_eq!(normalized(&[0_u64, 0]), vec![0.0, 0.0]);
    }
}  // mod tests.
