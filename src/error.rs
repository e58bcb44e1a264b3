// Copyright (c) 2025 Steven Rosenthal smr@dt3.org
// See LICENSE file in root directory for license terms.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by the analysis pipeline and its I/O collaborators.
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("Unknown threshold method '{0}'")]
    UnknownThresholdMethod(String),

    #[error("Invalid calibration {width}x{height}x{depth}: voxel sizes must be finite and positive")]
    InvalidCalibration { width: f64, height: f64, depth: f64 },

    #[error("Grid dimensions {0}x{1}x{2} must all be non-zero")]
    EmptyGrid(usize, usize, usize),

    #[error("Grid dimensions {0}x{1}x{2} exceed the addressable voxel range")]
    GridTooLarge(usize, usize, usize),

    #[error("Grid data has {actual} samples, expected {expected}")]
    DataLength { expected: usize, actual: usize },

    #[error("Dimension mismatch: {left:?} vs {right:?}")]
    DimensionMismatch {
        left: (usize, usize, usize),
        right: (usize, usize, usize),
    },

    #[error("Calibration mismatch: {left:?} vs {right:?}")]
    CalibrationMismatch {
        left: (f64, f64, f64),
        right: (f64, f64, f64),
    },

    #[error("Object {label} has voxel ({x}, {y}, {z}) outside grid {dims:?}")]
    VoxelOutOfBounds {
        label: u32,
        x: i32,
        y: i32,
        z: i32,
        dims: (usize, usize, usize),
    },

    #[error("Invalid ROI '{name}': {reason}")]
    InvalidRoi { name: String, reason: String },

    #[error("Invalid parameter {name} = {value}: {reason}")]
    InvalidParameter {
        name: &'static str,
        value: f64,
        reason: &'static str,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to decode {path}: {source}")]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("Slice {path} is {actual:?}, expected {expected:?}")]
    SliceMismatch {
        path: PathBuf,
        expected: (u32, u32),
        actual: (u32, u32),
    },

    #[error("No slices found in {0}")]
    NoSlices(PathBuf),

    #[error("Failed to parse ROIs from {path}: {source}")]
    RoiParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Report error: {0}")]
    Report(#[from] csv::Error),
}

impl AnalysisError {
    /// Short category name, used when logging a failed image.
    pub fn kind(&self) -> &'static str {
        match self {
            AnalysisError::UnknownThresholdMethod(_)
            | AnalysisError::InvalidCalibration { .. }
            | AnalysisError::EmptyGrid(..)
            | AnalysisError::GridTooLarge(..)
            | AnalysisError::DataLength { .. }
            | AnalysisError::DimensionMismatch { .. }
            | AnalysisError::CalibrationMismatch { .. }
            | AnalysisError::VoxelOutOfBounds { .. }
            | AnalysisError::InvalidRoi { .. }
            | AnalysisError::InvalidParameter { .. } => "configuration",
            AnalysisError::Io(_) => "io",
            AnalysisError::Image { .. }
            | AnalysisError::SliceMismatch { .. }
            | AnalysisError::NoSlices(_) => "image",
            AnalysisError::RoiParse { .. } => "roi",
            AnalysisError::Report(_) => "report",
        }
    }

    pub fn is_configuration(&self) -> bool {
        self.kind() == "configuration"
    }
}

pub type Result<T> = std::result::Result<T, AnalysisError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind() {
        let err = AnalysisError::UnknownThresholdMethod("Bogus".to_string());
        assert_eq!(err.kind(), "configuration");
        assert!(err.is_configuration());
        assert_eq!(err.to_string(), "Unknown threshold method 'Bogus'");

        let err = AnalysisError::NoSlices(PathBuf::from("/tmp/none"));
        assert_eq!(err.kind(), "image");
        assert!(!err.is_configuration());
    }
}
