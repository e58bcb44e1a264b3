// Copyright (c) 2025 Steven Rosenthal smr@dt3.org
// See LICENSE file in root directory for license terms.

//! Classifies astrocytes in 3D microscopy stacks as lying inside or outside
//! the vascular network.
//!
//! Each channel is thresholded globally ([threshold]), split into connected
//! objects ([labeling]) and filtered by physical size ([objects]). Vessels
//! have microglia and artefact regions removed first. The
//! [classifier::SpatialClassifier] then grows every vessel by a physical
//! distance ([dilate]), honoring anisotropic voxel sizes, and partitions the
//! astrocyte voxels exactly: each one is counted either inside or outside,
//! never both and never dropped. [measure] turns the populations into
//! volumes, and [pipeline::run_batch] drives a whole directory of images,
//! writing a tab-separated [report].
//!
//! ```no_run
//! use astro_inout::pipeline::{AnalysisConfig, AstrocyteAnalyzer};
//! use astro_inout::threshold::HistogramThresholder;
//! # fn channels() -> astro_inout::pipeline::ImageChannels<u16> { unimplemented!() }
//!
//! let config = AnalysisConfig::default();
//! let analyzer = AstrocyteAnalyzer::new(&config, HistogramThresholder)?;
//! let analysis = analyzer.analyze("stack", &channels(), &[])?;
//! println!("{} µm3 inside, {} µm3 outside",
//!          analysis.summary.inside_volume, analysis.summary.outside_volume);
//! # Ok::<(), astro_inout::error::AnalysisError>(())
//! ```

pub mod calibration;
pub mod classifier;
pub mod dilate;
pub mod error;
pub mod filters;
pub mod histogram_funcs;
pub mod io;
pub mod labeling;
pub mod measure;
pub mod objects;
pub mod painter;
pub mod pipeline;
pub mod report;
pub mod roi;
pub mod threshold;
pub mod volume;

pub use calibration::Calibration;
pub use classifier::{partition_in_out, Partition, SpatialClassifier};
pub use error::{AnalysisError, Result};
pub use objects::{ObjectPopulation, VoxelObject};
pub use volume::{BinaryGrid, BoundingBox, VolumeGrid, Voxel};
