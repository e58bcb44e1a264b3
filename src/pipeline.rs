// Copyright (c) 2025 Steven Rosenthal smr@dt3.org
// See LICENSE file in root directory for license terms.

//! Per-image detection stages and the sequential batch driver.
//!
//! Each image runs as a straight line: detect vessels (with microglia
//! removed), detect astrocytes, partition the astrocytes against the
//! dilated vessels, measure. Every intermediate grid is owned by the stage
//! that made it and is dropped before the next stage starts.

use std::io::Write;
use std::time::Instant;

use log::{info, warn};

use crate::calibration::Calibration;
use crate::classifier::SpatialClassifier;
use crate::error::{AnalysisError, Result};
use crate::filters::{laplacian_of_gaussian, median_filter};
use crate::labeling::{ConnectedComponentLabeler, Connectivity};
use crate::measure::{roi_volume, volume_of_population, VolumeSummary};
use crate::objects::ObjectPopulation;
use crate::painter::{clear_regions, draw, draw_population};
use crate::report::ResultsWriter;
use crate::roi::Roi;
use crate::threshold::{ThresholdMethod, Thresholder};
use crate::volume::{BinaryGrid, BoundingBox, Sample, VolumeGrid, BACKGROUND,
                    FOREGROUND};

/// Parameters fixed for a whole batch. Volumes are in cubic calibration
/// units, radii of filters in pixels, the dilation in calibration units.
#[derive(Clone, Debug, PartialEq)]
pub struct AnalysisConfig {
    pub microglia_method: ThresholdMethod,
    pub microglia_median_radius: f64,
    pub vessel_method: ThresholdMethod,
    pub vessel_log_sigma: f64,
    pub min_vessel_volume: f64,
    pub vessel_dilation: f64,
    pub astrocyte_method: ThresholdMethod,
    pub astrocyte_median_radius: f64,
    pub min_astrocyte_volume: f64,
    pub connectivity: Connectivity,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        AnalysisConfig {
            microglia_method: ThresholdMethod::Moments,
            microglia_median_radius: 8.0,
            vessel_method: ThresholdMethod::Triangle,
            vessel_log_sigma: 14.0,
            min_vessel_volume: 100.0,
            vessel_dilation: 2.0,
            astrocyte_method: ThresholdMethod::Li,
            astrocyte_median_radius: 2.0,
            min_astrocyte_volume: 0.2,
            connectivity: Connectivity::TwentySix,
        }
    }
}

impl AnalysisConfig {
    /// Every numeric parameter must be finite and non-negative.
    pub fn validate(&self) -> Result<()> {
        let params = [
            ("microglia median radius", self.microglia_median_radius),
            ("vessel LoG sigma", self.vessel_log_sigma),
            ("minimum vessel volume", self.min_vessel_volume),
            ("vessel dilation", self.vessel_dilation),
            ("astrocyte median radius", self.astrocyte_median_radius),
            ("minimum astrocyte volume", self.min_astrocyte_volume),
        ];
        for (name, value) in params {
            if !value.is_finite() || value < 0.0 {
                return Err(AnalysisError::InvalidParameter {
                    name, value, reason: "must be finite and non-negative",
                });
            }
        }
        Ok(())
    }
}

/// The three acquisition channels of one image. All must have the same
/// dimensions.
#[derive(Clone, Debug)]
pub struct ImageChannels<T> {
    pub vessels: VolumeGrid<T>,
    pub microglia: VolumeGrid<T>,
    pub astrocytes: VolumeGrid<T>,
}

/// Binary renderings of one image's results, for visual checking.
#[derive(Clone, Debug)]
pub struct Overlays {
    pub vessels: BinaryGrid,
    pub inside: BinaryGrid,
    pub outside: BinaryGrid,
}

/// Everything computed for one image.
#[derive(Clone, Debug)]
pub struct ImageAnalysis {
    pub vessels: ObjectPopulation,
    pub inside: ObjectPopulation,
    pub outside: ObjectPopulation,
    pub summary: VolumeSummary,
    pub bounds: BoundingBox,
    pub calibration: Calibration,
}

impl ImageAnalysis {
    pub fn overlays(&self) -> Result<Overlays> {
        let (width, height, depth) = self.bounds.grid_dimensions()?;
        let render = |population: &ObjectPopulation| -> Result<BinaryGrid> {
            let mut grid = VolumeGrid::filled(width, height, depth, BACKGROUND,
                                              self.calibration.clone())?;
            draw_population(population, &mut grid, FOREGROUND)?;
            Ok(grid)
        };
        Ok(Overlays { vessels: render(&self.vessels)?,
                      inside: render(&self.inside)?,
                      outside: render(&self.outside)? })
    }
}

pub struct AstrocyteAnalyzer<'a, H: Thresholder> {
    config: &'a AnalysisConfig,
    thresholder: H,
    labeler: ConnectedComponentLabeler,
}

impl<'a, H: Thresholder> AstrocyteAnalyzer<'a, H> {
    /// Fails if `config` does not validate.
    pub fn new(config: &'a AnalysisConfig, thresholder: H) -> Result<Self> {
        config.validate()?;
        Ok(AstrocyteAnalyzer { config, thresholder,
                               labeler: ConnectedComponentLabeler::new(config.connectivity) })
    }

    /// Labels the microglia, then detects vessels with the artefact regions
    /// and every microglia object erased, keeping vessels of at least the
    /// minimum vessel volume.
    pub fn find_vessels<T: Sample>(&self, vessels: &VolumeGrid<T>,
                                   microglia: &VolumeGrid<T>, rois: &[Roi])
                                   -> Result<ObjectPopulation> {
        vessels.check_same_dimensions(microglia)?;
        let microglia_objects = {
            let filtered = median_filter(microglia, self.config.microglia_median_radius);
            let mask = self.thresholder.threshold(&filtered, self.config.microglia_method)?;
            self.labeler.label(&mask)
        };
        info!("Found {} microglia objects", microglia_objects.len());

        let mut mask = {
            let enhanced = laplacian_of_gaussian(vessels, self.config.vessel_log_sigma);
            self.thresholder.threshold(&enhanced, self.config.vessel_method)?
        };
        clear_regions(&mut mask, rois, BACKGROUND)?;
        for object in &microglia_objects {
            draw(object, &mut mask, BACKGROUND)?;
        }
        let found = self.labeler.label(&mask)
            .filter_by_size(self.config.min_vessel_volume, f64::INFINITY);
        if found.is_empty() {
            warn!("No vessels found");
        }
        Ok(found)
    }

    /// Detects astrocytes outside the artefact regions, keeping objects of at
    /// least the minimum astrocyte volume.
    pub fn find_astrocytes<T: Sample>(&self, astrocytes: &VolumeGrid<T>, rois: &[Roi])
                                      -> Result<ObjectPopulation> {
        let mut mask = {
            let filtered = median_filter(astrocytes, self.config.astrocyte_median_radius);
            self.thresholder.threshold(&filtered, self.config.astrocyte_method)?
        };
        clear_regions(&mut mask, rois, BACKGROUND)?;
        let found = self.labeler.label(&mask)
            .filter_by_size(self.config.min_astrocyte_volume, f64::INFINITY);
        if found.is_empty() {
            warn!("No astrocytes found");
        }
        Ok(found)
    }

    /// Runs the whole per-image pipeline. All three channels must share
    /// dimensions and calibration.
    pub fn analyze<T: Sample>(&self, name: &str, channels: &ImageChannels<T>,
                              rois: &[Roi]) -> Result<ImageAnalysis> {
        let analyze_start = Instant::now();
        channels.astrocytes.check_same_dimensions(&channels.vessels)?;
        channels.astrocytes.check_same_dimensions(&channels.microglia)?;
        channels.astrocytes.check_same_calibration(&channels.vessels)?;
        channels.astrocytes.check_same_calibration(&channels.microglia)?;
        let calibration = channels.astrocytes.calibration().clone();
        let bounds = channels.astrocytes.bounds();

        let vessels = self.find_vessels(&channels.vessels, &channels.microglia, rois)?;
        let astrocytes = self.find_astrocytes(&channels.astrocytes, rois)?;
        let classifier = SpatialClassifier { labeler: self.labeler,
                                             dilation_radius: self.config.vessel_dilation };
        let partition = classifier.partition(&astrocytes, &vessels, &bounds, &calibration)?;

        let image_volume = channels.astrocytes.physical_volume();
        let summary = VolumeSummary {
            image_name: name.to_string(),
            image_volume,
            image_minus_roi_volume: image_volume - roi_volume(rois, &bounds, &calibration)?,
            vessel_volume: volume_of_population(&vessels),
            inside_volume: volume_of_population(&partition.inside),
            outside_volume: volume_of_population(&partition.outside),
        };
        info!("Image {}: {} vessels, {} astrocytes in, {} out in {:?}",
              name, vessels.len(), partition.inside.len(), partition.outside.len(),
              analyze_start.elapsed());
        Ok(ImageAnalysis { vessels, inside: partition.inside, outside: partition.outside,
                           summary, bounds, calibration })
    }
}

/// Outcome of a batch.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BatchSummary {
    pub processed: Vec<String>,

    /// Image name and error kind of every failed image.
    pub failed: Vec<(String, &'static str)>,
}

/// Processes `names` in sorted order, one image at a time. `load` supplies
/// the channels and ROIs of an image, `on_result` receives each finished
/// analysis (for example to save overlays). A failure in `load`, the
/// analysis or `on_result` is logged and the batch moves on; the image then
/// gets no report row. Failing to write the report aborts the batch.
pub fn run_batch<T, H, W, L, F>(mut names: Vec<String>, mut load: L,
                                analyzer: &AstrocyteAnalyzer<'_, H>,
                                report: &mut ResultsWriter<W>, mut on_result: F)
                                -> Result<BatchSummary>
where T: Sample,
      H: Thresholder,
      W: Write,
      L: FnMut(&str) -> Result<(ImageChannels<T>, Vec<Roi>)>,
      F: FnMut(&str, &ImageAnalysis) -> Result<()> {
    let batch_start = Instant::now();
    names.sort();
    let mut summary = BatchSummary::default();
    for name in names {
        info!("Processing image {}", name);
        let outcome = load(&name).and_then(|(channels, rois)| {
            let analysis = analyzer.analyze(&name, &channels, &rois)?;
            drop(channels);
            on_result(&name, &analysis)?;
            Ok(analysis)
        });
        match outcome {
            Ok(analysis) => {
                report.write_summary(&analysis.summary)?;
                summary.processed.push(name);
            },
            Err(e) => {
                warn!("Image {} failed ({} error): {}", name, e.kind(), e);
                summary.failed.push((name, e.kind()));
            },
        }
    }
    info!("Batch finished: {} processed, {} failed in {:?}",
          summary.processed.len(), summary.failed.len(), batch_start.elapsed());
    Ok(summary)
}
