// Copyright (c) 2025 Steven Rosenthal smr@dt3.org
// See LICENSE file in root directory for license terms.

use std::fs;
use std::path::{Path, PathBuf};
use std::process;

use clap::Parser;
use env_logger;
use log::{error, info, warn};

use astro_inout::calibration::Calibration;
use astro_inout::error::Result;
use astro_inout::io::{load_rois, load_stack, save_overlays};
use astro_inout::labeling::Connectivity;
use astro_inout::pipeline::{run_batch, AnalysisConfig, AstrocyteAnalyzer,
                            BatchSummary, ImageChannels};
use astro_inout::report::ResultsWriter;
use astro_inout::roi::Roi;
use astro_inout::threshold::{HistogramThresholder, ThresholdMethod};

/// Measures astrocyte volume inside and outside blood vessels for every
/// image under the input directory. Each image is a directory holding one
/// sub-directory of slice files per channel, plus an optional rois.json of
/// artefact polygons.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about=None)]
struct Args {
    /// Directory containing one sub-directory per image.
    #[arg(short, long)]
    input: PathBuf,

    /// Directory where results.tsv and overlays are written.
    #[arg(short, long)]
    output: PathBuf,

    /// Channel directory holding the vessel stain.
    #[arg(long, default_value = "vessels")]
    vessel_channel: String,

    /// Channel directory holding the microglia stain.
    #[arg(long, default_value = "microglia")]
    microglia_channel: String,

    /// Channel directory holding the astrocyte stain.
    #[arg(long, default_value = "astrocytes")]
    astrocyte_channel: String,

    /// Pixel size in X and Y (µm).
    #[arg(long, default_value_t = 1.0)]
    voxel_xy: f64,

    /// Slice spacing in Z (µm).
    #[arg(long, default_value_t = 1.0)]
    voxel_z: f64,

    #[arg(long, default_value = "Moments")]
    microglia_threshold: ThresholdMethod,

    /// Median filter radius for microglia (pixels).
    #[arg(long, default_value_t = 8.0)]
    microglia_median: f64,

    #[arg(long, default_value = "Triangle")]
    vessel_threshold: ThresholdMethod,

    /// Laplacian of Gaussian sigma for vessels (pixels); 0 disables.
    #[arg(long, default_value_t = 14.0)]
    vessel_log_sigma: f64,

    /// Minimum vessel volume (µm3).
    #[arg(long, default_value_t = 100.0)]
    min_vessel_volume: f64,

    /// Distance by which vessels are dilated (µm).
    #[arg(long, default_value_t = 2.0)]
    vessel_dilation: f64,

    #[arg(long, default_value = "Li")]
    astrocyte_threshold: ThresholdMethod,

    /// Median filter radius for astrocytes (pixels).
    #[arg(long, default_value_t = 2.0)]
    astrocyte_median: f64,

    /// Minimum astrocyte volume (µm3).
    #[arg(long, default_value_t = 0.2)]
    min_astrocyte_volume: f64,

    /// Voxel connectivity for object labeling: 6, 18 or 26.
    #[arg(long, default_value = "26")]
    connectivity: Connectivity,

    /// Save per-slice RGB overlays (inside red, outside green, vessels blue).
    #[arg(long, default_value_t = false)]
    overlays: std::primitive::bool,
}

impl Args {
    fn config(&self) -> AnalysisConfig {
        AnalysisConfig {
            microglia_method: self.microglia_threshold,
            microglia_median_radius: self.microglia_median,
            vessel_method: self.vessel_threshold,
            vessel_log_sigma: self.vessel_log_sigma,
            min_vessel_volume: self.min_vessel_volume,
            vessel_dilation: self.vessel_dilation,
            astrocyte_method: self.astrocyte_threshold,
            astrocyte_median_radius: self.astrocyte_median,
            min_astrocyte_volume: self.min_astrocyte_volume,
            connectivity: self.connectivity,
        }
    }
}

// Directory names of the images under `input`.
fn image_names(input: &Path) -> Result<Vec<String>> {
    let mut names = Vec::new();
    for entry in fs::read_dir(input)? {
        let path = entry?.path();
        if !path.is_dir() {
            continue;
        }
        match path.file_name().and_then(|n| n.to_str()) {
            Some(name) => names.push(name.to_string()),
            None => warn!("Skipping non UTF-8 directory {:?}", path),
        }
    }
    Ok(names)
}

fn load_image(args: &Args, calibration: &Calibration, name: &str)
              -> Result<(ImageChannels<u16>, Vec<Roi>)> {
    let image_dir = args.input.join(name);
    let channels = ImageChannels {
        vessels: load_stack(&image_dir.join(&args.vessel_channel), calibration)?,
        microglia: load_stack(&image_dir.join(&args.microglia_channel), calibration)?,
        astrocytes: load_stack(&image_dir.join(&args.astrocyte_channel), calibration)?,
    };
    let roi_path = image_dir.join("rois.json");
    let rois = if roi_path.is_file() { load_rois(&roi_path)? } else { Vec::new() };
    Ok((channels, rois))
}

fn run(args: &Args) -> Result<BatchSummary> {
    let config = args.config();
    let analyzer = AstrocyteAnalyzer::new(&config, HistogramThresholder)?;
    let calibration = Calibration::isotropic_xy(args.voxel_xy, args.voxel_z)?;
    fs::create_dir_all(&args.output)?;
    let mut report = ResultsWriter::create(&args.output.join("results.tsv"))?;
    let names = image_names(&args.input)?;
    info!("Found {} images in {:?}", names.len(), args.input);
    run_batch(names,
              |name| load_image(args, &calibration, name),
              &analyzer, &mut report,
              |name, analysis| {
                  if args.overlays {
                      save_overlays(&args.output.join(name), name, &analysis.overlays()?)?;
                  }
                  Ok(())
              })
}

fn main() {
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    match run(&args) {
        Ok(summary) => {
            for (name, kind) in &summary.failed {
                warn!("Not reported: {} ({} error)", name, kind);
            }
            if !summary.failed.is_empty() {
                process::exit(2);
            }
        },
        Err(e) => {
            error!("Batch aborted ({} error): {}", e.kind(), e);
            process::exit(1);
        },
    }
}
