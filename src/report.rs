// Copyright (c) 2025 Steven Rosenthal smr@dt3.org
// See LICENSE file in root directory for license terms.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::error::{AnalysisError, Result};
use crate::measure::VolumeSummary;

pub const REPORT_HEADER: [&str; 6] = [
    "Image name",
    "Image vol (µm3)",
    "Image-ROI vol (µm3)",
    "Vessels vol (µm3)",
    "Astrocytes vol in vessels (µm3)",
    "Astrocytes vol out vessels (µm3)",
];

/// Tab-separated results table, one row per image. The header is written on
/// creation and every row is flushed as soon as it is written.
pub struct ResultsWriter<W: Write> {
    writer: csv::Writer<W>,
    rows: usize,
}

impl ResultsWriter<BufWriter<File>> {
    pub fn create(path: &Path) -> Result<Self> {
        let file = File::create(path)?;
        ResultsWriter::new(BufWriter::new(file))
    }
}

impl<W: Write> ResultsWriter<W> {
    pub fn new(inner: W) -> Result<Self> {
        let mut writer = csv::WriterBuilder::new()
            .delimiter(b'\t')
            .from_writer(inner);
        writer.write_record(REPORT_HEADER)?;
        writer.flush()?;
        Ok(ResultsWriter { writer, rows: 0 })
    }

    pub fn write_summary(&mut self, summary: &VolumeSummary) -> Result<()> {
        self.writer.write_record([
            summary.image_name.clone(),
            summary.image_volume.to_string(),
            summary.image_minus_roi_volume.to_string(),
            summary.vessel_volume.to_string(),
            summary.inside_volume.to_string(),
            summary.outside_volume.to_string(),
        ])?;
        self.writer.flush()?;
        self.rows += 1;
        Ok(())
    }

    /// Rows written so far, excluding the header.
    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn into_inner(self) -> Result<W> {
        self.writer.into_inner().map_err(|e| AnalysisError::Io(e.into_error()))
    }
}
