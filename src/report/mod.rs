//! Report emission
//!
//! Writes the workbook and the size distribution charts for a finished
//! corpus. Every artifact is rewritten from scratch on each call.
//!
//! Toyota Way: Genchi Genbutsu (the charts plot the same µm column the summary is built from)

pub mod charts;
pub mod spreadsheet;

use crate::corpus::CorpusTable;
use crate::stats::SummaryStatistics;
use crate::Result;
use serde::Serialize;
use std::path::{Path, PathBuf};

/// Workbook file name
pub const WORKBOOK_FILE_NAME: &str = "collembolan_size_analysis.xlsx";
/// Histogram file name
pub const HISTOGRAM_FILE_NAME: &str = "size_distribution_histogram.png";
/// Boxplot file name
pub const BOXPLOT_FILE_NAME: &str = "size_distribution_boxplot.png";

/// Paths of the files written by [`ReportEmitter::emit`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportArtifacts {
    /// Excel workbook
    pub workbook: PathBuf,
    /// Histogram PNG, when charts are rendered
    pub histogram: Option<PathBuf>,
    /// Boxplot PNG, when charts are rendered
    pub boxplot: Option<PathBuf>,
}

/// Writes the workbook and, optionally, the charts
#[derive(Debug, Clone, Copy)]
pub struct ReportEmitter {
    render_charts: bool,
}

impl Default for ReportEmitter {
    fn default() -> Self {
        Self {
            render_charts: true,
        }
    }
}

impl ReportEmitter {
    /// Create an emitter
    #[must_use]
    pub fn new(render_charts: bool) -> Self {
        Self { render_charts }
    }

    /// Write all report artifacts into `output_dir`
    ///
    /// # Errors
    /// - `Error::Io` if `output_dir` cannot be created
    /// - `Error::Spreadsheet` if the workbook cannot be written
    /// - `Error::Chart` if a chart cannot be rendered
    pub fn emit(
        &self,
        corpus: &CorpusTable,
        summary: &SummaryStatistics,
        output_dir: &Path,
    ) -> Result<ReportArtifacts> {
        std::fs::create_dir_all(output_dir)?;

        let workbook = output_dir.join(WORKBOOK_FILE_NAME);
        spreadsheet::write_workbook(&workbook, corpus, summary)?;
        tracing::info!(path = %workbook.display(), "wrote workbook");

        let (histogram, boxplot) = if self.render_charts {
            let sizes = corpus.feret_um()?;
            let histogram = output_dir.join(HISTOGRAM_FILE_NAME);
            charts::render_histogram(&histogram, &sizes, summary.threshold)?;
            let boxplot = output_dir.join(BOXPLOT_FILE_NAME);
            charts::render_boxplot(&boxplot, &sizes)?;
            tracing::info!(
                histogram = %histogram.display(),
                boxplot = %boxplot.display(),
                "rendered charts"
            );
            (Some(histogram), Some(boxplot))
        } else {
            (None, None)
        };

        Ok(ReportArtifacts {
            workbook,
            histogram,
            boxplot,
        })
    }
}
