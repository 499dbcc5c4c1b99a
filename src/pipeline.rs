//! Batch runner
//!
//! Drives the whole analysis: measure every configured image in order,
//! persist and reload each per-image table, merge the corpus, summarize,
//! emit the report and record what happened in `run_report.json`.
//!
//! A failing image is logged, listed in the run report and skipped; only the
//! corpus-level steps are fatal.
//!
//! ```text
//! for image in sample_images:
//!     extract ─> <stem>.csv ─> reload ─> (delete)
//! aggregate ─> summarize ─> emit ─> (archive) ─> run_report.json
//! ```

use crate::config::{validate_size_threshold, AnalysisConfig};
use crate::corpus::CorpusTable;
use crate::engine::{ImageprocEngine, SegmentationEngine};
use crate::measurement::{ImageMeasurementTable, MeasurementExtractor};
use crate::report::{ReportArtifacts, ReportEmitter};
use crate::run_report::{RunReport, RUN_REPORT_FILE_NAME};
use crate::stats::{summarize, SummaryStatistics};
use crate::storage::{CorpusArchive, ARCHIVE_FILE_NAME};
use crate::{Error, Result};
use std::path::{Path, PathBuf};

/// Everything a successful run produced
#[derive(Debug, Clone)]
pub struct RunOutcome {
    /// Merged measurements
    pub corpus: CorpusTable,
    /// Statistics over the µm size column
    pub summary: SummaryStatistics,
    /// Workbook and chart paths
    pub artifacts: ReportArtifacts,
    /// Parquet archive path, when archiving is on
    pub archive: Option<PathBuf>,
    /// Processed and skipped images
    pub report: RunReport,
}

/// Report regenerated from an archived corpus
#[derive(Debug, Clone)]
pub struct ArchiveReport {
    /// Corpus loaded from the archive
    pub corpus: CorpusTable,
    /// Statistics over the µm size column
    pub summary: SummaryStatistics,
    /// Workbook and chart paths
    pub artifacts: ReportArtifacts,
}

/// Sequential batch driver over one segmentation engine
pub struct BatchRunner<E: SegmentationEngine> {
    engine: E,
}

impl BatchRunner<ImageprocEngine> {
    /// Runner using the built-in engine configured from `config.segmentation`
    #[must_use]
    pub fn from_config(config: &AnalysisConfig) -> Self {
        Self::new(ImageprocEngine::new(config.segmentation))
    }

    /// Regenerate the workbook and charts from a Parquet archive
    ///
    /// # Errors
    /// - `Error::Config` if `threshold_um` is negative or not finite
    /// - `Error::Storage` if the archive cannot be read
    /// - any summary/report error
    pub fn report_from_archive(
        archive: &Path,
        output_dir: &Path,
        threshold_um: f64,
        render_charts: bool,
    ) -> Result<ArchiveReport> {
        validate_size_threshold(threshold_um)?;
        let corpus = CorpusArchive::load_parquet(archive)?;
        tracing::info!(path = %archive.display(), rows = corpus.num_rows(), "loaded archived corpus");

        let summary = summarize(&corpus.feret_um()?, threshold_um)?;
        let artifacts = ReportEmitter::new(render_charts).emit(&corpus, &summary, output_dir)?;
        Ok(ArchiveReport {
            corpus,
            summary,
            artifacts,
        })
    }
}

impl<E: SegmentationEngine> BatchRunner<E> {
    /// Runner over an explicit engine
    pub fn new(engine: E) -> Self {
        Self { engine }
    }

    /// Process every configured image and write the reports
    ///
    /// # Errors
    /// - `Error::Config` if the configuration is invalid
    /// - `Error::EmptyInput` if no image could be measured (the run report is still written)
    /// - any aggregation, summary, report or archive error
    pub fn run(&mut self, config: &AnalysisConfig) -> Result<RunOutcome> {
        config.validate()?;
        std::fs::create_dir_all(&config.output_dir)?;

        let mut report = RunReport::start();
        tracing::info!(
            run_id = report.run_id(),
            images = config.sample_images.len(),
            "starting batch"
        );

        let mut extractor = MeasurementExtractor::new(&mut self.engine, &config.analyzed_dir);
        let mut tables = Vec::with_capacity(config.sample_images.len());
        let mut indices = Vec::with_capacity(config.sample_images.len());

        for (position, image) in config.sample_images.iter().enumerate() {
            let sample_index = u32::try_from(position + 1)
                .map_err(|_| Error::Config("too many sample images".to_string()))?;

            match process_image(&mut extractor, config, image) {
                Ok(table) => {
                    report.record_processed(image.as_str(), sample_index, table.len());
                    tables.push(table);
                    indices.push(sample_index);
                }
                Err(e) => {
                    tracing::warn!(image = %image, sample_index, error = %e, "skipping image");
                    report.record_failure(image.as_str(), sample_index, &e);
                }
            }
        }

        let report_path = config.output_dir.join(RUN_REPORT_FILE_NAME);
        if tables.is_empty() {
            report.finish();
            report.write_json(&report_path)?;
            return Err(Error::EmptyInput(format!(
                "none of the {} sample images could be measured",
                config.sample_images.len()
            )));
        }

        let corpus = CorpusTable::aggregate(&tables, &indices)?;
        let summary = summarize(&corpus.feret_um()?, config.size_threshold_um)?;
        tracing::info!(
            particles = summary.count,
            mean_um = summary.mean,
            under_threshold_pct = summary.percent_under_threshold,
            "summarized corpus"
        );

        let artifacts =
            ReportEmitter::new(config.render_charts).emit(&corpus, &summary, &config.output_dir)?;

        let archive = if config.archive_parquet {
            let path = config.output_dir.join(ARCHIVE_FILE_NAME);
            CorpusArchive::write_parquet(&path, &corpus)?;
            Some(path)
        } else {
            None
        };

        report.finish();
        report.write_json(&report_path)?;
        tracing::info!(
            status = ?report.status(),
            processed = report.processed().len(),
            failed = report.failed().len(),
            "batch finished"
        );

        Ok(RunOutcome {
            corpus,
            summary,
            artifacts,
            archive,
            report,
        })
    }
}

/// Measure one image and pass its table through the per-image CSV
fn process_image<E: SegmentationEngine>(
    extractor: &mut MeasurementExtractor<E>,
    config: &AnalysisConfig,
    image: &str,
) -> Result<ImageMeasurementTable> {
    let table = extractor.extract(
        &config.image_path(image),
        config.calibration,
        config.distinguish_juveniles,
    )?;

    let stem = Path::new(image)
        .file_stem()
        .map_or_else(|| image.to_string(), |s| s.to_string_lossy().into_owned());
    let csv_path = config.output_dir.join(format!("{stem}.csv"));

    table.write_csv(&csv_path)?;
    let reloaded = ImageMeasurementTable::read_csv(table.image(), &csv_path)?;
    if !config.retain_image_tables {
        std::fs::remove_file(&csv_path)?;
    }
    Ok(reloaded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{columns, AnalysisRequest, ResultsTable};
    use crate::run_report::RunStatus;
    use tempfile::TempDir;

    /// Engine measuring a fixed table for every image
    struct FixedEngine {
        feret: Vec<f64>,
    }

    impl SegmentationEngine for FixedEngine {
        fn analyze(&mut self, _request: &AnalysisRequest<'_>) -> Result<ResultsTable> {
            let mut t = ResultsTable::new();
            t.set_column(columns::AREA, self.feret.iter().map(|f| f * f).collect());
            t.set_column(columns::CIRCULARITY, vec![0.7; self.feret.len()]);
            t.set_column(columns::FERET, self.feret.clone());
            t.set_column(
                columns::ROUNDNESS,
                self.feret.iter().map(|f| 1.0 - f).collect(),
            );
            Ok(t)
        }

        fn reset(&mut self) {}
    }

    fn config(dir: &TempDir, images: &[&str]) -> AnalysisConfig {
        let input = dir.path().join("img");
        std::fs::create_dir_all(&input).unwrap();
        for image in images {
            if !image.starts_with("missing") {
                std::fs::write(input.join(image), b"fixture").unwrap();
            }
        }
        AnalysisConfig {
            input_dir: input,
            output_dir: dir.path().join("results"),
            analyzed_dir: dir.path().join("img/analyzed"),
            sample_images: images.iter().map(ToString::to_string).collect(),
            render_charts: false,
            ..AnalysisConfig::default()
        }
    }

    #[test]
    fn test_run_merges_all_images() {
        let dir = TempDir::new().unwrap();
        let config = config(&dir, &["a.png", "b.png"]);
        let mut runner = BatchRunner::new(FixedEngine {
            feret: vec![0.02, 0.07, 0.05],
        });

        let outcome = runner.run(&config).unwrap();

        assert_eq!(outcome.corpus.num_rows(), 6);
        assert_eq!(outcome.report.status(), RunStatus::Success);
        assert_eq!(outcome.summary.count, 6);
        assert!(config.output_dir.join(RUN_REPORT_FILE_NAME).exists());
        // Per-image tables are transient by default
        assert!(!config.output_dir.join("a.csv").exists());
        assert!(outcome.archive.is_none());
    }

    #[test]
    fn test_run_skips_missing_image() {
        let dir = TempDir::new().unwrap();
        let config = config(&dir, &["a.png", "missing.png", "c.png"]);
        let mut runner = BatchRunner::new(FixedEngine {
            feret: vec![0.01, 0.03],
        });

        let outcome = runner.run(&config).unwrap();

        assert_eq!(outcome.report.status(), RunStatus::PartialFailure);
        assert_eq!(outcome.report.failed().len(), 1);
        assert_eq!(outcome.report.failed()[0].sample_index, 2);
        let samples: std::collections::HashSet<u32> =
            outcome.corpus.keys().unwrap().into_iter().map(|(s, _)| s).collect();
        assert_eq!(samples, [1, 3].into_iter().collect());
    }

    #[test]
    fn test_run_all_failed_still_writes_report() {
        let dir = TempDir::new().unwrap();
        let config = config(&dir, &["missing1.png", "missing2.png"]);
        let mut runner = BatchRunner::new(FixedEngine { feret: vec![0.01] });

        let result = runner.run(&config);
        assert!(matches!(result, Err(Error::EmptyInput(_))));

        let report = RunReport::read_json(config.output_dir.join(RUN_REPORT_FILE_NAME)).unwrap();
        assert_eq!(report.status(), RunStatus::Failed);
        assert_eq!(report.failed().len(), 2);
    }

    #[test]
    fn test_run_retains_tables_and_archives() {
        let dir = TempDir::new().unwrap();
        let mut config = config(&dir, &["sample1.png"]);
        config.retain_image_tables = true;
        config.archive_parquet = true;
        let mut runner = BatchRunner::new(FixedEngine {
            feret: vec![0.01, 0.02, 0.09, 0.1],
        });

        let outcome = runner.run(&config).unwrap();

        assert!(config.output_dir.join("sample1.csv").exists());
        let archive = outcome.archive.unwrap();
        let loaded = CorpusArchive::load_parquet(&archive).unwrap();
        assert_eq!(loaded.keys().unwrap(), outcome.corpus.keys().unwrap());
    }

    #[test]
    fn test_invalid_config_rejected() {
        let dir = TempDir::new().unwrap();
        let mut config = config(&dir, &["a.png"]);
        config.sample_images.clear();
        let mut runner = BatchRunner::new(FixedEngine { feret: vec![0.01] });
        assert!(matches!(runner.run(&config), Err(Error::Config(_))));
    }

    #[test]
    fn test_report_from_archive_rejects_bad_threshold() {
        let dir = TempDir::new().unwrap();
        let mut config = config(&dir, &["sample1.png"]);
        config.archive_parquet = true;
        let mut runner = BatchRunner::new(FixedEngine {
            feret: vec![0.01, 0.09],
        });
        let archive = runner.run(&config).unwrap().archive.unwrap();
        let out = dir.path().join("regenerated");

        for threshold in [f64::NAN, -5.0] {
            let result = BatchRunner::report_from_archive(&archive, &out, threshold, false);
            assert!(matches!(result, Err(Error::Config(_))));
        }
        assert!(!out.exists());
        assert!(BatchRunner::report_from_archive(&archive, &out, 60.0, false).is_ok());
    }
}
