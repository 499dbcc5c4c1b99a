//! Corpus archive (Arrow/Parquet)
//!
//! Write-once: a run archives its whole corpus in a single file, and a later
//! `report` invocation loads it back to regenerate the spreadsheet and charts
//! without re-segmenting any image.
//!
//! Toyota Way: Poka-Yoke (loaded batches are re-validated as a corpus)

use crate::corpus::CorpusTable;
use crate::{Error, Result};
use arrow::compute::concat_batches;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ArrowWriter;
use parquet::file::properties::WriterProperties;
use std::fs::File;
use std::path::Path;

/// File name of the archived corpus inside the output directory
pub const ARCHIVE_FILE_NAME: &str = "collembolan_measurements.parquet";

/// Rows per Parquet row group
const ROW_GROUP_SIZE: usize = 64 * 1024;

/// Parquet persistence for [`CorpusTable`]
pub struct CorpusArchive;

impl CorpusArchive {
    /// Write the corpus to a Parquet file, replacing any existing file
    ///
    /// # Errors
    /// Returns `Error::Storage` if the file cannot be created or encoded
    pub fn write_parquet<P: AsRef<Path>>(path: P, corpus: &CorpusTable) -> Result<()> {
        let path = path.as_ref();
        let file = File::create(path).map_err(|e| {
            Error::Storage(format!("Failed to create Parquet file {}: {e}", path.display()))
        })?;

        let props = WriterProperties::builder()
            .set_max_row_group_size(ROW_GROUP_SIZE)
            .build();
        let batch = corpus.batch();
        let mut writer = ArrowWriter::try_new(file, batch.schema(), Some(props))
            .map_err(|e| Error::Storage(format!("Failed to create Parquet writer: {e}")))?;

        writer
            .write(batch)
            .map_err(|e| Error::Storage(format!("Failed to write record batch: {e}")))?;
        writer
            .close()
            .map_err(|e| Error::Storage(format!("Failed to finalize Parquet file: {e}")))?;

        tracing::info!(path = %path.display(), rows = batch.num_rows(), "archived corpus");
        Ok(())
    }

    /// Load a corpus previously written by [`write_parquet`](Self::write_parquet)
    ///
    /// # Errors
    /// Returns `Error::Storage` if the file cannot be read, or a corpus
    /// validation error if its columns do not form a corpus
    pub fn load_parquet<P: AsRef<Path>>(path: P) -> Result<CorpusTable> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| {
            Error::Storage(format!("Failed to open Parquet file {}: {e}", path.display()))
        })?;

        let builder = ParquetRecordBatchReaderBuilder::try_new(file)
            .map_err(|e| Error::Storage(format!("Failed to parse Parquet file: {e}")))?;
        let schema = builder.schema().clone();
        let reader = builder
            .build()
            .map_err(|e| Error::Storage(format!("Failed to create Parquet reader: {e}")))?;

        let mut batches = Vec::new();
        for batch in reader {
            let batch =
                batch.map_err(|e| Error::Storage(format!("Failed to read record batch: {e}")))?;
            batches.push(batch);
        }

        let merged = concat_batches(&schema, &batches)
            .map_err(|e| Error::Storage(format!("Failed to combine record batches: {e}")))?;
        CorpusTable::from_batch(merged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::measurement::{ImageMeasurementTable, ParticleMeasurement};
    use tempfile::TempDir;

    #[allow(clippy::cast_precision_loss)]
    fn create_test_corpus(rows: u32, labelled: bool) -> CorpusTable {
        let particles = (1..=rows)
            .map(|id| ParticleMeasurement {
                animal_id: id,
                feret_diameter: 0.01 * f64::from(id),
                area: 0.001 * f64::from(id),
                standardized_feret_diameter: f64::from(id) - f64::from(rows) / 2.0,
                circularity: 0.5,
                roundness: 0.4,
                cluster_label: labelled.then_some(u8::from(id > rows / 2)),
            })
            .collect();
        let table = ImageMeasurementTable::new("sample1.png", particles).unwrap();
        CorpusTable::aggregate(&[table], &[1]).unwrap()
    }

    #[test]
    fn test_parquet_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(ARCHIVE_FILE_NAME);
        let corpus = create_test_corpus(50, true);

        CorpusArchive::write_parquet(&path, &corpus).unwrap();
        let loaded = CorpusArchive::load_parquet(&path).unwrap();

        assert_eq!(loaded.num_rows(), 50);
        assert!(loaded.has_labels());
        assert_eq!(loaded.keys().unwrap(), corpus.keys().unwrap());
        assert_eq!(loaded.feret_um().unwrap(), corpus.feret_um().unwrap());
    }

    #[test]
    fn test_parquet_round_trip_without_labels() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("plain.parquet");
        let corpus = create_test_corpus(3, false);

        CorpusArchive::write_parquet(&path, &corpus).unwrap();
        let loaded = CorpusArchive::load_parquet(&path).unwrap();
        assert!(!loaded.has_labels());
        assert_eq!(loaded.num_rows(), 3);
    }

    #[test]
    fn test_load_missing_file() {
        let result = CorpusArchive::load_parquet("/nonexistent/corpus.parquet");
        assert!(matches!(result, Err(Error::Storage(_))));
    }

    #[test]
    fn test_load_not_parquet() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("junk.parquet");
        std::fs::write(&path, b"definitely not parquet").unwrap();
        let result = CorpusArchive::load_parquet(&path);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("Storage error"));
    }
}
