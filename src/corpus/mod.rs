//! Corpus aggregation
//!
//! Every image's measurements are tagged with their 1-based sample image
//! index, converted to micrometers and merged into one Arrow `RecordBatch`,
//! sorted ascending by raw Feret diameter.
//!
//! Toyota Way: Jidoka (duplicate keys stop the line instead of silently merging)

mod sort;

use crate::measurement::{headers, ImageMeasurementTable};
use crate::{Error, Result};
use arrow::array::{Array, ArrayRef, Float64Array, Int32Array, UInt32Array};
use arrow::compute::concat_batches;
use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use arrow::record_batch::RecordBatch;
use std::collections::HashSet;
use std::sync::Arc;

/// Convert a Feret diameter in mm to µm, rounded to 3 decimals
///
/// # Example
///
/// ```rust
/// use collembola_size::corpus::mm_to_um;
///
/// assert_eq!(mm_to_um(0.045), 45.0);
/// ```
#[must_use]
pub fn mm_to_um(mm: f64) -> f64 {
    (mm * 1_000_000.0).round() / 1000.0
}

/// Corpus schema, with or without the cluster label column
#[must_use]
pub fn corpus_schema(with_labels: bool) -> SchemaRef {
    let mut fields = vec![
        Field::new(headers::ANIMAL_ID, DataType::UInt32, false),
        Field::new(headers::FERET, DataType::Float64, false),
        Field::new(headers::AREA, DataType::Float64, false),
        Field::new(headers::STANDARDIZED_FERET, DataType::Float64, false),
        Field::new(headers::CIRCULARITY, DataType::Float64, false),
        Field::new(headers::ROUNDNESS, DataType::Float64, false),
        Field::new(headers::SAMPLE_IMAGE_INDEX, DataType::UInt32, false),
        Field::new(headers::FERET_UM, DataType::Float64, false),
    ];
    if with_labels {
        fields.push(Field::new(headers::CLUSTER_LABEL, DataType::Int32, true));
    }
    Arc::new(Schema::new(fields))
}

/// All particles of a run, one row per particle
///
/// Invariants: rows sorted by (Feret, sample index, animal id) and the
/// (sample index, animal id) pair is unique.
#[derive(Debug, Clone, PartialEq)]
pub struct CorpusTable {
    batch: RecordBatch,
}

impl CorpusTable {
    /// Merge per-image tables into a corpus
    ///
    /// `image_indices[i]` is the sample image index of `tables[i]`.
    ///
    /// # Errors
    /// - `Error::InvalidInput` if the slices differ in length
    /// - `Error::EmptyInput` if there are no tables
    /// - `Error::DuplicateKey` if a (sample index, animal id) pair repeats
    pub fn aggregate(tables: &[ImageMeasurementTable], image_indices: &[u32]) -> Result<Self> {
        if tables.len() != image_indices.len() {
            return Err(Error::InvalidInput(format!(
                "{} tables but {} image indices",
                tables.len(),
                image_indices.len()
            )));
        }
        if tables.is_empty() {
            return Err(Error::EmptyInput("no measurement tables to aggregate".to_string()));
        }

        let mut seen = HashSet::new();
        for (table, &sample_index) in tables.iter().zip(image_indices) {
            for row in table.rows() {
                if !seen.insert((sample_index, row.animal_id)) {
                    return Err(Error::DuplicateKey {
                        sample_index,
                        animal_id: row.animal_id,
                    });
                }
            }
        }

        let with_labels = tables.iter().any(ImageMeasurementTable::has_labels);
        let schema = corpus_schema(with_labels);
        let batches = tables
            .iter()
            .zip(image_indices)
            .map(|(table, &index)| image_batch(&schema, table, index))
            .collect::<Result<Vec<_>>>()?;

        let merged = concat_batches(&schema, &batches)?;
        let batch = sort::sort_by_feret(&merged)?;
        tracing::info!(rows = batch.num_rows(), images = tables.len(), "aggregated corpus");
        Ok(Self { batch })
    }

    /// Validate an externally loaded batch (e.g. read back from Parquet)
    ///
    /// Columns are matched by name and type; rows are re-sorted.
    ///
    /// # Errors
    /// - `Error::MissingColumn` if a corpus column is absent
    /// - `Error::InvalidInput` if a column has the wrong type
    /// - `Error::DuplicateKey` if a key repeats
    pub fn from_batch(batch: RecordBatch) -> Result<Self> {
        let with_labels = batch.schema().field_with_name(headers::CLUSTER_LABEL).is_ok();
        let schema = corpus_schema(with_labels);

        let mut columns: Vec<ArrayRef> = Vec::with_capacity(schema.fields().len());
        for field in schema.fields() {
            let column = batch
                .column_by_name(field.name())
                .ok_or_else(|| Error::MissingColumn {
                    column: field.name().clone(),
                })?;
            if column.data_type() != field.data_type() {
                return Err(Error::InvalidInput(format!(
                    "column '{}' has type {:?}, expected {:?}",
                    field.name(),
                    column.data_type(),
                    field.data_type()
                )));
            }
            if !field.is_nullable() && column.null_count() > 0 {
                return Err(Error::InvalidInput(format!(
                    "column '{}' contains nulls",
                    field.name()
                )));
            }
            columns.push(Arc::clone(column));
        }

        let normalized = RecordBatch::try_new(schema, columns)?;
        let table = Self {
            batch: sort::sort_by_feret(&normalized)?,
        };

        let mut seen = HashSet::new();
        for key in table.keys()? {
            if !seen.insert(key) {
                return Err(Error::DuplicateKey {
                    sample_index: key.0,
                    animal_id: key.1,
                });
            }
        }
        Ok(table)
    }

    /// Underlying Arrow batch
    #[must_use]
    pub fn batch(&self) -> &RecordBatch {
        &self.batch
    }

    /// Number of particles
    #[must_use]
    pub fn num_rows(&self) -> usize {
        self.batch.num_rows()
    }

    /// True when the corpus has no rows
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.batch.num_rows() == 0
    }

    /// True when the `k-mean labels` column is present
    #[must_use]
    pub fn has_labels(&self) -> bool {
        self.batch.column_by_name(headers::CLUSTER_LABEL).is_some()
    }

    /// A Float64 column by name
    ///
    /// # Errors
    /// Returns `Error::MissingColumn` or `Error::Other` on a type mismatch
    pub fn float_column(&self, name: &str) -> Result<&Float64Array> {
        downcast_column(&self.batch, name)
    }

    /// A UInt32 column by name
    ///
    /// # Errors
    /// Returns `Error::MissingColumn` or `Error::Other` on a type mismatch
    pub fn uint_column(&self, name: &str) -> Result<&UInt32Array> {
        downcast_column(&self.batch, name)
    }

    /// Cluster labels, if the corpus was classified
    ///
    /// # Errors
    /// Returns `Error::Other` if the column has an unexpected type
    pub fn labels(&self) -> Result<Option<&Int32Array>> {
        if self.has_labels() {
            downcast_column(&self.batch, headers::CLUSTER_LABEL).map(Some)
        } else {
            Ok(None)
        }
    }

    /// Feret diameters in µm, in row order
    ///
    /// # Errors
    /// Returns error if the µm column is missing
    pub fn feret_um(&self) -> Result<Vec<f64>> {
        Ok(self.float_column(headers::FERET_UM)?.values().to_vec())
    }

    /// (sample image index, animal id) of every row, in row order
    ///
    /// # Errors
    /// Returns error if a key column is missing
    pub fn keys(&self) -> Result<Vec<(u32, u32)>> {
        let samples = self.uint_column(headers::SAMPLE_IMAGE_INDEX)?;
        let animals = self.uint_column(headers::ANIMAL_ID)?;
        Ok(samples
            .values()
            .iter()
            .copied()
            .zip(animals.values().iter().copied())
            .collect())
    }
}

fn downcast_column<'a, T: Array + 'static>(batch: &'a RecordBatch, name: &str) -> Result<&'a T> {
    batch
        .column_by_name(name)
        .ok_or_else(|| Error::MissingColumn {
            column: name.to_string(),
        })?
        .as_any()
        .downcast_ref::<T>()
        .ok_or_else(|| Error::Other(format!("Failed to downcast column '{name}'")))
}

/// One image's rows as a batch in the corpus schema
fn image_batch(
    schema: &SchemaRef,
    table: &ImageMeasurementTable,
    sample_index: u32,
) -> Result<RecordBatch> {
    let rows = table.rows();
    let float = |f: fn(&crate::measurement::ParticleMeasurement) -> f64| -> ArrayRef {
        Arc::new(Float64Array::from_iter_values(rows.iter().map(f)))
    };

    let mut columns: Vec<ArrayRef> = vec![
        Arc::new(UInt32Array::from_iter_values(rows.iter().map(|r| r.animal_id))),
        float(|r| r.feret_diameter),
        float(|r| r.area),
        float(|r| r.standardized_feret_diameter),
        float(|r| r.circularity),
        float(|r| r.roundness),
        Arc::new(UInt32Array::from_iter_values(
            std::iter::repeat(sample_index).take(rows.len()),
        )),
        float(|r| mm_to_um(r.feret_diameter)),
    ];
    if schema.field_with_name(headers::CLUSTER_LABEL).is_ok() {
        columns.push(Arc::new(Int32Array::from_iter(
            rows.iter().map(|r| r.cluster_label.map(i32::from)),
        )));
    }

    Ok(RecordBatch::try_new(Arc::clone(schema), columns)?)
}

#[cfg(test)]
#[allow(clippy::float_cmp)]
mod tests {
    use super::*;
    use crate::measurement::ParticleMeasurement;

    fn table(image: &str, feret: &[f64], labelled: bool) -> ImageMeasurementTable {
        let rows = feret
            .iter()
            .enumerate()
            .map(|(i, &f)| ParticleMeasurement {
                animal_id: u32::try_from(i + 1).unwrap(),
                feret_diameter: f,
                area: f * f,
                standardized_feret_diameter: 0.0,
                circularity: 0.7,
                roundness: 0.6,
                cluster_label: labelled.then_some(u8::from(f > 0.05)),
            })
            .collect();
        ImageMeasurementTable::new(image, rows).unwrap()
    }

    #[test]
    fn test_mm_to_um() {
        assert_eq!(mm_to_um(0.045), 45.0);
        assert_eq!(mm_to_um(0.012_345_6), 12.346);
    }

    #[test]
    fn test_aggregate_three_and_five_rows() {
        let a = table("a.png", &[0.03, 0.01, 0.05], false);
        let b = table("b.png", &[0.02, 0.08, 0.04, 0.06, 0.07], false);
        let corpus = CorpusTable::aggregate(&[a, b], &[1, 2]).unwrap();

        assert_eq!(corpus.num_rows(), 8);
        let feret = corpus.float_column(headers::FERET).unwrap().values().to_vec();
        assert!(feret.windows(2).all(|w| w[0] <= w[1]));

        let keys: HashSet<_> = corpus.keys().unwrap().into_iter().collect();
        assert_eq!(keys.len(), 8);

        let um = corpus.feret_um().unwrap();
        assert_eq!(um[0], 10.0);
        assert_eq!(um[7], 80.0);
        assert!(!corpus.has_labels());
    }

    #[test]
    fn test_aggregate_column_order() {
        let corpus = CorpusTable::aggregate(&[table("a.png", &[0.01], true)], &[1]).unwrap();
        let names: Vec<String> = corpus
            .batch()
            .schema()
            .fields()
            .iter()
            .map(|f| f.name().clone())
            .collect();
        assert_eq!(
            names,
            vec![
                "animal ID",
                "Feret's diameter",
                "area",
                "standardized Feret's diameter",
                "Circularity",
                "Roundness",
                "Sample Image Index",
                "Feret's Diameter [μm]",
                "k-mean labels",
            ]
        );
    }

    #[test]
    fn test_mixed_labels_become_nulls() {
        let labelled = table("a.png", &[0.01, 0.09], true);
        let plain = table("b.png", &[0.05], false);
        let corpus = CorpusTable::aggregate(&[labelled, plain], &[1, 2]).unwrap();

        let labels = corpus.labels().unwrap().unwrap();
        assert_eq!(labels.null_count(), 1);
        assert_eq!(labels.value(0), 0);
        assert!(labels.is_null(1));
        assert_eq!(labels.value(2), 1);
    }

    #[test]
    fn test_length_mismatch() {
        let result = CorpusTable::aggregate(&[table("a.png", &[0.01], false)], &[1, 2]);
        assert!(matches!(result, Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_duplicate_key() {
        let a = table("a.png", &[0.01], false);
        let result = CorpusTable::aggregate(&[a.clone(), a], &[3, 3]);
        assert!(matches!(
            result,
            Err(Error::DuplicateKey {
                sample_index: 3,
                animal_id: 1
            })
        ));
    }

    #[test]
    fn test_no_tables() {
        assert!(matches!(
            CorpusTable::aggregate(&[], &[]),
            Err(Error::EmptyInput(_))
        ));
    }

    #[test]
    fn test_from_batch_accepts_own_output() {
        let corpus = CorpusTable::aggregate(
            &[table("a.png", &[0.02, 0.01], true), table("b.png", &[0.015], true)],
            &[1, 2],
        )
        .unwrap();
        let again = CorpusTable::from_batch(corpus.batch().clone()).unwrap();
        assert_eq!(again, corpus);
    }

    #[test]
    fn test_from_batch_missing_column() {
        let schema = Arc::new(Schema::new(vec![Field::new(
            headers::ANIMAL_ID,
            DataType::UInt32,
            false,
        )]));
        let batch =
            RecordBatch::try_new(schema, vec![Arc::new(UInt32Array::from(vec![1]))]).unwrap();
        assert!(matches!(
            CorpusTable::from_batch(batch),
            Err(Error::MissingColumn { .. })
        ));
    }
}
