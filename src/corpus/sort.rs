//! Deterministic corpus row ordering
//!
//! Ascending raw Feret diameter, ties broken by sample image index and then
//! animal id. NaN sorts last.

use crate::measurement::headers;
use crate::{Error, Result};
use arrow::array::ArrayRef;
use arrow::compute::{lexsort_to_indices, take_record_batch, SortColumn, SortOptions};
use arrow::record_batch::RecordBatch;

const ASCENDING: SortOptions = SortOptions {
    descending: false,
    nulls_first: false,
};

fn sort_column(batch: &RecordBatch, name: &str) -> Result<SortColumn> {
    let values: ArrayRef = batch
        .column_by_name(name)
        .ok_or_else(|| Error::MissingColumn {
            column: name.to_string(),
        })?
        .clone();
    Ok(SortColumn {
        values,
        options: Some(ASCENDING),
    })
}

/// Reorder every row of `batch` by (Feret, sample index, animal id)
///
/// # Errors
/// Returns `Error::MissingColumn` if a sort key is absent, or
/// `Error::Storage` if the sort kernel fails
pub(crate) fn sort_by_feret(batch: &RecordBatch) -> Result<RecordBatch> {
    if batch.num_rows() < 2 {
        return Ok(batch.clone());
    }

    let keys = [
        sort_column(batch, headers::FERET)?,
        sort_column(batch, headers::SAMPLE_IMAGE_INDEX)?,
        sort_column(batch, headers::ANIMAL_ID)?,
    ];

    let indices = lexsort_to_indices(&keys, None)
        .map_err(|e| Error::Storage(format!("Failed to sort corpus: {e}")))?;

    take_record_batch(batch, &indices)
        .map_err(|e| Error::Storage(format!("Failed to reorder corpus rows: {e}")))
}
