//! Feature standardization
//!
//! `z = (x - mean) / σ` with the population standard deviation (divide by n).
//! A zero σ is reported instead of producing NaN so callers can decide
//! whether to skip clustering for that image.

use crate::{Error, Result};

/// Population mean and standard deviation of a column
///
/// Returns `None` for an empty slice.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn population_mean_std(values: &[f64]) -> Option<(f64, f64)> {
    if values.is_empty() {
        return None;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n;
    Some((mean, variance.sqrt()))
}

/// Standardize a column to zero mean and unit population variance
///
/// # Errors
/// - `Error::EmptyInput` if `values` is empty
/// - `Error::DegenerateDistribution` if every value is equal (includes n = 1)
///
/// # Example
///
/// ```rust
/// use collembola_size::stats::standardize;
///
/// let z = standardize(&[1.0, 2.0, 3.0]).unwrap();
/// assert!((z[1]).abs() < 1e-12);
/// ```
pub fn standardize(values: &[f64]) -> Result<Vec<f64>> {
    standardize_column(values, "values")
}

pub(crate) fn standardize_column(values: &[f64], column: &str) -> Result<Vec<f64>> {
    let (mean, std) = population_mean_std(values)
        .ok_or_else(|| Error::EmptyInput(format!("cannot standardize empty column '{column}'")))?;

    // Relative guard: values that differ only by rounding noise count as constant
    if std <= f64::EPSILON * mean.abs().max(1.0) {
        return Err(Error::DegenerateDistribution {
            column: column.to_string(),
        });
    }

    Ok(values.iter().map(|x| (x - mean) / std).collect())
}
