//! Summary statistics over the corpus size column

use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// Single-row summary of a size column
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SummaryStatistics {
    /// Arithmetic mean
    pub mean: f64,
    /// Sample standard deviation (n - 1); `None` for a single value
    pub standard_deviation: Option<f64>,
    /// Smallest value
    pub min: f64,
    /// Largest value
    pub max: f64,
    /// Percentage of values `<= threshold`
    pub percent_under_threshold: f64,
    /// Cutoff used for `percent_under_threshold`
    pub threshold: f64,
    /// Number of values summarized
    pub count: usize,
}

impl SummaryStatistics {
    /// Header for the threshold column, e.g. `<60μm [%]`
    #[must_use]
    pub fn threshold_label(&self) -> String {
        format!("<{}μm [%]", self.threshold)
    }
}

/// Summarize a size column
///
/// # Errors
/// Returns `Error::EmptyInput` if `values` is empty
///
/// # Example
///
/// ```rust
/// use collembola_size::stats::summarize;
///
/// let summary = summarize(&[10.0, 50.0, 70.0, 90.0], 60.0).unwrap();
/// assert!((summary.mean - 55.0).abs() < 1e-12);
/// assert!((summary.percent_under_threshold - 50.0).abs() < 1e-12);
/// ```
#[allow(clippy::cast_precision_loss)]
pub fn summarize(values: &[f64], threshold: f64) -> Result<SummaryStatistics> {
    if values.is_empty() {
        return Err(Error::EmptyInput(
            "cannot summarize an empty size column".to_string(),
        ));
    }

    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;

    let standard_deviation = (values.len() > 1).then(|| {
        let squares: f64 = values.iter().map(|x| (x - mean).powi(2)).sum();
        (squares / (n - 1.0)).sqrt()
    });

    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let under = values.iter().filter(|&&x| x <= threshold).count();

    Ok(SummaryStatistics {
        mean,
        standard_deviation,
        min,
        max,
        percent_under_threshold: under as f64 / n * 100.0,
        threshold,
        count: values.len(),
    })
}
