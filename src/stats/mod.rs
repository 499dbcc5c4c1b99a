//! Descriptive statistics over measurement columns
//!
//! - `normalize`: z-score standardization (population σ) for clustering input
//! - `summary`: mean, sample σ, range and the small-particle percentage

pub(crate) mod normalize;
mod summary;

pub use normalize::{population_mean_std, standardize};
pub use summary::{summarize, SummaryStatistics};
