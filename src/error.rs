//! Error types for collembola-size
//!
//! Toyota Way: Clear error messages with actionable guidance (Respect for People)

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// collembola-size error types
#[derive(Error, Debug)]
pub enum Error {
    /// Input image does not resolve to a file
    #[error("Image not found: {}", path.display())]
    ImageNotFound {
        /// Path that was requested
        path: PathBuf,
    },

    /// Segmentation engine could not open or process an image
    #[error("Segmentation engine error: {0}")]
    SegmentationEngine(String),

    /// Engine returned an empty results table
    #[error("No particles detected in {image}\nCheck the background polarity and calibration settings")]
    NoParticlesDetected {
        /// Image name
        image: String,
    },

    /// Standardization over a zero-variance column
    #[error("Degenerate distribution in column '{column}': standard deviation is zero")]
    DegenerateDistribution {
        /// Column that was being standardized
        column: String,
    },

    /// Operation needs at least one value
    #[error("Empty input: {0}")]
    EmptyInput(String),

    /// Engine results table lacks a required descriptor
    #[error("Results table is missing required column '{column}'")]
    MissingColumn {
        /// Expected column name
        column: String,
    },

    /// (sample image index, animal id) repeated in the corpus
    #[error("Duplicate corpus key: sample image {sample_index}, animal {animal_id}")]
    DuplicateKey {
        /// Sample image index
        sample_index: u32,
        /// Animal ID within the image
        animal_id: u32,
    },

    /// Invalid input parameters
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// k-means fitting failed
    #[error("Clustering error: {0}")]
    Clustering(String),

    /// Configuration rejected by validation
    #[error("Configuration error: {0}")]
    Config(String),

    /// Storage error (Parquet/Arrow)
    #[error("Storage error: {0}")]
    Storage(String),

    /// Spreadsheet could not be written
    #[error("Spreadsheet error: {0}")]
    Spreadsheet(String),

    /// Chart could not be rendered
    #[error("Chart error: {0}")]
    Chart(String),

    /// CSV error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Arrow error
    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    /// Generic error
    #[error("{0}")]
    Other(String),
}
