//! # collembola-size: Body-Size Statistics for Collembola Specimens
//!
//! **Version**: 0.1.0
//!
//! Segments microscope images of *Folsomia candida*, measures every specimen
//! (Feret diameter, area, circularity, roundness), optionally splits each
//! image's specimens into juvenile and adult clusters, merges all images into
//! one corpus and reports size statistics as an Excel workbook plus charts.
//!
//! ## Design Principles (Toyota Way Aligned)
//!
//! - **Jidoka**: Per-image failures stop that image, never the batch
//! - **Poka-Yoke safety**: Engine sessions reset on every exit path
//! - **Genchi Genbutsu**: Descriptors follow ImageJ's "Analyze Particles" definitions
//! - **Muda elimination**: One sequential pass, no intermediate image copies kept
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use collembola_size::config::AnalysisConfig;
//! use collembola_size::pipeline::BatchRunner;
//!
//! let config = AnalysisConfig::default();
//! let outcome = BatchRunner::from_config(&config).run(&config)?;
//! println!(
//!     "{} specimens, {:.1}% under {} µm",
//!     outcome.summary.count, outcome.summary.percent_under_threshold, outcome.summary.threshold
//! );
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

pub mod classify;
pub mod config;
pub mod corpus;
pub mod engine;
pub mod error;
pub mod measurement;
pub mod pipeline;
pub mod report;
pub mod run_report;
pub mod stats;
pub mod storage;

pub use error::{Error, Result};
