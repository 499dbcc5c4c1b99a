//! Run configuration
//!
//! Every value the analysis used to hardcode (calibration, size cutoff,
//! directories, image list) lives here. Configs load from JSON and the CLI
//! overrides individual fields before [`AnalysisConfig::validate`] runs.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Size cutoff for the "small particle" statistic, in micrometers
pub const DEFAULT_SIZE_THRESHOLD_UM: f64 = 60.0;

/// Physical scale of an image
///
/// `scale_px` pixels span `known_distance_mm` millimeters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Calibration {
    /// Number of pixels spanning the known distance
    pub scale_px: f64,
    /// Known distance in millimeters
    pub known_distance_mm: f64,
}

impl Calibration {
    /// Create a calibration, rejecting non-positive values
    ///
    /// # Errors
    /// Returns `Error::Config` if either value is not a positive finite number
    pub fn new(scale_px: f64, known_distance_mm: f64) -> Result<Self> {
        let calibration = Self {
            scale_px,
            known_distance_mm,
        };
        calibration.validate()?;
        Ok(calibration)
    }

    /// Millimeters per pixel
    #[must_use]
    pub fn mm_per_pixel(&self) -> f64 {
        self.known_distance_mm / self.scale_px
    }

    fn validate(&self) -> Result<()> {
        if !(self.scale_px.is_finite() && self.scale_px > 0.0) {
            return Err(Error::Config(format!(
                "scale must be a positive number of pixels, got {}",
                self.scale_px
            )));
        }
        if !(self.known_distance_mm.is_finite() && self.known_distance_mm > 0.0) {
            return Err(Error::Config(format!(
                "known distance must be a positive length in mm, got {}",
                self.known_distance_mm
            )));
        }
        Ok(())
    }
}

impl Default for Calibration {
    fn default() -> Self {
        Self {
            scale_px: 0.3,
            known_distance_mm: 0.01,
        }
    }
}

/// Which side of the Otsu level counts as foreground
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Background {
    /// Bright specimens on a dark background
    #[default]
    Dark,
    /// Dark specimens on a light background
    Light,
}

/// Particle analysis options passed to the segmentation engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmentationOptions {
    /// Background polarity for thresholding
    pub background: Background,
    /// Drop particles touching the image border
    pub exclude_edge_particles: bool,
    /// Particles below this pixel count are treated as noise
    pub min_particle_area_px: u32,
}

impl Default for SegmentationOptions {
    fn default() -> Self {
        Self {
            background: Background::Dark,
            exclude_edge_particles: true,
            min_particle_area_px: 1,
        }
    }
}

/// Configuration for one analysis run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Directory holding the sample images
    pub input_dir: PathBuf,
    /// Destination root for tables, spreadsheet, charts and run report
    pub output_dir: PathBuf,
    /// Destination for annotated images
    pub analyzed_dir: PathBuf,
    /// Ordered list of image file names to process
    pub sample_images: Vec<String>,
    /// Physical scale shared by all images
    pub calibration: Calibration,
    /// Enable juvenile/adult clustering
    pub distinguish_juveniles: bool,
    /// Size cutoff for the summary statistic (µm)
    pub size_threshold_um: f64,
    /// Keep per-image CSV tables after aggregation
    pub retain_image_tables: bool,
    /// Write the corpus as Parquet alongside the spreadsheet
    pub archive_parquet: bool,
    /// Render histogram and boxplot PNGs
    pub render_charts: bool,
    /// Particle analysis options
    pub segmentation: SegmentationOptions,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            input_dir: PathBuf::from("img"),
            output_dir: PathBuf::from("results"),
            analyzed_dir: PathBuf::from("img/analyzed"),
            sample_images: vec!["sample1.png".to_string()],
            calibration: Calibration::default(),
            distinguish_juveniles: true,
            size_threshold_um: DEFAULT_SIZE_THRESHOLD_UM,
            retain_image_tables: false,
            archive_parquet: false,
            render_charts: true,
            segmentation: SegmentationOptions::default(),
        }
    }
}

impl AnalysisConfig {
    /// Load a config from a JSON file
    ///
    /// Missing fields take their default values.
    ///
    /// # Errors
    /// Returns error if the file cannot be read or is not valid JSON
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        serde_json::from_str(&text).map_err(|e| {
            Error::Config(format!(
                "Failed to parse {}: {e}",
                path.as_ref().display()
            ))
        })
    }

    /// Check the config before any image is touched
    ///
    /// # Errors
    /// Returns `Error::Config` on invalid calibration, threshold or an empty image list
    pub fn validate(&self) -> Result<()> {
        self.calibration.validate()?;

        validate_size_threshold(self.size_threshold_um)?;

        if self.sample_images.is_empty() {
            return Err(Error::Config("no sample images to process".to_string()));
        }

        Ok(())
    }

    /// Full path of a sample image
    #[must_use]
    pub fn image_path(&self, image: &str) -> PathBuf {
        self.input_dir.join(image)
    }
}

/// Check a small-specimen cutoff in µm
///
/// # Errors
/// Returns `Error::Config` unless the threshold is finite and non-negative
pub fn validate_size_threshold(threshold_um: f64) -> Result<()> {
    if threshold_um.is_finite() && threshold_um >= 0.0 {
        Ok(())
    } else {
        Err(Error::Config(format!(
            "size threshold must be a non-negative number of µm, got {threshold_um}"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_reference_run() {
        let config = AnalysisConfig::default();
        assert_eq!(config.sample_images, vec!["sample1.png"]);
        assert!((config.calibration.scale_px - 0.3).abs() < f64::EPSILON);
        assert!((config.calibration.known_distance_mm - 0.01).abs() < f64::EPSILON);
        assert!(config.distinguish_juveniles);
        assert!((config.size_threshold_um - 60.0).abs() < f64::EPSILON);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_mm_per_pixel() {
        let calibration = Calibration::new(100.0, 1.0).unwrap();
        assert!((calibration.mm_per_pixel() - 0.01).abs() < 1e-12);
    }

    #[test]
    fn test_rejects_zero_scale() {
        let err = Calibration::new(0.0, 1.0).unwrap_err();
        assert!(err.to_string().contains("scale must be a positive"));
    }

    #[test]
    fn test_rejects_empty_image_list() {
        let config = AnalysisConfig {
            sample_images: vec![],
            ..AnalysisConfig::default()
        };
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_rejects_nan_threshold() {
        let config = AnalysisConfig {
            size_threshold_um: f64::NAN,
            ..AnalysisConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let json = r#"{
            "sample_images": ["a.png", "b.png"],
            "segmentation": { "background": "light" }
        }"#;
        let config: AnalysisConfig = serde_json::from_str(json).unwrap();

        assert_eq!(config.sample_images.len(), 2);
        assert_eq!(config.segmentation.background, Background::Light);
        assert!(config.segmentation.exclude_edge_particles);
        assert_eq!(config.output_dir, PathBuf::from("results"));
    }

    #[test]
    fn test_image_path_joins_input_dir() {
        let config = AnalysisConfig::default();
        assert_eq!(config.image_path("sample1.png"), PathBuf::from("img/sample1.png"));
    }

    #[test]
    fn test_size_threshold_bounds() {
        assert!(validate_size_threshold(0.0).is_ok());
        assert!(validate_size_threshold(60.0).is_ok());
        assert!(matches!(validate_size_threshold(-1.0), Err(Error::Config(_))));
        assert!(matches!(
            validate_size_threshold(f64::INFINITY),
            Err(Error::Config(_))
        ));
    }
}
