//! Per-image particle measurements
//!
//! `ParticleMeasurement` is the typed row validated out of the engine's
//! loosely typed results table. `ImageMeasurementTable` holds one image's
//! rows sorted by Feret diameter and round-trips through the transient
//! per-image CSV.

mod extractor;

pub use extractor::MeasurementExtractor;

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Column headers shared by the per-image CSV and the corpus table
pub mod headers {
    /// 1-based particle id within an image
    pub const ANIMAL_ID: &str = "animal ID";
    /// Calibrated Feret diameter (mm)
    pub const FERET: &str = "Feret's diameter";
    /// Calibrated area (mm²)
    pub const AREA: &str = "area";
    /// z-score of the Feret diameter within its image
    pub const STANDARDIZED_FERET: &str = "standardized Feret's diameter";
    /// Circularity
    pub const CIRCULARITY: &str = "Circularity";
    /// Roundness
    pub const ROUNDNESS: &str = "Roundness";
    /// Juvenile (0) / adult (1) cluster
    pub const CLUSTER_LABEL: &str = "k-mean labels";
    /// 1-based position of the source image in the run
    pub const SAMPLE_IMAGE_INDEX: &str = "Sample Image Index";
    /// Feret diameter in micrometers
    pub const FERET_UM: &str = "Feret's Diameter [μm]";
}

/// One detected specimen
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ParticleMeasurement {
    /// 1-based, dense within an image
    #[serde(rename = "animal ID")]
    pub animal_id: u32,
    /// Feret diameter (mm)
    #[serde(rename = "Feret's diameter")]
    pub feret_diameter: f64,
    /// Area (mm²)
    #[serde(rename = "area")]
    pub area: f64,
    /// Feret diameter standardized over the image's particles
    #[serde(rename = "standardized Feret's diameter")]
    pub standardized_feret_diameter: f64,
    /// `4πA/P²`
    #[serde(rename = "Circularity")]
    pub circularity: f64,
    /// Minor/major axis ratio
    #[serde(rename = "Roundness")]
    pub roundness: f64,
    /// Cluster label when classification ran
    #[serde(rename = "k-mean labels", default, skip_serializing_if = "Option::is_none")]
    pub cluster_label: Option<u8>,
}

/// Measurements of one source image, sorted ascending by Feret diameter
#[derive(Debug, Clone, PartialEq)]
pub struct ImageMeasurementTable {
    image: String,
    rows: Vec<ParticleMeasurement>,
}

impl ImageMeasurementTable {
    /// Build a table, sorting rows by Feret diameter (ties by animal id)
    ///
    /// # Errors
    /// Returns `Error::InvalidInput` if labels are present on some rows but not others
    pub fn new(image: impl Into<String>, mut rows: Vec<ParticleMeasurement>) -> Result<Self> {
        let labelled = rows.iter().filter(|r| r.cluster_label.is_some()).count();
        if labelled != 0 && labelled != rows.len() {
            return Err(Error::InvalidInput(
                "cluster labels must be set on every row or none".to_string(),
            ));
        }

        rows.sort_by(|a, b| {
            a.feret_diameter
                .total_cmp(&b.feret_diameter)
                .then(a.animal_id.cmp(&b.animal_id))
        });
        Ok(Self {
            image: image.into(),
            rows,
        })
    }

    /// Source image name
    #[must_use]
    pub fn image(&self) -> &str {
        &self.image
    }

    /// Rows in ascending Feret order
    #[must_use]
    pub fn rows(&self) -> &[ParticleMeasurement] {
        &self.rows
    }

    /// Number of particles
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// True when the table has no particles
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// True when rows carry cluster labels
    #[must_use]
    pub fn has_labels(&self) -> bool {
        self.rows.first().is_some_and(|r| r.cluster_label.is_some())
    }

    /// Write the table as CSV, replacing any existing file
    ///
    /// The `k-mean labels` column is only written when rows carry labels.
    ///
    /// # Errors
    /// Returns error if the file cannot be created or written
    pub fn write_csv<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let mut writer = csv::Writer::from_path(path.as_ref())?;

        // Headers come from the serde renames of the first row
        if self.rows.is_empty() {
            writer.write_record([
                headers::ANIMAL_ID,
                headers::FERET,
                headers::AREA,
                headers::STANDARDIZED_FERET,
                headers::CIRCULARITY,
                headers::ROUNDNESS,
            ])?;
        }
        for row in &self.rows {
            writer.serialize(row)?;
        }

        writer.flush()?;
        Ok(())
    }

    /// Read a table written by [`write_csv`](Self::write_csv)
    ///
    /// # Errors
    /// Returns error if the file is missing or a row does not parse
    pub fn read_csv<P: AsRef<Path>>(image: impl Into<String>, path: P) -> Result<Self> {
        let mut reader = csv::Reader::from_path(path.as_ref())?;
        let rows = reader
            .deserialize::<ParticleMeasurement>()
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Self::new(image, rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn row(animal_id: u32, feret: f64, label: Option<u8>) -> ParticleMeasurement {
        ParticleMeasurement {
            animal_id,
            feret_diameter: feret,
            area: feret * feret,
            standardized_feret_diameter: 0.0,
            circularity: 0.8,
            roundness: 0.5,
            cluster_label: label,
        }
    }

    #[test]
    fn test_rows_sorted_by_feret() {
        let table = ImageMeasurementTable::new(
            "sample1.png",
            vec![row(1, 0.3, None), row(2, 0.1, None), row(3, 0.2, None)],
        )
        .unwrap();
        let ids: Vec<u32> = table.rows().iter().map(|r| r.animal_id).collect();
        assert_eq!(ids, vec![2, 3, 1]);
    }

    #[test]
    fn test_mixed_labels_rejected() {
        let result =
            ImageMeasurementTable::new("x.png", vec![row(1, 0.1, Some(0)), row(2, 0.2, None)]);
        assert!(matches!(result, Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_csv_round_trip_with_labels() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("sample1.csv");
        let table = ImageMeasurementTable::new(
            "sample1.png",
            vec![row(1, 0.05, Some(1)), row(2, 0.02, Some(0))],
        )
        .unwrap();

        table.write_csv(&path).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.starts_with(
            "animal ID,Feret's diameter,area,standardized Feret's diameter,Circularity,Roundness,k-mean labels"
        ));

        let loaded = ImageMeasurementTable::read_csv("sample1.png", &path).unwrap();
        assert_eq!(loaded, table);
    }

    #[test]
    fn test_csv_round_trip_without_labels() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("sample2.csv");
        let table =
            ImageMeasurementTable::new("sample2.png", vec![row(1, 0.04, None)]).unwrap();

        table.write_csv(&path).unwrap();
        let header = std::fs::read_to_string(&path).unwrap();
        assert!(!header.contains("k-mean labels"));

        let loaded = ImageMeasurementTable::read_csv("sample2.png", &path).unwrap();
        assert!(!loaded.has_labels());
        assert_eq!(loaded.len(), 1);
    }

    #[test]
    fn test_write_csv_overwrites() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("t.csv");
        let big = ImageMeasurementTable::new(
            "t.png",
            (1..=20).map(|i| row(i, f64::from(i), None)).collect(),
        )
        .unwrap();
        let small = ImageMeasurementTable::new("t.png", vec![row(1, 1.0, None)]).unwrap();

        big.write_csv(&path).unwrap();
        small.write_csv(&path).unwrap();

        let loaded = ImageMeasurementTable::read_csv("t.png", &path).unwrap();
        assert_eq!(loaded.len(), 1);
    }

    #[test]
    fn test_empty_table_round_trip_keeps_header() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("empty.csv");
        ImageMeasurementTable::new("empty.png", Vec::new())
            .unwrap()
            .write_csv(&path)
            .unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("animal ID,Feret's diameter"));
        assert!(ImageMeasurementTable::read_csv("empty.png", &path).unwrap().is_empty());
    }

    #[test]
    fn test_csv_values_match_serde_renames() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("values.csv");
        ImageMeasurementTable::new("values.png", vec![row(7, 0.25, Some(1))])
            .unwrap()
            .write_csv(&path)
            .unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[1], "7,0.25,0.0625,0.0,0.8,0.5,1");
    }

    #[test]
    fn test_sort_is_total_with_nan() {
        let table = ImageMeasurementTable::new(
            "nan.png",
            vec![row(1, f64::NAN, None), row(2, 0.2, None), row(3, 0.1, None)],
        )
        .unwrap();
        let ids: Vec<u32> = table.rows().iter().map(|r| r.animal_id).collect();
        assert_eq!(ids, vec![3, 2, 1]);
    }
}
