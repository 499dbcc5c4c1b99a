//! Measurement extraction
//!
//! Runs the segmentation engine on one image inside a guarded session and
//! turns its results table into a sorted [`ImageMeasurementTable`].

use super::{ImageMeasurementTable, ParticleMeasurement};
use crate::classify::{classify, order_labels_by_size, FEATURE_COUNT};
use crate::config::Calibration;
use crate::engine::{columns, AnalysisRequest, ResultsTable, SegmentationEngine, SessionGuard};
use crate::stats::normalize::standardize_column;
use crate::{Error, Result};
use std::path::{Path, PathBuf};

/// Suffix of annotated mask files
const ANALYZED_SUFFIX: &str = "-analyzed.png";

/// Engine columns every extraction needs
const REQUIRED_COLUMNS: [&str; 4] = [
    columns::FERET,
    columns::AREA,
    columns::CIRCULARITY,
    columns::ROUNDNESS,
];

/// Per-image measurement driver
///
/// Owns one engine session for its whole lifetime; the session is reset
/// after every image whether or not extraction succeeds.
pub struct MeasurementExtractor<E: SegmentationEngine> {
    engine: E,
    analyzed_dir: PathBuf,
}

impl<E: SegmentationEngine> MeasurementExtractor<E> {
    /// Create an extractor writing annotated images to `analyzed_dir`
    pub fn new(engine: E, analyzed_dir: impl Into<PathBuf>) -> Self {
        Self {
            engine,
            analyzed_dir: analyzed_dir.into(),
        }
    }

    /// Borrow the engine
    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// Annotated image path for a source image: `<analyzed_dir>/<stem>-analyzed.png`
    #[must_use]
    pub fn annotated_path(&self, image_path: &Path) -> PathBuf {
        let stem = image_path
            .file_stem()
            .map_or_else(|| "image".into(), |s| s.to_string_lossy());
        self.analyzed_dir.join(format!("{stem}{ANALYZED_SUFFIX}"))
    }

    /// Measure every particle in one image
    ///
    /// Feret diameter is standardized over the image. With
    /// `distinguish_juveniles`, particles are clustered into juvenile (0) and
    /// adult (1) groups; images where that is impossible keep no labels.
    ///
    /// # Errors
    /// - `Error::ImageNotFound` if `image_path` is not a file
    /// - `Error::SegmentationEngine` if the engine fails
    /// - `Error::MissingColumn` if a descriptor column is absent
    /// - `Error::NoParticlesDetected` if the image has no particles
    pub fn extract(
        &mut self,
        image_path: &Path,
        calibration: Calibration,
        distinguish_juveniles: bool,
    ) -> Result<ImageMeasurementTable> {
        if !image_path.is_file() {
            return Err(Error::ImageNotFound {
                path: image_path.to_path_buf(),
            });
        }

        let image_name = image_path
            .file_name()
            .map_or_else(|| image_path.display().to_string(), |n| n.to_string_lossy().into_owned());
        let annotated_output = self.annotated_path(image_path);

        let results = {
            let mut session = SessionGuard::new(&mut self.engine);
            session.analyze(&AnalysisRequest {
                image: image_path,
                calibration,
                annotated_output: &annotated_output,
            })?
        };

        let rows = build_rows(&results, &image_name, distinguish_juveniles)?;
        tracing::info!(image = %image_name, particles = rows.len(), "measured image");
        ImageMeasurementTable::new(image_name, rows)
    }
}

/// Validated descriptor columns, all of equal length
struct Descriptors<'a> {
    feret: &'a [f64],
    area: &'a [f64],
    circularity: &'a [f64],
    roundness: &'a [f64],
}

impl<'a> Descriptors<'a> {
    fn from_table(results: &'a ResultsTable) -> Result<Self> {
        let mut found = Vec::with_capacity(REQUIRED_COLUMNS.len());
        for column in REQUIRED_COLUMNS {
            let values = results.column(column).ok_or_else(|| Error::MissingColumn {
                column: column.to_string(),
            })?;
            found.push(values);
        }

        let rows = found[0].len();
        if found.iter().any(|values| values.len() != rows) {
            return Err(Error::SegmentationEngine(
                "results table columns have different lengths".to_string(),
            ));
        }

        Ok(Self {
            feret: found[0],
            area: found[1],
            circularity: found[2],
            roundness: found[3],
        })
    }

    fn len(&self) -> usize {
        self.feret.len()
    }
}

fn build_rows(
    results: &ResultsTable,
    image_name: &str,
    distinguish_juveniles: bool,
) -> Result<Vec<ParticleMeasurement>> {
    let descriptors = Descriptors::from_table(results)?;
    if descriptors.feret.is_empty() {
        return Err(Error::NoParticlesDetected {
            image: image_name.to_string(),
        });
    }

    let standardized_feret = match standardize_column(descriptors.feret, columns::FERET) {
        Ok(z) => z,
        Err(Error::DegenerateDistribution { column }) => {
            tracing::warn!(
                image = %image_name,
                column = %column,
                "constant Feret diameter, standardized values set to 0"
            );
            vec![0.0; descriptors.len()]
        }
        Err(e) => return Err(e),
    };

    let labels = if distinguish_juveniles {
        cluster_labels(&descriptors, image_name)
    } else {
        None
    };

    (0..descriptors.len())
        .map(|i| {
            let animal_id = u32::try_from(i + 1)
                .map_err(|_| Error::InvalidInput(format!("too many particles in {image_name}")))?;
            Ok(ParticleMeasurement {
                animal_id,
                feret_diameter: descriptors.feret[i],
                area: descriptors.area[i],
                standardized_feret_diameter: standardized_feret[i],
                circularity: descriptors.circularity[i],
                roundness: descriptors.roundness[i],
                cluster_label: labels.as_ref().map(|l| l[i]),
            })
        })
        .collect()
}

/// Juvenile/adult labels, or `None` when the image cannot be clustered
fn cluster_labels(descriptors: &Descriptors<'_>, image_name: &str) -> Option<Vec<u8>> {
    if descriptors.len() < 2 {
        tracing::warn!(image = %image_name, "single particle, skipping juvenile/adult clustering");
        return None;
    }

    // A constant column carries no information; zeroing it removes it from the distance
    let mut informative = 0usize;
    let mut standardized = Vec::with_capacity(FEATURE_COUNT);
    for (name, values) in [
        (columns::AREA, descriptors.area),
        (columns::FERET, descriptors.feret),
        (columns::CIRCULARITY, descriptors.circularity),
        (columns::ROUNDNESS, descriptors.roundness),
    ] {
        match standardize_column(values, name) {
            Ok(z) => {
                informative += 1;
                standardized.push(z);
            }
            Err(Error::DegenerateDistribution { column }) => {
                tracing::debug!(
                    image = %image_name,
                    column = %column,
                    "constant descriptor left out of clustering"
                );
                standardized.push(vec![0.0; values.len()]);
            }
            Err(e) => {
                tracing::warn!(image = %image_name, error = %e, "skipping juvenile/adult clustering");
                return None;
            }
        }
    }

    if informative == 0 {
        tracing::warn!(
            image = %image_name,
            "all descriptors constant, skipping juvenile/adult clustering"
        );
        return None;
    }

    let features: Vec<[f64; FEATURE_COUNT]> = (0..descriptors.len())
        .map(|i| {
            [
                standardized[0][i],
                standardized[1][i],
                standardized[2][i],
                standardized[3][i],
            ]
        })
        .collect();

    match classify(&features) {
        Ok(labels) => Some(order_labels_by_size(&labels, descriptors.feret)),
        Err(e) => {
            tracing::warn!(image = %image_name, error = %e, "skipping juvenile/adult clustering");
            None
        }
    }
}
