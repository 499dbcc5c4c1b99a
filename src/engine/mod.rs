//! Segmentation engine seam
//!
//! The engine is an explicit session handle. It owns the per-image mask and
//! results table between `analyze` and `reset`; a session that was not reset
//! refuses to analyze the next image, so stale particles can never leak into
//! another image's measurements.
//!
//! ```text
//! image ──> threshold (Otsu) ──> mask ──> dilate ──> fill holes
//!                                                       │
//!            ResultsTable <── measure <── label particles
//! ```

mod imageproc_engine;
mod results_table;
mod shape;

pub use imageproc_engine::ImageprocEngine;
pub use results_table::ResultsTable;
pub use shape::{ParticleShape, PixelCoord};

use crate::config::Calibration;
use crate::Result;
use std::path::Path;

/// Column names produced by the engine (ImageJ conventions)
pub mod columns {
    /// Calibrated area (mm²)
    pub const AREA: &str = "Area";
    /// Calibrated perimeter of the edge-traced outline (mm)
    pub const PERIMETER: &str = "Perim.";
    /// Circularity `4πA/P²`, capped at 1; particles of a few pixels reach the cap
    pub const CIRCULARITY: &str = "Circ.";
    /// Maximum caliper diameter (mm)
    pub const FERET: &str = "Feret";
    /// Minor/major axis ratio of the equivalent ellipse
    pub const ROUNDNESS: &str = "Round";
}

/// One image handed to the engine
#[derive(Debug, Clone, Copy)]
pub struct AnalysisRequest<'a> {
    /// Source image
    pub image: &'a Path,
    /// Physical scale used for calibrated columns
    pub calibration: Calibration,
    /// Where the annotated mask is saved
    pub annotated_output: &'a Path,
}

/// Image analysis session
///
/// Implementations hold per-image state from `analyze` until `reset`.
pub trait SegmentationEngine {
    /// Segment one image and measure its particles
    ///
    /// # Errors
    /// Returns `Error::SegmentationEngine` if the image cannot be decoded,
    /// the session still holds state from a previous image, or the annotated
    /// image cannot be written
    fn analyze(&mut self, request: &AnalysisRequest<'_>) -> Result<ResultsTable>;

    /// Release the session's mask and results
    fn reset(&mut self);
}

impl<E: SegmentationEngine + ?Sized> SegmentationEngine for &mut E {
    fn analyze(&mut self, request: &AnalysisRequest<'_>) -> Result<ResultsTable> {
        (**self).analyze(request)
    }

    fn reset(&mut self) {
        (**self).reset();
    }
}

/// Resets the wrapped session when dropped
///
/// Holds the engine for the span of one extraction so cleanup runs on every
/// exit path, including early `?` returns and panics.
pub struct SessionGuard<'a, E: SegmentationEngine + ?Sized> {
    engine: &'a mut E,
}

impl<'a, E: SegmentationEngine + ?Sized> SessionGuard<'a, E> {
    /// Start a guarded session
    pub fn new(engine: &'a mut E) -> Self {
        Self { engine }
    }

    /// Run the engine inside the guarded session
    ///
    /// # Errors
    /// Propagates engine errors; the session is still reset on drop
    pub fn analyze(&mut self, request: &AnalysisRequest<'_>) -> Result<ResultsTable> {
        self.engine.analyze(request)
    }
}

impl<E: SegmentationEngine + ?Sized> Drop for SessionGuard<'_, E> {
    fn drop(&mut self) {
        self.engine.reset();
        tracing::trace!("segmentation session reset");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use std::path::PathBuf;

    #[derive(Default)]
    struct CountingEngine {
        resets: usize,
        fail: bool,
    }

    impl SegmentationEngine for CountingEngine {
        fn analyze(&mut self, _request: &AnalysisRequest<'_>) -> Result<ResultsTable> {
            if self.fail {
                return Err(Error::SegmentationEngine("boom".to_string()));
            }
            Ok(ResultsTable::new())
        }

        fn reset(&mut self) {
            self.resets += 1;
        }
    }

    fn request(path: &Path) -> AnalysisRequest<'_> {
        AnalysisRequest {
            image: path,
            calibration: Calibration::default(),
            annotated_output: path,
        }
    }

    #[test]
    fn test_guard_resets_on_success() {
        let mut engine = CountingEngine::default();
        let path = PathBuf::from("x.png");
        {
            let mut session = SessionGuard::new(&mut engine);
            session.analyze(&request(&path)).unwrap();
        }
        assert_eq!(engine.resets, 1);
    }

    #[test]
    fn test_guard_resets_on_failure() {
        let mut engine = CountingEngine {
            fail: true,
            ..CountingEngine::default()
        };
        let path = PathBuf::from("x.png");
        let result = {
            let mut session = SessionGuard::new(&mut engine);
            session.analyze(&request(&path))
        };
        assert!(result.is_err());
        assert_eq!(engine.resets, 1);
    }
}
