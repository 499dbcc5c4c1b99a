//! `imageproc`-backed segmentation engine
//!
//! Pipeline per image (ImageJ "Analyze Particles" semantics):
//! 1. Otsu threshold on the 8-bit grayscale image
//! 2. Dilate once (3x3, L∞)
//! 3. Fill holes: background regions not reaching the border become foreground
//! 4. Label 8-connected particles in raster order, excluding edge particles
//! 5. Measure, calibrate, and save the enumerated mask (each box labelled
//!    with the particle's animal ID)

use super::columns;
use super::shape::{ParticleShape, PixelCoord};
use super::{AnalysisRequest, ResultsTable, SegmentationEngine};
use crate::config::{Background, SegmentationOptions};
use crate::{Error, Result};
use image::{GrayImage, Luma, Rgb, RgbImage};
use font8x8::{UnicodeFonts, BASIC_FONTS};
use imageproc::contrast::{otsu_level, threshold, ThresholdType};
use imageproc::distance_transform::Norm;
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::morphology::dilate;
use imageproc::rect::Rect;
use imageproc::region_labelling::{connected_components, Connectivity};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use tracing::debug;

const FOREGROUND: u8 = 255;
const ANNOTATION_COLOR: Rgb<u8> = Rgb([255, 0, 0]);
const GLYPH_SIZE: u32 = 8;

/// Segmentation session backed by `image` + `imageproc`
#[derive(Debug, Default)]
pub struct ImageprocEngine {
    options: SegmentationOptions,
    mask: Option<GrayImage>,
    results: Option<ResultsTable>,
}

/// Pixels of one labelled region, in raster order of first appearance
struct Region {
    pixels: Vec<PixelCoord>,
    touches_edge: bool,
}

impl ImageprocEngine {
    /// Create a session with the given particle analysis options
    #[must_use]
    pub fn new(options: SegmentationOptions) -> Self {
        Self {
            options,
            mask: None,
            results: None,
        }
    }

    /// True when the session holds no per-image state
    #[must_use]
    pub const fn is_clean(&self) -> bool {
        self.mask.is_none() && self.results.is_none()
    }

    fn segment(&self, gray: &GrayImage) -> GrayImage {
        let level = otsu_level(gray);
        debug!(level, background = ?self.options.background, "otsu threshold");

        let threshold_type = match self.options.background {
            Background::Dark => ThresholdType::Binary,
            Background::Light => ThresholdType::BinaryInverted,
        };
        let thresholded = threshold(gray, level, threshold_type);

        fill_holes(&dilate(&thresholded, Norm::LInf, 1))
    }

    fn measure_particles(&self, mask: &GrayImage) -> (ResultsTable, Vec<ParticleShape>) {
        let regions = label_regions(mask);
        let mut table = ResultsTable::new();
        let mut shapes = Vec::new();
        let mut excluded = 0usize;

        for region in regions {
            if self.options.exclude_edge_particles && region.touches_edge {
                excluded += 1;
                continue;
            }
            if region.pixels.len() < self.options.min_particle_area_px as usize {
                excluded += 1;
                continue;
            }
            if let Some(shape) = ParticleShape::measure(&region.pixels) {
                shapes.push(shape);
            }
        }
        debug!(measured = shapes.len(), excluded, "particle analysis");

        for shape in &shapes {
            #[allow(clippy::cast_precision_loss)]
            let area_px = shape.area_px as f64;
            table.push(columns::AREA, area_px);
            table.push(columns::PERIMETER, shape.perimeter_px);
            table.push(columns::CIRCULARITY, shape.circularity);
            table.push(columns::FERET, shape.feret_px);
            table.push(columns::ROUNDNESS, shape.roundness);
        }

        (table, shapes)
    }
}

impl SegmentationEngine for ImageprocEngine {
    fn analyze(&mut self, request: &AnalysisRequest<'_>) -> Result<ResultsTable> {
        if !self.is_clean() {
            return Err(Error::SegmentationEngine(
                "session still holds the previous image; reset() before analyzing".to_string(),
            ));
        }

        let image = image::open(request.image).map_err(|e| {
            Error::SegmentationEngine(format!(
                "failed to open {}: {e}",
                request.image.display()
            ))
        })?;

        let mask = self.segment(&image.to_luma8());
        let (mut table, shapes) = self.measure_particles(&mask);

        let mm = request.calibration.mm_per_pixel();
        calibrate(&mut table, columns::AREA, mm * mm);
        calibrate(&mut table, columns::PERIMETER, mm);
        calibrate(&mut table, columns::FERET, mm);

        let annotated = annotate(&mask, &shapes);
        self.mask = Some(mask);
        self.results = Some(table.clone());

        save_annotated(&annotated, request.annotated_output)?;
        Ok(table)
    }

    fn reset(&mut self) {
        self.mask = None;
        self.results = None;
    }
}

fn calibrate(table: &mut ResultsTable, column: &str, factor: f64) {
    if let Some(values) = table.column(column) {
        let scaled = values.iter().map(|v| v * factor).collect();
        table.set_column(column, scaled);
    }
}

/// Fill background regions enclosed by foreground
fn fill_holes(mask: &GrayImage) -> GrayImage {
    let (width, height) = mask.dimensions();
    let inverted = GrayImage::from_fn(width, height, |x, y| {
        Luma([if mask.get_pixel(x, y)[0] == 0 { FOREGROUND } else { 0 }])
    });
    let labels = connected_components(&inverted, Connectivity::Four, Luma([0u8]));

    let mut open: HashSet<u32> = HashSet::new();
    for (x, y, label) in labels.enumerate_pixels() {
        let on_border = x == 0 || y == 0 || x + 1 == width || y + 1 == height;
        if on_border && label[0] != 0 {
            open.insert(label[0]);
        }
    }

    let mut filled = mask.clone();
    for (x, y, label) in labels.enumerate_pixels() {
        if label[0] != 0 && !open.contains(&label[0]) {
            filled.put_pixel(x, y, Luma([FOREGROUND]));
        }
    }
    filled
}

fn label_regions(mask: &GrayImage) -> Vec<Region> {
    let (width, height) = mask.dimensions();
    let labels = connected_components(mask, Connectivity::Eight, Luma([0u8]));

    let mut order: HashMap<u32, usize> = HashMap::new();
    let mut regions: Vec<Region> = Vec::new();
    for (x, y, label) in labels.enumerate_pixels() {
        let label = label[0];
        if label == 0 {
            continue;
        }
        let index = *order.entry(label).or_insert_with(|| {
            regions.push(Region {
                pixels: Vec::new(),
                touches_edge: false,
            });
            regions.len() - 1
        });
        let region = &mut regions[index];
        region.pixels.push(PixelCoord { x, y });
        if x == 0 || y == 0 || x + 1 == width || y + 1 == height {
            region.touches_edge = true;
        }
    }
    regions
}

/// Inverted mask (particles black on white), each measured particle boxed
/// and numbered with its 1-based animal ID
fn annotate(mask: &GrayImage, shapes: &[ParticleShape]) -> RgbImage {
    let mut canvas = RgbImage::from_fn(mask.width(), mask.height(), |x, y| {
        let v = 255 - mask.get_pixel(x, y)[0];
        Rgb([v, v, v])
    });
    for (index, shape) in shapes.iter().enumerate() {
        let (min_x, min_y, max_x, max_y) = shape.bounds;
        #[allow(clippy::cast_possible_wrap)]
        let rect = Rect::at(min_x as i32, min_y as i32).of_size(max_x - min_x + 1, max_y - min_y + 1);
        draw_hollow_rect_mut(&mut canvas, rect, ANNOTATION_COLOR);

        // Above the box, or below it when there is no room
        let label_y = if min_y >= GLYPH_SIZE + 1 {
            min_y - GLYPH_SIZE - 1
        } else {
            max_y + 2
        };
        draw_number(&mut canvas, min_x, label_y, index + 1);
    }
    canvas
}

/// Draw `number` with 8x8 bitmap glyphs; pixels outside the canvas are skipped
fn draw_number(canvas: &mut RgbImage, x: u32, y: u32, number: usize) {
    for (position, digit) in number.to_string().chars().enumerate() {
        let Some(glyph) = BASIC_FONTS.get(digit) else {
            continue;
        };
        #[allow(clippy::cast_possible_truncation)]
        let origin_x = x + position as u32 * GLYPH_SIZE;
        for (row, bits) in (0u32..).zip(glyph) {
            for col in 0..GLYPH_SIZE {
                let (px, py) = (origin_x + col, y + row);
                if bits & (1 << col) != 0 && px < canvas.width() && py < canvas.height() {
                    canvas.put_pixel(px, py, ANNOTATION_COLOR);
                }
            }
        }
    }
}

fn save_annotated(canvas: &RgbImage, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    canvas.save(path).map_err(|e| {
        Error::SegmentationEngine(format!(
            "failed to save annotated image {}: {e}",
            path.display()
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Calibration;
    use imageproc::drawing::draw_filled_rect_mut;
    use tempfile::TempDir;

    fn blank(width: u32, height: u32) -> GrayImage {
        GrayImage::from_pixel(width, height, Luma([10]))
    }

    fn fill(image: &mut GrayImage, x: i32, y: i32, w: u32, h: u32) {
        draw_filled_rect_mut(image, Rect::at(x, y).of_size(w, h), Luma([220]));
    }

    #[test]
    fn test_fill_holes_closes_ring() {
        let mut mask = GrayImage::new(12, 12);
        for y in 2..10 {
            for x in 2..10 {
                let border = x == 2 || x == 9 || y == 2 || y == 9;
                if border {
                    mask.put_pixel(x, y, Luma([FOREGROUND]));
                }
            }
        }
        let filled = fill_holes(&mask);
        assert_eq!(filled.get_pixel(5, 5)[0], FOREGROUND);
        assert_eq!(filled.get_pixel(0, 0)[0], 0);
    }

    #[test]
    fn test_label_regions_raster_order() {
        let mut mask = GrayImage::new(20, 20);
        // Second region appears first in raster order
        draw_filled_rect_mut(&mut mask, Rect::at(12, 2).of_size(3, 3), Luma([FOREGROUND]));
        draw_filled_rect_mut(&mut mask, Rect::at(2, 10).of_size(4, 4), Luma([FOREGROUND]));

        let regions = label_regions(&mask);
        assert_eq!(regions.len(), 2);
        assert_eq!(regions[0].pixels.len(), 9);
        assert_eq!(regions[1].pixels.len(), 16);
        assert!(!regions[0].touches_edge);
    }

    fn red_pixels(canvas: &RgbImage, xs: std::ops::Range<u32>, ys: std::ops::Range<u32>) -> usize {
        ys.flat_map(|y| xs.clone().map(move |x| (x, y)))
            .filter(|&(x, y)| *canvas.get_pixel(x, y) == ANNOTATION_COLOR)
            .count()
    }

    fn shapes_of(mask: &GrayImage) -> Vec<ParticleShape> {
        label_regions(mask)
            .iter()
            .filter_map(|region| ParticleShape::measure(&region.pixels))
            .collect()
    }

    #[test]
    fn test_annotation_numbers_particles() {
        let mut mask = GrayImage::new(60, 40);
        draw_filled_rect_mut(&mut mask, Rect::at(10, 20).of_size(6, 6), Luma([FOREGROUND]));
        draw_filled_rect_mut(&mut mask, Rect::at(40, 2).of_size(6, 6), Luma([FOREGROUND]));

        let canvas = annotate(&mask, &shapes_of(&mask));

        // Particle 1 (raster order) sits at the top edge, so its label goes below the box
        assert!(red_pixels(&canvas, 40..48, 9..17) > 0);
        // Particle 2 is labelled above its box at y = 20
        assert!(red_pixels(&canvas, 10..18, 11..19) > 0);
        // Nothing drawn in an empty corner
        assert_eq!(red_pixels(&canvas, 0..8, 30..40), 0);
    }

    #[test]
    fn test_draw_number_clips_at_canvas_edge() {
        let mut canvas = RgbImage::new(20, 20);
        draw_number(&mut canvas, 14, 15, 123);
        assert!(red_pixels(&canvas, 14..20, 15..20) > 0);
    }

    #[test]
    fn test_analyze_measures_and_excludes_edges() {
        let dir = TempDir::new().unwrap();
        let mut image = blank(100, 60);
        fill(&mut image, 10, 10, 20, 10);
        fill(&mut image, 50, 30, 8, 8);
        fill(&mut image, 0, 45, 6, 6); // touches the border
        let path = dir.path().join("sample.png");
        image.save(&path).unwrap();

        let annotated = dir.path().join("analyzed/sample-analyzed.png");
        let mut engine = ImageprocEngine::new(SegmentationOptions::default());
        let table = engine
            .analyze(&AnalysisRequest {
                image: &path,
                calibration: Calibration::new(1.0, 1.0).unwrap(),
                annotated_output: &annotated,
            })
            .unwrap();

        assert_eq!(table.row_count(), 2);
        // Dilation grows 20x10 to 22x12
        let area = table.column(columns::AREA).unwrap();
        assert!((area[0] - 264.0).abs() < 1e-9);
        let feret = table.column(columns::FERET).unwrap();
        assert!((feret[0] - (22.0f64.powi(2) + 12.0f64.powi(2)).sqrt()).abs() < 1e-9);
        assert!(annotated.exists());
    }

    #[test]
    fn test_dirty_session_refuses_next_image() {
        let dir = TempDir::new().unwrap();
        let mut image = blank(40, 40);
        fill(&mut image, 10, 10, 6, 6);
        let path = dir.path().join("a.png");
        image.save(&path).unwrap();
        let annotated = dir.path().join("a-analyzed.png");

        let mut engine = ImageprocEngine::new(SegmentationOptions::default());
        let request = AnalysisRequest {
            image: &path,
            calibration: Calibration::default(),
            annotated_output: &annotated,
        };
        engine.analyze(&request).unwrap();
        assert!(!engine.is_clean());

        let second = engine.analyze(&request);
        assert!(matches!(second, Err(Error::SegmentationEngine(_))));

        engine.reset();
        assert!(engine.is_clean());
        assert!(engine.analyze(&request).is_ok());
    }

    #[test]
    fn test_calibration_scales_lengths() {
        let dir = TempDir::new().unwrap();
        let mut image = blank(50, 50);
        fill(&mut image, 10, 10, 8, 8);
        let path = dir.path().join("c.png");
        image.save(&path).unwrap();
        let annotated = dir.path().join("c-analyzed.png");

        let mut engine = ImageprocEngine::new(SegmentationOptions::default());
        let table = engine
            .analyze(&AnalysisRequest {
                image: &path,
                calibration: Calibration::new(10.0, 1.0).unwrap(),
                annotated_output: &annotated,
            })
            .unwrap();

        // 10x10 after dilation, 0.1 mm per pixel
        let area = table.column(columns::AREA).unwrap()[0];
        assert!((area - 1.0).abs() < 1e-9);
        let feret = table.column(columns::FERET).unwrap()[0];
        assert!((feret - 200.0f64.sqrt() * 0.1).abs() < 1e-9);
    }

    #[test]
    fn test_missing_file_is_engine_error() {
        let mut engine = ImageprocEngine::default();
        let missing = Path::new("/nonexistent/nothing.png");
        let result = engine.analyze(&AnalysisRequest {
            image: missing,
            calibration: Calibration::default(),
            annotated_output: missing,
        });
        assert!(matches!(result, Err(Error::SegmentationEngine(_))));
        assert!(engine.is_clean());
    }
}
