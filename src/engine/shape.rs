//! Per-particle shape descriptors
//!
//! All measures are in pixel units; the engine applies calibration.
//! - Feret: max distance between convex-hull vertices of the pixel corners
//! - Perimeter: outer outline traced along pixel edges, with ImageJ's
//!   `2 - √2` allowance per non-adjacent corner
//! - Roundness: minor/major ratio of the ellipse with the same second moments

use image::{GrayImage, Luma};
use imageproc::geometry::convex_hull;
use imageproc::point::Point;
use std::collections::HashMap;
use std::f64::consts::{PI, SQRT_2};

/// Pixel position inside an image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PixelCoord {
    /// Column
    pub x: u32,
    /// Row
    pub y: u32,
}

/// Uniform-density pixel variance along one axis (a unit square has variance 1/12)
const PIXEL_VARIANCE: f64 = 1.0 / 12.0;

/// Shape descriptors of one particle, in pixel units
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParticleShape {
    /// Pixel count
    pub area_px: usize,
    /// Traced outer outline length
    pub perimeter_px: f64,
    /// Maximum caliper diameter
    pub feret_px: f64,
    /// `4πA/P²`, capped at 1
    pub circularity: f64,
    /// Minor/major axis ratio in (0, 1]
    pub roundness: f64,
    /// Inclusive bounding box `(min_x, min_y, max_x, max_y)`
    pub bounds: (u32, u32, u32, u32),
}

impl ParticleShape {
    /// Measure a particle from its pixels
    ///
    /// Returns `None` for an empty pixel list.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn measure(pixels: &[PixelCoord]) -> Option<Self> {
        let first = pixels.first()?;
        let mut bounds = (first.x, first.y, first.x, first.y);
        for p in pixels {
            bounds.0 = bounds.0.min(p.x);
            bounds.1 = bounds.1.min(p.y);
            bounds.2 = bounds.2.max(p.x);
            bounds.3 = bounds.3.max(p.y);
        }

        let crop = crop_mask(pixels, bounds);
        let area_px = pixels.len();
        let perimeter_px = traced_perimeter(&traced_outline(&crop));
        let feret_px = feret_diameter(&crop);

        let circularity = if perimeter_px > 0.0 {
            (4.0 * PI * area_px as f64 / (perimeter_px * perimeter_px)).min(1.0)
        } else {
            1.0
        };

        Some(Self {
            area_px,
            perimeter_px,
            feret_px,
            circularity,
            roundness: roundness(pixels),
            bounds,
        })
    }
}

/// Binary crop of the particle with a one-pixel empty border
fn crop_mask(pixels: &[PixelCoord], bounds: (u32, u32, u32, u32)) -> GrayImage {
    let (min_x, min_y, max_x, max_y) = bounds;
    let mut crop = GrayImage::new(max_x - min_x + 3, max_y - min_y + 3);
    for p in pixels {
        crop.put_pixel(p.x - min_x + 1, p.y - min_y + 1, Luma([255]));
    }
    crop
}

fn is_set(mask: &GrayImage, x: i64, y: i64) -> bool {
    if x < 0 || y < 0 || x >= i64::from(mask.width()) || y >= i64::from(mask.height()) {
        return false;
    }
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let value = mask.get_pixel(x as u32, y as u32)[0];
    value > 0
}

/// Unit step on the pixel-edge lattice
type Step = (i32, i32);

/// Outer outline along pixel edges, as the lattice points where it turns
///
/// Clockwise with the particle on the right. At a diagonal junction the left
/// turn is taken, so 8-connected pixels share one outline.
fn traced_outline(crop: &GrayImage) -> Vec<(i32, i32)> {
    let mut outgoing: HashMap<(i32, i32), Vec<Step>> = HashMap::new();
    let mut start = None;
    for (x, y, pixel) in crop.enumerate_pixels() {
        if pixel[0] == 0 {
            continue;
        }
        let (xi, yi) = (i64::from(x), i64::from(y));
        #[allow(clippy::cast_possible_wrap)]
        let (cx, cy) = (x as i32, y as i32);
        if !is_set(crop, xi, yi - 1) {
            outgoing.entry((cx, cy)).or_default().push((1, 0));
            start.get_or_insert(((cx, cy), (1, 0)));
        }
        if !is_set(crop, xi + 1, yi) {
            outgoing.entry((cx + 1, cy)).or_default().push((0, 1));
        }
        if !is_set(crop, xi, yi + 1) {
            outgoing.entry((cx + 1, cy + 1)).or_default().push((-1, 0));
        }
        if !is_set(crop, xi - 1, yi) {
            outgoing.entry((cx, cy + 1)).or_default().push((0, -1));
        }
    }

    let Some((origin, mut heading)) = start else {
        return Vec::new();
    };
    let edge_count: usize = outgoing.values().map(Vec::len).sum();

    let mut outline = Vec::new();
    let mut at = origin;
    for _ in 0..edge_count {
        let next = (at.0 + heading.0, at.1 + heading.1);
        let Some(options) = outgoing.get(&next) else {
            break;
        };
        let left = (heading.1, -heading.0);
        let turn = if options.contains(&left) {
            left
        } else {
            options[0]
        };
        if turn != heading {
            outline.push(next);
        }
        at = next;
        heading = turn;
        if at == origin {
            break;
        }
    }
    outline
}

/// ImageJ traced perimeter: edge length minus `2 - √2` for each corner not
/// directly following a counted corner across a one-pixel side
fn traced_perimeter(outline: &[(i32, i32)]) -> f64 {
    let n = outline.len();
    if n < 2 {
        return 0.0;
    }
    let side = |from: usize, to: usize| {
        (outline[to].0 - outline[from].0).abs() + (outline[to].1 - outline[from].1).abs()
    };

    let (mut length, mut corners) = (0i32, 0i32);
    let mut corner = false;
    let mut incoming = side(n - 1, 0);
    for i in 0..n {
        length += incoming;
        if incoming > 1 || !corner {
            corner = true;
            corners += 1;
        } else {
            corner = false;
        }
        incoming = side(i, (i + 1) % n);
    }
    f64::from(length) - f64::from(corners) * (2.0 - SQRT_2)
}

fn distance(a: Point<i32>, b: Point<i32>) -> f64 {
    let dx = f64::from(b.x - a.x);
    let dy = f64::from(b.y - a.y);
    dx.hypot(dy)
}

fn feret_diameter(crop: &GrayImage) -> f64 {
    let mut corners: Vec<Point<i32>> = Vec::new();
    for (x, y, pixel) in crop.enumerate_pixels() {
        if pixel[0] == 0 {
            continue;
        }
        let (xi, yi) = (i64::from(x), i64::from(y));
        let boundary = !(is_set(crop, xi - 1, yi)
            && is_set(crop, xi + 1, yi)
            && is_set(crop, xi, yi - 1)
            && is_set(crop, xi, yi + 1));
        if boundary {
            #[allow(clippy::cast_possible_wrap)]
            let (cx, cy) = (x as i32, y as i32);
            corners.extend([
                Point::new(cx, cy),
                Point::new(cx + 1, cy),
                Point::new(cx, cy + 1),
                Point::new(cx + 1, cy + 1),
            ]);
        }
    }

    let hull = convex_hull(&corners[..]);
    let mut best = 0.0f64;
    for (i, a) in hull.iter().enumerate() {
        for b in &hull[i + 1..] {
            best = best.max(distance(*a, *b));
        }
    }
    best
}

#[allow(clippy::cast_precision_loss)]
fn roundness(pixels: &[PixelCoord]) -> f64 {
    let n = pixels.len() as f64;
    let mean_x = pixels.iter().map(|p| f64::from(p.x)).sum::<f64>() / n;
    let mean_y = pixels.iter().map(|p| f64::from(p.y)).sum::<f64>() / n;

    let (mut mu20, mut mu02, mut mu11) = (0.0, 0.0, 0.0);
    for p in pixels {
        let dx = f64::from(p.x) - mean_x;
        let dy = f64::from(p.y) - mean_y;
        mu20 += dx * dx;
        mu02 += dy * dy;
        mu11 += dx * dy;
    }
    mu20 = mu20 / n + PIXEL_VARIANCE;
    mu02 = mu02 / n + PIXEL_VARIANCE;
    mu11 /= n;

    let half_sum = (mu20 + mu02) / 2.0;
    let root = ((mu20 - mu02) / 2.0).hypot(mu11);
    let major = half_sum + root;
    let minor = (half_sum - root).max(0.0);
    (minor / major).sqrt()
}
