//! Size distribution charts (PNG)
//!
//! Histogram: four equal-width bins over `[min, max]`, x ticks at the bin
//! edges plus the size threshold. Boxplot: plotters' [`Quartiles`] with
//! whiskers at the 1.5 IQR fences and values beyond them drawn as dots.

use crate::{Error, Result};
use plotters::prelude::*;
use std::path::Path;

/// Histogram bin count
pub const HISTOGRAM_BINS: usize = 4;

const CHART_TITLE: &str = "Collembolan (F. candida) body length distribution";
const CHART_SIZE: (u32, u32) = (1200, 800);

/// One histogram bin `[start, end)`; the last bin includes `max`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HistogramBin {
    /// Lower edge
    pub start: f64,
    /// Upper edge
    pub end: f64,
    /// Values in the bin
    pub count: usize,
}

/// X tick positions: `min + i·(max−min)/4` for i in 0..4, the threshold and `max`, sorted
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn histogram_ticks(min: f64, max: f64, threshold: f64) -> Vec<f64> {
    let step = (max - min) / HISTOGRAM_BINS as f64;
    let mut ticks: Vec<f64> = if step > 0.0 {
        (0..HISTOGRAM_BINS).map(|i| min + i as f64 * step).collect()
    } else {
        vec![min]
    };
    ticks.push(threshold);
    ticks.push(max);
    ticks.sort_by(f64::total_cmp);
    ticks
}

/// Equal-width bins over `[min, max]`
///
/// A zero-width range puts every value in the first bin.
#[must_use]
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
pub fn histogram_bins(values: &[f64], bins: usize) -> Vec<HistogramBin> {
    let Some((min, max)) = value_range(values) else {
        return Vec::new();
    };
    let bins = bins.max(1);
    let width = (max - min) / bins as f64;

    let mut counts = vec![0usize; bins];
    for &value in values {
        let idx = if width > 0.0 {
            (((value - min) / width).floor() as usize).min(bins - 1)
        } else {
            0
        };
        counts[idx] += 1;
    }

    counts
        .into_iter()
        .enumerate()
        .map(|(i, count)| HistogramBin {
            start: min + i as f64 * width,
            end: min + (i + 1) as f64 * width,
            count,
        })
        .collect()
}

/// Values beyond the 1.5 IQR fences of `quartiles`
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn outliers(values: &[f64], quartiles: &Quartiles) -> Vec<f64> {
    let [lower, _, _, _, upper] = quartiles.values();
    values
        .iter()
        .copied()
        .filter(|&v| (v as f32) < lower || (v as f32) > upper)
        .collect()
}

fn value_range(values: &[f64]) -> Option<(f64, f64)> {
    let first = *values.first()?;
    Some(
        values
            .iter()
            .fold((first, first), |(lo, hi), &v| (lo.min(v), hi.max(v))),
    )
}

/// Widen a zero-width axis so it can be drawn
fn padded(lo: f64, hi: f64) -> (f64, f64) {
    let span = hi - lo;
    if span > 0.0 {
        (lo - span * 0.05, hi + span * 0.05)
    } else {
        (lo - 1.0, hi + 1.0)
    }
}

/// Render the size histogram
///
/// # Errors
/// Returns `Error::Chart` if the PNG cannot be drawn or saved
pub fn render_histogram(path: &Path, values: &[f64], threshold: f64) -> Result<()> {
    draw_histogram(path, values, threshold)
        .map_err(|e| Error::Chart(format!("{}: {e}", path.display())))
}

/// Render the size boxplot
///
/// # Errors
/// Returns `Error::Chart` if the PNG cannot be drawn or saved
pub fn render_boxplot(path: &Path, values: &[f64]) -> Result<()> {
    draw_boxplot(path, values).map_err(|e| Error::Chart(format!("{}: {e}", path.display())))
}

#[allow(clippy::cast_precision_loss)]
fn draw_histogram(
    path: &Path,
    values: &[f64],
    threshold: f64,
) -> std::result::Result<(), Box<dyn std::error::Error>> {
    let (min, max) = value_range(values).ok_or("no values to plot")?;
    let ticks = histogram_ticks(min, max, threshold);
    let bins = histogram_bins(values, HISTOGRAM_BINS);
    let (x_lo, x_hi) = padded(min.min(threshold), max.max(threshold));
    let y_max = values.len() as f64;

    let root = BitMapBackend::new(path, CHART_SIZE).into_drawing_area();
    root.fill(&WHITE)?;
    let mut chart = ChartBuilder::on(&root)
        .caption(CHART_TITLE, ("sans-serif", 22))
        .margin(15)
        .x_label_area_size(50)
        .y_label_area_size(60)
        .build_cartesian_2d(x_lo..x_hi, 0.0..y_max)?;

    chart
        .configure_mesh()
        .disable_x_mesh()
        .x_labels(0)
        .x_desc("size interval")
        .y_desc("frequency")
        .draw()?;

    // Ticks sit at the bin edges and the threshold, below the x axis
    let tick_font = ("sans-serif", 12).into_font();
    for &tick in &ticks {
        let (x, y) = chart.backend_coord(&(tick, 0.0));
        root.draw(&PathElement::new(vec![(x, y), (x, y + 6)], BLACK.stroke_width(1)))?;
        root.draw(&Text::new(format!("{tick:.2}"), (x - 14, y + 9), tick_font.clone()))?;
    }

    for bin in &bins {
        // Zero-width range: draw the single bin one unit wide
        let end = if bin.end > bin.start { bin.end } else { bin.start + 1.0 };
        chart.draw_series(std::iter::once(Rectangle::new(
            [(bin.start, 0.0), (end, bin.count as f64)],
            BLUE.mix(0.6).filled(),
        )))?;
        chart.draw_series(std::iter::once(Rectangle::new(
            [(bin.start, 0.0), (end, bin.count as f64)],
            BLACK.stroke_width(1),
        )))?;
    }

    chart.draw_series(std::iter::once(PathElement::new(
        vec![(threshold, 0.0), (threshold, y_max)],
        RED.stroke_width(2),
    )))?;

    root.present()?;
    Ok(())
}

#[allow(clippy::cast_possible_truncation)]
fn draw_boxplot(path: &Path, values: &[f64]) -> std::result::Result<(), Box<dyn std::error::Error>> {
    let (min, max) = value_range(values).ok_or("no values to plot")?;
    let quartiles = Quartiles::new(values);
    let [lower_fence, _, _, _, upper_fence] = quartiles.values();
    let (y_lo, y_hi) = padded(
        min.min(f64::from(lower_fence)),
        max.max(f64::from(upper_fence)),
    );

    let root = BitMapBackend::new(path, CHART_SIZE).into_drawing_area();
    root.fill(&WHITE)?;
    let mut chart = ChartBuilder::on(&root)
        .caption(CHART_TITLE, ("sans-serif", 22))
        .margin(15)
        .x_label_area_size(40)
        .y_label_area_size(60)
        .build_cartesian_2d(0.0..2.0, y_lo as f32..y_hi as f32)?;

    chart
        .configure_mesh()
        .disable_x_mesh()
        .x_labels(0)
        .x_desc("F. candida")
        .y_desc("size [μm]")
        .draw()?;

    let center = 1.0;
    chart.draw_series(std::iter::once(
        Boxplot::new_vertical(center, &quartiles)
            .width(240)
            .whisker_width(0.5)
            .style(BLACK.stroke_width(2)),
    ))?;
    chart.draw_series(
        outliers(values, &quartiles)
            .into_iter()
            .map(|v| Circle::new((center, v as f32), 4, BLACK.stroke_width(1))),
    )?;

    root.present()?;
    Ok(())
}
