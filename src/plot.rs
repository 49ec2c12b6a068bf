//! Scatter plot rendering with a least-squares trend line.
//!
//! Charts are drawn into an in-memory RGB buffer with `plotters`, encoded as
//! PNG and finally as standard base64 so they can travel inside JSON and be
//! embedded in a `data:` URI.

use std::io::Cursor;
use std::ops::Range;

use base64::{engine::general_purpose::STANDARD, Engine};
use image::{ImageFormat, RgbImage};
use once_cell::sync::Lazy;
use plotters::coord::ranged1d::Ranged;
use plotters::coord::types::RangedCoordf64;
use plotters::drawing::DrawingAreaErrorKind;
use plotters::prelude::*;
use plotters::style::{register_font, FontStyle};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::data::DataPoint;

pub const DEFAULT_TITLE: &str = "Agent Visualization: Performance Metrics (X vs. Y)";
pub const DEFAULT_X_LABEL: &str = "Metric X (Input/Time)";
pub const DEFAULT_Y_LABEL: &str = "Metric Y (Output/Value)";
pub const PNG_MIME_TYPE: &str = "image/png";

const FONT_FAMILY: &str = "sans-serif";
const FONT_REGULAR: &[u8] = include_bytes!("../assets/fonts/DejaVuSans.ttf");
const FONT_BOLD: &[u8] = include_bytes!("../assets/fonts/DejaVuSans-Bold.ttf");

const POINT_FILL: RGBColor = RGBColor(0x4A, 0x90, 0xE2);
const POINT_EDGE: RGBColor = RGBColor(0x1F, 0x54, 0x8F);
const GRID: RGBColor = RGBColor(0xB0, 0xB0, 0xB0);
const POINT_RADIUS: i32 = 7;
const GRID_LINES: usize = 10;

static FONTS_REGISTERED: Lazy<bool> = Lazy::new(|| {
    register_font(FONT_FAMILY, FontStyle::Normal, FONT_REGULAR).is_ok()
        && register_font(FONT_FAMILY, FontStyle::Bold, FONT_BOLD).is_ok()
});

#[derive(Debug, Error)]
pub enum PlotError {
    #[error("cannot plot an empty data set")]
    EmptyData,
    #[error("data point {index} has a non-finite coordinate")]
    NonFinite { index: usize },
    #[error("{axis} values span a range too large to plot")]
    Range { axis: &'static str },
    #[error("embedded font could not be loaded")]
    Font,
    #[error("failed to draw chart: {0}")]
    Render(String),
    #[error("failed to encode png: {0}")]
    Encode(#[from] image::ImageError),
}

impl<E> From<DrawingAreaErrorKind<E>> for PlotError
where
    E: std::error::Error + Send + Sync,
{
    fn from(error: DrawingAreaErrorKind<E>) -> Self {
        PlotError::Render(error.to_string())
    }
}

/// A degree-one least-squares fit `y = slope * x + intercept`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Trendline {
    pub slope: f64,
    pub intercept: f64,
}

impl Trendline {
    /// Returns `None` for fewer than two points or when every `x` is equal.
    pub fn fit(points: &[DataPoint]) -> Option<Self> {
        if points.len() < 2 {
            return None;
        }

        let n = points.len() as f64;
        let mean_x = points.iter().map(|p| p.x).sum::<f64>() / n;
        let mean_y = points.iter().map(|p| p.y).sum::<f64>() / n;

        let (sxy, sxx) = points.iter().fold((0.0, 0.0), |(sxy, sxx), p| {
            let dx = p.x - mean_x;
            (sxy + dx * (p.y - mean_y), sxx + dx * dx)
        });

        if sxx == 0.0 || !sxx.is_finite() {
            return None;
        }

        let slope = sxy / sxx;
        let intercept = mean_y - slope * mean_x;
        if !slope.is_finite() || !intercept.is_finite() {
            return None;
        }

        Some(Self { slope, intercept })
    }

    pub fn at(&self, x: f64) -> f64 {
        self.slope * x + self.intercept
    }

    pub fn label(&self) -> String {
        format!("Trend: Y = {:.2}X + {:.2}", self.slope, self.intercept)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlotOptions {
    pub width: u32,
    pub height: u32,
    pub title: String,
    pub x_label: String,
    pub y_label: String,
}

impl Default for PlotOptions {
    fn default() -> Self {
        Self {
            width: 800,
            height: 500,
            title: DEFAULT_TITLE.to_string(),
            x_label: DEFAULT_X_LABEL.to_string(),
            y_label: DEFAULT_Y_LABEL.to_string(),
        }
    }
}

impl PlotOptions {
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }
}

pub fn render_base64(points: &[DataPoint], options: &PlotOptions) -> Result<String, PlotError> {
    let png = render_png(points, options)?;
    Ok(STANDARD.encode(png))
}

pub fn render_png(points: &[DataPoint], options: &PlotOptions) -> Result<Vec<u8>, PlotError> {
    if points.is_empty() {
        return Err(PlotError::EmptyData);
    }
    if let Some(index) = points.iter().position(|p| !p.x.is_finite() || !p.y.is_finite()) {
        return Err(PlotError::NonFinite { index });
    }
    let x_range = padded_range(points.iter().map(|p| p.x)).ok_or(PlotError::Range { axis: "x" })?;
    let y_range = padded_range(points.iter().map(|p| p.y)).ok_or(PlotError::Range { axis: "y" })?;
    if !*FONTS_REGISTERED {
        return Err(PlotError::Font);
    }

    let (width, height) = (options.width, options.height);
    let mut pixels = vec![0u8; width as usize * height as usize * 3];
    draw(&mut pixels, points, x_range, y_range, options)?;

    let image = RgbImage::from_raw(width, height, pixels)
        .ok_or_else(|| PlotError::Render("pixel buffer does not match image size".to_string()))?;
    let mut png = Vec::new();
    image.write_to(&mut Cursor::new(&mut png), ImageFormat::Png)?;
    Ok(png)
}

fn draw(
    pixels: &mut [u8],
    points: &[DataPoint],
    x_range: Range<f64>,
    y_range: Range<f64>,
    options: &PlotOptions,
) -> Result<(), PlotError> {
    let root = BitMapBackend::with_buffer(pixels, (options.width, options.height)).into_drawing_area();
    root.fill(&WHITE)?;

    let x_ticks = RangedCoordf64::from(x_range.clone()).key_points(GRID_LINES);
    let y_ticks = RangedCoordf64::from(y_range.clone()).key_points(GRID_LINES);
    let (x_span, y_span) = (x_range.clone(), y_range.clone());

    let mut chart = ChartBuilder::on(&root)
        .caption(&options.title, (FONT_FAMILY, 20, FontStyle::Bold))
        .margin(16)
        .x_label_area_size(48)
        .y_label_area_size(56)
        .build_cartesian_2d(x_range, y_range)?;

    chart
        .configure_mesh()
        .x_desc(options.x_label.as_str())
        .y_desc(options.y_label.as_str())
        .axis_desc_style((FONT_FAMILY, 15))
        .label_style((FONT_FAMILY, 12))
        .x_labels(GRID_LINES)
        .y_labels(GRID_LINES)
        .disable_x_mesh()
        .disable_y_mesh()
        .draw()?;

    // Dotted grid on the same key points the axis labels use.
    let grid = GRID.mix(0.6).stroke_width(1);
    for x in x_ticks {
        chart.draw_series(DashedLineSeries::new(
            vec![(x, y_span.start), (x, y_span.end)].into_iter(),
            2,
            4,
            grid,
        ))?;
    }
    for y in y_ticks {
        chart.draw_series(DashedLineSeries::new(
            vec![(x_span.start, y), (x_span.end, y)].into_iter(),
            2,
            4,
            grid,
        ))?;
    }

    chart
        .draw_series(
            points
                .iter()
                .map(|p| Circle::new((p.x, p.y), POINT_RADIUS, POINT_FILL.filled())),
        )?
        .label("Data Points")
        .legend(|(x, y)| Circle::new((x + 10, y), 5, POINT_FILL.filled()));

    chart.draw_series(
        points
            .iter()
            .map(|p| Circle::new((p.x, p.y), POINT_RADIUS, POINT_EDGE.stroke_width(2))),
    )?;

    let trend = Trendline::fit(points).filter(|trend| points.iter().all(|p| trend.at(p.x).is_finite()));
    if let Some(trend) = trend {
        let style = RED.mix(0.7).stroke_width(2);
        chart
            .draw_series(DashedLineSeries::new(
                points.iter().map(move |p| (p.x, trend.at(p.x))),
                10,
                6,
                style,
            ))?
            .label(trend.label())
            .legend(move |(x, y)| {
                EmptyElement::at((x, y))
                    + PathElement::new(vec![(0, 0), (8, 0)], style)
                    + PathElement::new(vec![(12, 0), (20, 0)], style)
            });
    }

    chart
        .configure_series_labels()
        .label_font((FONT_FAMILY, 13))
        .background_style(WHITE.mix(0.85))
        .border_style(BLACK.mix(0.3))
        .position(SeriesLabelPosition::UpperLeft)
        .draw()?;

    root.present()?;
    Ok(())
}

/// Span of the values widened by 10 % on each side. A single value is
/// widened by a tenth of its magnitude, at least one unit. `None` when the padded bounds leave the finite range.
fn padded_range(values: impl Iterator<Item = f64>) -> Option<Range<f64>> {
    let (min, max) = values.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
        (lo.min(v), hi.max(v))
    });
    let pad = if max > min { (max - min) * 0.1 } else { f64::max(1.0, min.abs() * 0.1) };
    let (start, end) = (min - pad, max + pad);
    (start.is_finite() && end.is_finite() && start < end).then_some(start..end)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::mock_points;

    const PNG_SIGNATURE: &[u8] = &[0x89, b'P', b'N', b'G', b'\r', b'\n', 0x1A, b'\n'];

    #[test]
    fn fits_mock_metrics() {
        let trend = Trendline::fit(&mock_points()).expect("trend");
        assert!((trend.slope - 65.0 / 28.0).abs() < 1e-9);
        assert!((trend.intercept - 57.0 / 7.0).abs() < 1e-9);
        assert_eq!(trend.label(), "Trend: Y = 2.32X + 8.14");
        assert!((trend.at(4.0) - 122.0 / 7.0).abs() < 1e-9);
    }

    #[test]
    fn fit_needs_two_distinct_x() {
        assert!(Trendline::fit(&[DataPoint::new(1.0, 2.0)]).is_none());
        assert!(Trendline::fit(&[DataPoint::new(3.0, 1.0), DataPoint::new(3.0, 5.0)]).is_none());

        let flat = Trendline::fit(&[DataPoint::new(0.0, 4.0), DataPoint::new(2.0, 4.0)]).expect("trend");
        assert_eq!(flat.slope, 0.0);
        assert_eq!(flat.intercept, 4.0);
    }

    #[test]
    fn padded_range_handles_single_value() {
        assert_eq!(padded_range([5.0].into_iter()), Some(4.0..6.0));
        let range = padded_range([0.0, 10.0].into_iter()).expect("range");
        assert!((range.start + 1.0).abs() < 1e-9 && (range.end - 11.0).abs() < 1e-9);
    }

    #[test]
    fn renders_png_with_requested_size() {
        let png = render_png(&mock_points(), &PlotOptions::default()).expect("png");
        assert!(png.starts_with(PNG_SIGNATURE));

        let decoded = image::load_from_memory_with_format(&png, ImageFormat::Png).expect("decode");
        assert_eq!((decoded.width(), decoded.height()), (800, 500));
    }

    #[test]
    fn renders_single_point_without_trend() {
        let options = PlotOptions::default().with_title("One point");
        let png = render_png(&[DataPoint::new(1.0, 1.0)], &options).expect("png");
        assert!(png.starts_with(PNG_SIGNATURE));
    }

    #[test]
    fn base64_decodes_back_to_png() {
        let encoded = render_base64(&mock_points(), &PlotOptions::default()).expect("base64");
        let bytes = STANDARD.decode(encoded).expect("valid base64");
        assert!(bytes.starts_with(PNG_SIGNATURE));
    }

    #[test]
    fn rejects_empty_and_non_finite_data() {
        assert!(matches!(render_png(&[], &PlotOptions::default()), Err(PlotError::EmptyData)));

        let points = [DataPoint::new(1.0, 2.0), DataPoint::new(f64::NAN, 3.0)];
        assert!(matches!(
            render_png(&points, &PlotOptions::default()),
            Err(PlotError::NonFinite { index: 1 })
        ));
    }

    #[test]
    fn rejects_span_that_overflows() {
        assert!(padded_range([-1e308, 1e308].into_iter()).is_none());
        assert!(padded_range([f64::MAX].into_iter()).is_none());
        let single = padded_range([1e300].into_iter()).expect("range");
        assert!(single.start < 1e300 && single.end > 1e300);

        let points = [DataPoint::new(-1e308, 1.0), DataPoint::new(1e308, 2.0)];
        assert!(matches!(
            render_png(&points, &PlotOptions::default()),
            Err(PlotError::Range { axis: "x" })
        ));

        let points = [DataPoint::new(1.0, -1e308), DataPoint::new(2.0, 1e308)];
        assert!(matches!(
            render_png(&points, &PlotOptions::default()),
            Err(PlotError::Range { axis: "y" })
        ));
    }

    #[test]
    fn fit_rejects_overflowing_coefficients() {
        let points = [DataPoint::new(0.0, -1e308), DataPoint::new(1.0, 1e308)];
        assert!(Trendline::fit(&points).is_none());
    }

    #[test]
    fn renders_wide_but_finite_span() {
        let points = [DataPoint::new(0.0, 1.0), DataPoint::new(1e300, 2.0)];
        let png = render_png(&points, &PlotOptions::default()).expect("png");
        assert!(png.starts_with(PNG_SIGNATURE));
    }
}
