use anyhow::{anyhow, Result};
use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
use std::io::Cursor;

use crate::models::{DensityGrid, DerivedBundle, Location, Segment};
use crate::services::density::{PITCH_X_RANGE, PITCH_Y_RANGE};
use crate::utils::parse_hex_color;

/// Name offered for the downloadable image.
pub const EXPORT_FILENAME: &str = "pitchview_export.png";

const SCALE: f64 = 10.0;
const MARGIN: u32 = 40;
const ARROW_HEAD_LENGTH: f64 = 14.0;
const ARROW_HEAD_ANGLE: f64 = 0.45;
const LEGEND_SWATCH: (f64, f64) = (24.0, 12.0);
const LEGEND_SPACING: f64 = 60.0;
const COLORBAR_WIDTH: f64 = 16.0;

/// Colours of one figure style.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Theme {
    pub background: &'static str,
    pub lines: &'static str,
}

pub const LIGHT_THEME: Theme = Theme {
    background: "#FFFFFF",
    lines: "#000000",
};

pub const DARK_THEME: Theme = Theme {
    background: "#22312b",
    lines: "#efefef",
};

#[derive(Debug, Clone, PartialEq)]
pub enum Layer {
    Arrows {
        label: &'static str,
        color: &'static str,
        segments: Vec<Segment>,
    },
    Heat(DensityGrid),
}

/// Everything needed to draw one view. Layers are drawn in order.
#[derive(Debug, Clone, PartialEq)]
pub struct Figure {
    pub title: String,
    pub subtitle: Option<String>,
    pub theme: Theme,
    pub layers: Vec<Layer>,
}

impl Figure {
    pub fn from_bundle(bundle: &DerivedBundle) -> Self {
        let (theme, layers) = match bundle {
            DerivedBundle::Passes(map) => (
                LIGHT_THEME,
                map.layers
                    .iter()
                    .map(|l| Layer::Arrows {
                        label: l.label,
                        color: l.color,
                        segments: l.segments.clone(),
                    })
                    .collect(),
            ),
            DerivedBundle::Shots(map) => (
                LIGHT_THEME,
                map.layers
                    .iter()
                    .map(|l| Layer::Arrows {
                        label: l.label,
                        color: l.color,
                        segments: l.segments.clone(),
                    })
                    .collect(),
            ),
            DerivedBundle::Heatmap(map) => (DARK_THEME, vec![Layer::Heat(map.grid.clone())]),
        };

        Self {
            title: bundle.title().to_string(),
            subtitle: bundle.subtitle().map(str::to_string),
            theme,
            layers,
        }
    }

    /// Canvas size in pixels.
    pub fn dimensions(&self) -> (u32, u32) {
        let width = ((PITCH_X_RANGE.1 - PITCH_X_RANGE.0) * SCALE) as u32 + 2 * MARGIN;
        let height = ((PITCH_Y_RANGE.1 - PITCH_Y_RANGE.0) * SCALE) as u32 + 2 * MARGIN;
        (width, height)
    }
}

/// Pixel position of a pitch coordinate.
pub fn to_pixel(location: Location) -> (f64, f64) {
    (
        MARGIN as f64 + (location.x - PITCH_X_RANGE.0) * SCALE,
        MARGIN as f64 + (location.y - PITCH_Y_RANGE.0) * SCALE,
    )
}

/// Corners of the `index`-th legend swatch, laid out left to right in the bottom margin.
pub fn legend_swatch(index: usize, canvas_height: u32) -> ((f64, f64), (f64, f64)) {
    let x0 = MARGIN as f64 + index as f64 * LEGEND_SPACING;
    let y0 = canvas_height as f64 - MARGIN as f64 / 2.0 - LEGEND_SWATCH.1 / 2.0;
    ((x0, y0), (x0 + LEGEND_SWATCH.0, y0 + LEGEND_SWATCH.1))
}

fn rgba(hex: &str) -> Result<Rgba<u8>> {
    let [r, g, b] = parse_hex_color(hex).ok_or_else(|| anyhow!("invalid colour '{}'", hex))?;
    Ok(Rgba([r, g, b, 255]))
}

/// matplotlib's `hot` colour map.
pub fn hot_colormap(t: f64) -> Rgba<u8> {
    let t = t.clamp(0.0, 1.0);
    let channel = |v: f64| (v.clamp(0.0, 1.0) * 255.0).round() as u8;
    Rgba([
        channel(t / 0.365),
        channel((t - 0.365) / 0.381),
        channel((t - 0.746) / 0.254),
        255,
    ])
}

struct Canvas {
    image: RgbaImage,
}

impl Canvas {
    fn new(width: u32, height: u32, background: Rgba<u8>) -> Self {
        Self {
            image: RgbaImage::from_pixel(width, height, background),
        }
    }

    fn plot(&mut self, x: i64, y: i64, color: Rgba<u8>) {
        if x >= 0 && y >= 0 && (x as u32) < self.image.width() && (y as u32) < self.image.height() {
            self.image.put_pixel(x as u32, y as u32, color);
        }
    }

    fn fill_rect(&mut self, (x0, y0): (f64, f64), (x1, y1): (f64, f64), color: Rgba<u8>) {
        for y in y0.round() as i64..y1.round() as i64 {
            for x in x0.round() as i64..x1.round() as i64 {
                self.plot(x, y, color);
            }
        }
    }

    fn line(
        &mut self,
        (x0, y0): (f64, f64),
        (x1, y1): (f64, f64),
        thickness: i64,
        color: Rgba<u8>,
    ) {
        let steps = (x1 - x0).abs().max((y1 - y0).abs()).ceil().max(1.0) as i64;
        let half = thickness / 2;
        for i in 0..=steps {
            let t = i as f64 / steps as f64;
            let x = (x0 + (x1 - x0) * t).round() as i64;
            let y = (y0 + (y1 - y0) * t).round() as i64;
            for dy in -half..=half {
                for dx in -half..=half {
                    self.plot(x + dx, y + dy, color);
                }
            }
        }
    }

    fn rect_outline(&mut self, a: Location, b: Location, color: Rgba<u8>) {
        let (x0, y0) = to_pixel(a);
        let (x1, y1) = to_pixel(b);
        self.line((x0, y0), (x1, y0), 2, color);
        self.line((x1, y0), (x1, y1), 2, color);
        self.line((x1, y1), (x0, y1), 2, color);
        self.line((x0, y1), (x0, y0), 2, color);
    }

    fn circle(&mut self, center: Location, radius: f64, color: Rgba<u8>) {
        let (cx, cy) = to_pixel(center);
        let r = radius * SCALE;
        let steps = 360;
        for i in 0..steps {
            let a0 = i as f64 / steps as f64 * std::f64::consts::TAU;
            let a1 = (i + 1) as f64 / steps as f64 * std::f64::consts::TAU;
            self.line(
                (cx + r * a0.cos(), cy + r * a0.sin()),
                (cx + r * a1.cos(), cy + r * a1.sin()),
                2,
                color,
            );
        }
    }

    fn arrow(&mut self, segment: &Segment, color: Rgba<u8>) {
        let start = to_pixel(segment.start);
        let end = to_pixel(segment.end);
        self.line(start, end, 3, color);

        let angle = (end.1 - start.1).atan2(end.0 - start.0);
        for side in [-ARROW_HEAD_ANGLE, ARROW_HEAD_ANGLE] {
            let back = angle + std::f64::consts::PI + side;
            let tip = (
                end.0 + ARROW_HEAD_LENGTH * back.cos(),
                end.1 + ARROW_HEAD_LENGTH * back.sin(),
            );
            self.line(end, tip, 3, color);
        }
    }

    fn heat(&mut self, grid: &DensityGrid) {
        let max = grid.max_density();
        let (x_bins, y_bins) = grid.bins();
        let cell_w = (grid.x_range.1 - grid.x_range.0) / x_bins as f64;
        let cell_h = (grid.y_range.1 - grid.y_range.0) / y_bins as f64;

        for row in 0..y_bins {
            for col in 0..x_bins {
                let value = grid.smoothed[(row, col)];
                let t = if max > 0.0 { value / max } else { 0.0 };
                let top_left = Location::new(
                    grid.x_range.0 + col as f64 * cell_w,
                    grid.y_range.0 + row as f64 * cell_h,
                );
                let bottom_right = Location::new(top_left.x + cell_w, top_left.y + cell_h);
                self.fill_rect(to_pixel(top_left), to_pixel(bottom_right), hot_colormap(t));
            }
        }
    }

    fn legend(&mut self, entries: &[Rgba<u8>]) {
        let height = self.image.height();
        for (index, color) in entries.iter().enumerate() {
            let (top_left, bottom_right) = legend_swatch(index, height);
            self.fill_rect(top_left, bottom_right, *color);
        }
    }

    /// Vertical `hot` scale in the right margin, full density at the top.
    fn colorbar(&mut self) {
        let (width, height) = self.image.dimensions();
        let x0 = width as f64 - MARGIN as f64 / 2.0 - COLORBAR_WIDTH / 2.0;
        let (top, bottom) = (MARGIN as i64, (height - MARGIN) as i64);
        let span = (bottom - top - 1).max(1) as f64;
        for y in top..bottom {
            let t = 1.0 - (y - top) as f64 / span;
            self.fill_rect((x0, y as f64), (x0 + COLORBAR_WIDTH, y as f64 + 1.0), hot_colormap(t));
        }
    }

    fn pitch_markings(&mut self, color: Rgba<u8>) {
        let (x0, x1) = PITCH_X_RANGE;
        let (y0, y1) = PITCH_Y_RANGE;
        let mid_x = (x0 + x1) / 2.0;
        let mid_y = (y0 + y1) / 2.0;

        self.rect_outline(Location::new(x0, y0), Location::new(x1, y1), color);
        self.line(to_pixel(Location::new(mid_x, y0)), to_pixel(Location::new(mid_x, y1)), 2, color);
        self.circle(Location::new(mid_x, mid_y), 10.0, color);

        // penalty areas and six-yard boxes
        self.rect_outline(Location::new(x0, 18.0), Location::new(x0 + 18.0, 62.0), color);
        self.rect_outline(Location::new(x1 - 18.0, 18.0), Location::new(x1, 62.0), color);
        self.rect_outline(Location::new(x0, 30.0), Location::new(x0 + 6.0, 50.0), color);
        self.rect_outline(Location::new(x1 - 6.0, 30.0), Location::new(x1, 50.0), color);
    }
}

/// Rasterise a figure and return it PNG-encoded.
///
/// The image holds the pitch, its layers, a colour-swatch legend (one swatch per non-empty
/// arrow layer, in layer order) and, for heat layers, a colour bar. No text is drawn: the
/// stack has no font rasteriser, so title, subtitle and legend labels travel alongside the
/// image in the `Figure` and the analysis report.
pub fn render_png(figure: &Figure) -> Result<Vec<u8>> {
    let (width, height) = figure.dimensions();
    let mut canvas = Canvas::new(width, height, rgba(figure.theme.background)?);

    let mut has_heat = false;
    for layer in &figure.layers {
        if let Layer::Heat(grid) = layer {
            canvas.heat(grid);
            has_heat = true;
        }
    }

    canvas.pitch_markings(rgba(figure.theme.lines)?);

    let mut legend = Vec::new();
    for layer in &figure.layers {
        if let Layer::Arrows { label, color, segments } = layer {
            if segments.is_empty() {
                continue;
            }
            tracing::debug!("Drawing {} {} arrows", segments.len(), label);
            let color = rgba(color)?;
            for segment in segments {
                canvas.arrow(segment, color);
            }
            legend.push(color);
        }
    }

    canvas.legend(&legend);
    if has_heat {
        canvas.colorbar();
    }

    let mut buffer = Cursor::new(Vec::new());
    DynamicImage::ImageRgba8(canvas.image).write_to(&mut buffer, ImageFormat::Png)?;
    tracing::info!(
        "Rendered '{}' ({}x{}, {} bytes)",
        figure.title,
        width,
        height,
        buffer.get_ref().len()
    );
    Ok(buffer.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{PassCategory, PassMap, PassSummary, SegmentLayer};
    use crate::services::density::{bin_counts, gaussian_filter};

    fn pass_bundle() -> DerivedBundle {
        let layer = |category: PassCategory, segments: Vec<Segment>| SegmentLayer {
            category,
            label: category.label(),
            color: category.color(),
            segments,
        };
        DerivedBundle::Passes(PassMap {
            title: "Passes of Pedri (Barcelona)".to_string(),
            subtitle: None,
            layers: vec![
                layer(
                    PassCategory::Completed,
                    vec![Segment {
                        start: Location::new(30.0, 70.0),
                        end: Location::new(50.0, 70.0),
                    }],
                ),
                layer(PassCategory::Assist, vec![]),
                layer(PassCategory::Missed, vec![]),
            ],
            summary: PassSummary {
                total_completed: 1,
                total_missed: 0,
                assists: 0,
                pct_completed: 100,
                forward_completed: 1,
                forward_missed: 0,
                pct_forward_of_all: 100,
                pct_completed_of_forward: 100,
                forward_degenerate: false,
            },
        })
    }

    #[test]
    fn test_figure_keeps_layers_in_order() {
        let figure = Figure::from_bundle(&pass_bundle());
        assert_eq!(figure.theme, LIGHT_THEME);
        assert_eq!(figure.layers.len(), 3);
        match &figure.layers[0] {
            Layer::Arrows { label, color, segments } => {
                assert_eq!(*label, "Completed");
                assert_eq!(*color, "#3CD74A");
                assert_eq!(segments.len(), 1);
            }
            other => panic!("unexpected layer {:?}", other),
        }
    }

    #[test]
    fn test_render_png_draws_arrows() {
        let figure = Figure::from_bundle(&pass_bundle());
        let png = render_png(&figure).unwrap();
        assert_eq!(&png[..8], b"\x89PNG\r\n\x1a\n");

        let decoded = image::load_from_memory(&png).unwrap().to_rgba8();
        assert_eq!(decoded.dimensions(), figure.dimensions());
        let (x, y) = to_pixel(Location::new(40.0, 70.0));
        assert_eq!(*decoded.get_pixel(x as u32, y as u32), Rgba([0x3C, 0xD7, 0x4A, 255]));
        assert_eq!(*decoded.get_pixel(5, 5), Rgba([255, 255, 255, 255]));
        // no colour bar without a heat layer
        let (width, height) = figure.dimensions();
        assert_eq!(*decoded.get_pixel(width - MARGIN / 2, height / 2), Rgba([255, 255, 255, 255]));
    }

    #[test]
    fn test_render_png_legend_skips_empty_layers() {
        let mut figure = Figure::from_bundle(&pass_bundle());
        if let Layer::Arrows { segments, .. } = &mut figure.layers[2] {
            segments.push(Segment {
                start: Location::new(80.0, 10.0),
                end: Location::new(100.0, 10.0),
            });
        }
        let decoded = image::load_from_memory(&render_png(&figure).unwrap()).unwrap().to_rgba8();

        let (_, height) = figure.dimensions();
        let centre = |index: usize| {
            let ((x0, y0), (x1, y1)) = legend_swatch(index, height);
            (((x0 + x1) / 2.0) as u32, ((y0 + y1) / 2.0) as u32)
        };
        // Completed, then Missed; the empty Assist layer gets no swatch
        let (x, y) = centre(0);
        assert_eq!(*decoded.get_pixel(x, y), Rgba([0x3C, 0xD7, 0x4A, 255]));
        let (x, y) = centre(1);
        assert_eq!(*decoded.get_pixel(x, y), Rgba([0xF3, 0x15, 0x15, 255]));
        let (x, y) = centre(2);
        assert_eq!(*decoded.get_pixel(x, y), Rgba([255, 255, 255, 255]));
    }

    #[test]
    fn test_render_png_heatmap() {
        let points = [Location::new(60.0, 40.0)];
        let counts = bin_counts(&points, (25, 25), PITCH_X_RANGE, PITCH_Y_RANGE);
        let grid = DensityGrid {
            x_range: PITCH_X_RANGE,
            y_range: PITCH_Y_RANGE,
            smoothed: gaussian_filter(&counts, 1.0),
            counts,
        };
        let figure = Figure {
            title: "Heatmap of Pedri (Barcelona)".to_string(),
            subtitle: None,
            theme: DARK_THEME,
            layers: vec![Layer::Heat(grid)],
        };
        let decoded = image::load_from_memory(&render_png(&figure).unwrap()).unwrap().to_rgba8();
        // hottest cell sits inside bin (12, 12), away from the centre circle line
        let (x, y) = to_pixel(Location::new(12.5 * 4.8 + 0.5, 12.5 * 3.2 + 0.3));
        assert_eq!(*decoded.get_pixel(x as u32, y as u32), hot_colormap(1.0));
        assert_eq!(*decoded.get_pixel(5, 5), Rgba([0x22, 0x31, 0x2b, 255]));

        // colour bar runs from full density at the top to zero at the bottom
        let (width, height) = figure.dimensions();
        let bar_x = width - MARGIN / 2;
        assert_eq!(*decoded.get_pixel(bar_x, MARGIN), hot_colormap(1.0));
        assert_eq!(*decoded.get_pixel(bar_x, height - MARGIN - 1), hot_colormap(0.0));
        assert_eq!(*decoded.get_pixel(bar_x, MARGIN - 1), Rgba([0x22, 0x31, 0x2b, 255]));
    }

    #[test]
    fn test_hot_colormap_endpoints() {
        assert_eq!(hot_colormap(0.0), Rgba([0, 0, 0, 255]));
        assert_eq!(hot_colormap(1.0), Rgba([255, 255, 255, 255]));
        assert_eq!(hot_colormap(0.5)[2], 0);
    }
}
