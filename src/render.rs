//! Chart rendering backends.
//!
//! [`SvgRenderer`] draws charts locally with plotters and only produces
//! SVG. [`RemoteRenderer`] posts the Plotly figure to an image export
//! service and handles every format.

use crate::catalog::Palette;
use crate::chart::{ChartSpec, Layout, Mode, OutputFormat, Trace, TraceType, Values};
use crate::error::RenderError;
use crate::metrics::{max, median, min, quantile};
use async_trait::async_trait;
use plotters::prelude::*;
use serde::Serialize;
use std::ops::Range;
use tracing::debug;

/// Produces the bytes of a chart in a given output format.
#[async_trait]
pub trait ChartRenderer: Send + Sync {
    fn supports(&self, format: OutputFormat) -> bool;

    async fn render(&self, chart: &ChartSpec, format: OutputFormat) -> Result<Vec<u8>, RenderError>;
}

/// Local SVG renderer built on plotters.
///
/// Dash styles are not reproduced and box whiskers span the full data range.
#[derive(Debug, Default)]
pub struct SvgRenderer {
    palette: Palette,
}

#[async_trait]
impl ChartRenderer for SvgRenderer {
    fn supports(&self, format: OutputFormat) -> bool {
        format == OutputFormat::Svg
    }

    async fn render(&self, chart: &ChartSpec, format: OutputFormat) -> Result<Vec<u8>, RenderError> {
        if !self.supports(format) {
            return Err(RenderError::UnsupportedFormat(format.extension()));
        }
        Ok(self.draw(chart)?.into_bytes())
    }
}

fn backend<E: std::fmt::Display>(e: E) -> RenderError {
    RenderError::Backend(e.to_string())
}

/// Remove Plotly's inline HTML markup such as `<b>`.
fn strip_tags(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_tag = false;
    for ch in text.chars() {
        match ch {
            '<' => in_tag = true,
            '>' if in_tag => in_tag = false,
            _ if !in_tag => out.push(ch),
            _ => {}
        }
    }
    out
}

/// Parse `#rrggbb` or `#rgb`.
fn parse_color(color: &str) -> Option<RGBColor> {
    let hex = color.strip_prefix('#').filter(|h| h.is_ascii())?;
    let channel = |s: &str| u8::from_str_radix(s, 16).ok();
    match hex.len() {
        6 => Some(RGBColor(
            channel(&hex[0..2])?,
            channel(&hex[2..4])?,
            channel(&hex[4..6])?,
        )),
        3 => {
            let expand = |i: usize| channel(&hex[i..=i]).map(|v| v * 17);
            Some(RGBColor(expand(0)?, expand(1)?, expand(2)?))
        }
        _ => None,
    }
}

/// X category labels: box traces are placed by trace order, bars by the
/// first appearance of their category.
fn categories(chart: &ChartSpec) -> Vec<String> {
    let mut labels: Vec<String> = Vec::new();
    for trace in &chart.data {
        match (&trace.kind, &trace.x) {
            (TraceType::Box, _) => labels.push(trace.name.clone()),
            (TraceType::Bar, Some(Values::Categories(xs))) => {
                for x in xs {
                    if !labels.contains(x) {
                        labels.push(x.clone());
                    }
                }
            }
            _ => {}
        }
    }
    labels
}

fn span(values: impl Iterator<Item = f64>) -> Option<Range<f64>> {
    values.filter(|v| v.is_finite()).fold(None, |acc, v| match acc {
        None => Some(v..v),
        Some(r) => Some(r.start.min(v)..r.end.max(v)),
    })
}

fn padded(range: Option<Range<f64>>) -> Range<f64> {
    match range {
        None => 0.0..1.0,
        Some(r) if r.start == r.end => (r.start - 1.0)..(r.end + 1.0),
        Some(r) => {
            let pad = (r.end - r.start) * 0.05;
            (r.start - pad)..(r.end + pad)
        }
    }
}

fn axis_range(fixed: Option<[f64; 2]>, fallback: Range<f64>) -> Range<f64> {
    match fixed {
        Some([lo, hi]) if lo < hi => lo..hi,
        _ => fallback,
    }
}

impl SvgRenderer {
    pub fn new(palette: Palette) -> Self {
        Self { palette }
    }

    fn color_of(&self, trace: &Trace, index: usize) -> RGBColor {
        trace
            .resolved_color()
            .and_then(parse_color)
            .or_else(|| parse_color(self.palette.get(index)))
            .unwrap_or(BLACK)
    }

    fn draw(&self, chart: &ChartSpec) -> Result<String, RenderError> {
        let (width, height) = chart.size();
        let layout: &Layout = &chart.layout;
        let labels = categories(chart);
        let categorical = !labels.is_empty();
        let bar_count = chart.data.iter().filter(|t| t.kind == TraceType::Bar).count();

        let x_fallback = if categorical {
            -0.5..(labels.len() as f64 - 0.5)
        } else {
            padded(span(chart.data.iter().flat_map(|t| (0..t.y.len()).map(|i| t.x_at(i)))))
        };
        let mut y_values = span(chart.data.iter().flat_map(|t| t.y.iter().copied()));
        if bar_count > 0 {
            y_values = span(y_values.into_iter().flat_map(|r| [r.start, r.end, 0.0]));
        }
        let x_range = axis_range(layout.xaxis.range, x_fallback);
        let y_range = axis_range(layout.yaxis.range, padded(y_values));

        let mut svg = String::new();
        {
            let root = SVGBackend::with_string(&mut svg, (width, height)).into_drawing_area();
            root.fill(&WHITE).map_err(backend)?;

            let mut builder = ChartBuilder::on(&root);
            builder.margin(10).x_label_area_size(40).y_label_area_size(60);
            if let Some(title) = layout.title_text().map(strip_tags) {
                if !title.is_empty() {
                    builder.caption(title, ("sans-serif", 24));
                }
            }
            let mut ctx = builder
                .build_cartesian_2d(x_range, y_range)
                .map_err(backend)?;

            let category_label = |x: &f64| {
                let nearest = x.round();
                if (x - nearest).abs() > 1e-6 || nearest < 0.0 {
                    return String::new();
                }
                labels
                    .get(nearest as usize)
                    .map(|l| l.trim().to_string())
                    .unwrap_or_default()
            };
            let mut mesh = ctx.configure_mesh();
            if let Some(title) = layout.xaxis.title_text() {
                mesh.x_desc(strip_tags(title));
            }
            if let Some(title) = layout.yaxis.title_text() {
                mesh.y_desc(strip_tags(title));
            }
            if categorical {
                mesh.x_labels(labels.len() * 2 + 1).x_label_formatter(&category_label);
            }
            mesh.draw().map_err(backend)?;

            let mut labelled = false;
            let mut box_slot = 0usize;
            let mut bar_slot = 0usize;
            for (index, trace) in chart.data.iter().enumerate() {
                let color = self.color_of(trace, index);
                let alpha = trace
                    .opacity
                    .or_else(|| trace.marker.as_ref().and_then(|m| m.opacity))
                    .unwrap_or(1.0);
                let stroke = trace
                    .line
                    .as_ref()
                    .and_then(|l| l.width)
                    .map_or(2, |w| w.round().max(1.0) as u32);
                let style = color.mix(alpha).stroke_width(stroke);
                let show = trace.showlegend != Some(false) && !trace.name.trim().is_empty();
                let name = strip_tags(&trace.name);

                match &trace.kind {
                    TraceType::Scatter => {
                        let points: Vec<(f64, f64)> = trace
                            .y
                            .iter()
                            .enumerate()
                            .map(|(i, &y)| (trace.x_at(i), y))
                            .filter(|(x, y)| x.is_finite() && y.is_finite())
                            .collect();
                        let lines = trace.mode.as_ref().map_or(true, Mode::draws_lines);
                        let anno = if !lines {
                            ctx.draw_series(
                                points.into_iter().map(|p| Circle::new(p, 5, style.filled())),
                            )
                            .map_err(backend)?
                        } else {
                            ctx.draw_series(LineSeries::new(points, style))
                                .map_err(backend)?
                        };
                        if show {
                            anno.label(name).legend(move |(x, y)| {
                                PathElement::new(vec![(x, y), (x + 20, y)], color)
                            });
                            labelled = true;
                        }
                    }
                    TraceType::Box => {
                        let slot = box_slot as f64;
                        box_slot += 1;
                        let values: Vec<f64> =
                            trace.y.iter().copied().filter(|v| v.is_finite()).collect();
                        if values.is_empty() {
                            continue;
                        }
                        let (q1, mid, q3) = (
                            quantile(&values, 0.25),
                            median(&values),
                            quantile(&values, 0.75),
                        );
                        let (lo, hi) = (min(&values), max(&values));
                        let anno = ctx
                            .draw_series(std::iter::once(Rectangle::new(
                                [(slot - 0.3, q1), (slot + 0.3, q3)],
                                style,
                            )))
                            .map_err(backend)?;
                        if show {
                            anno.label(name).legend(move |(x, y)| {
                                Rectangle::new([(x, y - 5), (x + 10, y + 5)], color.filled())
                            });
                            labelled = true;
                        }
                        ctx.draw_series(
                            [
                                vec![(slot - 0.3, mid), (slot + 0.3, mid)],
                                vec![(slot, lo), (slot, q1)],
                                vec![(slot, q3), (slot, hi)],
                                vec![(slot - 0.15, lo), (slot + 0.15, lo)],
                                vec![(slot - 0.15, hi), (slot + 0.15, hi)],
                            ]
                            .into_iter()
                            .map(|path| PathElement::new(path, style)),
                        )
                        .map_err(backend)?;
                    }
                    TraceType::Other(kind) => {
                        debug!("Skipping {} trace \"{}\", not drawn locally", kind, trace.name);
                    }
                    TraceType::Bar => {
                        let width = 0.8 / bar_count.max(1) as f64;
                        let offset = -0.4 + width * bar_slot as f64;
                        bar_slot += 1;
                        let xs = match &trace.x {
                            Some(Values::Categories(xs)) => xs.clone(),
                            _ => Vec::new(),
                        };
                        let bars: Vec<Rectangle<(f64, f64)>> = xs
                            .iter()
                            .zip(&trace.y)
                            .filter_map(|(x, &y)| {
                                let pos = labels.iter().position(|l| l == x)? as f64 + offset;
                                Some(Rectangle::new([(pos, 0.0), (pos + width, y)], style.filled()))
                            })
                            .collect();
                        let anno = ctx.draw_series(bars).map_err(backend)?;
                        if show {
                            anno.label(name).legend(move |(x, y)| {
                                Rectangle::new([(x, y - 5), (x + 10, y + 5)], color.filled())
                            });
                            labelled = true;
                        }
                    }
                }
            }

            if labelled && layout.showlegend != Some(false) {
                ctx.configure_series_labels()
                    .background_style(WHITE.mix(0.8))
                    .border_style(BLACK)
                    .draw()
                    .map_err(backend)?;
            }
            root.present().map_err(backend)?;
        }
        Ok(svg)
    }
}

/// Image export request understood by Plotly-compatible export services.
#[derive(Serialize)]
struct ExportRequest<'a> {
    figure: Figure<'a>,
    format: &'static str,
    width: u32,
    height: u32,
}

/// The figure without local post-processing fields.
#[derive(Serialize)]
struct Figure<'a> {
    data: &'a [Trace],
    layout: &'a Layout,
}

/// Renderer delegating to a remote image export endpoint.
pub struct RemoteRenderer {
    client: reqwest::Client,
    url: String,
}

impl RemoteRenderer {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
        }
    }
}

#[async_trait]
impl ChartRenderer for RemoteRenderer {
    fn supports(&self, _format: OutputFormat) -> bool {
        true
    }

    async fn render(&self, chart: &ChartSpec, format: OutputFormat) -> Result<Vec<u8>, RenderError> {
        let (width, height) = chart.size();
        let request = ExportRequest {
            figure: Figure {
                data: &chart.data,
                layout: &chart.layout,
            },
            format: format.extension(),
            width,
            height,
        };
        let response = self
            .client
            .post(&self.url)
            .json(&request)
            .send()
            .await?
            .error_for_status()?;
        Ok(response.bytes().await?.to_vec())
    }
}
