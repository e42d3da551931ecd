//! Renderer-agnostic chart descriptions and the layout merge policy.
//!
//! A [`ChartSpec`] serializes to the Plotly figure shape (`data` + `layout`)
//! so it can be handed to any image export service unchanged.

use crate::model::Dash;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Default image edge length when neither the figure nor the job sets one.
pub const DEFAULT_SIZE: u32 = 1000;
const FONT_SIZE: u32 = 16;
const TITLE_MARGIN: f64 = 40.0;
const AUTO: &str = "auto";

/// Output file format of a rendered chart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutputFormat {
    Png,
    Svg,
    Pdf,
}

impl OutputFormat {
    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Png => "png",
            OutputFormat::Svg => "svg",
            OutputFormat::Pdf => "pdf",
        }
    }

    /// Print formats go into documents that carry their own captions.
    pub fn is_print(self) -> bool {
        matches!(self, OutputFormat::Svg | OutputFormat::Pdf)
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// Plotly trace type. Types the local renderer does not draw are kept by name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum TraceType {
    #[default]
    Scatter,
    Box,
    Bar,
    Other(String),
}

impl From<String> for TraceType {
    fn from(s: String) -> Self {
        match s.as_str() {
            "scatter" => TraceType::Scatter,
            "box" => TraceType::Box,
            "bar" => TraceType::Bar,
            _ => TraceType::Other(s),
        }
    }
}

impl From<TraceType> for String {
    fn from(kind: TraceType) -> Self {
        match kind {
            TraceType::Scatter => "scatter".into(),
            TraceType::Box => "box".into(),
            TraceType::Bar => "bar".into(),
            TraceType::Other(s) => s,
        }
    }
}

/// Scatter draw mode, e.g. `lines`, `markers` or `lines+markers`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Mode {
    Lines,
    Markers,
    Other(String),
}

impl Mode {
    pub fn draws_lines(&self) -> bool {
        match self {
            Mode::Lines => true,
            Mode::Markers => false,
            Mode::Other(flags) => flags.split('+').any(|f| f == "lines"),
        }
    }
}

impl From<String> for Mode {
    fn from(s: String) -> Self {
        match s.as_str() {
            "lines" => Mode::Lines,
            "markers" => Mode::Markers,
            _ => Mode::Other(s),
        }
    }
}

impl From<Mode> for String {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::Lines => "lines".into(),
            Mode::Markers => "markers".into(),
            Mode::Other(s) => s,
        }
    }
}

/// Plain title text or a Plotly title object such as `{"text": ..., "font": ...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Title {
    Text(String),
    Styled {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        text: Option<String>,
        #[serde(flatten)]
        style: Map<String, Value>,
    },
}

impl Title {
    pub fn text(&self) -> Option<&str> {
        match self {
            Title::Text(text) => Some(text),
            Title::Styled { text, .. } => text.as_deref(),
        }
    }
}

impl From<String> for Title {
    fn from(text: String) -> Self {
        Title::Text(text)
    }
}

impl From<&str> for Title {
    fn from(text: &str) -> Self {
        Title::Text(text.to_string())
    }
}

/// X values are either numeric or category labels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Values {
    Numbers(Vec<f64>),
    Categories(Vec<String>),
    /// Mixed or nullable values from hand-written figures.
    Raw(Vec<Value>),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LineStyle {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dash: Option<Dash>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<f64>,
    /// Plotly attributes without a typed field, passed through untouched.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MarkerStyle {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub opacity: Option<f64>,
    /// Plotly attributes without a typed field, passed through untouched.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// One data series.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Trace {
    #[serde(rename = "type", default)]
    pub kind: TraceType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<Mode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<Values>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub y: Vec<f64>,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<LineStyle>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub marker: Option<MarkerStyle>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub opacity: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub showlegend: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub legendgroup: Option<String>,
    /// Plotly attributes without a typed field, passed through untouched.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Trace {
    /// Line series over the sample index (or explicit x via [`Trace::with_x`]).
    pub fn lines(name: impl Into<String>, y: Vec<f64>) -> Self {
        Self {
            kind: TraceType::Scatter,
            mode: Some(Mode::Lines),
            y,
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn markers(name: impl Into<String>, x: f64, y: f64) -> Self {
        Self {
            kind: TraceType::Scatter,
            mode: Some(Mode::Markers),
            x: Some(Values::Numbers(vec![x])),
            y: vec![y],
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn boxed(name: impl Into<String>, y: Vec<f64>) -> Self {
        Self {
            kind: TraceType::Box,
            y,
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn bar(name: impl Into<String>, x: Vec<String>, y: Vec<f64>) -> Self {
        Self {
            kind: TraceType::Bar,
            x: Some(Values::Categories(x)),
            y,
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_x(mut self, x: Vec<f64>) -> Self {
        self.x = Some(Values::Numbers(x));
        self
    }

    pub fn color(mut self, color: impl Into<String>) -> Self {
        self.line.get_or_insert_with(LineStyle::default).color = Some(color.into());
        self
    }

    pub fn dash(mut self, dash: Option<Dash>) -> Self {
        self.line.get_or_insert_with(LineStyle::default).dash = dash;
        self
    }

    pub fn line_width(mut self, width: Option<f64>) -> Self {
        self.line.get_or_insert_with(LineStyle::default).width = width;
        self
    }

    pub fn opacity(mut self, opacity: Option<f64>) -> Self {
        self.opacity = opacity;
        self
    }

    pub fn marker(mut self, marker: MarkerStyle) -> Self {
        self.marker = Some(marker);
        self
    }

    pub fn legend(mut self, show: bool) -> Self {
        self.showlegend = Some(show);
        self
    }

    pub fn group(mut self, group: &str) -> Self {
        self.legendgroup = Some(group.to_string());
        self
    }

    /// Colour of the trace, line colour first.
    pub fn resolved_color(&self) -> Option<&str> {
        self.line
            .as_ref()
            .and_then(|l| l.color.as_deref())
            .or_else(|| self.marker.as_ref().and_then(|m| m.color.as_deref()))
    }

    /// X value at position `i`, falling back to the sample index.
    pub fn x_at(&self, i: usize) -> f64 {
        match &self.x {
            Some(Values::Numbers(xs)) => xs.get(i).copied().unwrap_or(i as f64),
            _ => i as f64,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Axis {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<Title>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub range: Option<[f64; 2]>,
    /// Plotly attributes without a typed field, passed through untouched.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Axis {
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: Some(Title::Text(title.into())),
            ..Default::default()
        }
    }

    pub fn title_text(&self) -> Option<&str> {
        self.title.as_ref().and_then(Title::text)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Orientation {
    #[serde(rename = "h")]
    Horizontal,
    #[serde(rename = "v")]
    Vertical,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Legend {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub xanchor: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub yanchor: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub orientation: Option<Orientation>,
    /// Plotly attributes without a typed field, passed through untouched.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Font {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u32>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Margin {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub l: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub r: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub t: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub b: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Layout {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<Title>,
    #[serde(default)]
    pub xaxis: Axis,
    #[serde(default)]
    pub yaxis: Axis,
    #[serde(default)]
    pub legend: Legend,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub showlegend: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub barmode: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bargroupgap: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub font: Option<Font>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub margin: Option<Margin>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub shapes: Vec<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub annotations: Vec<Value>,
    /// Plotly attributes without a typed field, passed through untouched.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Layout {
    pub fn title_text(&self) -> Option<&str> {
        self.title.as_ref().and_then(Title::text)
    }
}

/// A complete chart: series plus layout.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChartSpec {
    pub data: Vec<Trace>,
    #[serde(default)]
    pub layout: Layout,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    /// `(ID, text)` pairs substituted for `$$ID$$` in vector output.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub replacer: Vec<(String, String)>,
}

impl ChartSpec {
    pub fn new(data: Vec<Trace>, layout: Layout) -> Self {
        Self {
            data,
            layout,
            ..Default::default()
        }
    }

    pub fn size(&self) -> (u32, u32) {
        (
            self.width.unwrap_or(DEFAULT_SIZE),
            self.height.unwrap_or(DEFAULT_SIZE),
        )
    }
}

/// Per-job layout hints from a `plots.json` entry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayoutHints {
    #[serde(default)]
    pub x_anchor_legend: Option<String>,
    #[serde(default)]
    pub y_anchor_legend: Option<String>,
    #[serde(default)]
    pub x_legend: Option<f64>,
    #[serde(default)]
    pub y_legend: Option<f64>,
    #[serde(default)]
    pub x_range: Option<[f64; 2]>,
    #[serde(default)]
    pub y_range: Option<[f64; 2]>,
    #[serde(default)]
    pub shapes: Option<Vec<Value>>,
    #[serde(default)]
    pub annotations: Option<Vec<Value>>,
    #[serde(default)]
    pub margin: Option<Margin>,
    #[serde(default)]
    pub width: Option<u32>,
    #[serde(default)]
    pub height: Option<u32>,
}

/// Merge a computed chart with job hints for one output format.
///
/// Figures without hints (custom figures) are passed through unchanged.
pub fn assemble(base: &ChartSpec, hints: Option<&LayoutHints>, format: OutputFormat) -> ChartSpec {
    let mut chart = base.clone();
    let Some(hints) = hints else {
        return chart;
    };
    let layout = &mut chart.layout;

    layout.legend.xanchor = Some(hints.x_anchor_legend.clone().unwrap_or_else(|| AUTO.to_string()));
    layout.legend.yanchor = Some(hints.y_anchor_legend.clone().unwrap_or_else(|| AUTO.to_string()));
    layout.legend.x = base.layout.legend.x.or(hints.x_legend);
    layout.legend.y = base.layout.legend.y.or(hints.y_legend);

    layout.xaxis.range = hints.x_range;
    layout.yaxis.range = hints.y_range;

    if layout.shapes.is_empty() {
        layout.shapes = hints.shapes.clone().unwrap_or_default();
    }
    if layout.annotations.is_empty() {
        layout.annotations = hints.annotations.clone().unwrap_or_default();
    }

    let mut font = layout.font.take().unwrap_or_default();
    font.size = Some(FONT_SIZE);
    layout.font = Some(font);
    if format.is_print() {
        layout.title = None;
    }
    let has_title = layout.title_text().is_some_and(|t| !t.is_empty());

    let mut margin = base.layout.margin.or(hints.margin).unwrap_or_default();
    if margin.t.map_or(true, |t| t == 0.0) {
        margin.t = Some(if has_title { TITLE_MARGIN } else { 0.0 });
    }
    layout.margin = Some(margin);

    chart.width = hints.width.or(base.width);
    chart.height = hints.height.or(base.height);
    chart
}

#[cfg(test)]
mod tests {
    use super::*;

    fn titled_chart() -> ChartSpec {
        ChartSpec::new(
            vec![Trace::lines("Linux", vec![1.0, 2.0])],
            Layout {
                title: Some("<b>Throughput</b>".into()),
                xaxis: Axis::titled("<b>Sample</b>"),
                yaxis: Axis {
                    title: Some("<b>CPU</b>".into()),
                    range: Some([0.0, 1600.0]),
                    ..Default::default()
                },
                ..Default::default()
            },
        )
    }

    #[test]
    fn defaults_applied_for_raster_output() {
        let merged = assemble(&titled_chart(), Some(&LayoutHints::default()), OutputFormat::Png);
        assert_eq!(merged.layout.legend.xanchor.as_deref(), Some("auto"));
        assert_eq!(merged.layout.legend.yanchor.as_deref(), Some("auto"));
        assert_eq!(merged.layout.font.as_ref().and_then(|f| f.size), Some(16));
        assert_eq!(merged.layout.title_text(), Some("<b>Throughput</b>"));
        assert_eq!(merged.layout.margin.unwrap().t, Some(40.0));
        assert_eq!(merged.size(), (1000, 1000));
    }

    #[test]
    fn anchors_and_ranges_come_only_from_hints() {
        let mut chart = titled_chart();
        chart.layout.legend.xanchor = Some("right".into());
        chart.layout.xaxis.range = Some([1.0, 2.0]);

        let merged = assemble(&chart, Some(&LayoutHints::default()), OutputFormat::Png);
        assert_eq!(merged.layout.legend.xanchor.as_deref(), Some("auto"));
        assert_eq!(merged.layout.xaxis.range, None);
        assert_eq!(merged.layout.yaxis.range, None);

        let hints = LayoutHints {
            y_anchor_legend: Some("bottom".into()),
            x_range: Some([0.0, 10.0]),
            ..Default::default()
        };
        let merged = assemble(&chart, Some(&hints), OutputFormat::Png);
        assert_eq!(merged.layout.legend.xanchor.as_deref(), Some("auto"));
        assert_eq!(merged.layout.legend.yanchor.as_deref(), Some("bottom"));
        assert_eq!(merged.layout.xaxis.range, Some([0.0, 10.0]));
    }

    #[test]
    fn print_formats_drop_title_and_top_margin() {
        for format in [OutputFormat::Svg, OutputFormat::Pdf] {
            let merged = assemble(&titled_chart(), Some(&LayoutHints::default()), format);
            assert_eq!(merged.layout.title, None);
            assert_eq!(merged.layout.margin.unwrap().t, Some(0.0));
        }
    }

    #[test]
    fn hints_override_ranges_anchors_and_size() {
        let hints = LayoutHints {
            x_anchor_legend: Some("left".into()),
            x_legend: Some(0.1),
            y_range: Some([0.0, 5.0]),
            width: Some(800),
            height: Some(400),
            margin: Some(Margin {
                l: Some(10.0),
                t: Some(25.0),
                ..Default::default()
            }),
            ..Default::default()
        };
        let merged = assemble(&titled_chart(), Some(&hints), OutputFormat::Png);
        assert_eq!(merged.layout.legend.xanchor.as_deref(), Some("left"));
        assert_eq!(merged.layout.legend.x, Some(0.1));
        assert_eq!(merged.layout.yaxis.range, Some([0.0, 5.0]));
        assert_eq!(merged.size(), (800, 400));
        let margin = merged.layout.margin.unwrap();
        assert_eq!(margin.l, Some(10.0));
        assert_eq!(margin.t, Some(25.0));
    }

    #[test]
    fn figure_legend_position_wins_over_hints() {
        let mut chart = titled_chart();
        chart.layout.legend.x = Some(1.0);
        let hints = LayoutHints {
            x_legend: Some(0.0),
            y_legend: Some(0.3),
            ..Default::default()
        };
        let merged = assemble(&chart, Some(&hints), OutputFormat::Png);
        assert_eq!(merged.layout.legend.x, Some(1.0));
        assert_eq!(merged.layout.legend.y, Some(0.3));
    }

    #[test]
    fn merge_leaves_base_untouched() {
        let base = titled_chart();
        let _ = assemble(&base, Some(&LayoutHints::default()), OutputFormat::Svg);
        assert_eq!(base, titled_chart());
    }

    #[test]
    fn custom_figures_pass_through() {
        let base = titled_chart();
        assert_eq!(assemble(&base, None, OutputFormat::Svg), base);
    }

    #[test]
    fn serializes_as_plotly_figure() {
        let chart = ChartSpec::new(
            vec![Trace::boxed("Linux", vec![1.0]).color("#000000").legend(false)],
            Layout::default(),
        );
        let json = serde_json::to_value(&chart).unwrap();
        assert_eq!(json["data"][0]["type"], "box");
        assert_eq!(json["data"][0]["line"]["color"], "#000000");
        assert_eq!(json["data"][0]["showlegend"], false);
        assert!(json.get("replacer").is_none());
    }

    #[test]
    fn hand_written_figures_keep_unmodelled_plotly_fields() {
        let json = r#"{
            "data": [{
                "type": "scatter",
                "mode": "lines+markers",
                "x": [1, 2],
                "y": [3, 4],
                "marker": {"size": 12}
            }, {
                "type": "histogram",
                "x": ["a", null]
            }],
            "layout": {
                "title": {"text": "Overview", "font": {"size": 20}},
                "xaxis": {"type": "log", "title": {"text": "Load"}},
                "font": {"family": "serif"}
            }
        }"#;
        let chart: ChartSpec = serde_json::from_str(json).unwrap();
        assert_eq!(chart.data[0].mode, Some(Mode::Other("lines+markers".into())));
        assert!(chart.data[0].mode.as_ref().unwrap().draws_lines());
        assert_eq!(chart.data[1].kind, TraceType::Other("histogram".into()));
        assert_eq!(chart.layout.title_text(), Some("Overview"));
        assert_eq!(chart.layout.xaxis.title_text(), Some("Load"));

        let out = serde_json::to_value(&chart).unwrap();
        assert_eq!(out["data"][0]["mode"], "lines+markers");
        assert_eq!(out["data"][0]["marker"]["size"], 12);
        assert_eq!(out["data"][1]["type"], "histogram");
        assert_eq!(out["layout"]["title"]["font"]["size"], 20);
        assert_eq!(out["layout"]["xaxis"]["type"], "log");
        assert_eq!(out["layout"]["font"]["family"], "serif");
    }
}
