//! Artifact fan-out: one rendered file per figure and output format,
//! optional copies into an assets tree, and per-job summary files.

use crate::chart::{assemble, ChartSpec, LayoutHints, OutputFormat};
use crate::plot::PlotKind;
use crate::render::ChartRenderer;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::ffi::OsString;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Substitute every `$$ID$$` token with its replacement text.
pub fn replace_placeholders(content: &str, replacer: &[(String, String)]) -> String {
    replacer
        .iter()
        .fold(content.to_string(), |acc, (id, text)| {
            acc.replace(&format!("$${}$$", id), text)
        })
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RelocationNode {
    Files(Vec<RelocationItem>),
    Dir(BTreeMap<String, RelocationNode>),
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RelocationItem {
    Same(String),
    Renamed(String, String),
}

/// Maps generated artifact paths to the places they get copied to.
#[derive(Debug, Clone, Default)]
pub struct RelocationTable {
    moves: HashMap<PathBuf, PathBuf>,
}

impl RelocationTable {
    /// Load a nested `file-list.json`.
    ///
    /// Sources are relative to `plot_dir`; object keys name destination
    /// sub-directories below `assets_dir`.
    pub fn load(path: &Path, plot_dir: &Path, assets_dir: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read relocation file: {}", path.display()))?;
        Self::parse(&text, plot_dir, assets_dir)
            .with_context(|| format!("Failed to parse relocation file: {}", path.display()))
    }

    pub fn parse(text: &str, plot_dir: &Path, assets_dir: &Path) -> Result<Self> {
        let root: BTreeMap<String, RelocationNode> = serde_json::from_str(text)?;
        let mut moves = HashMap::new();
        collect_moves(&root, plot_dir, assets_dir, &mut moves);
        Ok(Self { moves })
    }

    pub fn destination(&self, source: &Path) -> Option<&Path> {
        self.moves.get(source).map(PathBuf::as_path)
    }

    pub fn len(&self) -> usize {
        self.moves.len()
    }
}

fn collect_moves(
    nodes: &BTreeMap<String, RelocationNode>,
    plot_dir: &Path,
    dest: &Path,
    moves: &mut HashMap<PathBuf, PathBuf>,
) {
    for (key, node) in nodes {
        let dest_dir = dest.join(key);
        match node {
            RelocationNode::Dir(children) => collect_moves(children, plot_dir, &dest_dir, moves),
            RelocationNode::Files(items) => {
                for item in items {
                    let (source, target) = match item {
                        RelocationItem::Same(src) => {
                            let name = Path::new(src).file_name().map(PathBuf::from).unwrap_or_default();
                            (plot_dir.join(src), dest_dir.join(name))
                        }
                        RelocationItem::Renamed(src, name) => (plot_dir.join(src), dest_dir.join(name)),
                    };
                    moves.insert(source, target);
                }
            }
        }
    }
}

/// Writes `<data>/<dir>/<type>.meta.txt` files.
#[derive(Debug, Clone)]
pub struct SummaryWriter {
    data_dir: PathBuf,
    enabled: bool,
}

impl SummaryWriter {
    pub fn new(data_dir: &Path, enabled: bool) -> Self {
        if !enabled {
            warn!("Not updating metadata files!");
        }
        Self {
            data_dir: data_dir.to_path_buf(),
            enabled,
        }
    }

    /// Replace the job's summary file with `lines`.
    pub async fn write(&self, directory: &str, kind: PlotKind, lines: &[String]) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }
        let path = self.data_dir.join(directory).join(kind.meta_file_name());
        match tokio::fs::remove_file(&path).await {
            Err(e) if e.kind() != ErrorKind::NotFound => {
                return Err(e).with_context(|| format!("Failed to remove summary file: {}", path.display()));
            }
            _ => {}
        }
        if lines.is_empty() {
            return Ok(());
        }
        let content: String = lines.iter().map(|line| format!("{}\n", line)).collect();
        tokio::fs::write(&path, content)
            .await
            .with_context(|| format!("Failed to write summary file: {}", path.display()))?;
        debug!("Wrote {} summary lines to {}", lines.len(), path.display());
        Ok(())
    }
}

/// An artifact that could not be rendered.
#[derive(Debug)]
pub struct Failure {
    pub path: PathBuf,
    pub reason: String,
}

/// Drives the renderer for every figure and format.
pub struct FanOut<'a> {
    renderer: &'a dyn ChartRenderer,
    plot_dir: PathBuf,
    formats: Vec<OutputFormat>,
    relocations: &'a RelocationTable,
    failures: Vec<Failure>,
}

impl<'a> FanOut<'a> {
    /// Keep the requested formats the renderer can produce.
    pub fn new(
        renderer: &'a dyn ChartRenderer,
        plot_dir: &Path,
        requested: &[OutputFormat],
        relocations: &'a RelocationTable,
    ) -> Self {
        let (formats, skipped): (Vec<OutputFormat>, Vec<OutputFormat>) =
            requested.iter().partition(|f| renderer.supports(**f));
        if !skipped.is_empty() {
            let names: Vec<&str> = skipped.iter().map(|f| f.extension()).collect();
            warn!("Renderer cannot produce {} output, skipping", names.join(", "));
        }
        Self {
            renderer,
            plot_dir: plot_dir.to_path_buf(),
            formats,
            relocations,
            failures: Vec::new(),
        }
    }

    pub fn formats(&self) -> &[OutputFormat] {
        &self.formats
    }

    pub fn failures(&self) -> &[Failure] {
        &self.failures
    }

    /// Render `chart` to `<plot_dir>/<stem>.<ext>` for every format.
    ///
    /// Existing files are left alone. Render failures are recorded, I/O
    /// failures abort.
    pub async fn emit(&mut self, stem: &Path, chart: &ChartSpec, hints: Option<&LayoutHints>) -> Result<()> {
        for format in self.formats.clone() {
            let path = artifact_path(&self.plot_dir, stem, format);
            if path.exists() {
                debug!("Plot {} exists, skipping", path.display());
                continue;
            }

            let figure = assemble(chart, hints, format);
            let bytes = match self.renderer.render(&figure, format).await {
                Ok(bytes) => bytes,
                Err(e) => {
                    warn!("Could not create plot {}: {}", path.display(), e);
                    self.failures.push(Failure {
                        path,
                        reason: e.to_string(),
                    });
                    continue;
                }
            };

            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
            }
            let bytes = if format == OutputFormat::Svg && !figure.replacer.is_empty() {
                match String::from_utf8(bytes) {
                    Ok(text) => replace_placeholders(&text, &figure.replacer).into_bytes(),
                    Err(e) => e.into_bytes(),
                }
            } else {
                bytes
            };
            tokio::fs::write(&path, bytes)
                .await
                .with_context(|| format!("Failed to write plot: {}", path.display()))?;
            info!("Created plot {}", file_name(&path));

            if let Some(dest) = self.relocations.destination(&path) {
                info!("Copying plot {}", file_name(&path));
                if let Some(parent) = dest.parent() {
                    tokio::fs::create_dir_all(parent)
                        .await
                        .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
                }
                tokio::fs::copy(&path, dest)
                    .await
                    .with_context(|| format!("Failed to copy {} to {}", path.display(), dest.display()))?;
            }
        }
        Ok(())
    }
}

/// `<plot_dir>/<stem>.<ext>`, keeping any dots already in the stem.
fn artifact_path(plot_dir: &Path, stem: &Path, format: OutputFormat) -> PathBuf {
    let mut name = OsString::from(plot_dir.join(stem));
    name.push(".");
    name.push(format.extension());
    PathBuf::from(name)
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Output stem of a plot job figure: `<dir>-<name>`, or the bare name at the
/// data root.
pub fn job_stem(directory: &str, name: &str) -> PathBuf {
    if directory.is_empty() {
        PathBuf::from(name)
    } else {
        PathBuf::from(format!("{}-{}", directory, name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chart::{Layout, Trace};
    use crate::error::RenderError;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Returns a fixed SVG body and remembers what it was asked for.
    #[derive(Default)]
    struct Recorder {
        calls: Mutex<Vec<OutputFormat>>,
        fail: bool,
        vector_only: bool,
    }

    impl Recorder {
        fn calls(&self) -> Vec<OutputFormat> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ChartRenderer for Recorder {
        fn supports(&self, format: OutputFormat) -> bool {
            !self.vector_only || format == OutputFormat::Svg
        }

        async fn render(&self, chart: &ChartSpec, format: OutputFormat) -> Result<Vec<u8>, RenderError> {
            self.calls.lock().unwrap().push(format);
            if self.fail {
                return Err(RenderError::Backend("boom".into()));
            }
            Ok(format!("<svg>{} $$MU$$</svg>", chart.data.len()).into_bytes())
        }
    }

    const ALL: [OutputFormat; 3] = [OutputFormat::Png, OutputFormat::Svg, OutputFormat::Pdf];

    fn chart() -> ChartSpec {
        let mut chart = ChartSpec::new(vec![Trace::lines("Linux", vec![1.0, 2.0])], Layout::default());
        chart.replacer = vec![("MU".into(), "µ".into())];
        chart
    }

    #[test]
    fn placeholders_replaced_globally() {
        let replacer = vec![("A".to_string(), "x".to_string()), ("B".to_string(), "y".to_string())];
        assert_eq!(replace_placeholders("$$A$$-$$B$$-$$A$$-$A$", &replacer), "x-y-x-$A$");
    }

    #[test]
    fn stems_include_directory() {
        assert_eq!(job_stem("web/nginx", "throughput"), PathBuf::from("web/nginx-throughput"));
        assert_eq!(job_stem("", "throughput"), PathBuf::from("throughput"));
        assert_eq!(
            artifact_path(Path::new("/p"), Path::new("a-1.5x"), OutputFormat::Png),
            PathBuf::from("/p/a-1.5x.png")
        );
    }

    #[test]
    fn relocations_nest_directories() {
        let json = r#"{
            "chapter": {
                "eval": ["web-throughput.pdf", ["web-utilization.svg", "util.svg"]]
            },
            "appendix": ["a.png"]
        }"#;
        let table = RelocationTable::parse(json, Path::new("/plots"), Path::new("/assets")).unwrap();
        assert_eq!(table.len(), 3);
        assert_eq!(
            table.destination(Path::new("/plots/web-throughput.pdf")),
            Some(Path::new("/assets/chapter/eval/web-throughput.pdf"))
        );
        assert_eq!(
            table.destination(Path::new("/plots/web-utilization.svg")),
            Some(Path::new("/assets/chapter/eval/util.svg"))
        );
        assert_eq!(
            table.destination(Path::new("/plots/a.png")),
            Some(Path::new("/assets/appendix/a.png"))
        );
        assert_eq!(table.destination(Path::new("/plots/b.png")), None);
    }

    #[tokio::test]
    async fn existing_artifacts_are_not_regenerated() {
        let dir = TempDir::new().unwrap();
        let renderer = Recorder::default();
        let relocations = RelocationTable::default();
        let mut fan_out = FanOut::new(&renderer, dir.path(), &ALL, &relocations);
        let stem = job_stem("web", "throughput");

        fan_out.emit(&stem, &chart(), Some(&LayoutHints::default())).await.unwrap();
        assert_eq!(renderer.calls(), ALL.to_vec());
        for ext in ["png", "svg", "pdf"] {
            assert!(dir.path().join(format!("web-throughput.{}", ext)).exists());
        }

        fan_out.emit(&stem, &chart(), Some(&LayoutHints::default())).await.unwrap();
        assert_eq!(renderer.calls().len(), 3);
        assert!(fan_out.failures().is_empty());
    }

    #[tokio::test]
    async fn replacements_apply_to_svg_only() {
        let dir = TempDir::new().unwrap();
        let renderer = Recorder::default();
        let relocations = RelocationTable::default();
        let mut fan_out = FanOut::new(&renderer, dir.path(), &ALL, &relocations);
        fan_out.emit(Path::new("custom/fig"), &chart(), None).await.unwrap();

        let svg = std::fs::read_to_string(dir.path().join("custom/fig.svg")).unwrap();
        assert_eq!(svg, "<svg>1 µ</svg>");
        let png = std::fs::read_to_string(dir.path().join("custom/fig.png")).unwrap();
        assert!(png.contains("$$MU$$"));
    }

    #[tokio::test]
    async fn render_failures_are_collected() {
        let dir = TempDir::new().unwrap();
        let renderer = Recorder {
            fail: true,
            ..Default::default()
        };
        let relocations = RelocationTable::default();
        let mut fan_out = FanOut::new(&renderer, dir.path(), &ALL, &relocations);
        fan_out.emit(Path::new("x"), &chart(), None).await.unwrap();

        assert_eq!(fan_out.failures().len(), 3);
        assert!(!dir.path().join("x.png").exists());
        assert!(fan_out.failures()[0].reason.contains("boom"));
    }

    #[tokio::test]
    async fn unsupported_formats_are_dropped() {
        let dir = TempDir::new().unwrap();
        let renderer = Recorder {
            vector_only: true,
            ..Default::default()
        };
        let relocations = RelocationTable::default();
        let mut fan_out = FanOut::new(&renderer, dir.path(), &ALL, &relocations);
        assert_eq!(fan_out.formats(), &[OutputFormat::Svg]);

        fan_out.emit(Path::new("x"), &chart(), None).await.unwrap();
        assert_eq!(renderer.calls(), vec![OutputFormat::Svg]);
        assert!(!dir.path().join("x.png").exists());
    }

    #[tokio::test]
    async fn relocated_artifacts_are_copied() {
        let plots = TempDir::new().unwrap();
        let assets = TempDir::new().unwrap();
        let relocations = RelocationTable::parse(
            r#"{"eval": [["web-throughput.svg", "tp.svg"]]}"#,
            plots.path(),
            assets.path(),
        )
        .unwrap();
        let renderer = Recorder::default();
        let mut fan_out = FanOut::new(&renderer, plots.path(), &[OutputFormat::Svg], &relocations);
        fan_out.emit(&job_stem("web", "throughput"), &chart(), None).await.unwrap();

        let copied = std::fs::read_to_string(assets.path().join("eval/tp.svg")).unwrap();
        assert_eq!(copied, "<svg>1 µ</svg>");
    }

    #[tokio::test]
    async fn summary_file_is_rewritten_per_job() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join("web")).unwrap();
        let writer = SummaryWriter::new(dir.path(), true);
        let path = dir.path().join("web/duration.meta.txt");

        writer
            .write("web", PlotKind::Duration, &["first".into(), "second".into()])
            .await
            .unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "first\nsecond\n");

        writer.write("web", PlotKind::Duration, &["third".into()]).await.unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "third\n");

        writer.write("web", PlotKind::Duration, &[]).await.unwrap();
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn disabled_summary_leaves_files_alone() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("duration.meta.txt");
        std::fs::write(&path, "old\n").unwrap();
        SummaryWriter::new(dir.path(), false)
            .write("", PlotKind::Duration, &["new".into()])
            .await
            .unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "old\n");
    }
}
