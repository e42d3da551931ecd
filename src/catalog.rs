//! Discovery of plot jobs and joining of benchmark files with reference data.

use crate::chart::{ChartSpec, LayoutHints};
use crate::ingest;
use crate::model::{ColorRef, HardwareProfile, RecordSet, Runtime};
use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::debug;

const PLOTS_FILE: &str = "plots.json";
const HARDWARE_FILE: &str = "hardware.json";
const CUSTOM_PLOTS_FILE: &str = "custom-plots.json";
const DEFAULT_FILES: &str = "**/*.json";

/// Ordered colour palette.
#[derive(Debug, Clone, PartialEq)]
pub struct Palette(Vec<String>);

impl Palette {
    pub fn new(colors: Vec<String>) -> Result<Self> {
        if colors.is_empty() {
            bail!("Colour palette must contain at least one colour");
        }
        Ok(Self(colors))
    }

    /// Palette entry at `index`, wrapping around.
    pub fn get(&self, index: usize) -> &str {
        &self.0[index % self.0.len()]
    }
}

impl Default for Palette {
    fn default() -> Self {
        Self(
            [
                "#1f77b4", "#ff7f0e", "#2ca02c", "#d62728", "#9467bd", "#8c564b", "#e377c2",
                "#7f7f7f", "#bcbd22", "#17becf",
            ]
            .iter()
            .map(|c| c.to_string())
            .collect(),
        )
    }
}

/// Entry of a runtime table file. Colour defaults to the palette slot.
#[derive(Debug, Clone, Deserialize)]
pub struct RuntimeDef {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub color: Option<String>,
}

/// Immutable table of known runtimes, ordered by display position.
#[derive(Debug, Clone)]
pub struct RuntimeTable {
    runtimes: Vec<Runtime>,
}

impl RuntimeTable {
    pub fn new(defs: Vec<RuntimeDef>, palette: &Palette) -> Self {
        let runtimes = defs
            .into_iter()
            .enumerate()
            .map(|(index, def)| Runtime {
                color: def.color.unwrap_or_else(|| palette.get(index).to_string()),
                id: def.id,
                name: def.name,
                index,
            })
            .collect();
        Self { runtimes }
    }

    /// The runtimes of the study, in legend order.
    pub fn builtin(palette: &Palette) -> Self {
        let defs = [
            ("linux", "Linux"),
            ("occlum", "Occlum"),
            ("gramine", "Gramine"),
            ("hybrid.scone-s1", "SCONE switchful"),
            ("scone", "SCONE"),
            ("scone-s3", "TAB"),
            ("scone-s1", "CTRL balanced"),
            ("balanced.scone-s1", "CTRL balanced"),
            ("eco.scone-s1", "CTRL eco"),
            ("performance.scone-s1", "CTRL perf."),
        ]
        .iter()
        .map(|(id, name)| RuntimeDef {
            id: id.to_string(),
            name: name.to_string(),
            color: None,
        })
        .collect();
        Self::new(defs, palette)
    }

    pub fn get(&self, id: &str) -> Option<&Runtime> {
        self.runtimes.iter().find(|r| r.id == id)
    }

    pub fn len(&self) -> usize {
        self.runtimes.len()
    }
}

/// `files` of a plot config: one glob or several.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum FilePatterns {
    One(String),
    Many(Vec<String>),
}

impl FilePatterns {
    fn patterns(&self) -> Vec<&str> {
        match self {
            FilePatterns::One(p) => vec![p.as_str()],
            FilePatterns::Many(ps) => ps.iter().map(String::as_str).collect(),
        }
    }
}

/// One entry of a `plots.json` array.
#[derive(Debug, Clone, Deserialize)]
pub struct PlotConfig {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub files: Option<FilePatterns>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub normalize: bool,
    #[serde(flatten)]
    pub hints: LayoutHints,
}

/// A record set joined with its runtime and hardware metadata.
#[derive(Debug, Clone)]
pub struct Entry {
    pub runtime: Runtime,
    pub record: RecordSet,
    /// Resolved trace colour.
    pub color: String,
    pub hardware: Option<HardwareProfile>,
    pub source: PathBuf,
}

/// A plot config with its benchmark files resolved and joined.
#[derive(Debug, Clone)]
pub struct PlotJob {
    /// Directory of the `plots.json`, relative to the data directory.
    pub directory: String,
    pub kind: String,
    pub name: Option<String>,
    pub normalize: bool,
    pub hints: LayoutHints,
    pub entries: Vec<Entry>,
}

/// A literal chart from a `custom-plots.json` file.
#[derive(Debug, Clone)]
pub struct CustomFigure {
    pub directory: String,
    pub name: String,
    pub chart: ChartSpec,
}

/// Reference data plus the hardware profiles found under the data directory.
pub struct Catalog<'a> {
    data_dir: &'a Path,
    runtimes: &'a RuntimeTable,
    palette: &'a Palette,
    hardware: Vec<(PathBuf, HardwareProfile)>,
}

impl<'a> Catalog<'a> {
    /// Scan `data_dir` for hardware profiles.
    pub fn discover(data_dir: &'a Path, runtimes: &'a RuntimeTable, palette: &'a Palette) -> Result<Self> {
        let mut hardware = Vec::new();
        for path in glob_files(data_dir, &format!("**/{}", HARDWARE_FILE))? {
            let profile: HardwareProfile = read_json(&path)?;
            let dir = path.parent().unwrap_or(data_dir).to_path_buf();
            debug!("Hardware profile {} applies to {}", profile.cpu_name, dir.display());
            hardware.push((dir, profile));
        }
        Ok(Self {
            data_dir,
            runtimes,
            palette,
            hardware,
        })
    }

    /// Resolve every `plots.json` entry into a job, in discovery order.
    pub fn load_jobs(&self) -> Result<Vec<PlotJob>> {
        let mut jobs = Vec::new();
        for path in glob_files(self.data_dir, &format!("**/{}", PLOTS_FILE))? {
            let configs: Vec<PlotConfig> = read_json(&path)?;
            let dir = path.parent().unwrap_or(self.data_dir);
            let directory = self.relative(dir);
            for config in configs {
                let entries = self.load_entries(dir, config.files.as_ref())?;
                debug!(
                    "Job {} in {:?}: {} benchmark files",
                    config.kind,
                    directory,
                    entries.len()
                );
                jobs.push(PlotJob {
                    directory: directory.clone(),
                    kind: config.kind,
                    name: config.name,
                    normalize: config.normalize,
                    hints: config.hints,
                    entries,
                });
            }
        }
        Ok(jobs)
    }

    /// Load every `custom-plots.json`, sorted by figure name per file.
    pub fn load_custom_figures(&self) -> Result<Vec<CustomFigure>> {
        let mut figures = Vec::new();
        for path in glob_files(self.data_dir, &format!("**/{}", CUSTOM_PLOTS_FILE))? {
            let charts: BTreeMap<String, ChartSpec> = read_json(&path)?;
            let directory = self.relative(path.parent().unwrap_or(self.data_dir));
            figures.extend(charts.into_iter().map(|(name, chart)| CustomFigure {
                directory: directory.clone(),
                name,
                chart,
            }));
        }
        Ok(figures)
    }

    fn load_entries(&self, dir: &Path, files: Option<&FilePatterns>) -> Result<Vec<Entry>> {
        let patterns = files.map(FilePatterns::patterns).unwrap_or_else(|| vec![DEFAULT_FILES]);
        let mut entries: Vec<Entry> = Vec::new();
        for pattern in patterns {
            for path in glob_files(dir, pattern)? {
                if is_sidecar(&path) {
                    debug!("Skipping sidecar {}", path.display());
                    continue;
                }
                let Some(runtime) = self.runtime_for(&path) else {
                    continue;
                };
                let record = ingest::load_record_set(&path)?;
                let entry = Entry {
                    color: self.color_for(&record, runtime),
                    runtime: runtime.clone(),
                    hardware: self.hardware_for(&path).cloned(),
                    record,
                    source: path,
                };
                let duplicate = entries
                    .iter()
                    .any(|e| e.runtime.id == entry.runtime.id && e.record == entry.record);
                if duplicate {
                    debug!("Skipping duplicate benchmark {}", entry.source.display());
                } else {
                    entries.push(entry);
                }
            }
        }
        Ok(entries)
    }

    /// Runtime whose id equals the file stem, if any.
    fn runtime_for(&self, path: &Path) -> Option<&'a Runtime> {
        let runtimes: &'a RuntimeTable = self.runtimes;
        path.file_stem()
            .and_then(|s| s.to_str())
            .and_then(|stem| runtimes.get(stem))
    }

    fn color_for(&self, record: &RecordSet, runtime: &Runtime) -> String {
        match &record.color {
            Some(ColorRef::Index(i)) => self.palette.get(*i).to_string(),
            Some(ColorRef::Literal(c)) => c.clone(),
            None => runtime.color.clone(),
        }
    }

    /// Profile of the nearest ancestor directory defining one.
    pub fn hardware_for(&self, path: &Path) -> Option<&HardwareProfile> {
        let dir = path.parent().unwrap_or(path);
        self.hardware
            .iter()
            .filter(|(hw_dir, _)| dir.starts_with(hw_dir))
            .max_by_key(|(hw_dir, _)| hw_dir.components().count())
            .map(|(_, profile)| profile)
    }

    fn relative(&self, dir: &Path) -> String {
        dir.strip_prefix(self.data_dir)
            .unwrap_or(dir)
            .to_string_lossy()
            .into_owned()
    }
}

/// A `.json` next to a same-named `.csv` holds extra fields for that CSV.
fn is_sidecar(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "json") && path.with_extension("csv").is_file()
}

/// Files below `base` matching `pattern`, in glob's sorted order.
pub fn glob_files(base: &Path, pattern: &str) -> Result<Vec<PathBuf>> {
    let Some(base_str) = base.to_str() else {
        bail!("Path is not valid UTF-8: {}", base.display());
    };
    let full = format!("{}/{}", glob::Pattern::escape(base_str), pattern);
    let mut files = Vec::new();
    for entry in glob::glob(&full).with_context(|| format!("Invalid file pattern: {}", pattern))? {
        let path = entry.with_context(|| format!("Failed to scan for {}", full))?;
        if path.is_file() {
            files.push(path);
        }
    }
    Ok(files)
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))
}
