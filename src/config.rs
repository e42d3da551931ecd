//! Run settings and the static reference data injected into the pipeline.

use crate::catalog::{Palette, RuntimeDef, RuntimeTable};
use crate::chart::OutputFormat;
use crate::output::RelocationTable;
use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Immutable settings for one run.
#[derive(Debug, Clone)]
pub struct Settings {
    pub data_dir: PathBuf,
    pub plot_dir: PathBuf,
    pub write_summaries: bool,
    pub include_pdf: bool,
    /// JSON array of `{id, name, color?}` replacing the built-in runtimes.
    pub runtimes_file: Option<PathBuf>,
    /// JSON array of colour strings replacing the default palette.
    pub palette_file: Option<PathBuf>,
    pub relocations_file: Option<PathBuf>,
    pub assets_dir: PathBuf,
    pub render_url: Option<String>,
}

impl Settings {
    /// Requested output formats, in generation order.
    pub fn formats(&self) -> Vec<OutputFormat> {
        let mut formats = vec![OutputFormat::Png, OutputFormat::Svg];
        if self.include_pdf {
            formats.push(OutputFormat::Pdf);
        }
        formats
    }
}

/// Runtime table, palette and relocation map, loaded once per run.
#[derive(Debug, Clone)]
pub struct ReferenceData {
    pub palette: Palette,
    pub runtimes: RuntimeTable,
    pub relocations: RelocationTable,
}

impl ReferenceData {
    pub fn load(settings: &Settings) -> Result<Self> {
        let palette = match &settings.palette_file {
            Some(path) => Palette::new(read_json(path)?)
                .with_context(|| format!("Invalid palette: {}", path.display()))?,
            None => Palette::default(),
        };

        let runtimes = match &settings.runtimes_file {
            Some(path) => {
                let defs: Vec<RuntimeDef> = read_json(path)?;
                RuntimeTable::new(defs, &palette)
            }
            None => RuntimeTable::builtin(&palette),
        };
        debug!("Loaded {} runtimes", runtimes.len());

        let relocations = match &settings.relocations_file {
            Some(path) => {
                let table = RelocationTable::load(path, &settings.plot_dir, &settings.assets_dir)?;
                info!("Copying {} plots to {}", table.len(), settings.assets_dir.display());
                table
            }
            None => RelocationTable::default(),
        };

        Ok(Self {
            palette,
            runtimes,
            relocations,
        })
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("Failed to parse {}", path.display()))
}
