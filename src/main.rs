//! benchplot - turns runtime benchmark results into comparative charts.
//!
//! Scans a data directory for `plots.json` job files, joins the referenced
//! benchmark files with runtime and hardware metadata, derives metrics per
//! plot type and renders every figure as PNG, SVG and PDF.

mod catalog;
mod chart;
mod config;
mod error;
mod ingest;
mod metrics;
mod model;
mod output;
mod plot;
mod render;

use anyhow::{Context, Result};
use catalog::Catalog;
use clap::Parser;
use config::{ReferenceData, Settings};
use output::{FanOut, SummaryWriter};
use plot::PlotKind;
use render::{ChartRenderer, RemoteRenderer, SvgRenderer};
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Benchmark plotting CLI for comparing runtime configurations
#[derive(Parser, Debug)]
#[command(name = "benchplot")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Directory holding benchmark results and plots.json files
    #[arg(short, long, default_value = "data")]
    data_dir: PathBuf,

    /// Directory the rendered plots are written to
    #[arg(short, long, default_value = "plots")]
    plot_dir: PathBuf,

    /// Do not update the .meta.txt summary files
    #[arg(long)]
    no_meta: bool,

    /// Skip PDF output
    #[arg(long)]
    no_pdf: bool,

    /// Runtime table (JSON array of {id, name, color?})
    #[arg(long)]
    runtimes: Option<PathBuf>,

    /// Colour palette (JSON array of colour strings)
    #[arg(long)]
    palette: Option<PathBuf>,

    /// Relocation map of plots to copy elsewhere (file-list.json)
    #[arg(long)]
    relocations: Option<PathBuf>,

    /// Root directory for relocated plot copies
    #[arg(long, default_value = "assets")]
    assets_dir: PathBuf,

    /// Image export endpoint; without it only SVG is rendered locally
    #[arg(long, env = "BENCHPLOT_RENDER_URL")]
    render_url: Option<String>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    fn settings(&self) -> Settings {
        Settings {
            data_dir: self.data_dir.clone(),
            plot_dir: self.plot_dir.clone(),
            write_summaries: !self.no_meta,
            include_pdf: !self.no_pdf,
            runtimes_file: self.runtimes.clone(),
            palette_file: self.palette.clone(),
            relocations_file: self.relocations.clone(),
            assets_dir: self.assets_dir.clone(),
            render_url: self.render_url.clone(),
        }
    }
}

fn create_dir(path: &Path) -> Result<()> {
    std::fs::create_dir_all(path)
        .with_context(|| format!("Failed to create directory: {}", path.display()))
}

async fn run(settings: &Settings) -> Result<()> {
    create_dir(&settings.plot_dir)?;
    create_dir(&settings.data_dir)?;

    let reference = ReferenceData::load(settings)?;
    let renderer: Box<dyn ChartRenderer> = match &settings.render_url {
        Some(url) => {
            info!("Rendering through {}", url);
            Box::new(RemoteRenderer::new(url.clone()))
        }
        None => Box::new(SvgRenderer::new(reference.palette.clone())),
    };

    let catalog = Catalog::discover(&settings.data_dir, &reference.runtimes, &reference.palette)?;
    let summaries = SummaryWriter::new(&settings.data_dir, settings.write_summaries);
    let mut fan_out = FanOut::new(
        renderer.as_ref(),
        &settings.plot_dir,
        &settings.formats(),
        &reference.relocations,
    );

    for figure in catalog.load_custom_figures()? {
        let stem = Path::new(&figure.directory).join(&figure.name);
        fan_out.emit(&stem, &figure.chart, None).await?;
    }

    for job in catalog.load_jobs()? {
        info!("Plotting directory {} with plot type {}", job.directory, job.kind);
        let kind: PlotKind = match job.kind.parse() {
            Ok(kind) => kind,
            Err(e) => {
                warn!("{}", e);
                continue;
            }
        };

        let plan = plot::build(kind, &job).with_context(|| {
            format!("Failed to plot directory {} with plot type {}", job.directory, kind)
        })?;
        summaries.write(&job.directory, kind, &plan.summary).await?;

        for figure in &plan.figures {
            let stem = output::job_stem(&job.directory, &figure.name);
            fan_out.emit(&stem, &figure.chart, Some(&figure.hints)).await?;
        }
    }

    let failures = fan_out.failures();
    if !failures.is_empty() {
        error!("{} plots could not be created:", failures.len());
        for failure in failures {
            error!("  {}: {}", failure.path.display(), failure.reason);
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .with_writer(std::io::stderr)
        .compact()
        .init();

    run(&args.settings()).await
}
