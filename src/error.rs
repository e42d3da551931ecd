//! Error types for the loading, plotting and rendering stages.

use thiserror::Error;

/// Failure while turning a raw benchmark file into a record set.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("\"{0}\" is not a valid time duration string")]
    InvalidDuration(String),

    #[error("line {line}, column `{column}`: cannot parse \"{value}\": {reason}")]
    InvalidValue {
        line: usize,
        column: String,
        value: String,
        reason: String,
    },

    #[error("line {line}: malformed CSV record")]
    Csv {
        line: usize,
        #[source]
        source: csv::Error,
    },

    #[error("CSV file has a header but no data rows")]
    NoRows,

    #[error("unknown benchmark file type \"{0}\"")]
    UnknownExtension(String),

    #[error("runtime array has {runtimes} entries but CPU time array has {cpu_times}")]
    LengthMismatch { runtimes: usize, cpu_times: usize },

    #[error("invalid benchmark object")]
    Json(#[from] serde_json::Error),
}

/// Consistency violation detected while building a plot.
#[derive(Debug, Error)]
pub enum PlotError {
    #[error("trying to compare benchmarks with different thread configuration ({expected} vs {found})")]
    ThreadMismatch { expected: u32, found: u32 },

    #[error("target frequency varies from {first} to {last}, cannot plot this")]
    VaryingFrequency { first: f64, last: f64 },

    #[error("no marker shape for {queues}Q {ethreads}E")]
    UnknownMarker { queues: u32, ethreads: u32 },

    #[error("{runtime}: environment variable {name} is missing")]
    MissingEnvironment { runtime: String, name: &'static str },

    #[error("{runtime}: frequency benchmark has no samples")]
    NoSamples { runtime: String },

    #[error("{runtime}: latency sample {index} has no server_cpu value")]
    MissingServerCpu { runtime: String, index: usize },
}

/// A `plots.json` entry names a plot type this tool does not know.
#[derive(Debug, Error)]
#[error("unknown plot configuration type: {0}")]
pub struct UnknownPlotKind(pub String);

/// Failure producing a single artifact. Never fatal for the run.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("renderer cannot produce {0} output")]
    UnsupportedFormat(&'static str),

    #[error("drawing failed: {0}")]
    Backend(String),

    #[error("image export request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("could not serialize chart: {0}")]
    Serialize(#[from] serde_json::Error),
}
