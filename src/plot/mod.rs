//! Plot-type dispatch: turns a resolved [`PlotJob`] into chart figures and
//! summary lines.
//!
//! Every plot type is a pure function over the job's entries. Entries are
//! visited in canonical order (runtime index, then queue configuration);
//! box plots flip the queue configuration to descending so the largest
//! setup of a runtime is drawn first.

mod frequency;
mod labels;
mod latency;
mod throughput;

use crate::catalog::PlotJob;
use crate::chart::{Axis, ChartSpec, Layout, LayoutHints, Trace};
use crate::error::{PlotError, UnknownPlotKind};
use labels::Candidate;
use std::cmp::Reverse;
use std::fmt;
use std::str::FromStr;

/// Closed set of plot types understood in `plots.json`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PlotKind {
    ParameterTest,
    CpuAccumulate,
    ThroughputBox,
    UtilizationBox,
    UtilizationAtFrequencyBox,
    UtilizationAtFrequency,
    UtilizationThroughput,
    UtilizationThroughputUnsorted,
    UtilizationThroughputMedian,
    Throughput,
    ThroughputBar,
    Utilization,
    Duration,
    DurationBox,
    EfficiencyBox,
    Frequency,
    LatencyThroughput,
}

impl PlotKind {
    pub const ALL: [PlotKind; 17] = [
        PlotKind::ParameterTest,
        PlotKind::CpuAccumulate,
        PlotKind::ThroughputBox,
        PlotKind::UtilizationBox,
        PlotKind::UtilizationAtFrequencyBox,
        PlotKind::UtilizationAtFrequency,
        PlotKind::UtilizationThroughput,
        PlotKind::UtilizationThroughputUnsorted,
        PlotKind::UtilizationThroughputMedian,
        PlotKind::Throughput,
        PlotKind::ThroughputBar,
        PlotKind::Utilization,
        PlotKind::Duration,
        PlotKind::DurationBox,
        PlotKind::EfficiencyBox,
        PlotKind::Frequency,
        PlotKind::LatencyThroughput,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            PlotKind::ParameterTest => "PARAMETER-TEST",
            PlotKind::CpuAccumulate => "CPU-ACCUMULATE",
            PlotKind::ThroughputBox => "THROUGHPUT-BOX",
            PlotKind::UtilizationBox => "UTILIZATION-BOX",
            PlotKind::UtilizationAtFrequencyBox => "UTILIZATION-AT-FREQUENCY-BOX",
            PlotKind::UtilizationAtFrequency => "UTILIZATION-AT-FREQUENCY",
            PlotKind::UtilizationThroughput => "UTILIZATION-THROUGHPUT",
            PlotKind::UtilizationThroughputUnsorted => "UTILIZATION-THROUGHPUT-UNSORTED",
            PlotKind::UtilizationThroughputMedian => "UTILIZATION-THROUGHPUT-MEDIAN",
            PlotKind::Throughput => "THROUGHPUT",
            PlotKind::ThroughputBar => "THROUGHPUT-BAR",
            PlotKind::Utilization => "UTILIZATION",
            PlotKind::Duration => "DURATION",
            PlotKind::DurationBox => "DURATION-BOX",
            PlotKind::EfficiencyBox => "EFFICIENCY-BOX",
            PlotKind::Frequency => "FREQUENCY",
            PlotKind::LatencyThroughput => "LATENCY-THROUGHPUT",
        }
    }

    /// File name of the per-directory summary file.
    pub fn meta_file_name(self) -> String {
        format!("{}.meta.txt", self.as_str().to_lowercase())
    }

    /// Box plots list a runtime's larger queue configurations first.
    fn sorts_descending(self) -> bool {
        matches!(
            self,
            PlotKind::ThroughputBox
                | PlotKind::UtilizationBox
                | PlotKind::UtilizationAtFrequencyBox
                | PlotKind::EfficiencyBox
        )
    }
}

impl FromStr for PlotKind {
    type Err = UnknownPlotKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PlotKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| UnknownPlotKind(s.to_string()))
    }
}

impl fmt::Display for PlotKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One chart to render, named by its output file stem suffix.
#[derive(Debug, Clone)]
pub struct Figure {
    pub name: String,
    pub chart: ChartSpec,
    pub hints: LayoutHints,
}

/// Output of one plot job.
#[derive(Debug, Clone, Default)]
pub struct Plan {
    pub figures: Vec<Figure>,
    /// Lines for the summary file, in order.
    pub summary: Vec<String>,
    hints: LayoutHints,
}

impl Plan {
    fn new(hints: &LayoutHints) -> Self {
        Self {
            hints: hints.clone(),
            ..Default::default()
        }
    }

    /// Add a figure unless it has no data. `legend` traces are appended after
    /// the data traces.
    fn add(&mut self, name: &str, mut data: Vec<Trace>, legend: Vec<Trace>, layout: Layout) {
        if data.is_empty() {
            return;
        }
        data.extend(legend);
        self.figures.push(Figure {
            name: name.to_string(),
            chart: ChartSpec::new(data, layout),
            hints: self.hints.clone(),
        });
    }

    fn note(&mut self, line: String) {
        self.summary.push(line);
    }
}

/// Build every figure and summary line for `job`.
pub fn build(kind: PlotKind, job: &PlotJob) -> Result<Plan, PlotError> {
    let mut candidates: Vec<Candidate> = job.entries.iter().map(Candidate::new).collect();
    if kind.sorts_descending() {
        candidates.sort_by_key(|c| (c.runtime().index, c.env.is_some(), Reverse(c.env)));
    } else {
        candidates.sort_by_key(|c| (c.runtime().index, c.env.is_none(), c.env));
    }

    let mut plan = Plan::new(&job.hints);
    let name = job.name.as_deref();
    match kind {
        PlotKind::ParameterTest => frequency::parameter_test(&mut plan, &candidates, job.normalize)?,
        PlotKind::CpuAccumulate => frequency::cpu_accumulate(&mut plan, &candidates)?,
        PlotKind::UtilizationAtFrequencyBox => frequency::utilization_box(&mut plan, &candidates, name)?,
        PlotKind::UtilizationAtFrequency => frequency::utilization_line(&mut plan, &candidates, name)?,
        PlotKind::Frequency => frequency::frequency(&mut plan, &candidates),
        PlotKind::ThroughputBox => throughput::throughput_box(&mut plan, &candidates, name)?,
        PlotKind::UtilizationBox => throughput::utilization_box(&mut plan, &candidates, name),
        PlotKind::EfficiencyBox => throughput::efficiency_box(&mut plan, &candidates, name)?,
        PlotKind::UtilizationThroughputMedian => throughput::median_scatter(&mut plan, &candidates)?,
        PlotKind::Throughput => throughput::throughput(&mut plan, &candidates)?,
        PlotKind::ThroughputBar => throughput::throughput_bar(&mut plan, &candidates)?,
        PlotKind::Utilization => throughput::utilization(&mut plan, &candidates)?,
        PlotKind::Duration => throughput::duration(&mut plan, &candidates)?,
        PlotKind::DurationBox => throughput::duration_box(&mut plan, &candidates)?,
        PlotKind::UtilizationThroughput => {
            latency::utilization_throughput(&mut plan, &candidates, name, job.normalize, true)?
        }
        PlotKind::UtilizationThroughputUnsorted => {
            latency::utilization_throughput(&mut plan, &candidates, name, job.normalize, false)?
        }
        PlotKind::LatencyThroughput => latency::latency_throughput(&mut plan, &candidates, name),
    }
    Ok(plan)
}

/// Ensures all compared benchmarks ran with the same number of threads.
#[derive(Debug, Default)]
struct ThreadGuard(Option<u32>);

impl ThreadGuard {
    fn check(&mut self, threads: u32) -> Result<u32, PlotError> {
        match self.0 {
            None => {
                self.0 = Some(threads);
                Ok(threads)
            }
            Some(expected) if expected == threads => Ok(threads),
            Some(expected) => Err(PlotError::ThreadMismatch {
                expected,
                found: threads,
            }),
        }
    }

    fn threads(&self) -> u32 {
        self.0.unwrap_or_default()
    }
}

/// Last buffer size other than 1 seen in a write benchmark series.
#[derive(Debug, Default)]
struct BufferSize(Option<u64>);

impl BufferSize {
    fn observe(&mut self, size: Option<u64>) {
        if let Some(size) = size.filter(|&s| s != 0 && s != 1) {
            self.0 = Some(size);
        }
    }

    /// Scale from calls per second to MB per second.
    fn multiplier(&self) -> f64 {
        self.0.map_or(1.0, |size| size as f64 / 1e6)
    }

    /// `"SGX System Call"` or `"4096 Byte Write in SGX"`, pluralized.
    fn subject(&self, plural: bool) -> String {
        let s = if plural { "s" } else { "" };
        match self.0 {
            None => format!("SGX System Call{}", s),
            Some(size) => format!("{} Byte Write{} in SGX", size, s),
        }
    }

    fn unit(&self) -> &'static str {
        if self.0.is_some() {
            "MB"
        } else {
            "req"
        }
    }
}

fn bold(text: &str) -> String {
    format!("<b>{}</b>", text)
}

fn axis(label: &str, unit: Option<&str>) -> Axis {
    match unit {
        Some(unit) => Axis::titled(format!("{} [{}]", bold(label), unit)),
        None => Axis::titled(bold(label)),
    }
}

fn titled(title: String, xaxis: Axis, yaxis: Axis) -> Layout {
    Layout {
        title: Some(bold(&title).into()),
        xaxis,
        yaxis,
        ..Default::default()
    }
}
