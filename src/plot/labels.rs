//! Legend names, dash styles and marker shapes shared by the plot builders.

use crate::catalog::Entry;
use crate::chart::Trace;
use crate::error::PlotError;
use crate::model::{Dash, EnvInfo, RecordSet, Runtime};

const SETUP_GROUP: &str = "setup";
const BLACK: &str = "#000000";

/// An entry with its queue configuration extracted once.
#[derive(Debug, Clone, Copy)]
pub struct Candidate<'a> {
    pub entry: &'a Entry,
    pub env: Option<EnvInfo>,
}

impl<'a> Candidate<'a> {
    pub fn new(entry: &'a Entry) -> Self {
        Self {
            entry,
            env: entry.record.env_info(),
        }
    }

    pub fn runtime(&self) -> &'a Runtime {
        &self.entry.runtime
    }

    pub fn record(&self) -> &'a RecordSet {
        &self.entry.record
    }

    pub fn color(&self) -> &'a str {
        &self.entry.color
    }

    /// Name override, else the runtime's display name.
    pub fn display_name(&self) -> String {
        match &self.entry.record.name {
            Some(name) => name.clone(),
            None => self.runtime().name.clone(),
        }
    }

    /// Like [`display_name`](Self::display_name) but qualified with the queue
    /// configuration for SCONE runtimes. Used in summary files.
    pub fn full_name(&self) -> String {
        if let Some(name) = &self.entry.record.name {
            return name.clone();
        }
        match self.env {
            Some(env) if self.runtime().is_scone() => format!("{}, {}", self.runtime().name, env),
            _ => self.runtime().name.clone(),
        }
    }

    /// Non-SCONE runtimes and the 8Q/8E SCONE configuration carry the legend
    /// entry of their runtime family.
    pub fn is_canonical(&self) -> bool {
        !self.runtime().is_scone() || self.env_canonical()
    }

    /// True without a queue configuration or for 8Q/8E.
    pub fn env_canonical(&self) -> bool {
        self.env.map_or(true, |env| env.is_canonical())
    }

    /// `"(4Q 2E)"` padded with one space per runtime index, so boxes of
    /// different runtimes never share a category.
    pub fn compact_label(&self) -> Option<String> {
        self.env
            .map(|env| format!("({}){}", env, " ".repeat(self.runtime().index)))
    }

    /// Category label of a box: the runtime name for canonical entries,
    /// otherwise the compact queue label.
    pub fn box_label(&self) -> String {
        if self.is_canonical() {
            return self.display_name();
        }
        self.compact_label().unwrap_or_else(|| self.display_name())
    }

    pub fn require_env(&self) -> Result<EnvInfo, PlotError> {
        self.env.ok_or_else(|| PlotError::MissingEnvironment {
            runtime: self.runtime().id.clone(),
            name: "SCONE_QUEUES",
        })
    }
}

/// Dash style representing a queue configuration in multi-setup plots.
pub fn dash_for(env: EnvInfo) -> Dash {
    match (env.queues, env.ethreads) {
        (1, 1) => Dash::Dash,
        (1, 2) => Dash::Dot,
        (1, 4) => Dash::Longdash,
        (1, 8) => Dash::Longdashdot,
        (4, 4) => Dash::Dashdot,
        (8, 8) => Dash::Solid,
        _ => Dash::Dashdot,
    }
}

/// Marker shape of a queue configuration in the median scatter plot.
pub fn marker_symbol(env: EnvInfo) -> Result<&'static str, PlotError> {
    match (env.queues, env.ethreads) {
        (1, 1) => Ok("triangle-up"),
        (1, 2) => Ok("hourglass"),
        (2, 2) => Ok("square"),
        (1, 8) => Ok("asterisk"),
        (8, 8) => Ok("circle"),
        (queues, ethreads) => Err(PlotError::UnknownMarker { queues, ethreads }),
    }
}

/// Distinct queue configurations in first-seen order.
#[derive(Debug, Default)]
pub struct QueueConfigs(Vec<EnvInfo>);

impl QueueConfigs {
    pub fn observe(&mut self, env: Option<EnvInfo>) {
        if let Some(env) = env {
            if !self.0.contains(&env) {
                self.0.push(env);
            }
        }
    }

    /// One black dummy trace per configuration, styled with its dash.
    pub fn legend(&self) -> Vec<Trace> {
        self.0
            .iter()
            .map(|&env| setup_trace(env.to_string(), Some(dash_for(env)), 0.0))
            .collect()
    }
}

/// The two-entry setup legend used by plots comparing 8Q/8E against 1Q/1E.
pub fn fixed_setup_legend() -> Vec<Trace> {
    vec![
        setup_trace("8Q 8E".to_string(), None, 2.0),
        setup_trace("1Q 1E".to_string(), Some(Dash::Dash), 2.0),
    ]
}

fn setup_trace(name: String, dash: Option<Dash>, x: f64) -> Trace {
    Trace::lines(name, vec![0.0])
        .with_x(vec![x])
        .color(BLACK)
        .dash(dash)
        .legend(true)
        .group(SETUP_GROUP)
}
