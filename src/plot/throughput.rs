//! Plots over back-to-back throughput benchmarks.

use super::labels::{marker_symbol, Candidate};
use super::{axis, titled, BufferSize, Plan, ThreadGuard};
use crate::chart::{Axis, Layout, Legend, MarkerStyle, Orientation, Trace};
use crate::error::PlotError;
use crate::metrics::{
    average, median, micros_to_cycles, per_call_throughput, utilization_percent,
};
use crate::model::{Dash, Runtime, ThroughputRun};

const BOX_LINE_WIDTH: f64 = 1.0;

fn runs<'a, 'c>(
    candidates: &'c [Candidate<'a>],
) -> impl Iterator<Item = (&'c Candidate<'a>, &'a ThroughputRun)> + 'c {
    candidates
        .iter()
        .filter_map(|c| c.record().as_throughput().map(|run| (c, run)))
}

fn utilization_series(run: &ThroughputRun) -> Vec<f64> {
    run.cpu_times_microseconds
        .iter()
        .zip(&run.runtimes_microseconds)
        .map(|(&cpu, &wall)| utilization_percent(cpu, wall, false))
        .collect()
}

/// CPU time per call, divided across the benchmark threads.
fn cpu_per_call(run: &ThroughputRun) -> Vec<f64> {
    let threads = f64::from(run.num_threads);
    run.cpu_times_microseconds.iter().map(|t| t / threads).collect()
}

fn call_throughput(run: &ThroughputRun, multiplier: f64) -> Vec<f64> {
    run.runtimes_microseconds
        .iter()
        .map(|&t| per_call_throughput(t, multiplier))
        .collect()
}

fn box_layout(title: String, yaxis: Axis) -> Layout {
    Layout {
        showlegend: Some(false),
        ..titled(title, Axis::default(), yaxis)
    }
}

fn side_legend() -> Legend {
    Legend {
        x: Some(1.0),
        y: Some(0.5),
        ..Default::default()
    }
}

pub(super) fn throughput_box(
    plan: &mut Plan,
    candidates: &[Candidate],
    name: Option<&str>,
) -> Result<(), PlotError> {
    let mut guard = ThreadGuard::default();
    let mut data = Vec::new();
    for (c, run) in runs(candidates) {
        let threads = guard.check(run.num_threads)?;
        data.push(
            Trace::boxed(c.box_label(), call_throughput(run, f64::from(threads)))
                .color(c.color())
                .dash(c.record().dash),
        );
    }
    plan.add(
        name.unwrap_or("throughput-box"),
        data,
        Vec::new(),
        box_layout(
            "Throughput for High Workload".into(),
            axis("Throughput", Some("req/s")),
        ),
    );
    Ok(())
}

pub(super) fn utilization_box(plan: &mut Plan, candidates: &[Candidate], name: Option<&str>) {
    let data = runs(candidates)
        .map(|(c, run)| {
            Trace::boxed(c.box_label(), utilization_series(run))
                .color(c.color())
                .dash(c.record().dash)
        })
        .collect();
    plan.add(
        name.unwrap_or("cpu-utilization-box"),
        data,
        Vec::new(),
        box_layout(
            "CPU Utilization for high Throughput".into(),
            axis("CPU Utilization", Some("%")),
        ),
    );
}

pub(super) fn efficiency_box(
    plan: &mut Plan,
    candidates: &[Candidate],
    name: Option<&str>,
) -> Result<(), PlotError> {
    let mut guard = ThreadGuard::default();
    let mut buffer = BufferSize::default();
    let mut data = Vec::new();
    for (c, run) in runs(candidates) {
        guard.check(run.num_threads)?;
        buffer.observe(run.buffer_size);
        data.push(
            Trace::boxed(c.box_label(), cpu_per_call(run))
                .color(c.color())
                .line_width(Some(BOX_LINE_WIDTH)),
        );
    }
    let title = format!(
        "Average CPU Time per {} using {} Lthreads",
        buffer.subject(false),
        guard.threads()
    );
    let layout = Layout {
        legend: side_legend(),
        ..box_layout(title, axis("CPU Time per Syscall", Some("us")))
    };
    plan.add(name.unwrap_or("efficiency-box"), data, Vec::new(), layout);
    Ok(())
}

/// One point per benchmark: median throughput against median utilization.
pub(super) fn median_scatter(plan: &mut Plan, candidates: &[Candidate]) -> Result<(), PlotError> {
    let mut guard = ThreadGuard::default();
    let mut data = Vec::new();
    for (c, run) in runs(candidates) {
        let threads = guard.check(run.num_threads)?;
        let symbol = if c.runtime().is_scone() {
            marker_symbol(c.require_env()?)?
        } else {
            "circle"
        };
        let x = median(&call_throughput(run, f64::from(threads)));
        let y = median(&utilization_series(run));
        data.push(Trace::markers(c.runtime().name.clone(), x, y).marker(MarkerStyle {
            color: Some(c.color().to_string()),
            symbol: Some(symbol.to_string()),
            opacity: Some(0.6),
            ..Default::default()
        }));
    }
    let layout = Layout {
        xaxis: axis("Throughput", Some("req/s")),
        yaxis: axis("CPU Utilization", Some("%")),
        legend: Legend {
            orientation: Some(Orientation::Horizontal),
            ..Default::default()
        },
        ..Default::default()
    };
    plan.add("utilization-throughput-median", data, Vec::new(), layout);
    Ok(())
}

pub(super) fn throughput(plan: &mut Plan, candidates: &[Candidate]) -> Result<(), PlotError> {
    let mut guard = ThreadGuard::default();
    let mut buffer = BufferSize::default();
    let mut data = Vec::new();
    for (c, run) in runs(candidates) {
        let threads = guard.check(run.num_threads)?;
        buffer.observe(run.buffer_size);
        let multiplier = buffer.multiplier() * f64::from(threads);
        data.push(
            Trace::lines(c.display_name(), call_throughput(run, multiplier))
                .color(c.color())
                .dash(c.record().dash)
                .opacity(c.record().opacity),
        );
    }
    let title = format!(
        "Max. Throughput of {} using {} Lthreads",
        buffer.subject(true),
        guard.threads()
    );
    let unit = format!("{}/s", buffer.unit());
    let layout = titled(title, axis("Sample", None), axis("Throughput", Some(&unit)));
    plan.add("throughput", data, Vec::new(), layout);
    Ok(())
}

/// Grouped bars of median throughput, one bar group per queue setup.
pub(super) fn throughput_bar(plan: &mut Plan, candidates: &[Candidate]) -> Result<(), PlotError> {
    let mut guard = ThreadGuard::default();
    let mut groups: Vec<(&Runtime, Vec<String>, Vec<f64>)> = Vec::new();
    for (c, run) in runs(candidates) {
        let threads = guard.check(run.num_threads)?;
        let value = median(&call_throughput(run, f64::from(threads)));
        let setup = match c.env {
            Some(env) if c.runtime().is_scone() => format!("{}Q{}E", env.queues, env.ethreads),
            _ => "Other".to_string(),
        };
        let runtime = c.runtime();
        match groups.iter_mut().find(|(r, _, _)| r.id == runtime.id) {
            Some((_, xs, ys)) => {
                xs.push(setup);
                ys.push(value);
            }
            None => groups.push((runtime, vec![setup], vec![value])),
        }
    }
    let data = groups
        .into_iter()
        .map(|(runtime, xs, ys)| {
            Trace::bar(runtime.name.clone(), xs, ys).marker(MarkerStyle {
                color: Some(runtime.color.clone()),
                ..Default::default()
            })
        })
        .collect();
    let layout = Layout {
        barmode: Some("group".to_string()),
        bargroupgap: Some(0.0),
        legend: Legend {
            orientation: Some(Orientation::Horizontal),
            ..Default::default()
        },
        ..titled(
            format!("Median SGX System Call Throughput for {} Lthreads", guard.threads()),
            axis("Setup", None),
            axis("Throughput", Some("req/s")),
        )
    };
    plan.add("throughput-bar", data, Vec::new(), layout);
    Ok(())
}

pub(super) fn utilization(plan: &mut Plan, candidates: &[Candidate]) -> Result<(), PlotError> {
    let mut guard = ThreadGuard::default();
    let mut data = Vec::new();
    for (c, run) in runs(candidates) {
        guard.check(run.num_threads)?;
        data.push(
            Trace::lines(c.display_name(), utilization_series(run))
                .color(c.color())
                .dash(c.record().dash)
                .opacity(c.record().opacity)
                .legend(c.env_canonical()),
        );
    }
    let title = format!(
        "CPU Utilization at High Throughput using {} Lthreads",
        guard.threads()
    );
    let layout = titled(title, axis("Sample", None), axis("CPU Utilization", Some("%")));
    plan.add("utilization", data, Vec::new(), layout);
    Ok(())
}

/// Per-call latency and CPU time, plus the duration summary.
pub(super) fn duration(plan: &mut Plan, candidates: &[Candidate]) -> Result<(), PlotError> {
    let mut guard = ThreadGuard::default();
    let mut buffer = BufferSize::default();
    let mut data = Vec::new();
    for (c, run) in runs(candidates) {
        guard.check(run.num_threads)?;
        buffer.observe(run.buffer_size);
        let name = c.display_name();
        let cpu = cpu_per_call(run);
        let util = utilization_series(run);

        data.push(
            Trace::lines(format!("Runtime ({})", name), run.runtimes_microseconds.clone())
                .color(c.color())
                .dash(c.record().dash),
        );
        data.push(
            Trace::lines(format!("CPU-Time ({})", name), cpu.clone())
                .color(c.color())
                .dash(Some(c.record().dash.unwrap_or(Dash::Dash)))
                .opacity(c.record().opacity),
        );

        let long = c.full_name();
        let runtimes = &run.runtimes_microseconds;
        plan.note(format!("Average syscall duration of {}: {}µs", long, average(runtimes)));
        plan.note(format!("Median syscall duration of {}: {}µs", long, median(runtimes)));
        if let Some(hw) = &c.entry.hardware {
            plan.note(format!(
                "Median syscall duration of {} on {}: {} cycles",
                long,
                hw.cpu_name,
                micros_to_cycles(hw.cpu_frequency, median(runtimes))
            ));
        }
        plan.note(format!("Average syscall CPU time of {}: {}µs", long, average(&cpu)));
        plan.note(format!("Median syscall CPU time of {}: {}µs", long, median(&cpu)));
        plan.note(format!("Average syscall CPU utilization of {}: {}%", long, average(&util)));
        plan.note(format!("Median syscall CPU utilization of {}: {}%\n", long, median(&util)));
    }
    let title = format!(
        "Average Duration of a single {} using {} Lthreads",
        buffer.subject(false),
        guard.threads()
    );
    let layout = titled(title, axis("Sample", None), axis("Duration", Some("us")));
    plan.add("duration", data, Vec::new(), layout);
    Ok(())
}

/// Latency and CPU time boxes side by side for every benchmark.
pub(super) fn duration_box(plan: &mut Plan, candidates: &[Candidate]) -> Result<(), PlotError> {
    let mut guard = ThreadGuard::default();
    let mut buffer = BufferSize::default();
    let mut data = Vec::new();
    for (i, (c, run)) in runs(candidates).enumerate() {
        guard.check(run.num_threads)?;
        buffer.observe(run.buffer_size);
        data.push(
            Trace::boxed(c.runtime().name.clone(), run.runtimes_microseconds.clone())
                .color(c.color())
                .line_width(Some(BOX_LINE_WIDTH)),
        );
        data.push(
            Trace::boxed(" ".repeat(i), cpu_per_call(run))
                .color(c.color())
                .line_width(Some(BOX_LINE_WIDTH))
                .legend(false)
                .opacity(Some(0.6)),
        );
    }
    let title = format!(
        "Average Duration of a single {} using {} Lthreads",
        buffer.subject(false),
        guard.threads()
    );
    let layout = Layout {
        legend: side_legend(),
        ..box_layout(title, axis("Duration", Some("us")))
    };
    plan.add("duration-box", data, Vec::new(), layout);
    Ok(())
}
