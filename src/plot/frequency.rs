//! Plots over fixed-rate frequency benchmarks.

use super::labels::{fixed_setup_legend, Candidate};
use super::{axis, bold, titled, Plan};
use crate::chart::{Layout, Legend, Orientation, Trace};
use crate::error::PlotError;
use crate::metrics::{
    self, accumulate_cpu_time, median, throughput, utilization_fraction, utilization_percent,
};
use crate::model::{Dash, FrequencyRun, FrequencySample};
use std::collections::BTreeSet;

fn runs<'a, 'c>(
    candidates: &'c [Candidate<'a>],
) -> impl Iterator<Item = (&'c Candidate<'a>, &'a FrequencyRun)> + 'c {
    candidates
        .iter()
        .filter_map(|c| c.record().as_frequency().map(|run| (c, run)))
}

fn sample_throughput(sample: &FrequencySample) -> f64 {
    throughput(sample.num_executions as f64, sample.full_duration)
}

fn sample_utilization(sample: &FrequencySample, normalize: bool) -> f64 {
    utilization_percent(sample.full_cpu_time, sample.full_duration, normalize)
}

/// Target frequency of a run that must hold it constant.
fn constant_frequency(c: &Candidate, run: &FrequencyRun) -> Result<f64, PlotError> {
    let (Some(first), Some(last)) = (run.benchmarks.first(), run.benchmarks.last()) else {
        return Err(PlotError::NoSamples {
            runtime: c.runtime().id.clone(),
        });
    };
    if first.target_frequency != last.target_frequency {
        return Err(PlotError::VaryingFrequency {
            first: first.target_frequency,
            last: last.target_frequency,
        });
    }
    Ok(first.target_frequency)
}

/// Samples ordered by achieved throughput.
fn by_throughput(run: &FrequencyRun) -> Vec<&FrequencySample> {
    let mut sorted: Vec<&FrequencySample> = run.benchmarks.iter().collect();
    sorted.sort_by(|a, b| sample_throughput(a).total_cmp(&sample_throughput(b)));
    sorted
}

fn env_number(c: &Candidate, name: &'static str) -> Result<i64, PlotError> {
    c.record()
        .env_var(name)
        .and_then(|v| v.trim().parse().ok())
        .ok_or_else(|| PlotError::MissingEnvironment {
            runtime: c.runtime().id.clone(),
            name,
        })
}

/// Sweep over SCONE sleep/spin parameters.
pub(super) fn parameter_test(
    plan: &mut Plan,
    candidates: &[Candidate],
    normalize: bool,
) -> Result<(), PlotError> {
    let mut swept = Vec::new();
    for (c, run) in runs(candidates) {
        if !c.runtime().id.starts_with("scone") {
            continue;
        }
        let ssleep = env_number(c, "SCONE_SSLEEP")?;
        let sspins = env_number(c, "SCONE_SSPINS")?;
        swept.push((c, run, ssleep, sspins));
    }
    let sleeps: BTreeSet<i64> = swept.iter().map(|s| s.2).collect();
    let spins: BTreeSet<i64> = swept.iter().map(|s| s.3).collect();

    let mut frequency_data = Vec::new();
    let mut utilization_data = Vec::new();
    for (c, run, ssleep, sspins) in swept {
        // Only the parameters that actually vary make it into the name.
        let mut name = String::new();
        if sleeps.len() != 1 {
            name.push_str(&ssleep.to_string());
        }
        if sleeps.len() != 1 && spins.len() != 1 {
            name.push_str(", ");
        }
        if spins.len() != 1 {
            name.push_str(&sspins.to_string());
        }
        let record = c.record();
        let targets: Vec<f64> = run.benchmarks.iter().map(|b| b.target_frequency).collect();

        if frequency_data.is_empty() {
            frequency_data.push(
                Trace::lines("Target Throughput", targets.clone())
                    .with_x(targets.clone())
                    .dash(Some(Dash::Longdash))
                    .line_width(record.line_width)
                    .opacity(record.opacity),
            );
        }
        frequency_data.push(
            Trace::lines(name.clone(), run.benchmarks.iter().map(sample_throughput).collect())
                .with_x(targets)
                .dash(record.dash)
                .line_width(record.line_width)
                .opacity(record.opacity),
        );

        let sorted = by_throughput(run);
        utilization_data.push(
            Trace::lines(
                name,
                sorted.iter().map(|b| sample_utilization(b, normalize)).collect(),
            )
            .with_x(sorted.iter().map(|b| sample_throughput(b)).collect())
            .dash(record.dash)
            .line_width(record.line_width)
            .opacity(record.opacity),
        );
    }

    let layout = Layout {
        legend: Legend {
            x: Some(0.0),
            y: Some(1.0),
            ..Default::default()
        },
        ..titled(
            "Maximum Syscall Throughput at increasing single-threaded Workload and different SCONE Parameters".into(),
            axis("Target Workload", Some("req/s")),
            axis("Throughput", Some("req/s")),
        )
    };
    plan.add("frequency-line", frequency_data, Vec::new(), layout);

    let ylabel = if normalize {
        "CPU Utilization (normalized)"
    } else {
        "CPU Utilization"
    };
    let layout = titled(
        "CPU Utilization at increasing single-threaded Workload and different SCONE Parameters".into(),
        axis("Throughput", Some("req/s")),
        axis(ylabel, Some("%")),
    );
    plan.add("cpu-utilization-line", utilization_data, Vec::new(), layout);
    Ok(())
}

/// Running CPU time at a fixed request rate, with utilization summary.
pub(super) fn cpu_accumulate(plan: &mut Plan, candidates: &[Candidate]) -> Result<(), PlotError> {
    let mut data = Vec::new();
    let mut frequency = f64::NAN;
    for (c, run) in runs(candidates) {
        frequency = constant_frequency(c, run)?;
        let accumulated =
            accumulate_cpu_time(run.benchmarks.iter().map(|b| (b.full_cpu_time, b.full_duration)));
        let percent: Vec<f64> = run
            .benchmarks
            .iter()
            .map(|b| utilization_fraction(b.full_cpu_time, b.full_duration) * 100.0)
            .collect();
        let total = accumulated.last().copied().unwrap_or_default();

        let full = c.full_name();
        plan.note(format!("\nMin CPU Utilization of {}: {}%", full, metrics::min(&percent)));
        plan.note(format!("Max CPU Utilization of {}: {}%", full, metrics::max(&percent)));
        plan.note(format!(
            "Average CPU Utilization of {}: {}%",
            full,
            (total / run.benchmarks.len() as f64) * 100.0
        ));
        plan.note(format!("Median CPU Utilization of {}: {}%", full, median(&percent)));

        data.push(
            Trace::lines(c.display_name(), accumulated)
                .color(c.color())
                .dash(c.record().dash)
                .opacity(c.record().opacity),
        );
    }
    let layout = titled(
        format!("Accumulated CPU Time at {} Request/s", frequency),
        axis("Time", Some("s")),
        axis("Accumulated CPU Time", Some("s")),
    );
    plan.add("cpu-accumulate-line", data, Vec::new(), layout);
    Ok(())
}

/// Utilization boxes at a fixed rate. The first run of a runtime carries
/// its name, later runs the queue label.
pub(super) fn utilization_box(
    plan: &mut Plan,
    candidates: &[Candidate],
    name: Option<&str>,
) -> Result<(), PlotError> {
    let mut data = Vec::new();
    let mut seen: Vec<&str> = Vec::new();
    let mut frequency = f64::NAN;
    for (c, run) in runs(candidates) {
        frequency = constant_frequency(c, run)?;
        let id = c.runtime().id.as_str();
        let label = if seen.contains(&id) {
            c.compact_label().unwrap_or_else(|| c.display_name())
        } else {
            c.display_name()
        };
        seen.push(id);
        data.push(
            Trace::boxed(
                label,
                run.benchmarks.iter().map(|b| sample_utilization(b, false)).collect(),
            )
            .color(c.color())
            .dash(c.record().dash),
        );
    }
    let layout = Layout {
        title: Some(bold(&format!("CPU Utilization at {} Request/s", frequency)).into()),
        yaxis: axis("CPU Utilization", Some("%")),
        showlegend: Some(false),
        ..Default::default()
    };
    plan.add(name.unwrap_or("cpu-utilization-box"), data, Vec::new(), layout);
    Ok(())
}

pub(super) fn utilization_line(
    plan: &mut Plan,
    candidates: &[Candidate],
    name: Option<&str>,
) -> Result<(), PlotError> {
    let mut data = Vec::new();
    let mut frequency = f64::NAN;
    for (c, run) in runs(candidates) {
        frequency = constant_frequency(c, run)?;
        data.push(
            Trace::lines(
                c.display_name(),
                run.benchmarks.iter().map(|b| sample_utilization(b, false)).collect(),
            )
            .color(c.color())
            .dash(c.record().dash)
            .opacity(c.record().opacity)
            .legend(c.is_canonical())
            .group("runtimes"),
        );
    }
    let layout = Layout {
        legend: Legend {
            orientation: Some(Orientation::Horizontal),
            ..Default::default()
        },
        ..titled(
            format!("CPU Utilization at {} Request/s", frequency),
            axis("Sample", None),
            axis("CPU Utilization", Some("%")),
        )
    };
    plan.add(
        name.unwrap_or("cpu-utilization-line"),
        data,
        fixed_setup_legend(),
        layout,
    );
    Ok(())
}

/// Achieved against target throughput per sample.
pub(super) fn frequency(plan: &mut Plan, candidates: &[Candidate]) {
    let mut data = Vec::new();
    for (c, run) in runs(candidates) {
        let samples: Vec<f64> = (1..=run.benchmarks.len()).map(|i| i as f64).collect();
        if data.is_empty() {
            data.push(
                Trace::lines(
                    "Target Throughput",
                    run.benchmarks.iter().map(|b| b.target_frequency).collect(),
                )
                .with_x(samples.clone())
                .dash(Some(Dash::Longdash))
                .opacity(c.record().opacity),
            );
        }
        data.push(
            Trace::lines(
                c.display_name(),
                run.benchmarks.iter().map(sample_throughput).collect(),
            )
            .with_x(samples)
            .dash(c.record().dash)
            .opacity(c.record().opacity),
        );
    }
    let layout = titled(
        "Maximum Throughput of SGX System Calls".into(),
        axis("Sample", None),
        axis("Throughput", Some("req/s")),
    );
    plan.add("frequency", data, Vec::new(), layout);
}

#[cfg(test)]
mod tests {
    use super::super::tests::{entry, frequency_run, job, names, run, runtime};
    use super::super::{build, PlotKind};
    use crate::error::PlotError;

    #[test]
    fn accumulate_sums_utilization_and_writes_summary() {
        let plan = run(
            "CPU-ACCUMULATE",
            vec![entry(
                runtime("linux", "Linux", 0),
                &[],
                frequency_run(&[(10, 1e6, 5e5, 10.0), (10, 1e6, 2.5e5, 10.0)]),
            )],
        );
        let figure = &plan.figures[0];
        assert_eq!(figure.name, "cpu-accumulate-line");
        assert_eq!(figure.chart.data[0].y, vec![0.5, 0.75]);
        assert_eq!(
            figure.chart.layout.title_text(),
            Some("<b>Accumulated CPU Time at 10 Request/s</b>")
        );
        assert_eq!(
            plan.summary,
            vec![
                "\nMin CPU Utilization of Linux: 25%",
                "Max CPU Utilization of Linux: 50%",
                "Average CPU Utilization of Linux: 37.5%",
                "Median CPU Utilization of Linux: 37.5%",
            ]
        );
    }

    #[test]
    fn varying_frequency_is_fatal() {
        let job = job(
            "UTILIZATION-AT-FREQUENCY",
            vec![entry(
                runtime("linux", "Linux", 0),
                &[],
                frequency_run(&[(10, 1e6, 1.0, 10.0), (20, 1e6, 1.0, 20.0)]),
            )],
        );
        let err = build(PlotKind::UtilizationAtFrequency, &job).unwrap_err();
        assert!(matches!(err, PlotError::VaryingFrequency { .. }));
    }

    #[test]
    fn empty_frequency_run_is_reported() {
        let job = job(
            "CPU-ACCUMULATE",
            vec![entry(runtime("linux", "Linux", 0), &[], frequency_run(&[]))],
        );
        assert!(matches!(
            build(PlotKind::CpuAccumulate, &job),
            Err(PlotError::NoSamples { .. })
        ));
    }

    #[test]
    fn utilization_line_appends_setup_legend() {
        let scone = runtime("scone", "SCONE", 4);
        let plan = run(
            "UTILIZATION-AT-FREQUENCY",
            vec![
                entry(scone.clone(), &["SCONE_QUEUES=8"], frequency_run(&[(10, 1e6, 1e6, 10.0)])),
                entry(scone, &["SCONE_QUEUES=1"], frequency_run(&[(10, 1e6, 5e5, 10.0)])),
            ],
        );
        let figure = &plan.figures[0];
        assert_eq!(figure.name, "cpu-utilization-line");
        assert_eq!(names(figure), vec!["SCONE", "SCONE", "8Q 8E", "1Q 1E"]);
        assert_eq!(figure.chart.data[0].showlegend, Some(false));
        assert_eq!(figure.chart.data[1].showlegend, Some(true));
    }

    #[test]
    fn frequency_box_labels_repeated_runtimes() {
        let scone = runtime("scone", "SCONE", 4);
        let plan = run(
            "UTILIZATION-AT-FREQUENCY-BOX",
            vec![
                entry(scone.clone(), &["SCONE_QUEUES=1"], frequency_run(&[(10, 1e6, 1e6, 10.0)])),
                entry(scone, &["SCONE_QUEUES=8"], frequency_run(&[(10, 1e6, 5e5, 10.0)])),
            ],
        );
        assert_eq!(names(&plan.figures[0]), vec!["SCONE", "(1Q 1E)    "]);
    }

    #[test]
    fn parameter_test_names_by_varying_parameter() {
        let scone = runtime("scone", "SCONE", 4);
        let plan = run(
            "PARAMETER-TEST",
            vec![
                entry(
                    scone.clone(),
                    &["SCONE_SSLEEP=100", "SCONE_SSPINS=10"],
                    frequency_run(&[(10, 1e6, 1e6, 10.0), (20, 1e6, 1e6, 20.0)]),
                ),
                entry(
                    scone,
                    &["SCONE_SSLEEP=200", "SCONE_SSPINS=10"],
                    frequency_run(&[(10, 1e6, 1e6, 10.0), (15, 1e6, 1e6, 20.0)]),
                ),
                entry(
                    runtime("linux", "Linux", 0),
                    &[],
                    frequency_run(&[(10, 1e6, 1e6, 10.0)]),
                ),
            ],
        );
        let names: Vec<Vec<&str>> = plan.figures.iter().map(names).collect();
        assert_eq!(names[0], vec!["Target Throughput", "100", "200"]);
        assert_eq!(names[1], vec!["100", "200"]);
        assert_eq!(plan.figures[0].name, "frequency-line");
        assert_eq!(plan.figures[1].name, "cpu-utilization-line");
    }

    #[test]
    fn parameter_test_requires_scone_parameters() {
        let job = job(
            "PARAMETER-TEST",
            vec![entry(
                runtime("scone", "SCONE", 4),
                &["SCONE_SSLEEP=100"],
                frequency_run(&[(10, 1e6, 1e6, 10.0)]),
            )],
        );
        assert!(matches!(
            build(PlotKind::ParameterTest, &job),
            Err(PlotError::MissingEnvironment { name: "SCONE_SSPINS", .. })
        ));
    }

    #[test]
    fn frequency_plot_adds_target_series_once() {
        let plan = run(
            "FREQUENCY",
            vec![
                entry(runtime("linux", "Linux", 0), &[], frequency_run(&[(10, 1e6, 1.0, 10.0), (18, 1e6, 1.0, 20.0)])),
                entry(runtime("occlum", "Occlum", 1), &[], frequency_run(&[(9, 1e6, 1.0, 10.0), (19, 1e6, 1.0, 20.0)])),
            ],
        );
        let figure = &plan.figures[0];
        assert_eq!(names(figure), vec!["Target Throughput", "Linux", "Occlum"]);
        assert_eq!(figure.chart.data[0].y, vec![10.0, 20.0]);
        assert_eq!(figure.chart.data[1].y, vec![10.0, 18.0]);
        assert_eq!(figure.chart.data[1].x_at(1), 2.0);
    }
}
