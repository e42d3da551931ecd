//! Load-generator plots: latency and server CPU over throughput.

use super::labels::{fixed_setup_legend, Candidate, QueueConfigs};
use super::{axis, titled, Plan};
use crate::chart::{Layout, Legend, Orientation, Trace};
use crate::error::PlotError;
use crate::metrics::{max, throughput, utilization_percent};
use crate::model::{Payload, Program};

const RUNTIME_GROUP: &str = "runtime";

/// Average latency over throughput. A y range below one is taken as
/// seconds and switches the plot to milliseconds.
pub(super) fn latency_throughput(plan: &mut Plan, candidates: &[Candidate], name: Option<&str>) {
    let low_latency = plan
        .hints
        .y_range
        .is_some_and(|range| range.iter().all(|&r| r < 1.0));
    if low_latency {
        plan.hints.y_range = plan.hints.y_range.map(|[lo, hi]| [lo * 1e3, hi * 1e3]);
    }
    let divisor = if low_latency { 1e3 } else { 1e6 };

    let mut configs = QueueConfigs::default();
    let mut data = Vec::new();
    for c in candidates {
        let Some(run) = c.record().as_latency() else {
            continue;
        };
        configs.observe(c.env);
        data.push(
            Trace::lines(
                c.display_name(),
                run.benchmarks.iter().map(|b| b.avg_latency / divisor).collect(),
            )
            .with_x(run.benchmarks.iter().map(|b| b.throughput).collect())
            .color(c.color())
            .dash(c.record().dash)
            .opacity(c.record().opacity)
            .group(RUNTIME_GROUP)
            .legend(c.env_canonical()),
        );
    }
    let unit = if low_latency { "ms" } else { "s" };
    let layout = Layout {
        xaxis: axis("Throughput", Some("req/s")),
        yaxis: axis("Latency", Some(unit)),
        legend: Legend {
            orientation: Some(Orientation::Vertical),
            ..Default::default()
        },
        ..Default::default()
    };
    plan.add(
        name.unwrap_or("latency-throughput"),
        data,
        configs.legend(),
        layout,
    );
}

/// CPU utilization over throughput for frequency and latency benchmarks.
///
/// `sorted` selects the variant ordering frequency samples by achieved
/// throughput; otherwise samples are drawn in recorded order and latency
/// benchmarks contribute their server CPU readings.
pub(super) fn utilization_throughput(
    plan: &mut Plan,
    candidates: &[Candidate],
    name: Option<&str>,
    normalize: bool,
    sorted: bool,
) -> Result<(), PlotError> {
    let mut configs = QueueConfigs::default();
    let mut program: Option<Program> = None;
    let mut sorted_data = Vec::new();
    let mut unsorted_data = Vec::new();

    for c in candidates {
        configs.observe(c.env);
        let record = c.record();
        let (x, y): (Vec<f64>, Vec<f64>) = match &record.payload {
            Payload::Frequency(run) => {
                let points: Vec<(f64, f64)> = run
                    .benchmarks
                    .iter()
                    .map(|b| {
                        (
                            throughput(b.num_executions as f64, b.full_duration),
                            utilization_percent(b.full_cpu_time, b.full_duration, normalize),
                        )
                    })
                    .collect();
                let (x, y): (Vec<f64>, Vec<f64>) = points.iter().copied().unzip();
                let full = c.full_name();
                plan.note(format!("Max. Throughput of {}: {}req/s", full, max(&x)));
                plan.note(format!("Max. CPU Utilization of {}: {}%\n", full, max(&y)));

                if sorted {
                    let mut ordered = points;
                    ordered.sort_by(|a, b| a.0.total_cmp(&b.0));
                    let (sx, sy): (Vec<f64>, Vec<f64>) = ordered.into_iter().unzip();
                    sorted_data.push(styled(c, Trace::lines(c.display_name(), sy).with_x(sx)));
                }
                (x, y)
            }
            Payload::Latency(run) => {
                program = Some(run.program);
                let mut y = Vec::with_capacity(run.benchmarks.len());
                for (index, sample) in run.benchmarks.iter().enumerate() {
                    let cpu = sample.server_cpu.ok_or_else(|| PlotError::MissingServerCpu {
                        runtime: c.runtime().id.clone(),
                        index,
                    })?;
                    y.push(cpu);
                }
                (run.benchmarks.iter().map(|b| b.throughput).collect(), y)
            }
            Payload::Throughput(_) => continue,
        };

        if !sorted {
            unsorted_data.push(styled(c, Trace::lines(c.display_name(), y).with_x(x)));
        }
    }

    let prefix = if normalize { "normalized " } else { "" };
    let ylabel = format!("{}CPU Utilization", prefix);
    if sorted {
        let layout = titled(
            format!(
                "{}CPU Utilization at increasing single-threaded Workload (sorted by Throughput)",
                prefix
            ),
            axis("Throughput", Some("req/s")),
            axis(&ylabel, Some("%")),
        );
        plan.add(
            name.unwrap_or("utilization"),
            sorted_data,
            configs.legend(),
            layout,
        );
    } else {
        let subject = match program {
            Some(program) => format!("for {}", program),
            None => "at increasing single-threaded Workload".to_string(),
        };
        let layout = Layout {
            legend: Legend {
                orientation: Some(Orientation::Horizontal),
                ..Default::default()
            },
            ..titled(
                format!("{}CPU Utilization {}", prefix, subject),
                axis("Throughput", Some("req/s")),
                axis(&ylabel, Some("%")),
            )
        };
        plan.add(
            name.unwrap_or("utilization-unsorted"),
            unsorted_data,
            fixed_setup_legend(),
            layout,
        );
    }
    Ok(())
}

fn styled(c: &Candidate, trace: Trace) -> Trace {
    let record = c.record();
    trace
        .color(c.color())
        .dash(record.dash)
        .line_width(record.line_width)
        .opacity(record.opacity)
        .legend(c.is_canonical())
        .group(RUNTIME_GROUP)
}

#[cfg(test)]
mod tests {
    use super::super::tests::{entry, frequency_run, job, latency_run, names, run, runtime};
    use super::super::{build, PlotKind};
    use crate::catalog::Catalog;
    use crate::catalog::{Palette, RuntimeDef, RuntimeTable};
    use crate::chart::Values;
    use crate::error::PlotError;
    use crate::model::Program;
    use std::fs;

    #[test]
    fn latency_plot_switches_to_milliseconds_for_small_ranges() {
        let mut job = job(
            "LATENCY-THROUGHPUT",
            vec![entry(
                runtime("linux", "Linux", 0),
                &[],
                latency_run(Program::Nginx, &[(100.0, 2000.0, None)]),
            )],
        );
        job.hints.y_range = Some([0.0, 0.5]);
        let plan = build(PlotKind::LatencyThroughput, &job).unwrap();
        let figure = &plan.figures[0];
        assert_eq!(figure.chart.data[0].y, vec![2.0]);
        assert_eq!(figure.hints.y_range, Some([0.0, 500.0]));
        assert_eq!(figure.chart.layout.yaxis.title_text(), Some("<b>Latency</b> [ms]"));
        assert_eq!(figure.chart.layout.title, None);
    }

    #[test]
    fn latency_plot_adds_queue_legend() {
        let scone = runtime("scone", "SCONE", 4);
        let plan = run(
            "LATENCY-THROUGHPUT",
            vec![
                entry(scone.clone(), &["SCONE_QUEUES=1"], latency_run(Program::Vault, &[(1.0, 1e6, None)])),
                entry(scone, &["SCONE_QUEUES=8"], latency_run(Program::Vault, &[(1.0, 1e6, None)])),
            ],
        );
        let figure = &plan.figures[0];
        assert_eq!(names(figure), vec!["SCONE", "SCONE", "1Q 1E", "8Q 8E"]);
        assert_eq!(figure.chart.data[0].showlegend, Some(false));
        assert_eq!(figure.chart.data[1].showlegend, Some(true));
    }

    #[test]
    fn unsorted_utilization_names_the_program() {
        let plan = run(
            "UTILIZATION-THROUGHPUT-UNSORTED",
            vec![entry(
                runtime("linux", "Linux", 0),
                &[],
                latency_run(Program::Nginx, &[(10.0, 1.0, Some(50.0)), (20.0, 1.0, Some(80.0))]),
            )],
        );
        let figure = &plan.figures[0];
        assert_eq!(figure.name, "utilization-unsorted");
        assert_eq!(
            figure.chart.layout.title_text(),
            Some("<b>CPU Utilization for NGINX</b>")
        );
        assert_eq!(figure.chart.data[0].y, vec![50.0, 80.0]);
        assert_eq!(names(figure), vec!["Linux", "8Q 8E", "1Q 1E"]);
    }

    #[test]
    fn missing_server_cpu_is_fatal() {
        let job = job(
            "UTILIZATION-THROUGHPUT-UNSORTED",
            vec![entry(
                runtime("linux", "Linux", 0),
                &[],
                latency_run(Program::Nginx, &[(10.0, 1.0, Some(50.0)), (20.0, 1.0, None)]),
            )],
        );
        assert!(matches!(
            build(PlotKind::UtilizationThroughputUnsorted, &job),
            Err(PlotError::MissingServerCpu { index: 1, .. })
        ));
    }

    #[test]
    fn sorted_utilization_orders_by_throughput_and_normalizes() {
        let mut job = job(
            "UTILIZATION-THROUGHPUT",
            vec![entry(
                runtime("linux", "Linux", 0),
                &[],
                frequency_run(&[(20, 1e6, 2e6, 10.0), (10, 1e6, 1.5e6, 20.0)]),
            )],
        );
        job.normalize = true;
        let plan = build(PlotKind::UtilizationThroughput, &job).unwrap();
        let trace = &plan.figures[0].chart.data[0];
        assert_eq!(trace.x, Some(Values::Numbers(vec![10.0, 20.0])));
        assert_eq!(trace.y, vec![50.0, 100.0]);
        assert_eq!(
            plan.summary,
            vec![
                "Max. Throughput of Linux: 20req/s",
                "Max. CPU Utilization of Linux: 100%\n",
            ]
        );
        assert_eq!(
            plan.figures[0].chart.layout.yaxis.title_text(),
            Some("<b>normalized CPU Utilization</b> [%]")
        );
    }

    #[test]
    fn csv_directory_produces_one_series_per_runtime() {
        let dir = tempfile::tempdir().unwrap();
        let bench = dir.path().join("web");
        fs::create_dir_all(&bench).unwrap();
        fs::write(bench.join("plots.json"), r#"[{"type":"LATENCY-THROUGHPUT","files":"*.csv"}]"#).unwrap();
        let header = "datetime,avg_latency,max_latency,throughput,wrk_threads,wrk_connections,wrk_rate,server_cpu,url\n";
        fs::write(
            bench.join("linux.csv"),
            format!(
                "{header}2023-01-01T10:00:00Z,1.50ms,3.00ms,1000.5,2,10,1000,50,http://host/nginx\n\
                 2023-01-01T10:01:00Z,2.00ms,4.00ms,2000,2,10,2000,60,http://host/nginx\n\
                 2023-01-01T10:02:00Z,1.25s,2.00s,2500,2,10,3000,70,http://host/nginx\n"
            ),
        )
        .unwrap();
        fs::write(
            bench.join("vault.csv"),
            format!(
                "{header}2023-01-01T11:00:00Z,2.50ms,3.00ms,900,2,10,1000,40,http://host/vault\n\
                 2023-01-01T11:01:00Z,3.00ms,4.00ms,1800,2,10,2000,55,http://host/vault\n\
                 2023-01-01T11:02:00Z,4.00ms,5.00ms,2400,2,10,3000,65,http://host/vault\n"
            ),
        )
        .unwrap();

        let palette = Palette::default();
        let runtimes = RuntimeTable::new(
            vec![
                RuntimeDef {
                    id: "linux".into(),
                    name: "Linux".into(),
                    color: None,
                },
                RuntimeDef {
                    id: "vault".into(),
                    name: "Vault".into(),
                    color: None,
                },
            ],
            &palette,
        );
        let catalog = Catalog::discover(dir.path(), &runtimes, &palette).unwrap();
        let jobs = catalog.load_jobs().unwrap();
        assert_eq!(jobs.len(), 1);
        let plan = build(jobs[0].kind.parse().unwrap(), &jobs[0]).unwrap();

        assert_eq!(plan.figures.len(), 1);
        let figure = &plan.figures[0];
        assert_eq!(figure.name, "latency-throughput");
        assert_eq!(figure.chart.data.len(), 2);
        assert_eq!(names(figure), vec!["Linux", "Vault"]);
        assert_eq!(
            figure.chart.data[0].x,
            Some(Values::Numbers(vec![1000.5, 2000.0, 2500.0]))
        );
        assert_eq!(figure.chart.data[0].y, vec![0.0015, 0.002, 1.25]);
        assert_eq!(
            figure.chart.data[1].x,
            Some(Values::Numbers(vec![900.0, 1800.0, 2400.0]))
        );
        assert_eq!(figure.chart.data[1].y, vec![0.0025, 0.003, 0.004]);
        assert_eq!(figure.chart.layout.yaxis.title_text(), Some("<b>Latency</b> [s]"));
    }
}
