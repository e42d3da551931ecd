//! Throughput and CPU utilization derived from durations and CPU times.

/// Requests per second for `executions` completed in `duration_us`.
pub fn throughput(executions: f64, duration_us: f64) -> f64 {
    executions / (duration_us / 1e6)
}

/// Calls per second implied by a single call latency, scaled by
/// `multiplier` (thread count, or bytes per call for write benchmarks).
pub fn per_call_throughput(latency_us: f64, multiplier: f64) -> f64 {
    (1e6 / latency_us) * multiplier
}

/// CPU time as a percentage of wall time. With `normalize` the result is
/// relative to one fully busy core (100% subtracted).
pub fn utilization_percent(cpu_us: f64, wall_us: f64, normalize: bool) -> f64 {
    let pct = cpu_us / wall_us * 100.0;
    if normalize {
        pct - 100.0
    } else {
        pct
    }
}

/// CPU seconds consumed per wall-clock second of a sample.
pub fn utilization_fraction(cpu_us: f64, wall_us: f64) -> f64 {
    (cpu_us * (1e6 / wall_us)) / 1e6
}

/// Running sum of per-sample utilization fractions.
///
/// With one sample per second of wall time this approximates the CPU time
/// accumulated since the start of the run, in seconds.
pub fn accumulate_cpu_time<I>(samples: I) -> Vec<f64>
where
    I: IntoIterator<Item = (f64, f64)>,
{
    samples
        .into_iter()
        .scan(0.0, |total, (cpu_us, wall_us)| {
            *total += utilization_fraction(cpu_us, wall_us);
            Some(*total)
        })
        .collect()
}

/// Convert a duration in µs to CPU cycles at `cpu_mhz`.
pub fn micros_to_cycles(cpu_mhz: f64, duration_us: f64) -> f64 {
    duration_us * cpu_mhz
}
