//! Derived performance metrics over raw benchmark arrays.
//!
//! Everything here is pure. Durations and CPU times are in microseconds.

pub mod rates;
pub mod stats;

pub use rates::{
    accumulate_cpu_time, micros_to_cycles, per_call_throughput, throughput, utilization_fraction,
    utilization_percent,
};
pub use stats::{average, max, median, min, quantile, sum};
