//! Typed benchmark records and the reference entities they are joined with.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::warn;

/// Line dash style understood by the chart description.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dash {
    Solid,
    Dot,
    Dash,
    Longdash,
    Dashdot,
    Longdashdot,
}

/// Colour override on a record set: a palette index or a literal colour.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ColorRef {
    Index(usize),
    Literal(String),
}

/// One benchmark run of one runtime under one configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordSet {
    #[serde(default)]
    pub environment_variables: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dash: Option<Dash>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<ColorRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub opacity: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line_width: Option<f64>,
    #[serde(flatten)]
    pub payload: Payload,
}

/// Kind-specific part of a record set, tagged by the `type` field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Payload {
    #[serde(rename = "TROUGHPUT-BENCHMARK", alias = "THROUGHPUT-BENCHMARK")]
    Throughput(ThroughputRun),
    #[serde(rename = "FREQUENCY-BENCHMARK")]
    Frequency(FrequencyRun),
    #[serde(rename = "LATENCY-BENCHMARK")]
    Latency(LatencyRun),
}

/// Back-to-back calls at maximum rate, one latency and CPU time per call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThroughputRun {
    pub runtimes_microseconds: Vec<f64>,
    pub cpu_times_microseconds: Vec<f64>,
    pub num_threads: u32,
    pub num_executions: u64,
    /// Only present on write benchmarks.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub buffer_size: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FrequencyRun {
    pub benchmarks: Vec<FrequencySample>,
    #[serde(default)]
    pub num_threads: u32,
}

/// One fixed-rate sample of a frequency benchmark. Durations in µs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FrequencySample {
    pub num_executions: u64,
    pub num_threads: u32,
    pub full_duration: f64,
    pub full_cpu_time: f64,
    pub target_frequency: f64,
    #[serde(default)]
    pub runtime_mean: f64,
    #[serde(default)]
    pub runtime_min: f64,
    #[serde(default)]
    pub runtime_max: f64,
    #[serde(default)]
    pub runtime_median: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LatencyRun {
    pub benchmarks: Vec<LatencySample>,
    #[serde(default = "unknown")]
    pub payload: String,
    #[serde(default)]
    pub program: Program,
}

/// One load-generator step. Latencies in µs, throughput in req/s.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LatencySample {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub datetime: Option<DateTime<Utc>>,
    pub avg_latency: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_latency: Option<f64>,
    pub throughput: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wrk_threads: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wrk_connections: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wrk_rate: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_cpu: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub queues: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dash: Option<String>,
}

/// Server program exercised by a latency benchmark.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Program {
    #[serde(rename = "NGINX")]
    Nginx,
    #[serde(rename = "Vault")]
    Vault,
    #[default]
    #[serde(rename = "UNKNOWN")]
    Unknown,
}

impl Program {
    /// Infer the program from a benchmarked URL. `nginx` is checked first.
    pub fn from_url(url: &str) -> Self {
        if url.contains("nginx") {
            Program::Nginx
        } else if url.contains("vault") {
            Program::Vault
        } else {
            Program::Unknown
        }
    }
}

impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Program::Nginx => write!(f, "NGINX"),
            Program::Vault => write!(f, "Vault"),
            Program::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

fn unknown() -> String {
    "UNKNOWN".to_string()
}

impl RecordSet {
    pub fn env_info(&self) -> Option<EnvInfo> {
        EnvInfo::from_env(&self.environment_variables)
    }

    /// Value of `name` in the `name=value` environment list.
    pub fn env_var(&self, name: &str) -> Option<&str> {
        env_var(&self.environment_variables, name)
    }

    pub fn as_throughput(&self) -> Option<&ThroughputRun> {
        match &self.payload {
            Payload::Throughput(run) => Some(run),
            _ => None,
        }
    }

    pub fn as_frequency(&self) -> Option<&FrequencyRun> {
        match &self.payload {
            Payload::Frequency(run) => Some(run),
            _ => None,
        }
    }

    pub fn as_latency(&self) -> Option<&LatencyRun> {
        match &self.payload {
            Payload::Latency(run) => Some(run),
            _ => None,
        }
    }
}

fn env_var<'a>(env: &'a [String], name: &str) -> Option<&'a str> {
    env.iter().find_map(|entry| {
        let mut parts = entry.splitn(2, '=');
        let key = parts.next()?;
        if key == name {
            Some(parts.next().unwrap_or(""))
        } else {
            None
        }
    })
}

/// Queue and enclave thread counts of a SCONE run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EnvInfo {
    pub queues: u32,
    pub ethreads: u32,
}

impl EnvInfo {
    /// The configuration that keeps the full runtime name in legends.
    pub const CANONICAL: EnvInfo = EnvInfo { queues: 8, ethreads: 8 };

    /// Extract from `SCONE_QUEUES` / `SCONE_ETHREADS`. Returns `None` when
    /// queues are not configured; ethreads default to the queue count.
    pub fn from_env(env: &[String]) -> Option<Self> {
        let queues_raw = env_var(env, "SCONE_QUEUES")?;
        let queues = match queues_raw.trim().parse::<u32>() {
            Ok(q) => q,
            Err(_) => {
                warn!("Ignoring non-numeric SCONE_QUEUES value \"{}\"", queues_raw);
                return None;
            }
        };
        let ethreads = match env_var(env, "SCONE_ETHREADS") {
            None => queues,
            Some(raw) => match raw.trim().parse::<u32>() {
                Ok(e) => e,
                Err(_) => {
                    warn!("Ignoring non-numeric SCONE_ETHREADS value \"{}\"", raw);
                    return None;
                }
            },
        };
        Some(Self { queues, ethreads })
    }

    pub fn is_canonical(&self) -> bool {
        *self == Self::CANONICAL
    }
}

impl fmt::Display for EnvInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}Q {}E", self.queues, self.ethreads)
    }
}

/// A system under test, as listed in the runtime table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Runtime {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub color: String,
    #[serde(default)]
    pub index: usize,
}

impl Runtime {
    /// SCONE-based runtimes carry queue/thread configurations.
    pub fn is_scone(&self) -> bool {
        self.id.contains("scone")
    }
}

/// CPU details of the machine a directory of benchmarks ran on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HardwareProfile {
    /// MHz
    pub cpu_frequency: f64,
    pub cpu_name: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(vars: &[&str]) -> Vec<String> {
        vars.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn ethreads_fall_back_to_queues() {
        assert_eq!(
            EnvInfo::from_env(&env(&["SCONE_QUEUES=4"])),
            Some(EnvInfo { queues: 4, ethreads: 4 })
        );
    }

    #[test]
    fn ethreads_taken_when_present() {
        assert_eq!(
            EnvInfo::from_env(&env(&["SCONE_QUEUES=4", "SCONE_ETHREADS=2"])),
            Some(EnvInfo { queues: 4, ethreads: 2 })
        );
    }

    #[test]
    fn no_queue_variable_means_not_applicable() {
        assert_eq!(EnvInfo::from_env(&[]), None);
        assert_eq!(EnvInfo::from_env(&env(&["SCONE_ETHREADS=2"])), None);
    }

    #[test]
    fn program_inference_prefers_nginx() {
        assert_eq!(Program::from_url("http://host/nginx/index.html"), Program::Nginx);
        assert_eq!(Program::from_url("https://vault:8200/v1"), Program::Vault);
        assert_eq!(Program::from_url("http://nginx-vault/"), Program::Nginx);
        assert_eq!(Program::from_url("http://NGINX/"), Program::Unknown);
    }

    #[test]
    fn throughput_type_tag_accepts_both_spellings() {
        let legacy = r#"{"type":"TROUGHPUT-BENCHMARK","environmentVariables":[],
            "runtimesMicroseconds":[1.0],"cpuTimesMicroseconds":[2.0],
            "numThreads":1,"numExecutions":10}"#;
        let fixed = legacy.replace("TROUGHPUT", "THROUGHPUT");
        let a: RecordSet = serde_json::from_str(legacy).unwrap();
        let b: RecordSet = serde_json::from_str(&fixed).unwrap();
        assert_eq!(a, b);
        assert!(a.as_throughput().is_some());
    }

    #[test]
    fn colour_reference_is_index_or_literal() {
        let idx: ColorRef = serde_json::from_str("3").unwrap();
        let lit: ColorRef = serde_json::from_str("\"#ff0000\"").unwrap();
        assert_eq!(idx, ColorRef::Index(3));
        assert_eq!(lit, ColorRef::Literal("#ff0000".into()));
    }
}
