//! Loading of raw benchmark files (JSON records and latency CSV tables).

use crate::error::ParseError;
use crate::model::{Payload, Program, RecordSet};
use anyhow::{bail, Context, Result};
use chrono::{DateTime, NaiveDateTime, Utc};
use regex::Regex;
use serde_json::{json, Map, Value};
use std::path::Path;
use std::sync::LazyLock;

static DURATION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([0-9]+\.[0-9]{2})(ms|s)$").unwrap());

/// Converter applied to a recognised CSV column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Column {
    Date,
    Duration,
    Float,
    Integer,
    Text,
}

fn column_kind(header: &str) -> Option<Column> {
    match header {
        "datetime" => Some(Column::Date),
        "avg_latency" | "max_latency" => Some(Column::Duration),
        "throughput" => Some(Column::Float),
        "wrk_threads" | "wrk_connections" | "wrk_rate" | "server_cpu" | "queues" => {
            Some(Column::Integer)
        }
        "url" | "dash" => Some(Column::Text),
        _ => None,
    }
}

/// Parse a duration such as `"1.50s"` or `"2.30ms"` into microseconds.
pub fn parse_duration(s: &str) -> Result<f64, ParseError> {
    let caps = DURATION_RE
        .captures(s)
        .ok_or_else(|| ParseError::InvalidDuration(s.to_string()))?;
    let amount: f64 = caps[1]
        .parse()
        .map_err(|_| ParseError::InvalidDuration(s.to_string()))?;
    let multiplier = match &caps[2] {
        "s" => 1e6,
        "ms" => 1e3,
        _ => return Err(ParseError::InvalidDuration(s.to_string())),
    };
    Ok(amount * multiplier)
}

fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .map(|naive| naive.and_utc())
}

fn convert(kind: Column, raw: &str) -> Result<Value, String> {
    match kind {
        Column::Date => parse_datetime(raw)
            .map(|dt| Value::String(dt.to_rfc3339()))
            .ok_or_else(|| "not a date".to_string()),
        Column::Duration => parse_duration(raw).map(|v| json!(v)).map_err(|e| e.to_string()),
        Column::Float => raw
            .parse::<f64>()
            .map(|v| json!(v))
            .map_err(|e| e.to_string()),
        // Decimal input is truncated.
        Column::Integer => match raw.parse::<i64>() {
            Ok(v) => Ok(json!(v)),
            Err(e) => match raw.parse::<f64>() {
                Ok(v) if v.is_finite() => Ok(json!(v.trunc() as i64)),
                _ => Err(e.to_string()),
            },
        },
        Column::Text => Ok(Value::String(raw.to_string())),
    }
}

/// Convert a latency CSV table into the JSON shape of a latency record set.
///
/// Any malformed value in a recognised column fails the whole table.
pub fn parse_latency_csv(text: &str) -> Result<Value, ParseError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(text.as_bytes());

    let headers = reader
        .headers()
        .map_err(|source| ParseError::Csv { line: 1, source })?
        .clone();
    let columns: Vec<(usize, &str, Column)> = headers
        .iter()
        .enumerate()
        .filter_map(|(i, h)| column_kind(h).map(|kind| (i, h, kind)))
        .collect();
    let payload_col = headers.iter().position(|h| h == "payload");
    let url_col = headers.iter().position(|h| h == "url");

    let mut rows = Vec::new();
    let mut payload = None;
    let mut program = None;

    for (i, record) in reader.records().enumerate() {
        let fallback_line = i + 2;
        let record = record.map_err(|source| ParseError::Csv {
            line: fallback_line,
            source,
        })?;
        let line = record
            .position()
            .map(|p| p.line() as usize)
            .unwrap_or(fallback_line);

        let mut row = Map::new();
        for &(idx, header, kind) in &columns {
            let raw = record.get(idx).ok_or_else(|| ParseError::InvalidValue {
                line,
                column: header.to_string(),
                value: String::new(),
                reason: "missing field".to_string(),
            })?;
            let value = convert(kind, raw).map_err(|reason| ParseError::InvalidValue {
                line,
                column: header.to_string(),
                value: raw.to_string(),
                reason,
            })?;
            row.insert(header.to_string(), value);
        }

        if rows.is_empty() {
            payload = payload_col.and_then(|c| record.get(c)).map(str::to_string);
            program = url_col.and_then(|c| record.get(c)).map(Program::from_url);
        }
        rows.push(Value::Object(row));
    }

    if rows.is_empty() {
        return Err(ParseError::NoRows);
    }

    Ok(json!({
        "type": "LATENCY-BENCHMARK",
        "payload": payload.unwrap_or_else(|| "UNKNOWN".to_string()),
        "program": program.unwrap_or_default(),
        "benchmarks": rows,
    }))
}

/// Overlay every top-level field of `extra` onto `base`; `extra` wins.
pub fn overlay(base: &mut Map<String, Value>, extra: Map<String, Value>) {
    for (key, value) in extra {
        base.insert(key, value);
    }
}

/// Deserialize a JSON value into a record set and check its invariants.
pub fn into_record_set(value: Value) -> Result<RecordSet, ParseError> {
    let set: RecordSet = serde_json::from_value(value)?;
    validate(&set)?;
    Ok(set)
}

fn validate(set: &RecordSet) -> Result<(), ParseError> {
    if let Payload::Throughput(run) = &set.payload {
        if run.runtimes_microseconds.len() != run.cpu_times_microseconds.len() {
            return Err(ParseError::LengthMismatch {
                runtimes: run.runtimes_microseconds.len(),
                cpu_times: run.cpu_times_microseconds.len(),
            });
        }
    }
    Ok(())
}

/// Load one benchmark file. A CSV file picks up a same-named JSON sidecar
/// whose fields take precedence over the CSV-derived ones.
pub fn load_record_set(path: &Path) -> Result<RecordSet> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read benchmark file: {}", path.display()))?;
    let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("");

    let value = match extension {
        "json" => serde_json::from_str::<Value>(&content)
            .map_err(ParseError::from)
            .with_context(|| format!("Error while parsing file {}", path.display()))?,
        "csv" => {
            let mut value = parse_latency_csv(&content)
                .with_context(|| format!("Error while parsing file {}", path.display()))?;
            let sidecar = path.with_extension("json");
            if sidecar.is_file() {
                let extra = read_sidecar(&sidecar)?;
                if let Value::Object(base) = &mut value {
                    overlay(base, extra);
                }
            }
            value
        }
        other => {
            return Err(ParseError::UnknownExtension(format!(".{}", other)))
                .with_context(|| format!("Error while parsing file {}", path.display()))
        }
    };

    into_record_set(value).with_context(|| format!("Error while parsing file {}", path.display()))
}

fn read_sidecar(path: &Path) -> Result<Map<String, Value>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read sidecar file: {}", path.display()))?;
    match serde_json::from_str::<Value>(&content)
        .with_context(|| format!("Error while parsing sidecar {}", path.display()))?
    {
        Value::Object(map) => Ok(map),
        _ => bail!("Sidecar {} is not a JSON object", path.display()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    const LATENCY_CSV: &str = "\
datetime,avg_latency,max_latency,throughput,wrk_threads,wrk_connections,wrk_rate,server_cpu,url,queues,payload
2021-06-01 10:00:00,1.50ms,3.00ms,1000.5,2,16,1000,80,http://10.0.0.1/nginx/index.html,4,foo
2021-06-01 10:01:00,2.30ms,4.10ms,1999.0,2,16,2000,120,http://10.0.0.1/nginx/index.html,4,foo
";

    #[test]
    fn durations_convert_to_microseconds() {
        assert_eq!(parse_duration("1.50s").unwrap(), 1_500_000.0);
        assert_eq!(parse_duration("2.30ms").unwrap(), 2300.0);
        assert_eq!(parse_duration("12.00s").unwrap(), 12_000_000.0);
    }

    #[test]
    fn durations_require_two_decimals_and_known_unit() {
        for bad in ["1.5s", "1.500ms", "1s", ".50s", "1.50us", "1.50 ms", "-1.50s"] {
            assert!(
                matches!(parse_duration(bad), Err(ParseError::InvalidDuration(_))),
                "{bad} should be rejected"
            );
        }
    }

    #[test]
    fn csv_rows_become_latency_samples() {
        let value = parse_latency_csv(LATENCY_CSV).unwrap();
        let set = into_record_set(value).unwrap();
        let run = set.as_latency().unwrap();
        assert_eq!(run.benchmarks.len(), 2);
        assert_eq!(run.payload, "foo");
        assert_eq!(run.program, Program::Nginx);
        assert_eq!(run.benchmarks[0].avg_latency, 1500.0);
        assert_eq!(run.benchmarks[1].throughput, 1999.0);
        assert_eq!(run.benchmarks[1].server_cpu, Some(120.0));
        assert!(run.benchmarks[0].datetime.is_some());
    }

    #[test]
    fn malformed_value_fails_whole_file_with_line() {
        let bad = LATENCY_CSV.replace("2.30ms", "2.3ms");
        match parse_latency_csv(&bad) {
            Err(ParseError::InvalidValue { line, column, .. }) => {
                assert_eq!(line, 3);
                assert_eq!(column, "avg_latency");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn header_only_csv_is_rejected() {
        let header = LATENCY_CSV.lines().next().unwrap();
        assert!(matches!(parse_latency_csv(header), Err(ParseError::NoRows)));
    }

    #[test]
    fn unknown_program_without_url_column() {
        let csv = "avg_latency,throughput\n1.00ms,10\n";
        let set = into_record_set(parse_latency_csv(csv).unwrap()).unwrap();
        let run = set.as_latency().unwrap();
        assert_eq!(run.program, Program::Unknown);
        assert_eq!(run.payload, "UNKNOWN");
    }

    #[test]
    fn sidecar_fields_override_csv_fields() {
        let dir = tempfile::tempdir().unwrap();
        let csv_path = dir.path().join("linux.csv");
        fs::write(&csv_path, LATENCY_CSV).unwrap();
        fs::write(
            dir.path().join("linux.json"),
            r#"{"payload":"bar","environmentVariables":["SCONE_QUEUES=8"]}"#,
        )
        .unwrap();

        let set = load_record_set(&csv_path).unwrap();
        assert_eq!(set.as_latency().unwrap().payload, "bar");
        assert_eq!(set.environment_variables, vec!["SCONE_QUEUES=8".to_string()]);
    }

    #[test]
    fn mismatched_throughput_arrays_are_rejected() {
        let value = json!({
            "type": "TROUGHPUT-BENCHMARK",
            "environmentVariables": [],
            "runtimesMicroseconds": [1.0, 2.0],
            "cpuTimesMicroseconds": [1.0],
            "numThreads": 1,
            "numExecutions": 2
        });
        assert!(matches!(
            into_record_set(value),
            Err(ParseError::LengthMismatch { runtimes: 2, cpu_times: 1 })
        ));
    }

    #[test]
    fn unknown_extension_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("linux.txt");
        fs::write(&path, "whatever").unwrap();
        let err = load_record_set(&path).unwrap_err();
        assert!(err.chain().any(|e| e.to_string().contains("unknown benchmark file type")));
    }

    #[test]
    fn untyped_json_reports_its_cause_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("linux.json");
        fs::write(&path, r#"{"environmentVariables":[]}"#).unwrap();
        let err = load_record_set(&path).unwrap_err();
        let text = format!("{:#}", err);
        let cause = err.root_cause().to_string();
        assert!(text.contains("invalid benchmark object"));
        assert_eq!(text.matches(cause.as_str()).count(), 1);
    }
}
