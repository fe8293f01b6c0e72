//! Metrics exposition parsing.
//!
//! Turns a stable scrape payload into flat records for the upload sink.
//! Parsing failure aborts the whole batch; a cycle never forwards partial
//! results.

use crate::error::ExtractError;
use prometheus_parse::{Scrape, Value};
use serde_derive::Serialize;
use std::collections::HashMap;

/// One flattened observation. All records of a batch share the cycle's
/// timestamp.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricRecord {
    pub labels: HashMap<String, String>,
    pub value: f64,
    pub timestamp: i64,
}

/// Parses an exposition payload into records, keeping only the family
/// named by `metric_name` when a filter is configured.
///
/// Record order follows the parsed sample order and is not a contract.
pub fn extract_records(
    payload: &[u8],
    metric_name: Option<&str>,
    timestamp: i64,
) -> Result<Vec<MetricRecord>, ExtractError> {
    let text = std::str::from_utf8(payload)?;
    let lines = text.lines().map(|line| Ok(line.to_string()));
    let scrape = Scrape::parse(lines)?;

    Ok(scrape
        .samples
        .into_iter()
        .filter(|sample| metric_name.map_or(true, |name| sample.metric == name))
        .map(|sample| MetricRecord {
            labels: sample
                .labels
                .iter()
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect(),
            value: gauge_value(&sample.value),
            timestamp,
        })
        .collect())
}

// Only the gauge shape carries its value through; other shapes fall back
// to the zero value.
fn gauge_value(value: &Value) -> f64 {
    match value {
        Value::Gauge(v) => *v,
        _ => 0.0,
    }
}
