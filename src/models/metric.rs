// Metric points, per-metric series, merged CSV rows and the fetch window

use chrono::{DateTime, SecondsFormat, Utc};
use std::collections::BTreeMap;

/// ISO-8601 UTC with an explicit `+00:00` offset, e.g. `2025-03-01T12:05:00+00:00`.
/// Fixed width, so lexical order is chronological order.
pub fn iso_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, false)
}

/// One datapoint from the metrics store. `value: None` means nothing was reported for the period.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricPoint {
    pub timestamp: DateTime<Utc>,
    pub value: Option<f64>,
}

impl MetricPoint {
    pub fn new(timestamp: DateTime<Utc>, value: f64) -> Self {
        Self {
            timestamp,
            value: Some(value),
        }
    }
}

/// Timestamp -> value for exactly one metric, keyed by ISO-8601 string.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetricSeries {
    points: BTreeMap<String, Option<f64>>,
}

impl MetricSeries {
    pub fn from_points(points: &[MetricPoint]) -> Self {
        let points = points
            .iter()
            .map(|p| (iso_timestamp(&p.timestamp), p.value))
            .collect();
        Self { points }
    }

    pub fn get(&self, timestamp: &str) -> Option<f64> {
        self.points.get(timestamp).copied().flatten()
    }

    pub fn timestamps(&self) -> impl Iterator<Item = &str> {
        self.points.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// One CSV row after merging; cells are already formatted ("" for missing).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergedRow {
    pub timestamp: String,
    pub cpu_percent: String,
    pub network_in_bytes: String,
    pub network_out_bytes: String,
}

impl MergedRow {
    pub const HEADER: [&'static str; 4] = [
        "timestamp",
        "cpu_percent",
        "network_in_bytes",
        "network_out_bytes",
    ];

    pub fn cells(&self) -> [&str; 4] {
        [
            &self.timestamp,
            &self.cpu_percent,
            &self.network_in_bytes,
            &self.network_out_bytes,
        ]
    }
}

/// Half-open fetch window, both ends minute-aligned UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Statistic {
    Average,
    Sum,
}

impl Statistic {
    pub fn as_str(&self) -> &'static str {
        match self {
            Statistic::Average => "Average",
            Statistic::Sum => "Sum",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unit {
    Percent,
    Bytes,
}

impl Unit {
    pub fn as_str(&self) -> &'static str {
        match self {
            Unit::Percent => "Percent",
            Unit::Bytes => "Bytes",
        }
    }
}

/// One series request against the metrics store. `id` keys the result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricQuery {
    pub id: &'static str,
    pub namespace: &'static str,
    pub metric_name: &'static str,
    pub instance_id: String,
    pub period_seconds: u32,
    pub stat: Statistic,
    pub unit: Unit,
}
