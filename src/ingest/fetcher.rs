// Fetch window + the three EC2 series (CPU average, network in/out sums).

use chrono::{DateTime, Duration, DurationRound, Utc};

use crate::backends::{InstanceDirectory, MetricsStore};
use crate::models::{MetricQuery, MetricSeries, Statistic, TimeWindow, Unit};

pub const CPU_ID: &str = "cpu";
pub const NETWORK_IN_ID: &str = "netin";
pub const NETWORK_OUT_ID: &str = "netout";

const NAMESPACE: &str = "AWS/EC2";

/// The three raw series for one instance, possibly on different timestamp grids.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InstanceSeries {
    pub cpu: MetricSeries,
    pub network_in: MetricSeries,
    pub network_out: MetricSeries,
}

fn truncate_to_minute(t: DateTime<Utc>) -> DateTime<Utc> {
    t.duration_trunc(Duration::minutes(1)).unwrap_or(t)
}

/// end = now truncated to the minute; start = max(end - lookback, launch truncated to the minute).
pub fn fetch_window(
    now: DateTime<Utc>,
    launch_time: DateTime<Utc>,
    lookback: Duration,
) -> TimeWindow {
    let end = truncate_to_minute(now);
    let launch = truncate_to_minute(launch_time);
    let start = (end - lookback).max(launch);
    TimeWindow { start, end }
}

pub fn metric_queries(instance_id: &str, period_seconds: u32) -> Vec<MetricQuery> {
    let query = |id: &'static str, metric_name: &'static str, stat: Statistic, unit: Unit| MetricQuery {
        id,
        namespace: NAMESPACE,
        metric_name,
        instance_id: instance_id.to_string(),
        period_seconds,
        stat,
        unit,
    };
    vec![
        query(CPU_ID, "CPUUtilization", Statistic::Average, Unit::Percent),
        query(NETWORK_IN_ID, "NetworkIn", Statistic::Sum, Unit::Bytes),
        query(NETWORK_OUT_ID, "NetworkOut", Statistic::Sum, Unit::Bytes),
    ]
}

pub struct MetricsFetcher<'a> {
    pub metrics: &'a dyn MetricsStore,
    pub instances: &'a dyn InstanceDirectory,
}

impl MetricsFetcher<'_> {
    /// Resolve the window from the instance's launch time, then read all three series in one call.
    /// Any upstream failure is returned as-is; there is no retry.
    pub async fn fetch(
        &self,
        instance_id: &str,
        period_seconds: u32,
        now: DateTime<Utc>,
        lookback: Duration,
        max_datapoints: u32,
    ) -> anyhow::Result<(TimeWindow, InstanceSeries)> {
        let launch = self
            .instances
            .launch_time(instance_id)
            .await
            .map_err(|e| anyhow::anyhow!("describe instance {}: {}", instance_id, e))?;
        let window = fetch_window(now, launch, lookback);
        tracing::debug!(
            operation = "fetch_window",
            launch_time = %launch,
            window_start = %window.start,
            window_end = %window.end,
            "resolved fetch window"
        );

        let queries = metric_queries(instance_id, period_seconds);
        let mut results = self
            .metrics
            .get_metric_data(&queries, &window, max_datapoints)
            .await
            .map_err(|e| anyhow::anyhow!("fetch metrics for {}: {}", instance_id, e))?;

        let mut take = |id: &str| {
            results
                .remove(id)
                .map(|points| MetricSeries::from_points(&points))
                .unwrap_or_default()
        };
        let series = InstanceSeries {
            cpu: take(CPU_ID),
            network_in: take(NETWORK_IN_ID),
            network_out: take(NETWORK_OUT_ID),
        };
        Ok((window, series))
    }
}
