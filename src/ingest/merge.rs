// Align the three series on the union of their timestamps. Missing values stay empty.

use std::collections::BTreeSet;

use super::fetcher::InstanceSeries;
use crate::models::MergedRow;

/// Integral values without a decimal point, everything else to 3 places, absent as "".
pub fn format_value(value: Option<f64>) -> String {
    match value {
        None => String::new(),
        Some(v) if v.is_finite() && v.fract() == 0.0 => format!("{:.0}", v + 0.0),
        Some(v) => format!("{:.3}", v),
    }
}

/// Sorted union of timestamps; each column looked up independently.
pub fn merge_series(series: &InstanceSeries) -> Vec<MergedRow> {
    let timestamps: BTreeSet<&str> = series
        .cpu
        .timestamps()
        .chain(series.network_in.timestamps())
        .chain(series.network_out.timestamps())
        .collect();

    timestamps
        .into_iter()
        .map(|ts| MergedRow {
            timestamp: ts.to_string(),
            cpu_percent: format_value(series.cpu.get(ts)),
            network_in_bytes: format_value(series.network_in.get(ts)),
            network_out_bytes: format_value(series.network_out.get(ts)),
        })
        .collect()
}
