// CSV body + date-partitioned key for one instance/day.

use bytes::Bytes;
use chrono::{DateTime, Datelike, Utc};

use crate::models::MergedRow;

pub const CONTENT_TYPE: &str = "text/csv";

/// `<prefix>/<YYYY>/<MM>/<DD>/instance-<id>.csv` for the window end date (UTC).
pub fn partition_key(prefix: &str, window_end: DateTime<Utc>, instance_id: &str) -> String {
    format!(
        "{}/{:04}/{:02}/{:02}/instance-{}.csv",
        prefix.trim_end_matches('/'),
        window_end.year(),
        window_end.month(),
        window_end.day(),
        instance_id
    )
}

/// Header row plus one record per merged row, `\n` terminated, standard quoting.
pub fn to_csv_bytes(rows: &[MergedRow]) -> anyhow::Result<Bytes> {
    let mut writer = csv::WriterBuilder::new()
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(Vec::with_capacity(64 * (rows.len() + 1)));
    writer.write_record(MergedRow::HEADER)?;
    for row in rows {
        writer.write_record(row.cells())?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| anyhow::anyhow!("csv flush: {}", e))?;
    Ok(Bytes::from(bytes))
}
