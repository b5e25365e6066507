// Summary returned by one ingestion run

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatapointCounts {
    pub timestamps: usize,
    pub cpu: usize,
    pub network_in: usize,
    pub network_out: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestionSummary {
    pub status: String,
    pub datapoints: DatapointCounts,
    pub s3_key: String,
    pub period_seconds: u32,
    pub window_start: String,
    pub window_end: String,
}
