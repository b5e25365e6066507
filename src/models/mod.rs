// Domain models shared by the ingestion and query pipelines

mod ingestion;
mod metric;
mod object;
mod query;

pub use ingestion::{DatapointCounts, IngestionSummary};
pub use metric::{
    MergedRow, MetricPoint, MetricQuery, MetricSeries, Statistic, TimeWindow, Unit, iso_timestamp,
};
pub use object::ObjectRef;
pub use query::{QueryExecution, QueryState, RawResultSet, ResultPreview};
