// Production adapters: CloudWatch (metrics), EC2 (launch time), S3 (objects), Athena (queries).

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use aws_sdk_cloudwatch::primitives::DateTime as AwsDateTime;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use tracing::{debug, instrument};

use super::{Backends, InstanceDirectory, MetricsStore, ObjectStore, QueryEngine, QuerySubmission};
use crate::models::{
    MetricPoint, MetricQuery, ObjectRef, QueryExecution, QueryState, RawResultSet, TimeWindow,
};

/// Loads shared AWS config from the environment (region, credentials chain) once.
pub async fn load_sdk_config() -> aws_config::SdkConfig {
    aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await
}

/// All four AWS clients. `objects` may be swapped for a local store by the caller.
pub fn backends(sdk: &aws_config::SdkConfig) -> Backends {
    Backends {
        metrics: Arc::new(CloudWatchMetrics::new(sdk)),
        instances: Arc::new(Ec2Instances::new(sdk)),
        objects: Arc::new(S3Objects::new(sdk)),
        engine: Arc::new(AthenaEngine::new(sdk)),
    }
}

fn to_chrono(t: &AwsDateTime) -> anyhow::Result<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp(t.secs(), t.subsec_nanos())
        .ok_or_else(|| anyhow::anyhow!("timestamp out of range: {}", t))
}

pub struct CloudWatchMetrics {
    client: aws_sdk_cloudwatch::Client,
}

impl CloudWatchMetrics {
    pub fn new(sdk: &aws_config::SdkConfig) -> Self {
        Self {
            client: aws_sdk_cloudwatch::Client::new(sdk),
        }
    }

    fn data_query(q: &MetricQuery) -> anyhow::Result<aws_sdk_cloudwatch::types::MetricDataQuery> {
        use aws_sdk_cloudwatch::types::{
            Dimension, Metric, MetricDataQuery, MetricStat, StandardUnit,
        };
        let dimension = Dimension::builder()
            .name("InstanceId")
            .value(&q.instance_id)
            .build();
        let metric = Metric::builder()
            .namespace(q.namespace)
            .metric_name(q.metric_name)
            .dimensions(dimension)
            .build();
        let stat = MetricStat::builder()
            .metric(metric)
            .period(q.period_seconds as i32)
            .stat(q.stat.as_str())
            .unit(StandardUnit::from(q.unit.as_str()))
            .build();
        Ok(MetricDataQuery::builder()
            .id(q.id)
            .metric_stat(stat)
            .return_data(true)
            .build())
    }
}

#[async_trait]
impl MetricsStore for CloudWatchMetrics {
    #[instrument(skip_all, fields(store = "cloudwatch", operation = "get_metric_data", queries = queries.len()))]
    async fn get_metric_data(
        &self,
        queries: &[MetricQuery],
        window: &TimeWindow,
        max_datapoints: u32,
    ) -> anyhow::Result<HashMap<String, Vec<MetricPoint>>> {
        use aws_sdk_cloudwatch::error::DisplayErrorContext;
        use aws_sdk_cloudwatch::types::ScanBy;

        let data_queries = queries
            .iter()
            .map(Self::data_query)
            .collect::<anyhow::Result<Vec<_>>>()?;

        // One page only: max_datapoints caps the whole read.
        let resp = self
            .client
            .get_metric_data()
            .set_metric_data_queries(Some(data_queries))
            .start_time(AwsDateTime::from_secs(window.start.timestamp()))
            .end_time(AwsDateTime::from_secs(window.end.timestamp()))
            .scan_by(ScanBy::TimestampAscending)
            .max_datapoints(max_datapoints as i32)
            .send()
            .await
            .map_err(|e| anyhow::anyhow!("GetMetricData: {}", DisplayErrorContext(e)))?;

        let mut out: HashMap<String, Vec<MetricPoint>> = HashMap::new();
        for result in resp.metric_data_results() {
            let Some(id) = result.id() else {
                continue;
            };
            let points = out.entry(id.to_string()).or_default();
            for (t, v) in result.timestamps().iter().zip(result.values()) {
                points.push(MetricPoint::new(to_chrono(t)?, *v));
            }
        }
        if resp.next_token().is_some_and(|t| !t.is_empty()) {
            debug!(max_datapoints, "metric data truncated at max_datapoints");
        }
        debug!(series = out.len(), "metric data fetched");
        Ok(out)
    }
}

pub struct Ec2Instances {
    client: aws_sdk_ec2::Client,
}

impl Ec2Instances {
    pub fn new(sdk: &aws_config::SdkConfig) -> Self {
        Self {
            client: aws_sdk_ec2::Client::new(sdk),
        }
    }
}

#[async_trait]
impl InstanceDirectory for Ec2Instances {
    #[instrument(skip(self), fields(operation = "describe_instances"))]
    async fn launch_time(&self, instance_id: &str) -> anyhow::Result<DateTime<Utc>> {
        use aws_sdk_ec2::error::DisplayErrorContext;

        let resp = self
            .client
            .describe_instances()
            .instance_ids(instance_id)
            .send()
            .await
            .map_err(|e| anyhow::anyhow!("DescribeInstances: {}", DisplayErrorContext(e)))?;
        let launch = resp
            .reservations()
            .iter()
            .flat_map(|r| r.instances())
            .find_map(|i| i.launch_time())
            .ok_or_else(|| anyhow::anyhow!("no launch time for instance {}", instance_id))?;
        to_chrono(launch)
    }
}

pub struct S3Objects {
    client: aws_sdk_s3::Client,
}

impl S3Objects {
    pub fn new(sdk: &aws_config::SdkConfig) -> Self {
        Self {
            client: aws_sdk_s3::Client::new(sdk),
        }
    }
}

#[async_trait]
impl ObjectStore for S3Objects {
    #[instrument(skip_all, fields(store = "s3", operation = "put_object", object = %target, bytes = body.len()))]
    async fn put_object(
        &self,
        target: &ObjectRef,
        body: Bytes,
        content_type: &str,
    ) -> anyhow::Result<()> {
        use aws_sdk_s3::error::DisplayErrorContext;
        use aws_sdk_s3::primitives::ByteStream;

        self.client
            .put_object()
            .bucket(&target.bucket)
            .key(&target.key)
            .body(ByteStream::from(body))
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| anyhow::anyhow!("PutObject {}: {}", target, DisplayErrorContext(e)))?;
        Ok(())
    }

    #[instrument(skip_all, fields(store = "s3", operation = "copy_object", from = %source, to = %target))]
    async fn copy_object(&self, source: &ObjectRef, target: &ObjectRef) -> anyhow::Result<()> {
        use aws_sdk_s3::error::DisplayErrorContext;

        self.client
            .copy_object()
            .bucket(&target.bucket)
            .key(&target.key)
            .copy_source(source.copy_source())
            .send()
            .await
            .map_err(|e| anyhow::anyhow!("CopyObject {}: {}", source, DisplayErrorContext(e)))?;
        Ok(())
    }
}

pub struct AthenaEngine {
    client: aws_sdk_athena::Client,
}

impl AthenaEngine {
    pub fn new(sdk: &aws_config::SdkConfig) -> Self {
        Self {
            client: aws_sdk_athena::Client::new(sdk),
        }
    }
}

#[async_trait]
impl QueryEngine for AthenaEngine {
    #[instrument(skip_all, fields(engine = "athena", operation = "start_query_execution", database = %submission.database))]
    async fn start_query(&self, submission: &QuerySubmission) -> anyhow::Result<String> {
        use aws_sdk_athena::error::DisplayErrorContext;
        use aws_sdk_athena::types::{QueryExecutionContext, ResultConfiguration};

        let resp = self
            .client
            .start_query_execution()
            .query_string(&submission.sql)
            .query_execution_context(
                QueryExecutionContext::builder()
                    .database(&submission.database)
                    .build(),
            )
            .result_configuration(
                ResultConfiguration::builder()
                    .output_location(&submission.output_location)
                    .build(),
            )
            .send()
            .await
            .map_err(|e| anyhow::anyhow!("{}", DisplayErrorContext(e)))?;
        resp.query_execution_id()
            .map(str::to_string)
            .ok_or_else(|| anyhow::anyhow!("StartQueryExecution returned no execution id"))
    }

    async fn get_query_execution(&self, execution_id: &str) -> anyhow::Result<QueryExecution> {
        use aws_sdk_athena::error::DisplayErrorContext;

        let resp = self
            .client
            .get_query_execution()
            .query_execution_id(execution_id)
            .send()
            .await
            .map_err(|e| anyhow::anyhow!("{}", DisplayErrorContext(e)))?;
        let exec = resp
            .query_execution()
            .ok_or_else(|| anyhow::anyhow!("no execution returned for {}", execution_id))?;
        let status = exec.status();
        let state = status
            .and_then(|s| s.state())
            .map(|s| QueryState::from_engine(s.as_str()))
            .unwrap_or(QueryState::Queued);

        let mut execution = QueryExecution::new(execution_id, state);
        if let Some(location) = exec
            .result_configuration()
            .and_then(|c| c.output_location())
        {
            execution = execution.with_result_location(location);
        }
        if let Some(reason) = status.and_then(|s| s.state_change_reason()) {
            execution = execution.with_failure_reason(reason);
        }
        Ok(execution)
    }

    async fn get_query_results(&self, execution_id: &str) -> anyhow::Result<RawResultSet> {
        use aws_sdk_athena::error::DisplayErrorContext;

        let resp = self
            .client
            .get_query_results()
            .query_execution_id(execution_id)
            .send()
            .await
            .map_err(|e| anyhow::anyhow!("{}", DisplayErrorContext(e)))?;
        let rows = resp
            .result_set()
            .map(|rs| {
                rs.rows()
                    .iter()
                    .map(|row| {
                        row.data()
                            .iter()
                            .map(|d| d.var_char_value().map(str::to_string))
                            .collect()
                    })
                    .collect()
            })
            .unwrap_or_default();
        Ok(rows)
    }
}
