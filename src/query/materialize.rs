// Copy a successful result artifact to the fixed alias key in the same bucket.
// The alias is last-writer-wins: concurrent successes race and one of them ends up there.

use crate::backends::ObjectStore;
use crate::error::{QueryError, QueryResult};
use crate::models::{ObjectRef, QueryExecution};

const DEFAULT_EXTENSION: &str = "csv";

/// `<prefix>/<name>.<ext>` in the result's bucket, ext taken from the result key.
pub fn alias_for(result: &ObjectRef, prefix: &str, name: &str) -> ObjectRef {
    let ext = result.extension().unwrap_or(DEFAULT_EXTENSION);
    let file = format!("{}.{}", name, ext);
    let prefix = prefix.trim_matches('/');
    if prefix.is_empty() {
        result.sibling(file)
    } else {
        result.sibling(format!("{}/{}", prefix, file))
    }
}

pub async fn materialize(
    objects: &dyn ObjectStore,
    execution: &QueryExecution,
    prefix: &str,
    name: &str,
) -> QueryResult<ObjectRef> {
    let fallback_alias = || format!("{}.{}", name, DEFAULT_EXTENSION);
    let source = execution
        .result_object()
        .map_err(|e| QueryError::Materialization {
            alias: fallback_alias(),
            message: e.to_string(),
        })?;
    let alias = alias_for(&source, prefix, name);
    let alias_file = alias.key.rsplit('/').next().unwrap_or(&alias.key).to_string();

    objects
        .copy_object(&source, &alias)
        .await
        .map_err(|e| QueryError::Materialization {
            alias: alias_file,
            message: e.to_string(),
        })?;
    tracing::debug!(
        execution_id = %execution.id,
        from = %source,
        to = %alias,
        "result materialized"
    );
    Ok(alias)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alias_keeps_bucket_and_extension() {
        let r = ObjectRef::new("bucket", "athena-query-results/1234-abcd.csv");
        let alias = alias_for(&r, "athena-query-results", "latest");
        assert_eq!(alias.to_string(), "s3://bucket/athena-query-results/latest.csv");
    }

    #[test]
    fn alias_defaults_to_csv_without_extension() {
        let r = ObjectRef::new("bucket", "results/1234");
        let alias = alias_for(&r, "/results/", "latest");
        assert_eq!(alias.key, "results/latest.csv");
    }
}
