// Object-store reference, rendered as s3://bucket/key

use std::fmt;
use std::str::FromStr;

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};

/// Everything but unreserved characters and the path separator.
const KEY_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~')
    .remove(b'/');

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectRef {
    pub bucket: String,
    pub key: String,
}

impl ObjectRef {
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
        }
    }

    /// Another key in the same bucket.
    pub fn sibling(&self, key: impl Into<String>) -> Self {
        Self::new(self.bucket.clone(), key)
    }

    /// Extension of the last key segment, if any (`results/abc.csv` -> `csv`).
    pub fn extension(&self) -> Option<&str> {
        let name = self.key.rsplit('/').next()?;
        let (stem, ext) = name.rsplit_once('.')?;
        if stem.is_empty() || ext.is_empty() {
            None
        } else {
            Some(ext)
        }
    }
}

impl ObjectRef {
    /// `bucket/key` with the key URL-encoded, as a server-side copy expects its source.
    pub fn copy_source(&self) -> String {
        format!(
            "{}/{}",
            self.bucket,
            utf8_percent_encode(&self.key, KEY_ENCODE_SET)
        )
    }
}

impl fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s3://{}/{}", self.bucket, self.key)
    }
}

impl FromStr for ObjectRef {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let rest = s
            .strip_prefix("s3://")
            .ok_or_else(|| anyhow::anyhow!("not an s3:// location: {}", s))?;
        let (bucket, key) = rest.split_once('/').unwrap_or((rest, ""));
        anyhow::ensure!(!bucket.is_empty(), "missing bucket in location: {}", s);
        Ok(Self::new(bucket, key.trim_start_matches('/')))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bucket_and_key() {
        let r: ObjectRef = "s3://metrics-bucket/athena-query-results/abc-123.csv"
            .parse()
            .unwrap();
        assert_eq!(r.bucket, "metrics-bucket");
        assert_eq!(r.key, "athena-query-results/abc-123.csv");
        assert_eq!(r.extension(), Some("csv"));
        assert_eq!(
            r.to_string(),
            "s3://metrics-bucket/athena-query-results/abc-123.csv"
        );
    }

    #[test]
    fn prefix_only_location_has_empty_key() {
        let r: ObjectRef = "s3://metrics-bucket".parse().unwrap();
        assert_eq!(r.key, "");
        assert_eq!(r.extension(), None);
    }

    #[test]
    fn copy_source_encodes_key_but_keeps_slashes() {
        let r = ObjectRef::new("metrics-bucket", "athena results/a+b%c.csv");
        assert_eq!(
            r.copy_source(),
            "metrics-bucket/athena%20results/a%2Bb%25c.csv"
        );
        let plain = ObjectRef::new("b", "athena-query-results/1234-abcd_x.csv");
        assert_eq!(plain.copy_source(), "b/athena-query-results/1234-abcd_x.csv");
        assert_eq!(ObjectRef::new("b", "é.csv").copy_source(), "b/%C3%A9.csv");
    }

    #[test]
    fn rejects_other_schemes() {
        assert!("https://example.com/x".parse::<ObjectRef>().is_err());
        assert!("s3:///key".parse::<ObjectRef>().is_err());
    }
}
