// Local object store: <root>/<bucket>/<key> on disk. Useful without S3 credentials.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use tracing::instrument;

use super::ObjectStore;
use crate::models::ObjectRef;

pub struct FsObjectStore {
    root: PathBuf,
}

impl FsObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Resolve a reference to a path under root, refusing anything that climbs out of it.
    pub fn path_for(&self, r: &ObjectRef) -> anyhow::Result<PathBuf> {
        anyhow::ensure!(!r.key.is_empty(), "empty key for {}", r);
        let relative = Path::new(&r.bucket).join(&r.key);
        anyhow::ensure!(
            relative
                .components()
                .all(|c| matches!(c, Component::Normal(_))),
            "refusing path outside store root: {}",
            r
        );
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl ObjectStore for FsObjectStore {
    #[instrument(skip_all, fields(store = "fs", operation = "put_object", object = %target, bytes = body.len()))]
    async fn put_object(
        &self,
        target: &ObjectRef,
        body: Bytes,
        _content_type: &str,
    ) -> anyhow::Result<()> {
        let path = self.path_for(target)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        // Write then rename so readers never see a half-written file.
        let tmp = path.with_extension("partial");
        tokio::fs::write(&tmp, &body).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }

    #[instrument(skip_all, fields(store = "fs", operation = "copy_object", from = %source, to = %target))]
    async fn copy_object(&self, source: &ObjectRef, target: &ObjectRef) -> anyhow::Result<()> {
        let from = self.path_for(source)?;
        let to = self.path_for(target)?;
        if let Some(parent) = to.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::copy(&from, &to)
            .await
            .map_err(|e| anyhow::anyhow!("copy {} -> {}: {}", source, target, e))?;
        Ok(())
    }
}
