use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use reqwest::{header, StatusCode, Url};
use tracing::{debug, instrument};

use crate::config::ObjectStoreConfig;

#[derive(Debug, Clone, Copy)]
pub struct UploadRequest<'a> {
    pub bucket: &'a str,
    pub path: &'a str,
    pub local_file_path: &'a Path,
    pub content_type: &'a str,
}

#[derive(Debug, Clone, Copy)]
pub struct DeleteRequest<'a> {
    pub bucket: &'a str,
    pub path: &'a str,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Uploaded {
    pub url: String,
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn upload(&self, req: UploadRequest<'_>) -> Result<Uploaded>;

    /// Removes an object. Removing a missing object succeeds.
    async fn delete(&self, req: DeleteRequest<'_>) -> Result<()>;

    /// The URL an object at `path` is served from.
    fn public_url(&self, path: &str) -> String;
}

pub fn from_cfg(cfg: &ObjectStoreConfig) -> Result<Arc<dyn ObjectStore>> {
    Ok(match cfg {
        ObjectStoreConfig::Local(cfg) => Arc::new(LocalObjectStore::new(
            cfg.root.clone(),
            cfg.public_base_url.clone(),
        )),

        ObjectStoreConfig::Http(cfg) => Arc::new(HttpObjectStore::new(
            crate::http::client(cfg.request_timeout.into())?,
            cfg.endpoint.clone(),
            cfg.public_base_url.clone(),
            cfg.auth_token.clone(),
        )),
    })
}

fn join_url(base: &Url, path: &str) -> String {
    format!("{}/{}", base.as_str().trim_end_matches('/'), path)
}

/// Stores objects as files under `root/{bucket}/{path}`.
///
/// Content types are not kept. The API server serves these files under `/objects/` as
/// `application/rss+xml`, the only kind of object podfeed publishes.
pub struct LocalObjectStore {
    root: PathBuf,
    public_base_url: Url,
}

impl LocalObjectStore {
    pub fn new(root: PathBuf, public_base_url: Url) -> Self {
        Self {
            root,
            public_base_url,
        }
    }

    fn object_path(&self, bucket: &str, path: &str) -> Result<PathBuf> {
        if path.split('/').any(|segment| segment.is_empty() || segment == "..") {
            bail!("malformed object path `{path}`");
        }

        Ok(self.root.join(bucket).join(path))
    }

    /// Reads a stored object, returning `None` if there is no such object.
    #[instrument(level = "DEBUG", skip(self))]
    pub async fn read(&self, bucket: &str, path: &str) -> Result<Option<Vec<u8>>> {
        let Ok(src) = self.object_path(bucket, path) else {
            debug!("Refusing to read `{path}`");
            return Ok(None);
        };

        match tokio::fs::read(&src).await {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| anyhow!("could not read `{}`", src.display())),
        }
    }
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    #[instrument(level = "DEBUG", skip(self))]
    async fn upload(&self, req: UploadRequest<'_>) -> Result<Uploaded> {
        let dst = self.object_path(req.bucket, req.path)?;

        if let Some(parent) = dst.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| anyhow!("could not create the directory `{}`", parent.display()))?;
        }

        tokio::fs::copy(req.local_file_path, &dst)
            .await
            .with_context(|| {
                anyhow!(
                    "could not copy `{}` to `{}`",
                    req.local_file_path.display(),
                    dst.display()
                )
            })?;
        debug!("Stored `{}`", dst.display());

        Ok(Uploaded {
            url: self.public_url(req.path),
        })
    }

    #[instrument(level = "DEBUG", skip(self))]
    async fn delete(&self, req: DeleteRequest<'_>) -> Result<()> {
        let dst = self.object_path(req.bucket, req.path)?;

        match tokio::fs::remove_file(&dst).await {
            Ok(()) => Ok(()),

            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("`{}` is already gone", dst.display());
                Ok(())
            }

            Err(e) => Err(e).with_context(|| anyhow!("could not remove `{}`", dst.display())),
        }
    }

    fn public_url(&self, path: &str) -> String {
        join_url(&self.public_base_url, path)
    }
}

/// Talks to an object storage gateway accepting `PUT` and `DELETE` at
/// `{endpoint}/{bucket}/{path}`.
pub struct HttpObjectStore {
    client: reqwest::Client,
    endpoint: Url,
    public_base_url: Url,
    auth_token: Option<String>,
}

impl HttpObjectStore {
    pub fn new(
        client: reqwest::Client,
        endpoint: Url,
        public_base_url: Url,
        auth_token: Option<String>,
    ) -> Self {
        Self {
            client,
            endpoint,
            public_base_url,
            auth_token,
        }
    }

    fn object_url(&self, bucket: &str, path: &str) -> Result<Url> {
        let url = join_url(&self.endpoint, &format!("{bucket}/{path}"));

        Url::parse(&url).with_context(|| anyhow!("could not build an object URL `{url}`"))
    }

    fn authorize(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.auth_token {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }
}

#[async_trait]
impl ObjectStore for HttpObjectStore {
    #[instrument(level = "DEBUG", skip(self))]
    async fn upload(&self, req: UploadRequest<'_>) -> Result<Uploaded> {
        let url = self.object_url(req.bucket, req.path)?;
        let body = tokio::fs::read(req.local_file_path)
            .await
            .with_context(|| anyhow!("could not read `{}`", req.local_file_path.display()))?;

        self.authorize(self.client.put(url.clone()))
            .header(header::CONTENT_TYPE, req.content_type)
            .body(body)
            .send()
            .await
            .map_err(Into::into)
            .and_then(|r| r.error_for_status().context("object store returned an error"))
            .with_context(|| anyhow!("could not upload to `{url}`"))?;

        Ok(Uploaded {
            url: self.public_url(req.path),
        })
    }

    #[instrument(level = "DEBUG", skip(self))]
    async fn delete(&self, req: DeleteRequest<'_>) -> Result<()> {
        let url = self.object_url(req.bucket, req.path)?;

        let response = self
            .authorize(self.client.delete(url.clone()))
            .send()
            .await
            .with_context(|| anyhow!("could not delete `{url}`"))?;

        if response.status() == StatusCode::NOT_FOUND {
            debug!("`{url}` is already gone");
            return Ok(());
        }

        response
            .error_for_status()
            .context("object store returned an error")
            .with_context(|| anyhow!("could not delete `{url}`"))?;

        Ok(())
    }

    fn public_url(&self, path: &str) -> String {
        join_url(&self.public_base_url, path)
    }
}
