use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use http_cache_reqwest::{CACacheManager, Cache, HttpCache, MokaCache, MokaManager};
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use tracing::debug;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

pub fn client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .timeout(timeout)
        .user_agent(concat!("podfeed/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("could not create an HTTP client")
}

/// Builds a client that honors HTTP caching headers.
///
/// Responses are cached on disk if `cache_dir` is set and in memory otherwise.
pub fn cached_client(timeout: Duration, cache_dir: Option<PathBuf>) -> Result<ClientWithMiddleware> {
    let builder = ClientBuilder::new(client(timeout)?);

    let builder = if let Some(path) = cache_dir {
        debug!("Using a file cache at {}", path.display());
        builder.with(Cache(HttpCache {
            mode: Default::default(),
            manager: CACacheManager { path },
            options: Default::default(),
        }))
    } else {
        debug!("Using an in-memory cache");
        builder.with(Cache(HttpCache {
            mode: Default::default(),
            manager: MokaManager::new(MokaCache::builder().max_capacity(8192).build()),
            options: Default::default(),
        }))
    };

    Ok(builder.build())
}
