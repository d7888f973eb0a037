use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Context};
use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::error::{Error, Result};
use crate::notify::Notifier;
use crate::object_store::{DeleteRequest, ObjectStore, UploadRequest, Uploaded};
use crate::storage::entities::{RssState, RssToken, User};
use crate::storage::Storage;
use crate::syndication::{self, RssOptions};

const RSS_FILE_NAME: &str = "rss.xml";
pub const RSS_CONTENT_TYPE: &str = "application/rss+xml";

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct RssSettings {
    #[serde(flatten)]
    pub rss: RssState,
    pub url: Option<String>,
}

/// Drives the RSS feature of a user through enable, rotate and disable.
///
/// The token column is authoritative. Generating, uploading and deleting the
/// published file happen after the token change is committed and never fail
/// the operation.
#[derive(Clone)]
pub struct RssPublisher {
    storage: Arc<Storage>,
    store: Arc<dyn ObjectStore>,
    bucket: Arc<str>,
    options: Arc<RssOptions>,
    temp_dir: Option<PathBuf>,
    notifier: Notifier,
}

async fn best_effort<T>(
    step: &'static str,
    user_id: &str,
    fut: impl Future<Output = anyhow::Result<T>>,
) -> Option<T> {
    match fut.await {
        Ok(value) => Some(value),

        Err(e) => {
            warn!(step, user_id, "RSS file step failed: {e:#}");
            None
        }
    }
}

impl RssPublisher {
    pub fn new(
        storage: Arc<Storage>,
        store: Arc<dyn ObjectStore>,
        bucket: impl Into<Arc<str>>,
        options: RssOptions,
        temp_dir: Option<PathBuf>,
        notifier: Notifier,
    ) -> Self {
        Self {
            storage,
            store,
            bucket: bucket.into(),
            options: Arc::new(options),
            temp_dir,
            notifier,
        }
    }

    fn settings_for(&self, rss: RssState) -> RssSettings {
        let url = rss
            .token()
            .map(|token| self.store.public_url(&token.object_path()));

        RssSettings { rss, url }
    }

    async fn load_user(&self, user_id: &str) -> Result<User> {
        let mut tx = self.storage.begin().await?;

        tx.find_user(user_id).await?.ok_or(Error::NotFound("user"))
    }

    pub async fn settings(&self, user_id: &str) -> Result<RssSettings> {
        let user = self.load_user(user_id).await?;

        Ok(self.settings_for(user.rss))
    }

    /// Turns the feed on, minting a token unless one exists already.
    #[instrument(skip(self))]
    pub async fn enable(&self, user_id: &str) -> Result<RssSettings> {
        let mut tx = self.storage.begin().await?;
        let user = tx
            .find_user(user_id)
            .await?
            .ok_or(Error::NotFound("user"))?;

        let newly_enabled = user.rss == RssState::Disabled;
        let user = if newly_enabled {
            tx.set_rss_token(user_id, Some(&RssToken::generate()))
                .await?
        } else {
            user
        };
        tx.commit().await?;

        if let Some(token) = user.rss.token() {
            best_effort("publish", user_id, self.publish(&user, token)).await;
        }

        if newly_enabled {
            info!(user_id, "Enabled RSS");
            self.notifier
                .notify(format!("RSS was enabled for {}", user.display_name));
        }

        Ok(self.settings_for(user.rss))
    }

    /// Replaces the token, retiring the file published under the old one.
    #[instrument(skip(self))]
    pub async fn rotate(&self, user_id: &str) -> Result<RssSettings> {
        let mut tx = self.storage.begin().await?;
        let user = tx
            .find_user(user_id)
            .await?
            .ok_or(Error::NotFound("user"))?;

        let RssState::Enabled(old_token) = user.rss else {
            return Err(Error::validation("RSS is not enabled"));
        };

        let new_token = RssToken::generate();
        let user = tx.set_rss_token(user_id, Some(&new_token)).await?;
        tx.commit().await?;
        info!(user_id, "Rotated the RSS token");

        best_effort("delete", user_id, self.remove(&old_token)).await;
        best_effort("publish", user_id, self.publish(&user, &new_token)).await;

        Ok(self.settings_for(user.rss))
    }

    #[instrument(skip(self))]
    pub async fn disable(&self, user_id: &str) -> Result<RssSettings> {
        let mut tx = self.storage.begin().await?;
        let user = tx
            .find_user(user_id)
            .await?
            .ok_or(Error::NotFound("user"))?;

        let RssState::Enabled(old_token) = user.rss else {
            return Ok(self.settings_for(RssState::Disabled));
        };

        let user = tx.set_rss_token(user_id, None).await?;
        tx.commit().await?;
        info!(user_id, "Disabled RSS");

        best_effort("delete", user_id, self.remove(&old_token)).await;

        Ok(self.settings_for(user.rss))
    }

    /// Regenerates the published file under the current token.
    ///
    /// Does nothing if RSS is disabled.
    #[instrument(skip(self))]
    pub async fn refresh(&self, user_id: &str) -> Result<Option<Uploaded>> {
        let user = self.load_user(user_id).await?;

        match user.rss.token() {
            Some(token) => Ok(Some(self.publish(&user, token).await?)),
            None => Ok(None),
        }
    }

    fn make_temp_dir(&self) -> anyhow::Result<tempfile::TempDir> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("podfeed-rss-");

        let dir = match &self.temp_dir {
            Some(dir) => builder.tempdir_in(dir),
            None => builder.tempdir(),
        };

        dir.context("could not create a temporary directory")
    }

    async fn publish(&self, user: &User, token: &RssToken) -> anyhow::Result<Uploaded> {
        let programs = {
            let mut tx = self.storage.begin().await?;
            tx.get_recent_programs(&user.id, self.options.max_episodes)
                .await?
        };

        let rss = syndication::generate_user_rss(user, &programs, &self.options)?;

        // removed on drop if anything below fails.
        let dir = self.make_temp_dir()?;
        let local_file_path = dir.path().join(RSS_FILE_NAME);
        tokio::fs::write(&local_file_path, &rss.xml)
            .await
            .with_context(|| anyhow!("could not write `{}`", local_file_path.display()))?;

        let path = token.object_path();
        let uploaded = self
            .store
            .upload(UploadRequest {
                bucket: &self.bucket,
                path: &path,
                local_file_path: &local_file_path,
                content_type: RSS_CONTENT_TYPE,
            })
            .await;

        if let Err(e) = dir.close() {
            warn!("Could not remove a temporary directory: {e}");
        }

        let uploaded = uploaded?;
        info!(
            user_id = %user.id,
            episodes = rss.episode_count,
            url = %uploaded.url,
            "Published RSS"
        );

        Ok(uploaded)
    }

    async fn remove(&self, token: &RssToken) -> anyhow::Result<()> {
        self.store
            .delete(DeleteRequest {
                bucket: &self.bucket,
                path: &token.object_path(),
            })
            .await
    }
}
