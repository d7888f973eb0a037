use std::sync::Arc;

use anyhow::Result;

use crate::attempts::Attempts;
use crate::config::{Config, ObjectStoreConfig};
use crate::feeds::FeedManager;
use crate::notify::Notifier;
use crate::object_store::{self, LocalObjectStore, ObjectStore};
use crate::publish::RssPublisher;
use crate::qiita::QiitaClient;
use crate::storage::Storage;

#[derive(Clone)]
pub struct State {
    pub storage: Arc<Storage>,
    pub cfg: Arc<Config>,
    pub feeds: FeedManager,
    pub publisher: RssPublisher,
    pub attempts: Attempts,
    pub qiita: QiitaClient,

    /// Set when objects are kept on disk and served by the API server itself.
    pub local_objects: Option<Arc<LocalObjectStore>>,
}

impl State {
    pub async fn new(cfg: Config) -> Result<Self> {
        let storage = Arc::new(Storage::new(&cfg.db_path).await?);
        let store = object_store::from_cfg(&cfg.object_store)?;

        Self::from_parts(cfg, storage, store)
    }

    pub fn from_parts(
        cfg: Config,
        storage: Arc<Storage>,
        store: Arc<dyn ObjectStore>,
    ) -> Result<Self> {
        let notifier = match &cfg.slack.webhook_url {
            Some(url) => Notifier::new(
                crate::http::client(cfg.slack.request_timeout.into())?,
                Some(url.clone()),
            ),
            None => Notifier::disabled(),
        };

        let feeds = FeedManager::new(storage.clone(), cfg.free_plan_id.as_str(), notifier.clone());
        let publisher = RssPublisher::new(
            storage.clone(),
            store,
            cfg.rss.bucket.as_str(),
            cfg.rss.options(),
            cfg.rss.temp_dir.clone(),
            notifier.clone(),
        );
        let local_objects = match &cfg.object_store {
            ObjectStoreConfig::Local(local) => Some(Arc::new(LocalObjectStore::new(
                local.root.clone(),
                local.public_base_url.clone(),
            ))),
            ObjectStoreConfig::Http(_) => None,
        };
        let attempts = Attempts::new(storage.clone(), publisher.clone(), notifier);
        let qiita = QiitaClient::new(
            crate::http::cached_client(
                cfg.qiita.request_timeout.into(),
                cfg.qiita.cache_dir.clone(),
            )?,
            cfg.qiita.base_url.clone(),
            cfg.qiita.access_token.clone(),
        );

        Ok(State {
            storage,
            cfg: Arc::new(cfg),
            feeds,
            publisher,
            attempts,
            qiita,
            local_objects,
        })
    }
}
