mod types;

use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use reqwest::Url;
use serde::Deserialize;
use take_mut::take;
use tracing::{debug, info};

use crate::syndication::{self, RssOptions};

pub use self::types::*;

#[derive(Deserialize, Debug, Clone)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct Config {
    pub bind_addr: String,
    pub db_path: PathBuf,

    /// The plan treated as the free tier regardless of its stored limits.
    pub free_plan_id: String,

    /// The header carrying the id of the authenticated user, set by the fronting proxy.
    pub user_id_header: String,

    pub rss: RssConfig,
    pub object_store: ObjectStoreConfig,
    pub qiita: QiitaConfig,
    pub slack: SlackConfig,
}

impl Config {
    pub fn update(&mut self, args: crate::cli::Args) {
        fn set_if_some<T>(dst: &mut T, v: Option<T>) {
            if let Some(v) = v {
                *dst = v;
            }
        }

        set_if_some(&mut self.bind_addr, args.bind_addr);
        set_if_some(&mut self.db_path, args.db_path);
        set_if_some(&mut self.qiita.cache_dir, args.cache_dir.map(Some));
    }

    pub fn resolve_relative_paths(&mut self, config_dir: impl AsRef<Path>) {
        let config_dir = config_dir.as_ref();

        // rebuild the whole struct so a new path field can't be missed.
        take(self, |mut this| {
            this.rss.resolve_relative_paths(config_dir);
            this.object_store.resolve_relative_paths(config_dir);
            this.qiita.resolve_relative_paths(config_dir);

            Self {
                bind_addr: this.bind_addr,
                db_path: config_dir.join(&this.db_path),
                free_plan_id: this.free_plan_id,
                user_id_header: this.user_id_header,
                rss: this.rss,
                object_store: this.object_store,
                qiita: this.qiita,
                slack: this.slack,
            }
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            bind_addr: "127.0.0.1:20654".into(),
            db_path: "./podfeed.sqlite3".into(),
            free_plan_id: "free".into(),
            user_id_header: "x-user-id".into(),
            rss: Default::default(),
            object_store: Default::default(),
            qiita: Default::default(),
            slack: Default::default(),
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct RssConfig {
    pub bucket: String,
    pub max_episodes: usize,
    pub site_url: String,
    pub default_image_url: Option<String>,
    pub author_name: Option<String>,
    pub author_email: Option<String>,

    /// Where RSS files are staged before upload. The system temporary directory if unset.
    pub temp_dir: Option<PathBuf>,
}

impl RssConfig {
    pub fn options(&self) -> RssOptions {
        RssOptions {
            max_episodes: self.max_episodes,
            site_url: self.site_url.clone(),
            default_image_url: self.default_image_url.clone(),
            author_name: self.author_name.clone(),
            author_email: self.author_email.clone(),
        }
    }

    fn resolve_relative_paths(&mut self, config_dir: &Path) {
        self.temp_dir = self.temp_dir.take().map(|dir| config_dir.join(dir));
    }
}

impl Default for RssConfig {
    fn default() -> Self {
        let options = RssOptions::default();

        Self {
            bucket: "podfeed-rss".into(),
            max_episodes: syndication::DEFAULT_MAX_EPISODES,
            site_url: options.site_url,
            default_image_url: None,
            author_name: None,
            author_email: None,
            temp_dir: None,
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(tag = "kind", rename_all = "kebab-case", deny_unknown_fields)]
pub enum ObjectStoreConfig {
    Local(LocalObjectStoreConfig),
    Http(HttpObjectStoreConfig),
}

impl ObjectStoreConfig {
    fn resolve_relative_paths(&mut self, config_dir: &Path) {
        match self {
            Self::Local(cfg) => cfg.root = config_dir.join(&cfg.root),
            Self::Http(_) => {}
        }
    }
}

impl Default for ObjectStoreConfig {
    fn default() -> Self {
        Self::Local(LocalObjectStoreConfig {
            root: "./objects".into(),
            public_base_url: "http://127.0.0.1:20654/objects/".parse().unwrap(),
        })
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct LocalObjectStoreConfig {
    pub root: PathBuf,
    pub public_base_url: Url,
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(30)
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct HttpObjectStoreConfig {
    pub endpoint: Url,
    pub public_base_url: Url,
    pub auth_token: Option<String>,

    #[serde(default = "default_request_timeout")]
    pub request_timeout: Duration,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct QiitaConfig {
    pub base_url: Url,
    pub access_token: Option<String>,

    /// Responses are cached in memory if unset.
    pub cache_dir: Option<PathBuf>,
    pub request_timeout: Duration,
}

impl QiitaConfig {
    fn resolve_relative_paths(&mut self, config_dir: &Path) {
        self.cache_dir = self.cache_dir.take().map(|dir| config_dir.join(dir));
    }
}

impl Default for QiitaConfig {
    fn default() -> Self {
        Self {
            base_url: "https://qiita.com/".parse().unwrap(),
            access_token: None,
            cache_dir: None,
            request_timeout: default_request_timeout(),
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct SlackConfig {
    /// Notifications are not sent if unset.
    pub webhook_url: Option<Url>,
    pub request_timeout: Duration,
}

impl Default for SlackConfig {
    fn default() -> Self {
        Self {
            webhook_url: None,
            request_timeout: Duration::from_secs(10),
        }
    }
}

pub fn load(search_paths: &[PathBuf]) -> Result<Config> {
    for path in search_paths {
        debug!("Trying to load {}", path.display());
        let mut contents = String::new();

        {
            let mut f = match File::open(path) {
                Ok(f) => f,

                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    debug!(file = %path.display(), "File not found, skipping");
                    continue;
                }

                Err(e) => {
                    return Err(e)
                        .context(anyhow!("could not load a config file `{}`", path.display()));
                }
            };

            f.read_to_string(&mut contents).with_context(|| {
                anyhow!(
                    "could not read the contents of a config file `{}`",
                    path.display()
                )
            })?;
        }

        let mut cfg: Config = toml::from_str(&contents)
            .with_context(|| anyhow!("could not load the config file `{}`", path.display()))?;

        if let Some(parent) = path.parent() {
            cfg.resolve_relative_paths(parent);
        }

        info!("Loaded a config file `{}`", path.display());

        return Ok(cfg);
    }

    info!("Using the default config");

    Ok(Default::default())
}

#[cfg(test)]
mod tests {
    use std::time::Duration as StdDuration;

    use tempfile::TempDir;

    use super::*;

    #[test]
    fn empty_config_uses_defaults() {
        let cfg: Config = toml::from_str("").unwrap();

        assert_eq!(cfg.free_plan_id, "free");
        assert_eq!(cfg.user_id_header, "x-user-id");
        assert_eq!(cfg.rss.max_episodes, 30);
        assert!(matches!(cfg.object_store, ObjectStoreConfig::Local(_)));
        assert!(cfg.slack.webhook_url.is_none());
    }

    #[test]
    fn parses_full_config() {
        let cfg: Config = toml::from_str(
            r#"
            bind-addr = "0.0.0.0:8080"
            db-path = "podfeed.db"
            free-plan-id = "plan_free"

            [rss]
            bucket = "feeds"
            max-episodes = 10
            author-name = "Podfeed Radio"

            [object-store]
            kind = "http"
            endpoint = "https://storage.example.com"
            public-base-url = "https://cdn.example.com"
            request-timeout = "1m 30s"

            [qiita]
            access-token = "secret"
            request-timeout = 15

            [slack]
            webhook-url = "https://hooks.slack.com/services/T0/B0/X"
            "#,
        )
        .unwrap();

        assert_eq!(cfg.bind_addr, "0.0.0.0:8080");
        assert_eq!(cfg.free_plan_id, "plan_free");
        assert_eq!(cfg.rss.options().max_episodes, 10);
        assert_eq!(cfg.rss.options().author_name.as_deref(), Some("Podfeed Radio"));

        let ObjectStoreConfig::Http(store) = &cfg.object_store else {
            panic!("expected an HTTP object store");
        };
        assert_eq!(StdDuration::from(store.request_timeout), StdDuration::from_secs(90));
        assert_eq!(
            StdDuration::from(cfg.qiita.request_timeout),
            StdDuration::from_secs(15)
        );
        assert!(cfg.slack.webhook_url.is_some());
    }

    #[test]
    fn command_line_overrides_config() {
        let args = <crate::cli::Args as clap::Parser>::try_parse_from([
            "podfeed",
            "--config",
            "custom.toml",
            "--bind-addr",
            "0.0.0.0:8080",
            "--cache-dir",
            "/var/cache/podfeed",
        ])
        .unwrap();
        assert_eq!(args.config_path, Some(PathBuf::from("custom.toml")));

        let mut cfg = Config::default();
        let db_path = cfg.db_path.clone();
        cfg.update(args);

        assert_eq!(cfg.bind_addr, "0.0.0.0:8080");
        assert_eq!(cfg.db_path, db_path);
        assert_eq!(cfg.qiita.cache_dir, Some(PathBuf::from("/var/cache/podfeed")));
    }

    #[test]
    fn rejects_unknown_fields() {
        assert!(toml::from_str::<Config>("fetch-interval = \"1h\"").is_err());
    }

    #[test]
    fn resolves_paths_against_config_dir() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("podfeed.toml");
        std::fs::write(
            &path,
            r#"
            db-path = "data/podfeed.sqlite3"

            [object-store]
            kind = "local"
            root = "objects"
            public-base-url = "http://localhost/objects/"
            "#,
        )
        .unwrap();

        let missing = dir.path().join("missing.toml");
        let cfg = load(&[missing, path]).unwrap();

        assert_eq!(cfg.db_path, dir.path().join("data/podfeed.sqlite3"));
        let ObjectStoreConfig::Local(store) = &cfg.object_store else {
            panic!("expected a local object store");
        };
        assert_eq!(store.root, dir.path().join("objects"));
    }
}
