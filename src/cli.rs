use std::path::PathBuf;

use clap::ValueHint;

/// Podcast feed API server.
///
/// Options given here or through the environment override the config file.
#[derive(clap::Parser, Debug, Clone)]
#[command(version, about)]
pub struct Args {
    /// Config file to load instead of `./podfeed.toml` or `/etc/podfeed.toml`.
    #[arg(short, long = "config", env = "PODFEED_CONFIG", value_hint(ValueHint::FilePath))]
    pub config_path: Option<PathBuf>,

    /// Overrides `bind-addr`, e.g. `0.0.0.0:8080`.
    #[arg(long, env = "PODFEED_BIND_ADDR")]
    pub bind_addr: Option<String>,

    /// Overrides `db-path`. The SQLite database is created if missing.
    #[arg(long, env = "PODFEED_DB", value_hint(ValueHint::FilePath))]
    pub db_path: Option<PathBuf>,

    /// Overrides `qiita.cache-dir`, enabling the on-disk cache of Qiita responses.
    #[arg(long, env = "PODFEED_CACHE_DIR", value_hint(ValueHint::DirPath))]
    pub cache_dir: Option<PathBuf>,
}

impl Args {
    pub fn parse() -> Self {
        clap::Parser::parse()
    }
}
