use std::path::PathBuf;

use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;

use crate::parser::plan::SelectorPlan;

/// Looked up in the working directory, any format the `config` crate reads.
const CONFIG_FILE: &str = "catalog_scraper";
const ENV_PREFIX: &str = "SCRAPER";

pub const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (X11; Ubuntu; Linux x86_64; rv:126.0) Gecko/20100101 Firefox/126.0";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// Plain GET of the page HTML.
    Http,
    /// Headless-browser render through spider.cloud.
    Render,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub db_path: PathBuf,
    pub urls: Vec<String>,
    /// Pause between consecutive URLs.
    pub delay_ms: u64,
    pub timeout_secs: u64,
    pub backend: Backend,
    pub user_agent: String,
    pub plan: SelectorPlan,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            db_path: PathBuf::from("data/products.sqlite"),
            urls: Vec::new(),
            delay_ms: 1000,
            timeout_secs: 12,
            backend: Backend::Http,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            plan: SelectorPlan::default(),
        }
    }
}

/// Config file (optional), then `SCRAPER_*` environment variables on top.
pub fn load() -> Result<Settings> {
    Config::builder()
        .add_source(File::with_name(CONFIG_FILE).required(false))
        .add_source(
            Environment::with_prefix(ENV_PREFIX)
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("urls"),
        )
        .build()
        .context("Failed to read configuration")?
        .try_deserialize()
        .context("Invalid configuration")
}
