// Configuration for the web UI and the remote pet API it fronts.
// Sources, lowest priority first: built-in defaults, config.toml, APP_* env vars.

use anyhow::Result;
use config::{builder::DefaultState, Config, ConfigBuilder, Environment, File};
use serde::Deserialize;
use std::{path::PathBuf, time::Duration};

use crate::search::paginator::PAGE_SIZE;

#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub server_address: String,
    // Base of every API endpoint, e.g. http://host/api
    pub api_host: String,
    // Image paths come back relative ("/storage/..."), resolved against this
    pub image_base_url: String,
    pub page_size: usize,
    pub suggestion_debounce_ms: u64,
    pub request_timeout_secs: u64,
    // Visitors untouched this long are dropped from memory
    pub visitor_idle_secs: u64,
    // When set, each visitor's storage is a JSON file in this directory
    pub session_dir: Option<PathBuf>,
    pub static_dir: String,
}

impl Settings {
    pub fn new() -> Result<Self> {
        dotenv::dotenv().ok(); // Load .env file if present

        let builder = Self::with_defaults()?
            .add_source(File::with_name("config").required(false))
            // APP_API_HOST, APP_PAGE_SIZE, ...
            .add_source(
                Environment::with_prefix("APP")
                    .prefix_separator("_")
                    .separator("__"),
            );

        let settings = builder.build()?.try_deserialize()?;
        Ok(settings)
    }

    /// Settings built from defaults only; no file or environment lookup.
    pub fn defaults() -> Result<Self> {
        Ok(Self::with_defaults()?.build()?.try_deserialize()?)
    }

    fn with_defaults() -> Result<ConfigBuilder<DefaultState>> {
        Ok(Config::builder()
            .set_default("server_address", "127.0.0.1:3000")?
            .set_default("api_host", "http://localhost:8000/api")?
            .set_default("image_base_url", "http://localhost:8000")?
            .set_default("page_size", PAGE_SIZE as u64)?
            .set_default("suggestion_debounce_ms", 300)?
            .set_default("request_timeout_secs", 10)?
            .set_default("visitor_idle_secs", 3600)?
            .set_default("static_dir", "static")?)
    }

    pub fn suggestion_debounce(&self) -> Duration {
        Duration::from_millis(self.suggestion_debounce_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn visitor_idle(&self) -> Duration {
        Duration::from_secs(self.visitor_idle_secs)
    }
}
