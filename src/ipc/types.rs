use std::path::PathBuf;

use rusqlite::Connection;
use serde::Deserialize;

use crate::config::{CalcConfig, ConfigSource};

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

pub struct AppState {
    pub workspace: Option<PathBuf>,
    pub db: Option<Connection>,
    /// Defaults merged with the workspace's `gradesd.toml`.
    pub base_config: CalcConfig,
    pub base_source: ConfigSource,
}

impl AppState {
    pub fn new() -> Self {
        Self {
            workspace: None,
            db: None,
            base_config: CalcConfig::default(),
            base_source: ConfigSource::Defaults,
        }
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}
