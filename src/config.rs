use anyhow::Context;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::calc::{FinalWeights, DEFAULT_FINAL_WEIGHTS};
use crate::category_model::{
    CategoryModelWeights, CategoryWeights, DEFAULT_CATEGORY_UNIT_WEIGHTS, DEFAULT_CATEGORY_WEIGHTS,
};
use crate::db;

pub const CONFIG_FILE_NAME: &str = "gradesd.toml";
pub const OVERRIDE_SETTINGS_KEY: &str = "calc.config.override";

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CalcConfig {
    pub final_weights: FinalWeights,
    pub category_weights: CategoryWeights,
    pub category_unit_weights: FinalWeights,
}

impl Default for CalcConfig {
    fn default() -> Self {
        Self {
            final_weights: DEFAULT_FINAL_WEIGHTS,
            category_weights: DEFAULT_CATEGORY_WEIGHTS,
            category_unit_weights: DEFAULT_CATEGORY_UNIT_WEIGHTS,
        }
    }
}

impl CalcConfig {
    pub fn category_model_weights(&self) -> CategoryModelWeights {
        CategoryModelWeights {
            categories: self.category_weights,
            units: self.category_unit_weights,
        }
    }

    /// Name of the first invalid weight group, if any.
    pub fn invalid_field(&self) -> Option<&'static str> {
        if !self.final_weights.is_valid() {
            return Some("finalWeights");
        }
        if !self.category_weights.is_valid() {
            return Some("categoryWeights");
        }
        if !self.category_unit_weights.is_valid() {
            return Some("categoryUnitWeights");
        }
        None
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ConfigSource {
    Defaults,
    File,
    Override,
}

/// Reads `gradesd.toml` from the workspace. A missing file means defaults;
/// an unreadable or invalid one is logged and ignored.
pub fn load_file(workspace: &Path) -> (CalcConfig, ConfigSource) {
    let path = workspace.join(CONFIG_FILE_NAME);
    if !path.exists() {
        tracing::info!("config file {} not found, using defaults", path.display());
        return (CalcConfig::default(), ConfigSource::Defaults);
    }
    let parsed = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read {}", path.display()))
        .and_then(|text| {
            toml::from_str::<CalcConfig>(&text)
                .with_context(|| format!("failed to parse {}", path.display()))
        });
    match parsed {
        Ok(cfg) => match cfg.invalid_field() {
            None => {
                tracing::info!("config loaded from {}", path.display());
                (cfg, ConfigSource::File)
            }
            Some(field) => {
                tracing::warn!("{} has invalid {}, using defaults", path.display(), field);
                (CalcConfig::default(), ConfigSource::Defaults)
            }
        },
        Err(e) => {
            tracing::warn!("{:#}, using defaults", e);
            (CalcConfig::default(), ConfigSource::Defaults)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedConfig {
    pub config: CalcConfig,
    pub source: ConfigSource,
}

/// Workspace override stored in the settings table, if any.
pub fn load_override(conn: &Connection) -> anyhow::Result<Option<CalcConfig>> {
    let Some(raw) = db::settings_get_json(conn, OVERRIDE_SETTINGS_KEY)? else {
        return Ok(None);
    };
    let cfg: CalcConfig =
        serde_json::from_value(raw).context("stored calc config override is malformed")?;
    Ok(Some(cfg))
}

pub fn resolve(
    conn: &Connection,
    base: CalcConfig,
    base_source: ConfigSource,
) -> anyhow::Result<ResolvedConfig> {
    Ok(match load_override(conn)? {
        Some(config) => ResolvedConfig {
            config,
            source: ConfigSource::Override,
        },
        None => ResolvedConfig {
            config: base,
            source: base_source,
        },
    })
}

pub fn store_override(conn: &Connection, cfg: &CalcConfig) -> anyhow::Result<()> {
    db::settings_set_json(conn, OVERRIDE_SETTINGS_KEY, &serde_json::to_value(cfg)?)
}

pub fn clear_override(conn: &Connection) -> anyhow::Result<bool> {
    db::settings_delete(conn, OVERRIDE_SETTINGS_KEY)
}
