use rusqlite::Connection;
use serde_json::Value;

use crate::calc::{CalcError, FinalWeights};
use crate::config::{self, ResolvedConfig};
use crate::ipc::error::err;
use crate::ipc::types::{AppState, Request};
use crate::records::{self, ActivityRecord};

pub fn db_conn<'a>(state: &'a AppState, req: &Request) -> Result<&'a Connection, Value> {
    state
        .db
        .as_ref()
        .ok_or_else(|| err(&req.id, "no_workspace", "select a workspace first", None))
}

pub fn required_str(req: &Request, key: &str) -> Result<String, Value> {
    req.params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|v| v.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| err(&req.id, "bad_params", format!("missing {}", key), None))
}

pub fn required_number(req: &Request, key: &str) -> Result<f64, Value> {
    req.params
        .get(key)
        .and_then(records::lenient_number)
        .ok_or_else(|| err(&req.id, "bad_params", format!("missing {}", key), None))
}

pub fn optional_number(req: &Request, key: &str) -> Option<f64> {
    req.params.get(key).and_then(records::lenient_number)
}

pub fn records_param(req: &Request) -> Result<Vec<ActivityRecord>, Value> {
    records::parse_records(req.params.get("records")).map_err(|e| calc_error(req, e))
}

/// Explicit `weights` when given, otherwise `fallback`. Invalid weights are
/// a caller error.
pub fn weights_param(req: &Request, fallback: FinalWeights) -> Result<FinalWeights, Value> {
    let Some(raw) = req.params.get("weights").filter(|v| !v.is_null()) else {
        return Ok(fallback);
    };
    let weights: FinalWeights = serde_json::from_value(raw.clone())
        .map_err(|e| err(&req.id, "bad_params", format!("weights: {}", e), None))?;
    if !weights.is_valid() {
        return Err(err(
            &req.id,
            "bad_params",
            "weights must be finite, non-negative and not all zero",
            None,
        ));
    }
    Ok(weights)
}

pub fn calc_error(req: &Request, e: CalcError) -> Value {
    crate::ipc::error::calc_err(&req.id, e)
}

/// File config overlaid with the workspace override, when a workspace is open.
pub fn effective_config(state: &AppState) -> ResolvedConfig {
    let fallback = ResolvedConfig {
        config: state.base_config,
        source: state.base_source,
    };
    let Some(conn) = state.db.as_ref() else {
        return fallback;
    };
    match config::resolve(conn, state.base_config, state.base_source) {
        Ok(resolved) => resolved,
        Err(e) => {
            tracing::warn!("ignoring stored config override: {:#}", e);
            fallback
        }
    }
}
