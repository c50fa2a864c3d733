use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};

use crate::config::{self, CalcConfig};
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{db_conn, effective_config};
use crate::ipc::types::{AppState, Request};

fn handle_config_get(state: &mut AppState, req: &Request) -> Value {
    let resolved = effective_config(state);
    ok(
        &req.id,
        json!({
            "config": resolved.config,
            "source": resolved.source,
            "base": state.base_config,
            "baseSource": state.base_source,
        }),
    )
}

/// Overlays the keys of `params[key]` onto the current group; keys the
/// request leaves out keep their current value.
fn patch_field<T: Serialize + DeserializeOwned>(
    req: &Request,
    key: &str,
    slot: &mut T,
) -> Result<(), Value> {
    let Some(raw) = req.params.get(key).filter(|v| !v.is_null()) else {
        return Ok(());
    };
    let bad = |msg: String| err(&req.id, "bad_params", format!("{}: {}", key, msg), None);
    let Some(patch) = raw.as_object() else {
        return Err(bad("expected an object".to_string()));
    };
    let mut merged = serde_json::to_value(&*slot).map_err(|e| bad(e.to_string()))?;
    if let Some(current) = merged.as_object_mut() {
        for (k, v) in patch {
            current.insert(k.clone(), v.clone());
        }
    }
    *slot = serde_json::from_value(merged).map_err(|e| bad(e.to_string()))?;
    Ok(())
}

fn handle_config_update(state: &mut AppState, req: &Request) -> Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let mut next: CalcConfig = effective_config(state).config;
    let patched = patch_field(req, "finalWeights", &mut next.final_weights)
        .and_then(|_| patch_field(req, "categoryWeights", &mut next.category_weights))
        .and_then(|_| patch_field(req, "categoryUnitWeights", &mut next.category_unit_weights));
    if let Err(e) = patched {
        return e;
    }
    if let Some(field) = next.invalid_field() {
        return err(
            &req.id,
            "bad_params",
            format!("{} must be finite and non-negative", field),
            Some(json!({ "field": field })),
        );
    }

    if let Err(e) = config::store_override(conn, &next) {
        return err(
            &req.id,
            "db_update_failed",
            e.to_string(),
            Some(json!({ "table": "settings" })),
        );
    }
    tracing::info!("calc config override stored");
    ok(
        &req.id,
        json!({ "config": next, "source": config::ConfigSource::Override }),
    )
}

fn handle_config_clear_override(state: &mut AppState, req: &Request) -> Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    match config::clear_override(conn) {
        Ok(cleared) => ok(
            &req.id,
            json!({
                "cleared": cleared,
                "config": state.base_config,
                "source": state.base_source,
            }),
        ),
        Err(e) => err(
            &req.id,
            "db_delete_failed",
            e.to_string(),
            Some(json!({ "table": "settings" })),
        ),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    match req.method.as_str() {
        "calc.config.get" => Some(handle_config_get(state, req)),
        "calc.config.update" => Some(handle_config_update(state, req)),
        "calc.config.clearOverride" => Some(handle_config_clear_override(state, req)),
        _ => None,
    }
}
