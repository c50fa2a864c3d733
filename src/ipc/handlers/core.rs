use crate::config;
use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use serde_json::json;
use std::path::PathBuf;

fn handle_health(state: &mut AppState, req: &Request) -> serde_json::Value {
    ok(
        &req.id,
        json!({
            "version": env!("CARGO_PKG_VERSION"),
            "workspacePath": state.workspace.as_ref().map(|p| p.to_string_lossy().to_string())
        }),
    )
}

fn handle_workspace_select(state: &mut AppState, req: &Request) -> serde_json::Value {
    let p = req
        .params
        .get("path")
        .and_then(|v| v.as_str())
        .map(PathBuf::from);
    let Some(path) = p else {
        return err(&req.id, "bad_params", "missing params.path", None);
    };

    match db::open_db(&path) {
        Ok(conn) => {
            // A bad config file never prevents the workspace from opening.
            let (base, source) = config::load_file(&path);
            let resolved = match config::resolve(&conn, base, source) {
                Ok(r) => r,
                Err(e) => {
                    tracing::warn!("ignoring stored config override: {:#}", e);
                    config::ResolvedConfig {
                        config: base,
                        source,
                    }
                }
            };
            tracing::info!(
                workspace = %path.display(),
                source = ?resolved.source,
                "workspace opened"
            );

            state.workspace = Some(path.clone());
            state.db = Some(conn);
            state.base_config = base;
            state.base_source = source;
            ok(
                &req.id,
                json!({
                    "workspacePath": path.to_string_lossy(),
                    "configSource": resolved.source,
                }),
            )
        }
        Err(e) => err(&req.id, "db_open_failed", format!("{e:?}"), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "health" => Some(handle_health(state, req)),
        "workspace.select" => Some(handle_workspace_select(state, req)),
        _ => None,
    }
}
