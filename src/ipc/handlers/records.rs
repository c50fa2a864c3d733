use rusqlite::Connection;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{db_conn, records_param, required_str};
use crate::ipc::types::{AppState, Request};
use crate::records::{self, ActivityRecord};

/// Connection plus the `(groupId, studentKey)` pair every records method
/// takes. Fails with `not_found` when the student is unknown.
fn student_scope<'a>(
    state: &'a AppState,
    req: &Request,
) -> Result<(&'a Connection, String, String), Value> {
    let conn = db_conn(state, req)?;
    let group_id = required_str(req, "groupId")?;
    let student_key = required_str(req, "studentKey")?;
    match db::student_exists(conn, &group_id, &student_key) {
        Ok(true) => Ok((conn, group_id, student_key)),
        Ok(false) => Err(err(&req.id, "not_found", "student not found", None)),
        Err(e) => Err(err(&req.id, "db_query_failed", e.to_string(), None)),
    }
}

fn handle_records_list(state: &mut AppState, req: &Request) -> Value {
    let (conn, group_id, student_key) = match student_scope(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    match db::records_list(conn, &group_id, &student_key) {
        Ok(rows) => ok(&req.id, json!({ "records": rows })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_records_upsert(state: &mut AppState, req: &Request) -> Value {
    let (conn, group_id, student_key) = match student_scope(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let Some(raw) = req.params.get("record").filter(|v| v.is_object()) else {
        return err(&req.id, "bad_params", "missing record", None);
    };
    let mut record = ActivityRecord::from_value(raw, 0);
    if !records::has_id(raw) {
        record.id = Uuid::new_v4().to_string();
    }
    match db::record_upsert(conn, &group_id, &student_key, &record) {
        Ok(()) => ok(&req.id, json!({ "recordId": record.id })),
        Err(e) => err(
            &req.id,
            "db_update_failed",
            e.to_string(),
            Some(json!({ "table": "activity_records" })),
        ),
    }
}

fn handle_records_replace(state: &mut AppState, req: &Request) -> Value {
    let (conn, group_id, student_key) = match student_scope(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let records = match records_param(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    match db::records_replace(conn, &group_id, &student_key, &records) {
        Ok(count) => ok(&req.id, json!({ "count": count })),
        Err(e) => err(
            &req.id,
            "db_tx_failed",
            e.to_string(),
            Some(json!({ "table": "activity_records" })),
        ),
    }
}

fn handle_records_delete(state: &mut AppState, req: &Request) -> Value {
    let (conn, group_id, student_key) = match student_scope(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let record_id = match required_str(req, "recordId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    match db::record_delete(conn, &group_id, &student_key, &record_id) {
        Ok(true) => ok(&req.id, json!({ "deleted": true })),
        Ok(false) => err(&req.id, "not_found", "record not found", None),
        Err(e) => err(
            &req.id,
            "db_delete_failed",
            e.to_string(),
            Some(json!({ "table": "activity_records" })),
        ),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    match req.method.as_str() {
        "records.list" => Some(handle_records_list(state, req)),
        "records.upsert" => Some(handle_records_upsert(state, req)),
        "records.replace" => Some(handle_records_replace(state, req)),
        "records.delete" => Some(handle_records_delete(state, req)),
        _ => None,
    }
}
