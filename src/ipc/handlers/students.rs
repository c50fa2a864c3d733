use serde_json::{json, Value};

use crate::db::{self, StudentRow};
use crate::identity::{self, StudentProfile};
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{db_conn, required_str};
use crate::ipc::types::{AppState, Request};

fn handle_students_list(state: &mut AppState, req: &Request) -> Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let group_id = match required_str(req, "groupId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    match db::students_list(conn, &group_id) {
        Ok(students) => ok(&req.id, json!({ "students": students })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_students_upsert(state: &mut AppState, req: &Request) -> Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let group_id = match required_str(req, "groupId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let profile: StudentProfile = match req.params.get("profile") {
        Some(v) if v.is_object() => match serde_json::from_value(v.clone()) {
            Ok(p) => p,
            Err(e) => return err(&req.id, "bad_params", format!("profile: {}", e), None),
        },
        _ => return err(&req.id, "bad_params", "missing profile", None),
    };

    let explicit_key = required_str(req, "studentKey").ok();
    let Some(student_key) = explicit_key.or_else(|| identity::primary_key(&profile)) else {
        return err(
            &req.id,
            "bad_params",
            "profile needs an email, id or uid",
            None,
        );
    };

    let row = StudentRow {
        group_id,
        student_key: student_key.clone(),
        display_name: profile.name.clone(),
        email: profile.email_lower(),
        uid: profile.uid.clone(),
        matricula: profile.roster_id().map(str::to_string),
        record_count: None,
    };
    match db::student_upsert(conn, &row) {
        Ok(created) => ok(
            &req.id,
            json!({
                "studentKey": student_key,
                "created": created,
                "candidateKeys": identity::candidate_keys(&profile),
            }),
        ),
        Err(e) => err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "students" })),
        ),
    }
}

fn handle_students_delete(state: &mut AppState, req: &Request) -> Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let group_id = match required_str(req, "groupId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let student_key = match required_str(req, "studentKey") {
        Ok(v) => v,
        Err(e) => return e,
    };
    match db::student_delete(conn, &group_id, &student_key) {
        Ok(Some(removed)) => ok(&req.id, json!({ "deletedRecords": removed })),
        Ok(None) => err(&req.id, "not_found", "student not found", None),
        Err(e) => err(
            &req.id,
            "db_delete_failed",
            e.to_string(),
            Some(json!({ "table": "students" })),
        ),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    match req.method.as_str() {
        "students.list" => Some(handle_students_list(state, req)),
        "students.upsert" => Some(handle_students_upsert(state, req)),
        "students.delete" => Some(handle_students_delete(state, req)),
        _ => None,
    }
}
