use serde_json::{json, Value};

use crate::calc;
use crate::category_model;
use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{db_conn, effective_config, required_str};
use crate::ipc::types::{AppState, Request};
use crate::records::ActivityRecord;

fn load_student_records(
    state: &AppState,
    req: &Request,
) -> Result<(String, Vec<ActivityRecord>), Value> {
    let conn = db_conn(state, req)?;
    let group_id = required_str(req, "groupId")?;
    let student_key = required_str(req, "studentKey")?;
    match db::student_exists(conn, &group_id, &student_key) {
        Ok(true) => {}
        Ok(false) => return Err(err(&req.id, "not_found", "student not found", None)),
        Err(e) => return Err(err(&req.id, "db_query_failed", e.to_string(), None)),
    }
    db::records_list(conn, &group_id, &student_key)
        .map(|rows| (student_key, rows))
        .map_err(|e| err(&req.id, "db_query_failed", e.to_string(), None))
}

fn handle_student_summary(state: &mut AppState, req: &Request) -> Value {
    let (student_key, records) = match load_student_records(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let cfg = effective_config(state);
    let summary = calc::summarize(&records, &cfg.config.final_weights);
    ok(
        &req.id,
        json!({
            "studentKey": student_key,
            "configSource": cfg.source,
            "summary": summary,
        }),
    )
}

fn handle_student_category_model(state: &mut AppState, req: &Request) -> Value {
    let (student_key, records) = match load_student_records(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let cfg = effective_config(state);
    let input = category_model::group_records(&calc::normalize(&records));
    let result = category_model::evaluate(&input, &cfg.config.category_model_weights());
    ok(
        &req.id,
        json!({
            "studentKey": student_key,
            "configSource": cfg.source,
            "input": input,
            "result": result,
        }),
    )
}

fn handle_group_overview(state: &mut AppState, req: &Request) -> Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let group_id = match required_str(req, "groupId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let students = match db::students_list(conn, &group_id) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let cfg = effective_config(state);

    let mut rows = Vec::with_capacity(students.len());
    for s in &students {
        let records = match db::records_list(conn, &group_id, &s.student_key) {
            Ok(v) => v,
            Err(e) => {
                return err(
                    &req.id,
                    "db_query_failed",
                    e.to_string(),
                    Some(json!({ "studentKey": s.student_key })),
                )
            }
        };
        let summary = calc::summarize(&records, &cfg.config.final_weights);
        let unit_pcts: Vec<f64> = summary.units.iter().map(|u| u.percentage).collect();
        rows.push(json!({
            "studentKey": s.student_key,
            "displayName": s.display_name,
            "recordCount": records.len(),
            "units": unit_pcts,
            "finalPercentage": summary.final_grade.percentage,
            "outOfTen": summary.final_grade.out_of_ten,
            "outOfFive": summary.final_grade.out_of_five,
            "letter": summary.final_grade.letter,
        }));
    }

    ok(
        &req.id,
        json!({
            "groupId": group_id,
            "configSource": cfg.source,
            "weights": cfg.config.final_weights,
            "students": rows,
        }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    match req.method.as_str() {
        "calc.studentSummary" => Some(handle_student_summary(state, req)),
        "calc.studentCategoryModel" => Some(handle_student_category_model(state, req)),
        "calc.groupOverview" => Some(handle_group_overview(state, req)),
        _ => None,
    }
}
