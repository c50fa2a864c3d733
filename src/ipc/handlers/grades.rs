use serde_json::{json, Value};
use uuid::Uuid;

use crate::calc;
use crate::capture::{self, CaptureInput};
use crate::category_model::{self, CategoryModelInput, CategoryModelWeights, CategoryWeights};
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{
    effective_config, optional_number, records_param, required_number, weights_param,
};
use crate::ipc::types::{AppState, Request};
use crate::records::{lenient_integer, lenient_string, ActivityRecord};
use crate::units;

fn to_result<T: serde::Serialize>(req: &Request, value: &T) -> Value {
    match serde_json::to_value(value) {
        Ok(v) => ok(&req.id, v),
        Err(e) => err(&req.id, "serialize_failed", e.to_string(), None),
    }
}

fn handle_normalize(req: &Request) -> Value {
    let records = match records_param(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let normalized = calc::normalize(&records);
    ok(&req.id, json!({ "records": normalized }))
}

fn handle_unit_score(req: &Request) -> Value {
    let records = match records_param(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let normalized = calc::normalize(&records);
    let score = match req.params.get("unit").filter(|v| !v.is_null()) {
        None => calc::aggregate_unit(&normalized),
        Some(raw) => match lenient_integer(raw) {
            Some(unit) => calc::unit_score(&normalized, unit),
            None => return err(&req.id, "bad_params", "unit must be an integer", None),
        },
    };
    to_result(req, &score)
}

fn handle_global_summary(req: &Request) -> Value {
    let records = match records_param(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    to_result(req, &calc::global_summary(&calc::normalize(&records)))
}

fn handle_final_grade(state: &AppState, req: &Request) -> Value {
    let weights = match weights_param(req, effective_config(state).config.final_weights) {
        Ok(w) => w,
        Err(e) => return e,
    };
    let unit = |key: &str| optional_number(req, key).unwrap_or(0.0);
    let pct = calc::final_grade_with(&weights, unit("unit1"), unit("unit2"), unit("unit3"));
    let view = calc::final_grade_view(pct);
    ok(
        &req.id,
        json!({
            "percentage": view.percentage,
            "outOfTen": view.out_of_ten,
            "outOfFive": view.out_of_five,
            "letter": view.letter,
            "weights": weights,
        }),
    )
}

fn handle_convert(req: &Request) -> Value {
    let pct = match required_number(req, "percentage") {
        Ok(v) => v,
        Err(e) => return e,
    };
    to_result(req, &calc::final_grade_view(pct))
}

fn handle_summary(state: &AppState, req: &Request) -> Value {
    let records = match records_param(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let weights = match weights_param(req, effective_config(state).config.final_weights) {
        Ok(w) => w,
        Err(e) => return e,
    };
    to_result(req, &calc::summarize(&records, &weights))
}

/// `weights: {categories?, units?}`; each part falls back independently.
fn category_weights_param(
    req: &Request,
    fallback: CategoryModelWeights,
) -> Result<CategoryModelWeights, Value> {
    let Some(raw) = req.params.get("weights").filter(|v| !v.is_null()) else {
        return Ok(fallback);
    };
    let bad = |m: String| err(&req.id, "bad_params", m, None);
    let mut weights = fallback;
    if let Some(c) = raw.get("categories").filter(|v| !v.is_null()) {
        let parsed: CategoryWeights = serde_json::from_value(c.clone())
            .map_err(|e| bad(format!("weights.categories: {}", e)))?;
        if !parsed.is_valid() {
            return Err(bad("weights.categories must be finite and non-negative".into()));
        }
        weights.categories = parsed;
    }
    if let Some(u) = raw.get("units").filter(|v| !v.is_null()) {
        let parsed: calc::FinalWeights = serde_json::from_value(u.clone())
            .map_err(|e| bad(format!("weights.units: {}", e)))?;
        if !parsed.is_valid() {
            return Err(bad("weights.units must be finite and non-negative".into()));
        }
        weights.units = parsed;
    }
    Ok(weights)
}

fn handle_category_model(state: &AppState, req: &Request) -> Value {
    let fallback = effective_config(state).config.category_model_weights();
    let weights = match category_weights_param(req, fallback) {
        Ok(w) => w,
        Err(e) => return e,
    };
    let input = CategoryModelInput::from_params(&req.params);
    let result = category_model::evaluate(&input, &weights);
    ok(&req.id, json!({ "input": input, "result": result }))
}

fn handle_infer_unit(req: &Request) -> Value {
    let label = req
        .params
        .get("label")
        .and_then(lenient_string)
        .unwrap_or_default();
    let explicit = req.params.get("unit").and_then(lenient_integer);
    let unit = units::resolve_unit(explicit, &label);
    ok(
        &req.id,
        json!({
            "unit": unit,
            "kind": units::infer_kind(&label, unit),
            "category": units::classify_category(&label),
            "graded": units::is_graded_unit(unit),
        }),
    )
}

fn handle_capture(req: &Request) -> Value {
    let raw_value = match required_number(req, "rawValue") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let p = &req.params;
    let label = p.get("label").and_then(lenient_string).unwrap_or_default();
    let input = CaptureInput {
        id: p
            .get("id")
            .and_then(lenient_string)
            .unwrap_or_else(|| Uuid::new_v4().to_string()),
        unit: units::resolve_unit(p.get("unit").and_then(lenient_integer), &label),
        label,
        weight: optional_number(req, "weight").unwrap_or(0.0),
        raw_value,
        input_max: optional_number(req, "inputMax"),
        scale: optional_number(req, "scale"),
        project: p.get("project").and_then(|v| v.as_bool()).unwrap_or(false),
        category_key: p.get("categoryKey").and_then(lenient_string),
    };
    match capture::capture_record(&input) {
        Some(record) => ok(&req.id, json!({ "record": record })),
        None => err(&req.id, "bad_params", "rawValue must be a finite number", None),
    }
}

fn handle_input_value(req: &Request) -> Value {
    let Some(raw) = req.params.get("record").filter(|v| v.is_object()) else {
        return err(&req.id, "bad_params", "missing record", None);
    };
    let record = ActivityRecord::from_value(raw, 0);
    let value = capture::input_value(
        &record,
        optional_number(req, "inputMax"),
        optional_number(req, "scale"),
    );
    ok(&req.id, json!({ "value": value }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    match req.method.as_str() {
        "grades.normalize" => Some(handle_normalize(req)),
        "grades.unitScore" => Some(handle_unit_score(req)),
        "grades.globalSummary" => Some(handle_global_summary(req)),
        "grades.finalGrade" => Some(handle_final_grade(state, req)),
        "grades.convert" => Some(handle_convert(req)),
        "grades.summary" => Some(handle_summary(state, req)),
        "grades.categoryModel" => Some(handle_category_model(state, req)),
        "grades.inferUnit" => Some(handle_infer_unit(req)),
        "grades.capture" => Some(handle_capture(req)),
        "grades.inputValue" => Some(handle_input_value(req)),
        _ => None,
    }
}
