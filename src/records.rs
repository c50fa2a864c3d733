use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::calc::CalcError;

/// One gradeable item for one learner, as it arrives from the document store
/// or an instructor form. Every numeric field is optional; the normalizer decides
/// the defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityRecord {
    pub id: String,
    pub label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_max: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_points: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub points: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weight: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub graded_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category_key: Option<String>,
}

const ID_KEYS: &[&str] = &["id", "identifier", "key"];
const LABEL_KEYS: &[&str] = &["label", "nombre", "title", "name"];
const UNIT_KEYS: &[&str] = &["unit", "unidad"];
const KIND_KEYS: &[&str] = &["kind", "tipo", "type"];
const RAW_MAX_KEYS: &[&str] = &["rawMax", "rawMaxPuntos"];
const RAW_POINTS_KEYS: &[&str] = &["rawPoints", "rawPuntos"];
const MAX_KEYS: &[&str] = &["max", "maxPuntos"];
const POINTS_KEYS: &[&str] = &["points", "puntos"];
const WEIGHT_KEYS: &[&str] = &["weight", "ponderacion"];
const DATE_KEYS: &[&str] = &["gradedDate", "gradedAt", "fecha"];
const CATEGORY_KEYS: &[&str] = &["categoryKey", "calItemKey"];

fn field<'a>(obj: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .find_map(|k| obj.get(*k).filter(|v| !v.is_null()))
}

/// Numbers and numeric strings; blanks, non-finite values and other JSON
/// types count as absent.
pub fn lenient_number(v: &Value) -> Option<f64> {
    let n = match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => {
            let t = s.trim();
            if t.is_empty() {
                None
            } else {
                t.parse::<f64>().ok()
            }
        }
        _ => None,
    }?;
    n.is_finite().then_some(n)
}

pub fn lenient_string(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => {
            let t = s.trim();
            (!t.is_empty()).then(|| t.to_string())
        }
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

pub fn lenient_integer(v: &Value) -> Option<i64> {
    let n = lenient_number(v)?;
    if n.fract() != 0.0 || n.abs() > (i64::MAX as f64) {
        return None;
    }
    Some(n as i64)
}

/// Accepts RFC 3339 strings, plain `YYYY-MM-DD` dates, epoch milliseconds and
/// `{seconds, nanoseconds}` timestamp objects.
pub fn parse_timestamp(v: &Value) -> Option<DateTime<Utc>> {
    match v {
        Value::String(s) => {
            let t = s.trim();
            if let Ok(dt) = DateTime::parse_from_rfc3339(t) {
                return Some(dt.with_timezone(&Utc));
            }
            let date = NaiveDate::parse_from_str(t, "%Y-%m-%d").ok()?;
            Some(Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0)?))
        }
        Value::Number(n) => {
            let ms = n.as_i64().or_else(|| n.as_f64().map(|f| f as i64))?;
            Utc.timestamp_millis_opt(ms).single()
        }
        Value::Object(obj) => {
            let secs = field(obj, &["seconds", "_seconds"]).and_then(lenient_integer)?;
            let nanos = field(obj, &["nanoseconds", "_nanoseconds"])
                .and_then(lenient_integer)
                .unwrap_or(0)
                .clamp(0, 999_999_999) as u32;
            Utc.timestamp_opt(secs, nanos).single()
        }
        _ => None,
    }
}

impl ActivityRecord {
    /// Builds a record from any JSON value. Never fails: missing or malformed
    /// fields are left empty and `index` supplies a positional id.
    pub fn from_value(v: &Value, index: usize) -> Self {
        let fallback_id = format!("item-{}", index);
        let Some(obj) = v.as_object() else {
            return Self {
                id: fallback_id,
                ..Self::default()
            };
        };

        Self {
            id: field(obj, ID_KEYS)
                .and_then(lenient_string)
                .unwrap_or(fallback_id),
            label: field(obj, LABEL_KEYS)
                .and_then(lenient_string)
                .unwrap_or_default(),
            unit: field(obj, UNIT_KEYS).and_then(lenient_integer),
            kind: field(obj, KIND_KEYS).and_then(lenient_string),
            raw_max: field(obj, RAW_MAX_KEYS).and_then(lenient_number),
            raw_points: field(obj, RAW_POINTS_KEYS).and_then(lenient_number),
            max: field(obj, MAX_KEYS).and_then(lenient_number),
            points: field(obj, POINTS_KEYS).and_then(lenient_number),
            weight: field(obj, WEIGHT_KEYS).and_then(lenient_number),
            graded_at: field(obj, DATE_KEYS).and_then(parse_timestamp),
            category_key: field(obj, CATEGORY_KEYS).and_then(lenient_string),
        }
    }
}

/// Whether the raw value carries an id of its own.
pub fn has_id(v: &Value) -> bool {
    v.as_object()
        .and_then(|obj| field(obj, ID_KEYS))
        .and_then(lenient_string)
        .is_some()
}

/// A missing or non-array `records` is a caller bug and is reported; the
/// elements themselves are always accepted.
pub fn parse_records(raw: Option<&Value>) -> Result<Vec<ActivityRecord>, CalcError> {
    let Some(raw) = raw.filter(|v| !v.is_null()) else {
        return Err(CalcError::new("bad_params", "missing records"));
    };
    let Some(items) = raw.as_array() else {
        return Err(CalcError::new("bad_params", "records must be an array"));
    };
    Ok(items
        .iter()
        .enumerate()
        .map(|(i, v)| ActivityRecord::from_value(v, i))
        .collect())
}
