use crate::calc::round_half_up;
use crate::records::ActivityRecord;
use crate::units;

pub const DEFAULT_INPUT_SCALE: f64 = 10.0;

/// A grade as typed into the instructor's entry form.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CaptureInput {
    pub id: String,
    pub label: String,
    pub unit: Option<i64>,
    pub weight: f64,
    pub raw_value: f64,
    pub input_max: Option<f64>,
    pub scale: Option<f64>,
    pub project: bool,
    pub category_key: Option<String>,
}

/// Zero, missing and non-finite values all fall back, like a blank form field.
fn or_default(v: Option<f64>, default: f64) -> f64 {
    v.filter(|x| x.is_finite() && *x != 0.0).unwrap_or(default)
}

/// Converts a typed value into the stored record shape: points on the fixed
/// scale plus the clamped raw entry. Returns `None` for a non-finite entry.
pub fn capture_record(input: &CaptureInput) -> Option<ActivityRecord> {
    if !input.raw_value.is_finite() {
        return None;
    }
    let input_max = or_default(input.input_max, DEFAULT_INPUT_SCALE);
    let scale = or_default(input.scale, DEFAULT_INPUT_SCALE);

    let clamped = if input_max > 0.0 {
        input.raw_value.clamp(0.0, input_max)
    } else {
        0.0
    };
    let ratio = if input_max > 0.0 {
        clamped / input_max
    } else {
        0.0
    };

    let unit = if input.project { Some(3) } else { input.unit };
    let kind = if input.project {
        "Proyecto final".to_string()
    } else {
        units::infer_kind(&input.label, unit)
    };

    Some(ActivityRecord {
        id: input.id.clone(),
        label: input.label.clone(),
        unit,
        kind: Some(kind),
        raw_max: Some(input_max),
        raw_points: Some(round_half_up(clamped, 2)),
        max: Some(scale),
        points: Some(round_half_up(ratio * scale, 3)),
        weight: Some(input.weight),
        graded_at: None,
        category_key: input.category_key.clone(),
    })
}

/// Value to put back into an entry field for a stored record: the raw entry
/// when kept, otherwise the scale points re-expressed on `input_max`.
pub fn input_value(record: &ActivityRecord, input_max: Option<f64>, scale: Option<f64>) -> Option<f64> {
    let scale = or_default(scale, DEFAULT_INPUT_SCALE);
    let input_max = or_default(input_max, scale);

    let raw = match (record.raw_points, record.points) {
        (Some(raw), _) => raw,
        (None, Some(points)) => {
            let ratio = if scale > 0.0 {
                points.clamp(0.0, scale) / scale
            } else {
                0.0
            };
            ratio * input_max
        }
        (None, None) => return None,
    };
    raw.is_finite().then(|| round_half_up(raw, 2))
}
