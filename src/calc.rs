use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::records::ActivityRecord;
use crate::units;

/// Maximum used when a record carries neither a raw nor a stored maximum.
pub const DEFAULT_MAX_POINTS: f64 = 10.0;
/// Fixed 0–10 scale every record is re-expressed on.
pub const SCALE_MAX: f64 = 10.0;

#[derive(Debug, Clone, Serialize)]
pub struct CalcError {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl CalcError {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }
}

/// Half-up rounding at `places` decimals: `Int(10^p * x + 0.5) / 10^p`.
/// Non-finite input rounds to 0.
pub fn round_half_up(x: f64, places: u32) -> f64 {
    if !x.is_finite() {
        return 0.0;
    }
    let factor = 10_f64.powi(places as i32);
    ((factor * x) + 0.5).floor() / factor
}

fn clamp_or_zero(x: f64, lo: f64, hi: f64) -> f64 {
    if x.is_nan() {
        0.0
    } else {
        x.clamp(lo, hi)
    }
}

pub fn clamp_percent(x: f64) -> f64 {
    clamp_or_zero(x, 0.0, 100.0)
}

/// Two-decimal display form used by tables and KPI tiles.
pub fn format_points(x: f64) -> String {
    format!("{:.2}", round_half_up(x, 2))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedRecord {
    pub id: String,
    pub label: String,
    pub unit: Option<i64>,
    pub kind: String,
    pub weight: f64,
    pub graded_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category_key: Option<String>,
    pub raw_max: Option<f64>,
    pub raw_points: Option<f64>,
    pub effective_max: f64,
    pub ratio: f64,
    pub display_max: f64,
    pub display_points: f64,
    /// `display_points / display_max` at two decimals, e.g. `"8.50 / 10.00"`.
    pub display: String,
    pub scale_max: f64,
    pub scale_points: f64,
    pub contribution: f64,
    pub is_graded: bool,
}

fn effective_max(record: &ActivityRecord) -> f64 {
    let finite = |v: &f64| v.is_finite();
    match record.raw_max.filter(|v| finite(v) && *v != 0.0) {
        Some(v) => v,
        None => record.max.filter(finite).unwrap_or(DEFAULT_MAX_POINTS),
    }
}

fn effective_weight(record: &ActivityRecord) -> f64 {
    clamp_percent(record.weight.filter(|v| v.is_finite()).unwrap_or(0.0))
}

pub fn normalize_one(record: &ActivityRecord) -> NormalizedRecord {
    let max = effective_max(record);
    let points = record
        .raw_points
        .filter(|v| v.is_finite())
        .or(record.points.filter(|v| v.is_finite()))
        .unwrap_or(0.0);

    let ratio = if max > 0.0 {
        clamp_or_zero(points.clamp(0.0, max) / max, 0.0, 1.0)
    } else {
        0.0
    };

    let unit = units::resolve_unit(record.unit, &record.label);
    let kind = record
        .kind
        .clone()
        .filter(|k| !k.trim().is_empty())
        .unwrap_or_else(|| units::infer_kind(&record.label, unit));
    let weight = effective_weight(record);

    NormalizedRecord {
        id: record.id.clone(),
        label: record.label.clone(),
        unit,
        kind,
        weight,
        graded_at: record.graded_at,
        category_key: record.category_key.clone(),
        raw_max: record.raw_max,
        raw_points: record.raw_points,
        effective_max: max,
        ratio,
        display_max: max,
        display_points: ratio * max,
        display: format!("{} / {}", format_points(ratio * max), format_points(max)),
        scale_max: SCALE_MAX,
        scale_points: round_half_up(ratio * SCALE_MAX, 3),
        contribution: ratio * weight,
        is_graded: ratio > 0.0,
    }
}

pub fn normalize(records: &[ActivityRecord]) -> Vec<NormalizedRecord> {
    records.iter().map(normalize_one).collect()
}

/// Dated records first in ascending order, undated after; ties keep input order.
pub fn order_chronologically(records: &mut [NormalizedRecord]) {
    records.sort_by_key(|r| (r.graded_at.is_none(), r.graded_at));
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnitScore {
    pub percentage: f64,
    pub total_weight: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalSummary {
    pub percentage: f64,
    pub weight_sum: f64,
}

fn weighted_totals<'a, I>(records: I) -> (f64, f64)
where
    I: IntoIterator<Item = &'a NormalizedRecord>,
{
    let mut sum = 0.0_f64;
    let mut weight = 0.0_f64;
    for r in records {
        sum += r.ratio * r.weight;
        weight += r.weight;
    }
    (clamp_percent(sum), clamp_percent(weight))
}

/// Capping model: weights are percentage points and are never divided out,
/// so a unit whose weights sum below 100 scores below 100.
pub fn aggregate_unit<'a, I>(records: I) -> UnitScore
where
    I: IntoIterator<Item = &'a NormalizedRecord>,
{
    let (percentage, total_weight) = weighted_totals(records);
    UnitScore {
        percentage,
        total_weight,
    }
}

pub fn global_summary<'a, I>(records: I) -> GlobalSummary
where
    I: IntoIterator<Item = &'a NormalizedRecord>,
{
    let (percentage, weight_sum) = weighted_totals(records);
    GlobalSummary {
        percentage,
        weight_sum,
    }
}

#[derive(Debug, Default)]
pub struct UnitBuckets<'a> {
    pub units: [Vec<&'a NormalizedRecord>; 3],
    pub unassigned: Vec<&'a NormalizedRecord>,
}

impl<'a> UnitBuckets<'a> {
    pub fn unit(&self, unit: i64) -> &[&'a NormalizedRecord] {
        match unit {
            1..=3 => &self.units[(unit - 1) as usize],
            _ => &[],
        }
    }
}

pub fn bucket_by_unit(records: &[NormalizedRecord]) -> UnitBuckets<'_> {
    let mut buckets = UnitBuckets::default();
    for r in records {
        match r.unit {
            Some(u @ 1..=3) => buckets.units[(u - 1) as usize].push(r),
            _ => buckets.unassigned.push(r),
        }
    }
    buckets
}

pub fn unit_score(records: &[NormalizedRecord], unit: i64) -> UnitScore {
    aggregate_unit(bucket_by_unit(records).unit(unit).iter().copied())
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FinalWeights {
    pub unit1: f64,
    pub unit2: f64,
    pub unit3: f64,
}

/// Unit 1 and 2 at 30% each, unit 3 (the project unit) at 40%.
pub const DEFAULT_FINAL_WEIGHTS: FinalWeights = FinalWeights {
    unit1: 0.30,
    unit2: 0.30,
    unit3: 0.40,
};

impl Default for FinalWeights {
    fn default() -> Self {
        DEFAULT_FINAL_WEIGHTS
    }
}

impl FinalWeights {
    pub fn is_valid(&self) -> bool {
        let parts = [self.unit1, self.unit2, self.unit3];
        parts.iter().all(|w| w.is_finite() && *w >= 0.0) && parts.iter().sum::<f64>() > 0.0
    }
}

pub fn final_grade_with(weights: &FinalWeights, unit1: f64, unit2: f64, unit3: f64) -> f64 {
    clamp_percent(unit1 * weights.unit1 + unit2 * weights.unit2 + unit3 * weights.unit3)
}

pub fn final_grade(unit1: f64, unit2: f64, unit3: f64) -> f64 {
    final_grade_with(&DEFAULT_FINAL_WEIGHTS, unit1, unit2, unit3)
}

pub fn to_out_of_five(percentage: f64) -> f64 {
    round_half_up(percentage * 0.05, 1)
}

pub fn to_out_of_ten(percentage: f64) -> f64 {
    round_half_up(percentage / 10.0, 2)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LetterGrade {
    A,
    B,
    C,
    D,
    F,
}

/// Lower bounds are inclusive: exactly 90 is an A.
pub fn letter_grade(percentage: f64) -> LetterGrade {
    match percentage {
        p if p >= 90.0 => LetterGrade::A,
        p if p >= 80.0 => LetterGrade::B,
        p if p >= 70.0 => LetterGrade::C,
        p if p >= 60.0 => LetterGrade::D,
        _ => LetterGrade::F,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalGradeView {
    pub percentage: f64,
    pub out_of_ten: f64,
    pub out_of_five: f64,
    pub letter: LetterGrade,
}

pub fn final_grade_view(percentage: f64) -> FinalGradeView {
    let percentage = clamp_percent(percentage);
    FinalGradeView {
        percentage,
        out_of_ten: to_out_of_ten(percentage),
        out_of_five: to_out_of_five(percentage),
        letter: letter_grade(percentage),
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnitBreakdown {
    pub unit: i64,
    pub percentage: f64,
    pub total_weight: f64,
    pub record_count: usize,
    pub graded_count: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentSummary {
    pub records: Vec<NormalizedRecord>,
    pub units: Vec<UnitBreakdown>,
    pub unassigned_count: usize,
    pub global: GlobalSummary,
    #[serde(rename = "final")]
    pub final_grade: FinalGradeView,
    pub weights: FinalWeights,
    pub input_hash: String,
}

/// SHA-256 over the canonical JSON of the input records. Callers may key a
/// cache of derived output on it; the engine itself never caches.
pub fn input_hash(records: &[ActivityRecord]) -> String {
    let bytes = serde_json::to_vec(records).unwrap_or_default();
    Sha256::digest(&bytes)
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}

pub fn summarize(records: &[ActivityRecord], weights: &FinalWeights) -> StudentSummary {
    let mut normalized = normalize(records);
    order_chronologically(&mut normalized);

    let buckets = bucket_by_unit(&normalized);
    let units: Vec<UnitBreakdown> = units::GRADED_UNITS
        .iter()
        .map(|&unit| {
            let members = buckets.unit(unit);
            let score = aggregate_unit(members.iter().copied());
            UnitBreakdown {
                unit,
                percentage: score.percentage,
                total_weight: score.total_weight,
                record_count: members.len(),
                graded_count: members.iter().filter(|r| r.is_graded).count(),
            }
        })
        .collect();
    let unassigned_count = buckets.unassigned.len();
    let global = global_summary(&normalized);

    let final_pct = final_grade_with(
        weights,
        units[0].percentage,
        units[1].percentage,
        units[2].percentage,
    );

    StudentSummary {
        records: normalized,
        units,
        unassigned_count,
        global,
        final_grade: final_grade_view(final_pct),
        weights: *weights,
        input_hash: input_hash(records),
    }
}
