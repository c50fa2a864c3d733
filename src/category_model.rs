//! Alternate grading path: per-unit category grades on a 0–10 scale combined
//! with fixed category weights. Unlike `calc::aggregate_unit`, a missing
//! category is renormalized away instead of counting as zero.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::calc::{self, FinalWeights, LetterGrade, NormalizedRecord};
use crate::records::lenient_number;
use crate::units::{self, Category};

pub const CATEGORY_SCALE_MAX: f64 = 10.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CategoryWeights {
    pub actividades: f64,
    pub asignaciones: f64,
    pub examen: f64,
    pub participaciones: f64,
}

pub const DEFAULT_CATEGORY_WEIGHTS: CategoryWeights = CategoryWeights {
    actividades: 0.25,
    asignaciones: 0.25,
    examen: 0.40,
    participaciones: 0.10,
};

/// Unit weights of this model. Numerically equal to
/// `calc::DEFAULT_FINAL_WEIGHTS` today but configured independently.
pub const DEFAULT_CATEGORY_UNIT_WEIGHTS: FinalWeights = FinalWeights {
    unit1: 0.30,
    unit2: 0.30,
    unit3: 0.40,
};

impl Default for CategoryWeights {
    fn default() -> Self {
        DEFAULT_CATEGORY_WEIGHTS
    }
}

impl CategoryWeights {
    pub fn is_valid(&self) -> bool {
        [
            self.actividades,
            self.asignaciones,
            self.examen,
            self.participaciones,
        ]
        .iter()
        .all(|w| w.is_finite() && *w >= 0.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryModelWeights {
    pub categories: CategoryWeights,
    pub units: FinalWeights,
}

impl Default for CategoryModelWeights {
    fn default() -> Self {
        Self {
            categories: DEFAULT_CATEGORY_WEIGHTS,
            units: DEFAULT_CATEGORY_UNIT_WEIGHTS,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnitCategoryGrades {
    pub actividades: Option<f64>,
    pub asignaciones: Option<f64>,
    pub examen: Option<f64>,
    pub participaciones: Option<f64>,
}

impl UnitCategoryGrades {
    /// Spanish keys as stored by the portal, English keys as used by the
    /// instructor panel. Non-numeric values are treated as missing.
    pub fn from_value(v: &Value) -> Self {
        let Some(obj) = v.as_object() else {
            return Self::default();
        };
        let pick = |keys: &[&str]| {
            keys.iter()
                .find_map(|k| obj.get(*k).and_then(lenient_number))
        };
        Self {
            actividades: pick(&["actividades", "classwork"]),
            asignaciones: pick(&["asignaciones", "assignments"]),
            examen: pick(&["examen", "exam"]),
            participaciones: pick(&["participaciones", "participacion", "participation"]),
        }
    }

    fn entries(&self, weights: &CategoryWeights) -> [(Option<f64>, f64); 4] {
        [
            (self.actividades, weights.actividades),
            (self.asignaciones, weights.asignaciones),
            (self.examen, weights.examen),
            (self.participaciones, weights.participaciones),
        ]
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryModelInput {
    pub unit1: UnitCategoryGrades,
    pub unit2: UnitCategoryGrades,
    pub project: Option<f64>,
}

impl CategoryModelInput {
    pub fn from_params(params: &Value) -> Self {
        let unit = |key: &str| {
            params
                .get(key)
                .map(UnitCategoryGrades::from_value)
                .unwrap_or_default()
        };
        let project = ["project", "proyecto", "unit3"]
            .iter()
            .find_map(|k| params.get(*k).filter(|v| !v.is_null()))
            .and_then(|v| match v {
                Value::Object(obj) => ["project", "proyecto"]
                    .iter()
                    .find_map(|k| obj.get(*k).and_then(lenient_number)),
                other => lenient_number(other),
            });
        Self {
            unit1: unit("unit1"),
            unit2: unit("unit2"),
            project,
        }
    }
}

fn clamp_grade(g: f64) -> f64 {
    if g.is_nan() {
        0.0
    } else {
        g.clamp(0.0, CATEGORY_SCALE_MAX)
    }
}

/// Weighted mean over the categories that are present. `None` when no
/// present category carries weight.
pub fn unit_grade(grades: &UnitCategoryGrades, weights: &CategoryWeights) -> Option<f64> {
    let mut sum = 0.0_f64;
    let mut denom = 0.0_f64;
    for (grade, weight) in grades.entries(weights) {
        let Some(g) = grade else {
            continue;
        };
        let w = if weight.is_finite() { weight.max(0.0) } else { 0.0 };
        sum += clamp_grade(g) * w;
        denom += w;
    }
    (denom > 0.0).then(|| sum / denom)
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryUnitResult {
    pub score: Option<f64>,
    pub percentage: Option<f64>,
    pub present_weight: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryModelResult {
    pub unit1: CategoryUnitResult,
    pub unit2: CategoryUnitResult,
    pub project: CategoryUnitResult,
    pub final_percentage: f64,
    pub out_of_five: f64,
    pub letter: LetterGrade,
    pub weights: CategoryModelWeights,
}

fn unit_result(grades: &UnitCategoryGrades, weights: &CategoryWeights) -> CategoryUnitResult {
    let score = unit_grade(grades, weights);
    let present_weight = grades
        .entries(weights)
        .iter()
        .filter(|(g, _)| g.is_some())
        .map(|&(_, w)| if w.is_finite() { w.max(0.0) } else { 0.0 })
        .sum();
    CategoryUnitResult {
        score,
        percentage: score.map(|s| s * 10.0),
        present_weight,
    }
}

pub fn evaluate(input: &CategoryModelInput, weights: &CategoryModelWeights) -> CategoryModelResult {
    let unit1 = unit_result(&input.unit1, &weights.categories);
    let unit2 = unit_result(&input.unit2, &weights.categories);
    let project_score = input.project.map(clamp_grade);
    let project = CategoryUnitResult {
        score: project_score,
        percentage: project_score.map(|s| s * 10.0),
        present_weight: if project_score.is_some() { 1.0 } else { 0.0 },
    };

    // Missing units count as zero here; only categories are renormalized.
    let final_percentage = calc::final_grade_with(
        &weights.units,
        unit1.percentage.unwrap_or(0.0),
        unit2.percentage.unwrap_or(0.0),
        project.percentage.unwrap_or(0.0),
    );

    CategoryModelResult {
        unit1,
        unit2,
        project,
        final_percentage,
        out_of_five: calc::to_out_of_five(final_percentage),
        letter: calc::letter_grade(final_percentage),
        weights: *weights,
    }
}

fn mean(values: &[f64]) -> Option<f64> {
    (!values.is_empty()).then(|| values.iter().sum::<f64>() / values.len() as f64)
}

/// Builds category-model input from normalized records. Each category is the
/// mean of its members' 0–10 scale points; empty categories stay absent.
pub fn group_records(records: &[NormalizedRecord]) -> CategoryModelInput {
    let mut slots: [[Vec<f64>; 4]; 2] = Default::default();
    let mut project: Vec<f64> = Vec::new();

    for r in records {
        let category = r
            .category_key
            .as_deref()
            .and_then(units::classify_category)
            .or_else(|| units::classify_category(&r.kind))
            .or_else(|| units::classify_category(&r.label));
        let Some(category) = category else {
            continue;
        };
        match (r.unit, category) {
            (Some(3), Category::Proyecto) => project.push(r.scale_points),
            (Some(u @ 1..=2), cat) => {
                let idx = match cat {
                    Category::Actividades => 0,
                    Category::Asignaciones => 1,
                    Category::Examen => 2,
                    Category::Participaciones => 3,
                    Category::Proyecto => continue,
                };
                slots[(u - 1) as usize][idx].push(r.scale_points);
            }
            _ => {}
        }
    }

    let unit = |s: &[Vec<f64>; 4]| UnitCategoryGrades {
        actividades: mean(&s[0]),
        asignaciones: mean(&s[1]),
        examen: mean(&s[2]),
        participaciones: mean(&s[3]),
    };
    CategoryModelInput {
        unit1: unit(&slots[0]),
        unit2: unit(&slots[1]),
        project: mean(&project),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::ActivityRecord;
    use serde_json::json;

    fn full(a: f64, s: f64, e: f64, p: f64) -> UnitCategoryGrades {
        UnitCategoryGrades {
            actividades: Some(a),
            asignaciones: Some(s),
            examen: Some(e),
            participaciones: Some(p),
        }
    }

    #[test]
    fn complete_unit_uses_fixed_weights() {
        let g = unit_grade(&full(8.0, 6.0, 10.0, 4.0), &DEFAULT_CATEGORY_WEIGHTS).expect("grade");
        // 8*.25 + 6*.25 + 10*.4 + 4*.1 = 7.9
        assert!((g - 7.9).abs() < 1e-9);
    }

    #[test]
    fn missing_categories_are_renormalized() {
        let grades = UnitCategoryGrades {
            examen: Some(9.0),
            participaciones: Some(4.0),
            ..UnitCategoryGrades::default()
        };
        let g = unit_grade(&grades, &DEFAULT_CATEGORY_WEIGHTS).expect("grade");
        // (9*.4 + 4*.1) / .5 = 8.0
        assert!((g - 8.0).abs() < 1e-9);
        assert_eq!(unit_grade(&UnitCategoryGrades::default(), &DEFAULT_CATEGORY_WEIGHTS), None);
    }

    #[test]
    fn grades_clamp_to_ten() {
        let grades = UnitCategoryGrades {
            examen: Some(14.0),
            ..UnitCategoryGrades::default()
        };
        assert_eq!(unit_grade(&grades, &DEFAULT_CATEGORY_WEIGHTS), Some(10.0));
    }

    #[test]
    fn evaluate_combines_units_and_project() {
        let input = CategoryModelInput {
            unit1: full(8.0, 8.0, 8.0, 8.0),
            unit2: full(8.0, 8.0, 8.0, 8.0),
            project: Some(10.0),
        };
        let r = evaluate(&input, &CategoryModelWeights::default());
        assert!((r.final_percentage - 88.0).abs() < 1e-9);
        assert_eq!(r.out_of_five, 4.4);
        assert_eq!(r.letter, LetterGrade::B);
        assert_eq!(r.project.percentage, Some(100.0));
    }

    #[test]
    fn missing_unit_counts_as_zero_in_final() {
        let input = CategoryModelInput {
            unit1: full(10.0, 10.0, 10.0, 10.0),
            ..CategoryModelInput::default()
        };
        let r = evaluate(&input, &CategoryModelWeights::default());
        assert!((r.final_percentage - 30.0).abs() < 1e-9);
        assert_eq!(r.unit2.score, None);
        assert_eq!(r.unit2.present_weight, 0.0);
    }

    #[test]
    fn params_accept_spanish_and_english_keys() {
        let params = json!({
            "unit1": { "actividades": "7", "exam": 9, "participation": null },
            "unit2": { "classwork": 6, "asignaciones": 5 },
            "unit3": { "project": 8.5 }
        });
        let input = CategoryModelInput::from_params(&params);
        assert_eq!(input.unit1.actividades, Some(7.0));
        assert_eq!(input.unit1.examen, Some(9.0));
        assert_eq!(input.unit1.participaciones, None);
        assert_eq!(input.unit2.actividades, Some(6.0));
        assert_eq!(input.unit2.asignaciones, Some(5.0));
        assert_eq!(input.project, Some(8.5));
    }

    #[test]
    fn null_project_key_falls_through_to_unit3() {
        let params = json!({ "project": null, "unit3": { "project": 8 } });
        assert_eq!(CategoryModelInput::from_params(&params).project, Some(8.0));

        let params = json!({ "proyecto": null, "unit3": null });
        assert_eq!(CategoryModelInput::from_params(&params).project, None);
    }

    #[test]
    fn group_records_buckets_by_key_and_unit() {
        let mk = |key: &str, unit: i64, points: f64| ActivityRecord {
            id: key.to_string(),
            label: key.to_string(),
            unit: Some(unit),
            category_key: Some(key.to_string()),
            raw_points: Some(points),
            raw_max: Some(10.0),
            weight: Some(10.0),
            ..ActivityRecord::default()
        };
        let records = calc::normalize(&[
            mk("u1-actividad-1", 1, 6.0),
            mk("u1-actividad-2", 1, 8.0),
            mk("u1-examen", 1, 9.0),
            mk("u2-participacion", 2, 10.0),
            mk("project-rubrica-1", 3, 7.0),
            mk("project-rubrica-2", 3, 9.0),
            mk("u2-proyecto", 2, 1.0),
        ]);
        let input = group_records(&records);
        assert_eq!(input.unit1.actividades, Some(7.0));
        assert_eq!(input.unit1.examen, Some(9.0));
        assert_eq!(input.unit1.asignaciones, None);
        assert_eq!(input.unit2.participaciones, Some(10.0));
        assert_eq!(input.unit2.actividades, None);
        assert_eq!(input.project, Some(8.0));
    }
}
