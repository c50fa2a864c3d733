//! Label classification: which unit an activity belongs to, what kind of
//! activity it is, and which category slot it feeds in the category model.

use regex::Regex;
use serde::Serialize;
use std::sync::OnceLock;

/// Units that carry a score of their own. Anything else is "unassigned".
pub const GRADED_UNITS: [i64; 3] = [1, 2, 3];

pub fn is_graded_unit(unit: Option<i64>) -> bool {
    unit.map(|u| GRADED_UNITS.contains(&u)).unwrap_or(false)
}

fn unit_patterns() -> &'static [Regex; 3] {
    static PATTERNS: OnceLock<[Regex; 3]> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            Regex::new(r"(?i)unidad\s*([1-6])\b").expect("unidad pattern"),
            Regex::new(r"(?i)\bu([1-6])\b").expect("uN pattern"),
            Regex::new(r"^\s*([1-6])(?:\D|$)").expect("leading digit pattern"),
        ]
    })
}

/// Unit marker in a free-text label: "Unidad 2", "U3 - Foro", "1.4 Cuestionario".
pub fn infer_unit(label: &str) -> Option<i64> {
    unit_patterns().iter().find_map(|re| {
        re.captures(label)
            .and_then(|c| c.get(1))
            .and_then(|m| m.as_str().parse::<i64>().ok())
    })
}

pub fn resolve_unit(explicit: Option<i64>, label: &str) -> Option<i64> {
    explicit.or_else(|| infer_unit(label))
}

/// Lowercase and strip the Spanish diacritics the portal labels use.
pub fn fold(text: &str) -> String {
    text.to_lowercase()
        .chars()
        .map(|c| match c {
            'á' | 'à' | 'ä' => 'a',
            'é' | 'è' | 'ë' => 'e',
            'í' | 'ì' | 'ï' => 'i',
            'ó' | 'ò' | 'ö' => 'o',
            'ú' | 'ù' | 'ü' => 'u',
            other => other,
        })
        .collect()
}

pub fn infer_kind(label: &str, unit: Option<i64>) -> String {
    let lower = fold(label);
    let tagged = [
        ("proyecto", "Proyecto final"),
        ("examen", "Examen"),
        ("participacion", "Participación"),
        ("foro", "Foro"),
        ("taller", "Taller"),
        ("rubrica", "Rúbrica"),
    ];
    if let Some((_, kind)) = tagged.iter().find(|(needle, _)| lower.contains(needle)) {
        return kind.to_string();
    }
    match unit {
        Some(u) => format!("Unidad {}", u),
        None => "Actividad".to_string(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Category {
    Actividades,
    Asignaciones,
    Examen,
    Participaciones,
    Proyecto,
}

/// Category slot for a key such as `u1-examen` or `project-rubrica-2`.
/// First match wins, project before the unit categories.
pub fn classify_category(text: &str) -> Option<Category> {
    let lower = fold(text);
    let table: [(&[&str], Category); 5] = [
        (&["project", "proyecto"], Category::Proyecto),
        (&["actividad", "classwork", "activity"], Category::Actividades),
        (&["asignacion", "assignment", "tarea"], Category::Asignaciones),
        (&["exam"], Category::Examen),
        (&["participacion", "participation"], Category::Participaciones),
    ];
    table
        .iter()
        .find(|(needles, _)| needles.iter().any(|n| lower.contains(n)))
        .map(|(_, cat)| *cat)
}
