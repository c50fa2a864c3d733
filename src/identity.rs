use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::records;

const MAX_IDENTIFIER_LEN: usize = 120;

/// Lowercase slug of `[a-z0-9]` runs joined by single dashes, at most 120
/// characters. `None` when nothing usable is left.
pub fn sanitize_identifier(value: &str) -> Option<String> {
    let mut out = String::with_capacity(value.len());
    let mut pending_dash = false;
    for c in value.trim().to_lowercase().chars() {
        if c.is_ascii_lowercase() || c.is_ascii_digit() {
            if pending_dash && !out.is_empty() {
                out.push('-');
            }
            pending_dash = false;
            out.push(c);
        } else {
            pending_dash = true;
        }
    }
    if out.is_empty() {
        return None;
    }
    out.truncate(MAX_IDENTIFIER_LEN);
    Some(out)
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct StudentProfile {
    #[serde(deserialize_with = "lenient_opt_string")]
    pub email: Option<String>,
    #[serde(deserialize_with = "lenient_opt_string")]
    pub id: Option<String>,
    #[serde(deserialize_with = "lenient_opt_string")]
    pub student_id: Option<String>,
    #[serde(deserialize_with = "lenient_opt_string")]
    pub matricula: Option<String>,
    #[serde(deserialize_with = "lenient_opt_string")]
    pub uid: Option<String>,
    #[serde(
        alias = "displayName",
        alias = "nombre",
        deserialize_with = "lenient_opt_string"
    )]
    pub name: Option<String>,
}

// Roster exports often carry ids as JSON numbers.
fn lenient_opt_string<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
    Ok(records::lenient_string(&Value::deserialize(d)?))
}

fn non_blank(v: &Option<String>) -> Option<&str> {
    v.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

impl StudentProfile {
    /// Roster id: `id`, then `studentId`, then `matricula`.
    pub fn roster_id(&self) -> Option<&str> {
        non_blank(&self.id)
            .or_else(|| non_blank(&self.student_id))
            .or_else(|| non_blank(&self.matricula))
    }

    pub fn email_lower(&self) -> Option<String> {
        non_blank(&self.email).map(|e| e.to_lowercase())
    }
}

/// Every key a profile may be stored under, most specific first:
/// `email-…`, `id-…`, `uid-…`.
pub fn candidate_keys(profile: &StudentProfile) -> Vec<String> {
    let mut keys: Vec<String> = Vec::new();
    let sources = [
        ("email", non_blank(&profile.email)),
        ("id", profile.roster_id()),
        ("uid", non_blank(&profile.uid)),
    ];
    for (prefix, value) in sources {
        let Some(slug) = value.and_then(sanitize_identifier) else {
            continue;
        };
        let key = format!("{}-{}", prefix, slug);
        if !keys.contains(&key) {
            keys.push(key);
        }
    }
    keys
}

pub fn primary_key(profile: &StudentProfile) -> Option<String> {
    candidate_keys(profile).into_iter().next()
}
