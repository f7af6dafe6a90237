use crate::db;
use rusqlite::Connection;
use serde::Serialize;
use serde_json::{Map, Value};

pub const GRADING_KEY: &str = "setup.grading";

pub const DEFAULT_SUBJECTS: [&str; 9] = [
    "English Language",
    "Mathematics",
    "Science",
    "Social Studies",
    "Religious & Moral Education",
    "Physical Education",
    "Creative Arts",
    "French",
    "ICT",
];

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GradingSettings {
    /// Subject roster offered on score entry, in display order.
    pub subjects: Vec<String>,
    pub enforce_score_ranges: bool,
}

impl Default for GradingSettings {
    fn default() -> Self {
        Self {
            subjects: DEFAULT_SUBJECTS.iter().map(|s| s.to_string()).collect(),
            enforce_score_ranges: true,
        }
    }
}

/// Workspace settings over defaults. No workspace means defaults.
pub fn load_grading(conn: Option<&Connection>) -> anyhow::Result<GradingSettings> {
    let mut current = GradingSettings::default();
    let Some(conn) = conn else {
        return Ok(current);
    };
    if let Some(Value::Object(stored)) = db::settings_get_json(conn, GRADING_KEY)? {
        // Stored values were validated on the way in; skip anything stale.
        if let Err(msg) = apply_patch(&mut current, &stored) {
            tracing::warn!(key = GRADING_KEY, error = %msg, "ignoring invalid stored settings");
            current = GradingSettings::default();
        }
    }
    Ok(current)
}

pub fn apply_patch(settings: &mut GradingSettings, patch: &Map<String, Value>) -> Result<(), String> {
    for (key, value) in patch {
        match key.as_str() {
            "subjects" => {
                let Some(items) = value.as_array() else {
                    return Err("subjects must be an array of strings".into());
                };
                let mut subjects: Vec<String> = Vec::with_capacity(items.len());
                for item in items {
                    let Some(s) = item.as_str().map(str::trim) else {
                        return Err("subjects must be an array of strings".into());
                    };
                    if s.is_empty() {
                        return Err("subject names must not be empty".into());
                    }
                    if subjects.iter().any(|x| x.eq_ignore_ascii_case(s)) {
                        return Err(format!("duplicate subject: {}", s));
                    }
                    subjects.push(s.to_string());
                }
                if subjects.is_empty() {
                    return Err("subjects must not be empty".into());
                }
                settings.subjects = subjects;
            }
            "enforceScoreRanges" => {
                let Some(b) = value.as_bool() else {
                    return Err("enforceScoreRanges must be a boolean".into());
                };
                settings.enforce_score_ranges = b;
            }
            other => return Err(format!("unknown grading setting: {}", other)),
        }
    }
    Ok(())
}
