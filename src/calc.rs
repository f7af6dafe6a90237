use serde::{Serialize, Serializer};
use std::cmp::Ordering;

pub const CLASS_SCORE_MAX: f64 = 30.0;
pub const EXAM_SCORE_MAX: f64 = 70.0;

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

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Grade {
    #[serde(rename = "A")]
    A,
    #[serde(rename = "B+")]
    BPlus,
    #[serde(rename = "B")]
    B,
    #[serde(rename = "C+")]
    CPlus,
    #[serde(rename = "C")]
    C,
    #[serde(rename = "D+")]
    DPlus,
    #[serde(rename = "D")]
    D,
    #[serde(rename = "F")]
    F,
}

impl Grade {
    pub fn label(self) -> &'static str {
        match self {
            Grade::A => "A",
            Grade::BPlus => "B+",
            Grade::B => "B",
            Grade::CPlus => "C+",
            Grade::C => "C",
            Grade::DPlus => "D+",
            Grade::D => "D",
            Grade::F => "F",
        }
    }

    fn rank(self) -> u8 {
        match self {
            Grade::F => 0,
            Grade::D => 1,
            Grade::DPlus => 2,
            Grade::C => 3,
            Grade::CPlus => 4,
            Grade::B => 5,
            Grade::BPlus => 6,
            Grade::A => 7,
        }
    }
}

impl Ord for Grade {
    fn cmp(&self, other: &Self) -> Ordering {
        self.rank().cmp(&other.rank())
    }
}

impl PartialOrd for Grade {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Lower bounds, highest band first. Anything below the last bound is an F.
const GRADE_BANDS: [(f64, Grade); 7] = [
    (90.0, Grade::A),
    (80.0, Grade::BPlus),
    (70.0, Grade::B),
    (60.0, Grade::CPlus),
    (50.0, Grade::C),
    (40.0, Grade::DPlus),
    (30.0, Grade::D),
];

/// Maps a 0-100 score to its letter band. Bounds are inclusive and no
/// rounding happens first, so 89.999 is still a B+.
pub fn classify(score: f64) -> Grade {
    for (floor, grade) in GRADE_BANDS {
        if score >= floor {
            return grade;
        }
    }
    Grade::F
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeBand {
    pub grade: Grade,
    pub min_score: f64,
}

pub fn grade_scale() -> Vec<GradeBand> {
    GRADE_BANDS
        .iter()
        .map(|(floor, grade)| GradeBand {
            grade: *grade,
            min_score: *floor,
        })
        .chain(std::iter::once(GradeBand {
            grade: Grade::F,
            min_score: 0.0,
        }))
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Term {
    First,
    Second,
    Third,
}

impl Term {
    pub const ALL: [Term; 3] = [Term::First, Term::Second, Term::Third];

    pub fn label(self) -> &'static str {
        match self {
            Term::First => "1st Term",
            Term::Second => "2nd Term",
            Term::Third => "3rd Term",
        }
    }

    /// Accepts the canonical labels plus the usual spellings ("first term",
    /// "term 1", "1").
    pub fn parse(raw: &str) -> Option<Self> {
        let t = raw.trim().to_ascii_lowercase();
        let t = t.strip_suffix(" term").unwrap_or(&t);
        let t = t.strip_prefix("term ").unwrap_or(t);
        match t {
            "1" | "1st" | "first" => Some(Term::First),
            "2" | "2nd" | "second" => Some(Term::Second),
            "3" | "3rd" | "third" => Some(Term::Third),
            _ => None,
        }
    }
}

impl Serialize for Term {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoreField {
    ClassScore,
    ExamScore,
}

impl ScoreField {
    pub fn name(self) -> &'static str {
        match self {
            ScoreField::ClassScore => "classScore",
            ScoreField::ExamScore => "examScore",
        }
    }

    pub fn max(self) -> f64 {
        match self {
            ScoreField::ClassScore => CLASS_SCORE_MAX,
            ScoreField::ExamScore => EXAM_SCORE_MAX,
        }
    }
}

/// Range check for the entry layer. Records themselves accept any finite value.
pub fn validate_score(field: ScoreField, value: f64) -> Result<(), CalcError> {
    if (0.0..=field.max()).contains(&value) {
        return Ok(());
    }
    Err(CalcError::new(
        "score_out_of_range",
        format!("{} must be between 0 and {}", field.name(), field.max()),
    )
    .with_details(serde_json::json!({
        "field": field.name(),
        "value": value,
        "min": 0.0,
        "max": field.max(),
    })))
}

fn subject_total(class_score: f64, exam_score: f64) -> Result<f64, CalcError> {
    let total = class_score + exam_score;
    if total.is_finite() {
        Ok(total)
    } else {
        Err(CalcError::new(
            "non_finite_score",
            "subject total is not a finite number",
        ))
    }
}

fn check_finite(field: ScoreField, value: f64) -> Result<(), CalcError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(CalcError::new(
            "non_finite_score",
            format!("{} must be a finite number", field.name()),
        ))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectScoreRecord {
    subject: String,
    class_score: f64,
    exam_score: f64,
    total: f64,
    grade: Grade,
    #[serde(skip_serializing_if = "Option::is_none")]
    remarks: Option<String>,
}

impl SubjectScoreRecord {
    pub fn new(subject: &str, class_score: f64, exam_score: f64) -> Result<Self, CalcError> {
        let subject = subject.trim();
        if subject.is_empty() {
            return Err(CalcError::new("empty_subject", "subject must not be empty"));
        }
        check_finite(ScoreField::ClassScore, class_score)?;
        check_finite(ScoreField::ExamScore, exam_score)?;
        let total = subject_total(class_score, exam_score)?;

        Ok(Self {
            subject: subject.to_string(),
            class_score,
            exam_score,
            total,
            grade: classify(total),
            remarks: None,
        })
    }

    pub fn with_remarks(mut self, remarks: Option<&str>) -> Self {
        self.remarks = remarks
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .map(str::to_string);
        self
    }

    /// Nothing changes unless the new total is finite too.
    pub fn set_score(&mut self, field: ScoreField, value: f64) -> Result<(), CalcError> {
        check_finite(field, value)?;
        let (class_score, exam_score) = match field {
            ScoreField::ClassScore => (value, self.exam_score),
            ScoreField::ExamScore => (self.class_score, value),
        };
        let total = subject_total(class_score, exam_score)?;
        self.class_score = class_score;
        self.exam_score = exam_score;
        self.total = total;
        self.grade = classify(total);
        Ok(())
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn class_score(&self) -> f64 {
        self.class_score
    }

    pub fn exam_score(&self) -> f64 {
        self.exam_score
    }

    #[allow(dead_code)]
    pub fn total(&self) -> f64 {
        self.total
    }

    #[allow(dead_code)]
    pub fn grade(&self) -> Grade {
        self.grade
    }

    pub fn remarks(&self) -> Option<&str> {
        self.remarks.as_deref()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentReport {
    student_id: String,
    term: Term,
    subjects: Vec<SubjectScoreRecord>,
    total_score: f64,
    overall_grade: Grade,
}

impl StudentReport {
    pub fn student_id(&self) -> &str {
        &self.student_id
    }

    pub fn term(&self) -> Term {
        self.term
    }

    pub fn subjects(&self) -> &[SubjectScoreRecord] {
        &self.subjects
    }

    pub fn total_score(&self) -> f64 {
        self.total_score
    }

    pub fn overall_grade(&self) -> Grade {
        self.overall_grade
    }
}

/// Sums subject totals and grades the per-subject mean, since the bands are
/// defined on a single subject's 0-100 scale. No subjects gives 0 and an F.
pub fn build_report(
    student_id: &str,
    term: Term,
    subjects: Vec<SubjectScoreRecord>,
) -> StudentReport {
    let total_score: f64 = subjects.iter().map(|s| s.total).sum();
    let mean = if subjects.is_empty() {
        0.0
    } else {
        total_score / (subjects.len() as f64)
    };
    StudentReport {
        student_id: student_id.to_string(),
        term,
        subjects,
        total_score,
        overall_grade: classify(mean),
    }
}
