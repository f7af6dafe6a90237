use crate::calc::{CalcError, StudentReport, Term};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    pub id: String,
    pub name: String,
    /// Admission number.
    pub student_id: String,
    #[serde(rename = "class")]
    pub class_name: String,
    pub academic_year: String,
}

/// `"YYYY/YYYY+1"`, e.g. `2024/2025`.
pub fn is_academic_year(label: &str) -> bool {
    let Some((start, end)) = label.split_once('/') else {
        return false;
    };
    let four_digits = |s: &str| s.len() == 4 && s.bytes().all(|b| b.is_ascii_digit());
    if !four_digits(start) || !four_digits(end) {
        return false;
    }
    match (start.parse::<u32>(), end.parse::<u32>()) {
        (Ok(a), Ok(b)) => b == a + 1,
        _ => false,
    }
}

/// Source of truth for joining reports to students. Absent means the report
/// cannot satisfy a class or academic-year criterion.
pub trait StudentLookup {
    fn student_by_id(&self, id: &str) -> Option<Student>;
}

impl StudentLookup for [Student] {
    fn student_by_id(&self, id: &str) -> Option<Student> {
        self.iter().find(|s| s.id == id).cloned()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterCriteria {
    pub academic_year: Option<String>,
    #[serde(rename = "class")]
    pub class_name: Option<String>,
    pub term: Option<String>,
}

impl FilterCriteria {
    pub fn is_empty(&self) -> bool {
        self.academic_year.is_none() && self.class_name.is_none() && self.term.is_none()
    }

    pub fn needs_student(&self) -> bool {
        self.academic_year.is_some() || self.class_name.is_some()
    }

    pub fn without_term(&self) -> Self {
        Self {
            term: None,
            ..self.clone()
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ResolvedFields {
    pub academic_year: Option<String>,
    pub class_name: Option<String>,
    pub term: Option<String>,
}

fn criterion_matches(criterion: &Option<String>, value: &Option<String>) -> bool {
    match criterion {
        None => true,
        Some(want) => value.as_deref() == Some(want.as_str()),
    }
}

/// Conjunctive, order-preserving filter. Each record is resolved at most once.
pub fn filter_records<'a, T, F>(
    records: &'a [T],
    criteria: &FilterCriteria,
    mut resolve: F,
) -> Vec<&'a T>
where
    F: FnMut(&T) -> ResolvedFields,
{
    if criteria.is_empty() {
        return records.iter().collect();
    }
    records
        .iter()
        .filter(|r| {
            let fields = resolve(*r);
            criterion_matches(&criteria.academic_year, &fields.academic_year)
                && criterion_matches(&criteria.class_name, &fields.class_name)
                && criterion_matches(&criteria.term, &fields.term)
        })
        .collect()
}

/// Term does not apply to the roster; it is ignored here.
pub fn filter_students<'a>(students: &'a [Student], criteria: &FilterCriteria) -> Vec<&'a Student> {
    filter_records(students, &criteria.without_term(), |s| ResolvedFields {
        academic_year: Some(s.academic_year.clone()),
        class_name: Some(s.class_name.clone()),
        term: None,
    })
}

pub fn filter_reports<'a, L>(
    reports: &'a [StudentReport],
    criteria: &FilterCriteria,
    lookup: &L,
) -> Vec<&'a StudentReport>
where
    L: StudentLookup + ?Sized,
{
    let join = criteria.needs_student();
    filter_records(reports, criteria, |r| {
        let student = if join {
            lookup.student_by_id(r.student_id())
        } else {
            None
        };
        ResolvedFields {
            academic_year: student.as_ref().map(|s| s.academic_year.clone()),
            class_name: student.map(|s| s.class_name),
            term: Some(r.term().label().to_string()),
        }
    })
}

fn optional_text(
    obj: &serde_json::Map<String, serde_json::Value>,
    key: &str,
) -> Result<Option<String>, CalcError> {
    match obj.get(key) {
        None => Ok(None),
        Some(v) if v.is_null() => Ok(None),
        Some(v) => {
            let Some(s) = v.as_str() else {
                return Err(CalcError::new(
                    "bad_params",
                    format!("filters.{} must be string or null", key),
                ));
            };
            let t = s.trim();
            if t.is_empty() || t.eq_ignore_ascii_case("ALL") {
                Ok(None)
            } else {
                Ok(Some(t.to_string()))
            }
        }
    }
}

/// Wire criteria. Blank strings and "ALL" mean "not set"; terms are
/// canonicalized to their display label.
pub fn parse_filter_criteria(raw: Option<&serde_json::Value>) -> Result<FilterCriteria, CalcError> {
    let Some(raw) = raw else {
        return Ok(FilterCriteria::default());
    };
    if raw.is_null() {
        return Ok(FilterCriteria::default());
    }
    let Some(obj) = raw.as_object() else {
        return Err(CalcError::new("bad_params", "filters must be an object"));
    };

    let term = match optional_text(obj, "term")? {
        None => None,
        Some(t) => {
            let Some(parsed) = Term::parse(&t) else {
                return Err(CalcError::new(
                    "bad_params",
                    format!("unknown term: {}", t),
                ));
            };
            Some(parsed.label().to_string())
        }
    };

    Ok(FilterCriteria {
        academic_year: optional_text(obj, "academicYear")?,
        class_name: optional_text(obj, "class")?,
        term,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calc::{build_report, SubjectScoreRecord};
    use serde_json::json;

    fn student(id: &str, class_name: &str, year: &str) -> Student {
        Student {
            id: id.to_string(),
            name: format!("Student {}", id),
            student_id: id.to_string(),
            class_name: class_name.to_string(),
            academic_year: year.to_string(),
        }
    }

    fn roster() -> Vec<Student> {
        vec![
            student("STD001", "JHS 1", "2024/2025"),
            student("STD002", "JHS 1", "2023/2024"),
            student("STD003", "JHS 2", "2024/2025"),
        ]
    }

    fn report(student_id: &str, term: Term) -> StudentReport {
        let subjects = vec![SubjectScoreRecord::new("Science", 15.0, 40.0).expect("record")];
        build_report(student_id, term, subjects)
    }

    fn reports() -> Vec<StudentReport> {
        vec![
            report("STD001", Term::First),
            report("STD003", Term::First),
            report("STD001", Term::Second),
            report("STD002", Term::First),
            report("STD404", Term::First),
        ]
    }

    fn keys(rs: &[&StudentReport]) -> Vec<(String, Term)> {
        rs.iter()
            .map(|r| (r.student_id().to_string(), r.term()))
            .collect()
    }

    #[test]
    fn empty_criteria_returns_everything_in_order() {
        let all = reports();
        let students = roster();
        let out = filter_reports(&all, &FilterCriteria::default(), students.as_slice());
        assert_eq!(out.len(), all.len());
        assert_eq!(keys(&out), keys(&all.iter().collect::<Vec<_>>()));
    }

    #[test]
    fn class_and_term_are_conjunctive() {
        let all = reports();
        let students = roster();
        let criteria = FilterCriteria {
            class_name: Some("JHS 1".into()),
            term: Some("1st Term".into()),
            ..Default::default()
        };
        let out = filter_reports(&all, &criteria, students.as_slice());
        assert_eq!(
            keys(&out),
            vec![
                ("STD001".to_string(), Term::First),
                ("STD002".to_string(), Term::First)
            ]
        );
    }

    #[test]
    fn unresolvable_student_only_fails_student_criteria() {
        let all = reports();
        let students = roster();

        let by_term = FilterCriteria {
            term: Some("1st Term".into()),
            ..Default::default()
        };
        let out = filter_reports(&all, &by_term, students.as_slice());
        assert!(out.iter().any(|r| r.student_id() == "STD404"));

        let by_year = FilterCriteria {
            academic_year: Some("2024/2025".into()),
            ..Default::default()
        };
        let out = filter_reports(&all, &by_year, students.as_slice());
        assert!(out.iter().all(|r| r.student_id() != "STD404"));
        assert_eq!(out.len(), 3);
    }

    #[test]
    fn lookup_is_skipped_when_no_student_criteria() {
        struct Panicking;
        impl StudentLookup for Panicking {
            fn student_by_id(&self, _id: &str) -> Option<Student> {
                panic!("lookup should not be called");
            }
        }
        let all = reports();
        let criteria = FilterCriteria {
            term: Some("2nd Term".into()),
            ..Default::default()
        };
        let out = filter_reports(&all, &criteria, &Panicking);
        assert_eq!(keys(&out), vec![("STD001".to_string(), Term::Second)]);
    }

    #[test]
    fn students_filter_ignores_term() {
        let students = roster();
        let criteria = FilterCriteria {
            academic_year: Some("2024/2025".into()),
            term: Some("3rd Term".into()),
            ..Default::default()
        };
        let ids: Vec<&str> = filter_students(&students, &criteria)
            .iter()
            .map(|s| s.id.as_str())
            .collect();
        assert_eq!(ids, vec!["STD001", "STD003"]);
    }

    #[test]
    fn academic_year_labels_must_be_consecutive_years() {
        assert!(is_academic_year("2024/2025"));
        assert!(!is_academic_year("2024/2026"));
        assert!(!is_academic_year("2024-2025"));
        assert!(!is_academic_year("24/25"));
        assert!(!is_academic_year("abcd/abce"));
        assert!(!is_academic_year("+999/1000"));
        assert!(!is_academic_year("2024/+025"));
    }

    #[test]
    fn parse_treats_blank_and_all_as_unset() {
        let parsed = parse_filter_criteria(Some(&json!({
            "academicYear": "",
            "class": "ALL",
            "term": "   "
        })))
        .expect("parse");
        assert!(parsed.is_empty());
        assert!(parse_filter_criteria(None).expect("none").is_empty());
    }

    #[test]
    fn parse_canonicalizes_term_and_rejects_unknown() {
        let parsed = parse_filter_criteria(Some(&json!({ "term": "second term" }))).expect("parse");
        assert_eq!(parsed.term.as_deref(), Some("2nd Term"));

        let e = parse_filter_criteria(Some(&json!({ "term": "summer" }))).unwrap_err();
        assert_eq!(e.code, "bad_params");
        let e = parse_filter_criteria(Some(&json!({ "class": 3 }))).unwrap_err();
        assert_eq!(e.code, "bad_params");
    }
}
