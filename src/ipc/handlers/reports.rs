use crate::calc::{self, ScoreField, StudentReport, SubjectScoreRecord, Term};
use crate::db;
use crate::filter::{self, Student};
use crate::ipc::error::{calc_err, err, ok};
use crate::ipc::helpers::required_str;
use crate::ipc::types::{AppState, Request};
use crate::settings::{self, GradingSettings};
use serde_json::json;

fn parse_term(req: &Request) -> Result<Term, serde_json::Value> {
    let raw = required_str(req, "term")?;
    Term::parse(&raw).ok_or_else(|| {
        err(
            &req.id,
            "bad_params",
            format!("unknown term: {}", raw),
            Some(json!({ "allowed": Term::ALL.iter().map(|t| t.label()).collect::<Vec<_>>() })),
        )
    })
}

fn score_param(
    req: &Request,
    entry: &serde_json::Map<String, serde_json::Value>,
    field: ScoreField,
    subject: &str,
) -> Result<f64, serde_json::Value> {
    match entry.get(field.name()) {
        None => Ok(0.0),
        Some(v) if v.is_null() => Ok(0.0),
        Some(v) => v.as_f64().ok_or_else(|| {
            err(
                &req.id,
                "bad_params",
                format!("{} must be a number", field.name()),
                Some(json!({ "subject": subject })),
            )
        }),
    }
}

/// Score entry. Missing scores count as 0; with no `subjects` param the
/// configured roster is used with every score at 0.
fn parse_subjects(
    req: &Request,
    grading: &GradingSettings,
) -> Result<Vec<SubjectScoreRecord>, serde_json::Value> {
    let Some(raw) = req.params.get("subjects").filter(|v| !v.is_null()) else {
        return grading
            .subjects
            .iter()
            .map(|name| SubjectScoreRecord::new(name, 0.0, 0.0).map_err(|e| calc_err(&req.id, e)))
            .collect();
    };
    let Some(entries) = raw.as_array() else {
        return Err(err(&req.id, "bad_params", "subjects must be an array", None));
    };

    let mut out: Vec<SubjectScoreRecord> = Vec::with_capacity(entries.len());
    for entry in entries {
        let Some(obj) = entry.as_object() else {
            return Err(err(
                &req.id,
                "bad_params",
                "each subject must be an object",
                None,
            ));
        };
        let subject = obj
            .get("subject")
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .trim();
        let class_score = score_param(req, obj, ScoreField::ClassScore, subject)?;
        let exam_score = score_param(req, obj, ScoreField::ExamScore, subject)?;
        if grading.enforce_score_ranges {
            for (field, value) in [
                (ScoreField::ClassScore, class_score),
                (ScoreField::ExamScore, exam_score),
            ] {
                if let Err(mut e) = calc::validate_score(field, value) {
                    if let Some(details) = e.details.as_mut() {
                        details["subject"] = json!(subject);
                    }
                    return Err(calc_err(&req.id, e));
                }
            }
        }

        let remarks = obj.get("remarks").and_then(|v| v.as_str());
        let mut record = SubjectScoreRecord::new(subject, 0.0, 0.0)
            .map_err(|e| calc_err(&req.id, e))?
            .with_remarks(remarks);
        record
            .set_score(ScoreField::ClassScore, class_score)
            .and_then(|_| record.set_score(ScoreField::ExamScore, exam_score))
            .map_err(|e| calc_err(&req.id, e))?;
        if out
            .iter()
            .any(|r| r.subject().eq_ignore_ascii_case(record.subject()))
        {
            return Err(err(
                &req.id,
                "bad_params",
                format!("duplicate subject: {}", record.subject()),
                None,
            ));
        }
        out.push(record);
    }
    Ok(out)
}

fn build_from_params(state: &AppState, req: &Request) -> Result<StudentReport, serde_json::Value> {
    let student_id = required_str(req, "studentId")?;
    let term = parse_term(req)?;
    let grading = settings::load_grading(state.db.as_ref())
        .map_err(|e| err(&req.id, "db_query_failed", e.to_string(), None))?;
    let subjects = parse_subjects(req, &grading)?;
    let report = calc::build_report(&student_id, term, subjects);
    // Unchecked ranges can still sum past f64::MAX across subjects.
    if !report.total_score().is_finite() {
        return Err(err(
            &req.id,
            "non_finite_score",
            "report total is not a finite number",
            None,
        ));
    }
    Ok(report)
}

fn handle_reports_preview(state: &mut AppState, req: &Request) -> serde_json::Value {
    match build_from_params(state, req) {
        Ok(report) => ok(&req.id, json!({ "report": report })),
        Err(e) => e,
    }
}

fn handle_reports_save(state: &mut AppState, req: &Request) -> serde_json::Value {
    let report = match build_from_params(state, req) {
        Ok(r) => r,
        Err(e) => return e,
    };

    // Write through first so the store never holds a report the workspace lost.
    if let Some(conn) = state.db.as_ref() {
        if let Err(e) = db::reports_upsert(conn, &report) {
            return err(
                &req.id,
                "db_insert_failed",
                e.to_string(),
                Some(json!({ "table": "reports" })),
            );
        }
    }

    let student_id = report.student_id().to_string();
    let term = report.term();
    let total_score = report.total_score();
    let overall_grade = report.overall_grade();
    let saved = json!(report);
    let replaced = state.reports.add_report(report).is_some();
    tracing::info!(
        student_id = %student_id,
        term = term.label(),
        total_score,
        grade = overall_grade.label(),
        replaced,
        "report saved"
    );
    ok(&req.id, json!({ "report": saved, "replaced": replaced }))
}

fn handle_reports_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let student_id = match required_str(req, "studentId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let term = match parse_term(req) {
        Ok(t) => t,
        Err(e) => return e,
    };
    let report = state.reports.report_by_student_and_term(&student_id, term);
    ok(&req.id, json!({ "report": report }))
}

fn handle_reports_by_student(state: &mut AppState, req: &Request) -> serde_json::Value {
    let student_id = match required_str(req, "studentId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let reports = state.reports.reports_by_student(&student_id);
    ok(&req.id, json!({ "reports": reports }))
}

fn handle_reports_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let criteria = match filter::parse_filter_criteria(req.params.get("filters")) {
        Ok(c) => c,
        Err(e) => return calc_err(&req.id, e),
    };
    // The roster is only read when a class or year criterion needs it.
    let roster: Vec<Student> = match state.db.as_ref() {
        Some(conn) if criteria.needs_student() => match db::students_list(conn) {
            Ok(v) => v,
            Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
        },
        _ => Vec::new(),
    };
    let all = state.reports.all();
    let selected = filter::filter_reports(all, &criteria, roster.as_slice());
    ok(
        &req.id,
        json!({
            "filters": criteria,
            "reports": selected,
            "total": all.len()
        }),
    )
}

fn handle_reports_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let student_id = match required_str(req, "studentId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let term = match parse_term(req) {
        Ok(t) => t,
        Err(e) => return e,
    };
    if state
        .reports
        .report_by_student_and_term(&student_id, term)
        .is_none()
    {
        return err(&req.id, "not_found", "report not found", None);
    }
    if let Some(conn) = state.db.as_ref() {
        if let Err(e) = db::reports_delete(conn, &student_id, term) {
            return err(&req.id, "db_delete_failed", e.to_string(), None);
        }
    }
    state.reports.remove(&student_id, term);
    tracing::info!(student_id = %student_id, term = term.label(), "report deleted");
    ok(&req.id, json!({ "deleted": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "reports.preview" => Some(handle_reports_preview(state, req)),
        "reports.save" => Some(handle_reports_save(state, req)),
        "reports.get" => Some(handle_reports_get(state, req)),
        "reports.byStudent" => Some(handle_reports_by_student(state, req)),
        "reports.list" => Some(handle_reports_list(state, req)),
        "reports.delete" => Some(handle_reports_delete(state, req)),
        _ => None,
    }
}
