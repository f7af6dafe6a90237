use crate::db;
use crate::filter::{self, Student};
use crate::ipc::error::{calc_err, err, ok};
use crate::ipc::helpers::{db_conn, optional_str, required_str};
use crate::ipc::types::{AppState, Request};
use serde_json::json;

fn parse_student(req: &Request) -> Result<Student, serde_json::Value> {
    let id = required_str(req, "id")?;
    let name = required_str(req, "name")?;
    let class_name = required_str(req, "class")?;
    let academic_year = required_str(req, "academicYear")?;
    if !filter::is_academic_year(&academic_year) {
        return Err(err(
            &req.id,
            "bad_params",
            "academicYear must look like 2024/2025",
            Some(json!({ "academicYear": academic_year })),
        ));
    }
    // Admission number defaults to the record id.
    let student_id = optional_str(req, "studentId")?.unwrap_or_else(|| id.clone());
    Ok(Student {
        id,
        name,
        student_id,
        class_name,
        academic_year,
    })
}

fn handle_students_upsert(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let student = match parse_student(req) {
        Ok(s) => s,
        Err(e) => return e,
    };
    match db::students_upsert(conn, &student) {
        Ok(created) => ok(&req.id, json!({ "student": student, "created": created })),
        Err(e) => err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "students" })),
        ),
    }
}

fn handle_students_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let id = match required_str(req, "id") {
        Ok(v) => v,
        Err(e) => return e,
    };
    match db::student_get(conn, &id) {
        Ok(Some(student)) => ok(&req.id, json!({ "student": student })),
        Ok(None) => err(&req.id, "not_found", "student not found", None),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_students_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let id = match required_str(req, "id") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let deleted = {
        let conn = match db_conn(state, req) {
            Ok(c) => c,
            Err(e) => return e,
        };
        match db::students_delete(conn, &id) {
            Ok(v) => v,
            Err(e) => return err(&req.id, "db_delete_failed", e.to_string(), None),
        }
    };
    if !deleted {
        return err(&req.id, "not_found", "student not found", None);
    }
    let removed_reports = state.reports.remove_student(&id);
    tracing::info!(student_id = %id, removed_reports, "student deleted");
    ok(&req.id, json!({ "removedReports": removed_reports }))
}

fn handle_students_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let criteria = match filter::parse_filter_criteria(req.params.get("filters")) {
        Ok(c) => c,
        Err(e) => return calc_err(&req.id, e),
    };
    let Some(conn) = state.db.as_ref() else {
        return ok(&req.id, json!({ "students": [], "total": 0 }));
    };
    let all = match db::students_list(conn) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let selected = filter::filter_students(&all, &criteria);
    ok(
        &req.id,
        json!({ "students": selected, "total": all.len() }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "students.upsert" => Some(handle_students_upsert(state, req)),
        "students.get" => Some(handle_students_get(state, req)),
        "students.delete" => Some(handle_students_delete(state, req)),
        "students.list" => Some(handle_students_list(state, req)),
        _ => None,
    }
}
