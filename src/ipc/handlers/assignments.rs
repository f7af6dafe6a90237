use crate::db::{self, LinkKind};
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{db_conn, optional_str, required_str};
use crate::ipc::types::{AppState, Request};
use serde_json::json;

fn parse_kind(req: &Request) -> Result<LinkKind, serde_json::Value> {
    let raw = required_str(req, "kind")?;
    LinkKind::parse(&raw).ok_or_else(|| {
        err(
            &req.id,
            "bad_params",
            format!("unknown assignment kind: {}", raw),
            Some(json!({ "allowed": ["teacherSubject", "teacherClass", "studentClass"] })),
        )
    })
}

fn parse_pair(req: &Request) -> Result<(LinkKind, String, String), serde_json::Value> {
    let kind = parse_kind(req)?;
    let (left_key, right_key) = kind.keys();
    let left = required_str(req, left_key)?;
    let right = required_str(req, right_key)?;
    Ok((kind, left, right))
}

fn handle_assign(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let (kind, left, right) = match parse_pair(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let (left_key, right_key) = kind.keys();
    match db::link_assign(conn, kind, &left, &right) {
        Ok(true) => ok(
            &req.id,
            json!({ "kind": kind.as_str(), left_key: left, right_key: right }),
        ),
        Ok(false) => err(
            &req.id,
            "conflict",
            "already assigned",
            Some(json!({ "kind": kind.as_str(), left_key: left, right_key: right })),
        ),
        Err(e) => err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "assignment_links" })),
        ),
    }
}

fn handle_remove(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let (kind, left, right) = match parse_pair(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    match db::link_remove(conn, kind, &left, &right) {
        Ok(true) => ok(&req.id, json!({ "removed": true })),
        Ok(false) => err(&req.id, "not_found", "assignment not found", None),
        Err(e) => err(&req.id, "db_delete_failed", e.to_string(), None),
    }
}

fn handle_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let kind = match parse_kind(req) {
        Ok(k) => k,
        Err(e) => return e,
    };
    let (left_key, right_key) = kind.keys();
    let (left, right) = match (optional_str(req, left_key), optional_str(req, right_key)) {
        (Ok(l), Ok(r)) => (l, r),
        (Err(e), _) | (_, Err(e)) => return e,
    };

    let rows = match db::link_list(conn, kind, left.as_deref(), right.as_deref()) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let links: Vec<serde_json::Value> = rows
        .into_iter()
        .map(|r| json!({ left_key: r.left_id, right_key: r.right_id, "createdAt": r.created_at }))
        .collect();
    ok(&req.id, json!({ "kind": kind.as_str(), "links": links }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "assignments.assign" => Some(handle_assign(state, req)),
        "assignments.remove" => Some(handle_remove(state, req)),
        "assignments.list" => Some(handle_list(state, req)),
        _ => None,
    }
}
