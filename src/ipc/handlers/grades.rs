use crate::calc::{self, Term};
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use serde_json::json;

fn handle_classify(req: &Request) -> serde_json::Value {
    let Some(score) = req.params.get("score").and_then(|v| v.as_f64()) else {
        return err(&req.id, "bad_params", "score must be a number", None);
    };
    ok(
        &req.id,
        json!({ "score": score, "grade": calc::classify(score) }),
    )
}

fn handle_scale(req: &Request) -> serde_json::Value {
    ok(&req.id, json!({ "bands": calc::grade_scale() }))
}

fn handle_terms_list(req: &Request) -> serde_json::Value {
    let terms: Vec<&str> = Term::ALL.iter().map(|t| t.label()).collect();
    ok(&req.id, json!({ "terms": terms }))
}

pub fn try_handle(_state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "grades.classify" => Some(handle_classify(req)),
        "grades.scale" => Some(handle_scale(req)),
        "terms.list" => Some(handle_terms_list(req)),
        _ => None,
    }
}
