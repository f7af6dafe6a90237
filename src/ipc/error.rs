use crate::calc::CalcError;
use serde_json::json;

pub fn ok(id: &str, result: serde_json::Value) -> serde_json::Value {
    json!({ "id": id, "ok": true, "result": result })
}

/// Failure envelope. `details` is left out entirely when there are none.
pub fn calc_err(id: &str, e: CalcError) -> serde_json::Value {
    json!({ "id": id, "ok": false, "error": e })
}

pub fn err(
    id: &str,
    code: &str,
    message: impl Into<String>,
    details: Option<serde_json::Value>,
) -> serde_json::Value {
    let mut e = CalcError::new(code, message);
    e.details = details;
    calc_err(id, e)
}
