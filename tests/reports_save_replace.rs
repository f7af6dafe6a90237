use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_gradebookd");
    let mut child = Command::new(exe)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn gradebookd");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

fn request(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let payload = json!({
        "id": id,
        "method": method,
        "params": params,
    });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");

    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    assert!(!line.trim().is_empty(), "empty response for {}", method);
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    value
}

fn request_ok(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let value = request(stdin, reader, id, method, params);
    assert!(
        value.get("ok").and_then(|v| v.as_bool()).unwrap_or(false),
        "{} failed: {}",
        method,
        value
            .get("error")
            .and_then(|e| e.get("message"))
            .and_then(|v| v.as_str())
            .unwrap_or("unknown error")
    );
    value.get("result").cloned().unwrap_or_else(|| json!({}))
}

fn error_code(value: &serde_json::Value) -> Option<&str> {
    value
        .get("error")
        .and_then(|e| e.get("code"))
        .and_then(|v| v.as_str())
}

fn report_of(result: &serde_json::Value) -> &serde_json::Value {
    result.get("report").expect("report in result")
}

#[test]
fn save_computes_totals_and_grades() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let saved = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "reports.save",
        json!({
            "studentId": "STD001",
            "term": "1st Term",
            "subjects": [
                { "subject": "Mathematics", "classScore": 25, "examScore": 65 },
                { "subject": "English Language", "classScore": 20, "examScore": 50, "remarks": "Good effort" }
            ]
        }),
    );
    assert_eq!(saved.get("replaced").and_then(|v| v.as_bool()), Some(false));
    let report = report_of(&saved);
    assert_eq!(report.get("studentId").and_then(|v| v.as_str()), Some("STD001"));
    assert_eq!(report.get("term").and_then(|v| v.as_str()), Some("1st Term"));
    assert_eq!(report.get("totalScore").and_then(|v| v.as_f64()), Some(160.0));
    assert_eq!(report.get("overallGrade").and_then(|v| v.as_str()), Some("B+"));

    let subjects = report
        .get("subjects")
        .and_then(|v| v.as_array())
        .expect("subjects array");
    assert_eq!(subjects.len(), 2);
    assert_eq!(subjects[0].get("total").and_then(|v| v.as_f64()), Some(90.0));
    assert_eq!(subjects[0].get("grade").and_then(|v| v.as_str()), Some("A"));
    assert_eq!(subjects[1].get("total").and_then(|v| v.as_f64()), Some(70.0));
    assert_eq!(subjects[1].get("grade").and_then(|v| v.as_str()), Some("B"));
    assert_eq!(
        subjects[1].get("remarks").and_then(|v| v.as_str()),
        Some("Good effort")
    );

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn second_save_for_same_term_replaces_the_first() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "reports.save",
        json!({
            "studentId": "STD001",
            "term": "2nd Term",
            "subjects": [{ "subject": "Mathematics", "classScore": 10, "examScore": 20 }]
        }),
    );
    let again = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "reports.save",
        json!({
            "studentId": "STD001",
            "term": "term 2",
            "subjects": [{ "subject": "Mathematics", "classScore": 28, "examScore": 66 }]
        }),
    );
    assert_eq!(again.get("replaced").and_then(|v| v.as_bool()), Some(true));

    let by_student = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "reports.byStudent",
        json!({ "studentId": "STD001" }),
    );
    let reports = by_student
        .get("reports")
        .and_then(|v| v.as_array())
        .expect("reports array");
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].get("totalScore").and_then(|v| v.as_f64()), Some(94.0));
    assert_eq!(reports[0].get("overallGrade").and_then(|v| v.as_str()), Some("A"));

    let health = request_ok(&mut stdin, &mut reader, "4", "health", json!({}));
    assert_eq!(health.get("reportCount").and_then(|v| v.as_u64()), Some(1));

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn get_for_missing_key_is_null_and_delete_is_not_found() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let got = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "reports.get",
        json!({ "studentId": "STD404", "term": "3rd Term" }),
    );
    assert!(got.get("report").map(|v| v.is_null()).unwrap_or(false));

    let by_student = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "reports.byStudent",
        json!({ "studentId": "STD404" }),
    );
    assert_eq!(
        by_student.get("reports").and_then(|v| v.as_array()).map(|a| a.len()),
        Some(0)
    );

    let deleted = request(
        &mut stdin,
        &mut reader,
        "3",
        "reports.delete",
        json!({ "studentId": "STD404", "term": "3rd Term" }),
    );
    assert_eq!(error_code(&deleted), Some("not_found"));

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn empty_subject_list_scores_zero_and_fails() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let preview = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "reports.preview",
        json!({ "studentId": "STD001", "term": "3rd Term", "subjects": [] }),
    );
    let report = report_of(&preview);
    assert_eq!(report.get("totalScore").and_then(|v| v.as_f64()), Some(0.0));
    assert_eq!(report.get("overallGrade").and_then(|v| v.as_str()), Some("F"));

    // Preview does not store.
    let health = request_ok(&mut stdin, &mut reader, "2", "health", json!({}));
    assert_eq!(health.get("reportCount").and_then(|v| v.as_u64()), Some(0));

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn bad_term_and_blank_student_are_rejected() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let bad_term = request(
        &mut stdin,
        &mut reader,
        "1",
        "reports.save",
        json!({ "studentId": "STD001", "term": "4th Term", "subjects": [] }),
    );
    assert_eq!(error_code(&bad_term), Some("bad_params"));
    let allowed = bad_term
        .get("error")
        .and_then(|e| e.get("details"))
        .and_then(|d| d.get("allowed"))
        .and_then(|v| v.as_array())
        .map(|a| a.len());
    assert_eq!(allowed, Some(3));

    let blank = request(
        &mut stdin,
        &mut reader,
        "2",
        "reports.save",
        json!({ "studentId": "  ", "term": "1st Term", "subjects": [] }),
    );
    assert_eq!(error_code(&blank), Some("bad_params"));

    let blank_subject = request(
        &mut stdin,
        &mut reader,
        "3",
        "reports.save",
        json!({
            "studentId": "STD001",
            "term": "1st Term",
            "subjects": [{ "subject": " ", "classScore": 1, "examScore": 1 }]
        }),
    );
    assert_eq!(error_code(&blank_subject), Some("empty_subject"));

    let duplicate = request(
        &mut stdin,
        &mut reader,
        "4",
        "reports.save",
        json!({
            "studentId": "STD001",
            "term": "1st Term",
            "subjects": [
                { "subject": "Mathematics", "classScore": 1, "examScore": 1 },
                { "subject": "mathematics", "classScore": 2, "examScore": 2 }
            ]
        }),
    );
    assert_eq!(error_code(&duplicate), Some("bad_params"));

    let health = request_ok(&mut stdin, &mut reader, "5", "health", json!({}));
    assert_eq!(health.get("reportCount").and_then(|v| v.as_u64()), Some(0));

    drop(stdin);
    let _ = child.wait();
}
