use crate::calc::{build_report, StudentReport, SubjectScoreRecord, Term};
use crate::filter::Student;
use anyhow::Context;
use rusqlite::{Connection, OptionalExtension};
use serde::Serialize;
use std::path::Path;
use uuid::Uuid;

pub const DB_FILE: &str = "gradebook.sqlite3";

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join(DB_FILE);
    let conn = Connection::open(db_path)?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS settings(
            key TEXT PRIMARY KEY,
            value_json TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS students(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            admission_no TEXT NOT NULL,
            class_name TEXT NOT NULL,
            academic_year TEXT NOT NULL,
            sort_order INTEGER NOT NULL,
            updated_at TEXT
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_students_class_year ON students(class_name, academic_year)",
        [],
    )?;

    // Reports reference students by id only; a report may outlive a roster
    // import and is then simply unresolvable for class/year filters.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS reports(
            id TEXT PRIMARY KEY,
            student_id TEXT NOT NULL,
            term TEXT NOT NULL,
            saved_at TEXT NOT NULL,
            UNIQUE(student_id, term)
        )",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS report_subjects(
            report_id TEXT NOT NULL,
            idx INTEGER NOT NULL,
            subject TEXT NOT NULL,
            class_score REAL NOT NULL,
            exam_score REAL NOT NULL,
            remarks TEXT,
            PRIMARY KEY(report_id, idx),
            FOREIGN KEY(report_id) REFERENCES reports(id)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS assignment_links(
            kind TEXT NOT NULL,
            left_id TEXT NOT NULL,
            right_id TEXT NOT NULL,
            created_at TEXT NOT NULL,
            PRIMARY KEY(kind, left_id, right_id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_assignment_links_right ON assignment_links(kind, right_id)",
        [],
    )?;

    Ok(conn)
}

fn now_stamp() -> String {
    chrono::Utc::now().to_rfc3339()
}

pub fn settings_get_json(conn: &Connection, key: &str) -> anyhow::Result<Option<serde_json::Value>> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT value_json FROM settings WHERE key = ?",
            [key],
            |r| r.get(0),
        )
        .optional()?;
    match raw {
        None => Ok(None),
        Some(s) => Ok(Some(
            serde_json::from_str(&s).with_context(|| format!("setting {} is not valid JSON", key))?,
        )),
    }
}

pub fn settings_set_json(
    conn: &Connection,
    key: &str,
    value: &serde_json::Value,
) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO settings(key, value_json) VALUES(?, ?)
         ON CONFLICT(key) DO UPDATE SET value_json = excluded.value_json",
        (key, value.to_string()),
    )?;
    Ok(())
}

fn student_from_row(r: &rusqlite::Row<'_>) -> rusqlite::Result<Student> {
    Ok(Student {
        id: r.get(0)?,
        name: r.get(1)?,
        student_id: r.get(2)?,
        class_name: r.get(3)?,
        academic_year: r.get(4)?,
    })
}

/// Returns true when the student was newly created.
pub fn students_upsert(conn: &Connection, s: &Student) -> anyhow::Result<bool> {
    let exists: Option<i64> = conn
        .query_row("SELECT 1 FROM students WHERE id = ?", [&s.id], |r| r.get(0))
        .optional()?;
    if exists.is_some() {
        conn.execute(
            "UPDATE students
             SET name = ?, admission_no = ?, class_name = ?, academic_year = ?, updated_at = ?
             WHERE id = ?",
            (
                &s.name,
                &s.student_id,
                &s.class_name,
                &s.academic_year,
                now_stamp(),
                &s.id,
            ),
        )?;
        return Ok(false);
    }

    let next_sort: i64 = conn.query_row(
        "SELECT COALESCE(MAX(sort_order) + 1, 0) FROM students",
        [],
        |r| r.get(0),
    )?;
    conn.execute(
        "INSERT INTO students(id, name, admission_no, class_name, academic_year, sort_order, updated_at)
         VALUES(?, ?, ?, ?, ?, ?, ?)",
        (
            &s.id,
            &s.name,
            &s.student_id,
            &s.class_name,
            &s.academic_year,
            next_sort,
            now_stamp(),
        ),
    )?;
    Ok(true)
}

pub fn students_list(conn: &Connection) -> anyhow::Result<Vec<Student>> {
    let mut stmt = conn.prepare(
        "SELECT id, name, admission_no, class_name, academic_year
         FROM students
         ORDER BY sort_order",
    )?;
    let rows = stmt
        .query_map([], student_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn student_get(conn: &Connection, id: &str) -> anyhow::Result<Option<Student>> {
    Ok(conn
        .query_row(
            "SELECT id, name, admission_no, class_name, academic_year FROM students WHERE id = ?",
            [id],
            student_from_row,
        )
        .optional()?)
}

/// Deletes the student together with their reports and class links. An
/// unknown id leaves every table untouched.
pub fn students_delete(conn: &Connection, id: &str) -> anyhow::Result<bool> {
    let tx = conn.unchecked_transaction()?;
    let n = tx.execute("DELETE FROM students WHERE id = ?", [id])?;
    if n == 0 {
        // Dropping the transaction rolls it back.
        return Ok(false);
    }
    tx.execute(
        "DELETE FROM report_subjects
         WHERE report_id IN (SELECT r.id FROM reports r WHERE r.student_id = ?)",
        [id],
    )?;
    tx.execute("DELETE FROM reports WHERE student_id = ?", [id])?;
    tx.execute(
        "DELETE FROM assignment_links WHERE kind = ? AND left_id = ?",
        (LinkKind::StudentClass.as_str(), id),
    )?;
    tx.commit()?;
    Ok(true)
}

/// Same contract as the in-memory store: one row per (student, term),
/// replaced as a whole.
pub fn reports_upsert(conn: &Connection, report: &StudentReport) -> anyhow::Result<()> {
    let tx = conn.unchecked_transaction()?;
    delete_report_rows(&tx, report.student_id(), report.term())?;

    let report_id = Uuid::new_v4().to_string();
    tx.execute(
        "INSERT INTO reports(id, student_id, term, saved_at) VALUES(?, ?, ?, ?)",
        (
            &report_id,
            report.student_id(),
            report.term().label(),
            now_stamp(),
        ),
    )?;
    for (idx, s) in report.subjects().iter().enumerate() {
        tx.execute(
            "INSERT INTO report_subjects(report_id, idx, subject, class_score, exam_score, remarks)
             VALUES(?, ?, ?, ?, ?, ?)",
            (
                &report_id,
                idx as i64,
                s.subject(),
                s.class_score(),
                s.exam_score(),
                s.remarks(),
            ),
        )?;
    }
    tx.commit()?;
    Ok(())
}

fn delete_report_rows(conn: &Connection, student_id: &str, term: Term) -> anyhow::Result<bool> {
    conn.execute(
        "DELETE FROM report_subjects
         WHERE report_id IN (SELECT r.id FROM reports r WHERE r.student_id = ? AND r.term = ?)",
        (student_id, term.label()),
    )?;
    let n = conn.execute(
        "DELETE FROM reports WHERE student_id = ? AND term = ?",
        (student_id, term.label()),
    )?;
    Ok(n > 0)
}

pub fn reports_delete(conn: &Connection, student_id: &str, term: Term) -> anyhow::Result<bool> {
    let tx = conn.unchecked_transaction()?;
    let removed = delete_report_rows(&tx, student_id, term)?;
    tx.commit()?;
    Ok(removed)
}

/// Loads every stored report in save order. Totals and grades are rebuilt
/// from the raw scores, never read from disk.
pub fn reports_load_all(conn: &Connection) -> anyhow::Result<Vec<StudentReport>> {
    let mut report_stmt =
        conn.prepare("SELECT id, student_id, term FROM reports ORDER BY rowid")?;
    let heads = report_stmt
        .query_map([], |r| {
            Ok((
                r.get::<_, String>(0)?,
                r.get::<_, String>(1)?,
                r.get::<_, String>(2)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut subject_stmt = conn.prepare(
        "SELECT subject, class_score, exam_score, remarks
         FROM report_subjects
         WHERE report_id = ?
         ORDER BY idx",
    )?;

    let mut out = Vec::with_capacity(heads.len());
    for (report_id, student_id, term_label) in heads {
        let Some(term) = Term::parse(&term_label) else {
            tracing::warn!(report_id = %report_id, term = %term_label, "skipping report with unknown term");
            continue;
        };
        let rows = subject_stmt
            .query_map([&report_id], |r| {
                Ok((
                    r.get::<_, String>(0)?,
                    r.get::<_, f64>(1)?,
                    r.get::<_, f64>(2)?,
                    r.get::<_, Option<String>>(3)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut subjects = Vec::with_capacity(rows.len());
        for (subject, class_score, exam_score, remarks) in rows {
            match SubjectScoreRecord::new(&subject, class_score, exam_score) {
                Ok(rec) => subjects.push(rec.with_remarks(remarks.as_deref())),
                Err(e) => {
                    tracing::warn!(
                        report_id = %report_id,
                        subject = %subject,
                        code = %e.code,
                        "skipping stored subject row"
                    );
                }
            }
        }
        out.push(build_report(&student_id, term, subjects));
    }
    Ok(out)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkKind {
    TeacherSubject,
    TeacherClass,
    StudentClass,
}

impl LinkKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "teacherSubject" => Some(Self::TeacherSubject),
            "teacherClass" => Some(Self::TeacherClass),
            "studentClass" => Some(Self::StudentClass),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::TeacherSubject => "teacherSubject",
            Self::TeacherClass => "teacherClass",
            Self::StudentClass => "studentClass",
        }
    }

    /// Param names for the two sides of the link.
    pub fn keys(self) -> (&'static str, &'static str) {
        match self {
            Self::TeacherSubject => ("teacherId", "subjectId"),
            Self::TeacherClass => ("teacherId", "classId"),
            Self::StudentClass => ("studentId", "classId"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkRow {
    pub left_id: String,
    pub right_id: String,
    pub created_at: String,
}

/// Returns false if the pair was already linked.
pub fn link_assign(conn: &Connection, kind: LinkKind, left: &str, right: &str) -> anyhow::Result<bool> {
    let n = conn.execute(
        "INSERT OR IGNORE INTO assignment_links(kind, left_id, right_id, created_at)
         VALUES(?, ?, ?, ?)",
        (kind.as_str(), left, right, now_stamp()),
    )?;
    Ok(n > 0)
}

pub fn link_remove(conn: &Connection, kind: LinkKind, left: &str, right: &str) -> anyhow::Result<bool> {
    let n = conn.execute(
        "DELETE FROM assignment_links WHERE kind = ? AND left_id = ? AND right_id = ?",
        (kind.as_str(), left, right),
    )?;
    Ok(n > 0)
}

pub fn link_list(
    conn: &Connection,
    kind: LinkKind,
    left: Option<&str>,
    right: Option<&str>,
) -> anyhow::Result<Vec<LinkRow>> {
    let mut stmt = conn.prepare(
        "SELECT left_id, right_id, created_at
         FROM assignment_links
         WHERE kind = ?1
           AND (?2 IS NULL OR left_id = ?2)
           AND (?3 IS NULL OR right_id = ?3)
         ORDER BY rowid",
    )?;
    let rows = stmt
        .query_map((kind.as_str(), left, right), |r| {
            Ok(LinkRow {
                left_id: r.get(0)?,
                right_id: r.get(1)?,
                created_at: r.get(2)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}
