use crate::calc::{StudentReport, Term};

/// Reports keyed by (student, term). At most one report per key; a save for
/// an existing key replaces it and moves it to the end.
#[derive(Debug, Default)]
pub struct ReportStore {
    reports: Vec<StudentReport>,
}

impl ReportStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_reports<I>(reports: I) -> Self
    where
        I: IntoIterator<Item = StudentReport>,
    {
        let mut store = Self::new();
        for r in reports {
            store.add_report(r);
        }
        store
    }

    /// Returns the report that was replaced, if any.
    pub fn add_report(&mut self, report: StudentReport) -> Option<StudentReport> {
        let replaced = self.remove(report.student_id(), report.term());
        self.reports.push(report);
        replaced
    }

    pub fn remove(&mut self, student_id: &str, term: Term) -> Option<StudentReport> {
        let pos = self
            .reports
            .iter()
            .position(|r| r.student_id() == student_id && r.term() == term)?;
        Some(self.reports.remove(pos))
    }

    pub fn reports_by_student(&self, student_id: &str) -> Vec<&StudentReport> {
        self.reports
            .iter()
            .filter(|r| r.student_id() == student_id)
            .collect()
    }

    pub fn report_by_student_and_term(
        &self,
        student_id: &str,
        term: Term,
    ) -> Option<&StudentReport> {
        self.reports
            .iter()
            .find(|r| r.student_id() == student_id && r.term() == term)
    }

    pub fn all(&self) -> &[StudentReport] {
        &self.reports
    }

    pub fn len(&self) -> usize {
        self.reports.len()
    }

    /// Drops every term's report for one student; returns how many went.
    pub fn remove_student(&mut self, student_id: &str) -> usize {
        let before = self.reports.len();
        self.reports.retain(|r| r.student_id() != student_id);
        before - self.reports.len()
    }
}
