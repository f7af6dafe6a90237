use std::path::PathBuf;

use rusqlite::Connection;
use serde::Deserialize;

use crate::store::ReportStore;

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

/// Owned by the stdin loop; handlers get it by `&mut`, one request at a time.
pub struct AppState {
    pub workspace: Option<PathBuf>,
    pub db: Option<Connection>,
    pub reports: ReportStore,
}

impl AppState {
    pub fn new() -> Self {
        Self {
            workspace: None,
            db: None,
            reports: ReportStore::new(),
        }
    }
}
