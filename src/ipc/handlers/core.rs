use crate::backup;
use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::required_str;
use crate::ipc::types::{AppState, Request};
use crate::store::ReportStore;
use serde_json::json;
use std::path::{Path, PathBuf};

fn handle_health(state: &mut AppState, req: &Request) -> serde_json::Value {
    ok(
        &req.id,
        json!({
            "version": env!("CARGO_PKG_VERSION"),
            "workspacePath": state.workspace.as_ref().map(|p| p.to_string_lossy().to_string()),
            "reportCount": state.reports.len()
        }),
    )
}

/// Opens the workspace database and rebuilds the report store from it.
fn open_workspace(state: &mut AppState, path: &Path) -> anyhow::Result<usize> {
    let conn = db::open_db(path)?;
    let reports = db::reports_load_all(&conn)?;
    let count = reports.len();
    state.reports = ReportStore::from_reports(reports);
    state.workspace = Some(path.to_path_buf());
    state.db = Some(conn);
    tracing::info!(workspace = %path.display(), reports = count, "workspace opened");
    Ok(count)
}

fn handle_workspace_select(state: &mut AppState, req: &Request) -> serde_json::Value {
    let path = match required_str(req, "path") {
        Ok(v) => PathBuf::from(v),
        Err(e) => return e,
    };

    match open_workspace(state, &path) {
        Ok(count) => ok(
            &req.id,
            json!({ "workspacePath": path.to_string_lossy(), "reportCount": count }),
        ),
        Err(e) => err(&req.id, "db_open_failed", format!("{e:?}"), None),
    }
}

fn handle_export_bundle(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(workspace) = state.workspace.clone() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let out_path = match required_str(req, "outPath") {
        Ok(v) => PathBuf::from(v),
        Err(e) => return e,
    };

    match backup::export_workspace_bundle(&workspace, &out_path) {
        Ok(summary) => {
            tracing::info!(out = %out_path.display(), "workspace bundle exported");
            ok(
                &req.id,
                json!({
                    "outPath": out_path.to_string_lossy(),
                    "bundleFormat": summary.bundle_format,
                    "dbSha256": summary.db_sha256
                }),
            )
        }
        Err(e) => err(&req.id, "bundle_failed", format!("{e:#}"), None),
    }
}

fn handle_import_bundle(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(workspace) = state.workspace.clone() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let in_path = match required_str(req, "inPath") {
        Ok(v) => PathBuf::from(v),
        Err(e) => return e,
    };

    // Close the current connection before the database file is swapped.
    state.db = None;
    let imported = backup::import_workspace_bundle(&in_path, &workspace);
    let reopened = open_workspace(state, &workspace);

    match (imported, reopened) {
        (Ok(summary), Ok(count)) => {
            tracing::info!(bundle = %in_path.display(), reports = count, "workspace bundle imported");
            ok(
                &req.id,
                json!({
                    "workspacePath": workspace.to_string_lossy(),
                    "bundleFormat": summary.bundle_format,
                    "dbSha256": summary.db_sha256,
                    "reportCount": count
                }),
            )
        }
        (Err(e), _) => err(&req.id, "bundle_failed", format!("{e:#}"), None),
        (Ok(_), Err(e)) => {
            state.workspace = None;
            state.reports = ReportStore::new();
            err(&req.id, "db_open_failed", format!("{e:?}"), None)
        }
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "health" => Some(handle_health(state, req)),
        "workspace.select" => Some(handle_workspace_select(state, req)),
        "workspace.exportBundle" => Some(handle_export_bundle(state, req)),
        "workspace.importBundle" => Some(handle_import_bundle(state, req)),
        _ => None,
    }
}
