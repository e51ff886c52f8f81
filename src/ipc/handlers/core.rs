use super::{get_optional_str, respond, HandlerErr};
use crate::ipc::types::{AppState, Request};
use serde_json::json;
use std::path::PathBuf;

fn handle_health(state: &mut AppState, req: &Request) -> serde_json::Value {
    respond(req, || {
        Ok(json!({
            "version": env!("CARGO_PKG_VERSION"),
            "storePath": state.config.store.path.as_ref().map(|p| p.to_string_lossy().to_string()),
            "storeOpen": state.session.is_some(),
            "cachedSheets": state.session.as_ref().map(|s| s.cached_sheets()).unwrap_or(0),
        }))
    })
}

fn handle_store_open(state: &mut AppState, req: &Request) -> serde_json::Value {
    respond(req, || {
        let path = get_optional_str(&req.params, "path")
            .map(PathBuf::from)
            .or_else(|| state.config.store.path.clone())
            .ok_or_else(|| HandlerErr::bad_params("missing params.path"))?;
        state.open_store(&path).map_err(|e| HandlerErr {
            code: "store_open_failed",
            message: format!("{e:#}"),
            details: None,
        })?;
        let sheets = state.config.store.sheet_names();
        let source = state.session.as_ref().map(|s| s.source_id());
        Ok(json!({
            "storePath": path.to_string_lossy(),
            "source": source,
            "sheets": [sheets.main, sheets.financial, sheets.exams],
        }))
    })
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "health" => Some(handle_health(state, req)),
        "store.open" => Some(handle_store_open(state, req)),
        _ => None,
    }
}
