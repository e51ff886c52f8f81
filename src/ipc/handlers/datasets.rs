use super::{get_required_str, respond, session_mut};
use crate::entries;
use crate::ipc::types::{AppState, Request};
use serde_json::json;

fn handle_reload(state: &mut AppState, req: &Request) -> serde_json::Value {
    respond(req, || {
        let session = session_mut(state)?;
        let dropped = session.reload();
        tracing::info!(dropped, "datasets reloaded");
        Ok(json!({ "dropped": dropped }))
    })
}

fn handle_classes_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    respond(req, || {
        let session = session_mut(state)?;
        let sheet = session.sheets().main.clone();
        let main = session.table(&sheet)?;
        Ok(json!({ "classes": entries::classes(&main) }))
    })
}

fn handle_classes_context(state: &mut AppState, req: &Request) -> serde_json::Value {
    respond(req, || {
        let class = get_required_str(&req.params, "class")?;
        let session = session_mut(state)?;
        let sheet = session.sheets().main.clone();
        let main = session.table(&sheet)?;
        Ok(json!(entries::class_context(&main, class.trim())))
    })
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "datasets.reload" => Some(handle_reload(state, req)),
        "classes.list" => Some(handle_classes_list(state, req)),
        "classes.context" => Some(handle_classes_context(state, req)),
        _ => None,
    }
}
