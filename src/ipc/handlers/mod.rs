pub mod core;
pub mod datasets;
pub mod entries;
pub mod forecast;
pub mod reports;

use crate::error::DashboardError;
use crate::ipc::error::err;
use crate::ipc::types::{AppState, Request};
use crate::session::Session;
use serde::de::DeserializeOwned;

pub(crate) struct HandlerErr {
    code: &'static str,
    message: String,
    details: Option<serde_json::Value>,
}

impl HandlerErr {
    pub(crate) fn bad_params(message: impl Into<String>) -> Self {
        Self {
            code: "bad_params",
            message: message.into(),
            details: None,
        }
    }

    pub(crate) fn response(self, id: &str) -> serde_json::Value {
        err(id, self.code, self.message, self.details)
    }
}

impl From<DashboardError> for HandlerErr {
    fn from(e: DashboardError) -> Self {
        Self {
            code: e.code(),
            message: e.to_string(),
            details: e.details(),
        }
    }
}

pub(crate) fn get_required_str(params: &serde_json::Value, key: &str) -> Result<String, HandlerErr> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| HandlerErr::bad_params(format!("missing {}", key)))
}

pub(crate) fn get_optional_str(params: &serde_json::Value, key: &str) -> Option<String> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
}

pub(crate) fn get_optional_i64(params: &serde_json::Value, key: &str) -> Result<Option<i64>, HandlerErr> {
    match params.get(key) {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(v) => v
            .as_i64()
            .map(Some)
            .ok_or_else(|| HandlerErr::bad_params(format!("{} must be an integer", key))),
    }
}

pub(crate) fn get_required_i64(params: &serde_json::Value, key: &str) -> Result<i64, HandlerErr> {
    get_optional_i64(params, key)?.ok_or_else(|| HandlerErr::bad_params(format!("missing {}", key)))
}

/// Deserializes the whole params object.
pub(crate) fn parse_params<T: DeserializeOwned>(params: &serde_json::Value) -> Result<T, HandlerErr> {
    serde_json::from_value(params.clone())
        .map_err(|e| HandlerErr::bad_params(format!("invalid params: {}", e)))
}

pub(crate) fn session_mut(state: &mut AppState) -> Result<&mut Session, HandlerErr> {
    state.session.as_mut().ok_or_else(|| HandlerErr {
        code: "no_store",
        message: "open a record store first".to_string(),
        details: None,
    })
}

/// Runs `f` and wraps its value or error in a response envelope.
pub(crate) fn respond<F>(req: &Request, f: F) -> serde_json::Value
where
    F: FnOnce() -> Result<serde_json::Value, HandlerErr>,
{
    match f() {
        Ok(v) => crate::ipc::error::ok(&req.id, v),
        Err(e) => e.response(&req.id),
    }
}
