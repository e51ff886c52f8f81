use super::{
    get_optional_i64, get_optional_str, get_required_i64, parse_params, respond, session_mut,
    HandlerErr,
};
use crate::aggregate::TimeWindow;
use crate::error::DashboardError;
use crate::ipc::types::{AppState, Request};
use crate::reports::{self, DashboardRequest, DisciplineScope};
use serde_json::json;

fn handle_dashboard(state: &mut AppState, req: &Request) -> serde_json::Value {
    respond(req, || {
        let params: DashboardRequest = parse_params(&req.params)?;
        let session = session_mut(state)?;
        let model = reports::dashboard(session, &params)?;
        Ok(json!(model))
    })
}

fn handle_finance(state: &mut AppState, req: &Request) -> serde_json::Value {
    respond(req, || {
        let year = get_required_i64(&req.params, "year")?;
        let month = get_required_i64(&req.params, "month")?;
        let session = session_mut(state)?;
        let model = reports::finance(session, year, month)?;
        Ok(json!(model))
    })
}

fn parse_scope(params: &serde_json::Value) -> Result<DisciplineScope, HandlerErr> {
    match params.get("scope") {
        None | Some(serde_json::Value::Null) => Ok(DisciplineScope::default()),
        Some(v) => serde_json::from_value(v.clone())
            .map_err(|_| HandlerErr::bad_params("scope must be \"month\" or \"year\"")),
    }
}

fn handle_discipline(state: &mut AppState, req: &Request) -> serde_json::Value {
    respond(req, || {
        let year = get_required_i64(&req.params, "year")?;
        let month = get_optional_i64(&req.params, "month")?;
        let day = get_optional_i64(&req.params, "day")?;
        // Without a month there is only the whole year to look at.
        let scope = match month {
            None => DisciplineScope::Year,
            Some(_) => parse_scope(&req.params)?,
        };
        let window = TimeWindow::new(year, month, day).map_err(DashboardError::from)?;
        let class = get_optional_str(&req.params, "class");
        let student = get_optional_str(&req.params, "student");
        let session = session_mut(state)?;
        let model = reports::discipline(session, window, class.as_deref(), student.as_deref(), scope);
        Ok(json!(model))
    })
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "reports.dashboard" => Some(handle_dashboard(state, req)),
        "reports.finance" => Some(handle_finance(state, req)),
        "reports.discipline" => Some(handle_discipline(state, req)),
        _ => None,
    }
}
