use super::{parse_params, respond, session_mut};
use crate::entries;
use crate::ipc::types::{AppState, Request};
use crate::validate::{AdmissionForm, DailyForm, ExamForm};
use serde_json::json;

fn handle_daily_submit(state: &mut AppState, req: &Request) -> serde_json::Value {
    respond(req, || {
        let form: DailyForm = parse_params(&req.params)?;
        let policy = state.config.validation.duplicate_policy();
        let session = session_mut(state)?;
        let receipt = entries::submit_daily(session, &form, policy)?;
        Ok(json!(receipt))
    })
}

fn handle_exams_submit(state: &mut AppState, req: &Request) -> serde_json::Value {
    respond(req, || {
        let form: ExamForm = parse_params(&req.params)?;
        let policy = state.config.validation.duplicate_policy();
        let session = session_mut(state)?;
        let receipt = entries::submit_exam(session, &form, policy)?;
        Ok(json!(receipt))
    })
}

fn handle_admissions_submit(state: &mut AppState, req: &Request) -> serde_json::Value {
    respond(req, || {
        let form: AdmissionForm = parse_params(&req.params)?;
        let policy = state.config.validation.duplicate_policy();
        let session = session_mut(state)?;
        let receipt = entries::submit_admission(session, &form, policy)?;
        Ok(json!(receipt))
    })
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "daily.submit" => Some(handle_daily_submit(state, req)),
        "exams.submit" => Some(handle_exams_submit(state, req)),
        "admissions.submit" => Some(handle_admissions_submit(state, req)),
        _ => None,
    }
}
