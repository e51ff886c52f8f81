use super::{parse_params, respond};
use crate::error::DashboardError;
use crate::forecast::{self, ForecastForm};
use crate::ipc::types::{AppState, Request};
use serde_json::json;

fn handle_features(_state: &mut AppState, req: &Request) -> serde_json::Value {
    respond(req, || {
        let form: ForecastForm = parse_params(&req.params)?;
        let features = forecast::encode_features(&form).map_err(DashboardError::from)?;
        Ok(json!({ "features": features.named() }))
    })
}

fn handle_predict(state: &mut AppState, req: &Request) -> serde_json::Value {
    respond(req, || {
        let form: ForecastForm = parse_params(&req.params)?;
        let features = forecast::encode_features(&form).map_err(DashboardError::from)?;
        let model_path = state.config.forecast.model_path.clone();
        let model = state
            .model
            .get_or_load(model_path.as_deref())
            .map_err(DashboardError::from)?;
        let position = forecast::predict_position(model, &features).map_err(DashboardError::from)?;
        Ok(json!({
            "position": position,
            "message": format!("Predicted position: {}", position),
        }))
    })
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "forecast.features" => Some(handle_features(state, req)),
        "forecast.predict" => Some(handle_predict(state, req)),
        _ => None,
    }
}
