use crate::aggregate::WindowError;
use crate::forecast::ForecastError;
use crate::store::StoreError;
use crate::validate::ValidationError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DashboardError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("failed to append to {sheet}: {source}")]
    StoreWrite {
        sheet: String,
        #[source]
        source: StoreError,
    },
    #[error("failed to read {sheet}: {source}")]
    StoreRead {
        sheet: String,
        #[source]
        source: StoreError,
    },
    #[error(transparent)]
    Forecast(#[from] ForecastError),
    #[error(transparent)]
    Window(#[from] WindowError),
}

impl DashboardError {
    /// Stable code reported in IPC error envelopes.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation_failed",
            Self::StoreWrite { .. } => "store_write_failed",
            Self::StoreRead { .. } => "store_read_failed",
            Self::Forecast(ForecastError::ModelUnavailable(_)) => "model_unavailable",
            Self::Forecast(ForecastError::InvalidInput(_)) => "bad_params",
            Self::Forecast(ForecastError::BadOutput) => "prediction_failed",
            Self::Window(_) => "bad_params",
        }
    }

    pub fn details(&self) -> Option<serde_json::Value> {
        match self {
            Self::Validation(e) => e.details(),
            Self::StoreWrite { sheet, .. } | Self::StoreRead { sheet, .. } => {
                Some(serde_json::json!({ "sheet": sheet }))
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable() {
        let e: DashboardError = ValidationError::MarksExceedTotal.into();
        assert_eq!(e.code(), "validation_failed");
        assert_eq!(e.to_string(), "Obtained marks are greater than total marks.");

        let e = DashboardError::StoreWrite {
            sheet: "full-dataset".to_string(),
            source: StoreError::Unavailable("offline".to_string()),
        };
        assert_eq!(e.code(), "store_write_failed");
        assert_eq!(e.details(), Some(serde_json::json!({ "sheet": "full-dataset" })));

        let e: DashboardError = ForecastError::ModelUnavailable("gone".to_string()).into();
        assert_eq!(e.code(), "model_unavailable");
        let e: DashboardError = WindowError::Month(13).into();
        assert_eq!(e.code(), "bad_params");
    }
}
