//! Logging API routes.
//!
//! View and change the active log filter at runtime.

use axum::{Json, Router, extract::State, routing::get};

use crate::api::error::{ApiError, ApiResult};
use crate::api::server::AppState;
use crate::logging::available_modules;

/// Request to update the log filter.
#[derive(Debug, serde::Deserialize, utoipa::ToSchema)]
pub struct UpdateLogFilterRequest {
    pub filter: String,
}

/// Response for logging configuration.
#[derive(Debug, serde::Serialize, utoipa::ToSchema)]
pub struct LoggingConfigResponse {
    pub filter: String,
    pub available_modules: Vec<ModuleInfo>,
}

/// Information about an available logging module.
#[derive(Debug, serde::Serialize, utoipa::ToSchema)]
pub struct ModuleInfo {
    pub name: String,
    pub description: String,
}

/// Create the logging router.
pub fn router() -> Router<AppState> {
    Router::new().route("/filter", get(get_log_filter).put(update_log_filter))
}

fn modules() -> Vec<ModuleInfo> {
    available_modules()
        .into_iter()
        .map(|(name, desc)| ModuleInfo {
            name: name.to_string(),
            description: desc.to_string(),
        })
        .collect()
}

#[utoipa::path(
    get,
    path = "/api/logging/filter",
    tag = "logging",
    responses(
        (status = 200, description = "Current logging configuration", body = LoggingConfigResponse)
    )
)]
pub async fn get_log_filter(State(state): State<AppState>) -> ApiResult<Json<LoggingConfigResponse>> {
    let logging_config = state
        .logging_config
        .as_ref()
        .ok_or_else(|| ApiError::service_unavailable("Logging configuration not available"))?;

    Ok(Json(LoggingConfigResponse {
        filter: logging_config.get_filter(),
        available_modules: modules(),
    }))
}

#[utoipa::path(
    put,
    path = "/api/logging/filter",
    tag = "logging",
    request_body = UpdateLogFilterRequest,
    responses(
        (status = 200, description = "Logging configuration updated", body = LoggingConfigResponse),
        (status = 422, description = "Invalid filter", body = crate::api::error::ApiErrorResponse)
    )
)]
pub async fn update_log_filter(
    State(state): State<AppState>,
    Json(request): Json<UpdateLogFilterRequest>,
) -> ApiResult<Json<LoggingConfigResponse>> {
    let logging_config = state
        .logging_config
        .as_ref()
        .ok_or_else(|| ApiError::service_unavailable("Logging configuration not available"))?;

    logging_config.set_filter(&request.filter)?;

    Ok(Json(LoggingConfigResponse {
        filter: logging_config.get_filter(),
        available_modules: modules(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    #[test]
    fn test_logging_config_response_serialization() {
        let response = LoggingConfigResponse {
            filter: "courier=debug".to_string(),
            available_modules: vec![ModuleInfo {
                name: "courier".to_string(),
                description: "Main application".to_string(),
            }],
        };

        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["filter"], "courier=debug");
        assert_eq!(json["available_modules"][0]["name"], "courier");
    }

    #[tokio::test]
    async fn test_filter_unavailable_without_logging() {
        let response = router()
            .with_state(AppState::new())
            .oneshot(Request::get("/filter").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
