//! OpenAPI documentation configuration.
//!
//! This module configures OpenAPI 3.0 specification generation using `utoipa`
//! and serves Swagger UI for interactive API exploration.

use utoipa::OpenApi;

use crate::api::routes::health::{ComponentHealth, HealthResponse};
use crate::api::routes::logging::{LoggingConfigResponse, ModuleInfo, UpdateLogFilterRequest};
use crate::api::routes::notifications::{
    CreateChannelRequest, CreateRoutingRuleRequest, CreateSenderRequest, CreateTemplateRequest,
    TriggerRequest,
};
use crate::database::models::{
    ChannelDbModel, ChannelSettings, ChannelType, Cta, CtaClick, HistoryDbModel, HistoryStatus,
    QueueItemDbModel, QueueStatus, RoutingRuleDbModel, SenderCredentials, SenderDbModel,
    TemplateDbModel,
};
use crate::notification::TriggerOutcome;

/// Liveness check response.
#[derive(Debug, Clone, serde::Serialize, utoipa::ToSchema)]
pub struct LivenessResponse {
    /// Status indicator (always "alive" if responding)
    pub status: String,
    /// Server uptime in seconds
    pub uptime_secs: u64,
}

/// OpenAPI documentation for the courier API.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "courier API",
        version = "0.1.0",
        description = "REST API for courier. Triggers events, manages notification channels, senders, templates and routing rules, and exposes delivery queue and history.",
        license(name = "MIT OR Apache-2.0")
    ),
    servers(
        (url = "http://localhost:12580", description = "Local development server")
    ),
    tags(
        (name = "health", description = "Health check endpoints for monitoring and orchestration"),
        (name = "notifications", description = "Event trigger and notification administration endpoints"),
        (name = "tracking", description = "CTA click-tracking redirect"),
        (name = "logging", description = "Logging configuration endpoints")
    ),
    paths(
        // Health endpoints
        crate::api::routes::health::health_check,
        crate::api::routes::health::liveness_check,
        // Notification endpoints
        crate::api::routes::notifications::trigger_event,
        crate::api::routes::notifications::list_channels,
        crate::api::routes::notifications::get_channel,
        crate::api::routes::notifications::create_channel,
        crate::api::routes::notifications::delete_channel,
        crate::api::routes::notifications::list_senders,
        crate::api::routes::notifications::create_sender,
        crate::api::routes::notifications::list_templates,
        crate::api::routes::notifications::create_template,
        crate::api::routes::notifications::list_rules,
        crate::api::routes::notifications::create_rule,
        crate::api::routes::notifications::list_queue,
        crate::api::routes::notifications::get_queue_item,
        crate::api::routes::notifications::list_history,
        crate::api::routes::notifications::get_history,
        // Tracking
        crate::api::routes::tracking::track_click,
        // Logging endpoints
        crate::api::routes::logging::get_log_filter,
        crate::api::routes::logging::update_log_filter,
    ),
    components(
        schemas(
            // Health schemas
            HealthResponse,
            ComponentHealth,
            LivenessResponse,
            // Error schema
            crate::api::error::ApiErrorResponse,
            // Notification schemas
            TriggerRequest,
            TriggerOutcome,
            CreateChannelRequest,
            CreateSenderRequest,
            CreateTemplateRequest,
            CreateRoutingRuleRequest,
            ChannelDbModel,
            ChannelSettings,
            ChannelType,
            SenderDbModel,
            SenderCredentials,
            TemplateDbModel,
            Cta,
            RoutingRuleDbModel,
            QueueItemDbModel,
            QueueStatus,
            HistoryDbModel,
            HistoryStatus,
            CtaClick,
            // Logging schemas
            UpdateLogFilterRequest,
            LoggingConfigResponse,
            ModuleInfo,
        )
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_lists_notification_paths() {
        let doc = ApiDoc::openapi();
        let paths: Vec<_> = doc.paths.paths.keys().cloned().collect();
        assert!(paths.contains(&"/api/v1/notification/trigger".to_string()));
        assert!(paths.contains(&"/api/v1/notification/track/{history_id}/{cta_index}".to_string()));
        assert!(paths.contains(&"/health/live".to_string()));
    }
}
