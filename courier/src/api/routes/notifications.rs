//! Notification routes: event trigger plus channel, sender, template,
//! routing rule, queue and history administration.

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
};
use serde::Deserialize;
use serde_json::Value;

use crate::api::error::{ApiError, ApiResult};
use crate::api::server::AppState;
use crate::database::models::{
    ChannelDbModel, ChannelSettings, ChannelType, Cta, HistoryDbModel, QueueItemDbModel,
    QueueStatus, RoutingRuleDbModel, SenderCredentials, SenderDbModel, TemplateDbModel,
};
use crate::notification::TriggerOutcome;

/// Default page size for list endpoints.
const DEFAULT_LIST_LIMIT: i64 = 50;
const MAX_LIST_LIMIT: i64 = 500;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/trigger", post(trigger_event))
        .route("/channels", get(list_channels).post(create_channel))
        .route("/channels/{id}", get(get_channel).delete(delete_channel))
        .route("/senders", get(list_senders).post(create_sender))
        .route("/templates", get(list_templates).post(create_template))
        .route("/routing-rules", get(list_rules).post(create_rule))
        .route("/queue", get(list_queue))
        .route("/queue/{id}", get(get_queue_item))
        .route("/history", get(list_history))
        .route("/history/{id}", get(get_history))
}

// DTOs

#[derive(Debug, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TriggerRequest {
    pub event_type: String,
    /// Template variables. Defaults to `{}`.
    #[serde(default)]
    #[schema(value_type = Object)]
    pub payload: Option<Value>,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateChannelRequest {
    pub organization_id: String,
    pub name: String,
    pub settings: ChannelSettings,
    /// Ordered sender preference list.
    #[serde(default)]
    pub sender_ids: Vec<String>,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateSenderRequest {
    pub name: String,
    /// Omit for a global fallback sender.
    pub organization_id: Option<String>,
    pub credentials: SenderCredentials,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateTemplateRequest {
    pub event_type: String,
    pub channel_type: ChannelType,
    /// Omit for the global template.
    pub organization_id: Option<String>,
    pub name: Option<String>,
    #[serde(default)]
    pub subject: String,
    pub content: String,
    #[serde(default)]
    pub variables: Vec<String>,
    #[serde(default)]
    pub ctas: Vec<Cta>,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateRoutingRuleRequest {
    pub event_type: String,
    pub organization_ids: Vec<String>,
    /// Restrict to these channel types. Omit for all.
    pub channel_types: Option<Vec<ChannelType>>,
    pub description: Option<String>,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub is_system: bool,
}

#[derive(Debug, Deserialize, utoipa::IntoParams)]
#[into_params(parameter_in = Query)]
pub struct QueueQuery {
    pub status: Option<QueueStatus>,
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize, utoipa::IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query, rename_all = "camelCase")]
pub struct HistoryQuery {
    pub queue_item_id: Option<String>,
    pub limit: Option<i64>,
}

fn list_limit(limit: Option<i64>) -> i64 {
    limit.unwrap_or(DEFAULT_LIST_LIMIT).clamp(1, MAX_LIST_LIMIT)
}

fn require(field: &str, value: &str) -> ApiResult<()> {
    if value.trim().is_empty() {
        return Err(ApiError::validation(format!("{field} must not be empty")));
    }
    Ok(())
}

// Handlers

#[utoipa::path(
    post,
    path = "/api/v1/notification/trigger",
    tag = "notifications",
    request_body = TriggerRequest,
    responses(
        (status = 200, description = "Event routed and queued", body = TriggerOutcome),
        (status = 422, description = "Invalid request", body = crate::api::error::ApiErrorResponse)
    )
)]
pub async fn trigger_event(
    State(state): State<AppState>,
    Json(request): Json<TriggerRequest>,
) -> ApiResult<Json<TriggerOutcome>> {
    let payload = request
        .payload
        .filter(|p| !p.is_null())
        .unwrap_or_else(|| Value::Object(Default::default()));
    let outcome = state
        .trigger_service()?
        .trigger(&request.event_type, payload)
        .await?;
    Ok(Json(outcome))
}

#[utoipa::path(
    get,
    path = "/api/v1/notification/channels",
    tag = "notifications",
    responses((status = 200, description = "List of channels", body = Vec<ChannelDbModel>))
)]
pub async fn list_channels(State(state): State<AppState>) -> ApiResult<Json<Vec<ChannelDbModel>>> {
    Ok(Json(state.repositories()?.channels.list_channels().await?))
}

#[utoipa::path(
    get,
    path = "/api/v1/notification/channels/{id}",
    tag = "notifications",
    params(("id" = String, Path, description = "Channel ID")),
    responses(
        (status = 200, description = "Channel details", body = ChannelDbModel),
        (status = 404, description = "Channel not found", body = crate::api::error::ApiErrorResponse)
    )
)]
pub async fn get_channel(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<ChannelDbModel>> {
    Ok(Json(state.repositories()?.channels.get_channel(&id).await?))
}

#[utoipa::path(
    post,
    path = "/api/v1/notification/channels",
    tag = "notifications",
    request_body = CreateChannelRequest,
    responses(
        (status = 201, description = "Channel created", body = ChannelDbModel),
        (status = 422, description = "Invalid channel", body = crate::api::error::ApiErrorResponse)
    )
)]
pub async fn create_channel(
    State(state): State<AppState>,
    Json(request): Json<CreateChannelRequest>,
) -> ApiResult<(StatusCode, Json<ChannelDbModel>)> {
    require("organizationId", &request.organization_id)?;
    require("name", &request.name)?;
    if let ChannelSettings::Webhook { webhook_url, .. } = &request.settings {
        let parsed = url::Url::parse(webhook_url)
            .map_err(|e| ApiError::validation(format!("invalid webhookUrl: {e}")))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ApiError::validation("webhookUrl must be http or https"));
        }
    }

    let mut channel = ChannelDbModel::new(
        request.organization_id,
        request.name,
        request.settings,
        request.sender_ids,
    );
    channel.is_active = request.is_active;

    state.repositories()?.channels.create_channel(&channel).await?;
    Ok((StatusCode::CREATED, Json(channel)))
}

#[utoipa::path(
    delete,
    path = "/api/v1/notification/channels/{id}",
    tag = "notifications",
    params(("id" = String, Path, description = "Channel ID")),
    responses(
        (status = 204, description = "Channel deleted"),
        (status = 404, description = "Channel not found", body = crate::api::error::ApiErrorResponse)
    )
)]
pub async fn delete_channel(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    state.repositories()?.channels.delete_channel(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    get,
    path = "/api/v1/notification/senders",
    tag = "notifications",
    responses((status = 200, description = "List of senders, secrets masked", body = Vec<SenderDbModel>))
)]
pub async fn list_senders(State(state): State<AppState>) -> ApiResult<Json<Vec<SenderDbModel>>> {
    let senders = state.repositories()?.senders.list_senders().await?;
    Ok(Json(senders.into_iter().map(SenderDbModel::redacted).collect()))
}

#[utoipa::path(
    post,
    path = "/api/v1/notification/senders",
    tag = "notifications",
    request_body = CreateSenderRequest,
    responses(
        (status = 201, description = "Sender created, secrets masked", body = SenderDbModel),
        (status = 422, description = "Invalid sender", body = crate::api::error::ApiErrorResponse)
    )
)]
pub async fn create_sender(
    State(state): State<AppState>,
    Json(request): Json<CreateSenderRequest>,
) -> ApiResult<(StatusCode, Json<SenderDbModel>)> {
    require("name", &request.name)?;
    match &request.credentials {
        SenderCredentials::Smtp {
            smtp_host,
            from_email,
            ..
        } => {
            require("smtpHost", smtp_host)?;
            require("fromEmail", from_email)?;
        }
        SenderCredentials::TelegramBot { bot_token, .. } => require("botToken", bot_token)?,
    }

    let mut sender = SenderDbModel::new(
        request.name,
        request.organization_id.filter(|id| !id.trim().is_empty()),
        request.credentials,
    );
    sender.is_active = request.is_active;

    state.repositories()?.senders.create_sender(&sender).await?;
    Ok((StatusCode::CREATED, Json(sender.redacted())))
}

#[utoipa::path(
    get,
    path = "/api/v1/notification/templates",
    tag = "notifications",
    responses((status = 200, description = "List of templates", body = Vec<TemplateDbModel>))
)]
pub async fn list_templates(State(state): State<AppState>) -> ApiResult<Json<Vec<TemplateDbModel>>> {
    Ok(Json(state.repositories()?.templates.list_templates().await?))
}

#[utoipa::path(
    post,
    path = "/api/v1/notification/templates",
    tag = "notifications",
    request_body = CreateTemplateRequest,
    responses(
        (status = 201, description = "Template created", body = TemplateDbModel),
        (status = 422, description = "Invalid template", body = crate::api::error::ApiErrorResponse)
    )
)]
pub async fn create_template(
    State(state): State<AppState>,
    Json(request): Json<CreateTemplateRequest>,
) -> ApiResult<(StatusCode, Json<TemplateDbModel>)> {
    require("eventType", &request.event_type)?;
    require("content", &request.content)?;

    let mut template = TemplateDbModel::new(
        request.event_type.trim(),
        request.channel_type,
        request.organization_id.filter(|id| !id.trim().is_empty()),
        request.subject,
        request.content,
        request.variables,
    )
    .with_ctas(request.ctas);
    if let Some(name) = request.name.filter(|n| !n.trim().is_empty()) {
        template.name = name;
    }
    template.is_active = request.is_active;

    state.repositories()?.templates.create_template(&template).await?;
    Ok((StatusCode::CREATED, Json(template)))
}

#[utoipa::path(
    get,
    path = "/api/v1/notification/routing-rules",
    tag = "notifications",
    responses((status = 200, description = "List of routing rules", body = Vec<RoutingRuleDbModel>))
)]
pub async fn list_rules(State(state): State<AppState>) -> ApiResult<Json<Vec<RoutingRuleDbModel>>> {
    Ok(Json(state.repositories()?.routing_rules.list_rules().await?))
}

#[utoipa::path(
    post,
    path = "/api/v1/notification/routing-rules",
    tag = "notifications",
    request_body = CreateRoutingRuleRequest,
    responses(
        (status = 201, description = "Routing rule created", body = RoutingRuleDbModel),
        (status = 422, description = "Invalid rule", body = crate::api::error::ApiErrorResponse)
    )
)]
pub async fn create_rule(
    State(state): State<AppState>,
    Json(request): Json<CreateRoutingRuleRequest>,
) -> ApiResult<(StatusCode, Json<RoutingRuleDbModel>)> {
    require("eventType", &request.event_type)?;
    if request.organization_ids.iter().all(|id| id.trim().is_empty()) {
        return Err(ApiError::validation("organizationIds must not be empty"));
    }

    let organization_ids = request
        .organization_ids
        .into_iter()
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty())
        .collect();
    let mut rule = RoutingRuleDbModel::new(
        request.event_type.trim(),
        organization_ids,
        request.channel_types,
    );
    rule.description = request.description;
    rule.is_active = request.is_active;
    rule.is_system = request.is_system;

    state.repositories()?.routing_rules.create_rule(&rule).await?;
    Ok((StatusCode::CREATED, Json(rule)))
}

#[utoipa::path(
    get,
    path = "/api/v1/notification/queue",
    tag = "notifications",
    params(QueueQuery),
    responses((status = 200, description = "Queue items, newest first", body = Vec<QueueItemDbModel>))
)]
pub async fn list_queue(
    State(state): State<AppState>,
    Query(query): Query<QueueQuery>,
) -> ApiResult<Json<Vec<QueueItemDbModel>>> {
    let items = state
        .repositories()?
        .queue
        .list_items(query.status, list_limit(query.limit))
        .await?;
    Ok(Json(items))
}

#[utoipa::path(
    get,
    path = "/api/v1/notification/queue/{id}",
    tag = "notifications",
    params(("id" = String, Path, description = "Queue item ID")),
    responses(
        (status = 200, description = "Queue item", body = QueueItemDbModel),
        (status = 404, description = "Queue item not found", body = crate::api::error::ApiErrorResponse)
    )
)]
pub async fn get_queue_item(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<QueueItemDbModel>> {
    Ok(Json(state.repositories()?.queue.get_item(&id).await?))
}

#[utoipa::path(
    get,
    path = "/api/v1/notification/history",
    tag = "notifications",
    params(HistoryQuery),
    responses((status = 200, description = "History records, newest first", body = Vec<HistoryDbModel>))
)]
pub async fn list_history(
    State(state): State<AppState>,
    Query(query): Query<HistoryQuery>,
) -> ApiResult<Json<Vec<HistoryDbModel>>> {
    let records = state
        .repositories()?
        .history
        .list_records(query.queue_item_id.as_deref(), list_limit(query.limit))
        .await?;
    Ok(Json(records))
}

#[utoipa::path(
    get,
    path = "/api/v1/notification/history/{id}",
    tag = "notifications",
    params(("id" = String, Path, description = "History record ID")),
    responses(
        (status = 200, description = "History record", body = HistoryDbModel),
        (status = 404, description = "History record not found", body = crate::api::error::ApiErrorResponse)
    )
)]
pub async fn get_history(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<HistoryDbModel>> {
    Ok(Json(state.repositories()?.history.get_record(&id).await?))
}
