//! Click-tracking redirect.

use axum::{
    Router,
    extract::{Path, Query, State},
    response::Redirect,
    routing::get,
};
use serde::Deserialize;
use tracing::debug;
use url::Url;

use crate::api::error::{ApiError, ApiResult};
use crate::api::server::AppState;
use crate::notification::tracking::{decode_target, verify_token};

pub fn router() -> Router<AppState> {
    Router::new().route("/track/{history_id}/{cta_index}", get(track_click))
}

#[derive(Debug, Deserialize, utoipa::IntoParams)]
#[into_params(parameter_in = Query)]
pub struct TrackQuery {
    /// Tracking token issued with the notification.
    pub token: Option<String>,
    /// Base64url encoded target URL.
    pub url: Option<String>,
}

#[utoipa::path(
    get,
    path = "/api/v1/notification/track/{history_id}/{cta_index}",
    tag = "tracking",
    params(
        ("history_id" = String, Path, description = "History record ID"),
        ("cta_index" = usize, Path, description = "Zero-based CTA position"),
        TrackQuery
    ),
    responses(
        (status = 307, description = "Redirect to the original CTA target"),
        (status = 400, description = "Bad CTA index, or target URL not issued for that CTA", body = crate::api::error::ApiErrorResponse),
        (status = 403, description = "Token mismatch", body = crate::api::error::ApiErrorResponse),
        (status = 404, description = "Unknown history record", body = crate::api::error::ApiErrorResponse)
    )
)]
pub async fn track_click(
    State(state): State<AppState>,
    Path((history_id, cta_index)): Path<(String, usize)>,
    Query(query): Query<TrackQuery>,
) -> ApiResult<Redirect> {
    let history = &state.repositories()?.history;
    let record = history.get_record(&history_id).await?;

    let token = query.token.unwrap_or_default();
    if token.is_empty() || !verify_token(&token, &record.tracking_token_hash) {
        return Err(ApiError::forbidden("Invalid tracking token"));
    }

    let encoded = query
        .url
        .ok_or_else(|| ApiError::bad_request("Missing target url"))?;
    let target = decode_target(&encoded).map_err(|e| ApiError::bad_request(e.to_string()))?;

    let out_of_range = || ApiError::bad_request(format!("CTA index {cta_index} out of range"));
    let cta = record.cta_clicks.get(cta_index).ok_or_else(out_of_range)?;
    if !is_tracked_target(&cta.url, &target) {
        return Err(ApiError::bad_request("Target url does not match the CTA"));
    }
    if !history.increment_click(&history_id, cta_index).await? {
        return Err(out_of_range());
    }

    debug!(history_id = %history_id, cta_index, url = %target, "Tracked CTA click");
    Ok(Redirect::temporary(target.as_str()))
}

/// Compare after parsing so both sides share `url`'s normalization.
fn is_tracked_target(stored: &str, target: &Url) -> bool {
    Url::parse(stored).is_ok_and(|stored| stored == *target)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::models::{ChannelType, HistoryDbModel, QueueItemDbModel};
    use crate::database::repositories::Repositories;
    use crate::database::test_pool;
    use crate::notification::ManualClock;
    use crate::notification::tracking::{generate_token, hash_token, tracking_url};
    use axum::body::Body;
    use axum::http::{Request, StatusCode, header};
    use serde_json::json;
    use std::sync::Arc;
    use tower::ServiceExt;

    struct Fixture {
        app: Router,
        repositories: Repositories,
        history_id: String,
        token: String,
    }

    async fn fixture() -> Fixture {
        let pool = test_pool().await;
        let repositories = Repositories::sqlx(pool.clone());
        let item = QueueItemDbModel::new("e", "org", "ch", "r", json!({}), 1);
        repositories.queue.enqueue(&item).await.unwrap();

        let token = generate_token();
        let record = HistoryDbModel::pending(
            &item,
            ChannelType::Email,
            "subject",
            "body",
            vec![
                ("Track".to_string(), "https://shop.example/".to_string()),
                ("Help".to_string(), "https://shop.example/help".to_string()),
            ],
            hash_token(&token),
            1,
        );
        repositories.history.create_record(&record).await.unwrap();

        let state = AppState::with_database(pool, Arc::new(ManualClock::new(1)));
        Fixture {
            app: router().with_state(state),
            repositories,
            history_id: record.id,
            token,
        }
    }

    fn path(url: &str) -> String {
        url.trim_start_matches("http://host/api/v1/notification").to_string()
    }

    async fn get(app: &Router, uri: &str) -> axum::response::Response {
        app.clone()
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_redirect_counts_click() {
        let f = fixture().await;
        let url = tracking_url("http://host", &f.history_id, 1, &f.token, "https://shop.example/help");

        let response = get(&f.app, &path(&url)).await;
        assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
        assert_eq!(
            response.headers()[header::LOCATION],
            "https://shop.example/help"
        );

        let record = f.repositories.history.get_record(&f.history_id).await.unwrap();
        assert_eq!(record.cta_clicks[0].click_count, 0);
        assert_eq!(record.cta_clicks[1].click_count, 1);
    }

    #[tokio::test]
    async fn test_wrong_token_is_forbidden() {
        let f = fixture().await;
        let url = tracking_url("http://host", &f.history_id, 0, "forged", "https://shop.example");
        assert_eq!(get(&f.app, &path(&url)).await.status(), StatusCode::FORBIDDEN);

        let record = f.repositories.history.get_record(&f.history_id).await.unwrap();
        assert_eq!(record.cta_clicks[0].click_count, 0);
    }

    #[tokio::test]
    async fn test_unknown_record_is_not_found() {
        let f = fixture().await;
        let url = tracking_url("http://host", "missing", 0, &f.token, "https://shop.example");
        assert_eq!(get(&f.app, &path(&url)).await.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_bad_index_and_target() {
        let f = fixture().await;
        let url = tracking_url("http://host", &f.history_id, 7, &f.token, "https://shop.example");
        assert_eq!(get(&f.app, &path(&url)).await.status(), StatusCode::BAD_REQUEST);

        let url = tracking_url("http://host", &f.history_id, 0, &f.token, "javascript:alert(1)");
        assert_eq!(get(&f.app, &path(&url)).await.status(), StatusCode::BAD_REQUEST);

        let url = tracking_url("http://host", &f.history_id, 2, &f.token, "https://shop.example");
        assert_eq!(get(&f.app, &path(&url)).await.status(), StatusCode::BAD_REQUEST);

        let uri = format!("/track/{}/0?token={}", f.history_id, f.token);
        assert_eq!(get(&f.app, &uri).await.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_valid_token_cannot_redirect_elsewhere() {
        let f = fixture().await;

        let url = tracking_url("http://host", &f.history_id, 1, &f.token, "https://evil.example/");
        assert_eq!(get(&f.app, &path(&url)).await.status(), StatusCode::BAD_REQUEST);

        // Another CTA's target on the wrong index is refused too.
        let url = tracking_url("http://host", &f.history_id, 0, &f.token, "https://shop.example/help");
        assert_eq!(get(&f.app, &path(&url)).await.status(), StatusCode::BAD_REQUEST);

        let record = f.repositories.history.get_record(&f.history_id).await.unwrap();
        assert!(record.cta_clicks.iter().all(|c| c.click_count == 0));
    }
}
