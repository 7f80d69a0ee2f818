//! In-app notification feed endpoints.

use axum::{
    Json,
    extract::{Extension, Path, Query},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use std::sync::Arc;
use tracing::error;
use uuid::Uuid;

use crate::applications::ApplicationTracker;

use super::admin::{AdminToken, require_admin};
use super::types::{Cleared, MarkedRead, NotificationView, NotificationsQuery, UnreadCount};

fn feed_failure(context: &str, err: &anyhow::Error) -> axum::response::Response {
    error!("{context}: {err:#}");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        "Notification feed unavailable".to_string(),
    )
        .into_response()
}

#[utoipa::path(
    get,
    path = "/v1/applications/{id}/notifications",
    params(
        ("id" = Uuid, Path, description = "Application id"),
        NotificationsQuery
    ),
    responses(
        (status = 200, description = "Notifications, newest first", body = [NotificationView])
    ),
    tag = "notifications"
)]
pub async fn list(
    tracker: Extension<Arc<ApplicationTracker>>,
    Path(id): Path<Uuid>,
    Query(query): Query<NotificationsQuery>,
) -> impl IntoResponse {
    match tracker.notifications(id, query.unread_only).await {
        Ok(notifications) => Json(
            notifications
                .into_iter()
                .map(NotificationView::from)
                .collect::<Vec<_>>(),
        )
        .into_response(),
        Err(err) => feed_failure("Failed to list notifications", &err),
    }
}

#[utoipa::path(
    get,
    path = "/v1/applications/{id}/notifications/unread-count",
    params(("id" = Uuid, Path, description = "Application id")),
    responses(
        (status = 200, description = "Unread notifications", body = UnreadCount)
    ),
    tag = "notifications"
)]
pub async fn unread_count(
    tracker: Extension<Arc<ApplicationTracker>>,
    Path(id): Path<Uuid>,
) -> impl IntoResponse {
    match tracker.unread_count(id).await {
        Ok(count) => Json(UnreadCount { count }).into_response(),
        Err(err) => feed_failure("Failed to count unread notifications", &err),
    }
}

#[utoipa::path(
    post,
    path = "/v1/applications/{id}/notifications/read-all",
    params(("id" = Uuid, Path, description = "Application id")),
    responses(
        (status = 200, description = "Notifications marked read", body = MarkedRead)
    ),
    tag = "notifications"
)]
pub async fn mark_all_read(
    tracker: Extension<Arc<ApplicationTracker>>,
    Path(id): Path<Uuid>,
) -> impl IntoResponse {
    match tracker.mark_all_read(id).await {
        Ok(updated) => Json(MarkedRead { updated }).into_response(),
        Err(err) => feed_failure("Failed to mark notifications read", &err),
    }
}

#[utoipa::path(
    post,
    path = "/v1/notifications/{id}/read",
    params(("id" = Uuid, Path, description = "Notification id")),
    responses(
        (status = 204, description = "Notification marked read"),
        (status = 404, description = "Notification not found", body = String)
    ),
    tag = "notifications"
)]
pub async fn mark_read(
    tracker: Extension<Arc<ApplicationTracker>>,
    Path(id): Path<Uuid>,
) -> impl IntoResponse {
    match tracker.mark_read(id).await {
        Ok(true) => StatusCode::NO_CONTENT.into_response(),
        Ok(false) => {
            (StatusCode::NOT_FOUND, "Notification not found".to_string()).into_response()
        }
        Err(err) => feed_failure("Failed to mark notification read", &err),
    }
}

#[utoipa::path(
    delete,
    path = "/v1/admin/applications/{id}/notifications",
    params(("id" = Uuid, Path, description = "Application id")),
    responses(
        (status = 200, description = "Feed cleared", body = Cleared),
        (status = 401, description = "Missing bearer token"),
        (status = 403, description = "Wrong bearer token")
    ),
    security(("bearer" = [])),
    tag = "admin"
)]
pub async fn clear(
    headers: HeaderMap,
    tracker: Extension<Arc<ApplicationTracker>>,
    admin: Extension<AdminToken>,
    Path(id): Path<Uuid>,
) -> impl IntoResponse {
    if let Err(status) = require_admin(&headers, &admin) {
        return status.into_response();
    }

    match tracker.clear_notifications(id).await {
        Ok(deleted) => Json(Cleared { deleted }).into_response(),
        Err(err) => feed_failure("Failed to clear notifications", &err),
    }
}
