//! Candidate submission, login and admin review endpoints.

use axum::{
    Json,
    extract::{Extension, Path, Query},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use std::sync::Arc;
use tracing::error;
use uuid::Uuid;

use crate::applications::{
    ApplicationError, ApplicationStatus, ApplicationTracker, ChangeOutcome, NewApplication,
    SubmitOutcome,
};

use super::admin::{AdminToken, require_admin};
use super::types::{
    ApplicationCreated, ApplicationView, ListApplicationsQuery, LoginRequest,
    StatusChangeRequest, SubmitApplicationRequest,
};

#[utoipa::path(
    post,
    path = "/v1/applications",
    request_body = SubmitApplicationRequest,
    responses(
        (status = 201, description = "Application stored", body = ApplicationCreated),
        (status = 400, description = "Invalid input", body = String),
        (status = 409, description = "Email already registered", body = String)
    ),
    tag = "applications"
)]
pub async fn submit(
    tracker: Extension<Arc<ApplicationTracker>>,
    payload: Option<Json<SubmitApplicationRequest>>,
) -> impl IntoResponse {
    let request: SubmitApplicationRequest = match payload {
        Some(Json(payload)) => payload,
        None => return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response(),
    };

    let new = NewApplication {
        name: request.name,
        email: request.email,
        phone: request.phone,
        domain: request.domain,
        password: request.password,
    };

    match tracker.submit(new).await {
        Ok(SubmitOutcome::Created(id)) => {
            (StatusCode::CREATED, Json(ApplicationCreated { id })).into_response()
        }
        Ok(SubmitOutcome::Conflict) => (
            StatusCode::CONFLICT,
            "Email already registered".to_string(),
        )
            .into_response(),
        Err(ApplicationError::Invalid(message)) => {
            (StatusCode::BAD_REQUEST, message).into_response()
        }
        Err(ApplicationError::Internal(err)) => {
            error!("Failed to submit application: {err:#}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Submission failed".to_string(),
            )
                .into_response()
        }
    }
}

/// Candidate sign-in with the password chosen at submission or reset.
#[utoipa::path(
    post,
    path = "/v1/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Credentials accepted", body = ApplicationView),
        (status = 400, description = "Missing identifier or password", body = String),
        (status = 401, description = "Invalid credentials", body = String)
    ),
    tag = "login"
)]
pub async fn login(
    tracker: Extension<Arc<ApplicationTracker>>,
    payload: Option<Json<LoginRequest>>,
) -> impl IntoResponse {
    let request: LoginRequest = match payload {
        Some(Json(payload)) => payload,
        None => return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response(),
    };
    if request.email_or_phone.trim().is_empty() || request.password.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            "Email or phone and password are required".to_string(),
        )
            .into_response();
    }

    match tracker
        .authenticate(&request.email_or_phone, &request.password)
        .await
    {
        Ok(Some(application)) => Json(ApplicationView::from(application)).into_response(),
        Ok(None) => (
            StatusCode::UNAUTHORIZED,
            "Invalid email or password".to_string(),
        )
            .into_response(),
        Err(err) => {
            error!("Failed to authenticate candidate: {err:#}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error".to_string(),
            )
                .into_response()
        }
    }
}

#[utoipa::path(
    get,
    path = "/v1/admin/applications",
    params(ListApplicationsQuery),
    responses(
        (status = 200, description = "Applications, newest first", body = [ApplicationView]),
        (status = 400, description = "Unknown status", body = String),
        (status = 401, description = "Missing bearer token"),
        (status = 403, description = "Wrong bearer token")
    ),
    security(("bearer" = [])),
    tag = "admin"
)]
pub async fn list(
    headers: HeaderMap,
    tracker: Extension<Arc<ApplicationTracker>>,
    admin: Extension<AdminToken>,
    Query(query): Query<ListApplicationsQuery>,
) -> impl IntoResponse {
    if let Err(status) = require_admin(&headers, &admin) {
        return status.into_response();
    }

    let filter = match query.status.as_deref().map(str::trim) {
        None | Some("") => None,
        Some(label) => match label.parse::<ApplicationStatus>() {
            Ok(status) => Some(status),
            Err(_) => {
                return (StatusCode::BAD_REQUEST, format!("Unknown status: {label}"))
                    .into_response();
            }
        },
    };

    match tracker.list(filter).await {
        Ok(applications) => Json(
            applications
                .into_iter()
                .map(ApplicationView::from)
                .collect::<Vec<_>>(),
        )
        .into_response(),
        Err(err) => {
            error!("Failed to list applications: {err:#}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to list applications".to_string(),
            )
                .into_response()
        }
    }
}

#[utoipa::path(
    get,
    path = "/v1/admin/applications/{id}",
    params(("id" = Uuid, Path, description = "Application id")),
    responses(
        (status = 200, description = "Application detail", body = ApplicationView),
        (status = 401, description = "Missing bearer token"),
        (status = 403, description = "Wrong bearer token"),
        (status = 404, description = "Application not found", body = String)
    ),
    security(("bearer" = [])),
    tag = "admin"
)]
pub async fn detail(
    headers: HeaderMap,
    tracker: Extension<Arc<ApplicationTracker>>,
    admin: Extension<AdminToken>,
    Path(id): Path<Uuid>,
) -> impl IntoResponse {
    if let Err(status) = require_admin(&headers, &admin) {
        return status.into_response();
    }

    match tracker.application(id).await {
        Ok(Some(application)) => Json(ApplicationView::from(application)).into_response(),
        Ok(None) => (StatusCode::NOT_FOUND, "Application not found".to_string()).into_response(),
        Err(err) => {
            error!("Failed to load application: {err:#}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to load application".to_string(),
            )
                .into_response()
        }
    }
}

#[utoipa::path(
    put,
    path = "/v1/admin/applications/{id}/status",
    params(("id" = Uuid, Path, description = "Application id")),
    request_body = StatusChangeRequest,
    responses(
        (status = 204, description = "Status stored (or already current)"),
        (status = 401, description = "Missing bearer token"),
        (status = 403, description = "Wrong bearer token"),
        (status = 404, description = "Application not found", body = String)
    ),
    security(("bearer" = [])),
    tag = "admin"
)]
pub async fn change_status(
    headers: HeaderMap,
    tracker: Extension<Arc<ApplicationTracker>>,
    admin: Extension<AdminToken>,
    Path(id): Path<Uuid>,
    payload: Option<Json<StatusChangeRequest>>,
) -> impl IntoResponse {
    if let Err(status) = require_admin(&headers, &admin) {
        return status.into_response();
    }

    let request: StatusChangeRequest = match payload {
        Some(Json(payload)) => payload,
        None => return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response(),
    };

    match tracker.change_status(id, request.status).await {
        Ok(ChangeOutcome::Changed { .. } | ChangeOutcome::Unchanged) => {
            StatusCode::NO_CONTENT.into_response()
        }
        Ok(ChangeOutcome::NotFound) => {
            (StatusCode::NOT_FOUND, "Application not found".to_string()).into_response()
        }
        Err(err) => {
            error!("Failed to change application status: {err:#}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Status update failed".to_string(),
            )
                .into_response()
        }
    }
}
