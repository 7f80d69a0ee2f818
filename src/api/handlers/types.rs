//! Request/response bodies for the HTTP API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::applications::{Application, ApplicationStatus, feed::FeedNotification};

/// Either `email` or `phone` identifies the account. When both are sent the
/// email wins and the phone is recorded with the request.
#[derive(ToSchema, Serialize, Deserialize, Debug, Default)]
pub struct RequestCodeRequest {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct ResendCodeRequest {
    pub email: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct VerifyCodeRequest {
    pub email: String,
    pub otp: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct NewPasswordRequest {
    pub email: String,
    pub new_password: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct CodeSent {
    pub message: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct SubmitApplicationRequest {
    pub name: String,
    pub email: String,
    pub phone: String,
    pub domain: String,
    pub password: String,
}

/// `email_or_phone` matches either contact on the application.
#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct LoginRequest {
    pub email_or_phone: String,
    pub password: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct ApplicationCreated {
    pub id: Uuid,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct ApplicationView {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub domain: String,
    pub status: ApplicationStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Application> for ApplicationView {
    fn from(application: Application) -> Self {
        Self {
            id: application.id,
            name: application.name,
            email: application.email,
            phone: application.phone,
            domain: application.domain,
            status: application.status,
            created_at: application.created_at,
            updated_at: application.updated_at,
        }
    }
}

#[derive(Deserialize, IntoParams, Debug, Default)]
#[into_params(parameter_in = Query)]
pub struct ListApplicationsQuery {
    /// Status label, e.g. `In Review`.
    pub status: Option<String>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct StatusChangeRequest {
    pub status: ApplicationStatus,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct NotificationView {
    pub id: Uuid,
    pub title: String,
    pub message: String,
    pub kind: String,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

impl From<FeedNotification> for NotificationView {
    fn from(notification: FeedNotification) -> Self {
        Self {
            id: notification.id,
            title: notification.title,
            message: notification.message,
            kind: notification.kind,
            is_read: notification.is_read,
            created_at: notification.created_at,
        }
    }
}

#[derive(Deserialize, IntoParams, Debug, Default)]
#[into_params(parameter_in = Query)]
pub struct NotificationsQuery {
    #[serde(default)]
    pub unread_only: bool,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct UnreadCount {
    pub count: i64,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct MarkedRead {
    pub updated: u64,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct Cleared {
    pub deleted: u64,
}
