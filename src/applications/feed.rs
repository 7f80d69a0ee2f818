//! In-app notification feed per application.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::Notice;

pub const KIND_STATUS_CHANGE: &str = "status_change";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FeedNotification {
    pub id: Uuid,
    pub application_id: Uuid,
    pub title: String,
    pub message: String,
    pub kind: String,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

impl FeedNotification {
    #[must_use]
    pub fn status_change(application_id: Uuid, notice: Notice, at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::now_v7(),
            application_id,
            title: notice.title.to_string(),
            message: notice.message.to_string(),
            kind: KIND_STATUS_CHANGE.to_string(),
            is_read: false,
            created_at: at,
        }
    }
}

#[async_trait]
pub trait FeedStore: Send + Sync {
    async fn push(&self, notification: &FeedNotification) -> Result<()>;

    /// Newest first.
    async fn list(&self, application_id: Uuid, unread_only: bool)
    -> Result<Vec<FeedNotification>>;

    /// `false` when the notification doesn't exist.
    async fn mark_read(&self, notification_id: Uuid) -> Result<bool>;

    /// Number of notifications flipped to read.
    async fn mark_all_read(&self, application_id: Uuid) -> Result<u64>;

    async fn unread_count(&self, application_id: Uuid) -> Result<i64>;

    /// Delete all notifications of an application; returns the number removed.
    async fn clear(&self, application_id: Uuid) -> Result<u64>;
}
