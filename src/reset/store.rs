use anyhow::Result;
use async_trait::async_trait;
use uuid::Uuid;

use super::model::ResetRequest;

/// Result of a version-checked update.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UpdateOutcome {
    Updated,
    /// The row changed since it was read; nothing was written.
    Stale,
}

/// Persistence for reset chains.
#[async_trait]
pub trait ResetStore: Send + Sync {
    /// Most recently created row for the email (`created_at DESC, id DESC`).
    async fn latest_for_email(&self, email: &str) -> Result<Option<ResetRequest>>;

    async fn insert(&self, request: &ResetRequest) -> Result<()>;

    /// Write `request` only if the stored version still equals `request.version`.
    async fn update(&self, request: &ResetRequest) -> Result<UpdateOutcome>;

    /// Version-checked write of `request` together with the account's new
    /// credential hash. Either both land or neither does; `Stale` writes nothing.
    async fn complete(
        &self,
        request: &ResetRequest,
        account_id: Uuid,
        password_hash: &str,
    ) -> Result<UpdateOutcome>;
}
