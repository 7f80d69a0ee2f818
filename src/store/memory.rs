//! In-process store for tests and local runs without Postgres.

use anyhow::{Result, bail};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::accounts::{Account, AccountStore, credential, normalize_email, normalize_phone};
use crate::applications::feed::{FeedNotification, FeedStore};
use crate::applications::{Application, ApplicationStatus, ApplicationStore, SubmitOutcome};
use crate::reset::{ResetRequest, ResetStore, UpdateOutcome};

struct StoredApplication {
    application: Application,
    password_hash: String,
}

#[derive(Default)]
struct Inner {
    applications: Vec<StoredApplication>,
    // insertion order doubles as the tie-break for equal timestamps
    resets: Vec<ResetRequest>,
    feed: Vec<FeedNotification>,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an `Applied` application that can sign in with `password`.
    ///
    /// # Errors
    /// Returns an error if the email is already taken or hashing fails.
    pub async fn add_account(
        &self,
        name: &str,
        email: &str,
        phone: &str,
        password: &str,
    ) -> Result<Uuid> {
        let now = Utc::now();
        let application = Application {
            id: Uuid::now_v7(),
            name: name.to_string(),
            email: normalize_email(email),
            phone: normalize_phone(phone),
            domain: "General".to_string(),
            status: ApplicationStatus::Applied,
            created_at: now,
            updated_at: now,
        };
        let password_hash = credential::hash_password(password)?;
        match ApplicationStore::insert(self, &application, &password_hash).await? {
            SubmitOutcome::Created(id) => Ok(id),
            SubmitOutcome::Conflict => bail!("email already registered: {email}"),
        }
    }

    pub async fn password_hash(&self, account_id: Uuid) -> Option<String> {
        let inner = self.inner.lock().await;
        inner
            .applications
            .iter()
            .find(|stored| stored.application.id == account_id)
            .map(|stored| stored.password_hash.clone())
    }

    /// Every reset row for `email`, oldest first.
    pub async fn reset_requests(&self, email: &str) -> Vec<ResetRequest> {
        let inner = self.inner.lock().await;
        inner
            .resets
            .iter()
            .filter(|request| request.email == email)
            .cloned()
            .collect()
    }
}

impl Inner {
    fn account_index(&self, account_id: Uuid) -> Result<usize> {
        match self
            .applications
            .iter()
            .position(|stored| stored.application.id == account_id)
        {
            Some(index) => Ok(index),
            None => bail!("account {account_id} not found"),
        }
    }

    fn set_credential(&mut self, index: usize, password_hash: &str) {
        let stored = &mut self.applications[index];
        stored.password_hash = password_hash.to_string();
        stored.application.updated_at = Utc::now();
    }

    /// Position of the stored row when its version still matches `request`.
    fn current_reset(&self, request: &ResetRequest) -> Option<usize> {
        self.resets
            .iter()
            .position(|existing| existing.id == request.id && existing.version == request.version)
    }

    fn write_reset(&mut self, index: usize, request: &ResetRequest) {
        let stored = &mut self.resets[index];
        *stored = ResetRequest {
            version: request.version + 1,
            created_at: stored.created_at,
            ..request.clone()
        };
    }
}

fn account_of(application: &Application) -> Account {
    Account {
        id: application.id,
        name: application.name.clone(),
        email: application.email.clone(),
        phone: application.phone.clone(),
    }
}

#[async_trait]
impl AccountStore for MemoryStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<Account>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .applications
            .iter()
            .find(|stored| stored.application.email == email)
            .map(|stored| account_of(&stored.application)))
    }

    async fn find_by_phone(&self, phone: &str) -> Result<Option<Account>> {
        if phone.is_empty() {
            return Ok(None);
        }
        let inner = self.inner.lock().await;
        Ok(inner
            .applications
            .iter()
            .filter(|stored| stored.application.phone == phone)
            .min_by_key(|stored| stored.application.created_at)
            .map(|stored| account_of(&stored.application)))
    }

    async fn update_credential(&self, account_id: Uuid, password_hash: &str) -> Result<()> {
        let mut inner = self.inner.lock().await;
        let index = inner.account_index(account_id)?;
        inner.set_credential(index, password_hash);
        Ok(())
    }
}

#[async_trait]
impl ResetStore for MemoryStore {
    async fn latest_for_email(&self, email: &str) -> Result<Option<ResetRequest>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .resets
            .iter()
            .enumerate()
            .filter(|(_, request)| request.email == email)
            .max_by_key(|(index, request)| (request.created_at, *index))
            .map(|(_, request)| request.clone()))
    }

    async fn insert(&self, request: &ResetRequest) -> Result<()> {
        let mut inner = self.inner.lock().await;
        if inner.resets.iter().any(|existing| existing.id == request.id) {
            bail!("duplicate reset request id {}", request.id);
        }
        inner.resets.push(request.clone());
        Ok(())
    }

    async fn update(&self, request: &ResetRequest) -> Result<UpdateOutcome> {
        let mut inner = self.inner.lock().await;
        let Some(index) = inner.current_reset(request) else {
            return Ok(UpdateOutcome::Stale);
        };
        inner.write_reset(index, request);
        Ok(UpdateOutcome::Updated)
    }

    async fn complete(
        &self,
        request: &ResetRequest,
        account_id: Uuid,
        password_hash: &str,
    ) -> Result<UpdateOutcome> {
        let mut inner = self.inner.lock().await;
        // every check runs before the first write
        let account = inner.account_index(account_id)?;
        let Some(reset) = inner.current_reset(request) else {
            return Ok(UpdateOutcome::Stale);
        };
        inner.write_reset(reset, request);
        inner.set_credential(account, password_hash);
        Ok(UpdateOutcome::Updated)
    }
}

#[async_trait]
impl ApplicationStore for MemoryStore {
    async fn find(&self, id: Uuid) -> Result<Option<Application>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .applications
            .iter()
            .find(|stored| stored.application.id == id)
            .map(|stored| stored.application.clone()))
    }

    async fn insert(
        &self,
        application: &Application,
        password_hash: &str,
    ) -> Result<SubmitOutcome> {
        let mut inner = self.inner.lock().await;
        if inner
            .applications
            .iter()
            .any(|stored| stored.application.email == application.email)
        {
            return Ok(SubmitOutcome::Conflict);
        }
        inner.applications.push(StoredApplication {
            application: application.clone(),
            password_hash: password_hash.to_string(),
        });
        Ok(SubmitOutcome::Created(application.id))
    }

    async fn update_status(
        &self,
        id: Uuid,
        status: ApplicationStatus,
        at: DateTime<Utc>,
    ) -> Result<bool> {
        let mut inner = self.inner.lock().await;
        let Some(stored) = inner
            .applications
            .iter_mut()
            .find(|stored| stored.application.id == id)
        else {
            return Ok(false);
        };
        stored.application.status = status;
        stored.application.updated_at = at;
        Ok(true)
    }

    async fn list(&self, status: Option<ApplicationStatus>) -> Result<Vec<Application>> {
        let inner = self.inner.lock().await;
        let mut applications: Vec<Application> = inner
            .applications
            .iter()
            .map(|stored| &stored.application)
            .filter(|application| status.is_none_or(|status| application.status == status))
            .cloned()
            .collect();
        applications.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(applications)
    }

    async fn find_with_credential(
        &self,
        email_or_phone: &str,
    ) -> Result<Option<(Application, String)>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .applications
            .iter()
            .filter(|stored| {
                stored.application.email == email_or_phone
                    || stored.application.phone == email_or_phone
            })
            .min_by_key(|stored| stored.application.created_at)
            .map(|stored| (stored.application.clone(), stored.password_hash.clone())))
    }
}

#[async_trait]
impl FeedStore for MemoryStore {
    async fn push(&self, notification: &FeedNotification) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.feed.push(notification.clone());
        Ok(())
    }

    async fn list(
        &self,
        application_id: Uuid,
        unread_only: bool,
    ) -> Result<Vec<FeedNotification>> {
        let inner = self.inner.lock().await;
        let mut notifications: Vec<FeedNotification> = inner
            .feed
            .iter()
            .filter(|n| n.application_id == application_id && !(unread_only && n.is_read))
            .cloned()
            .collect();
        notifications.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(notifications)
    }

    async fn mark_read(&self, notification_id: Uuid) -> Result<bool> {
        let mut inner = self.inner.lock().await;
        Ok(inner
            .feed
            .iter_mut()
            .find(|n| n.id == notification_id)
            .map(|n| n.is_read = true)
            .is_some())
    }

    async fn mark_all_read(&self, application_id: Uuid) -> Result<u64> {
        let mut inner = self.inner.lock().await;
        let mut updated = 0;
        for n in inner
            .feed
            .iter_mut()
            .filter(|n| n.application_id == application_id && !n.is_read)
        {
            n.is_read = true;
            updated += 1;
        }
        Ok(updated)
    }

    async fn unread_count(&self, application_id: Uuid) -> Result<i64> {
        let inner = self.inner.lock().await;
        let count = inner
            .feed
            .iter()
            .filter(|n| n.application_id == application_id && !n.is_read)
            .count();
        Ok(i64::try_from(count).unwrap_or(i64::MAX))
    }

    async fn clear(&self, application_id: Uuid) -> Result<u64> {
        let mut inner = self.inner.lock().await;
        let before = inner.feed.len();
        inner.feed.retain(|n| n.application_id != application_id);
        Ok(u64::try_from(before - inner.feed.len()).unwrap_or(u64::MAX))
    }
}
