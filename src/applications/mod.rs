//! Internship applications and their review lifecycle.
//!
//! Every status change posts a notice to the candidate's feed and sends it by
//! email and SMS through the configured [`Notifier`]. Both are best-effort:
//! a failure is logged and the stored application stays as written.

pub mod feed;

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::accounts::{self, credential};
use crate::clock::Clock;
use crate::notify::Notifier;

use feed::{FeedNotification, FeedStore};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
pub enum ApplicationStatus {
    Applied,
    #[serde(rename = "In Review")]
    InReview,
    Selected,
    Rejected,
    #[serde(rename = "In Training")]
    InTraining,
    Completed,
}

/// Title and body shown to the candidate for a status.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Notice {
    pub title: &'static str,
    pub message: &'static str,
}

impl ApplicationStatus {
    pub const ALL: [Self; 6] = [
        Self::Applied,
        Self::InReview,
        Self::Selected,
        Self::Rejected,
        Self::InTraining,
        Self::Completed,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Applied => "Applied",
            Self::InReview => "In Review",
            Self::Selected => "Selected",
            Self::Rejected => "Rejected",
            Self::InTraining => "In Training",
            Self::Completed => "Completed",
        }
    }

    #[must_use]
    pub fn notice(self) -> Notice {
        let (title, message) = match self {
            Self::Applied => (
                "Application Received",
                "Your application has been received and is being reviewed.",
            ),
            Self::InReview => (
                "Application Under Review",
                "Great news! Your application is now under review by our team.",
            ),
            Self::Selected => (
                "Congratulations! You've been Selected",
                "Congratulations! You have been selected for the internship program. \
                 Check your email for next steps.",
            ),
            Self::Rejected => (
                "Application Update",
                "Thank you for your interest. Unfortunately, we cannot move forward \
                 with your application at this time.",
            ),
            Self::InTraining => (
                "Welcome to Training!",
                "Welcome to the internship program! Your training has begun. \
                 Check your email for training materials.",
            ),
            Self::Completed => (
                "Internship Completed",
                "Congratulations on completing your internship! \
                 We hope you had a great experience.",
            ),
        };
        Notice { title, message }
    }
}

impl fmt::Display for ApplicationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ApplicationStatus {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(value.trim()))
            .ok_or_else(|| anyhow!("unknown application status: {value}"))
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Application {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub domain: String,
    pub status: ApplicationStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Submitted form, not yet validated.
#[derive(Clone, Debug)]
pub struct NewApplication {
    pub name: String,
    pub email: String,
    pub phone: String,
    pub domain: String,
    pub password: String,
}

#[derive(Debug, PartialEq, Eq)]
pub enum SubmitOutcome {
    Created(Uuid),
    /// Email already registered.
    Conflict,
}

#[derive(Debug, PartialEq, Eq)]
pub enum ChangeOutcome {
    Changed { previous: ApplicationStatus },
    Unchanged,
    NotFound,
}

#[derive(Debug, Error)]
pub enum ApplicationError {
    #[error("{0}")]
    Invalid(String),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

#[async_trait]
pub trait ApplicationStore: Send + Sync {
    async fn find(&self, id: Uuid) -> Result<Option<Application>>;

    /// Store a new application; `Conflict` when the email is taken.
    async fn insert(&self, application: &Application, password_hash: &str)
    -> Result<SubmitOutcome>;

    /// Returns `false` when no row matched.
    async fn update_status(
        &self,
        id: Uuid,
        status: ApplicationStatus,
        at: DateTime<Utc>,
    ) -> Result<bool>;

    /// Newest first.
    async fn list(&self, status: Option<ApplicationStatus>) -> Result<Vec<Application>>;

    /// Application and password hash whose email or phone equals the
    /// normalized `email_or_phone`; earliest registration wins.
    async fn find_with_credential(
        &self,
        email_or_phone: &str,
    ) -> Result<Option<(Application, String)>>;
}

pub struct ApplicationTracker {
    applications: Arc<dyn ApplicationStore>,
    feed: Arc<dyn FeedStore>,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    password_min_length: usize,
}

impl ApplicationTracker {
    #[must_use]
    pub fn new(
        applications: Arc<dyn ApplicationStore>,
        feed: Arc<dyn FeedStore>,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            applications,
            feed,
            notifier,
            clock,
            password_min_length: 8,
        }
    }

    #[must_use]
    pub fn with_password_min_length(mut self, length: usize) -> Self {
        self.password_min_length = length;
        self
    }

    /// Validate and store a new application in `Applied`.
    ///
    /// # Errors
    /// `Invalid` for bad input, `Internal` for storage failures.
    #[instrument(skip(self, new), fields(email = %new.email))]
    pub async fn submit(&self, new: NewApplication) -> Result<SubmitOutcome, ApplicationError> {
        let name = new.name.trim();
        let domain = new.domain.trim();
        let email = accounts::normalize_email(&new.email);
        let phone = accounts::normalize_phone(&new.phone);

        if name.is_empty() || domain.is_empty() {
            return Err(ApplicationError::Invalid(
                "All fields are required".to_string(),
            ));
        }
        if !accounts::valid_email(&email) {
            return Err(ApplicationError::Invalid("Invalid email".to_string()));
        }
        if !accounts::valid_phone(&phone) {
            return Err(ApplicationError::Invalid(
                "Invalid phone number".to_string(),
            ));
        }
        if new.password.chars().count() < self.password_min_length {
            return Err(ApplicationError::Invalid(format!(
                "Password must be at least {} characters",
                self.password_min_length
            )));
        }

        let now = self.clock.now();
        let application = Application {
            id: Uuid::now_v7(),
            name: name.to_string(),
            email,
            phone,
            domain: domain.to_string(),
            status: ApplicationStatus::Applied,
            created_at: now,
            updated_at: now,
        };
        let password_hash = credential::hash_password(&new.password)?;

        let outcome = self
            .applications
            .insert(&application, &password_hash)
            .await?;
        if outcome == SubmitOutcome::Conflict {
            return Ok(outcome);
        }

        info!(application_id = %application.id, "application received");
        self.post_notice(&application, ApplicationStatus::Applied)
            .await;
        Ok(outcome)
    }

    /// Check a candidate's password; `None` for an unknown identifier or a
    /// wrong password.
    ///
    /// # Errors
    /// Storage or hash parsing failures.
    #[instrument(skip(self, password))]
    pub async fn authenticate(
        &self,
        email_or_phone: &str,
        password: &str,
    ) -> Result<Option<Application>> {
        let identifier = email_or_phone.trim();
        let identifier = if identifier.contains('@') {
            accounts::normalize_email(identifier)
        } else {
            accounts::normalize_phone(identifier)
        };
        if identifier.is_empty() {
            return Ok(None);
        }

        let Some((application, password_hash)) =
            self.applications.find_with_credential(&identifier).await?
        else {
            return Ok(None);
        };
        if !credential::verify_password(password, &password_hash)? {
            warn!(application_id = %application.id, "candidate login rejected");
            return Ok(None);
        }
        info!(application_id = %application.id, "candidate logged in");
        Ok(Some(application))
    }

    /// # Errors
    /// Storage failures.
    pub async fn application(&self, application_id: Uuid) -> Result<Option<Application>> {
        self.applications.find(application_id).await
    }

    /// Move an application to `status`, notifying the candidate on change.
    ///
    /// # Errors
    /// Storage failures only; delivery failures are logged.
    #[instrument(skip(self))]
    pub async fn change_status(
        &self,
        application_id: Uuid,
        status: ApplicationStatus,
    ) -> Result<ChangeOutcome> {
        let Some(application) = self.applications.find(application_id).await? else {
            return Ok(ChangeOutcome::NotFound);
        };
        if application.status == status {
            return Ok(ChangeOutcome::Unchanged);
        }

        let previous = application.status;
        if !self
            .applications
            .update_status(application_id, status, self.clock.now())
            .await?
        {
            return Ok(ChangeOutcome::NotFound);
        }
        info!(%previous, current = %status, "application status changed");

        self.post_notice(&application, status).await;
        Ok(ChangeOutcome::Changed { previous })
    }

    /// # Errors
    /// Storage failures.
    pub async fn list(&self, status: Option<ApplicationStatus>) -> Result<Vec<Application>> {
        self.applications.list(status).await
    }

    /// # Errors
    /// Storage failures.
    pub async fn notifications(
        &self,
        application_id: Uuid,
        unread_only: bool,
    ) -> Result<Vec<FeedNotification>> {
        self.feed.list(application_id, unread_only).await
    }

    /// # Errors
    /// Storage failures.
    pub async fn mark_read(&self, notification_id: Uuid) -> Result<bool> {
        self.feed.mark_read(notification_id).await
    }

    /// # Errors
    /// Storage failures.
    pub async fn mark_all_read(&self, application_id: Uuid) -> Result<u64> {
        self.feed.mark_all_read(application_id).await
    }

    /// # Errors
    /// Storage failures.
    pub async fn unread_count(&self, application_id: Uuid) -> Result<i64> {
        self.feed.unread_count(application_id).await
    }

    /// Delete every feed entry of an application; returns how many went.
    ///
    /// # Errors
    /// Storage failures.
    #[instrument(skip(self))]
    pub async fn clear_notifications(&self, application_id: Uuid) -> Result<u64> {
        let removed = self.feed.clear(application_id).await?;
        info!(removed, "notification feed cleared");
        Ok(removed)
    }

    async fn post_notice(&self, application: &Application, status: ApplicationStatus) {
        let notice = status.notice();
        let entry = FeedNotification::status_change(application.id, notice, self.clock.now());
        if let Err(err) = self.feed.push(&entry).await {
            warn!(
                application_id = %application.id,
                "failed to post feed notice: {err:#}"
            );
        }

        if let Err(err) = self
            .notifier
            .deliver_status_update(
                &application.email,
                &application.phone,
                &application.name,
                &notice,
            )
            .await
        {
            warn!(
                application_id = %application.id,
                "failed to deliver status notice: {err:#}"
            );
        }
    }
}
