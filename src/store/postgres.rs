//! Postgres-backed stores (schema in `db/sql/01_interntrack.sql`).

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgExecutor, PgPool, Row};
use tracing::Instrument;
use uuid::Uuid;

use crate::accounts::{Account, AccountStore};
use crate::applications::feed::{FeedNotification, FeedStore};
use crate::applications::{Application, ApplicationStatus, ApplicationStore, SubmitOutcome};
use crate::reset::{ResetRequest, ResetStatus, ResetStore, UpdateOutcome};

use super::is_unique_violation;

#[derive(Clone, Debug)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

const RESET_COLUMNS: &str = "id, email, phone_submitted, otp_code_hash, otp_expires_at, \
    otp_attempts, resend_count, last_sent_at, status, version, created_at, updated_at";

const APPLICATION_COLUMNS: &str = "id, name, email, phone, domain, status, created_at, updated_at";

fn reset_from_row(row: &PgRow) -> Result<ResetRequest> {
    let status: String = row.get("status");
    Ok(ResetRequest {
        id: row.get("id"),
        email: row.get("email"),
        phone_submitted: row.get("phone_submitted"),
        otp_code_hash: row.get("otp_code_hash"),
        otp_expires_at: row.get("otp_expires_at"),
        otp_attempts: row.get("otp_attempts"),
        resend_count: row.get("resend_count"),
        last_sent_at: row.get("last_sent_at"),
        status: status.parse::<ResetStatus>()?,
        version: row.get("version"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

fn application_from_row(row: &PgRow) -> Result<Application> {
    let status: String = row.get("status");
    Ok(Application {
        id: row.get("id"),
        name: row.get("name"),
        email: row.get("email"),
        phone: row.get("phone"),
        domain: row.get("domain"),
        status: status.parse::<ApplicationStatus>()?,
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

fn feed_from_row(row: &PgRow) -> FeedNotification {
    FeedNotification {
        id: row.get("id"),
        application_id: row.get("application_id"),
        title: row.get("title"),
        message: row.get("message"),
        kind: row.get("kind"),
        is_read: row.get("is_read"),
        created_at: row.get("created_at"),
    }
}

#[async_trait]
impl AccountStore for PgStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<Account>> {
        let query = "SELECT id, name, email, phone FROM applications WHERE email = $1";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(email)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to lookup account by email")?;

        Ok(row.map(|row| Account {
            id: row.get("id"),
            name: row.get("name"),
            email: row.get("email"),
            phone: row.get("phone"),
        }))
    }

    async fn find_by_phone(&self, phone: &str) -> Result<Option<Account>> {
        let query = r"
            SELECT id, name, email, phone
            FROM applications
            WHERE phone = $1
            ORDER BY created_at ASC
            LIMIT 1
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(phone)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to lookup account by phone")?;

        Ok(row.map(|row| Account {
            id: row.get("id"),
            name: row.get("name"),
            email: row.get("email"),
            phone: row.get("phone"),
        }))
    }

    async fn update_credential(&self, account_id: Uuid, password_hash: &str) -> Result<()> {
        write_credential(&self.pool, account_id, password_hash).await
    }
}

#[async_trait]
impl ResetStore for PgStore {
    async fn latest_for_email(&self, email: &str) -> Result<Option<ResetRequest>> {
        let query = format!(
            "SELECT {RESET_COLUMNS} FROM password_reset_requests \
             WHERE email = $1 ORDER BY created_at DESC, id DESC LIMIT 1"
        );
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = %query
        );
        let row = sqlx::query(&query)
            .bind(email)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to load latest reset request")?;

        row.as_ref().map(reset_from_row).transpose()
    }

    async fn insert(&self, request: &ResetRequest) -> Result<()> {
        let query = format!(
            "INSERT INTO password_reset_requests ({RESET_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)"
        );
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = %query
        );
        sqlx::query(&query)
            .bind(request.id)
            .bind(&request.email)
            .bind(request.phone_submitted.as_deref())
            .bind(&request.otp_code_hash)
            .bind(request.otp_expires_at)
            .bind(request.otp_attempts)
            .bind(request.resend_count)
            .bind(request.last_sent_at)
            .bind(request.status.as_str())
            .bind(request.version)
            .bind(request.created_at)
            .bind(request.updated_at)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to insert reset request")?;
        Ok(())
    }

    async fn update(&self, request: &ResetRequest) -> Result<UpdateOutcome> {
        write_reset(&self.pool, request).await
    }

    async fn complete(
        &self,
        request: &ResetRequest,
        account_id: Uuid,
        password_hash: &str,
    ) -> Result<UpdateOutcome> {
        let mut tx = self
            .pool
            .begin()
            .await
            .context("failed to begin reset completion")?;

        // an early return drops `tx`, which rolls back
        if write_reset(&mut *tx, request).await? == UpdateOutcome::Stale {
            return Ok(UpdateOutcome::Stale);
        }
        write_credential(&mut *tx, account_id, password_hash).await?;

        tx.commit()
            .await
            .context("failed to commit reset completion")?;
        Ok(UpdateOutcome::Updated)
    }
}

async fn write_reset<'e, E>(executor: E, request: &ResetRequest) -> Result<UpdateOutcome>
where
    E: PgExecutor<'e>,
{
    // version guard turns a lost race into zero affected rows
    let query = r"
        UPDATE password_reset_requests
        SET otp_code_hash = $3,
            otp_expires_at = $4,
            otp_attempts = $5,
            resend_count = $6,
            last_sent_at = $7,
            status = $8,
            updated_at = $9,
            version = version + 1
        WHERE id = $1 AND version = $2
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    let result = sqlx::query(query)
        .bind(request.id)
        .bind(request.version)
        .bind(&request.otp_code_hash)
        .bind(request.otp_expires_at)
        .bind(request.otp_attempts)
        .bind(request.resend_count)
        .bind(request.last_sent_at)
        .bind(request.status.as_str())
        .bind(request.updated_at)
        .execute(executor)
        .instrument(span)
        .await
        .context("failed to update reset request")?;

    Ok(if result.rows_affected() == 1 {
        UpdateOutcome::Updated
    } else {
        UpdateOutcome::Stale
    })
}

async fn write_credential<'e, E>(executor: E, account_id: Uuid, password_hash: &str) -> Result<()>
where
    E: PgExecutor<'e>,
{
    let query = r"
        UPDATE applications
        SET password_hash = $2, updated_at = NOW()
        WHERE id = $1
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    let result = sqlx::query(query)
        .bind(account_id)
        .bind(password_hash)
        .execute(executor)
        .instrument(span)
        .await
        .context("failed to update account credential")?;

    if result.rows_affected() == 0 {
        anyhow::bail!("account {account_id} not found");
    }
    Ok(())
}

#[async_trait]
impl ApplicationStore for PgStore {
    async fn find(&self, id: Uuid) -> Result<Option<Application>> {
        let query = format!("SELECT {APPLICATION_COLUMNS} FROM applications WHERE id = $1");
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = %query
        );
        let row = sqlx::query(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to load application")?;

        row.as_ref().map(application_from_row).transpose()
    }

    async fn insert(
        &self,
        application: &Application,
        password_hash: &str,
    ) -> Result<SubmitOutcome> {
        let query = r"
            INSERT INTO applications
                (id, name, email, phone, domain, status, password_hash, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        let result = sqlx::query(query)
            .bind(application.id)
            .bind(&application.name)
            .bind(&application.email)
            .bind(&application.phone)
            .bind(&application.domain)
            .bind(application.status.as_str())
            .bind(password_hash)
            .bind(application.created_at)
            .bind(application.updated_at)
            .execute(&self.pool)
            .instrument(span)
            .await;

        match result {
            Ok(_) => Ok(SubmitOutcome::Created(application.id)),
            Err(err) if is_unique_violation(&err) => Ok(SubmitOutcome::Conflict),
            Err(err) => Err(err).context("failed to insert application"),
        }
    }

    async fn update_status(
        &self,
        id: Uuid,
        status: ApplicationStatus,
        at: DateTime<Utc>,
    ) -> Result<bool> {
        let query = "UPDATE applications SET status = $2, updated_at = $3 WHERE id = $1";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        let result = sqlx::query(query)
            .bind(id)
            .bind(status.as_str())
            .bind(at)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to update application status")?;

        Ok(result.rows_affected() > 0)
    }

    async fn list(&self, status: Option<ApplicationStatus>) -> Result<Vec<Application>> {
        let query = format!(
            "SELECT {APPLICATION_COLUMNS} FROM applications \
             WHERE ($1::text IS NULL OR status = $1) \
             ORDER BY created_at DESC, id DESC"
        );
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = %query
        );
        let rows = sqlx::query(&query)
            .bind(status.map(ApplicationStatus::as_str))
            .fetch_all(&self.pool)
            .instrument(span)
            .await
            .context("failed to list applications")?;

        rows.iter().map(application_from_row).collect()
    }

    async fn find_with_credential(
        &self,
        email_or_phone: &str,
    ) -> Result<Option<(Application, String)>> {
        let query = format!(
            "SELECT {APPLICATION_COLUMNS}, password_hash FROM applications \
             WHERE email = $1 OR phone = $1 \
             ORDER BY created_at ASC LIMIT 1"
        );
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = %query
        );
        let row = sqlx::query(&query)
            .bind(email_or_phone)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to lookup application credential")?;

        row.map(|row| -> Result<(Application, String)> {
            Ok((application_from_row(&row)?, row.get("password_hash")))
        })
        .transpose()
    }
}

#[async_trait]
impl FeedStore for PgStore {
    async fn push(&self, notification: &FeedNotification) -> Result<()> {
        let query = r"
            INSERT INTO notifications
                (id, application_id, title, message, kind, is_read, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        sqlx::query(query)
            .bind(notification.id)
            .bind(notification.application_id)
            .bind(&notification.title)
            .bind(&notification.message)
            .bind(&notification.kind)
            .bind(notification.is_read)
            .bind(notification.created_at)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to insert notification")?;
        Ok(())
    }

    async fn list(
        &self,
        application_id: Uuid,
        unread_only: bool,
    ) -> Result<Vec<FeedNotification>> {
        let query = r"
            SELECT id, application_id, title, message, kind, is_read, created_at
            FROM notifications
            WHERE application_id = $1
              AND (NOT $2 OR is_read = FALSE)
            ORDER BY created_at DESC, id DESC
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let rows = sqlx::query(query)
            .bind(application_id)
            .bind(unread_only)
            .fetch_all(&self.pool)
            .instrument(span)
            .await
            .context("failed to list notifications")?;

        Ok(rows.iter().map(feed_from_row).collect())
    }

    async fn mark_read(&self, notification_id: Uuid) -> Result<bool> {
        let query = "UPDATE notifications SET is_read = TRUE WHERE id = $1";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        let result = sqlx::query(query)
            .bind(notification_id)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to mark notification read")?;

        Ok(result.rows_affected() > 0)
    }

    async fn mark_all_read(&self, application_id: Uuid) -> Result<u64> {
        let query = r"
            UPDATE notifications
            SET is_read = TRUE
            WHERE application_id = $1 AND is_read = FALSE
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        let result = sqlx::query(query)
            .bind(application_id)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to mark notifications read")?;

        Ok(result.rows_affected())
    }

    async fn unread_count(&self, application_id: Uuid) -> Result<i64> {
        let query = r"
            SELECT COUNT(*) AS unread
            FROM notifications
            WHERE application_id = $1 AND is_read = FALSE
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(application_id)
            .fetch_one(&self.pool)
            .instrument(span)
            .await
            .context("failed to count unread notifications")?;

        Ok(row.get("unread"))
    }

    async fn clear(&self, application_id: Uuid) -> Result<u64> {
        let query = "DELETE FROM notifications WHERE application_id = $1";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "DELETE",
            db.statement = query
        );
        let result = sqlx::query(query)
            .bind(application_id)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to clear notifications")?;

        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;
    use sqlx::postgres::PgPoolOptions;
    use std::time::Duration;

    fn unreachable_store() -> Result<PgStore> {
        let pool = PgPoolOptions::new()
            .acquire_timeout(Duration::from_millis(100))
            .connect_lazy("postgres://postgres@127.0.0.1:1/interntrack")?;
        Ok(PgStore::new(pool))
    }

    #[tokio::test]
    async fn errors_carry_context_when_database_is_down() -> Result<()> {
        let store = unreachable_store()?;

        let err = store
            .latest_for_email("a@x.com")
            .await
            .err()
            .map(|err| err.to_string());
        assert_eq!(err.as_deref(), Some("failed to load latest reset request"));

        let request = ResetRequest::open(
            "a@x.com".to_string(),
            None,
            "hash".to_string(),
            Utc::now(),
            TimeDelta::minutes(10),
        )?;
        let err = store.update(&request).await.err().map(|err| err.to_string());
        assert_eq!(err.as_deref(), Some("failed to update reset request"));

        let err = store
            .complete(&request, Uuid::now_v7(), "hash")
            .await
            .err()
            .map(|err| err.to_string());
        assert_eq!(err.as_deref(), Some("failed to begin reset completion"));
        Ok(())
    }

    #[tokio::test]
    async fn account_lookup_fails_without_database() -> Result<()> {
        let store = unreachable_store()?;
        assert!(store.find_by_email("a@x.com").await.is_err());
        assert!(store.unread_count(Uuid::now_v7()).await.is_err());
        Ok(())
    }
}
