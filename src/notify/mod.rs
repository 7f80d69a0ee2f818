//! Out-of-band delivery to candidates.
//!
//! Callers treat delivery as best-effort: a failed send is logged and never
//! rolls back the state change that triggered it.

pub mod outbox;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::json;
use sqlx::PgPool;
use tracing::{Instrument, debug, info};

use crate::applications::Notice;

use outbox::Channel;

pub const TEMPLATE_RESET_CODE: &str = "password_reset_code";
pub const TEMPLATE_STATUS_UPDATE: &str = "application_status";

#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver a plaintext one-time code by email.
    async fn deliver_code(&self, email: &str, recipient_name: &str, code: &str) -> Result<()>;

    /// Email the notice and text it to `phone`; an empty phone skips the SMS.
    async fn deliver_status_update(
        &self,
        email: &str,
        phone: &str,
        recipient_name: &str,
        notice: &Notice,
    ) -> Result<()>;
}

/// Short text for the SMS channel.
#[must_use]
pub fn sms_text(recipient_name: &str, notice: &Notice) -> String {
    format!("Hi {recipient_name}, {}: {}", notice.title, notice.message)
}

/// Local dev notifier; codes only show up at debug level.
#[derive(Clone, Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn deliver_code(&self, email: &str, recipient_name: &str, code: &str) -> Result<()> {
        info!(to_email = %email, recipient = %recipient_name, "password reset code issued");
        debug!(to_email = %email, code = %code, "password reset code");
        Ok(())
    }

    async fn deliver_status_update(
        &self,
        email: &str,
        phone: &str,
        recipient_name: &str,
        notice: &Notice,
    ) -> Result<()> {
        info!(
            channel = %Channel::Email,
            to_email = %email,
            recipient = %recipient_name,
            title = %notice.title,
            "application status notice"
        );
        if !phone.is_empty() {
            info!(
                channel = %Channel::Sms,
                to_phone = %phone,
                text = %sms_text(recipient_name, notice),
                "application status notice"
            );
        }
        Ok(())
    }
}

/// Queues messages in `message_outbox` for the background worker in [`outbox`].
#[derive(Clone, Debug)]
pub struct OutboxNotifier {
    pool: PgPool,
}

impl OutboxNotifier {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn enqueue(
        &self,
        channel: Channel,
        recipient: &str,
        template: &str,
        payload: serde_json::Value,
    ) -> Result<()> {
        let payload_text =
            serde_json::to_string(&payload).context("failed to serialize outbox payload")?;
        let query = r"
            INSERT INTO message_outbox (channel, recipient, template, payload_json)
            VALUES ($1, $2, $3, $4::jsonb)
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        sqlx::query(query)
            .bind(channel.as_str())
            .bind(recipient)
            .bind(template)
            .bind(payload_text)
            .execute(&self.pool)
            .instrument(span)
            .await
            .with_context(|| format!("failed to enqueue {template} {channel}"))?;
        Ok(())
    }
}

#[async_trait]
impl Notifier for OutboxNotifier {
    async fn deliver_code(&self, email: &str, recipient_name: &str, code: &str) -> Result<()> {
        let payload = json!({ "name": recipient_name, "code": code });
        self.enqueue(Channel::Email, email, TEMPLATE_RESET_CODE, payload)
            .await
    }

    async fn deliver_status_update(
        &self,
        email: &str,
        phone: &str,
        recipient_name: &str,
        notice: &Notice,
    ) -> Result<()> {
        let payload = json!({
            "name": recipient_name,
            "title": notice.title,
            "message": notice.message,
        });
        self.enqueue(Channel::Email, email, TEMPLATE_STATUS_UPDATE, payload)
            .await?;

        if !phone.is_empty() {
            let payload = json!({ "text": sms_text(recipient_name, notice) });
            self.enqueue(Channel::Sms, phone, TEMPLATE_STATUS_UPDATE, payload)
                .await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::applications::ApplicationStatus;
    use sqlx::postgres::PgPoolOptions;

    #[tokio::test]
    async fn log_notifier_always_succeeds() -> Result<()> {
        let notifier = LogNotifier;
        notifier.deliver_code("a@x.com", "Alice", "123456").await?;
        let notice = ApplicationStatus::Selected.notice();
        notifier
            .deliver_status_update("a@x.com", "9876543210", "Alice", &notice)
            .await?;
        notifier
            .deliver_status_update("a@x.com", "", "Alice", &notice)
            .await?;
        Ok(())
    }

    #[test]
    fn sms_text_names_recipient_and_notice() {
        let notice = Notice {
            title: "Application Update",
            message: "You were selected.",
        };
        assert_eq!(
            sms_text("Alice", &notice),
            "Hi Alice, Application Update: You were selected."
        );
    }

    #[tokio::test]
    async fn outbox_notifier_reports_database_errors() -> Result<()> {
        let pool = PgPoolOptions::new()
            .acquire_timeout(std::time::Duration::from_millis(100))
            .connect_lazy("postgres://postgres@127.0.0.1:1/interntrack")?;
        let notifier = OutboxNotifier::new(pool);

        let result = notifier.deliver_code("a@x.com", "Alice", "123456").await;
        assert!(result.is_err());

        let notice = ApplicationStatus::Rejected.notice();
        let err = notifier
            .deliver_status_update("a@x.com", "9876543210", "Alice", &notice)
            .await
            .err()
            .map(|err| err.to_string());
        assert_eq!(
            err.as_deref(),
            Some("failed to enqueue application_status email")
        );
        Ok(())
    }
}
