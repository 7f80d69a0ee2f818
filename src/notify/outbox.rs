//! Message outbox delivery.
//!
//! `OutboxNotifier` writes rows into `message_outbox` with status `pending`,
//! one row per channel. The worker spawned here polls that table, claims a
//! batch with `FOR UPDATE SKIP LOCKED` and hands each row to a
//! `MessageSender`. Sent rows are marked `sent`; failures are rescheduled with
//! exponential backoff and jitter until `max_attempts`, then marked `failed`.
//!
//! `LogMessageSender` is the default sender and only logs.

use anyhow::{Context, Result, anyhow};
use rand::Rng;
use sqlx::{PgPool, Row};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{Instrument, error, info, info_span, warn};
use uuid::Uuid;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Channel {
    Email,
    Sms,
}

impl Channel {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Email => "email",
            Self::Sms => "sms",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Channel {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "email" => Ok(Self::Email),
            "sms" => Ok(Self::Sms),
            other => Err(anyhow!("unknown outbox channel: {other}")),
        }
    }
}

#[derive(Clone, Debug)]
pub struct OutboxMessage {
    pub id: Uuid,
    pub channel: Channel,
    /// Email address or phone number, depending on `channel`.
    pub recipient: String,
    pub template: String,
    pub payload_json: String,
}

/// Hands a queued message to the transport for its channel.
pub trait MessageSender: Send + Sync {
    /// # Errors
    /// Any error reschedules the message.
    fn send(&self, message: &OutboxMessage) -> Result<()>;
}

#[derive(Clone, Debug, Default)]
pub struct LogMessageSender;

impl MessageSender for LogMessageSender {
    fn send(&self, message: &OutboxMessage) -> Result<()> {
        // payload may hold a one-time code, keep it out of info logs
        info!(
            outbox_id = %message.id,
            channel = %message.channel,
            recipient = %message.recipient,
            template = %message.template,
            "outbox message delivered (log sender)"
        );
        Ok(())
    }
}

#[derive(Clone, Copy, Debug)]
pub struct OutboxConfig {
    poll_interval: Duration,
    batch_size: usize,
    max_attempts: u32,
    backoff_base: Duration,
    backoff_max: Duration,
}

impl OutboxConfig {
    /// 5s poll, batches of 10, 5 attempts, 5s..5m backoff.
    #[must_use]
    pub fn new() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            batch_size: 10,
            max_attempts: 5,
            backoff_base: Duration::from_secs(5),
            backoff_max: Duration::from_secs(300),
        }
    }

    #[must_use]
    pub fn with_poll_interval_seconds(mut self, seconds: u64) -> Self {
        self.poll_interval = Duration::from_secs(seconds);
        self
    }

    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    #[must_use]
    pub fn with_backoff_base_seconds(mut self, seconds: u64) -> Self {
        self.backoff_base = Duration::from_secs(seconds);
        self
    }

    #[must_use]
    pub fn with_backoff_max_seconds(mut self, seconds: u64) -> Self {
        self.backoff_max = Duration::from_secs(seconds);
        self
    }

    /// Clamp zero values so the worker can't spin or stall.
    #[must_use]
    pub fn normalize(self) -> Self {
        let backoff_base = self.backoff_base.max(Duration::from_secs(1));
        Self {
            poll_interval: self.poll_interval.max(Duration::from_secs(1)),
            batch_size: self.batch_size.max(1),
            max_attempts: self.max_attempts.max(1),
            backoff_base,
            backoff_max: self.backoff_max.max(backoff_base),
        }
    }

    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    #[must_use]
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }
}

impl Default for OutboxConfig {
    fn default() -> Self {
        Self::new()
    }
}

pub fn spawn_worker(
    pool: PgPool,
    sender: Arc<dyn MessageSender>,
    config: OutboxConfig,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let config = config.normalize();
        info!(
            poll_interval_seconds = config.poll_interval().as_secs(),
            batch_size = config.batch_size(),
            "message outbox worker started"
        );

        loop {
            if let Err(err) = drain_batch(&pool, sender.as_ref(), &config).await {
                error!("message outbox batch failed: {err:#}");
            }

            sleep(config.poll_interval()).await;
        }
    })
}

async fn drain_batch(
    pool: &PgPool,
    sender: &dyn MessageSender,
    config: &OutboxConfig,
) -> Result<usize> {
    let mut tx = pool
        .begin()
        .await
        .context("failed to start message outbox transaction")?;

    let query = r"
        SELECT id, channel, recipient, template, payload_json::text AS payload_json, attempts
        FROM message_outbox
        WHERE status = 'pending'
          AND next_attempt_at <= NOW()
        ORDER BY next_attempt_at ASC, created_at ASC
        LIMIT $1
        FOR UPDATE SKIP LOCKED
    ";
    let span = info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let rows = sqlx::query(query)
        .bind(i64::try_from(config.batch_size()).unwrap_or(1))
        .fetch_all(&mut *tx)
        .instrument(span)
        .await
        .context("failed to load message outbox batch")?;

    let claimed = rows.len();
    for row in rows {
        let attempts: i32 = row.get("attempts");
        let channel: String = row.get("channel");
        let message = OutboxMessage {
            id: row.get("id"),
            channel: channel.parse()?,
            recipient: row.get("recipient"),
            template: row.get("template"),
            payload_json: row.get("payload_json"),
        };

        let attempt = u32::try_from(attempts).unwrap_or(0).saturating_add(1);
        let delivery = Delivery::classify(sender.send(&message), attempt, config);
        if let Delivery::Retry { delay, .. } | Delivery::GiveUp { delay, .. } = &delivery {
            warn!(
                outbox_id = %message.id,
                attempt,
                retry_in_ms = delay.as_millis(),
                channel = %message.channel,
                "message outbox send failed"
            );
        }
        record_delivery(&mut tx, message.id, attempt, &delivery).await?;
    }

    // Commit even when empty to release the snapshot.
    tx.commit()
        .await
        .context("failed to commit message outbox batch")?;

    Ok(claimed)
}

#[derive(Debug)]
enum Delivery {
    Sent,
    Retry { error: String, delay: Duration },
    GiveUp { error: String, delay: Duration },
}

impl Delivery {
    fn classify(result: Result<()>, attempt: u32, config: &OutboxConfig) -> Self {
        match result {
            Ok(()) => Self::Sent,
            Err(err) if attempt >= config.max_attempts() => Self::GiveUp {
                error: format!("{err:#}"),
                delay: Duration::ZERO,
            },
            Err(err) => Self::Retry {
                error: format!("{err:#}"),
                delay: backoff_delay(attempt, config.backoff_base, config.backoff_max),
            },
        }
    }
}

async fn record_delivery(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    id: Uuid,
    attempt: u32,
    delivery: &Delivery,
) -> Result<()> {
    let attempts = i32::try_from(attempt).unwrap_or(i32::MAX);
    let (query, last_error, delay_ms) = match delivery {
        Delivery::Sent => (
            r"
                UPDATE message_outbox
                SET status = 'sent', attempts = $2, last_error = $3,
                    sent_at = NOW(), next_attempt_at = NOW() + ($4 * INTERVAL '1 millisecond')
                WHERE id = $1
            ",
            None,
            0_i64,
        ),
        Delivery::Retry { error, delay } => (
            r"
                UPDATE message_outbox
                SET status = 'pending', attempts = $2, last_error = $3,
                    next_attempt_at = NOW() + ($4 * INTERVAL '1 millisecond')
                WHERE id = $1
            ",
            Some(error.as_str()),
            i64::try_from(delay.as_millis()).unwrap_or(i64::MAX),
        ),
        Delivery::GiveUp { error, .. } => (
            r"
                UPDATE message_outbox
                SET status = 'failed', attempts = $2, last_error = $3,
                    next_attempt_at = NOW() + ($4 * INTERVAL '1 millisecond')
                WHERE id = $1
            ",
            Some(error.as_str()),
            0_i64,
        ),
    };

    let span = info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(id)
        .bind(attempts)
        .bind(last_error)
        .bind(delay_ms)
        .execute(&mut **tx)
        .instrument(span)
        .await
        .context("failed to record message outbox delivery")?;

    Ok(())
}

/// `base * 2^(attempt-1)`, capped, then jittered into `[d/2, d]`.
fn backoff_delay(attempt: u32, base: Duration, max: Duration) -> Duration {
    let shift = attempt.saturating_sub(1).min(31);
    let delay = base.checked_mul(1u32 << shift).unwrap_or(max).min(max);
    jitter(delay)
}

fn jitter(delay: Duration) -> Duration {
    let delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
    if delay_ms < 2 {
        return delay;
    }
    let half = delay_ms / 2;
    Duration::from_millis(half + rand::thread_rng().gen_range(0..=half))
}
