use crate::{
    api::{self, Services, handlers::admin::AdminToken},
    applications::ApplicationTracker,
    cli::{commands::outbox::NotifierKind, telemetry},
    clock::SystemClock,
    notify::{
        LogNotifier, Notifier, OutboxNotifier,
        outbox::{self, LogMessageSender, OutboxConfig},
    },
    reset::{PasswordReset, ResetPolicy},
    store::PgStore,
};
use anyhow::{Context, Result};
use secrecy::SecretString;
use sqlx::postgres::PgPoolOptions;
use std::{sync::Arc, time::Duration};
use tracing::info;
use url::Url;

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub dsn: String,
    pub admin_token: SecretString,
    pub otp_ttl_seconds: i64,
    pub otp_resend_cooldown_seconds: i64,
    pub otp_max_resends: i32,
    pub otp_max_attempts: i32,
    pub password_min_length: usize,
    pub notifier: NotifierKind,
    pub outbox_poll_seconds: u64,
    pub outbox_batch_size: usize,
    pub outbox_max_attempts: u32,
    pub outbox_backoff_base_seconds: u64,
    pub outbox_backoff_max_seconds: u64,
}

impl Args {
    fn policy(&self) -> ResetPolicy {
        ResetPolicy::default()
            .with_code_ttl_seconds(self.otp_ttl_seconds)
            .with_resend_cooldown_seconds(self.otp_resend_cooldown_seconds)
            .with_max_resends(self.otp_max_resends)
            .with_max_attempts(self.otp_max_attempts)
            .with_password_min_length(self.password_min_length)
    }

    fn outbox_config(&self) -> OutboxConfig {
        OutboxConfig::new()
            .with_poll_interval_seconds(self.outbox_poll_seconds)
            .with_batch_size(self.outbox_batch_size)
            .with_max_attempts(self.outbox_max_attempts)
            .with_backoff_base_seconds(self.outbox_backoff_base_seconds)
            .with_backoff_max_seconds(self.outbox_backoff_max_seconds)
    }
}

/// Connect to the database, wire the services and serve the API.
///
/// # Errors
/// Returns an error if the DSN is invalid, the database is unreachable or the
/// listener can't be bound.
pub async fn execute(args: Args) -> Result<()> {
    let dsn = Url::parse(&args.dsn).context("Invalid database DSN")?;
    info!(
        db.host = dsn.host_str().unwrap_or("localhost"),
        db.name = dsn.path().trim_start_matches('/'),
        "connecting to database"
    );

    let pool = PgPoolOptions::new()
        .min_connections(1)
        .max_connections(5)
        .max_lifetime(Duration::from_secs(60 * 2))
        .test_before_acquire(true)
        .connect(dsn.as_str())
        .await
        .context("Failed to connect to database")?;

    let store = Arc::new(PgStore::new(pool.clone()));
    let clock = Arc::new(SystemClock);

    let notifier: Arc<dyn Notifier> = match args.notifier {
        NotifierKind::Log => Arc::new(LogNotifier),
        NotifierKind::Outbox => {
            outbox::spawn_worker(pool.clone(), Arc::new(LogMessageSender), args.outbox_config());
            Arc::new(OutboxNotifier::new(pool.clone()))
        }
    };

    let policy = args.policy();
    let tracker = ApplicationTracker::new(
        store.clone(),
        store.clone(),
        notifier.clone(),
        clock.clone(),
    )
    .with_password_min_length(policy.password_min_length());
    let reset = PasswordReset::new(store.clone(), store, notifier, clock, policy);

    let services = Services {
        pool,
        reset: Arc::new(reset),
        tracker: Arc::new(tracker),
        admin_token: AdminToken::new(args.admin_token),
    };

    let result = api::new(args.port, services).await;
    telemetry::shutdown_tracer();
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(dsn: &str) -> Args {
        Args {
            port: 0,
            dsn: dsn.to_string(),
            admin_token: SecretString::from("s3cret".to_string()),
            otp_ttl_seconds: 300,
            otp_resend_cooldown_seconds: 15,
            otp_max_resends: 2,
            otp_max_attempts: 4,
            password_min_length: 10,
            notifier: NotifierKind::Log,
            outbox_poll_seconds: 7,
            outbox_batch_size: 20,
            outbox_max_attempts: 3,
            outbox_backoff_base_seconds: 2,
            outbox_backoff_max_seconds: 60,
        }
    }

    #[test]
    fn policy_from_args() {
        let policy = args("postgres://localhost/interntrack").policy();
        assert_eq!(policy.code_ttl().num_seconds(), 300);
        assert_eq!(policy.resend_cooldown().num_seconds(), 15);
        assert_eq!(policy.max_resends(), 2);
        assert_eq!(policy.max_attempts(), 4);
        assert_eq!(policy.password_min_length(), 10);
    }

    #[test]
    fn outbox_config_from_args() {
        let config = args("postgres://localhost/interntrack").outbox_config();
        assert_eq!(config.poll_interval(), Duration::from_secs(7));
        assert_eq!(config.batch_size(), 20);
        assert_eq!(config.max_attempts(), 3);
    }

    #[tokio::test]
    async fn rejects_invalid_dsn() {
        let result = execute(args("not a url")).await;
        assert!(result.is_err());
        if let Err(err) = result {
            assert!(err.to_string().contains("Invalid database DSN"));
        }
    }
}
