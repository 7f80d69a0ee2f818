use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{info, instrument, warn};

use crate::accounts::{self, Account, AccountStore, credential};
use crate::clock::Clock;
use crate::notify::Notifier;

use super::error::ResetError;
use super::model::{ResetRequest, ResetStatus};
use super::otp;
use super::policy::ResetPolicy;
use super::store::{ResetStore, UpdateOutcome};

const FALLBACK_RECIPIENT_NAME: &str = "Candidate";

/// What the caller learns from a successful `request_code`; never the code.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResetReceipt {
    pub email: String,
    pub expires_at: DateTime<Utc>,
}

/// The reset state machine.
pub struct PasswordReset {
    resets: Arc<dyn ResetStore>,
    accounts: Arc<dyn AccountStore>,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    policy: ResetPolicy,
}

impl PasswordReset {
    #[must_use]
    pub fn new(
        resets: Arc<dyn ResetStore>,
        accounts: Arc<dyn AccountStore>,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
        policy: ResetPolicy,
    ) -> Self {
        Self {
            resets,
            accounts,
            notifier,
            clock,
            policy,
        }
    }

    #[must_use]
    pub fn policy(&self) -> &ResetPolicy {
        &self.policy
    }

    /// Open a new chain for the account matching `identifier` (email or phone).
    ///
    /// # Errors
    /// `NotFound` when no account matches; `Internal` on storage failures.
    #[instrument(skip(self, phone_submitted))]
    pub async fn request_code(
        &self,
        identifier: &str,
        phone_submitted: Option<&str>,
    ) -> Result<ResetReceipt, ResetError> {
        let identifier = identifier.trim();
        let found = if identifier.contains('@') {
            self.accounts
                .find_by_email(&accounts::normalize_email(identifier))
                .await?
        } else {
            self.accounts
                .find_by_phone(&accounts::normalize_phone(identifier))
                .await?
        };
        let account = found.ok_or(ResetError::NotFound)?;

        let phone_submitted = phone_submitted
            .map(accounts::normalize_phone)
            .filter(|phone| !phone.is_empty());

        let code = otp::generate_code();
        let request = ResetRequest::open(
            account.email.clone(),
            phone_submitted,
            otp::hash_code(&code)?,
            self.clock.now(),
            self.policy.code_ttl(),
        )?;
        self.resets.insert(&request).await?;
        info!(reset_id = %request.id, "password reset requested");

        self.dispatch(&account.email, &account.name, &code).await;

        Ok(ResetReceipt {
            email: request.email,
            expires_at: request.otp_expires_at,
        })
    }

    /// Reissue the code for the pending chain.
    ///
    /// # Errors
    /// `NoActiveRequest`, `Throttled`, `ResendLimitExceeded`, `Conflict` or `Internal`.
    #[instrument(skip(self))]
    pub async fn resend_code(&self, email: &str) -> Result<ResetReceipt, ResetError> {
        let email = accounts::normalize_email(email);
        let mut request = self
            .latest(&email)
            .await?
            .filter(|request| request.status == ResetStatus::Pending)
            .ok_or(ResetError::NoActiveRequest)?;

        let now = self.clock.now();
        let remaining = self.policy.resend_cooldown() - (now - request.last_sent_at);
        if remaining > chrono::TimeDelta::zero() {
            // ceil to whole seconds
            let retry_after_seconds = ((remaining.num_milliseconds() + 999) / 1000).max(1);
            return Err(ResetError::Throttled {
                retry_after_seconds,
            });
        }
        if request.resend_count >= self.policy.max_resends() {
            return Err(ResetError::ResendLimitExceeded);
        }

        let code = otp::generate_code();
        request.reissue(otp::hash_code(&code)?, now, self.policy.code_ttl())?;
        self.persist(&request).await?;
        info!(
            reset_id = %request.id,
            resend_count = request.resend_count,
            "password reset code resent"
        );

        let name = self.recipient_name(&email).await;
        self.dispatch(&email, &name, &code).await;

        Ok(ResetReceipt {
            email,
            expires_at: request.otp_expires_at,
        })
    }

    /// Check a submitted code against the latest chain.
    ///
    /// # Errors
    /// `NoActiveRequest`, `Expired`, `Blocked`, `IncorrectCode`, `Conflict` or `Internal`.
    #[instrument(skip(self, code))]
    pub async fn verify_code(&self, email: &str, code: &str) -> Result<(), ResetError> {
        let email = accounts::normalize_email(email);
        let mut request = self
            .latest(&email)
            .await?
            .ok_or(ResetError::NoActiveRequest)?;

        match request.status {
            ResetStatus::Pending => {}
            ResetStatus::Expired => return Err(ResetError::Expired),
            ResetStatus::Blocked => return Err(ResetError::Blocked),
            ResetStatus::Verified | ResetStatus::Used => return Err(ResetError::NoActiveRequest),
        }

        let now = self.clock.now();
        if request.is_expired_at(now) {
            request.transition(ResetStatus::Expired, now);
            self.persist(&request).await?;
            return Err(ResetError::Expired);
        }

        let max_attempts = self.policy.max_attempts();
        if request.otp_attempts >= max_attempts {
            request.transition(ResetStatus::Blocked, now);
            self.persist(&request).await?;
            return Err(ResetError::Blocked);
        }

        let matched =
            otp::is_well_formed(code) && otp::verify_code(code, &request.otp_code_hash)?;
        if !matched {
            request.otp_attempts += 1;
            request.updated_at = now;
            let attempts_remaining = (max_attempts - request.otp_attempts).max(0);
            if attempts_remaining == 0 {
                request.status = ResetStatus::Blocked;
                warn!(reset_id = %request.id, "password reset blocked after failed attempts");
            }
            self.persist(&request).await?;
            return Err(ResetError::IncorrectCode { attempts_remaining });
        }

        request.otp_attempts = 0;
        request.transition(ResetStatus::Verified, now);
        self.persist(&request).await?;
        info!(reset_id = %request.id, "password reset code verified");
        Ok(())
    }

    /// Replace the account credential and consume the verified chain in one
    /// store write.
    ///
    /// # Errors
    /// `NotVerified`, `InvalidCredential`, `NotFound`, `Conflict` or `Internal`.
    #[instrument(skip(self, new_password))]
    pub async fn set_new_password(
        &self,
        email: &str,
        new_password: &str,
    ) -> Result<(), ResetError> {
        let email = accounts::normalize_email(email);
        let mut request = self
            .latest(&email)
            .await?
            .filter(|request| request.status == ResetStatus::Verified)
            .ok_or(ResetError::NotVerified)?;

        let min_length = self.policy.password_min_length();
        if new_password.chars().count() < min_length {
            return Err(ResetError::InvalidCredential { min_length });
        }

        let account = self
            .accounts
            .find_by_email(&email)
            .await?
            .ok_or(ResetError::NotFound)?;
        let password_hash = credential::hash_password(new_password)?;

        request.transition(ResetStatus::Used, self.clock.now());
        match self
            .resets
            .complete(&request, account.id, &password_hash)
            .await?
        {
            UpdateOutcome::Updated => {}
            UpdateOutcome::Stale => {
                warn!(reset_id = %request.id, "stale reset request completion");
                return Err(ResetError::Conflict);
            }
        }
        info!(reset_id = %request.id, account_id = %account.id, "password reset completed");
        Ok(())
    }

    async fn latest(&self, email: &str) -> Result<Option<ResetRequest>, ResetError> {
        Ok(self.resets.latest_for_email(email).await?)
    }

    async fn persist(&self, request: &ResetRequest) -> Result<(), ResetError> {
        match self.resets.update(request).await? {
            UpdateOutcome::Updated => Ok(()),
            UpdateOutcome::Stale => {
                warn!(reset_id = %request.id, "stale reset request update");
                Err(ResetError::Conflict)
            }
        }
    }

    async fn recipient_name(&self, email: &str) -> String {
        match self.accounts.find_by_email(email).await {
            Ok(Some(Account { name, .. })) if !name.trim().is_empty() => name,
            Ok(_) => FALLBACK_RECIPIENT_NAME.to_string(),
            Err(err) => {
                warn!("failed to look up recipient name: {err:#}");
                FALLBACK_RECIPIENT_NAME.to_string()
            }
        }
    }

    async fn dispatch(&self, email: &str, name: &str, code: &str) {
        let name = if name.trim().is_empty() {
            FALLBACK_RECIPIENT_NAME
        } else {
            name
        };
        if let Err(err) = self.notifier.deliver_code(email, name, code).await {
            warn!(to_email = %email, "failed to deliver password reset code: {err:#}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::store::memory::MemoryStore;
    use anyhow::Result;
    use async_trait::async_trait;
    use chrono::TimeDelta;
    use std::sync::Mutex;

    #[derive(Default)]
    struct CapturingNotifier {
        codes: Mutex<Vec<(String, String, String)>>,
        fail: bool,
    }

    impl CapturingNotifier {
        fn failing() -> Self {
            Self {
                fail: true,
                ..Self::default()
            }
        }

        fn last_code(&self) -> Option<String> {
            self.codes
                .lock()
                .ok()
                .and_then(|codes| codes.last().map(|(_, _, code)| code.clone()))
        }
    }

    #[async_trait]
    impl Notifier for CapturingNotifier {
        async fn deliver_code(&self, email: &str, name: &str, code: &str) -> Result<()> {
            if self.fail {
                anyhow::bail!("smtp unavailable");
            }
            if let Ok(mut codes) = self.codes.lock() {
                codes.push((email.to_string(), name.to_string(), code.to_string()));
            }
            Ok(())
        }

        async fn deliver_status_update(
            &self,
            _email: &str,
            _phone: &str,
            _name: &str,
            _notice: &crate::applications::Notice,
        ) -> Result<()> {
            Ok(())
        }
    }

    struct Harness {
        store: Arc<MemoryStore>,
        notifier: Arc<CapturingNotifier>,
        clock: Arc<ManualClock>,
        reset: PasswordReset,
    }

    async fn harness(notifier: CapturingNotifier) -> Result<Harness> {
        let store = Arc::new(MemoryStore::new());
        store
            .add_account("Alice", "a@x.com", "9876543210", "OldPass1")
            .await?;
        let notifier = Arc::new(notifier);
        let clock = Arc::new(ManualClock::default());
        let reset = PasswordReset::new(
            store.clone(),
            store.clone(),
            notifier.clone(),
            clock.clone(),
            ResetPolicy::default(),
        );
        Ok(Harness {
            store,
            notifier,
            clock,
            reset,
        })
    }

    #[tokio::test]
    async fn request_by_phone_resolves_email_and_names_recipient() -> Result<()> {
        let h = harness(CapturingNotifier::default()).await?;
        let receipt = h.reset.request_code("98765 43210", None).await?;
        assert_eq!(receipt.email, "a@x.com");

        let codes = h.notifier.codes.lock().map(|c| c.clone()).unwrap_or_default();
        assert_eq!(codes.len(), 1);
        assert_eq!(codes[0].0, "a@x.com");
        assert_eq!(codes[0].1, "Alice");
        Ok(())
    }

    #[tokio::test]
    async fn request_records_phone_submitted() -> Result<()> {
        let h = harness(CapturingNotifier::default()).await?;
        h.reset.request_code("A@X.com", Some("987-654-3210")).await?;
        let rows = h.store.reset_requests("a@x.com").await;
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].phone_submitted.as_deref(), Some("9876543210"));
        Ok(())
    }

    #[tokio::test]
    async fn notifier_failure_keeps_the_request() -> Result<()> {
        let h = harness(CapturingNotifier::failing()).await?;
        h.reset.request_code("a@x.com", None).await?;
        let rows = h.store.reset_requests("a@x.com").await;
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].status, ResetStatus::Pending);
        Ok(())
    }

    #[tokio::test]
    async fn throttle_reports_rounded_up_wait() -> Result<()> {
        let h = harness(CapturingNotifier::default()).await?;
        h.reset.request_code("a@x.com", None).await?;
        h.clock.advance(TimeDelta::milliseconds(10_500));

        match h.reset.resend_code("a@x.com").await {
            Err(ResetError::Throttled {
                retry_after_seconds,
            }) => assert_eq!(retry_after_seconds, 20),
            other => panic!("expected Throttled, got {other:?}"),
        }
        Ok(())
    }

    #[tokio::test]
    async fn malformed_code_counts_as_attempt() -> Result<()> {
        let h = harness(CapturingNotifier::default()).await?;
        h.reset.request_code("a@x.com", None).await?;

        match h.reset.verify_code("a@x.com", "12ab").await {
            Err(ResetError::IncorrectCode { attempts_remaining }) => {
                assert_eq!(attempts_remaining, 4);
            }
            other => panic!("expected IncorrectCode, got {other:?}"),
        }
        Ok(())
    }

    #[tokio::test]
    async fn short_password_is_rejected_without_consuming() -> Result<()> {
        let h = harness(CapturingNotifier::default()).await?;
        h.reset.request_code("a@x.com", None).await?;
        let code = h.notifier.last_code().unwrap_or_default();
        h.reset.verify_code("a@x.com", &code).await?;

        assert!(matches!(
            h.reset.set_new_password("a@x.com", "short").await,
            Err(ResetError::InvalidCredential { min_length: 8 })
        ));
        let rows = h.store.reset_requests("a@x.com").await;
        assert_eq!(rows[0].status, ResetStatus::Verified);
        Ok(())
    }

    #[tokio::test]
    async fn verified_chain_cannot_be_verified_again() -> Result<()> {
        let h = harness(CapturingNotifier::default()).await?;
        h.reset.request_code("a@x.com", None).await?;
        let code = h.notifier.last_code().unwrap_or_default();
        h.reset.verify_code("a@x.com", &code).await?;

        assert!(matches!(
            h.reset.verify_code("a@x.com", &code).await,
            Err(ResetError::NoActiveRequest)
        ));
        Ok(())
    }

    #[tokio::test]
    async fn new_request_supersedes_blocked_chain() -> Result<()> {
        let h = harness(CapturingNotifier::default()).await?;
        h.reset.request_code("a@x.com", None).await?;
        let wrong = if h.notifier.last_code().as_deref() == Some("000000") {
            "111111"
        } else {
            "000000"
        };
        for _ in 0..5 {
            let _ = h.reset.verify_code("a@x.com", wrong).await;
        }
        assert!(matches!(
            h.reset.verify_code("a@x.com", wrong).await,
            Err(ResetError::Blocked)
        ));

        h.clock.advance(TimeDelta::seconds(1));
        h.reset.request_code("a@x.com", None).await?;
        let code = h.notifier.last_code().unwrap_or_default();
        h.reset.verify_code("a@x.com", &code).await?;

        let rows = h.store.reset_requests("a@x.com").await;
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].status, ResetStatus::Blocked);
        assert_eq!(rows[1].status, ResetStatus::Verified);
        Ok(())
    }
}
