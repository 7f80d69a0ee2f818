use anyhow::{Result, anyhow};
use chrono::{DateTime, TimeDelta, Utc};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ResetStatus {
    Pending,
    Verified,
    Expired,
    Blocked,
    Used,
}

impl ResetStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Verified => "verified",
            Self::Expired => "expired",
            Self::Blocked => "blocked",
            Self::Used => "used",
        }
    }

    /// `expired`, `blocked` and `used` admit no further transition.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Expired | Self::Blocked | Self::Used)
    }
}

impl fmt::Display for ResetStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResetStatus {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "pending" => Ok(Self::Pending),
            "verified" => Ok(Self::Verified),
            "expired" => Ok(Self::Expired),
            "blocked" => Ok(Self::Blocked),
            "used" => Ok(Self::Used),
            other => Err(anyhow!("unknown reset status: {other}")),
        }
    }
}

/// One reset chain for one email.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResetRequest {
    pub id: Uuid,
    pub email: String,
    pub phone_submitted: Option<String>,
    pub otp_code_hash: String,
    pub otp_expires_at: DateTime<Utc>,
    pub otp_attempts: i32,
    pub resend_count: i32,
    pub last_sent_at: DateTime<Utc>,
    pub status: ResetStatus,
    /// Bumped by the store on every successful update.
    pub version: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ResetRequest {
    /// Start a fresh `pending` chain with zeroed counters.
    ///
    /// # Errors
    /// Returns an error if `now + code_ttl` is out of range.
    pub fn open(
        email: String,
        phone_submitted: Option<String>,
        otp_code_hash: String,
        now: DateTime<Utc>,
        code_ttl: TimeDelta,
    ) -> Result<Self> {
        Ok(Self {
            id: Uuid::now_v7(),
            email,
            phone_submitted,
            otp_code_hash,
            otp_expires_at: expiry(now, code_ttl)?,
            otp_attempts: 0,
            resend_count: 0,
            last_sent_at: now,
            status: ResetStatus::Pending,
            version: 0,
            created_at: now,
            updated_at: now,
        })
    }

    /// Replace the active code and restart its expiry window.
    ///
    /// # Errors
    /// Returns an error if `now + code_ttl` is out of range; the row is untouched.
    pub fn reissue(
        &mut self,
        otp_code_hash: String,
        now: DateTime<Utc>,
        code_ttl: TimeDelta,
    ) -> Result<()> {
        self.otp_expires_at = expiry(now, code_ttl)?;
        self.otp_code_hash = otp_code_hash;
        self.last_sent_at = now;
        self.resend_count += 1;
        self.updated_at = now;
        Ok(())
    }

    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.otp_expires_at
    }

    pub fn transition(&mut self, status: ResetStatus, now: DateTime<Utc>) {
        self.status = status;
        self.updated_at = now;
    }
}

fn expiry(now: DateTime<Utc>, code_ttl: TimeDelta) -> Result<DateTime<Utc>> {
    now.checked_add_signed(code_ttl)
        .ok_or_else(|| anyhow!("code expiry out of range: {now} + {code_ttl}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fresh(now: DateTime<Utc>) -> Result<ResetRequest> {
        ResetRequest::open(
            "a@x.com".to_string(),
            None,
            "hash".to_string(),
            now,
            TimeDelta::minutes(10),
        )
    }

    #[test]
    fn status_round_trips_through_text() {
        for status in [
            ResetStatus::Pending,
            ResetStatus::Verified,
            ResetStatus::Expired,
            ResetStatus::Blocked,
            ResetStatus::Used,
        ] {
            assert_eq!(status.as_str().parse::<ResetStatus>().ok(), Some(status));
        }
        assert!("done".parse::<ResetStatus>().is_err());
    }

    #[test]
    fn terminal_states() {
        assert!(!ResetStatus::Pending.is_terminal());
        assert!(!ResetStatus::Verified.is_terminal());
        assert!(ResetStatus::Expired.is_terminal());
        assert!(ResetStatus::Blocked.is_terminal());
        assert!(ResetStatus::Used.is_terminal());
    }

    #[test]
    fn open_starts_pending_with_zero_counters() -> Result<()> {
        let now = Utc::now();
        let request = fresh(now)?;
        assert_eq!(request.status, ResetStatus::Pending);
        assert_eq!(request.otp_attempts, 0);
        assert_eq!(request.resend_count, 0);
        assert_eq!(request.last_sent_at, now);
        assert_eq!(request.otp_expires_at, now + TimeDelta::minutes(10));
        Ok(())
    }

    #[test]
    fn reissue_moves_expiry_and_counts() -> Result<()> {
        let now = Utc::now();
        let mut request = fresh(now)?;
        let later = now + TimeDelta::seconds(45);
        request.reissue("other".to_string(), later, TimeDelta::minutes(10))?;

        assert_eq!(request.resend_count, 1);
        assert_eq!(request.otp_code_hash, "other");
        assert_eq!(request.last_sent_at, later);
        assert_eq!(request.otp_expires_at, later + TimeDelta::minutes(10));
        Ok(())
    }

    #[test]
    fn expiry_is_strictly_after_deadline() -> Result<()> {
        let now = Utc::now();
        let request = fresh(now)?;
        assert!(!request.is_expired_at(request.otp_expires_at));
        assert!(request.is_expired_at(request.otp_expires_at + TimeDelta::seconds(1)));
        Ok(())
    }

    #[test]
    fn overflowing_ttl_is_an_error() -> Result<()> {
        let huge = TimeDelta::days(365 * 1_000_000);
        let opened = ResetRequest::open(
            "a@x.com".to_string(),
            None,
            "hash".to_string(),
            Utc::now(),
            huge,
        );
        assert!(opened.is_err());

        let mut request = fresh(Utc::now())?;
        let before = request.clone();
        assert!(request.reissue("other".to_string(), Utc::now(), huge).is_err());
        assert_eq!(request, before);
        Ok(())
    }
}
