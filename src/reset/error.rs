use thiserror::Error;

/// Failure kinds surfaced by the password reset flow.
///
/// Everything except `Internal` is an expected, user-recoverable condition.
#[derive(Debug, Error)]
pub enum ResetError {
    #[error("no account found for the given email or phone")]
    NotFound,
    #[error("no active reset request; request a new code")]
    NoActiveRequest,
    #[error("please wait {retry_after_seconds} seconds before requesting another code")]
    Throttled { retry_after_seconds: i64 },
    #[error("maximum resend limit reached; request a new code")]
    ResendLimitExceeded,
    #[error("code has expired; request a new one")]
    Expired,
    #[error("too many incorrect attempts; request a new code")]
    Blocked,
    #[error("incorrect code, {attempts_remaining} attempts remaining")]
    IncorrectCode { attempts_remaining: i32 },
    #[error("code not verified; verify the code first")]
    NotVerified,
    #[error("password must be at least {min_length} characters")]
    InvalidCredential { min_length: usize },
    #[error("reset request was modified concurrently; try again")]
    Conflict,
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ResetError {
    /// Stable machine-readable code for API clients.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::NoActiveRequest => "no_active_request",
            Self::Throttled { .. } => "throttled",
            Self::ResendLimitExceeded => "resend_limit_exceeded",
            Self::Expired => "expired",
            Self::Blocked => "blocked",
            Self::IncorrectCode { .. } => "incorrect_code",
            Self::NotVerified => "not_verified",
            Self::InvalidCredential { .. } => "invalid_credential",
            Self::Conflict => "conflict",
            Self::Internal(_) => "internal",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    #[test]
    fn messages_carry_details() {
        let err = ResetError::Throttled {
            retry_after_seconds: 12,
        };
        assert_eq!(
            err.to_string(),
            "please wait 12 seconds before requesting another code"
        );

        let err = ResetError::IncorrectCode {
            attempts_remaining: 3,
        };
        assert_eq!(err.to_string(), "incorrect code, 3 attempts remaining");
    }

    #[test]
    fn internal_wraps_anyhow() {
        let err: ResetError = anyhow!("db down").into();
        assert_eq!(err.code(), "internal");
        assert_eq!(err.to_string(), "db down");
    }
}
