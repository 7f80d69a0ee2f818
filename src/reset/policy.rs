use chrono::TimeDelta;

const DEFAULT_CODE_TTL_SECONDS: i64 = 10 * 60;
const DEFAULT_RESEND_COOLDOWN_SECONDS: i64 = 30;
const DEFAULT_MAX_RESENDS: i32 = 3;
const DEFAULT_MAX_ATTEMPTS: i32 = 5;
const DEFAULT_PASSWORD_MIN_LENGTH: usize = 8;

/// Upper bound for the code lifetime and the resend cooldown.
pub const MAX_WINDOW_SECONDS: i64 = 24 * 60 * 60;

/// Timing and limit knobs for the reset state machine.
///
/// Builders clamp into range: TTL `1..=MAX_WINDOW_SECONDS`, cooldown
/// `0..=MAX_WINDOW_SECONDS`, resends `0..`, attempts `1..`.
#[derive(Clone, Debug)]
pub struct ResetPolicy {
    code_ttl_seconds: i64,
    resend_cooldown_seconds: i64,
    max_resends: i32,
    max_attempts: i32,
    password_min_length: usize,
}

impl Default for ResetPolicy {
    fn default() -> Self {
        Self {
            code_ttl_seconds: DEFAULT_CODE_TTL_SECONDS,
            resend_cooldown_seconds: DEFAULT_RESEND_COOLDOWN_SECONDS,
            max_resends: DEFAULT_MAX_RESENDS,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            password_min_length: DEFAULT_PASSWORD_MIN_LENGTH,
        }
    }
}

impl ResetPolicy {
    #[must_use]
    pub fn with_code_ttl_seconds(mut self, seconds: i64) -> Self {
        self.code_ttl_seconds = seconds.clamp(1, MAX_WINDOW_SECONDS);
        self
    }

    #[must_use]
    pub fn with_resend_cooldown_seconds(mut self, seconds: i64) -> Self {
        self.resend_cooldown_seconds = seconds.clamp(0, MAX_WINDOW_SECONDS);
        self
    }

    #[must_use]
    pub fn with_max_resends(mut self, max: i32) -> Self {
        self.max_resends = max.max(0);
        self
    }

    #[must_use]
    pub fn with_max_attempts(mut self, max: i32) -> Self {
        self.max_attempts = max.max(1);
        self
    }

    #[must_use]
    pub fn with_password_min_length(mut self, length: usize) -> Self {
        self.password_min_length = length;
        self
    }

    #[must_use]
    pub fn code_ttl(&self) -> TimeDelta {
        TimeDelta::seconds(self.code_ttl_seconds)
    }

    #[must_use]
    pub fn resend_cooldown(&self) -> TimeDelta {
        TimeDelta::seconds(self.resend_cooldown_seconds)
    }

    #[must_use]
    pub fn max_resends(&self) -> i32 {
        self.max_resends
    }

    #[must_use]
    pub fn max_attempts(&self) -> i32 {
        self.max_attempts
    }

    #[must_use]
    pub fn password_min_length(&self) -> usize {
        self.password_min_length
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_reset_rules() {
        let policy = ResetPolicy::default();
        assert_eq!(policy.code_ttl(), TimeDelta::minutes(10));
        assert_eq!(policy.resend_cooldown(), TimeDelta::seconds(30));
        assert_eq!(policy.max_resends(), 3);
        assert_eq!(policy.max_attempts(), 5);
        assert_eq!(policy.password_min_length(), 8);
    }

    #[test]
    fn builders_override() {
        let policy = ResetPolicy::default()
            .with_code_ttl_seconds(60)
            .with_resend_cooldown_seconds(5)
            .with_max_resends(1)
            .with_max_attempts(2)
            .with_password_min_length(12);
        assert_eq!(policy.code_ttl(), TimeDelta::seconds(60));
        assert_eq!(policy.resend_cooldown(), TimeDelta::seconds(5));
        assert_eq!(policy.max_resends(), 1);
        assert_eq!(policy.max_attempts(), 2);
        assert_eq!(policy.password_min_length(), 12);
    }

    #[test]
    fn builders_clamp_out_of_range_values() {
        let policy = ResetPolicy::default()
            .with_code_ttl_seconds(i64::MAX)
            .with_resend_cooldown_seconds(-5)
            .with_max_resends(-1)
            .with_max_attempts(0);
        assert_eq!(policy.code_ttl(), TimeDelta::days(1));
        assert_eq!(policy.resend_cooldown(), TimeDelta::zero());
        assert_eq!(policy.max_resends(), 0);
        assert_eq!(policy.max_attempts(), 1);

        let policy = ResetPolicy::default()
            .with_code_ttl_seconds(0)
            .with_resend_cooldown_seconds(i64::MAX);
        assert_eq!(policy.code_ttl(), TimeDelta::seconds(1));
        assert_eq!(policy.resend_cooldown(), TimeDelta::days(1));
    }
}
