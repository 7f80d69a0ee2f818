use anyhow::Result;
use clap::{Arg, ArgMatches, Command};

use crate::reset::MAX_WINDOW_SECONDS;

pub const ARG_OTP_TTL_SECONDS: &str = "otp-ttl-seconds";
pub const ARG_OTP_RESEND_COOLDOWN_SECONDS: &str = "otp-resend-cooldown-seconds";
pub const ARG_OTP_MAX_RESENDS: &str = "otp-max-resends";
pub const ARG_OTP_MAX_ATTEMPTS: &str = "otp-max-attempts";
pub const ARG_PASSWORD_MIN_LENGTH: &str = "password-min-length";

#[derive(Debug, Clone)]
pub struct Options {
    pub otp_ttl_seconds: i64,
    pub otp_resend_cooldown_seconds: i64,
    pub otp_max_resends: i32,
    pub otp_max_attempts: i32,
    pub password_min_length: usize,
}

impl Options {
    /// # Errors
    /// Returns an error if a value is missing.
    pub fn parse(matches: &ArgMatches) -> Result<Self> {
        Ok(Self {
            otp_ttl_seconds: read(matches, ARG_OTP_TTL_SECONDS)?,
            otp_resend_cooldown_seconds: read(matches, ARG_OTP_RESEND_COOLDOWN_SECONDS)?,
            otp_max_resends: read(matches, ARG_OTP_MAX_RESENDS)?,
            otp_max_attempts: read(matches, ARG_OTP_MAX_ATTEMPTS)?,
            password_min_length: read(matches, ARG_PASSWORD_MIN_LENGTH)?,
        })
    }
}

fn read<T: Clone + Send + Sync + 'static>(matches: &ArgMatches, id: &str) -> Result<T> {
    matches
        .get_one::<T>(id)
        .cloned()
        .ok_or_else(|| anyhow::anyhow!("missing required argument: --{id}"))
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_OTP_TTL_SECONDS)
                .long(ARG_OTP_TTL_SECONDS)
                .help("Lifetime of a password reset code in seconds")
                .env("INTERNTRACK_OTP_TTL_SECONDS")
                .default_value("600")
                .value_parser(clap::value_parser!(i64).range(1..=MAX_WINDOW_SECONDS)),
        )
        .arg(
            Arg::new(ARG_OTP_RESEND_COOLDOWN_SECONDS)
                .long(ARG_OTP_RESEND_COOLDOWN_SECONDS)
                .help("Minimum wait between code resends in seconds")
                .env("INTERNTRACK_OTP_RESEND_COOLDOWN_SECONDS")
                .default_value("30")
                .value_parser(clap::value_parser!(i64).range(0..=MAX_WINDOW_SECONDS)),
        )
        .arg(
            Arg::new(ARG_OTP_MAX_RESENDS)
                .long(ARG_OTP_MAX_RESENDS)
                .help("Maximum resends per reset request")
                .env("INTERNTRACK_OTP_MAX_RESENDS")
                .default_value("3")
                .value_parser(clap::value_parser!(i32).range(0..)),
        )
        .arg(
            Arg::new(ARG_OTP_MAX_ATTEMPTS)
                .long(ARG_OTP_MAX_ATTEMPTS)
                .help("Failed verifications before a reset request is blocked")
                .env("INTERNTRACK_OTP_MAX_ATTEMPTS")
                .default_value("5")
                .value_parser(clap::value_parser!(i32).range(1..)),
        )
        .arg(
            Arg::new(ARG_PASSWORD_MIN_LENGTH)
                .long(ARG_PASSWORD_MIN_LENGTH)
                .help("Minimum candidate password length")
                .env("INTERNTRACK_PASSWORD_MIN_LENGTH")
                .default_value("8")
                .value_parser(clap::value_parser!(usize)),
        )
}
