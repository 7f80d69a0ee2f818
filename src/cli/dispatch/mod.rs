//! Map parsed CLI arguments to an [`Action`].

use crate::cli::actions::{Action, server::Args};
use crate::cli::commands::{ARG_ADMIN_TOKEN, ARG_DSN, ARG_PORT, outbox, reset};
use anyhow::{Context, Result};
use secrecy::SecretString;

/// Map validated CLI matches to a server action.
///
/// # Errors
/// Returns an error if required arguments are missing or inconsistent.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let port = matches.get_one::<u16>(ARG_PORT).copied().unwrap_or(8080);
    let dsn = matches
        .get_one::<String>(ARG_DSN)
        .cloned()
        .context("missing required argument: --dsn")?;
    let admin_token = matches
        .get_one::<String>(ARG_ADMIN_TOKEN)
        .filter(|token| !token.trim().is_empty())
        .cloned()
        .context("missing required argument: --admin-token")?;

    let reset_opts = reset::Options::parse(matches)?;
    let outbox_opts = outbox::Options::parse(matches)?;

    Ok(Action::Server(Args {
        port,
        dsn,
        admin_token: SecretString::from(admin_token),
        otp_ttl_seconds: reset_opts.otp_ttl_seconds,
        otp_resend_cooldown_seconds: reset_opts.otp_resend_cooldown_seconds,
        otp_max_resends: reset_opts.otp_max_resends,
        otp_max_attempts: reset_opts.otp_max_attempts,
        password_min_length: reset_opts.password_min_length,
        notifier: outbox_opts.notifier,
        outbox_poll_seconds: outbox_opts.poll_seconds,
        outbox_batch_size: outbox_opts.batch_size,
        outbox_max_attempts: outbox_opts.max_attempts,
        outbox_backoff_base_seconds: outbox_opts.backoff_base_seconds,
        outbox_backoff_max_seconds: outbox_opts.backoff_max_seconds,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::commands::outbox::NotifierKind;
    use secrecy::ExposeSecret;

    #[test]
    fn builds_server_args_from_env() {
        temp_env::with_vars(
            [
                ("INTERNTRACK_DSN", Some("postgres://localhost/interntrack")),
                ("INTERNTRACK_ADMIN_TOKEN", Some("s3cret")),
                ("INTERNTRACK_OTP_MAX_RESENDS", Some("2")),
                ("INTERNTRACK_NOTIFIER", Some("log")),
            ],
            || {
                let matches = crate::cli::commands::new().get_matches_from(vec!["interntrack"]);
                let action = handler(&matches);
                assert!(action.is_ok());
                if let Ok(Action::Server(args)) = action {
                    assert_eq!(args.dsn, "postgres://localhost/interntrack");
                    assert_eq!(args.admin_token.expose_secret(), "s3cret");
                    assert_eq!(args.otp_max_resends, 2);
                    assert_eq!(args.notifier, NotifierKind::Log);
                }
            },
        );
    }

    #[test]
    fn rejects_blank_admin_token() {
        temp_env::with_vars(
            [
                ("INTERNTRACK_DSN", Some("postgres://localhost/interntrack")),
                ("INTERNTRACK_ADMIN_TOKEN", Some("   ")),
            ],
            || {
                let matches = crate::cli::commands::new().get_matches_from(vec!["interntrack"]);
                let result = handler(&matches);
                assert!(result.is_err());
                if let Err(err) = result {
                    assert!(
                        err.to_string()
                            .contains("missing required argument: --admin-token")
                    );
                }
            },
        );
    }

    #[test]
    fn rejects_non_positive_ttl() {
        temp_env::with_vars(
            [
                ("INTERNTRACK_DSN", Some("postgres://localhost/interntrack")),
                ("INTERNTRACK_ADMIN_TOKEN", Some("s3cret")),
                ("INTERNTRACK_OTP_TTL_SECONDS", Some("0")),
            ],
            || {
                let matches = crate::cli::commands::new().get_matches_from(vec!["interntrack"]);
                assert!(handler(&matches).is_err());
            },
        );
    }
}
