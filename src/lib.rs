//! # Interntrack (Internship Applications & Account Recovery)
//!
//! `interntrack` is the backend for an internship application desk. Candidates
//! submit applications, administrators move them through review, and every
//! status change lands in the candidate's notification feed and inbox.
//!
//! ## Password Reset (`OTP`)
//!
//! Candidates recover access with a six digit one-time code:
//!
//! - **Request:** a new reset chain is opened for the account and the code is
//!   emailed. The plaintext code is never stored; rows hold an Argon2id hash.
//! - **Resend:** reissues a code for the active chain, throttled by a cooldown
//!   and capped per chain.
//! - **Verify:** lazy expiry check, bounded attempts, then `verified`.
//! - **Reset:** only a `verified` chain may set a new password; it becomes `used`.
//!
//! Reset rows are never deleted. The most recently created row for an email is
//! the only one consulted; older rows stay as history.
//!
//! ## Application Tracking
//!
//! Status changes (`Applied`, `In Review`, `Selected`, `Rejected`,
//! `In Training`, `Completed`) post a notice to the candidate's in-app feed and
//! send a best-effort email.

pub mod accounts;
pub mod api;
pub mod applications;
pub mod cli;
pub mod clock;
pub mod notify;
pub mod reset;
pub mod store;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_git_commit_hash_format() {
        if GIT_COMMIT_HASH == "unknown" {
            // Acceptable in non-git build environments
            return;
        }
        assert!(
            GIT_COMMIT_HASH.chars().all(|c| c.is_ascii_hexdigit()),
            "GIT_COMMIT_HASH should be a hex string, got: {GIT_COMMIT_HASH}"
        );
        assert!(
            GIT_COMMIT_HASH.len() >= 7,
            "GIT_COMMIT_HASH should be at least 7 characters long, got: {GIT_COMMIT_HASH}"
        );
    }
}
