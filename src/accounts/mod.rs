//! Candidate accounts as seen by the password reset flow.
//!
//! An account is the application row a candidate created when applying; the
//! reset flow only needs to find it and replace its credential.

pub mod credential;

use anyhow::Result;
use async_trait::async_trait;
use regex::Regex;
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Account {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub phone: String,
}

#[async_trait]
pub trait AccountStore: Send + Sync {
    async fn find_by_email(&self, email: &str) -> Result<Option<Account>>;

    /// Lookup by the normalized phone number on file.
    async fn find_by_phone(&self, phone: &str) -> Result<Option<Account>>;

    /// Replace the stored credential with an already hashed value.
    async fn update_credential(&self, account_id: Uuid, password_hash: &str) -> Result<()>;
}

/// Normalize an email for lookup/uniqueness checks.
#[must_use]
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Basic email format check on already-normalized input.
#[must_use]
pub fn valid_email(email_normalized: &str) -> bool {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").is_ok_and(|regex| regex.is_match(email_normalized))
}

/// Strip separators people type into phone numbers (`+91 98765-43210`).
#[must_use]
pub fn normalize_phone(phone: &str) -> String {
    phone
        .chars()
        .filter(|c| !c.is_whitespace() && !matches!(c, '-' | '(' | ')' | '.'))
        .collect()
}

/// Phone numbers on applications are 10 digits.
#[must_use]
pub fn valid_phone(phone_normalized: &str) -> bool {
    phone_normalized.len() == 10 && phone_normalized.chars().all(|c| c.is_ascii_digit())
}
