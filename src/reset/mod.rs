//! OTP password reset.
//!
//! Flow summary:
//! - `request_code` opens a new chain (row) for the account and emails a code.
//! - `resend_code` reissues the code for the pending chain (cooldown + cap).
//! - `verify_code` checks expiry and attempts lazily, then marks the chain `verified`.
//! - `set_new_password` stores the new credential and consumes the `verified`
//!   chain in one store write.
//!
//! Only the latest row per email is ever consulted; older chains stay as history.

mod error;
mod model;
pub mod otp;
mod policy;
mod service;
mod store;

pub use error::ResetError;
pub use model::{ResetRequest, ResetStatus};
pub use policy::{MAX_WINDOW_SECONDS, ResetPolicy};
pub use service::{PasswordReset, ResetReceipt};
pub use store::{ResetStore, UpdateOutcome};
