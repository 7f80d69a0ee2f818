//! Route handlers.

pub mod admin;
pub mod applications;
pub mod health;
pub mod notifications;
pub mod password_reset;
pub mod root;
pub mod types;
