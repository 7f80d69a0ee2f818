//! Six digit one-time codes and their salted hashes.

use anyhow::Result;
use argon2::Argon2;
use rand::{Rng, rngs::OsRng};

use crate::accounts::credential::{argon2_with, hash_with, verify_with};

pub const CODE_LENGTH: usize = 6;

// Lighter than account password params; codes are short-lived.
const OTP_MEMORY_KIB: u32 = 8 * 1024;
const OTP_ITERATIONS: u32 = 2;

/// Uniform over `000000..=999999`, leading zeros kept.
#[must_use]
pub fn generate_code() -> String {
    let value: u32 = OsRng.gen_range(0..1_000_000);
    format!("{value:06}")
}

fn hasher() -> Result<Argon2<'static>> {
    argon2_with(OTP_MEMORY_KIB, OTP_ITERATIONS)
}

/// # Errors
/// Returns an error if hashing fails.
pub fn hash_code(code: &str) -> Result<String> {
    hash_with(&hasher()?, code)
}

/// Compare a submitted code with the stored hash.
///
/// # Errors
/// Returns an error if the stored hash is malformed.
pub fn verify_code(code: &str, hash: &str) -> Result<bool> {
    verify_with(&hasher()?, code, hash)
}

/// Six ASCII digits, nothing else.
#[must_use]
pub fn is_well_formed(code: &str) -> bool {
    code.len() == CODE_LENGTH && code.bytes().all(|b| b.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_codes_are_six_digits() {
        for _ in 0..200 {
            let code = generate_code();
            assert!(is_well_formed(&code), "bad code: {code}");
        }
    }

    #[test]
    fn hash_round_trip() -> Result<()> {
        let hash = hash_code("042137")?;
        assert!(!hash.contains("042137"));
        assert!(verify_code("042137", &hash)?);
        assert!(!verify_code("042138", &hash)?);
        Ok(())
    }

    #[test]
    fn same_code_hashes_differently() -> Result<()> {
        assert_ne!(hash_code("123456")?, hash_code("123456")?);
        Ok(())
    }

    #[test]
    fn well_formed_rejects_other_shapes() {
        assert!(is_well_formed("000000"));
        assert!(!is_well_formed("12345"));
        assert!(!is_well_formed("1234567"));
        assert!(!is_well_formed("12a456"));
        assert!(!is_well_formed(" 12345"));
    }
}
