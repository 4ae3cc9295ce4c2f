//! Password hashing and verification (bcrypt).
//!
//! Both operations are CPU-bound for the duration of the configured cost.
//! Async callers should run them on a blocking thread.

use thiserror::Error;

/// Lowest cost bcrypt accepts. Only suitable for tests and benchmarks.
pub const MIN_COST: u32 = 4;

/// bcrypt only reads the first 72 bytes of its input; longer passwords are
/// refused rather than truncated.
pub const MAX_PASSWORD_BYTES: usize = 72;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PasswordError {
    /// The hashing primitive failed (e.g. the OS entropy source is unavailable).
    #[error("password hashing failed: {0}")]
    Hashing(String),

    #[error("password exceeds {MAX_PASSWORD_BYTES} bytes")]
    TooLong,
}

/// Hashes and verifies passwords with a salted, self-describing bcrypt digest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CredentialVerifier {
    cost: u32,
}

impl Default for CredentialVerifier {
    fn default() -> Self {
        Self {
            cost: bcrypt::DEFAULT_COST,
        }
    }
}

impl CredentialVerifier {
    /// Use an explicit cost factor, clamped to bcrypt's supported range.
    pub fn with_cost(cost: u32) -> Self {
        Self {
            cost: cost.clamp(MIN_COST, 31),
        }
    }

    pub fn cost(&self) -> u32 {
        self.cost
    }

    /// Hash `password` with a fresh random salt.
    ///
    /// The output embeds algorithm, cost and salt, so it can be stored as-is.
    pub fn hash(&self, password: &str) -> Result<String, PasswordError> {
        if password.len() > MAX_PASSWORD_BYTES {
            return Err(PasswordError::TooLong);
        }
        bcrypt::hash(password, self.cost).map_err(|e| PasswordError::Hashing(e.to_string()))
    }

    /// Check `password` against a stored hash.
    ///
    /// Returns `false` for an empty or over-long password, a malformed hash,
    /// or a mismatch.
    pub fn verify(&self, password: &str, stored_hash: &str) -> bool {
        if password.is_empty() || password.len() > MAX_PASSWORD_BYTES || stored_hash.is_empty() {
            return false;
        }
        match bcrypt::verify(password, stored_hash) {
            Ok(matches) => matches,
            Err(e) => {
                tracing::debug!(error = %e, "stored password hash could not be parsed");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn fast() -> CredentialVerifier {
        CredentialVerifier::with_cost(MIN_COST)
    }

    #[test]
    fn hash_then_verify() {
        let v = fast();
        let hash = v.hash("passwordadmin").unwrap();
        assert!(v.verify("passwordadmin", &hash));
        assert!(!v.verify("passwordadmim", &hash));
    }

    #[test]
    fn hash_embeds_cost_and_is_salted() {
        let v = fast();
        let a = v.hash("secret-123").unwrap();
        let b = v.hash("secret-123").unwrap();

        assert!(a.starts_with("$2b$04$"), "unexpected hash format: {a}");
        assert_ne!(a, b);
        assert!(v.verify("secret-123", &a));
        assert!(v.verify("secret-123", &b));
    }

    #[test]
    fn verify_reads_cost_from_stored_hash() {
        let hash = fast().hash("secret-123").unwrap();
        assert!(CredentialVerifier::with_cost(10).verify("secret-123", &hash));
    }

    #[test]
    fn malformed_or_empty_inputs_never_verify() {
        let v = fast();
        let hash = v.hash("secret-123").unwrap();

        assert!(!v.verify("", &hash));
        assert!(!v.verify("secret-123", ""));
        assert!(!v.verify("secret-123", "plaintext"));
        assert!(!v.verify("secret-123", "$2b$04$truncated"));
    }

    #[test]
    fn cost_is_clamped() {
        assert_eq!(CredentialVerifier::with_cost(1).cost(), MIN_COST);
        assert_eq!(CredentialVerifier::with_cost(99).cost(), 31);
        assert_eq!(CredentialVerifier::default().cost(), bcrypt::DEFAULT_COST);
    }

    #[test]
    fn passwords_sharing_a_long_prefix_are_not_confused() {
        let v = fast();
        let at_limit = "a".repeat(MAX_PASSWORD_BYTES);
        let hash = v.hash(&at_limit).unwrap();
        assert!(v.verify(&at_limit, &hash));

        let real = format!("{at_limit}correct-suffix");
        let guess = format!("{at_limit}attacker-guess");
        assert_eq!(v.hash(&real), Err(PasswordError::TooLong));
        assert!(!v.verify(&guess, &hash));
        assert!(!v.verify(&real, &hash));
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 16,
            ..ProptestConfig::default()
        })]

        /// Property: every password verifies against its own hash.
        #[test]
        fn own_hash_verifies(password in "[ -~]{1,64}") {
            let v = fast();
            let hash = v.hash(&password).unwrap();
            prop_assert!(v.verify(&password, &hash));
        }

        /// Property: a different password never verifies against the hash.
        #[test]
        fn other_password_is_rejected(a in "[ -~]{1,64}", b in "[ -~]{1,64}") {
            prop_assume!(a != b);
            let v = fast();
            let hash = v.hash(&b).unwrap();
            prop_assert!(!v.verify(&a, &hash));
        }
    }
}
