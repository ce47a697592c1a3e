//! JWT issuance and verification for secure-mode admission.
//!
//! The broker signs a single-field claim set -- `{"key": "<host-ip>"}` --
//! with HS256. Unlike typical access tokens there is no expiry: the
//! original broker mints one long-lived token per deployment and expects
//! operators to rotate it by restarting with a new secret.

use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Claims {
    pub key: String,
}

/// Mints a token binding `key` (normally the server's own host identifier)
/// to `secret`.
///
/// # Errors
///
/// Returns an error if the underlying HS256 signing operation fails.
pub fn generate_token(secret: &str, key: &str) -> Result<String, jsonwebtoken::errors::Error> {
    let claims = Claims { key: key.to_string() };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
}

/// Verifies `token` against `secret` and checks its `key` claim matches
/// `expected_key`.
///
/// Claims carry no `exp`, so expiry validation is disabled -- a missing
/// `exp` would otherwise make every token fail the default validator.
#[must_use]
pub fn authenticate(secret: &str, token: &str, expected_key: &str) -> bool {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.validate_exp = false;
    validation.required_spec_claims.clear();

    match decode::<Claims>(token, &DecodingKey::from_secret(secret.as_bytes()), &validation) {
        Ok(data) => data.claims.key == expected_key,
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generate_and_authenticate_roundtrip() {
        let token = generate_token("s3cr3t", "10.0.0.1").expect("token generation should succeed");
        assert!(authenticate("s3cr3t", &token, "10.0.0.1"));
    }

    #[test]
    fn authenticate_rejects_wrong_secret() {
        let token = generate_token("s3cr3t", "10.0.0.1").unwrap();
        assert!(!authenticate("different-secret", &token, "10.0.0.1"));
    }

    #[test]
    fn authenticate_rejects_mismatched_key() {
        let token = generate_token("s3cr3t", "10.0.0.1").unwrap();
        assert!(!authenticate("s3cr3t", &token, "10.0.0.2"));
    }

    #[test]
    fn authenticate_rejects_malformed_token() {
        assert!(!authenticate("s3cr3t", "@@@", "10.0.0.1"));
    }

    #[test]
    fn authenticate_rejects_empty_token() {
        assert!(!authenticate("s3cr3t", "", "10.0.0.1"));
    }
}

#[cfg(test)]
mod property_tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        /// Testable property 5 (spec §8): for any secret and key, signing
        /// then verifying recovers exactly the key that was signed.
        #[test]
        fn token_round_trips_for_any_secret_and_key(
            secret in "[a-zA-Z0-9]{1,32}",
            key in "[a-zA-Z0-9.]{1,32}",
        ) {
            let token = generate_token(&secret, &key).expect("signing should not fail");
            prop_assert!(authenticate(&secret, &token, &key));
        }

        #[test]
        fn token_rejected_when_key_does_not_match(
            secret in "[a-zA-Z0-9]{1,32}",
            key in "[a-zA-Z0-9.]{1,32}",
            other_key in "[a-zA-Z0-9.]{1,32}",
        ) {
            prop_assume!(key != other_key);
            let token = generate_token(&secret, &key).unwrap();
            prop_assert!(!authenticate(&secret, &token, &other_key));
        }
    }
}
