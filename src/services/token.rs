// src/services/token.rs
//! Token issuance and verification.
//!
//! Tokens are HS256 JWTs carrying the user id plus jti/iat/nbf/exp.
//! Verification is purely computational; session liveness (revocation)
//! is the session registry's concern.

use chrono::{Duration, Utc};
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use uuid::Uuid;

use crate::auth::models::Claims;
use crate::common::error::AuthError;

/// Fixed token lifetime (7 days). Session expiry uses the same value
/// so a session outlives its token by exactly nothing.
pub const TOKEN_LIFETIME_SECS: i64 = 7 * 24 * 60 * 60;

pub fn token_lifetime() -> Duration {
    Duration::seconds(TOKEN_LIFETIME_SECS)
}

/// Issue a signed token for the given user.
pub fn issue_token(user_id: &str, secret: &str) -> Result<String, AuthError> {
    let now = Utc::now().timestamp();
    let claims = Claims {
        sub: user_id.to_string(),
        jti: Uuid::new_v4().to_string(),
        iat: now,
        nbf: now,
        exp: now + TOKEN_LIFETIME_SECS,
    };

    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(AuthError::Signing)
}

/// Verify a token and return the owning user id.
///
/// Only HS256 is accepted; the algorithm is pinned, never taken from
/// the token header.
pub fn verify_token(token: &str, secret: &str) -> Result<String, AuthError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.leeway = 0;
    validation.validate_nbf = true;

    match decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &validation,
    ) {
        Ok(data) => Ok(data.claims.sub),
        Err(e) => Err(match e.kind() {
            ErrorKind::ExpiredSignature => AuthError::TokenExpired,
            ErrorKind::InvalidSignature
            | ErrorKind::InvalidAlgorithm
            | ErrorKind::InvalidAlgorithmName
            | ErrorKind::ImmatureSignature => AuthError::SignatureInvalid,
            _ => AuthError::Malformed,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "test_secret_key";

    #[test]
    fn test_issue_then_verify_round_trip() {
        let token = issue_token("U_TEST123456", SECRET).expect("issue");
        let user_id = verify_token(&token, SECRET).expect("verify");
        assert_eq!(user_id, "U_TEST123456");
    }

    #[test]
    fn test_verify_fails_with_wrong_secret() {
        let token = issue_token("U_TEST123456", SECRET).expect("issue");
        let err = verify_token(&token, "some_other_secret").unwrap_err();
        assert!(matches!(err, AuthError::SignatureInvalid));
    }

    #[test]
    fn test_expired_token_is_reported_as_expired() {
        let past = Utc::now().timestamp() - 2 * TOKEN_LIFETIME_SECS;
        let claims = Claims {
            sub: "U_TEST123456".to_string(),
            jti: "jti-1".to_string(),
            iat: past,
            nbf: past,
            exp: past + TOKEN_LIFETIME_SECS,
        };
        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .unwrap();

        let err = verify_token(&token, SECRET).unwrap_err();
        assert!(matches!(err, AuthError::TokenExpired));
    }

    #[test]
    fn test_algorithm_is_not_negotiated_from_the_token() {
        let now = Utc::now().timestamp();
        let claims = Claims {
            sub: "U_TEST123456".to_string(),
            jti: "jti-2".to_string(),
            iat: now,
            nbf: now,
            exp: now + TOKEN_LIFETIME_SECS,
        };
        let hs384 = encode(
            &Header::new(Algorithm::HS384),
            &claims,
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .unwrap();

        let err = verify_token(&hs384, SECRET).unwrap_err();
        assert!(matches!(err, AuthError::SignatureInvalid));
    }

    #[test]
    fn test_garbage_token_is_malformed() {
        let err = verify_token("not.a.token", SECRET).unwrap_err();
        assert!(matches!(err, AuthError::Malformed));
    }

    #[test]
    fn test_tokens_carry_unique_ids() {
        let a = issue_token("U_TEST123456", SECRET).unwrap();
        let b = issue_token("U_TEST123456", SECRET).unwrap();
        assert_ne!(a, b);
    }
}
