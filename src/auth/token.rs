// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! HS256 bearer token issuing and verification.
//!
//! Expiration is the only invalidation mechanism. A token whose `exp` is at
//! or before the verification instant is rejected; there is no leeway.

use std::time::Duration;

use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};

use super::{claims::Claims, AuthError};

/// A freshly signed token and its expiry.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub expires_at: i64,
}

/// Signs and verifies bearer tokens with a shared HMAC secret.
pub struct TokenIssuer {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    lifetime: Duration,
}

impl TokenIssuer {
    /// Create an issuer for the given secret and token lifetime.
    pub fn new(secret: &str, lifetime: Duration) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        // Expiry is checked against an explicit instant in `verify_at`.
        validation.validate_exp = false;
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "sub"]);

        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
            lifetime,
        }
    }

    /// Issue a token for `user_id`, valid from now for the configured lifetime.
    pub fn issue(&self, user_id: &str) -> Result<IssuedToken, AuthError> {
        self.issue_at(user_id, chrono::Utc::now().timestamp())
    }

    /// Issue a token as if the current time were `now` (Unix seconds).
    pub fn issue_at(&self, user_id: &str, now: i64) -> Result<IssuedToken, AuthError> {
        let lifetime = i64::try_from(self.lifetime.as_secs()).unwrap_or(i64::MAX);
        let claims = Claims {
            sub: user_id.to_string(),
            iat: now,
            exp: now.saturating_add(lifetime),
        };
        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| AuthError::InternalError(format!("token signing failed: {e}")))?;
        Ok(IssuedToken {
            token,
            expires_at: claims.exp,
        })
    }

    /// Verify a token now and return the user id it is bound to.
    pub fn verify(&self, token: &str) -> Result<String, AuthError> {
        self.verify_at(token, chrono::Utc::now().timestamp())
    }

    /// Verify a token as of `now` (Unix seconds).
    pub fn verify_at(&self, token: &str, now: i64) -> Result<String, AuthError> {
        let data = decode::<Claims>(token, &self.decoding_key, &self.validation).map_err(|e| {
            match e.kind() {
                ErrorKind::InvalidSignature => AuthError::InvalidSignature,
                _ => AuthError::MalformedToken,
            }
        })?;

        if now >= data.claims.exp {
            return Err(AuthError::TokenExpired);
        }
        Ok(data.claims.sub)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};

    const WEEK: Duration = Duration::from_secs(7 * 24 * 60 * 60);
    const T: i64 = 1_700_000_000;

    fn issuer() -> TokenIssuer {
        TokenIssuer::new("test-secret", WEEK)
    }

    #[test]
    fn issued_token_round_trips_subject() {
        let issuer = issuer();
        let issued = issuer.issue("user-1").unwrap();
        assert!(!issued.token.is_empty());
        assert_eq!(issuer.verify(&issued.token).unwrap(), "user-1");
    }

    #[test]
    fn accepted_just_before_and_rejected_just_after_lifetime() {
        let issuer = issuer();
        let issued = issuer.issue_at("user-1", T).unwrap();
        let lifetime = WEEK.as_secs() as i64;
        assert_eq!(issued.expires_at, T + lifetime);

        assert_eq!(
            issuer.verify_at(&issued.token, T + lifetime - 1).unwrap(),
            "user-1"
        );
        assert!(matches!(
            issuer.verify_at(&issued.token, T + lifetime + 1),
            Err(AuthError::TokenExpired)
        ));
        assert!(matches!(
            issuer.verify_at(&issued.token, T + lifetime),
            Err(AuthError::TokenExpired)
        ));
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let issued = issuer().issue("user-1").unwrap();
        let other = TokenIssuer::new("other-secret", WEEK);
        assert!(matches!(
            other.verify(&issued.token),
            Err(AuthError::InvalidSignature)
        ));
    }

    #[test]
    fn tampered_payload_is_rejected() {
        let issuer = issuer();
        let issued = issuer.issue("user-1").unwrap();
        let parts: Vec<&str> = issued.token.split('.').collect();
        assert_eq!(parts.len(), 3);

        let mut claims: serde_json::Value =
            serde_json::from_slice(&URL_SAFE_NO_PAD.decode(parts[1]).unwrap()).unwrap();
        claims["sub"] = "admin".into();
        let forged_payload = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&claims).unwrap());
        let forged = format!("{}.{}.{}", parts[0], forged_payload, parts[2]);

        assert!(matches!(
            issuer.verify(&forged),
            Err(AuthError::InvalidSignature)
        ));
    }

    #[test]
    fn garbage_and_unsigned_tokens_are_rejected() {
        let issuer = issuer();
        assert!(matches!(
            issuer.verify("not-a-token"),
            Err(AuthError::MalformedToken)
        ));

        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none","typ":"JWT"}"#);
        let payload = URL_SAFE_NO_PAD.encode(br#"{"sub":"user-1","iat":0,"exp":9999999999}"#);
        assert!(issuer.verify(&format!("{header}.{payload}.")).is_err());
    }

    #[test]
    fn token_without_subject_is_rejected() {
        #[derive(serde::Serialize)]
        struct NoSub {
            exp: i64,
        }
        let token = encode(
            &Header::new(Algorithm::HS256),
            &NoSub { exp: T + 100 },
            &EncodingKey::from_secret(b"test-secret"),
        )
        .unwrap();
        assert!(matches!(
            issuer().verify_at(&token, T),
            Err(AuthError::MalformedToken)
        ));
    }
}
