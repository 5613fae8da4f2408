//! Access token verification.
//!
//! Structure and signature are checked by [`jws::decode`]; every claim rule
//! below runs with an explicit `now` and maps to one [`VerificationError`]
//! variant.
//!
//! Order of checks:
//!
//! 1. structure and signature (`Malformed` / `BadSignature`)
//! 2. `iss` equals the process issuer (`BadIssuer`)
//! 3. `aud` contains the issuer, only under [`AudienceValidation::Enforce`]
//! 4. `now <= exp` (`Expired`), then `iat <= now` (`NotYetValid`)

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::jws::{self, JwsError};
use super::keys::KeyProvider;

/// Whether the `aud` claim is checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudienceValidation {
    /// Accept any audience.
    #[default]
    Ignore,
    /// Require the issuer identifier among the audiences.
    Enforce,
}

/// Why a token was rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VerificationError {
    /// Not a well-formed JWS, or the claims are missing or mistyped.
    #[error("Malformed token")]
    Malformed,
    /// Signature does not verify against the process key.
    #[error("Invalid token signature")]
    BadSignature,
    /// `iss` does not match the process issuer.
    #[error("Token issuer mismatch")]
    BadIssuer,
    /// `aud` does not contain the process issuer.
    #[error("Token audience mismatch")]
    BadAudience,
    /// `now` is past `exp`.
    #[error("Token expired")]
    Expired,
    /// `iat` is in the future.
    #[error("Token not yet valid")]
    NotYetValid,
}

impl VerificationError {
    /// Stable snake_case label for logs and audit events.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Malformed => "malformed",
            Self::BadSignature => "bad_signature",
            Self::BadIssuer => "bad_issuer",
            Self::BadAudience => "bad_audience",
            Self::Expired => "expired",
            Self::NotYetValid => "not_yet_valid",
        }
    }
}

/// Claims of a token that passed every check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VerifiedClaims {
    /// `sub`: the principal's username.
    pub subject: String,
    /// `role`: granted roles, empty when the claim is absent.
    pub roles: Vec<String>,
    /// `iat`, unix seconds.
    pub issued_at: u64,
    /// `exp`, unix seconds.
    pub expires_at: u64,
}

#[derive(Debug, Deserialize)]
struct RawClaims {
    iss: String,
    sub: String,
    #[serde(default)]
    aud: serde_json::Value,
    iat: u64,
    exp: u64,
    #[serde(default)]
    role: Vec<String>,
}

/// Verifies tokens minted by this process.
#[derive(Debug, Clone)]
pub struct TokenVerifier {
    keys: Arc<KeyProvider>,
    issuer: String,
    audience: AudienceValidation,
}

impl TokenVerifier {
    /// Create a verifier for tokens signed by `keys` under `issuer`.
    pub fn new(keys: Arc<KeyProvider>, issuer: impl Into<String>, audience: AudienceValidation) -> Self {
        Self {
            keys,
            issuer: issuer.into(),
            audience,
        }
    }

    /// Verify `raw` at time `now` (unix seconds).
    ///
    /// # Errors
    ///
    /// Returns the first [`VerificationError`] in check order.
    pub fn verify(&self, raw: &str, now: u64) -> Result<VerifiedClaims, VerificationError> {
        let (_, claims) = jws::decode::<RawClaims>(raw, &self.keys).map_err(|e| {
            debug!(error = %e, "Token decode failed");
            match e {
                JwsError::Algorithm(_) | JwsError::Signature => VerificationError::BadSignature,
                JwsError::Malformed | JwsError::Claims(_) | JwsError::Signing => {
                    VerificationError::Malformed
                }
            }
        })?;

        if claims.iss != self.issuer {
            return Err(VerificationError::BadIssuer);
        }

        if self.audience == AudienceValidation::Enforce && !audience_contains(&claims.aud, &self.issuer) {
            return Err(VerificationError::BadAudience);
        }

        if now > claims.exp {
            return Err(VerificationError::Expired);
        }
        if now < claims.iat {
            return Err(VerificationError::NotYetValid);
        }

        Ok(VerifiedClaims {
            subject: claims.sub,
            roles: claims.role,
            issued_at: claims.iat,
            expires_at: claims.exp,
        })
    }
}

/// `aud` may be a single string or an array of strings.
fn audience_contains(aud: &serde_json::Value, expected: &str) -> bool {
    match aud {
        serde_json::Value::String(s) => s == expected,
        serde_json::Value::Array(arr) => arr.iter().any(|v| v.as_str() == Some(expected)),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::credentials::Principal;
    use crate::auth::issuer::{ACCESS_TOKEN_TTL_SECS, AccessClaims, TokenIssuer};
    use base64::Engine;
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use crate::auth::jws::JwsHeader;
    use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};

    const NOW: u64 = 1_700_000_000;

    fn principal() -> Principal {
        Principal {
            username: "USER_A".to_string(),
            password_hash: String::new(),
            roles: vec!["ROLE_A".to_string()],
        }
    }

    fn pair(issuer: &str) -> (Arc<KeyProvider>, TokenIssuer, TokenVerifier) {
        let keys = Arc::new(KeyProvider::generate().unwrap());
        let tokens = TokenIssuer::new(Arc::clone(&keys), issuer);
        let verifier = TokenVerifier::new(Arc::clone(&keys), issuer, AudienceValidation::Ignore);
        (keys, tokens, verifier)
    }

    fn sign(keys: &KeyProvider, claims: &serde_json::Value) -> String {
        jws::encode(&JwsHeader::for_key(keys), claims, keys).unwrap()
    }

    fn foreign_claims() -> AccessClaims {
        AccessClaims {
            iss: "issuer-x".to_string(),
            aud: vec!["issuer-x".to_string()],
            sub: "USER_A".to_string(),
            iat: NOW,
            exp: NOW + 60,
            role: vec!["ROLE_B".to_string()],
        }
    }

    #[test]
    fn issued_token_verifies_with_same_claims() {
        // GIVEN: a token issued at NOW
        let (_, tokens, verifier) = pair("issuer-x");
        let token = tokens.issue(&principal(), NOW).unwrap();

        // WHEN: verified one minute later
        let claims = verifier.verify(&token, NOW + 60).unwrap();

        // THEN: subject and roles survive unchanged
        assert_eq!(claims.subject, "USER_A");
        assert_eq!(claims.roles, vec!["ROLE_A".to_string()]);
        assert_eq!(claims.issued_at, NOW);
        assert_eq!(claims.expires_at, NOW + ACCESS_TOKEN_TTL_SECS);
    }

    #[test]
    fn token_is_valid_up_to_and_including_exp() {
        let (_, tokens, verifier) = pair("issuer-x");
        let token = tokens.issue(&principal(), NOW).unwrap();

        assert!(verifier.verify(&token, NOW + ACCESS_TOKEN_TTL_SECS).is_ok());
        assert_eq!(
            verifier.verify(&token, NOW + ACCESS_TOKEN_TTL_SECS + 1),
            Err(VerificationError::Expired)
        );
    }

    #[test]
    fn token_from_the_future_is_not_yet_valid() {
        let (_, tokens, verifier) = pair("issuer-x");
        let token = tokens.issue(&principal(), NOW).unwrap();

        assert_eq!(verifier.verify(&token, NOW - 1), Err(VerificationError::NotYetValid));
    }

    #[test]
    fn flipped_signature_byte_is_bad_signature() {
        // GIVEN: a valid token with one signature byte altered
        let (_, tokens, verifier) = pair("issuer-x");
        let token = tokens.issue(&principal(), NOW).unwrap();
        let (signing_input, signature) = token.rsplit_once('.').unwrap();
        let mut sig = URL_SAFE_NO_PAD.decode(signature).unwrap();
        sig[10] ^= 0x01;
        let tampered = format!("{signing_input}.{}", URL_SAFE_NO_PAD.encode(&sig));

        // WHEN/THEN: verification fails on the signature
        assert_eq!(verifier.verify(&tampered, NOW), Err(VerificationError::BadSignature));
    }

    #[test]
    fn token_signed_by_other_key_is_bad_signature() {
        let (_, tokens, _) = pair("issuer-x");
        let (_, _, other_verifier) = pair("issuer-x");
        let token = tokens.issue(&principal(), NOW).unwrap();

        assert_eq!(other_verifier.verify(&token, NOW), Err(VerificationError::BadSignature));
    }

    #[test]
    fn token_from_other_issuer_is_rejected() {
        // GIVEN: one key shared by issuers X and Y
        let keys = Arc::new(KeyProvider::generate().unwrap());
        let tokens = TokenIssuer::new(Arc::clone(&keys), "issuer-x");
        let verifier = TokenVerifier::new(keys, "issuer-y", AudienceValidation::Ignore);

        // WHEN/THEN: Y refuses X's token
        let token = tokens.issue(&principal(), NOW).unwrap();
        assert_eq!(verifier.verify(&token, NOW), Err(VerificationError::BadIssuer));
    }

    #[test]
    fn audience_is_only_checked_when_enforced() {
        // GIVEN: a validly signed token whose audience is someone else
        let keys = Arc::new(KeyProvider::generate().unwrap());
        let token = sign(
            &keys,
            &serde_json::json!({
                "iss": "issuer-x", "aud": ["elsewhere"], "sub": "USER_A",
                "iat": NOW, "exp": NOW + 60, "role": ["ROLE_A"]
            }),
        );
        let lenient = TokenVerifier::new(Arc::clone(&keys), "issuer-x", AudienceValidation::Ignore);
        let strict = TokenVerifier::new(keys, "issuer-x", AudienceValidation::Enforce);

        // WHEN/THEN
        assert!(lenient.verify(&token, NOW).is_ok());
        assert_eq!(strict.verify(&token, NOW), Err(VerificationError::BadAudience));
    }

    #[test]
    fn enforced_audience_accepts_own_tokens() {
        let keys = Arc::new(KeyProvider::generate().unwrap());
        let tokens = TokenIssuer::new(Arc::clone(&keys), "issuer-x");
        let strict = TokenVerifier::new(keys, "issuer-x", AudienceValidation::Enforce);

        let token = tokens.issue(&principal(), NOW).unwrap();
        assert!(strict.verify(&token, NOW).is_ok());
    }

    #[test]
    fn missing_role_claim_means_no_roles() {
        let (keys, _, verifier) = pair("issuer-x");
        let token = sign(
            &keys,
            &serde_json::json!({
                "iss": "issuer-x", "aud": ["issuer-x"], "sub": "svc",
                "iat": NOW, "exp": NOW + 60
            }),
        );

        let claims = verifier.verify(&token, NOW).unwrap();
        assert!(claims.roles.is_empty());
    }

    #[test]
    fn missing_required_claim_is_malformed() {
        let (keys, _, verifier) = pair("issuer-x");
        let token = sign(&keys, &serde_json::json!({ "iss": "issuer-x", "sub": "svc" }));

        assert_eq!(verifier.verify(&token, NOW), Err(VerificationError::Malformed));
    }

    #[test]
    fn garbage_is_malformed() {
        let (_, _, verifier) = pair("issuer-x");

        for raw in ["", "not-a-jwt", "a.b", "a.b.c"] {
            assert_eq!(verifier.verify(raw, NOW), Err(VerificationError::Malformed), "{raw}");
        }
    }

    #[test]
    fn hmac_token_is_bad_signature() {
        // GIVEN: well-formed claims signed with HS256 instead of ES512
        let (_, _, verifier) = pair("issuer-x");
        let token = encode(&Header::default(), &foreign_claims(), &EncodingKey::from_secret(b"guess")).unwrap();

        // WHEN/THEN: the algorithm is refused
        assert_eq!(verifier.verify(&token, NOW), Err(VerificationError::BadSignature));
    }

    #[test]
    fn weaker_curve_token_is_bad_signature() {
        // GIVEN: a genuine ES384 token from some other P-384 key
        let (_, _, verifier) = pair("issuer-x");
        let p384 = rcgen::KeyPair::generate_for(&rcgen::PKCS_ECDSA_P384_SHA384).unwrap();
        let key = EncodingKey::from_ec_der(&p384.serialize_der());
        let token = encode(&Header::new(Algorithm::ES384), &foreign_claims(), &key).unwrap();

        // WHEN/THEN: only ES512 is accepted
        assert_eq!(verifier.verify(&token, NOW), Err(VerificationError::BadSignature));
    }

    #[test]
    fn error_kinds_are_snake_case() {
        assert_eq!(VerificationError::NotYetValid.kind(), "not_yet_valid");
        assert_eq!(VerificationError::BadSignature.kind(), "bad_signature");
    }
}
