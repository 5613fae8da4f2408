//! Compact JWS serialization (RFC 7515) for ES512.
//!
//! `base64url(header) . base64url(claims) . base64url(signature)`, no
//! padding. The signature is the fixed-width `r || s` form required by
//! RFC 7518 §3.4, 132 bytes for P-521.

use aws_lc_rs::rand::SystemRandom;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::{Deserialize, Serialize, de::DeserializeOwned};

use super::keys::{KeyProvider, SIGNING_ALGORITHM};

/// JOSE header of an access token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JwsHeader {
    /// Signature algorithm.
    pub alg: String,
    /// Media type, `JWT` on tokens minted here.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub typ: Option<String>,
    /// Id of the signing key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kid: Option<String>,
}

impl JwsHeader {
    /// Header for tokens signed by `keys`.
    #[must_use]
    pub fn for_key(keys: &KeyProvider) -> Self {
        Self {
            alg: SIGNING_ALGORITHM.to_string(),
            typ: Some("JWT".to_string()),
            kid: Some(keys.key_id().to_string()),
        }
    }
}

/// Failure to produce or open a compact JWS.
#[derive(Debug, thiserror::Error)]
pub enum JwsError {
    /// Wrong segment count, bad base64 or an unreadable header.
    #[error("Not a compact JWS")]
    Malformed,
    /// Header names an algorithm other than ES512.
    #[error("Unsupported algorithm '{0}'")]
    Algorithm(String),
    /// Signature does not verify under the process key.
    #[error("Signature verification failed")]
    Signature,
    /// Claims could not be serialized or deserialized.
    #[error("Invalid claims: {0}")]
    Claims(#[source] serde_json::Error),
    /// The signing backend failed.
    #[error("Signing backend failure")]
    Signing,
}

/// Serialize `claims` and sign them with the private key of `keys`.
///
/// # Errors
///
/// Returns [`JwsError::Claims`] if serialization fails and
/// [`JwsError::Signing`] if the backend refuses to sign.
pub fn encode<T: Serialize>(header: &JwsHeader, claims: &T, keys: &KeyProvider) -> Result<String, JwsError> {
    let signing_input = format!("{}.{}", encode_part(header)?, encode_part(claims)?);

    let signature = keys
        .private_key()
        .sign(&SystemRandom::new(), signing_input.as_bytes())
        .map_err(|_| JwsError::Signing)?;

    Ok(format!("{signing_input}.{}", URL_SAFE_NO_PAD.encode(signature.as_ref())))
}

/// Check the structure, algorithm and signature of `raw`, then deserialize
/// its claims.
///
/// # Errors
///
/// Checks run in that order and the first failure is returned.
pub fn decode<T: DeserializeOwned>(raw: &str, keys: &KeyProvider) -> Result<(JwsHeader, T), JwsError> {
    let mut segments = raw.split('.');
    let (Some(header_b64), Some(payload_b64), Some(signature_b64), None) =
        (segments.next(), segments.next(), segments.next(), segments.next())
    else {
        return Err(JwsError::Malformed);
    };

    let header: JwsHeader = decode_part(header_b64).map_err(|_| JwsError::Malformed)?;
    if header.alg != SIGNING_ALGORITHM {
        return Err(JwsError::Algorithm(header.alg));
    }

    let signature = URL_SAFE_NO_PAD
        .decode(signature_b64)
        .map_err(|_| JwsError::Malformed)?;
    let signing_input = &raw[..header_b64.len() + 1 + payload_b64.len()];
    keys.public_key()
        .verify(signing_input.as_bytes(), &signature)
        .map_err(|_| JwsError::Signature)?;

    let claims = decode_part(payload_b64)?;
    Ok((header, claims))
}

fn encode_part<T: Serialize>(value: &T) -> Result<String, JwsError> {
    let json = serde_json::to_vec(value).map_err(JwsError::Claims)?;
    Ok(URL_SAFE_NO_PAD.encode(json))
}

fn decode_part<T: DeserializeOwned>(segment: &str) -> Result<T, JwsError> {
    let bytes = URL_SAFE_NO_PAD.decode(segment).map_err(|_| JwsError::Malformed)?;
    serde_json::from_slice(&bytes).map_err(JwsError::Claims)
}
