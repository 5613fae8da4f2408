//! Signing key provider: the single EC key pair behind every token.
//!
//! The key is read once at startup from a PKCS#8 PEM file. The private half
//! becomes an [`EcdsaKeyPair`] handed to the token issuer; the public half is
//! the raw SEC1 point used by the verifier and the one-entry
//! [`PublicKeySet`] served at `GET /auth/jwks.json`.
//!
//! # Algorithm
//!
//! ES512 (ECDSA over P-521 with SHA-512). Keys on any other curve are
//! rejected at load time so a misconfigured deployment never starts.

use std::fs;
use std::path::Path;

use aws_lc_rs::signature::{
    ECDSA_P521_SHA512_FIXED, ECDSA_P521_SHA512_FIXED_SIGNING, EcdsaKeyPair, KeyPair as _,
    UnparsedPublicKey,
};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use jsonwebtoken::jwk::{EllipticCurve, EllipticCurveKeyType, PublicKeyUse};
use rcgen::{KeyPair, PKCS_ECDSA_P521_SHA512};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info};

/// JWS `alg` of every access token.
pub const SIGNING_ALGORITHM: &str = "ES512";

/// Length in bytes of one P-521 affine coordinate.
const COORDINATE_LEN: usize = 66;

/// Error variants for key loading and generation.
#[derive(Debug, thiserror::Error)]
pub enum KeyError {
    /// The configured key file does not exist.
    #[error("Signing key not found: {0}")]
    Missing(String),

    /// The key file could not be read.
    #[error("Failed to read signing key '{path}': {source}")]
    Read {
        /// Path of the key file.
        path: String,
        /// Underlying IO error.
        source: std::io::Error,
    },

    /// The key file is not a PKCS#8 PEM private key.
    #[error("Failed to parse signing key: {0}")]
    Parse(String),

    /// The key is valid but not a P-521 ECDSA key.
    #[error("Signing key must be ECDSA P-521, got {0}")]
    WrongCurve(String),

    /// The public point is not an uncompressed P-521 point.
    #[error("Unexpected public key encoding ({0} bytes)")]
    PublicPoint(usize),

    /// Key generation failed.
    #[error("Key generation failed: {0}")]
    Generate(String),
}

/// One public key in JSON Web Key form (RFC 7517), EC members only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicJwk {
    /// Always `EC`.
    pub kty: EllipticCurveKeyType,
    /// Always `P-521`.
    pub crv: EllipticCurve,
    /// Base64url affine X coordinate.
    pub x: String,
    /// Base64url affine Y coordinate.
    pub y: String,
    /// Always `sig`.
    #[serde(rename = "use")]
    pub key_use: PublicKeyUse,
    /// Always [`SIGNING_ALGORITHM`].
    pub alg: String,
    /// Key id, matches the token `kid` header.
    pub kid: String,
}

/// The `{"keys": [...]}` document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicKeySet {
    /// Published keys; exactly one.
    pub keys: Vec<PublicJwk>,
}

/// Owns the process signing key. Immutable after construction.
pub struct KeyProvider {
    signing: EcdsaKeyPair,
    public_point: Vec<u8>,
    jwk: PublicJwk,
    key_id: String,
    pem: String,
}

impl std::fmt::Debug for KeyProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyProvider")
            .field("key_id", &self.key_id)
            .field("algorithm", &SIGNING_ALGORITHM)
            .finish_non_exhaustive()
    }
}

impl KeyProvider {
    /// Load the signing key from a PKCS#8 PEM file.
    ///
    /// # Errors
    ///
    /// Returns [`KeyError`] if the file is missing, unreadable, not a PEM
    /// private key, or not a P-521 ECDSA key.
    pub fn load(path: &Path) -> Result<Self, KeyError> {
        let shown = path.display().to_string();
        if !path.exists() {
            return Err(KeyError::Missing(shown));
        }

        let pem = fs::read_to_string(path).map_err(|source| KeyError::Read {
            path: shown.clone(),
            source,
        })?;

        let provider = Self::from_pem(&pem)?;
        info!(path = %shown, kid = %provider.key_id, "Loaded signing key");
        Ok(provider)
    }

    /// Build a provider from PEM text.
    ///
    /// # Errors
    ///
    /// Returns [`KeyError`] if the PEM is not a P-521 ECDSA PKCS#8 key.
    pub fn from_pem(pem: &str) -> Result<Self, KeyError> {
        let key_pair = KeyPair::from_pem(pem).map_err(|e| KeyError::Parse(e.to_string()))?;
        Self::from_key_pair(&key_pair)
    }

    /// Generate a fresh P-521 key pair.
    ///
    /// # Errors
    ///
    /// Returns [`KeyError::Generate`] if the crypto backend fails.
    pub fn generate() -> Result<Self, KeyError> {
        let key_pair = KeyPair::generate_for(&PKCS_ECDSA_P521_SHA512)
            .map_err(|e| KeyError::Generate(e.to_string()))?;
        Self::from_key_pair(&key_pair)
    }

    fn from_key_pair(key_pair: &KeyPair) -> Result<Self, KeyError> {
        if !key_pair.is_compatible(&PKCS_ECDSA_P521_SHA512) {
            return Err(KeyError::WrongCurve(format!(
                "{}-byte public key",
                key_pair.public_key_raw().len()
            )));
        }

        let signing =
            EcdsaKeyPair::from_pkcs8(&ECDSA_P521_SHA512_FIXED_SIGNING, &key_pair.serialize_der())
                .map_err(|e| KeyError::Parse(e.to_string()))?;
        let public_point = signing.public_key().as_ref().to_vec();

        let (x, y) = split_public_point(&public_point)?;
        let key_id = derive_key_id(&public_point);
        let jwk = PublicJwk {
            kty: EllipticCurveKeyType::EC,
            crv: EllipticCurve::P521,
            x,
            y,
            key_use: PublicKeyUse::Signature,
            alg: SIGNING_ALGORITHM.to_string(),
            kid: key_id.clone(),
        };

        debug!(kid = %key_id, "Signing key material prepared");

        Ok(Self {
            signing,
            public_point,
            jwk,
            key_id,
            pem: key_pair.serialize_pem(),
        })
    }

    /// Public key used to verify tokens.
    #[must_use]
    pub fn public_key(&self) -> UnparsedPublicKey<&[u8]> {
        UnparsedPublicKey::new(&ECDSA_P521_SHA512_FIXED, self.public_point.as_slice())
    }

    /// Private key used to sign tokens.
    pub(crate) fn private_key(&self) -> &EcdsaKeyPair {
        &self.signing
    }

    /// Key identifier written to the JWT `kid` header and the JWK.
    #[must_use]
    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    /// The public key as a JSON Web Key.
    #[must_use]
    pub fn public_jwk(&self) -> &PublicJwk {
        &self.jwk
    }

    /// The `{"keys": [...]}` document served at `/auth/jwks.json`.
    #[must_use]
    pub fn public_key_set_document(&self) -> PublicKeySet {
        PublicKeySet {
            keys: vec![self.jwk.clone()],
        }
    }

    /// Write the private key to `path` as PKCS#8 PEM.
    ///
    /// # Errors
    ///
    /// Returns an IO error if the parent directory or file cannot be written.
    pub fn write_pem(&self, path: &Path) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(path, self.pem.as_bytes())
    }
}

/// Split an uncompressed SEC1 point (`0x04 || X || Y`) into base64url coordinates.
fn split_public_point(raw: &[u8]) -> Result<(String, String), KeyError> {
    match raw {
        [0x04, rest @ ..] if rest.len() == 2 * COORDINATE_LEN => {
            let (x, y) = rest.split_at(COORDINATE_LEN);
            Ok((URL_SAFE_NO_PAD.encode(x), URL_SAFE_NO_PAD.encode(y)))
        }
        _ => Err(KeyError::PublicPoint(raw.len())),
    }
}

/// Stable key id: first 16 bytes of SHA-256 over the raw public point.
fn derive_key_id(raw: &[u8]) -> String {
    let digest = Sha256::digest(raw);
    URL_SAFE_NO_PAD.encode(&digest[..16])
}
