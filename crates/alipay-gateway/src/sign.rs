//! RSA signing and verification (PKCS#1 v1.5).
//!
//! - `RSA`  → SHA-1
//! - `RSA2` → SHA-256
//!
//! Signatures travel as standard base64.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use rsa::pkcs1::{DecodeRsaPrivateKey, DecodeRsaPublicKey};
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey};
use rsa::{Pkcs1v15Sign, RsaPrivateKey, RsaPublicKey};
use sha1::{Digest, Sha1};
use sha2::Sha256;

use crate::error::{GatewayError, GatewayResult};
use crate::types::SignType;

/// Caller identity and signing key.
///
/// Built once per client; never mutated afterwards.
#[derive(Debug, Clone)]
pub struct Credential {
    /// Application id.
    pub app_id: String,

    /// Signature algorithm for requests and responses.
    pub sign_type: SignType,

    private_key: Option<RsaPrivateKey>,
}

impl Credential {
    pub fn new(
        app_id: impl Into<String>,
        sign_type: SignType,
        private_key: Option<RsaPrivateKey>,
    ) -> Self {
        Self {
            app_id: app_id.into(),
            sign_type,
            private_key,
        }
    }

    /// Sign a canonical string with the application private key.
    pub fn sign(&self, content: &str) -> GatewayResult<String> {
        sign(content, self.private_key.as_ref(), self.sign_type)
    }

    pub fn has_private_key(&self) -> bool {
        self.private_key.is_some()
    }
}

/// Sign `content` and return the base64 signature.
pub fn sign(
    content: &str,
    private_key: Option<&RsaPrivateKey>,
    sign_type: SignType,
) -> GatewayResult<String> {
    let key = private_key.ok_or_else(|| GatewayError::Signing {
        reason: "no application private key configured".to_string(),
    })?;

    let signature = match sign_type {
        SignType::Rsa => key.sign(
            Pkcs1v15Sign::new::<Sha1>(),
            &Sha1::digest(content.as_bytes()),
        ),
        SignType::Rsa2 => key.sign(
            Pkcs1v15Sign::new::<Sha256>(),
            &Sha256::digest(content.as_bytes()),
        ),
    }
    .map_err(|e| GatewayError::Signing {
        reason: e.to_string(),
    })?;

    Ok(BASE64.encode(signature))
}

/// Verify a base64 signature over `content`.
pub fn verify(
    content: &str,
    public_key: Option<&RsaPublicKey>,
    signature_b64: &str,
    sign_type: SignType,
) -> GatewayResult<()> {
    let key = public_key.ok_or_else(|| GatewayError::SignatureInvalid {
        reason: "no public key available".to_string(),
    })?;

    let signature = BASE64
        .decode(signature_b64.trim())
        .map_err(|e| GatewayError::SignatureInvalid {
            reason: format!("invalid base64 signature: {}", e),
        })?;

    match sign_type {
        SignType::Rsa => key.verify(
            Pkcs1v15Sign::new::<Sha1>(),
            &Sha1::digest(content.as_bytes()),
            &signature,
        ),
        SignType::Rsa2 => key.verify(
            Pkcs1v15Sign::new::<Sha256>(),
            &Sha256::digest(content.as_bytes()),
            &signature,
        ),
    }
    .map_err(|_| GatewayError::SignatureInvalid {
        reason: format!("{} signature does not match content", sign_type),
    })
}

/// Parse an RSA private key from PEM text or a bare base64 body.
///
/// Accepts PKCS#1 (`RSA PRIVATE KEY`) and PKCS#8 (`PRIVATE KEY`).
pub fn parse_private_key(text: &str) -> GatewayResult<RsaPrivateKey> {
    let text = text.trim();
    if text.starts_with("-----BEGIN") {
        let parsed = if text.contains("BEGIN RSA PRIVATE KEY") {
            RsaPrivateKey::from_pkcs1_pem(text).map_err(|e| e.to_string())
        } else {
            RsaPrivateKey::from_pkcs8_pem(text).map_err(|e| e.to_string())
        };
        return parsed.map_err(|e| GatewayError::Key {
            message: format!("invalid private key PEM: {}", e),
        });
    }

    let der = decode_bare_base64(text)?;
    RsaPrivateKey::from_pkcs1_der(&der)
        .or_else(|_| RsaPrivateKey::from_pkcs8_der(&der))
        .map_err(|e| GatewayError::Key {
            message: format!("invalid private key DER: {}", e),
        })
}

/// Parse an RSA public key from PEM text or a bare base64 body.
///
/// Accepts SPKI (`PUBLIC KEY`) and PKCS#1 (`RSA PUBLIC KEY`).
pub fn parse_public_key(text: &str) -> GatewayResult<RsaPublicKey> {
    let text = text.trim();
    if text.starts_with("-----BEGIN") {
        let parsed = if text.contains("BEGIN RSA PUBLIC KEY") {
            RsaPublicKey::from_pkcs1_pem(text).map_err(|e| e.to_string())
        } else {
            RsaPublicKey::from_public_key_pem(text).map_err(|e| e.to_string())
        };
        return parsed.map_err(|e| GatewayError::Key {
            message: format!("invalid public key PEM: {}", e),
        });
    }

    let der = decode_bare_base64(text)?;
    RsaPublicKey::from_public_key_der(&der)
        .or_else(|_| RsaPublicKey::from_pkcs1_der(&der))
        .map_err(|e| GatewayError::Key {
            message: format!("invalid public key DER: {}", e),
        })
}

fn decode_bare_base64(text: &str) -> GatewayResult<Vec<u8>> {
    let compact: String = text.chars().filter(|c| !c.is_whitespace()).collect();
    if compact.is_empty() {
        return Err(GatewayError::Key {
            message: "key content is empty".to_string(),
        });
    }
    BASE64.decode(compact).map_err(|e| GatewayError::Key {
        message: format!("invalid base64 key body: {}", e),
    })
}
