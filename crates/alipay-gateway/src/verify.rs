//! Response and notification verification.
//!
//! Synchronous responses:
//! 1. Cut the signed node out of the raw document
//! 2. Pick the key: `alipay_cert_sn` present → registry (downloading the
//!    certificate on a miss), otherwise the static Alipay public key
//! 3. Verify the node text as received
//! 4. Decrypt the node if it was encrypted, splicing the plaintext back in
//!
//! Nothing is decoded before step 3 succeeds.

use std::collections::BTreeMap;

use rsa::RsaPublicKey;

use crate::canonicalize::{notification_sign_content, NotificationKind};
use crate::cipher::ContentCipher;
use crate::error::{GatewayError, GatewayResult};
use crate::extract::extract;
use crate::sign::verify;
use crate::trust::CertificateRegistry;
use crate::types::{SignType, FIELD_SIGN, FIELD_SIGN_TYPE};

/// Method name reported for notifications without a signature.
const NOTIFICATION: &str = "notification";

/// Source of certificates for serial numbers the registry does not know.
pub trait CertificateFetcher {
    /// Fetch the PEM certificate carrying `cert_sn`.
    fn fetch_certificate(&self, cert_sn: &str) -> GatewayResult<String>;
}

/// A response whose signature has been checked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedResponse {
    /// Node text, decrypted if it was encrypted.
    pub content: String,

    /// Whole document with the node in plaintext.
    pub document: String,

    /// Whether the node was `error_response`.
    pub is_error: bool,

    /// Serial number of the certificate that verified it (certificate mode).
    pub cert_sn: Option<String>,
}

/// Verifies gateway responses and notifications.
#[derive(Debug, Clone)]
pub struct Verifier {
    sign_type: SignType,
    static_key: Option<RsaPublicKey>,
    registry: CertificateRegistry,
    cipher: Option<ContentCipher>,
}

impl Verifier {
    pub fn new(
        sign_type: SignType,
        static_key: Option<RsaPublicKey>,
        registry: CertificateRegistry,
        cipher: Option<ContentCipher>,
    ) -> Self {
        Self {
            sign_type,
            static_key,
            registry,
            cipher,
        }
    }

    pub fn registry(&self) -> &CertificateRegistry {
        &self.registry
    }

    /// Verify a synchronous response.
    ///
    /// `fetcher` is consulted when the response names a serial number the
    /// registry does not hold. Pass `None` to forbid fetching, as the
    /// certificate download call itself must.
    pub fn verify_response(
        &self,
        body: &str,
        method: &str,
        decrypt: bool,
        fetcher: Option<&dyn CertificateFetcher>,
    ) -> GatewayResult<VerifiedResponse> {
        let missing = || GatewayError::MissingSignature {
            method: method.to_string(),
        };

        let extracted = extract(body, method).ok_or_else(missing)?;
        let sign = extracted
            .sign
            .as_deref()
            .filter(|s| !s.is_empty())
            .ok_or_else(missing)?;

        let key = self.resolve_key(extracted.cert_sn.as_deref(), fetcher)?;
        self.verify_node(extracted.node(), key.as_ref(), sign)?;

        let node = extracted.node();
        let encrypted = decrypt && !extracted.is_error && node.starts_with('"');
        let (content, document) = if encrypted {
            let cipher = self.cipher.as_ref().ok_or_else(|| GatewayError::Validation {
                message: "response is encrypted but no encrypt key is configured".to_string(),
            })?;
            let ciphertext = node
                .strip_prefix('"')
                .and_then(|n| n.strip_suffix('"'))
                .filter(|n| !n.is_empty())
                .ok_or_else(|| GatewayError::MalformedResponse {
                    message: format!("encrypted {} node is not a closed string", method),
                })?;
            let plaintext = cipher.decrypt(ciphertext)?;
            let document = extracted.splice(&plaintext);
            (plaintext, document)
        } else {
            (node.to_string(), body.to_string())
        };

        Ok(VerifiedResponse {
            content,
            document,
            is_error: extracted.is_error,
            cert_sn: extracted.cert_sn.clone(),
        })
    }

    /// Choose the verification key for a response.
    fn resolve_key(
        &self,
        cert_sn: Option<&str>,
        fetcher: Option<&dyn CertificateFetcher>,
    ) -> GatewayResult<Option<RsaPublicKey>> {
        let Some(sn) = cert_sn else {
            return Ok(self.static_key.clone());
        };

        if let Some(key) = self.registry.resolve(sn) {
            return Ok(Some(key));
        }

        match fetcher {
            Some(fetcher) => {
                tracing::info!(cert_sn = %sn, "unknown certificate serial number, downloading");
                // Registry lock is not held here.
                let pem = fetcher.fetch_certificate(sn)?;
                self.registry.register_downloaded(&pem, sn).map(Some)
            }
            None => match &self.static_key {
                Some(key) => {
                    tracing::debug!(cert_sn = %sn, "serial number not cached, using static key");
                    Ok(Some(key.clone()))
                }
                None => Err(GatewayError::CertificateNotTrusted {
                    cert_sn: sn.to_string(),
                }),
            },
        }
    }

    fn verify_node(
        &self,
        node: &str,
        key: Option<&RsaPublicKey>,
        sign: &str,
    ) -> GatewayResult<()> {
        match verify(node, key, sign, self.sign_type) {
            Err(GatewayError::SignatureInvalid { reason }) if key.is_some() && node.contains('/') => {
                tracing::warn!(%reason, "verification failed, retrying with escaped slashes");
                verify(&node.replace('/', "\\/"), key, sign, self.sign_type)
            }
            other => other,
        }
    }

    /// Verify an asynchronous notification.
    ///
    /// `fields` must be URL-decoded. The algorithm is the one the
    /// notification names in `sign_type`, falling back to the configured one.
    pub fn verify_notification(
        &self,
        fields: &BTreeMap<String, String>,
        kind: NotificationKind,
    ) -> GatewayResult<()> {
        let sign = fields
            .get(FIELD_SIGN)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| GatewayError::MissingSignature {
                method: NOTIFICATION.to_string(),
            })?;

        let sign_type = match fields.get(FIELD_SIGN_TYPE).filter(|s| !s.is_empty()) {
            Some(value) => value.parse()?,
            None => self.sign_type,
        };

        let content = notification_sign_content(fields, kind);
        tracing::debug!(?kind, %sign_type, fields = fields.len(), "verifying notification");
        verify(&content, self.static_key.as_ref(), sign, sign_type)
    }
}
