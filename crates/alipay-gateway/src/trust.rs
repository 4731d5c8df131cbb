//! Certificate registry for certificate-mode verification.
//!
//! Maps certificate serial numbers to the RSA public keys of the
//! certificates that carry them. Entries come from:
//! - The configured Alipay public key certificate
//! - Certificates downloaded when a response names an unknown serial number
//!
//! Entries are never evicted, so responses signed with an older certificate
//! stay verifiable after a rotation.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use rsa::RsaPublicKey;

use crate::cert::CertificateIdentity;
use crate::error::{GatewayError, GatewayResult};

/// Shared serial number → public key map.
///
/// Cloning is cheap and clones share the same map. All reads and writes go
/// through one mutex, which is never held across a network call.
#[derive(Debug, Clone, Default)]
pub struct CertificateRegistry {
    inner: Arc<Mutex<RegistryInner>>,
}

#[derive(Debug, Default)]
struct RegistryInner {
    /// SN -> public key
    keys: HashMap<String, RsaPublicKey>,

    /// SN -> metadata
    metadata: HashMap<String, EntryMetadata>,
}

/// Where a registry entry came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntrySource {
    /// Supplied with the client configuration.
    Configured,

    /// Fetched through the certificate download endpoint.
    Downloaded,
}

/// Metadata for a registry entry.
#[derive(Debug, Clone)]
pub struct EntryMetadata {
    pub source: EntrySource,
    pub added_at: DateTime<Utc>,
}

impl CertificateRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, RegistryInner> {
        // The map stays consistent even if a holder panicked.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Look up the public key for a serial number.
    pub fn resolve(&self, sn: &str) -> Option<RsaPublicKey> {
        let inner = self.lock();
        let key = inner.keys.get(sn).cloned();
        if key.is_some() {
            tracing::debug!(cert_sn = %sn, "certificate registry hit");
        }
        key
    }

    /// Insert an identity. An existing entry for the same SN is replaced.
    pub fn insert(&self, identity: CertificateIdentity, source: EntrySource) {
        let mut inner = self.lock();
        let sn = identity.sn;
        inner.keys.insert(sn.clone(), identity.public_key);
        inner.metadata.insert(
            sn.clone(),
            EntryMetadata {
                source,
                added_at: Utc::now(),
            },
        );
        tracing::info!(cert_sn = %sn, ?source, entries = inner.keys.len(), "certificate registered");
    }

    /// Parse a certificate and register it under its computed SN.
    pub fn register_pem(&self, pem: &str, source: EntrySource) -> GatewayResult<String> {
        let identity = CertificateIdentity::from_pem(pem)?;
        let sn = identity.sn.clone();
        self.insert(identity, source);
        Ok(sn)
    }

    /// Parse a downloaded certificate and register it, provided its
    /// computed SN is the one that was requested.
    ///
    /// On any failure the registry is left unchanged.
    pub fn register_downloaded(
        &self,
        pem: &str,
        requested_sn: &str,
    ) -> GatewayResult<RsaPublicKey> {
        let identity = CertificateIdentity::from_pem(pem)?;
        if identity.sn != requested_sn {
            return Err(GatewayError::CertificateSnMismatch {
                requested: requested_sn.to_string(),
                actual: identity.sn,
            });
        }

        let key = identity.public_key.clone();
        self.insert(identity, EntrySource::Downloaded);
        Ok(key)
    }

    pub fn contains(&self, sn: &str) -> bool {
        self.lock().keys.contains_key(sn)
    }

    pub fn len(&self) -> usize {
        self.lock().keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All registered serial numbers, sorted.
    pub fn list_sns(&self) -> Vec<String> {
        let mut sns: Vec<String> = self.lock().keys.keys().cloned().collect();
        sns.sort();
        sns
    }

    /// Get metadata for an entry.
    pub fn metadata(&self, sn: &str) -> Option<EntryMetadata> {
        self.lock().metadata.get(sn).cloned()
    }
}
