//! Gateway client: signed requests out, verified payloads in.
//!
//! Public API: no status code knowledge. All HTTP/status mapping in http.rs.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::debug;

use crate::api::{CertDownloadRequest, TradeNotification};
use crate::canonicalize::NotificationKind;
use crate::cert::{self, cert_sn_from_pem, CertificateIdentity};
use crate::cipher::ContentCipher;
use crate::error::{GatewayError, GatewayResult};
use crate::request::{GatewayRequest, RequestEnvelope, RequestOptions};
use crate::sign::{parse_private_key, parse_public_key, Credential};
use crate::trust::{CertificateRegistry, EntrySource};
use crate::types::{
    CommonResponse, GatewayConfig, API_VERSION, FIELD_ALIPAY_ROOT_CERT_SN, FIELD_APP_AUTH_TOKEN,
    FIELD_APP_CERT_SN, FIELD_APP_ID, FIELD_BIZ_CONTENT, FIELD_CHARSET, FIELD_ENCRYPT_TYPE,
    FIELD_FORMAT, FIELD_METHOD, FIELD_NOTIFY_URL, FIELD_RETURN_URL, FIELD_SIGN_TYPE,
    FIELD_TIMESTAMP, FIELD_VERSION, FORMAT_JSON, TIMESTAMP_FORMAT,
};
use crate::verify::{CertificateFetcher, Verifier};

mod http;

pub use http::{HttpTransport, Transport};

/// Client for the open platform gateway.
///
/// `Send + Sync`; share it behind an `Arc` or clone it (clones share the
/// certificate registry).
#[derive(Debug, Clone)]
pub struct GatewayClient {
    gateway_url: String,
    charset: String,
    credential: Credential,
    verifier: Verifier,
    cipher: Option<ContentCipher>,
    app_cert_sn: Option<String>,
    root_cert_sn: Option<String>,
    transport: Arc<dyn Transport>,
}

impl GatewayClient {
    /// Create a client that talks HTTP.
    pub fn new(config: GatewayConfig) -> GatewayResult<Self> {
        let transport = HttpTransport::new(config.timeout_secs, config.max_retries)?;
        Self::with_transport(config, Arc::new(transport))
    }

    /// Create a client from `ALIPAY_*` environment variables.
    pub fn from_env() -> GatewayResult<Self> {
        Self::new(GatewayConfig::from_env()?)
    }

    /// Create a client over a custom transport.
    pub fn with_transport(
        config: GatewayConfig,
        transport: Arc<dyn Transport>,
    ) -> GatewayResult<Self> {
        if config.app_id.trim().is_empty() {
            return Err(GatewayError::Config {
                message: "app_id is required".to_string(),
            });
        }

        let private_key = config
            .app_private_key
            .as_deref()
            .map(parse_private_key)
            .transpose()?;

        let registry = CertificateRegistry::new();
        let configured_cert = config
            .alipay_public_cert
            .as_deref()
            .map(CertificateIdentity::from_pem)
            .transpose()?;
        let static_key = match config.alipay_public_key.as_deref() {
            Some(key) => Some(parse_public_key(key)?),
            None => configured_cert.as_ref().map(|c| c.public_key.clone()),
        };
        if let Some(identity) = configured_cert {
            registry.insert(identity, EntrySource::Configured);
        }

        let app_cert_sn = config
            .app_public_cert
            .as_deref()
            .map(cert_sn_from_pem)
            .transpose()?;
        let root_cert_sn = config
            .alipay_root_cert
            .as_deref()
            .map(cert::root_cert_sn)
            .transpose()?;
        if config.is_cert_mode() && (app_cert_sn.is_none() || root_cert_sn.is_none()) {
            tracing::warn!(
                has_app_cert = app_cert_sn.is_some(),
                has_root_cert = root_cert_sn.is_some(),
                "certificate mode is only partially configured"
            );
        }

        let cipher = match config.encrypt_key.as_deref() {
            Some(key) => Some(ContentCipher::from_settings(config.encrypt_type, Some(key))?),
            None => None,
        };

        let verifier = Verifier::new(config.sign_type, static_key, registry, cipher.clone());
        let credential = Credential::new(config.app_id.clone(), config.sign_type, private_key);

        Ok(Self {
            gateway_url: config.gateway_url().to_string(),
            charset: config.charset,
            credential,
            verifier,
            cipher,
            app_cert_sn,
            root_cert_sn,
            transport,
        })
    }

    /// Build the signed envelope for a request.
    pub fn build_envelope<R: GatewayRequest>(
        &self,
        request: &R,
        options: &RequestOptions,
    ) -> GatewayResult<RequestEnvelope> {
        let mut biz_content =
            serde_json::to_string(request).map_err(|e| GatewayError::Validation {
                message: format!("failed to serialize biz_content: {}", e),
            })?;
        if options.need_encrypt {
            biz_content = self.require_cipher()?.encrypt(&biz_content)?;
        }

        let mut envelope = RequestEnvelope::new();
        envelope.push(FIELD_APP_ID, self.credential.app_id.as_str());
        envelope.push(FIELD_METHOD, R::METHOD);
        envelope.push(FIELD_FORMAT, FORMAT_JSON);
        envelope.push(FIELD_CHARSET, self.charset.as_str());
        envelope.push(FIELD_SIGN_TYPE, self.credential.sign_type.as_str());
        envelope.push(
            FIELD_TIMESTAMP,
            chrono::Local::now().format(TIMESTAMP_FORMAT).to_string(),
        );
        envelope.push(FIELD_VERSION, API_VERSION);
        envelope.push_opt(FIELD_APP_CERT_SN, self.app_cert_sn.as_deref());
        envelope.push_opt(FIELD_ALIPAY_ROOT_CERT_SN, self.root_cert_sn.as_deref());
        envelope.push_opt(FIELD_NOTIFY_URL, options.notify_url.as_deref());
        envelope.push_opt(FIELD_RETURN_URL, options.return_url.as_deref());
        envelope.push_opt(FIELD_APP_AUTH_TOKEN, options.app_auth_token.as_deref());
        envelope.push(FIELD_BIZ_CONTENT, biz_content);
        if options.need_encrypt {
            envelope.push(FIELD_ENCRYPT_TYPE, self.require_cipher()?.encrypt_type().as_str());
        }

        envelope.sign(&self.credential)
    }

    /// Call an endpoint and return its verified, decoded payload.
    ///
    /// A verified `error_response` becomes [`GatewayError::Gateway`].
    /// Business failures inside the method node are returned as payloads;
    /// check their `common` fields.
    pub fn execute<R: GatewayRequest>(
        &self,
        request: &R,
        options: &RequestOptions,
    ) -> GatewayResult<R::Response> {
        let envelope = self.build_envelope(request, options)?;
        debug!(method = R::METHOD, url = %self.gateway_url, encrypted = options.need_encrypt, "calling gateway");

        let body = self
            .transport
            .post_form(&self.gateway_url, &envelope.to_form_body())?;

        // The download call verifies with what is already known; it never
        // triggers another download.
        let fetcher: Option<&dyn CertificateFetcher> =
            if R::METHOD == CertDownloadRequest::METHOD {
                None
            } else {
                Some(self)
            };
        let verified =
            self.verifier
                .verify_response(&body, R::METHOD, options.need_encrypt, fetcher)?;

        if verified.is_error {
            let common: CommonResponse = serde_json::from_str(&verified.content).map_err(|e| {
                GatewayError::InvalidResponse {
                    message: format!("failed to parse error_response: {}", e),
                }
            })?;
            return Err(GatewayError::Gateway {
                code: common.code,
                msg: common.msg,
                sub_code: common.sub_code,
                sub_msg: common.sub_msg,
            });
        }

        serde_json::from_str(&verified.content).map_err(|e| GatewayError::InvalidResponse {
            message: format!("failed to parse {} response: {}", R::METHOD, e),
        })
    }

    /// Download the Alipay public key certificate for `cert_sn` as PEM.
    ///
    /// Does not touch the registry.
    pub fn download_certificate(&self, cert_sn: &str) -> GatewayResult<String> {
        let download_failed = |message: String| GatewayError::CertificateDownload {
            cert_sn: cert_sn.to_string(),
            message,
        };

        let response = self
            .execute(&CertDownloadRequest::new(cert_sn), &RequestOptions::default())
            .map_err(|e| match e {
                GatewayError::CertificateParse { .. } => e,
                other => download_failed(other.to_string()),
            })?;

        if !response.common.is_success() {
            return Err(download_failed(format!(
                "{} {} ({}: {})",
                response.common.code,
                response.common.msg,
                response.common.sub_code,
                response.common.sub_msg
            )));
        }
        response.certificate_pem()
    }

    /// Signed, URL-encoded parameter string for the mobile payment SDK.
    pub fn sdk_order_string<R: GatewayRequest>(
        &self,
        request: &R,
        options: &RequestOptions,
    ) -> GatewayResult<String> {
        Ok(self.build_envelope(request, options)?.to_form_body())
    }

    /// Signed GET URL that sends the buyer's browser to the gateway.
    pub fn page_redirect_url<R: GatewayRequest>(
        &self,
        request: &R,
        options: &RequestOptions,
    ) -> GatewayResult<url::Url> {
        let envelope = self.build_envelope(request, options)?;
        let mut url = url::Url::parse(&self.gateway_url).map_err(|e| GatewayError::Config {
            message: format!("invalid gateway URL {}: {}", self.gateway_url, e),
        })?;
        url.set_query(Some(&envelope.to_form_body()));
        Ok(url)
    }

    // ==================== Notifications ====================

    /// Verify URL-decoded notification fields.
    pub fn verify_notification(
        &self,
        fields: &BTreeMap<String, String>,
        kind: NotificationKind,
    ) -> GatewayResult<()> {
        self.verifier.verify_notification(fields, kind)
    }

    /// Whether a notification carries a valid signature.
    pub fn is_trusted_notification(
        &self,
        fields: &BTreeMap<String, String>,
        kind: NotificationKind,
    ) -> bool {
        match self.verify_notification(fields, kind) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(error = %e, "rejected notification");
                false
            }
        }
    }

    /// Parse, verify and decode a raw form-encoded notification body.
    pub fn handle_notification(
        &self,
        raw_body: &str,
        kind: NotificationKind,
    ) -> GatewayResult<TradeNotification> {
        let fields = parse_notification_body(raw_body);
        self.verify_notification(&fields, kind)?;
        TradeNotification::from_fields(&fields)
    }

    // ==================== Accessors ====================

    pub fn gateway_url(&self) -> &str {
        &self.gateway_url
    }

    pub fn credential(&self) -> &Credential {
        &self.credential
    }

    pub fn registry(&self) -> &CertificateRegistry {
        self.verifier.registry()
    }

    pub fn app_cert_sn(&self) -> Option<&str> {
        self.app_cert_sn.as_deref()
    }

    pub fn root_cert_sn(&self) -> Option<&str> {
        self.root_cert_sn.as_deref()
    }

    fn require_cipher(&self) -> GatewayResult<&ContentCipher> {
        self.cipher.as_ref().ok_or_else(|| GatewayError::Validation {
            message: "encryption requested but no encrypt key is configured".to_string(),
        })
    }
}

impl CertificateFetcher for GatewayClient {
    fn fetch_certificate(&self, cert_sn: &str) -> GatewayResult<String> {
        self.download_certificate(cert_sn)
    }
}

/// URL-decode a form body. The first occurrence of a repeated field wins.
pub fn parse_notification_body(raw_body: &str) -> BTreeMap<String, String> {
    let mut fields = BTreeMap::new();
    for (key, value) in url::form_urlencoded::parse(raw_body.trim().as_bytes()) {
        fields.entry(key.into_owned()).or_insert_with(|| value.into_owned());
    }
    fields
}
