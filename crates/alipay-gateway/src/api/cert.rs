//! `alipay.open.app.alipaycert.download`

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde::{Deserialize, Serialize};

use crate::error::{GatewayError, GatewayResult};
use crate::request::GatewayRequest;
use crate::types::CommonResponse;

/// Download the Alipay public key certificate with a given serial number.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CertDownloadRequest {
    pub alipay_cert_sn: String,
}

impl CertDownloadRequest {
    pub fn new(alipay_cert_sn: impl Into<String>) -> Self {
        Self {
            alipay_cert_sn: alipay_cert_sn.into(),
        }
    }
}

impl GatewayRequest for CertDownloadRequest {
    const METHOD: &'static str = "alipay.open.app.alipaycert.download";
    type Response = CertDownloadResponse;
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct CertDownloadResponse {
    #[serde(flatten)]
    pub common: CommonResponse,

    /// Base64 of the PEM certificate.
    #[serde(default)]
    pub alipay_cert_content: String,
}

impl CertDownloadResponse {
    /// The downloaded certificate as PEM text.
    pub fn certificate_pem(&self) -> GatewayResult<String> {
        if self.alipay_cert_content.trim().is_empty() {
            return Err(GatewayError::CertificateParse {
                message: "download response carries no certificate".to_string(),
            });
        }
        let bytes = BASE64
            .decode(self.alipay_cert_content.trim())
            .map_err(|e| GatewayError::CertificateParse {
                message: format!("certificate content is not valid base64: {}", e),
            })?;
        String::from_utf8(bytes).map_err(|_| GatewayError::CertificateParse {
            message: "certificate content is not UTF-8 text".to_string(),
        })
    }
}
